//! Static dependency graph.
//!
//! Built from declared dependency lists only: nothing is constructed and no
//! hook runs. Values a provider pulls in through [`Injector::resolve`]
//! at runtime do not show up here.
//!
//! [`Injector::resolve`]: crate::Injector::resolve

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt::Write as _;
use std::sync::Arc;

#[cfg(feature = "graph-export")]
use serde::Serialize;

use crate::key::Key;
use crate::lifetime::Lifetime;
use crate::registration::{Dependency, Registration};

/// Where a node's provider comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "graph-export", derive(Serialize))]
#[cfg_attr(feature = "graph-export", serde(rename_all = "lowercase"))]
pub enum NodeSource {
    /// Explicitly registered
    Registered,
    /// Not registered, but buildable from its declared shape
    Constructible,
    /// Neither registered nor buildable; resolving it fails
    Missing,
}

#[derive(Debug, Clone)]
pub struct GraphNode {
    pub key: Key,
    pub source: NodeSource,
    /// `None` for missing nodes
    pub lifetime: Option<Lifetime>,
    pub dependencies: Vec<Key>,
}

/// Key → direct dependencies, for every registered key and every key
/// reachable from one.
///
/// # Examples
///
/// ```rust
/// use scopewire::{key_of_type, Container, Dependency, Lifetime};
///
/// struct Database;
/// struct UserService;
///
/// let container = Container::new();
/// container.register_factory::<Database, _>(Lifetime::Singleton, vec![], |_| Ok(Database)).unwrap();
/// container.register_factory::<UserService, _>(
///     Lifetime::request(),
///     vec![Dependency::of::<Database>()],
///     |_| Ok(UserService),
/// ).unwrap();
///
/// let graph = container.dependency_graph();
/// assert_eq!(graph.dependencies_of(&key_of_type::<UserService>()).unwrap(), [key_of_type::<Database>()]);
/// assert!(graph.find_cycle().is_none());
/// assert!(graph.missing().is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: BTreeMap<Key, GraphNode>,
}

impl DependencyGraph {
    pub(crate) fn build(registrations: &[Arc<Registration>]) -> Self {
        let mut nodes = BTreeMap::new();
        let mut pending: VecDeque<Dependency> = VecDeque::new();

        for registration in registrations {
            nodes.insert(registration.key.clone(), node(registration, NodeSource::Registered));
            pending.extend(registration.dependencies.iter().cloned());
        }

        while let Some(dependency) = pending.pop_front() {
            if nodes.contains_key(&dependency.key) {
                continue;
            }
            let found = match dependency.shape {
                Some(shape) => {
                    let synthesized = shape();
                    pending.extend(synthesized.dependencies.iter().cloned());
                    node(&synthesized, NodeSource::Constructible)
                }
                None => GraphNode {
                    key: dependency.key.clone(),
                    source: NodeSource::Missing,
                    lifetime: None,
                    dependencies: Vec::new(),
                },
            };
            nodes.insert(dependency.key, found);
        }

        Self { nodes }
    }

    /// Key → direct dependencies.
    pub fn edges(&self) -> BTreeMap<Key, Vec<Key>> {
        self.nodes
            .iter()
            .map(|(key, node)| (key.clone(), node.dependencies.clone()))
            .collect()
    }

    pub fn node(&self, key: &Key) -> Option<&GraphNode> {
        self.nodes.get(key)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn dependencies_of(&self, key: &Key) -> Option<&[Key]> {
        self.nodes.get(key).map(|node| node.dependencies.as_slice())
    }

    /// Keys that depend on `key` directly.
    pub fn dependents_of(&self, key: &Key) -> Vec<&Key> {
        self.nodes
            .values()
            .filter(|node| node.dependencies.contains(key))
            .map(|node| &node.key)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// `(dependent, missing dependency)` pairs.
    pub fn missing(&self) -> Vec<(Key, Key)> {
        let mut out = Vec::new();
        for node in self.nodes.values() {
            for dependency in &node.dependencies {
                if self.nodes.get(dependency).map(|n| n.source) == Some(NodeSource::Missing) {
                    out.push((node.key.clone(), dependency.clone()));
                }
            }
        }
        out
    }

    /// First cycle found, as a chain that starts and ends with the same key.
    pub fn find_cycle(&self) -> Option<Vec<Key>> {
        let mut done: BTreeSet<&Key> = BTreeSet::new();
        for start in self.nodes.keys() {
            if done.contains(start) {
                continue;
            }
            let mut path: Vec<&Key> = Vec::new();
            if let Some(cycle) = self.visit(start, &mut path, &mut done) {
                return Some(cycle);
            }
        }
        None
    }

    fn visit<'g>(&'g self, key: &'g Key, path: &mut Vec<&'g Key>, done: &mut BTreeSet<&'g Key>) -> Option<Vec<Key>> {
        if let Some(pos) = path.iter().position(|k| *k == key) {
            let mut chain: Vec<Key> = path[pos..].iter().map(|k| (*k).clone()).collect();
            chain.push(key.clone());
            return Some(chain);
        }
        if done.contains(key) {
            return None;
        }
        path.push(key);
        if let Some(node) = self.nodes.get(key) {
            for dependency in &node.dependencies {
                if let Some(cycle) = self.visit(dependency, path, done) {
                    return Some(cycle);
                }
            }
        }
        path.pop();
        done.insert(key);
        None
    }

    /// Graphviz rendering.
    pub fn to_dot(&self) -> String {
        let mut output = String::new();
        output.push_str("digraph DependencyGraph {\n");
        output.push_str("  rankdir=TB;\n");
        output.push_str("  node [shape=box, style=filled];\n\n");

        for node in self.nodes.values() {
            let color = match (&node.source, &node.lifetime) {
                (NodeSource::Missing, _) => "tomato",
                (_, Some(Lifetime::Singleton)) => "lightblue",
                (_, Some(Lifetime::Scoped(_))) => "lightgreen",
                _ => "lightyellow",
            };
            let lifetime = node
                .lifetime
                .as_ref()
                .map_or_else(|| "missing".to_string(), |l| l.to_string());
            let _ = writeln!(
                output,
                "  \"{}\" [label=\"{}\\n({})\", fillcolor={}];",
                node.key.short_name(),
                node.key.short_name(),
                lifetime,
                color
            );
        }
        output.push('\n');
        for node in self.nodes.values() {
            for dependency in &node.dependencies {
                let _ = writeln!(output, "  \"{}\" -> \"{}\";", node.key.short_name(), dependency.short_name());
            }
        }
        output.push_str("}\n");
        output
    }

    /// JSON rendering with one entry per node.
    #[cfg(feature = "graph-export")]
    pub fn to_json(&self) -> crate::DiResult<String> {
        let export = GraphExport {
            nodes: self
                .nodes
                .values()
                .map(|node| ExportNode {
                    id: node.key.to_string(),
                    name: node.key.short_name(),
                    source: node.source,
                    lifetime: node.lifetime.as_ref().map(|l| l.to_string()),
                    dependencies: node.dependencies.iter().map(|k| k.to_string()).collect(),
                })
                .collect(),
            has_cycle: self.find_cycle().is_some(),
        };
        serde_json::to_string_pretty(&export)
            .map_err(|err| crate::DiError::configuration(None, format!("graph serialization failed: {err}")))
    }
}

fn node(registration: &Registration, source: NodeSource) -> GraphNode {
    GraphNode {
        key: registration.key.clone(),
        source,
        lifetime: Some(registration.lifetime.clone()),
        dependencies: registration.dependencies.iter().map(|d| d.key.clone()).collect(),
    }
}

#[cfg(feature = "graph-export")]
#[derive(Serialize)]
struct GraphExport {
    nodes: Vec<ExportNode>,
    has_cycle: bool,
}

#[cfg(feature = "graph-export")]
#[derive(Serialize)]
struct ExportNode {
    id: String,
    name: String,
    source: NodeSource,
    lifetime: Option<String>,
    dependencies: Vec<String>,
}
