//! Dependency keys.

use std::any::TypeId;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identifier for a requested capability.
///
/// A key is either a plain type (`Key::Type`) or a type tagged with a name
/// (`Key::Named`), which lets several registrations share one Rust type.
/// The type name is carried only for diagnostics; equality and hashing use
/// the `TypeId` (and the tag for named keys).
///
/// # Examples
///
/// ```rust
/// use scopewire::{key_of_type, key_of_named, Key};
///
/// struct Database;
///
/// let plain = key_of_type::<Database>();
/// let primary = key_of_named::<Database>("primary");
///
/// assert_ne!(plain, primary);
/// assert_eq!(primary.service_name(), Some("primary"));
/// assert!(plain.display_name().ends_with("Database"));
/// assert!(matches!(plain, Key::Type(..)));
/// ```
#[derive(Debug, Clone)]
pub enum Key {
    /// Concrete type key with TypeId and name for diagnostics
    Type(TypeId, &'static str),
    /// Type key tagged with a service name
    Named(TypeId, &'static str, Cow<'static, str>),
}

impl Key {
    /// The Rust type name behind this key.
    pub fn display_name(&self) -> &'static str {
        match self {
            Key::Type(_, name) => name,
            Key::Named(_, name, _) => name,
        }
    }

    /// The tag of a named key, `None` for plain type keys.
    pub fn service_name(&self) -> Option<&str> {
        match self {
            Key::Type(..) => None,
            Key::Named(_, _, tag) => Some(tag),
        }
    }

    pub fn type_id(&self) -> TypeId {
        match self {
            Key::Type(id, _) | Key::Named(id, _, _) => *id,
        }
    }

    /// Short form of the type name with module paths stripped, used in
    /// cycle chains and graph output.
    pub fn short_name(&self) -> String {
        let short = strip_paths(self.display_name());
        match self.service_name() {
            Some(tag) => format!("{short}[{tag}]"),
            None => short,
        }
    }
}

fn strip_paths(type_name: &str) -> String {
    let mut out = String::with_capacity(type_name.len());
    let mut segment = String::new();
    for ch in type_name.chars() {
        if ch.is_alphanumeric() || ch == '_' || ch == ':' {
            segment.push(ch);
        } else {
            out.push_str(segment.rsplit("::").next().unwrap_or(&segment));
            segment.clear();
            out.push(ch);
        }
    }
    out.push_str(segment.rsplit("::").next().unwrap_or(&segment));
    out
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Type(_, name) => write!(f, "{name}"),
            Key::Named(_, name, tag) => write!(f, "{name}[{tag}]"),
        }
    }
}

impl PartialEq for Key {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Key::Type(a, _), Key::Type(b, _)) => a == b,
            (Key::Named(a, _, tag_a), Key::Named(b, _, tag_b)) => a == b && tag_a == tag_b,
            _ => false,
        }
    }
}

impl Eq for Key {}

impl Hash for Key {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Key::Type(id, _) => {
                0u8.hash(state);
                id.hash(state);
            }
            Key::Named(id, _, tag) => {
                1u8.hash(state);
                id.hash(state);
                tag.hash(state);
            }
        }
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Ordered by type name first so graph dumps read in a stable, human order.
impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        self.display_name()
            .cmp(other.display_name())
            .then_with(|| self.type_id().cmp(&other.type_id()))
            .then_with(|| self.service_name().cmp(&other.service_name()))
    }
}

#[inline]
pub fn key_of_type<T: ?Sized + 'static>() -> Key {
    Key::Type(TypeId::of::<T>(), std::any::type_name::<T>())
}

#[inline]
pub fn key_of_named<T: ?Sized + 'static>(name: impl Into<Cow<'static, str>>) -> Key {
    Key::Named(TypeId::of::<T>(), std::any::type_name::<T>(), name.into())
}
