#![cfg(feature = "config")]

use scopewire::{
    BoxError, Catalog, Container, ContainerConfig, DiError, HookTable, Injectable, Injector, Lifetime,
    Registration, Resolver,
};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

trait Storage: Send + Sync {
    fn kind(&self) -> &'static str;
}

#[derive(Debug)]
struct FileStorage;
impl Storage for FileStorage {
    fn kind(&self) -> &'static str {
        "file"
    }
}

#[derive(Debug)]
struct MemoryStorage;
impl Storage for MemoryStorage {
    fn kind(&self) -> &'static str {
        "memory"
    }
}

#[derive(Debug, Default)]
struct Clock {
    started: AtomicBool,
}

impl Clock {
    fn start(&self) -> Result<(), BoxError> {
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl Injectable for Clock {
    fn construct(_: &mut Injector<'_>) -> Result<Self, BoxError> {
        Ok(Clock::default())
    }

    fn hooks() -> HookTable<Self> {
        HookTable::new().method("start", Clock::start)
    }
}

fn catalog() -> Catalog {
    Catalog::new()
        .injectable::<Clock>("Clock")
        .interface::<Arc<dyn Storage>>("Storage")
        .template("FileStorage", || {
            Registration::factory::<Arc<dyn Storage>, _>(vec![], |_| Ok(Arc::new(FileStorage) as Arc<dyn Storage>))
        })
        .template("MemoryStorage", || {
            Registration::factory::<Arc<dyn Storage>, _>(vec![], |_| Ok(Arc::new(MemoryStorage) as Arc<dyn Storage>))
        })
}

fn write_file(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_yaml_file_registers_dependencies() {
    let file = write_file(
        ".yaml",
        r#"
dependencies:
  Storage:
    implementation: MemoryStorage
    scope: request
  Clock:
    init_hook: start
"#,
    );

    let config = ContainerConfig::from_file(file.path()).unwrap();
    let container = config.build(&catalog()).unwrap();

    let clock = container.resolve::<Clock>().unwrap();
    assert!(clock.started.load(Ordering::SeqCst));
    assert!(Arc::ptr_eq(&clock, &container.resolve::<Clock>().unwrap()));

    assert!(matches!(container.resolve_shared::<dyn Storage>(), Err(DiError::Scope { .. })));
    let scope = container.enter_scope("request").unwrap();
    assert_eq!(scope.resolve_shared::<dyn Storage>().unwrap().kind(), "memory");
    scope.exit().unwrap();
}

#[test]
fn test_json_file_with_options() {
    let file = write_file(
        ".json",
        r#"{
            "options": { "allow_overwrite": false },
            "dependencies": { "Storage": { "implementation": "FileStorage", "scope": "transient" } }
        }"#,
    );

    let config = ContainerConfig::from_file(file.path()).unwrap();
    assert!(!config.options.allow_overwrite);

    let container = config.build(&catalog()).unwrap();
    let registration = container.lookup(&scopewire::key_of_type::<Arc<dyn Storage>>()).unwrap();
    assert_eq!(*registration.lifetime(), Lifetime::Transient);
    assert_eq!(container.resolve_shared::<dyn Storage>().unwrap().kind(), "file");

    // Applying again would overwrite, which these options forbid.
    assert!(matches!(config.apply(&container, &catalog()), Err(DiError::Configuration { .. })));
}

#[test]
fn test_missing_file_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = ContainerConfig::from_file(dir.path().join("absent.yaml")).unwrap_err();
    assert!(matches!(&err, DiError::Configuration { message, .. } if message.contains("not found")));
}

#[test]
fn test_malformed_yaml_is_a_configuration_error() {
    let file = write_file(".yml", "dependencies:\n  Clock: [unclosed\n");
    assert!(matches!(
        ContainerConfig::from_file(file.path()),
        Err(DiError::Configuration { .. })
    ));
}

#[test]
fn test_file_without_dependencies_registers_nothing() {
    let file = write_file(".yaml", "options:\n  max_depth: 32\n");
    let container = ContainerConfig::from_file(file.path()).unwrap().build(&catalog()).unwrap();
    assert!(container.is_empty());
    assert_eq!(container.options().max_depth, 32);
}

#[test]
fn test_unknown_names_are_reported_with_the_entry() {
    let container = Container::new();

    let config = ContainerConfig::from_yaml_str("dependencies:\n  Mailer: {}\n").unwrap();
    let err = config.apply(&container, &catalog()).unwrap_err();
    assert!(err.to_string().contains("'Mailer'"), "{err}");

    let config = ContainerConfig::from_yaml_str("dependencies:\n  Storage:\n    implementation: S3Storage\n").unwrap();
    let err = config.apply(&container, &catalog()).unwrap_err();
    assert!(err.to_string().contains("S3Storage"), "{err}");
}

#[test]
fn test_implementation_must_provide_the_interface() {
    let config = ContainerConfig::from_yaml_str("dependencies:\n  Storage:\n    implementation: Clock\n").unwrap();
    let err = config.apply(&Container::new(), &catalog()).unwrap_err();
    assert!(matches!(err, DiError::Configuration { .. }));
}

#[test]
fn test_options_from_environment() {
    std::env::set_var("SWCFG_MAX_DEPTH", "12");
    let options = scopewire::ContainerOptions::from_env("SWCFG").unwrap();
    assert_eq!(options.max_depth, 12);
    std::env::remove_var("SWCFG_MAX_DEPTH");
}
