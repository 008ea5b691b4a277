use scopewire::{
    key_of_named, key_of_type, BoxError, Container, ContainerOptions, Dependency, DiError, Injectable, Injector,
    Lifetime, Registration, Resolver,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn test_instance_is_a_singleton() {
    let container = Container::new();
    container.register_instance(42usize).unwrap();
    container.register_instance("hello".to_string()).unwrap();

    let num1 = container.resolve::<usize>().unwrap();
    let num2 = container.resolve::<usize>().unwrap();
    let str1 = container.resolve::<String>().unwrap();

    assert_eq!(*num1, 42);
    assert_eq!(*str1, "hello");
    assert!(Arc::ptr_eq(&num1, &num2));
}

#[test]
fn test_singleton_provider_runs_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let container = Container::new();
    container
        .register_factory::<Vec<u8>, _>(Lifetime::Singleton, vec![], move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(vec![1, 2, 3])
        })
        .unwrap();

    let a = container.resolve::<Vec<u8>>().unwrap();
    let b = container.resolve::<Vec<u8>>().unwrap();
    let scope = container.enter_scope("request").unwrap();
    let c = scope.resolve::<Vec<u8>>().unwrap();
    scope.exit().unwrap();

    assert!(Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&a, &c));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_transient_creates_new_instances() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let container = Container::new();
    container
        .register_factory::<String, _>(Lifetime::Transient, vec![], move |_| {
            Ok(format!("instance-{}", counter.fetch_add(1, Ordering::SeqCst)))
        })
        .unwrap();

    let a = container.resolve::<String>().unwrap();
    let b = container.resolve::<String>().unwrap();

    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(*a, "instance-0");
    assert_eq!(*b, "instance-1");
}

#[test]
fn test_factory_with_dependencies() {
    #[derive(Debug)]
    struct Config {
        port: u16,
    }

    #[derive(Debug)]
    struct Server {
        config: Arc<Config>,
        name: String,
    }

    let container = Container::new();
    container.register_instance(Config { port: 8080 }).unwrap();
    container
        .register_factory::<Server, _>(Lifetime::Singleton, vec![Dependency::of::<Config>()], |inj| {
            Ok(Server {
                config: inj.dependency(0)?,
                name: "MyServer".to_string(),
            })
        })
        .unwrap();

    let server = container.resolve::<Server>().unwrap();
    assert_eq!(server.config.port, 8080);
    assert_eq!(server.name, "MyServer");
}

#[test]
fn test_unregistered_key_is_a_resolution_error() {
    #[derive(Debug)]
    struct Unknown;

    let container = Container::new();
    match container.resolve::<Unknown>() {
        Err(DiError::Resolution { key, .. }) => assert_eq!(key, key_of_type::<Unknown>()),
        other => panic!("expected resolution error, got {:?}", other.map(|_| ())),
    }
    assert!(!container.is_registered(&key_of_type::<Unknown>()));
    assert!(matches!(
        container.lookup(&key_of_type::<Unknown>()),
        Err(DiError::Resolution { .. })
    ));
}

#[derive(Debug)]
struct Clock {
    tick: u64,
}

impl Injectable for Clock {
    fn construct(_: &mut Injector<'_>) -> Result<Self, BoxError> {
        Ok(Clock { tick: 7 })
    }
}

#[derive(Debug)]
struct Scheduler {
    clock: Arc<Clock>,
}

impl Injectable for Scheduler {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::auto::<Clock>()]
    }

    fn construct(inj: &mut Injector<'_>) -> Result<Self, BoxError> {
        Ok(Scheduler { clock: inj.dependency(0)? })
    }
}

#[test]
fn test_auto_construction_of_unregistered_shapes() {
    let container = Container::new();

    let a = container.resolve_auto::<Scheduler>().unwrap();
    let b = container.resolve_auto::<Scheduler>().unwrap();

    assert_eq!(a.clock.tick, 7);
    // Implicit construction is transient.
    assert!(!Arc::ptr_eq(&a, &b));
    assert!(!Arc::ptr_eq(&a.clock, &b.clock));
    assert!(container.is_empty());
}

#[test]
fn test_registered_shape_wins_over_auto_construction() {
    let container = Container::new();
    container.register_type::<Clock>(Lifetime::Singleton).unwrap();

    let a = container.resolve_auto::<Scheduler>().unwrap();
    let b = container.resolve_auto::<Scheduler>().unwrap();
    assert!(Arc::ptr_eq(&a.clock, &b.clock));
}

#[test]
fn test_plain_resolve_does_not_auto_construct() {
    let container = Container::new();
    assert!(matches!(container.resolve::<Clock>(), Err(DiError::Resolution { .. })));
}

#[test]
fn test_named_registrations_are_distinct() {
    let container = Container::new();
    container
        .register(Registration::instance("primary-db".to_string()).named("primary"))
        .unwrap();
    container
        .register(Registration::instance("replica-db".to_string()).named("replica"))
        .unwrap();

    assert_eq!(*container.resolve_named::<String>("primary").unwrap(), "primary-db");
    assert_eq!(*container.resolve_named::<String>("replica").unwrap(), "replica-db");
    assert!(container.resolve::<String>().is_err());
    assert!(container.is_registered(&key_of_named::<String>("primary")));
}

#[test]
fn test_named_dependency() {
    #[derive(Debug)]
    struct Repo {
        url: Arc<String>,
    }

    let container = Container::new();
    container
        .register(Registration::instance("replica".to_string()).named("ro"))
        .unwrap();
    container
        .register_factory::<Repo, _>(Lifetime::Transient, vec![Dependency::named::<String>("ro")], |inj| {
            Ok(Repo { url: inj.dependency(0)? })
        })
        .unwrap();

    assert_eq!(*container.resolve::<Repo>().unwrap().url, "replica");
}

#[test]
fn test_later_registration_replaces_earlier() {
    let container = Container::new();
    container.register_instance(1u32).unwrap();
    container.register_instance(2u32).unwrap();

    assert_eq!(*container.resolve::<u32>().unwrap(), 2);
    assert_eq!(container.len(), 1);
}

#[test]
fn test_overwrite_can_be_disabled() {
    let container = Container::with_options(ContainerOptions::default().with_allow_overwrite(false));
    container.register_instance(1u32).unwrap();

    assert!(matches!(
        container.register_instance(2u32),
        Err(DiError::Configuration { .. })
    ));
    assert_eq!(*container.resolve::<u32>().unwrap(), 1);
}

#[test]
fn test_provider_failure_is_wrapped_with_key() {
    let container = Container::new();
    container
        .register_factory::<u64, _>(Lifetime::Singleton, vec![], |_| Err("disk full".into()))
        .unwrap();

    let err = container.resolve::<u64>().unwrap_err();
    match &err {
        DiError::Provider(scopewire::ProviderError::Construction { key, source }) => {
            assert_eq!(*key, key_of_type::<u64>());
            assert_eq!(source.to_string(), "disk full");
        }
        other => panic!("unexpected error: {other}"),
    }
    // Nothing was cached; a later attempt runs the provider again.
    assert!(container.resolve::<u64>().is_err());
}

#[test]
fn test_nested_lookup_errors_pass_through_providers() {
    #[derive(Debug)]
    struct Missing;
    #[derive(Debug)]
    struct Wrapper;

    let container = Container::new();
    container
        .register_factory::<Wrapper, _>(Lifetime::Transient, vec![], |inj| {
            inj.resolve::<Missing>()?;
            Ok(Wrapper)
        })
        .unwrap();

    match container.resolve::<Wrapper>() {
        Err(DiError::Resolution { key, .. }) => assert_eq!(key, key_of_type::<Missing>()),
        other => panic!("expected resolution error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_trait_objects_through_shared_registration() {
    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    #[derive(Debug)]
    struct English;
    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    let container = Container::new();
    container
        .register_factory::<Arc<dyn Greeter>, _>(Lifetime::Singleton, vec![], |_| {
            Ok(Arc::new(English) as Arc<dyn Greeter>)
        })
        .unwrap();

    let greeter = container.resolve_shared::<dyn Greeter>().unwrap();
    assert_eq!(greeter.greet(), "hello");
}

#[test]
fn test_registration_introspection() {
    #[derive(Debug)]
    struct Db;

    let container = Container::new();
    container
        .register(
            Registration::factory::<Db, _>(vec![Dependency::of::<u8>()], |_| Ok(Db))
                .request_scoped()
                .init_hook("connect")
                .destroy_hook("close"),
        )
        .unwrap();

    let registration = container.lookup(&key_of_type::<Db>()).unwrap();
    assert_eq!(*registration.lifetime(), Lifetime::request());
    assert_eq!(registration.init_hook_name(), Some("connect"));
    assert_eq!(registration.destroy_hook_name(), Some("close"));
    assert_eq!(registration.dependencies().len(), 1);
    assert!(!registration.is_async());
    assert_eq!(container.registrations().len(), 1);
}
