use scopewire::{Container, Dependency, DiError, HookTable, Lifetime, Registration, Resolver, ScopeName};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug)]
struct Database {
    url: String,
}

#[derive(Debug)]
struct UserService {
    db: Arc<Database>,
}

fn app_container() -> Container {
    let container = Container::new();
    container
        .register_factory::<Database, _>(Lifetime::Singleton, vec![], |_| {
            Ok(Database {
                url: "postgres://localhost/app".to_string(),
            })
        })
        .unwrap();
    container
        .register_factory::<UserService, _>(Lifetime::request(), vec![Dependency::of::<Database>()], |inj| {
            Ok(UserService { db: inj.dependency(0)? })
        })
        .unwrap();
    container
}

#[test]
fn test_request_scope_identity_and_isolation() {
    let container = app_container();

    let first = container.enter_scope(ScopeName::REQUEST).unwrap();
    let a1 = first.resolve::<UserService>().unwrap();
    let a2 = first.resolve::<UserService>().unwrap();
    assert!(Arc::ptr_eq(&a1, &a2));

    let second = container.enter_scope(ScopeName::REQUEST).unwrap();
    let b = second.resolve::<UserService>().unwrap();
    assert!(!Arc::ptr_eq(&a1, &b));

    // Both requests share the singleton database.
    assert!(Arc::ptr_eq(&a1.db, &b.db));
    assert!(Arc::ptr_eq(&a1.db, &container.resolve::<Database>().unwrap()));
    assert_eq!(a1.db.url, "postgres://localhost/app");

    first.exit().unwrap();
    second.exit().unwrap();
}

#[test]
fn test_database_user_service_scenario() {
    let container = app_container();

    let db_before = container.resolve::<Database>().unwrap();
    let services: Vec<Arc<UserService>> = (0..3)
        .map(|_| {
            container
                .scoped("request", |scope| {
                    let one = scope.resolve::<UserService>()?;
                    let two = scope.resolve::<UserService>()?;
                    assert!(Arc::ptr_eq(&one, &two));
                    Ok::<_, DiError>(one)
                })
                .unwrap()
        })
        .collect();

    for service in &services {
        assert!(Arc::ptr_eq(&service.db, &db_before));
    }
    assert!(!Arc::ptr_eq(&services[0], &services[1]));
    assert!(!Arc::ptr_eq(&services[1], &services[2]));
}

#[test]
fn test_scoped_value_outside_its_scope_is_a_scope_error() {
    let container = app_container();

    match container.resolve::<UserService>() {
        Err(DiError::Scope { key, message }) => {
            assert_eq!(key.map(|k| k.short_name()).as_deref(), Some("UserService"));
            assert!(message.contains("request"), "{message}");
        }
        other => panic!("expected scope error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_custom_scope_nested_in_request() {
    #[derive(Debug)]
    struct Tenant(usize);
    #[derive(Debug)]
    struct Job {
        tenant: Arc<Tenant>,
    }

    let tenants = Arc::new(AtomicUsize::new(0));
    let counter = tenants.clone();
    let container = Container::new();
    container
        .register_factory::<Tenant, _>(Lifetime::scoped("session"), vec![], move |_| {
            Ok(Tenant(counter.fetch_add(1, Ordering::SeqCst)))
        })
        .unwrap();
    container
        .register_factory::<Job, _>(Lifetime::request(), vec![Dependency::of::<Tenant>()], |inj| {
            Ok(Job { tenant: inj.dependency(0)? })
        })
        .unwrap();

    let session = container.enter_scope("session").unwrap();
    let request_a = session.enter_scope("request").unwrap();
    let request_b = session.enter_scope("request").unwrap();

    let job_a = request_a.resolve::<Job>().unwrap();
    let job_b = request_b.resolve::<Job>().unwrap();
    assert!(!Arc::ptr_eq(&job_a, &job_b));
    // The session value is found through the enclosing scope.
    assert!(Arc::ptr_eq(&job_a.tenant, &job_b.tenant));
    assert_eq!(tenants.load(Ordering::SeqCst), 1);

    request_a.exit().unwrap();
    request_b.exit().unwrap();
    session.exit().unwrap();
}

#[test]
fn test_singleton_cannot_capture_request_value() {
    #[derive(Debug)]
    struct RequestId;
    #[derive(Debug)]
    struct Cache;

    let container = Container::new();
    container
        .register_factory::<RequestId, _>(Lifetime::request(), vec![], |_| Ok(RequestId))
        .unwrap();
    container
        .register_factory::<Cache, _>(Lifetime::Singleton, vec![Dependency::of::<RequestId>()], |_| Ok(Cache))
        .unwrap();

    let scope = container.enter_scope("request").unwrap();
    // The singleton's dependencies resolve in the root scope, where no
    // request is active.
    assert!(matches!(scope.resolve::<Cache>(), Err(DiError::Scope { .. })));
    scope.exit().unwrap();
}

#[test]
fn test_exit_with_active_child_is_rejected() {
    let container = Container::new();
    let outer = container.enter_scope("session").unwrap();
    let inner = outer.enter_scope("request").unwrap();

    assert!(matches!(outer.exit(), Err(DiError::Scope { .. })));
    inner.exit().unwrap();
    container.cleanup().unwrap();
}

#[test]
fn test_rejected_exit_closes_with_the_last_child() {
    #[derive(Debug)]
    struct Cart;
    #[derive(Debug)]
    struct Line;

    let log = Arc::new(Mutex::new(Vec::new()));
    let logger = |name: &'static str| {
        let log = log.clone();
        move || log.lock().unwrap().push(name)
    };
    let (close_cart, close_line) = (logger("close cart"), logger("close line"));
    let container = Container::new();
    container
        .register(
            Registration::factory::<Cart, _>(vec![], |_| Ok(Cart))
                .scoped("session")
                .hooks(HookTable::new().method("close", move |_: &Cart| Ok(close_cart())))
                .destroy_hook("close"),
        )
        .unwrap();
    container
        .register(
            Registration::factory::<Line, _>(vec![], |_| Ok(Line))
                .request_scoped()
                .hooks(HookTable::new().method("close", move |_: &Line| Ok(close_line())))
                .destroy_hook("close"),
        )
        .unwrap();

    let outer = container.enter_scope("session").unwrap();
    let first = outer.enter_scope("request").unwrap();
    let second = outer.enter_scope("request").unwrap();
    outer.resolve::<Cart>().unwrap();
    first.resolve::<Line>().unwrap();
    second.resolve::<Line>().unwrap();

    assert!(matches!(outer.exit(), Err(DiError::Scope { .. })));
    assert!(log.lock().unwrap().is_empty());

    // The session stays usable from its nested scopes but takes no new ones.
    second.resolve::<Cart>().unwrap();
    assert!(matches!(second.enter_scope("request"), Err(DiError::Scope { .. })));
    assert!(matches!(container.cleanup(), Err(DiError::Scope { .. })));

    first.exit().unwrap();
    assert_eq!(*log.lock().unwrap(), ["close line"]);
    second.exit().unwrap();
    assert_eq!(*log.lock().unwrap(), ["close line", "close line", "close cart"]);

    container.cleanup().unwrap();
}

#[test]
fn test_dropped_parent_closes_with_its_child() {
    let container = Container::new();
    let outer = container.enter_scope("session").unwrap();
    let inner = outer.enter_scope("request").unwrap();
    drop(outer);
    inner.exit().unwrap();
    container.cleanup().unwrap();
}

#[test]
fn test_exit_after_children_exit() {
    let container = Container::new();
    let outer = container.enter_scope("session").unwrap();
    let inner = outer.enter_scope("request").unwrap();

    inner.exit().unwrap();
    outer.exit().unwrap();
}

#[test]
fn test_app_scope_cannot_be_entered() {
    let container = Container::new();
    assert!(matches!(container.enter_scope(ScopeName::APP), Err(DiError::Scope { .. })));
}

#[test]
fn test_scope_stack_enforces_name_order() {
    let container = app_container();
    let mut stack = container.scope_stack();

    assert!(matches!(stack.exit("request"), Err(DiError::Scope { .. })));

    stack.enter("session").unwrap();
    stack.enter("request").unwrap();
    assert_eq!(stack.depth(), 2);
    assert_eq!(stack.current().map(|s| s.name().as_str()), Some("request"));

    let service = stack.resolve::<UserService>().unwrap();
    assert!(Arc::ptr_eq(&service, &stack.resolve::<UserService>().unwrap()));

    assert!(matches!(stack.exit("session"), Err(DiError::Scope { .. })));
    assert_eq!(stack.depth(), 2);

    stack.exit("request").unwrap();
    assert!(matches!(stack.resolve::<UserService>(), Err(DiError::Scope { .. })));
    stack.exit("session").unwrap();
    assert_eq!(stack.depth(), 0);
}

#[test]
fn test_resolver_handle_fails_after_exit() {
    let container = app_container();
    let scope = container.enter_scope("request").unwrap();
    let handle = scope.resolver();
    assert!(handle.resolve::<UserService>().is_ok());

    scope.exit().unwrap();
    assert!(matches!(handle.resolve::<UserService>(), Err(DiError::Scope { .. })));
}

#[test]
fn test_scoped_helper_exits_on_error() {
    #[derive(Debug)]
    struct Flag;

    let container = Container::new();
    container
        .register_factory::<Flag, _>(Lifetime::request(), vec![], |_| Ok(Flag))
        .unwrap();

    let mut leaked = None;
    let result: Result<(), DiError> = container.scoped("request", |scope| {
        leaked = Some(scope.resolver());
        scope.resolve::<Flag>()?;
        Err(DiError::Scope {
            key: None,
            message: "handler failed".to_string(),
        })
    });
    assert!(result.is_err());

    let handle = leaked.unwrap();
    assert!(matches!(handle.resolve::<Flag>(), Err(DiError::Scope { .. })));
}

#[test]
fn test_cleanup_closes_the_container() {
    let container = app_container();
    container.resolve::<Database>().unwrap();

    container.cleanup().unwrap();
    container.cleanup().unwrap();
    assert!(matches!(container.resolve::<Database>(), Err(DiError::Scope { .. })));
}
