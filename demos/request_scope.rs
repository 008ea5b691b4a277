//! Request-scoped services sharing one application-wide database.
//!
//! Run with `RUST_LOG=scopewire=debug cargo run --example request_scope` to
//! see construction and teardown as they happen.

use scopewire::{Container, Dependency, DiError, HookTable, Lifetime, Registration, Resolver, TracingObserver};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

struct Database {
    url: String,
    queries: AtomicU32,
}

impl Database {
    fn query(&self, sql: &str) -> String {
        let n = self.queries.fetch_add(1, Ordering::SeqCst) + 1;
        format!("[{} #{n}] {sql}", self.url)
    }
}

struct RequestContext {
    request_id: u32,
}

struct UserService {
    db: Arc<Database>,
    ctx: Arc<RequestContext>,
}

impl UserService {
    fn find_user(&self, id: u32) -> String {
        self.db
            .query(&format!("SELECT * FROM users WHERE id = {id} -- request {}", self.ctx.request_id))
    }
}

fn main() -> Result<(), DiError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let container = Container::new();
    container.add_observer(Arc::new(TracingObserver));

    container.register(
        Registration::factory::<Database, _>(vec![], |_| {
            Ok(Database {
                url: "postgres://localhost/app".to_string(),
                queries: AtomicU32::new(0),
            })
        })
        .singleton()
        .hooks(HookTable::new().method("close", |db: &Database| {
            println!("closing database after {} queries", db.queries.load(Ordering::SeqCst));
            Ok(())
        }))
        .destroy_hook("close"),
    )?;

    let next_id = AtomicU32::new(1);
    container.register_factory::<RequestContext, _>(Lifetime::request(), vec![], move |_| {
        Ok(RequestContext {
            request_id: next_id.fetch_add(1, Ordering::SeqCst),
        })
    })?;

    container.register_factory::<UserService, _>(
        Lifetime::request(),
        vec![Dependency::of::<Database>(), Dependency::of::<RequestContext>()],
        |inj| {
            Ok(UserService {
                db: inj.dependency(0)?,
                ctx: inj.dependency(1)?,
            })
        },
    )?;

    let report = container.validate();
    for warning in &report.warnings {
        println!("warning: {warning}");
    }
    report.into_result()?;

    for user_id in [7, 42] {
        container.scoped("request", |scope| {
            let users = scope.resolve::<UserService>()?;
            println!("{}", users.find_user(user_id));
            // Same request, same service instance.
            let again = scope.resolve::<UserService>()?;
            assert!(Arc::ptr_eq(&users, &again));
            Ok::<_, DiError>(())
        })?;
    }

    println!("{}", container.dependency_graph().to_dot());
    container.cleanup()
}
