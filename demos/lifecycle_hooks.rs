//! Async init/destroy hooks, overrides and cycle reporting.

use async_trait::async_trait;
use scopewire::{
    AsyncInjectable, BoxError, Container, Dependencies, Dependency, DiError, HookTable, Lifetime, Registration,
    Resolver,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

struct Settings {
    broker: &'static str,
}

struct Broker {
    address: String,
    connected: AtomicBool,
}

impl Broker {
    async fn connect(self: Arc<Self>) -> Result<(), BoxError> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.connected.store(true, Ordering::SeqCst);
        println!("connected to {}", self.address);
        Ok(())
    }

    async fn disconnect(self: Arc<Self>) -> Result<(), BoxError> {
        self.connected.store(false, Ordering::SeqCst);
        println!("disconnected from {}", self.address);
        Ok(())
    }
}

#[async_trait]
impl AsyncInjectable for Broker {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::of::<Settings>()]
    }

    async fn construct(deps: Dependencies) -> Result<Self, BoxError> {
        let settings = deps.get::<Settings>(0)?;
        Ok(Broker {
            address: settings.broker.to_string(),
            connected: AtomicBool::new(false),
        })
    }

    fn hooks() -> HookTable<Self> {
        HookTable::new()
            .async_method("connect", Broker::connect)
            .async_method("disconnect", Broker::disconnect)
    }
}

struct Ping;
struct Pong;

#[tokio::main]
async fn main() -> Result<(), DiError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let container = Container::new();
    container.register_instance(Settings { broker: "amqp://localhost" })?;
    container.register(
        Registration::async_injectable::<Broker>()
            .singleton()
            .init_hook("connect")
            .destroy_hook("disconnect"),
    )?;

    // Initialized before anyone sees it.
    let broker = container.resolve_async::<Broker>().await?;
    assert!(broker.connected.load(Ordering::SeqCst));

    // Tests swap in a stand-in; the real singleton is untouched.
    {
        let _stub = container.override_provider(Registration::instance(Broker {
            address: "memory://".to_string(),
            connected: AtomicBool::new(true),
        }))?;
        println!("override: {}", container.resolve::<Broker>()?.address);
    }
    println!("after override: {}", container.resolve::<Broker>()?.address);

    // Cycles are reported with their full chain.
    container.register_factory::<Ping, _>(Lifetime::Transient, vec![Dependency::of::<Pong>()], |_| Ok(Ping))?;
    container.register_factory::<Pong, _>(Lifetime::Transient, vec![Dependency::of::<Ping>()], |_| Ok(Pong))?;
    if let Err(err) = container.resolve::<Ping>() {
        println!("{err}");
    }

    container.cleanup_async().await
}
