use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_stream::StreamExt;

use service_registry::{
    Liveness, ManualClock, Registration, RegistryConfig, RegistryEvent, ServiceAddress,
    ServiceRegistry,
};

fn instance(id: &str) -> Registration {
    Registration::new("orders", id, ServiceAddress::new("10.0.0.1", 9000))
}

#[tokio::test]
async fn test_background_sweeper_evicts_stale_instances() {
    let config = RegistryConfig::new(Duration::from_millis(200))
        .with_sweep_interval(Duration::from_millis(50));
    let registry = ServiceRegistry::new(config).expect("Failed to create registry");

    registry.register(instance("i-1")).expect("Failed to register");
    assert!(registry.discover("orders").is_ok());

    sleep(Duration::from_millis(600)).await;

    let err = registry.discover("orders").expect_err("stale instance should be swept");
    assert!(err.is_not_found());
    assert_eq!(registry.stats().active_instances, 0);

    registry.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_heartbeats_keep_instance_alive_across_sweeps() {
    let config = RegistryConfig::new(Duration::from_millis(300))
        .with_sweep_interval(Duration::from_millis(20));
    let registry = ServiceRegistry::new(config).expect("Failed to create registry");
    registry.register(instance("i-1")).expect("Failed to register");

    let heartbeater = {
        let registry = registry.clone();
        tokio::spawn(async move {
            for _ in 0..30 {
                registry
                    .heartbeat("orders", "i-1")
                    .expect("instance must not be evicted while heartbeating");
                sleep(Duration::from_millis(20)).await;
            }
        })
    };

    heartbeater.await.expect("heartbeat task panicked");
    assert_eq!(registry.discover("orders").map(|v| v.len()).ok(), Some(1));

    registry.shutdown().await;
}

#[tokio::test]
async fn test_registry_events() {
    let clock = Arc::new(ManualClock::default());
    let ttl = Duration::from_secs(30);
    let registry = ServiceRegistry::with_clock(RegistryConfig::new(ttl), clock.clone())
        .expect("Failed to create registry");
    let mut events = registry.subscribe();

    registry.register(instance("i-1")).expect("Failed to register");
    registry.register(instance("i-1")).expect("Failed to re-register");
    registry.register(instance("i-2")).expect("Failed to register");
    registry.deregister("orders", "i-1").expect("Failed to deregister");
    clock.advance(ttl);
    registry.evict_expired();

    match events.try_recv().expect("registered event") {
        RegistryEvent::Registered { instance, replaced } => {
            assert_eq!(instance.id, "i-1");
            assert!(!replaced);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    match events.try_recv().expect("re-registered event") {
        RegistryEvent::Registered { replaced, .. } => assert!(replaced),
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(matches!(
        events.try_recv().expect("second instance event"),
        RegistryEvent::Registered { replaced: false, .. }
    ));
    match events.try_recv().expect("deregistered event") {
        RegistryEvent::Deregistered { instance } => {
            assert_eq!(instance.id, "i-1");
            assert_eq!(instance.liveness, Liveness::Evicted);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    match events.try_recv().expect("evicted event") {
        RegistryEvent::Evicted { instance } => {
            assert_eq!(instance.id, "i-2");
            assert_eq!(instance.liveness, Liveness::Evicted);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_watch_stream_receives_events() {
    let registry = ServiceRegistry::new(RegistryConfig::new(Duration::from_secs(60)))
        .expect("Failed to create registry");
    let mut stream = Box::pin(registry.watch());

    registry.register(instance("i-1")).expect("Failed to register");

    let event = timeout(Duration::from_secs(1), stream.next())
        .await
        .expect("Timeout waiting for event")
        .expect("Stream ended unexpectedly");
    assert_eq!(event.instance().id, "i-1");

    registry.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_stops_sweeper_but_keeps_store() {
    let config = RegistryConfig::new(Duration::from_millis(100))
        .with_sweep_interval(Duration::from_millis(20));
    let registry = ServiceRegistry::new(config).expect("Failed to create registry");
    assert!(!registry.is_shut_down());

    timeout(Duration::from_secs(1), registry.shutdown())
        .await
        .expect("sweeper should stop promptly");
    assert!(registry.is_shut_down());

    // 清理任务停止后不会再驱逐实例
    registry.register(instance("i-1")).expect("Failed to register");
    sleep(Duration::from_millis(250)).await;
    assert!(registry.discover("orders").is_ok());

    // 手动清理仍然可用
    assert_eq!(registry.evict_expired().len(), 1);
}
