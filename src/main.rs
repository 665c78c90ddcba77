use service_registry::config::Config;
use service_registry::{Registration, ServiceAddress, ServiceRegistry};
use tracing_subscriber::EnvFilter;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load()?;
    let registry = ServiceRegistry::new(config.registry_config()?)?;

    let demo_instances = [
        ("user-service", "user-service-1", "10.0.1.10", 8001, "v1.0.0", "us-east-1"),
        ("user-service", "user-service-2", "10.0.1.11", 8001, "v1.0.0", "us-east-1"),
        ("order-service", "order-service-1", "10.0.2.10", 8002, "v2.0.0", "us-west-2"),
    ];
    for (service_name, id, host, port, version, region) in demo_instances {
        registry.register(
            Registration::new(service_name, id, ServiceAddress::new(host, port))
                .with_metadata("version", version)
                .with_metadata("region", region),
        )?;
    }

    println!("Service discovery:");
    let user_services = registry.discover("user-service")?;
    println!("  Found {} instances of user-service:", user_services.len());
    for instance in &user_services {
        println!("    - {} ({}) [{:?}]", instance.id, instance.address, instance.liveness);
    }

    registry.heartbeat("user-service", "user-service-1")?;

    println!("All services:");
    for (name, instances) in registry.list_all() {
        println!("  {}: {} instances", name, instances.len());
    }

    let stats = registry.stats();
    println!(
        "{} services, {} active instances",
        stats.registered_services, stats.active_instances
    );

    registry.shutdown().await;
    Ok(())
}
