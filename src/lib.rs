pub mod config;
pub mod services;

pub use services::registry::{
    Clock, Liveness, ManualClock, Registration, RegistryConfig, RegistryError, RegistryEvent,
    RegistryStats, ServiceAddress, ServiceInstance, ServiceRegistry, SystemClock,
};
