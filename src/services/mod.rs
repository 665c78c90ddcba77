pub mod registry;

pub use registry::{
    Registration, RegistryConfig, RegistryError, RegistryEvent, ServiceAddress, ServiceInstance,
    ServiceRegistry,
};
