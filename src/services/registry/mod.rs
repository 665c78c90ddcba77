//! Registry service module
//!
//! This module contains the service registry implementation split into logical components:
//! - `types`: Data structures and type definitions
//! - `error`: Registry error type
//! - `clock`: Time source abstraction
//! - `service`: Core registry store and public API
//! - `cleanup`: Background expiration sweeper

pub mod clock;
pub mod error;
pub mod types;
pub mod service;
mod cleanup;

// Re-export public types for easier access
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::RegistryError;
pub use service::ServiceRegistry;
pub use types::{
    Liveness, Registration, RegistryConfig, RegistryEvent, RegistryStats, ServiceAddress,
    ServiceInstance,
};
