//! Core services.

pub mod backend_factory;
pub mod throttle;

pub use backend_factory::BackendFactory;
