//! Adapters - Concrete implementations of ports.

#[cfg(feature = "gcp")]
pub mod gcp;

pub mod local;
