//! Application layer - Services that drive the domain through ports.

pub mod cloud_client;
pub mod ingest;
pub mod local_worker;
pub mod orchestrator;
pub mod retry;
