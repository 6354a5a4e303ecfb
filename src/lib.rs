//! ZedTube - Video ingestion library
//!
//! Hexagonal Architecture:
//! - domain/: Pure media logic (estimates, probing, thumbnails, job configs)
//! - ports/: Trait definitions for storage, transcode jobs, records and ids
//! - adapters/: Concrete implementations (local filesystem, in-memory, GCP)
//! - application/: Local worker, cloud client, orchestrator and ingest service
//! - config: Environment configuration
//! - error: Tagged ingestion failures
//!
//! # Features
//! - `gcp` (default): Cloud Storage and Transcoder API adapters

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;

pub use application::ingest::{IngestReceipt, IngestService};
pub use config::{CloudConfig, IngestConfig};
pub use domain::av;
pub use error::{FailureKind, IngestError};
