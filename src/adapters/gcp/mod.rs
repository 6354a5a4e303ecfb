//! Google Cloud adapters: Cloud Storage objects and Transcoder API jobs.

pub mod auth;
pub mod gcs;
pub mod transcoder;

pub use auth::AccessTokenSource;
pub use gcs::GcsStorage;
pub use transcoder::GcpTranscoderApi;
