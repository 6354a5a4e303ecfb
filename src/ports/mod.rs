//! Ports - Trait definitions for everything the pipeline calls out to.

pub mod ids;
pub mod repository;
pub mod storage;
pub mod transcoder;
