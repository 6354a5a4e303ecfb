//! Local adapters for single-host deployment and tests.

pub mod fs;
pub mod memory;

pub use fs::FsBucket;
pub use memory::InMemoryVideoRepository;
