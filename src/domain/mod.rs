//! Domain layer - Pure business logic.

pub mod av;
pub mod estimate;
pub mod jobs;
pub mod media;
