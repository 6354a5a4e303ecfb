//! Audio/Video domain modules.

pub mod cmd;
pub mod stream;
pub mod thumbnails;
