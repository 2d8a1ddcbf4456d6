pub mod format;
pub mod job;
pub mod render;
