pub mod docx;
pub mod queue;
pub mod renderer;
pub mod storage;
