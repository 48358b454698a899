pub mod format;
pub mod renderer;
pub mod wire;
