pub mod artifact;
pub mod estimator;
pub mod handle;
pub mod loader;

pub use handle::{ModelHandle, ModelInfo, ModelState};
