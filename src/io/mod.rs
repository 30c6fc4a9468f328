//! Model I/O and atomic file writes
//!
//! Each fold saves its restored best model next to its predictions, in one
//! of several serialization formats.

mod format;
mod load;
mod model;
mod save;

pub use format::{ModelFormat, SaveConfig};
pub use load::load_model;
pub use model::{Model, ModelMetadata, ModelState, ParameterInfo};
pub use save::{save_model, write_atomic};
