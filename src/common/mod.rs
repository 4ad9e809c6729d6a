pub mod error;
pub mod format;
pub mod json;
pub mod random;

pub use error::{PanelError, PanelErrorKind, Result};
pub use random::{RandomSource, ThreadRandom};
