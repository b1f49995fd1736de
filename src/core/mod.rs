pub mod assembler;
pub mod assets;
pub mod graph;
pub mod synth;
pub mod topology;

pub use crate::domain::ports::{Storage, Unit};
pub use crate::utils::error::Result;
