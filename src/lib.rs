pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::{cli::LocalStorage, CliConfig};

pub use app::units::{default_assembler, default_units};
pub use config::{toml_config::TomlConfig, ExternalConfig};
pub use core::{assembler::Assembler, synth::AssemblyWriter, topology::Topology};
pub use domain::schema::RequestSchema;
pub use utils::error::{Result, StackError};
