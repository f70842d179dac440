// hostdb: re-host prebuilt database binaries as uniform, verified archives

pub mod build;
pub mod cli;
pub mod commands;
pub mod config;
pub mod constants;
pub mod databases;
pub mod error;
pub mod extract;
pub mod metadata;
pub mod pipeline;
pub mod platform;
pub mod repackage;
pub mod sources;
pub mod tools;
pub mod ui;
pub mod version;

pub use error::{HostdbError, Result};
