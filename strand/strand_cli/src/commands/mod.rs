//! Subcommands of the `strand` binary.

pub mod config;
pub mod run;
