//! testrelay CLI
//!
//! Command implementations behind the `testrelay` binary.

pub mod commands;
pub mod output;
