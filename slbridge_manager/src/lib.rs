//! slbridge Manager Library
//!
//! Command implementations behind the `slbridge` binary.

pub mod commands;
pub mod config;
