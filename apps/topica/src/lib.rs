//! # Topica
//!
//! The command-line front end of the Topica topic map engine.
//!
//! The binary in `main.rs` only installs logging and dispatches; command
//! logic and configuration live here so they can be tested directly.

pub mod cli;
pub mod config;
