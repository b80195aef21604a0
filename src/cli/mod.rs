//! CLI module for gridtutor
//!
//! Handles command-line argument parsing and terminal rendering.

pub mod args;
pub mod display;

pub use args::{Args, Commands, QueryArgs, Verbosity};
