//! CLI module for querydoc.
//!
//! Provides command-line interface parsing and command dispatch.

pub mod args;
pub mod commands;

pub use args::{Cli, Commands, QueryArgs, QueryTarget, RetrievalArgs, ServeArgs};
