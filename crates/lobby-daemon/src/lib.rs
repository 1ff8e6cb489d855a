//! Lobby Daemon library
//!
//! This module provides the core components for the lobby daemon:
//! - Layered configuration
//! - The JSON-line console
//! - Server lifecycle management

pub mod config;
pub mod console;
pub mod error;
pub mod server;

pub use config::DaemonConfig;
pub use console::{Command, Console};
pub use error::{DaemonError, DaemonResult};
pub use server::Server;
