//! Bookshelf application library
//!
//! Application modules and the process lifecycle that wires them into the
//! HTTP server.

pub mod bootstrap;
pub mod modules;
