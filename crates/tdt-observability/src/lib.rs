// Copyright 2025 TDT Queue Contributors
// SPDX-License-Identifier: Apache-2.0

//! # tdt-observability
//!
//! Logging setup shared by the TDT crates and tools, with per-crate debug
//! flag support.
//!
//! ## Features
//! - `file-logging`: daily-rotated JSON log files next to the console output

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod init;

pub use cli::*;
pub use init::*;

/// Known crate names for debug flags
pub const KNOWN_CRATES: &[&str] = &["tdt", "tdt-queue", "tdt-config"];
