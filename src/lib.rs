//! PADDOCK — Race Wagering Ledger & Settlement Engine
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod actions;
pub mod config;
pub mod engine;
pub mod seed;
pub mod server;
pub mod store;
pub mod types;
