//! Harmonia assistant service: HTTP surface and configuration
//!
//! The binary in `main.rs` wires these together with the pipeline from
//! `assistant-lib`.

pub mod api;
pub mod config;
