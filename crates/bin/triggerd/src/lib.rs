//! # triggerd
//!
//! Wiring for the trigger daemon: configuration loading, the built-in
//! operations scenes can run, and the feeder that turns observation lines
//! into tracker records and state events.
//!
//! The binary in `main.rs` only composes these pieces.

pub mod config;
pub mod feed;
pub mod operations;
