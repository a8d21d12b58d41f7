//! # trigger-domain
//!
//! Pure domain model for the conditional trigger engine.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **state trackers** (last time and last value of a named signal)
//! - Define **condition trees** and the boolean expression language that
//!   compiles into them
//! - Define **scenes** (condition → cooldown → ordered operations)
//! - Define **events** (state-change notifications)
//! - Contain all invariant enforcement and domain logic
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app` or external IO crates.
//! Everything that runs, waits or spawns is expressed as a trait in the
//! `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod condition;
pub mod event;
pub mod scene;
pub mod state;
