//! Deterministic, pure logic for the mission runtime.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! values (mission definitions, run snapshots, policy) and return new values,
//! so identical inputs always produce identical outputs.

pub mod canonical;
pub mod decision;
pub mod error;
pub mod escalation;
pub mod events;
pub mod invariants;
pub mod mission;
pub mod planner;
pub mod policy;
pub mod raci;
pub mod significance;
pub mod snapshot;
pub mod types;
