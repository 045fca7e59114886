//! Deterministic mission runtime with RACI authority and significance gates.
//!
//! A mission is a DAG of ordinary steps and audit checkpoints. Given a run
//! snapshot, the runtime decides what happens next: issue a step, ask for a
//! decision, report the run blocked, or report it complete. The architecture
//! enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (planning, authority binding,
//!   significance scoring, decision answers, timeout escalation). No I/O and no
//!   clock, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (policy and mission files, run
//!   store, JSONL event log, decision rendering).
//!
//! [`engine`] coordinates core transitions with the run store to implement
//! the CLI commands.

pub mod core;
pub mod engine;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
