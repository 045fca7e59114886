//! Stable exit codes for `mission` CLI commands.

/// Command succeeded, or `mission next` issued a step.
pub const OK: i32 = 0;
/// Invalid mission, policy, run id, answer or actor, or any other error.
pub const INVALID: i32 = 1;
/// `mission next` found every step complete.
pub const TERMINAL: i32 = 2;
/// The run is blocked, or a required RACI role could not be bound.
pub const BLOCKED: i32 = 3;
/// `mission next` is waiting on an input or audit decision.
pub const DECISION_REQUIRED: i32 = 4;
