//! Structured-output gating between an LLM agent and real-world actions.
//!
//! An agent may *propose* actions; it can never *execute* them. Execution
//! requires a time-limited, revocable grant issued through an out-of-band
//! approval step. Three layers enforce this:
//!
//! ```text
//! agent output ──▶ schema::validate ──▶ gate::Gate ──▶ handler
//!                       (shape +                          │
//!                        invariants)                      ▼
//!                                              grants::GrantStore::validate
//!                                                  (token, action, owner)
//! ```
//!
//! The gate guarantees *shape and invariant* (no action is ever structurally
//! marked executable); the grant store guarantees *authorization* (a
//! specific, time-boxed, approved permission). Both must independently agree
//! before an action reaches its executor.

pub mod gate;
pub mod grants;
pub mod schema;

pub use gate::{ErrorBody, Gate, GateError, OutputType, ValidatedOutput};
pub use grants::{
    ExecuteGranted, GrantConfig, GrantError, GrantStore, IssueParams, DEFAULT_TTL_SECONDS,
};
pub use schema::{
    validate_decision, validate_plan_action, validate_plan_verification, Decision, FieldError,
    PlanAction, PlanVerification, ProposedAction,
};
