//! Agent message schemas and validation.
//!
//! Three message kinds flow through the approval sequence: `PlanAction`
//! (propose), `PlanVerification` (independently check), `Decision`
//! (adjudicate). Validation is pure and stateless: each entry point takes an
//! untyped `serde_json::Value` and returns either the typed message or every
//! field violation at once. Nothing is ever partially accepted.

mod model;
mod validate;

pub use model::{
    ActionKind, CheckResult, CheckStatus, Decision, GrantMethod, LegalCheck, NeededData,
    NeverExecutable, PlanAction, PlanVerification, Precondition, ProposedAction, RiskLevel,
    VerificationChecks, MAX_NEXT_QUESTIONS,
};
pub use validate::{
    codes, validate_decision, validate_plan_action, validate_plan_verification, FieldError,
};
