//! Typed message model for the plan/verify/decide sequence.
//!
//! The model is deliberately incapable of expressing an executable action:
//! `ProposedAction::can_execute` is the [`NeverExecutable`] marker, which
//! deserializes only from literal `false` and serializes back to `false`.
//! Authorization lives exclusively in the grant store.

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;

/// Hard cap on follow-up questions in a [`Decision`].
pub const MAX_NEXT_QUESTIONS: usize = 3;

/// What a proposed action does.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Analysis,
    Order,
    Payment,
    Document,
    Task,
}

impl ActionKind {
    /// Closed set of wire names, for membership checks and error messages.
    pub const MEMBERS: [&'static str; 5] = ["analysis", "order", "payment", "document", "task"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::Order => "order",
            Self::Payment => "payment",
            Self::Document => "document",
            Self::Task => "task",
        }
    }
}

/// A check an action demands before it may be granted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Precondition {
    SimulateOk,
    LimitsOk,
    LawOk,
}

impl Precondition {
    pub const MEMBERS: [&'static str; 3] = ["simulate_ok", "limits_ok", "law_ok"];
}

/// Outcome of a single verification check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Unknown,
    Pass,
    Fail,
}

impl CheckStatus {
    pub const MEMBERS: [&'static str; 3] = ["unknown", "pass", "fail"];
}

/// How a grant was approved out-of-band.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GrantMethod {
    UserConsent,
    #[serde(rename = "2fa_verified")]
    TwoFactorVerified,
    AutoLimitsPassed,
}

impl GrantMethod {
    pub const MEMBERS: [&'static str; 3] = ["user_consent", "2fa_verified", "auto_limits_passed"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserConsent => "user_consent",
            Self::TwoFactorVerified => "2fa_verified",
            Self::AutoLimitsPassed => "auto_limits_passed",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub const MEMBERS: [&'static str; 3] = ["low", "medium", "high"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Marker for the `can_execute` field of a [`ProposedAction`].
///
/// Accepts only literal `false` on deserialization and always serializes as
/// `false`, so a validated plan cannot round-trip into an executable one.
/// The validator additionally rejects `true` with a dedicated error naming
/// the offending action ids (see `schema::validate`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NeverExecutable;

impl Serialize for NeverExecutable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bool(false)
    }
}

impl<'de> Deserialize<'de> for NeverExecutable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if bool::deserialize(deserializer)? {
            return Err(D::Error::custom("can_execute must be false"));
        }
        Ok(NeverExecutable)
    }
}

/// One unit of work an agent wants performed. Created by the planning step,
/// never mutated, consumed once by the gate, superseded on replan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProposedAction {
    /// Unique within the containing plan.
    pub id: String,
    pub kind: ActionKind,
    /// Name of the executor capability.
    pub tool: String,
    /// Opaque structured data handed to the executor.
    #[serde(default)]
    pub payload: JsonValue,
    #[serde(default)]
    pub preconditions: Vec<Precondition>,
    pub can_execute: NeverExecutable,
    pub rationale: String,
}

/// A tool request the plan needs fulfilled before acting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NeededData {
    pub tool: String,
    #[serde(default)]
    pub params: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A legal constraint the plan was written under.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LegalCheck {
    pub jurisdiction: String,
    pub statute: String,
    /// `YYYY-MM-DD`, shape-checked by the validator.
    pub effective_date: String,
    pub rationale: String,
}

/// A full plan proposed by the agent.
///
/// Invariant: every contained action has `can_execute = false`; validation
/// fails the whole plan otherwise.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanAction {
    pub goal: String,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub needed_data: Vec<NeededData>,
    #[serde(default)]
    pub legal_checks: Vec<LegalCheck>,
    #[serde(default)]
    pub risk_flags: Vec<String>,
    pub actions: Vec<ProposedAction>,
}

/// Result of one named verification check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckResult {
    pub status: CheckStatus,
    #[serde(default)]
    pub evidence: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// The three named checks run over a plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerificationChecks {
    pub law_ok: CheckResult,
    pub simulate_ok: CheckResult,
    pub limits_ok: CheckResult,
}

/// Independent check results over a [`PlanAction`]. Produced after the plan,
/// before the decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanVerification {
    pub checks: VerificationChecks,
    #[serde(default)]
    pub open_issues: Vec<String>,
}

/// Human/system adjudication of a plan. Terminal artifact of the sequence;
/// approved action ids become eligible for grant issuance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Decision {
    pub summary: String,
    #[serde(default)]
    pub approved_actions: Vec<String>,
    #[serde(default)]
    pub deferred_actions: Vec<String>,
    #[serde(default)]
    pub rejected_actions: Vec<String>,
    /// At most [`MAX_NEXT_QUESTIONS`] entries.
    #[serde(default)]
    pub next_questions: Vec<String>,
}
