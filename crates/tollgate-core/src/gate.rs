//! Gate: single enforcement entry point for inbound structured output.
//!
//! Given an output-type tag and a request body, the gate rejects a missing
//! `output` field, an unknown tag, or a validation failure, and otherwise
//! hands the typed value back for the dispatcher to attach to its request
//! context. The gate guarantees shape and invariant only; it never consults
//! the grant store. Whether an action may actually run is decided later by
//! whoever calls [`GrantStore::validate`](crate::grants::GrantStore::validate).

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::schema::{
    validate_decision, validate_plan_action, validate_plan_verification, Decision, FieldError,
    PlanAction, PlanVerification,
};

/// Selector supplied by the route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputType {
    PlanAction,
    PlanVerification,
    Decision,
}

impl OutputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlanAction => "PlanAction",
            Self::PlanVerification => "PlanVerification",
            Self::Decision => "Decision",
        }
    }
}

impl std::str::FromStr for OutputType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PlanAction" => Ok(Self::PlanAction),
            "PlanVerification" => Ok(Self::PlanVerification),
            "Decision" => Ok(Self::Decision),
            _ => Err(()),
        }
    }
}

/// A validated, typed output ready for downstream handlers.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidatedOutput {
    PlanAction(PlanAction),
    PlanVerification(PlanVerification),
    Decision(Decision),
}

/// Gate rejections. Every variant maps to a stable wire code via
/// [`code`](GateError::code) and serializes through [`ErrorBody`].
#[derive(Debug, Error, PartialEq)]
pub enum GateError {
    #[error("request body has no 'output' field")]
    MissingOutput,

    #[error("unknown output type '{0}'")]
    InvalidOutputType(String),

    #[error("output failed validation")]
    ValidationFailed(Vec<FieldError>),
}

impl GateError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingOutput => "MISSING_OUTPUT",
            Self::InvalidOutputType(_) => "INVALID_OUTPUT_TYPE",
            Self::ValidationFailed(_) => "VALIDATION_FAILED",
        }
    }

    /// Wire shape for the external HTTP dispatcher.
    pub fn to_body(&self) -> ErrorBody {
        let errors = match self {
            Self::ValidationFailed(errs) => Some(errs.iter().map(ToString::to_string).collect()),
            _ => None,
        };
        ErrorBody {
            error: self.to_string(),
            code: self.code().to_string(),
            errors,
        }
    }
}

/// Structured error response: `{ error, code, errors? }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

/// Stateless policy enforcer coupling validation into one decision point.
pub struct Gate;

impl Gate {
    /// Enforce shape and invariants on a request body carrying structured
    /// output. Checks, in order: `output` present, `output_type` known,
    /// payload valid for that type. The grant store is never touched here.
    pub fn enforce(output_type: &str, body: &Value) -> Result<ValidatedOutput, GateError> {
        let output = match body.get("output") {
            Some(v) if !v.is_null() => v,
            _ => {
                tracing::debug!(output_type, "request body missing 'output'");
                return Err(GateError::MissingOutput);
            }
        };

        let ty: OutputType = output_type.parse().map_err(|()| {
            tracing::debug!(output_type, "unknown output type");
            GateError::InvalidOutputType(output_type.to_string())
        })?;

        let result = match ty {
            OutputType::PlanAction => {
                validate_plan_action(output).map(ValidatedOutput::PlanAction)
            }
            OutputType::PlanVerification => {
                validate_plan_verification(output).map(ValidatedOutput::PlanVerification)
            }
            OutputType::Decision => validate_decision(output).map(ValidatedOutput::Decision),
        };

        result.map_err(|errors| {
            log_rejection(ty, &errors);
            GateError::ValidationFailed(errors)
        })
    }
}

/// Invariant violations are security-relevant and logged distinctly from
/// ordinary structural rejections.
fn log_rejection(ty: OutputType, errors: &[FieldError]) {
    let invariants: Vec<&FieldError> = errors
        .iter()
        .filter(|e| e.is_invariant_violation())
        .collect();
    if invariants.is_empty() {
        tracing::debug!(
            output_type = ty.as_str(),
            errors = errors.len(),
            "structured output failed validation"
        );
    } else {
        for e in invariants {
            tracing::warn!(
                reason = e.code,
                output_type = ty.as_str(),
                path = %e.path,
                "security invariant violated in agent output"
            );
        }
    }
}
