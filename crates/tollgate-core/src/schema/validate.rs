//! Field-error-accumulating validation over untyped agent output.
//!
//! Each entry point walks the raw `serde_json::Value`, collects one
//! [`FieldError`] per violated field (it never stops at the first), and only
//! then deserializes into the typed model. The `can_execute` check is a
//! security invariant, not a type error: it runs against the raw value and
//! names the offending action ids, independent of what the structural shape
//! would accept.

use lazy_static::lazy_static;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

use super::model::{
    ActionKind, CheckStatus, Decision, PlanAction, PlanVerification, Precondition,
    MAX_NEXT_QUESTIONS,
};

lazy_static! {
    static ref DATE_RE: Regex = Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap();
}

/// Stable rule codes carried by field errors.
pub mod codes {
    pub const E_MISSING_FIELD: &str = "E_MISSING_FIELD";
    pub const E_FIELD_TYPE: &str = "E_FIELD_TYPE";
    pub const E_ENUM_MEMBER: &str = "E_ENUM_MEMBER";
    pub const E_DATE_FORMAT: &str = "E_DATE_FORMAT";
    pub const E_DUPLICATE_ID: &str = "E_DUPLICATE_ID";
    pub const E_DESERIALIZE: &str = "E_DESERIALIZE";

    // Security invariants, logged distinctly at the gate.
    pub const E_EXECUTABLE_ACTION: &str = "E_EXECUTABLE_ACTION";
    pub const E_QUESTION_BUDGET: &str = "E_QUESTION_BUDGET";
}

/// One violated field: where, which rule, and a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FieldError {
    /// JSON path of the offending field, e.g. `actions[2].kind`.
    pub path: String,
    /// One of the [`codes`] constants.
    pub code: &'static str,
    pub message: String,
}

impl FieldError {
    fn new(path: impl Into<String>, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            code,
            message: message.into(),
        }
    }

    /// True for violations of the security invariants rather than shape.
    pub fn is_invariant_violation(&self) -> bool {
        self.code == codes::E_EXECUTABLE_ACTION || self.code == codes::E_QUESTION_BUDGET
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{} [{}]", self.message, self.code)
        } else {
            write!(f, "{}: {} [{}]", self.path, self.message, self.code)
        }
    }
}

/// Accumulates field errors while walking a raw value.
struct Walk {
    errors: Vec<FieldError>,
}

impl Walk {
    fn new() -> Self {
        Self { errors: Vec::new() }
    }

    fn push(&mut self, path: impl Into<String>, code: &'static str, message: impl Into<String>) {
        self.errors.push(FieldError::new(path, code, message));
    }

    fn missing(&mut self, path: &str) {
        self.push(path, codes::E_MISSING_FIELD, "required field is missing");
    }

    fn wrong_type(&mut self, path: &str, expected: &str) {
        self.push(path, codes::E_FIELD_TYPE, format!("expected {expected}"));
    }

    /// Required string field on `obj`; returns it when present and a string.
    fn require_str<'a>(&mut self, obj: &'a Map<String, Value>, path: &str) -> Option<&'a str> {
        match obj.get(field_name(path)) {
            None => {
                self.missing(path);
                None
            }
            Some(Value::String(s)) => Some(s),
            Some(_) => {
                self.wrong_type(path, "a string");
                None
            }
        }
    }

    /// Optional string field; type-checked when present.
    fn optional_str(&mut self, obj: &Map<String, Value>, path: &str) {
        match obj.get(field_name(path)) {
            None | Some(Value::Null) | Some(Value::String(_)) => {}
            Some(_) => self.wrong_type(path, "a string"),
        }
    }

    /// Optional array of strings; every element type-checked when present.
    fn optional_str_array(&mut self, obj: &Map<String, Value>, path: &str) {
        match obj.get(field_name(path)) {
            None | Some(Value::Null) => {}
            Some(Value::Array(items)) => {
                for (i, item) in items.iter().enumerate() {
                    if !item.is_string() {
                        self.wrong_type(&format!("{path}[{i}]"), "a string");
                    }
                }
            }
            Some(_) => self.wrong_type(path, "an array of strings"),
        }
    }

    /// Required closed-set enum field.
    fn require_member(&mut self, obj: &Map<String, Value>, path: &str, members: &[&str]) {
        let Some(s) = self.require_str(obj, path) else {
            return;
        };
        if !members.contains(&s) {
            self.push(
                path,
                codes::E_ENUM_MEMBER,
                format!("'{s}' is not one of {members:?}"),
            );
        }
    }

    /// Required `YYYY-MM-DD` string field.
    fn require_date(&mut self, obj: &Map<String, Value>, path: &str) {
        let Some(s) = self.require_str(obj, path) else {
            return;
        };
        if !DATE_RE.is_match(s) {
            self.push(
                path,
                codes::E_DATE_FORMAT,
                format!("'{s}' does not match YYYY-MM-DD"),
            );
        }
    }

    /// Optional array field; returns the items for per-element checks.
    fn optional_array<'a>(
        &mut self,
        obj: &'a Map<String, Value>,
        path: &str,
    ) -> Option<&'a [Value]> {
        match obj.get(field_name(path)) {
            None | Some(Value::Null) => None,
            Some(Value::Array(items)) => Some(items),
            Some(_) => {
                self.wrong_type(path, "an array");
                None
            }
        }
    }

    /// Required array field.
    fn require_array<'a>(
        &mut self,
        obj: &'a Map<String, Value>,
        path: &str,
    ) -> Option<&'a [Value]> {
        match obj.get(field_name(path)) {
            None => {
                self.missing(path);
                None
            }
            Some(Value::Array(items)) => Some(items),
            Some(_) => {
                self.wrong_type(path, "an array");
                None
            }
        }
    }

    /// Element expected to be an object.
    fn as_object<'a>(&mut self, value: &'a Value, path: &str) -> Option<&'a Map<String, Value>> {
        match value.as_object() {
            Some(obj) => Some(obj),
            None => {
                self.wrong_type(path, "an object");
                None
            }
        }
    }

    /// Deserialize into the typed model once the walk found nothing.
    fn finish<T: DeserializeOwned>(self, input: &Value) -> Result<T, Vec<FieldError>> {
        if !self.errors.is_empty() {
            return Err(self.errors);
        }
        serde_json::from_value(input.clone())
            .map_err(|e| vec![FieldError::new("", codes::E_DESERIALIZE, e.to_string())])
    }
}

/// Last path segment is the field name to look up (`actions[2].kind` → `kind`).
fn field_name(path: &str) -> &str {
    path.rsplit('.').next().unwrap_or(path)
}

fn root_object(input: &Value) -> Result<&Map<String, Value>, Vec<FieldError>> {
    input.as_object().ok_or_else(|| {
        vec![FieldError::new(
            "",
            codes::E_FIELD_TYPE,
            "expected a JSON object",
        )]
    })
}

/// Validate an agent-proposed plan.
///
/// Enforces, beyond field shapes: unique action ids, closed-set enums,
/// `YYYY-MM-DD` dates, and the security invariant that every action carries
/// literal `can_execute = false`. Any action asserting `true` fails the whole
/// plan with a single `E_EXECUTABLE_ACTION` error naming the offending ids.
pub fn validate_plan_action(input: &Value) -> Result<PlanAction, Vec<FieldError>> {
    let obj = root_object(input)?;
    let mut w = Walk::new();

    w.require_str(obj, "goal");
    w.optional_str_array(obj, "assumptions");
    w.optional_str_array(obj, "risk_flags");

    if let Some(items) = w.optional_array(obj, "needed_data") {
        for (i, item) in items.iter().enumerate() {
            let p = format!("needed_data[{i}]");
            if let Some(o) = w.as_object(item, &p) {
                w.require_str(o, &format!("{p}.tool"));
                w.optional_str(o, &format!("{p}.reason"));
            }
        }
    }

    if let Some(items) = w.optional_array(obj, "legal_checks") {
        for (i, item) in items.iter().enumerate() {
            let p = format!("legal_checks[{i}]");
            if let Some(o) = w.as_object(item, &p) {
                w.require_str(o, &format!("{p}.jurisdiction"));
                w.require_str(o, &format!("{p}.statute"));
                w.require_date(o, &format!("{p}.effective_date"));
                w.require_str(o, &format!("{p}.rationale"));
            }
        }
    }

    let mut seen_ids = BTreeSet::new();
    let mut executable = Vec::new();
    if let Some(items) = w.require_array(obj, "actions") {
        for (i, item) in items.iter().enumerate() {
            let p = format!("actions[{i}]");
            let Some(o) = w.as_object(item, &p) else {
                continue;
            };
            let id = w.require_str(o, &format!("{p}.id")).map(str::to_owned);
            if let Some(id) = &id {
                if !seen_ids.insert(id.clone()) {
                    w.push(
                        format!("{p}.id"),
                        codes::E_DUPLICATE_ID,
                        format!("action id '{id}' is not unique within the plan"),
                    );
                }
            }
            w.require_member(o, &format!("{p}.kind"), &ActionKind::MEMBERS);
            w.require_str(o, &format!("{p}.tool"));
            w.require_str(o, &format!("{p}.rationale"));
            if let Some(items) = w.optional_array(o, &format!("{p}.preconditions")) {
                for (j, pc) in items.iter().enumerate() {
                    let pp = format!("{p}.preconditions[{j}]");
                    match pc.as_str() {
                        Some(s) if Precondition::MEMBERS.contains(&s) => {}
                        Some(s) => w.push(
                            pp,
                            codes::E_ENUM_MEMBER,
                            format!("'{s}' is not one of {:?}", Precondition::MEMBERS),
                        ),
                        None => w.wrong_type(&pp, "a string"),
                    }
                }
            }
            match o.get("can_execute") {
                None => w.missing(&format!("{p}.can_execute")),
                Some(Value::Bool(false)) => {}
                Some(Value::Bool(true)) => executable.push(id.unwrap_or(p)),
                Some(_) => w.wrong_type(&format!("{p}.can_execute"), "a boolean"),
            }
        }
    }

    if !executable.is_empty() {
        w.push(
            "actions",
            codes::E_EXECUTABLE_ACTION,
            format!(
                "can_execute=true is never accepted from an agent (offending actions: {})",
                executable.join(", ")
            ),
        );
    }

    w.finish(input)
}

/// Validate independent check results over a plan. Structural only.
pub fn validate_plan_verification(input: &Value) -> Result<PlanVerification, Vec<FieldError>> {
    let obj = root_object(input)?;
    let mut w = Walk::new();

    match obj.get("checks") {
        None => w.missing("checks"),
        Some(Value::Object(checks)) => {
            for name in ["law_ok", "simulate_ok", "limits_ok"] {
                let p = format!("checks.{name}");
                match checks.get(name) {
                    None => w.missing(&p),
                    Some(check) => {
                        if let Some(o) = w.as_object(check, &p) {
                            w.require_member(o, &format!("{p}.status"), &CheckStatus::MEMBERS);
                            w.optional_str_array(o, &format!("{p}.evidence"));
                            w.optional_str(o, &format!("{p}.notes"));
                        }
                    }
                }
            }
        }
        Some(_) => w.wrong_type("checks", "an object"),
    }
    w.optional_str_array(obj, "open_issues");

    w.finish(input)
}

/// Validate an adjudication. Structural, plus the question budget:
/// `next_questions` holds at most [`MAX_NEXT_QUESTIONS`] entries.
pub fn validate_decision(input: &Value) -> Result<Decision, Vec<FieldError>> {
    let obj = root_object(input)?;
    let mut w = Walk::new();

    w.require_str(obj, "summary");
    w.optional_str_array(obj, "approved_actions");
    w.optional_str_array(obj, "deferred_actions");
    w.optional_str_array(obj, "rejected_actions");
    w.optional_str_array(obj, "next_questions");
    if let Some(questions) = obj.get("next_questions").and_then(Value::as_array) {
        if questions.len() > MAX_NEXT_QUESTIONS {
            w.push(
                "next_questions",
                codes::E_QUESTION_BUDGET,
                format!(
                    "at most {MAX_NEXT_QUESTIONS} follow-up questions are allowed, got {}",
                    questions.len()
                ),
            );
        }
    }

    w.finish(input)
}
