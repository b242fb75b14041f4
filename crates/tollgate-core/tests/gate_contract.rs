//! Contract tests for the gate: error codes, typed attachment, and the
//! validate-then-authorize split.

use serde_json::json;
use tollgate_core::schema::{codes, GrantMethod, RiskLevel};
use tollgate_core::{Gate, GateError, GrantConfig, GrantError, GrantStore, IssueParams, ValidatedOutput};

fn plan_body() -> serde_json::Value {
    json!({
        "output": {
            "goal": "move spare cash to savings",
            "assumptions": ["checking balance is stable"],
            "needed_data": [
                { "tool": "accounts.balance", "params": { "account": "checking" } }
            ],
            "legal_checks": [{
                "jurisdiction": "NL",
                "statute": "Wft 4:24",
                "effective_date": "2024-01-01",
                "rationale": "suitability check applies to advice"
            }],
            "risk_flags": ["irreversible_transfer"],
            "actions": [
                {
                    "id": "a1",
                    "kind": "payment",
                    "tool": "payments.transfer",
                    "payload": { "from": "checking", "to": "savings", "amount": 250 },
                    "preconditions": ["limits_ok"],
                    "can_execute": false,
                    "rationale": "surplus above buffer"
                },
                {
                    "id": "a2",
                    "kind": "analysis",
                    "tool": "budget.project",
                    "payload": {},
                    "preconditions": [],
                    "can_execute": false,
                    "rationale": "confirm buffer holds after transfer"
                }
            ]
        }
    })
}

#[test]
fn plan_passes_gate_and_is_typed() {
    let out = Gate::enforce("PlanAction", &plan_body()).unwrap();
    let ValidatedOutput::PlanAction(plan) = out else {
        panic!("expected a PlanAction");
    };
    assert_eq!(plan.actions.len(), 2);
    assert_eq!(plan.actions[1].id, "a2");
    assert_eq!(plan.legal_checks[0].effective_date, "2024-01-01");
}

#[test]
fn revalidation_of_serialized_plan_is_idempotent() -> anyhow::Result<()> {
    let ValidatedOutput::PlanAction(first) = Gate::enforce("PlanAction", &plan_body()).unwrap()
    else {
        panic!("expected a PlanAction");
    };
    // Re-serialize the validated value and push it through the gate again.
    let reserialized = json!({ "output": serde_json::to_value(&first)? });
    let ValidatedOutput::PlanAction(second) = Gate::enforce("PlanAction", &reserialized).unwrap()
    else {
        panic!("expected a PlanAction");
    };
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn executable_plan_rejected_however_well_formed() {
    let mut body = plan_body();
    body["output"]["actions"][1]["can_execute"] = json!(true);
    let err = Gate::enforce("PlanAction", &body).unwrap_err();
    let GateError::ValidationFailed(errors) = &err else {
        panic!("expected ValidationFailed, got {err:?}");
    };
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, codes::E_EXECUTABLE_ACTION);
    assert!(errors[0].message.contains("a2"));
}

#[test]
fn verification_and_decision_pass_through() {
    let verification = json!({
        "output": {
            "checks": {
                "law_ok": { "status": "pass", "evidence": ["Wft 4:24 reviewed"] },
                "simulate_ok": { "status": "pass" },
                "limits_ok": { "status": "fail", "notes": "daily transfer cap reached" }
            },
            "open_issues": ["limits check failed"]
        }
    });
    assert!(matches!(
        Gate::enforce("PlanVerification", &verification).unwrap(),
        ValidatedOutput::PlanVerification(_)
    ));

    let decision = json!({
        "output": {
            "summary": "approve a1, defer a2",
            "approved_actions": ["a1"],
            "deferred_actions": ["a2"],
            "rejected_actions": [],
            "next_questions": ["raise the daily cap?"]
        }
    });
    assert!(matches!(
        Gate::enforce("Decision", &decision).unwrap(),
        ValidatedOutput::Decision(_)
    ));
}

/// The gate validates shape; authorization is a separate grant check. Both
/// must agree before an action runs.
#[test]
fn approved_actions_still_need_a_grant() {
    let ValidatedOutput::PlanAction(plan) = Gate::enforce("PlanAction", &plan_body()).unwrap()
    else {
        panic!("expected a PlanAction");
    };

    let store = GrantStore::new(GrantConfig::default());
    // A validated plan alone authorizes nothing.
    assert_eq!(
        store.validate("not-a-token", &plan.actions[0].id, "u1"),
        Err(GrantError::TokenUnknown)
    );

    // After the out-of-band approval step issues a grant, the same action
    // passes.
    let ids: Vec<String> = plan.actions.iter().map(|a| a.id.clone()).collect();
    let grant = store.issue(&IssueParams {
        user_id: "u1",
        session_id: "s1",
        action_ids: &ids,
        granted_by: GrantMethod::TwoFactorVerified,
        risk_level: RiskLevel::Medium,
        ttl: None,
    });
    assert!(store.validate(&grant.token, "a1", "u1").is_ok());
}

/// Concrete scenario: token for u1 over {a1, a2}.
#[test]
fn grant_scope_scenario() {
    let store = GrantStore::new(GrantConfig::default());
    let ids = vec!["a1".to_string(), "a2".to_string()];
    let grant = store.issue(&IssueParams {
        user_id: "u1",
        session_id: "s1",
        action_ids: &ids,
        granted_by: GrantMethod::UserConsent,
        risk_level: RiskLevel::Low,
        ttl: Some(chrono::Duration::minutes(5)),
    });

    assert!(store.validate(&grant.token, "a1", "u1").is_ok());

    let err = store.validate(&grant.token, "a3", "u1").unwrap_err();
    assert_eq!(err.reason(), "action_not_covered");

    let err = store.validate(&grant.token, "a1", "u2").unwrap_err();
    assert_eq!(err.reason(), "wrong_owner");
}
