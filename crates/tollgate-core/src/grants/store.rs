//! GrantStore: in-memory execution grant registry.
//!
//! A `Clone` handle over a mutex-protected token table. All mutations
//! (issue, evict, revoke) are atomic with respect to concurrent readers; no
//! operation blocks on I/O. The table is single-process state — running
//! multiple instances requires a shared TTL-capable store behind the same
//! surface.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::schema::{GrantMethod, RiskLevel};

/// Default grant lifetime.
pub const DEFAULT_TTL_SECONDS: i64 = 300;

/// Default interval for the optional background sweeper.
pub const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 60;

/// Grant store configuration.
#[derive(Debug, Clone)]
pub struct GrantConfig {
    /// Lifetime applied when `issue` is called without an explicit TTL.
    pub default_ttl: Duration,
    /// Interval for [`GrantStore::spawn_sweeper`].
    pub sweep_interval: std::time::Duration,
}

impl Default for GrantConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::seconds(DEFAULT_TTL_SECONDS),
            sweep_interval: std::time::Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECONDS),
        }
    }
}

/// A live execution grant. The token is disclosed exactly once, in the
/// record returned by [`GrantStore::issue`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ExecuteGranted {
    pub token: String,
    pub user_id: String,
    pub session_id: String,
    pub granted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Action ids this grant covers.
    pub actions: BTreeSet<String>,
    pub granted_by: GrantMethod,
    pub risk_level: RiskLevel,
}

/// Grant denial reasons, in the priority order `validate` checks them.
/// Each carries a stable [`reason`](GrantError::reason) code so audit logs
/// can distinguish "expired" from "forged" from "out of scope".
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GrantError {
    #[error("token not known to the grant store")]
    TokenUnknown,

    #[error("token expired at {expired_at}")]
    TokenExpired { expired_at: DateTime<Utc> },

    #[error("token belongs to a different user")]
    WrongOwner,

    #[error("action '{action_id}' not covered by this grant")]
    ActionNotCovered { action_id: String },
}

impl GrantError {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::TokenUnknown => "token_unknown",
            Self::TokenExpired { .. } => "token_expired",
            Self::WrongOwner => "wrong_owner",
            Self::ActionNotCovered { .. } => "action_not_covered",
        }
    }
}

/// Parameters for [`GrantStore::issue`].
#[derive(Debug, Clone)]
pub struct IssueParams<'a> {
    pub user_id: &'a str,
    pub session_id: &'a str,
    pub action_ids: &'a [String],
    pub granted_by: GrantMethod,
    pub risk_level: RiskLevel,
    /// Defaults to [`GrantConfig::default_ttl`] when absent.
    pub ttl: Option<Duration>,
}

/// In-memory grant store.
#[derive(Clone, Default)]
pub struct GrantStore {
    grants: Arc<Mutex<HashMap<String, ExecuteGranted>>>,
    config: GrantConfig,
}

impl GrantStore {
    pub fn new(config: GrantConfig) -> Self {
        Self {
            grants: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    /// Issue a grant stamped at the current time and schedule a best-effort
    /// eviction task for its expiry (only when called inside a tokio
    /// runtime; validation re-checks expiry either way).
    pub fn issue(&self, params: &IssueParams<'_>) -> ExecuteGranted {
        let grant = self.issue_at(Utc::now(), params);
        self.schedule_eviction(&grant);
        grant
    }

    /// Like [`issue`](Self::issue) but with an explicit `now` and no eviction
    /// task. Use this in tests to avoid flaky clock-dependent assertions.
    pub fn issue_at(&self, now: DateTime<Utc>, params: &IssueParams<'_>) -> ExecuteGranted {
        let ttl = params.ttl.unwrap_or(self.config.default_ttl);
        let grant = ExecuteGranted {
            token: new_token(),
            user_id: params.user_id.to_string(),
            session_id: params.session_id.to_string(),
            granted_at: now,
            expires_at: now + ttl,
            actions: params.action_ids.iter().cloned().collect(),
            granted_by: params.granted_by,
            risk_level: params.risk_level,
        };
        self.grants
            .lock()
            .unwrap()
            .insert(grant.token.clone(), grant.clone());
        tracing::info!(
            user_id = params.user_id,
            session_id = params.session_id,
            actions = grant.actions.len(),
            granted_by = params.granted_by.as_str(),
            risk_level = params.risk_level.as_str(),
            ttl_seconds = ttl.num_seconds(),
            "execution grant issued"
        );
        grant
    }

    /// Check a token against a specific action id and owner.
    ///
    /// Read-only apart from one side effect: an entry found expired is
    /// evicted. Never extends a grant's lifetime.
    pub fn validate(
        &self,
        token: &str,
        action_id: &str,
        user_id: &str,
    ) -> Result<ExecuteGranted, GrantError> {
        self.validate_at(Utc::now(), token, action_id, user_id)
    }

    /// Like [`validate`](Self::validate) but with an explicit `now`.
    pub fn validate_at(
        &self,
        now: DateTime<Utc>,
        token: &str,
        action_id: &str,
        user_id: &str,
    ) -> Result<ExecuteGranted, GrantError> {
        let mut grants = self.grants.lock().unwrap();
        let result = match grants.get(token) {
            None => Err(GrantError::TokenUnknown),
            Some(grant) if grant.expires_at <= now => Err(GrantError::TokenExpired {
                expired_at: grant.expires_at,
            }),
            Some(grant) if grant.user_id != user_id => Err(GrantError::WrongOwner),
            Some(grant) if !grant.actions.contains(action_id) => {
                Err(GrantError::ActionNotCovered {
                    action_id: action_id.to_string(),
                })
            }
            Some(grant) => Ok(grant.clone()),
        };
        if matches!(result, Err(GrantError::TokenExpired { .. })) {
            grants.remove(token);
        }
        drop(grants);
        if let Err(e) = &result {
            tracing::warn!(
                reason = e.reason(),
                user_id,
                action_id,
                "grant validation denied"
            );
        }
        result
    }

    /// Remove one token. Idempotent; returns whether it existed.
    pub fn revoke(&self, token: &str) -> bool {
        let removed = self.grants.lock().unwrap().remove(token).is_some();
        if removed {
            tracing::info!("execution grant revoked");
        }
        removed
    }

    /// Panic button: remove every live grant a user holds. Returns the
    /// number removed.
    pub fn revoke_all(&self, user_id: &str) -> usize {
        let mut grants = self.grants.lock().unwrap();
        let before = grants.len();
        grants.retain(|_, g| g.user_id != user_id);
        let removed = before - grants.len();
        drop(grants);
        if removed > 0 {
            tracing::warn!(
                reason = "panic_button",
                user_id,
                revoked = removed,
                "all grants revoked for user"
            );
        }
        removed
    }

    /// Read-only peek without ownership or expiry checks (diagnostics).
    pub fn get(&self, token: &str) -> Option<ExecuteGranted> {
        self.grants.lock().unwrap().get(token).cloned()
    }

    /// Number of entries currently in the table, expired or not.
    pub fn live_count(&self) -> usize {
        self.grants.lock().unwrap().len()
    }

    /// Number of entries a user currently holds.
    pub fn count_for_user(&self, user_id: &str) -> usize {
        self.grants
            .lock()
            .unwrap()
            .values()
            .filter(|g| g.user_id == user_id)
            .count()
    }

    /// Drop every entry expired as of `now`; returns how many were removed.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut grants = self.grants.lock().unwrap();
        let before = grants.len();
        grants.retain(|_, g| g.expires_at > now);
        before - grants.len()
    }

    /// Periodic memory-hygiene sweep. Not a security boundary: `validate`
    /// re-checks expiry on every call.
    pub fn spawn_sweeper(&self, interval: std::time::Duration) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let swept = store.sweep_at(Utc::now());
                if swept > 0 {
                    tracing::debug!(swept, "expired grants swept");
                }
            }
        })
    }

    /// Best-effort delayed removal of a single token at its expiry. No-op
    /// outside a tokio runtime.
    fn schedule_eviction(&self, grant: &ExecuteGranted) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let store = self.clone();
        let token = grant.token.clone();
        let ttl = (grant.expires_at - Utc::now())
            .to_std()
            .unwrap_or_default();
        handle.spawn(async move {
            tokio::time::sleep(ttl).await;
            let mut grants = store.grants.lock().unwrap();
            if grants
                .get(&token)
                .is_some_and(|g| g.expires_at <= Utc::now())
            {
                grants.remove(&token);
            }
        });
    }
}

/// 32 bytes from the OS CSPRNG, URL-safe base64. Never derived from user
/// input.
fn new_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action_ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn issue_params<'a>(user: &'a str, ids: &'a [String]) -> IssueParams<'a> {
        IssueParams {
            user_id: user,
            session_id: "s1",
            action_ids: ids,
            granted_by: GrantMethod::UserConsent,
            risk_level: RiskLevel::Low,
            ttl: None,
        }
    }

    #[test]
    fn issue_then_validate_passes() {
        let store = GrantStore::new(GrantConfig::default());
        let ids = action_ids(&["a1", "a2"]);
        let now = Utc::now();
        let grant = store.issue_at(now, &issue_params("u1", &ids));

        let got = store.validate_at(now, &grant.token, "a1", "u1").unwrap();
        assert_eq!(got, grant);
        assert_eq!(got.expires_at - got.granted_at, Duration::seconds(300));
    }

    #[test]
    fn denial_reasons_in_priority_order() {
        let store = GrantStore::new(GrantConfig::default());
        let ids = action_ids(&["a1", "a2"]);
        let now = Utc::now();
        let grant = store.issue_at(now, &issue_params("u1", &ids));

        assert_eq!(
            store.validate_at(now, "no-such-token", "a1", "u1"),
            Err(GrantError::TokenUnknown)
        );
        assert_eq!(
            store.validate_at(now, &grant.token, "a1", "u2"),
            Err(GrantError::WrongOwner)
        );
        assert_eq!(
            store.validate_at(now, &grant.token, "a3", "u1"),
            Err(GrantError::ActionNotCovered {
                action_id: "a3".into()
            })
        );
        // An expired grant denies before owner/coverage are even looked at.
        let later = now + Duration::seconds(301);
        assert_eq!(
            store.validate_at(later, &grant.token, "a3", "u2"),
            Err(GrantError::TokenExpired { expired_at: grant.expires_at })
        );
    }

    #[test]
    fn expired_entry_is_evicted_on_validate() {
        let store = GrantStore::new(GrantConfig::default());
        let ids = action_ids(&["a1"]);
        let now = Utc::now();
        let grant = store.issue_at(
            now,
            &IssueParams {
                ttl: Some(Duration::seconds(1)),
                ..issue_params("u1", &ids)
            },
        );

        assert!(store.validate_at(now, &grant.token, "a1", "u1").is_ok());
        let later = now + Duration::seconds(2);
        assert_eq!(
            store.validate_at(later, &grant.token, "a1", "u1"),
            Err(GrantError::TokenExpired { expired_at: grant.expires_at })
        );
        // Evicted: a second attempt no longer knows the token.
        assert_eq!(
            store.validate_at(later, &grant.token, "a1", "u1"),
            Err(GrantError::TokenUnknown)
        );
        assert_eq!(store.live_count(), 0);
    }

    #[test]
    fn validate_never_extends_lifetime() {
        let store = GrantStore::new(GrantConfig::default());
        let ids = action_ids(&["a1"]);
        let now = Utc::now();
        let grant = store.issue_at(now, &issue_params("u1", &ids));

        for _ in 0..5 {
            store.validate_at(now, &grant.token, "a1", "u1").unwrap();
        }
        assert_eq!(store.get(&grant.token).unwrap().expires_at, grant.expires_at);
    }

    #[test]
    fn revoke_is_idempotent_and_immediate() {
        let store = GrantStore::new(GrantConfig::default());
        let ids = action_ids(&["a1"]);
        let now = Utc::now();
        let grant = store.issue_at(now, &issue_params("u1", &ids));

        assert!(store.revoke(&grant.token));
        assert!(!store.revoke(&grant.token));
        // Within the original TTL window, yet the token is gone.
        assert_eq!(
            store.validate_at(now, &grant.token, "a1", "u1"),
            Err(GrantError::TokenUnknown)
        );
    }

    #[test]
    fn revoke_all_spares_other_users() {
        let store = GrantStore::new(GrantConfig::default());
        let ids = action_ids(&["a1"]);
        let now = Utc::now();
        store.issue_at(now, &issue_params("u1", &ids));
        store.issue_at(now, &issue_params("u1", &ids));
        let other = store.issue_at(now, &issue_params("u2", &ids));

        assert_eq!(store.revoke_all("u1"), 2);
        assert_eq!(store.revoke_all("u1"), 0);
        assert_eq!(store.count_for_user("u1"), 0);
        assert!(store.validate_at(now, &other.token, "a1", "u2").is_ok());
    }

    #[test]
    fn sweep_removes_only_expired() {
        let store = GrantStore::new(GrantConfig::default());
        let ids = action_ids(&["a1"]);
        let now = Utc::now();
        store.issue_at(
            now,
            &IssueParams {
                ttl: Some(Duration::seconds(1)),
                ..issue_params("u1", &ids)
            },
        );
        let fresh = store.issue_at(now, &issue_params("u2", &ids));

        assert_eq!(store.sweep_at(now + Duration::seconds(2)), 1);
        assert_eq!(store.live_count(), 1);
        assert!(store.get(&fresh.token).is_some());
    }

    #[test]
    fn tokens_are_unique_and_opaque() {
        let store = GrantStore::new(GrantConfig::default());
        let ids = action_ids(&["a1"]);
        let now = Utc::now();
        let a = store.issue_at(now, &issue_params("u1", &ids));
        let b = store.issue_at(now, &issue_params("u1", &ids));
        assert_ne!(a.token, b.token);
        // 32 random bytes, unpadded URL-safe base64.
        assert_eq!(a.token.len(), 43);
        assert!(!a.token.contains('='));
    }
}
