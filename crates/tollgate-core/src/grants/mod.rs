//! Execution grant lifecycle.
//!
//! The grant store is the sole authority for converting "approved" into
//! "executable". It issues time-limited, revocable tokens after an
//! out-of-band approval step, checks them against a specific action id and
//! owner, and revokes them — one token at a time or every token a user holds
//! (the panic button).
//!
//! ```text
//! Decision (approved ids) ──▶ approval step ──▶ GrantStore::issue
//!                                                     │ token
//!                                                     ▼
//! executor ──▶ GrantStore::validate(token, action_id, user_id) ──▶ run / deny
//! ```
//!
//! Expiry is enforced lazily at validation time as the authoritative guard;
//! the per-token eviction tasks and the optional sweeper exist only to keep
//! memory tidy.

mod store;

pub use store::{
    ExecuteGranted, GrantConfig, GrantError, GrantStore, IssueParams, DEFAULT_SWEEP_INTERVAL_SECONDS,
    DEFAULT_TTL_SECONDS,
};
