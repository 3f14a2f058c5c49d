//! Approval grants and TTL tags.
//!
//! A grant is a time-bounded, service-scoped authorization installed
//! after a human approves a request. At most one grant per service is
//! live at a time; a newer grant supersedes the old one.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A time-bounded authorization for one service.
///
/// # Example
///
/// ```rust
/// use clawguard_core::approval::{Grant, TtlTag};
///
/// let grant = Grant::new("gh", "alice", TtlTag::Hours1);
/// assert!(grant.is_live(chrono::Utc::now()));
/// assert_eq!(grant.service, "gh");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    /// Service this grant authorizes.
    pub service: String,

    /// Display name of the approver (or a failure sentinel).
    pub approved_by: String,

    pub granted_at: DateTime<Utc>,

    pub expires_at: DateTime<Utc>,

    /// Set by revocation; a revoked grant is never live.
    pub revoked: bool,
}

impl Grant {
    /// Create a grant starting now with the tag's TTL.
    pub fn new(service: impl Into<String>, approved_by: impl Into<String>, ttl: TtlTag) -> Self {
        let now = Utc::now();
        Self {
            service: service.into(),
            approved_by: approved_by.into(),
            granted_at: now,
            expires_at: now + Duration::seconds(ttl.seconds()),
            revoked: false,
        }
    }

    /// Whether the grant authorizes requests at `now`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && now < self.expires_at
    }

    /// Whole minutes until expiry, clamped at zero.
    pub fn remaining_minutes(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_minutes().max(0)
    }
}

/// The TTL choices offered on every approval prompt.
///
/// `Once` is encoded as a one-second grant, which forces a fresh
/// approval for the next request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtlTag {
    Once,
    Minutes15,
    Hours1,
    Hours8,
    Hours24,
}

impl TtlTag {
    /// All tags in prompt order.
    pub const ALL: [TtlTag; 5] = [
        TtlTag::Once,
        TtlTag::Minutes15,
        TtlTag::Hours1,
        TtlTag::Hours8,
        TtlTag::Hours24,
    ];

    /// Grant lifetime in seconds.
    pub fn seconds(self) -> i64 {
        match self {
            TtlTag::Once => 1,
            TtlTag::Minutes15 => 900,
            TtlTag::Hours1 => 3_600,
            TtlTag::Hours8 => 28_800,
            TtlTag::Hours24 => 86_400,
        }
    }

    /// Short human label used on prompt buttons.
    pub fn label(self) -> &'static str {
        match self {
            TtlTag::Once => "once",
            TtlTag::Minutes15 => "15m",
            TtlTag::Hours1 => "1h",
            TtlTag::Hours8 => "8h",
            TtlTag::Hours24 => "24h",
        }
    }

    /// Wire action name carried in callback data.
    pub fn callback_action(self) -> &'static str {
        match self {
            TtlTag::Once => "approve_once",
            TtlTag::Minutes15 => "approve_15m",
            TtlTag::Hours1 => "approve_1h",
            TtlTag::Hours8 => "approve_8h",
            TtlTag::Hours24 => "approve_24h",
        }
    }

    /// Parse a wire action name back to a tag.
    pub fn from_callback_action(action: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|tag| tag.callback_action() == action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_seconds_mapping() {
        assert_eq!(TtlTag::Once.seconds(), 1);
        assert_eq!(TtlTag::Minutes15.seconds(), 900);
        assert_eq!(TtlTag::Hours1.seconds(), 3_600);
        assert_eq!(TtlTag::Hours8.seconds(), 28_800);
        assert_eq!(TtlTag::Hours24.seconds(), 86_400);
    }

    #[test]
    fn test_callback_action_round_trip() {
        for tag in TtlTag::ALL {
            assert_eq!(TtlTag::from_callback_action(tag.callback_action()), Some(tag));
        }
        assert_eq!(TtlTag::from_callback_action("deny"), None);
        assert_eq!(TtlTag::from_callback_action("approve_2h"), None);
    }

    #[test]
    fn test_grant_liveness() {
        let grant = Grant::new("gh", "alice", TtlTag::Hours1);
        let now = Utc::now();
        assert!(grant.is_live(now));
        assert!(!grant.is_live(now + Duration::hours(2)));

        let mut revoked = grant.clone();
        revoked.revoked = true;
        assert!(!revoked.is_live(now));
    }

    #[test]
    fn test_once_expires_almost_immediately() {
        let grant = Grant::new("gh", "alice", TtlTag::Once);
        assert!(grant.is_live(grant.granted_at));
        assert!(!grant.is_live(grant.granted_at + Duration::seconds(1)));
    }

    #[test]
    fn test_remaining_minutes_clamps_at_zero() {
        let grant = Grant::new("gh", "alice", TtlTag::Minutes15);
        let now = Utc::now();
        assert!(grant.remaining_minutes(now) <= 15);
        assert_eq!(grant.remaining_minutes(now + Duration::hours(1)), 0);
    }
}
