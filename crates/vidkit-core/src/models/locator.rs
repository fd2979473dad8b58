use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AccessPermission {
    Read,
    Write,
    Delete,
    List,
}

impl Display for AccessPermission {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            AccessPermission::Read => write!(f, "read"),
            AccessPermission::Write => write!(f, "write"),
            AccessPermission::Delete => write!(f, "delete"),
            AccessPermission::List => write!(f, "list"),
        }
    }
}

/// Permission set plus validity window. Locators bound to a policy never
/// outlive it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessPolicy {
    pub id: String,
    pub name: String,
    pub duration_secs: i64,
    pub permissions: Vec<AccessPermission>,
    pub created_at: DateTime<Utc>,
}

impl AccessPolicy {
    /// Saturates at `Duration::MAX` for out-of-range second counts.
    pub fn duration(&self) -> Duration {
        Duration::try_seconds(self.duration_secs).unwrap_or(Duration::MAX)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at
            .checked_add_signed(self.duration())
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn allows(&self, permission: AccessPermission) -> bool {
        self.permissions.contains(&permission)
    }
}

/// Write locators (`Sas`) are used for uploads; read locators
/// (`OnDemandOrigin`) are used for streaming.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LocatorKind {
    Sas,
    OnDemandOrigin,
}

impl Display for LocatorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            LocatorKind::Sas => write!(f, "sas"),
            LocatorKind::OnDemandOrigin => write!(f, "on_demand_origin"),
        }
    }
}

/// Time-boxed access handle to one asset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Locator {
    pub id: String,
    pub kind: LocatorKind,
    pub asset_id: String,
    pub policy_id: String,
    /// Base URL; for streaming locators the manifest name is appended to it.
    pub path: String,
    pub start_time: DateTime<Utc>,
    pub expiration: DateTime<Utc>,
}

impl Locator {
    /// Expiration for a locator starting at `start_time` under `policy`,
    /// clamped so it never passes the policy's own expiry.
    pub fn expiration_for(policy: &AccessPolicy, start_time: DateTime<Utc>) -> DateTime<Utc> {
        let policy_end = policy.expires_at();
        start_time
            .checked_add_signed(policy.duration())
            .map_or(policy_end, |end| end.min(policy_end))
    }

    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.start_time <= at && at < self.expiration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(created_at: DateTime<Utc>, duration: Duration) -> AccessPolicy {
        AccessPolicy {
            id: "policy-1".to_string(),
            name: "Streaming policy".to_string(),
            duration_secs: duration.num_seconds(),
            permissions: vec![AccessPermission::Read],
            created_at,
        }
    }

    #[test]
    fn backdated_locator_expires_before_policy() {
        let now = Utc::now();
        let p = policy(now, Duration::days(90));
        let start = now - Duration::minutes(5);
        let expiration = Locator::expiration_for(&p, start);
        assert_eq!(expiration, start + Duration::days(90));
        assert!(expiration <= p.expires_at());
    }

    #[test]
    fn late_start_is_clamped_to_policy_expiry() {
        let now = Utc::now();
        let p = policy(now, Duration::hours(1));
        let expiration = Locator::expiration_for(&p, now + Duration::minutes(30));
        assert_eq!(expiration, p.expires_at());
    }

    #[test]
    fn oversized_policy_saturates_instead_of_overflowing() {
        let now = Utc::now();
        let mut p = policy(now, Duration::hours(1));
        p.duration_secs = i64::MAX;
        assert_eq!(p.duration(), Duration::MAX);
        assert_eq!(p.expires_at(), DateTime::<Utc>::MAX_UTC);
        assert_eq!(Locator::expiration_for(&p, now), DateTime::<Utc>::MAX_UTC);

        p.duration_secs = 1_000_000_000 * 24 * 3600;
        let expiration = Locator::expiration_for(&p, now - Duration::minutes(5));
        assert!(expiration > now);
        assert!(expiration <= p.expires_at());
    }

    #[test]
    fn permissions() {
        let p = policy(Utc::now(), Duration::hours(1));
        assert!(p.allows(AccessPermission::Read));
        assert!(!p.allows(AccessPermission::Write));
    }
}
