use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wms_schemas::{UserRole, WmsError};

use crate::policy::PresencePolicy;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityStatus {
    Active,
    Idle,
}

/// Last reported view of one user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEntry {
    pub user_id: String,
    pub role: UserRole,
    pub last_view: String,
    pub last_viewed_at: DateTime<Utc>,
}

/// Entry plus the status derived from it at snapshot time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceView {
    #[serde(flatten)]
    pub entry: PresenceEntry,
    pub status: ActivityStatus,
}

#[derive(Clone, Debug, Default)]
pub struct PresenceTracker {
    policy: PresencePolicy,
    entries: BTreeMap<String, PresenceEntry>,
}

impl PresenceTracker {
    pub fn new(policy: PresencePolicy) -> Self {
        Self {
            policy,
            entries: BTreeMap::new(),
        }
    }

    pub fn policy(&self) -> &PresencePolicy {
        &self.policy
    }

    /// Record a navigation event. Out-of-order reports (older than what is
    /// already stored) are ignored.
    pub fn report_view(
        &mut self,
        user_id: &str,
        role: UserRole,
        view: &str,
        at: DateTime<Utc>,
    ) -> Result<(), WmsError> {
        let user_id = user_id.trim();
        let view = view.trim();
        if user_id.is_empty() {
            return Err(WmsError::validation("user_id must not be empty"));
        }
        if view.is_empty() {
            return Err(WmsError::validation("view label must not be empty"));
        }
        if let Some(prev) = self.entries.get(user_id) {
            if prev.last_viewed_at > at {
                return Ok(());
            }
        }
        self.entries.insert(
            user_id.to_string(),
            PresenceEntry {
                user_id: user_id.to_string(),
                role,
                last_view: view.to_string(),
                last_viewed_at: at,
            },
        );
        Ok(())
    }

    /// Drop a user's entry (logout).
    pub fn forget(&mut self, user_id: &str) -> Option<PresenceEntry> {
        self.entries.remove(user_id.trim())
    }

    pub fn entry(&self, user_id: &str) -> Option<&PresenceEntry> {
        self.entries.get(user_id)
    }

    /// Unknown users are IDLE.
    pub fn status(&self, user_id: &str, now: DateTime<Utc>) -> ActivityStatus {
        match self.entries.get(user_id) {
            Some(e) => self.derive(e, now),
            None => ActivityStatus::Idle,
        }
    }

    /// Every known user, ordered by user id.
    pub fn snapshot(&self, now: DateTime<Utc>) -> Vec<PresenceView> {
        self.entries
            .values()
            .map(|e| PresenceView {
                entry: e.clone(),
                status: self.derive(e, now),
            })
            .collect()
    }

    fn derive(&self, e: &PresenceEntry, now: DateTime<Utc>) -> ActivityStatus {
        // a report stamped slightly in the future counts as fresh
        let age = (now - e.last_viewed_at).num_seconds().max(0);
        if age <= self.policy.activity_window_secs
            && self.policy.is_working_view(e.role, &e.last_view)
        {
            ActivityStatus::Active
        } else {
            ActivityStatus::Idle
        }
    }
}
