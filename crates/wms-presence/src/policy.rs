use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use wms_schemas::UserRole;

/// What counts as "working" for each role, and for how long a view stays
/// fresh.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresencePolicy {
    pub activity_window_secs: i64,
    /// View-label prefixes per role. A label matches a prefix when it equals
    /// it or continues with `/`.
    pub working_views: BTreeMap<UserRole, Vec<String>>,
}

impl Default for PresencePolicy {
    fn default() -> Self {
        let views = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let mut working_views = BTreeMap::new();
        working_views.insert(UserRole::Picker, views(&["picking", "pick-task"]));
        working_views.insert(UserRole::Packer, views(&["packing"]));
        working_views.insert(UserRole::Supervisor, views(&["exceptions", "dashboard"]));
        working_views.insert(UserRole::Admin, views(&["dashboard"]));
        Self {
            activity_window_secs: 300,
            working_views,
        }
    }
}

impl PresencePolicy {
    pub fn is_working_view(&self, role: UserRole, view: &str) -> bool {
        let Some(prefixes) = self.working_views.get(&role) else {
            return false;
        };
        prefixes.iter().any(|p| {
            view == p
                || view
                    .strip_prefix(p.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_matches_whole_segments_only() {
        let p = PresencePolicy::default();
        assert!(p.is_working_view(UserRole::Picker, "picking"));
        assert!(p.is_working_view(UserRole::Picker, "picking/order/42"));
        assert!(!p.is_working_view(UserRole::Picker, "pickingfoo"));
        assert!(!p.is_working_view(UserRole::Picker, "packing"));
        assert!(p.is_working_view(UserRole::Packer, "packing/bench-3"));
    }

    #[test]
    fn role_without_views_is_never_working() {
        let mut p = PresencePolicy::default();
        p.working_views.remove(&UserRole::Admin);
        assert!(!p.is_working_view(UserRole::Admin, "dashboard"));
    }
}
