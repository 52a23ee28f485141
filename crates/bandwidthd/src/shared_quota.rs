//! Shared quota group state and transition planning
//!
//! The group's quota rule in `bw_costly_shared` exists exactly while the
//! member set is non-empty. Planning is separate from execution: the
//! controller asks for a plan, issues the commands it names, and only then
//! commits the new state.

use std::collections::BTreeSet;

use netd_common::{NetdError, NetdResult};

/// Members and quota of the single shared quota group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SharedQuotaGroup {
    quota: u64,
    alert: u64,
    members: BTreeSet<String>,
}

/// What adding (or re-adding) a member requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddPlan {
    /// Link the interface into the shared chain.
    pub link: bool,
    /// Insert the quota rule (first member).
    pub insert_quota_rule: bool,
    /// Rewrite the quota value in place.
    pub update_quota: Option<u64>,
}

impl AddPlan {
    /// True when nothing needs to be done.
    pub fn is_noop(&self) -> bool {
        !self.link && !self.insert_quota_rule && self.update_quota.is_none()
    }
}

/// What removing a member requires, beyond unlinking it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemovePlan {
    /// Delete the quota rule with this value (last member).
    pub delete_quota_rule: Option<u64>,
    /// Delete the shared alert with this value (last member, alert set).
    pub delete_alert: Option<u64>,
}

impl SharedQuotaGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current quota in bytes; 0 while the group is empty.
    pub fn quota(&self) -> u64 {
        self.quota
    }

    /// Current shared alert in bytes; 0 when unset.
    pub fn alert(&self) -> u64 {
        self.alert
    }

    pub fn set_alert(&mut self, bytes: u64) {
        self.alert = bytes;
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_member(&self, iface: &str) -> bool {
        self.members.contains(iface)
    }

    /// Plans adding `iface` with a group quota of `bytes`.
    pub fn plan_add(&self, iface: &str, bytes: u64) -> AddPlan {
        let first = self.members.is_empty();
        let recorded = if first { bytes } else { self.quota };
        AddPlan {
            link: !self.members.contains(iface),
            insert_quota_rule: first,
            update_quota: (bytes != recorded).then_some(bytes),
        }
    }

    /// Records a completed add.
    pub fn commit_add(&mut self, iface: &str, bytes: u64) {
        self.members.insert(iface.to_string());
        self.quota = bytes;
    }

    /// Plans removing `iface`; fails if it is not a member.
    pub fn plan_remove(&self, iface: &str) -> NetdResult<RemovePlan> {
        if !self.members.contains(iface) {
            return Err(NetdError::not_found("shared quota member", iface));
        }
        let last = self.members.len() == 1;
        Ok(RemovePlan {
            delete_quota_rule: last.then_some(self.quota),
            delete_alert: (last && self.alert > 0).then_some(self.alert),
        })
    }

    /// Records a completed removal.
    pub fn commit_remove(&mut self, iface: &str) {
        self.members.remove(iface);
        if self.members.is_empty() {
            self.quota = 0;
            self.alert = 0;
        }
    }

    /// Forgets everything (the chains were flushed).
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_member_inserts_rule() {
        let group = SharedQuotaGroup::new();
        let plan = group.plan_add("wlan0", 123456);
        assert_eq!(
            plan,
            AddPlan {
                link: true,
                insert_quota_rule: true,
                update_quota: None,
            }
        );
    }

    #[test]
    fn test_second_member_only_links() {
        let mut group = SharedQuotaGroup::new();
        group.commit_add("wlan0", 100);

        let plan = group.plan_add("rmnet0", 100);
        assert!(plan.link);
        assert!(!plan.insert_quota_rule);
        assert_eq!(plan.update_quota, None);
    }

    #[test]
    fn test_new_member_with_different_quota() {
        let mut group = SharedQuotaGroup::new();
        group.commit_add("wlan0", 100);

        let plan = group.plan_add("rmnet0", 200);
        assert!(plan.link);
        assert_eq!(plan.update_quota, Some(200));
    }

    #[test]
    fn test_existing_member() {
        let mut group = SharedQuotaGroup::new();
        group.commit_add("wlan0", 100);

        assert!(group.plan_add("wlan0", 100).is_noop());

        let plan = group.plan_add("wlan0", 101);
        assert!(!plan.link);
        assert!(!plan.insert_quota_rule);
        assert_eq!(plan.update_quota, Some(101));
    }

    #[test]
    fn test_remove_plans() {
        let mut group = SharedQuotaGroup::new();
        group.commit_add("a", 100);
        group.commit_add("b", 100);
        group.set_alert(50);

        let plan = group.plan_remove("a").unwrap();
        assert_eq!(plan.delete_quota_rule, None);
        assert_eq!(plan.delete_alert, None);
        group.commit_remove("a");

        let plan = group.plan_remove("b").unwrap();
        assert_eq!(plan.delete_quota_rule, Some(100));
        assert_eq!(plan.delete_alert, Some(50));
        group.commit_remove("b");

        assert!(group.is_empty());
        assert_eq!(group.quota(), 0);
        assert_eq!(group.alert(), 0);
    }

    #[test]
    fn test_remove_non_member() {
        let group = SharedQuotaGroup::new();
        let err = group.plan_remove("wlan0").unwrap_err();
        assert!(matches!(err, NetdError::NotFound { .. }));
    }
}
