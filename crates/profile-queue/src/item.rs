//! Queue item shape and input validation

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use common::{CheckName, CheckStatus};

/// One queued submission.
///
/// Identity is `account_id`; the checks map always holds all seven check
/// names. `enqueued_at` is wall-clock epoch milliseconds so the record stays
/// meaningful across restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub account_id: String,
    pub submitter: String,
    pub enqueued_at: u64,
    pub checks: BTreeMap<CheckName, CheckStatus>,
}

impl QueueItem {
    /// A fresh item with every check at `to_check`.
    pub fn new(account_id: String, submitter: String) -> Self {
        let enqueued_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self {
            account_id,
            submitter,
            enqueued_at,
            checks: CheckName::ALL
                .iter()
                .map(|c| (*c, CheckStatus::ToCheck))
                .collect(),
        }
    }

    /// Fill any check name missing from an on-disk record with `to_check`.
    pub(crate) fn normalize(&mut self) {
        for check in CheckName::ALL {
            self.checks.entry(check).or_insert(CheckStatus::ToCheck);
        }
    }

    pub fn has_tocheck(&self) -> bool {
        self.checks.values().any(|s| *s == CheckStatus::ToCheck)
    }

    pub fn has_deferred(&self) -> bool {
        self.checks.values().any(|s| *s == CheckStatus::Deferred)
    }

    /// The `to_check` checks in canonical execution order.
    pub fn to_run(&self) -> Vec<CheckName> {
        // BTreeMap iteration order is the canonical order.
        self.checks
            .iter()
            .filter(|(_, s)| **s == CheckStatus::ToCheck)
            .map(|(c, _)| *c)
            .collect()
    }

    /// The deferred rate-limited checks, if any.
    pub fn deferred_checks(&self) -> Vec<CheckName> {
        self.checks
            .iter()
            .filter(|(_, s)| **s == CheckStatus::Deferred)
            .map(|(c, _)| *c)
            .collect()
    }

    /// Whether every check reached a terminal status.
    pub fn is_settled(&self) -> bool {
        self.checks
            .values()
            .all(|s| matches!(s, CheckStatus::Passed | CheckStatus::Failed))
    }

    pub fn all_passed(&self) -> bool {
        self.checks.values().all(|s| *s == CheckStatus::Passed)
    }

    /// Whether any profile-asset (non-rate-limited) check is still `to_check`.
    pub fn has_direct_tocheck(&self) -> bool {
        self.checks
            .iter()
            .any(|(c, s)| !c.is_rate_limited() && *s == CheckStatus::ToCheck)
    }
}

/// An account id is exactly 17 ASCII digits.
pub fn valid_account_id(id: &str) -> bool {
    id.len() == 17 && id.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_item_has_all_checks_to_check() {
        let item = QueueItem::new("76561197960434622".into(), "alice".into());
        assert_eq!(item.checks.len(), 7);
        assert!(item.has_tocheck());
        assert!(!item.has_deferred());
        assert_eq!(item.to_run(), CheckName::ALL.to_vec());
    }

    #[test]
    fn to_run_is_in_canonical_order_after_partial_progress() {
        let mut item = QueueItem::new("76561197960434622".into(), "alice".into());
        item.checks.insert(CheckName::AvatarFrame, CheckStatus::Passed);
        item.checks.insert(CheckName::SteamLevel, CheckStatus::Passed);
        let rest = item.to_run();
        assert_eq!(
            rest,
            vec![
                CheckName::AnimatedAvatar,
                CheckName::MiniProfileBackground,
                CheckName::ProfileBackground,
                CheckName::Friends,
                CheckName::CsgoInventory,
            ]
        );
    }

    #[test]
    fn settled_and_all_passed() {
        let mut item = QueueItem::new("76561197960434622".into(), "alice".into());
        for check in CheckName::ALL {
            item.checks.insert(check, CheckStatus::Passed);
        }
        assert!(item.is_settled());
        assert!(item.all_passed());

        item.checks.insert(CheckName::Friends, CheckStatus::Failed);
        assert!(item.is_settled());
        assert!(!item.all_passed());

        item.checks.insert(CheckName::Friends, CheckStatus::Deferred);
        assert!(!item.is_settled());
    }

    #[test]
    fn normalize_fills_missing_checks() {
        let mut item = QueueItem::new("76561197960434622".into(), "alice".into());
        item.checks.remove(&CheckName::CsgoInventory);
        item.normalize();
        assert_eq!(item.checks.len(), 7);
        assert_eq!(
            item.checks[&CheckName::CsgoInventory],
            CheckStatus::ToCheck
        );
    }

    #[test]
    fn account_id_validation() {
        assert!(valid_account_id("76561197960434622"));
        assert!(!valid_account_id("7656119796043462")); // 16 digits
        assert!(!valid_account_id("765611979604346221")); // 18 digits
        assert!(!valid_account_id("7656119796043462x"));
        assert!(!valid_account_id(""));
    }
}
