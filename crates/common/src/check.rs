//! Check vocabulary shared by the queue, the validation client, and the worker
//!
//! The seven checks are a closed set with a fixed canonical execution order:
//! the five profile-asset checks first (cheap, direct), then the two
//! rate-limited checks that must be routed through the egress pool.

use serde::{Deserialize, Serialize};

/// One of the seven validation checks run against an account.
///
/// Variant declaration order is the canonical execution order, so `Ord`
/// (and `BTreeMap` iteration over check maps) agrees with [`CheckName::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckName {
    AnimatedAvatar,
    AvatarFrame,
    MiniProfileBackground,
    ProfileBackground,
    SteamLevel,
    Friends,
    CsgoInventory,
}

impl CheckName {
    /// All checks in canonical execution order.
    pub const ALL: [CheckName; 7] = [
        CheckName::AnimatedAvatar,
        CheckName::AvatarFrame,
        CheckName::MiniProfileBackground,
        CheckName::ProfileBackground,
        CheckName::SteamLevel,
        CheckName::Friends,
        CheckName::CsgoInventory,
    ];

    /// Whether this check must go through the connection pool.
    ///
    /// `friends` and `csgo_inventory` hit rate-limited endpoints; the five
    /// profile-asset checks always go direct.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, CheckName::Friends | CheckName::CsgoInventory)
    }

    /// Wire/file name of the check (snake_case, matches the queue file keys).
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckName::AnimatedAvatar => "animated_avatar",
            CheckName::AvatarFrame => "avatar_frame",
            CheckName::MiniProfileBackground => "mini_profile_background",
            CheckName::ProfileBackground => "profile_background",
            CheckName::SteamLevel => "steam_level",
            CheckName::Friends => "friends",
            CheckName::CsgoInventory => "csgo_inventory",
        }
    }
}

impl std::fmt::Display for CheckName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-check progress status.
///
/// Transitions: `ToCheck → {Passed, Failed, Deferred}`, and
/// `Deferred → ToCheck` (the only reversal, applied when the pool recovers).
/// `Passed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    ToCheck,
    Passed,
    Failed,
    Deferred,
}

impl CheckStatus {
    /// Status label for health/logging.
    pub fn label(&self) -> &'static str {
        match self {
            CheckStatus::ToCheck => "to_check",
            CheckStatus::Passed => "passed",
            CheckStatus::Failed => "failed",
            CheckStatus::Deferred => "deferred",
        }
    }
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn canonical_order_puts_rate_limited_last() {
        let first_limited = CheckName::ALL
            .iter()
            .position(|c| c.is_rate_limited())
            .unwrap();
        assert!(CheckName::ALL[first_limited..].iter().all(|c| c.is_rate_limited()));
        assert_eq!(first_limited, 5);
    }

    #[test]
    fn btreemap_iteration_matches_canonical_order() {
        let map: BTreeMap<CheckName, CheckStatus> = CheckName::ALL
            .iter()
            .map(|c| (*c, CheckStatus::ToCheck))
            .collect();
        let keys: Vec<CheckName> = map.keys().copied().collect();
        assert_eq!(keys, CheckName::ALL);
    }

    #[test]
    fn serde_uses_snake_case_names() {
        let json = serde_json::to_string(&CheckName::CsgoInventory).unwrap();
        assert_eq!(json, "\"csgo_inventory\"");
        let back: CheckName = serde_json::from_str("\"mini_profile_background\"").unwrap();
        assert_eq!(back, CheckName::MiniProfileBackground);
    }

    #[test]
    fn status_roundtrips_through_serde() {
        for status in [
            CheckStatus::ToCheck,
            CheckStatus::Passed,
            CheckStatus::Failed,
            CheckStatus::Deferred,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.label()));
            let back: CheckStatus = serde_json::from_str(&json).unwrap();
            assert_eq!(back, status);
        }
    }

    #[test]
    fn display_matches_wire_name() {
        assert_eq!(CheckName::SteamLevel.to_string(), "steam_level");
        assert_eq!(CheckStatus::Deferred.to_string(), "deferred");
    }
}
