//! Check dispatch
//!
//! One `ValidationClient` serves the whole process. Profile-asset checks go
//! out on the pool's direct client; the rate-limited checks go through
//! `run_limited` (see `limited.rs`) with cooldown-and-rotate handling.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use common::{ApiKey, CheckName};
use egress_pool::ConnectionPool;

use crate::classify::error_chain;
use crate::error::{Error, Result};
use crate::pace::RateGate;
use crate::{CheckOutcome, profile};

/// Minimum interval between any two outbound calls.
pub const MIN_CALL_INTERVAL: Duration = Duration::from_secs(1);

/// Timeout for the non-rate-limited endpoints.
pub(crate) const DIRECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Timeout for the friends endpoint.
pub(crate) const FRIENDS_TIMEOUT: Duration = Duration::from_secs(15);
/// Timeout for the inventory endpoint.
pub(crate) const INVENTORY_TIMEOUT: Duration = Duration::from_secs(25);

/// Dispatches the seven checks against the remote account service.
pub struct ValidationClient {
    pub(crate) pool: Arc<ConnectionPool>,
    pub(crate) api_key: ApiKey,
    api_base: String,
    pub(crate) community_base: String,
    pub(crate) gate: RateGate,
    #[cfg(any(test, feature = "fault-injection"))]
    pub(crate) faults: crate::fault::FaultPlan,
}

impl ValidationClient {
    /// `api_base` is the account-service host, `community_base` the
    /// community host serving inventories; trailing slashes are tolerated.
    pub fn new(
        pool: Arc<ConnectionPool>,
        api_key: ApiKey,
        api_base: impl Into<String>,
        community_base: impl Into<String>,
    ) -> Self {
        let api_base = api_base.into().trim_end_matches('/').to_string();
        let community_base = community_base.into().trim_end_matches('/').to_string();
        Self {
            pool,
            api_key,
            api_base,
            community_base,
            gate: RateGate::new(MIN_CALL_INTERVAL),
            #[cfg(any(test, feature = "fault-injection"))]
            faults: crate::fault::FaultPlan::default(),
        }
    }

    /// Run one check for an account.
    pub async fn run(&self, check: CheckName, account_id: &str) -> Result<CheckOutcome> {
        debug!(check = %check, account_id, "dispatching check");
        if check.is_rate_limited() {
            self.run_limited(check, account_id).await
        } else {
            self.run_direct(check, account_id).await
        }
    }

    async fn run_direct(&self, check: CheckName, account_id: &str) -> Result<CheckOutcome> {
        let url = format!("{}{}", self.api_base, direct_path(check));
        let client = self.pool.direct_client().await;

        self.gate.wait().await;
        let mut request = client
            .get(&url)
            .timeout(DIRECT_TIMEOUT)
            .query(&[("steamid", account_id)]);
        if check == CheckName::SteamLevel {
            request = request.query(&[("key", self.api_key.expose())]);
        }

        let response = request.send().await.map_err(|e| Error::Transport {
            check,
            message: error_chain(&e),
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                check,
                status: status.as_u16(),
            });
        }
        let body: Value = response.json().await.map_err(|e| Error::BadResponse {
            check,
            message: error_chain(&e),
        })?;
        Ok(CheckOutcome::Verdict(profile::evaluate(check, &body)))
    }

    pub(crate) fn friends_url(&self) -> String {
        format!("{}/ISteamUser/GetFriendList/v0001/", self.api_base)
    }
}

/// Test-only pacing override so suites don't wait out the 1 s gate.
#[cfg(any(test, feature = "testing"))]
impl ValidationClient {
    pub fn set_min_interval(&mut self, interval: Duration) {
        self.gate = RateGate::new(interval);
    }
}

/// Fault-injection hook (see `fault.rs`).
#[cfg(any(test, feature = "fault-injection"))]
impl ValidationClient {
    pub fn faults(&self) -> &crate::fault::FaultPlan {
        &self.faults
    }
}

fn direct_path(check: CheckName) -> &'static str {
    match check {
        CheckName::AnimatedAvatar => "/IPlayerService/GetAnimatedAvatar/v1/",
        CheckName::AvatarFrame => "/IPlayerService/GetAvatarFrame/v1/",
        CheckName::MiniProfileBackground => "/IPlayerService/GetMiniProfileBackground/v1/",
        CheckName::ProfileBackground => "/IPlayerService/GetProfileBackground/v1/",
        CheckName::SteamLevel => "/IPlayerService/GetSteamLevel/v1/",
        CheckName::Friends | CheckName::CsgoInventory => {
            unreachable!("rate-limited checks do not use the direct path")
        }
    }
}
