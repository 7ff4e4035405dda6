//! Rate-limited checks routed through the egress pool
//!
//! One dispatch attempt per pool connection: a 429 or a classified transport
//! failure cools the current connection and the same call is retried through
//! the next one. The loop terminates because every cooled connection shrinks
//! the available set — once the pool reports `all_in_cooldown` the check is
//! deferred with the earliest retry time.

use serde_json::Value;
use tracing::{debug, warn};

use common::CheckName;
use egress_pool::{ErrorClass, Selected};

use crate::classify::{classify_transport, error_chain};
use crate::client::{FRIENDS_TIMEOUT, INVENTORY_TIMEOUT, ValidationClient};
use crate::error::{Error, Result};
use crate::{CheckOutcome, Verdict};

/// Why a single dispatch attempt did not produce a verdict.
enum Dispatch {
    /// Cool the current connection and retry through the next one.
    Cooldown { class: ErrorClass, message: String },
    /// Surface to the caller; the check stays `to_check`.
    Transient(String),
    Status(u16),
    BadResponse(String),
}

impl ValidationClient {
    pub(crate) async fn run_limited(
        &self,
        check: CheckName,
        account_id: &str,
    ) -> Result<CheckOutcome> {
        let mut selected = self.pool.current().await;
        loop {
            if selected.all_in_cooldown {
                let retry_in = selected.retry_in.unwrap_or_default();
                debug!(
                    check = %check,
                    retry_in_ms = retry_in.as_millis() as u64,
                    "pool fully cooled, deferring check"
                );
                return Ok(CheckOutcome::Deferred { retry_in });
            }

            self.gate.wait().await;
            match self.dispatch_limited(check, account_id, &selected).await {
                Ok(outcome) => return Ok(outcome),
                Err(Dispatch::Cooldown { class, message }) => {
                    warn!(
                        check = %check,
                        connection = %selected.name,
                        class = class.label(),
                        error = %message,
                        "cooling connection, retrying through next"
                    );
                    selected = self.pool.mark_current_cooldown(class, check, &message).await;
                }
                Err(Dispatch::Transient(message)) => {
                    return Err(Error::Transport { check, message });
                }
                Err(Dispatch::Status(status)) => return Err(Error::Status { check, status }),
                Err(Dispatch::BadResponse(message)) => {
                    return Err(Error::BadResponse { check, message });
                }
            }
        }
    }

    async fn dispatch_limited(
        &self,
        check: CheckName,
        account_id: &str,
        selected: &Selected,
    ) -> std::result::Result<CheckOutcome, Dispatch> {
        #[cfg(any(test, feature = "fault-injection"))]
        if let Some(fault) = self.faults.take().await {
            return Err(simulated(fault));
        }

        match check {
            CheckName::Friends => self.fetch_friends(account_id, selected).await,
            CheckName::CsgoInventory => self.fetch_inventory(account_id, selected).await,
            _ => unreachable!("only rate-limited checks reach the pool path"),
        }
    }

    async fn fetch_friends(
        &self,
        account_id: &str,
        selected: &Selected,
    ) -> std::result::Result<CheckOutcome, Dispatch> {
        let response = selected
            .client
            .get(self.friends_url())
            .timeout(FRIENDS_TIMEOUT)
            .query(&[
                ("key", self.api_key.expose()),
                ("steamid", account_id),
                ("relationship", "friend"),
            ])
            .send()
            .await
            .map_err(map_transport)?;

        let status = response.status();
        if status.as_u16() == 401 {
            return Ok(CheckOutcome::Verdict(private_verdict()));
        }
        if status.as_u16() == 429 {
            return Err(Dispatch::Cooldown {
                class: ErrorClass::RateLimited,
                message: "HTTP 429".into(),
            });
        }
        if !status.is_success() {
            return Err(Dispatch::Status(status.as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Dispatch::BadResponse(error_chain(&e)))?;
        let count = body
            .get("friendslist")
            .and_then(|l| l.get("friends"))
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0);
        if count <= 60 {
            Ok(CheckOutcome::Verdict(Verdict::pass()))
        } else {
            Ok(CheckOutcome::Verdict(Verdict::fail(format!(
                "{count} friends"
            ))))
        }
    }

    async fn fetch_inventory(
        &self,
        account_id: &str,
        selected: &Selected,
    ) -> std::result::Result<CheckOutcome, Dispatch> {
        let url = format!("{}/inventory/{account_id}/730/2", self.community_base);
        let response = selected
            .client
            .get(&url)
            .timeout(INVENTORY_TIMEOUT)
            .header("Sec-Fetch-Dest", "empty")
            .header("Sec-Fetch-Mode", "cors")
            .header("Sec-Fetch-Site", "same-origin")
            .send()
            .await
            .map_err(map_transport)?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Ok(CheckOutcome::Verdict(private_verdict()));
        }
        if status.as_u16() == 429 {
            return Err(Dispatch::Cooldown {
                class: ErrorClass::RateLimited,
                message: "HTTP 429".into(),
            });
        }
        // The inventory endpoint answers 3xx for some private profiles.
        if !status.is_success() && !status.is_redirection() {
            return Err(Dispatch::Status(status.as_u16()));
        }

        let text = response
            .text()
            .await
            .map_err(|e| Dispatch::Transient(error_chain(&e)))?;
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed == "null" {
            return Ok(CheckOutcome::Verdict(Verdict::pass()));
        }
        let body: Value =
            serde_json::from_str(trimmed).map_err(|e| Dispatch::BadResponse(e.to_string()))?;
        let has_assets = match body.get("assets") {
            None | Some(Value::Null) => false,
            Some(Value::Array(items)) => !items.is_empty(),
            Some(_) => true,
        };
        if has_assets {
            Ok(CheckOutcome::Verdict(Verdict::fail("inventory has assets")))
        } else {
            Ok(CheckOutcome::Verdict(Verdict::pass()))
        }
    }
}

/// Pass without the private marker: only `steam_level` is allowed to
/// short-circuit the remaining checks.
fn private_verdict() -> Verdict {
    Verdict {
        passed: true,
        reason: Some("private".into()),
        private_profile: false,
    }
}

fn map_transport(err: reqwest::Error) -> Dispatch {
    let message = error_chain(&err);
    match classify_transport(&message) {
        Some(class) => Dispatch::Cooldown { class, message },
        None => Dispatch::Transient(message),
    }
}

#[cfg(any(test, feature = "fault-injection"))]
fn simulated(fault: crate::fault::Fault) -> Dispatch {
    use crate::fault::Fault;
    match fault {
        Fault::RateLimit => Dispatch::Cooldown {
            class: ErrorClass::RateLimited,
            message: "HTTP 429 (injected)".into(),
        },
        Fault::Connection => Dispatch::Cooldown {
            class: ErrorClass::Connection,
            message: "connection reset (injected)".into(),
        },
        Fault::Socks => Dispatch::Cooldown {
            class: ErrorClass::Socks,
            message: "socks handshake failed (injected)".into(),
        },
    }
}
