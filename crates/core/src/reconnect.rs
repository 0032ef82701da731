//! Retry decisions for a dropped or refused transport.
//!
//! The delay is constant per attempt. `attempt` counts retries already made
//! since the last successful open, so a policy with `max_attempts = N` allows
//! exactly N retries after the initial attempt.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_BASE_DELAY_MS: u64 = 5000;

/// Bounded fixed-delay reconnect policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconnectPolicy {
	pub max_attempts: u32,
	pub base_delay_ms: u64,
}

impl Default for ReconnectPolicy {
	fn default() -> Self {
		Self {
			max_attempts: DEFAULT_MAX_ATTEMPTS,
			base_delay_ms: DEFAULT_BASE_DELAY_MS,
		}
	}
}

impl ReconnectPolicy {
	pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
		Self { max_attempts, base_delay_ms }
	}

	/// Policy that never retries.
	pub fn never() -> Self {
		Self {
			max_attempts: 0,
			..Self::default()
		}
	}

	pub fn should_retry(&self, attempt: u32) -> bool {
		attempt < self.max_attempts
	}

	pub fn next_delay(&self, _attempt: u32) -> Duration {
		Duration::from_millis(self.base_delay_ms)
	}

	/// Delay before retry number `attempt + 1`, or `Exhausted` when none is left.
	pub fn check(&self, attempt: u32) -> Result<Duration> {
		if self.should_retry(attempt) {
			Ok(self.next_delay(attempt))
		} else {
			Err(Error::Exhausted { attempts: attempt })
		}
	}

	pub fn validate(&self) -> Result<()> {
		if self.base_delay_ms == 0 {
			return Err(Error::Config("reconnect.baseDelayMs must be greater than zero".to_string()));
		}
		Ok(())
	}
}
