//! Resolves the channel configuration: config file first, then flags.

use std::path::{Path, PathBuf};

use campulse::{ChannelConfig, Endpoint};
use tracing::debug;
use url::Url;

use crate::cli::Overrides;
use crate::error::{CliError, Result};

/// `<config dir>/campulse/chat.json`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
	dirs::config_dir().map(|dir| dir.join("campulse").join("chat.json"))
}

/// Loads `explicit` (which must exist) or the default config file when it
/// exists, then applies `overrides`.
pub fn resolve(explicit: Option<&Path>, overrides: &Overrides) -> Result<ChannelConfig> {
	let mut config = match explicit {
		Some(path) => ChannelConfig::from_file(path)?,
		None => match default_config_path().filter(|path| path.is_file()) {
			Some(path) => {
				debug!(target = "campulse.cli", path = %path.display(), "loading default config");
				ChannelConfig::from_file(&path)?
			}
			None => ChannelConfig::default(),
		},
	};
	apply(&mut config, overrides)?;
	Ok(config)
}

pub fn apply(config: &mut ChannelConfig, overrides: &Overrides) -> Result<()> {
	if let Some(endpoint) = &overrides.endpoint {
		config.endpoint = Endpoint::parse(endpoint).map_err(|e| CliError::InvalidFlag {
			flag: "endpoint",
			reason: e.to_string(),
		})?;
	}
	if let Some(history_url) = &overrides.history_url {
		config.history_url = Url::parse(history_url).map_err(|e| CliError::InvalidFlag {
			flag: "history-url",
			reason: e.to_string(),
		})?;
	}
	if let Some(user) = &overrides.user {
		config.user = user.trim().to_string();
	}
	if let Some(wire) = overrides.wire {
		config.wire = wire.into();
	}
	if overrides.sockjs {
		config.sockjs = true;
	}
	if let Some(max_attempts) = overrides.max_attempts {
		config.reconnect.max_attempts = max_attempts;
	}
	if let Some(delay) = overrides.retry_delay_ms {
		config.reconnect.base_delay_ms = delay;
	}
	if overrides.announce_join {
		config.announce_join = true;
	}
	Ok(())
}

/// Falls back to the login name when no user was configured.
pub fn require_user(config: &mut ChannelConfig) -> Result<()> {
	if !config.user.trim().is_empty() {
		return Ok(());
	}
	match std::env::var("USER").or_else(|_| std::env::var("USERNAME")) {
		Ok(name) if !name.trim().is_empty() => {
			config.user = name.trim().to_string();
			Ok(())
		}
		_ => Err(CliError::MissingUser),
	}
}
