use campulse::{ChannelConfig, HttpHistoryLoader};
use tracing::info;

use crate::error::Result;
use crate::output::Printer;
use crate::settings;

pub async fn execute(mut config: ChannelConfig, printer: &Printer) -> Result<()> {
	settings::require_user(&mut config)?;
	info!(target = "campulse.cli", user = %config.user, url = %config.history_url, "groups");

	let loader = HttpHistoryLoader::new(config.history_url.clone(), config.history_timeout())?;
	let groups = loader.fetch_groups(&config.user).await?;

	if groups.is_empty() {
		printer.notice(&format!("{} is not in any group", config.user));
	}
	for group in &groups {
		printer.group(group);
	}
	Ok(())
}
