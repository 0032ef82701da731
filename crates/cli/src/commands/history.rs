use campulse::{ChannelConfig, HistoryLoader, HttpHistoryLoader};
use tracing::info;

use crate::error::Result;
use crate::output::Printer;

pub async fn execute(config: &ChannelConfig, group: &str, printer: &Printer) -> Result<()> {
	info!(target = "campulse.cli", %group, url = %config.history_url, "history");

	let loader = HttpHistoryLoader::new(config.history_url.clone(), config.history_timeout())?;
	let messages = loader.fetch_history(group).await?;

	for message in &messages {
		printer.message(message);
	}
	Ok(())
}
