mod chat;
mod groups;
mod history;

use campulse::ChannelConfig;

use crate::cli::Commands;
use crate::error::Result;
use crate::output::Printer;

pub async fn dispatch(command: Commands, config: ChannelConfig, printer: Printer) -> Result<()> {
	match command {
		Commands::Chat { group } => chat::execute(config, &group, printer).await,
		Commands::History { group } => history::execute(&config, &group, &printer).await,
		Commands::Groups => groups::execute(config, &printer).await,
	}
}
