use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
	#[error(transparent)]
	Channel(#[from] campulse::Error),

	#[error("invalid --{flag}: {reason}")]
	InvalidFlag { flag: &'static str, reason: String },

	#[error("no user name: pass --user or set `user` in the config file")]
	MissingUser,

	#[error(transparent)]
	Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;
