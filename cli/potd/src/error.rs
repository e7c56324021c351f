//! Error handling and display for the CLI.

use colored::Colorize;
use potd_archive::ArchiveError;
use potd_cache::CacheError;
use thiserror::Error;

/// Exit code for failures caused by the user's input or state.
pub const USER_ERROR_CODE: i32 = 2;

/// Exit code for everything else.
pub const SYSTEM_ERROR_CODE: i32 = 1;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid arguments or configuration.
    #[error("{0}")]
    User(String),

    #[error("There are no images in the cache.")]
    EmptyCache,

    #[error("Remote service error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

impl CliError {
    pub fn user(message: impl Into<String>) -> Self {
        Self::User(message.into())
    }

    /// Returns true if the user can fix this without a code change.
    pub fn is_user_error(&self) -> bool {
        match self {
            CliError::User(_) | CliError::EmptyCache => true,
            CliError::Archive(e) => e.is_invalid_range(),
            CliError::Cache(CacheError::InvalidCapacity(_)) => true,
            CliError::Cache(_) => false,
        }
    }
}

/// Process exit code for an error.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<CliError>() {
        Some(cli_err) if cli_err.is_user_error() => USER_ERROR_CODE,
        _ => SYSTEM_ERROR_CODE,
    }
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    let cli_err = err.downcast_ref::<CliError>();

    match cli_err {
        Some(e) if e.is_user_error() => eprintln!("{} {}", "Error:".red().bold(), err),
        _ => eprintln!("{} {:#}", "Failure:".red().bold(), err),
    }

    match cli_err {
        Some(CliError::EmptyCache) => {
            eprintln!(
                "\n{}",
                "Hint: Run `potd fetch` to download images first.".yellow()
            );
        }
        Some(CliError::Archive(e)) | Some(CliError::Cache(CacheError::Archive(e)))
            if e.is_remote() =>
        {
            eprintln!(
                "\n{}",
                "Hint: Check your network connection and try again.".yellow()
            );
        }
        Some(CliError::Cache(CacheError::Io(_))) => {
            eprintln!(
                "\n{}",
                "Hint: Check that the cache directory is writable.".yellow()
            );
        }
        _ => {}
    }
}
