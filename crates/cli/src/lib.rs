//! Shared bootstrap for the `sync_candles` and `clean_candles` binaries.

use candlestore_archive::{CreatePrompt, Store};
use candlestore_core::{Config, Error};
use std::io::{self, BufRead, Write};
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

/// Load configuration, honouring a `.env` file.
///
/// Returns `Ok(None)` after logging a diagnostic when the configuration is
/// unavailable; the caller should then do nothing.
pub fn load_config() -> anyhow::Result<Option<Config>> {
    dotenv::dotenv().ok();
    match Config::load() {
        Ok(config) => Ok(Some(config)),
        Err(Error::Config(msg)) => {
            tracing::error!("{msg}");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Ask a yes/no question on stdin. Anything but `y`/`yes` is a no.
pub fn confirm(question: &str) -> bool {
    print!("{question} [y/n] ");
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    is_yes(&answer)
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Question shown before the store creates something.
pub fn prompt_text(prompt: &CreatePrompt<'_>) -> String {
    match prompt {
        CreatePrompt::Archive(path) => {
            format!("Archive \"{}\" does not exist. Create it?", path.display())
        }
        CreatePrompt::Table(resolution) => {
            format!("Table for resolution {resolution} does not exist. Create it?")
        }
    }
}

/// Open an archive, asking on stdin before creating anything.
pub fn open_store(path: &Path) -> anyhow::Result<Store> {
    let store = Store::open(path, false, |prompt| confirm(&prompt_text(prompt)))?;
    Ok(store)
}
