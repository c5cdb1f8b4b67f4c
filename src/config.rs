use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use dotenv::dotenv;
use tracing::{debug, info};

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SESSION_FILE: &str = ".homelands_session.json";

/// Backend connection settings, read from the environment (and `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    pub api_url: String,
    pub api_key: String,
    pub timeout: Duration,
    pub session_file: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenv().ok();

        let api_url = require(&["HOMELANDS_API_URL", "SUPABASE_URL"])?;
        let api_key = require(&["HOMELANDS_API_KEY", "SUPABASE_KEY"])?;

        let timeout = match lookup(&["HOMELANDS_TIMEOUT_SECS"]) {
            Some(raw) => Duration::from_secs(
                raw.parse()
                    .with_context(|| format!("Invalid HOMELANDS_TIMEOUT_SECS value: {raw}"))?,
            ),
            None => {
                info!("HOMELANDS_TIMEOUT_SECS not set, using default: {DEFAULT_TIMEOUT_SECS}");
                Duration::from_secs(DEFAULT_TIMEOUT_SECS)
            }
        };

        let session_file = lookup(&["HOMELANDS_SESSION_FILE"])
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SESSION_FILE));

        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
            timeout,
            session_file,
        })
    }

    pub fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.api_url, table)
    }

    pub fn auth_url(&self, endpoint: &str) -> String {
        format!("{}/auth/v1/{}", self.api_url, endpoint)
    }
}

fn lookup(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        let value = env::var(key).ok().filter(|v| !v.trim().is_empty());
        if value.is_some() {
            debug!("Using {key} from environment");
        }
        value
    })
}

fn require(keys: &[&str]) -> Result<String> {
    match lookup(keys) {
        Some(value) => Ok(value),
        None => bail!("Environment variable {} is not set", keys.join(" or ")),
    }
}
