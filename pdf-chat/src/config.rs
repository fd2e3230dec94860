use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ChatError, Result};

pub const API_KEY_VAR: &str = "GENAI_API_KEY";
pub const PDF_PATH_VAR: &str = "PDF_PATH";
pub const PORT_VAR: &str = "PORT";
pub const TIMEOUT_VAR: &str = "GENERATION_TIMEOUT_SECS";
pub const SESSION_TTL_VAR: &str = "SESSION_TTL_SECS";

pub const DEFAULT_PDF_PATH: &str = "aicouncil_brochure.pdf";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_SESSION_TTL_SECS: u64 = 30 * 60;

/// Process-level settings, read once at startup.
#[derive(Clone)]
pub struct ChatConfig {
    pub api_key: String,
    pub pdf_path: PathBuf,
    pub port: u16,
    pub generation_timeout: Duration,
    /// Sessions with no activity for this long are ended.
    pub session_ttl: Duration,
}

impl std::fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatConfig")
            .field("api_key", &"<redacted>")
            .field("pdf_path", &self.pdf_path)
            .field("port", &self.port)
            .field("generation_timeout", &self.generation_timeout)
            .field("session_ttl", &self.session_ttl)
            .finish()
    }
}

impl ChatConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = get(API_KEY_VAR).ok_or_else(|| {
            ChatError::Configuration(format!(
                "API key not found! Please set the {API_KEY_VAR} environment variable."
            ))
        })?;

        let pdf_path = get(PDF_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PDF_PATH));

        let port = match get(PORT_VAR) {
            Some(raw) => raw.trim().parse::<u16>().map_err(|e| {
                ChatError::Configuration(format!("invalid {PORT_VAR} '{raw}': {e}"))
            })?,
            None => DEFAULT_PORT,
        };

        let timeout_secs = positive_secs(get(TIMEOUT_VAR), TIMEOUT_VAR, DEFAULT_TIMEOUT_SECS)?;
        let ttl_secs = positive_secs(
            get(SESSION_TTL_VAR),
            SESSION_TTL_VAR,
            DEFAULT_SESSION_TTL_SECS,
        )?;

        Ok(Self {
            api_key,
            pdf_path,
            port,
            generation_timeout: Duration::from_secs(timeout_secs),
            session_ttl: Duration::from_secs(ttl_secs),
        })
    }
}

fn positive_secs(raw: Option<String>, var: &str, default: u64) -> Result<u64> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(ChatError::Configuration(format!(
            "{var} must be greater than zero"
        ))),
        Ok(secs) => Ok(secs),
        Err(e) => Err(ChatError::Configuration(format!(
            "invalid {var} '{raw}': {e}"
        ))),
    }
}
