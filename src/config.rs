use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub const DEFAULT_ENDPOINT: &str = "https://www.tvprogram.cz/ajax/program.php";
pub const DEFAULT_LOGIN_FILE: &str = ".tvp_login";

/// Runtime settings for talking to the schedule endpoint.
#[derive(Clone, Debug, PartialEq)]
pub struct ScrapeConfig {
    pub endpoint: String,
    pub cookie: Option<String>,
    /// Unset keeps the transport's own default.
    pub timeout_secs: Option<u64>,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            cookie: None,
            timeout_secs: None,
        }
    }
}

impl ScrapeConfig {
    /// Resolve settings once at startup. The cookie comes from, in order:
    /// the `--cookie` argument, `TVP_LOGIN`, then the credential file
    /// (`TVP_LOGIN_FILE`, default `.tvp_login`).
    pub fn from_env(cookie_arg: Option<String>) -> Result<Self> {
        let mut cfg = Self::default();
        if let Ok(endpoint) = std::env::var("TVP_ENDPOINT") {
            cfg.endpoint = endpoint;
        }
        if let Ok(timeout) = std::env::var("TVP_TIMEOUT_SECS") {
            if let Ok(parsed) = timeout.parse::<u64>() {
                cfg.timeout_secs = Some(parsed);
            }
        }

        let login_file = std::env::var("TVP_LOGIN_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_LOGIN_FILE));

        cfg.cookie = match non_empty(cookie_arg).or_else(|| non_empty(std::env::var("TVP_LOGIN").ok())) {
            Some(v) => Some(v),
            None => read_login_file(&login_file)?,
        };
        Ok(cfg)
    }
}

/// First non-empty line of the credential file, or `None` if the file is absent.
pub fn read_login_file(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading credential file {}", path.display()))?;
    Ok(raw.lines().map(str::trim).find(|l| !l.is_empty()).map(str::to_string))
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("tvp-{}-{}", name, uuid::Uuid::new_v4()))
    }

    #[test]
    fn missing_login_file_is_not_an_error() {
        let got = read_login_file(&temp_path("absent")).unwrap();
        assert_eq!(got, None);
    }

    #[test]
    fn login_file_first_non_empty_line() {
        let path = temp_path("login");
        std::fs::write(&path, "\n   \n  abc123  \nsecond\n").unwrap();
        let got = read_login_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(got.as_deref(), Some("abc123"));
    }

    #[test]
    fn blank_values_are_dropped() {
        assert_eq!(non_empty(Some("   ".into())), None);
        assert_eq!(non_empty(Some(" x ".into())).as_deref(), Some("x"));
        assert_eq!(non_empty(None), None);
    }
}
