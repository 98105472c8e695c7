//! Map a raw endpoint response onto a per-date outcome.

use reqwest::StatusCode;

use super::fetch::RawResponse;
use super::parse::decode_envelope;
use super::signature::RequestSignature;

/// Error code the endpoint uses for "too many requests".
pub const RATE_LIMIT_CODE: i64 = 1226;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The round was already signalled before this request went out.
    Skipped,
    Blocked,
    RateLimited,
    Malformed(String),
    ServerError(String),
    Transport(String),
    Empty,
    Parsed(String),
}

/// Round-level effect of an outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signal {
    IpBlocked,
    RateLimited,
}

impl FetchOutcome {
    pub fn signal(&self) -> Option<Signal> {
        match self {
            FetchOutcome::Blocked => Some(Signal::IpBlocked),
            FetchOutcome::RateLimited => Some(Signal::RateLimited),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FetchOutcome::Skipped => "skipped",
            FetchOutcome::Blocked => "blocked",
            FetchOutcome::RateLimited => "rate_limited",
            FetchOutcome::Malformed(_) => "malformed",
            FetchOutcome::ServerError(_) => "server_error",
            FetchOutcome::Transport(_) => "transport",
            FetchOutcome::Empty => "empty",
            FetchOutcome::Parsed(_) => "parsed",
        }
    }
}

pub fn classify(raw: &RawResponse, sig: &RequestSignature) -> FetchOutcome {
    if raw.status == StatusCode::FORBIDDEN {
        return FetchOutcome::Blocked;
    }

    let env = match decode_envelope(&raw.body, &sig.callback()) {
        Ok(env) => env,
        Err(e) => return FetchOutcome::Malformed(e.to_string()),
    };

    if !raw.status.is_success() {
        if env.code == Some(RATE_LIMIT_CODE) {
            return FetchOutcome::RateLimited;
        }
        if let Some(msg) = env.message {
            return FetchOutcome::ServerError(msg);
        }
        let reason = raw.status.canonical_reason().unwrap_or("");
        return FetchOutcome::ServerError(format!("{} {}", raw.status.as_u16(), reason).trim_end().to_string());
    }

    match env.program() {
        Some(program) => FetchOutcome::Parsed(program.to_string()),
        None => FetchOutcome::Empty,
    }
}
