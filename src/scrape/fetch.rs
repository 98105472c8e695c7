use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE};
use reqwest::{Client as HttpClient, StatusCode};
use url::Url;

use crate::config::ScrapeConfig;

use super::signature::RequestSignature;

/// Name of the session cookie the endpoint expects.
pub const LOGIN_COOKIE: &str = "tvp_login";

/// One endpoint request: the date/channel pair plus its signature.
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduleRequest {
    pub date: String,
    pub channel: String,
    pub signature: RequestSignature,
}

impl ScheduleRequest {
    pub fn new(date: impl Into<String>, channel: impl Into<String>) -> Self {
        let date = date.into();
        let channel = channel.into();
        let signature = super::signature::generate(&date, &channel);
        Self { date, channel, signature }
    }

    pub fn url(&self, endpoint: &str) -> Result<Url, FetchError> {
        let code = self.signature.code.to_string();
        let callback = self.signature.callback();
        Url::parse_with_params(endpoint, [
            ("callback", callback.as_str()),
            ("datum", self.date.as_str()),
            ("kanal", self.channel.as_str()),
            (self.signature.code_name.as_str(), code.as_str()),
        ])
        .map_err(|e| FetchError::InvalidEndpoint(e.to_string()))
    }
}

/// Status and body as they came off the wire; classification happens later.
#[derive(Clone, Debug, PartialEq)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: String,
}

#[cfg(test)]
impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body: body.into(),
        }
    }
}

#[derive(Debug)]
pub enum FetchError {
    InvalidEndpoint(String),
    InvalidCookie,
    Http(reqwest::Error),
    Timeout,
    #[cfg(test)]
    MockQueueEmpty(String),
}

impl FetchError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() { FetchError::Timeout } else { FetchError::Http(err) }
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::InvalidEndpoint(e) => write!(f, "invalid endpoint url: {e}"),
            FetchError::InvalidCookie => write!(f, "login cookie contains characters not allowed in a header"),
            FetchError::Http(err) => write!(f, "http error: {err}"),
            FetchError::Timeout => write!(f, "request timed out"),
            #[cfg(test)]
            FetchError::MockQueueEmpty(date) => write!(f, "no mock response queued for {date}"),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Http(err) => Some(err),
            _ => None,
        }
    }
}

/// Anything that can answer a schedule request with a raw response.
#[async_trait]
pub trait ScheduleSource: Send + Sync {
    async fn get(&self, req: &ScheduleRequest) -> Result<RawResponse, FetchError>;
}

#[derive(Clone)]
pub struct HttpSource {
    http: HttpClient,
    endpoint: String,
    cookie: Option<HeaderValue>,
}

impl HttpSource {
    pub fn new(cfg: &ScrapeConfig) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static("x-requested-with"), HeaderValue::from_static("XMLHttpRequest"));

        let mut builder = HttpClient::builder().default_headers(headers);
        if let Some(secs) = cfg.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder.build().map_err(FetchError::from_reqwest)?;

        let cookie = match &cfg.cookie {
            Some(v) => Some(
                HeaderValue::from_str(&format!("{LOGIN_COOKIE}={v}"))
                    .map_err(|_| FetchError::InvalidCookie)?,
            ),
            None => None,
        };

        Ok(Self { http, endpoint: cfg.endpoint.clone(), cookie })
    }
}

#[async_trait]
impl ScheduleSource for HttpSource {
    async fn get(&self, req: &ScheduleRequest) -> Result<RawResponse, FetchError> {
        let url = req.url(&self.endpoint)?;
        let mut builder = self.http.get(url);
        if let Some(cookie) = &self.cookie {
            builder = builder.header(COOKIE, cookie.clone());
        }

        let response = builder.send().await.map_err(FetchError::from_reqwest)?;
        let status = response.status();
        let body = response.text().await.map_err(FetchError::from_reqwest)?;
        Ok(RawResponse { status, body })
    }
}

#[cfg(test)]
pub use mock::MockSource;

#[cfg(test)]
mod mock {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::{FetchError, RawResponse, ScheduleRequest, ScheduleSource};

    type Queued = (Option<Duration>, Result<RawResponse, FetchError>);

    /// Per-date queue of canned responses; records every date it was asked for.
    #[derive(Debug, Default)]
    pub struct MockSource {
        responses: Mutex<HashMap<String, VecDeque<Queued>>>,
        calls: Mutex<Vec<ScheduleRequest>>,
    }

    impl MockSource {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push(&self, date: &str, resp: RawResponse) {
            self.push_entry(date, None, Ok(resp));
        }

        pub fn push_delayed(&self, date: &str, delay: Duration, resp: RawResponse) {
            self.push_entry(date, Some(delay), Ok(resp));
        }

        pub fn push_err(&self, date: &str, err: FetchError) {
            self.push_entry(date, None, Err(err));
        }

        fn push_entry(&self, date: &str, delay: Option<Duration>, resp: Result<RawResponse, FetchError>) {
            self.responses.lock().unwrap().entry(date.to_string()).or_default().push_back((delay, resp));
        }

        pub fn calls(&self) -> Vec<ScheduleRequest> {
            self.calls.lock().unwrap().clone()
        }

        pub fn dates_called(&self) -> Vec<String> {
            self.calls().into_iter().map(|c| c.date).collect()
        }
    }

    #[async_trait]
    impl ScheduleSource for MockSource {
        async fn get(&self, req: &ScheduleRequest) -> Result<RawResponse, FetchError> {
            self.calls.lock().unwrap().push(req.clone());
            let next = self
                .responses
                .lock()
                .unwrap()
                .get_mut(&req.date)
                .and_then(|q| q.pop_front());
            match next {
                Some((delay, resp)) => {
                    if let Some(d) = delay { tokio::time::sleep(d).await; }
                    resp
                }
                None => Err(FetchError::MockQueueEmpty(req.date.clone())),
            }
        }
    }
}
