//! Resilient single-URL fetcher.
//!
//! One call to [`Fetcher::fetch`] performs one logical fetch: a robots check,
//! then up to `max_retries` attempts, each paced by the [`DomainGate`] and
//! bounded by a hard timeout. Network conditions never escape as `Err`; they
//! are folded into a terminal [`FetchOutcome::Failure`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use tracing::{debug, info, instrument, warn};
use url::Url;

use govsnap_shared::{DEFAULT_USER_AGENT, HttpConfig, IngestError, Result};

use crate::gate::{DomainGate, domain_key};
use crate::outcome::{FailureKind, FetchFailure, FetchOutcome, FetchSuccess};

/// Upper bound of the random jitter added to each backoff.
const MAX_JITTER_MS: u64 = 500;

/// Longest `Retry-After` we are willing to honor.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(300);

/// Maximum redirects followed per attempt.
const MAX_REDIRECTS: usize = 10;

// ---------------------------------------------------------------------------
// FetchConfig
// ---------------------------------------------------------------------------

/// Per-run fetch policy.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Attempts per logical fetch, including the first. `0` behaves like `1`.
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    pub retry_delay_ms: u64,
    /// Hard timeout for one attempt (request and body).
    pub timeout_ms: u64,
    /// Requests per second per domain; `0` disables pacing.
    pub rate_limit: u32,
    pub user_agent: String,
    pub respect_robots_txt: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::from(&HttpConfig::default())
    }
}

impl From<&HttpConfig> for FetchConfig {
    fn from(http: &HttpConfig) -> Self {
        Self {
            max_retries: http.max_retries,
            retry_delay_ms: http.retry_delay_ms,
            timeout_ms: http.timeout_ms,
            rate_limit: http.rate_limit,
            user_agent: if http.user_agent.trim().is_empty() {
                DEFAULT_USER_AGENT.to_string()
            } else {
                http.user_agent.clone()
            },
            respect_robots_txt: http.respect_robots_txt,
        }
    }
}

impl FetchConfig {
    fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// `base * 2^attempt + jitter`.
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(16);
        let base = self.retry_delay_ms.saturating_mul(factor);
        let jitter = rand::thread_rng().gen_range(0..=MAX_JITTER_MS);
        Duration::from_millis(base.saturating_add(jitter))
    }
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// What one attempt produced, before retry policy is applied.
enum Attempt {
    Success(FetchSuccess),
    Status {
        status: StatusCode,
        retry_after: Option<Duration>,
    },
    Timeout(String),
    Transport(String),
}

/// Fetches URLs with courtesy pacing, robots compliance and bounded retries.
#[derive(Clone)]
pub struct Fetcher {
    config: FetchConfig,
    client: Client,
    gate: Arc<DomainGate>,
}

impl Fetcher {
    /// Create a fetcher with its own [`DomainGate`].
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = build_client(&config)?;
        let gate = Arc::new(DomainGate::new(client.clone(), config.timeout()));
        Ok(Self {
            config,
            client,
            gate,
        })
    }

    pub fn gate(&self) -> &Arc<DomainGate> {
        &self.gate
    }

    /// Perform one logical fetch. Always returns exactly one outcome.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn fetch(&self, url: &Url) -> FetchOutcome {
        let domain = domain_key(url).unwrap_or_default();

        if self.config.respect_robots_txt
            && !self.gate.is_allowed(url, &self.config.user_agent).await
        {
            info!("blocked by robots.txt");
            return FetchOutcome::Failure(FetchFailure::new(
                FailureKind::RobotsBlocked,
                format!("{url}: disallowed by robots.txt"),
                false,
            ));
        }

        let attempts = self.config.max_retries.max(1);
        let mut last_failure = FetchFailure::new(FailureKind::Network, "no attempt made", true);

        for attempt in 0..attempts {
            let remaining = attempt + 1 < attempts;
            self.gate.admit(&domain, self.config.rate_limit).await;
            debug!(attempt = attempt + 1, attempts, "sending request");

            let delay = match self.attempt(url).await {
                Attempt::Success(success) => {
                    debug!(status = success.status, bytes = success.body.len(), "fetched");
                    return FetchOutcome::Success(success);
                }
                Attempt::Status {
                    status,
                    retry_after,
                } if status == StatusCode::TOO_MANY_REQUESTS => {
                    last_failure = FetchFailure::new(
                        FailureKind::RateLimited,
                        format!("{url}: HTTP {status}"),
                        true,
                    )
                    .with_status(status.as_u16());
                    retry_after.unwrap_or_else(|| self.config.backoff(attempt))
                }
                Attempt::Status { status, .. } if status.is_server_error() => {
                    last_failure =
                        FetchFailure::new(FailureKind::Http, format!("{url}: HTTP {status}"), true)
                            .with_status(status.as_u16());
                    self.config.backoff(attempt)
                }
                Attempt::Status { status, .. } => {
                    warn!(%status, "permanent HTTP failure");
                    return FetchOutcome::Failure(
                        FetchFailure::new(
                            FailureKind::Http,
                            format!("{url}: HTTP {status}"),
                            false,
                        )
                        .with_status(status.as_u16()),
                    );
                }
                Attempt::Timeout(message) => {
                    last_failure = FetchFailure::new(FailureKind::Timeout, message, true);
                    self.config.backoff(attempt)
                }
                Attempt::Transport(message) => {
                    last_failure = FetchFailure::new(FailureKind::Network, message, true);
                    self.config.backoff(attempt)
                }
            };

            if remaining {
                warn!(
                    attempt = attempt + 1,
                    attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %last_failure,
                    "attempt failed, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }

        warn!(error = %last_failure, attempts, "retries exhausted");
        FetchOutcome::Failure(last_failure)
    }

    /// One request with a hard timeout around send and body read.
    async fn attempt(&self, url: &Url) -> Attempt {
        let request = async {
            let response = self.client.get(url.as_str()).send().await?;
            let status = response.status();
            if !status.is_success() {
                let retry_after = retry_after(response.headers(), Utc::now());
                return Ok(Attempt::Status {
                    status,
                    retry_after,
                });
            }

            let final_url = response.url().to_string();
            let headers = lowercase_headers(response.headers());
            let body = response.text().await?;
            Ok::<_, reqwest::Error>(Attempt::Success(FetchSuccess {
                status: status.as_u16(),
                headers,
                body,
                redirected: final_url != url.as_str(),
                final_url,
            }))
        };

        match tokio::time::timeout(self.config.timeout(), request).await {
            Ok(Ok(attempt)) => attempt,
            Ok(Err(e)) if e.is_timeout() => Attempt::Timeout(format!("{url}: {e}")),
            Ok(Err(e)) => Attempt::Transport(format!("{url}: {e}")),
            Err(_) => Attempt::Timeout(format!(
                "{url}: timed out after {}ms",
                self.config.timeout_ms
            )),
        }
    }
}

/// Build a reqwest client with appropriate settings.
fn build_client(config: &FetchConfig) -> Result<Client> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(config.timeout())
        .build()
        .map_err(|e| IngestError::Network(format!("failed to build HTTP client: {e}")))
}

fn lowercase_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

/// Read `Retry-After` as delta-seconds or an HTTP-date, capped at [`MAX_RETRY_AFTER`].
fn retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    parse_retry_after(value, now)
}

fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    let delay = if let Ok(secs) = value.parse::<u64>() {
        Duration::from_secs(secs)
    } else {
        let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
        (at - now).to_std().unwrap_or(Duration::ZERO)
    };
    Some(delay.min(MAX_RETRY_AFTER))
}
