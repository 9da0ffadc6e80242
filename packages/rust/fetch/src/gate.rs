//! Per-domain request pacing and robots.txt cache.
//!
//! A [`DomainGate`] is built once per pipeline run and shared (via `Arc`) by every
//! fetch. Each domain gets its own async mutex, which is the single critical
//! section for that domain's timestamps and robots decision. Tokio's mutex is
//! fair, so waiters on one domain are admitted in the order they called
//! [`DomainGate::admit`]. Different domains never contend.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use reqwest::Client;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::robots::RobotsRules;

/// Sliding window used for rate pacing.
const RATE_WINDOW: Duration = Duration::from_secs(1);

/// How long a robots decision stays valid.
pub const ROBOTS_TTL: Duration = Duration::from_secs(60 * 60);

/// Cached robots verdict for a domain.
#[derive(Debug, Clone, Copy)]
struct RobotsDecision {
    allowed: bool,
    cached_at: Instant,
}

/// Mutable per-domain state. Created lazily, kept for the gate's lifetime.
#[derive(Debug, Default)]
struct DomainState {
    recent: VecDeque<Instant>,
    robots: Option<RobotsDecision>,
    admitted: u64,
}

impl DomainState {
    /// Drop timestamps that fell out of the trailing window.
    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.recent.front() {
            if now.duration_since(oldest) >= RATE_WINDOW {
                self.recent.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Key used for per-domain state: host, plus `:port` when the URL names one.
pub fn domain_key(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host,
    })
}

/// Shared rate/robots gate.
pub struct DomainGate {
    client: Client,
    robots_ttl: Duration,
    robots_timeout: Duration,
    domains: StdMutex<HashMap<String, Arc<Mutex<DomainState>>>>,
}

impl DomainGate {
    /// Create a gate that fetches robots.txt with `client`.
    pub fn new(client: Client, robots_timeout: Duration) -> Self {
        Self {
            client,
            robots_ttl: ROBOTS_TTL,
            robots_timeout,
            domains: StdMutex::new(HashMap::new()),
        }
    }

    /// Override the robots decision TTL.
    pub fn with_robots_ttl(mut self, ttl: Duration) -> Self {
        self.robots_ttl = ttl;
        self
    }

    fn state_for(&self, domain: &str) -> Arc<Mutex<DomainState>> {
        // The outer lock only guards the map lookup; it is never held across an await.
        let mut domains = self
            .domains
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        domains.entry(domain.to_string()).or_default().clone()
    }

    /// Wait until fewer than `rate_limit` requests hit `domain` in the trailing
    /// second, then record this request. `rate_limit == 0` disables pacing.
    #[instrument(skip(self), level = "debug")]
    pub async fn admit(&self, domain: &str, rate_limit: u32) {
        let state = self.state_for(domain);
        let mut state = state.lock().await;

        if rate_limit > 0 {
            loop {
                let now = Instant::now();
                state.prune(now);
                if state.recent.len() < rate_limit as usize {
                    break;
                }
                let Some(&oldest) = state.recent.front() else {
                    break;
                };
                let wait = (oldest + RATE_WINDOW).saturating_duration_since(now);
                debug!(domain, wait_ms = wait.as_millis() as u64, "rate window full, waiting");
                tokio::time::sleep(wait).await;
            }
        }

        state.recent.push_back(Instant::now());
        state.admitted += 1;
    }

    /// Total requests admitted for `domain` so far.
    pub async fn admitted(&self, domain: &str) -> u64 {
        let state = self.state_for(domain);
        let state = state.lock().await;
        state.admitted
    }

    /// Whether robots.txt for the URL's domain permits `user_agent` to fetch it.
    ///
    /// The decision is cached per domain, not per path: the first path checked
    /// within a TTL window decides for every later path on that domain. A
    /// missing, unreachable or non-2xx robots.txt allows everything.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn is_allowed(&self, url: &Url, user_agent: &str) -> bool {
        let Some(domain) = domain_key(url) else {
            return true;
        };
        let state = self.state_for(&domain);
        let mut state = state.lock().await;

        if let Some(decision) = state.robots {
            if decision.cached_at.elapsed() < self.robots_ttl {
                return decision.allowed;
            }
        }

        let mut path = url.path().to_string();
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }

        let allowed = match self.fetch_robots(url, user_agent).await {
            Some(rules) => rules.is_allowed(&path, user_agent),
            None => true,
        };

        info!(%domain, allowed, "robots decision cached");
        state.robots = Some(RobotsDecision {
            allowed,
            cached_at: Instant::now(),
        });
        allowed
    }

    /// Fetch and parse `<origin>/robots.txt`. `None` means "treat as allowed".
    async fn fetch_robots(&self, url: &Url, user_agent: &str) -> Option<RobotsRules> {
        let mut robots_url = url.clone();
        robots_url.set_path("/robots.txt");
        robots_url.set_query(None);
        robots_url.set_fragment(None);

        let request = self
            .client
            .get(robots_url.as_str())
            .header(reqwest::header::USER_AGENT, user_agent)
            .send();

        let response = match tokio::time::timeout(self.robots_timeout, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(%robots_url, error = %e, "robots.txt fetch failed, allowing");
                return None;
            }
            Err(_) => {
                warn!(%robots_url, "robots.txt fetch timed out, allowing");
                return None;
            }
        };

        if !response.status().is_success() {
            debug!(%robots_url, status = %response.status(), "no robots.txt, allowing");
            return None;
        }

        match tokio::time::timeout(self.robots_timeout, response.text()).await {
            Ok(Ok(body)) => Some(RobotsRules::parse(&body)),
            _ => {
                warn!(%robots_url, "robots.txt body unreadable, allowing");
                None
            }
        }
    }
}
