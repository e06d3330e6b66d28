use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use dashmap::DashMap;

/// Sliding-window limiter keyed by arbitrary strings. State is process local.
#[derive(Clone)]
pub struct InMemoryRateLimiter {
    hits: Arc<DashMap<String, VecDeque<Instant>>>,
    pub enabled: bool,
}

impl InMemoryRateLimiter {
    pub fn new(enabled: bool) -> Self {
        Self { hits: Arc::new(DashMap::new()), enabled }
    }

    /// Records a hit for `key` and returns false once `limit` hits already
    /// fall inside `window`.
    pub fn check(&self, key: &str, limit: usize, window: Duration) -> bool {
        if !self.enabled { return true; }
        let now = Instant::now();
        let mut q = self.hits.entry(key.to_string()).or_default();
        while q.front().is_some_and(|t| now.duration_since(*t) >= window) {
            q.pop_front();
        }
        if q.len() >= limit {
            return false;
        }
        q.push_back(now);
        true
    }

    /// Drops every key whose newest hit is at least `idle` old.
    pub fn purge_idle(&self, idle: Duration) {
        let now = Instant::now();
        self.hits.retain(|_, q| q.back().is_some_and(|t| now.duration_since(*t) < idle));
    }

    pub fn tracked_keys(&self) -> usize {
        self.hits.len()
    }
}

/// Calls between sweeps of idle limiter keys.
const PURGE_EVERY: usize = 256;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub signup_limit: usize,
    pub signup_window: Duration,
    pub token_limit: usize,
    pub token_window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            signup_limit: 5,
            signup_window: Duration::from_secs(3600),
            token_limit: 10,
            token_window: Duration::from_secs(300),
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        fn usize_env(name: &str, default: usize) -> usize { std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default) }
        fn secs_env(name: &str, default: Duration) -> Duration {
            std::env::var(name).ok().and_then(|v| v.parse().ok()).map(Duration::from_secs).unwrap_or(default)
        }
        let d = Self::default();
        Self {
            enabled: std::env::var("RL_ENABLED").map(|v| v != "0" && !v.eq_ignore_ascii_case("false")).unwrap_or(d.enabled),
            signup_limit: usize_env("RL_SIGNUP_LIMIT", d.signup_limit),
            signup_window: secs_env("RL_SIGNUP_WINDOW", d.signup_window),
            token_limit: usize_env("RL_TOKEN_LIMIT", d.token_limit),
            token_window: secs_env("RL_TOKEN_WINDOW", d.token_window),
        }
    }
}

/// Per-action limits applied by the auth handlers.
#[derive(Clone)]
pub struct RateLimiterFacade {
    pub limiter: InMemoryRateLimiter,
    pub cfg: RateLimitConfig,
    calls: Arc<AtomicUsize>,
}

impl RateLimiterFacade {
    pub fn new(cfg: RateLimitConfig) -> Self {
        Self { limiter: InMemoryRateLimiter::new(cfg.enabled), cfg, calls: Arc::new(AtomicUsize::new(0)) }
    }

    /// Signup attempts are counted per client address.
    pub fn allow_signup(&self, ip: &str) -> bool {
        self.sweep();
        self.limiter.check(&format!("signup:{ip}"), self.cfg.signup_limit, self.cfg.signup_window)
    }

    /// Code exchanges are counted per (client address, account) pair, so one
    /// client's failures never lock the account owner out.
    pub fn allow_token(&self, ip: &str, username: &str) -> bool {
        self.sweep();
        self.limiter.check(&format!("token:{ip}:{username}"), self.cfg.token_limit, self.cfg.token_window)
    }

    fn sweep(&self) {
        if self.calls.fetch_add(1, Ordering::Relaxed) % PURGE_EVERY == PURGE_EVERY - 1 {
            self.limiter.purge_idle(self.cfg.signup_window.max(self.cfg.token_window));
        }
    }
}
