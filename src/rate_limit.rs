use std::{collections::VecDeque, sync::Arc, time::Duration};

use dashmap::DashMap;
use tokio::{task::JoinHandle, time::Instant};
use tracing::debug;

use crate::config::RateLimitConfig;

#[derive(Debug)]
struct Window {
    hits: VecDeque<Instant>,
    last_seen: Instant,
}

impl Window {
    fn new(now: Instant) -> Self {
        Self {
            hits: VecDeque::new(),
            last_seen: now,
        }
    }

    fn evict(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.hits.front() {
            if now.saturating_duration_since(oldest) >= window {
                self.hits.pop_front();
            } else {
                break;
            }
        }
    }

    fn in_window(&self, now: Instant, window: Duration) -> impl Iterator<Item = &Instant> {
        self.hits
            .iter()
            .filter(move |t| now.saturating_duration_since(**t) < window)
    }
}

/// Per-key sliding window. A check holds only its key's shard lock.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    max_requests: usize,
    cleanup_interval: Duration,
    entries: DashMap<String, Window>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: usize, cleanup_interval: Duration) -> Self {
        Self {
            window,
            max_requests,
            cleanup_interval: cleanup_interval.max(Duration::from_secs(1)),
            entries: DashMap::new(),
        }
    }

    pub fn from_config(cfg: &RateLimitConfig) -> Self {
        Self::new(
            Duration::from_millis(cfg.window_ms),
            cfg.max_requests,
            Duration::from_secs(cfg.cleanup_secs),
        )
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// Records a request for `key` if it is within the limit. A denied request is not
    /// recorded.
    pub fn check_limit(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(key.to_owned())
            .or_insert_with(|| Window::new(now));
        let w = entry.value_mut();
        w.evict(now, self.window);
        w.last_seen = now;

        if w.hits.len() >= self.max_requests {
            return false;
        }
        w.hits.push_back(now);
        true
    }

    pub fn get_remaining_requests(&self, key: &str) -> usize {
        let now = Instant::now();
        let used = self
            .entries
            .get(key)
            .map(|w| w.in_window(now, self.window).count())
            .unwrap_or(0);
        self.max_requests.saturating_sub(used)
    }

    /// Whole seconds (rounded up) until the oldest in-window request expires; 0 when
    /// nothing is in the window.
    pub fn get_reset_time(&self, key: &str) -> u64 {
        let now = Instant::now();
        let Some(w) = self.entries.get(key) else {
            return 0;
        };
        let Some(oldest) = w.in_window(now, self.window).next().copied() else {
            return 0;
        };
        let left = self.window.saturating_sub(now.saturating_duration_since(oldest));
        let millis = left.as_millis() as u64;
        millis.div_ceil(1000)
    }

    pub fn reset(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Drops keys untouched for more than twice the cleanup interval. Returns how many.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let idle_limit = self.cleanup_interval * 2;
        let before = self.entries.len();
        self.entries
            .retain(|_, w| now.saturating_duration_since(w.last_seen) <= idle_limit);
        before.saturating_sub(self.entries.len())
    }

    pub fn tracked_keys(&self) -> usize {
        self.entries.len()
    }

    /// Periodic sweep on the runtime. The task holds only a weak reference and exits once
    /// the limiter is dropped.
    pub fn spawn_cleanup(self: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let period = self.cleanup_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // First tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(limiter) = weak.upgrade() else {
                    break;
                };
                let removed = limiter.sweep();
                if removed > 0 {
                    debug!(removed, remaining = limiter.tracked_keys(), "rate limiter sweep");
                }
            }
        })
    }
}
