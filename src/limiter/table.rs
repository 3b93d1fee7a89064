//! Per-client limiter registry.
//!
//! # Locking
//!
//! One `std::sync::Mutex` guards the whole map. Both the request path
//! ([`ClientTable::check`]) and the sweeper take it, only for in-memory work,
//! and never across an `.await`.
//!
//! # Idle Eviction
//!
//! ```text
//!   admit(ip) ──► entry.last_seen = now
//!
//!   every sweep_interval:
//!     drop entries with now - last_seen > retention
//! ```
//!
//! Retention must exceed the sweep interval (enforced by [`Config`] validation)
//! so a client active within the window is never evicted between two of its
//! own requests.
//!
//! [`Config`]: crate::config::Config

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use governor::clock::Clock as _;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use super::clock::{Clock, LimiterClock};
use crate::config::Config;
use crate::metrics;

/// Direct (unkeyed) GCRA limiter driven by the table's clock.
type ClientLimiter = RateLimiter<NotKeyed, InMemoryState, LimiterClock, NoOpMiddleware<Instant>>;

/// Limiter parameters shared by every client.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientTableConfig {
    /// Sustained admission rate per client.
    pub requests_per_second: f64,
    /// Requests a fresh or fully rested client may make at once.
    pub burst: u32,
    /// How often the sweeper runs.
    pub sweep_interval: Duration,
    /// Idle time after which an entry is evicted.
    pub retention: Duration,
}

impl ClientTableConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            requests_per_second: config.limiter_rps,
            burst: config.limiter_burst,
            sweep_interval: config.limiter_sweep_interval,
            retention: config.limiter_client_retention,
        }
    }

    /// Per-client quota: one request every `1 / rps` seconds, `burst` at once.
    ///
    /// `None` when the rate is not positive and finite or the burst is zero.
    pub fn quota(&self) -> Option<Quota> {
        let rps = self.requests_per_second;
        if !rps.is_finite() || rps <= 0.0 {
            return None;
        }
        let period = Duration::try_from_secs_f64(1.0 / rps).ok()?;
        let burst = NonZeroU32::new(self.burst)?;
        Quota::with_period(period).map(|quota| quota.allow_burst(burst))
    }
}

impl Default for ClientTableConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 2.0,
            burst: 4,
            sweep_interval: Duration::from_secs(60),
            retention: Duration::from_secs(180),
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    /// Rejected; the client may retry after `retry_after`.
    Rejected { retry_after: Duration },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }
}

struct ClientEntry {
    limiter: ClientLimiter,
    last_seen: Instant,
}

/// Registry mapping client identity to its rate limiter.
///
/// Created once at startup and shared by reference with the rate limit stage.
/// Owns its sweeper task: call [`spawn_sweeper`](Self::spawn_sweeper) after
/// construction and [`shutdown`](Self::shutdown) before exit.
pub struct ClientTable {
    clients: Mutex<HashMap<String, ClientEntry>>,
    /// `None` admits nothing; [`Config`] validation rules it out at startup.
    quota: Option<Quota>,
    sweep_interval: Duration,
    retention: Duration,
    clock: LimiterClock,
    task_tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl ClientTable {
    pub fn new(config: ClientTableConfig, clock: Arc<dyn Clock>) -> Self {
        let quota = config.quota();
        if quota.is_none() {
            warn!(
                requests_per_second = config.requests_per_second,
                burst = config.burst,
                "Invalid limiter quota, every request will be rejected"
            );
        }

        Self {
            clients: Mutex::new(HashMap::new()),
            quota,
            sweep_interval: config.sweep_interval,
            retention: config.retention,
            clock: LimiterClock::new(clock),
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Admit or reject one request from `identity`.
    pub fn admit(&self, identity: &str) -> bool {
        self.check(identity).is_allowed()
    }

    /// Admit or reject one request from `identity`, reporting when to retry.
    ///
    /// Creates the entry on first sight and refreshes `last_seen` on every
    /// call, whether or not the request is admitted.
    pub fn check(&self, identity: &str) -> Admission {
        let Some(quota) = self.quota else {
            return Admission::Rejected {
                retry_after: Duration::MAX,
            };
        };

        let now = self.clock.now();
        let mut clients = self.lock();

        let before = clients.len();
        let entry = clients
            .entry(identity.to_string())
            .or_insert_with(|| ClientEntry {
                limiter: RateLimiter::direct_with_clock(quota, self.clock.clone()),
                last_seen: now,
            });
        entry.last_seen = now;

        let admission = match entry.limiter.check() {
            Ok(()) => Admission::Allowed,
            Err(not_until) => Admission::Rejected {
                retry_after: not_until.wait_time_from(now),
            },
        };

        let tracked = clients.len();
        drop(clients);

        if tracked != before {
            metrics::set_tracked_clients(tracked);
        }
        admission
    }

    /// Evict every entry idle for longer than the retention window.
    ///
    /// Returns the number of evicted entries.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let retention = self.retention;
        let mut clients = self.lock();

        let before = clients.len();
        clients.retain(|identity, entry| {
            let keep = now.saturating_duration_since(entry.last_seen) <= retention;
            if !keep {
                debug!(client = %identity, "Evicting idle client from rate limiter");
            }
            keep
        });
        let remaining = clients.len();
        drop(clients);

        metrics::set_tracked_clients(remaining);
        before - remaining
    }

    /// Number of tracked client identities.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.lock().contains_key(identity)
    }

    /// Start the periodic sweeper on this table's task tracker.
    ///
    /// The task stops when [`shutdown`](Self::shutdown) is called.
    pub fn spawn_sweeper(self: &Arc<Self>) {
        let table = Arc::clone(self);
        let cancel = self.cancellation_token.clone();
        let period = self.sweep_interval;

        self.task_tracker.spawn(async move {
            let mut ticker = interval(period);
            ticker.tick().await; // Skip the first immediate tick

            loop {
                tokio::select! {
                    biased; // Check cancellation first

                    _ = cancel.cancelled() => {
                        debug!("Client sweeper received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        let evicted = table.sweep();
                        trace!(evicted, remaining = table.len(), "Client sweep completed");
                    }
                }
            }

            debug!("Client sweeper shutting down");
        });
    }

    /// Stop the sweeper and wait for it to finish.
    pub async fn shutdown(&self) {
        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;
        info!("Client sweeper stopped");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ClientEntry>> {
        // No holder mutates across a panic point, so a poisoned map is still consistent
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
