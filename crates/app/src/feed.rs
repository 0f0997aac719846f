use std::{
    pin::Pin,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    task::{Context, Poll},
    time::Duration,
};

use axum::response::sse::Event;
use metrics::{counter, gauge};
use tokio::{
    sync::watch,
    task::AbortHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_stream::{wrappers::WatchStream, Stream};
use tracing::{debug, info, warn};
use uuid::Uuid;

use inventory_storage::Database;

use crate::router::Clock;
use crate::snapshot::build_metrics_snapshot;

/// Cadence of live metric pushes. Identical for every subscriber.
pub const FEED_TICK_INTERVAL: Duration = Duration::from_secs(5);

const FAILURE_PAYLOAD: &str = r#"{"error":true}"#;

/// Streams warehouse snapshots to SSE subscribers.
///
/// Each subscription owns one timer task. Subscriptions to the same warehouse
/// share nothing, not even results.
#[derive(Clone)]
pub struct FeedPublisher {
    database: Database,
    clock: Clock,
    interval: Duration,
    counters: Arc<FeedCounters>,
}

impl FeedPublisher {
    pub fn new(database: Database, clock: Clock) -> Self {
        Self {
            database,
            clock,
            interval: FEED_TICK_INTERVAL,
            counters: Arc::new(FeedCounters::default()),
        }
    }

    #[cfg(test)]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Opens a feed for `warehouse_id`.
    ///
    /// The first snapshot is computed before returning so the stream yields
    /// immediately; the timer only starts afterwards. Dropping the stream
    /// stops the timer.
    pub async fn subscribe(&self, warehouse_id: i64) -> FeedStream {
        let subscription_id = Uuid::new_v4();
        let first = self.compute(warehouse_id).await;

        let (sender, receiver) = watch::channel(first);
        let first_tick = Instant::now() + self.interval;
        let ticker = tokio::spawn(self.clone().run_ticker(
            warehouse_id,
            first_tick,
            Arc::new(sender),
            subscription_id,
        ));

        info!(stage = "feed", subscription = %subscription_id, warehouse_id, "feed streaming");
        let guard = SubscriptionGuard::new(
            self.counters.clone(),
            ticker.abort_handle(),
            subscription_id,
            warehouse_id,
        );

        FeedStream {
            inner: WatchStream::new(receiver),
            _guard: guard,
        }
    }

    /// Number of feeds currently open.
    pub fn active_subscriptions(&self) -> usize {
        self.counters.active.load(Ordering::SeqCst)
    }

    async fn run_ticker(
        self,
        warehouse_id: i64,
        first_tick: Instant,
        sender: Arc<watch::Sender<FeedMessage>>,
        subscription_id: Uuid,
    ) {
        let mut ticker = interval_at(first_tick, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = sender.closed() => break,
                _ = ticker.tick() => {
                    self.counters.ticks.fetch_add(1, Ordering::SeqCst);
                    // Ticks are not serialised; a slow read may still be running
                    // when the next one starts and finish after it.
                    let publisher = self.clone();
                    let sender = sender.clone();
                    tokio::spawn(async move {
                        let message = publisher.compute(warehouse_id).await;
                        if sender.send(message).is_err() {
                            debug!(stage = "feed", subscription = %subscription_id, "discarding snapshot for closed feed");
                        }
                    });
                }
            }
        }

        debug!(stage = "feed", subscription = %subscription_id, "feed timer stopped");
    }

    async fn compute(&self, warehouse_id: i64) -> FeedMessage {
        let snapshot = match build_metrics_snapshot(&self.database, warehouse_id, (self.clock)()).await
        {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(stage = "feed", warehouse_id, error = %err, "feed tick failed");
                counter!("feed_ticks_total", "result" => "error").increment(1);
                return FeedMessage::failure();
            }
        };

        match serde_json::to_string(&snapshot) {
            Ok(data) => {
                counter!("feed_ticks_total", "result" => "ok").increment(1);
                FeedMessage { data }
            }
            Err(err) => {
                warn!(stage = "feed", warehouse_id, error = %err, "failed to serialize snapshot");
                counter!("feed_ticks_total", "result" => "error").increment(1);
                FeedMessage::failure()
            }
        }
    }

    #[cfg(test)]
    fn ticks_issued(&self) -> u64 {
        self.counters.ticks.load(Ordering::SeqCst)
    }
}

/// One serialized push: either a full snapshot or the failure marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedMessage {
    data: String,
}

impl FeedMessage {
    fn failure() -> Self {
        Self {
            data: FAILURE_PAYLOAD.to_string(),
        }
    }

    #[cfg(test)]
    pub fn is_failure(&self) -> bool {
        self.data == FAILURE_PAYLOAD
    }

    #[cfg(test)]
    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn into_event(self) -> Event {
        Event::default().data(self.data)
    }
}

/// Latest-value stream of feed messages. Intermediate values a slow reader
/// never polled are skipped, not queued.
pub struct FeedStream {
    inner: WatchStream<FeedMessage>,
    _guard: SubscriptionGuard,
}

impl Stream for FeedStream {
    type Item = FeedMessage;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        Pin::new(&mut this.inner).poll_next(cx)
    }
}

#[derive(Default)]
struct FeedCounters {
    active: AtomicUsize,
    ticks: AtomicU64,
}

/// Ties the timer task to the stream's lifetime.
struct SubscriptionGuard {
    counters: Arc<FeedCounters>,
    ticker: AbortHandle,
    subscription_id: Uuid,
    warehouse_id: i64,
}

impl SubscriptionGuard {
    fn new(
        counters: Arc<FeedCounters>,
        ticker: AbortHandle,
        subscription_id: Uuid,
        warehouse_id: i64,
    ) -> Self {
        let value = counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        gauge!("feed_subscribers").set(value as f64);
        Self {
            counters,
            ticker,
            subscription_id,
            warehouse_id,
        }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.ticker.abort();
        let value = self
            .counters
            .active
            .fetch_sub(1, Ordering::SeqCst)
            .saturating_sub(1);
        gauge!("feed_subscribers").set(value as f64);
        info!(
            stage = "feed",
            subscription = %self.subscription_id,
            warehouse_id = self.warehouse_id,
            "feed closed"
        );
    }
}
