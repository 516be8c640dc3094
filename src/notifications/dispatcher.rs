//! Background delivery of booking notices
//!
//! [`NotificationDispatcher`] fans each notice out to every channel, retrying
//! transient failures with exponential backoff. [`DispatcherHandle`] is the
//! [`NotificationGateway`] the coordinator holds: it only pushes onto a
//! bounded queue, waiting at most the enqueue timeout for room.
//!
//! Notices a channel gives up on, and notices that never made it onto a full
//! queue, land in a bounded dead-letter log; the oldest entry is evicted
//! once it is full.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use super::channels::{Channel, ChannelError, ChannelResult, DeliveryStatus};
use super::{BookingNotice, NotificationGateway};
use crate::metrics;
use crate::utils::retry::{with_retry_if, RetryConfig};

/// A notice one channel gave up on
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub notice: BookingNotice,
    pub channel: String,
    pub attempts: u32,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

/// Channel name recorded for notices rejected by a full queue
pub const QUEUE_CHANNEL: &str = "queue";

pub const DEFAULT_DEAD_LETTER_CAPACITY: usize = 256;

pub const DEFAULT_ENQUEUE_TIMEOUT: Duration = Duration::from_secs(2);

/// Bounded, oldest-first dead-letter log
#[derive(Debug)]
struct DeadLetterLog {
    entries: VecDeque<DeadLetter>,
    capacity: usize,
}

impl DeadLetterLog {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_DEAD_LETTER_CAPACITY)),
            capacity,
        }
    }

    fn push(&mut self, letter: DeadLetter) {
        if self.entries.len() >= self.capacity {
            if let Some(evicted) = self.entries.pop_front() {
                warn!(
                    booking_id = %evicted.notice.booking.id,
                    channel = %evicted.channel,
                    "Dead-letter log full, dropping oldest entry"
                );
                metrics::record_dead_letter_evicted();
            }
        }
        metrics::record_dead_letter();
        self.entries.push_back(letter);
    }
}

#[derive(Debug, Clone)]
struct DeadLetters(Arc<Mutex<DeadLetterLog>>);

impl DeadLetters {
    fn new(capacity: usize) -> Self {
        Self(Arc::new(Mutex::new(DeadLetterLog::new(capacity))))
    }

    fn push(&self, letter: DeadLetter) {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(letter);
    }

    fn snapshot(&self) -> Vec<DeadLetter> {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entries
            .iter()
            .cloned()
            .collect()
    }
}

pub struct NotificationDispatcher {
    channels: Vec<Arc<dyn Channel>>,
    retry: RetryConfig,
    dead_letters: DeadLetters,
    enqueue_timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(retry: RetryConfig) -> Self {
        Self {
            channels: Vec::new(),
            retry,
            dead_letters: DeadLetters::new(DEFAULT_DEAD_LETTER_CAPACITY),
            enqueue_timeout: DEFAULT_ENQUEUE_TIMEOUT,
        }
    }

    /// Keep at most `capacity` dead letters
    pub fn with_dead_letter_capacity(mut self, capacity: usize) -> Self {
        self.dead_letters = DeadLetters::new(capacity);
        self
    }

    /// How long [`DispatcherHandle::enqueue`] waits for room on a full queue
    pub fn with_enqueue_timeout(mut self, timeout: Duration) -> Self {
        self.enqueue_timeout = timeout;
        self
    }

    pub fn add_channel(&mut self, channel: Arc<dyn Channel>) {
        info!(channel = channel.name(), "Notification channel registered");
        self.channels.push(channel);
    }

    pub fn with_channel(mut self, channel: Arc<dyn Channel>) -> Self {
        self.add_channel(channel);
        self
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.snapshot()
    }

    /// Deliver one notice to every channel, retrying each independently
    pub async fn deliver(&self, notice: &BookingNotice) -> Vec<DeliveryStatus> {
        let deliveries = self
            .channels
            .iter()
            .map(|channel| self.deliver_to(channel.as_ref(), notice));
        join_all(deliveries).await
    }

    async fn deliver_to(&self, channel: &dyn Channel, notice: &BookingNotice) -> DeliveryStatus {
        let attempts = AtomicU32::new(0);
        let result = with_retry_if(
            &self.retry,
            || {
                attempts.fetch_add(1, Ordering::Relaxed);
                channel.send(notice)
            },
            ChannelError::is_retryable,
        )
        .await;

        match result {
            Ok(status) => {
                metrics::record_notification(channel.name(), true);
                status.with_attempts(attempts.load(Ordering::Relaxed))
            }
            Err(exhausted) => {
                let message = exhausted.last_error.to_string();
                error!(
                    alert = "notification_delivery_exhausted",
                    booking_id = %notice.booking.id,
                    channel = channel.name(),
                    attempts = exhausted.attempts,
                    error = %message,
                    "Notification delivery failed permanently"
                );
                metrics::record_notification(channel.name(), false);

                self.dead_letters.push(DeadLetter {
                    notice: notice.clone(),
                    channel: channel.name().to_string(),
                    attempts: exhausted.attempts,
                    error: message.clone(),
                    failed_at: Utc::now(),
                });

                DeliveryStatus::failure(channel.name(), message).with_attempts(exhausted.attempts)
            }
        }
    }

    /// Start the background worker
    ///
    /// The worker exits once every handle is dropped and in-flight deliveries
    /// have finished. Awaiting the returned `JoinHandle` drains the queue and
    /// yields the dead letters.
    pub fn spawn(self, capacity: usize) -> (DispatcherHandle, JoinHandle<Vec<DeadLetter>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = DispatcherHandle {
            tx,
            dead_letters: self.dead_letters.clone(),
            enqueue_timeout: self.enqueue_timeout,
        };
        let worker = tokio::spawn(Arc::new(self).run(rx));
        (handle, worker)
    }

    async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<BookingNotice>) -> Vec<DeadLetter> {
        let mut in_flight = JoinSet::new();

        while let Some(notice) = rx.recv().await {
            while in_flight.try_join_next().is_some() {}

            let dispatcher = Arc::clone(&self);
            in_flight.spawn(async move {
                let statuses = dispatcher.deliver(&notice).await;
                for status in &statuses {
                    debug!(booking_id = %notice.booking.id, %status, "Notification processed");
                }
            });
        }

        while in_flight.join_next().await.is_some() {}
        info!("Notification dispatcher drained");
        self.dead_letters()
    }
}

/// Queue side of a running [`NotificationDispatcher`]
#[derive(Clone)]
pub struct DispatcherHandle {
    tx: mpsc::Sender<BookingNotice>,
    dead_letters: DeadLetters,
    enqueue_timeout: Duration,
}

impl DispatcherHandle {
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.snapshot()
    }
}

#[async_trait]
impl NotificationGateway for DispatcherHandle {
    async fn enqueue(&self, notice: BookingNotice) -> ChannelResult<()> {
        match self.tx.send_timeout(notice, self.enqueue_timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(notice)) => {
                error!(
                    alert = "notification_queue_full",
                    booking_id = %notice.booking.id,
                    timeout_ms = self.enqueue_timeout.as_millis() as u64,
                    "Notification queue stayed full, dead-lettering notice"
                );
                self.dead_letters.push(DeadLetter {
                    notice,
                    channel: QUEUE_CHANNEL.to_string(),
                    attempts: 0,
                    error: "notification queue full".to_string(),
                    failed_at: Utc::now(),
                });
                Err(ChannelError::Unavailable("notification queue full".to_string()))
            }
            Err(SendTimeoutError::Closed(_)) => Err(ChannelError::Unavailable(
                "notification dispatcher is not running".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::test_support::sample_notice;
    use std::time::Duration;

    /// Fails with a 503 for the first `failures` attempts
    struct FlakyChannel {
        failures: u32,
        calls: AtomicU32,
    }

    impl FlakyChannel {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Channel for FlakyChannel {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn send(&self, _notice: &BookingNotice) -> ChannelResult<DeliveryStatus> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(ChannelError::Rejected {
                    status: 503,
                    body: "busy".to_string(),
                })
            } else {
                Ok(DeliveryStatus::success(self.name()))
            }
        }
    }

    struct RefusingChannel;

    #[async_trait]
    impl Channel for RefusingChannel {
        fn name(&self) -> &str {
            "refusing"
        }

        async fn send(&self, _notice: &BookingNotice) -> ChannelResult<DeliveryStatus> {
            Err(ChannelError::Rejected {
                status: 400,
                body: "bad payload".to_string(),
            })
        }
    }

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig::with_delays(max_retries, 1, 5)
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let flaky = Arc::new(FlakyChannel::new(2));
        let dispatcher = NotificationDispatcher::new(fast_retry(3)).with_channel(flaky.clone());

        let statuses = dispatcher.deliver(&sample_notice()).await;

        assert_eq!(statuses.len(), 1);
        assert!(statuses[0].success);
        assert_eq!(statuses[0].attempts, 3);
        assert!(dispatcher.dead_letters().is_empty());
    }

    #[tokio::test]
    async fn test_exhaustion_records_dead_letter() {
        let flaky = Arc::new(FlakyChannel::new(10));
        let dispatcher = NotificationDispatcher::new(fast_retry(2)).with_channel(flaky.clone());
        let notice = sample_notice();

        let statuses = dispatcher.deliver(&notice).await;

        assert!(!statuses[0].success);
        assert_eq!(statuses[0].attempts, 3);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);

        let dead = dispatcher.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].channel, "flaky");
        assert_eq!(dead[0].notice.booking.id, notice.booking.id);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let dispatcher = NotificationDispatcher::new(fast_retry(5))
            .with_channel(Arc::new(RefusingChannel))
            .with_channel(Arc::new(FlakyChannel::new(0)));

        let statuses = dispatcher.deliver(&sample_notice()).await;

        let refused = statuses.iter().find(|s| s.channel == "refusing").unwrap();
        assert!(!refused.success);
        assert_eq!(refused.attempts, 1);

        // Other channels are unaffected
        let flaky = statuses.iter().find(|s| s.channel == "flaky").unwrap();
        assert!(flaky.success);
    }

    #[tokio::test]
    async fn test_spawned_worker_delivers_and_drains() {
        let flaky = Arc::new(FlakyChannel::new(1));
        let dispatcher = NotificationDispatcher::new(fast_retry(3)).with_channel(flaky.clone());
        let (handle, worker) = dispatcher.spawn(1);

        handle.enqueue(sample_notice()).await.unwrap();
        handle.enqueue(sample_notice()).await.unwrap();
        drop(handle);

        let dead = tokio::time::timeout(Duration::from_secs(5), worker)
            .await
            .expect("worker drained in time")
            .unwrap();

        // One failure, then one success per notice
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
        assert!(dead.is_empty());
    }

    fn handle(tx: mpsc::Sender<BookingNotice>, timeout_ms: u64) -> DispatcherHandle {
        DispatcherHandle {
            tx,
            dead_letters: DeadLetters::new(8),
            enqueue_timeout: Duration::from_millis(timeout_ms),
        }
    }

    #[tokio::test]
    async fn test_enqueue_after_worker_stops_is_unavailable() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = handle(tx, 20);

        let result = handle.enqueue(sample_notice()).await;
        assert!(matches!(result, Err(ChannelError::Unavailable(_))));
        assert!(handle.dead_letters().is_empty());
    }

    #[tokio::test]
    async fn test_full_queue_dead_letters_instead_of_waiting_forever() {
        // Nobody reads from `_rx`, so the second notice never finds room
        let (tx, _rx) = mpsc::channel(1);
        let handle = handle(tx, 20);
        let stuck = sample_notice();

        handle.enqueue(sample_notice()).await.unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), handle.enqueue(stuck.clone()))
            .await
            .expect("enqueue gave up within its timeout");

        assert!(matches!(result, Err(ChannelError::Unavailable(_))));
        let dead = handle.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].channel, QUEUE_CHANNEL);
        assert_eq!(dead[0].attempts, 0);
        assert_eq!(dead[0].notice.booking.id, stuck.booking.id);
    }

    #[tokio::test]
    async fn test_full_queue_waits_for_room() {
        let (tx, mut rx) = mpsc::channel(1);
        let handle = handle(tx, 2_000);
        handle.enqueue(sample_notice()).await.unwrap();

        let reader = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let mut received = 0;
            while rx.recv().await.is_some() {
                received += 1;
            }
            received
        });

        handle.enqueue(sample_notice()).await.unwrap();
        assert!(handle.dead_letters().is_empty());
        drop(handle);
        assert_eq!(reader.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_dead_letters_evict_oldest_when_full() {
        let dispatcher = NotificationDispatcher::new(fast_retry(0))
            .with_dead_letter_capacity(2)
            .with_channel(Arc::new(RefusingChannel));
        let notices: Vec<BookingNotice> = (0..3).map(|_| sample_notice()).collect();

        for notice in &notices {
            dispatcher.deliver(notice).await;
        }

        let kept: Vec<String> = dispatcher
            .dead_letters()
            .into_iter()
            .map(|d| d.notice.booking.id)
            .collect();
        assert_eq!(kept, vec![notices[1].booking.id.clone(), notices[2].booking.id.clone()]);
    }
}
