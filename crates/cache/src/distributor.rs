//! Signal distribution
//!
//! Fans signals out to independent subscriber queues. Each subscriber owns
//! a bounded buffer; when it falls behind and backpressure is enabled, new
//! signals for it are dropped and counted instead of growing memory - a
//! slow consumer loses signals, it never stalls the producers.

use crate::error::{Error, Result};
use dashmap::DashMap;
use kestrel_core::CompactSignal;
use log::info;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use tokio::sync::mpsc;

/// How signals are routed across subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistributionMode {
    /// Every subscriber gets every signal
    #[default]
    Broadcast,
    /// Each signal goes to exactly one subscriber, rotating
    RoundRobin,
    /// Always to the highest-priority subscriber (lowest handle on ties)
    PriorityBased,
    /// To the subscriber with the shortest queue
    LoadBalanced,
}

#[derive(Debug, Clone)]
pub struct DistributorConfig {
    pub mode: DistributionMode,
    pub max_subscribers: usize,
    pub buffer_size_per_subscriber: usize,
    /// Full queues drop-and-count when set; grow unbounded when not
    pub enable_backpressure: bool,
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self {
            mode: DistributionMode::Broadcast,
            max_subscribers: 100,
            buffer_size_per_subscriber: 1000,
            enable_backpressure: true,
        }
    }
}

/// Distribution counters. All atomic.
#[derive(Debug, Default)]
pub struct DistributionStats {
    /// Successful queue deliveries
    pub signals_distributed: AtomicU64,
    /// Times a full subscriber buffer was hit
    pub backpressure_events: AtomicU64,
    /// Signals dropped because of full buffers
    pub dropped_signals: AtomicU64,
}

enum Queue {
    Bounded {
        tx: mpsc::Sender<CompactSignal>,
        rx: Mutex<mpsc::Receiver<CompactSignal>>,
    },
    Unbounded {
        tx: mpsc::UnboundedSender<CompactSignal>,
        rx: Mutex<mpsc::UnboundedReceiver<CompactSignal>>,
    },
}

struct Subscriber {
    id: String,
    priority: u8,
    queue: Queue,
    depth: AtomicUsize,
    dropped: AtomicU64,
}

impl Subscriber {
    /// Enqueue a copy; false when the buffer was full.
    fn deliver(&self, signal: CompactSignal) -> bool {
        let delivered = match &self.queue {
            Queue::Bounded { tx, .. } => tx.try_send(signal).is_ok(),
            Queue::Unbounded { tx, .. } => tx.send(signal).is_ok(),
        };
        if delivered {
            self.depth.fetch_add(1, Ordering::Relaxed);
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        delivered
    }

    fn pop(&self) -> Option<CompactSignal> {
        let popped = match &self.queue {
            Queue::Bounded { rx, .. } => rx
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .try_recv()
                .ok(),
            Queue::Unbounded { rx, .. } => rx
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .try_recv()
                .ok(),
        };
        if popped.is_some() {
            self.depth.fetch_sub(1, Ordering::Relaxed);
        }
        popped
    }
}

/// Signal distribution system
pub struct SignalDistributor {
    config: DistributorConfig,
    subscribers: DashMap<u32, Subscriber>,
    next_handle: AtomicU32,
    round_robin_cursor: AtomicUsize,
    stats: DistributionStats,
}

impl SignalDistributor {
    pub fn new(config: DistributorConfig) -> Self {
        Self {
            config,
            subscribers: DashMap::new(),
            next_handle: AtomicU32::new(0),
            round_robin_cursor: AtomicUsize::new(0),
            stats: DistributionStats::default(),
        }
    }

    /// Register a subscriber and get back its handle.
    pub fn subscribe(&self, subscriber_id: &str, priority: u8) -> Result<u32> {
        if self.subscribers.len() >= self.config.max_subscribers {
            return Err(Error::SubscriberLimitReached {
                max: self.config.max_subscribers,
            });
        }

        let queue = if self.config.enable_backpressure {
            let (tx, rx) = mpsc::channel(self.config.buffer_size_per_subscriber.max(1));
            Queue::Bounded {
                tx,
                rx: Mutex::new(rx),
            }
        } else {
            let (tx, rx) = mpsc::unbounded_channel();
            Queue::Unbounded {
                tx,
                rx: Mutex::new(rx),
            }
        };

        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        self.subscribers.insert(
            handle,
            Subscriber {
                id: subscriber_id.to_string(),
                priority,
                queue,
                depth: AtomicUsize::new(0),
                dropped: AtomicU64::new(0),
            },
        );
        info!("[DISTRIBUTE] subscriber '{subscriber_id}' registered as handle {handle}");
        Ok(handle)
    }

    pub fn unsubscribe(&self, handle: u32) -> Result<()> {
        match self.subscribers.remove(&handle) {
            Some((_, subscriber)) => {
                info!("[DISTRIBUTE] subscriber '{}' removed", subscriber.id);
                Ok(())
            }
            None => Err(Error::UnknownSubscriber(handle)),
        }
    }

    /// Route one signal per the configured mode. Returns the number of
    /// queues it landed in.
    pub fn distribute_signal(&self, signal: &CompactSignal) -> usize {
        let delivered = match self.config.mode {
            DistributionMode::Broadcast => self
                .subscribers
                .iter()
                .map(|entry| self.deliver_to(entry.value(), signal))
                .filter(|&ok| ok)
                .count(),
            DistributionMode::RoundRobin => {
                let handles = self.sorted_handles();
                if handles.is_empty() {
                    0
                } else {
                    let index =
                        self.round_robin_cursor.fetch_add(1, Ordering::Relaxed) % handles.len();
                    self.deliver_to_handle(handles[index], signal)
                }
            }
            DistributionMode::PriorityBased => {
                let target = self
                    .subscribers
                    .iter()
                    .map(|entry| (entry.value().priority, std::cmp::Reverse(*entry.key())))
                    .max()
                    .map(|(_, std::cmp::Reverse(handle))| handle);
                match target {
                    Some(handle) => self.deliver_to_handle(handle, signal),
                    None => 0,
                }
            }
            DistributionMode::LoadBalanced => {
                let target = self
                    .subscribers
                    .iter()
                    .map(|entry| (entry.value().depth.load(Ordering::Relaxed), *entry.key()))
                    .min()
                    .map(|(_, handle)| handle);
                match target {
                    Some(handle) => self.deliver_to_handle(handle, signal),
                    None => 0,
                }
            }
        };
        delivered
    }

    /// Route a batch in order; returns total successful deliveries.
    pub fn distribute_batch(&self, signals: &[CompactSignal]) -> usize {
        signals
            .iter()
            .map(|signal| self.distribute_signal(signal))
            .sum()
    }

    /// Pop the next queued signal for a subscriber, without blocking.
    pub fn get_signal(&self, handle: u32) -> Option<CompactSignal> {
        self.subscribers.get(&handle)?.pop()
    }

    /// Drain up to `max_count` queued signals for a subscriber.
    pub fn get_signals(&self, handle: u32, max_count: usize) -> Vec<CompactSignal> {
        let mut drained = Vec::new();
        if let Some(subscriber) = self.subscribers.get(&handle) {
            while drained.len() < max_count {
                match subscriber.pop() {
                    Some(signal) => drained.push(signal),
                    None => break,
                }
            }
        }
        drained
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Signals dropped for one subscriber because its buffer was full.
    pub fn dropped_for(&self, handle: u32) -> Option<u64> {
        self.subscribers
            .get(&handle)
            .map(|s| s.dropped.load(Ordering::Relaxed))
    }

    /// Current queue depth for one subscriber.
    pub fn queue_depth(&self, handle: u32) -> Option<usize> {
        self.subscribers
            .get(&handle)
            .map(|s| s.depth.load(Ordering::Relaxed))
    }

    pub fn stats(&self) -> &DistributionStats {
        &self.stats
    }

    fn sorted_handles(&self) -> Vec<u32> {
        let mut handles: Vec<u32> = self.subscribers.iter().map(|e| *e.key()).collect();
        handles.sort_unstable();
        handles
    }

    fn deliver_to_handle(&self, handle: u32, signal: &CompactSignal) -> usize {
        match self.subscribers.get(&handle) {
            Some(subscriber) => {
                if self.deliver_to(&subscriber, signal) {
                    1
                } else {
                    0
                }
            }
            None => 0,
        }
    }

    fn deliver_to(&self, subscriber: &Subscriber, signal: &CompactSignal) -> bool {
        if subscriber.deliver(*signal) {
            self.stats.signals_distributed.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            self.stats.backpressure_events.fetch_add(1, Ordering::Relaxed);
            self.stats.dropped_signals.fetch_add(1, Ordering::Relaxed);
            false
        }
    }
}
