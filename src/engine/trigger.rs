// src/engine/trigger.rs

//! Host trigger sources.
//!
//! A source is subscribed once per channel and runs as a tokio task that
//! forwards [`Trigger`] values into a single unbounded queue. Sources never
//! touch the loop itself.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

/// One request to run a channel tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub channel: String,
    /// Elapsed-time override; `None` lets the loop's clock decide.
    pub elapsed: Option<Duration>,
}

impl Trigger {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            elapsed: None,
        }
    }

    pub fn with_elapsed(channel: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            channel: channel.into(),
            elapsed: Some(elapsed),
        }
    }
}

pub trait TriggerSource: Send + 'static {
    /// Start forwarding triggers for `channel` into `tx`.
    ///
    /// The task should end once `tx` is closed.
    fn subscribe(self: Box<Self>, channel: String, tx: mpsc::UnboundedSender<Trigger>)
    -> JoinHandle<()>;
}

/// Fires at a fixed period. Missed ticks are skipped rather than bursted.
#[derive(Debug, Clone, Copy)]
pub struct IntervalSource {
    period: Duration,
}

impl IntervalSource {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms.max(1)))
    }
}

impl TriggerSource for IntervalSource {
    fn subscribe(
        self: Box<Self>,
        channel: String,
        tx: mpsc::UnboundedSender<Trigger>,
    ) -> JoinHandle<()> {
        let period = self.period;
        tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if tx.send(Trigger::new(channel.clone())).is_err() {
                    debug!(channel = %channel, "trigger queue closed; interval source stopping");
                    break;
                }
            }
        })
    }
}

/// Forwards host-pushed events. Each message is one trigger, optionally
/// carrying an elapsed override. Closing every sender ends the source.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<Option<Duration>>,
}

impl ChannelSource {
    pub fn pair(buffer: usize) -> (mpsc::Sender<Option<Duration>>, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (tx, Self { rx })
    }
}

impl TriggerSource for ChannelSource {
    fn subscribe(
        self: Box<Self>,
        channel: String,
        tx: mpsc::UnboundedSender<Trigger>,
    ) -> JoinHandle<()> {
        let mut rx = self.rx;
        tokio::spawn(async move {
            while let Some(elapsed) = rx.recv().await {
                let trigger = Trigger {
                    channel: channel.clone(),
                    elapsed,
                };
                if tx.send(trigger).is_err() {
                    break;
                }
            }
            debug!(channel = %channel, "channel source closed");
        })
    }
}

/// Handle to one subscribed source.
#[derive(Debug)]
pub struct Subscription {
    channel: String,
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn stop(self) {
        debug!(channel = %self.channel, "stopping trigger source");
        self.task.abort();
    }
}

/// Subscribe every `(channel, source)` pair to one shared queue.
///
/// The returned receiver closes once every source task has ended.
pub fn subscribe_all<I>(sources: I) -> (mpsc::UnboundedReceiver<Trigger>, Vec<Subscription>)
where
    I: IntoIterator<Item = (String, Box<dyn TriggerSource>)>,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let subscriptions = sources
        .into_iter()
        .map(|(channel, source)| {
            let task = source.subscribe(channel.clone(), tx.clone());
            Subscription { channel, task }
        })
        .collect();
    (rx, subscriptions)
}
