use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use evl_types::{validate_subject, Event};

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::Ledger;
use crate::query::StreamOptions;

/// Options for a continuous observation of one subject.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserveOptions {
    /// Start from this id instead of the tail at subscription time.
    pub lower_bound: Option<u64>,
    pub include_lower_bound_event: bool,
    /// Poll interval; the ledger's configured default when absent.
    #[serde(with = "interval_ms")]
    pub interval: Option<Duration>,
    /// Match descendants of the subject as well.
    pub recursive: bool,
}

impl Default for ObserveOptions {
    fn default() -> Self {
        Self {
            lower_bound: None,
            include_lower_bound_event: true,
            interval: None,
            recursive: false,
        }
    }
}

impl ObserveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lower_bound(mut self, id: u64, inclusive: bool) -> Self {
        self.lower_bound = Some(id);
        self.include_lower_bound_event = inclusive;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }
}

/// A live subscription to newly committed events.
///
/// Events arrive in ascending id order with no gaps or repeats. Silence
/// carries no meaning: there are no heartbeats. Dropping the handle cancels
/// the subscription.
pub struct Observation {
    id: Uuid,
    subject: String,
    receiver: mpsc::Receiver<Event>,
    cancel: watch::Sender<bool>,
    last_delivered: u64,
}

impl Observation {
    /// Next matching event, or `None` once the subscription has ended and
    /// every buffered event has been read.
    pub async fn next(&mut self) -> Option<Event> {
        let event = self.receiver.recv().await?;
        self.last_delivered = event.id;
        Some(event)
    }

    /// Stop polling. Events already buffered stay readable.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Id of the last event returned by [`next`](Self::next), or the id the
    /// subscription started after. Resume from here with an exclusive lower
    /// bound.
    pub fn last_delivered_id(&self) -> u64 {
        self.last_delivered
    }
}

impl Drop for Observation {
    fn drop(&mut self) {
        self.cancel.send_replace(true);
    }
}

impl std::fmt::Debug for Observation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observation")
            .field("id", &self.id)
            .field("subject", &self.subject)
            .field("last_delivered", &self.last_delivered)
            .finish()
    }
}

/// Start a polling task on the current tokio runtime.
pub(crate) fn spawn(ledger: Ledger, subject: &str, options: ObserveOptions) -> LedgerResult<Observation> {
    validate_subject(subject)?;
    let interval = options
        .interval
        .unwrap_or_else(|| ledger.config().default_observe_interval());
    if interval.is_zero() {
        return Err(LedgerError::InvalidArgument(
            "observe interval must be positive".into(),
        ));
    }
    let runtime = tokio::runtime::Handle::try_current()
        .map_err(|e| LedgerError::Runtime(format!("observe needs a tokio runtime: {e}")))?;

    let start_after = match options.lower_bound {
        Some(id) if options.include_lower_bound_event => id.saturating_sub(1),
        Some(id) => id,
        None => {
            ledger.refresh()?;
            ledger.status()?.last_event_id
        }
    };

    let id = Uuid::now_v7();
    let (sender, receiver) = mpsc::channel(ledger.config().observe_buffer);
    let (cancel, cancelled) = watch::channel(false);

    let poller = Poller {
        id,
        ledger,
        subject: subject.to_string(),
        recursive: options.recursive,
        interval,
        last_sent: start_after,
    };
    info!(subscription = %id, subject, start_after, ?interval, "observation started");
    runtime.spawn(poller.run(sender, cancelled));

    Ok(Observation {
        id,
        subject: subject.to_string(),
        receiver,
        cancel,
        last_delivered: start_after,
    })
}

struct Poller {
    id: Uuid,
    ledger: Ledger,
    subject: String,
    recursive: bool,
    interval: Duration,
    last_sent: u64,
}

impl Poller {
    async fn run(mut self, sender: mpsc::Sender<Event>, mut cancelled: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        'poll: loop {
            tokio::select! {
                biased;
                changed = cancelled.changed() => {
                    if changed.is_err() || *cancelled.borrow() {
                        break 'poll;
                    }
                    continue 'poll;
                }
                _ = sender.closed() => break 'poll,
                _ = ticker.tick() => {}
            }

            let batch = match self.poll().await {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(subscription = %self.id, error = %e, "observation poll failed");
                    break 'poll;
                }
            };
            if !batch.is_empty() {
                debug!(subscription = %self.id, events = batch.len(), "observation delivering");
            }

            for event in batch {
                let id = event.id;
                tokio::select! {
                    biased;
                    _ = cancelled.wait_for(|stop| *stop) => break 'poll,
                    sent = sender.send(event) => {
                        if sent.is_err() {
                            break 'poll;
                        }
                        self.last_sent = id;
                    }
                }
            }
        }
        info!(subscription = %self.id, last_sent = self.last_sent, "observation stopped");
    }

    /// Events after `last_sent`. Lock and disk work run on the blocking pool.
    async fn poll(&self) -> LedgerResult<Vec<Event>> {
        let ledger = self.ledger.clone();
        let subject = self.subject.clone();
        let options = StreamOptions::new()
            .lower_bound(self.last_sent, false)
            .recursive(self.recursive);
        tokio::task::spawn_blocking(move || {
            ledger.refresh()?;
            ledger.stream(&subject, &options)
        })
        .await
        .map_err(|e| LedgerError::Runtime(format!("observation poll task failed: {e}")))?
    }
}

mod interval_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}
