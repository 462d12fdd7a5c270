//! Bounded, ordered hand-off of crawl events
//!
//! One [`EventSender`] (the scheduler) and one [`EventStream`] (the consumer)
//! share a `tokio::sync::mpsc` channel. The sender waits for capacity when the
//! consumer falls behind, so a slow client applies backpressure to the crawl
//! instead of growing memory. One extra slot is reserved up front for the
//! terminal event, so ending a run never waits on the consumer.

use crate::events::{CrawlEvent, ImageRecord};
use crate::state::EndReason;
use crate::GleanerError;
use tokio::sync::mpsc;

/// Creates a connected sender/stream pair holding at most `capacity` image
/// events plus the terminal event
pub fn event_channel(capacity: usize) -> (EventSender, EventStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1) + 1);
    let terminal = tx.clone().try_reserve_owned().ok();
    (
        EventSender { tx, terminal },
        EventStream {
            rx,
            finished: false,
        },
    )
}

/// Producer half, owned by the scheduler
///
/// [`EventSender::finish`] consumes the sender, so nothing can be pushed after
/// the terminal event.
#[derive(Debug)]
pub struct EventSender {
    tx: mpsc::Sender<CrawlEvent>,
    /// Slot held back for `CrawlEnded`
    terminal: Option<mpsc::OwnedPermit<CrawlEvent>>,
}

impl EventSender {
    /// Pushes an `ImageFound` event, waiting while the channel is full
    ///
    /// Fails with [`GleanerError::ChannelClosed`] once the consumer is gone.
    pub async fn image_found(&self, record: ImageRecord) -> Result<(), GleanerError> {
        self.tx
            .send(CrawlEvent::ImageFound(record))
            .await
            .map_err(|_| GleanerError::ChannelClosed)
    }

    /// Pushes the terminal event into its reserved slot and closes the
    /// producer side
    ///
    /// Never waits for the consumer to make room.
    pub async fn finish(self, reason: EndReason) -> Result<(), GleanerError> {
        if self.tx.is_closed() {
            return Err(GleanerError::ChannelClosed);
        }

        let event = CrawlEvent::CrawlEnded { reason };
        match self.terminal {
            Some(permit) => {
                permit.send(event);
                Ok(())
            }
            None => self
                .tx
                .send(event)
                .await
                .map_err(|_| GleanerError::ChannelClosed),
        }
    }

    /// Returns true once the consumer has dropped its stream
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::Receiver<CrawlEvent>,
    finished: bool,
}

impl EventStream {
    /// Waits for the next event
    ///
    /// Returns `None` after the terminal event has been delivered. If the
    /// producer disappears without sending one (its task was aborted), a
    /// `CrawlEnded { InternalError }` is synthesized so every stream ends with
    /// exactly one terminal event.
    pub async fn next_event(&mut self) -> Option<CrawlEvent> {
        if self.finished {
            return None;
        }

        match self.rx.recv().await {
            Some(event) => {
                if event.is_terminal() {
                    self.finished = true;
                    self.rx.close();
                }
                Some(event)
            }
            None => {
                tracing::warn!("Event producer vanished without a terminal event");
                self.finished = true;
                Some(CrawlEvent::CrawlEnded {
                    reason: EndReason::InternalError,
                })
            }
        }
    }

    /// Returns true once the terminal event has been delivered
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}
