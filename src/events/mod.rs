//! Crawl events and the channel that carries them from the scheduler to the
//! stream consumer

mod channel;
mod types;

pub use channel::{event_channel, EventSender, EventStream};
pub use types::{CrawlEvent, ImageRecord};
