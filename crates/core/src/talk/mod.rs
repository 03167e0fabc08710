pub mod history;
pub mod parse;
pub mod service;

pub use history::{RequestLog, RequestRecord, RequestStatus};
pub use parse::{ParseError, ParsedLine, parse_reply};
pub use service::TalkService;

use tokio::sync::mpsc;

use crate::types::TalkEvent;

/// Sending half of the talk event channel.
pub type EventSender = mpsc::Sender<TalkEvent>;
/// Receiving half, handed to the host.
pub type EventReceiver = mpsc::Receiver<TalkEvent>;

/// Create a talk event channel with the given buffer size.
pub fn channel(buffer: usize) -> (EventSender, EventReceiver) {
    mpsc::channel(buffer)
}
