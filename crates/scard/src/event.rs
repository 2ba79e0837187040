//! Event types and channels for reader/card monitoring

use crossbeam_channel::{unbounded, Receiver, Sender};

/// Events related to card insertion and removal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardEvent {
    /// A card was inserted into a reader
    Inserted {
        /// Reader name
        reader: String,
        /// ATR of the inserted card
        atr: Vec<u8>,
    },
    /// The card was removed from a reader
    Removed {
        /// Reader name
        reader: String,
    },
}

/// Events related to readers appearing and disappearing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderEvent {
    /// A reader was connected to the system
    Added(String),
    /// A reader was disconnected from the system
    Removed(String),
}

/// Sender for card events
pub type CardEventSender = Sender<CardEvent>;
/// Receiver for card events
pub type CardEventReceiver = Receiver<CardEvent>;

/// Sender for reader events
pub type ReaderEventSender = Sender<ReaderEvent>;
/// Receiver for reader events
pub type ReaderEventReceiver = Receiver<ReaderEvent>;

/// Create an unbounded channel for card events
pub fn card_event_channel() -> (CardEventSender, CardEventReceiver) {
    unbounded()
}

/// Create an unbounded channel for reader events
pub fn reader_event_channel() -> (ReaderEventSender, ReaderEventReceiver) {
    unbounded()
}

/// A sink for monitor events
///
/// Implemented for any `FnMut` closure taking the event type.
pub trait EventHandler<T>: Send {
    /// Handle one event
    fn handle(&mut self, event: T);
}

impl<T, F> EventHandler<T> for F
where
    F: FnMut(T) + Send,
{
    fn handle(&mut self, event: T) {
        self(event)
    }
}
