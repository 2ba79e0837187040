//! Watch descriptors and card status snapshots

use std::any::Any;
use std::fmt;

use crate::types::{CardState, Protocol, StateFlags, PNP_NOTIFICATION};

/// Per-reader watch descriptor for [`crate::Context::get_status_change`]
///
/// The caller fills in the reader name and the state it currently believes
/// holds (`current_state`); a successful wait overwrites `event_state` and,
/// when the service reports one, `atr`. The engine never touches
/// `user_data`.
///
/// To wait incrementally ("until a specific bit transitions"), call
/// [`ReaderState::sync`] between rounds so the next request is measured
/// against the last observation.
pub struct ReaderState {
    /// Name of the watched reader, or [`PNP_NOTIFICATION`]
    pub reader: String,
    /// Opaque caller tag, never inspected by the engine
    pub user_data: Option<Box<dyn Any + Send + Sync>>,
    /// State the caller already believes holds
    pub current_state: StateFlags,
    /// State observed by the last successful wait
    pub event_state: StateFlags,
    /// Last known ATR, replaced wholesale when the service reports one
    pub atr: Vec<u8>,
}

impl ReaderState {
    /// Create a descriptor with no prior knowledge of the reader state
    pub fn new(reader: impl Into<String>) -> Self {
        Self {
            reader: reader.into(),
            user_data: None,
            current_state: StateFlags::UNAWARE,
            event_state: StateFlags::UNAWARE,
            atr: Vec::new(),
        }
    }

    /// Create a descriptor for the plug-and-play pseudo-reader
    ///
    /// A wait including this descriptor wakes when the reader list itself
    /// changes.
    pub fn pnp_notification() -> Self {
        Self::new(PNP_NOTIFICATION)
    }

    /// Roll the last observation into the next request
    pub fn sync(&mut self) {
        self.current_state = self.event_state;
    }

    /// Whether the last observation differs from the requested state
    pub const fn changed(&self) -> bool {
        self.event_state.contains(StateFlags::CHANGED)
    }
}

impl fmt::Debug for ReaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderState")
            .field("reader", &self.reader)
            .field("current_state", &self.current_state)
            .field("event_state", &self.event_state)
            .field("atr", &hex::encode(&self.atr))
            .finish_non_exhaustive()
    }
}

/// Point-in-time snapshot of a connected card, returned by
/// [`crate::Card::status`]
///
/// Recomputed on every query; holds no persistent identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardStatus {
    /// Name of the reader the card is in
    pub reader: String,
    /// Coarse presence/power state
    pub state: CardState,
    /// Protocol currently active on the connection
    pub protocol: Protocol,
    /// ATR of the card
    pub atr: Vec<u8>,
}
