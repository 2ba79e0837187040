//! Client library for the PC/SC smart card resource manager
//!
//! This crate talks to the platform's card-reader service: it establishes a
//! session, enumerates readers, waits for reader/card state changes and
//! exchanges APDUs with an inserted card over T=0 or T=1.
//!
//! ## Overview
//!
//! The building blocks, top to bottom:
//!
//! - [`Context`]: a session with the resource manager; lists readers,
//!   runs the blocking status-change wait and opens card sessions
//! - [`ReaderState`]: a per-reader watch descriptor for
//!   [`Context::get_status_change`]
//! - [`Card`]: an open connection; status snapshots, APDU transmission,
//!   vendor control, attributes, transaction bracketing
//! - [`Monitor`]: background watcher turning state transitions into
//!   insertion/removal events on channels
//!
//! All platform encoding sits behind the [`transport::Transport`] trait;
//! everything above it is platform-independent and testable against a mock.
//!
//! ## Waiting for a card
//!
//! ```no_run
//! use scard::{Context, Protocols, Scope, ShareMode, StateFlags};
//!
//! # fn main() -> scard::Result<()> {
//! let context = Context::establish(Scope::System)?;
//! let readers = context.list_readers()?;
//!
//! let mut states = vec![scard::ReaderState::new(readers[0].clone())];
//! while !states[0].event_state.contains(StateFlags::PRESENT) {
//!     context.get_status_change(&mut states, None)?;
//!     states[0].sync();
//! }
//!
//! let card = context.connect(&readers[0], ShareMode::Shared, Protocols::ANY)?;
//! let response = card.transmit(&[0x00, 0xA4, 0x00, 0x0C, 0x02, 0x3F, 0x00])?;
//! println!("response: {}", hex::encode(response));
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod card;
pub mod context;
pub mod error;
pub mod event;
pub mod monitor;
pub mod reader;
pub mod transport;
pub mod types;

mod util;

pub use card::{Card, Transaction};
pub use context::Context;
pub use error::{Error, ErrorKind, Result};
pub use event::{CardEvent, ReaderEvent};
pub use monitor::Monitor;
pub use reader::{CardStatus, ReaderState};
pub use types::{
    ctl_code, Attribute, CardState, Disposition, Protocol, Protocols, Scope, ShareMode,
    StateFlags, MAX_ATR_SIZE, MAX_BUFFER_SIZE, MAX_BUFFER_SIZE_EXTENDED, MAX_READER_NAME,
    PNP_NOTIFICATION,
};

/// Prelude module containing the commonly used types
pub mod prelude {
    pub use crate::{
        Card, CardStatus, Context, Disposition, Error, ErrorKind, Protocol, Protocols,
        ReaderState, Result, Scope, ShareMode, StateFlags,
    };
}
