//! Boundary-call surface of the resource manager
//!
//! All platform-specific encoding lives behind the [`Transport`] trait; the
//! context, card and poll logic depend only on this interface. Exactly one
//! implementation ships per host platform.

use std::ffi::CString;
use std::fmt;

use crate::error::Result;
use crate::reader::CardStatus;
use crate::types::{Disposition, Protocol, Protocols, Scope, ShareMode, MAX_ATR_SIZE};

#[cfg(unix)]
pub mod pcsclite;

/// Opaque session handle as reported by the service
pub type RawContext = usize;

/// Opaque connection handle as reported by the service
pub type RawHandle = usize;

/// Timeout value meaning "block until an event or a cancel"
pub const INFINITE_TIMEOUT: u32 = 0xFFFF_FFFF;

/// Protocol-specific framing header for a transmit call
///
/// There is no generic "any protocol" header; the variant is chosen from the
/// session's negotiated protocol before the boundary call is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolHeader {
    /// Header for a T=0 exchange
    T0,
    /// Header for a T=1 exchange
    T1,
}

impl ProtocolHeader {
    /// The protocol value carried in the header
    pub const fn protocol_value(self) -> u32 {
        match self {
            Self::T0 => Protocol::T0 as u32,
            Self::T1 => Protocol::T1 as u32,
        }
    }
}

/// Fixed-layout watch record submitted to the status-change wait
///
/// One record per watch descriptor, in caller order. The reader name is held
/// as a null-terminated string; the ATR field is a capacity/length pair over
/// a fixed buffer.
#[derive(Debug, Clone)]
pub struct WatchRecord {
    /// Null-terminated reader name
    pub reader: CString,
    /// Requested-state mask
    pub current_state: u32,
    /// Observed-state mask, written by the wait call
    pub event_state: u32,
    /// ATR buffer, significant up to `atr_len`
    pub atr: [u8; MAX_ATR_SIZE],
    /// Number of significant ATR bytes
    pub atr_len: usize,
}

impl WatchRecord {
    /// Build a record from a reader name, requested mask and last ATR
    ///
    /// The ATR is truncated to [`MAX_ATR_SIZE`] if the caller handed in more.
    pub fn new(reader: CString, current_state: u32, last_atr: &[u8]) -> Self {
        let mut atr = [0u8; MAX_ATR_SIZE];
        let len = last_atr.len().min(MAX_ATR_SIZE);
        atr[..len].copy_from_slice(&last_atr[..len]);
        Self {
            reader,
            current_state,
            event_state: 0,
            atr,
            atr_len: len,
        }
    }

    /// The significant ATR bytes
    pub fn atr(&self) -> &[u8] {
        &self.atr[..self.atr_len]
    }
}

/// The boundary-call surface of the platform's resource manager
///
/// Each method corresponds to one opaque service call. Implementations
/// perform no retries and no partial-result merging; every failure surfaces
/// as the service's own result code.
pub trait Transport: fmt::Debug + Send + Sync {
    /// Establish a session with the resource manager
    fn establish(&self, scope: Scope) -> Result<RawContext>;

    /// Release a session handle
    fn release(&self, context: RawContext) -> Result<()>;

    /// Probe whether a session handle is still valid
    ///
    /// Returns the service's result code unmapped; the caller decides which
    /// codes count as a negative answer rather than an error.
    fn is_valid(&self, context: RawContext) -> Result<()>;

    /// Unblock a status-change wait in progress on the same session
    fn cancel(&self, context: RawContext) -> Result<()>;

    /// List reader names into `buf`, or report the required capacity when
    /// `buf` is `None` (two-phase size-then-fill)
    fn list_readers(&self, context: RawContext, buf: Option<&mut [u8]>) -> Result<usize>;

    /// List reader group names, two-phase like [`Transport::list_readers`]
    fn list_reader_groups(&self, context: RawContext, buf: Option<&mut [u8]>) -> Result<usize>;

    /// Block until a watched reader changes state, the timeout elapses or
    /// the session is cancelled
    ///
    /// On success every record's `event_state` and ATR are overwritten, in
    /// order. On failure records are left untouched.
    fn wait_status_change(
        &self,
        context: RawContext,
        timeout_ms: u32,
        records: &mut [WatchRecord],
    ) -> Result<()>;

    /// Open a connection to a card, returning the handle and the protocol
    /// the service actually negotiated
    fn connect(
        &self,
        context: RawContext,
        reader: &CString,
        mode: ShareMode,
        preferred: Protocols,
    ) -> Result<(RawHandle, Protocol)>;

    /// Re-negotiate an open connection, returning the new protocol
    fn reconnect(
        &self,
        card: RawHandle,
        mode: ShareMode,
        preferred: Protocols,
        initialization: Disposition,
    ) -> Result<Protocol>;

    /// Terminate a connection
    fn disconnect(&self, card: RawHandle, disposition: Disposition) -> Result<()>;

    /// Begin a transaction on a connection
    fn begin_transaction(&self, card: RawHandle) -> Result<()>;

    /// End a transaction on a connection
    fn end_transaction(&self, card: RawHandle, disposition: Disposition) -> Result<()>;

    /// Query the point-in-time status of a connection
    fn status(&self, card: RawHandle) -> Result<CardStatus>;

    /// Exchange an APDU, writing the response into `recv` and returning the
    /// received byte count
    fn transmit(
        &self,
        card: RawHandle,
        header: ProtocolHeader,
        command: &[u8],
        recv: &mut [u8],
    ) -> Result<usize>;

    /// Vendor/driver out-of-band exchange bypassing APDU framing
    fn control(
        &self,
        card: RawHandle,
        code: u32,
        input: &[u8],
        recv: &mut [u8],
    ) -> Result<usize>;

    /// Read an attribute into `buf`, or report the required capacity when
    /// `buf` is `None` (two-phase size-then-fill)
    fn get_attrib(&self, card: RawHandle, id: u32, buf: Option<&mut [u8]>) -> Result<usize>;

    /// Write an attribute
    fn set_attrib(&self, card: RawHandle, id: u32, data: &[u8]) -> Result<()>;
}
