//! Card session lifecycle, transaction bracketing and APDU framing

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::reader::CardStatus;
use crate::transport::{ProtocolHeader, RawHandle, Transport};
use crate::types::{
    Attribute, Disposition, Protocol, Protocols, ShareMode, MAX_BUFFER_SIZE_EXTENDED,
};

/// Receive capacity for vendor control exchanges
const CONTROL_RECV_CAPACITY: usize = 0xFFFF;

/// An open connection to a card (or, in direct mode, to a reader)
///
/// The negotiated protocol is fixed at connect time and changes only through
/// a successful [`Card::reconnect`]. [`Card::disconnect`] consumes the value
/// and requires an explicit [`Disposition`]; dropping a still-connected card
/// disconnects best-effort with the leave disposition.
#[derive(Debug)]
pub struct Card {
    transport: &'static dyn Transport,
    handle: RawHandle,
    active_protocol: Protocol,
    share_mode: ShareMode,
    disconnected: bool,
}

impl Card {
    pub(crate) fn new(
        transport: &'static dyn Transport,
        handle: RawHandle,
        active_protocol: Protocol,
        share_mode: ShareMode,
    ) -> Self {
        Self {
            transport,
            handle,
            active_protocol,
            share_mode,
            disconnected: false,
        }
    }

    /// The protocol negotiated at connect or last successful reconnect
    pub const fn active_protocol(&self) -> Protocol {
        self.active_protocol
    }

    /// The share mode this session was opened (or last reconnected) with
    pub const fn share_mode(&self) -> ShareMode {
        self.share_mode
    }

    /// Point-in-time status snapshot; does not mutate session state
    pub fn status(&self) -> Result<CardStatus> {
        self.transport.status(self.handle)
    }

    /// Exchange one APDU with the card
    ///
    /// The framing header is chosen from the session's negotiated protocol
    /// and the response buffer is sized to the maximum extended capacity;
    /// exactly the bytes the service reports received are returned.
    ///
    /// # Panics
    ///
    /// Calling this on a session whose negotiated protocol is not T=0 or
    /// T=1 (a direct or raw connection) is a programming error and panics
    /// before any boundary call is made.
    pub fn transmit(&self, command: &[u8]) -> Result<Bytes> {
        if command.is_empty() {
            return Err(Error::InvalidParameter);
        }
        let header = match self.active_protocol {
            Protocol::T0 => ProtocolHeader::T0,
            Protocol::T1 => ProtocolHeader::T1,
            other => panic!("transmit on a session with no negotiated protocol: {other:?}"),
        };

        trace!(command = %hex::encode(command), ?header, "transmitting APDU");
        let mut recv = vec![0u8; MAX_BUFFER_SIZE_EXTENDED];
        let received = self
            .transport
            .transmit(self.handle, header, command, &mut recv)?;
        recv.truncate(received);
        trace!(response = %hex::encode(&recv), "received APDU response");
        Ok(Bytes::from(recv))
    }

    /// Vendor/driver-specific exchange bypassing APDU framing
    ///
    /// `input` may be empty; see [`crate::types::ctl_code`] for building
    /// vendor control codes.
    pub fn control(&self, code: u32, input: &[u8]) -> Result<Bytes> {
        let mut recv = vec![0u8; CONTROL_RECV_CAPACITY];
        let received = self.transport.control(self.handle, code, input, &mut recv)?;
        recv.truncate(received);
        Ok(Bytes::from(recv))
    }

    /// Read a reader/card attribute, two-phase size-then-fill
    pub fn get_attrib(&self, id: Attribute) -> Result<Vec<u8>> {
        let needed = self.transport.get_attrib(self.handle, id.raw(), None)?;
        if needed == 0 {
            return Ok(Vec::new());
        }
        let mut buf = vec![0u8; needed];
        let written = self
            .transport
            .get_attrib(self.handle, id.raw(), Some(&mut buf))?;
        buf.truncate(written.min(needed));
        Ok(buf)
    }

    /// Write a reader/card attribute
    pub fn set_attrib(&self, id: Attribute, data: &[u8]) -> Result<()> {
        self.transport.set_attrib(self.handle, id.raw(), data)
    }

    /// Begin a transaction, serializing access to the physical card
    ///
    /// The returned guard ends the transaction when dropped (with the leave
    /// disposition) so End runs on every path out of the bracket, including
    /// early returns after a failed operation. Use [`Transaction::end`] to
    /// pick a different disposition.
    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        self.transport.begin_transaction(self.handle)?;
        Ok(Transaction {
            card: self,
            ended: false,
        })
    }

    /// Re-negotiate share mode and protocol without a full disconnect
    ///
    /// `initialization` controls what happens to the card as part of the
    /// operation. On success the session's recorded protocol is updated to
    /// whatever the service negotiated; on failure it is left unchanged and
    /// the session remains usable (or explicitly disconnectable).
    pub fn reconnect(
        &mut self,
        mode: ShareMode,
        preferred: Protocols,
        initialization: Disposition,
    ) -> Result<()> {
        let protocol = self
            .transport
            .reconnect(self.handle, mode, preferred, initialization)?;
        debug!(?mode, ?protocol, ?initialization, "reconnected card session");
        self.active_protocol = protocol;
        self.share_mode = mode;
        Ok(())
    }

    /// Terminate the session
    ///
    /// The disposition is mandatory; leaving the card as-is is itself an
    /// explicit choice ([`Disposition::Leave`]).
    pub fn disconnect(mut self, disposition: Disposition) -> Result<()> {
        self.disconnected = true;
        debug!(handle = self.handle, ?disposition, "disconnecting card session");
        self.transport.disconnect(self.handle, disposition)
    }
}

impl Drop for Card {
    fn drop(&mut self) {
        if !self.disconnected {
            if let Err(err) = self.transport.disconnect(self.handle, Disposition::Leave) {
                warn!(handle = self.handle, %err, "failed to disconnect card on drop");
            }
        }
    }
}

/// An in-progress transaction bracket on a card session
///
/// Holds the card mutably for its lifetime, so no other operation on this
/// session can interleave with the bracket from safe code.
#[derive(Debug)]
pub struct Transaction<'a> {
    card: &'a mut Card,
    ended: bool,
}

impl Transaction<'_> {
    /// Operate on the card inside the bracket
    pub fn card(&self) -> &Card {
        self.card
    }

    /// End the transaction with an explicit disposition
    pub fn end(mut self, disposition: Disposition) -> Result<()> {
        self.ended = true;
        self.card
            .transport
            .end_transaction(self.card.handle, disposition)
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.ended {
            if let Err(err) = self
                .card
                .transport
                .end_transaction(self.card.handle, Disposition::Leave)
            {
                warn!(%err, "failed to end transaction on drop");
            }
        }
    }
}
