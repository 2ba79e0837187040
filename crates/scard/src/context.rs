//! Session context and the status-change poll engine

use std::ffi::CString;
use std::time::Duration;

use tracing::{debug, warn};

use crate::card::Card;
use crate::error::{Error, Result};
use crate::reader::ReaderState;
use crate::transport::{Transport, WatchRecord, INFINITE_TIMEOUT};
use crate::types::{Protocols, Scope, ShareMode, StateFlags};

/// A session with the platform's resource manager
///
/// A context is either valid (usable for all operations) or released; the
/// type system enforces "no operation after release" by making
/// [`Context::release`] consume the value. The service can still invalidate
/// a handle asynchronously (e.g. on restart), which [`Context::is_valid`]
/// re-checks.
///
/// Dropping an unreleased context releases it best-effort.
#[derive(Debug)]
pub struct Context {
    transport: &'static dyn Transport,
    handle: crate::transport::RawContext,
    released: bool,
}

impl Context {
    /// Establish a session with the platform resource manager
    ///
    /// Fails with a service-unavailable kind when the resource manager is
    /// not running.
    #[cfg(unix)]
    pub fn establish(scope: Scope) -> Result<Self> {
        Self::with_transport(crate::transport::pcsclite::PcscLite::shared()?, scope)
    }

    /// Establish a session over a caller-supplied transport
    ///
    /// This is the seam the rest of the crate is built on; production code
    /// uses [`Context::establish`], tests and alternative platforms plug in
    /// their own [`Transport`].
    pub fn with_transport(transport: &'static dyn Transport, scope: Scope) -> Result<Self> {
        let handle = transport.establish(scope)?;
        debug!(handle, ?scope, "established resource manager session");
        Ok(Self {
            transport,
            handle,
            released: false,
        })
    }

    /// Probe whether this session is still valid
    ///
    /// The handle-invalid result code is the expected negative answer here,
    /// not an error; any other failure propagates.
    pub fn is_valid(&self) -> Result<bool> {
        match self.transport.is_valid(self.handle) {
            Ok(()) => Ok(true),
            Err(Error::InvalidHandle) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Unblock a status-change wait in progress on this session
    ///
    /// Idempotent; has no effect when no wait is blocked.
    pub fn cancel(&self) -> Result<()> {
        self.transport.cancel(self.handle)
    }

    /// Release the session
    ///
    /// All further use is prevented by consuming the value; safe to call
    /// whether or not a card session was ever opened.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        debug!(handle = self.handle, "releasing resource manager session");
        self.transport.release(self.handle)
    }

    /// List the names of readers known to the service
    ///
    /// Two-phase size-then-fill; an empty list is a valid result, not an
    /// error.
    pub fn list_readers(&self) -> Result<Vec<String>> {
        self.list(|buf| self.transport.list_readers(self.handle, buf))
    }

    /// List the names of reader groups known to the service
    pub fn list_reader_groups(&self) -> Result<Vec<String>> {
        self.list(|buf| self.transport.list_reader_groups(self.handle, buf))
    }

    fn list(&self, call: impl Fn(Option<&mut [u8]>) -> Result<usize>) -> Result<Vec<String>> {
        let needed = match call(None) {
            Ok(needed) => needed,
            // No readers is a valid steady state, not a failure.
            Err(Error::NoReadersAvailable) => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        if needed == 0 {
            return Ok(Vec::new());
        }

        let mut buf = vec![0u8; needed];
        let written = match call(Some(&mut buf)) {
            Ok(written) => written,
            Err(Error::NoReadersAvailable) => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        buf.truncate(written.min(needed));
        Ok(crate::util::decode_multi_string(&buf))
    }

    /// Block until a watched reader changes state, the timeout elapses or
    /// [`Context::cancel`] is called from another thread
    ///
    /// Performs exactly one blocking call. On success every descriptor's
    /// `event_state` (and ATR, when the service reports one) is overwritten,
    /// with `result[i]` corresponding to `states[i]`. On failure no
    /// descriptor is modified; a timeout and an explicit cancel surface as
    /// the distinct [`Error::Timeout`] and [`Error::Cancelled`]. The engine
    /// never loops internally; callers retry by calling again.
    ///
    /// `None` means block indefinitely. A bounded timeout longer than the
    /// largest finite wait the service can express is clamped to that
    /// maximum, never wrapped to infinite.
    pub fn get_status_change(
        &self,
        states: &mut [ReaderState],
        timeout: Option<Duration>,
    ) -> Result<()> {
        if states.is_empty() {
            return Err(Error::InvalidParameter);
        }

        let mut records = states
            .iter()
            .map(|state| {
                let reader =
                    CString::new(state.reader.as_str()).map_err(|_| Error::InvalidValue)?;
                Ok(WatchRecord::new(
                    reader,
                    state.current_state.bits(),
                    &state.atr,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        self.transport
            .wait_status_change(self.handle, encode_timeout(timeout), &mut records)?;

        // Full success: merge every record back, positionally.
        for (state, record) in states.iter_mut().zip(&records) {
            state.event_state = StateFlags::from_bits_retain(record.event_state);
            if record.atr_len > 0 {
                state.atr = record.atr().to_vec();
            }
        }
        Ok(())
    }

    /// Open a card session on the named reader
    ///
    /// The service picks one protocol out of `preferred`; the negotiated
    /// result is recorded on the returned [`Card`].
    pub fn connect(&self, reader: &str, mode: ShareMode, preferred: Protocols) -> Result<Card> {
        let name = CString::new(reader).map_err(|_| Error::InvalidValue)?;
        let (handle, protocol) = self.transport.connect(self.handle, &name, mode, preferred)?;
        debug!(reader, ?mode, ?protocol, "connected to card");
        Ok(Card::new(self.transport, handle, protocol, mode))
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if !self.released {
            if let Err(err) = self.transport.release(self.handle) {
                warn!(handle = self.handle, %err, "failed to release context on drop");
            }
        }
    }
}

/// Translate a caller timeout to the service's native representation
///
/// `None` maps to the infinite sentinel; finite durations longer than the
/// largest expressible finite wait clamp to that maximum rather than
/// wrapping to infinite.
fn encode_timeout(timeout: Option<Duration>) -> u32 {
    match timeout {
        None => INFINITE_TIMEOUT,
        Some(duration) => {
            let millis = duration.as_millis();
            if millis >= u128::from(INFINITE_TIMEOUT) {
                INFINITE_TIMEOUT - 1
            } else {
                millis as u32
            }
        }
    }
}
