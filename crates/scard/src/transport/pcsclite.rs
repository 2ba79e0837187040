//! pcsclite implementation of the boundary-call surface
//!
//! Symbols are resolved lazily from the system's `libpcsclite` through a
//! process-wide table; the table is initialized once and never torn down.
//! Re-initialization is not supported.

use std::ffi::{c_char, c_void, CString};
use std::mem;
use std::sync::OnceLock;

use libloading::Library;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::reader::CardStatus;
use crate::transport::{ProtocolHeader, RawContext, RawHandle, Transport, WatchRecord};
use crate::types::{
    CardState, Disposition, Protocol, Protocols, Scope, ShareMode, MAX_ATR_SIZE, MAX_READER_NAME,
};
use crate::util;

#[cfg(not(target_os = "macos"))]
type Dword = std::os::raw::c_ulong;
#[cfg(target_os = "macos")]
type Dword = u32;

#[cfg(not(target_os = "macos"))]
type Lng = std::os::raw::c_long;
#[cfg(target_os = "macos")]
type Lng = i32;

/// `SCARD_READERSTATE`, the fixed-layout record of the status-change wait
#[cfg(not(target_os = "macos"))]
#[repr(C)]
struct ScardReaderState {
    sz_reader: *const c_char,
    pv_user_data: *mut c_void,
    dw_current_state: Dword,
    dw_event_state: Dword,
    cb_atr: Dword,
    rgb_atr: [u8; MAX_ATR_SIZE],
}

#[cfg(target_os = "macos")]
#[repr(C, packed)]
struct ScardReaderState {
    sz_reader: *const c_char,
    pv_user_data: *mut c_void,
    dw_current_state: Dword,
    dw_event_state: Dword,
    cb_atr: Dword,
    rgb_atr: [u8; MAX_ATR_SIZE],
}

/// `SCARD_IO_REQUEST`, the protocol header of a transmit call
#[repr(C)]
struct IoRequest {
    dw_protocol: Dword,
    cb_pci_length: Dword,
}

type EstablishFn = unsafe extern "C" fn(Dword, *const c_void, *const c_void, *mut Lng) -> Lng;
type HandleOnlyFn = unsafe extern "C" fn(Lng) -> Lng;
type HandleDispositionFn = unsafe extern "C" fn(Lng, Dword) -> Lng;
type ListReadersFn =
    unsafe extern "C" fn(Lng, *const c_char, *mut c_char, *mut Dword) -> Lng;
type ListGroupsFn = unsafe extern "C" fn(Lng, *mut c_char, *mut Dword) -> Lng;
type GetStatusChangeFn =
    unsafe extern "C" fn(Lng, Dword, *mut ScardReaderState, Dword) -> Lng;
type ConnectFn =
    unsafe extern "C" fn(Lng, *const c_char, Dword, Dword, *mut Lng, *mut Dword) -> Lng;
type ReconnectFn = unsafe extern "C" fn(Lng, Dword, Dword, Dword, *mut Dword) -> Lng;
type StatusFn = unsafe extern "C" fn(
    Lng,
    *mut c_char,
    *mut Dword,
    *mut Dword,
    *mut Dword,
    *mut u8,
    *mut Dword,
) -> Lng;
type TransmitFn = unsafe extern "C" fn(
    Lng,
    *const IoRequest,
    *const u8,
    Dword,
    *mut IoRequest,
    *mut u8,
    *mut Dword,
) -> Lng;
type ControlFn =
    unsafe extern "C" fn(Lng, Dword, *const c_void, Dword, *mut c_void, Dword, *mut Dword) -> Lng;
type GetAttribFn = unsafe extern "C" fn(Lng, Dword, *mut u8, *mut Dword) -> Lng;
type SetAttribFn = unsafe extern "C" fn(Lng, Dword, *const u8, Dword) -> Lng;

#[derive(Debug, Clone, Copy)]
struct Symbols {
    establish: EstablishFn,
    release: HandleOnlyFn,
    is_valid: HandleOnlyFn,
    cancel: HandleOnlyFn,
    list_readers: ListReadersFn,
    list_groups: ListGroupsFn,
    get_status_change: GetStatusChangeFn,
    connect: ConnectFn,
    reconnect: ReconnectFn,
    disconnect: HandleDispositionFn,
    begin_transaction: HandleOnlyFn,
    end_transaction: HandleDispositionFn,
    status: StatusFn,
    transmit: TransmitFn,
    control: ControlFn,
    get_attrib: GetAttribFn,
    set_attrib: SetAttribFn,
}

/// The pcsclite boundary-call table
///
/// Obtain the process-wide instance with [`PcscLite::shared`].
#[derive(Debug)]
pub struct PcscLite {
    _lib: Library,
    sym: Symbols,
}

#[cfg(target_os = "macos")]
const LIBRARY_CANDIDATES: &[&str] = &["/System/Library/Frameworks/PCSC.framework/PCSC"];
#[cfg(not(target_os = "macos"))]
const LIBRARY_CANDIDATES: &[&str] = &["libpcsclite.so.1", "libpcsclite.so"];

impl PcscLite {
    /// The process-wide table, loading the library on first use
    ///
    /// A failed load is remembered; later calls report the same error
    /// without retrying.
    pub fn shared() -> Result<&'static Self> {
        static SHARED: OnceLock<Result<&'static PcscLite>> = OnceLock::new();
        *SHARED.get_or_init(|| Self::load().map(|lib| &*Box::leak(Box::new(lib))))
    }

    fn load() -> Result<Self> {
        let lib = LIBRARY_CANDIDATES
            .iter()
            .find_map(|&name| {
                // SAFETY: pcsclite has no unsound initialization routines.
                match unsafe { Library::new(name) } {
                    Ok(lib) => Some(lib),
                    Err(err) => {
                        debug!(library = name, %err, "failed to load pcsclite candidate");
                        None
                    }
                }
            })
            .ok_or(Error::NoService)?;

        let sym = unsafe {
            Symbols {
                establish: *lib
                    .get::<EstablishFn>(b"SCardEstablishContext\0")
                    .map_err(|_| Error::NoService)?,
                release: *lib
                    .get::<HandleOnlyFn>(b"SCardReleaseContext\0")
                    .map_err(|_| Error::NoService)?,
                is_valid: *lib
                    .get::<HandleOnlyFn>(b"SCardIsValidContext\0")
                    .map_err(|_| Error::NoService)?,
                cancel: *lib
                    .get::<HandleOnlyFn>(b"SCardCancel\0")
                    .map_err(|_| Error::NoService)?,
                list_readers: *lib
                    .get::<ListReadersFn>(b"SCardListReaders\0")
                    .map_err(|_| Error::NoService)?,
                list_groups: *lib
                    .get::<ListGroupsFn>(b"SCardListReaderGroups\0")
                    .map_err(|_| Error::NoService)?,
                get_status_change: *lib
                    .get::<GetStatusChangeFn>(b"SCardGetStatusChange\0")
                    .map_err(|_| Error::NoService)?,
                connect: *lib
                    .get::<ConnectFn>(b"SCardConnect\0")
                    .map_err(|_| Error::NoService)?,
                reconnect: *lib
                    .get::<ReconnectFn>(b"SCardReconnect\0")
                    .map_err(|_| Error::NoService)?,
                disconnect: *lib
                    .get::<HandleDispositionFn>(b"SCardDisconnect\0")
                    .map_err(|_| Error::NoService)?,
                begin_transaction: *lib
                    .get::<HandleOnlyFn>(b"SCardBeginTransaction\0")
                    .map_err(|_| Error::NoService)?,
                end_transaction: *lib
                    .get::<HandleDispositionFn>(b"SCardEndTransaction\0")
                    .map_err(|_| Error::NoService)?,
                status: *lib
                    .get::<StatusFn>(b"SCardStatus\0")
                    .map_err(|_| Error::NoService)?,
                transmit: *lib
                    .get::<TransmitFn>(b"SCardTransmit\0")
                    .map_err(|_| Error::NoService)?,
                control: *lib
                    .get::<ControlFn>(b"SCardControl\0")
                    .map_err(|_| Error::NoService)?,
                get_attrib: *lib
                    .get::<GetAttribFn>(b"SCardGetAttrib\0")
                    .map_err(|_| Error::NoService)?,
                set_attrib: *lib
                    .get::<SetAttribFn>(b"SCardSetAttrib\0")
                    .map_err(|_| Error::NoService)?,
            }
        };

        debug!("loaded pcsclite symbol table");
        Ok(Self { _lib: lib, sym })
    }
}

fn check(ret: Lng) -> Result<()> {
    Error::check(ret as u32)
}

impl Transport for PcscLite {
    fn establish(&self, scope: Scope) -> Result<RawContext> {
        let mut ctx: Lng = 0;
        let ret = unsafe {
            (self.sym.establish)(
                scope as u32 as Dword,
                std::ptr::null(),
                std::ptr::null(),
                &mut ctx,
            )
        };
        check(ret)?;
        Ok(ctx as RawContext)
    }

    fn release(&self, context: RawContext) -> Result<()> {
        check(unsafe { (self.sym.release)(context as Lng) })
    }

    fn is_valid(&self, context: RawContext) -> Result<()> {
        check(unsafe { (self.sym.is_valid)(context as Lng) })
    }

    fn cancel(&self, context: RawContext) -> Result<()> {
        check(unsafe { (self.sym.cancel)(context as Lng) })
    }

    fn list_readers(&self, context: RawContext, buf: Option<&mut [u8]>) -> Result<usize> {
        let (ptr, mut needed) = match buf {
            None => (std::ptr::null_mut(), 0 as Dword),
            Some(buf) => (buf.as_mut_ptr().cast::<c_char>(), buf.len() as Dword),
        };
        let ret = unsafe {
            (self.sym.list_readers)(context as Lng, std::ptr::null(), ptr, &mut needed)
        };
        check(ret)?;
        Ok(needed as usize)
    }

    fn list_reader_groups(&self, context: RawContext, buf: Option<&mut [u8]>) -> Result<usize> {
        let (ptr, mut needed) = match buf {
            None => (std::ptr::null_mut(), 0 as Dword),
            Some(buf) => (buf.as_mut_ptr().cast::<c_char>(), buf.len() as Dword),
        };
        let ret = unsafe { (self.sym.list_groups)(context as Lng, ptr, &mut needed) };
        check(ret)?;
        Ok(needed as usize)
    }

    fn wait_status_change(
        &self,
        context: RawContext,
        timeout_ms: u32,
        records: &mut [WatchRecord],
    ) -> Result<()> {
        let mut crs: Vec<ScardReaderState> = records
            .iter()
            .map(|rec| ScardReaderState {
                sz_reader: rec.reader.as_ptr(),
                pv_user_data: std::ptr::null_mut(),
                dw_current_state: rec.current_state as Dword,
                dw_event_state: 0,
                cb_atr: rec.atr_len as Dword,
                rgb_atr: rec.atr,
            })
            .collect();

        trace!(readers = records.len(), timeout_ms, "entering status-change wait");
        let ret = unsafe {
            (self.sym.get_status_change)(
                context as Lng,
                timeout_ms as Dword,
                crs.as_mut_ptr(),
                crs.len() as Dword,
            )
        };
        check(ret)?;

        for (rec, cr) in records.iter_mut().zip(&crs) {
            let event_state = cr.dw_event_state;
            let cb_atr = cr.cb_atr;
            rec.event_state = event_state as u32;
            if cb_atr > 0 {
                let len = (cb_atr as usize).min(MAX_ATR_SIZE);
                rec.atr = cr.rgb_atr;
                rec.atr_len = len;
            }
        }
        Ok(())
    }

    fn connect(
        &self,
        context: RawContext,
        reader: &CString,
        mode: ShareMode,
        preferred: Protocols,
    ) -> Result<(RawHandle, Protocol)> {
        let mut handle: Lng = 0;
        let mut active: Dword = 0;
        let ret = unsafe {
            (self.sym.connect)(
                context as Lng,
                reader.as_ptr(),
                mode as u32 as Dword,
                preferred.bits() as Dword,
                &mut handle,
                &mut active,
            )
        };
        check(ret)?;
        Ok((handle as RawHandle, Protocol::from_raw(active as u32)))
    }

    fn reconnect(
        &self,
        card: RawHandle,
        mode: ShareMode,
        preferred: Protocols,
        initialization: Disposition,
    ) -> Result<Protocol> {
        let mut active: Dword = 0;
        let ret = unsafe {
            (self.sym.reconnect)(
                card as Lng,
                mode as u32 as Dword,
                preferred.bits() as Dword,
                initialization as u32 as Dword,
                &mut active,
            )
        };
        check(ret)?;
        Ok(Protocol::from_raw(active as u32))
    }

    fn disconnect(&self, card: RawHandle, disposition: Disposition) -> Result<()> {
        check(unsafe { (self.sym.disconnect)(card as Lng, disposition as u32 as Dword) })
    }

    fn begin_transaction(&self, card: RawHandle) -> Result<()> {
        check(unsafe { (self.sym.begin_transaction)(card as Lng) })
    }

    fn end_transaction(&self, card: RawHandle, disposition: Disposition) -> Result<()> {
        check(unsafe { (self.sym.end_transaction)(card as Lng, disposition as u32 as Dword) })
    }

    fn status(&self, card: RawHandle) -> Result<CardStatus> {
        let mut reader_buf = [0u8; MAX_READER_NAME + 1];
        let mut reader_len = reader_buf.len() as Dword;
        let mut state: Dword = 0;
        let mut protocol: Dword = 0;
        let mut atr = [0u8; MAX_ATR_SIZE];
        let mut atr_len = atr.len() as Dword;

        let ret = unsafe {
            (self.sym.status)(
                card as Lng,
                reader_buf.as_mut_ptr().cast::<c_char>(),
                &mut reader_len,
                &mut state,
                &mut protocol,
                atr.as_mut_ptr(),
                &mut atr_len,
            )
        };
        check(ret)?;

        // The reported name is a multi-string; only the first member names
        // the reader.
        let names = util::decode_multi_string(&reader_buf[..reader_len as usize]);
        let reader = names.into_iter().next().unwrap_or_default();

        Ok(CardStatus {
            reader,
            state: CardState::from_bits_truncate(state as u32),
            protocol: Protocol::from_raw(protocol as u32),
            atr: atr[..(atr_len as usize).min(MAX_ATR_SIZE)].to_vec(),
        })
    }

    fn transmit(
        &self,
        card: RawHandle,
        header: ProtocolHeader,
        command: &[u8],
        recv: &mut [u8],
    ) -> Result<usize> {
        let send_pci = IoRequest {
            dw_protocol: header.protocol_value() as Dword,
            cb_pci_length: mem::size_of::<IoRequest>() as Dword,
        };
        let mut recv_pci = IoRequest {
            dw_protocol: 0,
            cb_pci_length: mem::size_of::<IoRequest>() as Dword,
        };
        let mut recv_len = recv.len() as Dword;

        let ret = unsafe {
            (self.sym.transmit)(
                card as Lng,
                &send_pci,
                command.as_ptr(),
                command.len() as Dword,
                &mut recv_pci,
                recv.as_mut_ptr(),
                &mut recv_len,
            )
        };
        check(ret)?;
        Ok(recv_len as usize)
    }

    fn control(
        &self,
        card: RawHandle,
        code: u32,
        input: &[u8],
        recv: &mut [u8],
    ) -> Result<usize> {
        let (in_ptr, in_len) = if input.is_empty() {
            (std::ptr::null(), 0 as Dword)
        } else {
            (input.as_ptr().cast::<c_void>(), input.len() as Dword)
        };
        let mut recv_len: Dword = 0;

        let ret = unsafe {
            (self.sym.control)(
                card as Lng,
                code as Dword,
                in_ptr,
                in_len,
                recv.as_mut_ptr().cast::<c_void>(),
                recv.len() as Dword,
                &mut recv_len,
            )
        };
        check(ret)?;
        Ok(recv_len as usize)
    }

    fn get_attrib(&self, card: RawHandle, id: u32, buf: Option<&mut [u8]>) -> Result<usize> {
        let (ptr, mut needed) = match buf {
            None => (std::ptr::null_mut(), 0 as Dword),
            Some(buf) => (buf.as_mut_ptr(), buf.len() as Dword),
        };
        let ret = unsafe { (self.sym.get_attrib)(card as Lng, id as Dword, ptr, &mut needed) };
        check(ret)?;
        Ok(needed as usize)
    }

    fn set_attrib(&self, card: RawHandle, id: u32, data: &[u8]) -> Result<()> {
        let ret = unsafe {
            (self.sym.set_attrib)(card as Lng, id as Dword, data.as_ptr(), data.len() as Dword)
        };
        check(ret)
    }
}
