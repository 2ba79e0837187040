//! Error types for resource manager operations
//!
//! Every boundary call returns a numeric result code; zero is the unique
//! success value. Non-zero codes map onto the closed [`Error`] enumeration,
//! which carries both the original code ([`Error::raw`]) and a stable
//! classification ([`Error::kind`]) so callers never have to match on bare
//! numbers.

use thiserror::Error;

/// Result type for resource manager operations
pub type Result<T> = core::result::Result<T, Error>;

/// Stable classification of resource manager failures
///
/// Several numeric codes collapse onto one kind; the exact code stays
/// available through [`Error::raw`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The resource manager service is not running or went away
    ServiceUnavailable,
    /// A released or never-established handle was used
    InvalidHandle,
    /// The named reader does not exist or cannot be contacted
    ReaderUnavailable,
    /// No card is inserted in the reader
    NoSmartcard,
    /// The card is held in a conflicting share mode by another session
    SharingViolation,
    /// The blocking call elapsed without a state change
    Timeout,
    /// The blocking call was unblocked by an explicit cancel
    Cancelled,
    /// The card was removed mid-operation
    CardRemoved,
    /// The card did not answer to reset
    CardMute,
    /// The card is present but unpowered
    CardUnresponsive,
    /// A caller-supplied buffer was too small for the result
    InsufficientBuffer,
    /// The feature, attribute or card type is not supported by this reader
    Unsupported,
    /// Any other failure reported by the service
    Other,
}

macro_rules! status_codes {
    ($($(#[$doc:meta])* $variant:ident = $code:literal => $kind:ident, $msg:literal;)*) => {
        /// An error reported by the smart card resource manager
        ///
        /// One variant per documented PC/SC result code, plus [`Error::Unknown`]
        /// for codes outside the documented range. The rendered message matches
        /// the service's own description of the code.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
        #[non_exhaustive]
        pub enum Error {
            $(
                $(#[$doc])*
                #[error($msg)]
                $variant,
            )*
            /// Result code outside the documented PC/SC range
            #[error("unrecognized result code {0:#010x}")]
            Unknown(u32),
        }

        impl Error {
            /// Map a raw non-zero result code onto the enumeration
            pub const fn from_raw(code: u32) -> Self {
                match code {
                    $($code => Self::$variant,)*
                    other => Self::Unknown(other),
                }
            }

            /// The numeric result code this error was built from
            pub const fn raw(&self) -> u32 {
                match self {
                    $(Self::$variant => $code,)*
                    Self::Unknown(code) => *code,
                }
            }

            /// Stable classification of this failure
            pub const fn kind(&self) -> ErrorKind {
                match self {
                    $(Self::$variant => ErrorKind::$kind,)*
                    Self::Unknown(_) => ErrorKind::Other,
                }
            }
        }
    };
}

status_codes! {
    /// `SCARD_F_INTERNAL_ERROR`
    InternalError = 0x8010_0001 => Other, "internal error";
    /// `SCARD_E_CANCELLED`
    Cancelled = 0x8010_0002 => Cancelled, "command cancelled";
    /// `SCARD_E_INVALID_HANDLE`
    InvalidHandle = 0x8010_0003 => InvalidHandle, "invalid handle";
    /// `SCARD_E_INVALID_PARAMETER`
    InvalidParameter = 0x8010_0004 => Other, "invalid parameter given";
    /// `SCARD_E_INVALID_TARGET`
    InvalidTarget = 0x8010_0005 => Other, "invalid target given";
    /// `SCARD_E_NO_MEMORY`
    NoMemory = 0x8010_0006 => Other, "not enough memory";
    /// `SCARD_F_WAITED_TOO_LONG`
    WaitedTooLong = 0x8010_0007 => Timeout, "waited too long";
    /// `SCARD_E_INSUFFICIENT_BUFFER`
    InsufficientBuffer = 0x8010_0008 => InsufficientBuffer, "insufficient buffer";
    /// `SCARD_E_UNKNOWN_READER`
    UnknownReader = 0x8010_0009 => ReaderUnavailable, "unknown reader specified";
    /// `SCARD_E_TIMEOUT`
    Timeout = 0x8010_000A => Timeout, "command timeout";
    /// `SCARD_E_SHARING_VIOLATION`
    SharingViolation = 0x8010_000B => SharingViolation, "sharing violation";
    /// `SCARD_E_NO_SMARTCARD`
    NoSmartcard = 0x8010_000C => NoSmartcard, "no smart card inserted";
    /// `SCARD_E_UNKNOWN_CARD`
    UnknownCard = 0x8010_000D => Unsupported, "unknown card";
    /// `SCARD_E_CANT_DISPOSE`
    CantDispose = 0x8010_000E => Other, "cannot dispose handle";
    /// `SCARD_E_PROTO_MISMATCH`
    ProtoMismatch = 0x8010_000F => Other, "card protocol mismatch";
    /// `SCARD_E_NOT_READY`
    NotReady = 0x8010_0010 => Other, "subsystem not ready";
    /// `SCARD_E_INVALID_VALUE`
    InvalidValue = 0x8010_0011 => Other, "invalid value given";
    /// `SCARD_E_SYSTEM_CANCELLED`
    SystemCancelled = 0x8010_0012 => Cancelled, "system cancelled";
    /// `SCARD_F_COMM_ERROR`
    CommError = 0x8010_0013 => Other, "RPC transport error";
    /// `SCARD_F_UNKNOWN_ERROR`
    UnknownError = 0x8010_0014 => Other, "unknown error";
    /// `SCARD_E_INVALID_ATR`
    InvalidAtr = 0x8010_0015 => Other, "invalid ATR";
    /// `SCARD_E_NOT_TRANSACTED`
    NotTransacted = 0x8010_0016 => Other, "transaction failed";
    /// `SCARD_E_READER_UNAVAILABLE`
    ReaderUnavailable = 0x8010_0017 => ReaderUnavailable, "reader is unavailable";
    /// `SCARD_P_SHUTDOWN`
    Shutdown = 0x8010_0018 => ServiceUnavailable, "operation aborted by shutdown";
    /// `SCARD_E_PCI_TOO_SMALL`
    PciTooSmall = 0x8010_0019 => Other, "PCI structure too small";
    /// `SCARD_E_READER_UNSUPPORTED`
    ReaderUnsupported = 0x8010_001A => Unsupported, "reader is unsupported";
    /// `SCARD_E_DUPLICATE_READER`
    DuplicateReader = 0x8010_001B => Other, "reader already exists";
    /// `SCARD_E_CARD_UNSUPPORTED`
    CardUnsupported = 0x8010_001C => Unsupported, "card is unsupported";
    /// `SCARD_E_NO_SERVICE`
    NoService = 0x8010_001D => ServiceUnavailable, "service not available";
    /// `SCARD_E_SERVICE_STOPPED`
    ServiceStopped = 0x8010_001E => ServiceUnavailable, "service was stopped";
    /// `SCARD_E_UNSUPPORTED_FEATURE` (shares a code with `SCARD_E_UNEXPECTED`)
    UnsupportedFeature = 0x8010_001F => Unsupported, "feature not supported";
    /// `SCARD_E_ICC_INSTALLATION`
    IccInstallation = 0x8010_0020 => Other, "ICC installation failed";
    /// `SCARD_E_ICC_CREATEORDER`
    IccCreateorder = 0x8010_0021 => Other, "ICC creation order failed";
    /// `SCARD_E_DIR_NOT_FOUND`
    DirNotFound = 0x8010_0023 => Other, "directory not found";
    /// `SCARD_E_FILE_NOT_FOUND`
    FileNotFound = 0x8010_0024 => Other, "file not found";
    /// `SCARD_E_NO_DIR`
    NoDir = 0x8010_0025 => Other, "no directory";
    /// `SCARD_E_NO_FILE`
    NoFile = 0x8010_0026 => Other, "no file";
    /// `SCARD_E_NO_ACCESS`
    NoAccess = 0x8010_0027 => Other, "access denied to file";
    /// `SCARD_E_WRITE_TOO_MANY`
    WriteTooMany = 0x8010_0028 => Other, "write too many";
    /// `SCARD_E_BAD_SEEK`
    BadSeek = 0x8010_0029 => Other, "bad seek";
    /// `SCARD_E_INVALID_CHV`
    InvalidChv = 0x8010_002A => Other, "invalid CHV";
    /// `SCARD_E_UNKNOWN_RES_MNG`
    UnknownResMng = 0x8010_002B => ServiceUnavailable, "unknown resource manager";
    /// `SCARD_E_NO_SUCH_CERTIFICATE`
    NoSuchCertificate = 0x8010_002C => Other, "no such certificate";
    /// `SCARD_E_CERTIFICATE_UNAVAILABLE`
    CertificateUnavailable = 0x8010_002D => Other, "certificate unavailable";
    /// `SCARD_E_NO_READERS_AVAILABLE`
    NoReadersAvailable = 0x8010_002E => ReaderUnavailable, "cannot find a smart card reader";
    /// `SCARD_E_COMM_DATA_LOST`
    CommDataLost = 0x8010_002F => Other, "card communication error";
    /// `SCARD_E_NO_KEY_CONTAINER`
    NoKeyContainer = 0x8010_0030 => Other, "no key container";
    /// `SCARD_E_SERVER_TOO_BUSY`
    ServerTooBusy = 0x8010_0031 => Other, "server too busy";
    /// `SCARD_W_UNSUPPORTED_CARD`
    UnsupportedCard = 0x8010_0065 => Unsupported, "card is not supported";
    /// `SCARD_W_UNRESPONSIVE_CARD`
    UnresponsiveCard = 0x8010_0066 => CardMute, "card is mute";
    /// `SCARD_W_UNPOWERED_CARD`
    UnpoweredCard = 0x8010_0067 => CardUnresponsive, "card is unpowered";
    /// `SCARD_W_RESET_CARD`
    ResetCard = 0x8010_0068 => Other, "card was reset";
    /// `SCARD_W_REMOVED_CARD`
    RemovedCard = 0x8010_0069 => CardRemoved, "card was removed";
    /// `SCARD_W_SECURITY_VIOLATION`
    SecurityViolation = 0x8010_006A => Other, "access denied";
    /// `SCARD_W_WRONG_CHV`
    WrongChv = 0x8010_006B => Other, "wrong CHV";
    /// `SCARD_W_CHV_BLOCKED`
    ChvBlocked = 0x8010_006C => Other, "CHV blocked";
    /// `SCARD_W_EOF`
    Eof = 0x8010_006D => Other, "end of file";
    /// `SCARD_W_CANCELLED_BY_USER`
    CancelledByUser = 0x8010_006E => Cancelled, "cancelled by user";
    /// `SCARD_W_CARD_NOT_AUTHENTICATED`
    CardNotAuthenticated = 0x8010_006F => Other, "card not authenticated";
}

/// The unique success value of the boundary-call surface
pub const SUCCESS: u32 = 0;

impl Error {
    /// Turn a raw result code into a `Result`, mapping zero to `Ok`
    pub const fn check(code: u32) -> Result<()> {
        if code == SUCCESS {
            Ok(())
        } else {
            Err(Self::from_raw(code))
        }
    }
}
