//! Shared enumerations, bit masks and capacity constants
//!
//! Numeric values follow the pcsclite definitions; the capacity constants are
//! documented upper bounds a conforming implementation enforces, not
//! implementation accidents.

use bitflags::bitflags;

/// Maximum length of an ATR in bytes
pub const MAX_ATR_SIZE: usize = 33;

/// Maximum length of a reader name, including the terminator
pub const MAX_READER_NAME: usize = 128;

/// Maximum short APDU response buffer size
pub const MAX_BUFFER_SIZE: usize = 264;

/// Maximum extended APDU response buffer size (4 + 3 + 65536 + 3 + 2)
pub const MAX_BUFFER_SIZE_EXTENDED: usize = 4 + 3 + 65536 + 3 + 2;

/// Pseudo-reader name that wakes a status-change wait when the reader list
/// itself changes (plug-and-play notification)
pub const PNP_NOTIFICATION: &str = "\\\\?PnP?\\Notification";

/// Scope of an established session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Scope {
    /// Operations performed within the scope of the user
    User = 0,
    /// Operations performed within the scope of the current terminal
    Terminal = 1,
    /// Operations performed within the scope of the system
    System = 2,
}

/// Exclusivity policy for a card connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ShareMode {
    /// No other session may connect to the card
    Exclusive = 1,
    /// Other sessions may connect concurrently
    Shared = 2,
    /// Connect to the reader itself, with or without a card present
    Direct = 3,
}

/// Action taken on the card at disconnect, reconnect or end-transaction time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Disposition {
    /// Leave the card as-is
    Leave = 0,
    /// Reset the card
    Reset = 1,
    /// Power down the card
    Unpower = 2,
    /// Eject the card
    Eject = 3,
}

/// A transmission protocol negotiated with the card
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Protocol {
    /// No protocol negotiated (direct connections)
    Undefined = 0x0,
    /// Character-oriented T=0
    T0 = 0x1,
    /// Block-oriented T=1
    T1 = 0x2,
    /// Raw access, bypassing protocol framing
    Raw = 0x4,
}

impl Protocol {
    /// Map a raw protocol value as reported by the service
    ///
    /// Unrecognized values collapse to [`Protocol::Undefined`].
    pub const fn from_raw(value: u32) -> Self {
        match value {
            0x1 => Self::T0,
            0x2 => Self::T1,
            0x4 => Self::Raw,
            _ => Self::Undefined,
        }
    }
}

bitflags! {
    /// Protocol preference mask passed to connect and reconnect
    ///
    /// The service picks one member of the mask; the negotiated result comes
    /// back as a single [`Protocol`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Protocols: u32 {
        /// No protocol preference (direct connections only)
        const UNDEFINED = 0x0;
        /// T=0 acceptable
        const T0 = 0x1;
        /// T=1 acceptable
        const T1 = 0x2;
        /// Raw access acceptable
        const RAW = 0x4;
        /// Either T=0 or T=1
        const ANY = Self::T0.bits() | Self::T1.bits();
    }
}

bitflags! {
    /// Reader state flags used by the status-change wait
    ///
    /// Requested and observed state are independent masks over this flag
    /// space; see [`crate::ReaderState`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StateFlags: u32 {
        /// The caller has no prior knowledge of the reader state
        const UNAWARE = 0x0000;
        /// The caller is not interested in this reader this round
        const IGNORE = 0x0001;
        /// The observed state differs from the requested state
        const CHANGED = 0x0002;
        /// The reader name is not recognized by the service
        const UNKNOWN = 0x0004;
        /// The reader state is unavailable
        const UNAVAILABLE = 0x0008;
        /// No card in the reader
        const EMPTY = 0x0010;
        /// A card is present in the reader
        const PRESENT = 0x0020;
        /// The present card matches a registered ATR
        const ATRMATCH = 0x0040;
        /// The card is held exclusively by another session
        const EXCLUSIVE = 0x0080;
        /// The card is in use by one or more shared sessions
        const INUSE = 0x0100;
        /// The card is present but did not answer to reset
        const MUTE = 0x0200;
        /// The card is present but unpowered
        const UNPOWERED = 0x0400;
    }
}

bitflags! {
    /// Coarse presence/power state reported by a card status snapshot
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CardState: u32 {
        /// State is unknown
        const UNKNOWN = 0x0001;
        /// No card in the reader
        const ABSENT = 0x0002;
        /// A card is present but not positioned for use
        const PRESENT = 0x0004;
        /// The card is positioned for use but not powered
        const SWALLOWED = 0x0008;
        /// The card is powered
        const POWERED = 0x0010;
        /// The card is awaiting PTS negotiation
        const NEGOTIABLE = 0x0020;
        /// The card is operating under a specific protocol
        const SPECIFIC = 0x0040;
    }
}

/// Reader and card attribute identifiers for get/set-attrib
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
#[allow(missing_docs)]
#[non_exhaustive]
pub enum Attribute {
    VendorName = 0x10100,
    VendorIfdType = 0x10101,
    VendorIfdVersion = 0x10102,
    VendorIfdSerialNo = 0x10103,
    ChannelId = 0x20110,
    AsyncProtocolTypes = 0x30120,
    DefaultClk = 0x30121,
    MaxClk = 0x30122,
    DefaultDataRate = 0x30123,
    MaxDataRate = 0x30124,
    MaxIfsd = 0x30125,
    SyncProtocolTypes = 0x30126,
    PowerMgmtSupport = 0x40131,
    UserToCardAuthDevice = 0x50140,
    UserAuthInputDevice = 0x50142,
    Characteristics = 0x60150,
    CurrentProtocolType = 0x80201,
    CurrentClk = 0x80202,
    CurrentF = 0x80203,
    CurrentD = 0x80204,
    CurrentN = 0x80205,
    CurrentW = 0x80206,
    CurrentIfsc = 0x80207,
    CurrentIfsd = 0x80208,
    CurrentBwt = 0x80209,
    CurrentCwt = 0x8020A,
    CurrentEbcEncoding = 0x8020B,
    ExtendedBwt = 0x8020C,
    IccPresence = 0x90300,
    IccInterfaceStatus = 0x90301,
    CurrentIoState = 0x90302,
    AtrString = 0x90303,
    IccTypePerAtr = 0x90304,
    EscReset = 0x7A000,
    EscCancel = 0x7A003,
    EscAuthrequest = 0x7A005,
    Maxinput = 0x7A007,
    DeviceUnit = 0x7FFF_0001,
    DeviceInUse = 0x7FFF_0002,
    DeviceFriendlyName = 0x7FFF_0003,
    DeviceSystemName = 0x7FFF_0004,
    SuppressT1IfsRequest = 0x7FFF_0007,
}

impl Attribute {
    /// The raw attribute identifier
    pub const fn raw(self) -> u32 {
        self as u32
    }
}

/// Build a vendor control code for [`crate::Card::control`]
///
/// pcsclite maps control code `x` to `0x42000000 + x`.
pub const fn ctl_code(code: u32) -> u32 {
    0x4200_0000 + code
}
