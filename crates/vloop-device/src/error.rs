use thiserror::Error;

use crate::sync::Cancelled;

pub type Result<T> = std::result::Result<T, DeviceError>;

/// Broad classes of [`DeviceError`].
///
/// A driver shim maps these onto its transport's outcome space (reject, busy,
/// out-of-memory, retry, not-implemented) without matching every variant.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Malformed or out-of-contract request; rejected synchronously with no
    /// state change.
    Validation,
    /// Frame buffer allocation failure; the slot is left with no buffer and a
    /// frame size of zero.
    Resource,
    /// Reservation conflict on open; no slot state is mutated.
    Access,
    /// A blocking wait was cancelled; the whole operation may be retried.
    Interrupted,
    /// Command code not implemented for this device.
    Unsupported,
}

/// Unified error type for vloop device operations.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no device with minor {0}")]
    NoSuchDevice(u32),

    #[error("pid {pid} has reserved minor {reserved}")]
    Busy { pid: u32, reserved: u32 },

    #[error("invalid channel {0}")]
    InvalidChannel(u32),

    #[error("cannot raise depth from {current} to {requested}")]
    DepthRaise { current: u32, requested: u32 },

    #[error("cannot change palette from {current} to {requested}")]
    PaletteChange { current: u32, requested: u32 },

    #[error("window flags {0:#x} not supported")]
    WindowFlags(u32),

    #[error("geometry {requested_width}x{requested_height} does not match device {width}x{height}")]
    GeometryMismatch {
        requested_width: u32,
        requested_height: u32,
        width: u32,
        height: u32,
    },

    #[error("buffer overrun: {requested}/{capacity} bytes")]
    FrameOverrun { requested: usize, capacity: usize },

    #[error("could not allocate {bytes} byte video frame")]
    AllocationFailed { bytes: u64 },

    #[error("frame dimensions overflow the addressable size")]
    FrameSizeOverflow,

    #[error("wait interrupted")]
    Interrupted,

    #[error("command {0:#x} not implemented for this device")]
    UnsupportedCommand(u32),
}

impl DeviceError {
    /// The taxonomy class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeviceError::NoSuchDevice(_)
            | DeviceError::InvalidChannel(_)
            | DeviceError::DepthRaise { .. }
            | DeviceError::PaletteChange { .. }
            | DeviceError::WindowFlags(_)
            | DeviceError::GeometryMismatch { .. }
            | DeviceError::FrameOverrun { .. } => ErrorKind::Validation,
            DeviceError::AllocationFailed { .. } | DeviceError::FrameSizeOverflow => {
                ErrorKind::Resource
            }
            DeviceError::Busy { .. } => ErrorKind::Access,
            DeviceError::Interrupted => ErrorKind::Interrupted,
            DeviceError::UnsupportedCommand(_) => ErrorKind::Unsupported,
        }
    }
}

impl From<Cancelled> for DeviceError {
    fn from(_: Cancelled) -> Self {
        DeviceError::Interrupted
    }
}
