//! Transport-independent command surface of the vloop virtual capture device.
//!
//! The device speaks the first-generation Video4Linux control vocabulary
//! (capability/channel/picture/window descriptors plus mapped-buffer and
//! capture requests) extended with four device-specific commands for the
//! parameter record and the reservation holder. This crate defines those
//! payload records, the [`Command`]/[`Reply`] pair the engine dispatches on,
//! and the numeric palette vocabulary with its human-readable names.
//!
//! Everything here is plain data: no transport, no framing, no dependency on
//! the engine. A driver shim or test harness builds [`Command`] values and
//! matches on [`Reply`].
#![forbid(unsafe_code)]

pub mod palette;

/// Device kind reported by [`Capability::kind`] (`VID_TYPE_CAPTURE`).
pub const VID_TYPE_CAPTURE: u32 = 1;

/// Channel kind reported by [`Channel::kind`] (`VIDEO_TYPE_CAMERA`).
pub const VIDEO_TYPE_CAMERA: u32 = 2;

/// Video norm reported by [`Channel::norm`] (`VIDEO_MODE_AUTO`).
pub const VIDEO_MODE_AUTO: u32 = 3;

/// Number of per-frame offsets carried by [`BufferLayout`] (`VIDEO_MAX_FRAME`).
pub const VIDEO_MAX_FRAME: usize = 32;

/// The five-field parameter record carried by the device-specific
/// get/set-parameters commands.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct VideoParams {
    pub width: u32,
    pub height: u32,
    /// Bits per pixel.
    pub depth: u32,
    /// Numeric palette code (see [`palette`]). Not validated against the
    /// known codes; unknown values are stored and reported as-is.
    pub palette: u32,
    /// Frame rate used for write pacing; 0 disables pacing.
    pub fps: u32,
}

/// Capture capability descriptor (`struct video_capability`).
///
/// The device reports a fixed-geometry capture source: minimum and maximum
/// extents both equal the currently negotiated width/height.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Capability {
    /// Device name, e.g. `vloop_device_0`.
    pub name: String,
    /// Always [`VID_TYPE_CAPTURE`].
    pub kind: u32,
    pub channels: u32,
    pub audios: u32,
    pub max_width: u32,
    pub max_height: u32,
    pub min_width: u32,
    pub min_height: u32,
}

/// Input channel descriptor (`struct video_channel`).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Channel {
    pub channel: u32,
    pub name: String,
    pub tuners: u32,
    pub flags: u32,
    /// Always [`VIDEO_TYPE_CAMERA`].
    pub kind: u32,
    /// Always [`VIDEO_MODE_AUTO`].
    pub norm: u32,
}

/// Picture levels (`struct video_picture`).
///
/// The five cosmetic levels are stored by the device but not interpreted.
/// `depth` and `palette` ride along for validation: a picture update may
/// request a lower depth but never a higher one, and may never change the
/// palette.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Picture {
    pub brightness: u32,
    pub hue: u32,
    pub colour: u32,
    pub contrast: u32,
    pub whiteness: u32,
    pub depth: u32,
    pub palette: u32,
}

/// Capture window geometry (`struct video_window`).
///
/// The device has no overlay engine: `x`, `y`, `chromakey` and `clip_count`
/// are accepted and ignored, `flags` must be zero, and width/height must
/// match the negotiated frame geometry.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CaptureWindow {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub chromakey: u32,
    pub flags: u32,
    pub clip_count: u32,
}

/// Mapped-buffer layout advertised to mmap-based grabbers
/// (`struct video_mbuf`).
///
/// Every advertised frame is backed by the same storage, so all offsets are
/// zero and `size` is the size of that single buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BufferLayout {
    pub size: u32,
    pub frames: u32,
    pub offsets: [u32; VIDEO_MAX_FRAME],
}

/// Frame-buffer description for overlay-style queries
/// (`struct video_buffer`).
///
/// There is no physical frame buffer behind the device; `base` is a zero
/// placeholder.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FrameBufferInfo {
    pub base: u64,
    pub height: u32,
    pub width: u32,
    pub depth: u32,
    pub bytes_per_line: u32,
}

/// Single-frame capture request (`struct video_mmap`).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FrameCapture {
    pub frame: u32,
    pub height: u32,
    pub width: u32,
    pub format: u32,
}

/// A decoded control command.
///
/// Raw command codes a transport does not recognize are carried through as
/// [`Command::Other`] so the engine can report them distinctly from malformed
/// payloads.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Command {
    GetParams,
    SetParams(VideoParams),
    GetReservation,
    /// Set the reservation holder to the given process identity; 0 clears it.
    SetReservation(u32),
    GetCapability,
    GetChannel { channel: u32 },
    SetChannel { channel: u32 },
    GetPicture,
    SetPicture(Picture),
    GetWindow,
    SetWindow(CaptureWindow),
    GetBufferLayout,
    StartCapture,
    Sync { frame: u32 },
    CaptureFrame(FrameCapture),
    SetFrameBuffer,
    GetFrameBuffer,
    /// An unrecognized raw command code.
    Other(u32),
}

/// Successful command result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    /// Command accepted; no payload.
    Done,
    Params(VideoParams),
    /// Current reservation holder; 0 means unreserved.
    Reservation(u32),
    Capability(Capability),
    Channel(Channel),
    Picture(Picture),
    Window(CaptureWindow),
    BufferLayout(BufferLayout),
    FrameBuffer(FrameBufferInfo),
}
