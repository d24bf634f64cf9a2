//! Numeric palette vocabulary (`VIDEO_PALETTE_*`).
//!
//! Palette codes travel through the parameter and picture records as plain
//! numbers. [`palette_name`] supplies the human-readable names that parameter
//! tools print next to the code.

pub const PALETTE_GREY: u32 = 1;
pub const PALETTE_HI240: u32 = 2;
pub const PALETTE_RGB565: u32 = 3;
pub const PALETTE_RGB24: u32 = 4;
pub const PALETTE_RGB32: u32 = 5;
pub const PALETTE_RGB555: u32 = 6;
pub const PALETTE_YUV422: u32 = 7;
pub const PALETTE_YUYV: u32 = 8;
pub const PALETTE_UYVY: u32 = 9;
pub const PALETTE_YUV420: u32 = 10;
pub const PALETTE_YUV411: u32 = 11;
pub const PALETTE_RAW: u32 = 12;
pub const PALETTE_YUV422P: u32 = 13;
pub const PALETTE_YUV411P: u32 = 14;
pub const PALETTE_YUV420P: u32 = 15;
pub const PALETTE_YUV410P: u32 = 16;

/// Human-readable name for a palette code; `"UNKNOWN"` for anything outside
/// the defined range.
pub fn palette_name(code: u32) -> &'static str {
    match code {
        PALETTE_GREY => "GREY",
        PALETTE_HI240 => "High 240 cube (BT848)",
        PALETTE_RGB565 => "565 16 bit RGB",
        PALETTE_RGB24 => "24bit RGB",
        PALETTE_RGB32 => "32bit RGB",
        PALETTE_RGB555 => "555 15bit RGB",
        PALETTE_YUV422 => "YUV422 capture",
        PALETTE_YUYV => "YUYV",
        PALETTE_UYVY => "UYVY",
        PALETTE_YUV420 => "YUV420",
        PALETTE_YUV411 => "YUV411",
        PALETTE_RAW => "RAW (BT848)",
        PALETTE_YUV422P => "YUV 4:2:2 Planar",
        PALETTE_YUV411P => "YUV 4:1:1 Planar",
        PALETTE_YUV420P => "YUV 4:2:0 Planar",
        PALETTE_YUV410P => "YUV 4:1:0 Planar",
        _ => "UNKNOWN",
    }
}
