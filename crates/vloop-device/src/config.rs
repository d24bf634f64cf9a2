use vloop_protocol::palette::PALETTE_YUV420P;

/// Upper bound on the number of device slots a registry will create; larger
/// requests are clamped, not rejected.
pub const MAX_DEVICES: u32 = 8;

/// Initial settings applied to every slot.
#[derive(Clone, Copy, Debug)]
pub struct SlotDefaults {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Bits per pixel.
    pub depth: u32,
    /// Numeric palette code (see `vloop_protocol::palette`).
    pub palette: u32,
    /// Frame rate used for write pacing; 0 disables pacing.
    pub fps: u32,
    pub brightness: u32,
    pub hue: u32,
    pub colour: u32,
    pub contrast: u32,
    pub whiteness: u32,
}

impl Default for SlotDefaults {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            depth: 32,
            palette: PALETTE_YUV420P,
            fps: 25,
            brightness: 32768,
            hue: 32768,
            colour: 32768,
            contrast: 32768,
            whiteness: 32768,
        }
    }
}

/// Registry-wide construction settings.
#[derive(Clone, Copy, Debug)]
pub struct RegistryConfig {
    /// Number of device slots to create; clamped to [`MAX_DEVICES`].
    pub devices: u32,
    /// Initial settings for every slot.
    pub defaults: SlotDefaults,
    /// Frame count advertised by the mapped-buffer layout query; clamped to
    /// `vloop_protocol::VIDEO_MAX_FRAME`. The advertised frames all share one
    /// backing buffer.
    pub frame_slots: u32,
    /// Hard cap on a single frame buffer allocation, in bytes. Geometry
    /// requests whose page-rounded size exceeds this fail like any other
    /// allocation failure.
    pub max_frame_bytes: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            devices: 1,
            defaults: SlotDefaults::default(),
            frame_slots: 1,
            max_frame_bytes: 256 * 1024 * 1024,
        }
    }
}
