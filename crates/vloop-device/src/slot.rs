//! Per-device slot state and the command dispatcher.
//!
//! A [`VideoSlot`] owns one device's negotiated geometry, picture levels,
//! frame buffer and rendezvous state. Every control command and I/O call is
//! funnelled through here; the registry only adds device lookup and the
//! reservation policy on top.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vloop_protocol::palette::palette_name;
use vloop_protocol::{
    BufferLayout, Capability, CaptureWindow, Channel, Command, FrameBufferInfo, FrameCapture,
    Picture, Reply, VideoParams, VIDEO_MAX_FRAME, VIDEO_MODE_AUTO, VIDEO_TYPE_CAMERA,
    VID_TYPE_CAPTURE,
};

use crate::config::SlotDefaults;
use crate::frame::{frame_bytes, page_round_up, FrameBuffer, FrameMapping};
use crate::sync::{CancelToken, FramePacer, FrameSignal, Lock};
use crate::{DeviceError, Result};

/// Name reported for the single input channel.
pub const CAMERA_CHANNEL: &str = "vloop_camera";

/// Mutable slot fields guarded by the slot lock.
struct SlotState {
    width: u32,
    height: u32,
    depth: u32,
    palette: u32,
    fps: u32,
    brightness: u32,
    hue: u32,
    colour: u32,
    contrast: u32,
    whiteness: u32,
    /// Current backing storage; `None` after a failed allocation.
    buffer: Option<Arc<FrameBuffer>>,
    /// Page-rounded byte size of `buffer`; zero when there is no buffer.
    frame_size: u64,
    /// Generation assigned to the next allocation. Generation 0 is reserved
    /// for empty mappings of a bufferless slot.
    next_generation: u64,
    /// Count of completed writes, handed to readers via the rendezvous.
    sequence: u64,
}

/// One emulated capture device.
pub struct VideoSlot {
    minor: u32,
    frame_slots: u32,
    max_frame_bytes: usize,
    /// Reservation holder pid; 0 means unreserved. Written under the slot
    /// lock, read lock-free by the registry-wide reservation scan.
    owner: AtomicU32,
    state: Lock<SlotState>,
    completed: FrameSignal,
    reader_clock: Mutex<FramePacer>,
    writer_clock: Mutex<FramePacer>,
}

impl VideoSlot {
    pub(crate) fn new(
        minor: u32,
        defaults: &SlotDefaults,
        frame_slots: u32,
        max_frame_bytes: usize,
    ) -> Result<Self> {
        let slot = Self {
            minor,
            frame_slots,
            max_frame_bytes,
            owner: AtomicU32::new(0),
            state: Lock::new(SlotState {
                width: defaults.width,
                height: defaults.height,
                depth: defaults.depth,
                palette: defaults.palette,
                fps: defaults.fps,
                brightness: defaults.brightness,
                hue: defaults.hue,
                colour: defaults.colour,
                contrast: defaults.contrast,
                whiteness: defaults.whiteness,
                buffer: None,
                frame_size: 0,
                next_generation: 1,
                sequence: 0,
            }),
            completed: FrameSignal::new(),
            reader_clock: Mutex::new(FramePacer::new()),
            writer_clock: Mutex::new(FramePacer::new()),
        };
        {
            let cancel = CancelToken::new();
            let mut state = slot.state.lock(&cancel)?;
            slot.allocate_frame(&mut state, defaults.width, defaults.height, defaults.depth)?;
        }
        Ok(slot)
    }

    pub fn minor(&self) -> u32 {
        self.minor
    }

    /// Conventional device name, e.g. `vloop_device_0`.
    pub fn device_name(&self) -> String {
        format!("vloop_device_{}", self.minor)
    }

    /// Current reservation holder; 0 means unreserved. Lock-free read, so a
    /// concurrent reassignment may be observed late.
    pub(crate) fn holder(&self) -> u32 {
        self.owner.load(Ordering::SeqCst)
    }

    /// Replaces the slot's backing storage for the given geometry.
    ///
    /// The requested geometry is recorded and the old buffer dropped before
    /// the allocation is attempted, so a failure leaves the slot bufferless
    /// with `frame_size == 0` rather than pointing at stale storage.
    fn allocate_frame(
        &self,
        state: &mut SlotState,
        width: u32,
        height: u32,
        depth: u32,
    ) -> Result<()> {
        state.width = width;
        state.height = height;
        state.depth = depth;
        state.buffer = None;
        state.frame_size = 0;

        let padded = page_round_up(frame_bytes(width, height, depth)?)?;
        if padded > self.max_frame_bytes as u64 {
            return Err(DeviceError::AllocationFailed { bytes: padded });
        }
        let generation = state.next_generation;
        state.next_generation += 1;
        let buffer = FrameBuffer::allocate(generation, padded as usize)?;
        state.frame_size = padded;
        state.buffer = Some(buffer);
        tracing::info!(
            minor = self.minor,
            width,
            height,
            depth,
            size = state.frame_size,
            "allocated video frame"
        );
        Ok(())
    }

    /// Runs one decoded command against this slot.
    pub fn execute(&self, cancel: &CancelToken, command: Command) -> Result<Reply> {
        match command {
            Command::GetParams => self.params(cancel).map(Reply::Params),
            Command::SetParams(params) => self.set_params(cancel, &params).map(|()| Reply::Done),
            Command::GetReservation => self.reservation(cancel).map(Reply::Reservation),
            Command::SetReservation(pid) => {
                self.set_reservation(cancel, pid).map(|()| Reply::Done)
            }
            Command::GetCapability => self.capability(cancel).map(Reply::Capability),
            Command::GetChannel { channel } => self.channel(channel).map(Reply::Channel),
            Command::SetChannel { channel } => self.set_channel(channel).map(|()| Reply::Done),
            Command::GetPicture => self.picture(cancel).map(Reply::Picture),
            Command::SetPicture(picture) => {
                self.set_picture(cancel, &picture).map(|()| Reply::Done)
            }
            Command::GetWindow => self.window(cancel).map(Reply::Window),
            Command::SetWindow(window) => self.set_window(cancel, &window).map(|()| Reply::Done),
            Command::GetBufferLayout => self.buffer_layout(cancel).map(Reply::BufferLayout),
            Command::StartCapture => {
                self.start_capture();
                Ok(Reply::Done)
            }
            Command::Sync { frame } => self.sync(cancel, frame).map(|()| Reply::Done),
            Command::CaptureFrame(capture) => {
                self.capture_frame(cancel, &capture).map(|()| Reply::Done)
            }
            Command::SetFrameBuffer => {
                self.set_frame_buffer();
                Ok(Reply::Done)
            }
            Command::GetFrameBuffer => self.frame_buffer(cancel).map(Reply::FrameBuffer),
            Command::Other(code) => Err(self.unsupported(code)),
        }
    }

    pub(crate) fn params(&self, cancel: &CancelToken) -> Result<VideoParams> {
        let state = self.state.lock(cancel)?;
        tracing::debug!(minor = self.minor, "parameters read");
        Ok(VideoParams {
            width: state.width,
            height: state.height,
            depth: state.depth,
            palette: state.palette,
            fps: state.fps,
        })
    }

    pub(crate) fn set_params(&self, cancel: &CancelToken, params: &VideoParams) -> Result<()> {
        let mut state = self.state.lock(cancel)?;
        if (params.width, params.height, params.depth) != (state.width, state.height, state.depth)
        {
            if let Err(err) =
                self.allocate_frame(&mut state, params.width, params.height, params.depth)
            {
                tracing::warn!(minor = self.minor, "could not allocate video frame: {err}");
                return Err(err);
            }
        }
        state.palette = params.palette;
        state.fps = params.fps;
        tracing::debug!(
            minor = self.minor,
            palette = params.palette,
            fps = params.fps,
            "parameters applied"
        );
        Ok(())
    }

    pub(crate) fn reservation(&self, cancel: &CancelToken) -> Result<u32> {
        let _state = self.state.lock(cancel)?;
        tracing::debug!(minor = self.minor, "reservation read");
        Ok(self.owner.load(Ordering::SeqCst))
    }

    /// Unconditionally sets the reservation holder; 0 clears it. No check
    /// against other leases is made, this is an administrative override.
    pub(crate) fn set_reservation(&self, cancel: &CancelToken, pid: u32) -> Result<()> {
        let _state = self.state.lock(cancel)?;
        self.owner.store(pid, Ordering::SeqCst);
        tracing::debug!(minor = self.minor, pid, "reservation set");
        Ok(())
    }

    fn capability(&self, cancel: &CancelToken) -> Result<Capability> {
        let state = self.state.lock(cancel)?;
        tracing::debug!(minor = self.minor, "capability read");
        Ok(Capability {
            name: self.device_name(),
            kind: VID_TYPE_CAPTURE,
            channels: 1,
            audios: 0,
            max_width: state.width,
            max_height: state.height,
            min_width: state.width,
            min_height: state.height,
        })
    }

    fn channel(&self, channel: u32) -> Result<Channel> {
        if channel != 0 {
            return Err(DeviceError::InvalidChannel(channel));
        }
        tracing::debug!(minor = self.minor, "channel read");
        Ok(Channel {
            channel: 0,
            name: CAMERA_CHANNEL.to_string(),
            tuners: 0,
            flags: 0,
            kind: VIDEO_TYPE_CAMERA,
            norm: VIDEO_MODE_AUTO,
        })
    }

    fn set_channel(&self, channel: u32) -> Result<()> {
        if channel != 0 {
            return Err(DeviceError::InvalidChannel(channel));
        }
        tracing::debug!(minor = self.minor, "channel selected");
        Ok(())
    }

    fn picture(&self, cancel: &CancelToken) -> Result<Picture> {
        let state = self.state.lock(cancel)?;
        tracing::debug!(minor = self.minor, "picture read");
        Ok(Picture {
            brightness: state.brightness,
            hue: state.hue,
            colour: state.colour,
            contrast: state.contrast,
            whiteness: state.whiteness,
            depth: state.depth,
            palette: state.palette,
        })
    }

    /// Applies the five cosmetic levels. Depth may be requested lower than
    /// the negotiated value but is never stored; raising it is rejected, as
    /// is any palette change.
    fn set_picture(&self, cancel: &CancelToken, picture: &Picture) -> Result<()> {
        let mut state = self.state.lock(cancel)?;
        if state.depth < picture.depth {
            tracing::warn!(
                minor = self.minor,
                "rejected depth change from {} to {}",
                state.depth,
                picture.depth
            );
            return Err(DeviceError::DepthRaise {
                current: state.depth,
                requested: picture.depth,
            });
        }
        if state.palette != picture.palette {
            tracing::warn!(
                minor = self.minor,
                "rejected palette change from {}[{}] to {}[{}]",
                state.palette,
                palette_name(state.palette),
                picture.palette,
                palette_name(picture.palette)
            );
            return Err(DeviceError::PaletteChange {
                current: state.palette,
                requested: picture.palette,
            });
        }
        state.brightness = picture.brightness;
        state.hue = picture.hue;
        state.colour = picture.colour;
        state.contrast = picture.contrast;
        state.whiteness = picture.whiteness;
        tracing::debug!(minor = self.minor, "picture applied");
        Ok(())
    }

    fn window(&self, cancel: &CancelToken) -> Result<CaptureWindow> {
        let state = self.state.lock(cancel)?;
        tracing::debug!(minor = self.minor, "window read");
        Ok(CaptureWindow {
            x: 0,
            y: 0,
            width: state.width,
            height: state.height,
            chromakey: 0,
            flags: 0,
            clip_count: 0,
        })
    }

    /// The capture window cannot be moved or resized independently of the
    /// device geometry; only a no-op set matching the current state passes.
    fn set_window(&self, cancel: &CancelToken, window: &CaptureWindow) -> Result<()> {
        let state = self.state.lock(cancel)?;
        if window.flags != 0 {
            tracing::warn!(
                minor = self.minor,
                "rejected window flags {:#x}",
                window.flags
            );
            return Err(DeviceError::WindowFlags(window.flags));
        }
        if window.width != state.width || window.height != state.height {
            tracing::warn!(
                minor = self.minor,
                "rejected window geometry {}x{}",
                window.width,
                window.height
            );
            return Err(DeviceError::GeometryMismatch {
                requested_width: window.width,
                requested_height: window.height,
                width: state.width,
                height: state.height,
            });
        }
        tracing::debug!(minor = self.minor, "window applied");
        Ok(())
    }

    fn buffer_layout(&self, cancel: &CancelToken) -> Result<BufferLayout> {
        let state = self.state.lock(cancel)?;
        tracing::debug!(minor = self.minor, "buffer layout read");
        Ok(BufferLayout {
            size: state.frame_size as u32,
            frames: self.frame_slots,
            offsets: [0; VIDEO_MAX_FRAME],
        })
    }

    fn start_capture(&self) {
        tracing::debug!(minor = self.minor, "capture start requested");
    }

    /// Waits for the next completed frame, or one frame interval, whichever
    /// comes first. Succeeds either way; a zero rate skips the wait.
    fn sync(&self, cancel: &CancelToken, frame: u32) -> Result<()> {
        let fps = {
            let state = self.state.lock(cancel)?;
            state.fps
        };
        if fps > 0 {
            self.completed
                .wait_timeout(cancel, Duration::from_millis(u64::from(1000 / fps)))?;
        }
        tracing::debug!(minor = self.minor, frame, "sync complete");
        Ok(())
    }

    fn capture_frame(&self, cancel: &CancelToken, capture: &FrameCapture) -> Result<()> {
        let state = self.state.lock(cancel)?;
        if capture.width != state.width || capture.height != state.height {
            tracing::warn!(
                minor = self.minor,
                "capture size {}x{} incongruent with device geometry",
                capture.width,
                capture.height
            );
            return Err(DeviceError::GeometryMismatch {
                requested_width: capture.width,
                requested_height: capture.height,
                width: state.width,
                height: state.height,
            });
        }
        tracing::debug!(
            minor = self.minor,
            frame = capture.frame,
            format = capture.format,
            "frame capture requested"
        );
        Ok(())
    }

    fn set_frame_buffer(&self) {
        tracing::debug!(minor = self.minor, "frame buffer set");
    }

    fn frame_buffer(&self, cancel: &CancelToken) -> Result<FrameBufferInfo> {
        let state = self.state.lock(cancel)?;
        tracing::debug!(minor = self.minor, "frame buffer read");
        Ok(FrameBufferInfo {
            base: 0,
            height: state.height,
            width: state.width,
            depth: state.depth,
            bytes_per_line: state.width.saturating_mul(state.depth >> 3),
        })
    }

    fn unsupported(&self, code: u32) -> DeviceError {
        tracing::warn!(
            minor = self.minor,
            "command {code:#x} not implemented for this device"
        );
        DeviceError::UnsupportedCommand(code)
    }

    /// Copies the current frame into `out`, then blocks until the next
    /// completed write before returning `out.len()`.
    pub(crate) fn read(&self, cancel: &CancelToken, out: &mut [u8]) -> Result<usize> {
        let state = self.state.lock(cancel)?;
        if out.len() as u64 > state.frame_size {
            tracing::warn!(
                minor = self.minor,
                requested = out.len(),
                capacity = state.frame_size,
                "buffer overrun on read"
            );
            return Err(DeviceError::FrameOverrun {
                requested: out.len(),
                capacity: state.frame_size as usize,
            });
        }
        if let Some(buffer) = &state.buffer {
            buffer.read_prefix(out);
        }
        drop(state);

        self.completed.wait(cancel)?;
        self.reader_clock.lock().unwrap().mark();
        Ok(out.len())
    }

    /// Copies `data` into the frame buffer, releases one pending reader, and
    /// paces the caller to the configured frame rate.
    pub(crate) fn write(&self, cancel: &CancelToken, data: &[u8]) -> Result<usize> {
        let mut state = self.state.lock(cancel)?;
        if data.len() as u64 > state.frame_size {
            tracing::warn!(
                minor = self.minor,
                requested = data.len(),
                capacity = state.frame_size,
                "buffer overrun on write"
            );
            return Err(DeviceError::FrameOverrun {
                requested: data.len(),
                capacity: state.frame_size as usize,
            });
        }
        if let Some(buffer) = &state.buffer {
            buffer.write_prefix(data);
        }
        state.sequence += 1;
        let sequence = state.sequence;
        let fps = state.fps;
        drop(state);

        self.completed.publish(sequence);

        // The frame is already delivered; an interrupted pacing delay cuts
        // the sleep short but does not fail the write.
        let mut clock = self.writer_clock.lock().unwrap();
        if clock.pace(fps, cancel).is_err() {
            tracing::debug!(minor = self.minor, "write pacing interrupted");
        }
        Ok(data.len())
    }

    /// Maps `length` bytes of the current frame buffer for shared access.
    ///
    /// The mapping pins its generation of storage: a later geometry change
    /// swaps the slot to a fresh buffer while the mapping keeps addressing
    /// the old bytes, detectable via [`FrameMapping::generation`].
    pub(crate) fn mmap(&self, cancel: &CancelToken, length: usize) -> Result<FrameMapping> {
        let state = self.state.lock(cancel)?;
        if length as u64 > state.frame_size {
            tracing::warn!(
                minor = self.minor,
                requested = length,
                capacity = state.frame_size,
                "mmap length exceeds the frame size"
            );
            return Err(DeviceError::FrameOverrun {
                requested: length,
                capacity: state.frame_size as usize,
            });
        }
        let mapping = match &state.buffer {
            Some(buffer) => FrameMapping::new(Arc::clone(buffer), length),
            None => FrameMapping::new(FrameBuffer::allocate(0, 0)?, 0),
        };
        tracing::debug!(
            minor = self.minor,
            generation = mapping.generation(),
            length,
            "frame buffer mapped"
        );
        Ok(mapping)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    const FRAME: usize = 320 * 240 * 4;

    fn slot() -> VideoSlot {
        VideoSlot::new(0, &SlotDefaults::default(), 1, 256 * 1024 * 1024).unwrap()
    }

    fn cancel() -> CancelToken {
        CancelToken::new()
    }

    #[test]
    fn reports_default_parameters() {
        let slot = slot();
        let params = slot.params(&cancel()).unwrap();
        assert_eq!(
            params,
            VideoParams {
                width: 320,
                height: 240,
                depth: 32,
                palette: 15,
                fps: 25,
            }
        );
    }

    #[test]
    fn geometry_change_reallocates_page_rounded() {
        let slot = slot();
        let token = cancel();
        slot.set_params(
            &token,
            &VideoParams {
                width: 100,
                height: 100,
                depth: 24,
                palette: 4,
                fps: 30,
            },
        )
        .unwrap();

        // 100 * 100 * 3 = 30000 bytes, rounded to eight pages.
        let layout = slot.buffer_layout(&token).unwrap();
        assert_eq!(layout.size, 32768);
        assert_eq!(layout.frames, 1);

        let params = slot.params(&token).unwrap();
        assert_eq!((params.width, params.height, params.depth), (100, 100, 24));
        assert_eq!((params.palette, params.fps), (4, 30));
    }

    #[test]
    fn unchanged_geometry_keeps_the_buffer() {
        let slot = slot();
        let token = cancel();
        let before = slot.mmap(&token, FRAME).unwrap();
        slot.set_params(
            &token,
            &VideoParams {
                width: 320,
                height: 240,
                depth: 32,
                palette: 8,
                fps: 50,
            },
        )
        .unwrap();
        let after = slot.mmap(&token, FRAME).unwrap();
        assert_eq!(before.generation(), after.generation());

        let params = slot.params(&token).unwrap();
        assert_eq!((params.palette, params.fps), (8, 50));
    }

    #[test]
    fn failed_allocation_leaves_no_buffer() {
        let slot = VideoSlot::new(0, &SlotDefaults::default(), 1, 1024 * 1024).unwrap();
        let token = cancel();
        let err = slot
            .set_params(
                &token,
                &VideoParams {
                    width: 4096,
                    height: 4096,
                    depth: 32,
                    palette: 4,
                    fps: 30,
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Resource);

        // The requested geometry is recorded but there is no buffer, and
        // palette/fps keep their previous values.
        let params = slot.params(&token).unwrap();
        assert_eq!(
            (params.width, params.height, params.depth),
            (4096, 4096, 32)
        );
        assert_eq!((params.palette, params.fps), (15, 25));
        assert_eq!(slot.buffer_layout(&token).unwrap().size, 0);

        let mut byte = [0u8; 1];
        assert!(matches!(
            slot.read(&token, &mut byte).unwrap_err(),
            DeviceError::FrameOverrun { .. }
        ));
    }

    #[test]
    fn depth_raise_is_rejected() {
        let slot = slot();
        let token = cancel();
        let err = slot
            .set_picture(
                &token,
                &Picture {
                    depth: 40,
                    palette: 15,
                    brightness: 1,
                    ..Picture::default()
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            DeviceError::DepthRaise {
                current: 32,
                requested: 40
            }
        ));
        assert_eq!(slot.picture(&token).unwrap().brightness, 32768);
    }

    #[test]
    fn palette_change_is_rejected() {
        let slot = slot();
        let token = cancel();
        let err = slot
            .set_picture(
                &token,
                &Picture {
                    depth: 32,
                    palette: 4,
                    contrast: 1,
                    ..Picture::default()
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            DeviceError::PaletteChange {
                current: 15,
                requested: 4
            }
        ));
        assert_eq!(slot.picture(&token).unwrap().contrast, 32768);
    }

    #[test]
    fn picture_update_keeps_negotiated_depth() {
        let slot = slot();
        let token = cancel();
        slot.set_picture(
            &token,
            &Picture {
                brightness: 1000,
                hue: 2000,
                colour: 3000,
                contrast: 4000,
                whiteness: 5000,
                depth: 24,
                palette: 15,
            },
        )
        .unwrap();

        let picture = slot.picture(&token).unwrap();
        assert_eq!(picture.brightness, 1000);
        assert_eq!(picture.whiteness, 5000);
        // A lower requested depth passes validation but is never stored.
        assert_eq!(picture.depth, 32);
    }

    #[test]
    fn window_tracks_geometry_and_rejects_changes() {
        let slot = slot();
        let token = cancel();
        let window = slot.window(&token).unwrap();
        assert_eq!((window.x, window.y), (0, 0));
        assert_eq!((window.width, window.height), (320, 240));

        assert!(matches!(
            slot.set_window(
                &token,
                &CaptureWindow {
                    width: 320,
                    height: 240,
                    flags: 1,
                    ..CaptureWindow::default()
                }
            )
            .unwrap_err(),
            DeviceError::WindowFlags(1)
        ));
        assert!(matches!(
            slot.set_window(
                &token,
                &CaptureWindow {
                    width: 640,
                    height: 480,
                    ..CaptureWindow::default()
                }
            )
            .unwrap_err(),
            DeviceError::GeometryMismatch { .. }
        ));
        slot.set_window(&token, &window).unwrap();
    }

    #[test]
    fn channel_zero_is_the_only_channel() {
        let slot = slot();
        let channel = slot.channel(0).unwrap();
        assert_eq!(channel.name, CAMERA_CHANNEL);
        assert_eq!(channel.kind, VIDEO_TYPE_CAMERA);
        assert_eq!(channel.norm, VIDEO_MODE_AUTO);
        assert_eq!(channel.tuners, 0);

        assert!(matches!(
            slot.channel(1).unwrap_err(),
            DeviceError::InvalidChannel(1)
        ));
        slot.set_channel(0).unwrap();
        assert!(slot.set_channel(3).is_err());
    }

    #[test]
    fn capability_tracks_current_geometry() {
        let slot = slot();
        let token = cancel();
        let cap = slot.capability(&token).unwrap();
        assert_eq!(cap.name, "vloop_device_0");
        assert_eq!(cap.kind, VID_TYPE_CAPTURE);
        assert_eq!((cap.channels, cap.audios), (1, 0));
        assert_eq!((cap.min_width, cap.max_width), (320, 320));

        slot.set_params(
            &token,
            &VideoParams {
                width: 640,
                height: 480,
                depth: 32,
                palette: 15,
                fps: 25,
            },
        )
        .unwrap();
        let cap = slot.capability(&token).unwrap();
        assert_eq!((cap.max_width, cap.max_height), (640, 480));
    }

    #[test]
    fn buffer_layout_advertises_overlapping_frames() {
        let slot = VideoSlot::new(0, &SlotDefaults::default(), 4, 256 * 1024 * 1024).unwrap();
        let layout = slot.buffer_layout(&cancel()).unwrap();
        assert_eq!(layout.frames, 4);
        assert_eq!(layout.size as usize, FRAME);
        assert!(layout.offsets.iter().all(|&off| off == 0));
    }

    #[test]
    fn unknown_command_reports_unsupported() {
        let slot = slot();
        let err = slot.execute(&cancel(), Command::Other(0xc0de)).unwrap_err();
        assert!(matches!(err, DeviceError::UnsupportedCommand(0xc0de)));
        assert_eq!(err.kind(), crate::ErrorKind::Unsupported);
    }

    #[test]
    fn capture_commands_validate_geometry_only() {
        let slot = slot();
        let token = cancel();
        assert_eq!(
            slot.execute(&token, Command::StartCapture).unwrap(),
            Reply::Done
        );
        assert_eq!(
            slot.execute(
                &token,
                Command::CaptureFrame(FrameCapture {
                    frame: 0,
                    height: 240,
                    width: 320,
                    format: 15,
                })
            )
            .unwrap(),
            Reply::Done
        );
        assert!(matches!(
            slot.execute(
                &token,
                Command::CaptureFrame(FrameCapture {
                    frame: 0,
                    height: 200,
                    width: 300,
                    format: 15,
                })
            )
            .unwrap_err(),
            DeviceError::GeometryMismatch { .. }
        ));

        assert_eq!(
            slot.execute(&token, Command::SetFrameBuffer).unwrap(),
            Reply::Done
        );
        match slot.execute(&token, Command::GetFrameBuffer).unwrap() {
            Reply::FrameBuffer(info) => {
                assert_eq!(info.base, 0);
                assert_eq!(info.bytes_per_line, 320 * 4);
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn write_fills_buffer_and_mapping_observes_it() {
        let slot = slot();
        let token = cancel();
        slot.set_params(
            &token,
            &VideoParams {
                width: 320,
                height: 240,
                depth: 32,
                palette: 15,
                fps: 0,
            },
        )
        .unwrap();

        let frame = vec![0xab; FRAME];
        assert_eq!(slot.write(&token, &frame).unwrap(), FRAME);

        let mapping = slot.mmap(&token, FRAME).unwrap();
        assert_eq!(mapping.generation(), 1);
        let mut tail = [0u8; 4];
        mapping.read_at(FRAME - 4, &mut tail).unwrap();
        assert_eq!(tail, [0xab; 4]);
    }

    #[test]
    fn oversized_io_is_an_overrun() {
        let slot = slot();
        let token = cancel();
        let mut big = vec![0u8; FRAME + 1];
        assert!(matches!(
            slot.read(&token, &mut big).unwrap_err(),
            DeviceError::FrameOverrun {
                requested,
                capacity,
            } if requested == FRAME + 1 && capacity == FRAME
        ));
        assert!(matches!(
            slot.write(&token, &big).unwrap_err(),
            DeviceError::FrameOverrun { .. }
        ));
        assert!(slot.mmap(&token, FRAME + 1).is_err());
    }

    #[test]
    fn read_returns_the_frame_before_the_awaited_write() {
        let slot = Arc::new(slot());
        let token = cancel();
        slot.set_params(
            &token,
            &VideoParams {
                width: 320,
                height: 240,
                depth: 32,
                palette: 15,
                fps: 0,
            },
        )
        .unwrap();

        let reader = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || {
                let token = CancelToken::new();
                let mut head = [0xffu8; 16];
                let n = slot.read(&token, &mut head).unwrap();
                (n, head)
            })
        };

        thread::sleep(Duration::from_millis(50));
        let frame = vec![0x11; FRAME];
        slot.write(&token, &frame).unwrap();

        let (n, head) = reader.join().unwrap();
        assert_eq!(n, 16);
        // The reader snapshots the frame as it was when the read started,
        // then waits for the next write.
        assert_eq!(head, [0u8; 16]);
    }

    #[test]
    fn interrupted_pacing_still_completes_the_write() {
        let slot = slot();
        let token = cancel();
        slot.set_params(
            &token,
            &VideoParams {
                width: 320,
                height: 240,
                depth: 32,
                palette: 15,
                fps: 1,
            },
        )
        .unwrap();

        token.cancel();
        let start = Instant::now();
        assert_eq!(slot.write(&token, &[0u8; 16]).unwrap(), 16);
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn sync_succeeds_with_and_without_frames() {
        let slot = slot();
        let token = cancel();
        // Default rate: the wait gives up after 1000/25 ms with no writer.
        assert_eq!(
            slot.execute(&token, Command::Sync { frame: 0 }).unwrap(),
            Reply::Done
        );

        slot.set_params(
            &token,
            &VideoParams {
                width: 320,
                height: 240,
                depth: 32,
                palette: 15,
                fps: 0,
            },
        )
        .unwrap();
        let start = Instant::now();
        assert_eq!(
            slot.execute(&token, Command::Sync { frame: 1 }).unwrap(),
            Reply::Done
        );
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn cancelled_sync_reports_interruption() {
        let slot = slot();
        let token = cancel();
        token.cancel();
        let err = slot.execute(&token, Command::Sync { frame: 0 }).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Interrupted);
    }
}
