//! Device registry, the reservation policy, and per-open handles.

use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;

use vloop_protocol::{Command, Reply, VideoParams, VIDEO_MAX_FRAME};

use crate::config::{RegistryConfig, MAX_DEVICES};
use crate::frame::FrameMapping;
use crate::slot::VideoSlot;
use crate::sync::CancelToken;
use crate::{DeviceError, Result};

/// Identity of a process interacting with the registry.
///
/// Zero is the "unreserved" sentinel in a slot's holder field, so a real
/// process identity is always nonzero.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Pid(NonZeroU32);

impl Pid {
    pub fn new(pid: u32) -> Option<Self> {
        NonZeroU32::new(pid).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The set of emulated capture devices, addressed by minor index.
///
/// Construction allocates every slot's initial frame buffer; a single
/// failure fails the whole load, mirroring a driver that refuses to come up
/// half-populated.
pub struct Registry {
    slots: Vec<Arc<VideoSlot>>,
}

impl Registry {
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        let devices = config.devices.min(MAX_DEVICES);
        let frame_slots = config.frame_slots.min(VIDEO_MAX_FRAME as u32);
        let slots = (0..devices)
            .map(|minor| {
                let slot = VideoSlot::new(
                    minor,
                    &config.defaults,
                    frame_slots,
                    config.max_frame_bytes,
                )?;
                tracing::info!("'{}' registered", slot.device_name());
                Ok(Arc::new(slot))
            })
            .collect::<Result<Vec<_>>>()?;
        tracing::info!(devices = slots.len(), "video devices created");
        Ok(Self { slots })
    }

    pub fn device_count(&self) -> usize {
        self.slots.len()
    }

    /// Opens a device under the leaky reservation policy.
    ///
    /// A process holding a reservation may open only the slot it reserved;
    /// every other process may open any slot. Holding a reservation never
    /// keeps *other* processes out.
    pub fn open(&self, minor: u32, pid: Pid) -> Result<DeviceHandle> {
        let slot = self.slot(minor)?;
        if let Some(reserved) = self.reservation_of(pid) {
            tracing::debug!(pid = pid.get(), "pid has a reservation");
            if slot.holder() != pid.get() {
                tracing::debug!(
                    pid = pid.get(),
                    reserved,
                    "pid has reserved another device"
                );
                return Err(DeviceError::Busy {
                    pid: pid.get(),
                    reserved,
                });
            }
        }
        tracing::debug!(minor, pid = pid.get(), "device opened");
        Ok(DeviceHandle {
            slot: Arc::clone(slot),
            pid,
            cancel: CancelToken::new(),
        })
    }

    /// First minor whose holder is `pid`, if any. The scan reads each slot's
    /// holder lock-free, so a concurrent reassignment may be missed; it is
    /// not transactional across slots.
    pub fn reservation_of(&self, pid: Pid) -> Option<u32> {
        self.slots
            .iter()
            .position(|slot| slot.holder() == pid.get())
            .map(|minor| minor as u32)
    }

    /// Administrative reservation read, independent of any open handle.
    pub fn reservation(&self, minor: u32) -> Result<u32> {
        self.slot(minor)?.reservation(&CancelToken::new())
    }

    /// Administrative reservation write; `pid` 0 clears the holder. No check
    /// against existing leases is made.
    pub fn reserve(&self, minor: u32, pid: u32) -> Result<()> {
        self.slot(minor)?.set_reservation(&CancelToken::new(), pid)
    }

    fn slot(&self, minor: u32) -> Result<&Arc<VideoSlot>> {
        self.slots
            .get(minor as usize)
            .ok_or(DeviceError::NoSuchDevice(minor))
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        tracing::info!(devices = self.slots.len(), "device registry unloaded");
    }
}

/// One open of one device by one process.
///
/// The handle carries the cancellation token its blocking calls observe;
/// [`cancel_token`](Self::cancel_token) hands a clone to whatever thread
/// delivers the interruption. Dropping the handle releases nothing: the
/// reservation deliberately outlives every open.
pub struct DeviceHandle {
    slot: Arc<VideoSlot>,
    pid: Pid,
    cancel: CancelToken,
}

impl std::fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("minor", &self.slot.minor())
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

impl DeviceHandle {
    pub fn minor(&self) -> u32 {
        self.slot.minor()
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Token observed by this handle's blocking operations.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Runs one decoded command against the device.
    pub fn execute(&self, command: Command) -> Result<Reply> {
        self.slot.execute(&self.cancel, command)
    }

    pub fn params(&self) -> Result<VideoParams> {
        self.slot.params(&self.cancel)
    }

    pub fn set_params(&self, params: &VideoParams) -> Result<()> {
        self.slot.set_params(&self.cancel, params)
    }

    pub fn reservation(&self) -> Result<u32> {
        self.slot.reservation(&self.cancel)
    }

    pub fn set_reservation(&self, pid: u32) -> Result<()> {
        self.slot.set_reservation(&self.cancel, pid)
    }

    /// Claims the device for this handle's own process identity, the way a
    /// launcher reserves a device before handing it to a capture program.
    pub fn reserve_self(&self) -> Result<()> {
        self.slot.set_reservation(&self.cancel, self.pid.get())
    }

    /// Reads one frame snapshot, then blocks until the next completed write.
    pub fn read(&self, out: &mut [u8]) -> Result<usize> {
        self.slot.read(&self.cancel, out)
    }

    /// Writes one frame, releasing a pending reader and pacing to the
    /// configured rate.
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        self.slot.write(&self.cancel, data)
    }

    /// Maps `length` bytes of the device's frame buffer for shared access.
    pub fn mmap(&self, length: usize) -> Result<FrameMapping> {
        self.slot.mmap(&self.cancel, length)
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        tracing::debug!(
            minor = self.slot.minor(),
            pid = self.pid.get(),
            "device released"
        );
    }
}
