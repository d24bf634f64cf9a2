//! Device-state engine of the vloop virtual capture device.
//!
//! vloop emulates a V4L1-era capture card entirely in software: a
//! [`Registry`] of device slots, each with negotiated geometry, picture
//! levels, a page-granular frame buffer, and a producer/consumer rendezvous
//! between whoever writes frames in and whoever reads them out.
//!
//! A transport shim opens a slot through [`Registry::open`] and drives it
//! with the command vocabulary from [`vloop_protocol`] plus byte-stream
//! `read`/`write` and buffer mapping on the returned [`DeviceHandle`].
//! Access control is the deliberately leaky reservation policy: a process
//! holding a reservation may only open the slot it reserved, reservations
//! are never released implicitly, and they keep nobody else out.
//!
//! Blocking calls (lock acquisition, frame waits, pacing sleeps) observe the
//! handle's [`CancelToken`] and abort with a retryable
//! [`DeviceError::Interrupted`] when it fires.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod frame;
pub mod registry;
pub mod slot;
pub mod sync;

#[cfg(test)]
mod proptests;

pub use config::{RegistryConfig, SlotDefaults, MAX_DEVICES};
pub use error::{DeviceError, ErrorKind, Result};
pub use frame::{FrameMapping, PAGE_SIZE};
pub use registry::{DeviceHandle, Pid, Registry};
pub use slot::VideoSlot;
pub use sync::{CancelToken, Cancelled};
