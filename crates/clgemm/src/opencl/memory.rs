//! Per-call device resources.
//!
//! Both guards release their handle on drop, so every exit path out of a
//! dispatch call (success or `?`) returns buffers and events to the runtime.

use std::mem::ManuallyDrop;

use super::driver::{ClDriver, MemAccess};
use crate::error::ClResult;

/// A device-resident copy of a host matrix, freed via `clReleaseMemObject` on drop.
pub struct DeviceBuffer<'d, D: ClDriver> {
    driver: &'d D,
    mem: ManuallyDrop<D::Mem>,
    len: usize,
}

impl<'d, D: ClDriver> DeviceBuffer<'d, D> {
    /// Allocate a buffer in `context` initialised from `host` (H2D copy at creation).
    pub fn from_host(driver: &'d D, context: &D::Context, access: MemAccess, host: &[f32]) -> ClResult<Self> {
        let mem = driver.create_buffer(context, access, host)?;
        Ok(Self { driver, mem: ManuallyDrop::new(mem), len: host.len() })
    }

    /// Number of f32 elements.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Raw handle for argument binding and transfers.
    pub fn mem(&self) -> &D::Mem {
        &self.mem
    }
}

impl<D: ClDriver> Drop for DeviceBuffer<'_, D> {
    fn drop(&mut self) {
        // Safety: `mem` is taken exactly once, here, and never touched again.
        let mem = unsafe { ManuallyDrop::take(&mut self.mem) };
        if let Err(status) = self.driver.release_mem(mem) {
            tracing::warn!("clReleaseMemObject failed: {}", status);
        }
    }
}

/// Completion handle of an enqueued device command, released on drop.
pub struct CompletionEvent<'d, D: ClDriver> {
    driver: &'d D,
    event: ManuallyDrop<D::Event>,
}

impl<'d, D: ClDriver> CompletionEvent<'d, D> {
    /// Take ownership of an event returned by an enqueue call.
    pub fn new(driver: &'d D, event: D::Event) -> Self {
        Self { driver, event: ManuallyDrop::new(event) }
    }

    pub fn raw(&self) -> &D::Event {
        &self.event
    }

    /// Block the calling thread until the command has completed.
    pub fn wait(&self) -> ClResult<()> {
        self.driver.wait_for_events(&[self.raw()])
    }
}

impl<D: ClDriver> Drop for CompletionEvent<'_, D> {
    fn drop(&mut self) {
        // Safety: `event` is taken exactly once, here, and never touched again.
        let event = unsafe { ManuallyDrop::take(&mut self.event) };
        if let Err(status) = self.driver.release_event(event) {
            tracing::warn!("clReleaseEvent failed: {}", status);
        }
    }
}
