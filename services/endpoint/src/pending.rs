//! Priority probe queue.
//!
//! FIFO of devices awaiting an on-demand probe, with a companion membership
//! set so a device is never queued twice. Written by the dispatcher, drained
//! by the scheduler, which removes an entry only once its result is sent.
//! Every operation takes the lock for one short,
//! non-blocking step and never across an `.await`.

use crate::net::MacAddr;
use crate::registry::Device;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Inner {
    queue: VecDeque<Arc<Device>>,
    members: HashSet<MacAddr>,
}

#[derive(Debug, Default)]
pub struct PendingProbeSet {
    inner: Mutex<Inner>,
}

impl PendingProbeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `device` unless it is already queued. Returns `true` if it was
    /// added.
    pub fn insert(&self, device: Arc<Device>) -> bool {
        let mut inner = self.lock();
        if !inner.members.insert(*device.mac()) {
            return false;
        }
        inner.queue.push_back(device);
        true
    }

    /// The oldest queued device, left in place.
    ///
    /// A device stays queued (and deduplicated) until [`remove`](Self::remove)
    /// is called, so a request survives a probe that is cancelled or whose
    /// result could not be sent.
    pub fn front(&self) -> Option<Arc<Device>> {
        self.lock().queue.front().cloned()
    }

    /// Drop `device` from the queue. Returns `false` if it was not queued.
    pub fn remove(&self, device: &Device) -> bool {
        let mut inner = self.lock();
        if !inner.members.remove(device.mac()) {
            return false;
        }
        inner.queue.retain(|d| d.mac() != device.mac());
        true
    }

    pub fn contains(&self, device: &Device) -> bool {
        self.lock().members.contains(device.mac())
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Queue and set are updated with nothing in between that can panic.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
