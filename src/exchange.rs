// exchange.rs — the one contact point between the control and render contexts
//
// The control side publishes a complete FrameRequest; the render side takes
// the latest one. Requests published between two takes collapse into the
// newest. The only thing flowing back is the device texture limit.

use crate::renderer::RendererKind;
use crate::snapshot::RenderSnapshot;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Which renderer variant to run and what it should show.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRequest {
    pub kind: RendererKind,
    pub snapshot: RenderSnapshot,
}

#[derive(Default)]
struct Slot {
    pending: Mutex<Option<FrameRequest>>,
    ready: Condvar,
}

/// Coalescing single-slot mailbox, cloneable across threads.
#[derive(Clone, Default)]
pub struct FrameExchange {
    slot: Arc<Slot>,
    limits: DeviceLimits,
}

impl FrameExchange {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<FrameRequest>> {
        self.slot
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` when an unconsumed request was replaced.
    pub fn publish(&self, request: FrameRequest) -> bool {
        let replaced = self.lock().replace(request).is_some();
        self.slot.ready.notify_one();
        if replaced {
            log::trace!("frame request coalesced");
        }
        replaced
    }

    pub fn take(&self) -> Option<FrameRequest> {
        self.lock().take()
    }

    /// Blocks until a request is available or `timeout` elapses.
    pub fn wait(&self, timeout: Duration) -> Option<FrameRequest> {
        let guard = self.lock();
        let (mut guard, _) = self
            .slot
            .ready
            .wait_timeout_while(guard, timeout, |pending| pending.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        guard.take()
    }

    pub fn limits(&self) -> &DeviceLimits {
        &self.limits
    }
}

/// Device capabilities discovered by the render context. Zero means not yet
/// known.
#[derive(Debug, Clone, Default)]
pub struct DeviceLimits {
    max_texture_size: Arc<AtomicU32>,
}

impl DeviceLimits {
    pub fn max_texture_size(&self) -> Option<u32> {
        match self.max_texture_size.load(Ordering::Acquire) {
            0 => None,
            n => Some(n),
        }
    }

    pub fn set_max_texture_size(&self, size: u32) {
        self.max_texture_size.store(size, Ordering::Release);
    }
}
