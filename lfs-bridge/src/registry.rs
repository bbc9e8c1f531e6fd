//! Context carriers.
//!
//! The engine hands every callback the configuration record it was mounted
//! with, and the record's `context` slot is the only place a callback can
//! learn which device to talk to. Instead of smuggling a raw pointer through
//! that slot, the slot holds a [`ContextHandle`]: an index into a fixed arena
//! of device slots plus the generation the slot had when it was claimed.
//! Releasing a slot invalidates every handle to it, so a callback arriving
//! after unmount is detected rather than dereferencing freed memory.

use std::os::raw::c_void;
use std::sync::{Mutex, MutexGuard, TryLockError};

use log::{debug, warn};

use crate::device::BlockDevice;
use crate::error::{BridgeError, ResolveError};

/// Number of devices that can be registered with the process-wide registry.
pub const MAX_CONTEXTS: usize = 64;

const INDEX_BITS: u32 = 8;
const INDEX_MASK: usize = (1 << INDEX_BITS) - 1;

/// Largest generation that still fits in a pointer next to the index.
const MAX_GENERATION: u64 = (usize::MAX >> INDEX_BITS) as u64;

pub type SharedDevice = Box<dyn BlockDevice + Send>;

static GLOBAL: Registry<MAX_CONTEXTS> = Registry::new();

/// The registry the callback trampolines resolve against.
pub fn global() -> &'static Registry<MAX_CONTEXTS> {
    &GLOBAL
}

/// Identifies one registered device. Generation zero never names a live slot,
/// so a zeroed context decodes to a handle that always fails to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextHandle {
    index: usize,
    generation: u32,
}

impl ContextHandle {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Packs the handle into the pointer-sized context slot. The result is
    /// never dereferenced.
    pub fn to_context(self) -> *mut c_void {
        ((self.generation as usize) << INDEX_BITS | self.index) as *mut c_void
    }

    pub fn from_context(context: *const c_void) -> Result<Self, ResolveError> {
        let raw = context as usize;
        if raw == 0 {
            return Err(ResolveError::Unbound);
        }
        Ok(ContextHandle {
            index: raw & INDEX_MASK,
            generation: (raw >> INDEX_BITS) as u32,
        })
    }
}

struct SlotState {
    generation: u32,
    device: Option<SharedDevice>,
}

struct Slot {
    state: Mutex<SlotState>,
}

#[allow(clippy::declare_interior_mutable_const)]
const EMPTY_SLOT: Slot = Slot {
    state: Mutex::new(SlotState {
        generation: 0,
        device: None,
    }),
};

fn next_generation(generation: u32) -> u32 {
    let limit = MAX_GENERATION.min(u64::from(u32::MAX)) as u32;
    if generation >= limit {
        1
    } else {
        generation + 1
    }
}

/// Fixed arena of device slots. Each slot has its own lock, so devices
/// registered for independent mounts never contend with one another.
pub struct Registry<const N: usize> {
    slots: [Slot; N],
}

impl<const N: usize> Registry<N> {
    pub const fn new() -> Self {
        // Handles only carry INDEX_BITS of index.
        assert!(N <= INDEX_MASK + 1);
        Registry {
            slots: [EMPTY_SLOT; N],
        }
    }

    pub fn capacity(&self) -> usize {
        N
    }

    /// Takes ownership of `device` and returns the handle that resolves to it.
    pub fn claim(&self, device: SharedDevice) -> Result<ContextHandle, BridgeError> {
        for (index, slot) in self.slots.iter().enumerate() {
            // Waits out callbacks, lookups and releases on other threads.
            let mut state = lock_recovering(&slot.state);
            if state.device.is_some() {
                continue;
            }
            state.generation = next_generation(state.generation);
            state.device = Some(device);
            debug!("claimed context slot {} generation {}", index, state.generation);
            return Ok(ContextHandle {
                index,
                generation: state.generation,
            });
        }
        Err(BridgeError::RegistryFull { capacity: N })
    }

    /// Runs `f` against the device behind `handle`. Never blocks and never
    /// allocates: a slot that is already locked yields `Busy`.
    pub fn with_device<R, F>(&self, handle: ContextHandle, f: F) -> Result<R, ResolveError>
    where
        F: FnOnce(&mut SharedDevice) -> R,
    {
        let slot = self.slot(handle)?;
        let mut state = match slot.state.try_lock() {
            Ok(state) => state,
            Err(TryLockError::Poisoned(poisoned)) => {
                warn!(
                    "context slot {} was poisoned by an earlier panic, continuing",
                    handle.index
                );
                poisoned.into_inner()
            }
            Err(TryLockError::WouldBlock) => {
                return Err(ResolveError::Busy {
                    index: handle.index,
                })
            }
        };
        let device = live_device(&mut state, handle)?;
        Ok(f(device))
    }

    /// Removes the device behind `handle` and hands it back. Every copy of
    /// the handle is stale afterwards.
    pub fn release(&self, handle: ContextHandle) -> Result<SharedDevice, ResolveError> {
        let slot = self.slot(handle)?;
        let mut state = lock_recovering(&slot.state);
        live_device(&mut state, handle)?;
        debug!(
            "released context slot {} generation {}",
            handle.index, handle.generation
        );
        state.device.take().ok_or(ResolveError::Stale {
            index: handle.index,
            generation: handle.generation,
        })
    }

    /// Whether `handle` currently resolves to a device.
    pub fn is_live(&self, handle: ContextHandle) -> bool {
        match self.slot(handle) {
            Ok(slot) => {
                let mut state = lock_recovering(&slot.state);
                let live = live_device(&mut state, handle).is_ok();
                live
            }
            Err(_) => false,
        }
    }

    fn slot(&self, handle: ContextHandle) -> Result<&Slot, ResolveError> {
        self.slots.get(handle.index).ok_or(ResolveError::OutOfRange {
            index: handle.index,
        })
    }
}

impl<const N: usize> Default for Registry<N> {
    fn default() -> Self {
        Registry::new()
    }
}

fn lock_recovering(state: &Mutex<SlotState>) -> MutexGuard<'_, SlotState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn live_device<'a>(
    state: &'a mut SlotState,
    handle: ContextHandle,
) -> Result<&'a mut SharedDevice, ResolveError> {
    let stale = ResolveError::Stale {
        index: handle.index,
        generation: handle.generation,
    };
    if state.generation != handle.generation {
        return Err(stale);
    }
    state.device.as_mut().ok_or(stale)
}
