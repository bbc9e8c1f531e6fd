use log::{debug, error};

use crate::config::{ConfigRecord, Geometry};
use crate::device::BlockDevice;
use crate::error::{BridgeError, ResolveError};
use crate::registry::{self, ContextHandle, SharedDevice};

/// One configuration record bound to one registered device.
///
/// Creating a bridge allocates the record, installs the callbacks, registers
/// the device and stores its handle in the record's context slot. Dropping it
/// unregisters the device, after which any callback still arriving through
/// the record is treated as a use-after-unmount.
pub struct Bridge {
    record: ConfigRecord,
    handle: ContextHandle,
    released: bool,
}

impl Bridge {
    pub fn new<D>(geometry: Geometry, device: D) -> Result<Self, BridgeError>
    where
        D: BlockDevice + Send + 'static,
    {
        Bridge::from_boxed(geometry, Box::new(device))
    }

    pub fn from_boxed(geometry: Geometry, device: SharedDevice) -> Result<Self, BridgeError> {
        let handle = registry::global().claim(device)?;
        let mut record = ConfigRecord::allocate()
            .with_geometry(&geometry)
            .bind_callbacks();
        record.set_context(handle);
        debug!("bridge {:?} ready at {:p}", handle, record.as_ptr());
        Ok(Bridge {
            record,
            handle,
            released: false,
        })
    }

    /// The record to hand to the engine. It stays at the same address for
    /// the whole life of the bridge.
    pub fn config(&self) -> &ConfigRecord {
        &self.record
    }

    pub fn handle(&self) -> ContextHandle {
        self.handle
    }

    pub fn geometry(&self) -> Geometry {
        self.record.geometry()
    }

    /// Unregisters the device and returns it. The record stays allocated, but
    /// every later callback through it is fatal.
    pub fn take_device(&mut self) -> Result<SharedDevice, BridgeError> {
        if self.released {
            return Err(BridgeError::Resolve(ResolveError::Stale {
                index: self.handle.index(),
                generation: self.handle.generation(),
            }));
        }
        let device = registry::global().release(self.handle)?;
        self.released = true;
        Ok(device)
    }

    /// Runs `f` against the registered device outside of any engine call.
    pub fn with_device<R, F>(&self, f: F) -> Result<R, BridgeError>
    where
        F: FnOnce(&mut SharedDevice) -> R,
    {
        Ok(registry::global().with_device(self.handle, f)?)
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = registry::global().release(self.handle) {
            error!("could not release {:?}: {}", self.handle, err);
        }
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("handle", &self.handle)
            .field("released", &self.released)
            .field("record", &self.record)
            .finish()
    }
}
