use std::os::raw::c_int;

use log::{debug, error, info};

use crate::bridge::Bridge;
use crate::config::{ConfigRecord, Geometry};
use crate::device::BlockDevice;
use crate::error::{errval, BridgeError};
use crate::registry::SharedDevice;

/// Entry points of a flash filesystem engine that drives its storage
/// through a configuration record.
///
/// Implementations keep whatever internal state they need and may hold on to
/// `config.as_ptr()` between `mount` and `unmount`; the caller guarantees
/// the record outlives that window. Status codes follow the engine
/// convention: zero or positive on success, a negative error code otherwise.
pub trait Engine {
    fn format(&mut self, config: &ConfigRecord) -> c_int;
    fn mount(&mut self, config: &ConfigRecord) -> c_int;
    fn unmount(&mut self) -> c_int;
}

/// A mounted (or mountable) filesystem instance: an engine, the record it is
/// driven through, and the device behind the record.
///
/// The record and the device registration are only released after the
/// engine has been unmounted, so no callback can outlive them.
pub struct Filesystem<E: Engine> {
    engine: E,
    bridge: Bridge,
    mounted: bool,
}

impl<E: Engine> Filesystem<E> {
    pub fn new<D>(engine: E, geometry: Geometry, device: D) -> Result<Self, BridgeError>
    where
        D: BlockDevice + Send + 'static,
    {
        Ok(Filesystem {
            engine,
            bridge: Bridge::new(geometry, device)?,
            mounted: false,
        })
    }

    /// Formats the device. Only allowed while unmounted.
    pub fn format(&mut self) -> Result<(), BridgeError> {
        if self.mounted {
            return Err(BridgeError::AlreadyMounted);
        }
        info!("formatting {:?}", self.bridge.handle());
        errval(self.engine.format(self.bridge.config()))?;
        Ok(())
    }

    pub fn mount(&mut self) -> Result<(), BridgeError> {
        if self.mounted {
            return Err(BridgeError::AlreadyMounted);
        }
        errval(self.engine.mount(self.bridge.config()))?;
        self.mounted = true;
        debug!("mounted {:?}", self.bridge.handle());
        Ok(())
    }

    pub fn unmount(&mut self) -> Result<(), BridgeError> {
        if !self.mounted {
            return Err(BridgeError::NotMounted);
        }
        // The engine is done with the record even when unmount reports an
        // error, so the instance counts as unmounted either way.
        self.mounted = false;
        errval(self.engine.unmount())?;
        debug!("unmounted {:?}", self.bridge.handle());
        Ok(())
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    /// Unmounts if needed and hands the device back.
    pub fn into_device(mut self) -> Result<SharedDevice, BridgeError> {
        if self.mounted {
            self.unmount()?;
        }
        self.bridge.take_device()
    }
}

impl<E: Engine> Drop for Filesystem<E> {
    fn drop(&mut self) {
        if self.mounted {
            if let Err(err) = self.unmount() {
                error!("unmount on drop failed: {}", err);
            }
        }
    }
}
