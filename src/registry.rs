// Driver registry
//
// Maps backend names to driver factories. Backends register themselves by
// name; callers pick one at runtime from the name the kernel reports for the
// device node. A backend disabled at build time is known by name but has no
// factory.

use std::collections::BTreeMap;
use std::os::fd::BorrowedFd;

use crate::driver::DrmDriver;
use crate::error::DrmResult;
use crate::{log_debug, log_error};

/// Constructor of a driver over a caller-owned device descriptor.
pub type DriverFactory = for<'a> fn(BorrowedFd<'a>) -> DrmResult<Box<dyn DrmDriver + 'a>>;

/// Version of the driver operations table handed out by [`get_driver`].
/// Raised whenever a [`DrmDriver`] operation changes meaning.
pub const DRIVER_VERSION: u32 = 2;

/// Every backend this crate knows about, enabled or not.
pub const KNOWN_BACKENDS: &[&str] = &["vmwgfx", "rockchip"];

/// Registry of named driver factories.
pub struct DriverRegistry {
    factories: BTreeMap<String, DriverFactory>,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        DriverRegistry {
            factories: BTreeMap::new(),
        }
    }

    /// A registry holding every backend enabled at build time.
    pub fn with_builtin() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();
        #[cfg(feature = "vmwgfx")]
        registry.install(crate::backends::vmwgfx::NAME, crate::backends::vmwgfx::create_driver);
        #[cfg(feature = "rockchip")]
        registry.install(crate::backends::rockchip::NAME, crate::backends::rockchip::create_driver);
        registry
    }

    /// Register a factory. An existing entry of the same name is replaced.
    pub fn install(&mut self, name: &str, factory: DriverFactory) {
        self.factories.insert(name.to_owned(), factory);
    }

    pub fn lookup(&self, name: &str) -> Option<DriverFactory> {
        self.factories.get(name).copied()
    }

    /// Return the number of registered backends.
    pub fn count(&self) -> usize {
        self.factories.len()
    }

    /// Registered backend names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Create the driver registered as `name` for `fd`.
    ///
    /// Returns `None`, after logging why, when the name is unknown, the
    /// backend was compiled out, or the factory failed.
    pub fn create<'a>(&self, name: &str, fd: BorrowedFd<'a>) -> Option<Box<dyn DrmDriver + 'a>> {
        log_debug!("DRM: driver requested: {}", name);

        let Some(factory) = self.lookup(name) else {
            if KNOWN_BACKENDS.contains(&name) {
                log_error!("DRM: driver {} is not enabled in this build", name);
            } else {
                log_error!("DRM: unknown driver: {}", name);
            }
            return None;
        };

        match factory(fd) {
            Ok(driver) => Some(driver),
            Err(err) => {
                log_error!("DRM: failed to create driver {}: {}", name, err);
                None
            }
        }
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Select a built-in backend by name. The returned table follows
/// [`DRIVER_VERSION`].
pub fn get_driver<'a>(name: &str, fd: BorrowedFd<'a>) -> Option<Box<dyn DrmDriver + 'a>> {
    DriverRegistry::with_builtin().create(name, fd)
}
