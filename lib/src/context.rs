// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::gpio::{DigitalInput, DigitalInputConfig, DigitalOutput, DigitalOutputConfig};
use crate::i2c::{self, I2cBus, I2cConfig, I2cDevice};
use crate::permission::{self, Interface};
use crate::spi::{SpiConfig, SpiDevice};
use crate::{Error, Result};
use boardio_uapi::{Linux, Syscalls};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// The kinds of device a [`Context`] can create.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DeviceKind {
    DigitalInput,
    DigitalOutput,
    I2c,
    Spi,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceKind::DigitalInput => "digital input",
            DeviceKind::DigitalOutput => "digital output",
            DeviceKind::I2c => "i2c",
            DeviceKind::Spi => "spi",
        };
        write!(f, "{}", name)
    }
}

/// A device that holds kernel resources until it is shut down.
///
/// Devices are initialized by their constructor, so a device that exists
/// has acquired its resources.  Once shut down a device cannot be reused.
pub trait Device: Send + Sync + fmt::Debug {
    /// The unique id of the device.
    fn id(&self) -> &str;

    fn kind(&self) -> DeviceKind;

    /// Release the kernel resources held by the device and remove it from
    /// the context registry.
    fn shutdown(&self, ctx: &Context) -> Result<()>;
}

/// The collection of live devices.
pub trait Registry: Send + Sync + fmt::Debug {
    /// Add a device.
    ///
    /// Fails if a device with the same id is already registered.
    fn register(&self, device: Arc<dyn Device>) -> Result<()>;

    /// Remove a device, returning it if it was registered.
    fn unregister(&self, id: &str) -> Option<Arc<dyn Device>>;

    fn contains(&self, id: &str) -> bool;

    /// The ids of the registered devices.
    fn ids(&self) -> Vec<String>;
}

/// An in-memory [`Registry`].
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Mutex<HashMap<String, Arc<dyn Device>>>,
}

impl DeviceRegistry {
    pub fn new() -> DeviceRegistry {
        DeviceRegistry::default()
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Device>> {
        self.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<dyn Device>>> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Registry for DeviceRegistry {
    fn register(&self, device: Arc<dyn Device>) -> Result<()> {
        let mut devices = self.lock();
        if devices.contains_key(device.id()) {
            return Err(Error::AlreadyRegistered(device.id().to_string()));
        }
        tracing::debug!(id = device.id(), kind = %device.kind(), "registered");
        devices.insert(device.id().to_string(), device);
        Ok(())
    }

    fn unregister(&self, id: &str) -> Option<Arc<dyn Device>> {
        let device = self.lock().remove(id);
        if device.is_some() {
            tracing::debug!(id, "unregistered");
        }
        device
    }

    fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// The collaborators devices are created with.
///
/// The context carries the [`Syscalls`] used to reach the kernel, the
/// [`Registry`] of live devices, and whether device files are checked for
/// access before being opened.  I2C buses are shared between the devices
/// created by the same context.
pub struct Context {
    sys: Arc<dyn Syscalls>,
    registry: Arc<dyn Registry>,
    check_permissions: bool,
    buses: Mutex<HashMap<u32, Weak<I2cBus>>>,
}

impl Context {
    /// A context for the running kernel.
    ///
    /// Device file permissions are checked before devices are opened.
    pub fn linux() -> Context {
        Context {
            sys: Arc::new(Linux),
            registry: Arc::new(DeviceRegistry::new()),
            check_permissions: true,
            buses: Mutex::default(),
        }
    }

    /// A context using the provided syscalls, such as a simulator.
    ///
    /// Permission checks are disabled as the device files may not exist.
    pub fn with_syscalls(sys: Arc<dyn Syscalls>) -> Context {
        Context {
            sys,
            registry: Arc::new(DeviceRegistry::new()),
            check_permissions: false,
            buses: Mutex::default(),
        }
    }

    /// Replace the registry devices are recorded in.
    pub fn with_registry(mut self, registry: Arc<dyn Registry>) -> Context {
        self.registry = registry;
        self
    }

    pub fn with_permission_checks(mut self, enable: bool) -> Context {
        self.check_permissions = enable;
        self
    }

    pub fn syscalls(&self) -> Arc<dyn Syscalls> {
        self.sys.clone()
    }

    pub fn registry(&self) -> &Arc<dyn Registry> {
        &self.registry
    }

    pub(crate) fn check_access(&self, path: &Path, interface: Interface) -> Result<()> {
        if self.check_permissions {
            permission::check_device(path, interface)?;
        }
        Ok(())
    }

    /// The bus with the given number, opening it if no device holds it.
    pub fn i2c_bus(&self, number: u32) -> Result<Arc<I2cBus>> {
        let mut buses = self.buses.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bus) = buses.get(&number).and_then(Weak::upgrade) {
            if !bus.is_closed() {
                return Ok(bus);
            }
        }
        self.check_access(&i2c::bus_path(number), Interface::I2c)?;
        let bus = Arc::new(I2cBus::open(self, number)?);
        buses.retain(|_, b| b.strong_count() > 0);
        buses.insert(number, Arc::downgrade(&bus));
        Ok(bus)
    }

    pub fn create_digital_input(&self, config: DigitalInputConfig) -> Result<Arc<DigitalInput>> {
        self.ensure_unregistered(&config.id)?;
        self.register(DigitalInput::initialize(self, config)?)
    }

    pub fn create_digital_output(
        &self,
        config: DigitalOutputConfig,
    ) -> Result<Arc<DigitalOutput>> {
        self.ensure_unregistered(&config.id)?;
        self.register(DigitalOutput::initialize(self, config)?)
    }

    pub fn create_i2c(&self, config: I2cConfig) -> Result<Arc<I2cDevice>> {
        self.ensure_unregistered(&config.id)?;
        self.register(I2cDevice::initialize(self, config)?)
    }

    pub fn create_spi(&self, config: SpiConfig) -> Result<Arc<SpiDevice>> {
        self.ensure_unregistered(&config.id)?;
        self.register(SpiDevice::initialize(self, config)?)
    }

    /// Shut down the registered device with the given id.
    pub fn shutdown(&self, id: &str) -> Result<()> {
        match self.registry.unregister(id) {
            Some(device) => device.shutdown(self),
            None => Err(Error::InvalidArgument(format!(
                "no device \"{id}\" is registered"
            ))),
        }
    }

    /// Shut down every registered device.
    ///
    /// All devices are shut down even if some fail, and the first error is
    /// returned.
    pub fn shutdown_all(&self) -> Result<()> {
        let mut res = Ok(());
        for id in self.registry.ids() {
            if let Some(device) = self.registry.unregister(&id) {
                if let Err(e) = device.shutdown(self) {
                    tracing::warn!(id = %id, error = %e, "shutdown failed");
                    if res.is_ok() {
                        res = Err(e);
                    }
                }
            }
        }
        res
    }

    fn ensure_unregistered(&self, id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(Error::InvalidArgument("device id is empty".to_string()));
        }
        if self.registry.contains(id) {
            return Err(Error::AlreadyRegistered(id.to_string()));
        }
        Ok(())
    }

    fn register<D: Device + 'static>(&self, device: D) -> Result<Arc<D>> {
        let device = Arc::new(device);
        if let Err(e) = self.registry.register(device.clone()) {
            // lost a race with another registration of the same id
            let _ = device.shutdown(self);
            return Err(e);
        }
        tracing::info!(id = device.id(), kind = %device.kind(), "created");
        Ok(device)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("registry", &self.registry)
            .field("check_permissions", &self.check_permissions)
            .finish()
    }
}
