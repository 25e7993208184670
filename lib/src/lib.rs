// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A library for accessing GPIO lines, I2C buses and SPI buses on Linux
//! single board computers using the kernel character devices.
//!
//! Devices are created from a config through a [`Context`], which checks
//! permissions, acquires the kernel resources and records the device in a
//! [`Registry`].
//!
//! To read an input line and watch it for changes:
//! ```no_run
//! # use boardio::Result;
//! use boardio::gpio::DigitalInputConfig;
//! use boardio::Context;
//!
//! # fn main() -> Result<()> {
//! let ctx = Context::linux();
//! let button = ctx.create_digital_input(DigitalInputConfig::new("button", 0, 7))?;
//! println!("button is {}", button.state()?);
//! button.add_listener(|change| println!("button went {}", change.state))?;
//! # Ok(())
//! # }
//! ```
//!
//! [`Context`]: context::Context
//! [`Registry`]: context::Registry

use boardio_uapi as uapi;
#[cfg(feature = "serde")]
use serde_derive::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Device lifecycle and the collaborators devices are created with.
pub mod context;
pub use context::{Context, Device, DeviceKind, DeviceRegistry, Registry};

/// Checks that the process may access a device before it is opened.
pub mod permission;

/// GPIO chips and digital input and output lines.
pub mod gpio;

/// I2C buses and the devices on them.
pub mod i2c;

/// SPI devices.
pub mod spi;

/// The logical state of a digital line.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DigitalState {
    #[default]
    Low,
    High,
}

impl DigitalState {
    pub fn is_high(&self) -> bool {
        *self == DigitalState::High
    }

    /// The opposite state.
    pub fn not(&self) -> DigitalState {
        match self {
            DigitalState::Low => DigitalState::High,
            DigitalState::High => DigitalState::Low,
        }
    }
}

impl From<bool> for DigitalState {
    fn from(b: bool) -> Self {
        if b {
            DigitalState::High
        } else {
            DigitalState::Low
        }
    }
}

impl From<DigitalState> for bool {
    fn from(s: DigitalState) -> Self {
        s.is_high()
    }
}

impl fmt::Display for DigitalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigitalState::Low => write!(f, "low"),
            DigitalState::High => write!(f, "high"),
        }
    }
}

/// Errors returned by [`boardio`] functions.
///
/// [`boardio`]: crate
#[derive(Clone, Debug, thiserror::Error, Eq, PartialEq)]
pub enum Error {
    /// An error returned when there is a problem with an argument.
    #[error("{0}")]
    InvalidArgument(String),

    /// The process may not access the device.
    ///
    /// The detail describes what must change, such as the group the user
    /// must belong to.
    #[error("\"{}\" {detail}", path.display())]
    Permission { path: PathBuf, detail: String },

    /// The device file does not exist.
    #[error("\"{}\" does not exist", .0.display())]
    NotFound(PathBuf),

    /// The line is already in use by another consumer.
    #[error("line {offset} on \"{}\" is in use", chip.display())]
    LineInUse { chip: PathBuf, offset: u32 },

    /// The operation is beyond the capabilities of the bus or device.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// The device has been shut down.
    #[error("{0} is closed")]
    Closed(String),

    /// A device with the same id is already registered.
    #[error("device \"{0}\" is already registered")]
    AlreadyRegistered(String),

    /// A background watcher could not be started.
    #[error("watcher: {0}")]
    Watcher(String),

    /// An error returned from an underlying uAPI call.
    #[error("uAPI {0} returned: {1}")]
    Uapi(UapiCall, #[source] uapi::Error),
}

impl Error {
    /// Map a uAPI error, lifting errors that are meaningful at the device
    /// level out of the uAPI wrapper.
    pub(crate) fn from_uapi(call: UapiCall, e: uapi::Error) -> Error {
        match e {
            uapi::Error::DeviceNotFound(p) => Error::NotFound(p),
            uapi::Error::PermissionDenied(path) => Error::Permission {
                path,
                detail: "cannot be opened by the current user".to_string(),
            },
            uapi::Error::Closed(p) => Error::Closed(p.display().to_string()),
            e => Error::Uapi(call, e),
        }
    }
}

/// Identifiers for the underlying uAPI calls.
#[doc(hidden)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UapiCall {
    Close,
    GetChipInfo,
    GetLine,
    GetLineInfo,
    GetLineValues,
    I2cFuncs,
    I2cRdwr,
    I2cRead,
    I2cSlave,
    I2cSmbus,
    I2cTenBit,
    I2cWrite,
    Open,
    Poll,
    ReadEvents,
    SetLineValues,
    SpiMessage,
    SpiReadSettings,
    SpiWriteSettings,
}

impl fmt::Display for UapiCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UapiCall::Close => "close",
            UapiCall::GetChipInfo => "get_chip_info",
            UapiCall::GetLine => "get_line",
            UapiCall::GetLineInfo => "get_line_info",
            UapiCall::GetLineValues => "get_line_values",
            UapiCall::I2cFuncs => "i2c_funcs",
            UapiCall::I2cRdwr => "i2c_rdwr",
            UapiCall::I2cRead => "i2c_read",
            UapiCall::I2cSlave => "i2c_slave",
            UapiCall::I2cSmbus => "i2c_smbus",
            UapiCall::I2cTenBit => "i2c_tenbit",
            UapiCall::I2cWrite => "i2c_write",
            UapiCall::Open => "open",
            UapiCall::Poll => "poll",
            UapiCall::ReadEvents => "read_events",
            UapiCall::SetLineValues => "set_line_values",
            UapiCall::SpiMessage => "spi_message",
            UapiCall::SpiReadSettings => "spi_read_settings",
            UapiCall::SpiWriteSettings => "spi_write_settings",
        };
        write!(f, "{}", name)
    }
}

/// The result for [`boardio`] functions.
///
/// [`boardio`]: crate
pub type Result<T> = std::result::Result<T, Error>;
