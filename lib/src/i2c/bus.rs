// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use super::{bus_path, Functionality};
use crate::{Context, Error, Result, UapiCall};
use boardio_uapi::i2c::{self, ADDRESS_10BIT_MAX, ADDRESS_7BIT_MAX};
use boardio_uapi::{AccessMode, FileDescriptor};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

/// The target last selected on the bus.
#[derive(Debug, Default)]
struct Selection {
    address: Option<u16>,
    ten_bit: bool,
}

/// An open I2C bus, shared by the devices on it.
///
/// Selecting a target and transferring to it happen under the bus lock, so
/// operations from different devices do not interleave.
#[derive(Debug)]
pub struct I2cBus {
    number: u32,
    functionality: Functionality,
    f: FileDescriptor,
    selection: Mutex<Selection>,
}

impl I2cBus {
    /// Open `/dev/i2c-<number>` and read its functionality.
    ///
    /// Fails if the bus supports neither I2C transfers nor any SMBus
    /// transaction.
    pub fn open(ctx: &Context, number: u32) -> Result<I2cBus> {
        let path = bus_path(number);
        let f = FileDescriptor::open(ctx.syscalls(), &path, AccessMode::ReadWrite)
            .map_err(|e| Error::from_uapi(UapiCall::Open, e))?;
        let functionality =
            i2c::functionality(&f).map_err(|e| Error::from_uapi(UapiCall::I2cFuncs, e))?;
        if !functionality.supports_i2c() && !functionality.supports_smbus() {
            return Err(Error::Unsupported(format!(
                "\"{}\" supports neither I2C transfers nor SMBus",
                path.display()
            )));
        }
        tracing::info!(path = %path.display(), ?functionality, "i2c bus opened");
        Ok(I2cBus {
            number,
            functionality,
            f,
            selection: Mutex::default(),
        })
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn path(&self) -> &Path {
        self.f.path()
    }

    pub fn functionality(&self) -> Functionality {
        self.functionality
    }

    pub fn is_closed(&self) -> bool {
        self.f.is_closed()
    }

    /// Close the bus.
    ///
    /// Devices using the bus fail with [`Error::Closed`] from then on.
    pub fn close(&self) -> Result<()> {
        let _sel = self.lock();
        self.f
            .close()
            .map_err(|e| Error::from_uapi(UapiCall::Close, e))?;
        tracing::info!(path = %self.f.path().display(), "i2c bus closed");
        Ok(())
    }

    /// Select the target and run `f` on the bus, with the bus locked.
    pub fn execute<T, F>(&self, address: u16, ten_bit: bool, f: F) -> Result<T>
    where
        F: FnOnce(&FileDescriptor) -> Result<T>,
    {
        let mut sel = self.lock();
        self.select(&mut sel, address, ten_bit)?;
        f(&self.f)
    }

    fn select(&self, sel: &mut Selection, address: u16, ten_bit: bool) -> Result<()> {
        let max = if ten_bit {
            ADDRESS_10BIT_MAX
        } else {
            ADDRESS_7BIT_MAX
        };
        if address > max {
            return Err(Error::InvalidArgument(format!(
                "address {address:#x} exceeds {max:#x}"
            )));
        }
        if ten_bit && !self.functionality.contains(Functionality::TEN_BIT_ADDR) {
            return Err(Error::Unsupported(format!(
                "10-bit addressing on \"{}\"",
                self.f.path().display()
            )));
        }
        if sel.ten_bit != ten_bit {
            i2c::set_ten_bit(&self.f, ten_bit)
                .map_err(|e| Error::from_uapi(UapiCall::I2cTenBit, e))?;
            sel.ten_bit = ten_bit;
            sel.address = None;
        }
        if sel.address != Some(address) {
            i2c::set_slave_address(&self.f, address)
                .map_err(|e| Error::from_uapi(UapiCall::I2cSlave, e))?;
            sel.address = Some(address);
            tracing::trace!(bus = self.number, address, "selected");
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Selection> {
        self.selection.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
