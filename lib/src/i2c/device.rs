// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use super::{Functionality, I2cBus, I2cConfig, I2cStrategy};
use crate::{Context, Device, DeviceKind, Error, Result, UapiCall};
use boardio_uapi::i2c::{self, Message, ADDRESS_10BIT_MAX, ADDRESS_7BIT_MAX, SMBUS_BLOCK_MAX};
use boardio_uapi::FileDescriptor;
use std::sync::{Arc, Mutex, PoisonError};

/// A target device on an I2C bus.
#[derive(Debug)]
pub struct I2cDevice {
    config: I2cConfig,
    strategy: I2cStrategy,
    bus: Mutex<Option<Arc<I2cBus>>>,
}

impl I2cDevice {
    /// Attach to the target described by the config.
    ///
    /// The bus is opened unless another device on the same context already
    /// holds it.  An [`I2cStrategy::Auto`] strategy is resolved against the
    /// bus functionality.
    pub fn initialize(ctx: &Context, config: I2cConfig) -> Result<I2cDevice> {
        let max = if config.ten_bit {
            ADDRESS_10BIT_MAX
        } else {
            ADDRESS_7BIT_MAX
        };
        if config.address > max {
            return Err(Error::InvalidArgument(format!(
                "address {:#x} exceeds {max:#x}",
                config.address
            )));
        }
        let bus = ctx.i2c_bus(config.bus)?;
        let funcs = bus.functionality();
        if config.ten_bit && !funcs.contains(Functionality::TEN_BIT_ADDR) {
            return Err(Error::Unsupported(format!(
                "10-bit addressing on \"{}\"",
                bus.path().display()
            )));
        }
        let strategy = resolve(config.strategy, funcs).ok_or_else(|| {
            Error::Unsupported(format!(
                "{:?} access on \"{}\"",
                config.strategy,
                bus.path().display()
            ))
        })?;
        tracing::info!(
            id = %config.id,
            bus = config.bus,
            address = config.address,
            ?strategy,
            "i2c device initialized"
        );
        Ok(I2cDevice {
            config,
            strategy,
            bus: Mutex::new(Some(bus)),
        })
    }

    pub fn config(&self) -> &I2cConfig {
        &self.config
    }

    pub fn address(&self) -> u16 {
        self.config.address
    }

    /// The strategy in use, after resolving [`I2cStrategy::Auto`].
    pub fn strategy(&self) -> I2cStrategy {
        self.strategy
    }

    /// The bus the device is on.
    pub fn bus(&self) -> Result<Arc<I2cBus>> {
        self.bus
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| Error::Closed(self.config.id.clone()))
    }

    /// Run several operations on the device without any other operation
    /// on the bus in between.
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<T>,
    {
        let bus = self.bus()?;
        let funcs = bus.functionality();
        bus.execute(self.config.address, self.config.ten_bit, |fd| {
            f(&mut Transaction {
                fd,
                strategy: self.strategy,
                funcs,
                address: self.config.address,
                ten_bit: self.config.ten_bit,
            })
        })
    }

    pub fn read_byte(&self) -> Result<u8> {
        self.transaction(|tx| tx.read_byte())
    }

    pub fn write_byte(&self, value: u8) -> Result<()> {
        self.transaction(|tx| tx.write_byte(value))
    }

    /// Read from the device into `buf`, returning the number of bytes read.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.transaction(|tx| tx.read(buf))
    }

    /// Write `data` to the device, returning the number of bytes written.
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        self.transaction(|tx| tx.write(data))
    }

    /// Read from the registers starting at `reg`.
    pub fn read_register(&self, reg: u8, buf: &mut [u8]) -> Result<usize> {
        self.transaction(|tx| tx.read_register(reg, buf))
    }

    /// Write to the registers starting at `reg`.
    pub fn write_register(&self, reg: u8, data: &[u8]) -> Result<usize> {
        self.transaction(|tx| tx.write_register(reg, data))
    }

    pub fn read_register_byte(&self, reg: u8) -> Result<u8> {
        self.transaction(|tx| tx.read_register_byte(reg))
    }

    pub fn write_register_byte(&self, reg: u8, value: u8) -> Result<()> {
        self.transaction(|tx| tx.write_register_byte(reg, value))
    }

    /// Read a little-endian word from `reg` and `reg + 1`.
    pub fn read_register_word(&self, reg: u8) -> Result<u16> {
        self.transaction(|tx| tx.read_register_word(reg))
    }

    /// Write a little-endian word to `reg` and `reg + 1`.
    pub fn write_register_word(&self, reg: u8, value: u16) -> Result<()> {
        self.transaction(|tx| tx.write_register_word(reg, value))
    }
}

impl Device for I2cDevice {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::I2c
    }

    /// Detach from the bus, which is closed once no device holds it.
    fn shutdown(&self, ctx: &Context) -> Result<()> {
        ctx.registry().unregister(self.id());
        let bus = self
            .bus
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match bus {
            Some(_) => {
                tracing::info!(id = %self.config.id, "i2c device shut down");
                Ok(())
            }
            None => Err(Error::Closed(self.config.id.clone())),
        }
    }
}

fn resolve(strategy: I2cStrategy, funcs: Functionality) -> Option<I2cStrategy> {
    match strategy {
        I2cStrategy::Auto if funcs.supports_i2c() => Some(I2cStrategy::Direct),
        I2cStrategy::Auto if funcs.supports_smbus() => Some(I2cStrategy::SMBus),
        I2cStrategy::Direct if funcs.supports_i2c() => Some(I2cStrategy::Direct),
        I2cStrategy::SMBus if funcs.supports_smbus() => Some(I2cStrategy::SMBus),
        I2cStrategy::File => Some(I2cStrategy::File),
        _ => None,
    }
}

/// Operations on a device with the bus held.
///
/// Provided by [`I2cDevice::transaction`].
#[derive(Debug)]
pub struct Transaction<'a> {
    fd: &'a FileDescriptor,
    strategy: I2cStrategy,
    funcs: Functionality,
    address: u16,
    ten_bit: bool,
}

impl Transaction<'_> {
    fn require(&self, needed: Functionality, what: &str) -> Result<()> {
        if self.funcs.contains(needed) {
            Ok(())
        } else {
            Err(Error::Unsupported(format!(
                "{what} on \"{}\"",
                self.fd.path().display()
            )))
        }
    }

    fn transfer(&self, msgs: &mut [Message<'_>]) -> Result<()> {
        i2c::transfer(self.fd, self.address, self.ten_bit, msgs)
            .map_err(|e| Error::from_uapi(UapiCall::I2cRdwr, e))
    }

    fn file_read(&self, buf: &mut [u8]) -> Result<usize> {
        self.fd
            .read(buf)
            .map_err(|e| Error::from_uapi(UapiCall::I2cRead, e))
    }

    fn file_write(&self, data: &[u8]) -> Result<usize> {
        self.fd
            .write(data)
            .map_err(|e| Error::from_uapi(UapiCall::I2cWrite, e))
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        match self.strategy {
            I2cStrategy::SMBus => {
                self.require(Functionality::SMBUS_READ_BYTE, "SMBus receive byte")?;
                i2c::read_byte(self.fd).map_err(smbus_err)
            }
            _ => {
                let mut buf = [0u8; 1];
                self.read(&mut buf)?;
                Ok(buf[0])
            }
        }
    }

    pub fn write_byte(&mut self, value: u8) -> Result<()> {
        match self.strategy {
            I2cStrategy::SMBus => {
                self.require(Functionality::SMBUS_WRITE_BYTE, "SMBus send byte")?;
                i2c::write_byte(self.fd, value).map_err(smbus_err)
            }
            _ => self.write(&[value]).map(|_| ()),
        }
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.strategy {
            I2cStrategy::SMBus => match buf.len() {
                1 => {
                    buf[0] = self.read_byte()?;
                    Ok(1)
                }
                n => Err(Error::Unsupported(format!(
                    "SMBus read of {n} bytes without a register"
                ))),
            },
            I2cStrategy::File => self.file_read(buf),
            _ => {
                let len = buf.len();
                self.transfer(&mut [Message::Read(buf)])?;
                Ok(len)
            }
        }
    }

    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        match self.strategy {
            I2cStrategy::SMBus => match data {
                [value] => {
                    self.write_byte(*value)?;
                    Ok(1)
                }
                _ => Err(Error::Unsupported(format!(
                    "SMBus write of {} bytes without a register",
                    data.len()
                ))),
            },
            I2cStrategy::File => self.file_write(data),
            _ => {
                self.transfer(&mut [Message::Write(data)])?;
                Ok(data.len())
            }
        }
    }

    pub fn read_register(&mut self, reg: u8, buf: &mut [u8]) -> Result<usize> {
        match self.strategy {
            I2cStrategy::SMBus => self.smbus_read_register(reg, buf),
            I2cStrategy::File => {
                self.file_write(&[reg])?;
                self.file_read(buf)
            }
            _ => {
                let len = buf.len();
                self.transfer(&mut [Message::Write(&[reg]), Message::Read(buf)])?;
                Ok(len)
            }
        }
    }

    pub fn write_register(&mut self, reg: u8, data: &[u8]) -> Result<usize> {
        match self.strategy {
            I2cStrategy::SMBus => self.smbus_write_register(reg, data),
            I2cStrategy::File => {
                let n = self.file_write(&register_message(reg, data))?;
                Ok(n.saturating_sub(1))
            }
            _ => {
                self.transfer(&mut [Message::Write(&register_message(reg, data))])?;
                Ok(data.len())
            }
        }
    }

    pub fn read_register_byte(&mut self, reg: u8) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_register(reg, &mut buf)?;
        Ok(buf[0])
    }

    pub fn write_register_byte(&mut self, reg: u8, value: u8) -> Result<()> {
        self.write_register(reg, &[value]).map(|_| ())
    }

    pub fn read_register_word(&mut self, reg: u8) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_register(reg, &mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    pub fn write_register_word(&mut self, reg: u8, value: u16) -> Result<()> {
        self.write_register(reg, &value.to_le_bytes()).map(|_| ())
    }

    fn smbus_read_register(&mut self, reg: u8, buf: &mut [u8]) -> Result<usize> {
        match buf.len() {
            0 => Ok(0),
            1 => {
                self.require(Functionality::SMBUS_READ_BYTE_DATA, "SMBus read byte data")?;
                buf[0] = i2c::read_byte_data(self.fd, reg).map_err(smbus_err)?;
                Ok(1)
            }
            2 => {
                self.require(Functionality::SMBUS_READ_WORD_DATA, "SMBus read word data")?;
                let word = i2c::read_word_data(self.fd, reg).map_err(smbus_err)?;
                buf.copy_from_slice(&word.to_le_bytes());
                Ok(2)
            }
            n if n <= SMBUS_BLOCK_MAX => {
                let block = if self.funcs.contains(Functionality::SMBUS_READ_I2C_BLOCK) {
                    i2c::read_i2c_block_data(self.fd, reg, n).map_err(smbus_err)?
                } else {
                    self.require(Functionality::SMBUS_READ_BLOCK_DATA, "SMBus read block data")?;
                    i2c::read_block_data(self.fd, reg).map_err(smbus_err)?
                };
                let len = block.len().min(n);
                buf[..len].copy_from_slice(&block[..len]);
                Ok(len)
            }
            n => Err(Error::Unsupported(format!(
                "SMBus read of {n} bytes exceeds {SMBUS_BLOCK_MAX}"
            ))),
        }
    }

    fn smbus_write_register(&mut self, reg: u8, data: &[u8]) -> Result<usize> {
        match data {
            [] => {
                self.require(Functionality::SMBUS_WRITE_BYTE, "SMBus send byte")?;
                i2c::write_byte(self.fd, reg).map_err(smbus_err)?;
            }
            [value] => {
                self.require(Functionality::SMBUS_WRITE_BYTE_DATA, "SMBus write byte data")?;
                i2c::write_byte_data(self.fd, reg, *value).map_err(smbus_err)?;
            }
            [lo, hi] => {
                self.require(Functionality::SMBUS_WRITE_WORD_DATA, "SMBus write word data")?;
                i2c::write_word_data(self.fd, reg, u16::from_le_bytes([*lo, *hi]))
                    .map_err(smbus_err)?;
            }
            _ if data.len() <= SMBUS_BLOCK_MAX => {
                if self.funcs.contains(Functionality::SMBUS_WRITE_I2C_BLOCK) {
                    i2c::write_i2c_block_data(self.fd, reg, data).map_err(smbus_err)?;
                } else {
                    self.require(Functionality::SMBUS_WRITE_BLOCK_DATA, "SMBus write block data")?;
                    i2c::write_block_data(self.fd, reg, data).map_err(smbus_err)?;
                }
            }
            _ => {
                return Err(Error::Unsupported(format!(
                    "SMBus write of {} bytes exceeds {SMBUS_BLOCK_MAX}",
                    data.len()
                )))
            }
        }
        Ok(data.len())
    }
}

fn smbus_err(e: boardio_uapi::Error) -> Error {
    Error::from_uapi(UapiCall::I2cSmbus, e)
}

fn register_message(reg: u8, data: &[u8]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(data.len() + 1);
    msg.push(reg);
    msg.extend_from_slice(data);
    msg
}
