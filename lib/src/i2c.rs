// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

#[cfg(feature = "serde")]
use serde_derive::{Deserialize, Serialize};
use std::path::PathBuf;

pub use boardio_uapi::i2c::Functionality;

mod bus;
pub use self::bus::I2cBus;

mod device;
pub use self::device::{I2cDevice, Transaction};

/// The path of the I2C bus with the given number.
pub fn bus_path(bus: u32) -> PathBuf {
    PathBuf::from(format!("/dev/i2c-{bus}"))
}

/// How an [`I2cDevice`] accesses the bus.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum I2cStrategy {
    /// Direct if the bus supports plain I2C transfers, else SMBus.
    #[default]
    Auto,

    /// `I2C_RDWR` transfers, so register reads are a single combined
    /// transaction.
    Direct,

    /// SMBus transactions.
    ///
    /// Suitable for adapters that only support SMBus, but limited to the
    /// transaction shapes SMBus defines.
    SMBus,

    /// Plain reads and writes of the bus device file.
    File,
}

/// The configuration of an [`I2cDevice`].
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct I2cConfig {
    /// The id the device is registered under.
    pub id: String,

    /// The number of the bus, as in `/dev/i2c-<N>`.
    pub bus: u32,

    pub address: u16,

    /// Use 10-bit addressing.
    pub ten_bit: bool,

    pub strategy: I2cStrategy,
}

impl I2cConfig {
    pub fn new<S: Into<String>>(id: S, bus: u32, address: u16) -> Self {
        I2cConfig {
            id: id.into(),
            bus,
            address,
            ten_bit: false,
            strategy: I2cStrategy::default(),
        }
    }

    pub fn with_ten_bit(mut self, ten_bit: bool) -> Self {
        self.ten_bit = ten_bit;
        self
    }

    pub fn with_strategy(mut self, strategy: I2cStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn bus_path(&self) -> PathBuf {
        bus_path(self.bus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config() {
        let cfg = I2cConfig::new("eeprom", 1, 0x50);
        assert_eq!(cfg.bus_path(), PathBuf::from("/dev/i2c-1"));
        assert_eq!(cfg.strategy, I2cStrategy::Auto);
        assert!(!cfg.ten_bit);
        let cfg = cfg.with_ten_bit(true).with_strategy(I2cStrategy::SMBus);
        assert!(cfg.ten_bit);
        assert_eq!(cfg.strategy, I2cStrategy::SMBus);
    }
}
