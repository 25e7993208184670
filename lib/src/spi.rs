// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::permission::Interface;
use crate::{Context, Device, DeviceKind, Error, Result, UapiCall};
use boardio_uapi::spi::{self, SpiMode};
use boardio_uapi::{AccessMode, FileDescriptor};
#[cfg(feature = "serde")]
use serde_derive::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The default clock rate.
pub const DEFAULT_BAUD: u32 = 1_000_000;

/// Bits per word used for all transfers.
pub const BITS_PER_WORD: u8 = 8;

/// The path of the spidev for the given bus and chip select.
pub fn device_path(bus: u32, chip_select: u32) -> PathBuf {
    PathBuf::from(format!("/dev/spidev{bus}.{chip_select}"))
}

/// The standard clock polarity and phase combinations.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Mode {
    /// Clock idles low, data sampled on the leading edge.
    #[default]
    Mode0,
    /// Clock idles low, data sampled on the trailing edge.
    Mode1,
    /// Clock idles high, data sampled on the leading edge.
    Mode2,
    /// Clock idles high, data sampled on the trailing edge.
    Mode3,
}

impl From<Mode> for SpiMode {
    fn from(m: Mode) -> Self {
        match m {
            Mode::Mode0 => SpiMode::empty(),
            Mode::Mode1 => SpiMode::CPHA,
            Mode::Mode2 => SpiMode::CPOL,
            Mode::Mode3 => SpiMode::CPOL | SpiMode::CPHA,
        }
    }
}

impl From<SpiMode> for Mode {
    fn from(m: SpiMode) -> Self {
        match (m.contains(SpiMode::CPOL), m.contains(SpiMode::CPHA)) {
            (false, false) => Mode::Mode0,
            (false, true) => Mode::Mode1,
            (true, false) => Mode::Mode2,
            (true, true) => Mode::Mode3,
        }
    }
}

/// The order bits are shifted out within a word.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BitOrder {
    #[default]
    MsbFirst,
    LsbFirst,
}

/// The configuration of a [`SpiDevice`].
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct SpiConfig {
    pub id: String,

    pub bus: u32,

    pub chip_select: u32,

    /// The maximum clock rate, in Hz.
    pub baud: u32,

    pub mode: Mode,

    pub bit_order: BitOrder,
}

impl SpiConfig {
    pub fn new<S: Into<String>>(id: S, bus: u32, chip_select: u32) -> Self {
        SpiConfig {
            id: id.into(),
            bus,
            chip_select,
            baud: DEFAULT_BAUD,
            mode: Mode::default(),
            bit_order: BitOrder::default(),
        }
    }

    pub fn with_baud(mut self, baud: u32) -> Self {
        self.baud = baud;
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_bit_order(mut self, bit_order: BitOrder) -> Self {
        self.bit_order = bit_order;
        self
    }

    pub fn device_path(&self) -> PathBuf {
        device_path(self.bus, self.chip_select)
    }
}

/// The settings reported by the spidev after configuration.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SpiSettings {
    pub mode: SpiMode,
    pub bits_per_word: u8,
    pub speed_hz: u32,
    pub bit_order: BitOrder,
}

/// A device on a SPI bus, accessed through spidev.
#[derive(Debug)]
pub struct SpiDevice {
    config: SpiConfig,
    settings: SpiSettings,
    f: FileDescriptor,
}

impl SpiDevice {
    /// Open the spidev and apply the config.
    ///
    /// Each setting is read back after being written, and the values the
    /// driver reports are kept as the device [`settings`].
    ///
    /// [`settings`]: SpiDevice::settings
    pub fn initialize(ctx: &Context, config: SpiConfig) -> Result<SpiDevice> {
        let path = config.device_path();
        ctx.check_access(&path, Interface::Spi)?;
        let f = FileDescriptor::open(ctx.syscalls(), &path, AccessMode::ReadWrite)
            .map_err(|e| Error::from_uapi(UapiCall::Open, e))?;
        let wr = |e| Error::from_uapi(UapiCall::SpiWriteSettings, e);
        let rd = |e| Error::from_uapi(UapiCall::SpiReadSettings, e);
        spi::write_mode(&f, config.mode.into()).map_err(wr)?;
        let mode = spi::read_mode(&f).map_err(rd)?;
        spi::write_bits_per_word(&f, BITS_PER_WORD).map_err(wr)?;
        let bits_per_word = spi::read_bits_per_word(&f).map_err(rd)?;
        spi::write_max_speed_hz(&f, config.baud).map_err(wr)?;
        let speed_hz = spi::read_max_speed_hz(&f).map_err(rd)?;
        spi::write_lsb_first(&f, config.bit_order == BitOrder::LsbFirst).map_err(wr)?;
        let bit_order = if spi::read_lsb_first(&f).map_err(rd)? {
            BitOrder::LsbFirst
        } else {
            BitOrder::MsbFirst
        };
        let settings = SpiSettings {
            mode,
            bits_per_word,
            speed_hz,
            bit_order,
        };
        tracing::info!(
            id = %config.id,
            path = %path.display(),
            ?mode,
            bits_per_word,
            speed_hz,
            ?bit_order,
            "spi device initialized"
        );
        Ok(SpiDevice {
            config,
            settings,
            f,
        })
    }

    pub fn config(&self) -> &SpiConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        self.f.path()
    }

    pub fn settings(&self) -> SpiSettings {
        self.settings
    }

    /// Perform a single transfer.
    ///
    /// Either buffer may be absent, for a write only or read only transfer.
    /// When both are present they must be the same length.
    /// Returns the number of bytes transferred.
    pub fn transfer(&self, tx: Option<&[u8]>, rx: Option<&mut [u8]>) -> Result<usize> {
        self.ensure_open()?;
        spi::message(
            &self.f,
            tx,
            rx,
            self.settings.speed_hz,
            self.settings.bits_per_word,
        )
        .map_err(|e| Error::from_uapi(UapiCall::SpiMessage, e))
    }

    /// Send `tx` and return the bytes received while sending it.
    pub fn exchange(&self, tx: &[u8]) -> Result<Vec<u8>> {
        let mut rx = vec![0u8; tx.len()];
        self.transfer(Some(tx), Some(&mut rx))?;
        Ok(rx)
    }

    pub fn write(&self, data: &[u8]) -> Result<usize> {
        self.transfer(Some(data), None)
    }

    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.transfer(None, Some(buf))
    }

    pub fn write_byte(&self, value: u8) -> Result<()> {
        self.write(&[value]).map(|_| ())
    }

    pub fn read_byte(&self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read(&mut buf)?;
        Ok(buf[0])
    }

    fn ensure_open(&self) -> Result<()> {
        if self.f.is_closed() {
            return Err(Error::Closed(self.config.id.clone()));
        }
        Ok(())
    }
}

impl Device for SpiDevice {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::Spi
    }

    fn shutdown(&self, ctx: &Context) -> Result<()> {
        ctx.registry().unregister(self.id());
        self.ensure_open()?;
        self.f
            .close()
            .map_err(|e| Error::from_uapi(UapiCall::Close, e))?;
        tracing::info!(id = %self.config.id, "spi device shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes() {
        for m in [Mode::Mode0, Mode::Mode1, Mode::Mode2, Mode::Mode3] {
            assert_eq!(Mode::from(SpiMode::from(m)), m);
        }
        assert_eq!(SpiMode::from(Mode::Mode3).bits(), 3);
        assert_eq!(Mode::from(SpiMode::CPOL | SpiMode::CS_HIGH), Mode::Mode2);
    }

    #[test]
    fn config() {
        let cfg = SpiConfig::new("adc", 0, 1);
        assert_eq!(cfg.device_path(), PathBuf::from("/dev/spidev0.1"));
        assert_eq!(cfg.baud, DEFAULT_BAUD);
        assert_eq!(cfg.mode, Mode::Mode0);
        assert_eq!(cfg.bit_order, BitOrder::MsbFirst);
        let cfg = cfg
            .with_baud(4_000_000)
            .with_mode(Mode::Mode2)
            .with_bit_order(BitOrder::LsbFirst);
        assert_eq!(cfg.baud, 4_000_000);
        assert_eq!(cfg.mode, Mode::Mode2);
        assert_eq!(cfg.bit_order, BitOrder::LsbFirst);
    }
}
