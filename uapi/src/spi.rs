// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use bitflags::bitflags;
use std::sync::OnceLock;

use crate::fd::{FileDescriptor, Request};
use crate::layout::{Decoder, Encoder, Kind, Layout, NativeStruct};
use crate::{Error, Result};

const SPI_IOC_MAGIC: u8 = b'k';

pub const RD_MODE: Request = Request::new(
    "SPI_IOC_RD_MODE",
    nix::request_code_read!(SPI_IOC_MAGIC, 1, 1) as u64,
);
pub const WR_MODE: Request = Request::new(
    "SPI_IOC_WR_MODE",
    nix::request_code_write!(SPI_IOC_MAGIC, 1, 1) as u64,
);
pub const RD_LSB_FIRST: Request = Request::new(
    "SPI_IOC_RD_LSB_FIRST",
    nix::request_code_read!(SPI_IOC_MAGIC, 2, 1) as u64,
);
pub const WR_LSB_FIRST: Request = Request::new(
    "SPI_IOC_WR_LSB_FIRST",
    nix::request_code_write!(SPI_IOC_MAGIC, 2, 1) as u64,
);
pub const RD_BITS_PER_WORD: Request = Request::new(
    "SPI_IOC_RD_BITS_PER_WORD",
    nix::request_code_read!(SPI_IOC_MAGIC, 3, 1) as u64,
);
pub const WR_BITS_PER_WORD: Request = Request::new(
    "SPI_IOC_WR_BITS_PER_WORD",
    nix::request_code_write!(SPI_IOC_MAGIC, 3, 1) as u64,
);
pub const RD_MAX_SPEED_HZ: Request = Request::new(
    "SPI_IOC_RD_MAX_SPEED_HZ",
    nix::request_code_read!(SPI_IOC_MAGIC, 4, 4) as u64,
);
pub const WR_MAX_SPEED_HZ: Request = Request::new(
    "SPI_IOC_WR_MAX_SPEED_HZ",
    nix::request_code_write!(SPI_IOC_MAGIC, 4, 4) as u64,
);
/// A single transfer, `SPI_IOC_MESSAGE(1)`.
pub const MESSAGE_1: Request = Request::new(
    "SPI_IOC_MESSAGE(1)",
    nix::request_code_write!(SPI_IOC_MAGIC, 0, Transfer::SIZE) as u64,
);

bitflags! {
    /// The mode byte of a spidev.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct SpiMode: u8 {
        /// Sample on the trailing clock edge.
        const CPHA = 0x01;
        /// The clock idles high.
        const CPOL = 0x02;
        /// Chip select is active high.
        const CS_HIGH = 0x04;
        const LSB_FIRST = 0x08;
        /// Shared SI/SO signal.
        const THREE_WIRE = 0x10;
        const LOOP = 0x20;
        const NO_CS = 0x40;
        const READY = 0x80;
    }
}

/// The kernel `spi_ioc_transfer`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Transfer {
    /// The address of the transmit buffer, or 0 to send zeros.
    pub tx_buf: u64,
    /// The address of the receive buffer, or 0 to discard.
    pub rx_buf: u64,
    pub len: u32,
    /// Overrides the device speed for this transfer, if non-zero.
    pub speed_hz: u32,
    pub delay_usecs: u16,
    /// Overrides the device word size for this transfer, if non-zero.
    pub bits_per_word: u8,
    pub cs_change: u8,
    pub tx_nbits: u8,
    pub rx_nbits: u8,
    pub word_delay_usecs: u8,
}

impl Transfer {
    pub const SIZE: usize = 32;
}

impl NativeStruct for Transfer {
    fn layout() -> &'static Layout {
        static LAYOUT: OnceLock<Layout> = OnceLock::new();
        LAYOUT.get_or_init(|| {
            Layout::builder("spi_ioc_transfer")
                .field("tx_buf", Kind::U64)
                .field("rx_buf", Kind::U64)
                .field("len", Kind::U32)
                .field("speed_hz", Kind::U32)
                .field("delay_usecs", Kind::U16)
                .field("bits_per_word", Kind::U8)
                .field("cs_change", Kind::U8)
                .field("tx_nbits", Kind::U8)
                .field("rx_nbits", Kind::U8)
                .field("word_delay_usecs", Kind::U8)
                .padding("pad", 1)
                .build()
        })
    }

    fn from_bytes(buf: &[u8]) -> Result<Self> {
        let d = Decoder::new(Self::layout(), buf)?;
        Ok(Transfer {
            tx_buf: d.get("tx_buf")?,
            rx_buf: d.get("rx_buf")?,
            len: d.get("len")?,
            speed_hz: d.get("speed_hz")?,
            delay_usecs: d.get("delay_usecs")?,
            bits_per_word: d.get("bits_per_word")?,
            cs_change: d.get("cs_change")?,
            tx_nbits: d.get("tx_nbits")?,
            rx_nbits: d.get("rx_nbits")?,
            word_delay_usecs: d.get("word_delay_usecs")?,
        })
    }

    fn to_bytes(&self, buf: &mut [u8]) -> Result<()> {
        let mut e = Encoder::new(Self::layout(), buf)?;
        e.put("tx_buf", self.tx_buf)?;
        e.put("rx_buf", self.rx_buf)?;
        e.put("len", self.len)?;
        e.put("speed_hz", self.speed_hz)?;
        e.put("delay_usecs", self.delay_usecs)?;
        e.put("bits_per_word", self.bits_per_word)?;
        e.put("cs_change", self.cs_change)?;
        e.put("tx_nbits", self.tx_nbits)?;
        e.put("rx_nbits", self.rx_nbits)?;
        e.put("word_delay_usecs", self.word_delay_usecs)?;
        Ok(())
    }
}

pub fn write_mode(sf: &FileDescriptor, mode: SpiMode) -> Result<()> {
    sf.ioctl(WR_MODE, &mode.bits())?;
    Ok(())
}

pub fn read_mode(sf: &FileDescriptor) -> Result<SpiMode> {
    Ok(SpiMode::from_bits_retain(sf.ioctl(RD_MODE, &0u8)?))
}

pub fn write_lsb_first(sf: &FileDescriptor, lsb_first: bool) -> Result<()> {
    sf.ioctl(WR_LSB_FIRST, &(lsb_first as u8))?;
    Ok(())
}

pub fn read_lsb_first(sf: &FileDescriptor) -> Result<bool> {
    Ok(sf.ioctl(RD_LSB_FIRST, &0u8)? != 0)
}

pub fn write_bits_per_word(sf: &FileDescriptor, bits: u8) -> Result<()> {
    sf.ioctl(WR_BITS_PER_WORD, &bits)?;
    Ok(())
}

pub fn read_bits_per_word(sf: &FileDescriptor) -> Result<u8> {
    sf.ioctl(RD_BITS_PER_WORD, &0u8)
}

pub fn write_max_speed_hz(sf: &FileDescriptor, speed_hz: u32) -> Result<()> {
    sf.ioctl(WR_MAX_SPEED_HZ, &speed_hz)?;
    Ok(())
}

pub fn read_max_speed_hz(sf: &FileDescriptor) -> Result<u32> {
    sf.ioctl(RD_MAX_SPEED_HZ, &0u32)
}

/// Perform a single full duplex transfer.
///
/// Both buffers, if provided, must be the same length. The transmit data is
/// copied to a buffer owned by the call, and received data is copied back
/// into `rx` once the kernel has filled the call's receive buffer.
///
/// Returns the number of bytes transferred.
pub fn message(
    sf: &FileDescriptor,
    tx: Option<&[u8]>,
    rx: Option<&mut [u8]>,
    speed_hz: u32,
    bits_per_word: u8,
) -> Result<usize> {
    let len = match (&tx, &rx) {
        (Some(t), Some(r)) if t.len() != r.len() => {
            return Err(Error::InvalidArgument(format!(
                "transmit length {} does not match receive length {}",
                t.len(),
                r.len()
            )))
        }
        (Some(t), _) => t.len(),
        (None, Some(r)) => r.len(),
        (None, None) => return Ok(0),
    };
    let len32 = u32::try_from(len)
        .map_err(|_| Error::InvalidArgument(format!("transfer of {len} bytes")))?;
    let mut txb = tx.map(<[u8]>::to_vec);
    let mut rxb = rx.as_ref().map(|r| vec![0u8; r.len()]);
    let xfer = Transfer {
        tx_buf: txb.as_mut().map_or(0, |b| b.as_mut_ptr() as u64),
        rx_buf: rxb.as_mut().map_or(0, |b| b.as_mut_ptr() as u64),
        len: len32,
        speed_hz,
        bits_per_word,
        ..Default::default()
    };
    sf.ioctl(MESSAGE_1, &xfer)?;
    if let (Some(rx), Some(rxb)) = (rx, rxb) {
        rx.copy_from_slice(&rxb);
    }
    Ok(len)
}
