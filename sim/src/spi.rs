// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::io;
use std::path::PathBuf;

use boardio_uapi::spi::{
    SpiMode, Transfer, MESSAGE_1, RD_BITS_PER_WORD, RD_LSB_FIRST, RD_MAX_SPEED_HZ, RD_MODE,
    WR_BITS_PER_WORD, WR_LSB_FIRST, WR_MAX_SPEED_HZ, WR_MODE,
};
use boardio_uapi::{IoctlArg, NativeStruct};

use super::{errno, Error, Result, Sim};

const DEFAULT_SPEED_HZ: u32 = 500_000;

#[derive(Debug)]
pub(crate) struct SpidevState {
    pub path: PathBuf,
    bus: u32,
    cs: u32,
    mode: SpiMode,
    lsb_first: bool,
    bits_per_word: u8,
    speed_hz: u32,
    /// The data sent by each transfer or write, in order.
    pub transfers: Vec<Vec<u8>>,
}

impl SpidevState {
    pub fn new(bus: u32, cs: u32) -> SpidevState {
        SpidevState {
            path: PathBuf::from(format!("/dev/spidev{bus}.{cs}")),
            bus,
            cs,
            mode: SpiMode::empty(),
            lsb_first: false,
            bits_per_word: 8,
            speed_hz: DEFAULT_SPEED_HZ,
            transfers: Vec::new(),
        }
    }

    pub fn ioctl(&mut self, request: u64, arg: IoctlArg<'_>) -> io::Result<i32> {
        let buf = match arg {
            IoctlArg::Pointer(buf) => buf,
            IoctlArg::Value(_) => return Err(errno(libc::EFAULT)),
        };
        let einval = |_| errno(libc::EINVAL);
        match request {
            r if r == RD_MODE.code() => self.mode.bits().to_bytes(buf).map_err(einval)?,
            r if r == WR_MODE.code() => {
                self.mode = SpiMode::from_bits_retain(u8::from_bytes(buf).map_err(einval)?)
            }
            r if r == RD_LSB_FIRST.code() => (self.lsb_first as u8).to_bytes(buf).map_err(einval)?,
            r if r == WR_LSB_FIRST.code() => {
                self.lsb_first = u8::from_bytes(buf).map_err(einval)? != 0
            }
            r if r == RD_BITS_PER_WORD.code() => {
                self.bits_per_word.to_bytes(buf).map_err(einval)?
            }
            r if r == WR_BITS_PER_WORD.code() => {
                self.bits_per_word = match u8::from_bytes(buf).map_err(einval)? {
                    0 => 8,
                    bits if bits > 32 => return Err(errno(libc::EINVAL)),
                    bits => bits,
                }
            }
            r if r == RD_MAX_SPEED_HZ.code() => self.speed_hz.to_bytes(buf).map_err(einval)?,
            r if r == WR_MAX_SPEED_HZ.code() => {
                self.speed_hz = u32::from_bytes(buf).map_err(einval)?
            }
            r if r == MESSAGE_1.code() => return self.message(buf),
            _ => return Err(errno(libc::ENOTTY)),
        }
        Ok(0)
    }

    /// Loop the transmitted data back to the receive buffer.
    fn message(&mut self, buf: &[u8]) -> io::Result<i32> {
        let xfer = Transfer::from_bytes(buf).map_err(|_| errno(libc::EINVAL))?;
        let len = xfer.len as usize;
        let tx = if xfer.tx_buf == 0 {
            vec![0u8; len]
        } else {
            // SAFETY: the caller owns len bytes at tx_buf for the duration
            // of the ioctl.
            unsafe { std::slice::from_raw_parts(xfer.tx_buf as usize as *const u8, len) }.to_vec()
        };
        if xfer.rx_buf != 0 {
            // SAFETY: as above, for the receive buffer.
            let rx =
                unsafe { std::slice::from_raw_parts_mut(xfer.rx_buf as usize as *mut u8, len) };
            rx.copy_from_slice(&tx);
        }
        self.transfers.push(tx);
        Ok(len as i32)
    }
}

/// A live simulated spidev.
///
/// The device loops back whatever it is sent.
#[derive(Debug)]
pub struct Spidev<'a> {
    sim: &'a Sim,
    bus: u32,
    cs: u32,
}

impl<'a> Spidev<'a> {
    pub(crate) fn new(sim: &'a Sim, bus: u32, cs: u32) -> Spidev<'a> {
        Spidev { sim, bus, cs }
    }

    pub fn dev_path(&self) -> PathBuf {
        PathBuf::from(format!("/dev/spidev{}.{}", self.bus, self.cs))
    }

    fn with_dev<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&SpidevState) -> T,
    {
        let s = self.sim.state();
        let dev = s
            .spidevs
            .iter()
            .find(|d| d.bus == self.bus && d.cs == self.cs)
            .ok_or(Error::UnknownSpidev(self.bus, self.cs))?;
        Ok(f(dev))
    }

    pub fn mode(&self) -> Result<SpiMode> {
        self.with_dev(|d| d.mode)
    }

    pub fn lsb_first(&self) -> Result<bool> {
        self.with_dev(|d| d.lsb_first)
    }

    pub fn bits_per_word(&self) -> Result<u8> {
        self.with_dev(|d| d.bits_per_word)
    }

    pub fn speed_hz(&self) -> Result<u32> {
        self.with_dev(|d| d.speed_hz)
    }

    /// The data sent to the device, one entry per transfer or write.
    pub fn transfers(&self) -> Result<Vec<Vec<u8>>> {
        self.with_dev(|d| d.transfers.clone())
    }
}

#[cfg(test)]
mod tests {
    use crate::builder;
    use boardio_uapi::spi::{self, SpiMode};
    use boardio_uapi::{AccessMode, FileDescriptor};

    fn spidev() -> (crate::Sim, FileDescriptor) {
        let s = builder().with_spidev(0, 0).live();
        let sf =
            FileDescriptor::open(s.syscalls(), "/dev/spidev0.0", AccessMode::ReadWrite).unwrap();
        (s, sf)
    }

    #[test]
    fn settings() {
        let (s, sf) = spidev();
        assert_eq!(spi::read_max_speed_hz(&sf).unwrap(), 500_000);
        spi::write_mode(&sf, SpiMode::CPOL | SpiMode::CPHA).unwrap();
        spi::write_bits_per_word(&sf, 0).unwrap();
        spi::write_max_speed_hz(&sf, 1_000_000).unwrap();
        spi::write_lsb_first(&sf, true).unwrap();
        let dev = s.spidev(0, 0);
        assert_eq!(dev.mode().unwrap(), SpiMode::CPOL | SpiMode::CPHA);
        assert_eq!(dev.bits_per_word().unwrap(), 8);
        assert_eq!(dev.speed_hz().unwrap(), 1_000_000);
        assert!(dev.lsb_first().unwrap());
        assert_eq!(spi::read_mode(&sf).unwrap(), SpiMode::CPOL | SpiMode::CPHA);
        assert!(spi::read_lsb_first(&sf).unwrap());
    }

    #[test]
    fn loopback() {
        let (s, sf) = spidev();
        let mut rx = [0u8; 3];
        assert_eq!(
            spi::message(&sf, Some(&[1, 2, 3]), Some(&mut rx), 0, 0).unwrap(),
            3
        );
        assert_eq!(rx, [1, 2, 3]);
        spi::message(&sf, None, Some(&mut rx), 0, 0).unwrap();
        assert_eq!(rx, [0, 0, 0]);
        assert_eq!(
            s.spidev(0, 0).transfers().unwrap(),
            vec![vec![1, 2, 3], vec![0, 0, 0]]
        );
    }

    #[test]
    fn unknown_spidev() {
        let s = builder().live();
        assert!(s.spidev(1, 0).mode().is_err());
    }
}
