// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! An in-process simulation of the kernel side of the GPIO, I2C and SPI
//! character devices.
//!
//! Simulators are built using the [`Builder`], and implement [`Syscalls`] so
//! they can stand in for the kernel wherever `boardio` accepts a syscall
//! handle.
//!
//! Unlike a real kernel, the simulator does not require any privileges or
//! kernel modules, so tests using it can run anywhere.
//!
//! [`Builder`]: fn.builder.html

use nohash_hasher::IntMap;
use std::collections::HashSet;
use std::io;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use boardio_uapi::{AccessMode, IoctlArg, PollFlags, Request, Syscalls};

mod gpio;
pub use gpio::{Bank, Chip, Level};
use gpio::{ChipState, LineHandle};

mod i2c;
pub use i2c::{Adapter, I2cBus};
use i2c::{BusState, I2cHandle};

mod spi;
pub use spi::Spidev;
use spi::SpidevState;

/// The offset of a line on a chip.
pub type Offset = u32;

/// The first fd returned by the simulator.
const FD_BASE: RawFd = 1000;

fn errno(e: i32) -> io::Error {
    io::Error::from_raw_os_error(e)
}

/// The object behind an open fd.
enum Handle {
    Chip(usize),
    Line(LineHandle),
    I2c(I2cHandle),
    Spi(usize),
}

struct State {
    chips: Vec<ChipState>,
    buses: Vec<BusState>,
    spidevs: Vec<SpidevState>,
    handles: IntMap<RawFd, Handle>,
    next_fd: RawFd,
    denied: HashSet<PathBuf>,
    ioctls: Vec<(RawFd, u64)>,
    epoch: Instant,
}

impl State {
    fn alloc_fd(&mut self) -> RawFd {
        let fd = self.next_fd;
        self.next_fd += 1;
        fd
    }
}

struct Shared {
    state: Mutex<State>,
    changed: Condvar,
}

/// A live simulator of chips, buses and spidevs.
///
/// Clones share the one simulated kernel.
#[derive(Clone)]
pub struct Sim {
    shared: Arc<Shared>,
}

impl Sim {
    fn state(&self) -> MutexGuard<'_, State> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        self.shared.changed.notify_all();
    }

    /// The simulator as a syscall handle.
    pub fn syscalls(&self) -> Arc<dyn Syscalls> {
        Arc::new(self.clone())
    }

    /// The simulated chip `/dev/gpiochip<idx>`.
    pub fn chip(&self, idx: usize) -> Chip<'_> {
        Chip::new(self, idx)
    }

    /// The simulated bus `/dev/i2c-<number>`.
    pub fn i2c_bus(&self, number: u32) -> I2cBus<'_> {
        I2cBus::new(self, number)
    }

    /// The simulated spidev `/dev/spidev<bus>.<cs>`.
    pub fn spidev(&self, bus: u32, cs: u32) -> Spidev<'_> {
        Spidev::new(self, bus, cs)
    }

    /// Refuse to open the device file, as if permissions prevented it.
    pub fn deny(&self, path: &Path) {
        self.state().denied.insert(path.to_path_buf());
    }

    /// The number of fds currently open.
    pub fn open_fds(&self) -> usize {
        self.state().handles.len()
    }

    /// The number of times the ioctl has been issued on any fd.
    pub fn ioctl_count(&self, request: Request) -> usize {
        self.state()
            .ioctls
            .iter()
            .filter(|(_, code)| *code == request.code())
            .count()
    }
}

impl std::fmt::Debug for Sim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.state();
        f.debug_struct("Sim")
            .field("chips", &s.chips.len())
            .field("buses", &s.buses.len())
            .field("spidevs", &s.spidevs.len())
            .field("open_fds", &s.handles.len())
            .finish()
    }
}

impl Syscalls for Sim {
    fn open(&self, path: &Path, _mode: AccessMode) -> io::Result<RawFd> {
        let mut s = self.state();
        if s.denied.contains(path) {
            return Err(errno(libc::EACCES));
        }
        let handle = if let Some(idx) = s.chips.iter().position(|c| c.path == path) {
            Handle::Chip(idx)
        } else if let Some(idx) = s.buses.iter().position(|b| b.path == path) {
            Handle::I2c(I2cHandle::new(idx))
        } else if let Some(idx) = s.spidevs.iter().position(|d| d.path == path) {
            Handle::Spi(idx)
        } else {
            return Err(errno(libc::ENOENT));
        };
        let fd = s.alloc_fd();
        s.handles.insert(fd, handle);
        Ok(fd)
    }

    fn close(&self, fd: RawFd) -> io::Result<()> {
        let mut s = self.state();
        match s.handles.remove(&fd) {
            None => Err(errno(libc::EBADF)),
            Some(Handle::Line(lh)) => {
                s.chips[lh.chip].release(&lh.offsets);
                drop(s);
                self.notify();
                Ok(())
            }
            Some(_) => Ok(()),
        }
    }

    fn read(&self, fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
        let mut guard = self.state();
        let s = &mut *guard;
        match s.handles.get_mut(&fd) {
            None => Err(errno(libc::EBADF)),
            Some(Handle::Line(lh)) => lh.read(buf),
            Some(Handle::I2c(h)) => s.buses[h.bus].read(h, buf),
            Some(Handle::Spi(_)) => {
                buf.fill(0);
                Ok(buf.len())
            }
            Some(Handle::Chip(_)) => Err(errno(libc::EINVAL)),
        }
    }

    fn write(&self, fd: RawFd, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.state();
        let s = &mut *guard;
        match s.handles.get_mut(&fd) {
            None => Err(errno(libc::EBADF)),
            Some(Handle::I2c(h)) => s.buses[h.bus].write(h, buf),
            Some(Handle::Spi(idx)) => {
                s.spidevs[*idx].transfers.push(buf.to_vec());
                Ok(buf.len())
            }
            Some(_) => Err(errno(libc::EINVAL)),
        }
    }

    fn ioctl(&self, fd: RawFd, request: u64, arg: IoctlArg<'_>) -> io::Result<i32> {
        let mut guard = self.state();
        let s = &mut *guard;
        s.ioctls.push((fd, request));
        let chip = match s.handles.get_mut(&fd) {
            None => return Err(errno(libc::EBADF)),
            Some(Handle::Chip(idx)) => *idx,
            Some(Handle::Line(lh)) => return s.chips[lh.chip].line_ioctl(lh, request, arg),
            Some(Handle::I2c(h)) => return s.buses[h.bus].ioctl(h, request, arg),
            Some(Handle::Spi(idx)) => return s.spidevs[*idx].ioctl(request, arg),
        };
        // the line handle fd is returned in the request, not as the result
        let line_fd = s.next_fd;
        if let Some(lh) = s.chips[chip].chip_ioctl(chip, request, arg, line_fd)? {
            let fd = s.alloc_fd();
            s.handles.insert(fd, Handle::Line(lh));
        }
        Ok(0)
    }

    fn poll(
        &self,
        fd: RawFd,
        events: PollFlags,
        timeout: Duration,
    ) -> io::Result<Option<PollFlags>> {
        let deadline = Instant::now() + timeout;
        let mut s = self.state();
        loop {
            match s.handles.get(&fd) {
                None => return Ok(Some(PollFlags::NVAL)),
                Some(Handle::Line(lh)) => {
                    if lh.failed {
                        return Ok(Some(PollFlags::ERR));
                    }
                    if !lh.events.is_empty() {
                        return Ok(Some(events & PollFlags::IN));
                    }
                }
                Some(_) => return Ok(Some(events & (PollFlags::IN | PollFlags::OUT))),
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            s = self
                .shared
                .changed
                .wait_timeout(s, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

/// Start building a simulator.
pub fn builder() -> Builder {
    Builder::default()
}

/// Build a sim with a single chip, `/dev/gpiochip0`.
///
/// This is sufficient for tests that do not require named lines, hogged
/// lines, multiple chips, or any buses.
pub fn simpleton(num_lines: u32) -> Sim {
    builder()
        .with_bank(&Bank::new(num_lines, "simpleton"))
        .live()
}

/// A builder of simulators.
///
/// Collects the configuration for the simulator, and then creates
/// the simulator when taken live.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Builder {
    /// The banks to be simulated.
    ///
    /// Each bank becomes a chip, numbered in order, when the simulator goes live.
    pub banks: Vec<Bank>,

    /// The I2C adapters to be simulated.
    pub adapters: Vec<Adapter>,

    /// The bus and chip select of the spidevs to be simulated.
    pub spidevs: Vec<(u32, u32)>,
}

impl Builder {
    pub fn with_bank(&mut self, bank: &Bank) -> &mut Self {
        self.banks.push(bank.clone());
        self
    }

    pub fn with_adapter(&mut self, adapter: &Adapter) -> &mut Self {
        self.adapters.push(adapter.clone());
        self
    }

    pub fn with_spidev(&mut self, bus: u32, cs: u32) -> &mut Self {
        self.spidevs.push((bus, cs));
        self
    }

    /// Take the builder config live and return the created simulator.
    pub fn live(&mut self) -> Sim {
        let state = State {
            chips: self
                .banks
                .iter()
                .enumerate()
                .map(|(idx, b)| ChipState::new(idx, b))
                .collect(),
            buses: self.adapters.iter().map(BusState::new).collect(),
            spidevs: self
                .spidevs
                .iter()
                .map(|(bus, cs)| SpidevState::new(*bus, *cs))
                .collect(),
            handles: IntMap::default(),
            next_fd: FD_BASE,
            denied: HashSet::new(),
            ioctls: Vec::new(),
            epoch: Instant::now(),
        };
        Sim {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                changed: Condvar::new(),
            }),
        }
    }
}

/// Errors returned by the simulator controls.
#[derive(Clone, Debug, thiserror::Error, Eq, PartialEq)]
pub enum Error {
    /// The chip is not simulated.
    #[error("chip {0} is not simulated")]
    UnknownChip(usize),

    /// The offset is beyond the lines of the chip.
    #[error("offset {0} is out of range")]
    InvalidOffset(Offset),

    /// The bus is not simulated.
    #[error("i2c bus {0} is not simulated")]
    UnknownBus(u32),

    /// No target device at the address.
    #[error("no device at address {0:#04x}")]
    NoDevice(u16),

    /// The spidev is not simulated.
    #[error("spidev {0}.{1} is not simulated")]
    UnknownSpidev(u32, u32),
}

/// The result returned by the simulator controls.
pub type Result<T> = std::result::Result<T, Error>;
