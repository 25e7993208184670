// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The system calls used to drive the character devices.
//!
//! All kernel access goes through the [`Syscalls`] trait so that devices can
//! be driven by a simulated kernel in tests.

use bitflags::bitflags;
use std::ffi::CString;
use std::fmt;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::RawFd;
use std::path::Path;
use std::time::Duration;

/// How a device file is opened.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl AccessMode {
    fn flags(self) -> libc::c_int {
        match self {
            AccessMode::ReadOnly => libc::O_RDONLY,
            AccessMode::WriteOnly => libc::O_WRONLY,
            AccessMode::ReadWrite => libc::O_RDWR,
        }
    }
}

bitflags! {
    /// Events requested from, and returned by, poll.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct PollFlags: i16 {
        /// Data is available to read.
        const IN = libc::POLLIN;
        const PRI = libc::POLLPRI;
        const OUT = libc::POLLOUT;
        /// An error condition on the file.
        const ERR = libc::POLLERR;
        /// The other end has hung up.
        const HUP = libc::POLLHUP;
        /// The file descriptor is not open.
        const NVAL = libc::POLLNVAL;
    }
}

/// The third argument of an ioctl.
pub enum IoctlArg<'a> {
    /// The address of a buffer holding a marshalled kernel struct.
    ///
    /// The kernel may update the buffer.
    Pointer(&'a mut [u8]),
    /// An integer passed by value.
    Value(u64),
}

impl fmt::Debug for IoctlArg<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoctlArg::Pointer(buf) => write!(f, "&[u8; {}]", buf.len()),
            IoctlArg::Value(v) => write!(f, "{v:#x}"),
        }
    }
}

/// The kernel interface used by the crate.
///
/// Failures are returned as [`io::Error`]s carrying the OS errno.
pub trait Syscalls: Send + Sync {
    fn open(&self, path: &Path, mode: AccessMode) -> io::Result<RawFd>;

    fn close(&self, fd: RawFd) -> io::Result<()>;

    fn read(&self, fd: RawFd, buf: &mut [u8]) -> io::Result<usize>;

    fn write(&self, fd: RawFd, buf: &[u8]) -> io::Result<usize>;

    /// Issue the ioctl and return its non-negative result.
    fn ioctl(&self, fd: RawFd, request: u64, arg: IoctlArg<'_>) -> io::Result<i32>;

    /// Wait for any of the events on the file.
    ///
    /// Returns `None` if the timeout expires first.
    fn poll(&self, fd: RawFd, events: PollFlags, timeout: Duration)
        -> io::Result<Option<PollFlags>>;
}

/// The [`Syscalls`] of the running Linux kernel.
#[derive(Clone, Copy, Debug, Default)]
pub struct Linux;

impl Syscalls for Linux {
    fn open(&self, path: &Path, mode: AccessMode) -> io::Result<RawFd> {
        let cpath = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        // SAFETY: cpath is a valid NUL terminated string for the duration of the call.
        match unsafe { libc::open(cpath.as_ptr(), mode.flags() | libc::O_CLOEXEC) } {
            -1 => Err(io::Error::last_os_error()),
            fd => Ok(fd),
        }
    }

    fn close(&self, fd: RawFd) -> io::Result<()> {
        // SAFETY: closing an fd has no memory safety implications.
        match unsafe { libc::close(fd) } {
            -1 => Err(io::Error::last_os_error()),
            _ => Ok(()),
        }
    }

    fn read(&self, fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
        // SAFETY: the kernel writes at most buf.len() bytes into buf.
        match unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) } {
            -1 => Err(io::Error::last_os_error()),
            n => Ok(n as usize),
        }
    }

    fn write(&self, fd: RawFd, buf: &[u8]) -> io::Result<usize> {
        // SAFETY: the kernel reads at most buf.len() bytes from buf.
        match unsafe { libc::write(fd, buf.as_ptr().cast(), buf.len()) } {
            -1 => Err(io::Error::last_os_error()),
            n => Ok(n as usize),
        }
    }

    fn ioctl(&self, fd: RawFd, request: u64, arg: IoctlArg<'_>) -> io::Result<i32> {
        // SAFETY: pointer arguments reference a buffer sized for the request,
        // and any addresses embedded in the buffer are kept alive by the caller.
        let rc = unsafe {
            match arg {
                IoctlArg::Pointer(buf) => libc::ioctl(fd, request as _, buf.as_mut_ptr()),
                IoctlArg::Value(v) => libc::ioctl(fd, request as _, v as libc::c_ulong),
            }
        };
        match rc {
            -1 => Err(io::Error::last_os_error()),
            rc => Ok(rc),
        }
    }

    fn poll(
        &self,
        fd: RawFd,
        events: PollFlags,
        timeout: Duration,
    ) -> io::Result<Option<PollFlags>> {
        let mut pfd = libc::pollfd {
            fd,
            events: events.bits(),
            revents: 0,
        };
        let timeout = libc::timespec {
            tv_sec: timeout.as_secs() as _,
            tv_nsec: timeout.subsec_nanos() as _,
        };
        // SAFETY: pfd and timeout outlive the call and the signal mask is unused.
        match unsafe {
            libc::ppoll(
                std::ptr::addr_of_mut!(pfd),
                1,
                std::ptr::addr_of!(timeout),
                std::ptr::null(),
            )
        } {
            -1 => {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    return Ok(None);
                }
                Err(err)
            }
            0 => Ok(None),
            _ => Ok(Some(PollFlags::from_bits_truncate(pfd.revents))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::io::AsRawFd;

    #[test]
    fn open_missing() {
        let err = Linux
            .open(Path::new("/dev/boardio-does-not-exist"), AccessMode::ReadOnly)
            .unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
    }

    #[test]
    fn open_read_close() {
        let fd = Linux
            .open(Path::new("/dev/zero"), AccessMode::ReadOnly)
            .unwrap();
        let mut buf = [0xa5u8; 8];
        assert_eq!(Linux.read(fd, &mut buf).unwrap(), 8);
        assert_eq!(buf, [0; 8]);
        Linux.close(fd).unwrap();
    }

    #[test]
    fn poll_ready() {
        let f = std::fs::File::open("/dev/zero").unwrap();
        let revents = Linux
            .poll(f.as_raw_fd(), PollFlags::IN, Duration::from_millis(10))
            .unwrap();
        assert_eq!(revents, Some(PollFlags::IN));
    }

    #[test]
    fn ioctl_unsupported() {
        let f = std::fs::File::open("/dev/zero").unwrap();
        let mut buf = [0u8; 4];
        let err = Linux
            .ioctl(f.as_raw_fd(), 0x8004_b401, IoctlArg::Pointer(&mut buf))
            .unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENOTTY));
    }

    #[test]
    fn ioctl_arg_debug() {
        let mut buf = [0u8; 16];
        assert_eq!(format!("{:?}", IoctlArg::Pointer(&mut buf)), "&[u8; 16]");
        assert_eq!(format!("{:?}", IoctlArg::Value(0x42)), "0x42");
    }
}
