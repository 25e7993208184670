// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::fmt;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::layout::NativeStruct;
use crate::sys::{AccessMode, IoctlArg, PollFlags, Syscalls};
use crate::{Error, Result};

/// An ioctl request code and the name it is reported by.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Request {
    name: &'static str,
    code: u64,
}

impl Request {
    pub const fn new(name: &'static str, code: u64) -> Request {
        Request { name, code }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn code(&self) -> u64 {
        self.code
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// An open file on a character device.
///
/// The descriptor is closed exactly once, either by [`close`] or on drop.
/// Any operation on a closed descriptor fails with [`Error::Closed`].
///
/// [`close`]: FileDescriptor::close
pub struct FileDescriptor {
    fd: RawFd,
    path: PathBuf,
    sys: Arc<dyn Syscalls>,
    closed: AtomicBool,
}

impl FileDescriptor {
    /// Open the device file at `path`.
    pub fn open<P: AsRef<Path>>(
        sys: Arc<dyn Syscalls>,
        path: P,
        mode: AccessMode,
    ) -> Result<FileDescriptor> {
        let path = path.as_ref();
        match sys.open(path, mode) {
            Ok(fd) => {
                tracing::trace!(path = %path.display(), fd, ?mode, "opened");
                Ok(FileDescriptor {
                    fd,
                    path: path.to_path_buf(),
                    sys,
                    closed: AtomicBool::new(false),
                })
            }
            Err(e) => match e.raw_os_error() {
                Some(libc::ENOENT) | Some(libc::ENODEV) => {
                    Err(Error::DeviceNotFound(path.to_path_buf()))
                }
                Some(libc::EACCES) | Some(libc::EPERM) => {
                    Err(Error::PermissionDenied(path.to_path_buf()))
                }
                _ => Err(Error::os(&e, "open", format!("\"{}\", {mode:?}", path.display()))),
            },
        }
    }

    /// Take ownership of an fd returned by the kernel, such as a line handle.
    pub fn adopt<P: Into<PathBuf>>(&self, fd: RawFd, path: P) -> FileDescriptor {
        FileDescriptor {
            fd,
            path: path.into(),
            sys: self.sys.clone(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The raw fd, if still open.
    pub fn raw_fd(&self) -> Result<RawFd> {
        if self.is_closed() {
            return Err(Error::Closed(self.path.clone()));
        }
        Ok(self.fd)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let fd = self.raw_fd()?;
        let n = self
            .sys
            .read(fd, buf)
            .map_err(|e| Error::os(&e, "read", format!("fd={fd}, len={}", buf.len())))?;
        tracing::trace!(fd, n, "read");
        Ok(n)
    }

    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        let fd = self.raw_fd()?;
        let n = self
            .sys
            .write(fd, buf)
            .map_err(|e| Error::os(&e, "write", format!("fd={fd}, len={}", buf.len())))?;
        tracing::trace!(fd, n, "write");
        Ok(n)
    }

    /// Issue an ioctl that takes a pointer to a kernel struct.
    ///
    /// The argument is marshalled into a native buffer which, after the
    /// kernel has updated it, is unmarshalled into the returned value.
    pub fn ioctl<T: NativeStruct + fmt::Debug>(&self, request: Request, arg: &T) -> Result<T> {
        let fd = self.raw_fd()?;
        let mut buf = arg.to_vec()?;
        tracing::trace!(fd, %request, ?arg, "ioctl");
        self.sys
            .ioctl(fd, request.code(), IoctlArg::Pointer(&mut buf))
            .map_err(|e| Error::os(&e, "ioctl", format!("fd={fd}, {request}, {arg:?}")))?;
        T::from_bytes(&buf)
    }

    /// Issue an ioctl that takes an integer argument.
    pub fn ioctl_value(&self, request: Request, value: u64) -> Result<i32> {
        let fd = self.raw_fd()?;
        tracing::trace!(fd, %request, value, "ioctl");
        self.sys
            .ioctl(fd, request.code(), IoctlArg::Value(value))
            .map_err(|e| Error::os(&e, "ioctl", format!("fd={fd}, {request}, {value:#x}")))
    }

    /// Wait for any of the events, returning `None` on timeout.
    pub fn poll(&self, events: PollFlags, timeout: Duration) -> Result<Option<PollFlags>> {
        let fd = self.raw_fd()?;
        self.sys.poll(fd, events, timeout).map_err(|e| {
            Error::os(
                &e,
                "poll",
                format!("fd={fd}, {events:?}, {}ms", timeout.as_millis()),
            )
        })
    }

    /// Close the file.
    ///
    /// Fails with [`Error::Closed`] if already closed.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(Error::Closed(self.path.clone()));
        }
        tracing::trace!(path = %self.path.display(), fd = self.fd, "close");
        self.sys
            .close(self.fd)
            .map_err(|e| Error::os(&e, "close", format!("fd={}", self.fd)))
    }
}

impl Drop for FileDescriptor {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let _ = self.sys.close(self.fd);
        }
    }
}

impl fmt::Debug for FileDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileDescriptor")
            .field("fd", &self.fd)
            .field("path", &self.path)
            .field("closed", &self.is_closed())
            .finish()
    }
}
