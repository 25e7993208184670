// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::io;
use std::path::PathBuf;

use crate::layout::LayoutError;

/// The result returned by [`boardio_uapi`] functions.
///
/// [`boardio_uapi`]: crate
pub type Result<T> = std::result::Result<T, Error>;

/// Result returned by struct validators.
pub type ValidationResult = std::result::Result<(), ValidationError>;

/// Errors returned by [`boardio_uapi`] functions.
///
/// [`boardio_uapi`]: crate
#[derive(Clone, Debug, thiserror::Error, Eq, PartialEq)]
pub enum Error {
    /// An error returned from an underlying system call.
    #[error("{call}({args}) failed: {message} (errno {errno})")]
    Os {
        call: &'static str,
        args: String,
        errno: i32,
        message: String,
    },

    /// The device file does not exist.
    #[error("device \"{}\" not found", .0.display())]
    DeviceNotFound(PathBuf),

    /// The device file exists but may not be opened by this process.
    #[error("permission denied opening \"{}\"", .0.display())]
    PermissionDenied(PathBuf),

    /// The file descriptor has already been closed.
    #[error("\"{}\" is closed", .0.display())]
    Closed(PathBuf),

    /// An argument cannot be represented in the kernel struct.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl Error {
    /// Wrap the failure of a system call.
    pub fn os(err: &io::Error, call: &'static str, args: String) -> Error {
        let errno = err.raw_os_error().unwrap_or(0);
        let message = if errno != 0 {
            nix::errno::Errno::from_raw(errno).desc().to_string()
        } else {
            err.to_string()
        };
        Error::Os {
            call,
            args,
            errno,
            message,
        }
    }

    /// The errno of a failed system call.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Error::Os { errno, .. } => Some(*errno),
            _ => None,
        }
    }
}

/// A failure to validate a struct returned from a system call.
//
// Should only be seen if a kernel update adds an enum value we are unaware of.
#[derive(Clone, Debug, thiserror::Error, Eq, PartialEq)]
#[error("Kernel returned invalid {field}: {msg}")]
pub struct ValidationError {
    pub field: String,
    pub msg: String,
}

impl ValidationError {
    pub fn new<S: Into<String>, T: Into<String>>(field: S, msg: T) -> ValidationError {
        ValidationError {
            field: field.into(),
            msg: msg.into(),
        }
    }
}

/// The maximum number of bytes stored in a kernel name or label.
pub const NAME_MAX: usize = 32;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_error_display() {
        let err = Error::os(
            &io::Error::from_raw_os_error(libc::EBUSY),
            "ioctl",
            "fd=3, GPIO_V2_GET_LINE_IOCTL".to_string(),
        );
        assert_eq!(err.errno(), Some(libc::EBUSY));
        assert_eq!(
            err.to_string(),
            "ioctl(fd=3, GPIO_V2_GET_LINE_IOCTL) failed: Device or resource busy (errno 16)"
        );
    }

    #[test]
    fn os_error_without_errno() {
        let err = Error::os(
            &io::Error::new(io::ErrorKind::InvalidInput, "nul byte in path"),
            "open",
            "\"/dev/x\"".to_string(),
        );
        assert_eq!(err.errno(), Some(0));
        assert!(err.to_string().contains("nul byte in path"));
    }

    #[test]
    fn validation_error_display() {
        let err = ValidationError::new("id", "invalid value: 7");
        assert_eq!(err.to_string(), "Kernel returned invalid id: invalid value: 7");
        assert_eq!(Error::from(err).errno(), None);
    }
}
