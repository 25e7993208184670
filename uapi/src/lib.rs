// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A thin but safe Rust layer around the Linux GPIO, I2C and SPI
//! character device uAPIs.
//!
//! Kernel structs are marshalled through byte-exact [`layout`]s rather than
//! `#[repr(C)]` types, and all kernel access goes through the [`Syscalls`]
//! trait.

pub(crate) mod common;
pub use common::{Error, Result, ValidationError, ValidationResult, NAME_MAX};

mod fd;
pub use fd::{FileDescriptor, Request};

pub mod layout;
pub use layout::{LayoutError, NativeStruct};

mod sys;
pub use sys::{AccessMode, IoctlArg, Linux, PollFlags, Syscalls};

pub mod gpio;

/// The i2c-dev interface, including SMBus transactions.
pub mod i2c;

/// The spidev interface.
pub mod spi;
