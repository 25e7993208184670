// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::path::PathBuf;

pub use boardio_uapi::gpio::Offset;

mod chip;
pub use self::chip::{chips, path_compare, Bias, Chip, ChipInfo, Direction, LineInfo};

mod config;
pub use self::config::{
    Batching, DigitalInputConfig, DigitalOutputConfig, EdgeDetection, Pull, DEFAULT_POLL_TIMEOUT,
};

mod input;
pub use self::input::DigitalInput;

mod line;
pub use self::line::consumer_label;

mod output;
pub use self::output::DigitalOutput;

mod watcher;
pub use self::watcher::{ListenerId, StateChange, WatcherStatus};

/// The path of the GPIO character device with the given number.
pub fn chip_path(chip: u32) -> PathBuf {
    PathBuf::from(format!("/dev/gpiochip{chip}"))
}
