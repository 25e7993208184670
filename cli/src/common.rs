// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use anyhow::{bail, Context as _, Result};
use boardio::gpio::{chip_path, Chip, Offset, Pull};
use boardio::Context;
use clap::ValueEnum;
use std::path::Path;
use std::time::Duration;

pub fn emit_error(verbose: bool, e: &anyhow::Error) {
    if verbose {
        eprintln!("{e:#}");
    } else {
        eprintln!("{e}");
    }
}

/// The number of a GPIO chip identified by number, name, or path.
///
/// e.g. "0", "gpiochip0" and "/dev/gpiochip0" all identify chip 0.
pub fn chip_number(id: &str) -> Result<u32> {
    let name = Path::new(id)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(id);
    let num = name.strip_prefix("gpiochip").unwrap_or(name);
    num.parse::<u32>()
        .with_context(|| format!("cannot find GPIO chip character device '{id}'"))
}

/// Open the chip identified by number, name, or path.
pub fn open_chip(ctx: &Context, id: &str) -> Result<Chip> {
    let path = chip_path(chip_number(id)?);
    Chip::from_path(ctx, &path).with_context(|| format!("unable to open chip '{}'", path.display()))
}

/// The offset of a line identified by offset or name.
///
/// Names are only searched for if the id does not parse as an offset.
pub fn resolve_line(chip: &Chip, id: &str) -> Result<Offset> {
    if let Ok(offset) = id.parse::<Offset>() {
        return Ok(offset);
    }
    match chip.find_line_info(id)? {
        Some(li) => Ok(li.offset),
        None => bail!("cannot find line '{id}' on {}", chip.name()),
    }
}

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum ParseDurationError {
    #[error("'{0}' unknown units - use 's', 'ms' or 'us'.")]
    Units(String),
    #[error("'{0}' must start with a digit")]
    NoDigits(String),
    #[error("'{0}' {1}")]
    ParseDigits(String, std::num::ParseIntError),
}

/// Parse a duration, taken as milliseconds unless units are specified.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, ParseDurationError> {
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if split == 0 {
        return Err(ParseDurationError::NoDigits(s.into()));
    }
    let (num, units) = s.split_at(split);
    let t = num
        .parse::<u64>()
        .map_err(|e| ParseDurationError::ParseDigits(num.into(), e))?;
    match units {
        "" | "ms" => Ok(Duration::from_millis(t)),
        "us" => Ok(Duration::from_micros(t)),
        "s" => Ok(Duration::from_secs(t)),
        _ => Err(ParseDurationError::Units(s.into())),
    }
}

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
#[error("'{0}' is not a valid number")]
pub struct ParseNumberError(String);

/// Parse an integer in decimal, or hex with a 0x prefix.
pub fn parse_number<T>(s: &str) -> std::result::Result<T, ParseNumberError>
where
    T: TryFrom<u64>,
{
    let v = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    }
    .map_err(|_| ParseNumberError(s.into()))?;
    T::try_from(v).map_err(|_| ParseNumberError(s.into()))
}

pub fn parse_u8(s: &str) -> std::result::Result<u8, ParseNumberError> {
    parse_number(s)
}

pub fn parse_u16(s: &str) -> std::result::Result<u16, ParseNumberError> {
    parse_number(s)
}

/// Format bytes as space separated hex.
pub fn hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:#04x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum PullFlags {
    PullUp,
    PullDown,
    Off,
}

impl From<PullFlags> for Pull {
    fn from(p: PullFlags) -> Self {
        match p {
            PullFlags::PullUp => Pull::PullUp,
            PullFlags::PullDown => Pull::PullDown,
            PullFlags::Off => Pull::Off,
        }
    }
}
