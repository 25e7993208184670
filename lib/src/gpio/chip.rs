// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use super::{chip_path, EdgeDetection, Offset};
use crate::{Context, Error, Result, UapiCall};
use boardio_uapi::gpio::{self, LineFlags};
use boardio_uapi::{AccessMode, FileDescriptor};
#[cfg(feature = "serde")]
use serde_derive::{Deserialize, Serialize};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Compare two chip paths.
///
// Sorts paths naturally, assuming any chip numbering is at the end of the path - as it is for gpiochips.
pub fn path_compare(a: &Path, b: &Path) -> std::cmp::Ordering {
    let a = a.as_os_str().as_bytes();
    let b = b.as_os_str().as_bytes();

    if a.len() == b.len() {
        return a.cmp(b);
    }
    for (ai, bi) in a.iter().zip(b.iter()) {
        if *ai != *bi {
            if !ai.is_ascii_digit() || !bi.is_ascii_digit() {
                return (*ai).cmp(bi);
            }
            break;
        }
    }
    // equal up to the shorter, or differing in digits where the shorter number is smaller
    a.len().cmp(&b.len())
}

fn is_chip_name(name: &[u8]) -> bool {
    match name.strip_prefix(b"gpiochip") {
        Some(num) => !num.is_empty() && num.iter().all(u8::is_ascii_digit),
        None => false,
    }
}

/// Returns the paths of all the GPIO character devices on the system,
/// sorted in name order.
pub fn chips() -> Result<Vec<PathBuf>> {
    let dev = Path::new("/dev");
    let mut chips = std::fs::read_dir(dev)
        .map_err(|_| Error::NotFound(dev.to_path_buf()))?
        .filter_map(|x| x.ok())
        .filter(|de| is_chip_name(de.file_name().as_bytes()))
        .map(|de| de.path())
        .collect::<Vec<PathBuf>>();
    chips.sort_unstable_by(|a, b| path_compare(a, b));
    Ok(chips)
}

/// A GPIO character device, opened to query chip and line info.
#[derive(Debug)]
pub struct Chip {
    f: FileDescriptor,
}

impl Chip {
    pub fn from_path<P: AsRef<Path>>(ctx: &Context, path: P) -> Result<Chip> {
        let f = FileDescriptor::open(ctx.syscalls(), path, AccessMode::ReadOnly)
            .map_err(|e| Error::from_uapi(UapiCall::Open, e))?;
        Ok(Chip { f })
    }

    /// Open `/dev/gpiochip<chip>`.
    pub fn from_number(ctx: &Context, chip: u32) -> Result<Chip> {
        Chip::from_path(ctx, chip_path(chip))
    }

    pub fn path(&self) -> &Path {
        self.f.path()
    }

    /// The file name of the chip, such as "*gpiochip0*".
    pub fn name(&self) -> String {
        self.f
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn info(&self) -> Result<ChipInfo> {
        gpio::get_chip_info(&self.f)
            .map(ChipInfo::from)
            .map_err(|e| Error::from_uapi(UapiCall::GetChipInfo, e))
    }

    pub fn line_info(&self, offset: Offset) -> Result<LineInfo> {
        gpio::get_line_info(&self.f, offset)
            .map(|li| LineInfo::from(&li))
            .map_err(|e| Error::from_uapi(UapiCall::GetLineInfo, e))
    }

    /// The info for every line on the chip.
    pub fn line_infos(&self) -> Result<Vec<LineInfo>> {
        let ci = self.info()?;
        (0..ci.num_lines).map(|o| self.line_info(o)).collect()
    }

    /// Find the info for the named line.
    ///
    /// Returns the first matching line.
    pub fn find_line_info(&self, name: &str) -> Result<Option<LineInfo>> {
        Ok(self.line_infos()?.into_iter().find(|li| li.name == name))
    }
}

/// The publicly available information for a GPIO chip.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct ChipInfo {
    /// The system name for the chip, such as "*gpiochip0*".
    pub name: String,

    /// A functional name for the chip.
    ///
    /// This typically identifies the type of GPIO chip.
    pub label: String,

    /// The number of lines provided by the chip.
    pub num_lines: u32,
}

impl From<gpio::ChipInfo> for ChipInfo {
    fn from(ci: gpio::ChipInfo) -> Self {
        ChipInfo {
            name: ci.name,
            label: ci.label,
            num_lines: ci.num_lines,
        }
    }
}

/// The direction of a line.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Direction {
    #[default]
    Input,
    Output,
}

/// The bias applied to a line.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Bias {
    PullUp,
    PullDown,
    /// The line floats unless externally driven.
    Disabled,
}

/// The publicly available information for a line.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct LineInfo {
    pub offset: Offset,

    /// The name of the line as specified by the GPIO chip.
    ///
    /// May be empty.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "String::is_empty"))]
    pub name: String,

    /// The consumer label of whatever is using the line.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "String::is_empty"))]
    pub consumer: String,

    /// When true the line is in use and not available for request.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "is_false"))]
    pub used: bool,

    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "is_false"))]
    pub active_low: bool,

    pub direction: Direction,

    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub bias: Option<Bias>,

    /// Only relevant for input lines.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub edge_detection: Option<EdgeDetection>,

    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub debounce_period: Option<Duration>,
}

#[cfg(feature = "serde")]
fn is_false(b: &bool) -> bool {
    !b
}

impl From<&gpio::LineInfo> for LineInfo {
    fn from(li: &gpio::LineInfo) -> Self {
        let flags = li.flags;
        let bias = if flags.contains(LineFlags::BIAS_PULL_UP) {
            Some(Bias::PullUp)
        } else if flags.contains(LineFlags::BIAS_PULL_DOWN) {
            Some(Bias::PullDown)
        } else if flags.contains(LineFlags::BIAS_DISABLED) {
            Some(Bias::Disabled)
        } else {
            None
        };
        let edge_detection = match (
            flags.contains(LineFlags::EDGE_RISING),
            flags.contains(LineFlags::EDGE_FALLING),
        ) {
            (true, true) => Some(EdgeDetection::BothEdges),
            (true, false) => Some(EdgeDetection::RisingEdge),
            (false, true) => Some(EdgeDetection::FallingEdge),
            (false, false) => None,
        };
        LineInfo {
            offset: li.offset,
            name: li.name.clone(),
            consumer: li.consumer.clone(),
            used: flags.contains(LineFlags::USED),
            active_low: flags.contains(LineFlags::ACTIVE_LOW),
            direction: if flags.contains(LineFlags::OUTPUT) {
                Direction::Output
            } else {
                Direction::Input
            },
            bias,
            edge_detection,
            debounce_period: li
                .debounce_period_us()
                .map(|us| Duration::from_micros(us as u64)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boardio_uapi::gpio::LineAttribute;

    #[test]
    fn chip_info_from_uapi() {
        let ci = gpio::ChipInfo {
            name: "banana".into(),
            label: "peel".into(),
            num_lines: 42,
        };
        let i = ChipInfo::from(ci);
        assert_eq!(i.num_lines, 42);
        assert_eq!(i.name.as_str(), "banana");
        assert_eq!(i.label.as_str(), "peel");
    }

    mod line_info {
        use super::*;

        #[test]
        fn from_uapi() {
            let li = gpio::LineInfo {
                name: "button".to_string(),
                consumer: "boardio.button".to_string(),
                offset: 7,
                flags: LineFlags::USED
                    | LineFlags::INPUT
                    | LineFlags::EDGE_RISING
                    | LineFlags::EDGE_FALLING
                    | LineFlags::BIAS_PULL_DOWN,
                attrs: vec![LineAttribute::Debounce(99)],
            };
            let info = LineInfo::from(&li);
            assert_eq!(
                info,
                LineInfo {
                    offset: 7,
                    name: "button".to_string(),
                    consumer: "boardio.button".to_string(),
                    used: true,
                    active_low: false,
                    direction: Direction::Input,
                    bias: Some(Bias::PullDown),
                    edge_detection: Some(EdgeDetection::BothEdges),
                    debounce_period: Some(Duration::from_micros(99)),
                }
            );
        }

        #[test]
        fn output() {
            let li = gpio::LineInfo {
                offset: 3,
                flags: LineFlags::OUTPUT | LineFlags::ACTIVE_LOW | LineFlags::BIAS_DISABLED,
                ..Default::default()
            };
            let info = LineInfo::from(&li);
            assert_eq!(info.direction, Direction::Output);
            assert!(info.active_low);
            assert!(!info.used);
            assert_eq!(info.bias, Some(Bias::Disabled));
            assert_eq!(info.edge_detection, None);
            assert_eq!(info.debounce_period, None);
        }
    }

    #[test]
    fn chip_names() {
        assert!(is_chip_name(b"gpiochip0"));
        assert!(is_chip_name(b"gpiochip12"));
        assert!(!is_chip_name(b"gpiochip"));
        assert!(!is_chip_name(b"gpiochip1a"));
        assert!(!is_chip_name(b"i2c-1"));
    }

    #[test]
    fn path_compare() {
        use super::path_compare;
        use std::cmp::Ordering;

        assert_eq!(
            path_compare(Path::new("/dev/gpiochip0"), Path::new("/dev/gpiochip0")),
            Ordering::Equal
        );
        assert_eq!(
            path_compare(Path::new("/dev/gpiochip0"), Path::new("/dev/gpiochip1")),
            Ordering::Less
        );
        assert_eq!(
            path_compare(Path::new("/dev/gpiochip3"), Path::new("/dev/gpiochip10")),
            Ordering::Less
        );
        assert_eq!(
            path_compare(Path::new("/dev/gpiochip10"), Path::new("/dev/gpiochip3")),
            Ordering::Greater
        );
        assert_eq!(
            path_compare(Path::new("/dev/gpiochip"), Path::new("/dev/gpiochip1")),
            Ordering::Less
        );
        assert_eq!(
            path_compare(Path::new("/dev/gpiechip0"), Path::new("/dev/gpiochip1")),
            Ordering::Less
        );
    }
}
