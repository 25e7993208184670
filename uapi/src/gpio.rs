// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The GPIO character device ABI v2, released in Linux v5.10.

use bitflags::bitflags;
use std::sync::OnceLock;

use crate::fd::{FileDescriptor, Request};
use crate::layout::{Decoder, Encoder, Kind, Layout, NativeStruct};
use crate::{Error, Result, ValidationError, NAME_MAX};

/// An identifier for a line on a particular chip.
///
/// Valid offsets are in the range 0..`num_lines` as reported in the [`ChipInfo`].
pub type Offset = u32;

/// The maximum number of lines that may be requested in a single request.
pub const LINES_MAX: usize = 64;

/// The maximum number of attributes in a [`LineConfig`] or [`LineInfo`].
pub const NUM_ATTRS_MAX: usize = 10;

/// The number of event slots read from a line handle at a time.
pub const EVENT_BUFFER_SLOTS: usize = 16;

const IOCTL_MAGIC: u8 = 0xb4;

pub const GET_CHIPINFO: Request = Request::new(
    "GPIO_GET_CHIPINFO_IOCTL",
    nix::request_code_read!(IOCTL_MAGIC, 0x01, ChipInfo::SIZE) as u64,
);
pub const GET_LINEINFO: Request = Request::new(
    "GPIO_V2_GET_LINEINFO_IOCTL",
    nix::request_code_readwrite!(IOCTL_MAGIC, 0x05, LineInfo::SIZE) as u64,
);
pub const GET_LINE: Request = Request::new(
    "GPIO_V2_GET_LINE_IOCTL",
    nix::request_code_readwrite!(IOCTL_MAGIC, 0x07, LineRequest::SIZE) as u64,
);
pub const SET_LINE_CONFIG: Request = Request::new(
    "GPIO_V2_LINE_SET_CONFIG_IOCTL",
    nix::request_code_readwrite!(IOCTL_MAGIC, 0x0d, LineConfig::SIZE) as u64,
);
pub const GET_LINE_VALUES: Request = Request::new(
    "GPIO_V2_LINE_GET_VALUES_IOCTL",
    nix::request_code_readwrite!(IOCTL_MAGIC, 0x0e, LineValues::SIZE) as u64,
);
pub const SET_LINE_VALUES: Request = Request::new(
    "GPIO_V2_LINE_SET_VALUES_IOCTL",
    nix::request_code_readwrite!(IOCTL_MAGIC, 0x0f, LineValues::SIZE) as u64,
);

bitflags! {
    /// Flags indicating the configuration of a line.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct LineFlags: u64 {
        /// The line is in use and is not available for request.
        const USED = 1;

        /// The line active state corresponds to a physical low.
        const ACTIVE_LOW = 2;

        /// The line is an input.
        const INPUT = 4;

        /// The line is an output.
        const OUTPUT = 8;

        /// The line detects rising (*inactive* to *active*) edges.
        const EDGE_RISING = 16;

        /// The line detects falling (*active* to *inactive*) edges.
        const EDGE_FALLING = 32;

        const OPEN_DRAIN = 64;

        const OPEN_SOURCE = 128;

        const BIAS_PULL_UP = 256;

        const BIAS_PULL_DOWN = 512;

        const BIAS_DISABLED = 1024;

        /// The line events contain **CLOCK_REALTIME** timestamps.
        const EVENT_CLOCK_REALTIME = 2048;

        /// The line events contain **HTE** timestamps.
        const EVENT_CLOCK_HTE = 4096;
    }
}

/// Information about a particular GPIO chip.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ChipInfo {
    /// The Linux kernel name of this GPIO chip.
    pub name: String,
    /// A functional name for this GPIO chip, such as a product number.
    ///
    /// May be empty.
    pub label: String,
    /// The number of GPIO lines on this chip.
    pub num_lines: u32,
}

impl ChipInfo {
    pub const SIZE: usize = 68;
}

impl NativeStruct for ChipInfo {
    fn layout() -> &'static Layout {
        static LAYOUT: OnceLock<Layout> = OnceLock::new();
        LAYOUT.get_or_init(|| {
            Layout::builder("gpiochip_info")
                .field("name", Kind::Bytes(NAME_MAX))
                .field("label", Kind::Bytes(NAME_MAX))
                .field("lines", Kind::U32)
                .build()
        })
    }

    fn from_bytes(buf: &[u8]) -> Result<Self> {
        let d = Decoder::new(Self::layout(), buf)?;
        Ok(ChipInfo {
            name: d.string("name")?,
            label: d.string("label")?,
            num_lines: d.get("lines")?,
        })
    }

    fn to_bytes(&self, buf: &mut [u8]) -> Result<()> {
        let mut e = Encoder::new(Self::layout(), buf)?;
        e.string("name", &self.name)?;
        e.string("label", &self.label)?;
        e.put("lines", self.num_lines)?;
        Ok(())
    }
}

/// Get the publicly available information for a chip.
///
/// * `cf` - The open chip file.
pub fn get_chip_info(cf: &FileDescriptor) -> Result<ChipInfo> {
    cf.ioctl(GET_CHIPINFO, &ChipInfo::default())
}

/// Values of GPIO lines.
///
/// Bits in the bitmaps correspond to the index into [`LineRequest.offsets`].
/// The first requested line, `offsets[0]`, is bit 0.
///
/// [`LineRequest.offsets`]: struct@LineRequest
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LineValues {
    /// The value of the lines, set to 1 for *active* and 0 for *inactive*.
    pub bits: u64,

    /// The lines in a request to access, set to 1 to access and 0 to ignore.
    pub mask: u64,
}

impl LineValues {
    pub const SIZE: usize = 16;

    /// Values with the given lines selected by the mask and all values clear.
    pub fn masked(mask: u64) -> Self {
        LineValues { bits: 0, mask }
    }

    /// Return the value of a line, or `None` if it is not in the mask.
    ///
    /// * `idx` - The index into the [`LineRequest.offsets`] for the line of interest.
    ///
    /// [`LineRequest.offsets`]: struct@LineRequest
    #[inline]
    pub fn get(&self, idx: usize) -> Option<bool> {
        debug_assert!(idx < LINES_MAX);
        let mask = 0x01 << idx;
        if self.mask & mask == 0 {
            return None;
        }
        Some(self.bits & mask != 0)
    }

    /// Set the value of a line, adding it to the mask.
    #[inline]
    pub fn set(&mut self, idx: usize, active: bool) {
        debug_assert!(idx < LINES_MAX);
        let mask = 0x01 << idx;
        self.mask |= mask;
        if active {
            self.bits |= mask;
        } else {
            self.bits &= !mask;
        }
    }

    /// Remove a line from the mask.
    #[inline]
    pub fn unset_mask(&mut self, idx: usize) {
        debug_assert!(idx < LINES_MAX);
        self.mask &= !(0x01 << idx);
    }
}

impl NativeStruct for LineValues {
    fn layout() -> &'static Layout {
        static LAYOUT: OnceLock<Layout> = OnceLock::new();
        LAYOUT.get_or_init(|| {
            Layout::builder("gpio_v2_line_values")
                .field("bits", Kind::U64)
                .field("mask", Kind::U64)
                .build()
        })
    }

    fn from_bytes(buf: &[u8]) -> Result<Self> {
        let d = Decoder::new(Self::layout(), buf)?;
        Ok(LineValues {
            bits: d.get("bits")?,
            mask: d.get("mask")?,
        })
    }

    fn to_bytes(&self, buf: &mut [u8]) -> Result<()> {
        let mut e = Encoder::new(Self::layout(), buf)?;
        e.put("bits", self.bits)?;
        e.put("mask", self.mask)?;
        Ok(())
    }
}

/// Read the values of requested lines.
///
/// Only the lines selected by `lv.mask` are read. The remaining bits are
/// zero on return.
pub fn get_line_values(lf: &FileDescriptor, lv: &mut LineValues) -> Result<()> {
    *lv = lf.ioctl(GET_LINE_VALUES, lv)?;
    Ok(())
}

/// Set the values of requested output lines.
///
/// Only the lines selected by `lv.mask` are set.
pub fn set_line_values(lf: &FileDescriptor, lv: &LineValues) -> Result<()> {
    lf.ioctl(SET_LINE_VALUES, lv)?;
    Ok(())
}

/// The identifier of the value held by a [`LineAttribute`].
#[repr(u32)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum LineAttributeKind {
    Flags = 1,
    Values = 2,
    Debounce = 3,
}

impl TryFrom<u32> for LineAttributeKind {
    type Error = String;

    fn try_from(v: u32) -> std::result::Result<Self, Self::Error> {
        use LineAttributeKind::*;
        match v {
            x if x == Flags as u32 => Ok(Flags),
            x if x == Values as u32 => Ok(Values),
            x if x == Debounce as u32 => Ok(Debounce),
            x => Err(format!("invalid value: {x}")),
        }
    }
}

/// A configurable attribute of a line.
///
/// The variant determines the `id` stored with the attribute, and which arm
/// of the kernel union holds the value.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum LineAttribute {
    /// Flags that override the default flags of the [`LineConfig`].
    Flags(LineFlags),

    /// Output values, with bits corresponding to the requested offsets.
    Values(u64),

    /// The debounce period in microseconds.
    Debounce(u32),
}

impl LineAttribute {
    pub const SIZE: usize = 16;

    pub fn kind(&self) -> LineAttributeKind {
        match self {
            LineAttribute::Flags(_) => LineAttributeKind::Flags,
            LineAttribute::Values(_) => LineAttributeKind::Values,
            LineAttribute::Debounce(_) => LineAttributeKind::Debounce,
        }
    }
}

impl NativeStruct for LineAttribute {
    fn layout() -> &'static Layout {
        static LAYOUT: OnceLock<Layout> = OnceLock::new();
        LAYOUT.get_or_init(|| {
            Layout::builder("gpio_v2_line_attribute")
                .field("id", Kind::U32)
                .padding("padding", 4)
                .union(
                    "value",
                    &[
                        ("flags", Kind::U64),
                        ("values", Kind::U64),
                        ("debounce_period_us", Kind::U32),
                    ],
                )
                .build()
        })
    }

    fn from_bytes(buf: &[u8]) -> Result<Self> {
        let d = Decoder::new(Self::layout(), buf)?;
        let kind = LineAttributeKind::try_from(d.get::<u32>("id")?)
            .map_err(|e| ValidationError::new("attr.id", e))?;
        Ok(match kind {
            LineAttributeKind::Flags => {
                LineAttribute::Flags(LineFlags::from_bits_retain(d.get("value.flags")?))
            }
            LineAttributeKind::Values => LineAttribute::Values(d.get("value.values")?),
            LineAttributeKind::Debounce => {
                LineAttribute::Debounce(d.get("value.debounce_period_us")?)
            }
        })
    }

    fn to_bytes(&self, buf: &mut [u8]) -> Result<()> {
        let mut e = Encoder::new(Self::layout(), buf)?;
        e.put("id", self.kind() as u32)?;
        match self {
            LineAttribute::Flags(flags) => e.put("value.flags", flags.bits())?,
            LineAttribute::Values(values) => e.put("value.values", *values)?,
            LineAttribute::Debounce(period) => e.put("value.debounce_period_us", *period)?,
        }
        Ok(())
    }
}

/// An attribute applied to a subset of the requested lines.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LineConfigAttribute {
    pub attr: LineAttribute,

    /// The lines to which the attribute applies.
    ///
    /// Bits correspond to the index into the requested offsets, not to the
    /// offsets themselves.
    pub mask: u64,
}

impl NativeStruct for LineConfigAttribute {
    fn layout() -> &'static Layout {
        static LAYOUT: OnceLock<Layout> = OnceLock::new();
        LAYOUT.get_or_init(|| {
            Layout::builder("gpio_v2_line_config_attribute")
                .field("attr", Kind::Struct(LineAttribute::layout()))
                .field("mask", Kind::U64)
                .build()
        })
    }

    fn from_bytes(buf: &[u8]) -> Result<Self> {
        let d = Decoder::new(Self::layout(), buf)?;
        Ok(LineConfigAttribute {
            attr: d.nested("attr")?,
            mask: d.get("mask")?,
        })
    }

    fn to_bytes(&self, buf: &mut [u8]) -> Result<()> {
        let mut e = Encoder::new(Self::layout(), buf)?;
        e.nested("attr", &self.attr)?;
        e.put("mask", self.mask)?;
        Ok(())
    }
}

/// The configuration of a set of requested lines.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LineConfig {
    /// Flags applied to all lines not covered by a flags attribute.
    pub flags: LineFlags,

    /// At most [`NUM_ATTRS_MAX`] attributes.
    pub attrs: Vec<LineConfigAttribute>,
}

impl LineConfig {
    pub const SIZE: usize = 272;

    pub fn with_flags(flags: LineFlags) -> Self {
        LineConfig {
            flags,
            attrs: Vec::new(),
        }
    }

    /// Add a debounce period, in microseconds, for the masked lines.
    pub fn add_debounce(&mut self, period_us: u32, mask: u64) {
        self.attrs.push(LineConfigAttribute {
            attr: LineAttribute::Debounce(period_us),
            mask,
        });
    }

    /// Add output values for the lines selected by the values mask.
    pub fn add_output_values(&mut self, values: &LineValues) {
        self.attrs.push(LineConfigAttribute {
            attr: LineAttribute::Values(values.bits),
            mask: values.mask,
        });
    }

    /// Add flags overriding the default flags for the masked lines.
    pub fn add_flags(&mut self, flags: LineFlags, mask: u64) {
        self.attrs.push(LineConfigAttribute {
            attr: LineAttribute::Flags(flags),
            mask,
        });
    }
}

impl NativeStruct for LineConfig {
    fn layout() -> &'static Layout {
        static LAYOUT: OnceLock<Layout> = OnceLock::new();
        LAYOUT.get_or_init(|| {
            Layout::builder("gpio_v2_line_config")
                .field("flags", Kind::U64)
                .field("num_attrs", Kind::U32)
                .padding("padding", 5 * 4)
                .sequence(
                    "attrs",
                    Kind::Struct(LineConfigAttribute::layout()),
                    NUM_ATTRS_MAX,
                )
                .build()
        })
    }

    fn from_bytes(buf: &[u8]) -> Result<Self> {
        let d = Decoder::new(Self::layout(), buf)?;
        let num_attrs = d.get::<u32>("num_attrs")? as usize;
        if num_attrs > NUM_ATTRS_MAX {
            return Err(ValidationError::new(
                "num_attrs",
                format!("{num_attrs} exceeds {NUM_ATTRS_MAX}"),
            )
            .into());
        }
        Ok(LineConfig {
            flags: LineFlags::from_bits_retain(d.get("flags")?),
            attrs: d.sequence("attrs", num_attrs)?,
        })
    }

    fn to_bytes(&self, buf: &mut [u8]) -> Result<()> {
        let mut e = Encoder::new(Self::layout(), buf)?;
        e.put("flags", self.flags.bits())?;
        e.put("num_attrs", self.attrs.len() as u32)?;
        e.sequence("attrs", &self.attrs)?;
        Ok(())
    }
}

/// Update the configuration of requested lines.
pub fn set_line_config(lf: &FileDescriptor, lc: &LineConfig) -> Result<()> {
    lf.ioctl(SET_LINE_CONFIG, lc)?;
    Ok(())
}

/// A request for a set of lines from a chip.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LineRequest {
    /// The offsets of the requested lines, at most [`LINES_MAX`].
    pub offsets: Vec<Offset>,

    /// The label recorded as the consumer of the lines.
    pub consumer: String,

    pub config: LineConfig,

    /// A suggested minimum number of edge events the kernel should buffer.
    ///
    /// Zero selects the kernel default.
    pub event_buffer_size: u32,

    /// The fd of the line handle, returned by the kernel.
    pub fd: i32,
}

impl LineRequest {
    pub const SIZE: usize = 592;
}

impl NativeStruct for LineRequest {
    fn layout() -> &'static Layout {
        static LAYOUT: OnceLock<Layout> = OnceLock::new();
        LAYOUT.get_or_init(|| {
            Layout::builder("gpio_v2_line_request")
                .sequence("offsets", Kind::U32, LINES_MAX)
                .field("consumer", Kind::Bytes(NAME_MAX))
                .field("config", Kind::Struct(LineConfig::layout()))
                .field("num_lines", Kind::U32)
                .field("event_buffer_size", Kind::U32)
                .padding("padding", 5 * 4)
                .field("fd", Kind::I32)
                .build()
        })
    }

    fn from_bytes(buf: &[u8]) -> Result<Self> {
        let d = Decoder::new(Self::layout(), buf)?;
        let num_lines = d.get::<u32>("num_lines")? as usize;
        if num_lines > LINES_MAX {
            return Err(ValidationError::new(
                "num_lines",
                format!("{num_lines} exceeds {LINES_MAX}"),
            )
            .into());
        }
        Ok(LineRequest {
            offsets: d.scalars("offsets", num_lines)?,
            consumer: d.string("consumer")?,
            config: d.nested("config")?,
            event_buffer_size: d.get("event_buffer_size")?,
            fd: d.get("fd")?,
        })
    }

    fn to_bytes(&self, buf: &mut [u8]) -> Result<()> {
        let mut e = Encoder::new(Self::layout(), buf)?;
        e.scalars("offsets", &self.offsets)?;
        e.string("consumer", &self.consumer)?;
        e.nested("config", &self.config)?;
        e.put("num_lines", self.offsets.len() as u32)?;
        e.put("event_buffer_size", self.event_buffer_size)?;
        e.put("fd", self.fd)?;
        Ok(())
    }
}

/// Request a set of lines for exclusive access.
///
/// Returns the line handle on which the lines are accessed.
///
/// * `cf` - The open chip file.
/// * `lr` - The line request.
pub fn get_line(cf: &FileDescriptor, lr: &LineRequest) -> Result<FileDescriptor> {
    let resp = cf.ioctl(GET_LINE, lr)?;
    if resp.fd < 0 {
        return Err(ValidationError::new("fd", format!("invalid value: {}", resp.fd)).into());
    }
    Ok(cf.adopt(resp.fd, cf.path()))
}

/// The publicly available information for a line.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LineInfo {
    /// The name of this GPIO line, such as the output pin of the line on the chip,
    /// a rail or a pin header name on a board, as specified by the GPIO chip.
    ///
    /// May be empty.
    pub name: String,

    /// A functional name for the consumer of this GPIO line as set by whatever is using it.
    ///
    /// May be empty if not requested by a consumer.
    pub consumer: String,

    /// The local offset on this GPIO chip.
    pub offset: Offset,

    pub flags: LineFlags,

    /// Additional configuration attributes associated with the line.
    pub attrs: Vec<LineAttribute>,
}

impl LineInfo {
    pub const SIZE: usize = 256;

    /// The debounce period of the line in microseconds, if any.
    pub fn debounce_period_us(&self) -> Option<u32> {
        self.attrs.iter().find_map(|a| match a {
            LineAttribute::Debounce(period) => Some(*period),
            _ => None,
        })
    }
}

impl NativeStruct for LineInfo {
    fn layout() -> &'static Layout {
        static LAYOUT: OnceLock<Layout> = OnceLock::new();
        LAYOUT.get_or_init(|| {
            Layout::builder("gpio_v2_line_info")
                .field("name", Kind::Bytes(NAME_MAX))
                .field("consumer", Kind::Bytes(NAME_MAX))
                .field("offset", Kind::U32)
                .field("num_attrs", Kind::U32)
                .field("flags", Kind::U64)
                .sequence(
                    "attrs",
                    Kind::Struct(LineAttribute::layout()),
                    NUM_ATTRS_MAX,
                )
                .padding("padding", 4 * 4)
                .build()
        })
    }

    fn from_bytes(buf: &[u8]) -> Result<Self> {
        let d = Decoder::new(Self::layout(), buf)?;
        let num_attrs = d.get::<u32>("num_attrs")? as usize;
        if num_attrs > NUM_ATTRS_MAX {
            return Err(ValidationError::new(
                "num_attrs",
                format!("{num_attrs} exceeds {NUM_ATTRS_MAX}"),
            )
            .into());
        }
        Ok(LineInfo {
            name: d.string("name")?,
            consumer: d.string("consumer")?,
            offset: d.get("offset")?,
            flags: LineFlags::from_bits_retain(d.get("flags")?),
            attrs: d.sequence("attrs", num_attrs)?,
        })
    }

    fn to_bytes(&self, buf: &mut [u8]) -> Result<()> {
        let mut e = Encoder::new(Self::layout(), buf)?;
        e.string("name", &self.name)?;
        e.string("consumer", &self.consumer)?;
        e.put("offset", self.offset)?;
        e.put("num_attrs", self.attrs.len() as u32)?;
        e.put("flags", self.flags.bits())?;
        e.sequence("attrs", &self.attrs)?;
        Ok(())
    }
}

/// Get the publicly available information for a line.
///
/// * `cf` - The open chip file.
/// * `offset` - The offset of the line.
pub fn get_line_info(cf: &FileDescriptor, offset: Offset) -> Result<LineInfo> {
    let li = LineInfo {
        offset,
        ..Default::default()
    };
    cf.ioctl(GET_LINEINFO, &li)
}

/// The kind of edge that triggered a [`LineEvent`].
#[repr(u32)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum LineEdgeEventKind {
    /// Indicates the line transitioned from *inactive* to *active*.
    RisingEdge = 1,

    /// Indicates the line transitioned from *active* to *inactive*.
    FallingEdge = 2,
}

impl TryFrom<u32> for LineEdgeEventKind {
    type Error = String;

    fn try_from(v: u32) -> std::result::Result<Self, Self::Error> {
        use LineEdgeEventKind::*;
        match v {
            x if x == RisingEdge as u32 => Ok(RisingEdge),
            x if x == FallingEdge as u32 => Ok(FallingEdge),
            _ => Err(format!("invalid value: {v}")),
        }
    }
}

/// Information about an edge event on a requested line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LineEdgeEvent {
    /// The best estimate of time of event occurrence, in nanoseconds.
    ///
    /// By default the timestamp is read from **CLOCK_MONOTONIC**.
    pub timestamp_ns: u64,

    pub kind: LineEdgeEventKind,

    /// The offset of the line that triggered the event.
    pub offset: Offset,

    /// The sequence number for this event in the sequence of events for all
    /// the lines in this line request.
    pub seqno: u32,

    /// The sequence number for this event in the sequence of events on this
    /// particular line.
    pub line_seqno: u32,
}

impl LineEdgeEvent {
    pub const SIZE: usize = 48;
}

impl NativeStruct for LineEdgeEvent {
    fn layout() -> &'static Layout {
        static LAYOUT: OnceLock<Layout> = OnceLock::new();
        LAYOUT.get_or_init(|| {
            Layout::builder("gpio_v2_line_event")
                .field("timestamp_ns", Kind::U64)
                .field("id", Kind::U32)
                .field("offset", Kind::U32)
                .field("seqno", Kind::U32)
                .field("line_seqno", Kind::U32)
                .padding("padding", 6 * 4)
                .build()
        })
    }

    fn from_bytes(buf: &[u8]) -> Result<Self> {
        let d = Decoder::new(Self::layout(), buf)?;
        Ok(LineEdgeEvent {
            timestamp_ns: d.get("timestamp_ns")?,
            kind: LineEdgeEventKind::try_from(d.get::<u32>("id")?)
                .map_err(|e| ValidationError::new("kind", e))?,
            offset: d.get("offset")?,
            seqno: d.get("seqno")?,
            line_seqno: d.get("line_seqno")?,
        })
    }

    fn to_bytes(&self, buf: &mut [u8]) -> Result<()> {
        let mut e = Encoder::new(Self::layout(), buf)?;
        e.put("timestamp_ns", self.timestamp_ns)?;
        e.put("id", self.kind as u32)?;
        e.put("offset", self.offset)?;
        e.put("seqno", self.seqno)?;
        e.put("line_seqno", self.line_seqno)?;
        Ok(())
    }
}

/// Read the edge events available on a line handle.
///
/// Reads at most `slots` events in a single read, and decodes the populated
/// slots, i.e. those with a non-zero timestamp, in the order the kernel
/// queued them.
pub fn read_events(lf: &FileDescriptor, slots: usize) -> Result<Vec<LineEdgeEvent>> {
    let mut buf = vec![0u8; slots * LineEdgeEvent::SIZE];
    let n = lf.read(&mut buf)?;
    if n % LineEdgeEvent::SIZE != 0 {
        return Err(Error::Validation(ValidationError::new(
            "read",
            format!("{n} bytes is not a whole number of events"),
        )));
    }
    buf[..n]
        .chunks_exact(LineEdgeEvent::SIZE)
        .filter(|slot| slot[..8].iter().any(|&b| b != 0))
        .map(LineEdgeEvent::from_bytes)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    mod chip_info {
        use super::*;

        #[test]
        fn size() {
            assert_eq!(ChipInfo::size(), ChipInfo::SIZE);
            assert_eq!(ChipInfo::layout().offset_of("lines"), Ok(64));
        }

        #[test]
        fn strings() {
            let ci = ChipInfo {
                name: "gpiochip0".to_string(),
                label: "pinctrl-bcm2711".to_string(),
                num_lines: 58,
            };
            let buf = ci.to_vec().unwrap();
            assert_eq!(&buf[..9], b"gpiochip0");
            assert!(buf[9..32].iter().all(|&b| b == 0));
            assert_eq!(&buf[64..], &58u32.to_ne_bytes());
            assert_eq!(ChipInfo::from_bytes(&buf).unwrap(), ci);
        }

        #[test]
        fn full_length_name() {
            let ci = ChipInfo {
                name: "x".repeat(NAME_MAX),
                ..Default::default()
            };
            let buf = ci.to_vec().unwrap();
            assert_eq!(ChipInfo::from_bytes(&buf).unwrap().name.len(), NAME_MAX);
        }

        #[test]
        fn short_buffer() {
            let buf = [0u8; ChipInfo::SIZE - 1];
            assert!(matches!(
                ChipInfo::from_bytes(&buf),
                Err(Error::Layout(crate::LayoutError::BufferTooSmall { needed: 68, .. }))
            ));
        }
    }

    mod line_attribute {
        use super::*;

        #[test]
        fn size() {
            assert_eq!(LineAttribute::size(), LineAttribute::SIZE);
            assert_eq!(LineAttribute::layout().offset_of("value"), Ok(8));
        }

        #[test]
        fn union_arms() {
            for attr in [
                LineAttribute::Flags(LineFlags::INPUT | LineFlags::BIAS_PULL_UP),
                LineAttribute::Values(0x5),
                LineAttribute::Debounce(99),
            ] {
                let buf = attr.to_vec().unwrap();
                assert_eq!(&buf[..4], &(attr.kind() as u32).to_ne_bytes());
                assert_eq!(LineAttribute::from_bytes(&buf).unwrap(), attr);
            }
        }

        #[test]
        fn inactive_arm_zeroed() {
            let mut buf = [0xffu8; LineAttribute::SIZE];
            LineAttribute::Debounce(1).to_bytes(&mut buf).unwrap();
            assert_eq!(&buf[4..8], &[0; 4]);
            assert_eq!(&buf[8..12], &1u32.to_ne_bytes());
            assert_eq!(&buf[12..], &[0; 4]);
        }

        #[test]
        fn invalid_id() {
            let buf = [0u8; LineAttribute::SIZE];
            assert_eq!(
                LineAttribute::from_bytes(&buf).unwrap_err(),
                Error::Validation(ValidationError::new("attr.id", "invalid value: 0"))
            );
        }
    }

    mod line_config {
        use super::*;

        #[test]
        fn size() {
            assert_eq!(LineConfigAttribute::size(), 24);
            assert_eq!(LineConfig::size(), LineConfig::SIZE);
            assert_eq!(LineConfig::layout().offset_of("attrs"), Ok(32));
        }

        #[test]
        fn attrs() {
            let mut lc = LineConfig::with_flags(LineFlags::INPUT | LineFlags::EDGE_RISING);
            lc.add_debounce(99, 0x01);
            lc.add_output_values(&LineValues { bits: 1, mask: 3 });
            lc.add_flags(LineFlags::OUTPUT, 0x02);
            let buf = lc.to_vec().unwrap();
            assert_eq!(&buf[8..12], &3u32.to_ne_bytes());
            // debounce period of the first attribute
            assert_eq!(&buf[40..44], &99u32.to_ne_bytes());
            // mask of the first attribute
            assert_eq!(&buf[48..56], &1u64.to_ne_bytes());
            assert_eq!(LineConfig::from_bytes(&buf).unwrap(), lc);
        }

        #[test]
        fn too_many_attrs() {
            let mut lc = LineConfig::default();
            for i in 0..=NUM_ATTRS_MAX {
                lc.add_debounce(i as u32, 1);
            }
            assert!(matches!(
                lc.to_vec(),
                Err(Error::Layout(crate::LayoutError::TooManyElements { .. }))
            ));
        }
    }

    mod line_request {
        use super::*;

        #[test]
        fn size() {
            assert_eq!(LineRequest::size(), LineRequest::SIZE);
            let l = LineRequest::layout();
            assert_eq!(l.offset_of("consumer"), Ok(256));
            assert_eq!(l.offset_of("config"), Ok(288));
            assert_eq!(l.offset_of("num_lines"), Ok(560));
            assert_eq!(l.offset_of("event_buffer_size"), Ok(564));
            assert_eq!(l.offset_of("fd"), Ok(588));
        }

        #[test]
        fn round_trip() {
            let mut config = LineConfig::with_flags(LineFlags::INPUT);
            config.add_debounce(10, 1);
            let lr = LineRequest {
                offsets: vec![7],
                consumer: "boardio.button".to_string(),
                config,
                event_buffer_size: 0,
                fd: 12,
            };
            let buf = lr.to_vec().unwrap();
            assert_eq!(&buf[..4], &7u32.to_ne_bytes());
            assert_eq!(&buf[560..564], &1u32.to_ne_bytes());
            assert_eq!(LineRequest::from_bytes(&buf).unwrap(), lr);
        }
    }

    mod line_info {
        use super::*;

        #[test]
        fn size() {
            assert_eq!(LineInfo::size(), LineInfo::SIZE);
            assert_eq!(LineInfo::layout().offset_of("flags"), Ok(72));
            assert_eq!(LineInfo::layout().offset_of("attrs"), Ok(80));
        }

        #[test]
        fn round_trip() {
            let li = LineInfo {
                name: "GPIO7".to_string(),
                consumer: "boardio.button".to_string(),
                offset: 7,
                flags: LineFlags::USED | LineFlags::INPUT,
                attrs: vec![LineAttribute::Debounce(5000)],
            };
            let buf = li.to_vec().unwrap();
            let decoded = LineInfo::from_bytes(&buf).unwrap();
            assert_eq!(decoded, li);
            assert_eq!(decoded.debounce_period_us(), Some(5000));
        }

        #[test]
        fn invalid_num_attrs() {
            let mut buf = LineInfo::default().to_vec().unwrap();
            buf[68..72].copy_from_slice(&11u32.to_ne_bytes());
            assert!(matches!(
                LineInfo::from_bytes(&buf),
                Err(Error::Validation(_))
            ));
        }
    }

    mod line_values {
        use super::*;

        #[test]
        fn size() {
            assert_eq!(LineValues::size(), LineValues::SIZE);
        }

        #[test]
        fn round_trip() {
            let lv = LineValues {
                bits: 0x8000_0000_0000_0001,
                mask: 0x0f,
            };
            let buf = lv.to_vec().unwrap();
            assert_eq!(&buf[..8], &0x8000_0000_0000_0001u64.to_ne_bytes());
            assert_eq!(&buf[8..], &0x0fu64.to_ne_bytes());
            assert_eq!(LineValues::from_bytes(&buf).unwrap(), lv);
        }

        #[test]
        fn get() {
            let lv = LineValues {
                bits: 0b0101,
                mask: 0b0011,
            };
            assert_eq!(lv.get(0), Some(true));
            assert_eq!(lv.get(1), Some(false));
            assert_eq!(lv.get(2), None);
        }

        #[test]
        fn set() {
            let mut lv = LineValues::masked(0);
            lv.set(0, true);
            lv.set(3, false);
            assert_eq!(lv, LineValues { bits: 1, mask: 0b1001 });
            lv.set(0, false);
            lv.unset_mask(3);
            assert_eq!(lv, LineValues { bits: 0, mask: 1 });
        }
    }

    mod line_edge_event {
        use super::*;

        #[test]
        fn size() {
            assert_eq!(LineEdgeEvent::size(), LineEdgeEvent::SIZE);
        }

        #[test]
        fn kind() {
            let le = LineEdgeEvent {
                timestamp_ns: 1234,
                kind: LineEdgeEventKind::FallingEdge,
                offset: 7,
                seqno: 3,
                line_seqno: 2,
            };
            let mut buf = le.to_vec().unwrap();
            assert_eq!(&buf[8..12], &2u32.to_ne_bytes());
            assert_eq!(LineEdgeEvent::from_bytes(&buf).unwrap(), le);
            buf[8] = 3;
            assert!(LineEdgeEvent::from_bytes(&buf).is_err());
        }
    }

    #[test]
    fn request_codes() {
        assert_eq!(GET_CHIPINFO.code(), 0x8044_b401);
        assert_eq!(GET_LINEINFO.code(), 0xc100_b405);
        assert_eq!(GET_LINE.code(), 0xc250_b407);
        assert_eq!(SET_LINE_CONFIG.code(), 0xc110_b40d);
        assert_eq!(GET_LINE_VALUES.code(), 0xc010_b40e);
        assert_eq!(SET_LINE_VALUES.code(), 0xc010_b40f);
    }
}
