// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use nohash_hasher::IntMap;
use std::collections::VecDeque;
use std::io;
use std::os::unix::io::RawFd;
use std::path::PathBuf;

use boardio_uapi::gpio::{
    ChipInfo, LineAttribute, LineConfig, LineEdgeEvent, LineEdgeEventKind, LineFlags, LineInfo,
    LineRequest, LineValues, GET_CHIPINFO, GET_LINE, GET_LINEINFO, GET_LINE_VALUES,
    SET_LINE_CONFIG, SET_LINE_VALUES,
};
use boardio_uapi::{IoctlArg, NativeStruct};

use super::{errno, Error, Handle, Offset, Result, Sim};

/// The physical value of a line.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Level {
    /// The line is physically high.
    High,

    /// The line is physically low.
    #[default]
    Low,
}

/// The configuration for a single simulated chip.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Bank {
    /// The number of lines simulated by this bank.
    pub num_lines: u32,

    /// The label of the chip.
    pub label: String,

    /// Lines assigned a name.
    pub names: IntMap<Offset, String>,

    /// Lines that appear to be already in use by some other consumer.
    pub hogs: IntMap<Offset, String>,
}

impl Bank {
    pub fn new<N: Into<String>>(num_lines: u32, label: N) -> Bank {
        Bank {
            num_lines,
            label: label.into(),
            names: IntMap::default(),
            hogs: IntMap::default(),
        }
    }

    /// Assign a name to a line on the chip.
    pub fn name<N: Into<String>>(&mut self, offset: Offset, name: N) -> &mut Self {
        self.names.insert(offset, name.into());
        self
    }

    /// Mark a line as in use by the named consumer.
    pub fn hog<N: Into<String>>(&mut self, offset: Offset, consumer: N) -> &mut Self {
        self.hogs.insert(offset, consumer.into());
        self
    }
}

#[derive(Debug, Default)]
struct LineState {
    name: String,
    hog: Option<String>,
    consumer: Option<String>,
    flags: LineFlags,
    debounce_us: Option<u32>,
    pull: Level,
    output: bool,
    line_seqno: u32,
    handle: Option<RawFd>,
}

impl LineState {
    fn used(&self) -> bool {
        self.hog.is_some() || self.consumer.is_some()
    }

    fn physical(&self) -> bool {
        if self.flags.contains(LineFlags::OUTPUT) {
            self.output
        } else {
            self.pull == Level::High
        }
    }

    fn value(&self) -> bool {
        self.physical() ^ self.flags.contains(LineFlags::ACTIVE_LOW)
    }

    fn info(&self, offset: Offset) -> LineInfo {
        let mut flags = self.flags;
        let consumer = match (&self.consumer, &self.hog) {
            (Some(c), _) => c.clone(),
            (None, Some(h)) => {
                flags |= LineFlags::INPUT;
                h.clone()
            }
            (None, None) => String::new(),
        };
        if self.used() {
            flags |= LineFlags::USED;
        }
        if !flags.intersects(LineFlags::INPUT | LineFlags::OUTPUT) {
            flags |= LineFlags::INPUT;
        }
        LineInfo {
            name: self.name.clone(),
            consumer,
            offset,
            flags,
            attrs: self
                .debounce_us
                .map(LineAttribute::Debounce)
                .into_iter()
                .collect(),
        }
    }
}

/// The settings of a single line resolved from a [`LineConfig`].
struct LineSettings {
    flags: LineFlags,
    output: Option<bool>,
    debounce_us: Option<u32>,
}

fn resolve(config: &LineConfig, num_lines: usize) -> io::Result<Vec<LineSettings>> {
    let mut settings = Vec::with_capacity(num_lines);
    for idx in 0..num_lines {
        let bit = 1u64 << idx;
        let mut ls = LineSettings {
            flags: config.flags,
            output: None,
            debounce_us: None,
        };
        for ca in config.attrs.iter().filter(|ca| ca.mask & bit != 0) {
            match ca.attr {
                LineAttribute::Flags(flags) => ls.flags = flags,
                LineAttribute::Values(values) => ls.output = Some(values & bit != 0),
                LineAttribute::Debounce(period) => ls.debounce_us = Some(period),
            }
        }
        validate(ls.flags)?;
        settings.push(ls);
    }
    Ok(settings)
}

fn validate(flags: LineFlags) -> io::Result<()> {
    let invalid = flags.contains(LineFlags::INPUT | LineFlags::OUTPUT)
        || (flags.intersects(LineFlags::EDGE_RISING | LineFlags::EDGE_FALLING)
            && !flags.contains(LineFlags::INPUT))
        || (flags & (LineFlags::BIAS_PULL_UP | LineFlags::BIAS_PULL_DOWN | LineFlags::BIAS_DISABLED))
            .bits()
            .count_ones()
            > 1
        || flags.contains(LineFlags::USED);
    if invalid {
        return Err(errno(libc::EINVAL));
    }
    Ok(())
}

fn pointer<'a>(arg: IoctlArg<'a>) -> io::Result<&'a mut [u8]> {
    match arg {
        IoctlArg::Pointer(buf) => Ok(buf),
        IoctlArg::Value(_) => Err(errno(libc::EFAULT)),
    }
}

fn einval<E>(_: E) -> io::Error {
    errno(libc::EINVAL)
}

/// An open line request.
#[derive(Debug)]
pub(crate) struct LineHandle {
    pub chip: usize,
    pub offsets: Vec<Offset>,
    pub events: VecDeque<LineEdgeEvent>,
    pub seqno: u32,
    pub failed: bool,
}

impl LineHandle {
    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.events.is_empty() {
            return Err(errno(libc::EAGAIN));
        }
        let mut n = 0;
        for slot in buf.chunks_exact_mut(LineEdgeEvent::SIZE) {
            let Some(ev) = self.events.pop_front() else {
                break;
            };
            ev.to_bytes(slot).map_err(einval)?;
            n += LineEdgeEvent::SIZE;
        }
        if n == 0 {
            return Err(errno(libc::EINVAL));
        }
        Ok(n)
    }
}

#[derive(Debug)]
pub(crate) struct ChipState {
    pub path: PathBuf,
    name: String,
    label: String,
    lines: Vec<LineState>,
}

impl ChipState {
    pub fn new(idx: usize, bank: &Bank) -> ChipState {
        let lines = (0..bank.num_lines)
            .map(|offset| LineState {
                name: bank.names.get(&offset).cloned().unwrap_or_default(),
                hog: bank.hogs.get(&offset).cloned(),
                ..Default::default()
            })
            .collect();
        ChipState {
            path: PathBuf::from(format!("/dev/gpiochip{idx}")),
            name: format!("gpiochip{idx}"),
            label: bank.label.clone(),
            lines,
        }
    }

    fn line(&self, offset: Offset) -> io::Result<&LineState> {
        self.lines
            .get(offset as usize)
            .ok_or_else(|| errno(libc::EINVAL))
    }

    /// Handle an ioctl on the chip fd.
    ///
    /// Returns the line handle created by a line request, which the caller
    /// registers under `line_fd`.
    pub fn chip_ioctl(
        &mut self,
        chip: usize,
        request: u64,
        arg: IoctlArg<'_>,
        line_fd: RawFd,
    ) -> io::Result<Option<LineHandle>> {
        let buf = pointer(arg)?;
        match request {
            r if r == GET_CHIPINFO.code() => {
                let info = ChipInfo {
                    name: self.name.clone(),
                    label: self.label.clone(),
                    num_lines: self.lines.len() as u32,
                };
                info.to_bytes(buf).map_err(einval)?;
                Ok(None)
            }
            r if r == GET_LINEINFO.code() => {
                let req = LineInfo::from_bytes(buf).map_err(einval)?;
                let info = self.line(req.offset)?.info(req.offset);
                info.to_bytes(buf).map_err(einval)?;
                Ok(None)
            }
            r if r == GET_LINE.code() => {
                let mut req = LineRequest::from_bytes(buf).map_err(einval)?;
                if req.offsets.is_empty() {
                    return Err(errno(libc::EINVAL));
                }
                for (idx, offset) in req.offsets.iter().enumerate() {
                    if self.line(*offset)?.used() || req.offsets[..idx].contains(offset) {
                        return Err(errno(libc::EBUSY));
                    }
                }
                let settings = resolve(&req.config, req.offsets.len())?;
                let consumer = if req.consumer.is_empty() {
                    "?".to_string()
                } else {
                    req.consumer.clone()
                };
                for (offset, ls) in req.offsets.iter().zip(settings) {
                    let line = &mut self.lines[*offset as usize];
                    line.consumer = Some(consumer.clone());
                    line.handle = Some(line_fd);
                    line.flags = ls.flags;
                    line.debounce_us = ls.debounce_us;
                    line.output = ls.output.unwrap_or(false);
                }
                req.fd = line_fd;
                req.to_bytes(buf).map_err(einval)?;
                Ok(Some(LineHandle {
                    chip,
                    offsets: req.offsets,
                    events: VecDeque::new(),
                    seqno: 0,
                    failed: false,
                }))
            }
            _ => Err(errno(libc::ENOTTY)),
        }
    }

    /// Handle an ioctl on a line handle.
    pub fn line_ioctl(
        &mut self,
        lh: &mut LineHandle,
        request: u64,
        arg: IoctlArg<'_>,
    ) -> io::Result<i32> {
        let buf = pointer(arg)?;
        match request {
            r if r == GET_LINE_VALUES.code() => {
                let mut lv = LineValues::from_bytes(buf).map_err(einval)?;
                let mut bits = 0;
                for (idx, offset) in lh.offsets.iter().enumerate() {
                    if lv.mask & (1 << idx) != 0 && self.lines[*offset as usize].value() {
                        bits |= 1 << idx;
                    }
                }
                lv.bits = bits;
                lv.to_bytes(buf).map_err(einval)?;
                Ok(0)
            }
            r if r == SET_LINE_VALUES.code() => {
                let lv = LineValues::from_bytes(buf).map_err(einval)?;
                for (idx, offset) in lh.offsets.iter().enumerate() {
                    let Some(value) = lv.get(idx) else {
                        continue;
                    };
                    let line = &mut self.lines[*offset as usize];
                    if !line.flags.contains(LineFlags::OUTPUT) {
                        return Err(errno(libc::EPERM));
                    }
                    line.output = value ^ line.flags.contains(LineFlags::ACTIVE_LOW);
                }
                Ok(0)
            }
            r if r == SET_LINE_CONFIG.code() => {
                let lc = LineConfig::from_bytes(buf).map_err(einval)?;
                let settings = resolve(&lc, lh.offsets.len())?;
                for (offset, ls) in lh.offsets.iter().zip(settings) {
                    let line = &mut self.lines[*offset as usize];
                    line.flags = ls.flags;
                    line.debounce_us = ls.debounce_us;
                    if let Some(output) = ls.output {
                        line.output = output;
                    }
                }
                Ok(0)
            }
            _ => Err(errno(libc::ENOTTY)),
        }
    }

    /// Return the lines of a closed request to the pool.
    pub fn release(&mut self, offsets: &[Offset]) {
        for offset in offsets {
            let line = &mut self.lines[*offset as usize];
            line.consumer = None;
            line.handle = None;
            line.flags = LineFlags::empty();
            line.debounce_us = None;
        }
    }
}

/// A live simulated chip.
#[derive(Debug)]
pub struct Chip<'a> {
    sim: &'a Sim,
    idx: usize,
}

impl<'a> Chip<'a> {
    pub(crate) fn new(sim: &'a Sim, idx: usize) -> Chip<'a> {
        Chip { sim, idx }
    }

    /// The path to the chip in /dev.
    pub fn dev_path(&self) -> PathBuf {
        PathBuf::from(format!("/dev/gpiochip{}", self.idx))
    }

    fn with_line<T, F>(&self, offset: Offset, f: F) -> Result<T>
    where
        F: FnOnce(&mut LineState) -> T,
    {
        let mut s = self.sim.state();
        let chip = s
            .chips
            .get_mut(self.idx)
            .ok_or(Error::UnknownChip(self.idx))?;
        let line = chip
            .lines
            .get_mut(offset as usize)
            .ok_or(Error::InvalidOffset(offset))?;
        Ok(f(line))
    }

    /// Pull a line to simulate the line being externally driven.
    ///
    /// Queues an edge event on the line's request if the change of level
    /// matches the requested edge detection.
    pub fn set_pull(&self, offset: Offset, pull: Level) -> Result<()> {
        let mut guard = self.sim.state();
        let s = &mut *guard;
        let elapsed = s.epoch.elapsed().as_nanos() as u64 + 1;
        let chip = s
            .chips
            .get_mut(self.idx)
            .ok_or(Error::UnknownChip(self.idx))?;
        let line = chip
            .lines
            .get_mut(offset as usize)
            .ok_or(Error::InvalidOffset(offset))?;
        let before = line.value();
        line.pull = pull;
        let after = line.value();
        if before == after || line.flags.contains(LineFlags::OUTPUT) {
            return Ok(());
        }
        let (kind, edge) = if after {
            (LineEdgeEventKind::RisingEdge, LineFlags::EDGE_RISING)
        } else {
            (LineEdgeEventKind::FallingEdge, LineFlags::EDGE_FALLING)
        };
        if !line.flags.contains(edge) {
            return Ok(());
        }
        if let Some(Handle::Line(lh)) = line.handle.and_then(|fd| s.handles.get_mut(&fd)) {
            line.line_seqno += 1;
            lh.seqno += 1;
            lh.events.push_back(LineEdgeEvent {
                timestamp_ns: elapsed,
                kind,
                offset,
                seqno: lh.seqno,
                line_seqno: line.line_seqno,
            });
            drop(guard);
            self.sim.notify();
        }
        Ok(())
    }

    /// Pull a line up to simulate the line being externally driven high.
    pub fn pullup(&self, offset: Offset) -> Result<()> {
        self.set_pull(offset, Level::High)
    }

    /// Pull a line down to simulate the line being externally driven low.
    pub fn pulldown(&self, offset: Offset) -> Result<()> {
        self.set_pull(offset, Level::Low)
    }

    /// Toggle the pull on a line.
    pub fn toggle(&self, offset: Offset) -> Result<Level> {
        let value = match self.get_pull(offset)? {
            Level::High => Level::Low,
            Level::Low => Level::High,
        };
        self.set_pull(offset, value)?;
        Ok(value)
    }

    /// Get the current state of the simulated external pull on a line.
    pub fn get_pull(&self, offset: Offset) -> Result<Level> {
        self.with_line(offset, |l| l.pull)
    }

    /// Get the physical level of a line.
    ///
    /// Outputs are at their driven level, inputs at their pulled level.
    pub fn get_level(&self, offset: Offset) -> Result<Level> {
        self.with_line(offset, |l| match l.physical() {
            true => Level::High,
            false => Level::Low,
        })
    }

    /// The flags the line is currently requested with.
    pub fn flags(&self, offset: Offset) -> Result<LineFlags> {
        self.with_line(offset, |l| l.flags)
    }

    /// The consumer of a requested line.
    pub fn consumer(&self, offset: Offset) -> Result<Option<String>> {
        self.with_line(offset, |l| l.consumer.clone())
    }

    /// The debounce period the line is requested with.
    pub fn debounce_us(&self, offset: Offset) -> Result<Option<u32>> {
        self.with_line(offset, |l| l.debounce_us)
    }

    /// Report an error condition on the request holding the line, so
    /// subsequent polls return `POLLERR`.
    pub fn fail_request(&self, offset: Offset) -> Result<()> {
        let mut guard = self.sim.state();
        let s = &mut *guard;
        let chip = s
            .chips
            .get_mut(self.idx)
            .ok_or(Error::UnknownChip(self.idx))?;
        let line = chip
            .lines
            .get_mut(offset as usize)
            .ok_or(Error::InvalidOffset(offset))?;
        if let Some(Handle::Line(lh)) = line.handle.and_then(|fd| s.handles.get_mut(&fd)) {
            lh.failed = true;
        }
        drop(guard);
        self.sim.notify();
        Ok(())
    }
}
