// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use super::{Offset, Pull};
use crate::{Context, DigitalState, Error, Result, UapiCall};
use boardio_uapi::gpio::{self, LineConfig, LineFlags, LineRequest, LineValues};
use boardio_uapi::{AccessMode, FileDescriptor};
use std::path::Path;

/// The longest consumer label the kernel stores, excluding the terminator.
const CONSUMER_MAX: usize = 31;

/// The consumer label recorded against lines requested by a device.
///
/// The label is truncated to fit the kernel field, on a character boundary.
pub fn consumer_label(id: &str) -> String {
    let mut label = format!("boardio.{id}");
    if label.len() > CONSUMER_MAX {
        let mut end = CONSUMER_MAX;
        while !label.is_char_boundary(end) {
            end -= 1;
        }
        label.truncate(end);
    }
    label
}

/// The line config for an input with edge detection.
pub(crate) fn input_config(pull: Pull, debounce_us: Option<u32>) -> LineConfig {
    let mut flags = LineFlags::INPUT | LineFlags::EDGE_RISING | LineFlags::EDGE_FALLING;
    match pull {
        Pull::Off => {}
        Pull::PullUp => flags |= LineFlags::BIAS_PULL_UP,
        Pull::PullDown => flags |= LineFlags::BIAS_PULL_DOWN,
    }
    let mut lc = LineConfig::with_flags(flags);
    if let Some(period) = debounce_us {
        lc.add_debounce(period, 1);
    }
    lc
}

pub(crate) fn output_config(initial: Option<DigitalState>) -> LineConfig {
    let mut lc = LineConfig::with_flags(LineFlags::OUTPUT);
    if let Some(state) = initial {
        let mut values = LineValues::default();
        values.set(0, state.is_high());
        lc.add_output_values(&values);
    }
    lc
}

/// Request a single line from a chip.
///
/// The line must not be in use.  The chip is only held open while the line
/// is being requested.
pub(crate) fn acquire(
    ctx: &Context,
    chip: &Path,
    offset: Offset,
    consumer: &str,
    config: LineConfig,
) -> Result<FileDescriptor> {
    let cf = FileDescriptor::open(ctx.syscalls(), chip, AccessMode::ReadOnly)
        .map_err(|e| Error::from_uapi(UapiCall::Open, e))?;
    let info =
        gpio::get_line_info(&cf, offset).map_err(|e| Error::from_uapi(UapiCall::GetLineInfo, e))?;
    if info.flags.contains(LineFlags::USED) {
        tracing::warn!(
            chip = %chip.display(),
            offset,
            consumer = %info.consumer,
            "line is already in use"
        );
        return Err(Error::LineInUse {
            chip: chip.to_path_buf(),
            offset,
        });
    }
    let lr = LineRequest {
        offsets: vec![offset],
        consumer: consumer.to_string(),
        config,
        ..Default::default()
    };
    let lf = gpio::get_line(&cf, &lr).map_err(|e| Error::from_uapi(UapiCall::GetLine, e))?;
    cf.close().map_err(|e| Error::from_uapi(UapiCall::Close, e))?;
    tracing::debug!(chip = %chip.display(), offset, consumer, "line requested");
    Ok(lf)
}

pub(crate) fn read_value(lf: &FileDescriptor) -> Result<DigitalState> {
    let mut lv = LineValues::masked(1);
    gpio::get_line_values(lf, &mut lv).map_err(|e| Error::from_uapi(UapiCall::GetLineValues, e))?;
    Ok(DigitalState::from(lv.get(0).unwrap_or_default()))
}

pub(crate) fn write_value(lf: &FileDescriptor, state: DigitalState) -> Result<()> {
    let mut lv = LineValues::default();
    lv.set(0, state.is_high());
    gpio::set_line_values(lf, &lv).map_err(|e| Error::from_uapi(UapiCall::SetLineValues, e))
}
