// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::common;
use anyhow::{Context as _, Result};
use boardio::gpio::{chips, Bias, Chip, Direction, EdgeDetection, LineInfo};
use boardio::Context;
use clap::Parser;

#[derive(Debug, Parser)]
#[command(aliases(["l", "info"]))]
pub struct Opts {
    /// Only get information for the specified lines
    ///
    /// The lines are identified by offset or name.
    ///
    /// If not specified then all lines are returned.
    #[arg(value_name = "line", requires = "chip")]
    lines: Vec<String>,

    /// Restrict scope to the lines on this chip
    ///
    /// If not specified then the scope is all chips in the system.
    ///
    /// The chip may be identified by number, name, or path.
    /// e.g. the following all select the same chip:
    ///     -c 0
    ///     -c gpiochip0
    ///     -c /dev/gpiochip0
    #[arg(short, long, value_name = "chip", verbatim_doc_comment)]
    chip: Option<String>,

    /// Emit output in JSON format
    #[cfg(feature = "json")]
    #[arg(long)]
    json: bool,
}

pub fn cmd(opts: &Opts) -> Result<bool> {
    let ctx = Context::linux();
    let chips = match &opts.chip {
        Some(id) => vec![common::open_chip(&ctx, id)?],
        None => chips()
            .context("unable to find any chips")?
            .iter()
            .map(|p| Chip::from_path(&ctx, p))
            .collect::<boardio::Result<Vec<Chip>>>()?,
    };
    for chip in &chips {
        let infos = if opts.lines.is_empty() {
            chip.line_infos()?
        } else {
            opts.lines
                .iter()
                .map(|id| Ok(chip.line_info(common::resolve_line(chip, id)?)?))
                .collect::<Result<Vec<LineInfo>>>()?
        };
        emit(opts, chip, &infos)?;
    }
    Ok(true)
}

#[cfg(feature = "json")]
fn emit(opts: &Opts, chip: &Chip, infos: &[LineInfo]) -> Result<()> {
    if opts.json {
        println!("{}", serde_json::to_string(infos)?);
        return Ok(());
    }
    print_lines(chip, infos);
    Ok(())
}

#[cfg(not(feature = "json"))]
fn emit(_opts: &Opts, chip: &Chip, infos: &[LineInfo]) -> Result<()> {
    print_lines(chip, infos);
    Ok(())
}

fn print_lines(chip: &Chip, infos: &[LineInfo]) {
    println!("{} - {} lines:", chip.name(), infos.len());
    for li in infos {
        let lname = if li.name.is_empty() {
            "unnamed".to_string()
        } else {
            format!("\"{}\"", li.name)
        };
        println!("\tline {:>3}:\t{:16}\t{}", li.offset, lname, stringify_attrs(li));
    }
}

fn stringify_attrs(li: &LineInfo) -> String {
    let mut attrs = Vec::new();
    if li.used {
        attrs.push("used".to_string());
    }
    attrs.push(
        match li.direction {
            Direction::Input => "input",
            Direction::Output => "output",
        }
        .to_string(),
    );
    if li.active_low {
        attrs.push("active-low".to_string());
    }
    match li.bias {
        Some(Bias::PullUp) => attrs.push("bias=pull-up".to_string()),
        Some(Bias::PullDown) => attrs.push("bias=pull-down".to_string()),
        Some(Bias::Disabled) => attrs.push("bias=disabled".to_string()),
        None => {}
    }
    match li.edge_detection {
        Some(EdgeDetection::RisingEdge) => attrs.push("edges=rising".to_string()),
        Some(EdgeDetection::FallingEdge) => attrs.push("edges=falling".to_string()),
        Some(EdgeDetection::BothEdges) => attrs.push("edges=both".to_string()),
        None => {}
    }
    if let Some(period) = li.debounce_period {
        attrs.push(format!("debounce-period={period:?}"));
    }
    if !li.consumer.is_empty() {
        attrs.push(format!("consumer=\"{}\"", li.consumer));
    }
    attrs.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn attrs() {
        let li = LineInfo {
            offset: 7,
            name: "button".to_string(),
            consumer: "boardio.button".to_string(),
            used: true,
            bias: Some(Bias::PullDown),
            edge_detection: Some(EdgeDetection::BothEdges),
            debounce_period: Some(Duration::from_micros(99)),
            ..Default::default()
        };
        assert_eq!(
            stringify_attrs(&li),
            "used input bias=pull-down edges=both debounce-period=99µs consumer=\"boardio.button\""
        );
        assert_eq!(stringify_attrs(&LineInfo::default()), "input");
    }
}
