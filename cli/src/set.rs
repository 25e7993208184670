// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::common;
use anyhow::{bail, Context as _, Result};
use boardio::gpio::DigitalOutputConfig;
use boardio::{Context, DigitalState};
use clap::Parser;
use std::thread;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(alias("s"))]
pub struct Opts {
    /// The chip containing the lines
    ///
    /// The chip may be identified by number, name, or path.
    #[arg(short, long, value_name = "chip", default_value = "0")]
    chip: String,

    /// The line states to set
    ///
    /// Each is a line, identified by offset or name, and a state, e.g.
    ///     4=1
    ///     LED=high
    #[arg(value_name = "line=state", required = true, verbatim_doc_comment)]
    line_states: Vec<String>,

    /// Hold the lines for the period, then exit
    ///
    /// If not specified then the lines are held until the process is killed.
    ///
    /// The period is taken as milliseconds unless otherwise specified.
    #[arg(short = 'p', long, value_name = "period", value_parser = common::parse_duration)]
    hold_period: Option<Duration>,

    /// The state to drive the lines to before exiting
    #[arg(long, value_name = "state", value_parser = parse_state)]
    shutdown_state: Option<DigitalState>,
}

pub fn cmd(opts: &Opts) -> Result<bool> {
    let ctx = Context::linux();
    let chip = common::open_chip(&ctx, &opts.chip)?;
    let chip_num = common::chip_number(&opts.chip)?;
    for ls in &opts.line_states {
        let (id, state) = parse_line_state(ls)?;
        let offset = common::resolve_line(&chip, id)?;
        let mut cfg =
            DigitalOutputConfig::new(format!("set-{offset}"), chip_num, offset).with_initial_state(state);
        if let Some(s) = opts.shutdown_state {
            cfg = cfg.with_shutdown_state(s);
        }
        ctx.create_digital_output(cfg)
            .with_context(|| format!("failed to request line {id} from {}", chip.name()))?;
    }
    match opts.hold_period {
        Some(period) => thread::sleep(period),
        None => loop {
            thread::park();
        },
    }
    ctx.shutdown_all()?;
    Ok(true)
}

fn parse_line_state(s: &str) -> Result<(&str, DigitalState)> {
    match s.split_once('=') {
        Some((id, state)) if !id.is_empty() => Ok((id, parse_state(state)?)),
        _ => bail!("invalid line=state: '{s}'"),
    }
}

fn parse_state(s: &str) -> Result<DigitalState> {
    match s.to_ascii_lowercase().as_str() {
        "1" | "high" | "on" | "true" | "active" => Ok(DigitalState::High),
        "0" | "low" | "off" | "false" | "inactive" => Ok(DigitalState::Low),
        _ => bail!("invalid state: '{s}'"),
    }
}
