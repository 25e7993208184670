// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::common::{self, PullFlags};
use anyhow::{Context as _, Result};
use boardio::gpio::{Batching, DigitalInputConfig, EdgeDetection, StateChange, WatcherStatus};
use boardio::{Context, DigitalState};
use clap::{Parser, ValueEnum};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Mutex;
use std::time::Duration;

// how often the watcher status is checked while waiting for changes
const STATUS_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Parser)]
#[command(aliases(["w", "edges"]))]
pub struct Opts {
    /// The chip containing the line
    ///
    /// The chip may be identified by number, name, or path.
    #[arg(short, long, value_name = "chip", default_value = "0")]
    chip: String,

    /// The line to watch, identified by offset or name
    #[arg(value_name = "line")]
    line: String,

    /// The pull to be applied to the line
    #[arg(short = 'u', long, value_name = "pull", value_enum, ignore_case = true)]
    pull: Option<PullFlags>,

    /// The debounce period
    ///
    /// The period is taken as milliseconds unless otherwise specified.
    #[arg(short = 'b', long, value_name = "period", value_parser = common::parse_duration)]
    debounce_period: Option<Duration>,

    /// The edges to report
    #[arg(short, long, value_name = "edges", value_enum, default_value = "both")]
    edges: EdgeFlags,

    /// Deliver changes in batches of this many
    #[arg(long, value_name = "count", group = "batching")]
    batch_count: Option<usize>,

    /// Deliver changes in batches at this interval
    ///
    /// The period is taken as milliseconds unless otherwise specified.
    #[arg(long, value_name = "period", group = "batching", value_parser = common::parse_duration)]
    batch_period: Option<Duration>,

    /// Exit after the number of changes
    #[arg(short, long, value_name = "num")]
    num_changes: Option<usize>,

    /// Display states as '0' or '1'
    #[arg(long)]
    numeric: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum EdgeFlags {
    Rising,
    Falling,
    Both,
}

impl From<EdgeFlags> for EdgeDetection {
    fn from(e: EdgeFlags) -> Self {
        match e {
            EdgeFlags::Rising => EdgeDetection::RisingEdge,
            EdgeFlags::Falling => EdgeDetection::FallingEdge,
            EdgeFlags::Both => EdgeDetection::BothEdges,
        }
    }
}

impl Opts {
    fn config(&self, chip: u32, offset: u32) -> DigitalInputConfig {
        let mut cfg =
            DigitalInputConfig::new(format!("watch-{offset}"), chip, offset).with_edges(self.edges.into());
        if let Some(pull) = self.pull {
            cfg = cfg.with_pull(pull.into());
        }
        if let Some(period) = self.debounce_period {
            cfg = cfg.with_debounce(period);
        }
        if let Some(count) = self.batch_count {
            cfg = cfg.with_batching(Batching::Count(count));
        }
        if let Some(period) = self.batch_period {
            cfg = cfg.with_batching(Batching::Period(period));
        }
        cfg
    }
}

pub fn cmd(opts: &Opts) -> Result<bool> {
    let ctx = Context::linux();
    let chip = common::open_chip(&ctx, &opts.chip)?;
    let offset = common::resolve_line(&chip, &opts.line)?;
    let input = ctx
        .create_digital_input(opts.config(common::chip_number(&opts.chip)?, offset))
        .with_context(|| format!("failed to request line {} from {}", opts.line, chip.name()))?;

    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    input.add_listener(move |change: &StateChange| {
        let _ = tx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .send(*change);
    })?;

    let mut count = 0;
    let ok = loop {
        if opts.num_changes.is_some_and(|n| count >= n) {
            break true;
        }
        match rx.recv_timeout(STATUS_INTERVAL) {
            Ok(change) => {
                print_change(&change, opts.numeric);
                count += 1;
            }
            Err(RecvTimeoutError::Timeout) => {
                if let WatcherStatus::Failed(msg) = input.watcher_status() {
                    eprintln!("watcher failed: {msg}");
                    break false;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break false,
        }
    };
    ctx.shutdown_all()?;
    Ok(ok)
}

fn print_change(change: &StateChange, numeric: bool) {
    println!("{}", format_change(change, numeric));
}

fn format_change(change: &StateChange, numeric: bool) -> String {
    let secs = change.timestamp_ns / 1_000_000_000;
    let nanos = change.timestamp_ns % 1_000_000_000;
    let state = if numeric {
        u8::from(change.state == DigitalState::High).to_string()
    } else {
        change.state.to_string()
    };
    format!(
        "{secs}.{nanos:09}\t{}\t{state}\t(seqno {})",
        change.offset, change.line_seqno
    )
}
