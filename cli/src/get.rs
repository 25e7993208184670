// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::common::{self, PullFlags};
use anyhow::{Context as _, Result};
use boardio::gpio::DigitalInputConfig;
use boardio::Context;
use clap::Parser;
use std::thread;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(alias("g"))]
pub struct Opts {
    /// The chip containing the lines
    ///
    /// The chip may be identified by number, name, or path.
    #[arg(short, long, value_name = "chip", default_value = "0")]
    chip: String,

    /// The lines to get, identified by offset or name
    #[arg(value_name = "line", required = true)]
    lines: Vec<String>,

    /// The pull to be applied to the lines
    #[arg(short = 'u', long, value_name = "pull", value_enum, ignore_case = true)]
    pull: Option<PullFlags>,

    /// Wait between requesting the lines and reading the states
    ///
    /// This provides time for any pull to take effect.
    ///
    /// The period is taken as milliseconds unless otherwise specified.
    #[arg(short = 'p', long, value_name = "period", value_parser = common::parse_duration)]
    hold_period: Option<Duration>,

    /// Display line states as '0' or '1'
    #[arg(long)]
    numeric: bool,
}

impl Opts {
    fn config(&self, chip: u32, offset: u32) -> DigitalInputConfig {
        let cfg = DigitalInputConfig::new(format!("get-{offset}"), chip, offset);
        match self.pull {
            Some(pull) => cfg.with_pull(pull.into()),
            None => cfg,
        }
    }
}

pub fn cmd(opts: &Opts) -> Result<bool> {
    let ctx = Context::linux();
    let chip = common::open_chip(&ctx, &opts.chip)?;
    let chip_num = common::chip_number(&opts.chip)?;
    let mut inputs = Vec::new();
    for id in &opts.lines {
        let offset = common::resolve_line(&chip, id)?;
        let input = ctx
            .create_digital_input(opts.config(chip_num, offset))
            .with_context(|| format!("failed to request line {id} from {}", chip.name()))?;
        inputs.push((id, input));
    }
    if let Some(period) = opts.hold_period {
        thread::sleep(period);
    }
    let mut states = Vec::new();
    for (id, input) in &inputs {
        let state = input.state()?;
        states.push(if opts.numeric {
            format!("{}", u8::from(state.is_high()))
        } else {
            format!("{id}={state}")
        });
    }
    println!("{}", states.join(" "));
    ctx.shutdown_all()?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use boardio::gpio::Pull;

    #[test]
    fn config() {
        let opts = Opts::try_parse_from(["get", "-u", "pull-down", "-p", "10", "3", "LED"]).unwrap();
        assert_eq!(opts.chip, "0");
        assert_eq!(opts.lines, ["3", "LED"]);
        assert_eq!(opts.hold_period, Some(Duration::from_millis(10)));
        assert_eq!(
            opts.config(0, 3),
            DigitalInputConfig::new("get-3", 0, 3).with_pull(Pull::PullDown)
        );

        let opts = Opts::try_parse_from(["get", "-c", "gpiochip2", "5"]).unwrap();
        assert_eq!(opts.chip, "gpiochip2");
        assert_eq!(opts.config(2, 5), DigitalInputConfig::new("get-5", 2, 5));
    }

    #[test]
    fn lines_required() {
        assert!(Opts::try_parse_from(["get", "-c", "1"]).is_err());
    }
}
