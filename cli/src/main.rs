// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A command line tool for accessing GPIO lines, I2C buses and SPI devices.

use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod chip;
mod common;
mod get;
mod i2c;
mod line;
mod set;
mod spi;
mod watch;

fn main() -> ExitCode {
    match Opts::try_parse() {
        Ok(opt) => {
            init_logging(opt.verbose);
            let res = match &opt.cmd {
                Command::Chip(cfg) => chip::cmd(cfg),
                Command::Line(cfg) => line::cmd(cfg),
                Command::Get(cfg) => get::cmd(cfg),
                Command::Set(cfg) => set::cmd(cfg),
                Command::Watch(cfg) => watch::cmd(cfg),
                Command::I2c(cfg) => i2c::cmd(cfg),
                Command::Spi(cfg) => spi::cmd(cfg),
            };
            return match res {
                Ok(true) => ExitCode::SUCCESS,
                Ok(false) => ExitCode::FAILURE,
                Err(e) => {
                    common::emit_error(opt.verbose, &e);
                    ExitCode::FAILURE
                }
            };
        }
        Err(e) => eprintln!("{e}"),
    }
    ExitCode::FAILURE
}

// RUST_LOG overrides the default level.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[derive(Parser)]
#[command(
    name = "boardio",
    about = "A utility to access GPIO lines, I2C buses and SPI devices on Linux.",
    version,
    propagate_version = true
)]
struct Opts {
    /// Provide more detailed error messages and logging.
    #[arg(short = 'v', long, global = true, display_order = 800)]
    pub verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Parser)]
enum Command {
    /// Get information about GPIO chips.
    Chip(chip::Opts),

    /// Get information about GPIO lines.
    Line(line::Opts),

    /// Read the state of a GPIO line.
    Get(get::Opts),

    /// Drive GPIO lines as outputs.
    Set(set::Opts),

    /// Report changes in the state of a GPIO line.
    Watch(watch::Opts),

    /// Access devices on an I2C bus.
    I2c(i2c::Opts),

    /// Transfer data to and from a SPI device.
    Spi(spi::Opts),
}
