// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::common;
use anyhow::{Context as _, Result};
use boardio::spi::{BitOrder, Mode, SpiConfig, DEFAULT_BAUD};
use boardio::Context;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
pub struct Opts {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send bytes and report the bytes received while sending them.
    #[command(alias("t"))]
    Transfer(TransferOpts),
}

#[derive(Debug, Parser)]
struct TransferOpts {
    /// The bus number, as in /dev/spidev<bus>.<cs>
    #[arg(short, long, value_name = "bus", default_value = "0")]
    bus: u32,

    /// The chip select, as in /dev/spidev<bus>.<cs>
    #[arg(short = 'c', long, value_name = "cs", default_value = "0")]
    chip_select: u32,

    /// The clock rate, in Hz
    #[arg(short = 's', long, value_name = "hz", default_value_t = DEFAULT_BAUD)]
    baud: u32,

    /// The clock polarity and phase
    #[arg(short, long, value_name = "mode", value_enum, default_value = "0")]
    mode: ModeFlags,

    /// Shift out the least significant bit of each byte first
    #[arg(long)]
    lsb_first: bool,

    /// The bytes to send, in decimal or 0x prefixed hex
    #[arg(value_name = "byte", required = true, value_parser = common::parse_u8)]
    data: Vec<u8>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeFlags {
    #[value(name = "0")]
    Mode0,
    #[value(name = "1")]
    Mode1,
    #[value(name = "2")]
    Mode2,
    #[value(name = "3")]
    Mode3,
}

impl From<ModeFlags> for Mode {
    fn from(m: ModeFlags) -> Self {
        match m {
            ModeFlags::Mode0 => Mode::Mode0,
            ModeFlags::Mode1 => Mode::Mode1,
            ModeFlags::Mode2 => Mode::Mode2,
            ModeFlags::Mode3 => Mode::Mode3,
        }
    }
}

impl TransferOpts {
    fn config(&self) -> SpiConfig {
        let bit_order = if self.lsb_first {
            BitOrder::LsbFirst
        } else {
            BitOrder::MsbFirst
        };
        SpiConfig::new("spi", self.bus, self.chip_select)
            .with_baud(self.baud)
            .with_mode(self.mode.into())
            .with_bit_order(bit_order)
    }
}

pub fn cmd(opts: &Opts) -> Result<bool> {
    let ctx = Context::linux();
    match &opts.cmd {
        Command::Transfer(opts) => {
            let cfg = opts.config();
            let path = cfg.device_path();
            let dev = ctx
                .create_spi(cfg)
                .with_context(|| format!("failed to open '{}'", path.display()))?;
            let rx = dev.exchange(&opts.data)?;
            println!("{}", common::hex(&rx));
        }
    }
    ctx.shutdown_all()?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer(args: &[&str]) -> TransferOpts {
        let opts = Opts::try_parse_from(["spi", "transfer"].iter().chain(args)).unwrap();
        match opts.cmd {
            Command::Transfer(opts) => opts,
        }
    }

    #[test]
    fn defaults() {
        let opts = transfer(&["0x9f", "0"]);
        assert_eq!(opts.data, [0x9f, 0]);
        assert_eq!(opts.config(), SpiConfig::new("spi", 0, 0));
        assert_eq!(opts.config().baud, DEFAULT_BAUD);
    }

    #[test]
    fn config() {
        let opts = transfer(&["-b", "1", "-c", "2", "-s", "2000000", "-m", "3", "--lsb-first", "1"]);
        assert_eq!(
            opts.config(),
            SpiConfig::new("spi", 1, 2)
                .with_baud(2_000_000)
                .with_mode(Mode::Mode3)
                .with_bit_order(BitOrder::LsbFirst)
        );
    }

    #[test]
    fn data_required() {
        assert!(Opts::try_parse_from(["spi", "transfer", "-b", "1"]).is_err());
        assert!(Opts::try_parse_from(["spi", "transfer", "0x100"]).is_err());
    }
}
