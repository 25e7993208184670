// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::common;
use anyhow::{Context as _, Result};
use boardio::i2c::{Functionality, I2cConfig, I2cStrategy};
use boardio::Context;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
pub struct Opts {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Read registers from a device.
    Get(GetOpts),

    /// Write registers on a device.
    Set(SetOpts),

    /// Report the capabilities of a bus.
    Funcs(FuncsOpts),
}

#[derive(Debug, Parser)]
struct Target {
    /// The bus number, as in /dev/i2c-<bus>
    #[arg(value_name = "bus")]
    bus: u32,

    /// The address of the device, in decimal or 0x prefixed hex
    #[arg(value_name = "address", value_parser = common::parse_u16)]
    address: u16,

    /// The device uses 10-bit addressing
    #[arg(long)]
    ten_bit: bool,

    /// How the bus is accessed
    #[arg(short, long, value_name = "strategy", value_enum, default_value = "auto")]
    strategy: StrategyFlags,
}

impl Target {
    fn config(&self) -> I2cConfig {
        I2cConfig::new("i2c", self.bus, self.address)
            .with_ten_bit(self.ten_bit)
            .with_strategy(self.strategy.into())
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StrategyFlags {
    Auto,
    Direct,
    Smbus,
    File,
}

impl From<StrategyFlags> for I2cStrategy {
    fn from(s: StrategyFlags) -> Self {
        match s {
            StrategyFlags::Auto => I2cStrategy::Auto,
            StrategyFlags::Direct => I2cStrategy::Direct,
            StrategyFlags::Smbus => I2cStrategy::SMBus,
            StrategyFlags::File => I2cStrategy::File,
        }
    }
}

#[derive(Debug, Parser)]
struct GetOpts {
    #[command(flatten)]
    target: Target,

    /// The first register to read
    #[arg(value_name = "register", value_parser = common::parse_u8)]
    register: u8,

    /// The number of bytes to read
    #[arg(short = 'n', long, value_name = "num", default_value = "1")]
    len: usize,
}

#[derive(Debug, Parser)]
struct SetOpts {
    #[command(flatten)]
    target: Target,

    /// The first register to write
    #[arg(value_name = "register", value_parser = common::parse_u8)]
    register: u8,

    /// The bytes to write, in decimal or 0x prefixed hex
    #[arg(value_name = "value", value_parser = common::parse_u8)]
    values: Vec<u8>,
}

#[derive(Debug, Parser)]
struct FuncsOpts {
    /// The bus number, as in /dev/i2c-<bus>
    #[arg(value_name = "bus")]
    bus: u32,
}

pub fn cmd(opts: &Opts) -> Result<bool> {
    let ctx = Context::linux();
    match &opts.cmd {
        Command::Get(opts) => {
            let dev = ctx
                .create_i2c(opts.target.config())
                .context("failed to open i2c device")?;
            let mut buf = vec![0u8; opts.len];
            let n = dev.read_register(opts.register, &mut buf)?;
            println!("{}", common::hex(&buf[..n]));
        }
        Command::Set(opts) => {
            let dev = ctx
                .create_i2c(opts.target.config())
                .context("failed to open i2c device")?;
            dev.write_register(opts.register, &opts.values)?;
        }
        Command::Funcs(opts) => {
            let bus = ctx
                .i2c_bus(opts.bus)
                .with_context(|| format!("failed to open i2c bus {}", opts.bus))?;
            print_functionality(bus.functionality());
        }
    }
    ctx.shutdown_all()?;
    Ok(true)
}

fn print_functionality(funcs: Functionality) {
    for (name, flag) in Functionality::all().iter_names() {
        let supported = if funcs.contains(flag) { "yes" } else { "no" };
        println!("{name:32}{supported}");
    }
}
