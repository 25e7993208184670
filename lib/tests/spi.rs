// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

mod common;

use boardio::spi::{BitOrder, Mode, SpiConfig, BITS_PER_WORD, DEFAULT_BAUD};
use boardio::{Device, DeviceKind, Error};
use boardio_sim::Sim;
use boardio_uapi::spi::SpiMode;
use common::context;
use std::path::PathBuf;

fn spidev() -> Sim {
    boardio_sim::builder().with_spidev(0, 1).live()
}

#[test]
fn defaults() -> anyhow::Result<()> {
    let sim = spidev();
    let ctx = context(&sim);
    let adc = ctx.create_spi(SpiConfig::new("adc", 0, 1))?;
    assert_eq!(adc.kind(), DeviceKind::Spi);
    assert_eq!(adc.path(), PathBuf::from("/dev/spidev0.1"));

    let sd = sim.spidev(0, 1);
    assert_eq!(sd.mode()?, SpiMode::empty());
    assert_eq!(sd.bits_per_word()?, BITS_PER_WORD);
    assert_eq!(sd.speed_hz()?, DEFAULT_BAUD);
    assert!(!sd.lsb_first()?);

    let settings = adc.settings();
    assert_eq!(settings.mode, SpiMode::empty());
    assert_eq!(settings.bits_per_word, BITS_PER_WORD);
    assert_eq!(settings.speed_hz, DEFAULT_BAUD);
    assert_eq!(settings.bit_order, BitOrder::MsbFirst);
    Ok(())
}

#[test]
fn configured() -> anyhow::Result<()> {
    let sim = spidev();
    let ctx = context(&sim);
    let adc = ctx.create_spi(
        SpiConfig::new("adc", 0, 1)
            .with_mode(Mode::Mode3)
            .with_baud(2_000_000)
            .with_bit_order(BitOrder::LsbFirst),
    )?;
    let sd = sim.spidev(0, 1);
    assert_eq!(sd.mode()?, SpiMode::CPOL | SpiMode::CPHA);
    assert_eq!(sd.speed_hz()?, 2_000_000);
    assert!(sd.lsb_first()?);

    let settings = adc.settings();
    assert_eq!(Mode::from(settings.mode), Mode::Mode3);
    assert_eq!(settings.speed_hz, 2_000_000);
    assert_eq!(settings.bit_order, BitOrder::LsbFirst);
    Ok(())
}

#[test]
fn exchange() -> anyhow::Result<()> {
    let sim = spidev();
    let ctx = context(&sim);
    let adc = ctx.create_spi(SpiConfig::new("adc", 0, 1))?;
    let tx = [0x01, 0x80, 0x00, 0xff, 0x5a];
    // the sim loops back what it is sent
    assert_eq!(adc.exchange(&tx)?, tx.to_vec());
    assert_eq!(sim.spidev(0, 1).transfers()?, vec![tx.to_vec()]);
    Ok(())
}

#[test]
fn half_duplex() -> anyhow::Result<()> {
    let sim = spidev();
    let ctx = context(&sim);
    let adc = ctx.create_spi(SpiConfig::new("adc", 0, 1))?;
    assert_eq!(adc.write(&[1, 2, 3])?, 3);
    adc.write_byte(0x42)?;
    let mut buf = [0xffu8; 2];
    assert_eq!(adc.read(&mut buf)?, 2);
    assert_eq!(buf, [0, 0]);
    assert_eq!(adc.read_byte()?, 0);
    assert_eq!(
        sim.spidev(0, 1).transfers()?,
        vec![vec![1, 2, 3], vec![0x42], vec![0, 0], vec![0]]
    );
    Ok(())
}

#[test]
fn missing() {
    let sim = spidev();
    let ctx = context(&sim);
    assert_eq!(
        ctx.create_spi(SpiConfig::new("adc", 1, 0)).unwrap_err(),
        Error::NotFound(PathBuf::from("/dev/spidev1.0"))
    );
    assert!(ctx.registry().ids().is_empty());
}

#[test]
fn shutdown() -> anyhow::Result<()> {
    let sim = spidev();
    let ctx = context(&sim);
    let adc = ctx.create_spi(SpiConfig::new("adc", 0, 1))?;
    ctx.shutdown("adc")?;
    let closed = Error::Closed("adc".to_string());
    assert_eq!(adc.exchange(&[1]), Err(closed.clone()));
    assert_eq!(adc.write_byte(1), Err(closed.clone()));
    assert_eq!(adc.shutdown(&ctx), Err(closed));
    assert_eq!(sim.open_fds(), 0);
    Ok(())
}
