// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

mod common;

use boardio::gpio::{DigitalInputConfig, DigitalOutputConfig};
use boardio::i2c::{Functionality, I2cConfig};
use boardio::spi::SpiConfig;
use boardio::{Context, Device, DeviceKind, DeviceRegistry, DigitalState, Error, Registry};
use boardio_sim::{Adapter, Bank, Sim};
use common::context;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn board() -> Sim {
    boardio_sim::builder()
        .with_bank(&Bank::new(8, "pinctrl"))
        .with_adapter(Adapter::new(1, Functionality::I2C | Functionality::SMBUS_EMUL).device(0x50))
        .with_spidev(0, 0)
        .live()
}

#[test]
fn registers_created_devices() -> anyhow::Result<()> {
    let sim = board();
    let ctx = context(&sim);
    ctx.create_digital_input(DigitalInputConfig::new("button", 0, 1))?;
    ctx.create_digital_output(DigitalOutputConfig::new("led", 0, 2))?;
    ctx.create_i2c(I2cConfig::new("eeprom", 1, 0x50))?;
    ctx.create_spi(SpiConfig::new("adc", 0, 0))?;

    let registry = ctx.registry();
    assert_eq!(registry.ids(), vec!["adc", "button", "eeprom", "led"]);
    assert!(registry.contains("eeprom"));
    assert!(!registry.contains("rtc"));
    Ok(())
}

#[test]
fn duplicate_id() -> anyhow::Result<()> {
    let sim = board();
    let ctx = context(&sim);
    let led = ctx.create_digital_output(DigitalOutputConfig::new("led", 0, 2))?;
    assert_eq!(
        ctx.create_digital_output(DigitalOutputConfig::new("led", 0, 3))
            .unwrap_err(),
        Error::AlreadyRegistered("led".to_string())
    );
    // nothing was requested for the duplicate
    assert_eq!(sim.chip(0).consumer(3)?, None);
    led.high()?;
    assert_eq!(led.state()?, DigitalState::High);
    Ok(())
}

#[test]
fn empty_id() {
    let sim = board();
    let ctx = context(&sim);
    assert!(matches!(
        ctx.create_spi(SpiConfig::new("", 0, 0)),
        Err(Error::InvalidArgument(_))
    ));
    assert_eq!(sim.open_fds(), 0);
}

#[test]
fn failed_create_registers_nothing() {
    let sim = board();
    let ctx = context(&sim);
    assert!(ctx
        .create_digital_input(DigitalInputConfig::new("button", 0, 9))
        .is_err());
    assert!(ctx.create_i2c(I2cConfig::new("eeprom", 2, 0x50)).is_err());
    assert!(ctx.create_spi(SpiConfig::new("adc", 0, 1)).is_err());
    assert!(ctx.registry().ids().is_empty());
    assert_eq!(sim.open_fds(), 0);
}

#[test]
fn permission_denied() {
    let sim = board();
    let ctx = context(&sim);
    sim.deny(Path::new("/dev/spidev0.0"));
    match ctx.create_spi(SpiConfig::new("adc", 0, 0)) {
        Err(Error::Permission { path, .. }) => {
            assert_eq!(path, PathBuf::from("/dev/spidev0.0"))
        }
        res => panic!("unexpected result: {res:?}"),
    }
    assert!(!ctx.registry().contains("adc"));

    sim.deny(Path::new("/dev/gpiochip0"));
    assert!(matches!(
        ctx.create_digital_output(DigitalOutputConfig::new("led", 0, 2)),
        Err(Error::Permission { .. })
    ));
    assert!(ctx.registry().ids().is_empty());
}

#[test]
fn shutdown() -> anyhow::Result<()> {
    let sim = board();
    let ctx = context(&sim);
    let led = ctx.create_digital_output(DigitalOutputConfig::new("led", 0, 2))?;
    ctx.shutdown("led")?;
    assert!(!ctx.registry().contains("led"));
    assert_eq!(led.low(), Err(Error::Closed("led".to_string())));
    assert!(matches!(
        ctx.shutdown("led"),
        Err(Error::InvalidArgument(_))
    ));

    // the id may be reused
    let led = ctx.create_digital_output(DigitalOutputConfig::new("led", 0, 2))?;
    led.high()?;
    Ok(())
}

#[test]
fn shutdown_all() -> anyhow::Result<()> {
    let sim = board();
    let ctx = context(&sim);
    let button = ctx.create_digital_input(DigitalInputConfig::new("button", 0, 1))?;
    button.add_listener(|_| {})?;
    ctx.create_digital_output(DigitalOutputConfig::new("led", 0, 2))?;
    ctx.create_i2c(I2cConfig::new("eeprom", 1, 0x50))?;
    ctx.create_spi(SpiConfig::new("adc", 0, 0))?;
    assert_eq!(sim.open_fds(), 4);

    ctx.shutdown_all()?;
    assert!(ctx.registry().ids().is_empty());
    assert_eq!(sim.open_fds(), 0);
    Ok(())
}

#[test]
fn external_registry() -> anyhow::Result<()> {
    let sim = board();
    let registry = Arc::new(DeviceRegistry::new());
    let ctx = Context::with_syscalls(sim.syscalls()).with_registry(registry.clone());
    ctx.create_spi(SpiConfig::new("adc", 0, 0))?;
    assert_eq!(registry.len(), 1);
    let dev = registry.get("adc").expect("adc should be registered");
    assert_eq!(dev.kind(), DeviceKind::Spi);
    assert_eq!(dev.id(), "adc");
    ctx.shutdown("adc")?;
    assert!(registry.is_empty());
    Ok(())
}

#[test]
fn shared_buses_per_context() -> anyhow::Result<()> {
    let sim = board();
    let ctx = context(&sim);
    let a = ctx.i2c_bus(1)?;
    let b = ctx.i2c_bus(1)?;
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.number(), 1);
    assert!(a.functionality().supports_i2c());

    let other = context(&sim);
    assert!(!Arc::ptr_eq(&a, &other.i2c_bus(1)?));
    Ok(())
}
