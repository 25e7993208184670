// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

mod common;

use boardio::i2c::{Functionality, I2cConfig, I2cStrategy};
use boardio::{Device, DeviceKind, Error};
use boardio_sim::{Adapter, Sim};
use boardio_uapi::i2c::{SLAVE, TENBIT};
use common::context;
use std::path::PathBuf;
use std::sync::Arc;

const EEPROM: u16 = 0x50;
const RTC: u16 = 0x68;

fn full_bus() -> Sim {
    boardio_sim::builder()
        .with_adapter(
            Adapter::new(1, Functionality::I2C | Functionality::SMBUS_EMUL)
                .device(EEPROM)
                .device(RTC),
        )
        .live()
}

fn smbus_bus(funcs: Functionality) -> Sim {
    boardio_sim::builder()
        .with_adapter(Adapter::new(2, funcs).device(EEPROM))
        .live()
}

mod direct {
    use super::*;

    #[test]
    fn auto_resolves() -> anyhow::Result<()> {
        let sim = full_bus();
        let ctx = context(&sim);
        let dev = ctx.create_i2c(I2cConfig::new("eeprom", 1, EEPROM))?;
        assert_eq!(dev.strategy(), I2cStrategy::Direct);
        assert_eq!(dev.address(), EEPROM);
        assert_eq!(dev.kind(), DeviceKind::I2c);
        assert_eq!(dev.bus()?.path(), PathBuf::from("/dev/i2c-1"));
        Ok(())
    }

    #[test]
    fn registers() -> anyhow::Result<()> {
        let sim = full_bus();
        let ctx = context(&sim);
        let dev = ctx.create_i2c(I2cConfig::new("eeprom", 1, EEPROM))?;
        let bus = sim.i2c_bus(1);

        assert_eq!(dev.write_register(0x10, &[1, 2, 3])?, 3);
        assert_eq!(bus.registers(EEPROM, 0x10, 3)?, vec![1, 2, 3]);

        let mut buf = [0u8; 3];
        assert_eq!(dev.read_register(0x10, &mut buf)?, 3);
        assert_eq!(buf, [1, 2, 3]);

        dev.write_register_byte(0x20, 0xa5)?;
        assert_eq!(bus.register(EEPROM, 0x20)?, 0xa5);
        assert_eq!(dev.read_register_byte(0x20)?, 0xa5);

        bus.set_register(EEPROM, 0x30, 0x34)?;
        bus.set_register(EEPROM, 0x31, 0x12)?;
        assert_eq!(dev.read_register_word(0x30)?, 0x1234);
        dev.write_register_word(0x40, 0xbeef)?;
        assert_eq!(bus.registers(EEPROM, 0x40, 2)?, vec![0xef, 0xbe]);
        Ok(())
    }

    #[test]
    fn plain() -> anyhow::Result<()> {
        let sim = full_bus();
        let ctx = context(&sim);
        let dev = ctx.create_i2c(I2cConfig::new("eeprom", 1, EEPROM))?;
        let bus = sim.i2c_bus(1);

        // the first byte written sets the register pointer
        assert_eq!(dev.write(&[0x08, 0x11, 0x22])?, 3);
        assert_eq!(bus.registers(EEPROM, 0x08, 2)?, vec![0x11, 0x22]);
        dev.write_byte(0x08)?;
        assert_eq!(bus.pointer(EEPROM)?, 0x08);
        assert_eq!(dev.read_byte()?, 0x11);
        let mut buf = [0u8; 1];
        assert_eq!(dev.read(&mut buf)?, 1);
        assert_eq!(buf, [0x22]);
        Ok(())
    }

    #[test]
    fn transaction() -> anyhow::Result<()> {
        let sim = full_bus();
        let ctx = context(&sim);
        let dev = ctx.create_i2c(I2cConfig::new("eeprom", 1, EEPROM))?;
        sim.i2c_bus(1).set_register(EEPROM, 0x02, 7)?;
        let value = dev.transaction(|tx| {
            let v = tx.read_register_byte(0x02)?;
            tx.write_register_byte(0x03, v + 1)?;
            tx.read_register_byte(0x03)
        })?;
        assert_eq!(value, 8);
        Ok(())
    }

    #[test]
    fn missing_target() -> anyhow::Result<()> {
        let sim = full_bus();
        let ctx = context(&sim);
        let dev = ctx.create_i2c(I2cConfig::new("ghost", 1, 0x11))?;
        assert!(matches!(dev.read_register_byte(0), Err(Error::Uapi(_, _))));
        Ok(())
    }
}

mod bus {
    use super::*;

    #[test]
    fn shared() -> anyhow::Result<()> {
        let sim = full_bus();
        let ctx = context(&sim);
        let eeprom = ctx.create_i2c(I2cConfig::new("eeprom", 1, EEPROM))?;
        let rtc = ctx.create_i2c(I2cConfig::new("rtc", 1, RTC))?;
        assert!(Arc::ptr_eq(&eeprom.bus()?, &rtc.bus()?));
        assert_eq!(sim.open_fds(), 1);

        ctx.shutdown("eeprom")?;
        // still held by the rtc
        assert_eq!(sim.open_fds(), 1);
        ctx.shutdown("rtc")?;
        assert_eq!(sim.open_fds(), 0);
        Ok(())
    }

    #[test]
    fn address_cache() -> anyhow::Result<()> {
        let sim = full_bus();
        let ctx = context(&sim);
        let eeprom = ctx.create_i2c(I2cConfig::new("eeprom", 1, EEPROM))?;
        let rtc = ctx.create_i2c(I2cConfig::new("rtc", 1, RTC))?;
        assert_eq!(sim.ioctl_count(SLAVE), 0);

        eeprom.read_register_byte(0)?;
        assert_eq!(sim.ioctl_count(SLAVE), 1);
        eeprom.write_register_byte(1, 2)?;
        eeprom.read_register_byte(1)?;
        assert_eq!(sim.ioctl_count(SLAVE), 1);

        rtc.read_register_byte(0)?;
        assert_eq!(sim.ioctl_count(SLAVE), 2);
        eeprom.read_register_byte(0)?;
        assert_eq!(sim.ioctl_count(SLAVE), 3);
        assert_eq!(sim.ioctl_count(TENBIT), 0);
        Ok(())
    }

    #[test]
    fn neither_i2c_nor_smbus() {
        let sim = smbus_bus(Functionality::TEN_BIT_ADDR);
        let ctx = context(&sim);
        assert!(matches!(
            ctx.create_i2c(I2cConfig::new("eeprom", 2, EEPROM)),
            Err(Error::Unsupported(_))
        ));
        assert_eq!(sim.open_fds(), 0);
    }

    #[test]
    fn missing() {
        let sim = full_bus();
        let ctx = context(&sim);
        assert_eq!(
            ctx.create_i2c(I2cConfig::new("eeprom", 3, EEPROM))
                .unwrap_err(),
            Error::NotFound(PathBuf::from("/dev/i2c-3"))
        );
    }
}

mod smbus {
    use super::*;

    #[test]
    fn byte_data_only() -> anyhow::Result<()> {
        let sim = smbus_bus(Functionality::SMBUS_BYTE_DATA);
        let ctx = context(&sim);
        let dev = ctx.create_i2c(I2cConfig::new("eeprom", 2, EEPROM))?;
        assert_eq!(dev.strategy(), I2cStrategy::SMBus);

        dev.write_register_byte(5, 0xaa)?;
        assert_eq!(sim.i2c_bus(2).register(EEPROM, 5)?, 0xaa);
        assert_eq!(dev.read_register_byte(5)?, 0xaa);

        assert!(matches!(
            dev.read_register_word(5),
            Err(Error::Unsupported(_))
        ));
        assert!(matches!(
            dev.write_register_word(5, 1),
            Err(Error::Unsupported(_))
        ));
        let mut buf = [0u8; 4];
        assert!(matches!(
            dev.read_register(5, &mut buf),
            Err(Error::Unsupported(_))
        ));
        assert!(matches!(
            dev.write_register(5, &[1, 2, 3, 4]),
            Err(Error::Unsupported(_))
        ));
        assert!(matches!(dev.read_byte(), Err(Error::Unsupported(_))));
        assert!(matches!(dev.write(&[1, 2]), Err(Error::Unsupported(_))));
        Ok(())
    }

    #[test]
    fn words_and_blocks() -> anyhow::Result<()> {
        let sim = smbus_bus(Functionality::SMBUS_EMUL);
        let ctx = context(&sim);
        let dev = ctx.create_i2c(
            I2cConfig::new("eeprom", 2, EEPROM).with_strategy(I2cStrategy::SMBus),
        )?;
        let bus = sim.i2c_bus(2);

        dev.write_register_word(0x10, 0x1234)?;
        assert_eq!(bus.registers(EEPROM, 0x10, 2)?, vec![0x34, 0x12]);
        assert_eq!(dev.read_register_word(0x10)?, 0x1234);

        let block: Vec<u8> = (1..=8).collect();
        assert_eq!(dev.write_register(0x20, &block)?, 8);
        assert_eq!(bus.registers(EEPROM, 0x20, 8)?, block);
        let mut buf = [0u8; 8];
        assert_eq!(dev.read_register(0x20, &mut buf)?, 8);
        assert_eq!(buf.to_vec(), block);

        let mut big = [0u8; 33];
        assert!(matches!(
            dev.read_register(0, &mut big),
            Err(Error::Unsupported(_))
        ));
        assert!(matches!(
            dev.write_register(0, &big),
            Err(Error::Unsupported(_))
        ));

        // a register write without data is a send byte
        dev.write_register(0x42, &[])?;
        assert_eq!(bus.pointer(EEPROM)?, 0x42);
        dev.write_byte(0x20)?;
        assert_eq!(dev.read_byte()?, 1);
        Ok(())
    }

    #[test]
    fn direct_unsupported() {
        let sim = smbus_bus(Functionality::SMBUS_BYTE_DATA);
        let ctx = context(&sim);
        assert!(matches!(
            ctx.create_i2c(I2cConfig::new("eeprom", 2, EEPROM).with_strategy(I2cStrategy::Direct)),
            Err(Error::Unsupported(_))
        ));
        assert!(ctx.registry().ids().is_empty());
    }
}

mod file {
    use super::*;

    #[test]
    fn registers() -> anyhow::Result<()> {
        let sim = full_bus();
        let ctx = context(&sim);
        let dev = ctx.create_i2c(
            I2cConfig::new("eeprom", 1, EEPROM).with_strategy(I2cStrategy::File),
        )?;
        assert_eq!(dev.strategy(), I2cStrategy::File);
        assert_eq!(dev.write_register(0x50, &[9, 8, 7])?, 3);
        assert_eq!(sim.i2c_bus(1).registers(EEPROM, 0x50, 3)?, vec![9, 8, 7]);
        let mut buf = [0u8; 3];
        assert_eq!(dev.read_register(0x50, &mut buf)?, 3);
        assert_eq!(buf, [9, 8, 7]);
        Ok(())
    }
}

mod addressing {
    use super::*;

    #[test]
    fn ten_bit_unsupported() {
        let sim = full_bus();
        let ctx = context(&sim);
        assert!(matches!(
            ctx.create_i2c(I2cConfig::new("wide", 1, 0x150).with_ten_bit(true)),
            Err(Error::Unsupported(_))
        ));
        assert!(ctx.registry().ids().is_empty());
    }

    #[test]
    fn ten_bit() -> anyhow::Result<()> {
        let sim = boardio_sim::builder()
            .with_adapter(
                Adapter::new(4, Functionality::I2C | Functionality::TEN_BIT_ADDR)
                    .device(0x150)
                    .device(EEPROM),
            )
            .live();
        let ctx = context(&sim);
        let wide = ctx.create_i2c(I2cConfig::new("wide", 4, 0x150).with_ten_bit(true))?;
        let narrow = ctx.create_i2c(I2cConfig::new("narrow", 4, EEPROM))?;

        wide.write_register_byte(3, 0x33)?;
        assert_eq!(sim.i2c_bus(4).register(0x150, 3)?, 0x33);
        assert_eq!(wide.read_register_byte(3)?, 0x33);
        assert_eq!(sim.ioctl_count(TENBIT), 1);

        narrow.write_register_byte(3, 0x44)?;
        assert_eq!(sim.i2c_bus(4).register(EEPROM, 3)?, 0x44);
        assert_eq!(sim.ioctl_count(TENBIT), 2);
        Ok(())
    }

    #[test]
    fn out_of_range() {
        let sim = full_bus();
        let ctx = context(&sim);
        assert!(matches!(
            ctx.create_i2c(I2cConfig::new("eeprom", 1, 0x80)),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            ctx.create_i2c(I2cConfig::new("eeprom", 1, 0x400).with_ten_bit(true)),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(sim.open_fds(), 0);
    }
}

#[test]
fn shutdown() -> anyhow::Result<()> {
    let sim = full_bus();
    let ctx = context(&sim);
    let dev = ctx.create_i2c(I2cConfig::new("eeprom", 1, EEPROM))?;
    ctx.shutdown("eeprom")?;
    let closed = Error::Closed("eeprom".to_string());
    assert_eq!(dev.read_byte(), Err(closed.clone()));
    assert_eq!(dev.write_register_byte(0, 1), Err(closed.clone()));
    assert_eq!(dev.bus().unwrap_err(), closed.clone());
    assert_eq!(dev.shutdown(&ctx), Err(closed));
    assert_eq!(sim.open_fds(), 0);

    // the bus is reopened for a new device
    let dev = ctx.create_i2c(I2cConfig::new("eeprom", 1, EEPROM))?;
    dev.write_register_byte(0, 1)?;
    assert_eq!(sim.open_fds(), 1);
    Ok(())
}
