// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;

use boardio_uapi::i2c::{
    Functionality, MessageFlags, RawMessage, RdwrData, SmbusData, SmbusDirection,
    SmbusIoctlData, SmbusSize, ADDRESS_10BIT_MAX, ADDRESS_7BIT_MAX, FUNCS, RDWR, SLAVE, SMBUS,
    SMBUS_BLOCK_MAX, TENBIT,
};
use boardio_uapi::{IoctlArg, NativeStruct};

use super::{errno, Error, Result, Sim};

/// The most messages the kernel accepts in a single `I2C_RDWR`.
const RDWR_MSGS_MAX: u32 = 42;

/// The configuration for a single simulated I2C adapter.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Adapter {
    /// The bus number, so the adapter appears as `/dev/i2c-<number>`.
    pub number: u32,

    /// The capabilities reported by the adapter.
    pub functionality: Functionality,

    /// The addresses of target devices on the bus.
    pub devices: Vec<u16>,
}

impl Adapter {
    pub fn new(number: u32, functionality: Functionality) -> Adapter {
        Adapter {
            number,
            functionality,
            devices: Vec::new(),
        }
    }

    /// Add a target device with a 256 byte register file at the address.
    pub fn device(&mut self, address: u16) -> &mut Self {
        self.devices.push(address);
        self
    }
}

/// A target device: a register file with an auto-incrementing pointer.
#[derive(Debug)]
struct Target {
    registers: [u8; 256],
    pointer: u8,
}

impl Default for Target {
    fn default() -> Self {
        Target {
            registers: [0; 256],
            pointer: 0,
        }
    }
}

impl Target {
    fn read(&mut self, buf: &mut [u8]) {
        for b in buf.iter_mut() {
            *b = self.registers[self.pointer as usize];
            self.pointer = self.pointer.wrapping_add(1);
        }
    }

    /// The first byte written selects the register, the remainder are
    /// written from there.
    fn write(&mut self, data: &[u8]) {
        let Some((reg, values)) = data.split_first() else {
            return;
        };
        self.pointer = *reg;
        for v in values {
            self.registers[self.pointer as usize] = *v;
            self.pointer = self.pointer.wrapping_add(1);
        }
    }

    fn read_from(&mut self, reg: u8, buf: &mut [u8]) {
        self.pointer = reg;
        self.read(buf);
    }

    fn write_to(&mut self, reg: u8, values: &[u8]) {
        self.pointer = reg;
        for v in values {
            self.registers[self.pointer as usize] = *v;
            self.pointer = self.pointer.wrapping_add(1);
        }
    }
}

/// The per-fd state of an open bus.
#[derive(Debug)]
pub(crate) struct I2cHandle {
    pub bus: usize,
    address: Option<u16>,
    ten_bit: bool,
}

impl I2cHandle {
    pub fn new(bus: usize) -> I2cHandle {
        I2cHandle {
            bus,
            address: None,
            ten_bit: false,
        }
    }
}

fn pointer<'a>(arg: IoctlArg<'a>) -> io::Result<&'a mut [u8]> {
    match arg {
        IoctlArg::Pointer(buf) => Ok(buf),
        IoctlArg::Value(_) => Err(errno(libc::EFAULT)),
    }
}

fn value(arg: IoctlArg<'_>) -> io::Result<u64> {
    match arg {
        IoctlArg::Value(v) => Ok(v),
        IoctlArg::Pointer(_) => Err(errno(libc::EINVAL)),
    }
}

fn einval<E>(_: E) -> io::Error {
    errno(libc::EINVAL)
}

fn required(dir: SmbusDirection, size: SmbusSize) -> Functionality {
    let read = dir == SmbusDirection::Read;
    match size {
        SmbusSize::Quick => Functionality::SMBUS_QUICK,
        SmbusSize::Byte if read => Functionality::SMBUS_READ_BYTE,
        SmbusSize::Byte => Functionality::SMBUS_WRITE_BYTE,
        SmbusSize::ByteData if read => Functionality::SMBUS_READ_BYTE_DATA,
        SmbusSize::ByteData => Functionality::SMBUS_WRITE_BYTE_DATA,
        SmbusSize::WordData if read => Functionality::SMBUS_READ_WORD_DATA,
        SmbusSize::WordData => Functionality::SMBUS_WRITE_WORD_DATA,
        SmbusSize::ProcCall => Functionality::SMBUS_PROC_CALL,
        SmbusSize::BlockData if read => Functionality::SMBUS_READ_BLOCK_DATA,
        SmbusSize::BlockData => Functionality::SMBUS_WRITE_BLOCK_DATA,
        SmbusSize::I2cBlockBroken | SmbusSize::I2cBlockData if read => {
            Functionality::SMBUS_READ_I2C_BLOCK
        }
        SmbusSize::I2cBlockBroken | SmbusSize::I2cBlockData => {
            Functionality::SMBUS_WRITE_I2C_BLOCK
        }
        SmbusSize::BlockProcCall => Functionality::SMBUS_BLOCK_PROC_CALL,
    }
}

#[derive(Debug)]
pub(crate) struct BusState {
    pub path: PathBuf,
    number: u32,
    functionality: Functionality,
    devices: BTreeMap<u16, Target>,
}

impl BusState {
    pub fn new(adapter: &Adapter) -> BusState {
        BusState {
            path: PathBuf::from(format!("/dev/i2c-{}", adapter.number)),
            number: adapter.number,
            functionality: adapter.functionality,
            devices: adapter
                .devices
                .iter()
                .map(|a| (*a, Target::default()))
                .collect(),
        }
    }

    fn target(&mut self, address: Option<u16>) -> io::Result<&mut Target> {
        address
            .and_then(|a| self.devices.get_mut(&a))
            .ok_or_else(|| errno(libc::ENXIO))
    }

    fn plain_target(&mut self, h: &I2cHandle) -> io::Result<&mut Target> {
        if !self.functionality.supports_i2c() {
            return Err(errno(libc::EOPNOTSUPP));
        }
        self.target(h.address)
    }

    pub fn read(&mut self, h: &I2cHandle, buf: &mut [u8]) -> io::Result<usize> {
        self.plain_target(h)?.read(buf);
        Ok(buf.len())
    }

    pub fn write(&mut self, h: &I2cHandle, buf: &[u8]) -> io::Result<usize> {
        self.plain_target(h)?.write(buf);
        Ok(buf.len())
    }

    pub fn ioctl(&mut self, h: &mut I2cHandle, request: u64, arg: IoctlArg<'_>) -> io::Result<i32> {
        match request {
            r if r == SLAVE.code() => {
                let address = value(arg)?;
                let max = if h.ten_bit {
                    ADDRESS_10BIT_MAX
                } else {
                    ADDRESS_7BIT_MAX
                };
                if address > max as u64 {
                    return Err(errno(libc::EINVAL));
                }
                h.address = Some(address as u16);
                Ok(0)
            }
            r if r == TENBIT.code() => {
                let enable = value(arg)? != 0;
                if enable && !self.functionality.contains(Functionality::TEN_BIT_ADDR) {
                    return Err(errno(libc::EOPNOTSUPP));
                }
                h.ten_bit = enable;
                Ok(0)
            }
            r if r == FUNCS.code() => {
                let buf = pointer(arg)?;
                self.functionality.to_bytes(buf).map_err(einval)?;
                Ok(0)
            }
            r if r == RDWR.code() => {
                let buf = pointer(arg)?;
                self.rdwr(buf)
            }
            r if r == SMBUS.code() => {
                let buf = pointer(arg)?;
                self.smbus(h, buf)
            }
            _ => Err(errno(libc::ENOTTY)),
        }
    }

    fn rdwr(&mut self, buf: &[u8]) -> io::Result<i32> {
        if !self.functionality.supports_i2c() {
            return Err(errno(libc::EOPNOTSUPP));
        }
        let data = RdwrData::from_bytes(buf).map_err(einval)?;
        if data.nmsgs > RDWR_MSGS_MAX || data.msgs == 0 {
            return Err(errno(libc::EINVAL));
        }
        let size = RawMessage::size();
        // SAFETY: the caller marshalled nmsgs messages at msgs, and the array
        // outlives the ioctl.
        let array =
            unsafe { std::slice::from_raw_parts(data.msgs as *const u8, data.nmsgs as usize * size) };
        for slot in array.chunks_exact(size) {
            let msg = RawMessage::from_bytes(slot).map_err(einval)?;
            let max = if msg.flags.contains(MessageFlags::TEN) {
                ADDRESS_10BIT_MAX
            } else {
                ADDRESS_7BIT_MAX
            };
            if msg.addr > max {
                return Err(errno(libc::EINVAL));
            }
            let target = self.target(Some(msg.addr))?;
            if msg.len == 0 {
                continue;
            }
            if msg.flags.contains(MessageFlags::RD) {
                // SAFETY: the message buffer is len bytes owned by the caller
                // for the duration of the ioctl.
                let rx =
                    unsafe { std::slice::from_raw_parts_mut(msg.buf as *mut u8, msg.len as usize) };
                target.read(rx);
            } else {
                // SAFETY: as above, but read only.
                let tx =
                    unsafe { std::slice::from_raw_parts(msg.buf as *const u8, msg.len as usize) };
                target.write(tx);
            }
        }
        Ok(data.nmsgs as i32)
    }

    fn smbus(&mut self, h: &I2cHandle, buf: &[u8]) -> io::Result<i32> {
        let args = SmbusIoctlData::from_bytes(buf).map_err(einval)?;
        if !self
            .functionality
            .contains(required(args.read_write, args.size))
        {
            return Err(errno(libc::EOPNOTSUPP));
        }
        let target = self.target(h.address)?;
        let needs_data = !matches!(
            (args.size, args.read_write),
            (SmbusSize::Quick, _) | (SmbusSize::Byte, SmbusDirection::Write)
        );
        if !needs_data {
            if args.size == SmbusSize::Byte {
                target.pointer = args.command;
            }
            return Ok(0);
        }
        if args.data == 0 {
            return Err(errno(libc::EINVAL));
        }
        // SAFETY: the caller marshalled an i2c_smbus_data at data, which
        // outlives the ioctl.
        let raw = unsafe { std::slice::from_raw_parts_mut(args.data as *mut u8, SmbusData::size()) };
        let mut data = SmbusData::from_bytes(raw).map_err(einval)?;
        let cmd = args.command;
        let read = args.read_write == SmbusDirection::Read;
        match args.size {
            SmbusSize::Byte => {
                let mut b = [0u8];
                target.read(&mut b);
                data = SmbusData::from_byte(b[0]).map_err(einval)?;
            }
            SmbusSize::ByteData if read => {
                let mut b = [0u8];
                target.read_from(cmd, &mut b);
                data = SmbusData::from_byte(b[0]).map_err(einval)?;
            }
            SmbusSize::ByteData => {
                target.write_to(cmd, &[data.byte().map_err(einval)?]);
            }
            SmbusSize::WordData if read => {
                let mut w = [0u8; 2];
                target.read_from(cmd, &mut w);
                data = SmbusData::from_word(u16::from_le_bytes(w)).map_err(einval)?;
            }
            SmbusSize::WordData => {
                target.write_to(cmd, &data.word().map_err(einval)?.to_le_bytes());
            }
            SmbusSize::ProcCall => {
                target.write_to(cmd, &data.word().map_err(einval)?.to_le_bytes());
                let mut w = [0u8; 2];
                target.read_from(cmd, &mut w);
                data = SmbusData::from_word(u16::from_le_bytes(w)).map_err(einval)?;
            }
            SmbusSize::BlockData if read => {
                let mut block = [0u8; SMBUS_BLOCK_MAX];
                target.read_from(cmd, &mut block);
                data = SmbusData::from_block(&block).map_err(einval)?;
            }
            SmbusSize::I2cBlockBroken | SmbusSize::I2cBlockData if read => {
                let len = data.block().map_err(einval)?.len();
                if len == 0 {
                    return Err(errno(libc::EINVAL));
                }
                let mut block = vec![0u8; len];
                target.read_from(cmd, &mut block);
                data = SmbusData::from_block(&block).map_err(einval)?;
            }
            SmbusSize::BlockData | SmbusSize::I2cBlockBroken | SmbusSize::I2cBlockData => {
                let block = data.block().map_err(einval)?;
                if block.is_empty() {
                    return Err(errno(libc::EINVAL));
                }
                target.write_to(cmd, &block);
            }
            SmbusSize::BlockProcCall => {
                let block = data.block().map_err(einval)?;
                target.write_to(cmd, &block);
                let mut reply = vec![0u8; block.len()];
                target.read_from(cmd, &mut reply);
                data = SmbusData::from_block(&reply).map_err(einval)?;
            }
            SmbusSize::Quick => {}
        }
        data.to_bytes(raw).map_err(einval)?;
        Ok(0)
    }
}

/// A live simulated I2C bus.
#[derive(Debug)]
pub struct I2cBus<'a> {
    sim: &'a Sim,
    number: u32,
}

impl<'a> I2cBus<'a> {
    pub(crate) fn new(sim: &'a Sim, number: u32) -> I2cBus<'a> {
        I2cBus { sim, number }
    }

    /// The path to the bus in /dev.
    pub fn dev_path(&self) -> PathBuf {
        PathBuf::from(format!("/dev/i2c-{}", self.number))
    }

    fn with_target<T, F>(&self, address: u16, f: F) -> Result<T>
    where
        F: FnOnce(&mut Target) -> T,
    {
        let mut s = self.sim.state();
        let bus = s
            .buses
            .iter_mut()
            .find(|b| b.number == self.number)
            .ok_or(Error::UnknownBus(self.number))?;
        let target = bus
            .devices
            .get_mut(&address)
            .ok_or(Error::NoDevice(address))?;
        Ok(f(target))
    }

    /// The value of a register on the target device.
    pub fn register(&self, address: u16, reg: u8) -> Result<u8> {
        self.with_target(address, |t| t.registers[reg as usize])
    }

    /// Set a register on the target device, as if the device updated it.
    pub fn set_register(&self, address: u16, reg: u8, value: u8) -> Result<()> {
        self.with_target(address, |t| t.registers[reg as usize] = value)
    }

    /// A run of registers on the target device, wrapping at the end of the
    /// register file.
    pub fn registers(&self, address: u16, start: u8, len: usize) -> Result<Vec<u8>> {
        self.with_target(address, |t| {
            (0..len)
                .map(|i| t.registers[start.wrapping_add(i as u8) as usize])
                .collect()
        })
    }

    /// The current register pointer of the target device.
    pub fn pointer(&self, address: u16) -> Result<u8> {
        self.with_target(address, |t| t.pointer)
    }
}

#[cfg(test)]
mod tests {
    use crate::{builder, Adapter};
    use boardio_uapi::i2c::{self, Functionality, Message};
    use boardio_uapi::{AccessMode, Error, FileDescriptor};

    const EEPROM: u16 = 0x50;

    fn bus(funcs: Functionality) -> (crate::Sim, FileDescriptor) {
        let s = builder()
            .with_adapter(Adapter::new(1, funcs).device(EEPROM))
            .live();
        let bf = FileDescriptor::open(s.syscalls(), "/dev/i2c-1", AccessMode::ReadWrite).unwrap();
        (s, bf)
    }

    #[test]
    fn functionality() {
        let funcs = Functionality::I2C | Functionality::SMBUS_BYTE_DATA;
        let (_s, bf) = bus(funcs);
        assert_eq!(i2c::functionality(&bf).unwrap(), funcs);
    }

    #[test]
    fn slave_address() {
        let (_s, bf) = bus(Functionality::I2C);
        i2c::set_slave_address(&bf, 0x7f).unwrap();
        assert_eq!(
            i2c::set_slave_address(&bf, 0x80).unwrap_err().errno(),
            Some(libc::EINVAL)
        );
        assert_eq!(
            i2c::set_ten_bit(&bf, true).unwrap_err().errno(),
            Some(libc::EOPNOTSUPP)
        );
    }

    #[test]
    fn plain_read_write() {
        let (s, bf) = bus(Functionality::I2C);
        let mut buf = [0u8; 2];
        // no address selected
        assert_eq!(bf.read(&mut buf).unwrap_err().errno(), Some(libc::ENXIO));
        i2c::set_slave_address(&bf, EEPROM).unwrap();
        bf.write(&[0x10, 0xaa, 0xbb]).unwrap();
        assert_eq!(s.i2c_bus(1).registers(EEPROM, 0x10, 2).unwrap(), vec![0xaa, 0xbb]);
        bf.write(&[0x10]).unwrap();
        bf.read(&mut buf).unwrap();
        assert_eq!(buf, [0xaa, 0xbb]);
        assert_eq!(s.i2c_bus(1).pointer(EEPROM).unwrap(), 0x12);
    }

    #[test]
    fn combined_transfer() {
        let (s, bf) = bus(Functionality::I2C);
        s.i2c_bus(1).set_register(EEPROM, 0x20, 0x5a).unwrap();
        let mut rx = [0u8; 1];
        i2c::transfer(
            &bf,
            EEPROM,
            false,
            &mut [Message::Write(&[0x20]), Message::Read(&mut rx)],
        )
        .unwrap();
        assert_eq!(rx, [0x5a]);
        let err = i2c::transfer(&bf, 0x51, false, &mut [Message::Write(&[0])]).unwrap_err();
        assert_eq!(err.errno(), Some(libc::ENXIO));
    }

    #[test]
    fn transfer_unsupported() {
        let (_s, bf) = bus(Functionality::SMBUS_BYTE_DATA);
        let err = i2c::transfer(&bf, EEPROM, false, &mut [Message::Write(&[0])]).unwrap_err();
        assert!(matches!(err, Error::Os { errno, .. } if errno == libc::EOPNOTSUPP));
    }

    #[test]
    fn smbus_byte_and_word() {
        let (s, bf) = bus(Functionality::SMBUS_BYTE_DATA | Functionality::SMBUS_WORD_DATA);
        i2c::set_slave_address(&bf, EEPROM).unwrap();
        i2c::write_byte_data(&bf, 0x01, 0x42).unwrap();
        assert_eq!(i2c::read_byte_data(&bf, 0x01).unwrap(), 0x42);
        i2c::write_word_data(&bf, 0x02, 0x1234).unwrap();
        // low byte first
        assert_eq!(s.i2c_bus(1).registers(EEPROM, 0x02, 2).unwrap(), vec![0x34, 0x12]);
        assert_eq!(i2c::read_word_data(&bf, 0x02).unwrap(), 0x1234);
    }

    #[test]
    fn smbus_blocks() {
        let (s, bf) = bus(Functionality::SMBUS_I2C_BLOCK | Functionality::SMBUS_READ_BLOCK_DATA);
        i2c::set_slave_address(&bf, EEPROM).unwrap();
        i2c::write_i2c_block_data(&bf, 0x40, &[1, 2, 3]).unwrap();
        assert_eq!(s.i2c_bus(1).registers(EEPROM, 0x40, 3).unwrap(), vec![1, 2, 3]);
        assert_eq!(i2c::read_i2c_block_data(&bf, 0x40, 2).unwrap(), vec![1, 2]);
        let block = i2c::read_block_data(&bf, 0x40).unwrap();
        assert_eq!(block.len(), i2c::SMBUS_BLOCK_MAX);
        assert_eq!(&block[..3], &[1, 2, 3]);
    }

    #[test]
    fn smbus_unsupported() {
        let (_s, bf) = bus(Functionality::SMBUS_READ_BYTE_DATA);
        i2c::set_slave_address(&bf, EEPROM).unwrap();
        assert!(i2c::read_byte_data(&bf, 0).is_ok());
        assert_eq!(
            i2c::write_byte_data(&bf, 0, 1).unwrap_err().errno(),
            Some(libc::EOPNOTSUPP)
        );
    }
}
