// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use bitflags::bitflags;
use std::sync::OnceLock;

use crate::fd::{FileDescriptor, Request};
use crate::layout::{Decoder, Encoder, Kind, Layout, NativeStruct};
use crate::{Error, Result};

/// Select the address of the target device for plain reads, writes and
/// SMBus transactions.
pub const SLAVE: Request = Request::new("I2C_SLAVE", 0x0703);
/// Select 10-bit (non-zero) or 7-bit (zero) addressing.
pub const TENBIT: Request = Request::new("I2C_TENBIT", 0x0704);
/// Read the adapter [`Functionality`].
pub const FUNCS: Request = Request::new("I2C_FUNCS", 0x0705);
/// Perform a combined transfer of one or more messages.
pub const RDWR: Request = Request::new("I2C_RDWR", 0x0707);
/// Perform an SMBus transaction.
pub const SMBUS: Request = Request::new("I2C_SMBUS", 0x0720);

/// The largest SMBus block transfer, in bytes.
pub const SMBUS_BLOCK_MAX: usize = 32;

/// The largest 7-bit address.
pub const ADDRESS_7BIT_MAX: u16 = 0x7f;
/// The largest 10-bit address.
pub const ADDRESS_10BIT_MAX: u16 = 0x3ff;

bitflags! {
    /// The capabilities of an I2C adapter, as reported by `I2C_FUNCS`.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct Functionality: u64 {
        /// Plain i2c-level commands, i.e. `I2C_RDWR` transfers.
        const I2C = 0x0000_0001;
        /// 10-bit addresses.
        const TEN_BIT_ADDR = 0x0000_0002;
        const PROTOCOL_MANGLING = 0x0000_0004;
        const SMBUS_PEC = 0x0000_0008;
        const NOSTART = 0x0000_0010;
        const SLAVE = 0x0000_0020;
        const SMBUS_BLOCK_PROC_CALL = 0x0000_8000;
        const SMBUS_QUICK = 0x0001_0000;
        const SMBUS_READ_BYTE = 0x0002_0000;
        const SMBUS_WRITE_BYTE = 0x0004_0000;
        const SMBUS_READ_BYTE_DATA = 0x0008_0000;
        const SMBUS_WRITE_BYTE_DATA = 0x0010_0000;
        const SMBUS_READ_WORD_DATA = 0x0020_0000;
        const SMBUS_WRITE_WORD_DATA = 0x0040_0000;
        const SMBUS_PROC_CALL = 0x0080_0000;
        const SMBUS_READ_BLOCK_DATA = 0x0100_0000;
        const SMBUS_WRITE_BLOCK_DATA = 0x0200_0000;
        const SMBUS_READ_I2C_BLOCK = 0x0400_0000;
        const SMBUS_WRITE_I2C_BLOCK = 0x0800_0000;
        const SMBUS_HOST_NOTIFY = 0x1000_0000;

        const SMBUS_BYTE = Self::SMBUS_READ_BYTE.bits() | Self::SMBUS_WRITE_BYTE.bits();
        const SMBUS_BYTE_DATA =
            Self::SMBUS_READ_BYTE_DATA.bits() | Self::SMBUS_WRITE_BYTE_DATA.bits();
        const SMBUS_WORD_DATA =
            Self::SMBUS_READ_WORD_DATA.bits() | Self::SMBUS_WRITE_WORD_DATA.bits();
        const SMBUS_BLOCK_DATA =
            Self::SMBUS_READ_BLOCK_DATA.bits() | Self::SMBUS_WRITE_BLOCK_DATA.bits();
        const SMBUS_I2C_BLOCK =
            Self::SMBUS_READ_I2C_BLOCK.bits() | Self::SMBUS_WRITE_I2C_BLOCK.bits();
        const SMBUS_EMUL = Self::SMBUS_QUICK.bits()
            | Self::SMBUS_BYTE.bits()
            | Self::SMBUS_BYTE_DATA.bits()
            | Self::SMBUS_WORD_DATA.bits()
            | Self::SMBUS_PROC_CALL.bits()
            | Self::SMBUS_WRITE_BLOCK_DATA.bits()
            | Self::SMBUS_I2C_BLOCK.bits()
            | Self::SMBUS_PEC.bits();
    }
}

impl Functionality {
    /// Every SMBus transaction kind.
    const SMBUS_ANY: Functionality = Functionality::SMBUS_EMUL
        .union(Functionality::SMBUS_BLOCK_DATA)
        .union(Functionality::SMBUS_BLOCK_PROC_CALL);

    /// True if the adapter supports raw `I2C_RDWR` transfers.
    pub fn supports_i2c(&self) -> bool {
        self.contains(Functionality::I2C)
    }

    /// True if the adapter supports at least one SMBus transaction.
    pub fn supports_smbus(&self) -> bool {
        self.difference(Functionality::SMBUS_PEC)
            .intersects(Functionality::SMBUS_ANY)
    }
}

impl NativeStruct for Functionality {
    fn layout() -> &'static Layout {
        static LAYOUT: OnceLock<Layout> = OnceLock::new();
        LAYOUT.get_or_init(|| Layout::builder("i2c_funcs").field("value", Kind::ULong).build())
    }

    fn from_bytes(buf: &[u8]) -> Result<Self> {
        let d = Decoder::new(Self::layout(), buf)?;
        Ok(Functionality::from_bits_retain(d.get::<usize>("value")? as u64))
    }

    fn to_bytes(&self, buf: &mut [u8]) -> Result<()> {
        let mut e = Encoder::new(Self::layout(), buf)?;
        e.put("value", self.bits() as usize)?;
        Ok(())
    }
}

/// Read the capabilities of the adapter.
pub fn functionality(bf: &FileDescriptor) -> Result<Functionality> {
    bf.ioctl(FUNCS, &Functionality::empty())
}

/// Select the target device for subsequent reads, writes and SMBus transactions.
pub fn set_slave_address(bf: &FileDescriptor, address: u16) -> Result<()> {
    bf.ioctl_value(SLAVE, address as u64)?;
    Ok(())
}

/// Select 10-bit or 7-bit addressing.
pub fn set_ten_bit(bf: &FileDescriptor, enable: bool) -> Result<()> {
    bf.ioctl_value(TENBIT, enable as u64)?;
    Ok(())
}

bitflags! {
    /// Flags of a message within an `I2C_RDWR` transfer.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct MessageFlags: u16 {
        /// Read data from the target to the buffer.
        const RD = 0x0001;
        /// The address is a 10-bit address.
        const TEN = 0x0010;
        const DMA_SAFE = 0x0200;
        const RECV_LEN = 0x0400;
        const NO_RD_ACK = 0x0800;
        const IGNORE_NAK = 0x1000;
        const REV_DIR_ADDR = 0x2000;
        const NOSTART = 0x4000;
        const STOP = 0x8000;
    }
}

/// The kernel `i2c_msg`: one segment of an `I2C_RDWR` transfer.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RawMessage {
    pub addr: u16,
    pub flags: MessageFlags,
    pub len: u16,
    /// The address of the message data.
    pub buf: usize,
}

impl NativeStruct for RawMessage {
    fn layout() -> &'static Layout {
        static LAYOUT: OnceLock<Layout> = OnceLock::new();
        LAYOUT.get_or_init(|| {
            Layout::builder("i2c_msg")
                .field("addr", Kind::U16)
                .field("flags", Kind::U16)
                .field("len", Kind::U16)
                .field("buf", Kind::Pointer)
                .build()
        })
    }

    fn from_bytes(buf: &[u8]) -> Result<Self> {
        let d = Decoder::new(Self::layout(), buf)?;
        Ok(RawMessage {
            addr: d.get("addr")?,
            flags: MessageFlags::from_bits_retain(d.get("flags")?),
            len: d.get("len")?,
            buf: d.get("buf")?,
        })
    }

    fn to_bytes(&self, buf: &mut [u8]) -> Result<()> {
        let mut e = Encoder::new(Self::layout(), buf)?;
        e.put("addr", self.addr)?;
        e.put("flags", self.flags.bits())?;
        e.put("len", self.len)?;
        e.put("buf", self.buf)?;
        Ok(())
    }
}

/// The kernel `i2c_rdwr_ioctl_data`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RdwrData {
    /// The address of an array of [`RawMessage`].
    pub msgs: usize,
    pub nmsgs: u32,
}

impl NativeStruct for RdwrData {
    fn layout() -> &'static Layout {
        static LAYOUT: OnceLock<Layout> = OnceLock::new();
        LAYOUT.get_or_init(|| {
            Layout::builder("i2c_rdwr_ioctl_data")
                .field("msgs", Kind::Pointer)
                .field("nmsgs", Kind::U32)
                .build()
        })
    }

    fn from_bytes(buf: &[u8]) -> Result<Self> {
        let d = Decoder::new(Self::layout(), buf)?;
        Ok(RdwrData {
            msgs: d.get("msgs")?,
            nmsgs: d.get("nmsgs")?,
        })
    }

    fn to_bytes(&self, buf: &mut [u8]) -> Result<()> {
        let mut e = Encoder::new(Self::layout(), buf)?;
        e.put("msgs", self.msgs)?;
        e.put("nmsgs", self.nmsgs)?;
        Ok(())
    }
}

/// A segment of a combined transfer.
#[derive(Debug)]
pub enum Message<'a> {
    /// Write the data to the target.
    Write(&'a [u8]),
    /// Fill the buffer from the target.
    Read(&'a mut [u8]),
}

impl Message<'_> {
    fn len(&self) -> usize {
        match self {
            Message::Write(data) => data.len(),
            Message::Read(buf) => buf.len(),
        }
    }
}

/// Perform a combined transfer to the target at `addr`, with a repeated
/// start between messages.
///
/// The message array is marshalled into a buffer that lives for the
/// duration of the call, and read messages are filled in place.
pub fn transfer(
    bf: &FileDescriptor,
    addr: u16,
    ten_bit: bool,
    msgs: &mut [Message<'_>],
) -> Result<()> {
    let base = if ten_bit {
        MessageFlags::TEN
    } else {
        MessageFlags::empty()
    };
    let mut array = vec![0u8; msgs.len() * RawMessage::size()];
    for (msg, slot) in msgs
        .iter_mut()
        .zip(array.chunks_exact_mut(RawMessage::size()))
    {
        let len = u16::try_from(msg.len())
            .map_err(|_| Error::InvalidArgument(format!("message of {} bytes", msg.len())))?;
        let raw = match msg {
            Message::Write(data) => RawMessage {
                addr,
                flags: base,
                len,
                buf: data.as_ptr() as usize,
            },
            Message::Read(buf) => RawMessage {
                addr,
                flags: base | MessageFlags::RD,
                len,
                buf: buf.as_mut_ptr() as usize,
            },
        };
        raw.to_bytes(slot)?;
    }
    let data = RdwrData {
        msgs: array.as_mut_ptr() as usize,
        nmsgs: msgs.len() as u32,
    };
    bf.ioctl(RDWR, &data)?;
    Ok(())
}

/// The direction of an SMBus transaction.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SmbusDirection {
    Write = 0,
    Read = 1,
}

/// The shape of an SMBus transaction.
#[repr(u32)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SmbusSize {
    Quick = 0,
    Byte = 1,
    ByteData = 2,
    WordData = 3,
    ProcCall = 4,
    BlockData = 5,
    I2cBlockBroken = 6,
    BlockProcCall = 7,
    I2cBlockData = 8,
}

impl TryFrom<u32> for SmbusSize {
    type Error = String;

    fn try_from(v: u32) -> std::result::Result<Self, Self::Error> {
        use SmbusSize::*;
        [
            Quick,
            Byte,
            ByteData,
            WordData,
            ProcCall,
            BlockData,
            I2cBlockBroken,
            BlockProcCall,
            I2cBlockData,
        ]
        .into_iter()
        .find(|s| *s as u32 == v)
        .ok_or_else(|| format!("invalid value: {v}"))
    }
}

/// The kernel `i2c_smbus_data` union.
///
/// The active arm is determined by the [`SmbusSize`] of the transaction,
/// so the raw bytes are held and read through the arm in use.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SmbusData([u8; SMBUS_BLOCK_MAX + 2]);

impl Default for SmbusData {
    fn default() -> Self {
        SmbusData([0; SMBUS_BLOCK_MAX + 2])
    }
}

impl SmbusData {
    pub fn from_byte(value: u8) -> Result<Self> {
        let mut d = SmbusData::default();
        Encoder::new(Self::layout(), &mut d.0)?.put("data.byte", value)?;
        Ok(d)
    }

    pub fn from_word(value: u16) -> Result<Self> {
        let mut d = SmbusData::default();
        Encoder::new(Self::layout(), &mut d.0)?.put("data.word", value)?;
        Ok(d)
    }

    /// A block arm, with the length in the first byte.
    pub fn from_block(data: &[u8]) -> Result<Self> {
        if data.len() > SMBUS_BLOCK_MAX {
            return Err(Error::InvalidArgument(format!(
                "SMBus block of {} bytes exceeds {SMBUS_BLOCK_MAX}",
                data.len()
            )));
        }
        let mut d = SmbusData::default();
        let mut e = Encoder::new(Self::layout(), &mut d.0)?;
        let block = e.bytes("data.block")?;
        block[0] = data.len() as u8;
        block[1..=data.len()].copy_from_slice(data);
        Ok(d)
    }

    pub fn byte(&self) -> Result<u8> {
        Ok(Decoder::new(Self::layout(), &self.0)?.get("data.byte")?)
    }

    pub fn word(&self) -> Result<u16> {
        Ok(Decoder::new(Self::layout(), &self.0)?.get("data.word")?)
    }

    /// The data of a block arm, bounded by [`SMBUS_BLOCK_MAX`].
    pub fn block(&self) -> Result<Vec<u8>> {
        let d = Decoder::new(Self::layout(), &self.0)?;
        let block = d.bytes("data.block")?;
        let len = (block[0] as usize).min(SMBUS_BLOCK_MAX);
        Ok(block[1..=len].to_vec())
    }
}

impl NativeStruct for SmbusData {
    fn layout() -> &'static Layout {
        static LAYOUT: OnceLock<Layout> = OnceLock::new();
        LAYOUT.get_or_init(|| {
            Layout::builder("i2c_smbus_data")
                .union(
                    "data",
                    &[
                        ("byte", Kind::U8),
                        ("word", Kind::U16),
                        ("block", Kind::Bytes(SMBUS_BLOCK_MAX + 2)),
                    ],
                )
                .build()
        })
    }

    fn from_bytes(buf: &[u8]) -> Result<Self> {
        let d = Decoder::new(Self::layout(), buf)?;
        let mut data = SmbusData::default();
        data.0.copy_from_slice(d.bytes("data")?);
        Ok(data)
    }

    fn to_bytes(&self, buf: &mut [u8]) -> Result<()> {
        let mut e = Encoder::new(Self::layout(), buf)?;
        e.bytes("data")?.copy_from_slice(&self.0);
        Ok(())
    }
}

/// The kernel `i2c_smbus_ioctl_data`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SmbusIoctlData {
    pub read_write: SmbusDirection,
    pub command: u8,
    pub size: SmbusSize,
    /// The address of an [`SmbusData`], or 0 for transactions without data.
    pub data: usize,
}

impl NativeStruct for SmbusIoctlData {
    fn layout() -> &'static Layout {
        static LAYOUT: OnceLock<Layout> = OnceLock::new();
        LAYOUT.get_or_init(|| {
            Layout::builder("i2c_smbus_ioctl_data")
                .field("read_write", Kind::U8)
                .field("command", Kind::U8)
                .field("size", Kind::U32)
                .field("data", Kind::Pointer)
                .build()
        })
    }

    fn from_bytes(buf: &[u8]) -> Result<Self> {
        let d = Decoder::new(Self::layout(), buf)?;
        let read_write = match d.get::<u8>("read_write")? {
            0 => SmbusDirection::Write,
            _ => SmbusDirection::Read,
        };
        Ok(SmbusIoctlData {
            read_write,
            command: d.get("command")?,
            size: SmbusSize::try_from(d.get::<u32>("size")?)
                .map_err(|e| crate::ValidationError::new("size", e))?,
            data: d.get("data")?,
        })
    }

    fn to_bytes(&self, buf: &mut [u8]) -> Result<()> {
        let mut e = Encoder::new(Self::layout(), buf)?;
        e.put("read_write", self.read_write as u8)?;
        e.put("command", self.command)?;
        e.put("size", self.size as u32)?;
        e.put("data", self.data)?;
        Ok(())
    }
}

/// Perform an SMBus transaction with the selected target.
///
/// The data, if any, is marshalled into a native buffer for the duration
/// of the call and updated from it afterwards.
pub fn smbus_access(
    bf: &FileDescriptor,
    read_write: SmbusDirection,
    command: u8,
    size: SmbusSize,
    data: Option<&mut SmbusData>,
) -> Result<()> {
    match data {
        Some(data) => {
            let mut raw = data.to_vec()?;
            let args = SmbusIoctlData {
                read_write,
                command,
                size,
                data: raw.as_mut_ptr() as usize,
            };
            bf.ioctl(SMBUS, &args)?;
            *data = SmbusData::from_bytes(&raw)?;
        }
        None => {
            let args = SmbusIoctlData {
                read_write,
                command,
                size,
                data: 0,
            };
            bf.ioctl(SMBUS, &args)?;
        }
    }
    Ok(())
}

/// Send a single bit in the read/write position of the address byte.
pub fn write_quick(bf: &FileDescriptor, bit: bool) -> Result<()> {
    let dir = if bit {
        SmbusDirection::Read
    } else {
        SmbusDirection::Write
    };
    smbus_access(bf, dir, 0, SmbusSize::Quick, None)
}

/// Receive a byte, without a command.
pub fn read_byte(bf: &FileDescriptor) -> Result<u8> {
    let mut data = SmbusData::default();
    smbus_access(bf, SmbusDirection::Read, 0, SmbusSize::Byte, Some(&mut data))?;
    data.byte()
}

/// Send a byte, in the command position.
pub fn write_byte(bf: &FileDescriptor, value: u8) -> Result<()> {
    smbus_access(bf, SmbusDirection::Write, value, SmbusSize::Byte, None)
}

pub fn read_byte_data(bf: &FileDescriptor, command: u8) -> Result<u8> {
    let mut data = SmbusData::default();
    smbus_access(
        bf,
        SmbusDirection::Read,
        command,
        SmbusSize::ByteData,
        Some(&mut data),
    )?;
    data.byte()
}

pub fn write_byte_data(bf: &FileDescriptor, command: u8, value: u8) -> Result<()> {
    let mut data = SmbusData::from_byte(value)?;
    smbus_access(
        bf,
        SmbusDirection::Write,
        command,
        SmbusSize::ByteData,
        Some(&mut data),
    )
}

/// Read a word, low byte first on the wire.
pub fn read_word_data(bf: &FileDescriptor, command: u8) -> Result<u16> {
    let mut data = SmbusData::default();
    smbus_access(
        bf,
        SmbusDirection::Read,
        command,
        SmbusSize::WordData,
        Some(&mut data),
    )?;
    data.word()
}

pub fn write_word_data(bf: &FileDescriptor, command: u8, value: u16) -> Result<()> {
    let mut data = SmbusData::from_word(value)?;
    smbus_access(
        bf,
        SmbusDirection::Write,
        command,
        SmbusSize::WordData,
        Some(&mut data),
    )
}

/// Write a word and read the word returned by the target.
pub fn process_call(bf: &FileDescriptor, command: u8, value: u16) -> Result<u16> {
    let mut data = SmbusData::from_word(value)?;
    smbus_access(
        bf,
        SmbusDirection::Write,
        command,
        SmbusSize::ProcCall,
        Some(&mut data),
    )?;
    data.word()
}

/// Read a block whose length is reported by the target.
pub fn read_block_data(bf: &FileDescriptor, command: u8) -> Result<Vec<u8>> {
    let mut data = SmbusData::default();
    smbus_access(
        bf,
        SmbusDirection::Read,
        command,
        SmbusSize::BlockData,
        Some(&mut data),
    )?;
    data.block()
}

/// Write a block, preceded on the wire by its length.
pub fn write_block_data(bf: &FileDescriptor, command: u8, values: &[u8]) -> Result<()> {
    let mut data = SmbusData::from_block(values)?;
    smbus_access(
        bf,
        SmbusDirection::Write,
        command,
        SmbusSize::BlockData,
        Some(&mut data),
    )
}

/// Read a block of `len` bytes without a length byte on the wire.
pub fn read_i2c_block_data(bf: &FileDescriptor, command: u8, len: usize) -> Result<Vec<u8>> {
    if len > SMBUS_BLOCK_MAX {
        return Err(Error::InvalidArgument(format!(
            "SMBus block of {len} bytes exceeds {SMBUS_BLOCK_MAX}"
        )));
    }
    let mut data = SmbusData::from_block(&[0; SMBUS_BLOCK_MAX][..len])?;
    smbus_access(
        bf,
        SmbusDirection::Read,
        command,
        SmbusSize::I2cBlockData,
        Some(&mut data),
    )?;
    data.block()
}

/// Write a block without a length byte on the wire.
pub fn write_i2c_block_data(bf: &FileDescriptor, command: u8, values: &[u8]) -> Result<()> {
    let mut data = SmbusData::from_block(values)?;
    smbus_access(
        bf,
        SmbusDirection::Write,
        command,
        SmbusSize::I2cBlockBroken,
        Some(&mut data),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    mod functionality {
        use super::*;

        #[test]
        fn size() {
            assert_eq!(Functionality::size(), std::mem::size_of::<libc::c_ulong>());
        }

        #[test]
        fn decode() {
            let raw = (Functionality::I2C | Functionality::SMBUS_READ_BYTE_DATA).to_vec().unwrap();
            let f = Functionality::from_bytes(&raw).unwrap();
            assert!(f.supports_i2c());
            assert!(f.supports_smbus());
            assert!(f.contains(Functionality::SMBUS_READ_BYTE_DATA));
            assert!(!f.contains(Functionality::SMBUS_WRITE_BYTE_DATA));
        }

        #[test]
        fn smbus_support() {
            assert!(!Functionality::empty().supports_smbus());
            assert!(!Functionality::I2C.supports_smbus());
            assert!(!Functionality::SMBUS_PEC.supports_smbus());
            assert!(Functionality::SMBUS_QUICK.supports_smbus());
            assert!(Functionality::SMBUS_READ_BLOCK_DATA.supports_smbus());
        }
    }

    mod raw_message {
        use super::*;

        #[test]
        fn size() {
            let l = RawMessage::layout();
            assert_eq!(l.offset_of("len"), Ok(4));
            assert_eq!(l.offset_of("buf"), Ok(std::mem::size_of::<usize>()));
            assert_eq!(RawMessage::size(), 2 * std::mem::size_of::<usize>());
        }

        #[test]
        fn round_trip() {
            let msg = RawMessage {
                addr: 0x50,
                flags: MessageFlags::RD | MessageFlags::TEN,
                len: 4,
                buf: 0x1234_5678,
            };
            let buf = msg.to_vec().unwrap();
            assert_eq!(&buf[2..4], &0x11u16.to_ne_bytes());
            assert_eq!(RawMessage::from_bytes(&buf).unwrap(), msg);
        }
    }

    mod rdwr_data {
        use super::*;

        #[test]
        fn size() {
            assert_eq!(RdwrData::size(), 2 * std::mem::size_of::<usize>());
        }

        #[test]
        fn round_trip() {
            let data = RdwrData {
                msgs: 0x1234_5678,
                nmsgs: 2,
            };
            let buf = data.to_vec().unwrap();
            let ptr = std::mem::size_of::<usize>();
            assert_eq!(&buf[..ptr], &0x1234_5678usize.to_ne_bytes());
            assert_eq!(&buf[ptr..ptr + 4], &2u32.to_ne_bytes());
            // tail padding
            assert!(buf[ptr + 4..].iter().all(|b| *b == 0));
            assert_eq!(RdwrData::from_bytes(&buf).unwrap(), data);
        }
    }

    mod smbus_data {
        use super::*;

        #[test]
        fn size() {
            assert_eq!(SmbusData::size(), SMBUS_BLOCK_MAX + 2);
        }

        #[test]
        fn arms() {
            assert_eq!(SmbusData::from_byte(0xa5).unwrap().byte().unwrap(), 0xa5);
            let word = SmbusData::from_word(0x1234).unwrap();
            assert_eq!(word.word().unwrap(), 0x1234);
            assert_eq!(word.0[2..], [0; SMBUS_BLOCK_MAX]);
            let block = SmbusData::from_block(&[1, 2, 3]).unwrap();
            assert_eq!(block.0[..5], [3, 1, 2, 3, 0]);
            assert_eq!(block.block().unwrap(), vec![1, 2, 3]);
        }

        #[test]
        fn block_too_long() {
            assert!(matches!(
                SmbusData::from_block(&[0; SMBUS_BLOCK_MAX + 1]),
                Err(Error::InvalidArgument(_))
            ));
        }

        #[test]
        fn block_length_clamped() {
            let mut raw = [0xffu8; SMBUS_BLOCK_MAX + 2];
            raw[0] = 200;
            let data = SmbusData::from_bytes(&raw).unwrap();
            assert_eq!(data.block().unwrap().len(), SMBUS_BLOCK_MAX);
        }
    }

    mod smbus_ioctl_data {
        use super::*;

        #[test]
        fn size() {
            let l = SmbusIoctlData::layout();
            assert_eq!(l.offset_of("size"), Ok(4));
            assert_eq!(l.offset_of("data"), Ok(8));
            assert_eq!(SmbusIoctlData::size(), 8 + std::mem::size_of::<usize>());
        }

        #[test]
        fn round_trip() {
            let args = SmbusIoctlData {
                read_write: SmbusDirection::Read,
                command: 0x10,
                size: SmbusSize::I2cBlockData,
                data: 0xdead_beef,
            };
            let buf = args.to_vec().unwrap();
            assert_eq!(buf[0], 1);
            assert_eq!(&buf[4..8], &8u32.to_ne_bytes());
            assert_eq!(SmbusIoctlData::from_bytes(&buf).unwrap(), args);
        }

        #[test]
        fn invalid_size() {
            let mut buf = SmbusIoctlData {
                read_write: SmbusDirection::Write,
                command: 0,
                size: SmbusSize::Quick,
                data: 0,
            }
            .to_vec()
            .unwrap();
            buf[4] = 9;
            assert!(matches!(
                SmbusIoctlData::from_bytes(&buf),
                Err(Error::Validation(_))
            ));
        }
    }
}
