// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Byte-exact descriptions of kernel structs, and name-based access to
//! their fields.
//!
//! A [`Layout`] is an ordered list of named fields with offsets computed by
//! the C natural alignment rules, so the size and offsets of a layout match
//! the kernel ABI of the struct it describes.
//!
//! Types that cross the kernel boundary implement [`NativeStruct`] and
//! marshal themselves through a [`Decoder`] or [`Encoder`] bound to their
//! layout, addressing each field by name.

use std::fmt;
use std::mem::{align_of, size_of};
use std::sync::OnceLock;

use crate::Result;

/// The shape of a single field within a [`Layout`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Kind {
    U8,
    U16,
    U32,
    U64,
    I32,
    /// A native pointer.
    Pointer,
    /// A C `unsigned long`.
    ULong,
    /// A fixed length byte array, such as a NUL padded name.
    Bytes(usize),
    /// Reserved bytes that are always zero on the wire.
    Padding(usize),
    /// A nested struct.
    Struct(&'static Layout),
    /// Overlapping arms, all located at offset 0 of the union.
    Union(Vec<Field>),
    /// A fixed length array of elements of the one kind.
    Sequence(Box<Kind>, usize),
}

impl Kind {
    /// The number of bytes occupied by the kind.
    pub fn size(&self) -> usize {
        match self {
            Kind::U8 => 1,
            Kind::U16 => 2,
            Kind::U32 | Kind::I32 => 4,
            Kind::U64 => 8,
            Kind::Pointer => size_of::<*const u8>(),
            Kind::ULong => size_of::<libc::c_ulong>(),
            Kind::Bytes(n) | Kind::Padding(n) => *n,
            Kind::Struct(l) => l.size(),
            Kind::Union(arms) => {
                let raw = arms.iter().map(|f| f.kind.size()).max().unwrap_or(0);
                round_up(raw, self.align())
            }
            Kind::Sequence(k, n) => k.size() * n,
        }
    }

    /// The alignment required by the kind.
    pub fn align(&self) -> usize {
        match self {
            Kind::U8 | Kind::Bytes(_) | Kind::Padding(_) => 1,
            Kind::U16 => align_of::<u16>(),
            Kind::U32 | Kind::I32 => align_of::<u32>(),
            Kind::U64 => align_of::<u64>(),
            Kind::Pointer => align_of::<*const u8>(),
            Kind::ULong => align_of::<libc::c_ulong>(),
            Kind::Struct(l) => l.align(),
            Kind::Union(arms) => arms.iter().map(|f| f.kind.align()).max().unwrap_or(1),
            Kind::Sequence(k, _) => k.align(),
        }
    }
}

/// A named field and its byte offset within the enclosing layout.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Field {
    pub name: &'static str,
    pub offset: usize,
    pub kind: Kind,
}

/// The description of a kernel struct.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Layout {
    name: &'static str,
    fields: Vec<Field>,
    size: usize,
    align: usize,
}

impl Layout {
    /// Start describing the struct with the given C name.
    pub fn builder(name: &'static str) -> LayoutBuilder {
        LayoutBuilder {
            name,
            fields: Vec::new(),
            offset: 0,
            align: 1,
        }
    }

    /// The C name of the struct.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The total size of the struct, including any trailing padding.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn align(&self) -> usize {
        self.align
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Find a top level field by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The offset of the field identified by a dotted path, such as
    /// `attr.value.debounce_period_us`.
    pub fn offset_of(&self, path: &str) -> std::result::Result<usize, LayoutError> {
        self.resolve(path).map(|(offset, _)| offset)
    }

    /// Find the offset and kind of the field identified by a dotted path.
    pub fn resolve(&self, path: &str) -> std::result::Result<(usize, &Kind), LayoutError> {
        let unknown = || LayoutError::UnknownField {
            layout: self.name,
            field: path.to_string(),
        };
        let mut parts = path.split('.');
        let head = parts.next().ok_or_else(unknown)?;
        let f = self.field(head).ok_or_else(unknown)?;
        let mut offset = f.offset;
        let mut kind = &f.kind;
        for part in parts {
            let member = match kind {
                Kind::Struct(l) => l.field(part),
                Kind::Union(arms) => arms.iter().find(|a| a.name == part),
                _ => None,
            }
            .ok_or_else(unknown)?;
            offset += member.offset;
            kind = &member.kind;
        }
        Ok((offset, kind))
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "struct {} ({} bytes)", self.name, self.size)
    }
}

/// Appends fields to a [`Layout`], aligning each as a C compiler would.
#[derive(Debug)]
pub struct LayoutBuilder {
    name: &'static str,
    fields: Vec<Field>,
    offset: usize,
    align: usize,
}

impl LayoutBuilder {
    /// Append a field.
    pub fn field(mut self, name: &'static str, kind: Kind) -> Self {
        let align = kind.align();
        self.offset = round_up(self.offset, align);
        self.align = self.align.max(align);
        let size = kind.size();
        self.fields.push(Field {
            name,
            offset: self.offset,
            kind,
        });
        self.offset += size;
        self
    }

    /// Append explicit reserved bytes.
    pub fn padding(self, name: &'static str, len: usize) -> Self {
        self.field(name, Kind::Padding(len))
    }

    /// Append a union whose arms all start at the union's offset.
    pub fn union(self, name: &'static str, arms: &[(&'static str, Kind)]) -> Self {
        let arms = arms
            .iter()
            .map(|(name, kind)| Field {
                name: *name,
                offset: 0,
                kind: kind.clone(),
            })
            .collect();
        self.field(name, Kind::Union(arms))
    }

    /// Append a fixed length array.
    pub fn sequence(self, name: &'static str, elem: Kind, count: usize) -> Self {
        self.field(name, Kind::Sequence(Box::new(elem), count))
    }

    pub fn build(self) -> Layout {
        Layout {
            name: self.name,
            size: round_up(self.offset, self.align),
            align: self.align,
            fields: self.fields,
        }
    }
}

fn round_up(n: usize, align: usize) -> usize {
    n.div_ceil(align) * align
}

/// Errors detected while mapping values onto a layout.
#[derive(Clone, Debug, thiserror::Error, Eq, PartialEq)]
pub enum LayoutError {
    /// The buffer is shorter than the struct.
    #[error("{layout} requires {needed} bytes but the buffer holds {actual}")]
    BufferTooSmall {
        layout: &'static str,
        needed: usize,
        actual: usize,
    },

    /// No field matches the path.
    #[error("{layout} has no field \"{field}\"")]
    UnknownField { layout: &'static str, field: String },

    /// The field exists but does not have the size of the accessed type.
    #[error("{layout}.{field} is {actual} bytes but was accessed as {expected}")]
    SizeMismatch {
        layout: &'static str,
        field: String,
        expected: usize,
        actual: usize,
    },

    /// More elements than the fixed array can hold.
    #[error("{layout}.{field} holds at most {capacity} elements, not {actual}")]
    TooManyElements {
        layout: &'static str,
        field: String,
        capacity: usize,
        actual: usize,
    },
}

/// A fixed size scalar in native byte order.
pub trait Scalar: Copy {
    const SIZE: usize;

    fn read(buf: &[u8]) -> Self;

    fn write(self, buf: &mut [u8]);
}

macro_rules! scalar {
    ($($t:ty),*) => {
        $(
            impl Scalar for $t {
                const SIZE: usize = size_of::<$t>();

                fn read(buf: &[u8]) -> Self {
                    let mut raw = [0; size_of::<$t>()];
                    raw.copy_from_slice(&buf[..size_of::<$t>()]);
                    <$t>::from_ne_bytes(raw)
                }

                fn write(self, buf: &mut [u8]) {
                    buf[..size_of::<$t>()].copy_from_slice(&self.to_ne_bytes());
                }
            }
        )*
    };
}

scalar!(u8, u16, u32, u64, i32, usize);

/// A value with a kernel ABI representation described by a [`Layout`].
pub trait NativeStruct: Sized {
    /// The layout of the kernel struct.
    fn layout() -> &'static Layout;

    /// Decode the value from the first `layout().size()` bytes of `buf`.
    fn from_bytes(buf: &[u8]) -> Result<Self>;

    /// Encode the value into the first `layout().size()` bytes of `buf`.
    ///
    /// The region is zeroed before the fields are written, so padding and
    /// inactive union arms are always zero.
    fn to_bytes(&self, buf: &mut [u8]) -> Result<()>;

    fn size() -> usize {
        Self::layout().size()
    }

    /// Encode the value into a freshly allocated buffer.
    fn to_vec(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0; Self::size()];
        self.to_bytes(&mut buf)?;
        Ok(buf)
    }
}

macro_rules! native_scalar {
    ($t:ty, $kind:expr, $name:literal) => {
        impl NativeStruct for $t {
            fn layout() -> &'static Layout {
                static LAYOUT: OnceLock<Layout> = OnceLock::new();
                LAYOUT.get_or_init(|| Layout::builder($name).field("value", $kind).build())
            }

            fn from_bytes(buf: &[u8]) -> Result<Self> {
                Ok(Decoder::new(Self::layout(), buf)?.get("value")?)
            }

            fn to_bytes(&self, buf: &mut [u8]) -> Result<()> {
                Encoder::new(Self::layout(), buf)?.put("value", *self)?;
                Ok(())
            }
        }
    };
}

native_scalar!(u8, Kind::U8, "__u8");
native_scalar!(u32, Kind::U32, "__u32");

fn check_len(layout: &'static Layout, len: usize) -> std::result::Result<(), LayoutError> {
    if len < layout.size() {
        return Err(LayoutError::BufferTooSmall {
            layout: layout.name(),
            needed: layout.size(),
            actual: len,
        });
    }
    Ok(())
}

fn check_size(
    layout: &'static Layout,
    path: &str,
    kind: &Kind,
    expected: usize,
) -> std::result::Result<(), LayoutError> {
    if kind.size() != expected {
        return Err(LayoutError::SizeMismatch {
            layout: layout.name(),
            field: path.to_string(),
            expected,
            actual: kind.size(),
        });
    }
    Ok(())
}

fn sequence_elem<'a>(
    layout: &'static Layout,
    path: &str,
    kind: &'a Kind,
    count: usize,
) -> std::result::Result<&'a Kind, LayoutError> {
    match kind {
        Kind::Sequence(elem, capacity) => {
            if count > *capacity {
                return Err(LayoutError::TooManyElements {
                    layout: layout.name(),
                    field: path.to_string(),
                    capacity: *capacity,
                    actual: count,
                });
            }
            Ok(elem)
        }
        _ => Err(LayoutError::UnknownField {
            layout: layout.name(),
            field: format!("{path}[]"),
        }),
    }
}

/// Reads fields by name from the bytes of a struct.
#[derive(Debug)]
pub struct Decoder<'a> {
    layout: &'static Layout,
    buf: &'a [u8],
}

impl<'a> Decoder<'a> {
    pub fn new(layout: &'static Layout, buf: &'a [u8]) -> std::result::Result<Self, LayoutError> {
        check_len(layout, buf.len())?;
        Ok(Decoder {
            layout,
            buf: &buf[..layout.size()],
        })
    }

    /// Read a scalar field.
    pub fn get<T: Scalar>(&self, path: &str) -> std::result::Result<T, LayoutError> {
        let (offset, kind) = self.layout.resolve(path)?;
        check_size(self.layout, path, kind, T::SIZE)?;
        Ok(T::read(&self.buf[offset..]))
    }

    /// The raw bytes of a field.
    pub fn bytes(&self, path: &str) -> std::result::Result<&'a [u8], LayoutError> {
        let (offset, kind) = self.layout.resolve(path)?;
        Ok(&self.buf[offset..offset + kind.size()])
    }

    /// Read a NUL padded byte array as a string.
    pub fn string(&self, path: &str) -> std::result::Result<String, LayoutError> {
        let raw = self.bytes(path)?;
        let len = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..len]).into_owned())
    }

    /// Decode a nested struct, or a struct held in a union arm.
    pub fn nested<T: NativeStruct>(&self, path: &str) -> Result<T> {
        T::from_bytes(self.bytes(path)?)
    }

    /// Decode the first `count` elements of an array of structs.
    pub fn sequence<T: NativeStruct>(&self, path: &str, count: usize) -> Result<Vec<T>> {
        let (offset, kind) = self.layout.resolve(path)?;
        let elem = sequence_elem(self.layout, path, kind, count)?;
        check_size(self.layout, path, elem, T::size())?;
        self.buf[offset..]
            .chunks_exact(elem.size())
            .take(count)
            .map(T::from_bytes)
            .collect()
    }

    /// Read the first `count` elements of an array of scalars.
    pub fn scalars<T: Scalar>(
        &self,
        path: &str,
        count: usize,
    ) -> std::result::Result<Vec<T>, LayoutError> {
        let (offset, kind) = self.layout.resolve(path)?;
        let elem = sequence_elem(self.layout, path, kind, count)?;
        check_size(self.layout, path, elem, T::SIZE)?;
        Ok(self.buf[offset..]
            .chunks_exact(T::SIZE)
            .take(count)
            .map(T::read)
            .collect())
    }
}

/// Writes fields by name into the bytes of a struct.
#[derive(Debug)]
pub struct Encoder<'a> {
    layout: &'static Layout,
    buf: &'a mut [u8],
}

impl<'a> Encoder<'a> {
    /// Bind to the first `layout.size()` bytes of `buf`, zeroing them.
    pub fn new(
        layout: &'static Layout,
        buf: &'a mut [u8],
    ) -> std::result::Result<Self, LayoutError> {
        check_len(layout, buf.len())?;
        let buf = &mut buf[..layout.size()];
        buf.fill(0);
        Ok(Encoder { layout, buf })
    }

    pub fn put<T: Scalar>(&mut self, path: &str, value: T) -> std::result::Result<(), LayoutError> {
        let (offset, kind) = self.layout.resolve(path)?;
        check_size(self.layout, path, kind, T::SIZE)?;
        value.write(&mut self.buf[offset..]);
        Ok(())
    }

    /// Mutable access to the raw bytes of a field.
    pub fn bytes(&mut self, path: &str) -> std::result::Result<&mut [u8], LayoutError> {
        let (offset, kind) = self.layout.resolve(path)?;
        let size = kind.size();
        Ok(&mut self.buf[offset..offset + size])
    }

    /// Write a string into a NUL padded byte array, truncating it to fit.
    pub fn string(&mut self, path: &str, value: &str) -> std::result::Result<(), LayoutError> {
        let dst = self.bytes(path)?;
        let len = value.len().min(dst.len());
        dst[..len].copy_from_slice(&value.as_bytes()[..len]);
        Ok(())
    }

    pub fn nested<T: NativeStruct>(&mut self, path: &str, value: &T) -> Result<()> {
        value.to_bytes(self.bytes(path)?)
    }

    /// Encode the elements into the leading slots of an array of structs.
    pub fn sequence<T: NativeStruct>(&mut self, path: &str, values: &[T]) -> Result<()> {
        let layout = self.layout;
        let (offset, kind) = layout.resolve(path)?;
        let elem = sequence_elem(layout, path, kind, values.len())?;
        check_size(layout, path, elem, T::size())?;
        for (v, slot) in values
            .iter()
            .zip(self.buf[offset..].chunks_exact_mut(elem.size()))
        {
            v.to_bytes(slot)?;
        }
        Ok(())
    }

    pub fn scalars<T: Scalar>(
        &mut self,
        path: &str,
        values: &[T],
    ) -> std::result::Result<(), LayoutError> {
        let layout = self.layout;
        let (offset, kind) = layout.resolve(path)?;
        let elem = sequence_elem(layout, path, kind, values.len())?;
        check_size(layout, path, elem, T::SIZE)?;
        for (v, slot) in values
            .iter()
            .zip(self.buf[offset..].chunks_exact_mut(T::SIZE))
        {
            v.write(slot);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inner() -> &'static Layout {
        static LAYOUT: OnceLock<Layout> = OnceLock::new();
        LAYOUT.get_or_init(|| {
            Layout::builder("inner")
                .field("id", Kind::U32)
                .padding("padding", 4)
                .union(
                    "value",
                    &[("wide", Kind::U64), ("narrow", Kind::U32)],
                )
                .build()
        })
    }

    fn outer() -> &'static Layout {
        static LAYOUT: OnceLock<Layout> = OnceLock::new();
        LAYOUT.get_or_init(|| {
            Layout::builder("outer")
                .field("tag", Kind::U8)
                .field("count", Kind::U16)
                .field("name", Kind::Bytes(5))
                .field("inner", Kind::Struct(inner()))
                .sequence("list", Kind::U32, 3)
                .field("last", Kind::U8)
                .build()
        })
    }

    mod layout {
        use super::*;

        #[test]
        fn natural_alignment() {
            let l = outer();
            assert_eq!(l.offset_of("tag"), Ok(0));
            assert_eq!(l.offset_of("count"), Ok(2));
            assert_eq!(l.offset_of("name"), Ok(4));
            assert_eq!(l.offset_of("inner"), Ok(16));
            assert_eq!(l.offset_of("list"), Ok(32));
            assert_eq!(l.offset_of("last"), Ok(44));
            assert_eq!(l.align(), 8);
            // trailing padding to the struct alignment
            assert_eq!(l.size(), 48);
        }

        #[test]
        fn dotted_paths() {
            let l = outer();
            assert_eq!(l.offset_of("inner.id"), Ok(16));
            assert_eq!(l.offset_of("inner.value"), Ok(24));
            assert_eq!(l.offset_of("inner.value.wide"), Ok(24));
            assert_eq!(l.offset_of("inner.value.narrow"), Ok(24));
            assert_eq!(
                l.offset_of("inner.value.missing"),
                Err(LayoutError::UnknownField {
                    layout: "outer",
                    field: "inner.value.missing".to_string()
                })
            );
            assert!(l.offset_of("tag.nested").is_err());
        }

        #[test]
        fn union_size() {
            let u = Kind::Union(vec![
                Field {
                    name: "byte",
                    offset: 0,
                    kind: Kind::U8,
                },
                Field {
                    name: "word",
                    offset: 0,
                    kind: Kind::U16,
                },
                Field {
                    name: "block",
                    offset: 0,
                    kind: Kind::Bytes(34),
                },
            ]);
            assert_eq!(u.size(), 34);
            assert_eq!(u.align(), 2);
            assert_eq!(inner().size(), 16);
        }

        #[test]
        fn display() {
            assert_eq!(inner().to_string(), "struct inner (16 bytes)");
        }
    }

    mod decoder {
        use super::*;

        #[test]
        fn short_buffer() {
            let buf = [0u8; 47];
            assert_eq!(
                Decoder::new(outer(), &buf).unwrap_err(),
                LayoutError::BufferTooSmall {
                    layout: "outer",
                    needed: 48,
                    actual: 47
                }
            );
        }

        #[test]
        fn fields() {
            let mut buf = [0u8; 64];
            buf[2..4].copy_from_slice(&513u16.to_ne_bytes());
            buf[4..7].copy_from_slice(b"abc");
            buf[24..32].copy_from_slice(&0x1122_3344_5566_7788u64.to_ne_bytes());
            buf[36..40].copy_from_slice(&9u32.to_ne_bytes());
            let d = Decoder::new(outer(), &buf).unwrap();
            assert_eq!(d.get::<u16>("count").unwrap(), 513);
            assert_eq!(d.string("name").unwrap(), "abc");
            assert_eq!(d.get::<u64>("inner.value.wide").unwrap(), 0x1122_3344_5566_7788);
            assert_eq!(d.scalars::<u32>("list", 2).unwrap(), vec![0, 9]);
            assert!(matches!(
                d.get::<u32>("count"),
                Err(LayoutError::SizeMismatch { expected: 4, actual: 2, .. })
            ));
            assert!(matches!(
                d.scalars::<u32>("list", 4),
                Err(LayoutError::TooManyElements { capacity: 3, actual: 4, .. })
            ));
        }

        #[test]
        fn unterminated_string() {
            let mut buf = [0u8; 48];
            buf[4..9].copy_from_slice(b"abcde");
            let d = Decoder::new(outer(), &buf).unwrap();
            assert_eq!(d.string("name").unwrap(), "abcde");
        }
    }

    mod encoder {
        use super::*;

        #[test]
        fn zero_fills_region_only() {
            let mut buf = [0xffu8; 50];
            let mut e = Encoder::new(outer(), &mut buf).unwrap();
            e.put("tag", 7u8).unwrap();
            e.string("name", "toolongname").unwrap();
            e.put("inner.value.narrow", 5u32).unwrap();
            assert_eq!(buf[0], 7);
            assert_eq!(buf[1], 0);
            assert_eq!(&buf[4..9], b"toolo");
            assert_eq!(&buf[24..28], &5u32.to_ne_bytes());
            assert_eq!(&buf[28..32], &[0, 0, 0, 0]);
            assert_eq!(&buf[48..], &[0xff, 0xff]);
        }

        #[test]
        fn short_buffer() {
            let mut buf = [0u8; 16];
            assert!(Encoder::new(outer(), &mut buf).is_err());
        }

        #[test]
        fn scalars() {
            let mut buf = [0u8; 48];
            let mut e = Encoder::new(outer(), &mut buf).unwrap();
            e.scalars("list", &[1u32, 2]).unwrap();
            assert!(e.scalars("list", &[1u32, 2, 3, 4]).is_err());
            let d = Decoder::new(outer(), &buf).unwrap();
            assert_eq!(d.scalars::<u32>("list", 3).unwrap(), vec![1, 2, 0]);
        }
    }

    #[test]
    fn native_scalars() {
        let mut buf = [0u8; 4];
        42u32.to_bytes(&mut buf).unwrap();
        assert_eq!(u32::from_bytes(&buf).unwrap(), 42);
        assert_eq!(<u8 as NativeStruct>::size(), 1);
        assert_eq!(3u8.to_vec().unwrap(), vec![3]);
    }
}
