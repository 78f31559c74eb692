//! Parseable types: atomic values unpacked from bytes and byte blobs.

use crate::expr::{Constant, Expr};

/// Byte order used to unpack multi-byte values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    /// Most significant byte first. This is network order and the default
    /// when neither the field nor the unit specifies one.
    #[default]
    Big,
    Little,
    /// Whatever the executing machine uses.
    Host,
}

impl ByteOrder {
    pub const NETWORK: ByteOrder = ByteOrder::Big;

    /// Resolve `Host` to the concrete order of the target machine.
    pub fn concrete(self) -> ByteOrder {
        match self {
            ByteOrder::Host if cfg!(target_endian = "little") => ByteOrder::Little,
            ByteOrder::Host => ByteOrder::Big,
            other => other,
        }
    }
}

/// A primitive value read directly from a fixed number of bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AtomicType {
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    SInt8,
    SInt16,
    SInt32,
    SInt64,
    /// IEEE-754 single precision.
    Float,
    /// IEEE-754 double precision.
    Double,
    /// One byte; any non-zero value is `true`.
    Bool,
    /// IPv4 address, always 4 bytes in network order.
    Addr4,
    /// IPv6 address, always 16 bytes in network order.
    Addr6,
    /// Seconds since the epoch as a 32-bit unsigned integer.
    Time32,
    /// Seconds since the epoch as a 64-bit unsigned integer.
    Time64,
}

impl AtomicType {
    /// Number of bytes consumed when unpacking a value of this type.
    pub fn width(self) -> usize {
        match self {
            AtomicType::UInt8 | AtomicType::SInt8 | AtomicType::Bool => 1,
            AtomicType::UInt16 | AtomicType::SInt16 => 2,
            AtomicType::UInt32
            | AtomicType::SInt32
            | AtomicType::Float
            | AtomicType::Addr4
            | AtomicType::Time32 => 4,
            AtomicType::UInt64 | AtomicType::SInt64 | AtomicType::Double | AtomicType::Time64 => 8,
            AtomicType::Addr6 => 16,
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            AtomicType::UInt8
                | AtomicType::UInt16
                | AtomicType::UInt32
                | AtomicType::UInt64
                | AtomicType::SInt8
                | AtomicType::SInt16
                | AtomicType::SInt32
                | AtomicType::SInt64
        )
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            AtomicType::SInt8 | AtomicType::SInt16 | AtomicType::SInt32 | AtomicType::SInt64
        )
    }

    /// Encode an integer or boolean constant as it would appear on the wire.
    ///
    /// Returns `None` when the constant does not fit the type or the type has
    /// no constant encoding (floats, addresses, times).
    pub fn encode(self, value: &Constant, order: ByteOrder) -> Option<Vec<u8>> {
        let width = self.width();
        let raw: u64 = match (self, value) {
            (AtomicType::Bool, Constant::Bool(b)) => u64::from(*b),
            (t, Constant::UInt(v)) if t.is_integer() => {
                if width < 8 && *v >> (width * 8) != 0 {
                    return None;
                }
                *v
            }
            (t, Constant::SInt(v)) if t.is_integer() => {
                let v = *v;
                if t.is_signed() {
                    if width < 8 {
                        let bits = width * 8;
                        let min = -(1i64 << (bits - 1));
                        let max = (1i64 << (bits - 1)) - 1;
                        if v < min || v > max {
                            return None;
                        }
                    }
                } else {
                    let unsigned = u64::try_from(v).ok()?;
                    if width < 8 && unsigned >> (width * 8) != 0 {
                        return None;
                    }
                }
                // Two's complement; truncated to `width` below.
                #[allow(clippy::cast_sign_loss)]
                let raw = v as u64;
                raw
            }
            _ => return None,
        };

        let be = raw.to_be_bytes();
        let mut bytes = be[8 - width..].to_vec();
        if order.concrete() == ByteOrder::Little {
            bytes.reverse();
        }
        Some(bytes)
    }
}

/// Length policy for a bytes blob.
#[derive(Clone, Debug, PartialEq)]
pub enum BytesLength {
    /// Exactly this many bytes (`&length=<expr>`).
    Length(Expr),
    /// Everything up to (and consuming) the delimiter (`&until=b"..."`).
    Until(Vec<u8>),
    /// Everything until the end of input has been signalled (`&eod`).
    Eod,
}

/// The type of value a `Variable` production reads.
#[derive(Clone, Debug, PartialEq)]
pub enum ParseType {
    Atomic(AtomicType),
    Bytes(BytesLength),
}
