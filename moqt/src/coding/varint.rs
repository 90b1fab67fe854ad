// Based on quinn-proto
// https://github.com/quinn-rs/quinn/blob/main/quinn-proto/src/varint.rs
// Licensed via Apache 2.0 and MIT

use std::convert::{TryFrom, TryInto};
use std::fmt;

use thiserror::Error;

use super::{Decode, DecodeError, Encode};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
#[error("value out of range")]
pub struct BoundsExceeded;

/// An integer less than 2^62, encoded with a two-bit length tag.
#[derive(Default, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VarInt(u64);

impl VarInt {
	/// The largest possible value.
	pub const MAX: Self = Self((1 << 62) - 1);

	/// The smallest possible value.
	pub const ZERO: Self = Self(0);

	pub const fn from_u32(x: u32) -> Self {
		Self(x as u64)
	}

	pub const fn into_inner(self) -> u64 {
		self.0
	}

	/// The number of bytes needed to encode this value: 1, 2, 4 or 8.
	pub const fn size(&self) -> usize {
		if self.0 < 1 << 6 {
			1
		} else if self.0 < 1 << 14 {
			2
		} else if self.0 < 1 << 30 {
			4
		} else {
			8
		}
	}
}

impl From<VarInt> for u64 {
	fn from(x: VarInt) -> Self {
		x.0
	}
}

impl From<u8> for VarInt {
	fn from(x: u8) -> Self {
		Self(x.into())
	}
}

impl From<u16> for VarInt {
	fn from(x: u16) -> Self {
		Self(x.into())
	}
}

impl From<u32> for VarInt {
	fn from(x: u32) -> Self {
		Self(x.into())
	}
}

impl TryFrom<u64> for VarInt {
	type Error = BoundsExceeded;

	/// Succeeds iff `x` < 2^62
	fn try_from(x: u64) -> Result<Self, BoundsExceeded> {
		let x = Self(x);
		if x <= Self::MAX {
			Ok(x)
		} else {
			Err(BoundsExceeded)
		}
	}
}

impl TryFrom<usize> for VarInt {
	type Error = BoundsExceeded;

	fn try_from(x: usize) -> Result<Self, BoundsExceeded> {
		Self::try_from(x as u64)
	}
}

impl TryFrom<VarInt> for u32 {
	type Error = BoundsExceeded;

	/// Succeeds iff `x` < 2^32
	fn try_from(x: VarInt) -> Result<Self, BoundsExceeded> {
		u32::try_from(x.0).map_err(|_| BoundsExceeded)
	}
}

impl fmt::Debug for VarInt {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

impl fmt::Display for VarInt {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

impl Decode for VarInt {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		if !r.has_remaining() {
			return Err(DecodeError::Short);
		}

		let first = r.chunk()[0];
		let size = 1usize << (first >> 6);
		if r.remaining() < size {
			return Err(DecodeError::Short);
		}

		let mut buf = [0u8; 8];
		r.copy_to_slice(&mut buf[8 - size..]);
		buf[8 - size] &= 0b0011_1111;

		Ok(Self(u64::from_be_bytes(buf)))
	}
}

impl Encode for VarInt {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		match self.size() {
			1 => w.put_u8(self.0 as u8),
			2 => w.put_u16(0b01 << 14 | self.0 as u16),
			4 => w.put_u32(0b10 << 30 | self.0 as u32),
			_ => w.put_u64(0b11 << 62 | self.0),
		}
	}
}

impl Encode for u64 {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		// Sequences and ids are bounded to 62 bits long before they reach the codec.
		VarInt::try_from(*self).unwrap_or(VarInt::MAX).encode(w)
	}
}

impl Decode for u64 {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		VarInt::decode(r).map(|v| v.into_inner())
	}
}

impl Encode for usize {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		VarInt::try_from(*self).unwrap_or(VarInt::MAX).encode(w)
	}
}

impl Decode for usize {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		let v = VarInt::decode(r)?.into_inner();
		v.try_into().map_err(|_| DecodeError::BoundsExceeded)
	}
}

impl Encode for u32 {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		VarInt::from(*self).encode(w)
	}
}

impl Decode for u32 {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		let v = VarInt::decode(r)?;
		let v = v.try_into().map_err(|_| DecodeError::BoundsExceeded)?;
		Ok(v)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	use bytes::BytesMut;

	fn roundtrip(v: u64, size: usize) {
		let v = VarInt::try_from(v).unwrap();
		let mut buf = BytesMut::new();
		v.encode(&mut buf);
		assert_eq!(buf.len(), size, "value {}", v);

		let decoded = VarInt::decode(&mut buf).unwrap();
		assert_eq!(decoded, v);
		assert!(buf.is_empty());
	}

	#[test]
	fn boundaries() {
		roundtrip(0, 1);
		roundtrip(63, 1);
		roundtrip(64, 2);
		roundtrip(16_383, 2);
		roundtrip(16_384, 4);
		roundtrip((1 << 30) - 1, 4);
		roundtrip(1 << 30, 8);
		roundtrip(VarInt::MAX.into_inner(), 8);
	}

	#[test]
	fn too_large() {
		assert_eq!(VarInt::try_from(1u64 << 62), Err(BoundsExceeded));
	}

	#[test]
	fn rfc_vectors() {
		// RFC 9000 Appendix A.1
		let mut buf = &[0xc2, 0x19, 0x7c, 0x5e, 0xff, 0x14, 0xe8, 0x8c][..];
		assert_eq!(u64::decode(&mut buf).unwrap(), 151_288_809_941_952_652);

		let mut buf = &[0x9d, 0x7f, 0x3e, 0x7d][..];
		assert_eq!(u64::decode(&mut buf).unwrap(), 494_878_333);

		let mut buf = &[0x7b, 0xbd][..];
		assert_eq!(u64::decode(&mut buf).unwrap(), 15_293);

		let mut buf = &[0x25][..];
		assert_eq!(u64::decode(&mut buf).unwrap(), 37);
	}

	#[test]
	fn short() {
		let mut buf = &[0x9d, 0x7f][..];
		assert!(matches!(u64::decode(&mut buf), Err(DecodeError::Short)));
	}
}
