use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::coding::{Decode, DecodeError, Encode};

/// The order in which a subscriber wants groups delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum GroupOrder {
	/// Whatever order they arrive in.
	#[default]
	Default = 0x0,
	/// Smallest sequence first.
	Ascending = 0x1,
	/// Largest sequence first.
	Descending = 0x2,
}

impl Decode for GroupOrder {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		let v = u8::decode(r)?;
		Self::try_from(v).map_err(|_| DecodeError::InvalidGroupOrder(v))
	}
}

impl Encode for GroupOrder {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		u8::from(*self).encode(w)
	}
}
