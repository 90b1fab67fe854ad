use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::coding::{Decode, DecodeError, Encode};

/// The one-byte tag at the start of every stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum StreamType {
	Session = 0x00,
	Announce = 0x01,
	Subscribe = 0x02,
	Info = 0x03,
	Fetch = 0x04,
	Group = 0x05,
}

impl StreamType {
	/// Group is the only unidirectional stream.
	pub fn is_bidi(&self) -> bool {
		!matches!(self, Self::Group)
	}
}

impl Decode for StreamType {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		let v = u8::decode(r)?;
		Self::try_from(v).map_err(|_| DecodeError::InvalidStreamType(v))
	}
}

impl Encode for StreamType {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		u8::from(*self).encode(w)
	}
}
