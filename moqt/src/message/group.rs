use std::fmt;

use bytes::{Buf, BufMut, Bytes};

use crate::coding::{Decode, DecodeError, Encode, Message};

/// The header of every group stream and datagram.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Group {
	pub subscribe: u64,
	pub sequence: u64,
	pub priority: u8,
}

impl Message for Group {
	fn decode_msg<R: Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self {
			subscribe: u64::decode(r)?,
			sequence: u64::decode(r)?,
			priority: u8::decode(r)?,
		})
	}

	fn encode_msg<W: BufMut>(&self, w: &mut W) {
		self.subscribe.encode(w);
		self.sequence.encode(w);
		self.priority.encode(w);
	}
}

/// An opaque payload; the whole message body.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
	pub payload: Bytes,
}

impl fmt::Debug for Frame {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Frame").field("size", &self.payload.len()).finish()
	}
}

impl Message for Frame {
	fn decode_msg<R: Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self {
			payload: r.copy_to_bytes(r.remaining()),
		})
	}

	fn encode_msg<W: BufMut>(&self, w: &mut W) {
		w.put_slice(&self.payload)
	}
}
