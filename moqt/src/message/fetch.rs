use bytes::{Buf, BufMut};

use crate::coding::{Decode, DecodeError, Encode, Message};
use crate::Path;

/// Sent by the subscriber to replay a single group, starting at a frame offset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fetch {
	pub path: Path,
	pub priority: u8,
	pub group: u64,
	pub frame: u64,
}

impl Message for Fetch {
	fn decode_msg<R: Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self {
			path: Path::decode(r)?,
			priority: u8::decode(r)?,
			group: u64::decode(r)?,
			frame: u64::decode(r)?,
		})
	}

	fn encode_msg<W: BufMut>(&self, w: &mut W) {
		self.path.encode(w);
		self.priority.encode(w);
		self.group.encode(w);
		self.frame.encode(w);
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchUpdate {
	pub priority: u8,
}

impl Message for FetchUpdate {
	fn decode_msg<R: Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self {
			priority: u8::decode(r)?,
		})
	}

	fn encode_msg<W: BufMut>(&self, w: &mut W) {
		self.priority.encode(w)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	use bytes::BytesMut;

	#[test]
	fn fetch() {
		let msg = Fetch {
			path: Path::from(["room", "42", "alice"]),
			priority: 4,
			group: 12,
			frame: 3,
		};

		let mut buf = BytesMut::new();
		msg.encode(&mut buf);
		assert_eq!(Fetch::decode(&mut buf).unwrap(), msg);
		assert!(buf.is_empty());
	}

	#[test]
	fn update() {
		let mut buf = BytesMut::new();
		FetchUpdate { priority: 200 }.encode(&mut buf);

		// size, priority
		assert_eq!(buf.as_ref(), b"\x01\xc8");
		assert_eq!(FetchUpdate::decode(&mut buf).unwrap(), FetchUpdate { priority: 200 });
	}
}
