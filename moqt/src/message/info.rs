use std::time;

use bytes::{Buf, BufMut};

use super::GroupOrder;
use crate::coding::{Decode, DecodeError, Encode, Message};
use crate::Path;

/// Track metadata, sent in reply to a [super::Subscribe] or an [InfoRequest].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Info {
	pub priority: u8,
	/// 0 if no group has been produced yet.
	pub latest: u64,
	pub order: GroupOrder,
	pub expires: time::Duration,
}

impl Message for Info {
	fn decode_msg<R: Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self {
			priority: u8::decode(r)?,
			latest: u64::decode(r)?,
			order: GroupOrder::decode(r)?,
			expires: time::Duration::decode(r)?,
		})
	}

	fn encode_msg<W: BufMut>(&self, w: &mut W) {
		self.priority.encode(w);
		self.latest.encode(w);
		self.order.encode(w);
		self.expires.encode(w);
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InfoRequest {
	pub path: Path,
}

impl Message for InfoRequest {
	fn decode_msg<R: Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self { path: Path::decode(r)? })
	}

	fn encode_msg<W: BufMut>(&self, w: &mut W) {
		self.path.encode(w)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	use bytes::BytesMut;

	#[test]
	fn info() {
		let msg = Info {
			priority: 2,
			latest: 1_000_000,
			order: GroupOrder::Descending,
			expires: time::Duration::from_secs(30),
		};

		let mut buf = BytesMut::new();
		msg.encode(&mut buf);
		assert_eq!(Info::decode(&mut buf).unwrap(), msg);
		assert!(buf.is_empty());
	}

	#[test]
	fn request() {
		let msg = InfoRequest {
			path: Path::from(["room", "42"]),
		};

		let mut buf = BytesMut::new();
		msg.encode(&mut buf);
		assert_eq!(InfoRequest::decode(&mut buf).unwrap(), msg);
	}

	#[test]
	fn truncated() {
		let mut buf = BytesMut::new();
		Info {
			priority: 0,
			latest: 7,
			order: GroupOrder::Ascending,
			expires: time::Duration::ZERO,
		}
		.encode(&mut buf);

		buf.truncate(buf.len() - 1);
		assert_eq!(Info::decode(&mut buf), Err(DecodeError::Short));
	}
}
