use std::time;

use bytes::{Buf, BufMut};

use super::GroupOrder;
use crate::coding::{Decode, DecodeError, Encode, Message, Parameters};
use crate::Path;

/// An inclusive range of group sequences, where 0 leaves that side unbounded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GroupRange {
	pub min: u64,
	pub max: u64,
}

impl GroupRange {
	pub fn new(min: u64, max: u64) -> Self {
		Self { min, max }
	}

	pub fn is_valid(&self) -> bool {
		self.max == 0 || self.min <= self.max
	}

	pub fn contains(&self, sequence: u64) -> bool {
		sequence >= self.min && (self.max == 0 || sequence <= self.max)
	}

	/// True if `other` only removes sequences from this range.
	pub fn narrows_to(&self, other: &GroupRange) -> bool {
		if !other.is_valid() || other.min < self.min {
			return false;
		}

		match (self.max, other.max) {
			(0, _) => true,
			(_, 0) => false,
			(current, new) => new <= current,
		}
	}
}

/// Sent by the subscriber to request a track.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subscribe {
	pub id: u64,
	pub path: Path,
	pub priority: u8,
	pub order: GroupOrder,
	pub expires: time::Duration,
	pub range: GroupRange,
	pub params: Parameters,
}

impl Message for Subscribe {
	fn decode_msg<R: Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self {
			id: u64::decode(r)?,
			path: Path::decode(r)?,
			priority: u8::decode(r)?,
			order: GroupOrder::decode(r)?,
			expires: time::Duration::decode(r)?,
			range: GroupRange {
				min: u64::decode(r)?,
				max: u64::decode(r)?,
			},
			params: Parameters::decode(r)?,
		})
	}

	fn encode_msg<W: BufMut>(&self, w: &mut W) {
		self.id.encode(w);
		self.path.encode(w);
		self.priority.encode(w);
		self.order.encode(w);
		self.expires.encode(w);
		self.range.min.encode(w);
		self.range.max.encode(w);
		self.params.encode(w);
	}
}

/// Sent by the subscriber to change an active subscription.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubscribeUpdate {
	pub priority: u8,
	pub order: GroupOrder,
	pub expires: time::Duration,
	pub range: GroupRange,
	pub params: Parameters,
}

/// The adjustable settings of a subscription, as sent in [SubscribeUpdate].
pub type SubscribeConfig = SubscribeUpdate;

impl Message for SubscribeUpdate {
	fn decode_msg<R: Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self {
			priority: u8::decode(r)?,
			order: GroupOrder::decode(r)?,
			expires: time::Duration::decode(r)?,
			range: GroupRange {
				min: u64::decode(r)?,
				max: u64::decode(r)?,
			},
			params: Parameters::decode(r)?,
		})
	}

	fn encode_msg<W: BufMut>(&self, w: &mut W) {
		self.priority.encode(w);
		self.order.encode(w);
		self.expires.encode(w);
		self.range.min.encode(w);
		self.range.max.encode(w);
		self.params.encode(w);
	}
}

/// Sent by the publisher when a run of groups will never be delivered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubscribeGap {
	pub start: u64,
	pub count: u64,
	/// A group error code.
	pub code: u32,
}

impl Message for SubscribeGap {
	fn decode_msg<R: Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self {
			start: u64::decode(r)?,
			count: u64::decode(r)?,
			code: u32::decode(r)?,
		})
	}

	fn encode_msg<W: BufMut>(&self, w: &mut W) {
		self.start.encode(w);
		self.count.encode(w);
		self.code.encode(w);
	}
}
