use bytes::{Buf, BufMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::coding::{Decode, DecodeError, Encode, Message, Parameters};
use crate::Path;

/// Sent by the subscriber to request all announcements within a prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnnouncePlease {
	pub prefix: Path,
	pub params: Parameters,
}

impl Message for AnnouncePlease {
	fn decode_msg<R: Buf>(r: &mut R) -> Result<Self, DecodeError> {
		let prefix = Path::decode(r)?;
		let params = Parameters::decode(r)?;
		Ok(Self { prefix, params })
	}

	fn encode_msg<W: BufMut>(&self, w: &mut W) {
		self.prefix.encode(w);
		self.params.encode(w);
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum AnnounceStatus {
	Active = 0,
	Ended = 1,
	Live = 2,
}

impl Decode for AnnounceStatus {
	fn decode<R: Buf>(r: &mut R) -> Result<Self, DecodeError> {
		let v = u8::decode(r)?;
		Self::try_from(v).map_err(|_| DecodeError::InvalidAnnounceStatus(v))
	}
}

impl Encode for AnnounceStatus {
	fn encode<W: BufMut>(&self, w: &mut W) {
		u8::from(*self).encode(w)
	}
}

/// Sent by the publisher in response to [AnnouncePlease].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Announce {
	/// The path `prefix ++ suffix` is now being published.
	Active { suffix: Path, params: Parameters },

	/// A previously active path is no longer published.
	Ended { suffix: Path, params: Parameters },

	/// Every initially active path has been sent.
	Live { params: Parameters },
}

impl Announce {
	pub fn status(&self) -> AnnounceStatus {
		match self {
			Self::Active { .. } => AnnounceStatus::Active,
			Self::Ended { .. } => AnnounceStatus::Ended,
			Self::Live { .. } => AnnounceStatus::Live,
		}
	}

	pub fn params(&self) -> &Parameters {
		match self {
			Self::Active { params, .. } | Self::Ended { params, .. } | Self::Live { params } => params,
		}
	}

	// LIVE omits the suffix, but some peers still write one before the parameters.
	fn decode_live<R: Buf>(r: &mut R) -> Result<Parameters, DecodeError> {
		let rest = r.copy_to_bytes(r.remaining());
		if rest.is_empty() {
			return Ok(Parameters::new());
		}

		let mut attempt = rest.clone();
		if let Ok(params) = Parameters::decode(&mut attempt) {
			if !attempt.has_remaining() {
				return Ok(params);
			}
		}

		let mut rest = rest;
		Path::decode(&mut rest)?;
		let params = Parameters::decode(&mut rest)?;

		if rest.has_remaining() {
			return Err(DecodeError::ExpectedEnd);
		}

		Ok(params)
	}
}

impl Message for Announce {
	fn decode_msg<R: Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(match AnnounceStatus::decode(r)? {
			AnnounceStatus::Active => Self::Active {
				suffix: Path::decode(r)?,
				params: Parameters::decode(r)?,
			},
			AnnounceStatus::Ended => Self::Ended {
				suffix: Path::decode(r)?,
				params: Parameters::decode(r)?,
			},
			AnnounceStatus::Live => Self::Live {
				params: Self::decode_live(r)?,
			},
		})
	}

	fn encode_msg<W: BufMut>(&self, w: &mut W) {
		self.status().encode(w);

		match self {
			Self::Active { suffix, params } | Self::Ended { suffix, params } => {
				suffix.encode(w);
				params.encode(w);
			}
			Self::Live { params } => params.encode(w),
		}
	}
}
