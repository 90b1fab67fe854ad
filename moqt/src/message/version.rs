use std::{fmt, ops};

use crate::coding::{Decode, DecodeError, Encode};

/// A version number negotiated during the setup handshake.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Version(pub u32);

impl Version {
	pub const DEVELOP: Version = Version(0xff_ff_ff_00);
}

impl From<u32> for Version {
	fn from(v: u32) -> Self {
		Self(v)
	}
}

impl From<Version> for u32 {
	fn from(v: Version) -> Self {
		v.0
	}
}

impl fmt::Debug for Version {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:#x}", self.0)
	}
}

impl Decode for Version {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self(u32::decode(r)?))
	}
}

impl Encode for Version {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.0.encode(w)
	}
}

/// A list of versions in preferred order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versions(Vec<Version>);

impl Versions {
	/// The first of our versions that the other side also supports.
	pub fn select(&self, other: &Versions) -> Option<Version> {
		self.0.iter().find(|v| other.contains(v)).copied()
	}
}

impl Default for Versions {
	fn default() -> Self {
		Self(vec![Version::DEVELOP])
	}
}

impl Decode for Versions {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		let count = usize::decode(r)?;
		Self::decode_remaining(r, count)?;

		let mut vs = Vec::with_capacity(count);
		for _ in 0..count {
			vs.push(Version::decode(r)?);
		}

		Ok(Self(vs))
	}
}

impl Encode for Versions {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.0.len().encode(w);
		for v in &self.0 {
			v.encode(w);
		}
	}
}

impl ops::Deref for Versions {
	type Target = Vec<Version>;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

impl From<Vec<Version>> for Versions {
	fn from(vs: Vec<Version>) -> Self {
		Self(vs)
	}
}

impl<const N: usize> From<[Version; N]> for Versions {
	fn from(vs: [Version; N]) -> Self {
		Self(vs.to_vec())
	}
}
