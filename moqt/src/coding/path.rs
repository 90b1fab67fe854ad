use bytes::{Buf, BufMut, Bytes};

use crate::Path;

use super::{Decode, DecodeError, Encode};

// Tuple encoding: count || (length || bytes)^count
impl Encode for Path {
	fn encode<W: BufMut>(&self, w: &mut W) {
		self.len().encode(w);
		for part in self.parts() {
			part.encode(w);
		}
	}
}

impl Decode for Path {
	fn decode<R: Buf>(r: &mut R) -> Result<Self, DecodeError> {
		let count = usize::decode(r)?;

		// Each part needs at least one byte, so don't trust a huge count.
		Self::decode_remaining(r, count)?;

		let mut parts = Vec::with_capacity(count);
		for _ in 0..count {
			parts.push(Bytes::decode(r)?);
		}

		Ok(Path::from_parts(parts))
	}
}
