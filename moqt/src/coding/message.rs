use std::fmt;

use bytes::{Buf, BufMut, BytesMut};

use super::{Decode, DecodeError, Encode};

/// A control message, framed on the wire as `payload-length || payload`.
///
/// Implementors only describe the payload; the length prefix is added by the blanket [Encode]/[Decode] impls.
/// Decoding never reads past the declared length, and any bytes left over inside the payload are an error.
pub trait Message: Sized + fmt::Debug {
	fn decode_msg<R: Buf>(r: &mut R) -> Result<Self, DecodeError>;
	fn encode_msg<W: BufMut>(&self, w: &mut W);
}

impl<M: Message> Encode for M {
	fn encode<W: BufMut>(&self, w: &mut W) {
		// Staged so the length prefix can be written first.
		let mut payload = BytesMut::new();
		self.encode_msg(&mut payload);

		payload.len().encode(w);
		w.put_slice(&payload);
	}
}

impl<M: Message> Decode for M {
	fn decode<R: Buf>(r: &mut R) -> Result<Self, DecodeError> {
		let size = usize::decode(r)?;
		Self::decode_remaining(r, size)?;

		let mut payload = r.copy_to_bytes(size);
		let msg = M::decode_msg(&mut payload).map_err(|err| match err {
			// Running out of payload is malformed, not a reason to wait for more stream data.
			DecodeError::Short => DecodeError::LengthMismatch,
			err => err,
		})?;

		if payload.has_remaining() {
			return Err(DecodeError::ExpectedEnd);
		}

		Ok(msg)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[derive(Debug, PartialEq)]
	struct Pair(u64, u64);

	impl Message for Pair {
		fn decode_msg<R: Buf>(r: &mut R) -> Result<Self, DecodeError> {
			Ok(Self(u64::decode(r)?, u64::decode(r)?))
		}

		fn encode_msg<W: BufMut>(&self, w: &mut W) {
			self.0.encode(w);
			self.1.encode(w);
		}
	}

	#[test]
	fn framed() {
		let mut buf = BytesMut::new();
		Pair(1, 300).encode(&mut buf);
		assert_eq!(buf.as_ref(), &[0x03, 0x01, 0x41, 0x2c]);

		assert_eq!(Pair::decode(&mut buf).unwrap(), Pair(1, 300));
	}

	#[test]
	fn partial() {
		// The length prefix arrived but the payload hasn't.
		let mut buf = &[0x03, 0x01][..];
		assert_eq!(Pair::decode(&mut buf), Err(DecodeError::Short));
	}

	#[test]
	fn overrun() {
		// The payload claims 2 bytes, but the second field needs 2 bytes on its own.
		let mut buf = &[0x02, 0x01, 0x41, 0x2c, 0x00][..];
		assert_eq!(Pair::decode(&mut buf), Err(DecodeError::LengthMismatch));

		// Nothing beyond the declared payload was consumed.
		assert_eq!(buf, &[0x2c, 0x00]);
	}

	#[test]
	fn trailing() {
		let mut buf = &[0x03, 0x01, 0x02, 0x03][..];
		assert_eq!(Pair::decode(&mut buf), Err(DecodeError::ExpectedEnd));
	}
}
