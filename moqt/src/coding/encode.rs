use std::time;

use bytes::{BufMut, Bytes};

use super::VarInt;

pub trait Encode: Sized {
	// Panics if a fixed-size buffer runs out; the session always encodes into a BytesMut.
	fn encode<W: BufMut>(&self, w: &mut W);
}

impl Encode for u8 {
	fn encode<W: BufMut>(&self, w: &mut W) {
		w.put_u8(*self);
	}
}

impl Encode for String {
	fn encode<W: BufMut>(&self, w: &mut W) {
		self.as_str().encode(w)
	}
}

impl Encode for &str {
	fn encode<W: BufMut>(&self, w: &mut W) {
		self.as_bytes().encode(w)
	}
}

impl Encode for &[u8] {
	fn encode<W: BufMut>(&self, w: &mut W) {
		self.len().encode(w);
		w.put_slice(self);
	}
}

impl Encode for Bytes {
	fn encode<W: BufMut>(&self, w: &mut W) {
		let slice: &[u8] = self;
		slice.encode(w)
	}
}

impl Encode for time::Duration {
	fn encode<W: BufMut>(&self, w: &mut W) {
		// Saturate instead of panicking; 2^62 nanoseconds is over a century.
		let nanos = u64::try_from(self.as_nanos()).unwrap_or(u64::MAX);
		let nanos = VarInt::try_from(nanos).unwrap_or(VarInt::MAX);
		nanos.encode(w);
	}
}
