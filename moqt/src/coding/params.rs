use std::collections::{btree_map, BTreeMap};

use bytes::{Buf, BufMut, Bytes};

use super::{Decode, DecodeError, Encode};

/// The value of a single parameter, tagged by its wire type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parameter {
	/// wire type 0
	Uint(u64),
	/// wire type 2
	Bytes(Bytes),
}

impl Parameter {
	const WIRE_UINT: u64 = 0;
	const WIRE_BYTES: u64 = 2;
}

/// A map of parameter key to value.
///
/// Unknown keys are preserved so they round trip, but nothing interprets them.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Parameters(BTreeMap<u64, Parameter>);

impl Parameters {
	/// The request path of the session.
	pub const PATH: u64 = 0x01;
	/// The highest subscribe id (exclusive) the sender will accept.
	pub const MAX_SUBSCRIBE_ID: u64 = 0x02;
	pub const AUTHORIZATION_INFO: u64 = 0x03;
	/// Milliseconds.
	pub const DELIVERY_TIMEOUT: u64 = 0x04;
	/// Milliseconds.
	pub const MAX_CACHE_DURATION: u64 = 0x05;

	pub fn new() -> Self {
		Self::default()
	}

	pub fn get(&self, key: u64) -> Option<&Parameter> {
		self.0.get(&key)
	}

	pub fn contains(&self, key: u64) -> bool {
		self.0.contains_key(&key)
	}

	pub fn insert(&mut self, key: u64, value: Parameter) -> Option<Parameter> {
		self.0.insert(key, value)
	}

	pub fn remove(&mut self, key: u64) -> Option<Parameter> {
		self.0.remove(&key)
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn iter(&self) -> btree_map::Iter<'_, u64, Parameter> {
		self.0.iter()
	}

	pub fn set_uint(&mut self, key: u64, value: u64) {
		self.0.insert(key, Parameter::Uint(value));
	}

	pub fn set_bool(&mut self, key: u64, value: bool) {
		self.set_uint(key, value as u64);
	}

	pub fn set_string<S: Into<String>>(&mut self, key: u64, value: S) {
		self.set_bytes(key, value.into());
	}

	pub fn set_bytes<B: Into<Bytes>>(&mut self, key: u64, value: B) {
		self.0.insert(key, Parameter::Bytes(value.into()));
	}

	/// Returns the value if the parameter is present and varint-typed.
	pub fn as_uint(&self, key: u64) -> Option<u64> {
		match self.0.get(&key)? {
			Parameter::Uint(v) => Some(*v),
			Parameter::Bytes(_) => None,
		}
	}

	/// Only 0 and 1 are valid booleans.
	pub fn as_bool(&self, key: u64) -> Option<bool> {
		match self.as_uint(key)? {
			0 => Some(false),
			1 => Some(true),
			_ => None,
		}
	}

	/// Returns the value if the parameter is present, bytes-typed and valid UTF-8.
	pub fn as_string(&self, key: u64) -> Option<&str> {
		std::str::from_utf8(self.as_bytes(key)?).ok()
	}

	pub fn as_bytes(&self, key: u64) -> Option<&[u8]> {
		match self.0.get(&key)? {
			Parameter::Bytes(v) => Some(v),
			Parameter::Uint(_) => None,
		}
	}

	pub fn path(&self) -> Option<&str> {
		self.as_string(Self::PATH)
	}

	pub fn max_subscribe_id(&self) -> Option<u64> {
		self.as_uint(Self::MAX_SUBSCRIBE_ID)
	}

	pub fn authorization_info(&self) -> Option<&str> {
		self.as_string(Self::AUTHORIZATION_INFO)
	}

	fn decode_inner<R: Buf>(r: &mut R) -> Result<Self, DecodeError> {
		let mut params = BTreeMap::new();

		let count = u64::decode(r)?;
		for _ in 0..count {
			let key = u64::decode(r)?;

			let value = match u64::decode(r)? {
				Parameter::WIRE_UINT => Parameter::Uint(u64::decode(r)?),
				Parameter::WIRE_BYTES => Parameter::Bytes(Bytes::decode(r)?),
				wire => return Err(DecodeError::InvalidWireType(wire)),
			};

			if params.insert(key, value).is_some() {
				return Err(DecodeError::DuplicateParameter(key));
			}
		}

		Ok(Self(params))
	}
}

impl Decode for Parameters {
	fn decode<R: Buf>(r: &mut R) -> Result<Self, DecodeError> {
		// Parameters only appear inside a framed message, so running out of bytes is a length mismatch.
		Self::decode_inner(r).map_err(|err| match err {
			DecodeError::Short => DecodeError::ParameterLength,
			err => err,
		})
	}
}

impl Encode for Parameters {
	fn encode<W: BufMut>(&self, w: &mut W) {
		self.0.len().encode(w);

		for (key, value) in &self.0 {
			key.encode(w);

			match value {
				Parameter::Uint(v) => {
					Parameter::WIRE_UINT.encode(w);
					v.encode(w);
				}
				Parameter::Bytes(v) => {
					Parameter::WIRE_BYTES.encode(w);
					v.encode(w);
				}
			}
		}
	}
}

impl<'a> IntoIterator for &'a Parameters {
	type Item = (&'a u64, &'a Parameter);
	type IntoIter = btree_map::Iter<'a, u64, Parameter>;

	fn into_iter(self) -> Self::IntoIter {
		self.0.iter()
	}
}
