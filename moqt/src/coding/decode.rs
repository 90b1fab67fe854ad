use std::{string::FromUtf8Error, time};

use bytes::{Buf, Bytes};
use thiserror::Error;

pub trait Decode: Sized {
	fn decode<R: Buf>(r: &mut R) -> Result<Self, DecodeError>;

	// Helper function to make sure we have enough bytes to decode
	fn decode_remaining<R: Buf>(r: &R, required: usize) -> Result<(), DecodeError> {
		if r.remaining() < required {
			Err(DecodeError::Short)
		} else {
			Ok(())
		}
	}
}

/// A decode error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
	/// Not enough bytes buffered yet; the stream reader retries after reading more.
	#[error("short buffer")]
	Short,

	/// A field ran past the declared payload length.
	#[error("length mismatch")]
	LengthMismatch,

	#[error("invalid string")]
	InvalidString(#[from] FromUtf8Error),

	#[error("invalid stream type: {0}")]
	InvalidStreamType(u8),

	#[error("invalid announce status: {0}")]
	InvalidAnnounceStatus(u8),

	#[error("invalid group order: {0}")]
	InvalidGroupOrder(u8),

	#[error("invalid parameter wire type: {0}")]
	InvalidWireType(u64),

	#[error("duplicate parameter: {0}")]
	DuplicateParameter(u64),

	#[error("parameter length mismatch")]
	ParameterLength,

	#[error("invalid value")]
	InvalidValue,

	#[error("bounds exceeded")]
	BoundsExceeded,

	#[error("expected end")]
	ExpectedEnd,

	#[error("expected data")]
	ExpectedData,
}

impl Decode for u8 {
	fn decode<R: Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Self::decode_remaining(r, 1)?;
		Ok(r.get_u8())
	}
}

impl Decode for Bytes {
	fn decode<R: Buf>(r: &mut R) -> Result<Self, DecodeError> {
		let size = usize::decode(r)?;
		Self::decode_remaining(r, size)?;
		Ok(r.copy_to_bytes(size))
	}
}

impl Decode for String {
	/// Decode a string with a varint length prefix.
	fn decode<R: Buf>(r: &mut R) -> Result<Self, DecodeError> {
		let bytes = Bytes::decode(r)?;
		let str = String::from_utf8(bytes.to_vec())?;
		Ok(str)
	}
}

impl Decode for time::Duration {
	/// Durations are carried as nanoseconds.
	fn decode<R: Buf>(r: &mut R) -> Result<Self, DecodeError> {
		let nanos = u64::decode(r)?;
		Ok(time::Duration::from_nanos(nanos))
	}
}
