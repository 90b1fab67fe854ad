use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::message::StreamType;
use crate::{coding, message, transport};

/// Sent when closing the whole connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum SessionErrorCode {
	NoError = 0x0,
	Internal = 0x1,
	Unauthorized = 0x2,
	ProtocolViolation = 0x3,
	ParameterLengthMismatch = 0x5,
	TooManySubscribes = 0x6,
	GoAwayTimeout = 0x10,
	HandleTimeout = 0x11,
}

/// Used to cancel a stream before its type is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum StreamErrorCode {
	Internal = 0x0,
	InvalidStreamType = 0x10,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum AnnounceErrorCode {
	Internal = 0x0,
	DuplicatedTrackPath = 0x1,
	DuplicatedInterest = 0x2,
	ProtocolViolation = 0x3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum SubscribeErrorCode {
	Internal = 0x0,
	InvalidRange = 0x1,
	DuplicatedId = 0x2,
	TrackDoesNotExist = 0x3,
	Unauthorized = 0x4,
	Timeout = 0x5,
	UpdateError = 0x6,
	ClosedTrack = 0x7,
	EndedTrack = 0x8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum InfoErrorCode {
	Internal = 0x0,
	TrackDoesNotExist = 0x1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum FetchErrorCode {
	Internal = 0x0,
	NoGroup = 0x1,
	InvalidOffset = 0x2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum GroupErrorCode {
	Internal = 0x0,
	SendInterrupted = 0x1,
	OutOfRange = 0x2,
	Expires = 0x3,
	Closed = 0x4,
	TrackDoesNotExist = 0x5,
}

/// A list of possible errors that can occur during the session.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
	#[error("transport error: {0}")]
	Transport(#[from] transport::TransportError),

	#[error("decode error: {0}")]
	Decode(#[from] coding::DecodeError),

	#[error("unsupported versions: client={0:?} server={1:?}")]
	Version(message::Versions, message::Versions),

	/// A stream type arrived on the wrong kind of stream, or at the wrong time.
	#[error("unexpected stream: {0:?}")]
	UnexpectedStream(StreamType),

	#[error("protocol violation: {0}")]
	ProtocolViolation(&'static str),

	#[error("unauthorized")]
	Unauthorized,

	#[error("too many subscribes")]
	TooManySubscribes,

	#[error("duplicate subscribe id")]
	DuplicateId,

	#[error("duplicate track path")]
	DuplicateTrack,

	#[error("duplicate announce interest")]
	DuplicateInterest,

	#[error("invalid group range")]
	InvalidRange,

	#[error("group out of range")]
	OutOfRange,

	#[error("not found")]
	NotFound,

	#[error("track closed")]
	ClosedTrack,

	#[error("track ended")]
	EndedTrack,

	#[error("no such group")]
	NoGroup,

	#[error("invalid frame offset")]
	InvalidOffset,

	#[error("group expired")]
	Expired,

	#[error("send interrupted")]
	SendInterrupted,

	/// A deadline elapsed before the I/O completed.
	#[error("timeout")]
	Timeout,

	#[error("goaway timeout")]
	GoAwayTimeout,

	/// The handle was closed locally, or nobody is listening anymore.
	#[error("cancelled")]
	Cancel,

	/// The peer closed a stream with an error code in that stream's category.
	#[error("remote error: code={0}")]
	Remote(u32),

	/// The session is gone.
	#[error("session closed")]
	Closed,
}

impl Error {
	/// The code used to terminate the connection.
	pub fn session_code(&self) -> SessionErrorCode {
		use SessionErrorCode as Code;

		match self {
			Self::Cancel | Self::Closed => Code::NoError,
			Self::Unauthorized => Code::Unauthorized,
			Self::TooManySubscribes => Code::TooManySubscribes,
			Self::GoAwayTimeout => Code::GoAwayTimeout,
			Self::Timeout => Code::HandleTimeout,
			Self::Decode(coding::DecodeError::ParameterLength | coding::DecodeError::DuplicateParameter(_)) => {
				Code::ParameterLengthMismatch
			}
			Self::Decode(_)
			| Self::Version(..)
			| Self::UnexpectedStream(_)
			| Self::ProtocolViolation(_)
			| Self::DuplicateTrack => Code::ProtocolViolation,
			Self::Transport(transport::TransportError::Closed { code, .. }) => {
				Code::try_from(*code).unwrap_or(Code::Internal)
			}
			_ => Code::Internal,
		}
	}

	pub fn stream_code(&self) -> StreamErrorCode {
		match self {
			Self::Decode(coding::DecodeError::InvalidStreamType(_)) | Self::UnexpectedStream(_) => {
				StreamErrorCode::InvalidStreamType
			}
			_ => StreamErrorCode::Internal,
		}
	}

	pub fn announce_code(&self) -> AnnounceErrorCode {
		use AnnounceErrorCode as Code;

		match self {
			Self::DuplicateTrack => Code::DuplicatedTrackPath,
			Self::DuplicateInterest => Code::DuplicatedInterest,
			Self::Decode(_) | Self::ProtocolViolation(_) => Code::ProtocolViolation,
			Self::Remote(code) => Code::try_from(*code).unwrap_or(Code::Internal),
			_ => Code::Internal,
		}
	}

	pub fn subscribe_code(&self) -> SubscribeErrorCode {
		use SubscribeErrorCode as Code;

		match self {
			Self::InvalidRange => Code::InvalidRange,
			Self::DuplicateId => Code::DuplicatedId,
			Self::NotFound => Code::TrackDoesNotExist,
			Self::Unauthorized => Code::Unauthorized,
			Self::Timeout => Code::Timeout,
			Self::ClosedTrack => Code::ClosedTrack,
			Self::EndedTrack => Code::EndedTrack,
			Self::Remote(code) => Code::try_from(*code).unwrap_or(Code::Internal),
			_ => Code::Internal,
		}
	}

	pub fn info_code(&self) -> InfoErrorCode {
		match self {
			Self::NotFound => InfoErrorCode::TrackDoesNotExist,
			Self::Remote(code) => InfoErrorCode::try_from(*code).unwrap_or(InfoErrorCode::Internal),
			_ => InfoErrorCode::Internal,
		}
	}

	pub fn fetch_code(&self) -> FetchErrorCode {
		use FetchErrorCode as Code;

		match self {
			Self::NoGroup => Code::NoGroup,
			Self::InvalidOffset => Code::InvalidOffset,
			Self::Remote(code) => Code::try_from(*code).unwrap_or(Code::Internal),
			_ => Code::Internal,
		}
	}

	pub fn group_code(&self) -> GroupErrorCode {
		use GroupErrorCode as Code;

		match self {
			Self::SendInterrupted | Self::Timeout => Code::SendInterrupted,
			Self::OutOfRange | Self::InvalidRange => Code::OutOfRange,
			Self::Expired => Code::Expires,
			Self::ClosedTrack | Self::Closed | Self::Cancel => Code::Closed,
			Self::NotFound => Code::TrackDoesNotExist,
			Self::Remote(code) => Code::try_from(*code).unwrap_or(Code::Internal),
			_ => Code::Internal,
		}
	}

	/// The code for a stream of the given type.
	pub fn to_code(&self, kind: StreamType) -> u32 {
		match kind {
			StreamType::Session => self.session_code().into(),
			StreamType::Announce => self.announce_code().into(),
			StreamType::Subscribe => self.subscribe_code().into(),
			StreamType::Info => self.info_code().into(),
			StreamType::Fetch => self.fetch_code().into(),
			StreamType::Group => self.group_code().into(),
		}
	}

	/// True if the error must terminate the whole session instead of a single stream.
	pub fn is_fatal(&self) -> bool {
		matches!(
			self,
			Self::Transport(_)
				| Self::Version(..)
				| Self::UnexpectedStream(_)
				| Self::ProtocolViolation(_)
				| Self::TooManySubscribes
				| Self::Decode(coding::DecodeError::InvalidStreamType(_))
		)
	}

	/// Converts a transport reset into [Error::Remote] so the code can be read back in its category.
	pub(crate) fn remote(self) -> Self {
		match self {
			Self::Transport(transport::TransportError::Reset(code) | transport::TransportError::Stopped(code)) => {
				Self::Remote(code)
			}
			err => err,
		}
	}
}

pub type Result<T> = std::result::Result<T, Error>;
