use std::fmt;

use bytes::Bytes;

/// A hierarchical track name made of opaque parts.
///
/// Equality and ordering compare the part sequence, so `["a/b"]` and `["a", "b"]` are different paths.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Path {
	parts: Vec<Bytes>,
}

impl Path {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn from_parts(parts: Vec<Bytes>) -> Self {
		Self { parts }
	}

	pub fn parts(&self) -> &[Bytes] {
		&self.parts
	}

	pub fn into_parts(self) -> Vec<Bytes> {
		self.parts
	}

	pub fn len(&self) -> usize {
		self.parts.len()
	}

	pub fn is_empty(&self) -> bool {
		self.parts.is_empty()
	}

	pub fn push<P: Into<Bytes>>(mut self, part: P) -> Self {
		self.parts.push(part.into());
		self
	}

	/// Appends every part of `other`.
	pub fn join(&self, other: &Path) -> Self {
		let mut parts = self.parts.clone();
		parts.extend_from_slice(&other.parts);
		Self { parts }
	}

	pub fn has_prefix(&self, prefix: &Path) -> bool {
		self.parts.starts_with(&prefix.parts)
	}

	/// Returns the remaining parts after `prefix`, or None if it's not a prefix.
	pub fn strip_prefix(&self, prefix: &Path) -> Option<Path> {
		let suffix = self.parts.strip_prefix(prefix.parts.as_slice())?;
		Some(Self::from_parts(suffix.to_vec()))
	}
}

impl<const N: usize> From<[&str; N]> for Path {
	fn from(parts: [&str; N]) -> Self {
		parts.iter().map(|p| p.as_bytes()).collect()
	}
}

impl From<Vec<String>> for Path {
	fn from(parts: Vec<String>) -> Self {
		Self::from_parts(parts.into_iter().map(Bytes::from).collect())
	}
}

/// Splits on `/`, ignoring empty segments.
impl From<&str> for Path {
	fn from(path: &str) -> Self {
		path.split('/').filter(|p| !p.is_empty()).map(str::as_bytes).collect()
	}
}

impl<'a> FromIterator<&'a [u8]> for Path {
	fn from_iter<T: IntoIterator<Item = &'a [u8]>>(iter: T) -> Self {
		Self::from_parts(iter.into_iter().map(Bytes::copy_from_slice).collect())
	}
}

impl fmt::Display for Path {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for (i, part) in self.parts.iter().enumerate() {
			if i > 0 {
				write!(f, "/")?;
			}
			write!(f, "{}", String::from_utf8_lossy(part))?;
		}

		Ok(())
	}
}

impl fmt::Debug for Path {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_list()
			.entries(self.parts.iter().map(|p| String::from_utf8_lossy(p)))
			.finish()
	}
}

#[cfg(test)]
mod test {
	use super::*;

	use crate::coding::{Decode, DecodeError, Encode};
	use bytes::BytesMut;

	#[test]
	fn prefix() {
		let path = Path::from(["room", "42", "alice"]);
		let prefix = Path::from(["room", "42"]);

		assert!(path.has_prefix(&prefix));
		assert!(path.has_prefix(&Path::new()));
		assert!(!prefix.has_prefix(&path));
		assert_eq!(path.strip_prefix(&prefix), Some(Path::from(["alice"])));
		assert_eq!(path.strip_prefix(&Path::from(["room", "4"])), None);
		assert_eq!(prefix.join(&Path::from(["alice"])), path);
	}

	#[test]
	fn parts_not_joined() {
		assert_ne!(Path::from(["a/b"]), Path::from(["a", "b"]));
		assert_eq!(Path::from("/a//b/"), Path::from(["a", "b"]));
	}

	#[test]
	fn tuple() {
		let path = Path::from(["room", "42"]);

		let mut buf = BytesMut::new();
		path.encode(&mut buf);
		assert_eq!(buf.as_ref(), b"\x02\x04room\x0242");

		assert_eq!(Path::decode(&mut buf).unwrap(), path);
	}

	#[test]
	fn tuple_short() {
		let mut buf = &b"\x02\x04room"[..];
		assert_eq!(Path::decode(&mut buf), Err(DecodeError::Short));
	}
}
