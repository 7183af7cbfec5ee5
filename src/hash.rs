//! SHA-1 hashing utils.
//!
//! The manifest format is fixed by the remote service to 40-hex SHA-1
//! digests, so `Sha1Hash` is a small newtype around one, with streaming
//! hash helpers (fixed-size chunks, `FromStr`/`Display`, and a `check_*`
//! family that hashes then compares in one call) built on top.

use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::str::FromStr;

use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use sha1::{Digest, Sha1};

/// Chunk size used for all streaming hash reads, matching the 64 KiB the
/// original patcher's `get_sha1sum` used.
const CHUNK: usize = 64 * 1024;

/// A 40-hex SHA-1 digest, newtyped so it can't be confused with an
/// arbitrary string, and so (de)serialization always goes through hex --
/// manifests carry these as plain lowercase-hex JSON strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sha1Hash([u8; 20]);

impl Sha1Hash {
	pub fn from_digest(bytes: [u8; 20]) -> Self {
		Self(bytes)
	}
}

impl Serialize for Sha1Hash {
	fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
		s.serialize_str(&self.to_string())
	}
}

impl<'de> Deserialize<'de> for Sha1Hash {
	fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
		let s = String::deserialize(d)?;
		s.parse().map_err(D::Error::custom)
	}
}

impl fmt::Display for Sha1Hash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for b in &self.0 {
			write!(f, "{:02x}", b)?;
		}
		Ok(())
	}
}

impl FromStr for Sha1Hash {
	type Err = Sha1HashParseErr;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.len() != 40 {
			return Err(Sha1HashParseErr::WrongLength(s.len()));
		}
		let mut out = [0u8; 20];
		base16ct::mixed::decode(s.as_bytes(), &mut out)
			.map_err(|e| Sha1HashParseErr::Hex(e.to_string()))?;
		Ok(Self(out))
	}
}

#[derive(Debug, thiserror::Error)]
pub enum Sha1HashParseErr {
	#[error("expected a 40-hex SHA-1 digest, got {0} chars")]
	WrongLength(usize),
	#[error("invalid hex: {0}")]
	Hex(String),
}

/// Errors from the streaming hash helpers.
#[derive(Debug, thiserror::Error)]
pub enum HashErr {
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
}

/// Hash an arbitrary reader, streaming it in `CHUNK`-sized pieces.
pub fn hash_reader<R: Read>(mut r: R) -> Result<Sha1Hash, HashErr> {
	let mut hasher = Sha1::new();
	let mut buf = vec![0u8; CHUNK];
	loop {
		let n = r.read(&mut buf)?;
		if n == 0 {
			break;
		}
		hasher.update(&buf[..n]);
	}
	Ok(Sha1Hash::from_digest(hasher.finalize().into()))
}

/// Hash a file by path, opening it fresh.
pub fn hash_file(path: impl AsRef<Path>) -> Result<Sha1Hash, HashErr> {
	let f = File::open(path)?;
	hash_reader(f)
}

/// Hash a reusable file handle, seeking to the start first -- mirrors the
/// original `get_sha1sum`'s `file_obj.seek(0)` before reading.
pub fn hash_seekable(mut f: impl Read + Seek) -> Result<Sha1Hash, HashErr> {
	f.seek(SeekFrom::Start(0))?;
	hash_reader(f)
}

/// Hash a reader and compare against an expected digest in one call.
pub fn check_reader<R: Read>(
	r: R,
	what: &str,
	expected: &Sha1Hash,
) -> Result<(), crate::error::Error> {
	let actual = hash_reader(r).map_err(|e| crate::error::Error::Io {
		path: what.into(),
		source: match e {
			HashErr::Io(io) => io,
		},
	})?;
	if &actual != expected {
		return Err(crate::error::Error::HashMismatch {
			what: what.to_string(),
			expected: expected.to_string(),
			actual: actual.to_string(),
		});
	}
	Ok(())
}

/// Hash a file and compare against an expected digest in one call.
pub fn check_file(
	path: impl AsRef<Path>,
	expected: &Sha1Hash,
) -> Result<(), crate::error::Error> {
	let path = path.as_ref();
	let f = File::open(path).map_err(|e| crate::error::Error::Io {
		path: path.to_path_buf(),
		source: e,
	})?;
	check_reader(f, &path.display().to_string(), expected)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn hashes_known_string() {
		// sha1("abc") is a well-known test vector.
		let h = hash_reader(std::io::Cursor::new(b"abc")).unwrap();
		assert_eq!(h.to_string(), "a9993e364706816aba3e25717850c26c9cd0d89");
	}

	#[test]
	fn roundtrips_through_fromstr_display() {
		let h = hash_reader(std::io::Cursor::new(b"abc")).unwrap();
		let s = h.to_string();
		let h2: Sha1Hash = s.parse().unwrap();
		assert_eq!(h, h2);
	}

	#[test]
	fn rejects_wrong_length() {
		let err = "deadbeef".parse::<Sha1Hash>().unwrap_err();
		assert!(matches!(err, Sha1HashParseErr::WrongLength(8)));
	}

	#[test]
	fn check_file_matches() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("f");
		std::fs::write(&path, b"abc").unwrap();
		let expected: Sha1Hash = "a9993e364706816aba3e25717850c26c9cd0d89"
			.parse()
			.unwrap();
		check_file(&path, &expected).unwrap();
	}

	#[test]
	fn check_file_reports_mismatch() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("f");
		std::fs::write(&path, b"not abc").unwrap();
		let expected: Sha1Hash = "a9993e364706816aba3e25717850c26c9cd0d89"
			.parse()
			.unwrap();
		let err = check_file(&path, &expected).unwrap_err();
		assert!(matches!(err, crate::error::Error::HashMismatch { .. }));
	}
}
