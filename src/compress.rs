//! Streaming bz2 decompression.
//!
//! The manifest's payloads are bz2 streams, so decoding goes through
//! `bzip2::read::BzDecoder` rather than a gzip reader. Both the
//! stream-to-writer and stream-to-file entry points check a shared
//! cancellation flag between chunks so a SIGINT can interrupt a large
//! decompression at a buffer boundary instead of only between files.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use bzip2::read::BzDecoder;

use crate::error::Error;

/// Chunk size for streaming copies, matching the 64 KiB the rest of the
/// patcher standardizes on.
const CHUNK: usize = 64 * 1024;

/// A progress callback invoked with cumulative decompressed bytes written.
pub type ProgressFn<'a> = dyn FnMut(u64) + 'a;

/// Decompress `src` into `dst`, reporting cumulative output bytes via
/// `on_progress`. Fails with `CorruptArchive` on decoder error. Checked
/// against `cancel` once per chunk, so a cancellation request takes effect
/// at the next buffer boundary rather than only once the whole stream has
/// been read.
pub fn decompress_stream(
	src: &Path,
	dst: &mut impl Write,
	cancel: &AtomicBool,
	mut on_progress: impl FnMut(u64),
) -> Result<(), Error> {
	let f = File::open(src).map_err(|e| Error::Io {
		path: src.to_path_buf(),
		source: e,
	})?;
	let mut dec = BzDecoder::new(f);
	let mut buf = vec![0u8; CHUNK];
	let mut total = 0u64;
	loop {
		if cancel.load(Ordering::Relaxed) {
			return Err(Error::Cancelled(src.display().to_string()));
		}
		let n = dec.read(&mut buf).map_err(|e| Error::CorruptArchive {
			what: src.display().to_string(),
			source: e,
		})?;
		if n == 0 {
			break;
		}
		dst.write_all(&buf[..n]).map_err(|e| Error::Io {
			path: src.to_path_buf(),
			source: e,
		})?;
		total += n as u64;
		on_progress(total);
	}
	Ok(())
}

/// Decompress `src` into a newly-created file at `dst`.
pub fn decompress_to_file(
	src: &Path,
	dst: &Path,
	cancel: &AtomicBool,
	on_progress: impl FnMut(u64),
) -> Result<(), Error> {
	let outfh = File::create(dst).map_err(|e| Error::Io {
		path: dst.to_path_buf(),
		source: e,
	})?;
	let mut bw = BufWriter::new(outfh);
	decompress_stream(src, &mut bw, cancel, on_progress)?;
	bw.flush().map_err(|e| Error::Io {
		path: dst.to_path_buf(),
		source: e,
	})?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use bzip2::write::BzEncoder;
	use bzip2::Compression;

	fn compress(data: &[u8]) -> Vec<u8> {
		let mut enc = BzEncoder::new(Vec::new(), Compression::default());
		enc.write_all(data).unwrap();
		enc.finish().unwrap()
	}

	#[test]
	fn roundtrips() {
		let dir = tempfile::tempdir().unwrap();
		let src = dir.path().join("payload.bz2");
		std::fs::write(&src, compress(b"hello world")).unwrap();

		let mut out = Vec::new();
		let mut last = 0u64;
		let cancel = AtomicBool::new(false);
		decompress_stream(&src, &mut out, &cancel, |n| last = n).unwrap();
		assert_eq!(out, b"hello world");
		assert_eq!(last, 11);
	}

	#[test]
	fn corrupt_archive_is_reported() {
		let dir = tempfile::tempdir().unwrap();
		let src = dir.path().join("garbage.bz2");
		std::fs::write(&src, b"not a bz2 stream at all").unwrap();

		let mut out = Vec::new();
		let cancel = AtomicBool::new(false);
		let err = decompress_stream(&src, &mut out, &cancel, |_| {}).unwrap_err();
		assert!(matches!(err, Error::CorruptArchive { .. }));
	}

	#[test]
	fn cancellation_is_observed_before_reading() {
		let dir = tempfile::tempdir().unwrap();
		let src = dir.path().join("payload.bz2");
		std::fs::write(&src, compress(b"hello world")).unwrap();

		let mut out = Vec::new();
		let cancel = AtomicBool::new(true);
		let err = decompress_stream(&src, &mut out, &cancel, |_| {}).unwrap_err();
		assert!(matches!(err, Error::Cancelled(_)));
	}
}
