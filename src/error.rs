//! The error taxonomy used throughout the patcher core.
//!
//! Everything below the CLI boundary returns `Result<_, Error>`; `main.rs`
//! is the only place `anyhow::Error` shows up, keeping library code on a
//! typed error and leaving free-form context to the binary.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// Transport failure or non-2xx response.  Retryable.
	#[error("network error fetching {url}: {source}")]
	Network {
		url: String,
		#[source]
		source: Box<ureq::Error>,
	},

	/// Malformed JSON from the manifest or mirrors endpoint.  Not retryable.
	#[error("couldn't decode response from {url}: {source}")]
	Decode {
		url: String,
		#[source]
		source: serde_json::Error,
	},

	/// Filesystem error: create, read, write, rename, permission.  Fatal
	/// for the action it happened in, but recoverable on the next run.
	#[error("I/O error on {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	/// Compressed, decompressed, or post-patch verification failed.
	#[error("hash mismatch for {what}: expected {expected}, got {actual}")]
	HashMismatch {
		what: String,
		expected: String,
		actual: String,
	},

	/// bz2 decoder error.  Treated the same as `HashMismatch` for retry
	/// purposes.
	#[error("corrupt archive {what}: {source}")]
	CorruptArchive {
		what: String,
		#[source]
		source: std::io::Error,
	},

	/// Host platform not recognized.  Fatal at driver start.
	#[error("unsupported platform: {0}")]
	UnsupportedPlatform(String),

	/// User refused to create the install directory.  Terminal `declined`.
	#[error("user declined to create install directory {0}")]
	UserDeclined(PathBuf),

	/// A manifest key would escape the install directory (`..` component
	/// or absolute prefix).  The planner drops the entry; this variant is
	/// only surfaced for direct callers of the validation helper.
	#[error("unsafe manifest filename: {0}")]
	UnsafeFilename(String),

	/// Config file couldn't be parsed.
	#[error("config error: {0}")]
	Config(String),

	/// Patch application (bsdiff-4) itself failed, distinct from a
	/// post-patch hash mismatch.
	#[error("failed to apply patch to {path}: {source}")]
	PatchApply {
		path: PathBuf,
		#[source]
		source: anyhow::Error,
	},

	/// Some set of per-file actions failed; the driver aggregates these
	/// and reports them together.
	#[error("update failed for {} file(s): {}", .files.len(), .files.join(", "))]
	UpdateFailed { files: Vec<String> },

	/// A worker was asked to stop (SIGINT) and bailed out at the next
	/// chunk/buffer boundary instead of finishing. Not retried.
	#[error("cancelled while working on {0}")]
	Cancelled(String),
}

impl Error {
	/// Whether this kind is recovered locally by the action retry policy
	/// plus mirror eviction.
	pub fn is_locally_retryable(&self) -> bool {
		matches!(
			self,
			Error::Network { .. } | Error::HashMismatch { .. } | Error::CorruptArchive { .. }
		)
	}
}

pub type Result<T> = std::result::Result<T, Error>;
