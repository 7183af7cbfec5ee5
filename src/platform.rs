//! Platform tag detection.
//!
//! The manifest gates each entry on a small fixed set of platform tags
//! (`win32`, `win64`, `darwin`, `linux`, `linux2`) rather than target-triple
//! strings, so this is a direct `std::env::consts::OS` + pointer-width
//! match rather than anything sysctl-based.

use crate::error::Error;

/// One of the platform tags the manifest understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
	Win32,
	Win64,
	Darwin,
	Linux,
	Linux2,
}

impl Platform {
	/// The tag string as it appears in manifest `platforms` arrays.
	pub fn as_tag(&self) -> &'static str {
		match self {
			Platform::Win32 => "win32",
			Platform::Win64 => "win64",
			Platform::Darwin => "darwin",
			Platform::Linux => "linux",
			Platform::Linux2 => "linux2",
		}
	}

	/// Resolve the running host's platform tag, or `UnsupportedPlatform`
	/// if it isn't one of the five the manifest format recognizes.
	pub fn detect() -> Result<Self, Error> {
		let os = std::env::consts::OS;
		let ptr64 = cfg!(target_pointer_width = "64");
		match os {
			"windows" if ptr64 => Ok(Platform::Win64),
			"windows" => Ok(Platform::Win32),
			"macos" => Ok(Platform::Darwin),
			// Historically toontown's own launcher distinguished "linux"
			// from "linux2" by Python's sys.platform quirk (Python 2 used
			// to report "linux2"); both tags are kept in the manifest
			// format for compatibility, so either may be present on a
			// given entry. We report "linux" as the canonical host tag.
			"linux" => Ok(Platform::Linux),
			other => Err(Error::UnsupportedPlatform(other.to_string())),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn tags_are_stable() {
		assert_eq!(Platform::Win32.as_tag(), "win32");
		assert_eq!(Platform::Win64.as_tag(), "win64");
		assert_eq!(Platform::Darwin.as_tag(), "darwin");
		assert_eq!(Platform::Linux.as_tag(), "linux");
		assert_eq!(Platform::Linux2.as_tag(), "linux2");
	}

	#[test]
	fn detect_matches_running_host() {
		// We can't control the test host's OS, but detect() should at
		// least not panic, and on any of our CI targets (linux/macos) it
		// should succeed.
		let res = Platform::detect();
		#[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
		assert!(res.is_ok());
	}
}
