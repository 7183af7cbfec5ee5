//! The UI sink the driver and executor report progress through, plus the
//! default `indicatif`-backed implementation. Progress reporting sits
//! behind a trait so the crate stays usable as a library (a GUI embedder
//! can supply its own sink), while the CLI binary gets a plain progress
//! bar out of the box.

use indicatif::{ProgressBar, ProgressStyle};

/// Sink the driver calls out to for user interaction and progress
/// reporting. A caller embedding this crate as a library can implement
/// this to drive a GUI progress bar instead.
pub trait UiSink: Send + Sync {
	/// Ask for consent to create `install_dir`. Returns `true` to proceed.
	fn confirm_create_install_dir(&self, install_dir: &std::path::Path) -> bool;

	/// Called once with the total number of actions about to be executed
	/// (skips excluded).
	fn begin_actions(&self, total: u64);
	/// Called once per completed action (success or failure).
	fn action_done(&self);

	/// Called when a specific file's fetch/decompress step makes progress.
	/// `total` is `None` when `Content-Length` wasn't present.
	fn file_progress(&self, file: &str, done: u64, total: Option<u64>);

	/// Called once a file's pipeline has fully finished (successfully).
	fn file_finished(&self, file: &str);
}

/// Default sink for the CLI: one overall `ProgressBar` for the action
/// count, printed lines for individual file completion.
pub struct IndicatifSink {
	bar: ProgressBar,
}

impl IndicatifSink {
	pub fn new() -> Self {
		let bar = ProgressBar::hidden();
		bar.set_style(
			ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} files")
				.expect("valid progress template"),
		);
		Self { bar }
	}
}

impl Default for IndicatifSink {
	fn default() -> Self {
		Self::new()
	}
}

impl UiSink for IndicatifSink {
	fn confirm_create_install_dir(&self, install_dir: &std::path::Path) -> bool {
		use std::io::Write as _;
		print!(
			"{} does not exist. Create it? [y/N] ",
			install_dir.display()
		);
		std::io::stdout().flush().ok();
		let mut answer = String::new();
		if std::io::stdin().read_line(&mut answer).is_err() {
			return false;
		}
		matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
	}

	fn begin_actions(&self, total: u64) {
		self.bar.set_draw_target(indicatif::ProgressDrawTarget::stdout());
		self.bar.set_length(total);
		self.bar.set_position(0);
	}

	fn action_done(&self) {
		self.bar.inc(1);
	}

	fn file_progress(&self, _file: &str, _done: u64, _total: Option<u64>) {
		// The overall bar is enough for the default CLI experience; a
		// richer terminal UI could add a per-file sub-bar here.
	}

	fn file_finished(&self, file: &str) {
		self.bar.println(format!("done: {file}"));
	}
}

/// A no-op sink, useful for tests and for embedding where progress isn't
/// wanted.
#[derive(Default)]
pub struct NullSink;

impl UiSink for NullSink {
	fn confirm_create_install_dir(&self, _install_dir: &std::path::Path) -> bool {
		true
	}
	fn begin_actions(&self, _total: u64) {}
	fn action_done(&self) {}
	fn file_progress(&self, _file: &str, _done: u64, _total: Option<u64>) {}
	fn file_finished(&self, _file: &str) {}
}
