//! PatchExecutor: runs a plan's non-`Skip` actions through the bounded
//! worker pool, managing the staging directory and SIGINT cancellation.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::Error;
use crate::http::HttpFetcher;
use crate::mirror::MirrorPool;
use crate::planner::PlannedAction;
use crate::pool::action::{ActionPool, Control};
use crate::pool::Pool as _;
use crate::progress::UiSink;

pub struct PatchExecutor {
	install_dir: PathBuf,
	retry_count: u32,
	retry_interval: Duration,
	ui: Arc<dyn UiSink>,
}

impl PatchExecutor {
	pub fn new(
		install_dir: PathBuf,
		retry_count: u32,
		retry_interval: Duration,
		ui: Arc<dyn UiSink>,
	) -> Self {
		Self {
			install_dir,
			retry_count,
			retry_interval,
			ui,
		}
	}

	/// Run `plan` to completion. Creates a staging directory under
	/// `install_dir` (same filesystem, so patch/install renames are
	/// atomic), tears it down on exit regardless of outcome, and installs
	/// a SIGINT handler that flips a shared cancellation flag checked
	/// between pipeline stages -- in-flight actions finish their current
	/// stage rather than being killed mid-write.
	pub fn run(
		&self,
		http: Arc<HttpFetcher>,
		mirrors: Arc<MirrorPool>,
		plan: Vec<PlannedAction>,
	) -> Result<(), Error> {
		let (skips, work): (Vec<_>, Vec<_>) = plan
			.into_iter()
			.partition(|a| matches!(a, PlannedAction::Skip { .. }));
		log::info!("{} file(s) already up to date, {} to fetch", skips.len(), work.len());

		if work.is_empty() {
			return Ok(());
		}

		let staging = tempfile::Builder::new()
			.prefix(".ttr-patcher-staging-")
			.tempdir_in(&self.install_dir)
			.map_err(|e| Error::Io {
				path: self.install_dir.clone(),
				source: e,
			})?;

		let cancel = Arc::new(AtomicBool::new(false));
		let cancel_for_handler = cancel.clone();
		// Only the first SIGINT is actioned; a second one falls through to
		// the default handler so an unresponsive run can still be killed.
		let _ = ctrlc::set_handler(move || {
			log::warn!("interrupt received, finishing in-flight actions then stopping");
			cancel_for_handler.store(true, Ordering::Relaxed);
		});

		let control = Control {
			http,
			mirrors,
			install_dir: self.install_dir.clone(),
			staging_dir: staging.path().to_path_buf(),
			retry_count: self.retry_count,
			retry_interval: self.retry_interval,
			cancel,
			ui: self.ui.clone(),
		};

		self.ui.begin_actions(work.len() as u64);
		let result = ActionPool::new().run(&control, work);
		let outcome = result.map_err(|e| Error::Io {
			path: self.install_dir.clone(),
			source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
		})?;

		for _ in &outcome.oks {
			self.ui.action_done();
		}
		for _ in &outcome.errs {
			self.ui.action_done();
		}

		if outcome.errs.is_empty() {
			Ok(())
		} else {
			let files = outcome.errs.iter().map(|e| e.file.clone()).collect();
			for e in &outcome.errs {
				log::error!("{}: {}", e.file, e.error);
			}
			Err(Error::UpdateFailed { files })
		}
	}
}

/// Whether `dir` exists and is writable enough to stage a temp directory
/// in. Used by the driver before it even fetches the manifest, so a
/// permissions problem surfaces before any network I/O.
pub fn check_install_dir_writable(dir: &Path) -> Result<(), Error> {
	let probe = tempfile::Builder::new()
		.prefix(".ttr-patcher-write-check-")
		.tempdir_in(dir);
	match probe {
		Ok(_) => Ok(()),
		Err(e) => Err(Error::Io {
			path: dir.to_path_buf(),
			source: e,
		}),
	}
}
