//! UpdateDriver: the public entry point wiring platform detection,
//! manifest+mirror fetch, planning, and execution together.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::error::Error;
use crate::executor::PatchExecutor;
use crate::http::HttpFetcher;
use crate::manifest::Manifest;
use crate::mirror::MirrorPool;
use crate::planner;
use crate::platform::Platform;
use crate::progress::UiSink;

/// Outcome of a full driver run, surfaced to the CLI or any embedding
/// caller.
#[derive(Debug)]
pub enum Outcome {
	Ok,
	Declined,
	Failed(Error),
}

pub struct UpdateDriver {
	config: Config,
	ui: Arc<dyn UiSink>,
}

impl UpdateDriver {
	pub fn new(config: Config, ui: Arc<dyn UiSink>) -> Self {
		Self { config, ui }
	}

	/// Run the full `START -> CHECK_DIR -> FETCH_MANIFEST -> PLAN ->
	/// EXECUTE -> DONE` state machine.
	pub fn run(&self) -> Outcome {
		match self.try_run() {
			Ok(outcome) => outcome,
			Err(e) => Outcome::Failed(e),
		}
	}

	fn try_run(&self) -> Result<Outcome, Error> {
		// START: platform detection. An unsupported host short-circuits
		// before we ever touch the install directory.
		let platform = Platform::detect()?;
		log::info!("detected platform tag: {}", platform.as_tag());

		// CHECK_DIR
		let install_dir = self.config.install_dir.clone();
		if !install_dir.exists() {
			if !self.ui.confirm_create_install_dir(&install_dir) {
				return Ok(Outcome::Declined);
			}
			std::fs::create_dir_all(&install_dir).map_err(|e| Error::Io {
				path: install_dir.clone(),
				source: e,
			})?;
		}
		crate::executor::check_install_dir_writable(&install_dir)?;

		let http = Arc::new(HttpFetcher::new(
			self.config.request_timeout,
			self.config.retry_count,
			self.config.retry_interval,
		));

		// FETCH_MANIFEST (and the mirror list alongside it -- both are
		// small JSON GETs through the same retry policy).
		let manifest_url = self
			.config
			.manifest_url()
			.map_err(|e| Error::Config(format!("bad manifest url: {e}")))?;
		let manifest: Manifest = http.get_json(&manifest_url)?;

		let mirrors_url = url::Url::parse(&self.config.mirrors_url)
			.map_err(|e| Error::Config(format!("bad mirrors url: {e}")))?;
		let mirror_urls: Vec<url::Url> = http.get_json(&mirrors_url)?;
		let mirrors = Arc::new(MirrorPool::new(mirror_urls));
		if mirrors.is_empty() {
			return Err(Error::Config("mirrors endpoint returned an empty list".into()));
		}

		// PLAN
		let plan = planner::plan(&install_dir, platform.as_tag(), &manifest, self.config.debug);
		if plan.iter().all(|a| matches!(a, planner::PlannedAction::Skip { .. })) {
			log::info!("install directory already up to date");
			return Ok(Outcome::Ok);
		}

		// EXECUTE
		let executor = PatchExecutor::new(
			install_dir,
			self.config.retry_count,
			self.config.retry_interval,
			self.ui.clone(),
		);
		executor.run(http, mirrors, plan)?;

		Ok(Outcome::Ok)
	}
}

/// Convenience default-install-dir lookup, per-OS. Only used by
/// `CredentialStore`'s `SavedLogin` default detection and the CLI's
/// built-in default -- the driver itself always takes an explicit path
/// from `Config`.
pub fn default_install_dir() -> Option<PathBuf> {
	if cfg!(target_os = "windows") {
		std::env::var_os("LOCALAPPDATA").map(|p| PathBuf::from(p).join("Toontown Rewritten"))
	} else if cfg!(target_os = "macos") {
		dirs_next_home().map(|h| h.join("Library/Application Support/Toontown Rewritten"))
	} else {
		dirs_next_home().map(|h| h.join(".toontown-rewritten"))
	}
}

fn dirs_next_home() -> Option<PathBuf> {
	std::env::var_os("HOME").map(PathBuf::from)
}
