//! The `Pool` impl that runs one `PlannedAction` end to end: fetch ->
//! verify compressed -> decompress -> verify decompressed -> install/patch
//! -> verify installed.
//!
//! Each action's pipeline stages are strictly sequential and independent of
//! every other action, so one worker function handles both the full-install
//! and patch cases rather than splitting fetch and patch-apply into
//! separate pools.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::error::Error;
use crate::hash::Sha1Hash;
use crate::http::HttpFetcher;
use crate::mirror::MirrorPool;
use crate::planner::PlannedAction;
use crate::progress::UiSink;

/// Shared control for the whole run.
#[derive(Clone)]
pub struct Control {
	pub http: Arc<HttpFetcher>,
	pub mirrors: Arc<MirrorPool>,
	pub install_dir: PathBuf,
	pub staging_dir: PathBuf,
	pub retry_count: u32,
	pub retry_interval: Duration,
	pub cancel: Arc<AtomicBool>,
	pub ui: Arc<dyn UiSink>,
}

pub struct Res {
	pub file: String,
}

pub struct ActionErr {
	pub file: String,
	pub error: Error,
}

/// The action-execution pool. Accumulates successes/failures as they
/// complete; the progress bar itself lives in the `UiSink`, driven by
/// `action_done`/`file_finished` here rather than an internal
/// `indicatif::ProgressBar` field, since the sink is shared with the
/// driver.
pub struct ActionPool {
	oks: Vec<String>,
	errs: Vec<ActionErr>,
}

pub struct PoolResult {
	pub oks: Vec<String>,
	pub errs: Vec<ActionErr>,
}

impl ActionPool {
	pub fn new() -> Self {
		Self {
			oks: Vec::new(),
			errs: Vec::new(),
		}
	}
}

impl Default for ActionPool {
	fn default() -> Self {
		Self::new()
	}
}

impl crate::pool::Pool for ActionPool {
	type Control = Control;
	type UnitControl = Control;
	fn mk_unitcontrol(c: &Control) -> Control {
		c.clone()
	}

	type PoolResult = PoolResult;

	type WorkRequest = PlannedAction;
	type WorkResult = Res;
	type WorkErr = ActionErr;

	fn work(ctrl: &Control, req: PlannedAction) -> Result<Res, ActionErr> {
		let file = req.file().to_string();
		run_action(ctrl, req).map(|()| Res { file: file.clone() }).map_err(|error| ActionErr { file, error })
	}

	fn work_result(&mut self, resp: Result<Res, ActionErr>) {
		match resp {
			Ok(r) => {
				self.oks.push(r.file);
			}
			Err(e) => self.errs.push(e),
		}
	}

	fn finalize(self) -> PoolResult {
		PoolResult {
			oks: self.oks,
			errs: self.errs,
		}
	}
}

/// Run one action's full pipeline: the outer loop retries up to
/// `retry_count` times with `retry_interval` between attempts, evicting the
/// current mirror whenever an attempt fails with a network error.
fn run_action(ctrl: &Control, action: PlannedAction) -> Result<(), Error> {
	if let PlannedAction::Skip { .. } = action {
		return Ok(());
	}

	let file = action.file().to_string();
	let attempts = ctrl.retry_count.max(1);
	let mut last_err = None;

	for attempt in 0..attempts {
		if ctrl.cancel.load(Ordering::Relaxed) {
			return Err(Error::Cancelled(file));
		}

		let mirror = ctrl.mirrors.current();
		match try_pipeline(ctrl, &action, mirror.as_ref()) {
			Ok(()) => {
				ctrl.ui.file_finished(&file);
				return Ok(());
			}
			Err(e) => {
				log::warn!("{file}: attempt {} failed: {e}", attempt + 1);
				if matches!(e, Error::Network { .. }) {
					if let Some(m) = &mirror {
						ctrl.mirrors.evict(m);
					}
				}
				let retryable = e.is_locally_retryable();
				last_err = Some(e);
				if !retryable {
					break;
				}
				if attempt + 1 < attempts {
					thread::sleep(ctrl.retry_interval);
				}
			}
		}
	}

	Err(last_err.expect("loop runs at least once"))
}

fn try_pipeline(ctrl: &Control, action: &PlannedAction, mirror: Option<&url::Url>) -> Result<(), Error> {
	let mirror = mirror.ok_or_else(|| Error::Config("no mirrors remaining".into()))?;

	match action {
		PlannedAction::Skip { .. } => Ok(()),
		PlannedAction::FullDownload {
			file,
			remote_path,
			comp_hash,
			target_hash,
		} => run_full_download(ctrl, mirror, file, remote_path, comp_hash, target_hash),
		PlannedAction::PatchDownload {
			file,
			remote_path,
			comp_patch_hash,
			patch_hash,
			post_patch_hash,
		} => run_patch_download(
			ctrl,
			mirror,
			file,
			remote_path,
			comp_patch_hash,
			patch_hash,
			post_patch_hash,
		),
	}
}

/// Fetch `remote_path` from `mirror` into `<staging_dir>/<remote_path's
/// basename>`, reporting byte progress.
fn fetch_to_staging(ctrl: &Control, mirror: &url::Url, file: &str, remote_path: &str) -> Result<PathBuf, Error> {
	let url = mirror
		.join(remote_path.trim_start_matches('/'))
		.map_err(|e| Error::Config(format!("bad remote path {remote_path}: {e}")))?;

	let staged_name = sanitized_basename(remote_path);
	let staged_path = ctrl.staging_dir.join(&staged_name);

	let (size_hint, mut reader) = ctrl.http.get_stream(&url)?;

	let outfh = fs::File::create(&staged_path).map_err(|e| Error::Io {
		path: staged_path.clone(),
		source: e,
	})?;
	let mut writer = std::io::BufWriter::new(outfh);

	let mut buf = [0u8; 64 * 1024];
	let mut done = 0u64;
	loop {
		if ctrl.cancel.load(Ordering::Relaxed) {
			return Err(Error::Cancelled(file.to_string()));
		}
		use std::io::Read as _;
		let n = reader.read(&mut buf).map_err(|e| Error::Io {
			path: staged_path.clone(),
			source: e,
		})?;
		if n == 0 {
			break;
		}
		use std::io::Write as _;
		writer.write_all(&buf[..n]).map_err(|e| Error::Io {
			path: staged_path.clone(),
			source: e,
		})?;
		done += n as u64;
		ctrl.ui.file_progress(file, done, size_hint);
	}
	writer.flush().map_err(|e| Error::Io {
		path: staged_path.clone(),
		source: e,
	})?;

	Ok(staged_path)
}

fn sanitized_basename(remote_path: &str) -> String {
	Path::new(remote_path)
		.file_name()
		.map(|n| n.to_string_lossy().into_owned())
		.unwrap_or_else(|| remote_path.replace('/', "_"))
}

fn run_full_download(
	ctrl: &Control,
	mirror: &url::Url,
	file: &str,
	remote_path: &str,
	comp_hash: &Sha1Hash,
	target_hash: &Sha1Hash,
) -> Result<(), Error> {
	let compressed = fetch_to_staging(ctrl, mirror, file, remote_path)?;
	crate::hash::check_file(&compressed, comp_hash)?;

	let decompressed = ctrl.staging_dir.join(unique_name(file));
	crate::compress::decompress_to_file(&compressed, &decompressed, &ctrl.cancel, |_| {})?;
	crate::hash::check_file(&decompressed, target_hash)?;

	let install_path = ctrl.install_dir.join(file);
	if let Some(parent) = install_path.parent() {
		fs::create_dir_all(parent).map_err(|e| Error::Io {
			path: parent.to_path_buf(),
			source: e,
		})?;
	}
	fs::rename(&decompressed, &install_path).map_err(|e| Error::Io {
		path: install_path.clone(),
		source: e,
	})?;
	let _ = fs::remove_file(&compressed);
	Ok(())
}

fn run_patch_download(
	ctrl: &Control,
	mirror: &url::Url,
	file: &str,
	remote_path: &str,
	comp_patch_hash: &Sha1Hash,
	patch_hash: &Sha1Hash,
	post_patch_hash: &Sha1Hash,
) -> Result<(), Error> {
	let compressed = fetch_to_staging(ctrl, mirror, file, remote_path)?;
	crate::hash::check_file(&compressed, comp_patch_hash)?;

	let decompressed_patch = ctrl.staging_dir.join(unique_name(&format!("{file}.patch")));
	crate::compress::decompress_to_file(&compressed, &decompressed_patch, &ctrl.cancel, |_| {})?;
	crate::hash::check_file(&decompressed_patch, patch_hash)?;

	let install_path = ctrl.install_dir.join(file);
	if !install_path.is_file() {
		return Err(Error::Io {
			path: install_path.clone(),
			source: std::io::Error::new(std::io::ErrorKind::NotFound, "patch base file missing"),
		});
	}

	// Apply to a staged copy, then rename over the live file, rather than
	// patching in place -- a crash mid-patch leaves the original untouched
	// instead of a half-written file.
	let staged_output = ctrl.staging_dir.join(unique_name(&format!("{file}.out")));
	apply_bspatch(&install_path, &staged_output, &decompressed_patch).map_err(|source| Error::PatchApply {
		path: install_path.clone(),
		source,
	})?;

	crate::hash::check_file(&staged_output, post_patch_hash)?;

	fs::rename(&staged_output, &install_path).map_err(|e| Error::Io {
		path: install_path.clone(),
		source: e,
	})?;
	let _ = fs::remove_file(&compressed);
	let _ = fs::remove_file(&decompressed_patch);
	Ok(())
}

/// bsdiff-4 patch application via `qbsdiff`.
fn apply_bspatch(src: &Path, dst: &Path, patch: &Path) -> Result<(), anyhow::Error> {
	let srcb = fs::read(src)?;
	let mut dstf = fs::File::create(dst)?;
	let patchb = fs::read(patch)?;
	let patcher = qbsdiff::Bspatch::new(&patchb)?;
	patcher.apply(&srcb, &mut dstf)?;
	Ok(())
}

fn unique_name(base: &str) -> String {
	use std::sync::atomic::AtomicU64;
	static COUNTER: AtomicU64 = AtomicU64::new(0);
	let n = COUNTER.fetch_add(1, Ordering::Relaxed);
	format!("{n}-{}", sanitized_basename(base))
}
