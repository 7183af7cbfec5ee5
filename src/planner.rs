//! FileActionPlanner: per-file skip/patch/full-download decisions.
//!
//! Decision order: a missing local file downloads fully if the manifest
//! offers a `full_dl`, otherwise it's silently skipped rather than treated
//! as a plan failure. A present file that already matches the target hash
//! is skipped; one that matches a known patch source is patched; anything
//! else drifted falls back to a full download when available.

use std::path::Path;

use crate::hash::Sha1Hash;
use crate::manifest::{is_safe_filename, Manifest};

/// One planner-emitted unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedAction {
	Skip { file: String },
	FullDownload {
		file: String,
		remote_path: String,
		comp_hash: Sha1Hash,
		target_hash: Sha1Hash,
	},
	PatchDownload {
		file: String,
		remote_path: String,
		comp_patch_hash: Sha1Hash,
		patch_hash: Sha1Hash,
		post_patch_hash: Sha1Hash,
	},
}

impl PlannedAction {
	pub fn file(&self) -> &str {
		match self {
			PlannedAction::Skip { file }
			| PlannedAction::FullDownload { file, .. }
			| PlannedAction::PatchDownload { file, .. } => file,
		}
	}
}

/// Produce a plan for `manifest` against the files currently on disk under
/// `install_dir`, for the given `platform_tag`.
pub fn plan(install_dir: &Path, platform_tag: &str, manifest: &Manifest, debug: bool) -> Vec<PlannedAction> {
	let mut actions = Vec::new();

	for (file, entry) in manifest.iter() {
		if !entry.applies_to(platform_tag) {
			continue;
		}

		if !is_safe_filename(file) {
			log::warn!("rejecting unsafe manifest filename: {file}");
			continue;
		}

		let local_path = install_dir.join(file);

		if !local_path.is_file() {
			let Some(remote_path) = entry.full_dl.clone() else {
				if debug {
					log::debug!("{file}: missing on disk, but manifest has no full_dl; skipping");
				}
				continue;
			};
			let Some(comp_hash) = entry.full_comp_hash.clone() else {
				if debug {
					log::debug!("{file}: missing on disk, but manifest has no full_comp_hash; skipping");
				}
				continue;
			};
			if debug {
				log::debug!("{file}: missing on disk -> FullDownload");
			}
			actions.push(PlannedAction::FullDownload {
				file: file.to_string(),
				remote_path,
				comp_hash,
				target_hash: entry.target_hash.clone(),
			});
			continue;
		}

		let local_hash = match crate::hash::hash_file(&local_path) {
			Ok(h) => h,
			Err(e) => {
				log::warn!("{file}: couldn't hash local copy, treating as drifted: {e}");
				continue;
			}
		};

		if local_hash == entry.target_hash {
			if debug {
				log::debug!("{file}: up to date -> Skip");
			}
			actions.push(PlannedAction::Skip {
				file: file.to_string(),
			});
			continue;
		}

		if let Some(patch) = entry.patch_for(&local_hash) {
			if debug {
				log::debug!("{file}: local hash {local_hash} matches a known patch source -> PatchDownload");
			}
			actions.push(PlannedAction::PatchDownload {
				file: file.to_string(),
				remote_path: patch.patch_path.clone(),
				comp_patch_hash: patch.comp_patch_hash.clone(),
				patch_hash: patch.patch_hash.clone(),
				post_patch_hash: entry.target_hash.clone(),
			});
			continue;
		}

		if debug {
			log::debug!("{file}: local hash {local_hash} unrecognized -> FullDownload");
		}
		match (entry.full_dl.clone(), entry.full_comp_hash.clone()) {
			(Some(remote_path), Some(comp_hash)) => {
				actions.push(PlannedAction::FullDownload {
					file: file.to_string(),
					remote_path,
					comp_hash,
					target_hash: entry.target_hash.clone(),
				});
			}
			_ => {
				if debug {
					log::debug!("{file}: drifted, but manifest has no full_dl; skipping");
				}
			}
		}
	}

	actions
}
