//! The manifest data model: `ManifestEntry`, `PatchDesc`, and the
//! filename-safety check the planner uses before ever joining a manifest
//! key onto the install directory.
//!
//! The manifest is parsed once into this tagged struct so the planner and
//! executor never have to touch raw JSON again.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::hash::Sha1Hash;

/// A single patch descriptor, keyed in `ManifestEntry::patches` by the
/// local file's current ("source") SHA-1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchDesc {
	pub patch_path: String,
	pub patch_hash: Sha1Hash,
	pub comp_patch_hash: Sha1Hash,
}

/// One manifest entry, keyed externally by logical filename.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
	pub platforms: Vec<String>,
	pub target_hash: Sha1Hash,
	#[serde(default)]
	pub full_dl: Option<String>,
	#[serde(default)]
	pub full_comp_hash: Option<Sha1Hash>,
	#[serde(default)]
	pub patches: HashMap<String, PatchDesc>,
}

impl ManifestEntry {
	pub fn applies_to(&self, platform_tag: &str) -> bool {
		self.platforms.iter().any(|p| p == platform_tag)
	}

	/// The patch descriptor for a given local ("source") hash, if any.
	pub fn patch_for(&self, source_hash: &Sha1Hash) -> Option<&PatchDesc> {
		self.patches.get(&source_hash.to_string())
	}
}

/// The planner emits actions in manifest iteration order, and that
/// ordering isn't guaranteed by `serde_json::Map` unless the
/// `preserve_order` feature is on downstream. So `Manifest` wraps an
/// explicit `Vec<(String, ManifestEntry)>`, filled in visitation order by
/// the custom `Deserialize` impl below.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
	entries: Vec<(String, ManifestEntry)>,
}

impl Manifest {
	pub fn iter(&self) -> impl Iterator<Item = (&str, &ManifestEntry)> {
		self.entries.iter().map(|(k, v)| (k.as_str(), v))
	}

	#[cfg(test)]
	pub fn from_entries(entries: Vec<(String, ManifestEntry)>) -> Self {
		Self { entries }
	}
}

impl<'de> Deserialize<'de> for Manifest {
	fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
		// `serde_json::Value::Object` preserves insertion order internally
		// (backed by an `IndexMap`-like representation whenever the
		// `preserve_order` feature is active, or a `BTreeMap` otherwise);
		// to avoid depending on that cargo feature being enabled
		// downstream, decode through an owned `Vec<(String, Value)>` shim
		// that serde_json's map visitor fills in insertion order
		// regardless of the backing map type.
		struct OrderedMapVisitor;
		impl<'de> serde::de::Visitor<'de> for OrderedMapVisitor {
			type Value = Vec<(String, ManifestEntry)>;

			fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
				f.write_str("a JSON object mapping logical filenames to manifest entries")
			}

			fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
			where
				A: serde::de::MapAccess<'de>,
			{
				let mut out = Vec::with_capacity(map.size_hint().unwrap_or(0));
				while let Some((k, v)) = map.next_entry::<String, ManifestEntry>()? {
					out.push((k, v));
				}
				Ok(out)
			}
		}
		let entries = d.deserialize_map(OrderedMapVisitor)?;
		Ok(Manifest { entries })
	}
}

/// Reject manifest keys that would escape the install directory: any `..`
/// path component, or an absolute-path prefix.
pub fn is_safe_filename(name: &str) -> bool {
	let path = Path::new(name);
	if path.is_absolute() {
		return false;
	}
	!path
		.components()
		.any(|c| matches!(c, std::path::Component::ParentDir))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn preserves_insertion_order() {
		let json = r#"{"z.bin": {"platforms":["linux"],"target_hash":"a9993e364706816aba3e25717850c26c9cd0d89","full_dl":"/z","full_comp_hash":"a9993e364706816aba3e25717850c26c9cd0d89"},
		               "a.bin": {"platforms":["linux"],"target_hash":"a9993e364706816aba3e25717850c26c9cd0d89","full_dl":"/a","full_comp_hash":"a9993e364706816aba3e25717850c26c9cd0d89"}}"#;
		let manifest: Manifest = serde_json::from_str(json).unwrap();
		let names: Vec<_> = manifest.iter().map(|(k, _)| k).collect();
		assert_eq!(names, vec!["z.bin", "a.bin"]);
	}

	#[test]
	fn rejects_traversal_and_absolute_paths() {
		assert!(is_safe_filename("game/data.bin"));
		assert!(!is_safe_filename("../../etc/passwd"));
		assert!(!is_safe_filename("/etc/passwd"));
		assert!(!is_safe_filename("game/../../etc/passwd"));
	}
}
