//! End-to-end driver scenarios, stubbing the manifest/mirrors/payload
//! endpoints with `httptest`, grounded in the `rpatchur` reference file's
//! own `httptest`-based download test.

use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bzip2::write::BzEncoder;
use bzip2::Compression;
use httptest::{matchers::*, responders::*, Expectation, Server};
use ttr_patcher::config::Config;
use ttr_patcher::driver::{Outcome, UpdateDriver};
use ttr_patcher::progress::NullSink;

fn bz2(data: &[u8]) -> Vec<u8> {
	let mut enc = BzEncoder::new(Vec::new(), Compression::best());
	enc.write_all(data).unwrap();
	enc.finish().unwrap()
}

fn sha1_hex(data: &[u8]) -> String {
	use sha1::{Digest, Sha1};
	let mut hasher = Sha1::new();
	hasher.update(data);
	let digest = hasher.finalize();
	digest.iter().map(|b| format!("{:02x}", b)).collect()
}

fn base_config(install_dir: &Path, server: &Server) -> Config {
	Config {
		install_dir: install_dir.to_path_buf(),
		manifest_path: "patchmanifest".into(),
		debug: true,
		worker_count: Some(2),
		request_timeout: Duration::from_secs(5),
		retry_count: 3,
		retry_interval: Duration::from_millis(5),
		content_host: server.url("/").to_string(),
		mirrors_url: server.url("/api/mirrors").to_string(),
		login_url: server.url("/api/login").to_string(),
	}
}

fn expect_mirrors(server: &Server) {
	server.expect(
		Expectation::matching(request::method_path("GET", "/api/mirrors"))
			.respond_with(json_encoded(vec![format!("{}", server.url("/"))])),
	);
}

/// Scenario 1: clean install. The install dir is empty; the manifest names
/// one file with a `full_dl`. Expect the file to be fetched, decompressed,
/// and installed, and the run to return `Ok`.
#[test]
fn clean_install_fetches_and_installs() {
	let server = Server::run();
	let game_bytes = b"this is the game binary".to_vec();
	let target_hash = sha1_hex(&game_bytes);
	let compressed = bz2(&game_bytes);
	let comp_hash = sha1_hex(&compressed);

	let manifest = serde_json::json!({
		"game.bin": {
			"platforms": ["linux"],
			"target_hash": target_hash,
			"full_dl": "/payloads/game.bin.bz2",
			"full_comp_hash": comp_hash,
		}
	});

	expect_mirrors(&server);
	server.expect(
		Expectation::matching(request::method_path("GET", "/patchmanifest.txt"))
			.respond_with(json_encoded(manifest)),
	);
	server.expect(
		Expectation::matching(request::method_path("GET", "/payloads/game.bin.bz2"))
			.respond_with(status_code(200).body(compressed)),
	);

	let dir = tempfile::tempdir().unwrap();
	let config = base_config(dir.path(), &server);
	let driver = UpdateDriver::new(config, Arc::new(NullSink));

	match driver.run() {
		Outcome::Ok => {}
		other => panic!("expected Ok, got {other:?}"),
	}

	let installed = std::fs::read(dir.path().join("game.bin")).unwrap();
	assert_eq!(installed, game_bytes);
}

/// Scenario 2: up to date. The local file's hash already matches
/// `target_hash`; expect no HTTP fetch of the payload at all, and `Ok`.
#[test]
fn up_to_date_skips_fetch() {
	let server = Server::run();
	let game_bytes = b"already installed".to_vec();
	let target_hash = sha1_hex(&game_bytes);

	let manifest = serde_json::json!({
		"game.bin": {
			"platforms": ["linux"],
			"target_hash": target_hash,
			"full_dl": "/payloads/game.bin.bz2",
			"full_comp_hash": target_hash,
		}
	});

	expect_mirrors(&server);
	server.expect(
		Expectation::matching(request::method_path("GET", "/patchmanifest.txt"))
			.respond_with(json_encoded(manifest)),
	);
	// No expectation registered for /payloads/... -- a GET there would
	// fail the test via httptest's unmatched-request panic.

	let dir = tempfile::tempdir().unwrap();
	std::fs::write(dir.path().join("game.bin"), &game_bytes).unwrap();
	let config = base_config(dir.path(), &server);
	let driver = UpdateDriver::new(config, Arc::new(NullSink));

	match driver.run() {
		Outcome::Ok => {}
		other => panic!("expected Ok, got {other:?}"),
	}
	assert_eq!(std::fs::read(dir.path().join("game.bin")).unwrap(), game_bytes);
}

/// Scenario 3: patch path. The local file's hash matches a known patch
/// source; expect the patch (not the full payload) to be fetched and
/// applied, producing the target bytes.
#[test]
fn known_source_hash_applies_patch() {
	let server = Server::run();
	let old_bytes = b"version one of the game binary".to_vec();
	let new_bytes = b"version two of the game binary!".to_vec();
	let source_hash = sha1_hex(&old_bytes);
	let target_hash = sha1_hex(&new_bytes);

	let mut patch_buf = Vec::new();
	qbsdiff::Bsdiff::new(&old_bytes)
		.compare(&new_bytes, &mut patch_buf)
		.unwrap();
	let patch_hash = sha1_hex(&patch_buf);
	let compressed_patch = bz2(&patch_buf);
	let comp_patch_hash = sha1_hex(&compressed_patch);

	let manifest = serde_json::json!({
		"game.bin": {
			"platforms": ["linux"],
			"target_hash": target_hash,
			"patches": {
				source_hash: {
					"patch_path": "/patches/game.bin.bdiff.bz2",
					"patch_hash": patch_hash,
					"comp_patch_hash": comp_patch_hash,
				}
			}
		}
	});

	expect_mirrors(&server);
	server.expect(
		Expectation::matching(request::method_path("GET", "/patchmanifest.txt"))
			.respond_with(json_encoded(manifest)),
	);
	server.expect(
		Expectation::matching(request::method_path("GET", "/patches/game.bin.bdiff.bz2"))
			.respond_with(status_code(200).body(compressed_patch)),
	);

	let dir = tempfile::tempdir().unwrap();
	std::fs::write(dir.path().join("game.bin"), &old_bytes).unwrap();
	let config = base_config(dir.path(), &server);
	let driver = UpdateDriver::new(config, Arc::new(NullSink));

	match driver.run() {
		Outcome::Ok => {}
		other => panic!("expected Ok, got {other:?}"),
	}
	assert_eq!(std::fs::read(dir.path().join("game.bin")).unwrap(), new_bytes);
}

/// Scenario 4: drifted file with no recognized source hash, but a
/// `full_dl` is available -- expect a full re-download rather than a
/// failure.
#[test]
fn drifted_unknown_file_falls_back_to_full_download() {
	let server = Server::run();
	let new_bytes = b"the correct, current game binary".to_vec();
	let target_hash = sha1_hex(&new_bytes);
	let compressed = bz2(&new_bytes);
	let comp_hash = sha1_hex(&compressed);

	let manifest = serde_json::json!({
		"game.bin": {
			"platforms": ["linux"],
			"target_hash": target_hash,
			"full_dl": "/payloads/game.bin.bz2",
			"full_comp_hash": comp_hash,
		}
	});

	expect_mirrors(&server);
	server.expect(
		Expectation::matching(request::method_path("GET", "/patchmanifest.txt"))
			.respond_with(json_encoded(manifest)),
	);
	server.expect(
		Expectation::matching(request::method_path("GET", "/payloads/game.bin.bz2"))
			.respond_with(status_code(200).body(compressed)),
	);

	let dir = tempfile::tempdir().unwrap();
	std::fs::write(dir.path().join("game.bin"), b"some completely unrelated drifted content").unwrap();
	let config = base_config(dir.path(), &server);
	let driver = UpdateDriver::new(config, Arc::new(NullSink));

	match driver.run() {
		Outcome::Ok => {}
		other => panic!("expected Ok, got {other:?}"),
	}
	assert_eq!(std::fs::read(dir.path().join("game.bin")).unwrap(), new_bytes);
}

/// Scenario 5: mirror failure then recovery. Two mirrors; the first
/// returns 503 for every request, the second serves correctly. Expect the
/// first to be evicted and the run to still succeed.
#[test]
fn mirror_failure_evicts_and_recovers() {
	let bad_server = Server::run();
	let good_server = Server::run();

	let game_bytes = b"served from the second mirror".to_vec();
	let target_hash = sha1_hex(&game_bytes);
	let compressed = bz2(&game_bytes);
	let comp_hash = sha1_hex(&compressed);

	let manifest = serde_json::json!({
		"game.bin": {
			"platforms": ["linux"],
			"target_hash": target_hash,
			"full_dl": "/payloads/game.bin.bz2",
			"full_comp_hash": comp_hash,
		}
	});

	// The manifest and mirror list themselves come from `good_server`;
	// only the payload fetch is split across the two mirrors.
	good_server.expect(
		Expectation::matching(request::method_path("GET", "/api/mirrors"))
			.respond_with(json_encoded(vec![
				bad_server.url("/").to_string(),
				good_server.url("/").to_string(),
			])),
	);
	good_server.expect(
		Expectation::matching(request::method_path("GET", "/patchmanifest.txt"))
			.respond_with(json_encoded(manifest)),
	);
	bad_server.expect(
		Expectation::matching(request::method_path("GET", "/payloads/game.bin.bz2"))
			.times(1..)
			.respond_with(status_code(503)),
	);
	good_server.expect(
		Expectation::matching(request::method_path("GET", "/payloads/game.bin.bz2"))
			.respond_with(status_code(200).body(compressed)),
	);

	let dir = tempfile::tempdir().unwrap();
	let mut config = base_config(dir.path(), &good_server);
	config.retry_interval = Duration::from_millis(1);
	// Default retry_count (3) gives the outer loop room to hit the bad
	// mirror, evict it, and retry against the good one within this run.
	let driver = UpdateDriver::new(config, Arc::new(NullSink));

	match driver.run() {
		Outcome::Ok => {}
		other => panic!("expected Ok, got {other:?}"),
	}
	assert_eq!(std::fs::read(dir.path().join("game.bin")).unwrap(), game_bytes);
}

/// Scenario 6: corrupt payload. The mirror serves a payload whose
/// compressed SHA-1 doesn't match `full_comp_hash`. Expect the run to
/// return `Failed` naming the file, and the install directory untouched.
#[test]
fn corrupt_payload_fails_without_installing() {
	let server = Server::run();
	let game_bytes = b"whatever the correct content would be".to_vec();
	let target_hash = sha1_hex(&game_bytes);
	let compressed = bz2(&game_bytes);
	// Deliberately wrong expected hash for the compressed payload.
	let wrong_comp_hash = sha1_hex(b"not the compressed bytes we'll actually serve");

	let manifest = serde_json::json!({
		"game.bin": {
			"platforms": ["linux"],
			"target_hash": target_hash,
			"full_dl": "/payloads/game.bin.bz2",
			"full_comp_hash": wrong_comp_hash,
		}
	});

	expect_mirrors(&server);
	server.expect(
		Expectation::matching(request::method_path("GET", "/patchmanifest.txt"))
			.respond_with(json_encoded(manifest)),
	);
	server.expect(
		Expectation::matching(request::method_path("GET", "/payloads/game.bin.bz2"))
			.times(1..)
			.respond_with(status_code(200).body(compressed)),
	);

	let dir = tempfile::tempdir().unwrap();
	let mut config = base_config(dir.path(), &server);
	config.retry_count = 2;
	config.retry_interval = Duration::from_millis(1);
	let driver = UpdateDriver::new(config, Arc::new(NullSink));

	match driver.run() {
		Outcome::Failed(_) => {}
		other => panic!("expected Failed, got {other:?}"),
	}
	assert!(!dir.path().join("game.bin").exists());
}
