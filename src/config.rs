//! Loading and dealing with the patcher's configuration.
//!
//! The config file is a flat `key value`-per-line format, parsed by hand
//! rather than through a serde-based format -- there's no nested structure
//! here, and a hand-rolled parser with per-field error reporting doubles as
//! a readable reference for the file format for anyone editing it directly.

use std::path::PathBuf;
use std::time::Duration;

use derivative::Derivative;
use thiserror::Error;

#[derive(Debug, Clone, Derivative)]
#[derivative(Default)]
pub struct Config {
	/// Where the game is (to be) installed.
	pub install_dir: PathBuf,

	/// Suffix appended to `content_host` to form the manifest URL.
	#[derivative(Default(value = "\"patchmanifest\".into()"))]
	pub manifest_path: String,

	/// Enables per-file planning decision logging.
	pub debug: bool,

	/// Worker count for `PatchExecutor`; `None` means "logical CPU count".
	pub worker_count: Option<u32>,

	/// HTTP request timeout.
	#[derivative(Default(value = "Duration::from_secs(30)"))]
	pub request_timeout: Duration,

	/// Number of attempts for the bounded-retry policy.
	#[derivative(Default(value = "3"))]
	pub retry_count: u32,

	/// Sleep between retry attempts.
	#[derivative(Default(value = "Duration::from_secs(10)"))]
	pub retry_interval: Duration,

	/// Host serving the manifest.
	#[derivative(Default(value = "\"https://cdn.toontownrewritten.com/content/\".into()"))]
	pub content_host: String,

	/// Endpoint returning the JSON mirror list.
	#[derivative(Default(
		value = "\"https://www.toontownrewritten.com/api/mirrors\".into()"
	))]
	pub mirrors_url: String,

	/// Login endpoint for `LoginClient`.
	#[derivative(Default(
		value = "\"https://www.toontownrewritten.com/api/login\".into()"
	))]
	pub login_url: String,
}

impl Config {
	/// The manifest URL built from `content_host` + `manifest_path`,
	/// appending `.txt` if the path ends bare in "patchmanifest".
	pub fn manifest_url(&self) -> Result<url::Url, url::ParseError> {
		let mut path = self.manifest_path.clone();
		if path.ends_with("patchmanifest") {
			path.push_str(".txt");
		}
		url::Url::parse(&self.content_host)?.join(&path)
	}
}

/// Problems loading config.
#[derive(Debug, Error)]
pub enum ConfigErr {
	/// File I/O error of some sort.
	#[error("config file I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// Syntax error in the config file.
	#[error("config file syntax error: {0}")]
	Syntax(String),
}

/// Command-line overrides applied over whatever the config file sets.
#[derive(Debug, Default)]
pub struct ConfigOverrides {
	pub install_dir: Option<PathBuf>,
	pub manifest_path: Option<String>,
	pub debug: Option<bool>,
	pub worker_count: Option<u32>,
}

/// Load config from a file on disk, with CLI overrides applied after.
pub fn load_config_file(path: &std::path::Path, overrides: &ConfigOverrides) -> Result<Config, ConfigErr> {
	let conf = std::fs::read(path)?;
	load_config(&conf, overrides)
}

/// Parse a config buffer, with CLI overrides applied after.
pub fn load_config(conf: &[u8], overrides: &ConfigOverrides) -> Result<Config, ConfigErr> {
	let mut config = load(conf)?;

	if let Some(x) = &overrides.install_dir {
		config.install_dir = x.clone();
	}
	if let Some(x) = &overrides.manifest_path {
		config.manifest_path = x.clone();
	}
	if let Some(x) = overrides.debug {
		config.debug = x;
	}
	if let Some(x) = overrides.worker_count {
		config.worker_count = Some(x);
	}

	Ok(config)
}

/// Parse out a string of the config.
fn load(conf: &[u8]) -> Result<Config, ConfigErr> {
	let mut config = Config::default();

	for line in conf.split(|c| *c == b'\n') {
		// Discard any part past a comment.
		let line = match line.splitn(2, |c| *c == b'#').next() {
			Some(l) => l,
			None => continue,
		};

		// Split into [param, value]; lines not matching that aren't
		// useful config.
		let [par, val] = {
			let mut it = line.splitn(2, |c| *c == b' ');
			let par = it.next();
			let val = it.next();
			match (par, val) {
				(Some(p), Some(v)) => [p, v],
				(_, _) => continue,
			}
		};

		let stringify = |bytes: &[u8], ewhat: &str| -> Result<String, ConfigErr> {
			Ok(std::str::from_utf8(bytes)
				.map_err(|e| ConfigErr::Syntax(format!("error parsing {ewhat}: {e}")))?
				.trim()
				.to_string())
		};
		let numify = |bytes: &[u8], ewhat: &str| -> Result<u64, ConfigErr> {
			stringify(bytes, ewhat)?
				.parse()
				.map_err(|e| ConfigErr::Syntax(format!("error parsing {ewhat} as a number: {e}")))
		};
		let boolify = |bytes: &[u8]| -> Option<bool> {
			Some(match bytes.trim_ascii() {
				b"yes" => true,
				b"no" => false,
				_ => None?,
			})
		};

		match par {
			b"InstallDir" => config.install_dir = PathBuf::from(stringify(val, "InstallDir")?),
			b"ManifestPath" => config.manifest_path = stringify(val, "ManifestPath")?,
			b"ContentHost" => config.content_host = stringify(val, "ContentHost")?,
			b"MirrorsUrl" => config.mirrors_url = stringify(val, "MirrorsUrl")?,
			b"LoginUrl" => config.login_url = stringify(val, "LoginUrl")?,
			b"Debug" => {
				config.debug = boolify(val)
					.ok_or_else(|| ConfigErr::Syntax("Debug must be yes or no".into()))?;
			}
			b"WorkerCount" => {
				config.worker_count = Some(
					numify(val, "WorkerCount")?
						.try_into()
						.map_err(|_| ConfigErr::Syntax("WorkerCount out of range".into()))?,
				)
			}
			b"RequestTimeout" => {
				config.request_timeout = Duration::from_secs(numify(val, "RequestTimeout")?)
			}
			b"RetryCount" => {
				config.retry_count = numify(val, "RetryCount")?
					.try_into()
					.map_err(|_| ConfigErr::Syntax("RetryCount out of range".into()))?
			}
			b"RetryInterval" => {
				config.retry_interval = Duration::from_secs(numify(val, "RetryInterval")?)
			}
			_ => continue,
		}
	}

	Ok(config)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_are_sane() {
		let config = Config::default();
		assert_eq!(config.retry_count, 3);
		assert_eq!(config.retry_interval, Duration::from_secs(10));
		assert_eq!(config.request_timeout, Duration::from_secs(30));
	}

	#[test]
	fn parses_basic_fields() {
		let conf = b"InstallDir /opt/ttr\nDebug yes\nWorkerCount 8\n# a comment\nRetryCount 5\n";
		let config = load(conf).unwrap();
		assert_eq!(config.install_dir, PathBuf::from("/opt/ttr"));
		assert!(config.debug);
		assert_eq!(config.worker_count, Some(8));
		assert_eq!(config.retry_count, 5);
	}

	#[test]
	fn rejects_bad_bool() {
		let conf = b"Debug maybe\n";
		let err = load(conf).unwrap_err();
		assert!(matches!(err, ConfigErr::Syntax(_)));
	}

	#[test]
	fn overrides_apply_after_file() {
		let conf = b"InstallDir /opt/ttr\n";
		let overrides = ConfigOverrides {
			install_dir: Some(PathBuf::from("/custom")),
			..Default::default()
		};
		let config = load_config(conf, &overrides).unwrap();
		assert_eq!(config.install_dir, PathBuf::from("/custom"));
	}

	#[test]
	fn manifest_url_appends_txt_for_bare_patchmanifest() {
		let config = Config {
			content_host: "https://cdn.example/content/".into(),
			manifest_path: "patchmanifest".into(),
			..Default::default()
		};
		assert_eq!(
			config.manifest_url().unwrap().as_str(),
			"https://cdn.example/content/patchmanifest.txt"
		);
	}
}
