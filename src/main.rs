//! CLI entry point: wires config loading into either a full interactive
//! session (login, patch, launch) or a headless patch-only run.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use ttr_patcher::config::{self, Config, ConfigOverrides};
use ttr_patcher::driver::UpdateDriver;
use ttr_patcher::progress::IndicatifSink;

/// A content-addressed patcher for a Toontown Rewritten-style game install.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
	/// Config file to load before applying the flags below.
	#[arg(short, long)]
	config: Option<PathBuf>,

	/// Where the game is (or will be) installed.
	#[arg(short, long)]
	install_dir: Option<PathBuf>,

	/// Suffix appended to the content host to form the manifest URL.
	#[arg(long)]
	manifest_path: Option<String>,

	/// Enable per-file planning decision logging.
	#[arg(short, long)]
	debug: bool,

	/// Worker thread count (default: logical CPU count, capped at 6).
	#[arg(short = 'j', long)]
	jobs: Option<u32>,

	/// Only run the patcher; skip login and launching the game.
	#[arg(long)]
	patch_only: bool,

	/// Where saved logins are persisted (default: a platform-conventional
	/// config directory).
	#[arg(long)]
	credentials_file: Option<PathBuf>,
}

fn main() -> ExitCode {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

	let args = Args::parse();

	let install_dir = args
		.install_dir
		.clone()
		.or_else(ttr_patcher::driver::default_install_dir);

	let overrides = ConfigOverrides {
		install_dir,
		manifest_path: args.manifest_path.clone(),
		debug: Some(args.debug),
		worker_count: args.jobs,
	};

	let result = match &args.config {
		Some(path) => config::load_config_file(path, &overrides),
		None => config::load_config(b"", &overrides),
	};

	let config = match result {
		Ok(c) => c,
		Err(e) => {
			eprintln!("config error: {e}");
			return ExitCode::FAILURE;
		}
	};

	ttr_patcher::pool::init_workers(config.worker_count);

	if args.patch_only {
		return run_patch_only(config);
	}

	let credentials_path = args
		.credentials_file
		.clone()
		.or_else(ttr_patcher::menu::default_credentials_path)
		.unwrap_or_else(|| config.install_dir.join("logins.json"));

	let ui = Arc::new(IndicatifSink::new());
	match ttr_patcher::menu::run_interactive(config, ui, credentials_path) {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			eprintln!("{e}");
			ExitCode::FAILURE
		}
	}
}

fn run_patch_only(config: Config) -> ExitCode {
	let ui = Arc::new(IndicatifSink::new());
	let driver = UpdateDriver::new(config, ui);

	use ttr_patcher::driver::Outcome;
	match driver.run() {
		Outcome::Ok => ExitCode::SUCCESS,
		Outcome::Declined => {
			println!("Install directory not created; nothing to do.");
			ExitCode::SUCCESS
		}
		Outcome::Failed(e) => {
			eprintln!("update failed: {e}");
			ExitCode::FAILURE
		}
	}
}
