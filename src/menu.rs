//! Menu: the blocking stdin/stdout loop that ties login, saved
//! credentials, and `UpdateDriver::run` together before spawning the game.
//!
//! Trivial I/O glue, but it's the only thing in this crate that actually
//! drives a session end to end: prompt for an account, authenticate it
//! (recalling a saved password or master password where possible), run the
//! patcher, and launch the game on success.

use std::io::Write as _;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

use crate::config::Config;
use crate::credentials::{self, CredentialStore};
use crate::driver::{Outcome, UpdateDriver};
use crate::http::HttpFetcher;
use crate::login::{LoginClient, LoginResult};
use crate::platform::Platform;
use crate::progress::UiSink;

/// Read a line from stdin, re-prompting until it parses as an integer in
/// `[lower, upper]`.
pub fn confirm(prompt: &str, lower: i64, upper: i64) -> i64 {
	loop {
		print!("{prompt}");
		std::io::stdout().flush().ok();
		let mut line = String::new();
		if std::io::stdin().read_line(&mut line).is_err() {
			println!("Invalid choice. Try again.");
			continue;
		}
		match line.trim().parse::<i64>() {
			Ok(n) if n >= lower && n <= upper => return n,
			_ => println!("Invalid choice. Try again."),
		}
	}
}

/// Prompt for a line of free text, trimmed.
pub fn prompt_line(prompt: &str) -> String {
	print!("{prompt}");
	std::io::stdout().flush().ok();
	let mut line = String::new();
	std::io::stdin().read_line(&mut line).ok();
	line.trim().to_string()
}

/// Spawn the game's executable for `platform` under `install_dir` and
/// detach -- the patcher's job ends once the process is launched.
pub fn launch_game(install_dir: &std::path::Path, platform: Platform) -> std::io::Result<()> {
	let exe_name = match platform {
		Platform::Win32 | Platform::Win64 => "TTREngine.exe",
		_ => "TTREngine",
	};
	let exe_path = install_dir.join(exe_name);
	Command::new(exe_path).current_dir(install_dir).spawn()?;
	Ok(())
}

/// Default location for the saved-login store, resolved per-OS the same way
/// `driver::default_install_dir` resolves the game's own default location.
pub fn default_credentials_path() -> Option<PathBuf> {
	if cfg!(target_os = "windows") {
		std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("Toontown Rewritten").join("logins.json"))
	} else if cfg!(target_os = "macos") {
		std::env::var_os("HOME").map(|h| PathBuf::from(h).join("Library/Application Support/Toontown Rewritten/logins.json"))
	} else {
		std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".toontown-rewritten/logins.json"))
	}
}

/// Run one full interactive session: log in (recalling a saved password or
/// a keyring-backed master password where possible), run the patcher, and
/// launch the game on success.
pub fn run_interactive(config: Config, ui: Arc<dyn UiSink>, credentials_path: PathBuf) -> anyhow::Result<()> {
	let platform = Platform::detect()?;
	let http = HttpFetcher::new(config.request_timeout, config.retry_count, config.retry_interval);
	let login_url = url::Url::parse(&config.login_url)?;
	let login_client = LoginClient::new(&http, login_url);

	let mut store = CredentialStore::load(&credentials_path)?;

	let username = prompt_line("Toontown Rewritten username: ");
	let already_saved = store.accounts().iter().any(|a| a.username == username);

	if store.is_encrypted() {
		let master_password = match credentials::master_password_from_keyring(&username) {
			Some(p) => p,
			None => rpassword::prompt_password("Master password: ")?,
		};
		store.unlock(&master_password)?;
		if credentials::master_password_from_keyring(&username).is_none()
			&& confirm("Remember this master password in your OS keyring? [1 = yes, 0 = no] ", 0, 1) == 1
		{
			credentials::save_master_password_to_keyring(&username, &master_password)?;
		}
	}

	let password = match store.reveal_password(&username)? {
		Some(p) => p,
		None => rpassword::prompt_password(format!("Password for {username}: "))?,
	};

	let mut result = login_client.login(&username, &password)?;
	loop {
		match result {
			LoginResult::Ok { .. } => break,
			LoginResult::Failed { banner } => anyhow::bail!("login failed: {banner}"),
			LoginResult::NeedsToonTask { banner, response_token } => {
				println!("{banner}");
				let token = prompt_line("Enter the code you received: ");
				result = login_client.submit_token(&response_token, &token)?;
			}
		}
	}

	if !already_saved && confirm("Save this login for next time? [1 = yes, 0 = no] ", 0, 1) == 1 {
		store.save_account(&username, config.install_dir.clone(), Some(&password))?;
	}

	let driver = UpdateDriver::new(config.clone(), ui);
	match driver.run() {
		Outcome::Ok => {
			launch_game(&config.install_dir, platform)?;
			Ok(())
		}
		Outcome::Declined => {
			println!("Install directory not created; nothing to do.");
			Ok(())
		}
		Outcome::Failed(e) => Err(anyhow::Error::from(e)),
	}
}
