//! CredentialStore: JSON-persisted saved logins, optionally encrypted with
//! a master password (Argon2id-derived key, AES-256-GCM sealing), and
//! optionally backed by the OS keyring so the master password itself
//! doesn't need retyping every run.

use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, KeyInit, OsRng as AeadOsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::password_hash::SaltString;
use argon2::Argon2;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// Current Argon2 cost parameters. Bumping these triggers the migration
/// path in `CredentialStore::unlock`.
const ARGON2_M_COST: u32 = 19 * 1024;
const ARGON2_T_COST: u32 = 2;
const ARGON2_P_COST: u32 = 1;

/// One saved account, as persisted in `logins.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedLogin {
	pub username: String,
	pub install_dir: PathBuf,
	/// `None` when the user opted not to save a password at all.
	pub encrypted_password: Option<Vec<u8>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct HashingParams {
	m_cost: u32,
	t_cost: u32,
	p_cost: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
	#[serde(default)]
	accounts: Vec<SavedLogin>,
	#[serde(default)]
	use_password_encryption: bool,
	#[serde(default)]
	salt: Option<String>,
	#[serde(default)]
	hashing_params: Option<HashingParams>,
	/// An encrypted known-plaintext, used the same way the source's
	/// `password-verification` field checks the master password without
	/// ever decrypting a real account.
	#[serde(default)]
	verification: Option<Vec<u8>>,
}

impl Default for StoreFile {
	fn default() -> Self {
		Self {
			accounts: Vec::new(),
			use_password_encryption: false,
			salt: None,
			hashing_params: None,
			verification: None,
		}
	}
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialErr {
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
	#[error("malformed logins file: {0}")]
	Decode(#[from] serde_json::Error),
	#[error("master password incorrect")]
	BadPassword,
	#[error("store is encrypted but no master password was supplied")]
	Locked,
	#[error("encryption backend error: {0}")]
	Crypto(String),
}

pub struct CredentialStore {
	path: PathBuf,
	file: StoreFile,
	/// Derived key, held only while unlocked. Zeroized on drop.
	key: Option<Key>,
}

struct Key([u8; 32]);

impl Drop for Key {
	fn drop(&mut self) {
		self.0.zeroize();
	}
}

impl CredentialStore {
	/// Load `path`, creating an empty store file if it doesn't exist yet.
	pub fn load(path: &Path) -> Result<Self, CredentialErr> {
		let file = match std::fs::read(path) {
			Ok(bytes) => serde_json::from_slice(&bytes)?,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreFile::default(),
			Err(e) => return Err(e.into()),
		};
		Ok(Self {
			path: path.to_path_buf(),
			file,
			key: None,
		})
	}

	fn persist(&self) -> Result<(), CredentialErr> {
		let data = serde_json::to_vec_pretty(&self.file)?;
		std::fs::write(&self.path, data)?;
		Ok(())
	}

	pub fn is_encrypted(&self) -> bool {
		self.file.use_password_encryption
	}

	/// Derive the key from `master_password`, verifying it against the
	/// stored `verification` blob. Runs the one-shot migration (re-derive
	/// with current Argon2 params, re-encrypt everything) if the stored
	/// hashing params are stale.
	pub fn unlock(&mut self, master_password: &str) -> Result<(), CredentialErr> {
		if !self.file.use_password_encryption {
			return Ok(());
		}
		let salt_b64 = self.file.salt.as_deref().ok_or(CredentialErr::Locked)?;
		let salt = SaltString::from_b64(salt_b64).map_err(|e| CredentialErr::Crypto(e.to_string()))?;

		let stored_params = self.file.hashing_params.as_ref();
		let key = derive_key(
			master_password,
			salt.as_str().as_bytes(),
			stored_params.map(|p| (p.m_cost, p.t_cost, p.p_cost)).unwrap_or((ARGON2_M_COST, ARGON2_T_COST, ARGON2_P_COST)),
		)?;

		let verification = self.file.verification.as_ref().ok_or(CredentialErr::Locked)?;
		decrypt_with(&key, verification).map_err(|_| CredentialErr::BadPassword)?;

		let needs_migration = stored_params
			.map(|p| (p.m_cost, p.t_cost, p.p_cost) != (ARGON2_M_COST, ARGON2_T_COST, ARGON2_P_COST))
			.unwrap_or(true);

		self.key = Some(Key(key));

		if needs_migration {
			self.reencrypt_all(master_password)?;
		}

		Ok(())
	}

	/// Re-derive a fresh salt+key from `master_password` at the current
	/// Argon2 params and re-encrypt every saved password plus the
	/// verification blob.
	fn reencrypt_all(&mut self, master_password: &str) -> Result<(), CredentialErr> {
		let mut salt_bytes = [0u8; 16];
		rand::rngs::OsRng.fill_bytes(&mut salt_bytes);
		let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| CredentialErr::Crypto(e.to_string()))?;

		let key = derive_key(master_password, salt.as_str().as_bytes(), (ARGON2_M_COST, ARGON2_T_COST, ARGON2_P_COST))?;

		for acc in &mut self.file.accounts {
			if let Some(enc) = &acc.encrypted_password {
				// `self.key` is `None` on the very first `enable_encryption`
				// call -- in that case the stored bytes are still plaintext,
				// not a sealed blob from a prior key. Only the stale-params
				// migration path (called from `unlock`, which sets
				// `self.key` before reaching here) decrypts first.
				let plain = match &self.key {
					Some(k) => decrypt_with(&k.0, enc).map_err(|_| CredentialErr::BadPassword)?,
					None => enc.clone(),
				};
				acc.encrypted_password = Some(encrypt_with(&key, &plain).map_err(|e| CredentialErr::Crypto(e.to_string()))?);
			}
		}

		self.file.verification = Some(
			encrypt_with(&key, salt.as_str().as_bytes()).map_err(|e| CredentialErr::Crypto(e.to_string()))?,
		);
		self.file.salt = Some(salt.as_str().to_string());
		self.file.hashing_params = Some(HashingParams {
			m_cost: ARGON2_M_COST,
			t_cost: ARGON2_T_COST,
			p_cost: ARGON2_P_COST,
		});
		self.key = Some(Key(key));
		self.persist()
	}

	/// Turn on master-password encryption, encrypting any currently
	/// plaintext-saved passwords.
	pub fn enable_encryption(&mut self, master_password: &str) -> Result<(), CredentialErr> {
		self.file.use_password_encryption = true;
		self.reencrypt_all(master_password)
	}

	/// Turn off master-password encryption, decrypting any
	/// currently-encrypted passwords back to plaintext.
	pub fn disable_encryption(&mut self) -> Result<(), CredentialErr> {
		let key = self.key.as_ref().ok_or(CredentialErr::Locked)?;
		for acc in &mut self.file.accounts {
			if let Some(enc) = &acc.encrypted_password {
				let plain = decrypt_with(&key.0, enc).map_err(|_| CredentialErr::BadPassword)?;
				acc.encrypted_password = Some(plain);
			}
		}
		self.file.use_password_encryption = false;
		self.file.salt = None;
		self.file.hashing_params = None;
		self.file.verification = None;
		self.key = None;
		self.persist()
	}

	pub fn accounts(&self) -> &[SavedLogin] {
		&self.file.accounts
	}

	/// Save or update one account's password (plaintext if encryption is
	/// off, sealed with the unlocked key otherwise).
	pub fn save_account(&mut self, username: &str, install_dir: PathBuf, password: Option<&str>) -> Result<(), CredentialErr> {
		let encrypted_password = match (password, &self.key) {
			(None, _) => None,
			(Some(p), Some(key)) => Some(encrypt_with(&key.0, p.as_bytes()).map_err(|e| CredentialErr::Crypto(e.to_string()))?),
			(Some(p), None) if !self.file.use_password_encryption => Some(p.as_bytes().to_vec()),
			(Some(_), None) => return Err(CredentialErr::Locked),
		};

		if let Some(existing) = self.file.accounts.iter_mut().find(|a| a.username == username) {
			existing.install_dir = install_dir;
			existing.encrypted_password = encrypted_password;
		} else {
			self.file.accounts.push(SavedLogin {
				username: username.to_string(),
				install_dir,
				encrypted_password,
			});
		}
		self.persist()
	}

	/// Recover a saved account's plaintext password, decrypting if needed.
	pub fn reveal_password(&self, username: &str) -> Result<Option<String>, CredentialErr> {
		let Some(acc) = self.file.accounts.iter().find(|a| a.username == username) else {
			return Ok(None);
		};
		let Some(enc) = &acc.encrypted_password else {
			return Ok(None);
		};
		let bytes = if self.file.use_password_encryption {
			let key = self.key.as_ref().ok_or(CredentialErr::Locked)?;
			decrypt_with(&key.0, enc).map_err(|_| CredentialErr::BadPassword)?
		} else {
			enc.clone()
		};
		Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
	}
}

fn derive_key(password: &str, salt: &[u8], (m_cost, t_cost, p_cost): (u32, u32, u32)) -> Result<[u8; 32], CredentialErr> {
	let params = argon2::Params::new(m_cost, t_cost, p_cost, Some(32)).map_err(|e| CredentialErr::Crypto(e.to_string()))?;
	let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);
	let mut out = [0u8; 32];
	argon2
		.hash_password_into(password.as_bytes(), salt, &mut out)
		.map_err(|e| CredentialErr::Crypto(e.to_string()))?;
	Ok(out)
}

fn encrypt_with(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, aes_gcm::Error> {
	let cipher = Aes256Gcm::new_from_slice(key).expect("key is exactly 32 bytes");
	let mut nonce_bytes = [0u8; 12];
	AeadOsRng.fill_bytes(&mut nonce_bytes);
	let nonce = Nonce::from_slice(&nonce_bytes);
	let mut out = cipher.encrypt(nonce, plaintext)?;
	let mut sealed = nonce_bytes.to_vec();
	sealed.append(&mut out);
	Ok(sealed)
}

fn decrypt_with(key: &[u8; 32], sealed: &[u8]) -> Result<Vec<u8>, aes_gcm::Error> {
	if sealed.len() < 12 {
		return Err(aes_gcm::Error);
	}
	let (nonce_bytes, ciphertext) = sealed.split_at(12);
	let cipher = Aes256Gcm::new_from_slice(key).expect("key is exactly 32 bytes");
	cipher.decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
}

const KEYRING_SERVICE: &str = "ttr-patcher";

fn keyring_entry(username: &str) -> Result<keyring::Entry, CredentialErr> {
	keyring::Entry::new(KEYRING_SERVICE, username).map_err(|e| CredentialErr::Crypto(e.to_string()))
}

/// Recall a previously-saved master password from the OS keyring, if any.
pub fn master_password_from_keyring(username: &str) -> Option<String> {
	keyring_entry(username).ok()?.get_password().ok()
}

/// Save `master_password` in the OS keyring under `username`, so a future
/// `unlock` doesn't need an interactive prompt.
pub fn save_master_password_to_keyring(username: &str, master_password: &str) -> Result<(), CredentialErr> {
	keyring_entry(username)?
		.set_password(master_password)
		.map_err(|e| CredentialErr::Crypto(e.to_string()))
}

/// Remove a previously-saved master password from the OS keyring.
pub fn forget_master_password_in_keyring(username: &str) -> Result<(), CredentialErr> {
	keyring_entry(username)?
		.delete_credential()
		.map_err(|e| CredentialErr::Crypto(e.to_string()))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn roundtrips_plaintext_when_unencrypted() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("logins.json");
		let mut store = CredentialStore::load(&path).unwrap();
		store
			.save_account("rocketbuddy", PathBuf::from("/opt/ttr"), Some("hunter2"))
			.unwrap();

		let reloaded = CredentialStore::load(&path).unwrap();
		assert_eq!(reloaded.reveal_password("rocketbuddy").unwrap().as_deref(), Some("hunter2"));
	}

	#[test]
	fn encryption_roundtrips_and_rejects_wrong_password() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("logins.json");
		let mut store = CredentialStore::load(&path).unwrap();
		store
			.save_account("rocketbuddy", PathBuf::from("/opt/ttr"), Some("hunter2"))
			.unwrap();
		store.enable_encryption("correct horse").unwrap();

		let mut reloaded = CredentialStore::load(&path).unwrap();
		assert!(reloaded.unlock("wrong horse").is_err());
		reloaded.unlock("correct horse").unwrap();
		assert_eq!(reloaded.reveal_password("rocketbuddy").unwrap().as_deref(), Some("hunter2"));
	}

	#[test]
	fn disable_encryption_recovers_plaintext() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("logins.json");
		let mut store = CredentialStore::load(&path).unwrap();
		store
			.save_account("rocketbuddy", PathBuf::from("/opt/ttr"), Some("hunter2"))
			.unwrap();
		store.enable_encryption("correct horse").unwrap();
		store.disable_encryption().unwrap();
		assert!(!store.is_encrypted());
		assert_eq!(store.reveal_password("rocketbuddy").unwrap().as_deref(), Some("hunter2"));
	}
}
