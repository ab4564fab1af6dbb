use std::{
	ffi::OsString,
	fs,
	io::{self, Write},
	path::{Path, PathBuf},
	sync::Arc,
};

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use crate::{
	attestation::EnclavePlatform,
	config::KeysConfig,
	error::{EnclaveError, Result},
};

/// Private key material, wiped on drop.
pub type KeyMaterial = Zeroizing<Vec<u8>>;

/// Output of a key generator: the public half is stored in the clear, the private
/// material is sealed.
pub struct GeneratedKey {
	pub public_key: Vec<u8>,
	pub private_key: KeyMaterial,
}

/// Get-or-create persistence of key material sealed to the enclave identity.
#[derive(Clone)]
pub struct SealedKeyStore {
	platform: Arc<dyn EnclavePlatform>,
}

impl SealedKeyStore {
	pub fn new(platform: Arc<dyn EnclavePlatform>) -> Self {
		SealedKeyStore { platform }
	}

	/// Load the private key material at `config`, generating and storing a new key with
	/// `generator` when no private key exists yet.
	pub fn get_or_create<F>(&self, config: &KeysConfig, generator: F) -> Result<KeyMaterial>
	where
		F: FnOnce() -> Result<GeneratedKey>,
	{
		config.validate()?;

		match fs::metadata(&config.private_key_path) {
			Ok(_) => debug!("SEALED KEYS : found {}", config.private_key_path.display()),
			Err(err) if err.kind() == io::ErrorKind::NotFound => {
				info!("SEALED KEYS : no key at {}, generating", config.private_key_path.display());
				let key = generator()?;
				self.save(config, &key.public_key, &key.private_key)?;
			},
			Err(err) => return Err(err.into()),
		}

		self.load(config)
	}

	/// Overwrite the stored keypair. Every artifact is staged next to its final path and
	/// renamed into place, the private key last. A failed rename restores the artifacts
	/// already replaced.
	pub fn save(&self, config: &KeysConfig, public_key: &[u8], private_key: &[u8]) -> Result<()> {
		config.validate()?;
		ensure_parent(&config.private_key_path)?;

		let aad = config.version.as_bytes();
		let created = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

		let staged = [
			(&config.sealed_date_path, self.platform.seal(created.as_bytes(), aad)?),
			(&config.public_key_path, STANDARD.encode(public_key).into_bytes()),
			(&config.private_key_path, self.platform.seal(private_key, aad)?),
		];

		let mut previous = Vec::with_capacity(staged.len());
		for (path, _) in staged.iter() {
			match fs::read(path) {
				Ok(data) => previous.push(Some(data)),
				Err(err) if err.kind() == io::ErrorKind::NotFound => previous.push(None),
				Err(err) => {
					error!("SEALED KEYS : can not read current {} : {}", path.display(), err);
					return Err(err.into())
				},
			}
		}

		let mut temporary = Vec::with_capacity(staged.len());
		for (path, data) in staged.iter() {
			let tmp = temp_path(path);
			if let Err(err) = write_private_file(&tmp, data) {
				error!("SEALED KEYS : failed to stage {} : {}", path.display(), err);
				temporary.push(tmp);
				discard(&temporary);
				return Err(err.into())
			}
			temporary.push(tmp);
		}

		for (index, ((path, _), tmp)) in staged.iter().zip(temporary.iter()).enumerate() {
			if let Err(err) = fs::rename(tmp, path) {
				error!("SEALED KEYS : failed to replace {} : {}", path.display(), err);
				discard(&temporary[index..]);
				for ((path, _), data) in staged[..index].iter().zip(previous.iter()) {
					restore(path, data.as_deref());
				}
				return Err(err.into())
			}
		}

		debug!("SEALED KEYS : stored key created at {}", created);
		Ok(())
	}

	fn load(&self, config: &KeysConfig) -> Result<KeyMaterial> {
		let aad = config.version.as_bytes();

		let date = match fs::read(&config.sealed_date_path) {
			Ok(sealed) => self.platform.unseal(&sealed, aad)?,
			Err(err) if err.kind() == io::ErrorKind::NotFound => {
				return Err(EnclaveError::Freshness("missing creation info".to_string()))
			},
			Err(err) => return Err(err.into()),
		};

		let date = String::from_utf8(date)
			.map_err(|_| EnclaveError::Freshness("creation date is not text".to_string()))?;
		let created = DateTime::parse_from_rfc3339(&date).map_err(|err| {
			EnclaveError::Freshness(format!("failed to parse creation date '{date}' : {err}"))
		})?;

		if created.with_timezone(&Utc) > Utc::now() {
			warn!("SEALED KEYS : creation date {} is in the future", date);
			return Err(EnclaveError::Freshness(format!("created in the future : {date}")))
		}

		let sealed = fs::read(&config.private_key_path)?;
		Ok(Zeroizing::new(self.platform.unseal(&sealed, aad)?))
	}
}

/* ------------------------------
		FILE HELPERS
------------------------------ */

fn ensure_parent(path: &Path) -> Result<()> {
	match path.parent() {
		Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
			Err(EnclaveError::Configuration(format!(
				"directory {} does not exist",
				parent.display()
			)))
		},
		_ => Ok(()),
	}
}

fn temp_path(path: &Path) -> PathBuf {
	let mut name = OsString::from(".");
	name.push(path.file_name().unwrap_or_default());
	name.push(".tmp");
	path.with_file_name(name)
}

fn discard(paths: &[PathBuf]) {
	for path in paths {
		let _ = fs::remove_file(path);
	}
}

fn write_private_file(path: &Path, data: &[u8]) -> io::Result<()> {
	let mut options = fs::OpenOptions::new();
	options.write(true).create(true).truncate(true);
	#[cfg(unix)]
	{
		use std::os::unix::fs::OpenOptionsExt;
		options.mode(0o600);
	}

	let mut file = options.open(path)?;
	file.write_all(data)?;
	file.sync_all()
}

fn replace_file(path: &Path, data: &[u8]) -> io::Result<()> {
	let tmp = temp_path(path);
	if let Err(err) = write_private_file(&tmp, data).and_then(|_| fs::rename(&tmp, path)) {
		discard(&[tmp]);
		return Err(err)
	}
	Ok(())
}

// Put back an artifact as it was before a failed save, `None` when it did not exist.
fn restore(path: &Path, previous: Option<&[u8]>) {
	let restored = match previous {
		Some(data) => replace_file(path, data),
		None => fs::remove_file(path),
	};

	match restored {
		Ok(()) => warn!("SEALED KEYS : restored {}", path.display()),
		Err(err) => error!("SEALED KEYS : failed to restore {} : {}", path.display(), err),
	}
}

/// Replace `path` with `data` without ever exposing a partially written file.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
	ensure_parent(path)?;
	replace_file(path, data)?;
	Ok(())
}

/* -----------------------------
			TESTS
--------------------------------*/
