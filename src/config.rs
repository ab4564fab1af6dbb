use std::path::{Path, PathBuf};

use crate::{
	constants::*,
	error::{EnclaveError, Result},
};

/// Durable storage of one keypair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeysConfig {
	pub public_key_path: PathBuf,
	pub private_key_path: PathBuf,
	pub sealed_date_path: PathBuf,
	/// Associated data of the sealed artifacts, binds them to one key purpose.
	pub version: String,
}

impl KeysConfig {
	pub fn new(mount: &Path, public: &str, private: &str, sealed_date: &str, version: String) -> Self {
		KeysConfig {
			public_key_path: mount.join(public),
			private_key_path: mount.join(private),
			sealed_date_path: mount.join(sealed_date),
			version,
		}
	}

	pub fn validate(&self) -> Result<()> {
		if self.version.is_empty() {
			return Err(EnclaveError::Configuration("empty key version tag".to_string()))
		}

		let paths = [&self.public_key_path, &self.private_key_path, &self.sealed_date_path];
		for path in paths {
			if path.as_os_str().is_empty() || path.file_name().is_none() {
				return Err(EnclaveError::Configuration(format!(
					"invalid key location : {}",
					path.display()
				)))
			}
		}

		if self.public_key_path == self.private_key_path ||
			self.private_key_path == self.sealed_date_path ||
			self.public_key_path == self.sealed_date_path
		{
			return Err(EnclaveError::Configuration(
				"key location paths must be distinct".to_string(),
			))
		}

		Ok(())
	}
}

/// Exchange locations of the attested reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportsConfig {
	pub public_keys_path: PathBuf,
	pub signature_request_path: PathBuf,
	pub signature_export_path: PathBuf,
	pub signature_import_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
	pub signature_keys: KeysConfig,
	pub encryption_keys: KeysConfig,
	pub reports: ReportsConfig,
	pub response_path: PathBuf,
}

impl AppConfig {
	/// Lay out every artifact under `mount`.
	pub fn from_mount(mount: &Path) -> AppConfig {
		AppConfig {
			signature_keys: KeysConfig::new(
				mount,
				SIGNATURE_PUBLIC_KEY_FILE,
				SIGNATURE_PRIVATE_KEY_FILE,
				SIGNATURE_SEALED_DATE_FILE,
				format!("{APP_VERSION}/signature"),
			),
			encryption_keys: KeysConfig::new(
				mount,
				BOX_PUBLIC_KEY_FILE,
				BOX_PRIVATE_KEY_FILE,
				BOX_SEALED_DATE_FILE,
				format!("{APP_VERSION}/encryption"),
			),
			reports: ReportsConfig {
				public_keys_path: mount.join(PUBLIC_KEYS_REPORT_FILE),
				signature_request_path: mount.join(SIGNATURE_REQUEST_FILE),
				signature_export_path: mount.join(SIGNATURE_EXPORT_FILE),
				signature_import_path: mount.join(SIGNATURE_IMPORT_FILE),
			},
			response_path: mount.join(RESPONSE_FILE),
		}
	}
}
