//! Transfer of the live signing key between two instances of the same enclave.
//!
//! 1. The new instance (TARGET) publishes its public keys in an attested request.
//! 2. The instance holding the key (SOURCE) checks the request comes from the same enclave
//!    build, boxes its signing key to TARGET's encryption key and signs the box.
//! 3. TARGET checks the package comes from the same enclave build, opens the box and only
//!    adopts the key if it produced the package signature.
//!
//! Moving the request and the package between instances is left to the operator.

use std::{fs, path::Path, sync::Arc};

use tracing::{debug, error, info};

use super::reports::{PrivateKeysReport, PublicKeysReport};
use crate::{
	attestation::{AttestationService, EnclavePlatform},
	config::AppConfig,
	constants::SIGNATURE_SIZE,
	error::{EnclaveError, Result},
	keys::{
		box_keys::EncryptionManager,
		sealed::{write_atomic, SealedKeyStore},
		sign_keys::{signing_key_from_bytes, verify_signature, SignatureManager},
	},
};

pub struct KeyMigration {
	attestation: AttestationService,
	store: SealedKeyStore,
	config: AppConfig,
}

impl KeyMigration {
	pub fn new(platform: Arc<dyn EnclavePlatform>, config: AppConfig) -> Self {
		KeyMigration {
			attestation: AttestationService::new(platform.clone()),
			store: SealedKeyStore::new(platform),
			config,
		}
	}

	pub fn config(&self) -> &AppConfig {
		&self.config
	}

	pub fn signature_manager(&self) -> Result<SignatureManager> {
		SignatureManager::load(&self.store, &self.config.signature_keys)
	}

	pub fn encryption_manager(&self) -> Result<EncryptionManager> {
		EncryptionManager::load(&self.store, &self.config.encryption_keys)
	}

	/// Attest this instance's public keys and publish them for third parties.
	pub fn publish_identity(&self) -> Result<PublicKeysReport> {
		info!("KEY REPORT : publish identity");
		self.attest_public_keys(&self.config.reports.public_keys_path)
	}

	/// TARGET side : attest this instance's public keys as a migration request.
	pub fn request_migration(&self) -> Result<PublicKeysReport> {
		info!("KEY REQUEST : create signature key request");
		self.attest_public_keys(&self.config.reports.signature_request_path)
	}

	fn attest_public_keys(&self, path: &Path) -> Result<PublicKeysReport> {
		let report = PublicKeysReport {
			public_signature: self.signature_manager()?.public_key(),
			public_encryption_key: self.encryption_manager()?.public_key(),
		};

		let bytes = report.encode(&self.attestation)?;
		write_atomic(path, &bytes)?;

		debug!(
			"KEY REPORT : {} bytes written to {}, signature key fingerprint {}",
			bytes.len(),
			path.display(),
			sha256::digest(report.public_signature.as_slice())
		);
		Ok(report)
	}

	/// SOURCE side : box the live signing key for the instance that wrote the request.
	/// The local key is only read.
	pub fn export_signature_key(&self) -> Result<()> {
		let request_path = &self.config.reports.signature_request_path;
		info!("KEY EXPORT : read request {}", request_path.display());
		let request = fs::read(request_path)?;

		debug!("KEY EXPORT : verify request report");
		let target = PublicKeysReport::decode(&request, &self.attestation)?;
		info!(
			"KEY EXPORT : request accepted from signature key {}",
			sha256::digest(target.public_signature.as_slice())
		);

		let signature = self.signature_manager()?;
		let encryption = self.encryption_manager()?;

		debug!("KEY EXPORT : encrypt signature key");
		let encrypted_signature_key =
			encryption.encrypt(signature.private_key().as_slice(), &target.public_encryption_key)?;

		debug!("KEY EXPORT : sign encrypted key");
		let package_signature = signature.sign(&encrypted_signature_key)?;

		debug!("KEY EXPORT : attest package signature");
		let attestation_report = self.attestation.get_report(&package_signature)?;

		let package = PrivateKeysReport::new(
			attestation_report,
			encryption.public_key(),
			encrypted_signature_key,
		);

		let export_path = &self.config.reports.signature_export_path;
		write_atomic(export_path, &package.to_bytes())?;
		info!("KEY EXPORT : package written to {}", export_path.display());

		Ok(())
	}

	/// TARGET side : adopt the signing key carried by a package from a trusted SOURCE.
	/// Local storage is only replaced once every check passed.
	pub fn import_signature_key(&self) -> Result<()> {
		let import_path = &self.config.reports.signature_import_path;
		info!("KEY IMPORT : read package {}", import_path.display());
		let package = PrivateKeysReport::from_bytes(&fs::read(import_path)?)?;

		debug!("KEY IMPORT : verify package report");
		let user_data = self.attestation.verify_and_extract(&package.attestation_report)?;
		let package_signature = user_data
			.get(..SIGNATURE_SIZE)
			.ok_or_else(|| EnclaveError::size("package signature", SIGNATURE_SIZE, user_data.len()))?;

		debug!("KEY IMPORT : decrypt signature key");
		let candidate = self
			.encryption_manager()?
			.decrypt(&package.encrypted_signature_key, &package.public_encryption_key)?;

		let candidate_key = signing_key_from_bytes(&candidate)?;
		if !verify_signature(
			&candidate_key.verifying_key(),
			&package.encrypted_signature_key,
			package_signature,
		) {
			error!("KEY IMPORT : package is not signed by the transferred key");
			return Err(EnclaveError::Consistency(
				"package signature does not match the transferred key".to_string(),
			))
		}

		let mut signature = self.signature_manager()?;
		signature.persist(&candidate)?;
		info!(
			"KEY IMPORT : signature key replaced, fingerprint {}",
			sha256::digest(signature.public_key().as_slice())
		);

		Ok(())
	}
}

/* -----------------------------
			TESTS
--------------------------------*/
