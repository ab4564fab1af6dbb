use std::{fs, path::Path};

use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::{
	constants::SIGNATURE_PUBLIC_KEY_SIZE,
	error::{EnclaveError, Result},
	keys::{
		sealed::write_atomic,
		sign_keys::{verify_signature, SignatureManager},
	},
};

/// Oracle payload signed by the live enclave key. Every field is base64 encoded.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EnclaveResponse {
	pub signature: String,
	pub payload: String,
	pub hash: String,
}

impl EnclaveResponse {
	/// The signature covers the SHA-256 hash of `payload`.
	pub fn new(payload: &[u8], signer: &SignatureManager) -> Result<Self> {
		let hash = Sha256::digest(payload);
		let signature = signer.sign(&hash)?;

		Ok(EnclaveResponse {
			signature: STANDARD.encode(signature),
			payload: STANDARD.encode(payload),
			hash: STANDARD.encode(hash),
		})
	}

	pub fn save(&self, path: &Path) -> Result<()> {
		if let Some(parent) = path.parent() {
			if !parent.as_os_str().is_empty() && !parent.is_dir() {
				debug!("RESPONSE : create directory {}", parent.display());
				let mut builder = fs::DirBuilder::new();
				builder.recursive(true);
				#[cfg(unix)]
				{
					use std::os::unix::fs::DirBuilderExt;
					builder.mode(0o700);
				}
				builder.create(parent)?;
			}
		}

		let json = serde_json::to_vec_pretty(self)
			.map_err(|err| EnclaveError::Codec(format!("response serialization : {err}")))?;
		write_atomic(path, &json)
	}

	pub fn load(path: &Path) -> Result<Self> {
		serde_json::from_slice(&fs::read(path)?)
			.map_err(|err| EnclaveError::Codec(format!("response deserialization : {err}")))
	}

	/// Checks the hash matches the payload and is signed by `public_key`.
	pub fn verify(&self, public_key: &[u8; SIGNATURE_PUBLIC_KEY_SIZE]) -> bool {
		let (payload, hash, signature) = match (
			STANDARD.decode(&self.payload),
			STANDARD.decode(&self.hash),
			STANDARD.decode(&self.signature),
		) {
			(Ok(payload), Ok(hash), Ok(signature)) => (payload, hash, signature),
			_ => {
				warn!("RESPONSE : invalid base64 field");
				return false
			},
		};

		if Sha256::digest(&payload).as_slice() != hash.as_slice() {
			warn!("RESPONSE : hash does not match payload");
			return false
		}

		match VerifyingKey::from_bytes(public_key) {
			Ok(key) => verify_signature(&key, &hash, &signature),
			Err(_) => false,
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::{
		attestation::simulated::test::platform, config::KeysConfig, keys::sealed::SealedKeyStore,
	};
	use std::sync::Arc;

	fn signer(dir: &Path) -> SignatureManager {
		let config = KeysConfig::new(
			dir,
			"signature_key.pub",
			"signature_key.priv.enc",
			"signature_created.enc",
			"test".to_string(),
		);
		let store = SealedKeyStore::new(Arc::new(platform(b"mr1", [1u8; 32])));
		SignatureManager::load(&store, &config).unwrap()
	}

	#[test]
	fn signed_response() {
		let dir = tempfile::tempdir().unwrap();
		let signer = signer(dir.path());

		let response = EnclaveResponse::new(b"price:42", &signer).unwrap();
		assert_eq!(STANDARD.decode(&response.payload).unwrap(), b"price:42");
		assert!(response.verify(&signer.public_key()));

		let mut altered = response.clone();
		altered.payload = STANDARD.encode(b"price:43");
		assert!(!altered.verify(&signer.public_key()));

		let mut altered = response.clone();
		altered.hash = STANDARD.encode(Sha256::digest(b"price:43"));
		altered.payload = STANDARD.encode(b"price:43");
		assert!(!altered.verify(&signer.public_key()));

		let other = SignatureManager::generate().unwrap();
		let other_public: [u8; 32] = other.public_key.as_slice().try_into().unwrap();
		assert!(!response.verify(&other_public));
	}

	#[test]
	fn saved_response() {
		let dir = tempfile::tempdir().unwrap();
		let signer = signer(dir.path());
		let path = dir.path().join("out").join("response.json");

		let response = EnclaveResponse::new(b"payload", &signer).unwrap();
		response.save(&path).unwrap();

		let json: serde_json::Value =
			serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
		assert_eq!(json["payload"], STANDARD.encode(b"payload"));
		assert_eq!(EnclaveResponse::load(&path).unwrap(), response);

		#[cfg(unix)]
		{
			use std::os::unix::fs::PermissionsExt;
			let mode = fs::metadata(path.parent().unwrap()).unwrap().permissions().mode();
			assert_eq!(mode & 0o777, 0o700);
		}
	}
}
