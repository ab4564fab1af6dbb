use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey, SECRET_KEY_LENGTH};
use rand::{rngs::OsRng, RngCore};
use tracing::{debug, info};
use zeroize::Zeroizing;

use super::sealed::{GeneratedKey, SealedKeyStore};
use crate::{
	config::KeysConfig,
	constants::{SIGNATURE_PRIVATE_KEY_SIZE, SIGNATURE_PUBLIC_KEY_SIZE, SIGNATURE_SIZE},
	error::{EnclaveError, Result},
};

/// Ed25519 identity of the enclave, sealed at its `KeysConfig`.
pub struct SignatureManager {
	store: SealedKeyStore,
	config: KeysConfig,
	signing_key: SigningKey,
}

impl SignatureManager {
	/// Load the signing key at `config`, creating it on first use.
	pub fn load(store: &SealedKeyStore, config: &KeysConfig) -> Result<Self> {
		let key_data = store.get_or_create(config, SignatureManager::generate)?;
		let signing_key = signing_key_from_bytes(&key_data)?;
		debug!(
			"SIGNATURE KEY : loaded, fingerprint {}",
			sha256::digest(signing_key.verifying_key().as_bytes().as_slice())
		);

		Ok(SignatureManager { store: store.clone(), config: config.clone(), signing_key })
	}

	/// Fresh keypair from the OS random source. The private form is `seed || public`.
	pub fn generate() -> Result<GeneratedKey> {
		let mut seed = Zeroizing::new([0u8; SECRET_KEY_LENGTH]);
		OsRng
			.try_fill_bytes(seed.as_mut_slice())
			.map_err(|err| EnclaveError::Generation(format!("signature key : {err}")))?;

		let signing_key = SigningKey::from_bytes(&seed);
		Ok(GeneratedKey {
			public_key: signing_key.verifying_key().to_bytes().to_vec(),
			private_key: Zeroizing::new(signing_key.to_keypair_bytes().to_vec()),
		})
	}

	pub fn public_key(&self) -> [u8; SIGNATURE_PUBLIC_KEY_SIZE] {
		self.signing_key.verifying_key().to_bytes()
	}

	pub fn private_key(&self) -> Zeroizing<[u8; SIGNATURE_PRIVATE_KEY_SIZE]> {
		Zeroizing::new(self.signing_key.to_keypair_bytes())
	}

	pub fn sign(&self, payload: &[u8]) -> Result<[u8; SIGNATURE_SIZE]> {
		match self.signing_key.try_sign(payload) {
			Ok(signature) => Ok(signature.to_bytes()),
			Err(err) => Err(EnclaveError::Signing(err.to_string())),
		}
	}

	pub fn verify(&self, payload: &[u8], signature: &[u8]) -> bool {
		verify_signature(&self.signing_key.verifying_key(), payload, signature)
	}

	/// Adopt externally supplied key material as the signing identity, replacing the
	/// sealed key at this manager's location.
	pub fn persist(&mut self, private_key: &[u8]) -> Result<()> {
		let signing_key = signing_key_from_bytes(private_key)?;
		let public_key = signing_key.verifying_key().to_bytes();

		self.store.save(&self.config, &public_key, private_key)?;
		self.signing_key = signing_key;

		info!(
			"SIGNATURE KEY : persisted new key, fingerprint {}",
			sha256::digest(public_key.as_slice())
		);
		Ok(())
	}
}

/// Parse `seed || public` key material, rejecting a public half that does not belong to the seed.
pub fn signing_key_from_bytes(key_data: &[u8]) -> Result<SigningKey> {
	let key_pair: Zeroizing<[u8; SIGNATURE_PRIVATE_KEY_SIZE]> =
		Zeroizing::new(key_data.try_into().map_err(|_| {
			EnclaveError::size("signature private key", SIGNATURE_PRIVATE_KEY_SIZE, key_data.len())
		})?);

	SigningKey::from_keypair_bytes(&key_pair)
		.map_err(|err| EnclaveError::Consistency(format!("invalid signature keypair : {err}")))
}

pub fn verify_signature(public_key: &VerifyingKey, payload: &[u8], signature: &[u8]) -> bool {
	match Signature::from_slice(signature) {
		Ok(signature) => public_key.verify(payload, &signature).is_ok(),
		Err(_) => false,
	}
}
