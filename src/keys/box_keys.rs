//! Authenticated public-key encryption between enclave instances.
//!
//! A box is sealed with the static X25519 agreement of the sender and recipient keys,
//! expanded with HKDF-SHA256 into an XChaCha20-Poly1305 key. The wire form is
//! `nonce(24) || ciphertext`.

use chacha20poly1305::{
	aead::{Aead, KeyInit},
	Key, XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use tracing::{debug, error};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use super::sealed::{GeneratedKey, KeyMaterial, SealedKeyStore};
use crate::{
	config::KeysConfig,
	constants::{BOX_NONCE_SIZE, BOX_PRIVATE_KEY_SIZE, BOX_PUBLIC_KEY_SIZE},
	error::{EnclaveError, Result},
};

const BOX_KDF_INFO: &[u8] = b"sgx-oracle box v1";

pub struct EncryptionManager {
	public_key: PublicKey,
	secret: StaticSecret,
}

impl EncryptionManager {
	/// Load the box keypair at `config`, creating it on first use.
	pub fn load(store: &SealedKeyStore, config: &KeysConfig) -> Result<Self> {
		let key_data = store.get_or_create(config, EncryptionManager::generate)?;
		let manager = EncryptionManager::from_key_data(&key_data)?;
		debug!("BOX KEY : loaded, fingerprint {}", sha256::digest(manager.public_key().as_slice()));
		Ok(manager)
	}

	/// Stored form is `public || private`.
	pub fn from_key_data(key_data: &[u8]) -> Result<Self> {
		let expected = BOX_PUBLIC_KEY_SIZE + BOX_PRIVATE_KEY_SIZE;
		if key_data.len() != expected {
			return Err(EnclaveError::size("box keypair", expected, key_data.len()))
		}

		let mut private = Zeroizing::new([0u8; BOX_PRIVATE_KEY_SIZE]);
		private.copy_from_slice(&key_data[BOX_PUBLIC_KEY_SIZE..]);
		let secret = StaticSecret::from(*private);
		let public_key = PublicKey::from(&secret);

		if public_key.as_bytes() != &key_data[..BOX_PUBLIC_KEY_SIZE] {
			return Err(EnclaveError::Consistency(
				"stored box public key does not match the private key".to_string(),
			))
		}

		Ok(EncryptionManager { public_key, secret })
	}

	/// Fresh keypair from the OS random source.
	pub fn generate() -> Result<GeneratedKey> {
		let mut private = Zeroizing::new([0u8; BOX_PRIVATE_KEY_SIZE]);
		OsRng
			.try_fill_bytes(private.as_mut_slice())
			.map_err(|err| EnclaveError::Generation(format!("box key : {err}")))?;

		let public_key = PublicKey::from(&StaticSecret::from(*private)).to_bytes();

		let mut key_pair = Zeroizing::new(public_key.to_vec());
		key_pair.extend_from_slice(private.as_slice());

		Ok(GeneratedKey { public_key: public_key.to_vec(), private_key: key_pair })
	}

	pub fn public_key(&self) -> [u8; BOX_PUBLIC_KEY_SIZE] {
		self.public_key.to_bytes()
	}

	/// Encrypts the given message for the recipient's public key.
	pub fn encrypt(&self, message: &[u8], recipient_public_key: &[u8]) -> Result<Vec<u8>> {
		let cipher = self.cipher(recipient_public_key)?;

		let mut nonce = [0u8; BOX_NONCE_SIZE];
		OsRng.try_fill_bytes(&mut nonce).map_err(|err| {
			error!("BOX KEY : nonce generation error : {}", err);
			EnclaveError::RandomSource(err.to_string())
		})?;

		let ciphertext = cipher
			.encrypt(XNonce::from_slice(&nonce), message)
			.map_err(|_| EnclaveError::Crypto("encryption error".to_string()))?;

		let mut encrypted = nonce.to_vec();
		encrypted.extend_from_slice(&ciphertext);
		Ok(encrypted)
	}

	/// Decrypts a message boxed by the owner of `sender_public_key`.
	pub fn decrypt(&self, encrypted: &[u8], sender_public_key: &[u8]) -> Result<KeyMaterial> {
		let cipher = self.cipher(sender_public_key)?;

		if encrypted.len() <= BOX_NONCE_SIZE {
			return Err(EnclaveError::Crypto(format!("invalid message size {}", encrypted.len())))
		}

		let (nonce, ciphertext) = encrypted.split_at(BOX_NONCE_SIZE);
		let plaintext = cipher
			.decrypt(XNonce::from_slice(nonce), ciphertext)
			.map_err(|_| EnclaveError::Crypto("decryption error".to_string()))?;

		Ok(Zeroizing::new(plaintext))
	}

	fn cipher(&self, peer_public_key: &[u8]) -> Result<XChaCha20Poly1305> {
		let peer: [u8; BOX_PUBLIC_KEY_SIZE] = peer_public_key.try_into().map_err(|_| {
			EnclaveError::size("peer public key", BOX_PUBLIC_KEY_SIZE, peer_public_key.len())
		})?;

		let shared = self.secret.diffie_hellman(&PublicKey::from(peer));
		if !shared.was_contributory() {
			return Err(EnclaveError::Crypto("non contributory peer public key".to_string()))
		}

		let hkdf = Hkdf::<Sha256>::new(None, shared.as_bytes());
		let mut key = Zeroizing::new([0u8; 32]);
		hkdf.expand(BOX_KDF_INFO, key.as_mut_slice())
			.map_err(|err| EnclaveError::Crypto(format!("key derivation : {err}")))?;

		Ok(XChaCha20Poly1305::new(Key::from_slice(key.as_slice())))
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::attestation::simulated::test::platform;
	use base64::{engine::general_purpose::STANDARD, Engine};
	use std::{path::Path, sync::Arc};

	fn config(dir: &Path) -> KeysConfig {
		KeysConfig::new(dir, "box_key.pub", "box_key.priv.enc", "box_created.enc", "test".to_string())
	}

	fn keys() -> (EncryptionManager, EncryptionManager) {
		let alice = EncryptionManager::generate().unwrap();
		let bob = EncryptionManager::generate().unwrap();
		(
			EncryptionManager::from_key_data(&alice.private_key).unwrap(),
			EncryptionManager::from_key_data(&bob.private_key).unwrap(),
		)
	}

	#[test]
	fn keys_loaded_and_reused() {
		let dir = tempfile::tempdir().unwrap();
		let config = config(dir.path());
		let store = SealedKeyStore::new(Arc::new(platform(b"mr1", [1u8; 32])));

		let key1 = EncryptionManager::load(&store, &config).unwrap();
		let key2 = EncryptionManager::load(&store, &config).unwrap();
		assert_eq!(key1.public_key(), key2.public_key());

		let public = std::fs::read_to_string(&config.public_key_path).unwrap();
		assert_eq!(public, STANDARD.encode(key1.public_key()));

		std::fs::remove_file(&config.private_key_path).unwrap();
		let key3 = EncryptionManager::load(&store, &config).unwrap();
		assert_ne!(key1.public_key(), key3.public_key());
	}

	#[test]
	fn invalid_key_data() {
		assert!(matches!(
			EncryptionManager::from_key_data(&[0u8; 32]),
			Err(EnclaveError::Size { expected: 64, actual: 32, .. })
		));

		let mut key_data = EncryptionManager::generate().unwrap().private_key;
		key_data[0] ^= 0x01;
		assert!(matches!(
			EncryptionManager::from_key_data(&key_data),
			Err(EnclaveError::Consistency(_))
		));
	}

	#[test]
	fn box_roundtrip() {
		let (alice, bob) = keys();

		for message in [b"x".to_vec(), b"message".to_vec(), vec![0x42u8; 4096]] {
			let encrypted = alice.encrypt(&message, &bob.public_key()).unwrap();
			assert_eq!(encrypted.len(), BOX_NONCE_SIZE + message.len() + 16);

			let decrypted = bob.decrypt(&encrypted, &alice.public_key()).unwrap();
			assert_eq!(*decrypted, message);
		}
	}

	#[test]
	fn nonce_is_fresh() {
		let (alice, bob) = keys();
		let first = alice.encrypt(b"message", &bob.public_key()).unwrap();
		let second = alice.encrypt(b"message", &bob.public_key()).unwrap();
		assert_ne!(first[..BOX_NONCE_SIZE], second[..BOX_NONCE_SIZE]);
		assert_ne!(first, second);
	}

	#[test]
	fn tampered_box_rejected() {
		let (alice, bob) = keys();
		let encrypted = alice.encrypt(b"message", &bob.public_key()).unwrap();

		for index in [0, BOX_NONCE_SIZE, encrypted.len() - 1] {
			let mut tampered = encrypted.clone();
			tampered[index] ^= 0x01;
			assert!(matches!(
				bob.decrypt(&tampered, &alice.public_key()),
				Err(EnclaveError::Crypto(_))
			));
		}

		assert!(matches!(
			bob.decrypt(&encrypted[..BOX_NONCE_SIZE], &alice.public_key()),
			Err(EnclaveError::Crypto(_))
		));
		assert!(matches!(
			bob.decrypt(&encrypted[..encrypted.len() - 1], &alice.public_key()),
			Err(EnclaveError::Crypto(_))
		));
	}

	#[test]
	fn wrong_keys_rejected() {
		let (alice, bob) = keys();
		let (eve, _) = keys();
		let encrypted = alice.encrypt(b"message", &bob.public_key()).unwrap();

		assert!(eve.decrypt(&encrypted, &alice.public_key()).is_err());
		assert!(bob.decrypt(&encrypted, &eve.public_key()).is_err());
	}

	#[test]
	fn invalid_public_key_size() {
		let (alice, _) = keys();
		assert!(matches!(
			alice.encrypt(b"message", &[0u8; 31]),
			Err(EnclaveError::Size { expected: 32, actual: 31, .. })
		));
		assert!(matches!(
			alice.decrypt(&[0u8; 64], &[0u8; 33]),
			Err(EnclaveError::Size { .. })
		));
	}
}
