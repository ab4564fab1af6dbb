//! Software stand-in for the SGX platform.
//!
//! Reports are signed by a "vendor" ed25519 key shared by every simulated machine, and
//! sealing keys are derived from a per-machine secret and the enclave measurement, so the
//! same trust relations hold as on hardware. Nothing here is confidential.

use chacha20poly1305::{
	aead::{Aead, KeyInit, Payload},
	Key, XChaCha20Poly1305, XNonce,
};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use hkdf::Hkdf;
use parity_scale_codec::{Decode, DecodeAll, Encode};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use super::{AttestationReport, EnclavePlatform, TcbStatus};
use crate::{
	constants::{MAX_REPORT_DATA_SIZE, SIGNATURE_SIZE},
	error::{AttestationError, EnclaveError, Result},
};

const SEAL_KEY_SALT: &[u8] = b"sgx-oracle simulated sealing";
const SEAL_NONCE_SIZE: usize = 24;

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct SimulatedIdentity {
	pub unique_id: Vec<u8>,
	pub signer_id: Vec<u8>,
	pub product_id: Vec<u8>,
	pub security_version: u32,
	pub debug: bool,
	pub tcb_status: TcbStatus,
}

#[derive(Encode, Decode)]
struct ReportBody {
	identity: SimulatedIdentity,
	user_data: Vec<u8>,
}

pub struct SimulatedPlatform {
	identity: SimulatedIdentity,
	vendor_key: SigningKey,
	seal_key: Zeroizing<[u8; 32]>,
}

impl SimulatedPlatform {
	/// # Arguments
	/// * `identity` - measurements reported by this simulated enclave
	/// * `vendor_seed` - report signing root, shared by every machine that should trust each other
	/// * `machine_seed` - sealing root of this machine
	pub fn new(identity: SimulatedIdentity, vendor_seed: &[u8; 32], machine_seed: &[u8; 32]) -> Result<Self> {
		let hkdf = Hkdf::<Sha256>::new(Some(SEAL_KEY_SALT), machine_seed);
		let mut seal_key = Zeroizing::new([0u8; 32]);
		hkdf.expand(&identity.unique_id, &mut seal_key[..])
			.map_err(|err| EnclaveError::Sealing(format!("sealing key derivation : {err}")))?;

		Ok(SimulatedPlatform { identity, vendor_key: SigningKey::from_bytes(vendor_seed), seal_key })
	}

	/// Simulated platform measuring the running executable, so every run of the same binary
	/// shares one enclave identity. Vendor and machine roots are derived from `seed`.
	pub fn from_current_binary(seed: &str) -> Result<Self> {
		warn!("SIMULATION : attestation and sealing are NOT hardware backed");

		let binary = std::env::current_exe()?;
		let measurement = Sha256::digest(std::fs::read(&binary)?);
		debug!("SIMULATION : binary {} measured as {}", binary.display(), hex::encode(measurement));

		let identity = SimulatedIdentity {
			unique_id: measurement.to_vec(),
			signer_id: Sha256::digest(b"sgx-oracle simulated signer").to_vec(),
			product_id: 1u16.to_le_bytes().to_vec(),
			security_version: 1,
			debug: false,
			tcb_status: TcbStatus::UpToDate,
		};

		let vendor_seed: [u8; 32] = Sha256::digest(format!("vendor:{seed}")).into();
		let machine_seed = Zeroizing::new(<[u8; 32]>::from(Sha256::digest(format!("machine:{seed}"))));

		SimulatedPlatform::new(identity, &vendor_seed, &machine_seed)
	}

	pub fn identity(&self) -> &SimulatedIdentity {
		&self.identity
	}

	fn cipher(&self) -> XChaCha20Poly1305 {
		XChaCha20Poly1305::new(Key::from_slice(self.seal_key.as_slice()))
	}
}

impl EnclavePlatform for SimulatedPlatform {
	fn self_report(&self) -> Result<AttestationReport> {
		let mut report = self.verify_report(&self.get_report(&[])?)?;
		report.raw.clear();
		Ok(report)
	}

	fn get_report(&self, user_data: &[u8]) -> Result<Vec<u8>> {
		if user_data.len() > MAX_REPORT_DATA_SIZE {
			return Err(AttestationError::ReportDataTooLarge(user_data.len()).into())
		}

		let mut report =
			ReportBody { identity: self.identity.clone(), user_data: user_data.to_vec() }.encode();

		let signature = self
			.vendor_key
			.try_sign(&report)
			.map_err(|err| EnclaveError::Signing(format!("simulated report : {err}")))?;
		report.extend_from_slice(&signature.to_bytes());

		Ok(report)
	}

	fn verify_report(&self, report: &[u8]) -> Result<AttestationReport> {
		if report.len() <= SIGNATURE_SIZE {
			return Err(AttestationError::InvalidReport.into())
		}

		let (body, signature) = report.split_at(report.len() - SIGNATURE_SIZE);
		let signature =
			Signature::from_slice(signature).map_err(|_| AttestationError::InvalidSignature)?;
		self.vendor_key
			.verifying_key()
			.verify(body, &signature)
			.map_err(|_| AttestationError::InvalidSignature)?;

		let body =
			ReportBody::decode_all(&mut &body[..]).map_err(|_| AttestationError::InvalidReport)?;

		Ok(AttestationReport {
			unique_id: body.identity.unique_id,
			signer_id: body.identity.signer_id,
			product_id: body.identity.product_id,
			security_version: body.identity.security_version,
			debug: body.identity.debug,
			tcb_status: body.identity.tcb_status,
			user_data: body.user_data,
			raw: report.to_vec(),
		})
	}

	fn seal(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
		let mut nonce = [0u8; SEAL_NONCE_SIZE];
		OsRng
			.try_fill_bytes(&mut nonce)
			.map_err(|err| EnclaveError::RandomSource(err.to_string()))?;

		let ciphertext = self
			.cipher()
			.encrypt(XNonce::from_slice(&nonce), Payload { msg: plaintext, aad })
			.map_err(|_| EnclaveError::Sealing("seal failed".to_string()))?;

		let mut sealed = nonce.to_vec();
		sealed.extend_from_slice(&ciphertext);
		Ok(sealed)
	}

	fn unseal(&self, sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
		if sealed.len() <= SEAL_NONCE_SIZE {
			return Err(EnclaveError::Sealing("sealed data is truncated".to_string()))
		}

		let (nonce, ciphertext) = sealed.split_at(SEAL_NONCE_SIZE);
		self.cipher()
			.decrypt(XNonce::from_slice(nonce), Payload { msg: ciphertext, aad })
			.map_err(|_| EnclaveError::Sealing("unseal denied".to_string()))
	}
}
