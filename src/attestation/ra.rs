use std::{
	fs::{File, OpenOptions},
	io::{Read, Write},
	path::Path,
	time::Duration,
};

use aes_gcm::{
	aead::{Aead, KeyInit, Payload},
	Aes128Gcm, Nonce,
};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use parity_scale_codec::Encode;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace};
use zeroize::Zeroizing;

use super::{quote::QuoteBody, AttestationReport, EnclavePlatform, TcbStatus};
use crate::{
	constants::*,
	error::{AttestationError, EnclaveError, Result},
};

const SEAL_NONCE_SIZE: usize = 12;
const SEAL_KEY_SIZE: usize = 16;
const VERDICT_DOMAIN: &[u8] = b"sgx-oracle quote verdict v1";

#[derive(Serialize)]
struct VerifyQuoteRequest<'a> {
	quote: &'a str,
}

/// Verdict of the attestation authority, signed over `VERDICT_DOMAIN || SCALE(VerdictBody)`.
#[derive(Deserialize, Debug)]
struct VerifyQuoteResponse {
	tcb_status: TcbStatus,
	quote: String,
	signature: String,
}

#[derive(Encode)]
struct VerdictBody<'a> {
	quote: &'a [u8],
	tcb_status: TcbStatus,
}

/// SGX enclave running under Gramine, attested through the `/dev/attestation` pseudo-files.
pub struct GraminePlatform {
	// Quote verification service, quotes can not be verified inside the enclave.
	verification_url: Option<String>,
	// Only verdicts signed by this key are trusted. It is compiled in, so it is measured.
	authority: Option<VerifyingKey>,
}

impl GraminePlatform {
	pub fn new(verification_url: Option<String>) -> Self {
		GraminePlatform { verification_url, authority: GraminePlatform::pinned_authority() }
	}

	fn pinned_authority() -> Option<VerifyingKey> {
		let encoded = ATTESTATION_AUTHORITY_KEY?;
		let key = hex::decode(encoded.trim())
			.ok()
			.and_then(|bytes| <[u8; SIGNATURE_PUBLIC_KEY_SIZE]>::try_from(bytes).ok())
			.and_then(|bytes| VerifyingKey::from_bytes(&bytes).ok());

		if key.is_none() {
			error!("ATTESTATION : compiled in authority key is invalid");
		}
		key
	}

	pub fn is_enclave() -> bool {
		Path::new(ATTESTATION_DEV_PATH).exists()
	}

	fn ensure_enclave() -> Result<()> {
		if !GraminePlatform::is_enclave() {
			info!("This is NOT inside an Enclave!");
			return Err(AttestationError::Unsupported("not inside an enclave".to_string()).into())
		}
		Ok(())
	}

	fn seal_key() -> Result<Zeroizing<Vec<u8>>> {
		GraminePlatform::ensure_enclave()
			.map_err(|err| EnclaveError::Sealing(format!("sealing key : {err}")))?;

		let key = Zeroizing::new(std::fs::read(MRENCLAVE_SEAL_KEY_PATH)?);
		if key.len() != SEAL_KEY_SIZE {
			return Err(EnclaveError::Sealing(format!("unexpected sealing key size {}", key.len())))
		}
		Ok(key)
	}

	fn cipher() -> Result<Aes128Gcm> {
		let key = GraminePlatform::seal_key()?;
		Aes128Gcm::new_from_slice(&key)
			.map_err(|err| EnclaveError::Sealing(format!("sealing cipher : {err}")))
	}

	/// Ask the verification service to check the quote signature and TCB level.
	fn verify_quote(&self, quote: &[u8]) -> Result<TcbStatus> {
		let (url, authority) = match (&self.verification_url, &self.authority) {
			(Some(url), Some(authority)) => (url, authority),
			(None, _) => {
				return Err(AttestationError::Unsupported(
					"no quote verification service configured".to_string(),
				)
				.into())
			},
			(_, None) => {
				return Err(AttestationError::Unsupported(
					"no attestation authority key compiled in".to_string(),
				)
				.into())
			},
		};

		let client = reqwest::blocking::Client::builder()
			.timeout(Duration::from_secs(ATTESTATION_TIMEOUT_SECS))
			.https_only(true)
			.build()
			.map_err(|err| AttestationError::Service(format!("unable to build client : {err}")))?;

		let quote_hex = hex::encode(quote);
		let response = client
			.post(url)
			.json(&VerifyQuoteRequest { quote: &quote_hex })
			.send()
			.and_then(|resp| resp.error_for_status())
			.map_err(|err| {
				error!("ATTESTATION : can not get response from attestation server : {err:?}");
				AttestationError::Service(err.to_string())
			})?;

		let body = response.text().map_err(|err| {
			error!("ATTESTATION : error reading attestation response {err:?}");
			AttestationError::Service(err.to_string())
		})?;

		check_verdict(authority, quote, &body).map_err(EnclaveError::from)
	}
}

/// Accept the verification service answer only if the pinned authority signed it for `quote`.
fn check_verdict(
	authority: &VerifyingKey,
	quote: &[u8],
	body: &str,
) -> std::result::Result<TcbStatus, AttestationError> {
	let verdict: VerifyQuoteResponse = serde_json::from_str(body).map_err(|err| {
		error!("ATTESTATION : error deserializing attestation response {err:?}");
		AttestationError::Service(err.to_string())
	})?;
	trace!("ATTESTATION : verification response {:?}", verdict);

	// The returned verdict must belong to the submitted quote
	if !verdict.quote.eq_ignore_ascii_case(&hex::encode(quote)) {
		error!("ATTESTATION : quote mismatch in verification response");
		return Err(AttestationError::InvalidReport)
	}

	let signature = hex::decode(verdict.signature.trim())
		.ok()
		.and_then(|bytes| Signature::from_slice(&bytes).ok())
		.ok_or(AttestationError::InvalidSignature)?;

	let mut message = VERDICT_DOMAIN.to_vec();
	VerdictBody { quote, tcb_status: verdict.tcb_status }.encode_to(&mut message);

	authority.verify(&message, &signature).map_err(|_| {
		error!("ATTESTATION : verdict is not signed by the attestation authority");
		AttestationError::InvalidSignature
	})?;

	Ok(verdict.tcb_status)
}

impl EnclavePlatform for GraminePlatform {
	fn self_report(&self) -> Result<AttestationReport> {
		let quote = self.get_report(&[])?;
		self.verify_report(&quote)
	}

	fn get_report(&self, user_data: &[u8]) -> Result<Vec<u8>> {
		if user_data.len() > MAX_REPORT_DATA_SIZE {
			return Err(AttestationError::ReportDataTooLarge(user_data.len()).into())
		}
		GraminePlatform::ensure_enclave()?;

		let mut attest_type = String::new();
		File::open(ATTESTATION_TYPE_PATH)?.read_to_string(&mut attest_type)?;
		debug!("attestation type is : {}", attest_type.trim());
		if attest_type.trim() == "none" {
			return Err(AttestationError::Unsupported("attestation type is none".to_string()).into())
		}

		let mut report_data = [0u8; MAX_REPORT_DATA_SIZE];
		report_data[..user_data.len()].copy_from_slice(user_data);
		OpenOptions::new().write(true).open(USER_REPORT_DATA_PATH)?.write_all(&report_data)?;

		debug!("Reading The Quote ...");
		let mut quote = Vec::new();
		File::open(QUOTE_PATH)?.read_to_end(&mut quote)?;

		Ok(quote)
	}

	fn verify_report(&self, report: &[u8]) -> Result<AttestationReport> {
		let body = QuoteBody::parse(report)?;
		let tcb_status = self.verify_quote(report)?;

		Ok(AttestationReport {
			unique_id: body.mr_enclave.to_vec(),
			signer_id: body.mr_signer.to_vec(),
			product_id: body.isv_prod_id.to_le_bytes().to_vec(),
			security_version: u32::from(body.isv_svn),
			debug: body.debug(),
			tcb_status,
			user_data: body.report_data.to_vec(),
			raw: report.to_vec(),
		})
	}

	fn seal(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
		let cipher = GraminePlatform::cipher()?;

		let mut nonce = [0u8; SEAL_NONCE_SIZE];
		OsRng
			.try_fill_bytes(&mut nonce)
			.map_err(|err| EnclaveError::RandomSource(err.to_string()))?;

		let ciphertext = cipher
			.encrypt(Nonce::from_slice(&nonce), Payload { msg: plaintext, aad })
			.map_err(|_| EnclaveError::Sealing("seal failed".to_string()))?;

		let mut sealed = nonce.to_vec();
		sealed.extend_from_slice(&ciphertext);
		Ok(sealed)
	}

	fn unseal(&self, sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
		if sealed.len() <= SEAL_NONCE_SIZE {
			return Err(EnclaveError::Sealing("sealed data is truncated".to_string()))
		}
		let cipher = GraminePlatform::cipher()?;

		let (nonce, ciphertext) = sealed.split_at(SEAL_NONCE_SIZE);
		cipher
			.decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad })
			.map_err(|_| EnclaveError::Sealing("unseal denied".to_string()))
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::attestation::quote::test::quote;
	use ed25519_dalek::{Signer, SigningKey};

	fn authority() -> SigningKey {
		SigningKey::from_bytes(&[0x42; 32])
	}

	fn verdict(signer: &SigningKey, quote: &[u8], tcb_status: TcbStatus) -> String {
		let mut message = VERDICT_DOMAIN.to_vec();
		VerdictBody { quote, tcb_status }.encode_to(&mut message);
		let status = serde_json::to_value(tcb_status).unwrap();

		serde_json::json!({
			"tcb_status": status,
			"quote": hex::encode(quote),
			"signature": hex::encode(signer.sign(&message).to_bytes()),
		})
		.to_string()
	}

	// These run outside of an enclave, where Gramine pseudo-files are absent.

	#[test]
	fn report_data_too_large() {
		let platform = GraminePlatform::new(None);
		assert!(matches!(
			platform.get_report(&[0u8; 65]),
			Err(EnclaveError::Attestation(AttestationError::ReportDataTooLarge(65)))
		));
	}

	#[test]
	fn get_report_requires_enclave() {
		if GraminePlatform::is_enclave() {
			return
		}
		let platform = GraminePlatform::new(None);
		assert!(matches!(
			platform.get_report(&[0u8; 64]),
			Err(EnclaveError::Attestation(AttestationError::Unsupported(_)))
		));
		assert!(matches!(platform.seal(b"testdata", b"v1"), Err(EnclaveError::Sealing(_))));
	}

	#[test]
	fn verify_requires_service() {
		let platform = GraminePlatform::new(None);
		let quote = quote([0x11; 32], false, b"data");
		assert!(matches!(
			platform.verify_report(&quote),
			Err(EnclaveError::Attestation(AttestationError::Unsupported(_)))
		));
		assert!(matches!(
			platform.verify_report(b"test"),
			Err(EnclaveError::Attestation(AttestationError::InvalidReport))
		));
	}

	#[test]
	fn verify_requires_authority() {
		let platform = GraminePlatform {
			verification_url: Some("https://127.0.0.1:1/verify".to_string()),
			authority: None,
		};
		assert!(matches!(
			platform.verify_report(&quote([0x11; 32], false, b"data")),
			Err(EnclaveError::Attestation(AttestationError::Unsupported(_)))
		));
	}

	#[test]
	fn signed_verdict_accepted() {
		let key = authority();
		let quote = quote([0x11; 32], false, b"data");

		let body = verdict(&key, &quote, TcbStatus::UpToDate);
		assert_eq!(check_verdict(&key.verifying_key(), &quote, &body), Ok(TcbStatus::UpToDate));

		let body = verdict(&key, &quote, TcbStatus::OutOfDate);
		assert!(body.contains("\"OutOfDate\""));
		assert_eq!(check_verdict(&key.verifying_key(), &quote, &body), Ok(TcbStatus::OutOfDate));
	}

	#[test]
	fn forged_quote_rejected() {
		let pinned = authority().verifying_key();
		let forger = SigningKey::from_bytes(&[0x13; 32]);
		let forged = quote([0x11; 32], false, &[0xee; 64]);

		let body = verdict(&forger, &forged, TcbStatus::UpToDate);
		assert_eq!(check_verdict(&pinned, &forged, &body), Err(AttestationError::InvalidSignature));

		// an unsigned verdict is no better
		let body = serde_json::json!({
			"tcb_status": "UpToDate",
			"quote": hex::encode(&forged),
			"signature": "",
		})
		.to_string();
		assert_eq!(check_verdict(&pinned, &forged, &body), Err(AttestationError::InvalidSignature));
	}

	#[test]
	fn verdict_bound_to_quote_and_status() {
		let key = authority();
		let quote1 = quote([0x11; 32], false, b"one");
		let quote2 = quote([0x11; 32], false, b"two");

		// echo of another quote
		let body = verdict(&key, &quote2, TcbStatus::UpToDate);
		assert_eq!(
			check_verdict(&key.verifying_key(), &quote1, &body),
			Err(AttestationError::InvalidReport)
		);

		// status upgraded after signing
		let body = verdict(&key, &quote1, TcbStatus::Revoked).replace("Revoked", "UpToDate");
		assert_eq!(
			check_verdict(&key.verifying_key(), &quote1, &body),
			Err(AttestationError::InvalidSignature)
		);

		assert!(matches!(
			check_verdict(&key.verifying_key(), &quote1, "{\"tcb_status\":\"Fine\"}"),
			Err(AttestationError::Service(_))
		));
	}
}
