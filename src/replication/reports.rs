use parity_scale_codec::{Decode, DecodeAll, Encode};
use tracing::debug;

use crate::{
	attestation::AttestationService,
	constants::{BOX_PUBLIC_KEY_SIZE, PRIVATE_KEYS_REPORT_FORMAT, SIGNATURE_PUBLIC_KEY_SIZE},
	error::{EnclaveError, Result},
};

const PUBLIC_KEYS_REPORT_SIZE: usize = SIGNATURE_PUBLIC_KEY_SIZE + BOX_PUBLIC_KEY_SIZE;

/* ------------------------------
		PUBLIC KEYS REPORT
------------------------------ */

/// Public identity of an enclave instance, attested as the report user data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKeysReport {
	pub public_signature: [u8; SIGNATURE_PUBLIC_KEY_SIZE],
	pub public_encryption_key: [u8; BOX_PUBLIC_KEY_SIZE],
}

impl PublicKeysReport {
	pub fn to_user_data(&self) -> [u8; PUBLIC_KEYS_REPORT_SIZE] {
		let mut user_data = [0u8; PUBLIC_KEYS_REPORT_SIZE];
		user_data[..SIGNATURE_PUBLIC_KEY_SIZE].copy_from_slice(&self.public_signature);
		user_data[SIGNATURE_PUBLIC_KEY_SIZE..].copy_from_slice(&self.public_encryption_key);
		user_data
	}

	pub fn from_user_data(user_data: &[u8]) -> Result<Self> {
		if user_data.len() != PUBLIC_KEYS_REPORT_SIZE {
			return Err(EnclaveError::size(
				"public keys report",
				PUBLIC_KEYS_REPORT_SIZE,
				user_data.len(),
			))
		}

		let mut report = PublicKeysReport {
			public_signature: [0u8; SIGNATURE_PUBLIC_KEY_SIZE],
			public_encryption_key: [0u8; BOX_PUBLIC_KEY_SIZE],
		};
		report.public_signature.copy_from_slice(&user_data[..SIGNATURE_PUBLIC_KEY_SIZE]);
		report.public_encryption_key.copy_from_slice(&user_data[SIGNATURE_PUBLIC_KEY_SIZE..]);
		Ok(report)
	}

	/// Attested report bytes carrying both public keys.
	pub fn encode(&self, attestation: &AttestationService) -> Result<Vec<u8>> {
		attestation.get_report(&self.to_user_data())
	}

	/// Accept `report` only from a trusted instance of this enclave.
	pub fn decode(report: &[u8], attestation: &AttestationService) -> Result<Self> {
		let user_data = attestation.verify_and_extract(report)?;
		debug!("PUBLIC KEYS REPORT : {} bytes of user data", user_data.len());
		PublicKeysReport::from_user_data(&user_data)
	}
}

/* ------------------------------
		PRIVATE KEYS REPORT
------------------------------ */

/// Migration package produced by the instance holding the live signing key.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct PrivateKeysReport {
	format_version: u8,
	pub attestation_report: Vec<u8>,
	pub public_encryption_key: [u8; BOX_PUBLIC_KEY_SIZE],
	pub encrypted_signature_key: Vec<u8>,
}

impl PrivateKeysReport {
	pub fn new(
		attestation_report: Vec<u8>,
		public_encryption_key: [u8; BOX_PUBLIC_KEY_SIZE],
		encrypted_signature_key: Vec<u8>,
	) -> Self {
		PrivateKeysReport {
			format_version: PRIVATE_KEYS_REPORT_FORMAT,
			attestation_report,
			public_encryption_key,
			encrypted_signature_key,
		}
	}

	pub fn to_bytes(&self) -> Vec<u8> {
		self.encode()
	}

	pub fn from_bytes(data: &[u8]) -> Result<Self> {
		let report = PrivateKeysReport::decode_all(&mut &data[..])?;
		if report.format_version != PRIVATE_KEYS_REPORT_FORMAT {
			return Err(EnclaveError::Codec(format!(
				"unsupported private keys report format {}",
				report.format_version
			)))
		}
		Ok(report)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::{attestation::simulated::test::platform, error::AttestationError};
	use std::sync::Arc;

	#[test]
	fn public_keys_user_data() {
		let report =
			PublicKeysReport { public_signature: [0xaa; 32], public_encryption_key: [0xbb; 32] };
		let user_data = report.to_user_data();
		assert_eq!(&user_data[..32], &[0xaa; 32]);
		assert_eq!(&user_data[32..], &[0xbb; 32]);
		assert_eq!(PublicKeysReport::from_user_data(&user_data).unwrap(), report);

		assert!(matches!(
			PublicKeysReport::from_user_data(&user_data[..63]),
			Err(EnclaveError::Size { expected: 64, actual: 63, .. })
		));
	}

	#[test]
	fn public_keys_attested() {
		let source = AttestationService::new(Arc::new(platform(b"mr1", [1u8; 32])));
		let target = AttestationService::new(Arc::new(platform(b"mr1", [2u8; 32])));
		let stranger = AttestationService::new(Arc::new(platform(b"mr2", [3u8; 32])));

		let report =
			PublicKeysReport { public_signature: [0x01; 32], public_encryption_key: [0x02; 32] };
		let bytes = report.encode(&target).unwrap();

		assert_eq!(PublicKeysReport::decode(&bytes, &source).unwrap(), report);
		assert!(matches!(
			PublicKeysReport::decode(&bytes, &stranger),
			Err(EnclaveError::Attestation(AttestationError::IdentityMismatch))
		));
	}

	#[test]
	fn private_keys_report_format() {
		let report = PrivateKeysReport::new(b"report".to_vec(), [0x05; 32], vec![0x06; 120]);
		let bytes = report.to_bytes();
		assert_eq!(bytes[0], PRIVATE_KEYS_REPORT_FORMAT);
		assert_eq!(PrivateKeysReport::from_bytes(&bytes).unwrap(), report);

		let mut trailing = bytes.clone();
		trailing.push(0);
		assert!(matches!(PrivateKeysReport::from_bytes(&trailing), Err(EnclaveError::Codec(_))));

		let mut unknown = bytes.clone();
		unknown[0] = 2;
		assert!(matches!(PrivateKeysReport::from_bytes(&unknown), Err(EnclaveError::Codec(_))));

		assert!(matches!(
			PrivateKeysReport::from_bytes(&bytes[..bytes.len() - 1]),
			Err(EnclaveError::Codec(_))
		));
	}
}
