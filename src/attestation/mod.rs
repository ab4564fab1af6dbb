pub mod quote;
pub mod ra;
pub mod simulated;
pub mod verifier;

use std::sync::Arc;

use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::{
	constants::MAX_REPORT_DATA_SIZE,
	error::{AttestationError, Result},
};

/* ------------------------------
		REPORT TYPES
------------------------------ */

/// Platform assessment of the TCB that produced a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum TcbStatus {
	UpToDate,
	OutOfDate,
	Revoked,
	ConfigurationNeeded,
	OutOfDateConfigurationNeeded,
	SwHardeningNeeded,
	ConfigurationAndSwHardeningNeeded,
	Unknown,
}

/// A verified attestation report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationReport {
	pub unique_id: Vec<u8>,
	pub signer_id: Vec<u8>,
	pub product_id: Vec<u8>,
	pub security_version: u32,
	pub debug: bool,
	pub tcb_status: TcbStatus,
	pub user_data: Vec<u8>,
	pub raw: Vec<u8>,
}

impl AttestationReport {
	/// Trust predicate applied to every report before its identity is compared.
	pub fn check_trust(&self) -> std::result::Result<(), AttestationError> {
		if self.tcb_status != TcbStatus::UpToDate {
			return Err(AttestationError::NotCurrent)
		}
		if self.unique_id.is_empty() || self.signer_id.is_empty() {
			return Err(AttestationError::InvalidReport)
		}
		if self.debug {
			return Err(AttestationError::DebugEnabled)
		}
		Ok(())
	}

	/// Both reports come from the same enclave build with identical settings.
	pub fn same_enclave(&self, other: &AttestationReport) -> bool {
		self.unique_id == other.unique_id &&
			self.signer_id == other.signer_id &&
			self.product_id == other.product_id &&
			self.security_version == other.security_version &&
			self.debug == other.debug
	}
}

/* ------------------------------
		PLATFORM CAPABILITY
------------------------------ */

/// Hardware (or simulated) sealing and attestation primitives.
pub trait EnclavePlatform {
	/// The platform's own verified identity, without user data.
	fn self_report(&self) -> Result<AttestationReport>;

	/// Produce a remote report binding `user_data` (at most 64 bytes).
	fn get_report(&self, user_data: &[u8]) -> Result<Vec<u8>>;

	fn verify_report(&self, report: &[u8]) -> Result<AttestationReport>;

	/// Encrypt with a key bound to the enclave identity, authenticating `aad`.
	fn seal(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>>;

	fn unseal(&self, sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>>;
}

/* ------------------------------
		ATTESTATION SERVICE
------------------------------ */

#[derive(Clone)]
pub struct AttestationService {
	platform: Arc<dyn EnclavePlatform>,
}

impl AttestationService {
	pub fn new(platform: Arc<dyn EnclavePlatform>) -> Self {
		AttestationService { platform }
	}

	pub fn self_report(&self) -> Result<AttestationReport> {
		self.platform.self_report()
	}

	/// Requests a remote attestation report for the provided user data.
	pub fn get_report(&self, user_data: &[u8]) -> Result<Vec<u8>> {
		if user_data.len() > MAX_REPORT_DATA_SIZE {
			return Err(AttestationError::ReportDataTooLarge(user_data.len()).into())
		}
		self.platform.get_report(user_data)
	}

	pub fn verify_report(&self, report: &[u8]) -> Result<AttestationReport> {
		self.platform.verify_report(report)
	}

	/// Verify a remote report and accept it only if it was produced by a trusted instance of
	/// exactly this enclave. Returns the user data carried by the remote report.
	pub fn verify_and_extract(&self, report: &[u8]) -> Result<Vec<u8>> {
		debug!("ATTESTATION : verify remote report ({} bytes)", report.len());
		let remote = self.verify_report(report)?;

		debug!("ATTESTATION : obtain self report");
		let local = self.self_report()?;

		match verify_reports(&remote, &local) {
			Ok(user_data) => {
				debug!("ATTESTATION : remote report accepted");
				Ok(user_data)
			},
			Err(err) => {
				error!("ATTESTATION : remote report rejected : {}", err);
				Err(err.into())
			},
		}
	}
}

/// Checks that both reports are trusted and come from the same enclave.
pub fn verify_reports(
	remote: &AttestationReport,
	local: &AttestationReport,
) -> std::result::Result<Vec<u8>, AttestationError> {
	remote.check_trust()?;
	local.check_trust().map_err(|err| AttestationError::LocalReport(Box::new(err)))?;

	if remote.user_data.is_empty() {
		return Err(AttestationError::EmptyUserData)
	}

	if !remote.same_enclave(local) {
		return Err(AttestationError::IdentityMismatch)
	}

	Ok(remote.user_data.clone())
}

/* -----------------------------
			TESTS
--------------------------------*/

#[cfg(test)]
pub(crate) mod test {
	use super::*;
	use crate::error::EnclaveError;

	pub fn report(unique_id: &[u8], signer_id: &[u8]) -> AttestationReport {
		AttestationReport {
			unique_id: unique_id.to_vec(),
			signer_id: signer_id.to_vec(),
			product_id: b"p1".to_vec(),
			security_version: 1,
			debug: false,
			tcb_status: TcbStatus::UpToDate,
			user_data: Vec::new(),
			raw: Vec::new(),
		}
	}

	#[test]
	fn same_enclave_comparison() {
		let base = report(b"mr1", b"sign1");
		assert!(base.same_enclave(&base.clone()));

		let mut other = base.clone();
		other.debug = true;
		assert!(!base.same_enclave(&other));

		let mut other = base.clone();
		other.unique_id = b"mr2".to_vec();
		assert!(!base.same_enclave(&other));

		let mut other = base.clone();
		other.signer_id = b"sign2".to_vec();
		assert!(!base.same_enclave(&other));

		let mut other = base.clone();
		other.product_id = b"p2".to_vec();
		assert!(!base.same_enclave(&other));

		let mut other = base.clone();
		other.security_version = 2;
		assert!(!base.same_enclave(&other));

		// tcb status and user data are not part of the identity
		let mut other = base.clone();
		other.tcb_status = TcbStatus::OutOfDate;
		other.user_data = b"data".to_vec();
		assert!(base.same_enclave(&other));
	}

	#[test]
	fn reports_verification() {
		let mut remote = report(b"mr1", b"s1");
		remote.user_data = b"test".to_vec();
		let local = report(b"mr1", b"s1");

		assert_eq!(verify_reports(&remote, &local), Ok(b"test".to_vec()));

		let empty = report(b"", b"");
		assert_eq!(verify_reports(&empty, &local), Err(AttestationError::InvalidReport));

		let mut revoked = remote.clone();
		revoked.tcb_status = TcbStatus::Revoked;
		assert_eq!(verify_reports(&revoked, &local), Err(AttestationError::NotCurrent));

		let mut debug = remote.clone();
		debug.debug = true;
		assert_eq!(verify_reports(&debug, &local), Err(AttestationError::DebugEnabled));

		let invalid_local = report(b"mr2", b"");
		assert_eq!(
			verify_reports(&remote, &invalid_local),
			Err(AttestationError::LocalReport(Box::new(AttestationError::InvalidReport)))
		);

		let mut debug_local = local.clone();
		debug_local.debug = true;
		assert_eq!(
			verify_reports(&remote, &debug_local),
			Err(AttestationError::LocalReport(Box::new(AttestationError::DebugEnabled)))
		);

		let other_local = report(b"mr2", b"s1");
		assert_eq!(verify_reports(&remote, &other_local), Err(AttestationError::IdentityMismatch));

		let no_data = report(b"mr1", b"s1");
		assert_eq!(verify_reports(&no_data, &local), Err(AttestationError::EmptyUserData));
	}

	#[test]
	fn report_data_too_large() {
		let platform = simulated::test::platform(b"mr1", [1u8; 32]);
		let service = AttestationService::new(Arc::new(platform));

		let err = service.get_report(&[0u8; 65]).unwrap_err();
		assert!(matches!(
			err,
			EnclaveError::Attestation(AttestationError::ReportDataTooLarge(65))
		));
		assert!(service.get_report(&[0u8; 64]).is_ok());
	}

	#[test]
	fn service_reports() {
		let source = AttestationService::new(Arc::new(simulated::test::platform(b"mr1", [1u8; 32])));
		let target = AttestationService::new(Arc::new(simulated::test::platform(b"mr1", [2u8; 32])));

		let local = source.self_report().unwrap();
		assert_eq!(local.unique_id, b"mr1".to_vec());

		let report = target.get_report(b"user data").unwrap();
		let remote = source.verify_report(&report).unwrap();
		assert!(remote.same_enclave(&local));
		assert_eq!(source.verify_and_extract(&report).unwrap(), remote.user_data);

		assert!(source.verify_report(&report[..report.len() - 1]).is_err());
		assert!(source.verify_and_extract(&report[..report.len() - 1]).is_err());
	}
}
