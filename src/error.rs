use thiserror::Error;

/// Why an attestation report was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttestationError {
	#[error("reporter SGX platform is not verified")]
	NotCurrent,

	#[error("invalid report")]
	InvalidReport,

	#[error("report has debug enabled")]
	DebugEnabled,

	#[error("unexpected report: enclave identity mismatch")]
	IdentityMismatch,

	#[error("report data is empty")]
	EmptyUserData,

	#[error("report data too large: {0} bytes")]
	ReportDataTooLarge(usize),

	#[error("report signature is invalid")]
	InvalidSignature,

	#[error("attestation is not supported on this platform: {0}")]
	Unsupported(String),

	#[error("local report: {0}")]
	LocalReport(Box<AttestationError>),

	#[error("unexpected enclave measurement: {0}")]
	UnexpectedMeasurement(String),

	#[error("unexpected enclave public key: {0}")]
	UnexpectedPublicKey(String),

	#[error("attestation service: {0}")]
	Service(String),
}

#[derive(Error, Debug)]
pub enum EnclaveError {
	#[error("configuration error: {0}")]
	Configuration(String),

	#[error("key generation failed: {0}")]
	Generation(String),

	#[error("sealing error: {0}")]
	Sealing(String),

	#[error("unexpected keys creation date: {0}")]
	Freshness(String),

	#[error("attestation failed: {0}")]
	Attestation(#[from] AttestationError),

	#[error("invalid size of {what}: expected {expected}, got {actual}")]
	Size { what: &'static str, expected: usize, actual: usize },

	#[error("crypto error: {0}")]
	Crypto(String),

	#[error("wrong signature: {0}")]
	Consistency(String),

	#[error("signing failed: {0}")]
	Signing(String),

	#[error("random source unavailable: {0}")]
	RandomSource(String),

	#[error("codec error: {0}")]
	Codec(String),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
}

impl EnclaveError {
	pub fn size(what: &'static str, expected: usize, actual: usize) -> Self {
		EnclaveError::Size { what, expected, actual }
	}
}

impl From<parity_scale_codec::Error> for EnclaveError {
	fn from(err: parity_scale_codec::Error) -> Self {
		EnclaveError::Codec(err.to_string())
	}
}

pub type Result<T> = std::result::Result<T, EnclaveError>;

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn local_report_wraps_reason() {
		let err = AttestationError::LocalReport(Box::new(AttestationError::InvalidReport));
		assert_eq!(err.to_string(), "local report: invalid report");

		let err: EnclaveError = AttestationError::DebugEnabled.into();
		assert!(matches!(err, EnclaveError::Attestation(AttestationError::DebugEnabled)));
	}
}
