use std::io::Read;

use base64::{engine::general_purpose::STANDARD, Engine};
use flate2::read::GzDecoder;
use tracing::{debug, info};

use super::{AttestationReport, EnclavePlatform};
use crate::{
	constants::SIGNATURE_PUBLIC_KEY_SIZE,
	error::{AttestationError, EnclaveError, Result},
};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Accepts a report as published: base64 text of the gzip compressed report.
/// Raw, uncompressed or unencoded reports are accepted too.
pub fn decode_report(data: &[u8]) -> Result<Vec<u8>> {
	let decoded = match std::str::from_utf8(data).map(|text| STANDARD.decode(text.trim())) {
		Ok(Ok(decoded)) => decoded,
		_ => data.to_vec(),
	};

	if !decoded.starts_with(&GZIP_MAGIC) {
		return Ok(decoded)
	}

	let mut report = Vec::new();
	GzDecoder::new(decoded.as_slice())
		.read_to_end(&mut report)
		.map_err(|err| EnclaveError::Codec(format!("report decompression : {err}")))?;
	debug!("VERIFY REPORT : {} compressed bytes, {} bytes report", decoded.len(), report.len());
	Ok(report)
}

/// Verify a published identity report against the enclave build and signing key
/// expected by a third party.
///
/// # Arguments
/// * `platform` - used only to check the report signature
/// * `report` - report bytes, as written by `report-key`
/// * `expected_measurement` - hex encoded unique id of the enclave build
/// * `expected_public_key` - signing public key the report must carry
pub fn verify_identity_report(
	platform: &dyn EnclavePlatform,
	report: &[u8],
	expected_measurement: &str,
	expected_public_key: &[u8],
) -> Result<AttestationReport> {
	if expected_public_key.len() != SIGNATURE_PUBLIC_KEY_SIZE {
		return Err(EnclaveError::size(
			"expected public key",
			SIGNATURE_PUBLIC_KEY_SIZE,
			expected_public_key.len(),
		))
	}

	let report = platform.verify_report(report)?;
	report.check_trust()?;

	let measurement = hex::encode(&report.unique_id);
	debug!("VERIFY REPORT : measurement = {measurement}");
	if !measurement.eq_ignore_ascii_case(expected_measurement.trim()) {
		return Err(AttestationError::UnexpectedMeasurement(measurement).into())
	}

	let public_key = report.user_data.get(..SIGNATURE_PUBLIC_KEY_SIZE).unwrap_or(&report.user_data);
	if public_key != expected_public_key {
		return Err(AttestationError::UnexpectedPublicKey(STANDARD.encode(public_key)).into())
	}

	info!("VERIFY REPORT : enclave {} holds the expected key", measurement);
	Ok(report)
}
