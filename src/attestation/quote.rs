use crate::{constants::*, error::AttestationError};

/// Identity fields of the report body embedded in an SGX quote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteBody {
	pub attributes_flags: u64,
	pub mr_enclave: [u8; 32],
	pub mr_signer: [u8; 32],
	pub isv_prod_id: u16,
	pub isv_svn: u16,
	pub report_data: [u8; 64],
}

impl QuoteBody {
	pub fn parse(quote: &[u8]) -> Result<QuoteBody, AttestationError> {
		if quote.len() < QUOTE_HEADER_SIZE + REPORT_BODY_SIZE {
			tracing::debug!("QUOTE : too short, {} bytes", quote.len());
			return Err(AttestationError::InvalidReport)
		}
		let body = &quote[QUOTE_HEADER_SIZE..QUOTE_HEADER_SIZE + REPORT_BODY_SIZE];

		Ok(QuoteBody {
			attributes_flags: u64::from_le_bytes(field(body, REPORT_ATTRIBUTES_OFFSET)?),
			mr_enclave: field(body, REPORT_MRENCLAVE_OFFSET)?,
			mr_signer: field(body, REPORT_MRSIGNER_OFFSET)?,
			isv_prod_id: u16::from_le_bytes(field(body, REPORT_ISVPRODID_OFFSET)?),
			isv_svn: u16::from_le_bytes(field(body, REPORT_ISVSVN_OFFSET)?),
			report_data: field(body, REPORT_DATA_OFFSET)?,
		})
	}

	pub fn debug(&self) -> bool {
		self.attributes_flags & SGX_FLAGS_DEBUG != 0
	}
}

fn field<const N: usize>(body: &[u8], offset: usize) -> Result<[u8; N], AttestationError> {
	body.get(offset..offset + N)
		.and_then(|bytes| bytes.try_into().ok())
		.ok_or(AttestationError::InvalidReport)
}
