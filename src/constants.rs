pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Associated data of every sealed blob is derived from this tag.
pub const APP_VERSION: &str = "sgx-oracle-v1r1";

// ---------- KEYS
pub const SIGNATURE_PUBLIC_KEY_SIZE: usize = 32;
pub const SIGNATURE_PRIVATE_KEY_SIZE: usize = 64;
pub const SIGNATURE_SIZE: usize = 64;
pub const BOX_PUBLIC_KEY_SIZE: usize = 32;
pub const BOX_PRIVATE_KEY_SIZE: usize = 32;
pub const BOX_NONCE_SIZE: usize = 24;

// ---------- MOUNT LAYOUT
pub const DEFAULT_MOUNT_PATH: &str = "mount";
pub const SIGNATURE_PUBLIC_KEY_FILE: &str = "signature_key.pub";
pub const SIGNATURE_PRIVATE_KEY_FILE: &str = "signature_key.priv.enc";
pub const SIGNATURE_SEALED_DATE_FILE: &str = "signature_created.enc";
pub const BOX_PUBLIC_KEY_FILE: &str = "box_key.pub";
pub const BOX_PRIVATE_KEY_FILE: &str = "box_key.priv.enc";
pub const BOX_SEALED_DATE_FILE: &str = "box_created.enc";
pub const PUBLIC_KEYS_REPORT_FILE: &str = "report_keys.pub";
pub const SIGNATURE_REQUEST_FILE: &str = "report_signature_request.pub";
pub const SIGNATURE_EXPORT_FILE: &str = "report_signature.enc";
pub const SIGNATURE_IMPORT_FILE: &str = "report_signature.enc";
pub const RESPONSE_FILE: &str = "response.json";

// ----------- ATTESTATION
pub const ATTESTATION_DEV_PATH: &str = "/dev/attestation";
pub const USER_REPORT_DATA_PATH: &str = "/dev/attestation/user_report_data";
pub const ATTESTATION_TYPE_PATH: &str = "/dev/attestation/attestation_type";
pub const QUOTE_PATH: &str = "/dev/attestation/quote";
pub const MRENCLAVE_SEAL_KEY_PATH: &str = "/dev/attestation/keys/_sgx_mrenclave";
pub const MAX_REPORT_DATA_SIZE: usize = 64;
pub const ATTESTATION_TIMEOUT_SECS: u64 = 30;
// Hex ed25519 key of the quote verification authority, part of the measured binary.
pub const ATTESTATION_AUTHORITY_KEY: Option<&str> = option_env!("SGX_ORACLE_ATTESTATION_AUTHORITY");

// ----------- SGX QUOTE (v3, DCAP)
pub const QUOTE_HEADER_SIZE: usize = 48;
pub const REPORT_BODY_SIZE: usize = 384;
pub const REPORT_ATTRIBUTES_OFFSET: usize = 48;
pub const REPORT_MRENCLAVE_OFFSET: usize = 64;
pub const REPORT_MRSIGNER_OFFSET: usize = 128;
pub const REPORT_ISVPRODID_OFFSET: usize = 256;
pub const REPORT_ISVSVN_OFFSET: usize = 258;
pub const REPORT_DATA_OFFSET: usize = 320;
pub const SGX_FLAGS_DEBUG: u64 = 0x02;

// ----------- MIGRATION
pub const PRIVATE_KEYS_REPORT_FORMAT: u8 = 1;
