use std::{fs, path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

mod attestation;
mod config;
mod constants;
mod error;
mod keys;
mod replication;
mod sign;

use crate::{
	attestation::{
		ra::GraminePlatform,
		simulated::SimulatedPlatform,
		verifier::{decode_report, verify_identity_report},
		EnclavePlatform,
	},
	config::AppConfig,
	constants::{DEFAULT_MOUNT_PATH, VERSION},
	replication::upgrade::KeyMigration,
	sign::response::EnclaveResponse,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
	/// Directory holding the sealed keys and the exchanged reports
	#[arg(long, env = "SGX_ORACLE_MOUNT", default_value = DEFAULT_MOUNT_PATH)]
	mount: PathBuf,

	/// Sealing and attestation backend
	#[arg(long, value_enum, env = "SGX_ORACLE_PLATFORM", default_value_t = PlatformKind::Gramine)]
	platform: PlatformKind,

	/// Quote verification service, required to verify reports on gramine. Its verdicts must
	/// be signed by the authority key set at build time
	#[arg(long, env = "SGX_ORACLE_ATTESTATION_URL")]
	attestation_url: Option<String>,

	/// Root of the simulated vendor and machine keys
	#[arg(long, env = "SGX_ORACLE_SIMULATION_SEED", default_value = "sgx-oracle-dev")]
	simulation_seed: String,

	#[arg(long, env = "SENTRY_DSN")]
	sentry_dsn: Option<String>,

	#[command(subcommand)]
	command: Command,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum PlatformKind {
	Gramine,
	Simulation,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Publish the attested public keys of this instance
	ReportKey,
	/// Ask a running instance for its signature key
	RequestKey,
	/// Send the signature key to the instance that wrote the request
	ExportKey,
	/// Replace the signature key with the one received from another instance
	ImportKey,
	/// Print the public keys of this instance
	PublicKeys,
	/// Sign a payload with the signature key
	SignPayload {
		#[arg(long)]
		input: PathBuf,
	},
	/// Check a published identity report
	VerifyReport {
		#[arg(long)]
		report: PathBuf,
		/// Hex encoded enclave measurement
		#[arg(long)]
		measurement: String,
		/// Base64 encoded signature public key
		#[arg(long)]
		public_key: String,
	},
}

impl Command {
	fn name(&self) -> &'static str {
		match self {
			Command::ReportKey => "report-key",
			Command::RequestKey => "request-key",
			Command::ExportKey => "export-key",
			Command::ImportKey => "import-key",
			Command::PublicKeys => "public-keys",
			Command::SignPayload { .. } => "sign-payload",
			Command::VerifyReport { .. } => "verify-report",
		}
	}
}

/* MAIN */

fn main() -> ExitCode {
	let cli = Cli::parse();

	let _sentry = cli.sentry_dsn.as_deref().map(|dsn| {
		sentry::init((
			dsn,
			sentry::ClientOptions { release: sentry::release_name!(), ..Default::default() },
		))
	});

	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	let logger = Registry::default()
		.with(filter)
		.with(fmt::Layer::default())
		.with(sentry::integrations::tracing::layer());
	if let Err(err) = tracing::subscriber::set_global_default(logger) {
		eprintln!("unable to install logger : {err}");
	}

	let command = cli.command.name();
	info!("SGX ORACLE {} : {}", VERSION, command);

	match run(&cli) {
		Ok(()) => ExitCode::SUCCESS,
		Err(err) => {
			error!("{} : {:#}", command, err);
			sentry::with_scope(
				|scope| scope.set_tag("command", command),
				|| sentry::integrations::anyhow::capture_anyhow(&err),
			);
			ExitCode::FAILURE
		},
	}
}

fn platform(cli: &Cli) -> Result<Arc<dyn EnclavePlatform>> {
	match cli.platform {
		PlatformKind::Gramine => {
			if cli.attestation_url.is_none() {
				warn!("PLATFORM : no attestation service, reports can not be verified");
			}
			Ok(Arc::new(GraminePlatform::new(cli.attestation_url.clone())))
		},
		PlatformKind::Simulation => {
			let platform = SimulatedPlatform::from_current_binary(&cli.simulation_seed)
				.context("initializing simulated platform")?;
			info!("PLATFORM : simulated enclave {}", hex::encode(&platform.identity().unique_id));
			Ok(Arc::new(platform))
		},
	}
}

fn run(cli: &Cli) -> Result<()> {
	let platform = platform(cli)?;

	match &cli.command {
		Command::ReportKey => {
			let migration = key_migration(cli, platform)?;
			migration.publish_identity().context("publishing identity report")?;
			info!("REPORT KEY : written to {}", migration.config().reports.public_keys_path.display());
		},

		Command::RequestKey => {
			let migration = key_migration(cli, platform)?;
			migration.request_migration().context("creating key request")?;
			info!(
				"REQUEST KEY : written to {}",
				migration.config().reports.signature_request_path.display()
			);
		},

		Command::ExportKey => {
			let migration = key_migration(cli, platform)?;
			migration.export_signature_key().context("exporting signature key")?;
			info!(
				"EXPORT KEY : written to {}",
				migration.config().reports.signature_export_path.display()
			);
		},

		Command::ImportKey => {
			key_migration(cli, platform)?
				.import_signature_key()
				.context("importing signature key")?;
			info!("IMPORT KEY : signature key imported");
		},

		Command::PublicKeys => {
			let migration = key_migration(cli, platform)?;
			let signature = migration.signature_manager().context("loading signature key")?;
			let encryption = migration.encryption_manager().context("loading encryption key")?;
			println!("signature  : {}", STANDARD.encode(signature.public_key()));
			println!("encryption : {}", STANDARD.encode(encryption.public_key()));
		},

		Command::SignPayload { input } => {
			let payload =
				fs::read(input).with_context(|| format!("reading payload {}", input.display()))?;
			let migration = key_migration(cli, platform)?;
			let signer = migration.signature_manager().context("loading signature key")?;

			let response = EnclaveResponse::new(&payload, &signer).context("signing payload")?;
			let response_path = &migration.config().response_path;
			response.save(response_path).context("saving response")?;
			debug!("SIGN PAYLOAD : {} bytes signed", payload.len());
			info!("SIGN PAYLOAD : written to {}", response_path.display());
		},

		Command::VerifyReport { report, measurement, public_key } => {
			let report = fs::read(report)
				.with_context(|| format!("reading report {}", report.display()))?;
			let public_key =
				STANDARD.decode(public_key.trim()).context("public key is not base64")?;

			let verified = verify_identity_report(
				platform.as_ref(),
				&decode_report(&report).context("decoding report")?,
				measurement,
				&public_key,
			)
			.context("verifying identity report")?;
			println!("report verified : enclave {}", hex::encode(&verified.unique_id));
		},
	}

	Ok(())
}

/// Key migration over the keys sealed in the mount directory.
fn key_migration(cli: &Cli, platform: Arc<dyn EnclavePlatform>) -> Result<KeyMigration> {
	fs::create_dir_all(&cli.mount)
		.with_context(|| format!("creating mount directory {}", cli.mount.display()))?;
	Ok(KeyMigration::new(platform, AppConfig::from_mount(&cli.mount)))
}
