// Anonymous transit ticket node
// Key generation, circuit setup and an end-to-end demo run

use anon_transit_tickets::{
    zkp::{CircuitKeys, ProofWitness},
    CheckInRequest, FieldElement, IssuanceRequest, Issuer, ProofBackend, ProofMode, ProofStatement, RiderSecret,
    ServiceConfig, SystemClock, Ticket, TicketMetadata, TicketService,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::OsRng;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "ticket-node")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a fresh issuer key and print it with its public key
    Keygen,
    /// Generate Groth16 keys for the ticket ownership circuit
    Setup {
        /// Output directory for circuit keys
        #[arg(short, long, default_value = "./keys")]
        keys_dir: PathBuf,
        /// Nullifier salt to bake into the circuit (decimal or 0x hex)
        #[arg(long)]
        salt: Option<String>,
    },
    /// Issue a ticket and run verifications and check-ins against it
    Demo {
        /// JSON service config; defaults to environment variables
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Keygen => keygen(),
        Commands::Setup { keys_dir, salt } => setup(keys_dir, salt).await,
        Commands::Demo { config } => demo(config).await,
    }
}

fn keygen() -> Result<()> {
    let issuer = Issuer::generate(&mut OsRng);
    let public = issuer.public_key();

    println!("TA_PRIVATE_KEY={}", issuer.secret_hex());
    println!("pk_TA.x={}", public.x);
    println!("pk_TA.y={}", public.y);
    Ok(())
}

async fn setup(keys_dir: PathBuf, salt: Option<String>) -> Result<()> {
    let salt = salt
        .map(|raw| raw.parse::<FieldElement>())
        .transpose()
        .context("invalid nullifier salt")?;

    info!("🔐 Generating ticket ownership circuit keys");
    let keys = CircuitKeys::generate(&mut OsRng, salt)?;
    let manifest = keys.save(&keys_dir).await?;

    info!("📜 Verifying key sha256: {}", manifest.verifying_key_sha256);
    Ok(())
}

async fn demo(config_path: Option<PathBuf>) -> Result<()> {
    let config = match config_path {
        Some(path) => ServiceConfig::from_json_file(&path)?,
        None => ServiceConfig::from_env()?,
    };

    let issuer = match Issuer::from_env() {
        Ok(issuer) => issuer,
        Err(err) => {
            warn!("{}; using an ephemeral issuer key", err);
            Issuer::generate(&mut OsRng)
        }
    };

    if config.proof_mode == ProofMode::Groth16 {
        info!("Using Groth16 keys from {:?}", config.circuit_keys_dir);
    }

    let service = TicketService::new(config, issuer, Arc::new(SystemClock)).await?;

    // Rider buys a Bern → Zurich single, second class, leaving now
    let departure = chrono::Utc::now();
    let today = departure.timestamp() - departure.timestamp().rem_euclid(86_400);
    let metadata = TicketMetadata::from_names("Bern", "Zurich", today, "2", "single")?;
    let allocation = service.allocate_ticket(metadata, departure).await?;

    let secret = RiderSecret::generate(&mut OsRng);
    let credentials = service.commitment_scheme().derive(allocation.ticket_id, secret);

    let response = service
        .issue_ticket(IssuanceRequest {
            metadata,
            ticket_id: allocation.ticket_id,
            commitment: credentials.commitment,
        })
        .await?;
    let ticket = Ticket::assemble(&credentials, &allocation, response)?;
    info!("📱 QR payload: {} bytes", ticket.to_qr_payload()?.len());

    let statement = ProofStatement {
        metadata,
        ticket_id: ticket.ticket_id,
        commitment: ticket.commitment,
        nullifier: ticket.nullifier,
    };
    let proof = service
        .proof_backend()
        .prove(&ProofWitness { statement, secret })
        .await?;

    // Same conductor twice, then a second device while the first still holds it
    for context in ["IC-712", "IC-712", "IR-2519"] {
        let result = service.verify(&ticket, Some(&proof), context).await;
        info!("🔎 verify on {}: {}", context, serde_json::to_string(&result)?);
    }

    // Two trains checking in the same ticket at once
    let public_inputs = ticket.public_inputs(service.issuer_key());
    let check_ins = ["IC-712", "IR-2519"].map(|context| {
        service.check_in(CheckInRequest {
            proof: Some(proof.clone()),
            public_inputs,
            context_id: context.to_string(),
            segment: "Bern-Zurich".to_string(),
            timestamp: None,
        })
    });
    for response in futures::future::join_all(check_ins).await {
        info!("🚆 check-in: {}", serde_json::to_string(&response)?);
    }

    info!("📒 Ledger holds {} check-in(s)", service.ledger().len().await);
    Ok(())
}
