//! CLI argument definitions for the Vouch binary.

use clap::{Parser, Subcommand, ValueEnum};
use vouch::auth::{Digest, SignatureScheme};
use vouch::constants::SCHEMA_VERSION;
use vouch::validator::OnChainId;

/// Signature scheme for generated keys
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Scheme {
    /// secp256k1 ECDSA with recoverable signatures (default)
    Secp256k1,
    /// Ed25519
    Ed25519,
}

impl From<Scheme> for SignatureScheme {
    fn from(scheme: Scheme) -> Self {
        match scheme {
            Scheme::Secp256k1 => SignatureScheme::Secp256k1,
            Scheme::Ed25519 => SignatureScheme::Ed25519,
        }
    }
}

/// Vouch authorization toolkit
#[derive(Parser, Debug)]
#[command(name = "vouch")]
#[command(about = "Vouch: inspect authorization state, verify signatures and generate keys")]
#[command(version)]
pub struct Cli {
    /// Emit JSON instead of human-readable output
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a signing key
    Keygen(KeygenArgs),
    /// Decode and describe a serialized authorization state
    Inspect(InspectArgs),
    /// Check a signature against the validator in an authorization state
    Verify(VerifyArgs),
    /// Compute the prefixed message digest of a text message
    HashMessage(HashMessageArgs),
}

/// Arguments for the keygen command
#[derive(clap::Args, Debug)]
pub struct KeygenArgs {
    /// Signature scheme of the new key
    #[arg(short, long, default_value = "secp256k1")]
    pub scheme: Scheme,
}

/// How serialized state is decoded
#[derive(clap::Args, Debug)]
pub struct DecodeArgs {
    /// Schema version to accept
    #[arg(long, default_value_t = SCHEMA_VERSION, env = "VOUCH_SCHEMA_VERSION")]
    pub schema_version: u8,

    /// Reject states not owned by this validator identifier
    #[arg(long, env = "VOUCH_EXPECTED_OWNER")]
    pub expected_owner: Option<OnChainId>,
}

/// Arguments for the inspect command
#[derive(clap::Args, Debug)]
pub struct InspectArgs {
    /// Base64-encoded authorization state
    pub state: String,

    #[command(flatten)]
    pub decode: DecodeArgs,
}

/// Arguments for the verify command
#[derive(clap::Args, Debug)]
pub struct VerifyArgs {
    /// Base64-encoded authorization state
    #[arg(long)]
    pub state: String,

    /// 32-byte digest, hex
    #[arg(long)]
    pub digest: Digest,

    /// Signature bytes, hex
    #[arg(long)]
    pub signature: String,

    #[command(flatten)]
    pub decode: DecodeArgs,
}

/// Arguments for the hash-message command
#[derive(clap::Args, Debug)]
pub struct HashMessageArgs {
    /// Message text
    pub message: String,
}
