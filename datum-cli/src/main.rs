//! `Datum` CLI tool for key management and field encryption.

#![warn(clippy::pedantic, clippy::nursery)]

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use datum::codec::{self, FieldKind, FieldValue};
use datum::config::CryptoConfig;
use datum::field::EncryptedField;
use datum::key::KeyMaterial;
use datum::onboarding::{
    onboard_with_imported_key, onboard_with_password, onboard_with_random_key,
};
use datum::session::{KeySession, KeyState};
use datum_key_file::{default_data_dir, FileKeyStore};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "datum")]
#[command(about = "Datum key management CLI", long_about = None)]
struct Cli {
    /// Directory holding config.json and key documents
    #[arg(long, global = true, env = "DATUM_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Key store namespace (overrides config.json)
    #[arg(long, global = true)]
    namespace: Option<String>,

    /// Increase log verbosity
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Amount,
    Text,
}

impl From<Kind> for FieldKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Amount => Self::Amount,
            Kind::Text => Self::Text,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a random key and print it once
    Keygen,
    /// Install a key printed by `keygen` on another device
    Import,
    /// Derive a key from a new master password
    InitPassword,
    /// Re-derive the key from the master password
    Unlock,
    /// Show the key state
    Status,
    /// Delete the stored key
    Forget {
        /// Skip the confirmation check
        #[arg(long)]
        yes: bool,
    },
    /// Encrypt a value and print the stored field as JSON
    Encrypt {
        /// Kind of value
        #[arg(long, value_enum, default_value = "text")]
        kind: Kind,
        /// Plaintext value
        value: String,
    },
    /// Decrypt a stored field
    Decrypt {
        /// Kind of value
        #[arg(long, value_enum, default_value = "text")]
        kind: Kind,
        /// Base64 ciphertext
        ciphertext: String,
        /// Base64 nonce
        nonce: String,
    },
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn prompt(label: &str) -> Result<String> {
    rpassword::prompt_password(label).context("Failed to read password")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };
    let config_path = data_dir.join("config.json");
    let mut config = CryptoConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    if let Some(namespace) = cli.namespace {
        config.namespace = namespace;
    }
    debug!(data_dir = %data_dir.display(), namespace = %config.namespace, "starting");

    let store = FileKeyStore::new(&data_dir, &config.namespace)?;
    let session = KeySession::open(store)?;

    match cli.command {
        Commands::Keygen => {
            if session.state() != KeyState::NoKey {
                bail!("A key already exists; run `datum forget --yes` first");
            }
            let material = onboard_with_random_key(&session)?;
            println!("{}", material.expose());
            eprintln!("Store this key somewhere safe. It cannot be recovered if lost.");
        }
        Commands::Import => {
            if session.state() != KeyState::NoKey {
                bail!("A key already exists; run `datum forget --yes` first");
            }
            let material = KeyMaterial::new(prompt("Key: ")?);
            onboard_with_imported_key(&session, &material)
                .map_err(|e| anyhow::anyhow!("{}: {e}", e.user_message()))?;
            println!("Key imported to {}", session.store().path().display());
        }
        Commands::InitPassword => {
            if session.state() != KeyState::NoKey {
                bail!("A key already exists; run `datum forget --yes` first");
            }
            let password = prompt("Master password: ")?;
            let confirmation = prompt("Confirm password: ")?;
            onboard_with_password(&session, &password, &confirmation, &config.kdf)?;
            println!("Key derived and saved to {}", session.store().path().display());
        }
        Commands::Unlock => {
            let password = prompt("Master password: ")?;
            session
                .unlock_with_password(&password, &config.kdf)
                .map_err(|e| anyhow::anyhow!("{}: {e}", e.user_message()))?;
            println!("Key unlocked");
        }
        Commands::Status => {
            let state = match session.state() {
                KeyState::NoKey => "no key",
                KeyState::KeyLoaded => "key loaded",
                KeyState::DecryptionError => "key unusable",
            };
            println!("{state} ({})", session.store().path().display());
        }
        Commands::Forget { yes } => {
            if !yes {
                bail!(
                    "Refusing to delete the key without --yes; \
                     data encrypted under it becomes unreadable"
                );
            }
            session.forget()?;
            println!("Key deleted");
        }
        Commands::Encrypt { kind, value } => {
            let key = session.key()?;
            let value = match FieldKind::from(kind) {
                FieldKind::Amount => FieldValue::Amount(value.parse()?),
                FieldKind::Text => FieldValue::Text(value),
            };
            let sealed = config.cipher().encrypt(&codec::encode(&value), &key)?;
            println!("{}", serde_json::to_string_pretty(&EncryptedField::from_sealed(&sealed))?);
        }
        Commands::Decrypt { kind, ciphertext, nonce } => {
            let key = session.key()?;
            let (ciphertext, nonce) = (Some(ciphertext.as_str()), Some(nonce.as_str()));
            let field = EncryptedField::from_columns(ciphertext, nonce, "ciphertext", "nonce")?
                .context("Nothing to decrypt")?;
            let (ciphertext, nonce) = field.decode()?;
            let plaintext = config
                .cipher()
                .decrypt(&ciphertext, &nonce, &key)
                .map_err(|e| anyhow::anyhow!("{}: {e}", e.user_message()))?;
            match codec::decode(&plaintext, kind.into())? {
                FieldValue::Amount(amount) => println!("{amount}"),
                FieldValue::Text(text) => println!("{text}"),
            }
        }
    }

    Ok(())
}
