use clap::{Parser, Subcommand};
use rsa::traits::PublicKeyParts;
use std::path::PathBuf;

use request_shield::config::load_config;
use request_shield::signing::{generate_key_pair, KeyPair};

#[derive(Parser)]
#[command(name = "shield-cli")]
#[command(about = "Key management for request-shield record signing", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a PKCS#8 key pair
    Keygen {
        #[arg(long, default_value_t = 4096)]
        bits: usize,

        #[arg(long)]
        private_out: PathBuf,

        #[arg(long)]
        public_out: Option<PathBuf>,
    },
    /// Load the signing keys a configuration points at and check they pair up
    CheckKeys {
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Keygen {
            bits,
            private_out,
            public_out,
        } => {
            if private_out.exists() {
                return Err(format!("refusing to overwrite {}", private_out.display()).into());
            }
            let pair = generate_key_pair(bits)?;
            pair.write_to(&private_out, public_out.as_deref())?;
            println!("Private key written to {}", private_out.display());
            match public_out {
                Some(path) => println!("Public key written to {}", path.display()),
                None => print!("{}", pair.public_key_pem()?),
            }
        }
        Commands::CheckKeys { config } => {
            let config = load_config(&config)?;
            let pair = KeyPair::load(&config.signature)?;
            println!("Key source: {:?}", pair.source());
            println!("Modulus: {} bits", pair.public_key().size() * 8);
            println!("Hash: {:?}", config.signature.hash);
            println!("Tables: {}", config.signature.allowed_tables.join(", "));
        }
    }

    Ok(())
}
