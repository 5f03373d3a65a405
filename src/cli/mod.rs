use crate::config::CodecConfig;
use crate::tvm::address::Address;
use crate::tvm::boc::{self, BocOptions, decode_base64};
use crate::tvm::cell::Cell;
use crate::utils::method_name_to_id;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

/// toncells CLI
#[derive(Parser, Debug)]
#[command(name = "toncells")]
#[command(about = "TON cells and Bag of Cells toolkit", long_about = None)]
pub struct Cli {
    /// JSON file with encoder flags and decoder limits
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,
    /// Encoding of the BoC argument
    #[arg(short = 'f', long, global = true, value_enum, default_value_t = BocFormat::Auto)]
    pub format: BocFormat,
    #[command(subcommand)]
    pub command: Commands,
}

/// Text encoding of a BoC given on the command line
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BocFormat {
    /// Hex when the input is all hex digits, base64 otherwise
    #[default]
    Auto,
    Hex,
    Base64,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Decode a BoC and print its cell tree
    Decode {
        /// BoC as hex or base64
        boc: String,
    },
    /// Print representation hashes of the BoC roots
    Hash {
        /// BoC as hex or base64
        boc: String,
    },
    /// Re-serialize a BoC
    Encode {
        /// BoC as hex or base64
        boc: String,
        /// Append a CRC32 checksum
        #[arg(long, overrides_with = "no_crc32")]
        crc32: bool,
        /// Omit the CRC32 checksum
        #[arg(long, overrides_with = "crc32")]
        no_crc32: bool,
        /// Write the offset index
        #[arg(long)]
        idx: bool,
        /// Print base64 instead of hex
        #[arg(long)]
        base64: bool,
    },
    /// Convert an address between raw and user-friendly forms
    Address {
        /// Raw (`0:abcd...`) or user-friendly address
        address: String,
        #[arg(long)]
        non_bounceable: bool,
        #[arg(long)]
        testnet: bool,
    },
    /// Compute a get-method id
    MethodId {
        /// Method name
        name: String,
    },
}

/// Decodes hex (optionally with whitespace) or any base64 alphabet
fn parse_boc_bytes(input: &str, format: BocFormat) -> Result<Vec<u8>> {
    let compact = input.split_whitespace().collect::<String>();
    match format {
        BocFormat::Hex => Ok(hex::decode(&compact).context("BoC is not valid hex")?),
        BocFormat::Base64 => decode_base64(&compact).context("BoC is not valid base64"),
        BocFormat::Auto => {
            let looks_hex =
                compact.len() % 2 == 0 && compact.bytes().all(|b| b.is_ascii_hexdigit());
            if looks_hex {
                return Ok(hex::decode(&compact)?);
            }
            decode_base64(&compact).context("BoC is neither hex nor base64")
        }
    }
}

/// Encoder flags from the config, with command line overrides on top
///
/// Cache bits need an index, so they force one.
fn encode_options(config: &BocOptions, crc32: Option<bool>, idx: bool) -> BocOptions {
    BocOptions {
        has_idx: config.has_idx || idx || config.has_cache_bits,
        has_crc32: crc32.unwrap_or(config.has_crc32),
        has_cache_bits: config.has_cache_bits,
    }
}

/// `--crc32` / `--no-crc32`, the last one given wins
fn crc32_flag(crc32: bool, no_crc32: bool) -> Option<bool> {
    match (crc32, no_crc32) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    fn load_config(&self) -> Result<CodecConfig> {
        let Some(path) = &self.config else {
            return Ok(CodecConfig::default());
        };
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = CodecConfig::from_str(&json)
            .with_context(|| format!("invalid config {}", path.display()))?;
        log::debug!("loaded config: {config:?}");
        Ok(config)
    }

    fn decode_roots(&self, input: &str) -> Result<Vec<Arc<Cell>>> {
        let config = self.load_config()?;
        let bytes = parse_boc_bytes(input, self.format)?;

        let start = Instant::now();
        let roots = boc::deserialize_boc_many(&bytes, &config.decode)?;
        log::info!(
            "⏱️  decoded {} bytes in {:.3}s",
            bytes.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(roots)
    }

    /// Execute the command
    pub fn execute(&self) -> Result<()> {
        match &self.command {
            Commands::Decode { boc } => self.execute_decode(boc),
            Commands::Hash { boc } => self.execute_hash(boc),
            Commands::Encode {
                boc,
                crc32,
                no_crc32,
                idx,
                base64,
            } => self.execute_encode(boc, crc32_flag(*crc32, *no_crc32), *idx, *base64),
            Commands::Address {
                address,
                non_bounceable,
                testnet,
            } => self.execute_address(address, !*non_bounceable, *testnet),
            Commands::MethodId { name } => {
                println!("{}", method_name_to_id(name));
                Ok(())
            }
        }
    }

    fn execute_decode(&self, input: &str) -> Result<()> {
        for (i, root) in self.decode_roots(input)?.iter().enumerate() {
            println!("root {i}: {}", root.hash_hex());
            println!("  depth: {}, level: {}", root.depth(), root.level());
            print!("{root}");
        }
        Ok(())
    }

    fn execute_hash(&self, input: &str) -> Result<()> {
        for root in self.decode_roots(input)? {
            println!("{}", root.hash_hex());
        }
        Ok(())
    }

    fn execute_encode(
        &self,
        input: &str,
        crc32: Option<bool>,
        idx: bool,
        base64: bool,
    ) -> Result<()> {
        let config = self.load_config()?;
        let roots = self.decode_roots(input)?;

        let options = encode_options(&config.encode, crc32, idx);
        log::debug!("encoder options: {options:?}");
        let bytes = boc::serialize_boc_many(&roots, &options)?;
        log::info!("encoded {} roots into {} bytes", roots.len(), bytes.len());

        if base64 {
            use ::base64::Engine;
            println!(
                "{}",
                ::base64::engine::general_purpose::STANDARD.encode(&bytes)
            );
        } else {
            println!("{}", hex::encode(&bytes));
        }
        Ok(())
    }

    fn execute_address(&self, input: &str, bounceable: bool, testnet: bool) -> Result<()> {
        let address = Address::from_str(input)?;
        println!("raw:          {}", address.to_hex());
        println!(
            "user-friendly: {}",
            address.to_user_friendly(true, bounceable, testnet)
        );
        println!(
            "standard b64:  {}",
            address.to_user_friendly(false, bounceable, testnet)
        );
        Ok(())
    }
}
