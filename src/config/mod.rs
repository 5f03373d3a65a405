//! Codec configuration loaded from JSON

use crate::tvm::boc::{BocOptions, DecodeLimits};
use serde::{Deserialize, Serialize};
use std::str::FromStr;


/// Encoder flags and decoder limits used by the command-line tool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    pub encode: BocOptions,
    pub decode: DecodeLimits,
}

impl FromStr for CodecConfig {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s)
    }
}
