//! TVM (TON Virtual Machine) data structures and utilities
//!
//! This module provides implementations of fundamental TON blockchain data structures:
//! - Cell: up to 1023 bits and 4 references, with Merkle level aware hashes
//! - CellBuilder / CellSlice: writing and reading cell contents
//! - BoC: Bag of Cells serialization format for encoding cells into byte arrays
//! - Address: TON address handling (internal and external addresses)
//! - Dict: Dictionary (HashMap) implementation for TON
//! - StateInit and VmStack: contract state and get-method stack values

pub mod address;
pub mod bitstring;
pub mod boc;
pub mod builder;
pub mod cell;
pub mod dict;
pub mod error;
pub mod level_mask;
pub mod slice;
pub mod stack;
pub mod state_init;
#[cfg(test)]
mod tests;

pub use address::{Address, ExternalAddress, MsgAddress};
pub use bitstring::BitString;
pub use boc::{
    BocOptions, DecodeLimits, base64_to_boc, boc_to_base64, boc_to_base64_url, boc_to_hex,
    deserialize_boc, deserialize_boc_many, deserialize_boc_with, hex_to_boc, serialize_boc,
    serialize_boc_many,
};
pub use builder::CellBuilder;
pub use cell::{Cell, CellHash, CellKind, ExoticType, MAX_CELL_BITS, MAX_CELL_LEVEL, MAX_CELL_REFS};
pub use dict::{Dict, DictKey};
pub use error::{AddressError, BocError, CellError};
pub use level_mask::LevelMask;
pub use slice::CellSlice;
pub use stack::{StackValue, VmStack};
pub use state_init::{StateInit, TickTock};
