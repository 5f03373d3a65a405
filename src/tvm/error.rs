//! Error types for cell, BoC and address handling

use std::fmt;
use thiserror::Error;

/// Result alias used across the `tvm` module
pub type Result<T, E = CellError> = std::result::Result<T, E>;

/// Which capacity a cell operation ran out of
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Bits,
    Refs,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bits => f.write_str("bits"),
            Self::Refs => f.write_str("refs"),
        }
    }
}

/// Error type for cell related operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CellError {
    /// A builder write would exceed 1023 bits or 4 refs
    #[error("cell overflow: cannot store {requested} {what}, only {available} left")]
    CapacityExceeded {
        what: Resource,
        requested: usize,
        available: usize,
    },
    /// A read requested more bits or refs than remain
    #[error("cell underflow: cannot read {requested} {what}, only {available} left")]
    OutOfRange {
        what: Resource,
        requested: usize,
        available: usize,
    },
    #[error("malformed BoC: {0}")]
    MalformedBoc(#[from] BocError),
    /// Trie label encoding is inconsistent with the declared key width
    #[error("invalid dictionary label: {0}")]
    InvalidDictionaryLabel(&'static str),
    #[error("invalid dictionary: {0}")]
    InvalidDictionary(&'static str),
    #[error("invalid exotic cell: {0}")]
    InvalidExoticCell(&'static str),
    #[error("cell depth overflow")]
    DepthOverflow,
    #[error("value does not fit into {bits} bits")]
    IntOverflow { bits: usize },
    #[error("invalid tag")]
    InvalidTag,
    #[error("invalid utf-8 data")]
    InvalidUtf8,
    #[error("trailing data: {bits} bits and {refs} refs were not consumed")]
    TrailingData { bits: usize, refs: usize },
    #[error("unexpected stack value: {0}")]
    UnexpectedStackValue(&'static str),
    #[error("invalid encoding: {0}")]
    Encoding(String),
    #[error(transparent)]
    Address(#[from] AddressError),
}

impl CellError {
    pub(crate) fn bits_overflow(requested: usize, available: usize) -> Self {
        Self::CapacityExceeded {
            what: Resource::Bits,
            requested,
            available,
        }
    }

    pub(crate) fn refs_overflow(requested: usize, available: usize) -> Self {
        Self::CapacityExceeded {
            what: Resource::Refs,
            requested,
            available,
        }
    }

    pub(crate) fn bits_underflow(requested: usize, available: usize) -> Self {
        Self::OutOfRange {
            what: Resource::Bits,
            requested,
            available,
        }
    }

    pub(crate) fn refs_underflow(requested: usize, available: usize) -> Self {
        Self::OutOfRange {
            what: Resource::Refs,
            requested,
            available,
        }
    }
}

impl From<base64::DecodeError> for CellError {
    fn from(e: base64::DecodeError) -> Self {
        Self::Encoding(format!("base64: {e}"))
    }
}

impl From<hex::FromHexError> for CellError {
    fn from(e: hex::FromHexError) -> Self {
        Self::Encoding(format!("hex: {e}"))
    }
}

/// Reasons a BoC byte string is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BocError {
    #[error("unknown magic 0x{0:08x}")]
    UnknownMagic(u32),
    #[error("unexpected end of data")]
    UnexpectedEof,
    #[error("invalid ref size {0}")]
    InvalidRefSize(u8),
    #[error("invalid offset size {0}")]
    InvalidOffsetSize(u8),
    #[error("reserved flag bits are set")]
    ReservedFlags,
    #[error("cache bits require an index")]
    CacheBitsWithoutIndex,
    #[error("too many cells: {count} (limit {limit})")]
    TooManyCells { count: usize, limit: usize },
    #[error("invalid root count {count} (limit {limit})")]
    InvalidRootCount { count: usize, limit: usize },
    #[error("absent cells are not supported")]
    AbsentCellsNotSupported,
    #[error("invalid total cells size {0}")]
    InvalidTotalSize(u64),
    #[error("root index {0} is out of bounds")]
    RootOutOfBounds(usize),
    #[error("cell {cell} references invalid index {child}")]
    InvalidRef { cell: usize, child: usize },
    #[error("invalid cell {index}: {reason}")]
    InvalidCell { index: usize, reason: &'static str },
    #[error("checksum mismatch: stored 0x{stored:08x}, computed 0x{computed:08x}")]
    InvalidChecksum { stored: u32, computed: u32 },
    #[error("{0} unexpected trailing bytes")]
    TrailingBytes(usize),
    #[error("too many cells to serialize")]
    TooLarge,
    #[error("reference to a cell missing from the cell table")]
    MissingReference,
}

/// Error type for address parsing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("cannot parse address from an empty string")]
    Empty,
    #[error("invalid workchain id")]
    InvalidWorkchain,
    #[error("invalid account id")]
    InvalidAccountId,
    #[error("invalid address length {0}")]
    InvalidLength(usize),
    #[error("invalid address tag 0x{0:02x}")]
    InvalidTag(u8),
    #[error("address checksum mismatch")]
    InvalidChecksum,
    #[error("invalid address format")]
    BadFormat,
    #[error("unsupported address kind")]
    Unsupported,
}
