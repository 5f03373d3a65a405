//! TON Address implementation
//!
//! Supports both internal addresses (workchain + hash) and external addresses.

use crate::crc::CRC16;
use crate::tvm::bitstring::BitString;
use crate::tvm::error::AddressError;
use base64::Engine;
use std::fmt;
use std::str::FromStr;

const TAG_BOUNCEABLE: u8 = 0x11;
const TAG_NON_BOUNCEABLE: u8 = 0x51;
const TAG_TEST_ONLY: u8 = 0x80;

/// Length of a decoded user-friendly address
const USER_FRIENDLY_LEN: usize = 36;

/// Represents a TON blockchain address
///
/// Equality and hashing only consider the workchain and the account hash,
/// the flags merely describe how the address is printed.
#[derive(Debug, Clone)]
pub struct Address {
    /// Workchain ID (-1 for masterchain, 0 for basechain)
    pub workchain: i8,
    /// 32-byte hash part of the address
    pub hash_part: [u8; 32],
    /// Whether the address is bounceable
    pub is_bounceable: bool,
    /// Whether this is a test-only address
    pub is_test_only: bool,
}

impl Address {
    /// Serialized size of an `addr_std` without anycast
    pub const BITS: usize = 2 + 1 + 8 + 256;

    /// Creates a new address from workchain and hash part
    pub fn new(workchain: i8, hash_part: [u8; 32]) -> Self {
        Self {
            workchain,
            hash_part,
            is_bounceable: true,
            is_test_only: false,
        }
    }

    /// Parses address from raw format: "workchain:hash"
    pub fn from_hex(address: &str) -> Result<Self, AddressError> {
        let (workchain, hash_hex) = address.split_once(':').ok_or(AddressError::BadFormat)?;

        let workchain = workchain
            .parse::<i8>()
            .map_err(|_| AddressError::InvalidWorkchain)?;

        if hash_hex.len() != 64 {
            return Err(AddressError::InvalidAccountId);
        }

        let mut hash_part = [0u8; 32];
        hex::decode_to_slice(hash_hex, &mut hash_part)
            .map_err(|_| AddressError::InvalidAccountId)?;

        Ok(Self::new(workchain, hash_part))
    }

    /// Parses address from base64 user-friendly format
    ///
    /// Both the url-safe and the standard alphabet are accepted.
    pub fn from_base64(address: &str) -> Result<Self, AddressError> {
        let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(address)
            .or_else(|_| base64::engine::general_purpose::STANDARD.decode(address))
            .map_err(|_| AddressError::BadFormat)?;

        if decoded.len() != USER_FRIENDLY_LEN {
            return Err(AddressError::InvalidLength(decoded.len()));
        }

        // Verify CRC16
        let expected_crc = u16::from_be_bytes([decoded[34], decoded[35]]);
        if CRC16.checksum(&decoded[..34]) != expected_crc {
            return Err(AddressError::InvalidChecksum);
        }

        let mut tag = decoded[0];
        let is_test_only = tag & TAG_TEST_ONLY != 0;
        tag &= !TAG_TEST_ONLY;

        let is_bounceable = match tag {
            TAG_BOUNCEABLE => true,
            TAG_NON_BOUNCEABLE => false,
            _ => return Err(AddressError::InvalidTag(decoded[0])),
        };

        let mut hash_part = [0u8; 32];
        hash_part.copy_from_slice(&decoded[2..34]);

        Ok(Self {
            workchain: decoded[1] as i8,
            hash_part,
            is_bounceable,
            is_test_only,
        })
    }

    /// Converts to raw format (workchain:hash)
    pub fn to_hex(&self) -> String {
        format!("{}:{}", self.workchain, hex::encode(self.hash_part))
    }

    /// Converts to the user-friendly representation with explicit flags
    pub fn to_user_friendly(&self, url_safe: bool, bounceable: bool, test_only: bool) -> String {
        let mut tag = if bounceable {
            TAG_BOUNCEABLE
        } else {
            TAG_NON_BOUNCEABLE
        };
        if test_only {
            tag |= TAG_TEST_ONLY;
        }

        let mut data = Vec::with_capacity(USER_FRIENDLY_LEN);
        data.push(tag);
        data.push(self.workchain as u8);
        data.extend_from_slice(&self.hash_part);

        let crc = CRC16.checksum(&data);
        data.extend_from_slice(&crc.to_be_bytes());

        if url_safe {
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&data)
        } else {
            base64::engine::general_purpose::STANDARD.encode(&data)
        }
    }

    /// Converts to user-friendly base64url format using the address flags
    pub fn to_base64(&self) -> String {
        self.to_user_friendly(true, self.is_bounceable, self.is_test_only)
    }

    /// Sets the bounceable flag
    pub fn set_bounceable(&mut self, bounceable: bool) {
        self.is_bounceable = bounceable;
    }

    /// Sets the test-only flag
    pub fn set_test_only(&mut self, test_only: bool) {
        self.is_test_only = test_only;
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.workchain == other.workchain && self.hash_part == other.hash_part
    }
}

impl Eq for Address {}

impl std::hash::Hash for Address {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.workchain.hash(state);
        self.hash_part.hash(state);
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

/// Parses an address from string (supports both raw and base64 formats)
impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(AddressError::Empty);
        }
        if s.contains(':') {
            Self::from_hex(s)
        } else {
            Self::from_base64(s)
        }
    }
}

/// Represents an external address (`addr_extern`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ExternalAddress {
    bits: BitString,
}

impl ExternalAddress {
    /// Maximum length representable by the 9-bit length prefix
    pub const MAX_BITS: usize = 511;

    /// Creates an external address from a bit string
    pub fn new(bits: BitString) -> Result<Self, AddressError> {
        if bits.len() > Self::MAX_BITS {
            return Err(AddressError::InvalidLength(bits.len()));
        }
        Ok(Self { bits })
    }

    /// Creates an external address from the first `bit_len` bits of `bytes`
    pub fn from_bytes(bytes: &[u8], bit_len: usize) -> Result<Self, AddressError> {
        let bits =
            BitString::from_bytes(bytes, bit_len).map_err(|_| AddressError::InvalidLength(bit_len))?;
        Self::new(bits)
    }

    /// Creates an external address from hex string
    pub fn from_hex(hex: &str) -> Result<Self, AddressError> {
        let bytes = hex::decode(hex).map_err(|_| AddressError::BadFormat)?;
        Self::from_bytes(&bytes, bytes.len() * 8)
    }

    pub fn bits(&self) -> &BitString {
        &self.bits
    }

    pub fn bit_len(&self) -> usize {
        self.bits.len()
    }
}

impl fmt::Display for ExternalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bits.is_empty() {
            f.write_str("ExternalAddress<null>")
        } else {
            write!(f, "ExternalAddress<x{{{}}}>", self.bits.to_hex())
        }
    }
}

/// Any message address (`MsgAddress`) except `addr_var`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum MsgAddress {
    /// `addr_none$00`
    #[default]
    None,
    /// `addr_std$10`
    Std(Address),
    /// `addr_extern$01`
    External(ExternalAddress),
}

impl MsgAddress {
    /// Number of bits this address takes when stored
    pub fn bit_len(&self) -> usize {
        match self {
            Self::None => 2,
            Self::Std(_) => Address::BITS,
            Self::External(ext) => 2 + 9 + ext.bit_len(),
        }
    }

    pub fn as_std(&self) -> Option<&Address> {
        match self {
            Self::Std(addr) => Some(addr),
            _ => None,
        }
    }
}

impl From<Address> for MsgAddress {
    fn from(addr: Address) -> Self {
        Self::Std(addr)
    }
}

impl From<Option<Address>> for MsgAddress {
    fn from(addr: Option<Address>) -> Self {
        addr.map_or(Self::None, Self::Std)
    }
}

impl From<ExternalAddress> for MsgAddress {
    fn from(addr: ExternalAddress) -> Self {
        Self::External(addr)
    }
}
