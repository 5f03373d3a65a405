//! Bit-addressable buffer backing every cell
//!
//! A [`BitString`] holds up to [`MAX_CELL_BITS`] bits packed MSB-first into
//! bytes. Writes append at the end, reads go through an internal read cursor
//! or through the positional `*_at` accessors which never move it.
//!
//! Bits past the logical length are always zero, so two bit strings with the
//! same content compare equal regardless of how they were built.

use crate::tvm::address::Address;
use crate::tvm::cell::MAX_CELL_BITS;
use crate::tvm::error::{CellError, Result};
use num_bigint::{BigInt, BigUint, Sign};
use std::fmt;

/// Maximum value width of a `Coins` amount
pub const MAX_COINS_BITS: usize = 120;

/// Growable bit buffer limited to [`MAX_CELL_BITS`] bits
#[derive(Clone, Default)]
pub struct BitString {
    data: Vec<u8>,
    len: usize,
    read_pos: usize,
}

impl BitString {
    /// Creates an empty bit string
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bit string from the first `bit_len` bits of `bytes`
    pub fn from_bytes(bytes: &[u8], bit_len: usize) -> Result<Self> {
        if bit_len > MAX_CELL_BITS {
            return Err(CellError::bits_overflow(bit_len, MAX_CELL_BITS));
        }
        if bytes.len() * 8 < bit_len {
            return Err(CellError::bits_underflow(bit_len, bytes.len() * 8));
        }

        let mut data = bytes[..bit_len.div_ceil(8)].to_vec();
        if bit_len % 8 != 0 {
            if let Some(last) = data.last_mut() {
                *last &= 0xffu8 << (8 - bit_len % 8);
            }
        }

        Ok(Self {
            data,
            len: bit_len,
            read_pos: 0,
        })
    }

    /// Parses bytes padded with a completion tag (a `1` bit followed by zeros)
    ///
    /// When `aligned` is set the bytes are taken as is.
    pub fn from_tagged_bytes(bytes: &[u8], aligned: bool) -> Result<Self> {
        if aligned {
            return Self::from_bytes(bytes, bytes.len() * 8);
        }

        let Some(&last) = bytes.last() else {
            return Ok(Self::new());
        };
        if last == 0 {
            return Err(CellError::Encoding("missing completion tag".to_owned()));
        }
        let bit_len = bytes.len() * 8 - last.trailing_zeros() as usize - 1;
        Self::from_bytes(bytes, bit_len)
    }

    /// Returns the number of stored bits
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns how many bits can still be written
    pub fn available(&self) -> usize {
        MAX_CELL_BITS - self.len
    }

    /// Returns the packed bytes (the last byte is zero-padded)
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Returns the packed bytes with the completion tag applied
    pub fn to_tagged_bytes(&self) -> Vec<u8> {
        let mut result = self.data.clone();
        if self.len % 8 != 0 {
            let last_byte_idx = self.len / 8;
            result[last_byte_idx] |= 1 << (7 - self.len % 8);
        }
        result
    }

    fn ensure_capacity(&self, bits: usize) -> Result<()> {
        if bits > self.available() {
            return Err(CellError::bits_overflow(bits, self.available()));
        }
        Ok(())
    }

    fn push_bit_unchecked(&mut self, bit: bool) {
        let byte_idx = self.len / 8;
        if byte_idx >= self.data.len() {
            self.data.push(0);
        }
        if bit {
            self.data[byte_idx] |= 1 << (7 - self.len % 8);
        }
        self.len += 1;
    }

    fn push_uint_unchecked(&mut self, value: u64, bits: usize) {
        for i in (0..bits).rev() {
            self.push_bit_unchecked((value >> i) & 1 == 1);
        }
    }

    /// Appends a single bit
    pub fn write_bit(&mut self, bit: bool) -> Result<&mut Self> {
        self.ensure_capacity(1)?;
        self.push_bit_unchecked(bit);
        Ok(self)
    }

    /// Appends `count` copies of `bit`
    pub fn write_repeated(&mut self, bit: bool, count: usize) -> Result<&mut Self> {
        self.ensure_capacity(count)?;
        for _ in 0..count {
            self.push_bit_unchecked(bit);
        }
        Ok(self)
    }

    /// Appends `bit_len` bits of `src` starting at bit `offset`
    pub fn write_bits_at(&mut self, src: &[u8], offset: usize, bit_len: usize) -> Result<&mut Self> {
        if (offset + bit_len).div_ceil(8) > src.len() {
            return Err(CellError::bits_underflow(
                bit_len,
                (src.len() * 8).saturating_sub(offset),
            ));
        }
        self.ensure_capacity(bit_len)?;

        for i in offset..offset + bit_len {
            let bit = (src[i / 8] >> (7 - i % 8)) & 1 == 1;
            self.push_bit_unchecked(bit);
        }
        Ok(self)
    }

    /// Appends the first `bit_len` bits of `bits`
    pub fn write_bits(&mut self, bits: &[u8], bit_len: usize) -> Result<&mut Self> {
        self.write_bits_at(bits, 0, bit_len)
    }

    /// Appends the whole content of another bit string
    pub fn write_bit_string(&mut self, other: &BitString) -> Result<&mut Self> {
        self.write_bits_at(&other.data, 0, other.len)
    }

    /// Appends whole bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<&mut Self> {
        self.write_bits_at(bytes, 0, bytes.len() * 8)
    }

    /// Appends the utf-8 bytes of a string
    pub fn write_string(&mut self, s: &str) -> Result<&mut Self> {
        self.write_bytes(s.as_bytes())
    }

    /// Appends an unsigned integer using exactly `bits` bits
    pub fn write_uint(&mut self, value: u64, bits: usize) -> Result<&mut Self> {
        if bits < 64 && value >> bits != 0 {
            return Err(CellError::IntOverflow { bits });
        }
        self.ensure_capacity(bits)?;

        if bits > 64 {
            for _ in 0..bits - 64 {
                self.push_bit_unchecked(false);
            }
            self.push_uint_unchecked(value, 64);
        } else {
            self.push_uint_unchecked(value, bits);
        }
        Ok(self)
    }

    /// Appends a signed integer in two's complement using exactly `bits` bits
    pub fn write_int(&mut self, value: i64, bits: usize) -> Result<&mut Self> {
        let fits = match bits {
            0 => value == 0,
            1..=63 => {
                let bound = 1i64 << (bits - 1);
                (-bound..bound).contains(&value)
            }
            _ => true,
        };
        if !fits {
            return Err(CellError::IntOverflow { bits });
        }
        self.ensure_capacity(bits)?;

        if bits > 64 {
            for _ in 0..bits - 64 {
                self.push_bit_unchecked(value < 0);
            }
            self.push_uint_unchecked(value as u64, 64);
        } else {
            self.push_uint_unchecked(value as u64, bits);
        }
        Ok(self)
    }

    /// Appends an unsigned 128-bit integer using exactly `bits` bits
    pub fn write_u128(&mut self, value: u128, bits: usize) -> Result<&mut Self> {
        if bits < 128 && value >> bits != 0 {
            return Err(CellError::IntOverflow { bits });
        }
        self.ensure_capacity(bits)?;

        for i in (0..bits).rev() {
            let bit = i < 128 && (value >> i) & 1 == 1;
            self.push_bit_unchecked(bit);
        }
        Ok(self)
    }

    /// Appends an arbitrary-width unsigned integer
    pub fn write_big_uint(&mut self, value: &BigUint, bits: usize) -> Result<&mut Self> {
        let value_bits = value.bits() as usize;
        if value_bits > bits {
            return Err(CellError::IntOverflow { bits });
        }
        self.ensure_capacity(bits)?;

        for _ in 0..bits - value_bits {
            self.push_bit_unchecked(false);
        }
        for i in (0..value_bits).rev() {
            self.push_bit_unchecked(value.bit(i as u64));
        }
        Ok(self)
    }

    /// Appends an arbitrary-width signed integer in two's complement
    pub fn write_big_int(&mut self, value: &BigInt, bits: usize) -> Result<&mut Self> {
        let magnitude = match value.sign() {
            Sign::Minus => (-value - 1u32).magnitude().bits(),
            _ => value.magnitude().bits(),
        } as usize;
        if bits == 0 && value.sign() != Sign::NoSign || bits > 0 && magnitude > bits - 1 {
            return Err(CellError::IntOverflow { bits });
        }

        let unsigned = match value.sign() {
            Sign::Minus => {
                let modulus = BigInt::from(1u8) << bits;
                (modulus + value).magnitude().clone()
            }
            _ => value.magnitude().clone(),
        };
        self.write_big_uint(&unsigned, bits)
    }

    /// Appends a `Coins` amount (`VarUInteger 16`)
    pub fn write_coins(&mut self, amount: u128) -> Result<&mut Self> {
        let byte_len = (128 - amount.leading_zeros() as usize).div_ceil(8);
        if byte_len * 8 > MAX_COINS_BITS {
            return Err(CellError::IntOverflow {
                bits: MAX_COINS_BITS,
            });
        }
        self.ensure_capacity(4 + byte_len * 8)?;

        self.push_uint_unchecked(byte_len as u64, 4);
        for i in (0..byte_len * 8).rev() {
            self.push_bit_unchecked((amount >> i) & 1 == 1);
        }
        Ok(self)
    }

    /// Appends a `MsgAddressInt` (`addr_std`) or `addr_none`
    pub fn write_address(&mut self, address: Option<&Address>) -> Result<&mut Self> {
        match address {
            None => {
                self.ensure_capacity(2)?;
                self.push_uint_unchecked(0b00, 2);
            }
            Some(addr) => {
                // addr_std$10 anycast:(Maybe Anycast) workchain_id:int8 address:bits256
                self.ensure_capacity(Address::BITS)?;
                self.push_uint_unchecked(0b10, 2);
                self.push_bit_unchecked(false);
                self.push_uint_unchecked(addr.workchain as u8 as u64, 8);
                for &byte in &addr.hash_part {
                    self.push_uint_unchecked(byte as u64, 8);
                }
            }
        }
        Ok(self)
    }

    fn ensure_readable(&self, offset: usize, bits: usize) -> Result<()> {
        let available = self.len.saturating_sub(offset);
        if bits > available {
            return Err(CellError::bits_underflow(bits, available));
        }
        Ok(())
    }

    fn bit_unchecked(&self, offset: usize) -> bool {
        (self.data[offset / 8] >> (7 - offset % 8)) & 1 == 1
    }

    /// Returns the bit at `offset`
    pub fn bit_at(&self, offset: usize) -> Result<bool> {
        self.ensure_readable(offset, 1)?;
        Ok(self.bit_unchecked(offset))
    }

    /// Reads an unsigned integer of up to 64 bits at `offset`
    pub fn uint_at(&self, offset: usize, bits: usize) -> Result<u64> {
        if bits > 64 {
            return Err(CellError::IntOverflow { bits: 64 });
        }
        self.ensure_readable(offset, bits)?;

        let mut result = 0u64;
        for i in offset..offset + bits {
            result = (result << 1) | self.bit_unchecked(i) as u64;
        }
        Ok(result)
    }

    /// Reads an unsigned integer of up to 128 bits at `offset`
    pub fn u128_at(&self, offset: usize, bits: usize) -> Result<u128> {
        if bits > 128 {
            return Err(CellError::IntOverflow { bits: 128 });
        }
        self.ensure_readable(offset, bits)?;

        let mut result = 0u128;
        for i in offset..offset + bits {
            result = (result << 1) | self.bit_unchecked(i) as u128;
        }
        Ok(result)
    }

    /// Reads a two's complement integer of up to 64 bits at `offset`
    pub fn int_at(&self, offset: usize, bits: usize) -> Result<i64> {
        let unsigned = self.uint_at(offset, bits)?;
        if bits == 0 || bits == 64 {
            return Ok(unsigned as i64);
        }
        if unsigned & (1u64 << (bits - 1)) != 0 {
            Ok((unsigned | (!0u64 << bits)) as i64)
        } else {
            Ok(unsigned as i64)
        }
    }

    /// Reads an arbitrary-width unsigned integer at `offset`
    pub fn big_uint_at(&self, offset: usize, bits: usize) -> Result<BigUint> {
        let bytes = self.bytes_at(offset, bits)?;
        let value = BigUint::from_bytes_be(&bytes);
        Ok(value >> (bytes.len() * 8 - bits))
    }

    /// Reads an arbitrary-width two's complement integer at `offset`
    pub fn big_int_at(&self, offset: usize, bits: usize) -> Result<BigInt> {
        let unsigned = BigInt::from(self.big_uint_at(offset, bits)?);
        if bits > 0 && self.bit_unchecked(offset) {
            Ok(unsigned - (BigInt::from(1u8) << bits))
        } else {
            Ok(unsigned)
        }
    }

    /// Copies `bits` bits at `offset` into left-aligned bytes
    pub fn bytes_at(&self, offset: usize, bits: usize) -> Result<Vec<u8>> {
        self.ensure_readable(offset, bits)?;

        let mut result = vec![0u8; bits.div_ceil(8)];
        if offset % 8 == 0 {
            let start = offset / 8;
            result.copy_from_slice(&self.data[start..start + bits.div_ceil(8)]);
            if bits % 8 != 0 {
                if let Some(last) = result.last_mut() {
                    *last &= 0xffu8 << (8 - bits % 8);
                }
            }
            return Ok(result);
        }

        for i in 0..bits {
            if self.bit_unchecked(offset + i) {
                result[i / 8] |= 1 << (7 - i % 8);
            }
        }
        Ok(result)
    }

    /// Copies `bits` bits at `offset` into a new bit string
    pub fn substring(&self, offset: usize, bits: usize) -> Result<BitString> {
        let bytes = self.bytes_at(offset, bits)?;
        Self::from_bytes(&bytes, bits)
    }

    /// Returns `Some(bit)` if all bits in the range are equal to `bit`
    pub fn uniform_at(&self, offset: usize, bits: usize) -> Option<bool> {
        if bits == 0 || self.ensure_readable(offset, bits).is_err() {
            return None;
        }
        let first = self.bit_unchecked(offset);
        (offset + 1..offset + bits)
            .all(|i| self.bit_unchecked(i) == first)
            .then_some(first)
    }

    /// Returns the current read position
    pub fn read_position(&self) -> usize {
        self.read_pos
    }

    /// Returns how many bits are left to read
    pub fn bits_left(&self) -> usize {
        self.len - self.read_pos
    }

    /// Reads a bit and advances the read cursor
    pub fn read_bit(&mut self) -> Result<bool> {
        let bit = self.bit_at(self.read_pos)?;
        self.read_pos += 1;
        Ok(bit)
    }

    /// Reads a bit without advancing the read cursor
    pub fn preload_bit(&self) -> Result<bool> {
        self.bit_at(self.read_pos)
    }

    /// Reads an unsigned integer and advances the read cursor
    pub fn read_uint(&mut self, bits: usize) -> Result<u64> {
        let value = self.uint_at(self.read_pos, bits)?;
        self.read_pos += bits;
        Ok(value)
    }

    /// Reads a signed integer and advances the read cursor
    pub fn read_int(&mut self, bits: usize) -> Result<i64> {
        let value = self.int_at(self.read_pos, bits)?;
        self.read_pos += bits;
        Ok(value)
    }

    /// Advances the read cursor without materializing a value
    pub fn skip_bits(&mut self, bits: usize) -> Result<()> {
        self.ensure_readable(self.read_pos, bits)?;
        self.read_pos += bits;
        Ok(())
    }

    /// Moves the read cursor back to the start
    pub fn reset_read(&mut self) {
        self.read_pos = 0;
    }

    /// Formats the bits as upper-case hex, marking non-nibble-aligned
    /// lengths with a completion tag and a trailing `_`
    pub fn to_hex(&self) -> String {
        if self.len % 4 == 0 {
            let mut hex = hex::encode_upper(&self.data);
            hex.truncate(self.len / 4);
            return hex;
        }

        let mut tagged = self.data.clone();
        let tag_pos = self.len;
        if tag_pos / 8 >= tagged.len() {
            tagged.push(0);
        }
        tagged[tag_pos / 8] |= 1 << (7 - tag_pos % 8);

        let mut hex = hex::encode_upper(&tagged);
        hex.truncate((self.len + 1).div_ceil(4));
        hex.push('_');
        hex
    }
}

impl PartialEq for BitString {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.data == other.data
    }
}

impl Eq for BitString {}

impl std::hash::Hash for BitString {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.len.hash(state);
        self.data.hash(state);
    }
}

impl fmt::Debug for BitString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BitString({}, x{{{}}})", self.len, self.to_hex())
    }
}

impl fmt::Display for BitString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in 0..self.len {
            f.write_str(if self.bit_unchecked(i) { "1" } else { "0" })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_uint() {
        let mut bits = BitString::new();
        bits.write_uint(0b101, 3).unwrap();
        bits.write_uint(0xABCD, 16).unwrap();
        assert_eq!(bits.len(), 19);

        assert_eq!(bits.read_uint(3).unwrap(), 0b101);
        assert_eq!(bits.read_uint(16).unwrap(), 0xABCD);
        assert_eq!(bits.bits_left(), 0);
        assert!(bits.read_bit().is_err());
    }

    #[test]
    fn test_write_int_negative() {
        let mut bits = BitString::new();
        bits.write_int(-1, 8).unwrap();
        bits.write_int(-100, 32).unwrap();
        assert_eq!(bits.as_bytes()[0], 0xFF);

        assert_eq!(bits.read_int(8).unwrap(), -1);
        assert_eq!(bits.read_int(32).unwrap(), -100);
    }

    #[test]
    fn test_int_overflow() {
        let mut bits = BitString::new();
        assert_eq!(
            bits.write_uint(8, 3).unwrap_err(),
            CellError::IntOverflow { bits: 3 }
        );
        assert!(bits.write_int(128, 8).is_err());
        assert!(bits.write_int(-129, 8).is_err());
        assert!(bits.write_int(-128, 8).is_ok());
    }

    #[test]
    fn test_capacity_is_atomic() {
        let mut bits = BitString::new();
        bits.write_repeated(true, 1020).unwrap();

        let err = bits.write_uint(0, 4).unwrap_err();
        assert_eq!(
            err,
            CellError::CapacityExceeded {
                what: crate::tvm::error::Resource::Bits,
                requested: 4,
                available: 3,
            }
        );
        assert_eq!(bits.len(), 1020);

        bits.write_uint(0, 3).unwrap();
        assert_eq!(bits.len(), MAX_CELL_BITS);
        assert!(bits.write_bit(true).is_err());
    }

    #[test]
    fn test_coins() {
        let mut bits = BitString::new();
        bits.write_coins(0).unwrap();
        assert_eq!(bits.len(), 4);

        let mut bits = BitString::new();
        bits.write_coins(1_000_000_000).unwrap();
        // 0x3B9ACA00 takes 4 bytes
        assert_eq!(bits.len(), 4 + 32);
        assert_eq!(bits.uint_at(0, 4).unwrap(), 4);
        assert_eq!(bits.uint_at(4, 32).unwrap(), 1_000_000_000);

        let mut bits = BitString::new();
        assert!(bits.write_coins(1u128 << 120).is_err());
        assert!(bits.is_empty());
        bits.write_coins((1u128 << 120) - 1).unwrap();
        assert_eq!(bits.len(), 4 + 120);
    }

    #[test]
    fn test_preload_and_skip() {
        let mut bits = BitString::new();
        bits.write_bits(&[0b1010_0000], 4).unwrap();

        assert!(bits.preload_bit().unwrap());
        assert!(bits.preload_bit().unwrap());
        bits.skip_bits(1).unwrap();
        assert!(!bits.read_bit().unwrap());
        assert!(bits.skip_bits(3).is_err());
        assert_eq!(bits.read_position(), 2);
    }

    #[test]
    fn test_unaligned_bits() {
        let mut bits = BitString::new();
        bits.write_bit(true).unwrap();
        bits.write_bytes(&[0xFF, 0x00]).unwrap();
        assert_eq!(bits.as_bytes(), &[0xFF, 0x80, 0x00]);
        assert_eq!(bits.bytes_at(1, 16).unwrap(), vec![0xFF, 0x00]);

        let sub = bits.substring(1, 8).unwrap();
        assert_eq!(sub.as_bytes(), &[0xFF]);
    }

    #[test]
    fn test_tagged_bytes() {
        let mut bits = BitString::new();
        bits.write_uint(0b0010101, 7).unwrap();
        let tagged = bits.to_tagged_bytes();
        assert_eq!(tagged, vec![0b0010_1011]);

        let parsed = BitString::from_tagged_bytes(&tagged, false).unwrap();
        assert_eq!(parsed, bits);
        assert!(BitString::from_tagged_bytes(&[0x00], false).is_err());
    }

    #[test]
    fn test_big_ints() {
        let mut bits = BitString::new();
        let big = BigUint::from(u128::MAX) * 3u32;
        bits.write_big_uint(&big, 200).unwrap();
        let negative = BigInt::from(-12345678901234567890i128);
        bits.write_big_int(&negative, 257).unwrap();
        assert_eq!(bits.len(), 457);

        assert_eq!(bits.big_uint_at(0, 200).unwrap(), big);
        assert_eq!(bits.big_int_at(200, 257).unwrap(), negative);

        let mut small = BitString::new();
        assert!(small.write_big_int(&BigInt::from(128), 8).is_err());
        assert!(small.write_big_int(&BigInt::from(-128), 8).is_ok());
        assert_eq!(small.int_at(0, 8).unwrap(), -128);
    }

    #[test]
    fn test_hex_format() {
        let mut bits = BitString::new();
        bits.write_uint(0x2A, 8).unwrap();
        assert_eq!(bits.to_hex(), "2A");

        let mut bits = BitString::new();
        bits.write_uint(0b100, 3).unwrap();
        // 100 + tag 1 -> 1001
        assert_eq!(bits.to_hex(), "9_");

        assert_eq!(BitString::new().to_hex(), "");
    }

    #[test]
    fn test_equality_ignores_cursor() {
        let mut a = BitString::new();
        a.write_uint(5, 8).unwrap();
        let mut b = a.clone();
        b.read_uint(4).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.uniform_at(0, 5), Some(false));
        assert_eq!(a.uniform_at(0, 6), None);
    }
}
