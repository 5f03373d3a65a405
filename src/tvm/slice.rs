//! Slice implementation for reading data from cells
//!
//! A [`CellSlice`] reads data from a cell sequentially, tracking the current
//! position in both bits and references. Slices share the underlying cell,
//! so any number of them can read the same cell independently.
//!
//! `load_*` methods advance the cursor, `preload_*` methods leave it where
//! it is. A failed load never moves the cursor.

use crate::tvm::address::{Address, ExternalAddress, MsgAddress};
use crate::tvm::bitstring::BitString;
use crate::tvm::boc::DecodeLimits;
use crate::tvm::builder::CellBuilder;
use crate::tvm::cell::Cell;
use crate::tvm::dict::Dict;
use crate::tvm::error::{AddressError, CellError, Result};
use num_bigint::{BigInt, BigUint};
use std::sync::Arc;

/// A slice for reading data from a cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellSlice {
    /// The cell being read
    cell: Arc<Cell>,
    /// Current bit position in the cell
    bit_pos: usize,
    /// Current reference position
    ref_pos: usize,
}

impl CellSlice {
    /// Creates a new slice from a cell
    pub fn new(cell: Arc<Cell>) -> Self {
        Self {
            cell,
            bit_pos: 0,
            ref_pos: 0,
        }
    }

    /// Starts reading a cell from the beginning
    pub fn begin_parse(cell: &Arc<Cell>) -> Self {
        Self::new(cell.clone())
    }

    /// Returns the number of remaining bits
    pub fn bits_left(&self) -> usize {
        self.cell.bit_len() - self.bit_pos
    }

    /// Returns the number of remaining references
    pub fn refs_left(&self) -> usize {
        self.cell.reference_count() - self.ref_pos
    }

    /// Returns the references which have not been loaded yet
    pub fn remaining_refs(&self) -> &[Arc<Cell>] {
        &self.cell.references()[self.ref_pos..]
    }

    /// Checks if there are any remaining bits or references
    pub fn is_empty(&self) -> bool {
        self.bits_left() == 0 && self.refs_left() == 0
    }

    /// Gets the underlying cell
    pub fn cell(&self) -> &Arc<Cell> {
        &self.cell
    }

    /// Gets the current bit position
    pub fn bit_position(&self) -> usize {
        self.bit_pos
    }

    /// Gets the current reference position
    pub fn ref_position(&self) -> usize {
        self.ref_pos
    }

    /// Resets the slice to the beginning
    pub fn reset(&mut self) {
        self.bit_pos = 0;
        self.ref_pos = 0;
    }

    fn bits(&self) -> &BitString {
        self.cell.bits()
    }

    /// Runs a composite read on a copy of the cursor and commits it only on
    /// success
    fn atomically<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let mut copy = self.clone();
        let value = f(&mut copy)?;
        self.bit_pos = copy.bit_pos;
        self.ref_pos = copy.ref_pos;
        Ok(value)
    }

    /// Skips a number of bits
    pub fn skip_bits(&mut self, n: usize) -> Result<()> {
        if n > self.bits_left() {
            return Err(CellError::bits_underflow(n, self.bits_left()));
        }
        self.bit_pos += n;
        Ok(())
    }

    /// Skips a number of references
    pub fn skip_refs(&mut self, n: usize) -> Result<()> {
        if n > self.refs_left() {
            return Err(CellError::refs_underflow(n, self.refs_left()));
        }
        self.ref_pos += n;
        Ok(())
    }

    /// Preloads a single bit
    pub fn preload_bit(&self) -> Result<bool> {
        self.bits().bit_at(self.bit_pos)
    }

    /// Loads a single bit
    pub fn load_bit(&mut self) -> Result<bool> {
        let bit = self.preload_bit()?;
        self.bit_pos += 1;
        Ok(bit)
    }

    /// Loads a boolean value stored as a single bit
    pub fn load_bool(&mut self) -> Result<bool> {
        self.load_bit()
    }

    /// Preloads `n` bits into left-aligned bytes
    pub fn preload_bits(&self, n: usize) -> Result<Vec<u8>> {
        self.bits().bytes_at(self.bit_pos, n)
    }

    /// Loads multiple bits into a byte vector
    pub fn load_bits(&mut self, n: usize) -> Result<Vec<u8>> {
        let bits = self.preload_bits(n)?;
        self.bit_pos += n;
        Ok(bits)
    }

    /// Loads `n` bits as a bit string
    pub fn load_bit_string(&mut self, n: usize) -> Result<BitString> {
        let bits = self.bits().substring(self.bit_pos, n)?;
        self.bit_pos += n;
        Ok(bits)
    }

    /// Preloads whole bytes
    pub fn preload_bytes(&self, n: usize) -> Result<Vec<u8>> {
        self.preload_bits(n * 8)
    }

    /// Loads multiple bytes
    pub fn load_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        self.load_bits(n * 8)
    }

    /// Preloads an unsigned integer of up to 64 bits
    pub fn preload_uint(&self, bits: usize) -> Result<u64> {
        self.bits().uint_at(self.bit_pos, bits)
    }

    /// Loads an unsigned integer with a specific number of bits
    pub fn load_uint(&mut self, bits: usize) -> Result<u64> {
        let value = self.preload_uint(bits)?;
        self.bit_pos += bits;
        Ok(value)
    }

    /// Preloads a signed integer of up to 64 bits
    pub fn preload_int(&self, bits: usize) -> Result<i64> {
        self.bits().int_at(self.bit_pos, bits)
    }

    /// Loads a signed integer with a specific number of bits
    pub fn load_int(&mut self, bits: usize) -> Result<i64> {
        let value = self.preload_int(bits)?;
        self.bit_pos += bits;
        Ok(value)
    }

    /// Loads a byte (8 bits)
    pub fn load_u8(&mut self) -> Result<u8> {
        Ok(self.load_uint(8)? as u8)
    }

    /// Loads a u16 value (16 bits, big-endian)
    pub fn load_u16(&mut self) -> Result<u16> {
        Ok(self.load_uint(16)? as u16)
    }

    /// Loads a u32 value (32 bits, big-endian)
    pub fn load_u32(&mut self) -> Result<u32> {
        Ok(self.load_uint(32)? as u32)
    }

    /// Loads a u64 value (64 bits, big-endian)
    pub fn load_u64(&mut self) -> Result<u64> {
        self.load_uint(64)
    }

    /// Preloads an arbitrary-width unsigned integer
    pub fn preload_big_uint(&self, bits: usize) -> Result<BigUint> {
        self.bits().big_uint_at(self.bit_pos, bits)
    }

    /// Loads an arbitrary-width unsigned integer (e.g. `uint256`)
    pub fn load_big_uint(&mut self, bits: usize) -> Result<BigUint> {
        let value = self.preload_big_uint(bits)?;
        self.bit_pos += bits;
        Ok(value)
    }

    /// Preloads an arbitrary-width signed integer
    pub fn preload_big_int(&self, bits: usize) -> Result<BigInt> {
        self.bits().big_int_at(self.bit_pos, bits)
    }

    /// Loads an arbitrary-width signed integer (e.g. `int257`)
    pub fn load_big_int(&mut self, bits: usize) -> Result<BigInt> {
        let value = self.preload_big_int(bits)?;
        self.bit_pos += bits;
        Ok(value)
    }

    /// Preloads a reference relative to the current reference position
    pub fn preload_ref(&self, index: usize) -> Result<Arc<Cell>> {
        self.remaining_refs()
            .get(index)
            .cloned()
            .ok_or_else(|| CellError::refs_underflow(index + 1, self.refs_left()))
    }

    /// Loads a reference to another cell
    pub fn load_ref(&mut self) -> Result<Arc<Cell>> {
        let reference = self.preload_ref(0)?;
        self.ref_pos += 1;
        Ok(reference)
    }

    /// Loads an optional reference (Maybe ^Cell)
    pub fn load_maybe_ref(&mut self) -> Result<Option<Arc<Cell>>> {
        self.atomically(|s| {
            if s.load_bit()? {
                s.load_ref().map(Some)
            } else {
                Ok(None)
            }
        })
    }

    /// Loads a variable-length unsigned integer (`VarUInteger n`)
    ///
    /// First `length_bits` encode the byte length, then that many bytes of data.
    pub fn load_var_uint(&mut self, length_bits: usize) -> Result<BigUint> {
        self.atomically(|s| {
            let byte_len = s.load_uint(length_bits)? as usize;
            s.load_big_uint(byte_len * 8)
        })
    }

    /// Loads a variable-length signed integer (`VarInteger n`)
    pub fn load_var_int(&mut self, length_bits: usize) -> Result<BigInt> {
        self.atomically(|s| {
            let byte_len = s.load_uint(length_bits)? as usize;
            s.load_big_int(byte_len * 8)
        })
    }

    /// Preloads coins without advancing
    pub fn preload_coins(&self) -> Result<u128> {
        let byte_len = self.preload_uint(4)? as usize;
        self.bits().u128_at(self.bit_pos + 4, byte_len * 8)
    }

    /// Loads coins (VarUInteger 16)
    ///
    /// Length is encoded in 4 bits, then that many bytes of value.
    pub fn load_coins(&mut self) -> Result<u128> {
        let byte_len = self.preload_uint(4)? as usize;
        let amount = self.preload_coins()?;
        self.bit_pos += 4 + byte_len * 8;
        Ok(amount)
    }

    /// Loads `len` bytes as an utf-8 string
    pub fn load_string(&mut self, len: usize) -> Result<String> {
        let bytes = self.preload_bytes(len)?;
        let s = String::from_utf8(bytes).map_err(|_| CellError::InvalidUtf8)?;
        self.bit_pos += len * 8;
        Ok(s)
    }

    fn load_byte_remainder(&mut self) -> Result<Vec<u8>> {
        let bits_left = self.bits_left();
        if bits_left % 8 != 0 {
            return Err(CellError::Encoding(
                "snake data is not byte aligned".to_owned(),
            ));
        }
        self.load_bits(bits_left)
    }

    /// Loads snake-encoded bytes: the rest of this cell followed by the
    /// chain of first references
    pub fn load_snake_bytes(&mut self) -> Result<Vec<u8>> {
        self.atomically(|s| {
            let mut result = s.load_byte_remainder()?;
            let mut next = if s.refs_left() > 0 {
                Some(s.load_ref()?)
            } else {
                None
            };
            while let Some(cell) = next {
                let mut current = CellSlice::new(cell);
                result.extend(current.load_byte_remainder()?);
                next = current.remaining_refs().first().cloned();
            }
            Ok(result)
        })
    }

    /// Loads a snake-encoded utf-8 string
    pub fn load_snake_string(&mut self) -> Result<String> {
        let bytes = self.load_snake_bytes()?;
        String::from_utf8(bytes).map_err(|_| CellError::InvalidUtf8)
    }

    fn skip_anycast(&mut self) -> Result<()> {
        // anycast_info$_ depth:(#<= 30) { depth >= 1 } rewrite_pfx:(bits depth)
        if self.load_bit()? {
            let depth = self.load_uint(5)? as usize;
            if !(1..=30).contains(&depth) {
                return Err(CellError::InvalidTag);
            }
            self.skip_bits(depth)?;
        }
        Ok(())
    }

    fn load_std_body(&mut self) -> Result<Address> {
        self.skip_anycast()?;
        let workchain = self.load_int(8)? as i8;
        let mut hash_part = [0u8; 32];
        hash_part.copy_from_slice(&self.load_bytes(32)?);
        Ok(Address::new(workchain, hash_part))
    }

    /// Loads an internal address (`addr_std`), `None` for `addr_none`
    pub fn load_address(&mut self) -> Result<Option<Address>> {
        self.atomically(|s| match s.load_uint(2)? {
            0b00 => Ok(None),
            0b10 => s.load_std_body().map(Some),
            _ => Err(AddressError::Unsupported.into()),
        })
    }

    /// Loads any supported message address
    pub fn load_msg_address(&mut self) -> Result<MsgAddress> {
        self.atomically(|s| match s.load_uint(2)? {
            0b00 => Ok(MsgAddress::None),
            0b10 => s.load_std_body().map(MsgAddress::Std),
            0b01 => {
                let len = s.load_uint(9)? as usize;
                let bits = s.load_bit_string(len)?;
                Ok(MsgAddress::External(ExternalAddress::new(bits)?))
            }
            // addr_var is not used by any current workchain
            _ => Err(AddressError::Unsupported.into()),
        })
    }

    /// Loads a `HashmapE` with keys of `key_bits` bits
    pub fn load_dict(&mut self, key_bits: usize) -> Result<Dict> {
        self.load_dict_with(key_bits, DecodeLimits::default().max_dict_entries)
    }

    /// Loads a `HashmapE` that may hold at most `max_entries` entries
    pub fn load_dict_with(&mut self, key_bits: usize, max_entries: usize) -> Result<Dict> {
        self.atomically(|s| match s.load_maybe_ref()? {
            Some(root) => Dict::from_root_with(&root, key_bits, max_entries),
            None => Ok(Dict::new(key_bits)),
        })
    }

    /// Collects the unread bits and references into a new cell
    pub fn load_remainder(&mut self) -> Result<Arc<Cell>> {
        let cell = CellBuilder::from_slice(self)?.end_cell()?;
        self.bit_pos = self.cell.bit_len();
        self.ref_pos = self.cell.reference_count();
        Ok(cell)
    }

    /// Checks that the whole cell has been read
    pub fn end_parse(&self) -> Result<()> {
        if !self.is_empty() {
            return Err(CellError::TrailingData {
                bits: self.bits_left(),
                refs: self.refs_left(),
            });
        }
        Ok(())
    }
}

impl From<Arc<Cell>> for CellSlice {
    fn from(cell: Arc<Cell>) -> Self {
        Self::new(cell)
    }
}
