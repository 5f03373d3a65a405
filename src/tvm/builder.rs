//! Builder for constructing cells with convenient methods
//!
//! [`CellBuilder`] accumulates bits and references and turns them into an
//! immutable [`Cell`] with [`CellBuilder::end_cell`]. Every `store_*` method
//! either succeeds completely or leaves the builder untouched, so a failed
//! write can be followed by a smaller one.
//!
//! # Examples
//!
//! ```rust
//! use toncells_rs::tvm::{Address, CellBuilder};
//!
//! let mut builder = CellBuilder::new();
//!
//! // Store an address
//! let addr = Address::new(0, [0u8; 32]);
//! builder.store_address(Some(&addr)).unwrap();
//!
//! // Store coins (1 TON)
//! builder.store_coins(1_000_000_000).unwrap();
//!
//! // Store a string
//! builder.store_string("Hello, TON!").unwrap();
//!
//! // Build the cell
//! let cell = builder.end_cell().unwrap();
//! assert_eq!(cell.reference_count(), 0);
//! ```

use crate::tvm::address::{Address, ExternalAddress, MsgAddress};
use crate::tvm::bitstring::BitString;
use crate::tvm::cell::{Cell, MAX_CELL_BITS, MAX_CELL_REFS};
use crate::tvm::dict::Dict;
use crate::tvm::error::{CellError, Result};
use crate::tvm::slice::CellSlice;
use num_bigint::{BigInt, BigUint};
use std::sync::Arc;

/// Number of whole bytes a snake cell can hold
const SNAKE_CHUNK_BYTES: usize = MAX_CELL_BITS / 8;

/// Mutable accumulator for a single cell
#[derive(Debug, Clone, Default)]
pub struct CellBuilder {
    bits: BitString,
    references: Vec<Arc<Cell>>,
    exotic: bool,
}

impl CellBuilder {
    /// Creates a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder prefilled with the remaining content of a slice
    pub fn from_slice(slice: &CellSlice) -> Result<Self> {
        let mut builder = Self::new();
        builder.store_slice(slice)?;
        Ok(builder)
    }

    /// Marks the resulting cell as exotic
    ///
    /// The layout is validated by [`CellBuilder::end_cell`].
    pub fn set_exotic(&mut self, exotic: bool) -> &mut Self {
        self.exotic = exotic;
        self
    }

    pub fn is_exotic(&self) -> bool {
        self.exotic
    }

    /// Returns the number of bits used
    pub fn bits_len(&self) -> usize {
        self.bits.len()
    }

    /// Returns the number of available bits
    pub fn available_bits(&self) -> usize {
        MAX_CELL_BITS - self.bits.len()
    }

    /// Returns the number of available bytes
    pub fn available_bytes(&self) -> usize {
        self.available_bits() / 8
    }

    /// Returns the number of references
    pub fn refs_len(&self) -> usize {
        self.references.len()
    }

    /// Returns the number of available references
    pub fn available_refs(&self) -> usize {
        MAX_CELL_REFS - self.references.len()
    }

    pub fn bits(&self) -> &BitString {
        &self.bits
    }

    fn ensure_bits(&self, bits: usize) -> Result<()> {
        if bits > self.available_bits() {
            return Err(CellError::bits_overflow(bits, self.available_bits()));
        }
        Ok(())
    }

    fn ensure_refs(&self, refs: usize) -> Result<()> {
        if refs > self.available_refs() {
            return Err(CellError::refs_overflow(refs, self.available_refs()));
        }
        Ok(())
    }

    /// Stores a single bit
    pub fn store_bit(&mut self, bit: bool) -> Result<&mut Self> {
        self.bits.write_bit(bit)?;
        Ok(self)
    }

    /// Stores a boolean value as a single bit
    pub fn store_bool(&mut self, value: bool) -> Result<&mut Self> {
        self.store_bit(value)
    }

    /// Stores multiple bits from a byte slice
    pub fn store_bits(&mut self, bits: &[u8], bit_len: usize) -> Result<&mut Self> {
        self.bits.write_bits(bits, bit_len)?;
        Ok(self)
    }

    /// Stores the content of a bit string
    pub fn store_bit_string(&mut self, bits: &BitString) -> Result<&mut Self> {
        self.bits.write_bit_string(bits)?;
        Ok(self)
    }

    /// Stores a byte
    pub fn store_u8(&mut self, value: u8) -> Result<&mut Self> {
        self.store_uint(value as u64, 8)
    }

    /// Stores a u16 value
    pub fn store_u16(&mut self, value: u16) -> Result<&mut Self> {
        self.store_uint(value as u64, 16)
    }

    /// Stores a u32 value
    pub fn store_u32(&mut self, value: u32) -> Result<&mut Self> {
        self.store_uint(value as u64, 32)
    }

    /// Stores a u64 value
    pub fn store_u64(&mut self, value: u64) -> Result<&mut Self> {
        self.store_uint(value, 64)
    }

    /// Stores multiple bytes
    pub fn store_bytes(&mut self, bytes: &[u8]) -> Result<&mut Self> {
        self.bits.write_bytes(bytes)?;
        Ok(self)
    }

    /// Stores an unsigned integer with specific bit length
    pub fn store_uint(&mut self, value: u64, bits: usize) -> Result<&mut Self> {
        self.bits.write_uint(value, bits)?;
        Ok(self)
    }

    /// Stores a signed integer with specific bit length
    pub fn store_int(&mut self, value: i64, bits: usize) -> Result<&mut Self> {
        self.bits.write_int(value, bits)?;
        Ok(self)
    }

    /// Stores an arbitrary-width unsigned integer (e.g. `uint256`)
    pub fn store_big_uint(&mut self, value: &BigUint, bits: usize) -> Result<&mut Self> {
        self.bits.write_big_uint(value, bits)?;
        Ok(self)
    }

    /// Stores an arbitrary-width signed integer (e.g. `int257`)
    pub fn store_big_int(&mut self, value: &BigInt, bits: usize) -> Result<&mut Self> {
        self.bits.write_big_int(value, bits)?;
        Ok(self)
    }

    /// Stores a reference to another cell
    pub fn store_ref(&mut self, cell: Arc<Cell>) -> Result<&mut Self> {
        self.ensure_refs(1)?;
        self.references.push(cell);
        Ok(self)
    }

    /// Stores an optional reference (Maybe ^Cell)
    pub fn store_maybe_ref(&mut self, cell: Option<Arc<Cell>>) -> Result<&mut Self> {
        match cell {
            Some(c) => {
                self.ensure_bits(1)?;
                self.ensure_refs(1)?;
                self.store_bit(true)?;
                self.store_ref(c)
            }
            None => self.store_bit(false),
        }
    }

    /// Stores the contents of another cell
    pub fn store_cell(&mut self, cell: &Cell) -> Result<&mut Self> {
        self.ensure_bits(cell.bit_len())?;
        self.ensure_refs(cell.reference_count())?;

        self.bits.write_bit_string(cell.bits())?;
        self.references.extend(cell.references().iter().cloned());
        Ok(self)
    }

    /// Stores the unread contents of a slice
    pub fn store_slice(&mut self, slice: &CellSlice) -> Result<&mut Self> {
        let bits_left = slice.bits_left();
        self.ensure_bits(bits_left)?;
        self.ensure_refs(slice.refs_left())?;

        let data = slice.preload_bits(bits_left)?;
        self.bits.write_bits(&data, bits_left)?;
        self.references.extend(slice.remaining_refs().iter().cloned());
        Ok(self)
    }

    /// Stores a variable-length unsigned integer (`VarUInteger n`)
    ///
    /// `length_bits` is the width of the byte length prefix, e.g. 4 for
    /// `VarUInteger 16` and 5 for `VarUInteger 32`.
    pub fn store_var_uint(&mut self, value: &BigUint, length_bits: usize) -> Result<&mut Self> {
        let byte_len = (value.bits() as usize).div_ceil(8);
        if length_bits >= usize::BITS as usize || byte_len >= 1 << length_bits {
            return Err(CellError::IntOverflow {
                bits: ((1usize << length_bits.min(16)) - 1) * 8,
            });
        }
        self.ensure_bits(length_bits + byte_len * 8)?;

        self.store_uint(byte_len as u64, length_bits)?;
        self.store_big_uint(value, byte_len * 8)
    }

    /// Stores a variable-length signed integer (`VarInteger n`)
    pub fn store_var_int(&mut self, value: &BigInt, length_bits: usize) -> Result<&mut Self> {
        // Smallest byte count holding the value with its sign bit
        let magnitude_bits = if value.sign() == num_bigint::Sign::Minus {
            (-value - 1u32).bits()
        } else {
            value.bits()
        } as usize;
        let byte_len = if magnitude_bits == 0 && value.sign() == num_bigint::Sign::NoSign {
            0
        } else {
            (magnitude_bits + 1).div_ceil(8)
        };
        if length_bits >= usize::BITS as usize || byte_len >= 1 << length_bits {
            return Err(CellError::IntOverflow {
                bits: ((1usize << length_bits.min(16)) - 1) * 8,
            });
        }
        self.ensure_bits(length_bits + byte_len * 8)?;

        self.store_uint(byte_len as u64, length_bits)?;
        self.store_big_int(value, byte_len * 8)
    }

    /// Stores coins (VarUInteger 16)
    pub fn store_coins(&mut self, amount: u128) -> Result<&mut Self> {
        self.bits.write_coins(amount)?;
        Ok(self)
    }

    /// Stores a string that fits into the current cell
    pub fn store_string(&mut self, s: &str) -> Result<&mut Self> {
        self.bits.write_string(s)?;
        Ok(self)
    }

    /// Stores a string using snake encoding, optionally prefixed with the
    /// `0x00` text tag
    pub fn store_snake_string(&mut self, s: &str, with_prefix: bool) -> Result<&mut Self> {
        if with_prefix {
            let mut bytes = Vec::with_capacity(s.len() + 1);
            bytes.push(0x00);
            bytes.extend_from_slice(s.as_bytes());
            self.store_snake_bytes(&bytes)
        } else {
            self.store_snake_bytes(s.as_bytes())
        }
    }

    /// Stores bytes using snake encoding (splits across multiple cells if needed)
    ///
    /// As many bytes as fit go into this builder, the rest is chained
    /// through the first reference of each following cell.
    pub fn store_snake_bytes(&mut self, bytes: &[u8]) -> Result<&mut Self> {
        let available = self.available_bytes();
        if bytes.len() <= available {
            return self.store_bytes(bytes);
        }
        self.ensure_refs(1)?;

        let tail = Self::snake_chain(&bytes[available..])?;
        self.store_bytes(&bytes[..available])?;
        self.store_ref(tail)
    }

    fn snake_chain(bytes: &[u8]) -> Result<Arc<Cell>> {
        let mut next: Option<Arc<Cell>> = None;
        for chunk in bytes.chunks(SNAKE_CHUNK_BYTES).rev() {
            let mut builder = CellBuilder::new();
            builder.store_bytes(chunk)?;
            if let Some(next) = next.take() {
                builder.store_ref(next)?;
            }
            next = Some(builder.end_cell()?);
        }
        Ok(next.unwrap_or_else(|| Arc::new(Cell::new())))
    }

    /// Stores a TON address (`addr_std`) or `addr_none` for `None`
    pub fn store_address(&mut self, address: Option<&Address>) -> Result<&mut Self> {
        self.bits.write_address(address)?;
        Ok(self)
    }

    /// Stores an external address
    pub fn store_external_address(&mut self, address: &ExternalAddress) -> Result<&mut Self> {
        // addr_extern$01 len:(## 9) external_address:(bits len)
        self.ensure_bits(2 + 9 + address.bit_len())?;
        self.store_uint(0b01, 2)?;
        self.store_uint(address.bit_len() as u64, 9)?;
        self.store_bit_string(address.bits())
    }

    /// Stores any supported message address
    pub fn store_msg_address(&mut self, address: &MsgAddress) -> Result<&mut Self> {
        match address {
            MsgAddress::None => self.store_address(None),
            MsgAddress::Std(addr) => self.store_address(Some(addr)),
            MsgAddress::External(ext) => self.store_external_address(ext),
        }
    }

    /// Stores a dictionary as `HashmapE`: a presence bit and a reference to
    /// the root when the dictionary is not empty
    pub fn store_dict(&mut self, dict: Option<&Dict>) -> Result<&mut Self> {
        let root = match dict {
            Some(dict) => dict.serialize()?,
            None => None,
        };
        self.store_maybe_ref(root)
    }

    /// Builds the cell
    pub fn end_cell(self) -> Result<Arc<Cell>> {
        Ok(Arc::new(Cell::finalize(
            self.bits,
            self.references,
            self.exotic,
        )?))
    }

    /// Alias for [`CellBuilder::end_cell`]
    pub fn build(self) -> Result<Arc<Cell>> {
        self.end_cell()
    }

    /// Converts to a slice
    pub fn to_slice(self) -> Result<CellSlice> {
        Ok(CellSlice::new(self.end_cell()?))
    }
}
