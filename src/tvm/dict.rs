//! TON Dictionary (HashMap) implementation
//!
//! Dictionaries in TON are represented as binary trees stored in cells.
//! Every node starts with an edge label holding the next bits of the key;
//! forks then have two references (bit `0` on the left, bit `1` on the
//! right) and leaves carry the value inline after the label.
//!
//! [`Dict`] keeps entries in a sorted map and converts to and from the cell
//! representation with [`Dict::serialize`] and [`Dict::from_root`].

use crate::tvm::address::Address;
use crate::tvm::bitstring::BitString;
use crate::tvm::boc::DecodeLimits;
use crate::tvm::builder::CellBuilder;
use crate::tvm::cell::Cell;
use crate::tvm::error::{CellError, Result};
use crate::tvm::slice::CellSlice;
use num_bigint::BigUint;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Fixed-width dictionary key
///
/// Keys are compared bit by bit, which is the order entries take in the
/// serialized tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DictKey(BitString);

impl DictKey {
    pub fn from_bits(bits: BitString) -> Self {
        Self(bits)
    }

    /// Unsigned integer key (`HashmapE n X` with `uint n` keys)
    pub fn from_uint(value: u64, bits: usize) -> Result<Self> {
        let mut key = BitString::new();
        key.write_uint(value, bits)?;
        Ok(Self(key))
    }

    /// Signed integer key
    pub fn from_int(value: i64, bits: usize) -> Result<Self> {
        let mut key = BitString::new();
        key.write_int(value, bits)?;
        Ok(Self(key))
    }

    pub fn from_big_uint(value: &BigUint, bits: usize) -> Result<Self> {
        let mut key = BitString::new();
        key.write_big_uint(value, bits)?;
        Ok(Self(key))
    }

    /// 256-bit key, e.g. an account id or a cell hash
    pub fn from_hash(hash: &[u8; 32]) -> Self {
        Self(BitString::from_bytes(hash, 256).unwrap_or_default())
    }

    /// 267-bit key holding a serialized `addr_std`
    pub fn from_address(address: &Address) -> Result<Self> {
        let mut key = BitString::new();
        key.write_address(Some(address))?;
        Ok(Self(key))
    }

    pub fn bits(&self) -> &BitString {
        &self.0
    }

    pub fn bit_len(&self) -> usize {
        self.0.len()
    }

    pub fn to_uint(&self) -> Result<u64> {
        self.0.uint_at(0, self.0.len())
    }

    pub fn to_int(&self) -> Result<i64> {
        self.0.int_at(0, self.0.len())
    }

    pub fn to_big_uint(&self) -> Result<BigUint> {
        self.0.big_uint_at(0, self.0.len())
    }

    /// Parses the key back into an address if it holds an `addr_std`
    pub fn to_address(&self) -> Result<Address> {
        let mut builder = CellBuilder::new();
        builder.store_bit_string(&self.0)?;
        let mut slice = builder.to_slice()?;
        let address = slice
            .load_address()?
            .ok_or(CellError::InvalidDictionary("key is addr_none"))?;
        slice.end_parse()?;
        Ok(address)
    }

    fn bit(&self, index: usize) -> bool {
        self.0.bit_at(index).unwrap_or(false)
    }
}

impl Ord for DictKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .as_bytes()
            .cmp(other.0.as_bytes())
            .then(self.0.len().cmp(&other.0.len()))
    }
}

impl PartialOrd for DictKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// TON Dictionary (HashMap)
///
/// Represents a dictionary with fixed-size keys stored as a binary tree in
/// cells. Values are cells whose bits and references are written inline
/// into the leaf.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dict {
    /// Key size in bits
    key_bits: usize,
    entries: BTreeMap<DictKey, Arc<Cell>>,
}

impl Dict {
    /// Creates a new dictionary with the specified key size
    pub fn new(key_bits: usize) -> Self {
        Self {
            key_bits,
            entries: BTreeMap::new(),
        }
    }

    /// Returns the key size in bits
    pub fn key_bits(&self) -> usize {
        self.key_bits
    }

    /// Returns the number of entries in the dictionary
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the dictionary is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn check_key(&self, key: &DictKey) -> Result<()> {
        if key.bit_len() != self.key_bits {
            return Err(CellError::InvalidDictionary("key width mismatch"));
        }
        Ok(())
    }

    /// Gets a value by key
    pub fn get(&self, key: &DictKey) -> Option<&Arc<Cell>> {
        self.entries.get(key)
    }

    /// Sets a value for a key, returning the previous one
    pub fn set(&mut self, key: DictKey, value: Arc<Cell>) -> Result<Option<Arc<Cell>>> {
        self.check_key(&key)?;
        Ok(self.entries.insert(key, value))
    }

    /// Removes a key, returning its value
    pub fn remove(&mut self, key: &DictKey) -> Option<Arc<Cell>> {
        self.entries.remove(key)
    }

    /// Iterates over the entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&DictKey, &Arc<Cell>)> {
        self.entries.iter()
    }

    /// Stores an unsigned integer value under an unsigned integer key
    pub fn set_uint(&mut self, key: u64, value: u64, value_bits: usize) -> Result<()> {
        let key = DictKey::from_uint(key, self.key_bits)?;
        let mut builder = CellBuilder::new();
        builder.store_uint(value, value_bits)?;
        self.set(key, builder.end_cell()?)?;
        Ok(())
    }

    /// Reads an unsigned integer value stored under an unsigned integer key
    pub fn get_uint(&self, key: u64, value_bits: usize) -> Result<Option<u64>> {
        let key = DictKey::from_uint(key, self.key_bits)?;
        match self.get(&key) {
            Some(value) => Ok(Some(CellSlice::begin_parse(value).load_uint(value_bits)?)),
            None => Ok(None),
        }
    }

    /// Serializes the dictionary into its root cell (`Hashmap n X`)
    ///
    /// Returns `None` for an empty dictionary.
    pub fn serialize(&self) -> Result<Option<Arc<Cell>>> {
        if self.is_empty() {
            return Ok(None);
        }
        let entries = self.entries.iter().collect::<Vec<_>>();
        let root = build_node(&entries, 0, self.key_bits)?;
        log::trace!(
            "serialized dictionary: {} entries, {} bit keys",
            entries.len(),
            self.key_bits
        );
        Ok(Some(root))
    }

    /// Parses a dictionary from its root cell with the default entry limit
    pub fn from_root(root: &Arc<Cell>, key_bits: usize) -> Result<Self> {
        Self::from_root_with(root, key_bits, DecodeLimits::default().max_dict_entries)
    }

    /// Parses a dictionary from its root cell, failing once it holds more
    /// than `max_entries` entries
    ///
    /// Forks may point at the same child cell, so a small tree can stand for
    /// far more leaves than it has cells.
    pub fn from_root_with(root: &Arc<Cell>, key_bits: usize, max_entries: usize) -> Result<Self> {
        let mut dict = Self::new(key_bits);
        collect_entries(root, BitString::new(), key_bits, max_entries, &mut dict.entries)
            .inspect_err(|e| log::debug!("dictionary rejected: {e}"))?;
        log::trace!("parsed dictionary: {} entries", dict.len());
        Ok(dict)
    }
}

/// Number of bits needed to store a label length of at most `max_len`
fn bits_for_len(max_len: usize) -> usize {
    (usize::BITS - max_len.leading_zeros()) as usize
}

/// Writes the `len` key bits starting at `offset` as the shortest label
fn write_label(
    builder: &mut CellBuilder,
    key: &BitString,
    offset: usize,
    len: usize,
    max_len: usize,
) -> Result<()> {
    let bits_for_len = bits_for_len(max_len);
    let short_len = 2 + 2 * len;
    let long_len = 2 + bits_for_len + len;
    let same_len = 3 + bits_for_len;

    if let Some(bit) = key.uniform_at(offset, len) {
        if same_len < short_len && same_len < long_len {
            // hml_same$11 v:Bit n:(#<= m)
            builder.store_uint(0b11, 2)?;
            builder.store_bit(bit)?;
            builder.store_uint(len as u64, bits_for_len)?;
            return Ok(());
        }
    }

    let label = key.substring(offset, len)?;
    if short_len <= long_len {
        // hml_short$0 len:(Unary ~n) s:(n * Bit)
        builder.store_bit(false)?;
        let mut unary = BitString::new();
        unary.write_repeated(true, len)?.write_bit(false)?;
        builder.store_bit_string(&unary)?;
    } else {
        // hml_long$10 n:(#<= m) s:(n * Bit)
        builder.store_uint(0b10, 2)?;
        builder.store_uint(len as u64, bits_for_len)?;
    }
    builder.store_bit_string(&label)?;
    Ok(())
}

/// Reads a label of at most `max_len` bits
fn read_label(slice: &mut CellSlice, max_len: usize) -> Result<BitString> {
    const TRUNCATED: CellError = CellError::InvalidDictionaryLabel("truncated label");
    const TOO_LONG: CellError = CellError::InvalidDictionaryLabel("label is longer than the key");

    let bits_for_len = bits_for_len(max_len);
    if !slice.load_bit().map_err(|_| TRUNCATED)? {
        let mut len = 0;
        while slice.load_bit().map_err(|_| TRUNCATED)? {
            len += 1;
            if len > max_len {
                return Err(TOO_LONG);
            }
        }
        slice.load_bit_string(len).map_err(|_| TRUNCATED)
    } else if !slice.load_bit().map_err(|_| TRUNCATED)? {
        let len = slice.load_uint(bits_for_len).map_err(|_| TRUNCATED)? as usize;
        if len > max_len {
            return Err(TOO_LONG);
        }
        slice.load_bit_string(len).map_err(|_| TRUNCATED)
    } else {
        let bit = slice.load_bit().map_err(|_| TRUNCATED)?;
        let len = slice.load_uint(bits_for_len).map_err(|_| TRUNCATED)? as usize;
        if len > max_len {
            return Err(TOO_LONG);
        }
        let mut label = BitString::new();
        label.write_repeated(bit, len)?;
        Ok(label)
    }
}

/// Builds the subtree for sorted `entries` which share their first
/// `offset` key bits
fn build_node(
    entries: &[(&DictKey, &Arc<Cell>)],
    offset: usize,
    key_bits: usize,
) -> Result<Arc<Cell>> {
    let remaining = key_bits - offset;
    let mut builder = CellBuilder::new();

    if let [(key, value)] = entries {
        write_label(&mut builder, key.bits(), offset, remaining, remaining)?;
        builder.store_cell(value)?;
        return builder.end_cell();
    }

    // Sorted keys share the prefix of the first and the last one
    let (first, last) = match (entries.first(), entries.last()) {
        (Some((first, _)), Some((last, _))) => (*first, *last),
        _ => return Err(CellError::InvalidDictionary("empty subtree")),
    };
    let label_len = (offset..key_bits)
        .take_while(|&i| first.bit(i) == last.bit(i))
        .count();
    let fork = offset + label_len;
    if fork >= key_bits {
        return Err(CellError::InvalidDictionary("duplicate keys"));
    }

    let split = entries.partition_point(|(key, _)| !key.bit(fork));
    let left = build_node(&entries[..split], fork + 1, key_bits)?;
    let right = build_node(&entries[split..], fork + 1, key_bits)?;

    write_label(&mut builder, first.bits(), offset, label_len, remaining)?;
    builder.store_ref(left)?.store_ref(right)?;
    builder.end_cell()
}

fn collect_entries(
    cell: &Arc<Cell>,
    mut prefix: BitString,
    remaining: usize,
    max_entries: usize,
    entries: &mut BTreeMap<DictKey, Arc<Cell>>,
) -> Result<()> {
    if cell.is_exotic() {
        return Err(CellError::InvalidDictionary("unexpected exotic cell"));
    }

    let mut slice = CellSlice::begin_parse(cell);
    let label = read_label(&mut slice, remaining)?;
    prefix.write_bit_string(&label)?;
    let remaining = remaining - label.len();

    if remaining == 0 {
        if entries.len() >= max_entries {
            return Err(CellError::InvalidDictionary("too many entries"));
        }
        entries.insert(DictKey(prefix), slice.load_remainder()?);
        return Ok(());
    }

    if slice.bits_left() != 0 || slice.refs_left() != 2 {
        return Err(CellError::InvalidDictionary("invalid fork node"));
    }
    for bit in [false, true] {
        let mut child_prefix = prefix.clone();
        child_prefix.write_bit(bit)?;
        let child = slice.load_ref()?;
        collect_entries(&child, child_prefix, remaining - 1, max_entries, entries)?;
    }
    Ok(())
}
