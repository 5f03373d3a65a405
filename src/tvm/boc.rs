//! Bag of Cells (BoC) serialization and deserialization
//!
//! BoC is a serialization format that encodes cells into byte arrays.
//! It allows storing and transmitting cell structures efficiently.
//!
//! Cells are written parents first: the roots come before their
//! descendants and every reference points to a cell with a greater index.
//! Identical subtrees are stored once.

use crate::crc::crc32;
use crate::tvm::bitstring::BitString;
use crate::tvm::cell::{Cell, CellHash, MAX_CELL_REFS};
use crate::tvm::error::{BocError, Result};
use crate::tvm::level_mask::LevelMask;
use base64::Engine;
use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// BoC magic number for standard format
const BOC_GENERIC_MAGIC: u32 = 0xb5ee9c72;

const MAX_REF_SIZE: usize = 4;
const MAX_OFFSET_SIZE: usize = 8;

/// Descriptors plus inline hashes and depths, data and references
const MAX_CELL_SIZE: u64 = 2 + 4 * (2 + 32) + 128 + (MAX_CELL_REFS * MAX_REF_SIZE) as u64;

/// Serialization flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BocOptions {
    /// Write the offset index after the root list
    pub has_idx: bool,
    /// Append a CRC32 of everything before it
    pub has_crc32: bool,
    /// Reserve a cache bit in every index entry (requires `has_idx`)
    pub has_cache_bits: bool,
}

impl Default for BocOptions {
    fn default() -> Self {
        Self {
            has_idx: false,
            has_crc32: true,
            has_cache_bits: false,
        }
    }
}

/// Ceilings enforced while decoding untrusted input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeLimits {
    pub max_cells: usize,
    pub max_roots: usize,
    /// Upper bound of the cell data section in bytes
    pub max_total_size: u64,
    /// Entries a dictionary may expand to when loaded into a [`Dict`]
    ///
    /// [`Dict`]: crate::tvm::dict::Dict
    pub max_dict_entries: usize,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_cells: 1 << 20,
            max_roots: 32,
            max_total_size: 64 << 20,
            max_dict_entries: 1 << 18,
        }
    }
}

/// Serializes a cell and its references into a Bag of Cells (BoC) format
pub fn serialize_boc(root: &Arc<Cell>, options: &BocOptions) -> Result<Vec<u8>> {
    serialize_boc_many(std::slice::from_ref(root), options)
}

/// Serializes several roots sharing one cell table
pub fn serialize_boc_many(roots: &[Arc<Cell>], options: &BocOptions) -> Result<Vec<u8>> {
    if options.has_cache_bits && !options.has_idx {
        return Err(BocError::CacheBitsWithoutIndex.into());
    }
    if roots.is_empty() {
        return Err(BocError::InvalidRootCount { count: 0, limit: 0 }.into());
    }

    // Collect all unique cells
    let cells = collect_cells(roots);
    let cell_map = cells
        .iter()
        .enumerate()
        .map(|(idx, cell)| (cell.hash(), idx))
        .collect::<HashMap<_, _>>();

    let ref_size = bytes_needed(cells.len() as u64);
    if ref_size > MAX_REF_SIZE {
        return Err(BocError::TooLarge.into());
    }

    // Serialize each cell, remembering where it ends
    let mut cells_data = Vec::new();
    let mut end_offsets = Vec::with_capacity(cells.len());
    for cell in &cells {
        serialize_cell(cell, &cell_map, ref_size, &mut cells_data)?;
        end_offsets.push(cells_data.len() as u64);
    }

    let total_size = cells_data.len() as u64;
    let offset_size = bytes_needed(total_size << options.has_cache_bits as u8);

    // Build header
    let mut result = Vec::with_capacity(
        16 + roots.len() * ref_size + cells.len() * offset_size + cells_data.len(),
    );
    result.extend_from_slice(&BOC_GENERIC_MAGIC.to_be_bytes());

    let flags = (options.has_idx as u8) << 7
        | (options.has_crc32 as u8) << 6
        | (options.has_cache_bits as u8) << 5;
    result.push(flags | ref_size as u8);
    result.push(offset_size as u8);

    write_uint(&mut result, cells.len() as u64, ref_size);
    write_uint(&mut result, roots.len() as u64, ref_size);
    // Number of absent cells (always 0)
    write_uint(&mut result, 0, ref_size);
    write_uint(&mut result, total_size, offset_size);

    for root in roots {
        let root_index = cell_map
            .get(&root.hash())
            .copied()
            .ok_or(BocError::MissingReference)?;
        write_uint(&mut result, root_index as u64, ref_size);
    }

    if options.has_idx {
        for offset in end_offsets {
            write_uint(&mut result, offset << options.has_cache_bits as u8, offset_size);
        }
    }

    result.extend_from_slice(&cells_data);

    // Add CRC32 if requested
    if options.has_crc32 {
        let crc = crc32(&result);
        result.extend_from_slice(&crc.to_le_bytes());
    }

    log::debug!(
        "serialized BoC: {} cells, {} roots, {} bytes",
        cells.len(),
        roots.len(),
        result.len()
    );
    Ok(result)
}

fn serialize_cell(
    cell: &Arc<Cell>,
    cell_map: &HashMap<CellHash, usize>,
    ref_size: usize,
    out: &mut Vec<u8>,
) -> Result<()> {
    out.extend_from_slice(&cell.descriptors());
    out.extend_from_slice(&cell.serialize_data());

    for reference in cell.references() {
        let ref_idx = cell_map
            .get(&reference.hash())
            .copied()
            .ok_or(BocError::MissingReference)?;
        write_uint(out, ref_idx as u64, ref_size);
    }
    Ok(())
}

/// Orders all distinct cells reachable from `roots` so that every parent
/// precedes its children (reverse post-order)
fn collect_cells(roots: &[Arc<Cell>]) -> Vec<Arc<Cell>> {
    let mut visited = HashSet::<CellHash>::new();
    let mut post_order = Vec::new();

    for root in roots.iter().rev() {
        if !visited.insert(root.hash()) {
            continue;
        }

        let mut stack = vec![(root.clone(), 0usize)];
        loop {
            let Some((cell, next)) = stack.last_mut() else {
                break;
            };
            match cell.references().get(*next).cloned() {
                Some(child) => {
                    *next += 1;
                    if visited.insert(child.hash()) {
                        stack.push((child, 0));
                    }
                }
                None => {
                    if let Some((cell, _)) = stack.pop() {
                        post_order.push(cell);
                    }
                }
            }
        }
    }

    post_order.reverse();
    post_order
}

fn bytes_needed(value: u64) -> usize {
    if value == 0 {
        return 1;
    }

    let bits = (u64::BITS - value.leading_zeros()) as usize;
    bits.div_ceil(8)
}

fn write_uint(buf: &mut Vec<u8>, value: u64, size: usize) {
    let mut bytes = [0u8; 8];
    BigEndian::write_uint(&mut bytes, value, size);
    buf.extend_from_slice(&bytes[..size]);
}

/// Bounds-checked cursor over the input bytes
struct BocReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> BocReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    fn require(&self, len: u64) -> Result<(), BocError> {
        if len > self.remaining() as u64 {
            return Err(BocError::UnexpectedEof);
        }
        Ok(())
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], BocError> {
        if len > self.remaining() {
            return Err(BocError::UnexpectedEof);
        }
        let bytes = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(bytes)
    }

    fn read_u8(&mut self) -> Result<u8, BocError> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_uint(&mut self, size: usize) -> Result<u64, BocError> {
        Ok(BigEndian::read_uint(self.read_bytes(size)?, size))
    }
}

/// Cell parsed from the data section, references not yet resolved
struct RawCell {
    bits: BitString,
    exotic: bool,
    level_mask: LevelMask,
    references: Vec<usize>,
}

/// Deserializes a Bag of Cells (BoC) with a single root using the default
/// limits
pub fn deserialize_boc(data: &[u8]) -> Result<Arc<Cell>> {
    deserialize_boc_with(data, &DecodeLimits::default())
}

/// Deserializes a Bag of Cells (BoC) with a single root
pub fn deserialize_boc_with(data: &[u8], limits: &DecodeLimits) -> Result<Arc<Cell>> {
    let mut roots = deserialize_boc_many(data, limits)?;
    if roots.len() != 1 {
        return Err(BocError::InvalidRootCount {
            count: roots.len(),
            limit: 1,
        }
        .into());
    }
    Ok(roots.remove(0))
}

/// Deserializes all roots of a Bag of Cells
pub fn deserialize_boc_many(data: &[u8], limits: &DecodeLimits) -> Result<Vec<Arc<Cell>>> {
    let mut reader = BocReader::new(data);

    let magic = BigEndian::read_u32(reader.read_bytes(4)?);
    if magic != BOC_GENERIC_MAGIC {
        return Err(BocError::UnknownMagic(magic).into());
    }

    let flags = reader.read_u8()?;
    let has_idx = flags & 0b1000_0000 != 0;
    let has_crc32 = flags & 0b0100_0000 != 0;
    let has_cache_bits = flags & 0b0010_0000 != 0;
    if flags & 0b0001_1000 != 0 {
        return Err(BocError::ReservedFlags.into());
    }
    if has_cache_bits && !has_idx {
        return Err(BocError::CacheBitsWithoutIndex.into());
    }

    let ref_size = (flags & 0b0000_0111) as usize;
    if ref_size == 0 || ref_size > MAX_REF_SIZE {
        return Err(BocError::InvalidRefSize(ref_size as u8).into());
    }
    let offset_size = reader.read_u8()? as usize;
    if offset_size == 0 || offset_size > MAX_OFFSET_SIZE {
        return Err(BocError::InvalidOffsetSize(offset_size as u8).into());
    }

    let cell_count = reader.read_uint(ref_size)? as usize;
    let root_count = reader.read_uint(ref_size)? as usize;
    let absent_count = reader.read_uint(ref_size)? as usize;
    let total_size = reader.read_uint(offset_size)?;

    log::debug!(
        "BoC header: {cell_count} cells, {root_count} roots, ref size {ref_size}, \
         offset size {offset_size}, total size {total_size}, idx {has_idx}, crc {has_crc32}"
    );

    if cell_count > limits.max_cells {
        log::debug!("BoC rejected: cell count limit {} exceeded", limits.max_cells);
        return Err(BocError::TooManyCells {
            count: cell_count,
            limit: limits.max_cells,
        }
        .into());
    }
    if root_count == 0 || root_count > limits.max_roots || root_count > cell_count {
        return Err(BocError::InvalidRootCount {
            count: root_count,
            limit: limits.max_roots.min(cell_count),
        }
        .into());
    }
    if absent_count > 0 {
        return Err(BocError::AbsentCellsNotSupported.into());
    }

    let min_total_size = cell_count as u64 * 2;
    if total_size < min_total_size
        || total_size > cell_count as u64 * MAX_CELL_SIZE
        || total_size > limits.max_total_size
    {
        return Err(BocError::InvalidTotalSize(total_size).into());
    }

    let mut roots = Vec::with_capacity(root_count);
    for _ in 0..root_count {
        let root_index = reader.read_uint(ref_size)? as usize;
        if root_index >= cell_count {
            return Err(BocError::RootOutOfBounds(root_index).into());
        }
        roots.push(root_index);
    }

    // Index, cell data and checksum must all be present before anything
    // sized by the header is allocated
    let index_size = if has_idx {
        cell_count as u64 * offset_size as u64
    } else {
        0
    };
    let required = index_size
        .checked_add(total_size)
        .and_then(|len| len.checked_add(if has_crc32 { 4 } else { 0 }))
        .ok_or(BocError::UnexpectedEof)?;
    reader.require(required)?;

    let index = if has_idx {
        let mut index = Vec::with_capacity(cell_count);
        for _ in 0..cell_count {
            index.push(reader.read_uint(offset_size)? >> has_cache_bits as u8);
        }
        Some(index)
    } else {
        None
    };

    let cells_start = reader.offset;
    let mut raw_cells = Vec::with_capacity(cell_count);
    for i in 0..cell_count {
        raw_cells.push(read_cell(&mut reader, i, ref_size)?);

        let end_offset = (reader.offset - cells_start) as u64;
        if let Some(index) = &index {
            if index[i] != end_offset {
                return Err(BocError::InvalidCell {
                    index: i,
                    reason: "index offset mismatch",
                }
                .into());
            }
        }
    }

    if (reader.offset - cells_start) as u64 != total_size {
        return Err(BocError::InvalidTotalSize(total_size).into());
    }

    // Verify CRC32 if present
    if has_crc32 {
        let computed = crc32(&data[..reader.offset]);
        let stored = u32::from_le_bytes([
            reader.read_u8()?,
            reader.read_u8()?,
            reader.read_u8()?,
            reader.read_u8()?,
        ]);
        if stored != computed {
            return Err(BocError::InvalidChecksum { stored, computed }.into());
        }
    }

    if reader.remaining() != 0 {
        return Err(BocError::TrailingBytes(reader.remaining()).into());
    }

    let cells = finalize_cells(raw_cells)?;
    roots
        .into_iter()
        .map(|index| {
            cells[index]
                .clone()
                .ok_or_else(|| BocError::RootOutOfBounds(index).into())
        })
        .collect()
}

fn read_cell(reader: &mut BocReader<'_>, index: usize, ref_size: usize) -> Result<RawCell> {
    let invalid = |reason| BocError::InvalidCell { index, reason };

    let d1 = reader.read_u8()?;
    let d2 = reader.read_u8()?;

    let ref_count = (d1 & 0b111) as usize;
    let exotic = d1 & 0b1000 != 0;
    let store_hashes = d1 & 0b1_0000 != 0;
    let level_mask = LevelMask::new(d1 >> 5);

    if ref_count == 7 {
        return Err(BocError::AbsentCellsNotSupported.into());
    }
    if ref_count > MAX_CELL_REFS {
        return Err(invalid("too many references").into());
    }

    if store_hashes {
        if exotic && ref_count == 0 && level_mask.level() > 0 {
            // Pruned branch with stored hashes is not normalized
            return Err(invalid("pruned branch with stored hashes").into());
        }
        reader.read_bytes((32 + 2) * (level_mask.level() as usize + 1))?;
    }

    let data_len = (d2 as usize).div_ceil(2);
    let aligned = d2 % 2 == 0;
    let data = reader.read_bytes(data_len)?;
    if !aligned && data.last().is_some_and(|byte| byte & 0x7f == 0) {
        return Err(invalid("missing completion tag").into());
    }
    let bits = BitString::from_tagged_bytes(data, aligned)
        .map_err(|_| invalid("invalid cell data"))?;

    let mut references = Vec::with_capacity(ref_count);
    for _ in 0..ref_count {
        references.push(reader.read_uint(ref_size)? as usize);
    }

    Ok(RawCell {
        bits,
        exotic,
        level_mask,
        references,
    })
}

/// Builds cells from the last one to the first, so that every reference
/// is already available when its parent is built
fn finalize_cells(raw_cells: Vec<RawCell>) -> Result<Vec<Option<Arc<Cell>>>> {
    let cell_count = raw_cells.len();
    let mut cells: Vec<Option<Arc<Cell>>> = vec![None; cell_count];

    for (index, raw) in raw_cells.into_iter().enumerate().rev() {
        let mut references = Vec::with_capacity(raw.references.len());
        for &child in &raw.references {
            let resolved = if child > index {
                cells.get(child).and_then(Option::clone)
            } else {
                None
            };
            references.push(resolved.ok_or(BocError::InvalidRef { cell: index, child })?);
        }

        let cell = Cell::finalize(raw.bits, references, raw.exotic).map_err(|e| {
            log::debug!("BoC cell {index} rejected: {e}");
            BocError::InvalidCell {
                index,
                reason: "invalid cell",
            }
        })?;
        if cell.level_mask() != raw.level_mask {
            return Err(BocError::InvalidCell {
                index,
                reason: "level mask mismatch",
            }
            .into());
        }

        cells[index] = Some(Arc::new(cell));
    }

    Ok(cells)
}

/// Converts a hex string to a BoC
pub fn hex_to_boc(hex: &str) -> Result<Arc<Cell>> {
    let hex = hex.split_whitespace().collect::<String>();
    deserialize_boc(&hex::decode(hex)?)
}

/// Converts a BoC to a hex string
pub fn boc_to_hex(cell: &Arc<Cell>, options: &BocOptions) -> Result<String> {
    Ok(hex::encode(serialize_boc(cell, options)?))
}

/// Converts a BoC to base64
pub fn boc_to_base64(cell: &Arc<Cell>, options: &BocOptions) -> Result<String> {
    let bytes = serialize_boc(cell, options)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}

/// Converts a BoC to url-safe base64
pub fn boc_to_base64_url(cell: &Arc<Cell>, options: &BocOptions) -> Result<String> {
    let bytes = serialize_boc(cell, options)?;
    Ok(base64::engine::general_purpose::URL_SAFE.encode(bytes))
}

/// Decodes standard or url-safe base64, padded or not
pub fn decode_base64(b64: &str) -> Result<Vec<u8>> {
    use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};

    let b64 = b64.trim();
    let bytes = if b64.contains(['-', '_']) {
        if b64.ends_with('=') {
            URL_SAFE.decode(b64)?
        } else {
            URL_SAFE_NO_PAD.decode(b64)?
        }
    } else if b64.ends_with('=') {
        STANDARD.decode(b64)?
    } else {
        STANDARD_NO_PAD.decode(b64)?
    };
    Ok(bytes)
}

/// Converts a base64 string to a BoC
pub fn base64_to_boc(b64: &str) -> Result<Arc<Cell>> {
    deserialize_boc(&decode_base64(b64)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tvm::builder::CellBuilder;
    use crate::tvm::error::CellError;

    const NO_CRC: BocOptions = BocOptions {
        has_idx: false,
        has_crc32: false,
        has_cache_bits: false,
    };

    fn byte_cell(byte: u8) -> Arc<Cell> {
        let mut builder = CellBuilder::new();
        builder.store_u8(byte).unwrap();
        builder.end_cell().unwrap()
    }

    #[test]
    fn test_serialize_deserialize_simple() {
        let mut builder = CellBuilder::new();
        builder.store_u32(0x12345678).unwrap();
        let cell = builder.end_cell().unwrap();

        let boc = serialize_boc(&cell, &BocOptions::default()).unwrap();
        let deserialized = deserialize_boc(&boc).unwrap();

        assert_eq!(cell.hash(), deserialized.hash());
    }

    #[test]
    fn test_single_cell_bytes() {
        let boc = serialize_boc(&byte_cell(0x2a), &NO_CRC).unwrap();
        assert_eq!(hex::encode(&boc), "b5ee9c720101010100030000022a");

        let with_crc = serialize_boc(&byte_cell(0x2a), &BocOptions::default()).unwrap();
        assert_eq!(
            hex::encode(&with_crc),
            "b5ee9c724101010100030000022ad9c9aa44"
        );
    }

    #[test]
    fn test_shared_child_bytes() {
        let child = byte_cell(2);
        let mut builder = CellBuilder::new();
        builder.store_u8(1).unwrap();
        builder.store_ref(child.clone()).unwrap();
        builder.store_ref(child).unwrap();
        let parent = builder.end_cell().unwrap();

        let boc = serialize_boc(&parent, &NO_CRC).unwrap();
        assert_eq!(hex::encode(&boc), "b5ee9c72010102010008000202010101000202");

        let indexed = BocOptions {
            has_idx: true,
            ..NO_CRC
        };
        let boc = serialize_boc(&parent, &indexed).unwrap();
        assert_eq!(
            hex::encode(&boc),
            "b5ee9c728101020100080005080202010101000202"
        );
        assert_eq!(deserialize_boc(&boc).unwrap(), parent);
    }

    #[test]
    fn test_cache_bits() {
        let options = BocOptions {
            has_idx: false,
            has_crc32: false,
            has_cache_bits: true,
        };
        assert_eq!(
            serialize_boc(&byte_cell(1), &options).unwrap_err(),
            CellError::MalformedBoc(BocError::CacheBitsWithoutIndex)
        );

        let options = BocOptions {
            has_idx: true,
            ..options
        };
        let boc = serialize_boc(&byte_cell(1), &options).unwrap();
        assert_eq!(deserialize_boc(&boc).unwrap(), byte_cell(1));
    }

    #[test]
    fn test_multiple_roots() {
        let shared = byte_cell(9);
        let mut a = CellBuilder::new();
        a.store_ref(shared.clone()).unwrap();
        let a = a.end_cell().unwrap();
        let mut b = CellBuilder::new();
        b.store_u8(1).unwrap().store_ref(shared).unwrap();
        let b = b.end_cell().unwrap();

        let boc = serialize_boc_many(&[a.clone(), b.clone()], &BocOptions::default()).unwrap();
        let roots = deserialize_boc_many(&boc, &DecodeLimits::default()).unwrap();
        assert_eq!(roots, vec![a, b]);

        assert_eq!(
            deserialize_boc(&boc).unwrap_err(),
            CellError::MalformedBoc(BocError::InvalidRootCount { count: 2, limit: 1 })
        );
    }

    #[test]
    fn test_invalid_headers() {
        assert_eq!(
            deserialize_boc(&[0xb5, 0xee]).unwrap_err(),
            CellError::MalformedBoc(BocError::UnexpectedEof)
        );
        assert_eq!(
            deserialize_boc(&hex::decode("deadbeef0101010100030000022a").unwrap()).unwrap_err(),
            CellError::MalformedBoc(BocError::UnknownMagic(0xdeadbeef))
        );
        assert_eq!(
            deserialize_boc(&hex::decode("b5ee9c720501010100030000022a").unwrap()).unwrap_err(),
            CellError::MalformedBoc(BocError::InvalidRefSize(5))
        );
        // Cache bits without index
        assert_eq!(
            deserialize_boc(&hex::decode("b5ee9c722101010100030000022a").unwrap()).unwrap_err(),
            CellError::MalformedBoc(BocError::CacheBitsWithoutIndex)
        );
        // Trailing garbage
        assert_eq!(
            deserialize_boc(&hex::decode("b5ee9c720101010100030000022a00").unwrap()).unwrap_err(),
            CellError::MalformedBoc(BocError::TrailingBytes(1))
        );
        // Total size does not match the data section
        assert_eq!(
            deserialize_boc(&hex::decode("b5ee9c72010101010004000002002a").unwrap()).unwrap_err(),
            CellError::MalformedBoc(BocError::InvalidTotalSize(4))
        );
        // Total size claims more bytes than the input holds
        assert_eq!(
            deserialize_boc(&hex::decode("b5ee9c720101010100040000022a").unwrap()).unwrap_err(),
            CellError::MalformedBoc(BocError::UnexpectedEof)
        );
    }

    #[test]
    fn test_truncated_body() {
        // Header claims 2^20 cells and 2 MiB of cell data, then ends
        let boc = hex::decode("b5ee9c720303100000000001000000200000000000").unwrap();
        assert_eq!(boc.len(), 21);
        assert_eq!(
            deserialize_boc(&boc).unwrap_err(),
            CellError::MalformedBoc(BocError::UnexpectedEof)
        );

        // Complete cell data but the checksum is cut short
        let mut boc = serialize_boc(&byte_cell(0x2a), &BocOptions::default()).unwrap();
        boc.truncate(boc.len() - 1);
        assert_eq!(
            deserialize_boc(&boc).unwrap_err(),
            CellError::MalformedBoc(BocError::UnexpectedEof)
        );

        // Index present, one cell byte missing
        let indexed = BocOptions {
            has_idx: true,
            ..NO_CRC
        };
        let mut boc = serialize_boc(&byte_cell(0x2a), &indexed).unwrap();
        boc.pop();
        assert_eq!(
            deserialize_boc(&boc).unwrap_err(),
            CellError::MalformedBoc(BocError::UnexpectedEof)
        );
    }

    #[test]
    fn test_missing_reference() {
        let mut builder = CellBuilder::new();
        builder.store_ref(byte_cell(1)).unwrap();
        let parent = builder.end_cell().unwrap();

        let mut out = Vec::new();
        assert_eq!(
            serialize_cell(&parent, &HashMap::new(), 1, &mut out).unwrap_err(),
            CellError::MalformedBoc(BocError::MissingReference)
        );
    }

    #[test]
    fn test_invalid_ref_order() {
        // Two cells where cell 1 references cell 0
        let boc = hex::decode("b5ee9c72010102010005000000010000").unwrap();
        assert_eq!(
            deserialize_boc(&boc).unwrap_err(),
            CellError::MalformedBoc(BocError::InvalidRef { cell: 1, child: 0 })
        );
    }

    #[test]
    fn test_limits() {
        let boc = serialize_boc(&byte_cell(1), &NO_CRC).unwrap();
        let limits = DecodeLimits {
            max_cells: 0,
            ..DecodeLimits::default()
        };
        assert_eq!(
            deserialize_boc_with(&boc, &limits).unwrap_err(),
            CellError::MalformedBoc(BocError::TooManyCells { count: 1, limit: 0 })
        );

        let limits = DecodeLimits {
            max_total_size: 2,
            ..DecodeLimits::default()
        };
        assert_eq!(
            deserialize_boc_with(&boc, &limits).unwrap_err(),
            CellError::MalformedBoc(BocError::InvalidTotalSize(3))
        );
    }

    #[test]
    fn test_missing_completion_tag() {
        // d2 = 1 means a partial byte, but 0x80 carries no data bits
        let boc = hex::decode("b5ee9c7201010101000300000180").unwrap();
        assert!(matches!(
            deserialize_boc(&boc).unwrap_err(),
            CellError::MalformedBoc(BocError::InvalidCell { index: 0, .. })
        ));
    }

    #[test]
    fn test_level_mask_mismatch() {
        // Ordinary cell claiming level 1
        let boc = hex::decode("b5ee9c720101010100030020022a").unwrap();
        assert_eq!(
            deserialize_boc(&boc).unwrap_err(),
            CellError::MalformedBoc(BocError::InvalidCell {
                index: 0,
                reason: "level mask mismatch"
            })
        );
    }

    #[test]
    fn test_hex_conversion() {
        let cell = byte_cell(0xFF);

        let hex = boc_to_hex(&cell, &BocOptions::default()).unwrap();
        let decoded = hex_to_boc(&hex).unwrap();

        assert_eq!(cell.hash(), decoded.hash());
    }

    #[test]
    fn test_base64_variants() {
        let cell = byte_cell(0xFB);
        let standard = boc_to_base64(&cell, &BocOptions::default()).unwrap();
        let url_safe = boc_to_base64_url(&cell, &BocOptions::default()).unwrap();

        assert_eq!(base64_to_boc(&standard).unwrap(), cell);
        assert_eq!(base64_to_boc(&url_safe).unwrap(), cell);
        assert_eq!(base64_to_boc(standard.trim_end_matches('=')).unwrap(), cell);
    }
}
