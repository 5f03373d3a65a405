//! Cell implementation for TON blockchain
//!
//! A cell is a fundamental data structure in TON that can store up to 1023 bits
//! of data and maintain up to 4 references to other cells.
//!
//! Cells are immutable: hashes and depths for every Merkle level are computed
//! once, when the cell is finalized, and shared children are kept behind
//! [`Arc`] so a cell graph can be read from many threads without locking.

use crate::tvm::bitstring::BitString;
use crate::tvm::error::{CellError, Result};
use crate::tvm::level_mask::LevelMask;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// Maximum number of bits a cell can store
pub const MAX_CELL_BITS: usize = 1023;

/// Maximum number of references a cell can have
pub const MAX_CELL_REFS: usize = 4;

/// Cell level range (0-3)
pub const MAX_CELL_LEVEL: u8 = 3;

/// Representation hash of a cell
pub type CellHash = [u8; 32];

const HASH_BITS: usize = 256;
const DEPTH_BITS: usize = 16;

/// Type byte stored in the first 8 bits of an exotic cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExoticType {
    PrunedBranch = 1,
    LibraryReference = 2,
    MerkleProof = 3,
    MerkleUpdate = 4,
}

impl ExoticType {
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::PrunedBranch),
            2 => Some(Self::LibraryReference),
            3 => Some(Self::MerkleProof),
            4 => Some(Self::MerkleUpdate),
            _ => None,
        }
    }
}

/// Cell kind together with the data embedded by exotic cells
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellKind {
    Ordinary,
    /// Stands in for a pruned subtree, carrying its lower-level hashes
    PrunedBranch {
        mask: LevelMask,
        hashes: Vec<CellHash>,
        depths: Vec<u16>,
    },
    /// Refers to a library cell by its hash
    LibraryReference { hash: CellHash },
    MerkleProof { hash: CellHash, depth: u16 },
    MerkleUpdate {
        old_hash: CellHash,
        new_hash: CellHash,
        old_depth: u16,
        new_depth: u16,
    },
}

impl CellKind {
    pub fn is_exotic(&self) -> bool {
        !matches!(self, Self::Ordinary)
    }

    pub fn is_merkle(&self) -> bool {
        matches!(self, Self::MerkleProof { .. } | Self::MerkleUpdate { .. })
    }

    pub fn exotic_type(&self) -> Option<ExoticType> {
        match self {
            Self::Ordinary => None,
            Self::PrunedBranch { .. } => Some(ExoticType::PrunedBranch),
            Self::LibraryReference { .. } => Some(ExoticType::LibraryReference),
            Self::MerkleProof { .. } => Some(ExoticType::MerkleProof),
            Self::MerkleUpdate { .. } => Some(ExoticType::MerkleUpdate),
        }
    }

    /// Parses the layout of an exotic cell from its data
    fn parse_exotic(bits: &BitString, references: &[Arc<Cell>]) -> Result<Self> {
        let type_byte = bits
            .uint_at(0, 8)
            .map_err(|_| CellError::InvalidExoticCell("missing type byte"))?;
        let ty = ExoticType::from_byte(type_byte as u8)
            .ok_or(CellError::InvalidExoticCell("unknown type"))?;

        let read_hash = |offset: usize| -> Result<CellHash> {
            let bytes = bits.bytes_at(offset, HASH_BITS)?;
            let mut hash = [0u8; 32];
            hash.copy_from_slice(&bytes);
            Ok(hash)
        };
        let read_depth = |offset: usize| -> Result<u16> { Ok(bits.uint_at(offset, DEPTH_BITS)? as u16) };

        match ty {
            // 8 bits type, 8 bits level mask, level x hash, level x depth
            ExoticType::PrunedBranch => {
                let mask = LevelMask::new(bits.uint_at(8, 8)? as u8);
                let level = mask.level() as usize;
                if level == 0 || bits.uint_at(8, 8)? as u8 != mask.to_byte() {
                    return Err(CellError::InvalidExoticCell("invalid pruned branch level mask"));
                }
                if bits.len() != 16 + level * (HASH_BITS + DEPTH_BITS) || !references.is_empty() {
                    return Err(CellError::InvalidExoticCell("invalid pruned branch layout"));
                }

                let hashes = (0..level)
                    .map(|i| read_hash(16 + i * HASH_BITS))
                    .collect::<Result<Vec<_>>>()?;
                let depths = (0..level)
                    .map(|i| read_depth(16 + level * HASH_BITS + i * DEPTH_BITS))
                    .collect::<Result<Vec<_>>>()?;

                Ok(Self::PrunedBranch {
                    mask,
                    hashes,
                    depths,
                })
            }
            // 8 bits type, hash
            ExoticType::LibraryReference => {
                if bits.len() != 8 + HASH_BITS || !references.is_empty() {
                    return Err(CellError::InvalidExoticCell("invalid library cell layout"));
                }
                Ok(Self::LibraryReference { hash: read_hash(8)? })
            }
            // 8 bits type, hash, depth
            ExoticType::MerkleProof => {
                if bits.len() != 8 + HASH_BITS + DEPTH_BITS || references.len() != 1 {
                    return Err(CellError::InvalidExoticCell("invalid merkle proof layout"));
                }
                let hash = read_hash(8)?;
                let depth = read_depth(8 + HASH_BITS)?;
                if references[0].hash_at(0) != hash || references[0].depth_at(0) != depth {
                    return Err(CellError::InvalidExoticCell("merkle proof hash mismatch"));
                }
                Ok(Self::MerkleProof { hash, depth })
            }
            // 8 bits type, 2 x hash, 2 x depth
            ExoticType::MerkleUpdate => {
                if bits.len() != 8 + 2 * (HASH_BITS + DEPTH_BITS) || references.len() != 2 {
                    return Err(CellError::InvalidExoticCell("invalid merkle update layout"));
                }
                let old_hash = read_hash(8)?;
                let new_hash = read_hash(8 + HASH_BITS)?;
                let old_depth = read_depth(8 + 2 * HASH_BITS)?;
                let new_depth = read_depth(8 + 2 * HASH_BITS + DEPTH_BITS)?;
                if references[0].hash_at(0) != old_hash
                    || references[1].hash_at(0) != new_hash
                    || references[0].depth_at(0) != old_depth
                    || references[1].depth_at(0) != new_depth
                {
                    return Err(CellError::InvalidExoticCell("merkle update hash mismatch"));
                }
                Ok(Self::MerkleUpdate {
                    old_hash,
                    new_hash,
                    old_depth,
                    new_depth,
                })
            }
        }
    }
}

/// Represents a cell in the TON blockchain
#[derive(Clone)]
pub struct Cell {
    bits: BitString,
    references: Vec<Arc<Cell>>,
    kind: CellKind,
    level_mask: LevelMask,
    /// One entry per significant level (only the top one for pruned branches)
    hashes: Vec<CellHash>,
    depths: Vec<u16>,
}

impl Cell {
    /// Creates a new empty cell
    pub fn new() -> Self {
        // An empty ordinary cell can not fail to finalize
        Self {
            bits: BitString::new(),
            references: Vec::new(),
            kind: CellKind::Ordinary,
            level_mask: LevelMask::EMPTY,
            hashes: vec![Self::compute_leaf_hash(&BitString::new())],
            depths: vec![0],
        }
    }

    /// Creates an ordinary leaf cell with the given data and bit length
    pub fn with_data(data: Vec<u8>, bit_len: usize) -> Result<Self> {
        let bits = BitString::from_bytes(&data, bit_len)?;
        Self::finalize(bits, Vec::new(), false)
    }

    /// Validates cell parts and computes all hashes and depths
    ///
    /// This is the only way a cell comes into existence; builders and the
    /// BoC decoder both end up here.
    pub fn finalize(bits: BitString, references: Vec<Arc<Cell>>, exotic: bool) -> Result<Self> {
        if references.len() > MAX_CELL_REFS {
            return Err(CellError::refs_overflow(references.len(), MAX_CELL_REFS));
        }

        let kind = if exotic {
            CellKind::parse_exotic(&bits, &references)?
        } else {
            CellKind::Ordinary
        };

        let children_mask = references
            .iter()
            .fold(LevelMask::EMPTY, |mask, r| mask | r.level_mask);
        let level_mask = match &kind {
            CellKind::Ordinary => children_mask,
            CellKind::PrunedBranch { mask, .. } => *mask,
            CellKind::LibraryReference { .. } => LevelMask::EMPTY,
            CellKind::MerkleProof { .. } | CellKind::MerkleUpdate { .. } => {
                children_mask.virtualize(1)
            }
        };

        let mut cell = Self {
            bits,
            references,
            kind,
            level_mask,
            hashes: Vec::with_capacity(level_mask.level() as usize + 1),
            depths: Vec::with_capacity(level_mask.level() as usize + 1),
        };
        cell.compute_hashes()?;
        Ok(cell)
    }

    fn compute_leaf_hash(bits: &BitString) -> CellHash {
        let mut hasher = Sha256::new();
        hasher.update([0u8, Self::bits_descriptor(bits.len())]);
        hasher.update(bits.to_tagged_bytes());
        hasher.finalize().into()
    }

    fn compute_hashes(&mut self) -> Result<()> {
        let top_level = self.level_mask.top_level();
        let level_offset = self.kind.is_merkle() as u8;
        let is_pruned = matches!(self.kind, CellKind::PrunedBranch { .. });

        for level in 0..=top_level {
            if !self.level_mask.is_significant(level) {
                continue;
            }
            // Pruned branches only compute their top hash, the rest is embedded
            if is_pruned && level != top_level {
                continue;
            }

            let mut hasher = Sha256::new();
            hasher.update(self.descriptors_with_mask(self.level_mask.apply(level)));

            match self.hashes.last() {
                Some(prev_hash) if level > 0 && !is_pruned => hasher.update(prev_hash),
                _ => hasher.update(self.bits.to_tagged_bytes()),
            }

            let mut depth = 0u16;
            for child in &self.references {
                let child_depth = child.depth_at(level + level_offset);
                depth = depth.max(child_depth.checked_add(1).ok_or(CellError::DepthOverflow)?);
                hasher.update(child_depth.to_be_bytes());
            }
            for child in &self.references {
                hasher.update(child.hash_at(level + level_offset));
            }

            self.hashes.push(hasher.finalize().into());
            self.depths.push(depth);
        }

        Ok(())
    }

    /// Returns the cell's bits
    pub fn bits(&self) -> &BitString {
        &self.bits
    }

    /// Returns the cell's data
    pub fn data(&self) -> &[u8] {
        self.bits.as_bytes()
    }

    /// Returns the number of bits in the cell (not necessarily a multiple of 8)
    pub fn bit_len(&self) -> usize {
        self.bits.len()
    }

    /// Returns the cell's references
    pub fn references(&self) -> &[Arc<Cell>] {
        &self.references
    }

    /// Returns the number of references
    pub fn reference_count(&self) -> usize {
        self.references.len()
    }

    /// Gets a reference by index
    pub fn reference(&self, index: usize) -> Option<&Arc<Cell>> {
        self.references.get(index)
    }

    pub fn kind(&self) -> &CellKind {
        &self.kind
    }

    /// Returns whether this is an exotic (special) cell
    pub fn is_exotic(&self) -> bool {
        self.kind.is_exotic()
    }

    pub fn level_mask(&self) -> LevelMask {
        self.level_mask
    }

    /// Returns the cell's level
    pub fn level(&self) -> u8 {
        self.level_mask.level()
    }

    fn bits_descriptor(bit_len: usize) -> u8 {
        // floor(b/8) + ceil(b/8)
        (bit_len / 8 + bit_len.div_ceil(8)) as u8
    }

    fn descriptors_with_mask(&self, mask: LevelMask) -> [u8; 2] {
        // r + 8*s + 32*l
        let refs_descriptor =
            self.references.len() as u8 + if self.is_exotic() { 8 } else { 0 } + mask.to_byte() * 32;
        [refs_descriptor, Self::bits_descriptor(self.bits.len())]
    }

    /// Computes the cell's descriptors (2 bytes)
    pub fn descriptors(&self) -> [u8; 2] {
        self.descriptors_with_mask(self.level_mask)
    }

    /// Serializes the cell data with the completion tag if needed
    pub fn serialize_data(&self) -> Vec<u8> {
        self.bits.to_tagged_bytes()
    }

    /// Returns the hash of the cell at the given Merkle level
    pub fn hash_at(&self, level: u8) -> CellHash {
        let hash_index = self.level_mask.hash_index(level) as usize;
        match &self.kind {
            CellKind::PrunedBranch { hashes, .. } if hash_index < hashes.len() => {
                hashes[hash_index]
            }
            CellKind::PrunedBranch { .. } => self.hashes[0],
            _ => self.hashes[hash_index],
        }
    }

    /// Returns the depth of the cell at the given Merkle level
    pub fn depth_at(&self, level: u8) -> u16 {
        let hash_index = self.level_mask.hash_index(level) as usize;
        match &self.kind {
            CellKind::PrunedBranch { depths, .. } if hash_index < depths.len() => {
                depths[hash_index]
            }
            CellKind::PrunedBranch { .. } => self.depths[0],
            _ => self.depths[hash_index],
        }
    }

    /// Computes the representation hash of the cell
    pub fn hash(&self) -> CellHash {
        self.hash_at(MAX_CELL_LEVEL)
    }

    /// Computes the depth of the cell
    pub fn depth(&self) -> u16 {
        self.depth_at(MAX_CELL_LEVEL)
    }

    /// Representation hash as a lower-case hex string
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash())
    }

    /// Creates a pruned branch standing in for `cell` at the given Merkle depth
    pub fn pruned_branch(cell: &Cell, merkle_depth: u8) -> Result<Arc<Cell>> {
        if merkle_depth >= MAX_CELL_LEVEL || (1 << merkle_depth) <= cell.level_mask.to_byte() {
            return Err(CellError::InvalidExoticCell("invalid pruned branch merkle depth"));
        }
        let mask = LevelMask::new(cell.level_mask.to_byte() | (1 << merkle_depth));

        let mut bits = BitString::new();
        bits.write_uint(ExoticType::PrunedBranch as u64, 8)?;
        bits.write_uint(mask.to_byte() as u64, 8)?;

        let levels = (0..=MAX_CELL_LEVEL)
            .filter(|&level| cell.level_mask.is_significant(level))
            .collect::<Vec<_>>();
        for &level in &levels {
            bits.write_bytes(&cell.hash_at(level))?;
        }
        for &level in &levels {
            bits.write_uint(cell.depth_at(level) as u64, DEPTH_BITS)?;
        }

        Ok(Arc::new(Self::finalize(bits, Vec::new(), true)?))
    }

    /// Creates a library reference cell for the library with the given hash
    pub fn library(hash: &CellHash) -> Result<Arc<Cell>> {
        let mut bits = BitString::new();
        bits.write_uint(ExoticType::LibraryReference as u64, 8)?;
        bits.write_bytes(hash)?;
        Ok(Arc::new(Self::finalize(bits, Vec::new(), true)?))
    }

    /// Wraps `cell` into a Merkle proof cell
    pub fn merkle_proof(cell: Arc<Cell>) -> Result<Arc<Cell>> {
        let mut bits = BitString::new();
        bits.write_uint(ExoticType::MerkleProof as u64, 8)?;
        bits.write_bytes(&cell.hash_at(0))?;
        bits.write_uint(cell.depth_at(0) as u64, DEPTH_BITS)?;
        Ok(Arc::new(Self::finalize(bits, vec![cell], true)?))
    }

    /// Creates a Merkle update cell between two states
    pub fn merkle_update(old: Arc<Cell>, new: Arc<Cell>) -> Result<Arc<Cell>> {
        let mut bits = BitString::new();
        bits.write_uint(ExoticType::MerkleUpdate as u64, 8)?;
        bits.write_bytes(&old.hash_at(0))?;
        bits.write_bytes(&new.hash_at(0))?;
        bits.write_uint(old.depth_at(0) as u64, DEPTH_BITS)?;
        bits.write_uint(new.depth_at(0) as u64, DEPTH_BITS)?;
        Ok(Arc::new(Self::finalize(bits, vec![old, new], true)?))
    }

    fn fmt_tree(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let prefix = if self.is_exotic() { "s" } else { "x" };
        writeln!(f, "{:indent$}{prefix}{{{}}}", "", self.bits.to_hex(), indent = indent)?;
        for reference in &self.references {
            reference.fmt_tree(f, indent + 1)?;
        }
        Ok(())
    }
}

impl Default for Cell {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash()
    }
}

impl Eq for Cell {}

impl std::hash::Hash for Cell {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        Cell::hash(self).hash(state);
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("kind", &self.kind.exotic_type())
            .field("bits", &self.bits)
            .field("references", &self.references.len())
            .field("hash", &self.hash_hex())
            .finish()
    }
}

/// Prints the cell tree in the usual `x{...}` notation
impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_tree(f, 0)
    }
}
