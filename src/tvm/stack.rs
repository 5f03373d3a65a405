//! Get-method stack values and their cell representation
//!
//! ```text
//! vm_stk_null#00 = VmStackValue;
//! vm_stk_tinyint#01 value:int64 = VmStackValue;
//! vm_stk_int#0201_ value:int257 = VmStackValue;
//! vm_stk_nan#02ff = VmStackValue;
//! vm_stk_cell#03 cell:^Cell = VmStackValue;
//! vm_stk_slice#04 _:VmCellSlice = VmStackValue;
//! vm_stk_builder#05 cell:^Cell = VmStackValue;
//! vm_stk_tuple#07 len:(## 16) data:(VmTuple len) = VmStackValue;
//! vm_stack#_ depth:(## 24) stack:(VmStackList depth) = VmStack;
//! ```

use crate::tvm::address::Address;
use crate::tvm::builder::CellBuilder;
use crate::tvm::cell::Cell;
use crate::tvm::error::{CellError, Result};
use crate::tvm::slice::CellSlice;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use std::sync::Arc;

const TAG_NULL: u8 = 0x00;
const TAG_TINY_INT: u8 = 0x01;
const TAG_INT_OR_NAN: u8 = 0x02;
const TAG_CELL: u8 = 0x03;
const TAG_SLICE: u8 = 0x04;
const TAG_BUILDER: u8 = 0x05;
const TAG_CONT: u8 = 0x06;
const TAG_TUPLE: u8 = 0x07;

const INT_BITS: usize = 257;
const STACK_DEPTH_BITS: usize = 24;

/// A single value of the TVM stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackValue {
    Null,
    Int(BigInt),
    Nan,
    Cell(Arc<Cell>),
    Slice(CellSlice),
    /// Contents of a builder, finalized into a cell
    Builder(Arc<Cell>),
    Tuple(Vec<StackValue>),
}

impl StackValue {
    pub fn as_int(&self) -> Option<&BigInt> {
        match self {
            Self::Int(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_cell(&self) -> Option<&Arc<Cell>> {
        match self {
            Self::Cell(cell) => Some(cell),
            _ => None,
        }
    }

    pub fn as_slice(&self) -> Option<&CellSlice> {
        match self {
            Self::Slice(slice) => Some(slice),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[StackValue]> {
        match self {
            Self::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// Reads a message address from a slice (or cell) value
    pub fn as_address(&self) -> Result<Option<Address>> {
        let mut slice = match self {
            Self::Slice(slice) => slice.clone(),
            Self::Cell(cell) => CellSlice::begin_parse(cell),
            _ => return Err(CellError::UnexpectedStackValue("expected a slice")),
        };
        slice.load_address()
    }

    /// Appends the value to a builder
    pub fn store_into(&self, builder: &mut CellBuilder) -> Result<()> {
        match self {
            Self::Null => {
                builder.store_u8(TAG_NULL)?;
            }
            Self::Int(value) => match value.to_i64() {
                Some(small) => {
                    builder.store_u8(TAG_TINY_INT)?.store_int(small, 64)?;
                }
                None => {
                    builder
                        .store_uint(0x0100, 15)?
                        .store_big_int(value, INT_BITS)?;
                }
            },
            Self::Nan => {
                builder.store_u16(0x02ff)?;
            }
            Self::Cell(cell) => {
                builder.store_u8(TAG_CELL)?.store_ref(cell.clone())?;
            }
            Self::Slice(slice) => {
                // _ cell:^Cell st_bits:(## 10) end_bits:(## 10)
                //   st_ref:(#<= 4) end_ref:(#<= 4) = VmCellSlice;
                let cell = slice.cell();
                builder
                    .store_u8(TAG_SLICE)?
                    .store_ref(cell.clone())?
                    .store_uint(slice.bit_position() as u64, 10)?
                    .store_uint(cell.bit_len() as u64, 10)?
                    .store_uint(slice.ref_position() as u64, 3)?
                    .store_uint(cell.reference_count() as u64, 3)?;
            }
            Self::Builder(cell) => {
                builder.store_u8(TAG_BUILDER)?.store_ref(cell.clone())?;
            }
            Self::Tuple(items) => {
                let len = u16::try_from(items.len())
                    .map_err(|_| CellError::IntOverflow { bits: 16 })?;
                builder.store_u8(TAG_TUPLE)?.store_u16(len)?;
                store_tuple(builder, items)?;
            }
        }
        Ok(())
    }

    /// Reads a value from a slice
    pub fn load_from(slice: &mut CellSlice) -> Result<Self> {
        Ok(match slice.load_u8()? {
            TAG_NULL => Self::Null,
            TAG_TINY_INT => Self::Int(BigInt::from(slice.load_int(64)?)),
            TAG_INT_OR_NAN => match slice.load_uint(7)? {
                0 => Self::Int(slice.load_big_int(INT_BITS)?),
                0x7f if slice.load_bit()? => Self::Nan,
                _ => return Err(CellError::InvalidTag),
            },
            TAG_CELL => Self::Cell(slice.load_ref()?),
            TAG_SLICE => Self::Slice(load_cell_slice(slice)?),
            TAG_BUILDER => Self::Builder(slice.load_ref()?),
            TAG_TUPLE => {
                let len = slice.load_u16()? as usize;
                Self::Tuple(load_tuple(slice, len)?)
            }
            TAG_CONT => {
                log::debug!("continuations on the stack are not supported");
                return Err(CellError::UnexpectedStackValue("continuation"));
            }
            _ => return Err(CellError::InvalidTag),
        })
    }

    /// Serializes the value into a standalone cell
    pub fn to_cell(&self) -> Result<Arc<Cell>> {
        let mut builder = CellBuilder::new();
        self.store_into(&mut builder)?;
        builder.end_cell()
    }

    /// Parses a standalone value cell, rejecting unread data
    pub fn from_cell(cell: &Arc<Cell>) -> Result<Self> {
        let mut slice = CellSlice::begin_parse(cell);
        let value = Self::load_from(&mut slice)?;
        slice.end_parse()?;
        Ok(value)
    }
}

impl From<i64> for StackValue {
    fn from(value: i64) -> Self {
        Self::Int(BigInt::from(value))
    }
}

impl From<BigInt> for StackValue {
    fn from(value: BigInt) -> Self {
        Self::Int(value)
    }
}

impl From<Arc<Cell>> for StackValue {
    fn from(cell: Arc<Cell>) -> Self {
        Self::Cell(cell)
    }
}

impl From<CellSlice> for StackValue {
    fn from(slice: CellSlice) -> Self {
        Self::Slice(slice)
    }
}

fn load_cell_slice(slice: &mut CellSlice) -> Result<CellSlice> {
    let cell = slice.load_ref()?;
    let st_bits = slice.load_uint(10)? as usize;
    let end_bits = slice.load_uint(10)? as usize;
    let st_ref = slice.load_uint(3)? as usize;
    let end_ref = slice.load_uint(3)? as usize;

    if st_bits > end_bits || end_bits > cell.bit_len() {
        return Err(CellError::bits_underflow(end_bits, cell.bit_len()));
    }
    if st_ref > end_ref || end_ref > cell.reference_count() {
        return Err(CellError::refs_underflow(end_ref, cell.reference_count()));
    }

    if end_bits == cell.bit_len() && end_ref == cell.reference_count() {
        let mut result = CellSlice::new(cell);
        result.skip_bits(st_bits)?;
        result.skip_refs(st_ref)?;
        return Ok(result);
    }

    // The window ends before the cell does, so copy it out
    let mut builder = CellBuilder::new();
    builder.store_bit_string(&cell.bits().substring(st_bits, end_bits - st_bits)?)?;
    for reference in &cell.references()[st_ref..end_ref] {
        builder.store_ref(reference.clone())?;
    }
    builder.to_slice()
}

/// Stores `VmTuple n` for `n = items.len()`
fn store_tuple(builder: &mut CellBuilder, items: &[StackValue]) -> Result<()> {
    // vm_tuple_tcons$_ head:(VmTupleRef n) tail:^VmStackValue = VmTuple (n + 1);
    let Some((last, head)) = items.split_last() else {
        return Ok(());
    };
    store_tuple_ref(builder, head)?;
    builder.store_ref(last.to_cell()?)?;
    Ok(())
}

/// Stores `VmTupleRef n` for `n = items.len()`
fn store_tuple_ref(builder: &mut CellBuilder, items: &[StackValue]) -> Result<()> {
    match items {
        [] => {}
        [single] => {
            builder.store_ref(single.to_cell()?)?;
        }
        _ => {
            let mut inner = CellBuilder::new();
            store_tuple(&mut inner, items)?;
            builder.store_ref(inner.end_cell()?)?;
        }
    }
    Ok(())
}

fn load_tuple(slice: &mut CellSlice, len: usize) -> Result<Vec<StackValue>> {
    if len == 0 {
        return Ok(Vec::new());
    }
    let mut items = load_tuple_ref(slice, len - 1)?;
    items.push(StackValue::from_cell(&slice.load_ref()?)?);
    Ok(items)
}

fn load_tuple_ref(slice: &mut CellSlice, len: usize) -> Result<Vec<StackValue>> {
    match len {
        0 => Ok(Vec::new()),
        1 => Ok(vec![StackValue::from_cell(&slice.load_ref()?)?]),
        _ => {
            let inner = slice.load_ref()?;
            let mut inner = CellSlice::new(inner);
            let items = load_tuple(&mut inner, len)?;
            inner.end_parse()?;
            Ok(items)
        }
    }
}

/// TVM stack, the last value is the top
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VmStack {
    values: Vec<StackValue>,
}

impl VmStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn push(&mut self, value: impl Into<StackValue>) {
        self.values.push(value.into());
    }

    pub fn pop(&mut self) -> Option<StackValue> {
        self.values.pop()
    }

    /// Value at `index`, counting from the bottom
    pub fn get(&self, index: usize) -> Option<&StackValue> {
        self.values.get(index)
    }

    pub fn values(&self) -> &[StackValue] {
        &self.values
    }

    pub fn into_values(self) -> Vec<StackValue> {
        self.values
    }

    /// Serializes the stack into a `VmStack` cell
    pub fn to_cell(&self) -> Result<Arc<Cell>> {
        let depth = self.values.len();
        if depth >= 1 << STACK_DEPTH_BITS {
            return Err(CellError::IntOverflow {
                bits: STACK_DEPTH_BITS,
            });
        }

        let mut builder = CellBuilder::new();
        builder.store_uint(depth as u64, STACK_DEPTH_BITS)?;

        // vm_stk_cons#_ rest:^(VmStackList n) tos:VmStackValue = VmStackList (n + 1);
        if let Some((top, rest)) = self.values.split_last() {
            let mut list = Arc::new(Cell::new());
            for value in rest {
                let mut cons = CellBuilder::new();
                cons.store_ref(list)?;
                value.store_into(&mut cons)?;
                list = cons.end_cell()?;
            }
            builder.store_ref(list)?;
            top.store_into(&mut builder)?;
        }

        builder.end_cell()
    }

    /// Parses a `VmStack` cell
    pub fn from_cell(cell: &Arc<Cell>) -> Result<Self> {
        let mut slice = CellSlice::begin_parse(cell);
        let depth = slice.load_uint(STACK_DEPTH_BITS)? as usize;
        log::trace!("decoding VM stack of depth {depth}");

        let mut values = Vec::with_capacity(depth.min(1024));
        for _ in 0..depth {
            let rest = slice.load_ref()?;
            values.push(StackValue::load_from(&mut slice)?);
            slice.end_parse()?;
            slice = CellSlice::new(rest);
        }
        slice.end_parse()?;

        values.reverse();
        Ok(Self { values })
    }
}

impl From<Vec<StackValue>> for VmStack {
    fn from(values: Vec<StackValue>) -> Self {
        Self { values }
    }
}
