//! Contract deployment state
//!
//! ```text
//! _ split_depth:(Maybe (## 5)) special:(Maybe TickTock)
//!   code:(Maybe ^Cell) data:(Maybe ^Cell)
//!   library:(HashmapE 256 SimpleLib) = StateInit;
//! ```

use crate::tvm::address::Address;
use crate::tvm::builder::CellBuilder;
use crate::tvm::cell::Cell;
use crate::tvm::dict::Dict;
use crate::tvm::error::{CellError, Result};
use crate::tvm::slice::CellSlice;
use std::sync::Arc;

/// Key width of the library dictionary
pub const LIBRARY_KEY_BITS: usize = 256;

const SPLIT_DEPTH_BITS: usize = 5;

/// Special transactions execution flags
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickTock {
    /// Account is called at the beginning of each block
    pub tick: bool,
    /// Account is called at the end of each block
    pub tock: bool,
}

/// Initial code and data of a smart contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateInit {
    /// Optional split depth for large smart contracts (at most 30)
    pub split_depth: Option<u8>,
    pub special: Option<TickTock>,
    pub code: Option<Arc<Cell>>,
    pub data: Option<Arc<Cell>>,
    /// Libraries keyed by their representation hash
    pub library: Dict,
}

impl Default for StateInit {
    fn default() -> Self {
        Self {
            split_depth: None,
            special: None,
            code: None,
            data: None,
            library: Dict::new(LIBRARY_KEY_BITS),
        }
    }
}

impl StateInit {
    /// Creates a state with code and data only
    pub fn new(code: Arc<Cell>, data: Arc<Cell>) -> Self {
        Self {
            code: Some(code),
            data: Some(data),
            ..Self::default()
        }
    }

    /// Appends the state to a builder
    pub fn store_into(&self, builder: &mut CellBuilder) -> Result<()> {
        match self.split_depth {
            Some(depth) => {
                if depth > 30 {
                    return Err(CellError::IntOverflow {
                        bits: SPLIT_DEPTH_BITS,
                    });
                }
                builder.store_bit(true)?.store_uint(depth as u64, SPLIT_DEPTH_BITS)?;
            }
            None => {
                builder.store_bit(false)?;
            }
        }

        match self.special {
            Some(flags) => {
                builder
                    .store_bit(true)?
                    .store_bit(flags.tick)?
                    .store_bit(flags.tock)?;
            }
            None => {
                builder.store_bit(false)?;
            }
        }

        builder
            .store_maybe_ref(self.code.clone())?
            .store_maybe_ref(self.data.clone())?
            .store_dict(Some(&self.library))?;
        Ok(())
    }

    /// Reads the state from a slice
    pub fn load_from(slice: &mut CellSlice) -> Result<Self> {
        let split_depth = if slice.load_bit()? {
            Some(slice.load_uint(SPLIT_DEPTH_BITS)? as u8)
        } else {
            None
        };
        let special = if slice.load_bit()? {
            Some(TickTock {
                tick: slice.load_bit()?,
                tock: slice.load_bit()?,
            })
        } else {
            None
        };

        Ok(Self {
            split_depth,
            special,
            code: slice.load_maybe_ref()?,
            data: slice.load_maybe_ref()?,
            library: slice.load_dict(LIBRARY_KEY_BITS)?,
        })
    }

    /// Builds the `StateInit` cell
    pub fn to_cell(&self) -> Result<Arc<Cell>> {
        let mut builder = CellBuilder::new();
        self.store_into(&mut builder)?;
        builder.end_cell()
    }

    /// Parses a `StateInit` cell, rejecting unread data
    pub fn from_cell(cell: &Arc<Cell>) -> Result<Self> {
        let mut slice = CellSlice::begin_parse(cell);
        let state = Self::load_from(&mut slice)?;
        slice.end_parse()?;
        Ok(state)
    }

    /// Address of the contract deployed with this state
    pub fn address(&self, workchain: i8) -> Result<Address> {
        let cell = self.to_cell()?;
        log::trace!("state init hash {}", cell.hash_hex());
        Ok(Address::new(workchain, cell.hash()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tvm::dict::DictKey;

    fn byte_cell(byte: u8) -> Arc<Cell> {
        let mut builder = CellBuilder::new();
        builder.store_u8(byte).unwrap();
        builder.end_cell().unwrap()
    }

    #[test]
    fn test_empty_state_init() {
        let cell = StateInit::default().to_cell().unwrap();
        assert_eq!(cell.bit_len(), 5);
        assert_eq!(cell.reference_count(), 0);
        assert_eq!(StateInit::from_cell(&cell).unwrap(), StateInit::default());
    }

    #[test]
    fn test_code_and_data_layout() {
        let state = StateInit::new(byte_cell(1), byte_cell(2));
        let cell = state.to_cell().unwrap();

        // 0 0 1 1 0
        assert_eq!(cell.bit_len(), 5);
        assert_eq!(cell.data(), &[0b0011_0000]);
        assert_eq!(cell.reference_count(), 2);
        assert_eq!(cell.reference(0).unwrap(), &byte_cell(1));

        assert_eq!(StateInit::from_cell(&cell).unwrap(), state);
    }

    #[test]
    fn test_full_state_init() {
        let mut library = Dict::new(LIBRARY_KEY_BITS);
        let lib_code = byte_cell(7);
        let mut lib = CellBuilder::new();
        lib.store_bit(true).unwrap().store_ref(lib_code.clone()).unwrap();
        library
            .set(DictKey::from_hash(&lib_code.hash()), lib.end_cell().unwrap())
            .unwrap();

        let state = StateInit {
            split_depth: Some(4),
            special: Some(TickTock {
                tick: true,
                tock: false,
            }),
            code: Some(byte_cell(1)),
            data: None,
            library,
        };
        let cell = state.to_cell().unwrap();
        assert_eq!(cell.bit_len(), 1 + 5 + 1 + 2 + 3);
        assert_eq!(StateInit::from_cell(&cell).unwrap(), state);
    }

    #[test]
    fn test_invalid_split_depth() {
        let state = StateInit {
            split_depth: Some(31),
            ..StateInit::default()
        };
        assert!(state.to_cell().is_err());
    }

    #[test]
    fn test_address() {
        let state = StateInit::new(byte_cell(1), byte_cell(2));
        let address = state.address(-1).unwrap();
        assert_eq!(address.workchain, -1);
        assert_eq!(address.hash_part, state.to_cell().unwrap().hash());
    }

    #[test]
    fn test_trailing_data_rejected() {
        let mut builder = CellBuilder::new();
        StateInit::default().store_into(&mut builder).unwrap();
        builder.store_bit(true).unwrap();
        let cell = builder.end_cell().unwrap();
        assert!(matches!(
            StateInit::from_cell(&cell).unwrap_err(),
            CellError::TrailingData { bits: 1, refs: 0 }
        ));
    }
}
