//! Cells, Bag of Cells serialization, dictionaries and addresses of the
//! TON blockchain

pub mod cli;
pub mod config;
pub mod crc;
pub mod tvm;
pub mod utils;
