use crc::{CRC_16_XMODEM, Crc};

/// CRC16 used by user-friendly addresses and get-method ids
pub const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// CRC32 (IEEE) of a bag of cells, stored little-endian after the cell data
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}
