//! Sets constants for the on-disk layouts of the row file and the descriptor file.
//!
//! Both files are a fixed-size header followed by records. Row records are variable length, so
//! only their fixed-size prefix is described here.

use std::mem::size_of;

pub const U8_SIZE: usize = size_of::<u8>();
pub const U32_SIZE: usize = size_of::<u32>();
pub const U64_SIZE: usize = size_of::<u64>();
pub const F32_SIZE: usize = size_of::<f32>();
pub const F64_SIZE: usize = size_of::<f64>();

//for the whole row file
pub const HEADER_CURSOR_START: usize = 0;
pub const HEADER_CURSOR_SIZE: usize = U64_SIZE;

pub const FILE_DATA_START: usize = HEADER_CURSOR_START + HEADER_CURSOR_SIZE;

//for a single row
pub const NODE_ID_START: usize = 0;
pub const NODE_ID_SIZE: usize = U64_SIZE;

pub const HAS_PARENT_START: usize = NODE_ID_START + NODE_ID_SIZE;
pub const HAS_PARENT_SIZE: usize = U8_SIZE;

pub const PARENT_ID_START: usize = HAS_PARENT_START + HAS_PARENT_SIZE;
pub const PARENT_ID_SIZE: usize = U64_SIZE;

pub const CHILD_SLOT_START: usize = PARENT_ID_START + PARENT_ID_SIZE;
pub const CHILD_SLOT_SIZE: usize = U32_SIZE;

pub const KIND_START: usize = CHILD_SLOT_START + CHILD_SLOT_SIZE;
pub const KIND_SIZE: usize = U8_SIZE;

pub const KEY_COUNT_START: usize = KIND_START + KIND_SIZE;
pub const KEY_COUNT_SIZE: usize = U32_SIZE;

pub const ROW_PREFIX_SIZE: usize = KEY_COUNT_START + KEY_COUNT_SIZE;

pub const KEY_SIZE: usize = U64_SIZE;
pub const RANGE_COUNT_SIZE: usize = U32_SIZE;
pub const RANGE_SIZE: usize = 2 * F64_SIZE;

//for the descriptor database file
pub const ENTRIES_START: usize = 0;
pub const ENTRIES_SIZE: usize = U64_SIZE;

pub const DIM_START: usize = ENTRIES_START + ENTRIES_SIZE;
pub const DIM_SIZE: usize = U64_SIZE;

pub const DATABASE_DATA_START: usize = DIM_START + DIM_SIZE;

/// Size in bytes of one fixed-width descriptor record
pub fn descriptor_record_size(dim: usize) -> usize {
    return dim * F32_SIZE;
}

/// Size in bytes of a whole row given its key and range counts
pub fn row_size(num_keys: usize, num_ranges: usize) -> usize {
    return ROW_PREFIX_SIZE + (num_keys * KEY_SIZE) + RANGE_COUNT_SIZE + (num_ranges * RANGE_SIZE);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_prefix_is_packed() {
        assert_eq!(ROW_PREFIX_SIZE, 8 + 1 + 8 + 4 + 1 + 4);
        assert_eq!(row_size(0, 0), ROW_PREFIX_SIZE + 4);
        assert_eq!(row_size(3, 9), ROW_PREFIX_SIZE + 24 + 4 + 144);
    }

    #[test]
    fn descriptor_records_are_f32() {
        assert_eq!(descriptor_record_size(8), 32);
        assert_eq!(DATABASE_DATA_START, 16);
    }
}
