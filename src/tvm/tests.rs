//! Integration tests and additional test coverage for TVM modules

use crate::tvm::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

/// Helper function to create a cell with specific data
fn create_test_cell(data: Vec<u8>, bit_len: usize) -> Arc<Cell> {
    Arc::new(Cell::with_data(data, bit_len).unwrap())
}

fn u32_cell(value: u32) -> Arc<Cell> {
    let mut builder = CellBuilder::new();
    builder.store_u32(value).unwrap();
    builder.end_cell().unwrap()
}

/// Hash of a 32-bit cell holding 42
#[test]
fn test_known_hash() {
    let mut builder = CellBuilder::new();
    builder.store_uint(42, 32).unwrap();
    let cell = builder.end_cell().unwrap();

    assert_eq!(
        cell.hash_hex(),
        "0444bfe0dedc5105513214073b29e308f0dd13642522f0adab9f0ee7244e9898"
    );
}

/// Single 8-bit cell without index and checksum
#[test]
fn test_decode_minimal_boc() {
    let cell = hex_to_boc("b5ee9c720101010100030000022a").unwrap();

    assert_eq!(cell.bit_len(), 8);
    assert_eq!(cell.data(), &[0b0010_1010]);
    assert_eq!(cell.reference_count(), 0);
}

/// A child referenced from two parents is stored once
#[test]
fn test_boc_deduplication() {
    let shared = u32_cell(7);

    let mut left = CellBuilder::new();
    left.store_u8(1).unwrap().store_ref(shared.clone()).unwrap();
    let left = left.end_cell().unwrap();

    let mut right = CellBuilder::new();
    right.store_u8(2).unwrap().store_ref(shared.clone()).unwrap();
    let right = right.end_cell().unwrap();

    let mut root = CellBuilder::new();
    root.store_ref(left).unwrap().store_ref(right).unwrap();
    let root = root.end_cell().unwrap();

    let options = BocOptions {
        has_crc32: false,
        ..BocOptions::default()
    };
    let boc = serialize_boc(&root, &options).unwrap();

    // Cell count follows the magic, flags and offset size bytes
    assert_eq!(boc[6], 4);

    let decoded = deserialize_boc(&boc).unwrap();
    assert_eq!(decoded, root);
    let left_child = decoded.reference(0).unwrap().reference(0).unwrap();
    let right_child = decoded.reference(1).unwrap().reference(0).unwrap();
    assert!(Arc::ptr_eq(left_child, right_child));
}

/// Checksum mismatch is reported as a malformed BoC
#[test]
fn test_boc_checksum_mismatch() {
    let mut boc = serialize_boc(&u32_cell(0xDEADBEEF), &BocOptions::default()).unwrap();
    let last = boc.len() - 1;
    boc[last] ^= 0x01;

    assert!(matches!(
        deserialize_boc(&boc).unwrap_err(),
        CellError::MalformedBoc(BocError::InvalidChecksum { .. })
    ));
}

/// Failed writes leave the builder untouched
#[test]
fn test_builder_capacity_is_atomic() {
    let mut builder = CellBuilder::new();
    builder.store_bits(&[0xFF; 128], 1020).unwrap();

    let err = builder.store_u8(0xAB).unwrap_err();
    assert!(matches!(err, CellError::CapacityExceeded { .. }));
    assert_eq!(builder.bits_len(), 1020);

    for i in 0..MAX_CELL_REFS {
        builder.store_ref(u32_cell(i as u32)).unwrap();
    }
    assert!(builder.store_ref(u32_cell(99)).is_err());
    assert!(builder.store_maybe_ref(Some(u32_cell(99))).is_err());
    assert_eq!(builder.bits_len(), 1020);
    assert_eq!(builder.refs_len(), MAX_CELL_REFS);

    // Three bits still fit
    builder.store_uint(0b101, 3).unwrap();
    let cell = builder.end_cell().unwrap();
    assert_eq!(cell.bit_len(), MAX_CELL_BITS);
}

/// Failed reads leave the slice position untouched
#[test]
fn test_slice_reads_are_atomic() {
    let cell = u32_cell(0x12345678);
    let mut slice = CellSlice::begin_parse(&cell);

    assert_eq!(slice.load_u16().unwrap(), 0x1234);
    assert!(slice.load_u32().is_err());
    assert!(slice.load_ref().is_err());
    assert_eq!(slice.bit_position(), 16);
    assert_eq!(slice.load_u16().unwrap(), 0x5678);
    slice.end_parse().unwrap();
}

/// Builder, BoC and slice together
#[test]
fn test_builder_and_cell_integration() {
    let mut builder = CellBuilder::new();

    let addr = Address::new(0, [1u8; 32]);
    builder.store_address(Some(&addr)).unwrap();
    builder.store_u32(42).unwrap();
    builder.store_bool(true).unwrap();
    builder.store_coins(1_000_000_000).unwrap();
    builder.store_ref(u32_cell(5)).unwrap();

    let cell = builder.end_cell().unwrap();
    let boc = boc_to_base64(&cell, &BocOptions::default()).unwrap();
    let cell = base64_to_boc(&boc).unwrap();

    let mut slice = CellSlice::begin_parse(&cell);
    assert_eq!(slice.load_address().unwrap(), Some(addr));
    assert_eq!(slice.load_u32().unwrap(), 42);
    assert!(slice.load_bool().unwrap());
    assert_eq!(slice.load_coins().unwrap(), 1_000_000_000);
    assert_eq!(slice.load_ref().unwrap(), u32_cell(5));
    slice.end_parse().unwrap();
}

/// Test address and builder integration
#[test]
fn test_address_builder_integration() {
    let mut addr = Address::new(-1, [0x12; 32]);
    addr.set_test_only(true);
    addr.set_bounceable(false);

    let mut builder = CellBuilder::new();
    builder.store_address(Some(&addr)).unwrap();
    let cell = builder.end_cell().unwrap();

    assert_eq!(cell.bit_len(), Address::BITS);

    let key = DictKey::from_address(&addr).unwrap();
    assert_eq!(key.bits(), cell.bits());
}

/// Dictionary stored in a cell and read back
#[test]
fn test_dict_builder_storage() {
    let mut dict = Dict::new(32);
    dict.set_uint(1, 100, 32).unwrap();
    dict.set_uint(2, 200, 32).unwrap();

    let mut builder = CellBuilder::new();
    builder.store_u8(0xAA).unwrap().store_dict(Some(&dict)).unwrap();
    let cell = builder.end_cell().unwrap();
    assert_eq!(cell.bit_len(), 9);
    assert_eq!(cell.reference_count(), 1);

    let mut slice = CellSlice::begin_parse(&cell);
    slice.skip_bits(8).unwrap();
    let loaded = slice.load_dict(32).unwrap();
    assert_eq!(loaded, dict);
    assert_eq!(loaded.get_uint(2, 32).unwrap(), Some(200));
}

/// A 310 byte BoC whose forks share children expands to ten million keys
#[test]
fn test_shared_subtree_dict_is_limited() {
    let root = base64_to_boc(
        "te6ccgECOwEAASoAAQHAAQIBIBACAgEgAwMCASAEBAIBIAUFAgEgBgYCASAHBwIBIAgIAgEgCQkCASAoCgIBIAsZAgEgDBsCASArDQIBIA4fAgEgLQ8CASAuIQIBIBERAgEgEhICASATEwIBIBQUAgEgFRUCASAWFgIBIBcXAgEgKBgCASAaGQIBIBsbAgEgHRsCASAcHAIBIB8fAgEgKx4CASAiHwIBICAgAgEgISECASAlJQIBIC0jAgEgLiQCASAvJQIBIDMmAgFiNicCAUg4OAIBICkpAgEgKioCASArKwIBICwsAgEgLS0CASAuLgIBIC8vAgEgMzACAWI2MQIBIDcyAAnWAAAmbwIBIDQ0AgEgNTUCASA2NgIBIDc3AgEgODgCASA5OQIBIDo6AAnQAAAmbw==",
    )
    .unwrap();
    assert!(root.depth() < 64);

    let mut slice = CellSlice::begin_parse(&root);
    assert_eq!(
        slice.load_dict_with(32, 1000).unwrap_err(),
        CellError::InvalidDictionary("too many entries")
    );
    assert_eq!(
        slice.load_dict(32).unwrap_err(),
        CellError::InvalidDictionary("too many entries")
    );

    let limits = DecodeLimits {
        max_dict_entries: 16,
        ..DecodeLimits::default()
    };
    let dict_root = root.reference(0).unwrap();
    assert!(Dict::from_root_with(dict_root, 32, limits.max_dict_entries).is_err());
}

#[test]
fn test_random_dict_roundtrip() {
    let mut rng = StdRng::seed_from_u64(0x70ce11);

    for round in 0..20 {
        let key_bits = rng.gen_range(1..=64);
        let mut dict = Dict::new(key_bits);
        for _ in 0..rng.gen_range(1..60) {
            let key = if key_bits == 64 {
                rng.r#gen::<u64>()
            } else {
                rng.gen_range(0..1u64 << key_bits)
            };
            dict.set_uint(key, rng.r#gen::<u32>() as u64, 32).unwrap();
        }

        let root = dict.serialize().unwrap().unwrap();
        let boc = serialize_boc(&root, &BocOptions::default()).unwrap();
        let decoded = Dict::from_root(&deserialize_boc(&boc).unwrap(), key_bits).unwrap();
        assert_eq!(decoded, dict, "round {round}, key bits {key_bits}");
    }
}

/// Random trees survive every combination of serialization flags
#[test]
fn test_random_tree_boc_roundtrip() {
    let mut rng = StdRng::seed_from_u64(42);

    fn random_tree(rng: &mut StdRng, depth: usize, pool: &mut Vec<Arc<Cell>>) -> Arc<Cell> {
        let mut builder = CellBuilder::new();
        let bits = rng.gen_range(0..=MAX_CELL_BITS);
        let data = (0..128).map(|_| rng.r#gen::<u8>()).collect::<Vec<_>>();
        builder.store_bits(&data, bits).unwrap();

        if depth > 0 {
            for _ in 0..rng.gen_range(0..=MAX_CELL_REFS) {
                let child = if !pool.is_empty() && rng.gen_bool(0.3) {
                    pool[rng.gen_range(0..pool.len())].clone()
                } else {
                    random_tree(rng, depth - 1, pool)
                };
                builder.store_ref(child).unwrap();
            }
        }

        let cell = builder.end_cell().unwrap();
        pool.push(cell.clone());
        cell
    }

    let mut pool = Vec::new();
    let root = random_tree(&mut rng, 4, &mut pool);

    for flags in 0..8u8 {
        let options = BocOptions {
            has_idx: flags & 1 != 0 || flags & 4 != 0,
            has_crc32: flags & 2 != 0,
            has_cache_bits: flags & 4 != 0,
        };
        let boc = serialize_boc(&root, &options).unwrap();
        let decoded = deserialize_boc(&boc).unwrap();
        assert_eq!(decoded.hash(), root.hash());
        assert_eq!(decoded.depth(), root.depth());
        assert_eq!(serialize_boc(&decoded, &options).unwrap(), boc);
    }
}

/// Merkle proof survives a BoC round trip
#[test]
fn test_merkle_proof_boc() {
    let mut builder = CellBuilder::new();
    builder.store_u8(1).unwrap();
    builder.store_ref(u32_cell(2)).unwrap();
    builder.store_ref(u32_cell(3)).unwrap();
    let tree = builder.end_cell().unwrap();

    // Prune the second branch
    let pruned = Cell::pruned_branch(&u32_cell(3), 0).unwrap();
    let mut builder = CellBuilder::new();
    builder.store_u8(1).unwrap();
    builder.store_ref(u32_cell(2)).unwrap();
    builder.store_ref(pruned).unwrap();
    let partial = builder.end_cell().unwrap();
    assert_eq!(partial.hash_at(0), tree.hash());
    assert_eq!(partial.level(), 1);

    let proof = Cell::merkle_proof(partial).unwrap();
    assert_eq!(proof.level(), 0);

    let boc = serialize_boc(&proof, &BocOptions::default()).unwrap();
    let decoded = deserialize_boc(&boc).unwrap();
    assert_eq!(decoded.hash(), proof.hash());
    match decoded.kind() {
        CellKind::MerkleProof { hash, .. } => assert_eq!(hash, &tree.hash()),
        other => panic!("unexpected kind {other:?}"),
    }
}

/// Snake data spanning several cells
#[test]
fn test_snake_string_integration() {
    let long_string = "This is a very long string that should be split across multiple cells when stored as a snake string. ".repeat(10);

    let mut builder = CellBuilder::new();
    builder.store_snake_string(&long_string, true).unwrap();
    let cell = builder.end_cell().unwrap();
    assert!(cell.reference_count() > 0);

    let boc = serialize_boc(&cell, &BocOptions::default()).unwrap();
    let mut slice = CellSlice::begin_parse(&deserialize_boc(&boc).unwrap());
    assert_eq!(slice.load_u8().unwrap(), 0);
    assert_eq!(slice.load_snake_string().unwrap(), long_string);
}

/// Same contents give the same hash regardless of how they were written
#[test]
fn test_hash_consistency() {
    let cell1 = create_test_cell(vec![0x11, 0x22, 0x33], 24);

    let mut builder = CellBuilder::new();
    builder.store_u8(0x11).unwrap();
    builder.store_u8(0x22).unwrap();
    builder.store_u8(0x33).unwrap();
    let cell2 = builder.end_cell().unwrap();

    let mut builder = CellBuilder::new();
    builder.store_bytes(&[0x11, 0x22, 0x33]).unwrap();
    let cell3 = builder.end_cell().unwrap();

    let mut builder = CellBuilder::new();
    builder.store_uint(0x1, 4).unwrap();
    builder.store_uint(0x12233, 20).unwrap();
    let cell4 = builder.end_cell().unwrap();

    let mut builder = CellBuilder::new();
    builder.store_uint(0x1, 4).unwrap();
    builder.store_uint(0x12234, 20).unwrap();
    let cell5 = builder.end_cell().unwrap();

    assert_eq!(cell1.hash(), cell2.hash());
    assert_eq!(cell2.hash(), cell3.hash());
    assert_eq!(cell3.hash(), cell4.hash());
    assert_ne!(cell4.hash(), cell5.hash());
    assert!(CellBuilder::new().store_uint(0x11, 4).is_err());
}

/// Test edge cases and error conditions
#[test]
fn test_edge_cases() {
    let empty_cell = Cell::new();
    assert_eq!(empty_cell.bit_len(), 0);
    assert_eq!(empty_cell.depth(), 0);

    let max_data = vec![0xFF; MAX_CELL_BITS.div_ceil(8)];
    let max_cell = Cell::with_data(max_data.clone(), MAX_CELL_BITS).unwrap();
    assert_eq!(max_cell.bit_len(), MAX_CELL_BITS);
    assert!(Cell::with_data(max_data, MAX_CELL_BITS + 1).is_err());

    let mut builder = CellBuilder::new();
    builder.store_bit(true).unwrap();
    let mut slice = builder.to_slice().unwrap();
    assert_eq!(slice.bits_left(), 1);
    assert!(slice.load_bit().unwrap());
    assert!(slice.is_empty());
}

/// Depth follows the longest reference chain
#[test]
fn test_depth_chain() {
    let mut cell = u32_cell(0);
    for i in 1..=10u16 {
        let mut builder = CellBuilder::new();
        builder.store_ref(cell).unwrap();
        cell = builder.end_cell().unwrap();
        assert_eq!(cell.depth(), i);
    }
}

/// Contract address from a state init stored in a BoC
#[test]
fn test_state_init_boc() {
    let state = StateInit::new(u32_cell(1), u32_cell(2));
    let cell = state.to_cell().unwrap();
    let boc = boc_to_hex(&cell, &BocOptions::default()).unwrap();

    let decoded = StateInit::from_cell(&hex_to_boc(&boc).unwrap()).unwrap();
    assert_eq!(decoded, state);
    assert_eq!(
        decoded.address(0).unwrap(),
        Address::new(0, cell.hash())
    );
}

/// Stack passed through a BoC
#[test]
fn test_vm_stack_boc() {
    let mut stack = VmStack::new();
    stack.push(StackValue::Tuple(vec![
        StackValue::from(-5i64),
        StackValue::Null,
    ]));
    stack.push(u32_cell(3));

    let boc = serialize_boc(&stack.to_cell().unwrap(), &BocOptions::default()).unwrap();
    let decoded = VmStack::from_cell(&deserialize_boc(&boc).unwrap()).unwrap();
    assert_eq!(decoded, stack);
}
