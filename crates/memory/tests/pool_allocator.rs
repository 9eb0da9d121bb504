use hoard_memory::pool::{GrowthPolicy, Pool, PoolConfig};
use hoard_memory::MemoryError;
use rstest::rstest;

#[test]
fn test_fifth_allocation_expands_once() {
    let pool = Pool::new(16, 4).unwrap();

    let mut blocks: Vec<_> = (0..4).map(|_| pool.allocate().unwrap()).collect();
    assert_eq!(pool.expand_count(), 0);
    assert_eq!(pool.stats().total_blocks, 4);

    blocks.push(pool.allocate().unwrap());
    assert_eq!(pool.expand_count(), 1);
    assert_eq!(pool.stats().total_blocks, 8);
    assert_eq!(pool.allocated_blocks(), 5);

    for block in blocks {
        pool.deallocate(block).unwrap();
    }
    assert_eq!(pool.allocated_blocks(), 0);
}

#[test]
fn test_most_recently_freed_block_is_reused() {
    let pool = Pool::new(32, 8).unwrap();
    let a = pool.allocate().unwrap();
    let b = pool.allocate().unwrap();

    pool.deallocate(a).unwrap();
    pool.deallocate(b).unwrap();

    assert_eq!(pool.allocate().unwrap(), b);
    assert_eq!(pool.allocate().unwrap(), a);
}

#[test]
fn test_growth_never_moves_earlier_blocks() {
    let pool = Pool::new(8, 2).unwrap();
    let first = pool.allocate().unwrap();
    unsafe { first.as_ptr().cast::<u64>().write(0xFEED) };

    // force several chunk additions
    let rest: Vec<_> = (0..30).map(|_| pool.allocate().unwrap()).collect();
    assert!(pool.stats().chunk_count > 2);

    assert!(pool.owns_pointer(first.as_ptr()));
    assert_eq!(unsafe { first.as_ptr().cast::<u64>().read() }, 0xFEED);

    pool.deallocate(first).unwrap();
    for block in rest {
        pool.deallocate(block).unwrap();
    }
}

#[test]
fn test_ownership_is_block_exact() {
    let pool = Pool::new(16, 4).unwrap();
    let block = pool.allocate().unwrap();

    assert!(pool.owns_pointer(block.as_ptr()));
    assert!(!pool.owns_pointer(block.as_ptr().wrapping_add(1)));

    let outside = 0u64;
    assert!(!pool.owns_pointer(core::ptr::from_ref(&outside).cast()));
    assert!(!pool.owns_pointer(core::ptr::null()));
}

#[test]
fn test_foreign_and_double_free_are_distinct_errors() {
    let pool = Pool::new(16, 2).unwrap();
    let other = Pool::new(16, 2).unwrap();

    let stranger = other.allocate().unwrap();
    let err = pool.deallocate(stranger).unwrap_err();
    assert!(matches!(err, MemoryError::ForeignPointer { .. }));
    assert!(err.is_invalid_pointer());

    let block = pool.allocate().unwrap();
    pool.deallocate(block).unwrap();
    let err = pool.deallocate(block).unwrap_err();
    assert!(matches!(err, MemoryError::DoubleFree { .. }));

    let stats = pool.stats();
    assert_eq!(stats.allocated_blocks, 0);
    assert_eq!(stats.total_deallocations, 1);
    assert_eq!(stats.free_blocks, stats.total_blocks);
}

#[rstest]
#[case::disabled(GrowthPolicy::Disabled, None, 4)]
#[case::fixed(GrowthPolicy::Fixed(3), Some(10), 10)]
#[case::double(GrowthPolicy::Double, Some(12), 12)]
fn test_capacity_limits(
    #[case] growth: GrowthPolicy,
    #[case] max_blocks: Option<usize>,
    #[case] expected_capacity: usize,
) {
    let mut config = PoolConfig::new(8, 4).with_growth(growth);
    config.max_blocks = max_blocks;
    let pool = Pool::with_config(config).unwrap();

    let mut blocks = Vec::new();
    let err = loop {
        match pool.allocate() {
            Ok(block) => blocks.push(block),
            Err(err) => break err,
        }
    };

    assert_eq!(blocks.len(), expected_capacity);
    assert!(err.is_retryable());
    assert!(matches!(
        err,
        MemoryError::PoolExhausted { capacity, .. } if capacity == expected_capacity
    ));

    // freeing one block makes allocation possible again
    pool.deallocate(blocks.pop().unwrap()).unwrap();
    assert!(pool.allocate().is_ok());
}

#[test]
fn test_fixed_pool_preset() {
    let pool = Pool::with_config(PoolConfig::fixed(24, 3)).unwrap();
    let _blocks: Vec<_> = (0..3).map(|_| pool.allocate().unwrap()).collect();
    assert!(pool.allocate().is_err());
    assert_eq!(pool.expand_count(), 0);
}

#[rstest]
#[case(0, 8)]
#[case(16, 3)]
#[case(16, 0)]
fn test_invalid_configs_rejected(#[case] block_size: usize, #[case] align: usize) {
    let config = PoolConfig::new(block_size, 4).with_align(align);
    let err = Pool::with_config(config).unwrap_err();
    assert_eq!(err.code(), "MEM:CONFIG:INVALID");
}

#[test]
fn test_initial_capacity_above_cap_rejected() {
    let config = PoolConfig::new(8, 10).with_max_blocks(4);
    assert!(Pool::with_config(config).is_err());
}

#[test]
fn test_manual_expand_adds_chunk() {
    let pool = Pool::new(64, 1).unwrap();
    pool.expand(7).unwrap();

    let stats = pool.stats();
    assert_eq!(stats.total_blocks, 8);
    assert_eq!(stats.chunk_count, 2);
    assert_eq!(stats.capacity_bytes, 8 * 64);
    assert_eq!(pool.expand_count(), 1);
}
