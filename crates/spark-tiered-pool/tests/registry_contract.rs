//! `registry_contract` 集成测试：从公开 API 视角验证尺寸类注册、查找与近似匹配。
//!
//! # 测试目标（Why）
//! - 保障注册顺序无关、去重、层级边界与近似匹配的容差判定在重构后保持一致；
//! - 覆盖批量注册的整体校验：任一单位越界时注册表不得出现部分写入。

use std::sync::Arc;

use spark_tiered_pool::{
    BufferPool, PoolError, Tier, TieredPool,
    normalize::{KIB, MIB},
};

/// 每个用例从空注册表开始，与默认 1 KiB 尺寸类隔离。
fn empty_pool(gap_tolerance: usize) -> TieredPool {
    let pool = TieredPool::new(gap_tolerance);
    pool.clear();
    pool
}

#[test]
fn small_unit_registration_is_sorted_and_deduplicated() {
    let cases: [(&[usize], &[usize]); 3] = [
        (&[1, 2, 3], &[KIB, 2 * KIB, 3 * KIB]),
        (&[2, 3, 1], &[KIB, 2 * KIB, 3 * KIB]),
        (&[2, 2, 3], &[2 * KIB, 3 * KIB]),
    ];
    for (units, want) in cases {
        let pool = empty_pool(5 * KIB);
        pool.register_small_unit_classes(units).expect("单位合法");
        assert_eq!(pool.sizes(), want, "输入 {units:?}");
    }
}

#[test]
fn large_unit_registration_is_sorted_and_deduplicated() {
    let cases: [(&[usize], &[usize]); 3] = [
        (&[1, 2, 3], &[MIB, 2 * MIB, 3 * MIB]),
        (&[2, 3, 1], &[MIB, 2 * MIB, 3 * MIB]),
        (&[2, 2, 3], &[2 * MIB, 3 * MIB]),
    ];
    for (units, want) in cases {
        let pool = empty_pool(5 * KIB);
        pool.register_large_unit_classes(units).expect("单位合法");
        assert_eq!(pool.sizes(), want, "输入 {units:?}");
        assert_eq!(pool.registry().large_tier_start(), Some(0));
    }
}

#[test]
fn invalid_units_reject_the_whole_batch() {
    let pool = empty_pool(5 * KIB);
    assert_eq!(
        pool.register_small_unit_classes(&[1, 1024]),
        Err(PoolError::InvalidSize {
            tier: Tier::SmallUnit,
            units: 1024
        })
    );
    assert_eq!(
        pool.register_large_unit_classes(&[0]),
        Err(PoolError::InvalidSize {
            tier: Tier::LargeUnit,
            units: 0
        })
    );
    assert!(pool.sizes().is_empty(), "越界批次不得部分写入");
}

#[test]
fn exact_lookup_is_tier_local() {
    let pool = empty_pool(5 * KIB);
    pool.register_large_unit_classes(&[5, 6, 7, 8])
        .expect("单位合法");

    assert!(pool.lookup_exact(6).is_none());
    assert!(pool.lookup_exact(6 * MIB).is_some());
    assert!(pool.lookup_exact(9 * MIB).is_none());
}

#[test]
fn lookup_returns_the_registered_handle() {
    let pool = empty_pool(5 * KIB);
    assert!(pool.lookup_exact(5 * MIB).is_none());

    let first = Arc::new(BufferPool::new(5 * MIB));
    pool.register_or_replace(5 * MIB, Some(first.clone()))
        .expect("登记显式池");
    let found = pool.lookup_exact(5 * MIB).expect("已登记");
    assert!(Arc::ptr_eq(&found, &first));

    let second = Arc::new(BufferPool::new(5 * MIB));
    pool.register_or_replace(5 * MIB, Some(second.clone()))
        .expect("替换显式池");
    let found = pool.lookup_exact(5 * MIB).expect("替换后仍可命中");
    assert!(Arc::ptr_eq(&found, &second));
    assert_eq!(pool.sizes(), vec![5 * MIB]);
}

#[test]
fn nearest_fit_scenario_across_tiers() {
    let pool = empty_pool(5 * KIB);
    pool.register_large_unit_classes(&[1, 8]).expect("单位合法");
    pool.register_small_unit_classes(&[1, 5]).expect("单位合法");
    assert_eq!(pool.sizes(), vec![KIB, 5 * KIB, MIB, 8 * MIB]);
    assert_eq!(pool.registry().large_tier_start(), Some(2));

    let cases = [
        (255, Some(KIB)),
        (KIB, Some(KIB)),
        (5000, Some(5 * KIB)),
        (7_341_033, Some(8 * MIB)),
        (1_073_741_824, None),
        (MIB, Some(MIB)),
        (MIB + 1, None),
    ];
    for (request, want) in cases {
        let got = pool.nearest_fit(request);
        match want {
            Some(size) => {
                let expected = pool.lookup_exact(size).expect("期望的尺寸类已注册");
                let got = got.unwrap_or_else(|| panic!("{request} 应命中 {size}"));
                assert!(Arc::ptr_eq(&got, &expected), "{request} 应命中 {size}");
            }
            None => assert!(got.is_none(), "{request} 不应命中"),
        }
    }
}

#[test]
fn nearest_fit_never_crosses_into_large_tier() {
    let pool = empty_pool(2 * MIB);
    pool.register_large_unit_classes(&[1]).expect("单位合法");
    // 1000 KiB 属于小单位层级，即便 1 MiB 在容差之内也不跨层匹配。
    assert!(pool.nearest_fit(1000 * KIB).is_none());
}

#[test]
fn gap_tolerance_changes_apply_immediately() {
    let pool = empty_pool(KIB);
    pool.register_small_unit_classes(&[4]).expect("单位合法");
    assert!(pool.nearest_fit(2 * KIB).is_none());

    pool.set_gap_tolerance(2 * KIB);
    assert!(pool.nearest_fit(2 * KIB).is_none(), "松弛恰等于容差不命中");

    pool.set_gap_tolerance(2 * KIB + 1);
    assert!(pool.nearest_fit(2 * KIB).is_some());
}
