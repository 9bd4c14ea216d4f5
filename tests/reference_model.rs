//! Long-running equivalence checks against a naive `Vec<bool>` model.

use dbits::{DynamicBitVector, Error};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[test]
fn random_inserts_match_reference_vector() {
    let mut rng = StdRng::seed_from_u64(0x5EED_D817);
    let mut v = DynamicBitVector::new(100_000).unwrap();
    let mut model: Vec<bool> = Vec::with_capacity(100_000);

    for step in 0..99_999usize {
        let at = rng.gen_range(0..=model.len());
        let bit = rng.gen_bool(0.5);
        v.insert(at, bit).unwrap();
        model.insert(at, bit);
        if step % 8192 == 8191 {
            v.validate().unwrap();
            for (i, &b) in model.iter().enumerate() {
                assert_eq!(v.get(i).unwrap(), b, "bit {i} after {step} inserts");
            }
        }
    }

    v.validate().unwrap();
    assert_eq!(v.len(), 99_999);
    assert_eq!(v.count_ones(), model.iter().filter(|&&b| b).count());
    for (i, &b) in model.iter().enumerate() {
        assert_eq!(v.get(i).unwrap(), b, "bit {i}");
    }
}

#[test]
fn narrow_node_tree_matches_reference_vector() {
    let mut rng = StdRng::seed_from_u64(0xD817);
    let mut v = DynamicBitVector::with_node_width(20_000, 64).unwrap();
    let mut model: Vec<bool> = Vec::new();

    for step in 0..10_000usize {
        let at = rng.gen_range(0..=model.len());
        let bit = rng.gen_bool(0.3);
        v.insert(at, bit).unwrap();
        model.insert(at, bit);
        if step % 2048 == 2047 {
            v.validate().unwrap();
            for (i, &b) in model.iter().enumerate() {
                assert_eq!(v.get(i).unwrap(), b, "bit {i} after {step} inserts");
            }
        }
    }

    assert!(v.height() >= 3);
    v.validate().unwrap();
    for (i, &b) in model.iter().enumerate() {
        assert_eq!(v.get(i).unwrap(), b, "bit {i}");
    }
}

#[test]
fn append_only_fill_to_capacity() {
    let mut v = DynamicBitVector::new(10_000).unwrap();
    for i in 0..10_000 {
        v.push_back(i % 2 == 0).unwrap();
    }
    assert!(v.is_full());
    assert!(matches!(v.push_back(true), Err(Error::CapacityExhausted)));
    v.validate().unwrap();
    assert_eq!(v.count_ones(), 5_000);
    for i in (0..10_000).step_by(37) {
        assert_eq!(v.get(i).unwrap(), i % 2 == 0, "bit {i}");
    }
}

#[test]
fn split_threshold_boundary_reshapes_window() {
    // node_width 64 gives degree 4 and window width b = 2: a window of
    // two leaves must be extended once it carries b * (64 - b) = 124
    // bits, and every leaf it leaves behind holds at least 124 / 3 = 41.
    let mut v = DynamicBitVector::with_node_width(4096, 64).unwrap();
    let mut model: Vec<bool> = Vec::new();

    for i in 0..64 {
        v.push_back(i % 3 == 0).unwrap();
        model.push(i % 3 == 0);
    }
    v.insert(0, true).unwrap();
    model.insert(0, true);
    assert_eq!(v.used_leaves(), 2);

    // Back to a full front leaf plus a 60-bit neighbour: 124 bits in
    // the window, exactly on the threshold.
    for i in 0..31 {
        v.insert(0, i % 2 == 1).unwrap();
        model.insert(0, i % 2 == 1);
    }
    for i in 0..28 {
        v.push_back(i % 5 == 0).unwrap();
        model.push(i % 5 == 0);
    }
    assert_eq!(v.len(), 124);
    assert_eq!(v.used_leaves(), 2);
    v.validate().unwrap();

    // The boundary insert must allocate exactly one fresh leaf; a
    // strict-inequality regression would keep spreading over two.
    v.insert(0, true).unwrap();
    model.insert(0, true);
    assert_eq!(v.used_leaves(), 3);
    v.validate().unwrap();

    assert_eq!(v.len(), model.len());
    assert_eq!(v.count_ones(), model.iter().filter(|&&b| b).count());
    for (i, &b) in model.iter().enumerate() {
        assert_eq!(v.get(i).unwrap(), b, "bit {i}");
    }
}

#[test]
fn interleaved_sets_track_rank() {
    let mut rng = StdRng::seed_from_u64(0xBEEF);
    let mut v = DynamicBitVector::new(8_192).unwrap();
    let mut model: Vec<bool> = Vec::new();

    for _ in 0..6_000 {
        if model.is_empty() || rng.gen_bool(0.7) {
            let at = rng.gen_range(0..=model.len());
            let bit = rng.gen_bool(0.5);
            v.insert(at, bit).unwrap();
            model.insert(at, bit);
        } else {
            let at = rng.gen_range(0..model.len());
            let bit = rng.gen_bool(0.5);
            v.set(at, bit).unwrap();
            model[at] = bit;
        }
    }

    v.validate().unwrap();
    assert_eq!(v.count_ones(), model.iter().filter(|&&b| b).count());
    for (i, &b) in model.iter().enumerate() {
        assert_eq!(v.get(i).unwrap(), b, "bit {i}");
    }
}
