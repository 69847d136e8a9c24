//! Any block up to the prepared size arrives bit-exact on the next callback

mod common;

use std::cell::RefCell;

use proptest::collection::vec;
use proptest::prelude::*;
use proptest::test_runner::{Config, TestRunner};

use common::*;

#[test]
fn every_block_size_arrives_intact() {
    let pair = RefCell::new(connected_pair(config(free_port())));

    let block = (1..=BLOCK).prop_flat_map(|n| (vec(-1.0f32..1.0, n), vec(-1.0f32..1.0, n)));
    let mut runner = TestRunner::new(Config::with_cases(48));
    runner
        .run(&block, |(left, right)| {
            let mut guard = pair.borrow_mut();
            let (a, b) = &mut *guard;
            process(a, &left, &right);
            let (out_l, out_r) = receive(b, left.len());
            prop_assert_eq!(out_l, left);
            prop_assert_eq!(out_r, right);
            Ok(())
        })
        .unwrap();

    let (_, b) = pair.into_inner();
    assert_eq!(b.stats().frames_dropped_size_mismatch, 0);
}

#[test]
fn oversized_block_is_truncated_to_prepared_size() {
    let (mut a, mut b) = connected_pair(config(free_port()));

    let left: Vec<f32> = (0..BLOCK * 2).map(|i| i as f32).collect();
    let right: Vec<f32> = left.iter().map(|s| -s).collect();
    let (out_l, _) = process(&mut a, &left, &right);
    assert_eq!(out_l, left);

    let (got_l, got_r) = receive(&mut b, BLOCK);
    assert_eq!(got_l, left[..BLOCK]);
    assert_eq!(got_r, right[..BLOCK]);
}
