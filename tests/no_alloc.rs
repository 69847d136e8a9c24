//! `process` must not touch the heap once prepared

mod common;

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::*;
use interconnect_bridge::audio::StereoBuffer;
use interconnect_bridge::plugin::AudioProcessor;

struct CountingAllocator;

static ALLOCATIONS: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static COUNTING: Cell<bool> = const { Cell::new(false) };
}

fn counting() -> bool {
    COUNTING.try_with(Cell::get).unwrap_or(false)
}

unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if counting() {
            ALLOCATIONS.fetch_add(1, Ordering::SeqCst);
        }
        System.alloc(layout)
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if counting() {
            ALLOCATIONS.fetch_add(1, Ordering::SeqCst);
        }
        System.alloc_zeroed(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout);
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if counting() {
            ALLOCATIONS.fetch_add(1, Ordering::SeqCst);
        }
        System.realloc(ptr, layout, new_size)
    }
}

#[global_allocator]
static GLOBAL: CountingAllocator = CountingAllocator;

/// Allocations made by this thread while `f` runs
fn allocations_during(f: impl FnOnce()) -> usize {
    let before = ALLOCATIONS.load(Ordering::SeqCst);
    COUNTING.with(|c| c.set(true));
    f();
    COUNTING.with(|c| c.set(false));
    ALLOCATIONS.load(Ordering::SeqCst) - before
}

#[test]
fn process_never_allocates() {
    let (mut a, mut b) = connected_pair(config(free_port()));

    let mut left = vec![0.25f32; BLOCK];
    let mut right = vec![-0.25f32; BLOCK];
    let mut out_l = vec![0.0f32; BLOCK];
    let mut out_r = vec![0.0f32; BLOCK];

    let mut total = 0;
    for round in 0..200 {
        let n = 1 + round % BLOCK;
        total += allocations_during(|| {
            a.process(&mut StereoBuffer::new(&mut left[..n], &mut right[..n]));
        });
        if round % 2 == 0 {
            wait_until(Duration::from_millis(200), || b.stats().staging_level > 0);
        }
        total += allocations_during(|| {
            b.process(&mut StereoBuffer::new(&mut out_l[..n], &mut out_r[..n]));
        });
    }

    // Flood the sender so its outbox overflows, then starve the receiver
    total += allocations_during(|| {
        for _ in 0..1000 {
            a.process(&mut StereoBuffer::new(&mut left, &mut right));
        }
        for _ in 0..100 {
            b.process(&mut StereoBuffer::new(&mut out_l, &mut out_r));
        }
    });

    assert_eq!(total, 0, "process allocated {} times", total);
}

#[test]
fn disconnected_process_never_allocates() {
    let mut b = start(config(free_port()), false);
    let mut a = start(config(free_port()), true);
    let mut left = vec![0.5f32; BLOCK];
    let mut right = vec![0.5f32; BLOCK];

    let total = allocations_during(|| {
        for _ in 0..500 {
            a.process(&mut StereoBuffer::new(&mut left, &mut right));
            b.process(&mut StereoBuffer::new(&mut left, &mut right));
        }
    });
    assert_eq!(total, 0);
}
