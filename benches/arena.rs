use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};

use loam::alloc::{FreeListArena, LinearArena};

const ROUNDS: usize = 128;
const SIZE: usize = 64;

fn linear_churn(c: &mut Criterion) {
    c.bench_function("linear_arena_alloc_reset", |b| {
        let mut arena = LinearArena::new(1 << 16);

        b.iter(|| {
            for _ in 0..ROUNDS {
                black_box(arena.alloc_bytes(SIZE, 1, 8).unwrap());
            }
            arena.reset();
        });
    });
}

fn free_list_churn(c: &mut Criterion) {
    c.bench_function("free_list_arena_alloc_dealloc", |b| {
        let mut arena = FreeListArena::new(1 << 16);
        let mut live = Vec::with_capacity(ROUNDS);

        b.iter(|| {
            for _ in 0..ROUNDS {
                live.push(arena.allocate(SIZE, 1, 8).unwrap());
            }

            for ptr in live.drain(..) {
                // SAFETY: every pointer was just allocated and is freed once
                unsafe { arena.deallocate(black_box(ptr)) };
            }
        });
    });
}

fn heap_churn(c: &mut Criterion) {
    c.bench_function("heap_alloc_dealloc", |b| {
        let mut live = Vec::with_capacity(ROUNDS);

        b.iter(|| {
            for _ in 0..ROUNDS {
                live.push(black_box(Box::new([0u8; SIZE])));
            }
            live.clear();
        });
    });
}

criterion_group!(benches, linear_churn, free_list_churn, heap_churn);
criterion_main!(benches);
