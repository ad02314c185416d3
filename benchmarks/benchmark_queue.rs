// Run with: cargo run --release --bin benchmark_queue
// Measures StorageQueue throughput at a few concurrency levels against the
// in-memory backend.

use cairn::backend::{Backend, MemoryBackend};
use cairn::queue::{StorageOperation, StorageQueue};
use std::time::Instant;

fn run_one(label: &str, concurrency: usize, op_count: usize, block: Vec<u8>) -> u128 {
    MemoryBackend::reset(label);
    let queue = StorageQueue::new(
        {
            let label = label.to_string();
            move || Box::new(MemoryBackend::new(&label)) as Box<dyn Backend>
        },
        concurrency,
    );

    let start = Instant::now();
    for i in 0..op_count {
        queue.enqueue(StorageOperation::put(format!("k{i}"), block.clone())).expect("enqueue");
    }
    queue.wait().expect("wait");
    start.elapsed().as_millis()
}

fn main() {
    let op_count = 2000usize;
    let block = vec![0xABu8; 16 * 1024];

    println!("concurrency,op_count,block_bytes,elapsed_ms");
    for concurrency in [1usize, 2, 4, 8, 16, 32] {
        let label = format!("benchmark-queue-c{concurrency}");
        let elapsed_ms = run_one(&label, concurrency, op_count, block.clone());
        println!("{concurrency},{op_count},{},{elapsed_ms}", block.len());
    }
}
