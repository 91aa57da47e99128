use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dtail::framer::Framer;
use dtail::pool::BufferPool;
use std::io::Cursor;
use std::sync::Arc;

fn lines_of(n: usize, width: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(n * (width + 1));
    for i in 0..n {
        let line = format!("{:0width$}", i, width = width);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
    }
    buf
}

fn frame_all(c: &mut Criterion) {
    let data = lines_of(100_000, 40);
    c.bench_function("framer_100k_short_lines", |b| {
        b.iter(|| {
            let pool = Arc::new(BufferPool::new());
            let mut framer = Framer::new(Cursor::new(data.clone()), 1024 * 1024, pool);
            let mut count = 0usize;
            while let Ok(Some(frame)) = framer.next_frame() {
                black_box(&frame);
                count += 1;
            }
            black_box(count);
        });
    });
}

fn frame_long_lines(c: &mut Criterion) {
    let data = lines_of(2_000, 4_000);
    c.bench_function("framer_2k_long_lines", |b| {
        b.iter(|| {
            let pool = Arc::new(BufferPool::new());
            let mut framer = Framer::new(Cursor::new(data.clone()), 1024 * 1024, pool);
            let mut count = 0usize;
            while let Ok(Some(frame)) = framer.next_frame() {
                black_box(&frame);
                count += 1;
            }
            black_box(count);
        });
    });
}

criterion_group!(benches, frame_all, frame_long_lines);
criterion_main!(benches);
