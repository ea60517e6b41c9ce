//! Benchmarks for the byte pipe between origin, ffmpeg and client.

use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use futures::stream;
use mediaforge::streaming::pipe::{forward, ByteSink, PipeOutcome};
use tokio_util::sync::CancellationToken;

/// Sink that only counts what it is given.
struct Counting(usize);

#[async_trait]
impl ByteSink for Counting {
    async fn send(&mut self, chunk: Bytes) -> io::Result<()> {
        self.0 += chunk.len();
        Ok(())
    }

    async fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn bench_forward(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let total = 16 * 1024 * 1024;

    let mut group = c.benchmark_group("pipe_forward");
    group.throughput(Throughput::Bytes(total as u64));

    for chunk_size in [8 * 1024, 64 * 1024, 256 * 1024] {
        let chunk = Bytes::from(vec![0u8; chunk_size]);
        let chunks = total / chunk_size;

        group.bench_with_input(BenchmarkId::from_parameter(chunk_size), &chunk, |b, chunk| {
            b.iter(|| {
                rt.block_on(async {
                    let source =
                        stream::iter((0..chunks).map(|_| Ok::<_, io::Error>(chunk.clone())));
                    let cancel = CancellationToken::new();
                    let outcome = forward(source, Counting(0), &cancel).await;
                    assert!(matches!(outcome, PipeOutcome::Finished));
                    black_box(outcome)
                })
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_forward);
criterion_main!(benches);
