//! Frame classification and middleware lookup benchmarks.
//!
//! Run with: cargo bench --bench classify
//! Results saved to: target/criterion/

use std::hint::black_box;

use bytes::Bytes;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use tokio::runtime::Runtime;

use speechwire::protocol::classify::{classify_binary, classify_text};
use speechwire::protocol::{Namespace, ProtocolVersion, classify};
use speechwire::transport::Frame;
use speechwire::{FnMiddleware, MiddlewareEntry, MiddlewareRegistry, SessionId};

// ============================================================================
// Payloads
// ============================================================================

const RESULTS: &str = r#"{"type":"Results","channel_index":[0,1],"duration":1.02,"start":4.5,"is_final":true,"speech_final":false,"channel":{"alternatives":[{"transcript":"hello there how are you","confidence":0.98,"words":[{"word":"hello","start":4.5,"end":4.8,"confidence":0.99},{"word":"there","start":4.8,"end":5.0,"confidence":0.97}]}]},"metadata":{"request_id":"a1b2c3","model_info":{"name":"general","version":"2024-01-01"}}}"#;
const METADATA: &str = r#"{"type":"Metadata","request_id":"a1b2c3","session_id":"s-9","sequence":42}"#;
const MALFORMED: &str = "upstream proxy error: 502 bad gateway";

const AUDIO_SIZES: &[usize] = &[320, 3200, 32_000];

// ============================================================================
// Benchmark: Text Frames
// ============================================================================

fn bench_text(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify_text");

    for (name, payload) in [("results", RESULTS), ("metadata", METADATA), ("malformed", MALFORMED)] {
        group.throughput(Throughput::Bytes(payload.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), payload, |b, payload| {
            b.iter(|| {
                classify_text(
                    black_box(payload.to_string()),
                    Namespace::Listen,
                    ProtocolVersion::V1,
                )
            });
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Binary Frames
// ============================================================================

fn bench_binary(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let mut group = c.benchmark_group("classify_binary");

    for &size in AUDIO_SIZES {
        let audio = Bytes::from(vec![7u8; size]);
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("direct", size), &audio, |b, audio| {
            b.iter(|| classify_binary(black_box(audio.clone())));
        });

        group.bench_with_input(BenchmarkId::new("frame", size), &audio, |b, audio| {
            b.to_async(&rt).iter(|| async {
                classify(
                    Frame::Binary(black_box(audio.clone())),
                    Namespace::Speak,
                    ProtocolVersion::V1,
                )
                .await
            });
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Middleware Lookup
// ============================================================================

fn bench_middleware_lookup(c: &mut Criterion) {
    let registry = MiddlewareRegistry::new();
    let session = SessionId::generate();

    for event in ["Results", "Metadata", "UtteranceEnd", "SpeechStarted"] {
        registry.use_global(
            Namespace::Listen,
            ProtocolVersion::V1,
            MiddlewareEntry::new(event, FnMiddleware::new()),
        );
        registry.add_instance(session, MiddlewareEntry::new(event, FnMiddleware::new()));
    }
    registry.add_instance(session, MiddlewareEntry::any(FnMiddleware::new()));

    c.bench_function("middleware_lookup", |b| {
        b.iter(|| {
            registry.middlewares(
                Namespace::Listen,
                ProtocolVersion::V1,
                session,
                black_box("Results"),
            )
        });
    });
}

criterion_group!(benches, bench_text, bench_binary, bench_middleware_lookup);
criterion_main!(benches);
