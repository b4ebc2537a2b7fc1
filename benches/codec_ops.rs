use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pixelrts::hilbert::{generate_lut, index_to_coord};
use pixelrts::{EncodeOptions, MetadataOverrides, PixelRtsDecoder, PixelRtsEncoder, SemanticTokenizer};

fn bench_hilbert(c: &mut Criterion) {
    let mut group = c.benchmark_group("hilbert");

    group.bench_function("index_to_coord_order10", |bencher| {
        bencher.iter(|| {
            let mut acc = 0u64;
            for d in 0..1024u64 {
                let (x, y) = index_to_coord(10, black_box(d * 1021)).unwrap();
                acc += (x ^ y) as u64;
            }
            black_box(acc)
        })
    });

    for order in [6u32, 8, 10] {
        group.bench_with_input(BenchmarkId::new("generate_lut", order), &order, |bencher, &order| {
            bencher.iter(|| black_box(generate_lut(black_box(order)).unwrap()))
        });
    }

    group.finish();
}

fn bench_codec(c: &mut Criterion) {
    let sizes = [1usize << 10, 1 << 14, 1 << 18];

    let mut group = c.benchmark_group("codec");
    for size in sizes {
        let data: Vec<u8> = (0..size).map(|i| (i as u8).wrapping_mul(31)).collect();

        group.bench_with_input(BenchmarkId::new("encode", size), &data, |bencher, data| {
            let mut encoder = PixelRtsEncoder::new(EncodeOptions::default());
            bencher.iter(|| black_box(encoder.encode(black_box(data), &MetadataOverrides::new()).unwrap()))
        });

        let encoded = PixelRtsEncoder::new(EncodeOptions::default())
            .encode(&data, &MetadataOverrides::new())
            .unwrap();
        group.bench_with_input(BenchmarkId::new("decode", size), &encoded.container, |bencher, bytes| {
            bencher.iter(|| black_box(PixelRtsDecoder::new().decode(black_box(bytes), None).unwrap()))
        });
    }

    group.finish();
}

fn bench_tokenizer(c: &mut Criterion) {
    let program: Vec<u8> = (0..4096u32)
        .flat_map(|i| (0x0000_0013 | ((i % 97) << 20)).to_le_bytes())
        .collect();

    c.bench_function("tokenize_stream_4096_words", |bencher| {
        bencher.iter(|| {
            let mut tok = SemanticTokenizer::new();
            black_box(tok.tokenize_stream(black_box(&program)).unwrap())
        })
    });
}

criterion_group!(benches, bench_hilbert, bench_codec, bench_tokenizer);
criterion_main!(benches);
