use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gcodestream_parser::{ArcExpander, GcodeParser, JobLoader, StoreKind};

fn sample_job(lines: usize) -> Vec<String> {
    (0..lines)
        .map(|i| match i % 4 {
            0 => format!("G1 X{:.3} Y{:.3} F1200", i as f64 * 0.1, i as f64 * 0.05),
            1 => format!("G2 X{:.3} Y{:.3} I0.5 J0", i as f64 * 0.1 + 1.0, i as f64 * 0.05),
            2 => "G0 Z5 (retract)".to_string(),
            _ => format!("G1 Z-{:.2}", (i % 10) as f64 * 0.1),
        })
        .collect()
}

fn bench_parse(c: &mut Criterion) {
    let job = sample_job(10_000);

    c.bench_function("parse 10k lines", |b| {
        b.iter(|| {
            let mut parser = GcodeParser::new();
            for (i, line) in job.iter().enumerate() {
                let _ = black_box(parser.add_command(line, i as u32 + 1));
            }
        })
    });

    c.bench_function("parse 10k lines with arc expansion", |b| {
        b.iter(|| {
            let mut parser = GcodeParser::new();
            parser.set_arc_expander(ArcExpander::new(0.1).ok());
            for (i, line) in job.iter().enumerate() {
                let _ = black_box(parser.add_command(line, i as u32 + 1));
            }
        })
    });

    c.bench_function("load 10k lines in memory", |b| {
        let loader = JobLoader::default();
        b.iter(|| black_box(loader.load_lines(&job, StoreKind::InMemory)))
    });
}

criterion_group!(benches, bench_parse);
criterion_main!(benches);
