use std::fs::{self, DirEntry};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

const FILTER: &[&'static str] = &["histogram", "label_escaping", "wide_integers"];

fn enumerate_test_cases() -> Vec<DirEntry> {
    let test_dir: &'static str = concat!(env!("CARGO_MANIFEST_DIR"), "/../parse-tests");
    let test_dir = std::fs::canonicalize(test_dir).unwrap();

    let mut dirs: Vec<DirEntry> = fs::read_dir(test_dir)
        .unwrap()
        .map(|x| x.unwrap())
        .filter(|x| x.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .collect();
    dirs.sort_by(|b, a| a.path().cmp(&b.path()));
    dirs.into_iter()
        .filter(|x| FILTER.is_empty() || FILTER.contains(&x.file_name().to_str().unwrap()))
        .collect()
}

#[inline]
fn do_test<A>(group: &mut criterion::BenchmarkGroup<A>, path: DirEntry)
where
    A: criterion::measurement::Measurement,
{
    let test_name: String = path
        .file_name()
        .into_string()
        .expect("filename is not utf-8");
    let test_data =
        std::fs::read_to_string(path.path().join("metrics")).expect("couldn't read input");

    group.bench_function(BenchmarkId::new(&test_name, "promtext"), |b| {
        b.iter(|| promtext::families(&test_data).filter_map(Result::ok).count())
    });

    group.bench_function(BenchmarkId::new(&test_name, "promtext-reader"), |b| {
        b.iter(|| {
            promtext::families_from_reader(test_data.as_bytes())
                .filter_map(Result::ok)
                .count()
        })
    });

    group.bench_function(BenchmarkId::new(&test_name, "openmetrics-parser"), |b| {
        b.iter(
            || match openmetrics_parser::prometheus::parse_prometheus(&test_data) {
                Ok(data) => {
                    data.families.values().count();
                }
                Err(_) => {}
            },
        )
    });
}

fn exposition(cr: &mut Criterion) {
    let mut group = cr.benchmark_group("exposition");
    for path in enumerate_test_cases() {
        do_test(&mut group, path);
    }
}

criterion_group!(exposition_benches, exposition);
criterion_main!(exposition_benches);
