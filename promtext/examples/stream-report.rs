use std::{
    fs::File,
    io::{self, BufRead, BufReader},
};

use anyhow::{anyhow, Context, Result};
use indoc::indoc;
use itertools::Itertools;
use promtext::{MetricFamily, MetricType};

const DEMO: &str = indoc! {r#"
    # HELP jobs_done Jobs finished since start.
    # TYPE jobs_done counter
    jobs_done{queue="fast"} 1027
    jobs_done{queue="slow"} 3
    jobs_inflight 2
    # TYPE latency histogram
    latency_bucket{le="0.1"} 40
    latency_bucket{le="1"} 52
    latency_bucket{le="+Inf"} 55
    latency_count 55
    latency_sum 9.5
    latency_max 4.2
"#};

/// An untyped, undocumented family with a single sample is most likely a sample that didn't
/// belong to the family declared before it.
fn looks_stray(family: &MetricFamily) -> bool {
    family.metric_type == MetricType::Untyped
        && family.documentation.is_empty()
        && family.samples.len() == 1
}

fn report(family: &MetricFamily) {
    let marker = if looks_stray(family) { " (stray)" } else { "" };
    println!(
        "{} [{}]{}: {} sample(s)",
        family.name,
        family.metric_type,
        marker,
        family.samples.len()
    );

    if family.metric_type == MetricType::Histogram {
        let buckets = family
            .samples
            .iter()
            .filter(|sample| sample.name.ends_with("_bucket"))
            .map(|sample| format!("≤{}: {}", sample.label("le").unwrap_or("?"), sample.value))
            .join(", ");
        println!("    buckets {}", buckets);
    } else {
        for sample in &family.samples {
            let labels = sample
                .labels
                .iter()
                .map(|label| format!("{}={}", label.name, label.value))
                .join(",");
            println!("    {}{{{}}} = {}", sample.name, labels, sample.value);
        }
    }
}

fn main() -> Result<()> {
    let mut args = std::env::args();
    let progname = args.next().ok_or_else(|| anyhow!("ARGV[0] was not set??"))?;

    let reader: Box<dyn BufRead> = match args.next().as_deref() {
        Some("--help") => {
            println!("Usage: {} [FILE]", progname);
            return Ok(());
        }
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("couldn't open {}", path))?,
        )),
        None => Box::new(io::Cursor::new(DEMO)),
    };

    let mut strays = 0;
    for family in promtext::families_from_reader(reader) {
        let family = family?;
        if looks_stray(&family) {
            strays += 1;
        }
        report(&family);
    }

    println!("{} stray famil{}", strays, if strays == 1 { "y" } else { "ies" });
    Ok(())
}
