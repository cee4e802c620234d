use std::{
    fs::File,
    io::{self, BufRead, BufReader, Write},
};

use anyhow::Result;
use clap::Parser;
use itertools::Itertools;

#[derive(Debug, Parser)]
#[clap(version, about = "Prints the metric families of a Prometheus text exposition")]
struct Args {
    /// Exposition to read, `-` for stdin
    #[clap(short, long, default_value = "-")]
    input: String,

    /// Print one JSON document per family instead of plain text
    #[clap(long)]
    json: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let reader: Box<dyn BufRead> = match args.input.as_str() {
        "-" => Box::new(BufReader::new(io::stdin())),
        path => Box::new(BufReader::new(File::open(path)?)),
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();

    for family in promtext::families_from_reader(reader) {
        let family = family?;

        if args.json {
            serde_json::to_writer(&mut out, &family)?;
            writeln!(out)?;
            continue;
        }

        writeln!(out, "{} ({})", family.name, family.metric_type)?;
        if !family.documentation.is_empty() {
            writeln!(out, "{}", family.documentation)?;
        }

        for sample in family.samples.iter() {
            let labels = sample
                .labels
                .iter()
                .map(|label| format!("{}={:?}", label.name, label.value))
                .join(",");

            match sample.timestamp {
                Some(ts) => writeln!(
                    out,
                    "  {}{{{}}} {} @{}",
                    sample.name,
                    labels,
                    sample.value,
                    ts.as_secs_f64()
                )?,
                None => writeln!(out, "  {}{{{}}} {}", sample.name, labels, sample.value)?,
            }
        }
        writeln!(out)?;
    }

    Ok(())
}
