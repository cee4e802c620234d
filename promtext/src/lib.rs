//! `promtext` is a lax, streaming parser for the Prometheus text exposition format
//!
//! Lines go in, [`MetricFamily`](crate::parser::MetricFamily)s come out, one at a time:
//!
//! ```
//! let text = "# TYPE requests counter\nrequests 5\n";
//! let family = promtext::families(text).next().unwrap().unwrap();
//!
//! assert_eq!("requests", family.name);
//! assert_eq!("requests_total", family.samples[0].name);
//! ```

#[allow(unused)]
use tracing::{debug, error, info, span, trace, warn, Instrument, Level};

use std::{collections::HashMap, io};

/// Tokenizes individual lines of an exposition document
pub mod lexer;

/// Assembles tokenized lines into metric families.
pub mod parser;


pub use parser::{Labels, MetricFamilies, MetricFamily, MetricNumber, MetricType, ParseError, Sample};

/// Indicates that an error occurred while processing an exposition document
#[derive(thiserror::Error, Debug)]
pub enum PromError {
    #[error(transparent)]
    Parse(#[from] parser::ParseError),

    #[error("failed to read exposition: {0}")]
    Io(#[from] io::Error),
}

/// Lazily parses an exposition document held in memory.
pub fn families<'a>(data: &'a str) -> MetricFamilies<impl Iterator<Item = io::Result<&'a str>> + 'a> {
    MetricFamilies::new(data.lines().map(Ok::<&'a str, io::Error>))
}

/// Lazily parses an exposition document as it is read.  Read errors end the sequence just like
/// parse errors do.
pub fn families_from_reader<R: io::BufRead>(reader: R) -> MetricFamilies<io::Lines<R>> {
    MetricFamilies::new(reader.lines())
}

/// Parses an exposition document into a [`HashMap`] containing an entry per [`MetricFamily`].
///
/// A family name that shows up more than once keeps only its last family.
#[tracing::instrument(skip(data))]
pub fn parse(data: &str) -> Result<HashMap<String, MetricFamily>, PromError> {
    families(data)
        .map(|family| family.map(|family| (family.name.clone(), family)))
        .collect()
}
