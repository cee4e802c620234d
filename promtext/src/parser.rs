#[allow(unused)]
use tracing::{debug, error, info, span, trace, warn, Instrument, Level};

use std::{collections::VecDeque, fmt, io, iter::FusedIterator};

use num_bigint::BigInt;
use serde::{ser::SerializeMap, Serializer};
use serde_derive::Serialize;

use crate::{lexer, PromError};

// Sample name suffixes accepted for each declared type, relative to the family name
const COUNTER_SUFFIXES: &[&str] = &[""];
const GAUGE_SUFFIXES: &[&str] = &[""];
const SUMMARY_SUFFIXES: &[&str] = &["_count", "_sum", ""];
const HISTOGRAM_SUFFIXES: &[&str] = &["_count", "_sum", "_bucket"];
const UNTYPED_SUFFIXES: &[&str] = &[""];

const TOTAL_SUFFIX: &str = "_total";

#[derive(thiserror::Error, Clone, Debug, PartialEq)]
pub enum ParseError {
    #[error("invalid labels: {0}")]
    InvalidLabels(String),

    #[error("no separator between metric name and value: {0}")]
    MissingSeparator(String),

    #[error("missing value: {0}")]
    MissingValue(String),

    #[error("invalid value «{0}»")]
    InvalidValue(String),

    #[error("invalid timestamp «{0}»")]
    InvalidTimestamp(String),

    #[error("missing metric name: {0}")]
    MissingMetricName(String),

    #[error("missing metric type: {0}")]
    MissingMetricType(String),
}

pub type Result<T, E = ParseError> = std::result::Result<T, E>;

/// [`MetricFamily`] type.  The default is `Untyped`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    /// Counters measure discrete events.  Sample names always carry a `_total` suffix.
    Counter,
    /// Gauges are current measurements, such as bytes of memory currently used or the number of items in a queue.
    Gauge,
    /// Summaries measure distributions through quantiles, a `_count` and a `_sum`.
    Summary,
    /// Histograms measure distributions through cumulative `_bucket`s, a `_count` and a `_sum`.
    Histogram,
    /// No type was declared, or the declared type isn't one of the above.
    #[default]
    Untyped,
}

/// A sample value.  Integers are kept apart from floats so that wide counters don't lose precision.
#[derive(Clone, Debug, PartialEq)]
pub enum MetricNumber {
    Float(f64),
    Integer(i128),
    /// An integer that doesn't fit in 128 bits.
    BigInteger(BigInt),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Label {
    pub name: String,
    pub value: String,
}

/// An ordered label set.  Names are unique; setting an existing name replaces its value in place.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Labels(Vec<Label>);

/// A structured timestamp, as opposed to fractional seconds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Timestamp {
    pub seconds: f64,
    pub nanoseconds: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TimestampValue {
    /// Fractional seconds since the epoch.  The only form the parser produces.
    Seconds(f64),
    Structured(Timestamp),
}

/// Exemplars are references to data outside of the exposition, a common use case being IDs of
/// program traces.
///
/// The text format parsed here never carries them, so [`Sample::exemplar`] is always `None`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Exemplar {
    pub labels: Labels,
    pub value: f64,
    pub timestamp: Option<TimestampValue>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Sample {
    pub name: String,
    pub labels: Labels,
    pub value: MetricNumber,
    pub timestamp: Option<TimestampValue>,
    pub exemplar: Option<Exemplar>,
}

/// A MetricFamily is a collection of related (and similarly named) samples
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricFamily {
    pub name: String,
    pub documentation: String,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    pub unit: String,
    pub samples: Vec<Sample>,
}

impl MetricType {
    /// Valid sample names for a family called `name` of this type.
    fn allowed_names(&self, name: &str) -> Vec<String> {
        let suffixes = match self {
            Self::Counter => COUNTER_SUFFIXES,
            Self::Gauge => GAUGE_SUFFIXES,
            Self::Summary => SUMMARY_SUFFIXES,
            Self::Histogram => HISTOGRAM_SUFFIXES,
            Self::Untyped => UNTYPED_SUFFIXES,
        };

        suffixes
            .iter()
            .map(|suffix| format!("{}{}", name, suffix))
            .collect()
    }
}

impl From<&str> for MetricType {
    /// Unrecognized keywords are not an error, they're just untyped.
    fn from(keyword: &str) -> Self {
        match keyword {
            "counter" => Self::Counter,
            "gauge" => Self::Gauge,
            "summary" => Self::Summary,
            "histogram" => Self::Histogram,
            _ => Self::Untyped,
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Summary => "summary",
            Self::Histogram => "histogram",
            Self::Untyped => "untyped",
        };
        f.write_str(keyword)
    }
}

impl MetricNumber {
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Float(f) => *f,
            Self::Integer(i) => *i as f64,
            Self::BigInteger(i) => i.to_string().parse().unwrap_or(f64::NAN),
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Self::Integer(_) | Self::BigInteger(_))
    }
}

impl From<i128> for MetricNumber {
    fn from(i: i128) -> Self {
        Self::Integer(i)
    }
}

impl From<BigInt> for MetricNumber {
    fn from(i: BigInt) -> Self {
        Self::BigInteger(i)
    }
}

impl From<f64> for MetricNumber {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl fmt::Display for MetricNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(n) if n.is_nan() => f.write_str("NaN"),
            Self::Float(n) if n.is_infinite() && n.is_sign_positive() => f.write_str("+Inf"),
            Self::Float(n) if n.is_infinite() => f.write_str("-Inf"),
            Self::Float(n) => write!(f, "{}", n),
            Self::Integer(n) => write!(f, "{}", n),
            Self::BigInteger(n) => write!(f, "{}", n),
        }
    }
}

impl serde::Serialize for MetricNumber {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Float(n) if n.is_finite() => s.serialize_f64(*n),
            Self::Float(_) => s.serialize_str(&self.to_string()),
            Self::Integer(n) => {
                if let Ok(n) = i64::try_from(*n) {
                    s.serialize_i64(n)
                } else if let Ok(n) = u64::try_from(*n) {
                    s.serialize_u64(n)
                } else {
                    s.serialize_str(&n.to_string())
                }
            }
            Self::BigInteger(n) => s.serialize_str(&n.to_string()),
        }
    }
}

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|label| label.name == name)
            .map(|label| label.value.as_str())
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Sets `name`, returning the value it replaced.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let name = name.into();
        let value = value.into();

        match self.0.iter_mut().find(|label| label.name == name) {
            Some(label) => Some(std::mem::replace(&mut label.value, value)),
            None => {
                self.0.push(Label { name, value });
                None
            }
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Label> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'l> IntoIterator for &'l Labels {
    type Item = &'l Label;
    type IntoIter = std::slice::Iter<'l, Label>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<N, V> FromIterator<(N, V)> for Labels
where
    N: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        let mut labels = Self::new();
        for (name, value) in iter {
            labels.insert(name, value);
        }
        labels
    }
}

impl serde::Serialize for Labels {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = s.serialize_map(Some(self.len()))?;
        for label in self.iter() {
            map.serialize_entry(&label.name, &label.value)?;
        }
        map.end()
    }
}

impl TimestampValue {
    pub fn as_secs_f64(&self) -> f64 {
        match self {
            Self::Seconds(seconds) => *seconds,
            Self::Structured(ts) => ts.seconds + ts.nanoseconds / 1e9,
        }
    }
}

impl Sample {
    /// Looks up a label value by name.
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels.get(name)
    }
}

impl MetricFamily {
    /// Value of the first sample, handy for families holding a single unlabelled sample.
    pub fn first_value(&self) -> Option<MetricNumber> {
        self.samples.first().map(|sample| sample.value.clone())
    }
}

impl<'a> From<lexer::Sample<'a>> for Sample {
    fn from(l: lexer::Sample<'a>) -> Self {
        Self {
            name: l.name.to_string(),
            labels: l
                .labels
                .into_iter()
                .map(|label| (label.name, label.value.into_owned()))
                .collect(),
            value: l.number,
            timestamp: l.timestamp.map(TimestampValue::Seconds),
            exemplar: None,
        }
    }
}

/// Metadata and samples of the family currently being assembled.
#[derive(Debug)]
struct Builder {
    name: String,
    documentation: String,
    metric_type: MetricType,
    allowed_names: Vec<String>,
    samples: Vec<Sample>,
}

impl Builder {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            documentation: String::new(),
            metric_type: MetricType::Untyped,
            allowed_names: vec![name.to_string()],
            samples: vec![],
        }
    }

    fn allows(&self, sample_name: &str) -> bool {
        self.allowed_names.iter().any(|name| name == sample_name)
    }

    fn metric_type(self, metric_type: MetricType) -> Self {
        Self {
            allowed_names: metric_type.allowed_names(&self.name),
            metric_type,
            ..self
        }
    }

    fn documentation(self, documentation: String) -> Self {
        Self {
            documentation,
            ..self
        }
    }

    fn sample(mut self, sample: Sample) -> Self {
        self.samples.push(sample);
        self
    }

    /// Turns the accumulated state into a family, munging counters into their `_total` form.
    fn finalize(self) -> MetricFamily {
        let mut name = self.name;
        let mut samples = self.samples;

        if self.metric_type == MetricType::Counter {
            match name.strip_suffix(TOTAL_SUFFIX) {
                Some(stripped) => name = stripped.to_string(),
                None => {
                    samples = samples
                        .into_iter()
                        .map(|sample| Sample {
                            name: format!("{}{}", sample.name, TOTAL_SUFFIX),
                            ..sample
                        })
                        .collect();
                }
            }
        }

        debug!(%name, metric_type = %self.metric_type, samples = samples.len(), "flushing family");

        MetricFamily {
            name,
            documentation: self.documentation,
            metric_type: self.metric_type,
            unit: String::new(),
            samples,
        }
    }
}

/// Families completed by a single transition, in the order they're emitted.  An error, if any,
/// surfaces only after those families have been handed out.
#[derive(Debug, Default)]
struct Emitted {
    flushed: Option<MetricFamily>,
    stray: Option<MetricFamily>,
    error: Option<ParseError>,
}

impl IntoIterator for Emitted {
    type Item = MetricFamily;
    type IntoIter = std::iter::Chain<
        std::option::IntoIter<MetricFamily>,
        std::option::IntoIter<MetricFamily>,
    >;

    fn into_iter(self) -> Self::IntoIter {
        self.flushed.into_iter().chain(self.stray)
    }
}

#[derive(Debug, Default)]
enum State {
    /// No family pending: every sample is a stray until a `HELP` or `TYPE` shows up.
    #[default]
    Idle,
    Accumulating(Builder),
}

impl State {
    /// Returns the builder for `metric_name`, flushing whatever other family was pending.
    fn enter(self, metric_name: &str) -> (Builder, Option<MetricFamily>) {
        match self {
            Self::Accumulating(builder) if builder.name == metric_name => (builder, None),
            Self::Accumulating(builder) => (Builder::new(metric_name), Some(builder.finalize())),
            Self::Idle => (Builder::new(metric_name), None),
        }
    }

    fn step(self, line: lexer::Line) -> (Self, Emitted) {
        match line {
            lexer::Line::Blank | lexer::Line::Comment => (self, Emitted::default()),
            lexer::Line::Help {
                metric_name,
                help_text,
            } => {
                let (builder, flushed) = self.enter(metric_name);
                let builder = builder.documentation(help_text.into_owned());
                (
                    Self::Accumulating(builder),
                    Emitted {
                        flushed,
                        ..Emitted::default()
                    },
                )
            }
            lexer::Line::Type {
                line,
                metric_name,
                metric_type,
            } => {
                let (builder, flushed) = self.enter(metric_name);
                match metric_type {
                    Some(metric_type) => (
                        Self::Accumulating(builder.metric_type(metric_type.into())),
                        Emitted {
                            flushed,
                            ..Emitted::default()
                        },
                    ),
                    None => (
                        Self::Idle,
                        Emitted {
                            flushed,
                            error: Some(ParseError::MissingMetricType(line.to_string())),
                            ..Emitted::default()
                        },
                    ),
                }
            }
            lexer::Line::Sample(sample) => {
                let sample = Sample::from(sample);
                match self {
                    Self::Accumulating(builder) if builder.allows(&sample.name) => {
                        (Self::Accumulating(builder.sample(sample)), Emitted::default())
                    }
                    state => {
                        debug!(name = %sample.name, "stray sample");
                        let flushed = match state {
                            Self::Accumulating(builder) => Some(builder.finalize()),
                            Self::Idle => None,
                        };
                        let stray = Builder::new(&sample.name).sample(sample).finalize();
                        (
                            Self::Idle,
                            Emitted {
                                flushed,
                                stray: Some(stray),
                                ..Emitted::default()
                            },
                        )
                    }
                }
            }
        }
    }

    fn finish(self) -> Option<MetricFamily> {
        match self {
            Self::Accumulating(builder) => Some(builder.finalize()),
            Self::Idle => None,
        }
    }
}

/// A lazy sequence of [`MetricFamily`]s read from a source of lines.
///
/// Families are produced as soon as a boundary is seen, so only the family currently being
/// assembled is held in memory.  The sequence is single pass: once it yields `None` or an error it
/// stays exhausted.
pub struct MetricFamilies<I> {
    lines: I,
    state: State,
    ready: VecDeque<MetricFamily>,
    pending_error: Option<PromError>,
    done: bool,
}

impl<I> MetricFamilies<I> {
    pub fn new(lines: I) -> Self {
        Self {
            lines,
            state: State::default(),
            ready: VecDeque::new(),
            pending_error: None,
            done: false,
        }
    }

    fn fail(&mut self, e: PromError) -> Option<Result<MetricFamily, PromError>> {
        error!(%e);
        self.done = true;
        self.ready.clear();
        Some(Err(e))
    }
}

impl<I, L> Iterator for MetricFamilies<I>
where
    I: Iterator<Item = io::Result<L>>,
    L: AsRef<str>,
{
    type Item = Result<MetricFamily, PromError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(family) = self.ready.pop_front() {
                return Some(Ok(family));
            }

            if let Some(e) = self.pending_error.take() {
                return self.fail(e);
            }

            if self.done {
                return None;
            }

            match self.lines.next() {
                None => {
                    self.done = true;
                    return std::mem::take(&mut self.state).finish().map(Ok);
                }
                Some(Err(e)) => return self.fail(e.into()),
                Some(Ok(line)) => match lexer::line(line.as_ref()) {
                    Ok(line) => {
                        let (state, mut emitted) = std::mem::take(&mut self.state).step(line);
                        self.state = state;
                        self.pending_error = emitted.error.take().map(PromError::from);
                        self.ready.extend(emitted);
                    }
                    Err(e) => return self.fail(e.into()),
                },
            }
        }
    }
}

impl<I, L> FusedIterator for MetricFamilies<I>
where
    I: Iterator<Item = io::Result<L>>,
    L: AsRef<str>,
{
}
