#[allow(unused)]
use tracing::{debug, error, info, span, trace, warn, Instrument, Level};

use std::borrow::Cow;

use nom::{multi::many_m_n, IResult};

use crate::parser::{MetricNumber, ParseError, Result};

mod labels;
mod types;
use types::*;

#[derive(Clone, Debug, PartialEq)]
pub struct Label<'a> {
    pub name: &'a str,
    pub value: Cow<'a, str>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Sample<'a> {
    pub name: &'a str,
    pub labels: Vec<Label<'a>>,
    pub number: MetricNumber,
    pub timestamp: Option<f64>,
}

/// A single classified line of an exposition document.
#[derive(Clone, Debug, PartialEq)]
pub enum Line<'a> {
    /// Nothing but whitespace.
    Blank,
    /// A comment that isn't `HELP` or `TYPE`, or one too short to mean anything.
    Comment,
    Help {
        metric_name: &'a str,
        help_text: Cow<'a, str>,
    },
    /// The keyword is optional here; a missing one only becomes an error once any pending family
    /// has been flushed.
    Type {
        line: &'a str,
        metric_name: &'a str,
        metric_type: Option<&'a str>,
    },
    Sample(Sample<'a>),
}

impl<'a> Sample<'a> {
    /// ```text
    /// sample = name ["{" label-block "}"] SP value [SP timestamp]
    /// ```
    ///
    /// Labels run from the first `{` to the last `}`, so braces inside label values are fine.
    #[tracing::instrument]
    fn lex(line: &'a str) -> Result<Self> {
        let braces = line
            .find('{')
            .zip(line.rfind('}'))
            .filter(|(open, close)| open < close);

        match braces {
            Some((open, close)) => {
                let labels = labels::label_block(&line[open + 1..close])?;

                // Skip the brace and whatever single character follows it
                let mut rest = line[close + 1..].chars();
                rest.next();

                let (number, timestamp) = value_and_timestamp(rest.as_str(), line)?;

                Ok(Self {
                    name: line[..open].trim(),
                    labels,
                    number,
                    timestamp,
                })
            }
            None => {
                let name_end = line
                    .find(separator(line))
                    .ok_or_else(|| ParseError::MissingSeparator(line.to_string()))?;
                let (name, rest) = line.split_at(name_end);
                let (number, timestamp) = value_and_timestamp(rest, line)?;

                Ok(Self {
                    name,
                    labels: vec![],
                    number,
                    timestamp,
                })
            }
        }
    }
}

/// Splits what follows the name (and labels) into a value and an optional timestamp.
///
/// Only the first and last fields matter: the first is the value and, if there is more than one,
/// the last is a timestamp in milliseconds.
fn value_and_timestamp(input: &str, line: &str) -> Result<(MetricNumber, Option<f64>)> {
    let input = input.trim_start();
    let mut fields = input
        .split(separator(input))
        .map(str::trim)
        .filter(|field| !field.is_empty());

    let value = fields.next().unwrap_or_else(|| input.trim());
    if value.is_empty() {
        return Err(ParseError::MissingValue(line.to_string()));
    }

    let number = number(value).ok_or_else(|| ParseError::InvalidValue(value.to_string()))?;

    let timestamp = match fields.last() {
        Some(ts) => Some(timestamp(ts).ok_or_else(|| ParseError::InvalidTimestamp(ts.to_string()))?),
        None => None,
    };

    Ok((number, timestamp))
}

/// Splits a comment into at most four fields, the last of which is the unsplit remainder.
fn comment_fields(line: &str) -> Vec<&str> {
    let parsed: IResult<&str, Vec<&str>> = many_m_n(0, 3, field)(line);

    match parsed {
        Ok((rest, mut fields)) => {
            let rest = rest.trim_start();
            if !rest.is_empty() {
                fields.push(rest);
            }
            fields
        }
        Err(_) => vec![],
    }
}

impl<'a> Line<'a> {
    fn lex_comment(line: &'a str) -> Result<Self> {
        let fields = comment_fields(line);

        let keyword = match fields.get(1) {
            Some(keyword) => *keyword,
            None => return Ok(Self::Comment),
        };

        match keyword {
            "HELP" => {
                let metric_name = *fields
                    .get(2)
                    .ok_or_else(|| ParseError::MissingMetricName(line.to_string()))?;
                let help_text = fields.get(3).copied().map(unescape_help);

                Ok(Self::Help {
                    metric_name,
                    help_text: help_text.unwrap_or_default(),
                })
            }
            "TYPE" => {
                let metric_name = *fields
                    .get(2)
                    .ok_or_else(|| ParseError::MissingMetricName(line.to_string()))?;
                Ok(Self::Type {
                    line,
                    metric_name,
                    metric_type: fields.get(3).copied(),
                })
            }
            _ => Ok(Self::Comment),
        }
    }
}

/// Classifies and tokenizes one line of an exposition document.
#[tracing::instrument]
pub(crate) fn line(input: &str) -> Result<Line> {
    let input = input.trim();

    let line = if input.is_empty() {
        Line::Blank
    } else if input.starts_with('#') {
        Line::lex_comment(input)?
    } else {
        Line::Sample(Sample::lex(input)?)
    };

    trace!(?line);
    Ok(line)
}
