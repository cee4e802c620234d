#[allow(unused)]
use tracing::{debug, error, info, span, trace, warn, Instrument, Level};

use std::borrow::Cow;

use lazy_static::lazy_static;
use num_bigint::BigInt;
use nom::{
    bytes::complete::{take_till1, take_while},
    sequence::preceded,
    IResult,
};
use regex::{Captures, Regex};

use crate::parser::MetricNumber;

lazy_static! {
    // Escapes recognized inside a quoted label value
    static ref LABEL_ESCAPE_RE: Regex = Regex::new(r#"\\[\\n"]"#).unwrap();

    // HELP text isn't quote delimited, so `\"` is left alone
    static ref HELP_ESCAPE_RE: Regex = Regex::new(r"\\[\\n]").unwrap();
}

/// One whitespace delimited field, skipping any leading whitespace.
pub(super) fn field(input: &str) -> IResult<&str, &str> {
    preceded(
        take_while(char::is_whitespace),
        take_till1(char::is_whitespace),
    )(input)
}

/// Picks the separator used on a sample line: a space if there is one anywhere, otherwise a tab.
pub(super) fn separator(input: &str) -> char {
    if input.contains(' ') {
        ' '
    } else {
        '\t'
    }
}

/// Parses a sample value.
///
/// Anything spelled with a decimal point or an exponent is a float.  Everything else is tried as
/// an integer first so that counters wider than an f64 mantissa survive intact, arbitrarily wide
/// if need be, then falls back to a float for `NaN`, `+Inf` and friends.
pub(super) fn number(token: &str) -> Option<MetricNumber> {
    if token.contains(&['.', 'e', 'E'][..]) {
        return token.parse::<f64>().ok().map(MetricNumber::Float);
    }

    token
        .parse::<i128>()
        .map(MetricNumber::Integer)
        .ok()
        .or_else(|| token.parse::<BigInt>().ok().map(MetricNumber::BigInteger))
        .or_else(|| token.parse::<f64>().ok().map(MetricNumber::Float))
}

/// Parses a millisecond timestamp into fractional seconds.
pub(super) fn timestamp(token: &str) -> Option<f64> {
    token.parse::<f64>().ok().map(|ms| ms / 1000.)
}

fn replace_escape(caps: &Captures) -> &'static str {
    match &caps[0] {
        r"\n" => "\n",
        r#"\""# => r#"""#,
        _ => r"\",
    }
}

pub(super) fn unescape_label_value(input: &str) -> Cow<str> {
    LABEL_ESCAPE_RE.replace_all(input, replace_escape)
}

pub(super) fn unescape_help(input: &str) -> Cow<str> {
    HELP_ESCAPE_RE.replace_all(input, replace_escape)
}
