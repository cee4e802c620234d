#[allow(unused)]
use tracing::{debug, error, info, span, trace, warn, Instrument, Level};

use std::borrow::Cow;

use nom::{
    bytes::complete::{escaped, is_not, tag, take_until},
    character::complete::anychar,
    combinator::opt,
    sequence::{pair, terminated},
    IResult,
};

use super::{types::unescape_label_value, Label};
use crate::parser::{ParseError, Result};

/// Everything up to the closing quote.  A quote preceded by an odd number of backslashes is part
/// of the value; escape sequences are left as-is here and resolved by the caller.
fn quoted_value(input: &str) -> IResult<&str, &str> {
    let (input, value) = opt(escaped(is_not(r#"\""#), '\\', anychar))(input)?;
    Ok((input, value.unwrap_or_default()))
}

/// ```text
/// label = name "=" <anything> DQUOTE value DQUOTE [<anything> ","]
/// ```
///
/// Deliberately loose: whatever sits between the `=` and the opening quote, or between the closing
/// quote and the next comma, is skipped.
fn label_pair(input: &str) -> IResult<&str, (&str, &str)> {
    let (input, name) = terminated(take_until("="), tag("="))(input)?;
    let (input, _) = pair(take_until(r#"""#), tag(r#"""#))(input)?;
    let (input, value) = terminated(quoted_value, tag(r#"""#))(input)?;
    let (input, _) = opt(pair(take_until(","), tag(",")))(input)?;

    Ok((input.trim_start(), (name.trim(), value)))
}

/// Tokenizes the text between the braces of a sample line.
///
/// A block without a single `=` has no labels at all, which is not an error.
#[tracing::instrument]
pub(super) fn label_block(block: &str) -> Result<Vec<Label>> {
    if !block.contains('=') {
        return Ok(vec![]);
    }

    let escaping = block.contains('\\');
    let mut labels = vec![];
    let mut rest = block;

    while !rest.is_empty() {
        let (remaining, (name, value)) =
            label_pair(rest).map_err(|_| ParseError::InvalidLabels(block.to_string()))?;

        let value = match escaping {
            true => unescape_label_value(value),
            false => Cow::Borrowed(value),
        };

        debug!(name, %value);
        labels.push(Label { name, value });
        rest = remaining;
    }

    Ok(labels)
}
