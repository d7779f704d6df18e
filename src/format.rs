//! Period key and snapshot name rendering.
//!
//! Patterns are chrono strftime patterns with two extensions:
//! - `%q` renders the quarter of the year (1-4)
//! - `%{count}` renders the same-day ordinal, zero padded to 3 digits
//!
//! Rendering is pure: the same pattern, instant and ordinal always give the
//! same string, which is what makes period keys usable as existence checks.

use std::fmt::Write as _;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Datelike, Utc};

use crate::error::{Error, Result};

/// Default pattern for snapshot names.
pub const DEFAULT_NAME_FORMAT: &str = "%Y-%m-%d.%{count}";

const SECONDS_PER_DAY: i64 = 86_400;

/// The finest calendar unit a pattern distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Granularity {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
    /// The pattern renders the same key forever.
    Constant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Literal(&'a str),
    /// A chrono specifier including its `%` and flags, plus the conversion char.
    Spec(&'a str, char),
    Quarter,
    Count,
}

fn invalid(pattern: &str) -> Error {
    Error::InvalidFormat {
        pattern: pattern.to_string(),
    }
}

fn tokenize(pattern: &str) -> Result<Vec<Token<'_>>> {
    let mut tokens = Vec::new();
    let mut literal_start = 0;
    let mut chars = pattern.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        if c != '%' {
            continue;
        }
        if literal_start < start {
            tokens.push(Token::Literal(&pattern[literal_start..start]));
        }

        if pattern[start + 1..].starts_with("{count}") {
            // skip the 7 chars of "{count}"
            for _ in 0..7 {
                chars.next();
            }
            tokens.push(Token::Count);
            literal_start = start + 1 + "{count}".len();
            continue;
        }

        let mut has_flags = false;
        while let Some(&(_, f)) = chars.peek() {
            if matches!(f, '-' | '_' | '0' | '#' | ':' | '.') || f.is_ascii_digit() {
                has_flags = true;
                chars.next();
            } else {
                break;
            }
        }

        let Some((idx, conversion)) = chars.next() else {
            return Err(invalid(pattern));
        };
        let end = idx + conversion.len_utf8();

        if conversion == 'q' && !has_flags {
            tokens.push(Token::Quarter);
        } else {
            tokens.push(Token::Spec(&pattern[start..end], conversion));
        }
        literal_start = end;
    }

    if literal_start < pattern.len() {
        tokens.push(Token::Literal(&pattern[literal_start..]));
    }

    Ok(tokens)
}

fn quarter(now: &DateTime<Utc>) -> u32 {
    (now.month() + 2) / 3
}

fn parse_items<'a>(pattern: &str, expanded: &'a str) -> Result<Vec<Item<'a>>> {
    let items: Vec<Item<'a>> = StrftimeItems::new(expanded).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(invalid(pattern));
    }
    Ok(items)
}

/// Render `pattern` for `now`, substituting `ordinal` for `%{count}`.
pub fn render(pattern: &str, now: DateTime<Utc>, ordinal: u32) -> Result<String> {
    let mut expanded = String::with_capacity(pattern.len() + 8);
    for token in tokenize(pattern)? {
        match token {
            Token::Literal(text) | Token::Spec(text, _) => expanded.push_str(text),
            Token::Quarter => {
                let _ = write!(expanded, "{}", quarter(&now));
            }
            Token::Count => {
                let _ = write!(expanded, "{ordinal:03}");
            }
        }
    }

    let items = parse_items(pattern, &expanded)?;
    let mut out = String::with_capacity(expanded.len() + 8);
    write!(out, "{}", now.format_with_items(items.iter())).map_err(|_| invalid(pattern))?;
    Ok(out)
}

/// Check that `pattern` renders without error.
pub fn validate(pattern: &str) -> Result<()> {
    render(pattern, DateTime::<Utc>::default(), 0).map(|_| ())
}

/// Finest unit referenced by `pattern`. Unknown specifiers do not count.
pub fn granularity(pattern: &str) -> Result<Granularity> {
    let finest = tokenize(pattern)?
        .into_iter()
        .filter_map(|token| match token {
            Token::Literal(_) => None,
            Token::Quarter => Some(Granularity::Quarter),
            Token::Count => Some(Granularity::Second),
            Token::Spec(_, conversion) => specifier_granularity(conversion),
        })
        .min()
        .unwrap_or(Granularity::Constant);
    Ok(finest)
}

fn specifier_granularity(conversion: char) -> Option<Granularity> {
    match conversion {
        'S' | 's' | 'T' | 'X' | 'r' | 'c' | 'f' | '+' => Some(Granularity::Second),
        'M' | 'R' => Some(Granularity::Minute),
        'H' | 'I' | 'k' | 'l' | 'p' | 'P' => Some(Granularity::Hour),
        'd' | 'e' | 'j' | 'a' | 'A' | 'u' | 'w' | 'D' | 'F' | 'x' | 'v' => Some(Granularity::Day),
        'U' | 'W' | 'V' => Some(Granularity::Week),
        'm' | 'b' | 'B' | 'h' => Some(Granularity::Month),
        'Y' | 'y' | 'G' | 'g' | 'C' => Some(Granularity::Year),
        _ => None,
    }
}

/// Unix timestamp of 00:00:00 UTC on the day of `now`.
pub fn midnight(now: DateTime<Utc>) -> i64 {
    let secs = now.timestamp();
    secs - secs.rem_euclid(SECONDS_PER_DAY)
}
