//! # Metadata value classification
//!
//! On-the-fly type inference for header values, shared by every line-oriented dialect.
//!
//! ## Overview
//! -----------------
//! Two regular expressions are applied to the raw value string:
//!
//! * a **numeric-literal matcher** `[+-]?\d+[\.e+-]{0,2}\d*` (all occurrences),
//! * a **trailing-unit matcher** `\s[A-Za-z]{1,4}[\-\d]{0,2}$` (1–4 letters, optional
//!   `-digit` suffix, preceded by whitespace, anchored at the end).
//!
//! The outcome, in priority order:
//!
//! | numbers | unit | result                                   |
//! |---------|------|------------------------------------------|
//! | 1       | yes  | [`MetaValue::Quantity`]                  |
//! | > 1     | yes  | [`MetaValue::QuantityTuple`]             |
//! | > 1     | no   | [`MetaValue::FloatTuple`] (strings if a literal is not a float) |
//! | 1       | no   | [`MetaValue::Int`] if lossless, else [`MetaValue::Float`] |
//! | 0       | –    | trimmed [`MetaValue::Str`]               |
//!
//! Literals accepted by the matcher but rejected by the float grammar (`"2-3"`, `"1e+"`)
//! degrade to strings instead of aborting the parse.
//!
//! The line-level arity rules (fields obtained by splitting on `:`) live in
//! [`classify_fields`].
use once_cell::sync::Lazy;
use regex::Regex;

use super::MetaValue;

static VALUE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[+-]?\d+[\.e+-]{0,2}\d*").expect("valid regex"));

static UNIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s[A-Za-z]{1,4}[\-\d]{0,2}$").expect("valid regex"));

static COLUMN_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9\._\-;]+").expect("valid regex"));

static INTEGER_CELL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[+-]?\d+$").expect("valid regex"));

static FLOAT_CELL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?\d+[\.e+-]{0,2}\d*").expect("valid regex"));

/// Outcome of classifying one split header line.
#[derive(Debug, Clone, PartialEq)]
pub enum LineClass {
    /// A single field (no `:`); only meaningful inside the scan-data section.
    Bare(String),
    /// A key/value entry to store in the current section.
    Entry(String, MetaValue),
    /// A line matching no arity rule.
    Skip,
}

/// Classify a raw value string into a typed [`MetaValue`].
///
/// Arguments
/// -----------------
/// * `raw` – the text right of the first `:` of a `key : value` line (untrimmed).
///
/// Return
/// ----------
/// * The inferred [`MetaValue`]; never fails (see module docs for the fallbacks).
///
/// Examples
/// -----------------
/// ```rust
/// use nredux::metadata::{classifier::classify_value, MetaValue};
///
/// assert_eq!(classify_value(" 5.7 s"), MetaValue::Quantity(5.7, "s".into()));
/// assert_eq!(classify_value(" 161027"), MetaValue::Int(161027));
/// assert_eq!(classify_value(" 5.00"), MetaValue::Float(5.0));
/// ```
pub fn classify_value(raw: &str) -> MetaValue {
    let numbers: Vec<&str> = VALUE_RE.find_iter(raw).map(|m| m.as_str()).collect();
    let unit = UNIT_RE.find(raw).map(|m| m.as_str().trim().to_string());

    match (numbers.len(), unit) {
        (0, _) => MetaValue::Str(raw.trim().to_string()),
        (1, Some(unit)) => match numbers[0].parse::<f64>() {
            Ok(v) => MetaValue::Quantity(v, unit),
            Err(_) => MetaValue::Str(raw.trim().to_string()),
        },
        (_, Some(unit)) => match parse_floats(&numbers) {
            Some(values) => MetaValue::QuantityTuple(values, unit),
            None => MetaValue::StrTuple(numbers.iter().map(|s| s.to_string()).collect()),
        },
        (1, None) => classify_number(numbers[0])
            .unwrap_or_else(|| MetaValue::Str(raw.trim().to_string())),
        (_, None) => match parse_floats(&numbers) {
            Some(values) => MetaValue::FloatTuple(values),
            None => MetaValue::StrTuple(numbers.iter().map(|s| s.to_string()).collect()),
        },
    }
}

/// Integer if the literal converts losslessly, float otherwise.
fn classify_number(literal: &str) -> Option<MetaValue> {
    if let Ok(i) = literal.parse::<i64>() {
        return Some(MetaValue::Int(i));
    }
    literal.parse::<f64>().ok().map(MetaValue::Float)
}

fn parse_floats(literals: &[&str]) -> Option<Vec<f64>> {
    literals.iter().map(|s| s.parse::<f64>().ok()).collect()
}

/// Apply the arity rules to the `:`-separated fields of a header line.
///
/// Arguments
/// -----------------
/// * `fields` – result of splitting the (trimmed) line on `:`.
///
/// Return
/// ----------
/// * `Bare` for one field, `Entry` for two to four fields, `Skip` otherwise.
///
/// Rules
/// -----------------
/// * 2 fields – `key : value`, value classified by [`classify_value`].
/// * 3 fields – a URL when the second field is `http`/`https` (fields rejoined verbatim, so
///   the space after the key separator is kept), else a string pair.
/// * 4 fields – `(field2, "field3 : field4")`.
pub fn classify_fields(fields: &[&str]) -> LineClass {
    match fields {
        [single] => LineClass::Bare(single.to_string()),
        [key, value] => LineClass::Entry(key.trim().to_string(), classify_value(value)),
        [key, scheme, rest] => {
            let scheme_trimmed = scheme.trim();
            let value = if scheme_trimmed == "http" || scheme_trimmed == "https" {
                MetaValue::Str(format!("{scheme}:{rest}"))
            } else {
                MetaValue::StrTuple(vec![scheme_trimmed.to_string(), rest.trim().to_string()])
            };
            LineClass::Entry(key.trim().to_string(), value)
        }
        [key, first, second, third] => LineClass::Entry(
            key.trim().to_string(),
            MetaValue::StrTuple(vec![
                first.trim().to_string(),
                format!("{} : {}", second.trim(), third.trim()),
            ]),
        ),
        _ => LineClass::Skip,
    }
}

/// Tokenize a scan-data column line (names or units) on non-`[A-Za-z0-9._-;]` boundaries.
pub fn column_tokens(line: &str) -> Vec<String> {
    COLUMN_TOKEN_RE
        .find_iter(line)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Cell type inferred from the first row of an ASCII scan table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    /// 8-byte signed integer
    Integer,
    /// 8-byte float
    Float,
    /// Fixed-width string of the given byte length
    Text(usize),
}

/// Infer the storage type of a table cell from its text.
///
/// A cell that starts like a float literal but does not convert as a whole is stored as text.
pub fn cell_kind(cell: &str) -> CellKind {
    if INTEGER_CELL_RE.is_match(cell) {
        CellKind::Integer
    } else if FLOAT_CELL_RE.is_match(cell) && cell.parse::<f64>().is_ok() {
        CellKind::Float
    } else {
        CellKind::Text(cell.len())
    }
}

#[cfg(test)]
mod classifier_test {
    use super::*;

    #[test]
    fn test_reference_values() {
        assert_eq!(classify_value(" 5.7 s"), MetaValue::Quantity(5.7, "s".into()));
        assert_eq!(classify_value(" 161027"), MetaValue::Int(161027));
        assert_eq!(classify_value(" 5.00"), MetaValue::Float(5.0));
    }

    #[test]
    fn test_tuples_and_units() {
        assert_eq!(
            classify_value(" 1.5 2.5 3 mm"),
            MetaValue::QuantityTuple(vec![1.5, 2.5, 3.0], "mm".into())
        );
        assert_eq!(
            classify_value(" (12, -4.5)"),
            MetaValue::FloatTuple(vec![12.0, -4.5])
        );
        assert_eq!(classify_value(" 3.2 meV"), MetaValue::Quantity(3.2, "meV".into()));
        // the "-digit" unit suffix is also picked up as a second literal
        assert_eq!(
            classify_value(" 2.0 K-1"),
            MetaValue::QuantityTuple(vec![2.0, -1.0], "K-1".into())
        );
        assert_eq!(classify_value("  MnSi sample "), MetaValue::Str("MnSi sample".into()));
    }

    #[test]
    fn test_unconvertible_literals_degrade() {
        // "2017-10" is matched as a single literal but is not a float
        assert_eq!(classify_value(" 2017-10"), MetaValue::Str("2017-10".into()));
        assert_eq!(
            classify_value(" 2017-10 3-4"),
            MetaValue::StrTuple(vec!["2017-10".into(), "3-4".into()])
        );
    }

    #[test]
    fn test_arity_rules() {
        assert_eq!(
            classify_fields(&["url ", " https", "//mlz-garching.de"]),
            LineClass::Entry("url".into(), MetaValue::Str(" https://mlz-garching.de".into()))
        );
        assert_eq!(
            classify_fields(&["doc", "http", "//host/a b"]),
            LineClass::Entry("doc".into(), MetaValue::Str("http://host/a b".into()))
        );
        assert_eq!(
            classify_fields(&["sel ", " val", " x "]),
            LineClass::Entry(
                "sel".into(),
                MetaValue::StrTuple(vec!["val".into(), "x".into()])
            )
        );
        assert_eq!(
            classify_fields(&["started ", " 2018-03-17 14", "25", "30"]),
            LineClass::Entry(
                "started".into(),
                MetaValue::StrTuple(vec!["2018-03-17 14".into(), "25 : 30".into()])
            )
        );
        assert_eq!(classify_fields(&["a", "b", "c", "d", "e"]), LineClass::Skip);
        assert_eq!(classify_fields(&["only"]), LineClass::Bare("only".into()));
    }

    #[test]
    fn test_cell_kind_and_tokens() {
        assert_eq!(cell_kind("42"), CellKind::Integer);
        assert_eq!(cell_kind("-4.2e3"), CellKind::Float);
        assert_eq!(cell_kind("00147720.tof"), CellKind::Text(12));
        assert_eq!(cell_kind("file.pad"), CellKind::Text(8));
        assert_eq!(
            column_tokens(" ;  sth_1  time  file.pad (cts)"),
            vec![";", "sth_1", "time", "file.pad", "cts"]
        );
    }
}
