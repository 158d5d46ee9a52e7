//! # Line-oriented header parser
//!
//! Single-pass state machine turning CASCADE binary headers and NICOS ASCII scan headers
//! into a [`MetadataDocument`].
//!
//! ## Overview
//! -----------------
//! The parser walks the input line by line and keeps one piece of state: the name of the
//! section currently being filled. It starts in a synthetic pre-header section which is
//! dropped before the document is returned.
//!
//! For every line:
//!
//! 1. the line is decoded as UTF-8 (undecodable lines are skipped),
//! 2. the dialect prefix is removed ([`HeaderDialect::Ascii`] drops the leading `#`),
//! 3. the trimmed line is split on `:`,
//! 4. a single field starting with the section marker opens a new section, a single field
//!    inside [`SCAN_DATA_SECTION`] yields the column names then the column units, and every
//!    other line goes through [`classify_fields`].
//!
//! Binary payload bytes surrounding the header are tolerated: they either fail to decode or
//! classify as lines matching no rule.
//!
//! ## Example
//! -----------------
//! ```rust
//! use nredux::metadata::header_parser::{parse_header_bytes, HeaderDialect};
//! use nredux::metadata::MetaValue;
//!
//! let text = b"garbage\n###Detector\ntau : 0.25\ntimechannels : 16\n";
//! let doc = parse_header_bytes(text, HeaderDialect::Cascade);
//! assert_eq!(doc.get("Detector", "tau"), Some(&MetaValue::Float(0.25)));
//! assert_eq!(doc.len(), 1);
//! ```
use std::fs::File;
use std::io::{BufRead, BufReader};

use camino::Utf8Path;
use log::debug;

use super::classifier::{classify_fields, column_tokens, LineClass};
use super::{MetaValue, MetadataDocument};
use crate::nredux_errors::ReductionError;

/// Section holding the column names and units of an ASCII scan table.
pub const SCAN_DATA_SECTION: &str = "Scan data";

/// Key of the column-name tuple inside [`SCAN_DATA_SECTION`].
pub const SCAN_NAMES_KEY: &str = "names";

/// Key of the column-unit tuple inside [`SCAN_DATA_SECTION`].
pub const SCAN_UNITS_KEY: &str = "units";

/// Collects everything found before the first section header.
const PRE_HEADER_SECTION: &str = "\u{0}pre-header";

/// Header flavour understood by the line parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderDialect {
    /// CASCADE `.pad` / `.tof` files: sections open with `###name`.
    Cascade,
    /// NICOS `.dat` files: every line carries a leading `#`, sections open with `# ##name`.
    Ascii,
}

impl HeaderDialect {
    fn section_marker(&self) -> &'static str {
        match self {
            HeaderDialect::Cascade => "###",
            HeaderDialect::Ascii => "##",
        }
    }

    /// Remove the per-line prefix of the dialect.
    fn strip_line_prefix<'a>(&self, line: &'a str) -> &'a str {
        match self {
            HeaderDialect::Cascade => line,
            HeaderDialect::Ascii => {
                let mut chars = line.chars();
                chars.next();
                chars.as_str()
            }
        }
    }
}

struct HeaderState {
    dialect: HeaderDialect,
    current: String,
    document: MetadataDocument,
}

impl HeaderState {
    fn new(dialect: HeaderDialect) -> Self {
        let mut document = MetadataDocument::new();
        document.open_section(PRE_HEADER_SECTION);
        HeaderState {
            dialect,
            current: PRE_HEADER_SECTION.to_string(),
            document,
        }
    }

    fn feed_bytes(&mut self, raw: &[u8]) {
        match std::str::from_utf8(raw) {
            Ok(line) => self.feed_line(line),
            Err(_) => debug!("header parser: skipping undecodable line of {} bytes", raw.len()),
        }
    }

    fn feed_line(&mut self, line: &str) {
        let line = self.dialect.strip_line_prefix(line).trim();
        let fields: Vec<&str> = line.split(':').collect();

        match classify_fields(&fields) {
            LineClass::Bare(field) => self.bare_field(&field),
            LineClass::Entry(key, value) => self.document.insert(&self.current, &key, value),
            LineClass::Skip => debug!("header parser: no rule for line '{line}'"),
        }
    }

    fn bare_field(&mut self, field: &str) {
        if let Some(name) = field.strip_prefix(self.dialect.section_marker()) {
            self.current = name.trim().to_string();
            self.document.open_section(&self.current);
            return;
        }
        if self.current != SCAN_DATA_SECTION {
            return;
        }
        let Some(section) = self.document.section_mut(SCAN_DATA_SECTION) else {
            return;
        };
        let tokens = MetaValue::StrTuple(column_tokens(field));
        if !section.contains_key(SCAN_NAMES_KEY) {
            section.insert(SCAN_NAMES_KEY.to_string(), tokens);
        } else if !section.contains_key(SCAN_UNITS_KEY) {
            section.insert(SCAN_UNITS_KEY.to_string(), tokens);
        }
    }

    fn finish(mut self) -> MetadataDocument {
        self.document.remove_section(PRE_HEADER_SECTION);
        self.document
    }
}

/// Parse a header held in memory.
///
/// Arguments
/// -----------------
/// * `bytes` – raw file content, possibly mixing text lines and binary payload.
/// * `dialect` – header flavour.
///
/// Return
/// ----------
/// * The parsed [`MetadataDocument`]. Parsing never fails; unclassifiable lines are skipped.
pub fn parse_header_bytes(bytes: &[u8], dialect: HeaderDialect) -> MetadataDocument {
    let mut state = HeaderState::new(dialect);
    for raw in bytes.split(|b| *b == b'\n') {
        state.feed_bytes(raw);
    }
    state.finish()
}

/// Parse a header from any buffered reader.
///
/// Return
/// ----------
/// * The parsed [`MetadataDocument`], or the I/O error raised by the reader.
pub fn parse_header_reader<R: BufRead>(
    reader: R,
    dialect: HeaderDialect,
) -> Result<MetadataDocument, ReductionError> {
    let mut state = HeaderState::new(dialect);
    for raw in reader.split(b'\n') {
        state.feed_bytes(&raw?);
    }
    Ok(state.finish())
}

/// Parse the header of the file at `path`.
///
/// The file handle is owned by this call and closed on every exit path.
///
/// See also
/// ------------
/// * [`parse_header_reader`] – the streaming entry point used here.
pub fn parse_header_file(
    path: &Utf8Path,
    dialect: HeaderDialect,
) -> Result<MetadataDocument, ReductionError> {
    let file = File::open(path)?;
    parse_header_reader(BufReader::new(file), dialect)
}

#[cfg(test)]
mod header_parser_test {
    use super::*;

    const CASCADE_HEADER: &str = "\
binary junk before the header
###Sample and alignment
omega : 12.5 deg
sample : MnSi
url : https://mlz-garching.de
started : 2018-03-17 14:25:30
a:b:c:d:e
###Detector
tau : 0.25
timechannels : 16
";

    const ASCII_HEADER: &str = "\
### NICOS data file, created at 2017-11-07 15:44:14
### Device positions and sample environment state
#              Exp_title : MnSi sample
#             sth_value : 1.5 2.5 deg
### Scan data
# sth_st    timer      file
# deg       s          -
1.0   10.0   00147720.tof
2.0   10.0   00147721.tof
";

    #[test]
    fn test_cascade_sections_and_values() {
        let doc = parse_header_bytes(CASCADE_HEADER.as_bytes(), HeaderDialect::Cascade);

        assert_eq!(
            doc.section_names().collect::<Vec<_>>(),
            vec!["Sample and alignment", "Detector"]
        );
        let sample = doc.get_section("Sample and alignment").unwrap();
        assert_eq!(sample["omega"], MetaValue::Quantity(12.5, "deg".into()));
        assert_eq!(sample["sample"], MetaValue::Str("MnSi".into()));
        assert_eq!(sample["url"], MetaValue::Str(" https://mlz-garching.de".into()));
        assert_eq!(
            sample["started"],
            MetaValue::StrTuple(vec!["2018-03-17 14".into(), "25 : 30".into()])
        );
        assert_eq!(sample.len(), 4);
        assert_eq!(doc.get("Detector", "timechannels"), Some(&MetaValue::Int(16)));
    }

    #[test]
    fn test_pre_header_content_is_dropped() {
        let doc = parse_header_bytes(b"key : 1\nother : 2\n", HeaderDialect::Cascade);
        assert!(doc.is_empty());
    }

    #[test]
    fn test_undecodable_lines_are_skipped() {
        let mut bytes = b"###Detector\ntau : 0.25\n".to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe, b':', 0x80, b'\n']);
        bytes.extend_from_slice(b"timechannels : 16\n");

        let doc = parse_header_bytes(&bytes, HeaderDialect::Cascade);
        let detector = doc.get_section("Detector").unwrap();
        assert_eq!(detector.len(), 2);
        assert_eq!(detector["tau"], MetaValue::Float(0.25));
    }

    #[test]
    fn test_ascii_scan_columns() {
        let doc = parse_header_bytes(ASCII_HEADER.as_bytes(), HeaderDialect::Ascii);

        assert_eq!(
            doc.get("Device positions and sample environment state", "Exp_title"),
            Some(&MetaValue::Str("MnSi sample".into()))
        );
        assert_eq!(
            doc.get("Device positions and sample environment state", "sth_value"),
            Some(&MetaValue::QuantityTuple(vec![1.5, 2.5], "deg".into()))
        );
        assert_eq!(
            doc.get(SCAN_DATA_SECTION, SCAN_NAMES_KEY),
            Some(&MetaValue::StrTuple(vec![
                "sth_st".into(),
                "timer".into(),
                "file".into()
            ]))
        );
        assert_eq!(
            doc.get(SCAN_DATA_SECTION, SCAN_UNITS_KEY),
            Some(&MetaValue::StrTuple(vec!["deg".into(), "s".into(), "-".into()]))
        );
        // data rows do not overwrite the column description
        assert_eq!(doc.get_section(SCAN_DATA_SECTION).unwrap().len(), 2);
    }

    #[test]
    fn test_reader_and_bytes_agree() {
        let from_bytes = parse_header_bytes(ASCII_HEADER.as_bytes(), HeaderDialect::Ascii);
        let from_reader =
            parse_header_reader(ASCII_HEADER.as_bytes(), HeaderDialect::Ascii).unwrap();
        assert_eq!(from_bytes, from_reader);
        assert_eq!(
            from_bytes,
            parse_header_bytes(ASCII_HEADER.as_bytes(), HeaderDialect::Ascii)
        );
    }
}
