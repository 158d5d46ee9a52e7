//! # ILL fixed-format parser
//!
//! Dispatch-table parser for triple-axis ASCII files written at the ILL (IN12 and friends).
//!
//! ## Overview
//! -----------------
//! Header lines start with a 5-character keyword followed by `:`. Each known keyword is routed
//! to a dedicated sub-parser and stored in a section named after the keyword:
//!
//! | keyword | stored as |
//! |---|---|
//! | `EXPNO` `USER_` `LOCAL` `TITLE` `TYPE_` `CURVE` `ELSE_` | fields joined by single spaces |
//! | `INSTR` | `INSTRUMENT` → instrument name |
//! | `FILE_` | `FILENUMBER` → integer, or trimmed string |
//! | `DATE_` | `DATE-TIME` → `yy/mm/dd hh:mm:ss` |
//! | `COMND` | device command record (see [`CommandRecord`]) |
//! | `POSQE` `STEPS` `PARAM` `VARIA` `ZEROS` | `key=value,...` list |
//!
//! Repeated keywords merge into the same section; later entries win.
//!
//! The `DATA_` keyword ends the header. The line right after it names the table columns and
//! every following line is a whitespace-delimited numeric row ([`NumericTable`]).
//!
//! Lines whose first `:`-field is not 5 characters long, unknown keywords, and lines a
//! sub-parser cannot read are skipped.
use std::collections::BTreeSet;
use std::fs;

use camino::Utf8Path;
use log::debug;
use nom::{
    bytes::complete::take_till,
    character::complete::char,
    multi::separated_list0,
    sequence::separated_pair,
    IResult, Parser,
};
use ndarray::{Array2, ArrayView1, Axis};

use super::{MetaValue, MetadataDocument};
use crate::nredux_errors::ReductionError;

/// Keyword ending the header block.
pub const DATA_MARKER: &str = "DATA_";

const KEYWORD_LEN: usize = 5;

const MONTHS: [(&str, &str); 12] = [
    ("JAN", "01"),
    ("FEB", "02"),
    ("MAR", "03"),
    ("APR", "04"),
    ("MAY", "05"),
    ("JUN", "06"),
    ("JUL", "07"),
    ("AUG", "08"),
    ("SEP", "09"),
    ("OCT", "10"),
    ("NOV", "11"),
    ("DEC", "12"),
];

/// Sub-parser selected by the line keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineParser {
    Pass,
    Instrument,
    FileNumber,
    Date,
    Command,
    Params,
}

impl LineParser {
    fn for_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "EXPNO" | "USER_" | "LOCAL" | "TITLE" | "TYPE_" | "CURVE" | "ELSE_" => {
                Some(LineParser::Pass)
            }
            "INSTR" => Some(LineParser::Instrument),
            "FILE_" => Some(LineParser::FileNumber),
            "DATE_" => Some(LineParser::Date),
            "COMND" => Some(LineParser::Command),
            "POSQE" | "STEPS" | "PARAM" | "VARIA" | "ZEROS" => Some(LineParser::Params),
            _ => None,
        }
    }

    /// Parse the fields right of the keyword into `(key, value)` entries.
    fn parse(
        &self,
        keyword: &str,
        fields: &[&str],
    ) -> Result<Vec<(String, MetaValue)>, ReductionError> {
        match self {
            LineParser::Pass => Ok(vec![(keyword.trim().to_uppercase(), joined(fields))]),
            LineParser::Instrument => Ok(vec![("INSTRUMENT".to_string(), joined(fields))]),
            LineParser::FileNumber => {
                let raw = fields.join(":");
                let value = match raw.trim().parse::<i64>() {
                    Ok(n) => MetaValue::Int(n),
                    Err(_) => MetaValue::Str(raw.trim().to_string()),
                };
                Ok(vec![("FILENUMBER".to_string(), value)])
            }
            LineParser::Date => {
                parse_date(fields).map(|date| vec![("DATE-TIME".to_string(), MetaValue::Str(date))])
            }
            LineParser::Command => Ok(CommandRecord::parse(&fields.join(":"))?.into_entries()),
            LineParser::Params => {
                let mut entries = parse_param_list(&fields.join(":"))?;
                if keyword == "POSQE" {
                    if let Some(position) = qe_position(&entries) {
                        entries.push(("POSQE".to_string(), position));
                    }
                }
                Ok(entries)
            }
        }
    }
}

fn joined(fields: &[&str]) -> MetaValue {
    MetaValue::Str(
        fields
            .iter()
            .map(|s| s.trim())
            .collect::<Vec<_>>()
            .join(" "),
    )
}

/// `"dd-MON-yy hh" : "mm" : "ss"` → `"yy/mm/dd hh:mm:ss"`.
fn parse_date(fields: &[&str]) -> Result<String, ReductionError> {
    let malformed =
        || ReductionError::TableParseError(format!("malformed date '{}'", fields.join(":")));

    let [date_hour, minutes, seconds] = fields else {
        return Err(malformed());
    };
    let (date, hours) = date_hour.trim().split_once(' ').ok_or_else(malformed)?;
    let parts: Vec<&str> = date.split('-').collect();
    let [day, month, year] = parts.as_slice() else {
        return Err(malformed());
    };
    let month = MONTHS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(month))
        .map(|(_, number)| *number)
        .ok_or_else(malformed)?;

    Ok(format!(
        "{year}/{month}/{day} {}:{}:{}",
        hours.trim(),
        minutes.trim(),
        seconds.trim()
    ))
}

fn param_pair(input: &str) -> IResult<&str, (&str, &str)> {
    separated_pair(
        take_till(|c: char| c == '=' || c == ','),
        char('='),
        take_till(|c: char| c == ','),
    )
    .parse(input)
}

/// Parse a `key=value, key=value, ...` list.
///
/// Values convertible to `f64` are stored as [`MetaValue::Float`], every other value as a
/// trimmed [`MetaValue::Str`].
///
/// Return
/// ----------
/// * The entries in file order, or [`ReductionError::NomParsingError`] when the list does
///   not follow the grammar.
pub fn parse_param_list(input: &str) -> Result<Vec<(String, MetaValue)>, ReductionError> {
    let input = input.trim();
    let (rest, pairs) = separated_list0(char(','), param_pair)
        .parse(input)
        .map_err(|_| ReductionError::NomParsingError(input.to_string()))?;
    if !rest.trim().is_empty() {
        return Err(ReductionError::NomParsingError(input.to_string()));
    }

    Ok(pairs
        .into_iter()
        .map(|(key, value)| {
            let value = match value.trim().parse::<f64>() {
                Ok(v) => MetaValue::Float(v),
                Err(_) => MetaValue::Str(value.trim().to_string()),
            };
            (key.trim().to_string(), value)
        })
        .collect())
}

fn qe_position(entries: &[(String, MetaValue)]) -> Option<MetaValue> {
    let lookup = |name: &str| entries.iter().find(|(k, _)| k == name).map(|(_, v)| v);
    let coordinates = ["QH", "QK", "QL", "EN"]
        .iter()
        .map(|name| lookup(*name).and_then(MetaValue::as_f64))
        .collect::<Option<Vec<f64>>>()?;
    let unit = lookup("UN")?.as_str()?.to_string();
    Some(MetaValue::QuantityTuple(coordinates, unit))
}

/// Device scan command from a `COMND` line, e.g. `sc qh 1 0 0 0 dqh 0 0 0 .02 np 21 mn 120`.
///
/// After the command and device names, numbers accumulate into the current slot and every
/// word moves to the next indicator slot:
/// `device_state`, `step_indicator`, `step`, `numpoints_indicator`, `numpoints`,
/// `counter_device`, `counter_threshold`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommandRecord {
    pub command: String,
    pub device: String,
    pub device_state: Vec<f64>,
    pub step_indicator: Option<String>,
    pub step: Vec<f64>,
    pub numpoints_indicator: Option<String>,
    pub numpoints: f64,
    pub counter_device: Option<String>,
    pub counter_threshold: f64,
}

impl CommandRecord {
    pub fn parse(line: &str) -> Result<Self, ReductionError> {
        let mut bits = line.split_whitespace();
        let (Some(command), Some(device)) = (bits.next(), bits.next()) else {
            return Err(ReductionError::TableParseError(format!(
                "command line '{}' lacks a device",
                line.trim()
            )));
        };
        let mut record = CommandRecord {
            command: command.to_string(),
            device: device.to_string(),
            ..Default::default()
        };

        let mut slot = 0usize;
        for bit in bits {
            match bit.parse::<f64>() {
                Ok(number) => match slot {
                    0 => record.device_state.push(number),
                    2 => record.step.push(number),
                    4 => record.numpoints = number,
                    6 => record.counter_threshold = number,
                    // numbers after an indicator word but before its value slot
                    _ => (),
                },
                Err(_) => {
                    slot += 1;
                    match slot {
                        1 => record.step_indicator = Some(bit.to_string()),
                        3 => record.numpoints_indicator = Some(bit.to_string()),
                        5 => record.counter_device = Some(bit.to_string()),
                        _ => debug!("COMND: ignoring trailing word '{bit}'"),
                    }
                    slot += 1;
                }
            }
        }
        Ok(record)
    }

    fn into_entries(self) -> Vec<(String, MetaValue)> {
        let mut entries = vec![
            ("command".to_string(), MetaValue::Str(self.command)),
            ("device".to_string(), MetaValue::Str(self.device)),
            ("device_state".to_string(), MetaValue::FloatTuple(self.device_state)),
            ("step".to_string(), MetaValue::FloatTuple(self.step)),
            ("numpoints".to_string(), integral(self.numpoints)),
            ("counter_threshold".to_string(), integral(self.counter_threshold)),
        ];
        for (key, word) in [
            ("step_indicator", self.step_indicator),
            ("numpoints_indicator", self.numpoints_indicator),
            ("counter_device", self.counter_device),
        ] {
            if let Some(word) = word {
                entries.push((key.to_string(), MetaValue::Str(word)));
            }
        }
        entries
    }
}

fn integral(value: f64) -> MetaValue {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        MetaValue::Int(value as i64)
    } else {
        MetaValue::Float(value)
    }
}

/// Whitespace-delimited numeric table following the `DATA_` marker.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericTable {
    columns: Vec<String>,
    data: Array2<f64>,
}

impl NumericTable {
    pub fn new(columns: Vec<String>, data: Array2<f64>) -> Result<Self, ReductionError> {
        if columns.len() != data.ncols() {
            return Err(ReductionError::TableParseError(format!(
                "{} column names for {} data columns",
                columns.len(),
                data.ncols()
            )));
        }
        Ok(NumericTable { columns, data })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn nrows(&self) -> usize {
        self.data.nrows()
    }

    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|idx| self.data.column(idx))
    }

    /// Sub-table made of the requested columns.
    ///
    /// Arguments
    /// -----------------
    /// * `indices` – column positions.
    /// * `names` – column names.
    ///
    /// Return
    /// ----------
    /// * The union of both selections, in ascending column order. With both lists empty the
    ///   whole table is returned. Unknown names or out-of-range indices are errors.
    pub fn select(
        &self,
        indices: &[usize],
        names: &[&str],
    ) -> Result<NumericTable, ReductionError> {
        if indices.is_empty() && names.is_empty() {
            return Ok(self.clone());
        }
        let mut chosen = BTreeSet::new();
        for &idx in indices {
            if idx >= self.columns.len() {
                return Err(ReductionError::TableParseError(format!(
                    "column index {idx} out of range for {} columns",
                    self.columns.len()
                )));
            }
            chosen.insert(idx);
        }
        for name in names {
            let idx = self.columns.iter().position(|c| c == name).ok_or_else(|| {
                ReductionError::TableParseError(format!("unknown column '{name}'"))
            })?;
            chosen.insert(idx);
        }
        let chosen: Vec<usize> = chosen.into_iter().collect();

        Ok(NumericTable {
            columns: chosen.iter().map(|&i| self.columns[i].clone()).collect(),
            data: self.data.select(Axis(1), &chosen),
        })
    }
}

fn read_numeric_rows<'a, I>(columns: &[String], lines: I) -> Result<Array2<f64>, ReductionError>
where
    I: Iterator<Item = &'a str>,
{
    let mut width = columns.len();
    let mut flat = Vec::new();
    let mut nrows = 0;

    for line in lines {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let cells: Vec<&str> = line.split_whitespace().collect();
        if width == 0 {
            width = cells.len();
        }
        if cells.len() > width {
            return Err(ReductionError::TableParseError(format!(
                "row '{line}' has {} cells for {width} columns",
                cells.len()
            )));
        }
        flat.extend(cells.iter().map(|c| c.parse::<f64>().unwrap_or(f64::NAN)));
        flat.extend(std::iter::repeat(f64::NAN).take(width - cells.len()));
        nrows += 1;
    }

    Array2::from_shape_vec((nrows, width), flat)
        .map_err(|e| ReductionError::TableParseError(e.to_string()))
}

/// Parse an ILL file held in memory.
///
/// Return
/// ----------
/// * `(metadata, table)`; [`ReductionError::TableParseError`] when the `DATA_` marker is
///   missing or a data row is wider than the column list.
pub fn parse_ill_str(text: &str) -> Result<(MetadataDocument, NumericTable), ReductionError> {
    let mut document = MetadataDocument::new();
    let mut lines = text.lines();
    let mut at_data = false;

    for line in lines.by_ref() {
        let fields: Vec<&str> = line.split(':').collect();
        let keyword = fields[0];
        if keyword.chars().count() != KEYWORD_LEN {
            continue;
        }
        if keyword == DATA_MARKER {
            at_data = true;
            break;
        }
        let Some(parser) = LineParser::for_keyword(keyword) else {
            debug!("ILL parser: no sub-parser for keyword '{keyword}'");
            continue;
        };
        match parser.parse(keyword, &fields[1..]) {
            Ok(entries) => {
                for (key, value) in entries {
                    document.insert(keyword, &key, value);
                }
            }
            Err(e) => debug!("ILL parser: skipping {keyword} line ({e})"),
        }
    }

    if !at_data {
        return Err(ReductionError::TableParseError(format!(
            "no {DATA_MARKER} marker found"
        )));
    }

    let columns: Vec<String> = lines
        .next()
        .map(|l| l.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();
    let data = read_numeric_rows(&columns, lines)?;
    let columns = if columns.is_empty() {
        (0..data.ncols()).map(|i| format!("col{i}")).collect()
    } else {
        columns
    };

    Ok((document, NumericTable::new(columns, data)?))
}

/// Parse the ILL file at `path`.
pub fn parse_ill_file(path: &Utf8Path) -> Result<(MetadataDocument, NumericTable), ReductionError> {
    let text = fs::read_to_string(path)?;
    parse_ill_str(&text)
}

#[cfg(test)]
mod ill_parser_test {
    use super::*;
    use approx::assert_relative_eq;

    const IN12_FILE: &str = "\
RRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRRR
INSTR: IN12
EXPNO: 4-01-1500
USER_: beddrich
FILE_: 076800
DATE_: 12-OCT-17 14:25:30
TITLE: MnSi  helix
COMND: sc qh 1 0 0 0 dqh 0 0 0 .02 np 21 mn 120
POSQE: QH=1.0000, QK=0.0000, QL=0.0000, EN=0.5000, UN=meV
PARAM: DM=3.355, DA=3.355, SM=-1, SS=1
PARAM: KFIX=1.55, FX=2
VARIA: A1=37.695, A2=-75.389
UNKWN: whatever
DATA_:
  PNT   QH    M1    CNTS
    1  0.98  1000   12
    2  1.00  1000   bad
    3  1.02  1000
";

    #[test]
    fn test_dispatch_sections() {
        let (doc, _) = parse_ill_str(IN12_FILE).unwrap();

        assert_eq!(doc.get("INSTR", "INSTRUMENT"), Some(&MetaValue::Str("IN12".into())));
        assert_eq!(doc.get("EXPNO", "EXPNO"), Some(&MetaValue::Str("4-01-1500".into())));
        assert_eq!(doc.get("FILE_", "FILENUMBER"), Some(&MetaValue::Int(76800)));
        assert_eq!(
            doc.get("DATE_", "DATE-TIME"),
            Some(&MetaValue::Str("17/10/12 14:25:30".into()))
        );
        assert_eq!(doc.get("TITLE", "TITLE"), Some(&MetaValue::Str("MnSi  helix".into())));
        assert!(doc.get_section("UNKWN").is_none());
        assert!(doc.get_section("RRRRR").is_none());
    }

    #[test]
    fn test_repeated_param_lines_merge() {
        let (doc, _) = parse_ill_str(IN12_FILE).unwrap();
        let param = doc.get_section("PARAM").unwrap();
        assert_eq!(param.len(), 6);
        assert_eq!(param["SM"], MetaValue::Float(-1.0));
        assert_eq!(param["KFIX"], MetaValue::Float(1.55));

        let posqe = doc.get_section("POSQE").unwrap();
        assert_eq!(posqe["UN"], MetaValue::Str("meV".into()));
        assert_eq!(
            posqe["POSQE"],
            MetaValue::QuantityTuple(vec![1.0, 0.0, 0.0, 0.5], "meV".into())
        );
    }

    #[test]
    fn test_command_record() {
        let record = CommandRecord::parse("sc qh 1 0 0 0 dqh 0 0 0 .02 np 21 mn 120").unwrap();
        assert_eq!(record.command, "sc");
        assert_eq!(record.device, "qh");
        assert_eq!(record.device_state, vec![1.0, 0.0, 0.0, 0.0]);
        assert_eq!(record.step_indicator.as_deref(), Some("dqh"));
        assert_eq!(record.step, vec![0.0, 0.0, 0.0, 0.02]);
        assert_eq!(record.numpoints_indicator.as_deref(), Some("np"));
        assert_eq!(record.numpoints, 21.0);
        assert_eq!(record.counter_device.as_deref(), Some("mn"));
        assert_eq!(record.counter_threshold, 120.0);

        let (doc, _) = parse_ill_str(IN12_FILE).unwrap();
        assert_eq!(doc.get("COMND", "numpoints"), Some(&MetaValue::Int(21)));
        assert!(CommandRecord::parse("sc").is_err());
    }

    #[test]
    fn test_param_list_grammar() {
        let entries = parse_param_list(" DM=3.355, SAMPLE=MnSi ").unwrap();
        assert_eq!(
            entries,
            vec![
                ("DM".to_string(), MetaValue::Float(3.355)),
                ("SAMPLE".to_string(), MetaValue::Str("MnSi".into())),
            ]
        );
        assert!(matches!(
            parse_param_list("DM 3.355"),
            Err(ReductionError::NomParsingError(_))
        ));
    }

    #[test]
    fn test_numeric_table_and_select() {
        let (_, table) = parse_ill_str(IN12_FILE).unwrap();
        assert_eq!(table.columns(), ["PNT", "QH", "M1", "CNTS"]);
        assert_eq!(table.nrows(), 3);

        let counts = table.column("CNTS").unwrap();
        assert_relative_eq!(counts[0], 12.0);
        assert!(counts[1].is_nan());
        assert!(counts[2].is_nan());

        let sub = table.select(&[3], &["QH"]).unwrap();
        assert_eq!(sub.columns(), ["QH", "CNTS"]);
        assert_relative_eq!(sub.data()[[2, 0]], 1.02);
        assert_eq!(table.select(&[], &[]).unwrap().columns(), table.columns());
        assert!(table.select(&[], &["nope"]).is_err());
        assert!(table.select(&[9], &[]).is_err());
    }

    #[test]
    fn test_missing_data_marker() {
        assert!(matches!(
            parse_ill_str("INSTR: IN12\n"),
            Err(ReductionError::TableParseError(_))
        ));
    }
}
