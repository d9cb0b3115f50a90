//! Streaming submission reader.
//!
//! Reads the header line eagerly, then yields rows lazily in file order with
//! a stable 1-based index. Row-level faults (ragged rows, bad encoding) are
//! yielded as non-fatal `ParseError`s so one bad line does not hide the rest
//! of the file. An I/O failure is yielded once as a fatal error and ends the
//! stream.

use std::io::Read;
use std::sync::Arc;

use crate::model::{Columns, Row, SubmissionType, ValidationError, RULE_PARSE};

const UTF8_BOM: &str = "\u{feff}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Field count differs from the header.
    Ragged { expected: usize, found: usize },
    /// Record is not valid UTF-8.
    Encoding(String),
    /// Any other record-level CSV fault.
    Malformed(String),
    /// Underlying stream failed; nothing after this point can be read.
    Io(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub submission: SubmissionType,
    /// Row index the fault belongs to; `None` for the header line.
    pub row: Option<u64>,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, ParseErrorKind::Io(_))
    }

    pub fn message(&self) -> String {
        match &self.kind {
            ParseErrorKind::Ragged { expected, found } => {
                format!("row has {found} field(s), header has {expected}")
            }
            ParseErrorKind::Encoding(msg) => format!("row is not valid UTF-8: {msg}"),
            ParseErrorKind::Malformed(msg) => format!("malformed row: {msg}"),
            ParseErrorKind::Io(msg) => format!("stream could not be read: {msg}"),
        }
    }

    /// Report entry for this fault: row-scoped when it has a row, file-scoped otherwise.
    pub fn to_validation_error(&self) -> ValidationError {
        match self.row {
            Some(row) if !self.is_fatal() => ValidationError::row(
                self.submission,
                row,
                "row",
                RULE_PARSE,
                crate::model::Severity::Error,
                self.message(),
            ),
            _ => {
                let mut err = ValidationError::file(self.submission, self.message());
                err.rule_id = RULE_PARSE.into();
                err
            }
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.row {
            Some(row) => write!(f, "{} row {row}: {}", self.submission, self.message()),
            None => write!(f, "{}: {}", self.submission, self.message()),
        }
    }
}

impl std::error::Error for ParseError {}

/// Lazy, finite, non-restartable row sequence over one submission stream.
pub struct SubmissionReader<R: Read> {
    submission: SubmissionType,
    reader: csv::Reader<R>,
    columns: Arc<Columns>,
    record: csv::ByteRecord,
    next_index: u64,
    done: bool,
}

impl<R: Read> SubmissionReader<R> {
    /// Open a stream and read its header line. An empty stream yields an
    /// empty header (which then fails header validation).
    pub fn open(submission: SubmissionType, input: R) -> Result<Self, ParseError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(input);

        let header_err = |kind| ParseError {
            submission,
            row: None,
            kind,
        };

        let raw = reader.byte_headers().map_err(|e| header_err(classify(e)))?.clone();
        let mut names = Vec::with_capacity(raw.len());
        for (i, field) in raw.iter().enumerate() {
            let name = std::str::from_utf8(field)
                .map_err(|e| header_err(ParseErrorKind::Encoding(e.to_string())))?;
            let name = if i == 0 { name.trim_start_matches(UTF8_BOM) } else { name };
            names.push(name.to_string());
        }

        // csv reports a single empty field for a blank first line
        if names.len() == 1 && names[0].trim().is_empty() {
            names.clear();
        }

        Ok(Self {
            submission,
            reader,
            columns: Arc::new(Columns::new(names)),
            record: csv::ByteRecord::new(),
            next_index: 1,
            done: false,
        })
    }

    pub fn submission(&self) -> SubmissionType {
        self.submission
    }

    /// Header names as they appear in the stream.
    pub fn header(&self) -> &[String] {
        self.columns.names()
    }

    fn fault(&self, row: u64, kind: ParseErrorKind) -> ParseError {
        ParseError {
            submission: self.submission,
            row: Some(row),
            kind,
        }
    }
}

impl<R: Read> Iterator for SubmissionReader<R> {
    type Item = Result<Row, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let index = self.next_index;
        match self.reader.read_byte_record(&mut self.record) {
            Ok(false) => {
                self.done = true;
                None
            }
            Ok(true) => {
                self.next_index += 1;
                if self.record.len() != self.columns.len() {
                    return Some(Err(self.fault(
                        index,
                        ParseErrorKind::Ragged {
                            expected: self.columns.len(),
                            found: self.record.len(),
                        },
                    )));
                }
                let mut values = Vec::with_capacity(self.record.len());
                for field in self.record.iter() {
                    match std::str::from_utf8(field) {
                        Ok(v) => values.push(v.to_string()),
                        Err(e) => {
                            return Some(Err(
                                self.fault(index, ParseErrorKind::Encoding(e.to_string()))
                            ))
                        }
                    }
                }
                Some(Ok(Row::new(
                    self.submission,
                    index,
                    Arc::clone(&self.columns),
                    values,
                )))
            }
            Err(e) => {
                let kind = classify(e);
                if matches!(kind, ParseErrorKind::Io(_)) {
                    self.done = true;
                } else {
                    self.next_index += 1;
                }
                Some(Err(self.fault(index, kind)))
            }
        }
    }
}

fn classify(err: csv::Error) -> ParseErrorKind {
    match err.kind() {
        csv::ErrorKind::Io(e) => ParseErrorKind::Io(e.to_string()),
        csv::ErrorKind::Utf8 { err, .. } => ParseErrorKind::Encoding(err.to_string()),
        _ => ParseErrorKind::Malformed(err.to_string()),
    }
}
