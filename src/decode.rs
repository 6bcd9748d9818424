//! Result decoding.
//!
//! A fetched page arrives as a [`Batch`]: either typed column arrays each carrying a null
//! bitmap, or one tab-delimited text line per row from the legacy text protocol. This
//! module is the only place that dispatches on column types; everything above it deals
//! in rows of [`Value`]s.
//!
//! # Null bitmaps
//!
//! Bit `row % 8` of byte `row / 8` is set when the cell is null. Bitmaps that are too
//! short for the requested row are reported as [`DecodeError::NullBitmapTooShort`] rather
//! than read out of range.
//!
//! # Example
//! ```rust
//! use hiveline::decode::{Batch, Column, ColumnarBatch, decode_row};
//! use hiveline::schema::{ColumnDesc, ColumnType, Schema};
//! use hiveline::Value;
//!
//! let schema = Schema::new(vec![
//!     ColumnDesc::new("id", ColumnType::BigInt),
//!     ColumnDesc::new("name", ColumnType::String),
//! ]);
//! let batch = Batch::Columnar(ColumnarBatch::new(vec![
//!     Column::I64 { values: vec![1, 2], nulls: vec![0b00] },
//!     Column::String { values: vec!["a".into(), String::new()], nulls: vec![0b10] },
//! ]));
//!
//! assert_eq!(decode_row(&batch, &schema, 1).unwrap(), vec![Value::BigInt(2), Value::Null]);
//! ```
use bincode::{Decode, Encode};
use chrono::NaiveDateTime;
use thiserror::Error;

use crate::{
    schema::{ColumnDesc, ColumnType, Schema},
    value::{TIMESTAMP_FORMAT, Value},
};

/// Timestamp layout of the text protocol, without fractional seconds.
pub const TEXT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Null marker used by the text protocol.
const TEXT_NULL: &str = "NULL";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    #[error("column '{column}': malformed timestamp '{value}'")]
    MalformedTimestamp { column: String, value: String },

    #[error("expected {expected} fields, got {found}")]
    ScanArity { expected: usize, found: usize },

    #[error("column '{column}': type {type_name} cannot be read from a {tag} column")]
    UnsupportedColumnType {
        column: String,
        type_name: String,
        tag: &'static str,
    },

    #[error("column '{column}': declared {type_name} but received a {tag} column")]
    TypeMismatch {
        column: String,
        type_name: String,
        tag: &'static str,
    },

    #[error("column {column} has {found} rows, expected {expected}")]
    ColumnLengthMismatch {
        column: usize,
        expected: usize,
        found: usize,
    },

    #[error("column '{column}': null bitmap of {len} bytes does not cover row {row}")]
    NullBitmapTooShort {
        column: String,
        row: usize,
        len: usize,
    },

    #[error("row {row} is outside a batch of {len} rows")]
    RowOutOfRange { row: usize, len: usize },

    #[error("column '{column}': cannot parse '{value}' as {type_name}")]
    InvalidText {
        column: String,
        type_name: String,
        value: String,
    },
}

/// One column of a columnar batch. Exactly one value array per column.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub enum Column {
    Bool { values: Vec<bool>, nulls: Vec<u8> },
    Byte { values: Vec<i8>, nulls: Vec<u8> },
    I16 { values: Vec<i16>, nulls: Vec<u8> },
    I32 { values: Vec<i32>, nulls: Vec<u8> },
    I64 { values: Vec<i64>, nulls: Vec<u8> },
    Double { values: Vec<f64>, nulls: Vec<u8> },
    String { values: Vec<String>, nulls: Vec<u8> },
    Binary { values: Vec<Vec<u8>>, nulls: Vec<u8> },
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Bool { values, .. } => values.len(),
            Column::Byte { values, .. } => values.len(),
            Column::I16 { values, .. } => values.len(),
            Column::I32 { values, .. } => values.len(),
            Column::I64 { values, .. } => values.len(),
            Column::Double { values, .. } => values.len(),
            Column::String { values, .. } => values.len(),
            Column::Binary { values, .. } => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn nulls(&self) -> &[u8] {
        match self {
            Column::Bool { nulls, .. }
            | Column::Byte { nulls, .. }
            | Column::I16 { nulls, .. }
            | Column::I32 { nulls, .. }
            | Column::I64 { nulls, .. }
            | Column::Double { nulls, .. }
            | Column::String { nulls, .. }
            | Column::Binary { nulls, .. } => nulls,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Column::Bool { .. } => "bool",
            Column::Byte { .. } => "byte",
            Column::I16 { .. } => "i16",
            Column::I32 { .. } => "i32",
            Column::I64 { .. } => "i64",
            Column::Double { .. } => "double",
            Column::String { .. } => "string",
            Column::Binary { .. } => "binary",
        }
    }

    /// `None` when the bitmap does not reach `row`.
    pub fn is_null(&self, row: usize) -> Option<bool> {
        self.nulls()
            .get(row / 8)
            .map(|byte| byte & (1 << (row % 8)) != 0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Encode, Decode)]
pub struct ColumnarBatch {
    pub columns: Vec<Column>,
}

impl ColumnarBatch {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    /// Number of rows; every column must agree.
    pub fn row_count(&self) -> Result<usize, DecodeError> {
        let mut columns = self.columns.iter().enumerate();
        let Some((_, first)) = columns.next() else {
            return Ok(0);
        };
        let expected = first.len();
        for (column, c) in columns {
            if c.len() != expected {
                return Err(DecodeError::ColumnLengthMismatch {
                    column,
                    expected,
                    found: c.len(),
                });
            }
        }
        Ok(expected)
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub enum Batch {
    Columnar(ColumnarBatch),
    /// Legacy text protocol: one tab-delimited line per row.
    Text(Vec<String>),
}

impl Default for Batch {
    fn default() -> Self {
        Batch::Columnar(ColumnarBatch::default())
    }
}

impl Batch {
    pub fn row_count(&self) -> Result<usize, DecodeError> {
        match self {
            Batch::Columnar(batch) => batch.row_count(),
            Batch::Text(lines) => Ok(lines.len()),
        }
    }
}

/// Decodes the cell at `row` of `column` according to `desc`.
pub fn decode(column: &Column, desc: &ColumnDesc, row: usize) -> Result<Value, DecodeError> {
    let len = column.len();
    if row >= len {
        return Err(DecodeError::RowOutOfRange { row, len });
    }
    match column.is_null(row) {
        Some(true) => return Ok(Value::Null),
        Some(false) => {}
        None => {
            return Err(DecodeError::NullBitmapTooShort {
                column: desc.name.clone(),
                row,
                len: column.nulls().len(),
            });
        }
    }

    match (desc.column_type, column) {
        (
            ColumnType::String | ColumnType::Char | ColumnType::Varchar,
            Column::String { values, .. },
        ) => Ok(Value::String(values[row].clone())),
        (ColumnType::Timestamp, Column::String { values, .. }) => {
            parse_timestamp(&values[row], TIMESTAMP_FORMAT, desc).map(Value::Timestamp)
        }
        (ColumnType::Boolean, Column::Bool { values, .. }) => Ok(Value::Boolean(values[row])),
        (ColumnType::TinyInt, Column::Byte { values, .. }) => Ok(Value::TinyInt(values[row])),
        (ColumnType::SmallInt, Column::I16 { values, .. }) => Ok(Value::SmallInt(values[row])),
        (ColumnType::Int, Column::I32 { values, .. }) => Ok(Value::Int(values[row])),
        (ColumnType::BigInt, Column::I64 { values, .. }) => Ok(Value::BigInt(values[row])),
        (ColumnType::Float | ColumnType::Double, Column::Double { values, .. }) => {
            Ok(Value::Double(values[row]))
        }
        (ColumnType::Binary, Column::Binary { values, .. }) => Ok(Value::Bytes(values[row].clone())),
        (
            ColumnType::String
            | ColumnType::Char
            | ColumnType::Varchar
            | ColumnType::Timestamp
            | ColumnType::Boolean
            | ColumnType::TinyInt
            | ColumnType::SmallInt
            | ColumnType::Int
            | ColumnType::BigInt
            | ColumnType::Float
            | ColumnType::Double
            | ColumnType::Binary,
            other,
        ) => Err(DecodeError::TypeMismatch {
            column: desc.name.clone(),
            type_name: desc.database_type_name.clone(),
            tag: other.tag(),
        }),
        // Everything else travels as text.
        (_, Column::String { values, .. }) => Ok(Value::String(values[row].clone())),
        (_, other) => Err(DecodeError::UnsupportedColumnType {
            column: desc.name.clone(),
            type_name: desc.database_type_name.clone(),
            tag: other.tag(),
        }),
    }
}

/// Decodes one tab-delimited line of the text protocol.
pub fn decode_text_row(line: &str, schema: &Schema) -> Result<Vec<Value>, DecodeError> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != schema.len() {
        return Err(DecodeError::ScanArity {
            expected: schema.len(),
            found: fields.len(),
        });
    }

    fields
        .into_iter()
        .zip(&schema.columns)
        .map(|(raw, desc)| decode_text(raw, desc))
        .collect()
}

/// Decodes row `row` of `batch`, whichever encoding it uses.
pub fn decode_row(batch: &Batch, schema: &Schema, row: usize) -> Result<Vec<Value>, DecodeError> {
    match batch {
        Batch::Columnar(batch) => {
            if batch.columns.len() != schema.len() {
                return Err(DecodeError::ScanArity {
                    expected: schema.len(),
                    found: batch.columns.len(),
                });
            }
            batch
                .columns
                .iter()
                .zip(&schema.columns)
                .map(|(column, desc)| decode(column, desc, row))
                .collect()
        }
        Batch::Text(lines) => {
            let line = lines.get(row).ok_or(DecodeError::RowOutOfRange {
                row,
                len: lines.len(),
            })?;
            decode_text_row(line, schema)
        }
    }
}

fn decode_text(raw: &str, desc: &ColumnDesc) -> Result<Value, DecodeError> {
    if raw == TEXT_NULL {
        return Ok(Value::Null);
    }

    let invalid = || DecodeError::InvalidText {
        column: desc.name.clone(),
        type_name: desc.database_type_name.clone(),
        value: raw.to_string(),
    };

    match desc.column_type {
        ColumnType::TinyInt => raw.parse().map(Value::TinyInt).map_err(|_| invalid()),
        ColumnType::SmallInt => raw.parse().map(Value::SmallInt).map_err(|_| invalid()),
        ColumnType::Int => raw.parse().map(Value::Int).map_err(|_| invalid()),
        ColumnType::BigInt => raw.parse().map(Value::BigInt).map_err(|_| invalid()),
        ColumnType::Float | ColumnType::Double | ColumnType::Decimal => {
            raw.parse().map(Value::Double).map_err(|_| invalid())
        }
        ColumnType::Boolean => match raw {
            "true" => Ok(Value::Boolean(true)),
            "false" => Ok(Value::Boolean(false)),
            _ => Err(invalid()),
        },
        ColumnType::Timestamp => {
            parse_timestamp(raw, TEXT_TIMESTAMP_FORMAT, desc).map(Value::Timestamp)
        }
        _ => Ok(Value::String(raw.to_string())),
    }
}

fn parse_timestamp(raw: &str, format: &str, desc: &ColumnDesc) -> Result<NaiveDateTime, DecodeError> {
    NaiveDateTime::parse_from_str(raw, format).map_err(|_| DecodeError::MalformedTimestamp {
        column: desc.name.clone(),
        value: raw.to_string(),
    })
}
