//! Result set schemas.
use std::fmt;

use bincode::{Decode, Encode};

/// Logical type of a column, parsed from the database type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum ColumnType {
    Null,
    Boolean,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Float,
    Double,
    String,
    Char,
    Varchar,
    Timestamp,
    Date,
    Decimal,
    Binary,
    Array,
    Map,
    Struct,
    Union,
    UserDefined,
    Unknown,
}

impl ColumnType {
    /// Database type name as reported to callers, e.g. `BIGINT`.
    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Null => "NULL",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::TinyInt => "TINYINT",
            ColumnType::SmallInt => "SMALLINT",
            ColumnType::Int => "INT",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Float => "FLOAT",
            ColumnType::Double => "DOUBLE",
            ColumnType::String => "STRING",
            ColumnType::Char => "CHAR",
            ColumnType::Varchar => "VARCHAR",
            ColumnType::Timestamp => "TIMESTAMP",
            ColumnType::Date => "DATE",
            ColumnType::Decimal => "DECIMAL",
            ColumnType::Binary => "BINARY",
            ColumnType::Array => "ARRAY",
            ColumnType::Map => "MAP",
            ColumnType::Struct => "STRUCT",
            ColumnType::Union => "UNION",
            ColumnType::UserDefined => "USER_DEFINED",
            ColumnType::Unknown => "UNKNOWN",
        }
    }

    /// Parses a type name case-insensitively, ignoring parameters such as `(10,2)`.
    pub fn from_name(name: &str) -> Self {
        match base_name(name).to_ascii_uppercase().as_str() {
            "NULL" | "VOID" => ColumnType::Null,
            "BOOLEAN" | "BOOL" => ColumnType::Boolean,
            "TINYINT" => ColumnType::TinyInt,
            "SMALLINT" => ColumnType::SmallInt,
            "INT" | "INTEGER" => ColumnType::Int,
            "BIGINT" => ColumnType::BigInt,
            "FLOAT" => ColumnType::Float,
            "DOUBLE" | "REAL" => ColumnType::Double,
            "STRING" => ColumnType::String,
            "CHAR" => ColumnType::Char,
            "VARCHAR" => ColumnType::Varchar,
            "TIMESTAMP" | "DATETIME" => ColumnType::Timestamp,
            "DATE" => ColumnType::Date,
            "DECIMAL" => ColumnType::Decimal,
            "BINARY" => ColumnType::Binary,
            "ARRAY" => ColumnType::Array,
            "MAP" => ColumnType::Map,
            "STRUCT" => ColumnType::Struct,
            "UNIONTYPE" | "UNION" => ColumnType::Union,
            "USER_DEFINED" => ColumnType::UserDefined,
            _ => ColumnType::Unknown,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn base_name(name: &str) -> &str {
    let end = name.find(['(', '<']).unwrap_or(name.len());
    name[..end].trim()
}

/// A single column of a result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDesc {
    pub name: String,
    pub column_type: ColumnType,
    pub database_type_name: String,
}

impl ColumnDesc {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            database_type_name: column_type.name().to_string(),
        }
    }

    /// Builds a descriptor from a textual type such as `decimal(10,2)`.
    pub fn from_type_name(name: impl Into<String>, type_name: &str) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::from_name(type_name),
            database_type_name: base_name(type_name).to_ascii_uppercase(),
        }
    }
}

/// Ordered column descriptors; immutable once fetched and shared between batches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    pub columns: Vec<ColumnDesc>,
}

impl Schema {
    pub fn new(columns: Vec<ColumnDesc>) -> Self {
        Self { columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}
