// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use time::{Date, OffsetDateTime, macros::format_description};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Number,
    Text,
    Boolean,
    Date,
    DateString,
    Other(String),
}

impl ColumnType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Number => "number",
            Self::Text => "text",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::DateString => "dateString",
            Self::Other(tag) => tag,
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "number" => Self::Number,
            "text" => Self::Text,
            "boolean" => Self::Boolean,
            "date" => Self::Date,
            "dateString" => Self::DateString,
            other => Self::Other(other.to_owned()),
        }
    }

    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Number)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl CellValue {
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Null => Ok(Self::Null),
            serde_json::Value::Bool(flag) => Ok(Self::Bool(*flag)),
            serde_json::Value::Number(number) => {
                if let Some(integer) = number.as_i64() {
                    Ok(Self::Integer(integer))
                } else if let Some(float) = number.as_f64() {
                    Ok(Self::Float(float))
                } else {
                    bail!("number {number} is out of range")
                }
            }
            serde_json::Value::String(text) => Ok(Self::Text(text.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
                bail!("expected a scalar value, got {value}")
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(flag) => serde_json::Value::Bool(*flag),
            Self::Integer(integer) => serde_json::Value::from(*integer),
            Self::Float(float) => serde_json::Number::from_f64(*float)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::Text(text) => serde_json::Value::String(text.clone()),
        }
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub const fn kind_label(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Integer(_) | Self::Float(_) => "number",
            Self::Text(_) => "text",
        }
    }

    /// Whether a value of this kind may be stored in a column of `column_type`.
    pub fn conforms_to(&self, column_type: &ColumnType) -> bool {
        match (self, column_type) {
            (Self::Null, _) | (_, ColumnType::Other(_)) => true,
            (Self::Integer(_) | Self::Float(_), ColumnType::Number) => true,
            (Self::Bool(_), ColumnType::Boolean) => true,
            (Self::Text(_), ColumnType::Text | ColumnType::Date | ColumnType::DateString) => true,
            _ => false,
        }
    }

    /// Parses user input for a column. Empty input clears the cell.
    pub fn parse_input(column_type: &ColumnType, raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Self::Null);
        }

        match column_type {
            ColumnType::Number => {
                if let Ok(integer) = trimmed.parse::<i64>() {
                    return Ok(Self::Integer(integer));
                }
                let float: f64 = trimmed
                    .parse()
                    .with_context(|| format!("{trimmed:?} is not a number"))?;
                if !float.is_finite() {
                    bail!("{trimmed:?} is not a finite number");
                }
                Ok(Self::Float(float))
            }
            ColumnType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(Self::Bool(true)),
                "false" | "0" | "no" => Ok(Self::Bool(false)),
                _ => bail!("{trimmed:?} is not a boolean; use true or false"),
            },
            ColumnType::Date | ColumnType::DateString => {
                Date::parse(trimmed, format_description!("[year]-[month]-[day]"))
                    .with_context(|| format!("{trimmed:?} is not a date; use YYYY-MM-DD"))?;
                Ok(Self::Text(trimmed.to_owned()))
            }
            ColumnType::Text | ColumnType::Other(_) => Ok(Self::Text(raw.to_owned())),
        }
    }

    pub fn display(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(flag) => flag.to_string(),
            Self::Integer(integer) => integer.to_string(),
            Self::Float(float) => float.to_string(),
            Self::Text(text) => text.clone(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(integer) => Some(*integer as f64),
            Self::Float(float) => Some(*float),
            _ => None,
        }
    }

    /// Total order used for sorting: nulls first, then booleans, numbers, text.
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        const fn rank(value: &CellValue) -> u8 {
            match value {
                CellValue::Null => 0,
                CellValue::Bool(_) => 1,
                CellValue::Integer(_) | CellValue::Float(_) => 2,
                CellValue::Text(_) => 3,
            }
        }

        match (self, other) {
            (Self::Bool(left), Self::Bool(right)) => left.cmp(right),
            (Self::Integer(left), Self::Integer(right)) => left.cmp(right),
            (Self::Text(left), Self::Text(right)) => left.cmp(right),
            (left, right) if rank(left) == 2 && rank(right) == 2 => {
                match (left.as_f64(), right.as_f64()) {
                    (Some(left), Some(right)) => left.partial_cmp(&right).unwrap_or(Ordering::Equal),
                    _ => Ordering::Equal,
                }
            }
            (left, right) => rank(left).cmp(&rank(right)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: ColumnType,
    pub is_key: bool,
    pub foreign_key_name: Option<String>,
    pub filterable: bool,
}

impl ColumnDescriptor {
    pub fn new(name: &str, data_type: ColumnType) -> Self {
        Self {
            name: name.to_owned(),
            data_type,
            is_key: false,
            foreign_key_name: None,
            filterable: true,
        }
    }

    pub fn key(mut self) -> Self {
        self.is_key = true;
        self
    }

    pub fn foreign_key(mut self, relation: &str) -> Self {
        self.foreign_key_name = Some(relation.to_owned());
        self.filterable = false;
        self
    }

    /// Key columns are editable only while the row has not been saved.
    pub fn is_editable(&self, row_is_new: bool) -> bool {
        row_is_new || !self.is_key
    }

    pub fn accepts_filter(&self) -> bool {
        self.filterable && self.foreign_key_name.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyOption {
    pub id: CellValue,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }

    pub const fn is_error(&self) -> bool {
        matches!(self.level, NoticeLevel::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowVariant {
    ClientSide,
    Paged,
}

impl RowVariant {
    pub const fn label(self) -> &'static str {
        match self {
            Self::ClientSide => "client",
            Self::Paged => "paged",
        }
    }

    pub const fn for_count(count: usize, client_side_row_limit: usize) -> Self {
        if count < client_side_row_limit {
            Self::ClientSide
        } else {
            Self::Paged
        }
    }
}

pub fn format_since(last: OffsetDateTime, now: OffsetDateTime) -> String {
    let seconds = (now - last).whole_seconds().max(0);
    if seconds < 60 {
        "less than 1 minute ago".to_owned()
    } else if seconds < 3600 {
        format!("{} minutes ago", seconds / 60)
    } else {
        format!("{} hours ago", seconds / 3600)
    }
}
