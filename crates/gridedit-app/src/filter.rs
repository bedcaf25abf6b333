// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use serde::{Serialize, Serializer};

use crate::{CellValue, ColumnDescriptor, ColumnType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    Text,
    Number,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOp {
    Contains,
    NotContains,
    Equals,
    NotEqual,
    StartsWith,
    EndsWith,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Blank,
    NotBlank,
}

impl FilterOp {
    const fn symbol(self) -> &'static str {
        match self {
            Self::Contains => "~",
            Self::NotContains => "!~",
            Self::Equals => "=",
            Self::NotEqual => "!=",
            Self::StartsWith => "^",
            Self::EndsWith => "$",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
            Self::Blank => "empty",
            Self::NotBlank => "!empty",
        }
    }

    const fn takes_value(self) -> bool {
        !matches!(self, Self::Blank | Self::NotBlank)
    }

    const fn valid_for(self, kind: FilterKind) -> bool {
        match self {
            Self::Equals | Self::NotEqual | Self::Blank | Self::NotBlank => true,
            Self::Contains | Self::NotContains | Self::StartsWith | Self::EndsWith => {
                matches!(kind, FilterKind::Text)
            }
            Self::LessThan
            | Self::LessThanOrEqual
            | Self::GreaterThan
            | Self::GreaterThanOrEqual => matches!(kind, FilterKind::Number),
        }
    }
}

// Longest prefixes first so `!=` is not read as `!` + `=`.
const PREFIXES: [(&str, FilterOp); 10] = [
    ("!~", FilterOp::NotContains),
    ("!=", FilterOp::NotEqual),
    ("<=", FilterOp::LessThanOrEqual),
    (">=", FilterOp::GreaterThanOrEqual),
    ("~", FilterOp::Contains),
    ("=", FilterOp::Equals),
    ("^", FilterOp::StartsWith),
    ("$", FilterOp::EndsWith),
    ("<", FilterOp::LessThan),
    (">", FilterOp::GreaterThan),
];

/// A predicate on one column, sent as `{field, filterType, type, filter}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnFilter {
    pub field: String,
    pub kind: FilterKind,
    pub op: FilterOp,
    pub value: Option<CellValue>,
}

impl ColumnFilter {
    /// Parses a filter expression such as `~ada`, `>=10`, `empty` or a bare value.
    pub fn parse(column: &ColumnDescriptor, expression: &str) -> Result<Self> {
        if !column.accepts_filter() {
            bail!("column `{}` is not filterable", column.name);
        }

        let kind = if column.data_type.is_numeric() {
            FilterKind::Number
        } else {
            FilterKind::Text
        };
        let trimmed = expression.trim();
        let (op, raw_value) = match trimmed {
            "empty" => (FilterOp::Blank, ""),
            "!empty" => (FilterOp::NotBlank, ""),
            _ => PREFIXES
                .iter()
                .find_map(|(prefix, op)| trimmed.strip_prefix(prefix).map(|rest| (*op, rest)))
                .unwrap_or(match kind {
                    FilterKind::Number => (FilterOp::Equals, trimmed),
                    FilterKind::Text => (FilterOp::Contains, trimmed),
                }),
        };

        if !op.valid_for(kind) {
            bail!(
                "`{}` does not apply to {} column `{}`",
                op.symbol(),
                column.data_type.as_str(),
                column.name
            );
        }

        let value = if op.takes_value() {
            let raw_value = raw_value.trim();
            if raw_value.is_empty() {
                bail!("filter `{}` needs a value", op.symbol());
            }
            let parsed = match kind {
                FilterKind::Number => CellValue::parse_input(&ColumnType::Number, raw_value)?,
                FilterKind::Text => CellValue::Text(raw_value.to_owned()),
            };
            Some(parsed)
        } else {
            None
        };

        Ok(Self {
            field: column.name.clone(),
            kind,
            op,
            value,
        })
    }

    pub fn describe(&self) -> String {
        match &self.value {
            Some(value) => format!("{} {}{}", self.field, self.op.symbol(), value.display()),
            None => format!("{} {}", self.field, self.op.symbol()),
        }
    }

    /// Evaluates the predicate locally; used by the client-side row source.
    pub fn matches(&self, cell: &CellValue) -> bool {
        let blank = match cell {
            CellValue::Null => true,
            CellValue::Text(text) => text.is_empty(),
            _ => false,
        };
        match self.op {
            FilterOp::Blank => return blank,
            FilterOp::NotBlank => return !blank,
            _ => {}
        }

        match self.kind {
            FilterKind::Text => self.matches_text(cell),
            FilterKind::Number => self.matches_number(cell),
        }
    }

    fn matches_text(&self, cell: &CellValue) -> bool {
        let needle = self
            .value
            .as_ref()
            .map(|value| value.display().to_lowercase())
            .unwrap_or_default();
        if cell.is_null() {
            return matches!(self.op, FilterOp::NotContains | FilterOp::NotEqual);
        }
        let haystack = cell.display().to_lowercase();
        match self.op {
            FilterOp::Contains => haystack.contains(&needle),
            FilterOp::NotContains => !haystack.contains(&needle),
            FilterOp::Equals => haystack == needle,
            FilterOp::NotEqual => haystack != needle,
            FilterOp::StartsWith => haystack.starts_with(&needle),
            FilterOp::EndsWith => haystack.ends_with(&needle),
            _ => false,
        }
    }

    fn matches_number(&self, cell: &CellValue) -> bool {
        let target = self.value.as_ref().and_then(CellValue::as_f64);
        let (Some(actual), Some(target)) = (cell.as_f64(), target) else {
            return matches!(self.op, FilterOp::NotEqual);
        };
        match self.op {
            FilterOp::Equals => actual == target,
            FilterOp::NotEqual => actual != target,
            FilterOp::LessThan => actual < target,
            FilterOp::LessThanOrEqual => actual <= target,
            FilterOp::GreaterThan => actual > target,
            FilterOp::GreaterThanOrEqual => actual >= target,
            _ => false,
        }
    }
}

#[derive(Serialize)]
struct WireFilter<'a> {
    field: &'a str,
    #[serde(rename = "filterType")]
    kind: FilterKind,
    #[serde(rename = "type")]
    op: FilterOp,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<serde_json::Value>,
}

impl Serialize for ColumnFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireFilter {
            field: &self.field,
            kind: self.kind,
            op: self.op,
            filter: self.value.as_ref().map(CellValue::to_json),
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::{ColumnFilter, FilterKind, FilterOp};
    use crate::{CellValue, ColumnDescriptor, ColumnType};
    use anyhow::Result;
    use serde_json::json;

    fn name_column() -> ColumnDescriptor {
        ColumnDescriptor::new("name", ColumnType::Text)
    }

    fn age_column() -> ColumnDescriptor {
        ColumnDescriptor::new("age", ColumnType::Number)
    }

    #[test]
    fn bare_values_default_by_column_type() -> Result<()> {
        let text = ColumnFilter::parse(&name_column(), "ada")?;
        assert_eq!(text.op, FilterOp::Contains);
        assert_eq!(text.kind, FilterKind::Text);

        let number = ColumnFilter::parse(&age_column(), "42")?;
        assert_eq!(number.op, FilterOp::Equals);
        assert_eq!(number.value, Some(CellValue::Integer(42)));
        Ok(())
    }

    #[test]
    fn two_character_prefixes_win_over_single_ones() -> Result<()> {
        assert_eq!(
            ColumnFilter::parse(&name_column(), "!=bob")?.op,
            FilterOp::NotEqual
        );
        assert_eq!(
            ColumnFilter::parse(&age_column(), ">=18")?.op,
            FilterOp::GreaterThanOrEqual
        );
        Ok(())
    }

    #[test]
    fn operators_are_checked_against_column_kind() {
        assert!(ColumnFilter::parse(&age_column(), "~4").is_err());
        assert!(ColumnFilter::parse(&name_column(), ">b").is_err());
        assert!(ColumnFilter::parse(&age_column(), ">").is_err());
        assert!(ColumnFilter::parse(&age_column(), "abc").is_err());
    }

    #[test]
    fn foreign_key_columns_reject_filters() {
        let column = ColumnDescriptor::new("manager_id", ColumnType::Number).foreign_key("fk");
        let error = ColumnFilter::parse(&column, "1").expect_err("fk filter should fail");
        assert!(error.to_string().contains("not filterable"));
    }

    #[test]
    fn text_matching_is_case_insensitive() -> Result<()> {
        let filter = ColumnFilter::parse(&name_column(), "^AD")?;
        assert!(filter.matches(&CellValue::Text("Ada".to_owned())));
        assert!(!filter.matches(&CellValue::Text("Grace".to_owned())));
        assert!(!filter.matches(&CellValue::Null));
        Ok(())
    }

    #[test]
    fn blank_filters_treat_empty_text_as_blank() -> Result<()> {
        let blank = ColumnFilter::parse(&name_column(), "empty")?;
        assert!(blank.matches(&CellValue::Null));
        assert!(blank.matches(&CellValue::Text(String::new())));
        let not_blank = ColumnFilter::parse(&name_column(), "!empty")?;
        assert!(not_blank.matches(&CellValue::Text("x".to_owned())));
        Ok(())
    }

    #[test]
    fn number_comparisons_handle_mixed_representations() -> Result<()> {
        let filter = ColumnFilter::parse(&age_column(), "<2.5")?;
        assert!(filter.matches(&CellValue::Integer(2)));
        assert!(!filter.matches(&CellValue::Float(2.5)));
        assert!(!filter.matches(&CellValue::Null));
        Ok(())
    }

    #[test]
    fn serializes_as_field_plus_predicate() -> Result<()> {
        let filter = ColumnFilter::parse(&name_column(), "~ada")?;
        assert_eq!(
            serde_json::to_value(&filter)?,
            json!({"field": "name", "filterType": "text", "type": "contains", "filter": "ada"})
        );
        let blank = ColumnFilter::parse(&age_column(), "empty")?;
        assert_eq!(
            serde_json::to_value(&blank)?,
            json!({"field": "age", "filterType": "number", "type": "blank"})
        );
        Ok(())
    }
}
