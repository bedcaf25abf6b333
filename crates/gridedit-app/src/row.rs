// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, bail};

use crate::{CellValue, DraftId, TableSchema};

/// Row object as it travels over the wire.
pub type JsonRow = serde_json::Map<String, serde_json::Value>;

/// A row typed against its table schema. `cells` follows the schema's column order.
///
/// `draft` is set while the row exists only locally; it never goes over the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub cells: Vec<CellValue>,
    pub draft: Option<DraftId>,
}

/// Locates a row independently of where it is displayed: unsaved rows by
/// their draft id, stored rows by their identity cells.
#[derive(Debug, Clone, PartialEq)]
pub enum RowRef {
    Draft(DraftId),
    Stored(Vec<CellValue>),
}

impl Row {
    pub fn blank(schema: &TableSchema, draft: DraftId) -> Self {
        Self {
            cells: vec![CellValue::Null; schema.columns.len()],
            draft: Some(draft),
        }
    }

    pub fn is_new(&self) -> bool {
        self.draft.is_some()
    }

    pub fn from_json(schema: &TableSchema, object: &JsonRow) -> Result<Self> {
        let mut cells = Vec::with_capacity(schema.columns.len());
        for column in &schema.columns {
            let value = match object.get(&column.name) {
                Some(raw) => CellValue::from_json(raw)
                    .with_context(|| format!("column `{}`", column.name))?,
                None => CellValue::Null,
            };
            if !value.conforms_to(&column.data_type) {
                bail!(
                    "column `{}` expects {}, got {}",
                    column.name,
                    column.data_type.as_str(),
                    value.kind_label()
                );
            }
            cells.push(value);
        }
        Ok(Self { cells, draft: None })
    }

    /// Types a whole response; the first malformed row fails the batch.
    pub fn from_json_rows(schema: &TableSchema, objects: &[JsonRow]) -> Result<Vec<Self>> {
        objects
            .iter()
            .enumerate()
            .map(|(index, object)| {
                Self::from_json(schema, object).with_context(|| format!("row {index}"))
            })
            .collect()
    }

    /// Wire form of the row: schema columns only, never the transient marker.
    pub fn to_json(&self, schema: &TableSchema) -> JsonRow {
        schema
            .columns
            .iter()
            .zip(&self.cells)
            .map(|(column, value)| (column.name.clone(), value.to_json()))
            .collect()
    }

    pub fn get(&self, column: usize) -> Option<&CellValue> {
        self.cells.get(column)
    }

    pub fn set(&mut self, column: usize, value: CellValue) -> Result<()> {
        let Some(cell) = self.cells.get_mut(column) else {
            bail!("column index {column} is out of range");
        };
        *cell = value;
        Ok(())
    }

    /// Rows match on every key column; a schema without keys matches on every column.
    pub fn same_identity(&self, other: &Self, key_indices: &[usize]) -> bool {
        self.identity(key_indices) == other.identity(key_indices)
    }

    fn identity(&self, key_indices: &[usize]) -> Vec<&CellValue> {
        if key_indices.is_empty() {
            return self.cells.iter().collect();
        }
        key_indices
            .iter()
            .filter_map(|index| self.cells.get(*index))
            .collect()
    }

    pub fn row_ref(&self, key_indices: &[usize]) -> RowRef {
        match self.draft {
            Some(draft) => RowRef::Draft(draft),
            None => RowRef::Stored(self.identity(key_indices).into_iter().cloned().collect()),
        }
    }

    pub fn matches_ref(&self, target: &RowRef, key_indices: &[usize]) -> bool {
        match (target, self.draft) {
            (RowRef::Draft(wanted), Some(draft)) => *wanted == draft,
            (RowRef::Stored(cells), None) => {
                self.identity(key_indices).into_iter().eq(cells.iter())
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{JsonRow, Row, RowRef};
    use crate::{CellValue, ColumnDescriptor, ColumnType, DraftId, TableSchema};
    use anyhow::Result;
    use serde_json::json;

    fn users_schema() -> TableSchema {
        TableSchema::new(
            "users",
            vec![
                ColumnDescriptor::new("id", ColumnType::Number).key(),
                ColumnDescriptor::new("name", ColumnType::Text),
                ColumnDescriptor::new("manager_id", ColumnType::Number).foreign_key("fk_manager"),
            ],
        )
    }

    fn object(value: serde_json::Value) -> JsonRow {
        match value {
            serde_json::Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn from_json_fills_missing_columns_with_null_and_ignores_extras() -> Result<()> {
        let schema = users_schema();
        let row = Row::from_json(&schema, &object(json!({"id": 1, "name": "Ada", "extra": true})))?;
        assert_eq!(
            row.cells,
            vec![
                CellValue::Integer(1),
                CellValue::Text("Ada".to_owned()),
                CellValue::Null
            ]
        );
        assert!(!row.is_new());
        Ok(())
    }

    #[test]
    fn from_json_rejects_values_that_contradict_the_schema() {
        let schema = users_schema();
        let error = Row::from_json(&schema, &object(json!({"id": "one"})))
            .expect_err("text in a number column should fail");
        assert!(error.to_string().contains("column `id` expects number"));
    }

    #[test]
    fn batch_errors_name_the_row() {
        let schema = users_schema();
        let rows = vec![object(json!({"id": 1})), object(json!({"id": [1]}))];
        let error = Row::from_json_rows(&schema, &rows).expect_err("array cell should fail");
        assert!(format!("{error:#}").contains("row 1"));
    }

    #[test]
    fn to_json_emits_schema_columns_only() -> Result<()> {
        let schema = users_schema();
        let mut row = Row::blank(&schema, DraftId::new(1));
        row.set(0, CellValue::Integer(9))?;
        let wire = row.to_json(&schema);
        assert_eq!(
            serde_json::Value::Object(wire),
            json!({"id": 9, "name": null, "manager_id": null})
        );
        Ok(())
    }

    #[test]
    fn identity_uses_key_columns_or_whole_row() {
        let left = Row {
            cells: vec![CellValue::Integer(1), CellValue::Text("a".to_owned())],
            draft: None,
        };
        let right = Row {
            cells: vec![CellValue::Integer(1), CellValue::Text("b".to_owned())],
            draft: Some(DraftId::new(3)),
        };
        assert!(left.same_identity(&right, &[0]));
        assert!(!left.same_identity(&right, &[]));
        assert!(left.same_identity(&left.clone(), &[]));
    }

    #[test]
    fn row_refs_tell_drafts_with_equal_cells_apart() {
        let schema = users_schema();
        let first = Row::blank(&schema, DraftId::new(1));
        let second = Row::blank(&schema, DraftId::new(2));
        let keys = schema.key_indices();

        assert!(first.same_identity(&second, &keys));
        assert!(first.matches_ref(&first.row_ref(&keys), &keys));
        assert!(!second.matches_ref(&first.row_ref(&keys), &keys));
    }

    #[test]
    fn stored_refs_follow_key_cells_only() -> Result<()> {
        let schema = users_schema();
        let keys = schema.key_indices();
        let mut row = Row::from_json(&schema, &object(json!({"id": 4, "name": "Kay"})))?;
        let target = row.row_ref(&keys);
        assert_eq!(target, RowRef::Stored(vec![CellValue::Integer(4)]));

        row.set(1, CellValue::Text("Katherine".to_owned()))?;
        assert!(row.matches_ref(&target, &keys));
        row.draft = Some(DraftId::new(1));
        assert!(!row.matches_ref(&target, &keys));
        Ok(())
    }

    #[test]
    fn set_rejects_out_of_range_column() {
        let mut row = Row::blank(&users_schema(), DraftId::new(1));
        assert!(row.set(5, CellValue::Null).is_err());
    }
}
