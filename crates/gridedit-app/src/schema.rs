// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use log::{debug, warn};
use std::collections::BTreeMap;
use std::thread;

use crate::{CellValue, ColumnDescriptor, ForeignKeyOption, Notice, TableBackend};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<ColumnDescriptor>,
}

impl TableSchema {
    pub fn new(table: &str, columns: Vec<ColumnDescriptor>) -> Self {
        Self {
            table: table.to_owned(),
            columns,
        }
    }

    pub fn empty(table: &str) -> Self {
        Self::new(table, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column(&self, index: usize) -> Option<&ColumnDescriptor> {
        self.columns.get(index)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    pub fn key_indices(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, column)| column.is_key)
            .map(|(index, _)| index)
            .collect()
    }

    pub fn key_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|column| column.is_key)
            .map(|column| column.name.as_str())
            .collect()
    }

    /// Distinct relation names in column order.
    pub fn foreign_key_relations(&self) -> Vec<String> {
        let mut relations: Vec<String> = Vec::new();
        for relation in self
            .columns
            .iter()
            .filter_map(|column| column.foreign_key_name.as_deref())
        {
            if !relations.iter().any(|seen| seen == relation) {
                relations.push(relation.to_owned());
            }
        }
        relations
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ForeignKeyCatalog {
    relations: BTreeMap<String, Vec<ForeignKeyOption>>,
}

impl ForeignKeyCatalog {
    pub fn insert(&mut self, relation: &str, options: Vec<ForeignKeyOption>) {
        self.relations.insert(relation.to_owned(), options);
    }

    pub fn options(&self, relation: &str) -> &[ForeignKeyOption] {
        self.relations
            .get(relation)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn label_for(&self, relation: &str, id: &CellValue) -> Option<&str> {
        self.options(relation)
            .iter()
            .find(|option| &option.id == id)
            .map(|option| option.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }
}

/// Column descriptors for one table plus the foreign-key options loaded with them.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSet {
    pub schema: TableSchema,
    pub catalog: ForeignKeyCatalog,
}

impl ColumnSet {
    pub fn empty(table: &str) -> Self {
        Self {
            schema: TableSchema::empty(table),
            catalog: ForeignKeyCatalog::default(),
        }
    }

    /// Resolved label for foreign-key cells, raw value otherwise.
    pub fn display_value(&self, column: usize, value: &CellValue) -> String {
        self.schema
            .column(column)
            .and_then(|descriptor| descriptor.foreign_key_name.as_deref())
            .and_then(|relation| self.catalog.label_for(relation, value))
            .map(str::to_owned)
            .unwrap_or_else(|| value.display())
    }

    /// Constrained value list for a foreign-key column.
    pub fn allowed_values(&self, column: usize) -> Option<&[ForeignKeyOption]> {
        let relation = self.schema.column(column)?.foreign_key_name.as_deref()?;
        Some(self.catalog.options(relation))
    }

    pub fn validate_edit(&self, column: usize, row_is_new: bool, value: &CellValue) -> Result<()> {
        let Some(descriptor) = self.schema.column(column) else {
            bail!("column index {column} is out of range");
        };
        if !descriptor.is_editable(row_is_new) {
            bail!("key column `{}` is read-only once saved", descriptor.name);
        }
        if !value.conforms_to(&descriptor.data_type) {
            bail!(
                "column `{}` expects {}, got {}",
                descriptor.name,
                descriptor.data_type.as_str(),
                value.kind_label()
            );
        }
        if let Some(options) = self.allowed_values(column)
            && !value.is_null()
            && !options.iter().any(|option| &option.id == value)
        {
            bail!(
                "{} is not a valid choice for `{}`",
                value.display(),
                descriptor.name
            );
        }
        Ok(())
    }
}

/// Fetches a table's schema and the option list of every foreign-key relation it references.
///
/// Relations are fetched concurrently and deduplicated by name. A schema failure yields an
/// empty column set; a relation failure yields an empty option list for that relation only.
pub fn load_column_set(backend: &dyn TableBackend, table: &str) -> (ColumnSet, Vec<Notice>) {
    let columns = match backend.table_schema(table) {
        Ok(columns) => columns,
        Err(error) => {
            warn!("schema load for {table} failed: {error:#}");
            return (
                ColumnSet::empty(table),
                vec![Notice::error(format!(
                    "Error fetching schema for table {table}"
                ))],
            );
        }
    };

    let schema = TableSchema::new(table, columns);
    let relations = schema.foreign_key_relations();
    debug!(
        "schema for {table}: {} columns, {} foreign-key relations",
        schema.columns.len(),
        relations.len()
    );

    let fetched: Vec<(String, Result<Vec<ForeignKeyOption>>)> = thread::scope(|scope| {
        let handles = relations
            .iter()
            .map(|relation| {
                let handle = scope.spawn(move || backend.foreign_key_options(relation));
                (relation, handle)
            })
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|(relation, handle)| {
                let result = handle
                    .join()
                    .unwrap_or_else(|_| Err(anyhow::anyhow!("option fetch thread panicked")));
                (relation.clone(), result)
            })
            .collect()
    });

    let mut catalog = ForeignKeyCatalog::default();
    let mut notices = Vec::new();
    for (relation, result) in fetched {
        let options = match result {
            Ok(options) => options,
            Err(error) => {
                warn!("foreign-key options for {relation} failed: {error:#}");
                notices.push(Notice::error(format!(
                    "Error fetching foreign key options for {relation}"
                )));
                Vec::new()
            }
        };
        catalog.insert(&relation, options);
    }

    (ColumnSet { schema, catalog }, notices)
}

#[cfg(test)]
mod tests {
    use super::{ColumnSet, ForeignKeyCatalog, TableSchema};
    use crate::{CellValue, ColumnDescriptor, ColumnType, ForeignKeyOption};

    fn users_columns() -> ColumnSet {
        let schema = TableSchema::new(
            "users",
            vec![
                ColumnDescriptor::new("id", ColumnType::Number).key(),
                ColumnDescriptor::new("name", ColumnType::Text),
                ColumnDescriptor::new("manager_id", ColumnType::Number).foreign_key("fk_manager"),
                ColumnDescriptor::new("mentor_id", ColumnType::Number).foreign_key("fk_manager"),
            ],
        );
        let mut catalog = ForeignKeyCatalog::default();
        catalog.insert(
            "fk_manager",
            vec![ForeignKeyOption {
                id: CellValue::Integer(1),
                name: "Ada".to_owned(),
            }],
        );
        ColumnSet { schema, catalog }
    }

    #[test]
    fn relations_are_deduplicated_in_column_order() {
        let columns = users_columns();
        assert_eq!(
            columns.schema.foreign_key_relations(),
            vec!["fk_manager".to_owned()]
        );
        assert_eq!(columns.schema.key_columns(), vec!["id"]);
        assert_eq!(columns.schema.key_indices(), vec![0]);
    }

    #[test]
    fn display_resolves_known_ids_and_falls_back_to_raw() {
        let columns = users_columns();
        assert_eq!(columns.display_value(2, &CellValue::Integer(1)), "Ada");
        assert_eq!(columns.display_value(2, &CellValue::Integer(77)), "77");
        assert_eq!(columns.display_value(0, &CellValue::Integer(1)), "1");
    }

    #[test]
    fn edits_respect_keys_types_and_option_lists() {
        let columns = users_columns();
        assert!(columns.validate_edit(0, false, &CellValue::Integer(5)).is_err());
        assert!(columns.validate_edit(0, true, &CellValue::Integer(5)).is_ok());
        assert!(
            columns
                .validate_edit(1, false, &CellValue::Integer(5))
                .is_err()
        );
        assert!(columns.validate_edit(2, false, &CellValue::Integer(1)).is_ok());
        assert!(columns.validate_edit(2, false, &CellValue::Integer(2)).is_err());
        assert!(columns.validate_edit(2, false, &CellValue::Null).is_ok());
    }

    #[test]
    fn empty_column_set_has_no_columns() {
        let columns = ColumnSet::empty("users");
        assert!(columns.schema.is_empty());
        assert!(columns.catalog.is_empty());
        assert_eq!(columns.allowed_values(0), None);
    }
}
