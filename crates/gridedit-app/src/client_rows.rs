// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use log::debug;
use time::OffsetDateTime;

use crate::{
    CacheEpoch, CellValue, ColumnFilter, ColumnSet, DraftId, JsonRow, Row, TableSchema,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub column: usize,
    pub direction: SortDirection,
}

/// Holds every row of a table in memory. Filtering and sorting happen locally.
#[derive(Debug, Clone, Default)]
pub struct ClientRowSource {
    rows: Vec<Row>,
    loaded_at: Option<OffsetDateTime>,
    filters: Vec<ColumnFilter>,
    sort: Option<SortSpec>,
    epoch: CacheEpoch,
}

impl ClientRowSource {
    pub fn epoch(&self) -> CacheEpoch {
        self.epoch
    }

    /// Starts a full reload. Answers to earlier reloads are dropped from now on.
    pub fn begin_reload(&mut self) -> CacheEpoch {
        self.epoch = self.epoch.next();
        self.epoch
    }

    /// Replaces the row set with a fresh load. Unsaved new rows are dropped.
    pub fn replace(&mut self, epoch: CacheEpoch, rows: Vec<Row>, loaded_at: OffsetDateTime) -> bool {
        if epoch != self.epoch {
            debug!(
                "dropping row load for epoch {} (current {})",
                epoch.get(),
                self.epoch.get()
            );
            return false;
        }
        self.rows = rows;
        self.loaded_at = Some(loaded_at);
        true
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    pub fn loaded_at(&self) -> Option<OffsetDateTime> {
        self.loaded_at
    }

    pub fn filters(&self) -> &[ColumnFilter] {
        &self.filters
    }

    pub fn sort(&self) -> Option<SortSpec> {
        self.sort
    }

    pub fn new_row_count(&self) -> usize {
        self.rows.iter().filter(|row| row.is_new()).count()
    }

    /// Storage indices in display order: new rows first, then committed rows
    /// that pass every filter, sorted when a sort is active.
    pub fn visible(&self, schema: &TableSchema) -> Vec<usize> {
        let mut fresh = Vec::new();
        let mut committed = Vec::new();
        for (index, row) in self.rows.iter().enumerate() {
            if row.is_new() {
                fresh.push(index);
            } else if self.passes_filters(schema, row) {
                committed.push(index);
            }
        }

        if let Some(spec) = self.sort {
            committed.sort_by(|left, right| {
                let left = self.rows[*left].get(spec.column).unwrap_or(&CellValue::Null);
                let right = self.rows[*right].get(spec.column).unwrap_or(&CellValue::Null);
                match spec.direction {
                    SortDirection::Asc => left.sort_cmp(right),
                    SortDirection::Desc => right.sort_cmp(left),
                }
            });
        }

        fresh.extend(committed);
        fresh
    }

    fn passes_filters(&self, schema: &TableSchema, row: &Row) -> bool {
        self.filters.iter().all(|filter| {
            schema
                .column_index(&filter.field)
                .and_then(|index| row.get(index))
                .is_some_and(|cell| filter.matches(cell))
        })
    }

    /// Replaces any filter on the same column.
    pub fn set_filter(&mut self, filter: ColumnFilter) {
        self.filters.retain(|existing| existing.field != filter.field);
        self.filters.push(filter);
    }

    pub fn clear_filters(&mut self) {
        self.filters.clear();
    }

    /// Cycles ascending, descending, unsorted on `column`.
    pub fn cycle_sort(&mut self, column: usize) -> Option<SortSpec> {
        self.sort = match self.sort {
            Some(SortSpec {
                column: current,
                direction: SortDirection::Asc,
            }) if current == column => Some(SortSpec {
                column,
                direction: SortDirection::Desc,
            }),
            Some(SortSpec {
                column: current,
                direction: SortDirection::Desc,
            }) if current == column => None,
            _ => Some(SortSpec {
                column,
                direction: SortDirection::Asc,
            }),
        };
        self.sort
    }

    /// Prepends a blank unsaved row and returns its index.
    pub fn add_new(&mut self, schema: &TableSchema, draft: DraftId) -> usize {
        self.rows.insert(0, Row::blank(schema, draft));
        0
    }

    pub fn clear_new_rows(&mut self) -> usize {
        let before = self.rows.len();
        self.rows.retain(|row| !row.is_new());
        before - self.rows.len()
    }

    /// Commits the draft the server just accepted, in place. Other drafts with
    /// the same key values stay unsaved.
    pub fn mark_saved(&mut self, draft: DraftId) -> bool {
        match self.rows.iter_mut().find(|row| row.draft == Some(draft)) {
            Some(row) => {
                row.draft = None;
                true
            }
            None => false,
        }
    }

    /// Sets the cell locally. Returns the wire form to PUT for committed rows;
    /// a new row's edits stay local.
    pub fn update_cell(
        &mut self,
        columns: &ColumnSet,
        index: usize,
        column: usize,
        value: CellValue,
    ) -> Result<Option<JsonRow>> {
        let Some(row) = self.rows.get_mut(index) else {
            bail!("row {index} does not exist");
        };
        columns.validate_edit(column, row.is_new(), &value)?;
        row.set(column, value)?;
        Ok((!row.is_new()).then(|| row.to_json(&columns.schema)))
    }

    /// Drops every committed row with the deleted row's key values.
    pub fn remove_deleted(&mut self, schema: &TableSchema, target: &Row) -> usize {
        let keys = schema.key_indices();
        let before = self.rows.len();
        self.rows
            .retain(|row| row.is_new() || !row.same_identity(target, &keys));
        before - self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::{ClientRowSource, SortDirection, SortSpec};
    use crate::{
        CacheEpoch, CellValue, ColumnDescriptor, ColumnFilter, ColumnSet, ColumnType, DraftId, Row,
        TableSchema,
    };
    use anyhow::Result;
    use time::OffsetDateTime;

    fn schema() -> TableSchema {
        TableSchema::new(
            "users",
            vec![
                ColumnDescriptor::new("id", ColumnType::Number).key(),
                ColumnDescriptor::new("name", ColumnType::Text),
            ],
        )
    }

    fn committed(id: i64, name: &str) -> Row {
        Row {
            cells: vec![CellValue::Integer(id), CellValue::Text(name.to_owned())],
            draft: None,
        }
    }

    fn source() -> ClientRowSource {
        let mut source = ClientRowSource::default();
        let epoch = source.epoch();
        source.replace(
            epoch,
            vec![committed(2, "grace"), committed(1, "ada"), committed(3, "barbara")],
            OffsetDateTime::UNIX_EPOCH,
        );
        source
    }

    #[test]
    fn new_rows_lead_and_survive_filters() -> Result<()> {
        let schema = schema();
        let mut source = source();
        source.add_new(&schema, DraftId::new(1));
        source.set_filter(ColumnFilter::parse(&schema.columns[1], "^a")?);

        assert_eq!(source.visible(&schema), vec![0, 2]);
        assert_eq!(source.new_row_count(), 1);
        Ok(())
    }

    #[test]
    fn filter_on_same_column_replaces_previous() -> Result<()> {
        let schema = schema();
        let mut source = source();
        source.set_filter(ColumnFilter::parse(&schema.columns[1], "ada")?);
        source.set_filter(ColumnFilter::parse(&schema.columns[1], "grace")?);
        assert_eq!(source.filters().len(), 1);
        assert_eq!(source.visible(&schema), vec![0]);
        source.clear_filters();
        assert_eq!(source.visible(&schema).len(), 3);
        Ok(())
    }

    #[test]
    fn sort_cycles_through_asc_desc_none() {
        let schema = schema();
        let mut source = source();

        assert_eq!(
            source.cycle_sort(0),
            Some(SortSpec {
                column: 0,
                direction: SortDirection::Asc
            })
        );
        assert_eq!(source.visible(&schema), vec![1, 0, 2]);
        source.cycle_sort(0);
        assert_eq!(source.visible(&schema), vec![2, 0, 1]);
        assert_eq!(source.cycle_sort(0), None);
        assert_eq!(source.visible(&schema), vec![0, 1, 2]);
    }

    #[test]
    fn replace_discards_unsaved_rows() {
        let schema = schema();
        let mut source = source();
        source.add_new(&schema, DraftId::new(1));
        let epoch = source.begin_reload();
        source.replace(epoch, vec![committed(1, "ada")], OffsetDateTime::UNIX_EPOCH);
        assert_eq!(source.new_row_count(), 0);
        assert_eq!(source.rows().len(), 1);
    }

    #[test]
    fn clear_new_rows_keeps_committed() {
        let schema = schema();
        let mut source = source();
        source.add_new(&schema, DraftId::new(1));
        source.add_new(&schema, DraftId::new(2));
        assert_eq!(source.clear_new_rows(), 2);
        assert_eq!(source.rows().len(), 3);
    }

    #[test]
    fn older_reload_cannot_overwrite_newer_rows() {
        let mut source = source();
        let older = source.begin_reload();
        let newer = source.begin_reload();

        assert!(source.replace(newer, vec![committed(7, "newer")], OffsetDateTime::UNIX_EPOCH));
        assert!(!source.replace(older, vec![committed(1, "older")], OffsetDateTime::UNIX_EPOCH));
        assert_eq!(source.rows(), &[committed(7, "newer")]);
        assert_eq!(source.epoch(), CacheEpoch::new(2));
    }

    #[test]
    fn mark_saved_commits_only_the_saved_draft() -> Result<()> {
        let schema = schema();
        let columns = ColumnSet {
            schema: schema.clone(),
            catalog: Default::default(),
        };
        let mut source = source();
        source.add_new(&schema, DraftId::new(1));
        source.update_cell(&columns, 0, 1, CellValue::Text("saved-b".to_owned()))?;
        source.add_new(&schema, DraftId::new(2));
        source.update_cell(&columns, 0, 1, CellValue::Text("unsaved-a".to_owned()))?;

        assert!(source.mark_saved(DraftId::new(1)));
        let drafts = source
            .rows()
            .iter()
            .map(|row| (row.cells[1].clone(), row.is_new()))
            .collect::<Vec<_>>();
        assert_eq!(
            drafts[..2],
            [
                (CellValue::Text("unsaved-a".to_owned()), true),
                (CellValue::Text("saved-b".to_owned()), false),
            ]
        );
        assert!(!source.mark_saved(DraftId::new(1)));
        Ok(())
    }

    #[test]
    fn update_cell_returns_wire_row_only_for_committed_rows() -> Result<()> {
        let schema = schema();
        let columns = ColumnSet {
            schema: schema.clone(),
            catalog: Default::default(),
        };
        let mut source = source();
        let wire = source.update_cell(&columns, 0, 1, CellValue::Text("hopper".to_owned()))?;
        assert_eq!(
            wire.map(serde_json::Value::Object),
            Some(serde_json::json!({"id": 2, "name": "hopper"}))
        );

        source.add_new(&schema, DraftId::new(1));
        assert_eq!(source.update_cell(&columns, 0, 0, CellValue::Integer(5))?, None);
        assert!(source.update_cell(&columns, 1, 0, CellValue::Integer(5)).is_err());
        Ok(())
    }
}
