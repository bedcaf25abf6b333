// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, bail};
use log::debug;
use time::OffsetDateTime;

use crate::{
    CacheEpoch, CellValue, ColumnFilter, ColumnSet, DraftId, JsonRow, Row, RowQuery, RowWindow,
    TableBackend, TableSchema,
};

/// Raw rows for one window plus what the server told us about the end of the data.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedWindow {
    pub rows: Vec<JsonRow>,
    /// Total number of matching rows, when known.
    pub last_row: Option<usize>,
}

impl FetchedWindow {
    pub fn has_more(&self, start: usize) -> bool {
        match self.last_row {
            Some(last) => start + self.rows.len() < last,
            None => true,
        }
    }
}

/// Requests rows `[start, start + count)`.
///
/// Without filters this is a plain offset/limit read; a short page marks the end.
/// With filters the query endpoint reports the total match count.
pub fn fetch_window(
    backend: &dyn TableBackend,
    table: &str,
    filters: &[ColumnFilter],
    start: usize,
    count: usize,
) -> Result<FetchedWindow> {
    if filters.is_empty() {
        let rows = backend
            .fetch_rows(
                table,
                Some(RowWindow {
                    offset: start,
                    limit: count,
                }),
            )
            .with_context(|| format!("load rows {start}..{} of {table}", start + count))?;
        let last_row = (rows.len() < count).then(|| start + rows.len());
        return Ok(FetchedWindow { rows, last_row });
    }

    let page = backend
        .query_rows(
            table,
            &RowQuery {
                limit: count,
                offset: start,
                filters: filters.to_vec(),
            },
        )
        .with_context(|| format!("query rows {start}..{} of {table}", start + count))?;
    Ok(FetchedWindow {
        rows: page.data,
        last_row: Some(page.count),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowPage {
    pub start: usize,
    pub rows: Vec<Row>,
    pub last_row: Option<usize>,
}

/// What the caller must fetch next; `epoch` ties the answer to the current cache.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowRequest {
    pub epoch: CacheEpoch,
    pub start: usize,
    pub count: usize,
    pub filters: Vec<ColumnFilter>,
}

/// Serves one window of a large table at a time. Unsaved rows are queued
/// locally and shown ahead of every window.
#[derive(Debug, Clone)]
pub struct PagedRowSource {
    page_size: usize,
    start: usize,
    new_rows: Vec<Row>,
    filters: Vec<ColumnFilter>,
    window: Option<WindowPage>,
    epoch: CacheEpoch,
    loaded_at: Option<OffsetDateTime>,
}

impl PagedRowSource {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            start: 0,
            new_rows: Vec::new(),
            filters: Vec::new(),
            window: None,
            epoch: CacheEpoch::default(),
            loaded_at: None,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn epoch(&self) -> CacheEpoch {
        self.epoch
    }

    pub fn window(&self) -> Option<&WindowPage> {
        self.window.as_ref()
    }

    pub fn new_rows(&self) -> &[Row] {
        &self.new_rows
    }

    pub fn filters(&self) -> &[ColumnFilter] {
        &self.filters
    }

    pub fn loaded_at(&self) -> Option<OffsetDateTime> {
        self.loaded_at
    }

    pub fn window_request(&self) -> WindowRequest {
        WindowRequest {
            epoch: self.epoch,
            start: self.start,
            count: self.page_size,
            filters: self.filters.clone(),
        }
    }

    /// Drops the displayed window so the next request refetches it.
    pub fn invalidate(&mut self) -> WindowRequest {
        self.epoch = self.epoch.next();
        self.window = None;
        self.window_request()
    }

    /// Stores a fetched window. Answers for an older epoch or another offset are dropped.
    pub fn apply_window(
        &mut self,
        schema: &TableSchema,
        epoch: CacheEpoch,
        start: usize,
        fetched: FetchedWindow,
        loaded_at: OffsetDateTime,
    ) -> Result<bool> {
        if epoch != self.epoch || start != self.start {
            debug!(
                "dropping window {start} for epoch {} (current {} at {})",
                epoch.get(),
                self.epoch.get(),
                self.start
            );
            return Ok(false);
        }
        let rows = Row::from_json_rows(schema, &fetched.rows)?;
        self.window = Some(WindowPage {
            start,
            rows,
            last_row: fetched.last_row,
        });
        self.loaded_at = Some(loaded_at);
        Ok(true)
    }

    /// Number of rows on display: queued new rows plus the current window.
    pub fn display_len(&self) -> usize {
        self.new_rows.len() + self.window.as_ref().map_or(0, |window| window.rows.len())
    }

    pub fn display_row(&self, index: usize) -> Option<&Row> {
        match index.checked_sub(self.new_rows.len()) {
            None => self.new_rows.get(index),
            Some(offset) => self.window.as_ref()?.rows.get(offset),
        }
    }

    fn display_row_mut(&mut self, index: usize) -> Option<&mut Row> {
        match index.checked_sub(self.new_rows.len()) {
            None => self.new_rows.get_mut(index),
            Some(offset) => self.window.as_mut()?.rows.get_mut(offset),
        }
    }

    pub fn has_next(&self) -> bool {
        self.window.as_ref().is_some_and(|window| match window.last_row {
            Some(last) => window.start + window.rows.len() < last,
            None => window.rows.len() >= self.page_size,
        })
    }

    pub fn has_previous(&self) -> bool {
        self.start > 0
    }

    pub fn next_window(&mut self) -> Option<WindowRequest> {
        if !self.has_next() {
            return None;
        }
        self.start += self.page_size;
        Some(self.invalidate())
    }

    pub fn previous_window(&mut self) -> Option<WindowRequest> {
        if !self.has_previous() {
            return None;
        }
        self.start = self.start.saturating_sub(self.page_size);
        Some(self.invalidate())
    }

    /// Replaces any filter on the same column and rewinds to the first window.
    pub fn set_filter(&mut self, filter: ColumnFilter) -> WindowRequest {
        self.filters.retain(|existing| existing.field != filter.field);
        self.filters.push(filter);
        self.start = 0;
        self.invalidate()
    }

    pub fn clear_filters(&mut self) -> WindowRequest {
        self.filters.clear();
        self.start = 0;
        self.invalidate()
    }

    pub fn add_new(&mut self, schema: &TableSchema, draft: DraftId) -> usize {
        self.new_rows.insert(0, Row::blank(schema, draft));
        0
    }

    pub fn clear_new_rows(&mut self) -> usize {
        let cleared = self.new_rows.len();
        self.new_rows.clear();
        cleared
    }

    /// Takes the saved draft out of the queue and refetches the window so the
    /// server's copy shows.
    pub fn mark_saved(&mut self, draft: DraftId) -> WindowRequest {
        self.new_rows.retain(|row| row.draft != Some(draft));
        self.invalidate()
    }

    /// Sets the cell locally. Returns the wire form to PUT for committed rows.
    pub fn update_cell(
        &mut self,
        columns: &ColumnSet,
        index: usize,
        column: usize,
        value: CellValue,
    ) -> Result<Option<JsonRow>> {
        let Some(row) = self.display_row_mut(index) else {
            bail!("row {index} is not on display");
        };
        columns.validate_edit(column, row.is_new(), &value)?;
        row.set(column, value)?;
        Ok((!row.is_new()).then(|| row.to_json(&columns.schema)))
    }

    /// Drops the deleted row from the displayed window and asks for a refetch.
    /// The window stays on display until the refetch lands.
    pub fn remove_deleted(&mut self, schema: &TableSchema, target: &Row) -> WindowRequest {
        let keys = schema.key_indices();
        if let Some(window) = self.window.as_mut() {
            window.rows.retain(|row| !row.same_identity(target, &keys));
        }
        self.epoch = self.epoch.next();
        self.window_request()
    }
}
