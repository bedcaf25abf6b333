// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::{ColumnDescriptor, ColumnFilter, ForeignKeyOption, JsonRow};

/// Offset/limit slice of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowWindow {
    pub offset: usize,
    pub limit: usize,
}

/// Body of a filtered window request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowQuery {
    pub limit: usize,
    pub offset: usize,
    pub filters: Vec<ColumnFilter>,
}

/// Response to a filtered window request; `count` is the total number of matches.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QueryPage {
    pub data: Vec<JsonRow>,
    pub count: usize,
}

/// The table REST service. Implementations must be shareable with loader threads.
pub trait TableBackend: Send + Sync {
    fn list_tables(&self) -> Result<Vec<String>>;
    fn row_count(&self, table: &str) -> Result<usize>;
    fn table_schema(&self, table: &str) -> Result<Vec<ColumnDescriptor>>;
    /// All rows when `window` is `None`.
    fn fetch_rows(&self, table: &str, window: Option<RowWindow>) -> Result<Vec<JsonRow>>;
    fn query_rows(&self, table: &str, query: &RowQuery) -> Result<QueryPage>;
    fn create_row(&self, table: &str, row: &JsonRow) -> Result<()>;
    fn update_row(&self, table: &str, row: &JsonRow) -> Result<()>;
    fn delete_row(&self, table: &str, row: &JsonRow) -> Result<()>;
    fn foreign_key_options(&self, relation: &str) -> Result<Vec<ForeignKeyOption>>;
}
