// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use log::debug;
use time::OffsetDateTime;

use crate::{
    CacheEpoch, ColumnSet, FetchedWindow, Generation, JsonRow, Notice, TableBackend,
    WindowRequest, fetch_window, load_column_set,
};

#[derive(Debug, Clone, PartialEq)]
pub enum LoadRequest {
    Tables,
    Count { table: String },
    Columns { table: String },
    Rows { table: String, epoch: CacheEpoch },
    Window { table: String, window: WindowRequest },
}

/// A load tagged with the generation of the table selection that issued it.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadJob {
    pub generation: Generation,
    pub request: LoadRequest,
}

#[derive(Debug)]
pub enum Loaded {
    Tables(Result<Vec<String>>),
    Count {
        table: String,
        result: Result<usize>,
    },
    Columns {
        table: String,
        columns: ColumnSet,
        notices: Vec<Notice>,
    },
    Rows {
        table: String,
        epoch: CacheEpoch,
        result: Result<Vec<JsonRow>>,
    },
    Window {
        table: String,
        epoch: CacheEpoch,
        start: usize,
        result: Result<FetchedWindow>,
    },
}

#[derive(Debug)]
pub struct LoadOutcome {
    pub generation: Generation,
    pub finished_at: OffsetDateTime,
    pub loaded: Loaded,
}

/// Runs one load to completion. Blocking; callers put it on a worker thread.
pub fn run_load(backend: &dyn TableBackend, job: LoadJob) -> LoadOutcome {
    debug!("load {:?} (generation {})", job.request, job.generation.get());
    let loaded = match job.request {
        LoadRequest::Tables => Loaded::Tables(backend.list_tables().context("list tables")),
        LoadRequest::Count { table } => {
            let result = backend
                .row_count(&table)
                .with_context(|| format!("count rows of {table}"));
            Loaded::Count { table, result }
        }
        LoadRequest::Columns { table } => {
            let (columns, notices) = load_column_set(backend, &table);
            Loaded::Columns {
                table,
                columns,
                notices,
            }
        }
        LoadRequest::Rows { table, epoch } => {
            let result = backend
                .fetch_rows(&table, None)
                .with_context(|| format!("load rows of {table}"));
            Loaded::Rows {
                table,
                epoch,
                result,
            }
        }
        LoadRequest::Window { table, window } => {
            let result = fetch_window(
                backend,
                &table,
                &window.filters,
                window.start,
                window.count,
            );
            Loaded::Window {
                table,
                epoch: window.epoch,
                start: window.start,
                result,
            }
        }
    };
    LoadOutcome {
        generation: job.generation,
        finished_at: OffsetDateTime::now_utc(),
        loaded,
    }
}
