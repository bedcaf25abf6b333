// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use log::debug;

use crate::{DraftId, Generation, JsonRow, Notice, Row, TableBackend};

/// A write the session has already applied locally and now needs the server for.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationRequest {
    Create {
        table: String,
        draft: DraftId,
        row: JsonRow,
    },
    Update {
        table: String,
        row: JsonRow,
    },
    Delete {
        table: String,
        target: Row,
        row: JsonRow,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MutationJob {
    pub generation: Generation,
    pub request: MutationRequest,
}

#[derive(Debug)]
pub enum Mutated {
    Created {
        table: String,
        draft: DraftId,
        result: Result<()>,
    },
    Updated {
        table: String,
        result: Result<()>,
    },
    Deleted {
        table: String,
        target: Row,
        result: Result<()>,
    },
}

impl Mutated {
    pub fn table(&self) -> &str {
        match self {
            Self::Created { table, .. } | Self::Updated { table, .. } | Self::Deleted { table, .. } => {
                table
            }
        }
    }

    fn result(&self) -> &Result<()> {
        match self {
            Self::Created { result, .. }
            | Self::Updated { result, .. }
            | Self::Deleted { result, .. } => result,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.result().is_ok()
    }

    pub fn error(&self) -> Option<&anyhow::Error> {
        self.result().as_ref().err()
    }

    /// What the user is told about this write, whether or not its table is still open.
    pub fn notice(&self) -> Notice {
        match (self, self.result()) {
            (Self::Created { .. }, Ok(())) => Notice::success("New row saved successfully"),
            (Self::Created { .. }, Err(error)) => {
                Notice::error(format!("Error saving new row: {error:#}"))
            }
            (Self::Updated { .. }, Ok(())) => Notice::success("Data updated successfully"),
            (Self::Updated { .. }, Err(error)) => {
                Notice::error(format!("Error updating data: {error:#}"))
            }
            (Self::Deleted { .. }, Ok(())) => Notice::success("Row deleted successfully"),
            (Self::Deleted { .. }, Err(error)) => {
                Notice::error(format!("Error deleting row: {error:#}"))
            }
        }
    }
}

#[derive(Debug)]
pub struct MutationOutcome {
    pub generation: Generation,
    pub mutated: Mutated,
}

/// Sends one write. Blocking; callers put it on a worker thread.
pub fn run_mutation(backend: &dyn TableBackend, job: MutationJob) -> MutationOutcome {
    debug!("mutation {:?} (generation {})", job.request, job.generation.get());
    let mutated = match job.request {
        MutationRequest::Create { table, draft, row } => {
            let result = backend
                .create_row(&table, &row)
                .with_context(|| format!("save row in {table}"));
            Mutated::Created {
                table,
                draft,
                result,
            }
        }
        MutationRequest::Update { table, row } => {
            let result = backend
                .update_row(&table, &row)
                .with_context(|| format!("update row in {table}"));
            Mutated::Updated { table, result }
        }
        MutationRequest::Delete { table, target, row } => {
            let result = backend
                .delete_row(&table, &row)
                .with_context(|| format!("delete row from {table}"));
            Mutated::Deleted {
                table,
                target,
                result,
            }
        }
    };
    MutationOutcome {
        generation: job.generation,
        mutated,
    }
}
