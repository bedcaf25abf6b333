// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use log::{debug, info, warn};
use std::time::Instant;
use time::OffsetDateTime;

use crate::{
    CacheEpoch, CellValue, ClientRowSource, ColumnFilter, ColumnSet, DeleteGate, DraftId,
    FetchedWindow, Generation, GenerationCounter, JsonRow, LoadJob, LoadOutcome, LoadRequest,
    Loaded, Mutated, MutationJob, MutationOutcome, MutationRequest, Notice, PagedRowSource, Route,
    Row, RowRef, RowVariant, SortSpec, TimerToken, WindowRequest, format_since,
};

pub const DEFAULT_CLIENT_SIDE_ROW_LIMIT: usize = 1000;
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Notices to show plus the loads and writes to start after a session or page operation.
#[derive(Debug, Default)]
pub struct Effects {
    pub notices: Vec<Notice>,
    pub loads: Vec<LoadJob>,
    pub mutations: Vec<MutationJob>,
}

impl Effects {
    fn notice(notice: Notice) -> Self {
        Self {
            notices: vec![notice],
            ..Self::default()
        }
    }

    fn load(job: LoadJob) -> Self {
        Self {
            loads: vec![job],
            ..Self::default()
        }
    }

    fn mutation(job: MutationJob) -> Self {
        Self {
            mutations: vec![job],
            ..Self::default()
        }
    }

    fn merge(&mut self, other: Self) {
        self.notices.extend(other.notices);
        self.loads.extend(other.loads);
        self.mutations.extend(other.mutations);
    }
}

#[derive(Debug, Clone)]
pub enum RowSource {
    Client(ClientRowSource),
    Paged(PagedRowSource),
}

impl RowSource {
    pub fn variant(&self) -> RowVariant {
        match self {
            Self::Client(_) => RowVariant::ClientSide,
            Self::Paged(_) => RowVariant::Paged,
        }
    }
}

#[derive(Debug, Clone)]
struct ParkedRows {
    epoch: CacheEpoch,
    rows: Vec<JsonRow>,
    loaded_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
struct ParkedWindow {
    epoch: CacheEpoch,
    start: usize,
    fetched: FetchedWindow,
    loaded_at: OffsetDateTime,
}

/// Everything bound to one selected table: its column set, its row source
/// and its pending delete. Replaced wholesale when the selection changes.
#[derive(Debug, Clone)]
pub struct TableSession {
    table: String,
    generation: Generation,
    row_count: usize,
    columns: ColumnSet,
    columns_ready: bool,
    parked_rows: Option<ParkedRows>,
    parked_window: Option<ParkedWindow>,
    source: RowSource,
    gate: DeleteGate<Row>,
    last_draft: DraftId,
    saving: Vec<DraftId>,
}

impl TableSession {
    /// Starts a session and returns the schema and row loads, which run concurrently.
    pub fn open(
        table: &str,
        generation: Generation,
        row_count: usize,
        client_side_row_limit: usize,
        page_size: usize,
    ) -> (Self, Vec<LoadJob>) {
        let variant = RowVariant::for_count(row_count, client_side_row_limit);
        let source = match variant {
            RowVariant::ClientSide => RowSource::Client(ClientRowSource::default()),
            RowVariant::Paged => RowSource::Paged(PagedRowSource::new(page_size)),
        };
        info!(
            "opening {table} with {} rows using the {} source",
            row_count,
            variant.label()
        );
        let session = Self {
            table: table.to_owned(),
            generation,
            row_count,
            columns: ColumnSet::empty(table),
            columns_ready: false,
            parked_rows: None,
            parked_window: None,
            source,
            gate: DeleteGate::default(),
            last_draft: DraftId::default(),
            saving: Vec::new(),
        };
        let loads = vec![
            session.job(LoadRequest::Columns {
                table: table.to_owned(),
            }),
            session.rows_job(),
        ];
        (session, loads)
    }

    fn job(&self, request: LoadRequest) -> LoadJob {
        LoadJob {
            generation: self.generation,
            request,
        }
    }

    fn mutation_job(&self, request: MutationRequest) -> MutationJob {
        MutationJob {
            generation: self.generation,
            request,
        }
    }

    fn window_job(&self, window: WindowRequest) -> LoadJob {
        self.job(LoadRequest::Window {
            table: self.table.clone(),
            window,
        })
    }

    fn rows_job(&self) -> LoadJob {
        match &self.source {
            RowSource::Client(client) => self.job(LoadRequest::Rows {
                table: self.table.clone(),
                epoch: client.epoch(),
            }),
            RowSource::Paged(paged) => self.window_job(paged.window_request()),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn variant(&self) -> RowVariant {
        self.source.variant()
    }

    pub fn columns(&self) -> &ColumnSet {
        &self.columns
    }

    pub fn columns_ready(&self) -> bool {
        self.columns_ready
    }

    pub fn source(&self) -> &RowSource {
        &self.source
    }

    pub fn apply_columns(&mut self, columns: ColumnSet, notices: Vec<Notice>) -> Effects {
        self.columns = columns;
        self.columns_ready = true;
        let mut effects = Effects {
            notices,
            ..Effects::default()
        };
        if let Some(parked) = self.parked_rows.take() {
            effects.merge(self.apply_rows(parked.epoch, Ok(parked.rows), parked.loaded_at));
        }
        if let Some(parked) = self.parked_window.take() {
            effects.merge(self.apply_window(
                parked.epoch,
                parked.start,
                Ok(parked.fetched),
                parked.loaded_at,
            ));
        }
        effects
    }

    /// Rows arriving before the schema are parked and typed once it lands.
    /// A load older than the latest refresh is dropped.
    pub fn apply_rows(
        &mut self,
        epoch: CacheEpoch,
        result: Result<Vec<JsonRow>>,
        loaded_at: OffsetDateTime,
    ) -> Effects {
        let RowSource::Client(client) = &mut self.source else {
            debug!("ignoring full row load for paged session on {}", self.table);
            return Effects::default();
        };
        if epoch != client.epoch() {
            debug!(
                "dropping rows of {} for epoch {} (current {})",
                self.table,
                epoch.get(),
                client.epoch().get()
            );
            return Effects::default();
        }
        let objects = match result {
            Ok(objects) => objects,
            Err(error) => {
                warn!("row load for {} failed: {error:#}", self.table);
                client.replace(epoch, Vec::new(), loaded_at);
                return Effects::notice(Notice::error(format!(
                    "Error fetching rows for table {}",
                    self.table
                )));
            }
        };
        if !self.columns_ready {
            self.parked_rows = Some(ParkedRows {
                epoch,
                rows: objects,
                loaded_at,
            });
            return Effects::default();
        }
        if self.columns.schema.is_empty() {
            client.replace(epoch, Vec::new(), loaded_at);
            return Effects::default();
        }
        match Row::from_json_rows(&self.columns.schema, &objects) {
            Ok(rows) => {
                client.replace(epoch, rows, loaded_at);
                Effects::default()
            }
            Err(error) => {
                warn!("rows of {} do not match the schema: {error:#}", self.table);
                client.replace(epoch, Vec::new(), loaded_at);
                Effects::notice(Notice::error(format!(
                    "Error reading rows for table {}: {error:#}",
                    self.table
                )))
            }
        }
    }

    pub fn apply_window(
        &mut self,
        epoch: CacheEpoch,
        start: usize,
        result: Result<FetchedWindow>,
        loaded_at: OffsetDateTime,
    ) -> Effects {
        let RowSource::Paged(paged) = &mut self.source else {
            debug!("ignoring window load for client-side session on {}", self.table);
            return Effects::default();
        };
        let fetched = match result {
            Ok(fetched) => fetched,
            Err(error) => {
                warn!("window {start} of {} failed: {error:#}", self.table);
                return Effects::notice(Notice::error(format!(
                    "Error fetching rows for table {}",
                    self.table
                )));
            }
        };
        if !self.columns_ready {
            self.parked_window = Some(ParkedWindow {
                epoch,
                start,
                fetched,
                loaded_at,
            });
            return Effects::default();
        }
        if self.columns.schema.is_empty() {
            return Effects::default();
        }
        match paged.apply_window(&self.columns.schema, epoch, start, fetched, loaded_at) {
            Ok(_) => Effects::default(),
            Err(error) => {
                warn!("window of {} does not match the schema: {error:#}", self.table);
                Effects::notice(Notice::error(format!(
                    "Error reading rows for table {}: {error:#}",
                    self.table
                )))
            }
        }
    }

    pub fn display_len(&self) -> usize {
        match &self.source {
            RowSource::Client(client) => client.visible(&self.columns.schema).len(),
            RowSource::Paged(paged) => paged.display_len(),
        }
    }

    pub fn display_rows(&self) -> Vec<&Row> {
        match &self.source {
            RowSource::Client(client) => client
                .visible(&self.columns.schema)
                .into_iter()
                .filter_map(|index| client.row(index))
                .collect(),
            RowSource::Paged(paged) => (0..paged.display_len())
                .filter_map(|index| paged.display_row(index))
                .collect(),
        }
    }

    pub fn display_row(&self, index: usize) -> Option<&Row> {
        match &self.source {
            RowSource::Client(client) => client.row(self.client_index(client, index)?),
            RowSource::Paged(paged) => paged.display_row(index),
        }
    }

    fn client_index(&self, client: &ClientRowSource, display: usize) -> Option<usize> {
        client.visible(&self.columns.schema).get(display).copied()
    }

    /// A handle on the displayed row that survives reloads and reordering.
    pub fn row_ref(&self, display: usize) -> Option<RowRef> {
        let keys = self.columns.schema.key_indices();
        self.display_row(display).map(|row| row.row_ref(&keys))
    }

    /// Where the referenced row is displayed now, if it still is.
    pub fn locate(&self, target: &RowRef) -> Option<usize> {
        let keys = self.columns.schema.key_indices();
        self.display_rows()
            .iter()
            .position(|row| row.matches_ref(target, &keys))
    }

    pub fn is_saving(&self, draft: DraftId) -> bool {
        self.saving.contains(&draft)
    }

    pub fn filters(&self) -> &[ColumnFilter] {
        match &self.source {
            RowSource::Client(client) => client.filters(),
            RowSource::Paged(paged) => paged.filters(),
        }
    }

    pub fn sort(&self) -> Option<SortSpec> {
        match &self.source {
            RowSource::Client(client) => client.sort(),
            RowSource::Paged(_) => None,
        }
    }

    pub fn loaded_at(&self) -> Option<OffsetDateTime> {
        match &self.source {
            RowSource::Client(client) => client.loaded_at(),
            RowSource::Paged(paged) => paged.loaded_at(),
        }
    }

    pub fn last_refresh_label(&self, now: OffsetDateTime) -> Option<String> {
        self.loaded_at().map(|last| format_since(last, now))
    }

    /// Reloads the rows. Any answer to an earlier load is dropped when it lands.
    pub fn refresh(&mut self) -> Effects {
        match &mut self.source {
            RowSource::Client(client) => {
                client.begin_reload();
            }
            RowSource::Paged(paged) => {
                paged.invalidate();
            }
        }
        Effects::load(self.rows_job())
    }

    /// Prepends a blank unsaved row; it is always the first displayed row.
    pub fn add_new(&mut self) -> Result<usize> {
        if self.columns.schema.is_empty() {
            bail!("no columns loaded for {}", self.table);
        }
        self.last_draft = self.last_draft.next();
        let draft = self.last_draft;
        let schema = &self.columns.schema;
        Ok(match &mut self.source {
            RowSource::Client(client) => client.add_new(schema, draft),
            RowSource::Paged(paged) => paged.add_new(schema, draft),
        })
    }

    pub fn clear_new_rows(&mut self) -> usize {
        match &mut self.source {
            RowSource::Client(client) => client.clear_new_rows(),
            RowSource::Paged(paged) => paged.clear_new_rows(),
        }
    }

    /// Queues the POST for the unsaved row on display. The row stays pending
    /// until [`TableSession::apply_mutation`] sees the answer.
    pub fn save_new(&mut self, display: usize) -> Effects {
        let Some(row) = self.display_row(display) else {
            return Effects::notice(Notice::error(format!("Row {display} does not exist")));
        };
        let Some(draft) = row.draft else {
            return Effects::notice(Notice::info("Row is already saved"));
        };
        if self.is_saving(draft) {
            return Effects::notice(Notice::info("Row is already being saved"));
        }
        let wire = row.to_json(&self.columns.schema);
        self.saving.push(draft);
        debug!("saving draft {} in {}", draft.get(), self.table);
        Effects::mutation(self.mutation_job(MutationRequest::Create {
            table: self.table.clone(),
            draft,
            row: wire,
        }))
    }

    /// Applies the edit locally and queues the PUT for committed rows. There is no rollback.
    pub fn update_cell(&mut self, display: usize, column: usize, value: CellValue) -> Effects {
        if let Some(draft) = self.display_row(display).and_then(|row| row.draft)
            && self.is_saving(draft)
        {
            return Effects::notice(Notice::error(
                "Row is being saved; edit it once the save finishes",
            ));
        }
        let columns = &self.columns;
        let result = match &mut self.source {
            RowSource::Client(client) => match client.visible(&columns.schema).get(display).copied()
            {
                Some(index) => client.update_cell(columns, index, column, value),
                None => Err(anyhow::anyhow!("row {display} does not exist")),
            },
            RowSource::Paged(paged) => paged.update_cell(columns, display, column, value),
        };
        match result {
            Ok(None) => Effects::default(),
            Ok(Some(wire)) => Effects::mutation(self.mutation_job(MutationRequest::Update {
                table: self.table.clone(),
                row: wire,
            })),
            Err(error) => {
                warn!("update in {} failed: {error:#}", self.table);
                Effects::notice(Notice::error(format!("Error updating data: {error:#}")))
            }
        }
    }

    /// Like [`TableSession::update_cell`], for a row found by reference rather
    /// than by its display position.
    pub fn update_cell_at(&mut self, target: &RowRef, column: usize, value: CellValue) -> Effects {
        match self.locate(target) {
            Some(display) => self.update_cell(display, column, value),
            None => Effects::notice(Notice::error("Row is no longer on display")),
        }
    }

    /// Arms the delete gate for the displayed row, replacing any earlier target.
    pub fn request_delete(&mut self, display: usize, now: Instant) -> Result<TimerToken> {
        let Some(row) = self.display_row(display).cloned() else {
            bail!("row {display} does not exist");
        };
        if row.is_new() {
            bail!("unsaved rows are discarded with clear, not deleted");
        }
        Ok(self.gate.request(row, now))
    }

    pub fn pending_delete(&self) -> Option<&Row> {
        self.gate.pending()
    }

    pub fn delete_remaining(&self, now: Instant) -> Option<std::time::Duration> {
        self.gate.remaining(now)
    }

    pub fn cancel_delete(&mut self) -> bool {
        self.gate.cancel().is_some()
    }

    pub fn expire_delete(&mut self, token: TimerToken) -> bool {
        self.gate.expire(token)
    }

    pub fn poll_delete(&mut self, now: Instant) -> bool {
        self.gate.poll(now)
    }

    /// Queues the DELETE when the gate is still open. The row leaves the grid
    /// once the server agrees.
    pub fn confirm_delete(&mut self, now: Instant) -> Effects {
        let Some(target) = self.gate.confirm(now) else {
            return Effects::notice(Notice::info("No delete awaiting confirmation"));
        };
        let wire = target.to_json(&self.columns.schema);
        Effects::mutation(self.mutation_job(MutationRequest::Delete {
            table: self.table.clone(),
            target,
            row: wire,
        }))
    }

    /// Reconciles local state with a finished write.
    pub fn apply_mutation(&mut self, mutated: Mutated) -> Effects {
        let notice = mutated.notice();
        if let Some(error) = mutated.error() {
            warn!("write to {} failed: {error:#}", self.table);
        }

        let mut effects = Effects::notice(notice);
        match mutated {
            Mutated::Created { draft, result, .. } => {
                self.saving.retain(|pending| *pending != draft);
                if result.is_ok() {
                    self.row_count += 1;
                    match &mut self.source {
                        RowSource::Client(client) => {
                            if !client.mark_saved(draft) {
                                debug!("saved draft {} is no longer on display", draft.get());
                            }
                        }
                        RowSource::Paged(paged) => {
                            let window = paged.mark_saved(draft);
                            effects.loads.push(self.window_job(window));
                        }
                    }
                }
            }
            Mutated::Updated { .. } => {}
            Mutated::Deleted { target, result, .. } => {
                if result.is_ok() {
                    self.row_count = self.row_count.saturating_sub(1);
                    let schema = &self.columns.schema;
                    match &mut self.source {
                        RowSource::Client(client) => {
                            client.remove_deleted(schema, &target);
                        }
                        RowSource::Paged(paged) => {
                            let window = paged.remove_deleted(schema, &target);
                            effects.loads.push(self.window_job(window));
                        }
                    }
                }
            }
        }
        effects
    }

    pub fn set_filter(&mut self, column: usize, expression: &str) -> Result<Effects> {
        let Some(descriptor) = self.columns.schema.column(column) else {
            bail!("column {column} does not exist");
        };
        let filter = ColumnFilter::parse(descriptor, expression)?;
        Ok(match &mut self.source {
            RowSource::Client(client) => {
                client.set_filter(filter);
                Effects::default()
            }
            RowSource::Paged(paged) => {
                let window = paged.set_filter(filter);
                Effects::load(self.window_job(window))
            }
        })
    }

    pub fn clear_filters(&mut self) -> Effects {
        match &mut self.source {
            RowSource::Client(client) => {
                client.clear_filters();
                Effects::default()
            }
            RowSource::Paged(paged) => {
                let window = paged.clear_filters();
                Effects::load(self.window_job(window))
            }
        }
    }

    pub fn cycle_sort(&mut self, column: usize) -> Result<Option<SortSpec>> {
        if self.columns.schema.column(column).is_none() {
            bail!("column {column} does not exist");
        }
        match &mut self.source {
            RowSource::Client(client) => Ok(client.cycle_sort(column)),
            RowSource::Paged(_) => bail!("sorting is only available for client-side tables"),
        }
    }

    pub fn next_window(&mut self) -> Effects {
        match &mut self.source {
            RowSource::Paged(paged) => match paged.next_window() {
                Some(window) => Effects::load(self.window_job(window)),
                None => Effects::notice(Notice::info("Already at the last window")),
            },
            RowSource::Client(_) => Effects::default(),
        }
    }

    pub fn previous_window(&mut self) -> Effects {
        match &mut self.source {
            RowSource::Paged(paged) => match paged.previous_window() {
                Some(window) => Effects::load(self.window_job(window)),
                None => Effects::notice(Notice::info("Already at the first window")),
            },
            RowSource::Client(_) => Effects::default(),
        }
    }
}

/// The table picker plus the session of the selected table.
#[derive(Debug, Clone)]
pub struct EditorPage {
    tables: Vec<String>,
    tables_ready: bool,
    route: Route,
    generations: GenerationCounter,
    client_side_row_limit: usize,
    page_size: usize,
    session: Option<TableSession>,
}

impl Default for EditorPage {
    fn default() -> Self {
        Self::new(DEFAULT_CLIENT_SIDE_ROW_LIMIT, DEFAULT_PAGE_SIZE)
    }
}

impl EditorPage {
    pub fn new(client_side_row_limit: usize, page_size: usize) -> Self {
        Self {
            tables: Vec::new(),
            tables_ready: false,
            route: Route::editor(),
            generations: GenerationCounter::default(),
            client_side_row_limit: client_side_row_limit.max(1),
            page_size: page_size.max(1),
            session: None,
        }
    }

    /// The first load: the table list.
    pub fn start(&self) -> LoadJob {
        LoadJob {
            generation: self.generations.current(),
            request: LoadRequest::Tables,
        }
    }

    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    pub fn tables_ready(&self) -> bool {
        self.tables_ready
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn generation(&self) -> Generation {
        self.generations.current()
    }

    pub fn session(&self) -> Option<&TableSession> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut TableSession> {
        self.session.as_mut()
    }

    /// Switches to `route`. Every call starts a new generation so loads issued
    /// for an earlier selection are discarded when they return.
    pub fn navigate(&mut self, route: Route) -> Effects {
        let generation = self.generations.advance();
        self.session = None;
        self.route = route;
        let Some(table) = self.route.selected_table().map(str::to_owned) else {
            return Effects::default();
        };
        if self.tables_ready && !self.tables.iter().any(|known| *known == table) {
            warn!("unknown table {table}");
            self.route = Route::editor();
            return Effects::notice(Notice::error(format!("Unknown table {table}")));
        }
        info!("selecting {table} (generation {})", generation.get());
        Effects::load(LoadJob {
            generation,
            request: LoadRequest::Count { table },
        })
    }

    pub fn apply(&mut self, outcome: LoadOutcome) -> Effects {
        let LoadOutcome {
            generation,
            finished_at,
            loaded,
        } = outcome;

        let stale = !matches!(loaded, Loaded::Tables(_)) && !self.generations.is_current(generation);
        if stale {
            debug!(
                "discarding load from generation {} (current {})",
                generation.get(),
                self.generation().get()
            );
            return Effects::default();
        }

        match loaded {
            Loaded::Tables(result) => self.apply_tables(result),
            Loaded::Count { table, result } => self.apply_count(generation, &table, result),
            Loaded::Columns {
                table,
                columns,
                notices,
            } => match self.session_for(&table) {
                Some(session) => session.apply_columns(columns, notices),
                None => Effects::default(),
            },
            Loaded::Rows {
                table,
                epoch,
                result,
            } => match self.session_for(&table) {
                Some(session) => session.apply_rows(epoch, result, finished_at),
                None => Effects::default(),
            },
            Loaded::Window {
                table,
                epoch,
                start,
                result,
            } => match self.session_for(&table) {
                Some(session) => session.apply_window(epoch, start, result, finished_at),
                None => Effects::default(),
            },
        }
    }

    /// Applies a finished write. A write issued for an earlier selection still
    /// reports its notice but no longer touches any rows.
    pub fn apply_mutation(&mut self, outcome: MutationOutcome) -> Effects {
        let MutationOutcome { generation, mutated } = outcome;
        let table = mutated.table().to_owned();
        if self.generations.is_current(generation)
            && let Some(session) = self.session_for(&table)
        {
            return session.apply_mutation(mutated);
        }
        debug!(
            "write to {table} finished after its selection ended (generation {})",
            generation.get()
        );
        if let Some(error) = mutated.error() {
            warn!("write to {table} failed: {error:#}");
        }
        Effects::notice(mutated.notice())
    }

    /// Reloads what is on screen. The table list is asked for again until it
    /// has loaded once, so the route can still be checked against it.
    pub fn refresh(&mut self) -> Effects {
        let mut effects = Effects::default();
        if !self.tables_ready {
            effects.loads.push(self.start());
        }
        if let Some(session) = self.session.as_mut() {
            effects.merge(session.refresh());
        }
        effects
    }

    fn session_for(&mut self, table: &str) -> Option<&mut TableSession> {
        self.session
            .as_mut()
            .filter(|session| session.table() == table)
    }

    fn apply_tables(&mut self, result: Result<Vec<String>>) -> Effects {
        match result {
            Ok(tables) => {
                self.tables = tables;
                self.tables_ready = true;
                let selected = self.route.selected_table().map(str::to_owned);
                match selected {
                    Some(table) if !self.tables.contains(&table) => {
                        self.navigate(Route::table(&table))
                    }
                    _ => Effects::default(),
                }
            }
            Err(error) => {
                warn!("table list failed: {error:#}");
                Effects::notice(Notice::error(format!("Error fetching tables: {error:#}")))
            }
        }
    }

    fn apply_count(&mut self, generation: Generation, table: &str, result: Result<usize>) -> Effects {
        let count = match result {
            Ok(count) => count,
            Err(error) => {
                warn!("row count for {table} failed: {error:#}");
                return Effects::notice(Notice::error(format!(
                    "Error fetching table count: {error:#}"
                )));
            }
        };
        let (session, loads) = TableSession::open(
            table,
            generation,
            count,
            self.client_side_row_limit,
            self.page_size,
        );
        self.session = Some(session);
        Effects {
            notices: Vec::new(),
            loads,
            mutations: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{EditorPage, TableSession};
    use crate::{
        CacheEpoch, ColumnDescriptor, ColumnSet, ColumnType, DraftId, Generation, LoadOutcome,
        LoadRequest, Loaded, Mutated, MutationOutcome, Notice, RowVariant, TableSchema,
    };
    use anyhow::anyhow;
    use serde_json::json;
    use time::OffsetDateTime;

    fn outcome(generation: Generation, loaded: Loaded) -> LoadOutcome {
        LoadOutcome {
            generation,
            finished_at: OffsetDateTime::UNIX_EPOCH,
            loaded,
        }
    }

    fn users_columns() -> ColumnSet {
        ColumnSet {
            schema: TableSchema::new(
                "users",
                vec![
                    ColumnDescriptor::new("id", ColumnType::Number).key(),
                    ColumnDescriptor::new("name", ColumnType::Text),
                ],
            ),
            catalog: Default::default(),
        }
    }

    #[test]
    fn variant_follows_row_count_threshold() {
        let (small, _) = TableSession::open("t", Generation::new(1), 999, 1000, 50);
        let (large, loads) = TableSession::open("t", Generation::new(1), 1000, 1000, 50);
        assert_eq!(small.variant(), RowVariant::ClientSide);
        assert_eq!(large.variant(), RowVariant::Paged);
        assert_eq!(loads.len(), 2);
        assert!(matches!(loads[0].request, LoadRequest::Columns { .. }));
        assert!(matches!(loads[1].request, LoadRequest::Window { .. }));
    }

    #[test]
    fn rows_before_schema_are_parked_until_columns_arrive() {
        let (mut session, _) = TableSession::open("users", Generation::new(1), 1, 1000, 50);
        let rows = vec![match json!({"id": 1, "name": "Ada"}) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }];

        session.apply_rows(CacheEpoch::default(), Ok(rows), OffsetDateTime::UNIX_EPOCH);
        assert_eq!(session.display_len(), 0);

        session.apply_columns(users_columns(), Vec::new());
        assert_eq!(session.display_len(), 1);
    }

    #[test]
    fn unknown_table_is_rejected_once_tables_are_known() {
        let mut page = EditorPage::default();
        page.apply(outcome(
            Generation::default(),
            Loaded::Tables(Ok(vec!["users".to_owned()])),
        ));

        let effects = page.navigate(crate::Route::table("ghosts"));
        assert!(effects.loads.is_empty());
        assert!(effects.notices.iter().any(|notice| notice.is_error()));
        assert_eq!(page.route().selected_table(), None);
    }

    fn users_session() -> TableSession {
        let (mut session, _) = TableSession::open("users", Generation::new(1), 0, 1000, 50);
        session.apply_columns(users_columns(), Vec::new());
        session.apply_rows(CacheEpoch::default(), Ok(Vec::new()), OffsetDateTime::UNIX_EPOCH);
        session
    }

    #[test]
    fn rows_from_before_a_refresh_are_dropped() {
        let (mut session, _) = TableSession::open("users", Generation::new(1), 1, 1000, 50);
        session.apply_columns(users_columns(), Vec::new());
        let older = vec![match json!({"id": 1, "name": "Ada"}) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }];

        let effects = session.refresh();
        assert!(matches!(
            effects.loads[0].request,
            LoadRequest::Rows { epoch, .. } if epoch == CacheEpoch::new(1)
        ));
        session.apply_rows(CacheEpoch::default(), Ok(older), OffsetDateTime::UNIX_EPOCH);
        assert_eq!(session.display_len(), 0);
        assert_eq!(session.loaded_at(), None);
    }

    #[test]
    fn drafts_being_saved_cannot_be_saved_or_edited_again() {
        let mut session = users_session();
        session.add_new().expect("columns are loaded");

        let effects = session.save_new(0);
        assert_eq!(effects.mutations.len(), 1);
        let again = session.save_new(0);
        assert!(again.mutations.is_empty());
        assert_eq!(again.notices, vec![Notice::info("Row is already being saved")]);

        let edit = session.update_cell(0, 1, crate::CellValue::Text("late".to_owned()));
        assert!(edit.notices.iter().all(Notice::is_error));
        assert!(session.is_saving(DraftId::new(1)));
    }

    #[test]
    fn failed_save_keeps_the_draft_and_allows_a_retry() {
        let mut session = users_session();
        session.add_new().expect("columns are loaded");
        session.save_new(0);

        let effects = session.apply_mutation(Mutated::Created {
            table: "users".to_owned(),
            draft: DraftId::new(1),
            result: Err(anyhow!("conflict")),
        });
        assert!(effects.notices.iter().all(Notice::is_error));
        assert!(session.display_row(0).is_some_and(|row| row.is_new()));
        assert!(!session.is_saving(DraftId::new(1)));
        assert_eq!(session.save_new(0).mutations.len(), 1);
    }

    #[test]
    fn writes_from_an_earlier_selection_only_report() {
        let mut page = EditorPage::default();
        page.apply(outcome(
            Generation::default(),
            Loaded::Tables(Ok(vec!["users".to_owned()])),
        ));
        let stale = page.navigate(crate::Route::table("users"));
        page.navigate(crate::Route::editor());

        let effects = page.apply_mutation(MutationOutcome {
            generation: stale.loads[0].generation,
            mutated: Mutated::Updated {
                table: "users".to_owned(),
                result: Ok(()),
            },
        });
        assert_eq!(effects.notices, vec![Notice::success("Data updated successfully")]);
        assert!(effects.loads.is_empty());
    }

    #[test]
    fn failed_table_list_is_retried_on_refresh() {
        let mut page = EditorPage::default();
        page.apply(outcome(Generation::default(), Loaded::Tables(Err(anyhow!("offline")))));
        let effects = page.navigate(crate::Route::table("ghosts"));
        assert_eq!(effects.loads.len(), 1);
        assert!(!page.tables_ready());

        let retry = page.refresh();
        assert!(matches!(retry.loads[0].request, LoadRequest::Tables));

        let effects = page.apply(outcome(
            Generation::default(),
            Loaded::Tables(Ok(vec!["users".to_owned()])),
        ));
        assert!(effects.notices.iter().any(|notice| notice.is_error()));
        assert_eq!(page.route().selected_table(), None);
        assert!(page.session().is_none());
        assert!(page.refresh().loads.is_empty());
    }
}
