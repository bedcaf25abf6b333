// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, bail};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use gridedit_app::{
    AppCommand, AppEvent, AppMode, AppState, CONFIRM_WINDOW, CellValue, EditorPage, Effects,
    LoadJob, LoadOutcome, MutationJob, MutationOutcome, Notice, NoticeLevel, Route, RowRef,
    RowSource, SortDirection, TableBackend, TableSession, TimerToken, run_load, run_mutation,
};
use log::{debug, info};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table};
use std::io;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};
use time::OffsetDateTime;

const LINK_ARROW: &str = "→";
const KEY_MARKER: &str = "*";
const NEW_ROW_MARKER: &str = "+";
const CELL_MAX_CHARS: usize = 28;
const STATUS_CLEAR_DELAY: Duration = Duration::from_secs(4);

#[derive(Debug)]
pub enum InternalEvent {
    Loaded(LoadOutcome),
    Mutated(MutationOutcome),
    ClearStatus { token: TimerToken },
    DeleteExpired { token: TimerToken },
}

/// The backend shared with workers, plus the channel they report on.
struct Runtime {
    backend: Arc<dyn TableBackend>,
    internal_tx: Sender<InternalEvent>,
    in_flight: usize,
}

impl Runtime {
    fn new(backend: Arc<dyn TableBackend>, internal_tx: Sender<InternalEvent>) -> Self {
        Self {
            backend,
            internal_tx,
            in_flight: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Clock {
    instant: Instant,
    wall: OffsetDateTime,
}

impl Clock {
    fn now() -> Self {
        Self {
            instant: Instant::now(),
            wall: OffsetDateTime::now_utc(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Choice {
    value: CellValue,
    label: String,
}

#[derive(Debug, Clone, PartialEq)]
enum EditorInput {
    Text(String),
    Choice {
        choices: Vec<Choice>,
        selected: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
struct CellEditor {
    target: RowRef,
    column: usize,
    column_name: String,
    input: EditorInput,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FilterInput {
    column: usize,
    column_name: String,
    buffer: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
struct ViewData {
    cursor_row: usize,
    cursor_col: usize,
    picker_selected: usize,
    editor: Option<CellEditor>,
    filter: Option<FilterInput>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableCommand {
    MoveRow(isize),
    MoveColumn(isize),
    JumpFirstRow,
    JumpLastRow,
    OpenPicker,
    AddRow,
    EditCell,
    SaveRow,
    RequestDelete,
    Refresh,
    ClearNewRows,
    BeginFilter,
    ClearFilters,
    CycleSort,
    NextWindow,
    PreviousWindow,
    ShowHelp,
}

pub fn run_app(
    state: &mut AppState,
    page: &mut EditorPage,
    backend: Arc<dyn TableBackend>,
    initial_route: Route,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen).context("enter alternate screen")?;

    let terminal_backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(terminal_backend).context("create terminal")?;

    let (internal_tx, internal_rx) = mpsc::channel();
    let mut runtime = Runtime::new(backend, internal_tx);
    let mut view_data = ViewData::default();
    start_page(state, page, &mut runtime, initial_route);

    let mut result = Ok(());
    loop {
        process_internal_events(state, page, &mut runtime, &mut view_data, &internal_rx);

        let clock = Clock::now();
        let loading = runtime.in_flight > 0;
        if let Err(error) =
            terminal.draw(|frame| render(frame, state, page, &view_data, clock, loading))
        {
            result = Err(error).context("draw frame");
            break;
        }

        let has_event = match event::poll(Duration::from_millis(120)).context("poll event") {
            Ok(has_event) => has_event,
            Err(error) => {
                result = Err(error);
                break;
            }
        };
        if has_event {
            match event::read().context("read event") {
                Ok(Event::Key(key)) => {
                    if handle_key_event(state, page, &mut runtime, &mut view_data, key) {
                        break;
                    }
                }
                Ok(_) => {}
                Err(error) => {
                    result = Err(error);
                    break;
                }
            }
        }
    }

    disable_raw_mode().context("disable raw mode")?;
    execute!(io::stdout(), terminal::LeaveAlternateScreen).context("leave alternate screen")?;
    result
}

fn start_page(state: &mut AppState, page: &mut EditorPage, runtime: &mut Runtime, route: Route) {
    spawn_load(runtime, page.start());
    if route.selected_table().is_some() {
        let effects = page.navigate(route);
        apply_effects(state, runtime, effects);
    }
}

fn spawn_load(runtime: &mut Runtime, job: LoadJob) {
    debug!(
        "starting {:?} for generation {}",
        job.request,
        job.generation.get()
    );
    runtime.in_flight += 1;
    let backend = Arc::clone(&runtime.backend);
    let sender = runtime.internal_tx.clone();
    thread::spawn(move || {
        let outcome = run_load(backend.as_ref(), job);
        let _ = sender.send(InternalEvent::Loaded(outcome));
    });
}

fn spawn_mutation(runtime: &mut Runtime, job: MutationJob) {
    debug!(
        "starting {:?} for generation {}",
        job.request,
        job.generation.get()
    );
    runtime.in_flight += 1;
    let backend = Arc::clone(&runtime.backend);
    let sender = runtime.internal_tx.clone();
    thread::spawn(move || {
        let outcome = run_mutation(backend.as_ref(), job);
        let _ = sender.send(InternalEvent::Mutated(outcome));
    });
}

fn apply_effects(state: &mut AppState, runtime: &mut Runtime, effects: Effects) {
    for notice in effects.notices {
        emit_status(state, &runtime.internal_tx, notice);
    }
    for job in effects.loads {
        spawn_load(runtime, job);
    }
    for job in effects.mutations {
        spawn_mutation(runtime, job);
    }
}

fn process_internal_events(
    state: &mut AppState,
    page: &mut EditorPage,
    runtime: &mut Runtime,
    view_data: &mut ViewData,
    rx: &Receiver<InternalEvent>,
) {
    while let Ok(event) = rx.try_recv() {
        handle_internal_event(state, page, runtime, view_data, event);
    }
    expire_overdue_delete(state, page, runtime, Instant::now());
}

fn handle_internal_event(
    state: &mut AppState,
    page: &mut EditorPage,
    runtime: &mut Runtime,
    view_data: &mut ViewData,
    event: InternalEvent,
) {
    match event {
        InternalEvent::Loaded(outcome) => {
            runtime.in_flight = runtime.in_flight.saturating_sub(1);
            let effects = page.apply(outcome);
            apply_effects(state, runtime, effects);
            clamp_cursor(page, view_data);
        }
        InternalEvent::Mutated(outcome) => {
            runtime.in_flight = runtime.in_flight.saturating_sub(1);
            let effects = page.apply_mutation(outcome);
            apply_effects(state, runtime, effects);
            clamp_cursor(page, view_data);
        }
        InternalEvent::ClearStatus { token } => {
            state.dispatch(AppCommand::ClearStatus(token));
        }
        InternalEvent::DeleteExpired { token } => {
            let expired = page
                .session_mut()
                .is_some_and(|session| session.expire_delete(token));
            if expired {
                leave_delete_confirm(state, &runtime.internal_tx, "Delete request expired");
            }
        }
    }
}

/// Deadline check for a gate whose timer message has not arrived yet.
fn expire_overdue_delete(
    state: &mut AppState,
    page: &mut EditorPage,
    runtime: &Runtime,
    now: Instant,
) {
    if state.mode != AppMode::ConfirmDelete {
        return;
    }
    let expired = match page.session_mut() {
        Some(session) => session.poll_delete(now) || session.pending_delete().is_none(),
        None => true,
    };
    if expired {
        leave_delete_confirm(state, &runtime.internal_tx, "Delete request expired");
    }
}

fn leave_delete_confirm(state: &mut AppState, internal_tx: &Sender<InternalEvent>, message: &str) {
    if state.mode == AppMode::ConfirmDelete {
        state.dispatch(AppCommand::ExitToNav);
    }
    emit_status(state, internal_tx, Notice::info(message));
}

fn schedule_status_clear(internal_tx: &Sender<InternalEvent>, token: TimerToken) {
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(STATUS_CLEAR_DELAY);
        let _ = sender.send(InternalEvent::ClearStatus { token });
    });
}

fn schedule_delete_expiry(internal_tx: &Sender<InternalEvent>, token: TimerToken) {
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(CONFIRM_WINDOW);
        let _ = sender.send(InternalEvent::DeleteExpired { token });
    });
}

fn emit_status(state: &mut AppState, internal_tx: &Sender<InternalEvent>, notice: Notice) {
    for event in state.dispatch(AppCommand::ShowNotice(notice)) {
        if let AppEvent::StatusUpdated { token, .. } = event {
            schedule_status_clear(internal_tx, token);
        }
    }
}

fn emit_error(state: &mut AppState, runtime: &Runtime, error: anyhow::Error) {
    emit_status(state, &runtime.internal_tx, Notice::error(format!("{error:#}")));
}

fn emit_info(state: &mut AppState, runtime: &Runtime, message: impl Into<String>) {
    emit_status(state, &runtime.internal_tx, Notice::info(message));
}

fn handle_key_event(
    state: &mut AppState,
    page: &mut EditorPage,
    runtime: &mut Runtime,
    view_data: &mut ViewData,
    key: KeyEvent,
) -> bool {
    if key.code == KeyCode::Char('q') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return true;
    }

    match state.mode {
        AppMode::Nav => handle_table_key(state, page, runtime, view_data, key),
        AppMode::PickTable => handle_picker_key(state, page, runtime, view_data, key),
        AppMode::EditCell => handle_edit_key(state, page, runtime, view_data, key),
        AppMode::FilterInput => handle_filter_key(state, page, runtime, view_data, key),
        AppMode::ConfirmDelete => handle_confirm_key(state, page, runtime, key),
        AppMode::Help => {
            state.dispatch(AppCommand::ExitToNav);
        }
    }
    clamp_cursor(page, view_data);
    false
}

fn handle_table_key(
    state: &mut AppState,
    page: &mut EditorPage,
    runtime: &mut Runtime,
    view_data: &mut ViewData,
    key: KeyEvent,
) {
    let Some(command) = table_command_for_key(key) else {
        return;
    };
    apply_table_command(state, page, runtime, view_data, command);
}

fn table_command_for_key(key: KeyEvent) -> Option<TableCommand> {
    match (key.code, key.modifiers) {
        (KeyCode::Char('j'), _) | (KeyCode::Down, _) => Some(TableCommand::MoveRow(1)),
        (KeyCode::Char('k'), _) | (KeyCode::Up, _) => Some(TableCommand::MoveRow(-1)),
        (KeyCode::Char('h'), _) | (KeyCode::Left, _) => Some(TableCommand::MoveColumn(-1)),
        (KeyCode::Char('l'), _) | (KeyCode::Right, _) => Some(TableCommand::MoveColumn(1)),
        (KeyCode::Char('g'), _) | (KeyCode::Home, _) => Some(TableCommand::JumpFirstRow),
        (KeyCode::Char('G'), _) | (KeyCode::End, _) => Some(TableCommand::JumpLastRow),
        (KeyCode::Char('t'), KeyModifiers::NONE) => Some(TableCommand::OpenPicker),
        (KeyCode::Char('a'), KeyModifiers::NONE) => Some(TableCommand::AddRow),
        (KeyCode::Char('e'), KeyModifiers::NONE) | (KeyCode::Enter, _) => {
            Some(TableCommand::EditCell)
        }
        (KeyCode::Char('w'), KeyModifiers::NONE) => Some(TableCommand::SaveRow),
        (KeyCode::Char('d'), KeyModifiers::NONE) => Some(TableCommand::RequestDelete),
        (KeyCode::Char('r'), KeyModifiers::NONE) => Some(TableCommand::Refresh),
        (KeyCode::Char('x'), KeyModifiers::NONE) => Some(TableCommand::ClearNewRows),
        (KeyCode::Char('/'), _) => Some(TableCommand::BeginFilter),
        (KeyCode::Char('F'), _) => Some(TableCommand::ClearFilters),
        (KeyCode::Char('s'), KeyModifiers::NONE) => Some(TableCommand::CycleSort),
        (KeyCode::Char(']'), _) => Some(TableCommand::NextWindow),
        (KeyCode::Char('['), _) => Some(TableCommand::PreviousWindow),
        (KeyCode::Char('?'), _) => Some(TableCommand::ShowHelp),
        _ => None,
    }
}

fn apply_table_command(
    state: &mut AppState,
    page: &mut EditorPage,
    runtime: &mut Runtime,
    view_data: &mut ViewData,
    command: TableCommand,
) {
    match command {
        TableCommand::MoveRow(delta) => {
            view_data.cursor_row = view_data.cursor_row.saturating_add_signed(delta);
            return;
        }
        TableCommand::MoveColumn(delta) => {
            view_data.cursor_col = view_data.cursor_col.saturating_add_signed(delta);
            return;
        }
        TableCommand::JumpFirstRow => {
            view_data.cursor_row = 0;
            return;
        }
        TableCommand::JumpLastRow => {
            view_data.cursor_row = usize::MAX;
            return;
        }
        TableCommand::OpenPicker => {
            view_data.picker_selected = page
                .route()
                .selected_table()
                .and_then(|table| page.tables().iter().position(|known| known == table))
                .unwrap_or(0);
            state.dispatch(AppCommand::OpenPicker);
            return;
        }
        TableCommand::ShowHelp => {
            state.dispatch(AppCommand::ShowHelp);
            return;
        }
        TableCommand::EditCell => {
            if let Err(error) = begin_edit(state, page, view_data) {
                emit_error(state, runtime, error);
            }
            return;
        }
        TableCommand::BeginFilter => {
            if let Err(error) = begin_filter(state, page, view_data) {
                emit_error(state, runtime, error);
            }
            return;
        }
        TableCommand::Refresh => {
            if page.session().is_none() && page.tables_ready() {
                spawn_load(runtime, page.start());
            } else {
                info!("refreshing {}", page.route().path());
                let effects = page.refresh();
                apply_effects(state, runtime, effects);
            }
            return;
        }
        _ => {}
    }

    let Some(session) = page.session_mut() else {
        emit_info(state, runtime, "Select a table first (press t)");
        return;
    };
    let row = view_data.cursor_row;

    match command {
        TableCommand::AddRow => match session.add_new() {
            Ok(index) => view_data.cursor_row = index,
            Err(error) => emit_error(state, runtime, error),
        },
        TableCommand::SaveRow => {
            if session.display_row(row).is_some() {
                let effects = session.save_new(row);
                apply_effects(state, runtime, effects);
            }
        }
        TableCommand::RequestDelete => match session.request_delete(row, Instant::now()) {
            Ok(token) => {
                state.dispatch(AppCommand::AwaitDeleteConfirm);
                schedule_delete_expiry(&runtime.internal_tx, token);
            }
            Err(error) => emit_error(state, runtime, error),
        },
        TableCommand::ClearNewRows => match session.clear_new_rows() {
            0 => emit_info(state, runtime, "No new rows to clear"),
            cleared => emit_info(state, runtime, format!("Cleared {cleared} new rows")),
        },
        TableCommand::ClearFilters => {
            let effects = session.clear_filters();
            view_data.cursor_row = 0;
            apply_effects(state, runtime, effects);
            emit_info(state, runtime, "Filters cleared");
        }
        TableCommand::CycleSort => {
            let column = view_data.cursor_col;
            let name = session
                .columns()
                .schema
                .column(column)
                .map(|descriptor| descriptor.name.clone())
                .unwrap_or_default();
            match session.cycle_sort(column) {
                Ok(Some(sort)) => {
                    let direction = match sort.direction {
                        SortDirection::Asc => "ascending",
                        SortDirection::Desc => "descending",
                    };
                    emit_info(state, runtime, format!("Sorted by {name} {direction}"));
                }
                Ok(None) => emit_info(state, runtime, "Sort cleared"),
                Err(error) => emit_error(state, runtime, error),
            }
        }
        TableCommand::NextWindow | TableCommand::PreviousWindow => {
            let effects = if command == TableCommand::NextWindow {
                session.next_window()
            } else {
                session.previous_window()
            };
            if !effects.loads.is_empty() {
                view_data.cursor_row = 0;
            }
            apply_effects(state, runtime, effects);
        }
        _ => {}
    }
}

fn begin_edit(state: &mut AppState, page: &EditorPage, view_data: &mut ViewData) -> Result<()> {
    let Some(session) = page.session() else {
        bail!("select a table first (press t)");
    };
    let Some(row) = session.display_row(view_data.cursor_row) else {
        bail!("no row under the cursor");
    };
    let columns = session.columns();
    let Some(descriptor) = columns.schema.column(view_data.cursor_col) else {
        bail!("no column under the cursor");
    };
    if !descriptor.is_editable(row.is_new()) {
        bail!("key column `{}` is read-only once saved", descriptor.name);
    }

    let current = row
        .get(view_data.cursor_col)
        .cloned()
        .unwrap_or(CellValue::Null);
    let input = match columns.allowed_values(view_data.cursor_col) {
        Some(options) => {
            let mut choices = vec![Choice {
                value: CellValue::Null,
                label: String::new(),
            }];
            choices.extend(options.iter().map(|option| Choice {
                value: option.id.clone(),
                label: option.name.clone(),
            }));
            let selected = choices
                .iter()
                .position(|choice| choice.value == current)
                .unwrap_or(0);
            EditorInput::Choice { choices, selected }
        }
        None => EditorInput::Text(current.display()),
    };

    let Some(target) = session.row_ref(view_data.cursor_row) else {
        bail!("no row under the cursor");
    };
    view_data.editor = Some(CellEditor {
        target,
        column: view_data.cursor_col,
        column_name: descriptor.name.clone(),
        input,
    });
    state.dispatch(AppCommand::BeginEdit);
    Ok(())
}

fn handle_edit_key(
    state: &mut AppState,
    page: &mut EditorPage,
    runtime: &mut Runtime,
    view_data: &mut ViewData,
    key: KeyEvent,
) {
    match key.code {
        KeyCode::Esc => {
            view_data.editor = None;
            state.dispatch(AppCommand::ExitToNav);
            return;
        }
        KeyCode::Enter => {
            commit_edit(state, page, runtime, view_data);
            return;
        }
        _ => {}
    }

    let Some(editor) = view_data.editor.as_mut() else {
        state.dispatch(AppCommand::ExitToNav);
        return;
    };
    match (&mut editor.input, key.code) {
        (EditorInput::Choice { choices, selected }, KeyCode::Up | KeyCode::Char('k')) => {
            *selected = selected
                .checked_sub(1)
                .unwrap_or(choices.len().saturating_sub(1));
        }
        (EditorInput::Choice { choices, selected }, KeyCode::Down | KeyCode::Char('j')) => {
            *selected = (*selected + 1) % choices.len().max(1);
        }
        (EditorInput::Text(buffer), KeyCode::Backspace) => {
            buffer.pop();
        }
        (EditorInput::Text(buffer), KeyCode::Char(ch)) => buffer.push(ch),
        _ => {}
    }
}

fn commit_edit(
    state: &mut AppState,
    page: &mut EditorPage,
    runtime: &mut Runtime,
    view_data: &mut ViewData,
) {
    let Some(editor) = view_data.editor.take() else {
        state.dispatch(AppCommand::ExitToNav);
        return;
    };
    let Some(session) = page.session_mut() else {
        state.dispatch(AppCommand::ExitToNav);
        return;
    };

    let value = match &editor.input {
        EditorInput::Choice { choices, selected } => Ok(choices
            .get(*selected)
            .map(|choice| choice.value.clone())
            .unwrap_or(CellValue::Null)),
        EditorInput::Text(buffer) => match session.columns().schema.column(editor.column) {
            Some(descriptor) => CellValue::parse_input(&descriptor.data_type, buffer),
            None => Err(anyhow::anyhow!("column `{}` is gone", editor.column_name)),
        },
    };
    let value = match value {
        Ok(value) => value,
        Err(error) => {
            view_data.editor = Some(editor);
            emit_error(state, runtime, error);
            return;
        }
    };

    let effects = session.update_cell_at(&editor.target, editor.column, value);
    state.dispatch(AppCommand::ExitToNav);
    apply_effects(state, runtime, effects);
}

fn begin_filter(state: &mut AppState, page: &EditorPage, view_data: &mut ViewData) -> Result<()> {
    let Some(session) = page.session() else {
        bail!("select a table first (press t)");
    };
    let Some(descriptor) = session.columns().schema.column(view_data.cursor_col) else {
        bail!("no column under the cursor");
    };
    if !descriptor.accepts_filter() {
        bail!("column `{}` cannot be filtered", descriptor.name);
    }
    view_data.filter = Some(FilterInput {
        column: view_data.cursor_col,
        column_name: descriptor.name.clone(),
        buffer: String::new(),
    });
    state.dispatch(AppCommand::BeginFilter);
    Ok(())
}

fn handle_filter_key(
    state: &mut AppState,
    page: &mut EditorPage,
    runtime: &mut Runtime,
    view_data: &mut ViewData,
    key: KeyEvent,
) {
    match key.code {
        KeyCode::Esc => {
            view_data.filter = None;
            state.dispatch(AppCommand::ExitToNav);
        }
        KeyCode::Enter => {
            let Some(filter) = view_data.filter.take() else {
                state.dispatch(AppCommand::ExitToNav);
                return;
            };
            let Some(session) = page.session_mut() else {
                state.dispatch(AppCommand::ExitToNav);
                return;
            };
            match session.set_filter(filter.column, &filter.buffer) {
                Ok(effects) => {
                    view_data.cursor_row = 0;
                    state.dispatch(AppCommand::ExitToNav);
                    apply_effects(state, runtime, effects);
                }
                Err(error) => {
                    view_data.filter = Some(filter);
                    emit_error(state, runtime, error);
                }
            }
        }
        KeyCode::Backspace => {
            if let Some(filter) = view_data.filter.as_mut() {
                filter.buffer.pop();
            }
        }
        KeyCode::Char(ch) => {
            if let Some(filter) = view_data.filter.as_mut() {
                filter.buffer.push(ch);
            }
        }
        _ => {}
    }
}

fn handle_picker_key(
    state: &mut AppState,
    page: &mut EditorPage,
    runtime: &mut Runtime,
    view_data: &mut ViewData,
    key: KeyEvent,
) {
    let count = page.tables().len();
    match key.code {
        KeyCode::Esc | KeyCode::Char('t') => {
            state.dispatch(AppCommand::ExitToNav);
        }
        KeyCode::Char('j') | KeyCode::Down if count > 0 => {
            view_data.picker_selected = (view_data.picker_selected + 1) % count;
        }
        KeyCode::Char('k') | KeyCode::Up if count > 0 => {
            view_data.picker_selected = view_data
                .picker_selected
                .checked_sub(1)
                .unwrap_or(count - 1);
        }
        KeyCode::Enter => {
            let Some(table) = page.tables().get(view_data.picker_selected).cloned() else {
                return;
            };
            state.dispatch(AppCommand::ExitToNav);
            view_data.cursor_row = 0;
            view_data.cursor_col = 0;
            let effects = page.navigate(Route::table(&table));
            apply_effects(state, runtime, effects);
        }
        _ => {}
    }
}

fn handle_confirm_key(
    state: &mut AppState,
    page: &mut EditorPage,
    runtime: &mut Runtime,
    key: KeyEvent,
) {
    let Some(session) = page.session_mut() else {
        state.dispatch(AppCommand::ExitToNav);
        return;
    };
    match key.code {
        KeyCode::Char('y') => {
            let effects = session.confirm_delete(Instant::now());
            state.dispatch(AppCommand::ExitToNav);
            apply_effects(state, runtime, effects);
        }
        KeyCode::Char('n') | KeyCode::Esc => {
            session.cancel_delete();
            state.dispatch(AppCommand::ExitToNav);
            emit_info(state, runtime, "Delete cancelled");
        }
        _ => {}
    }
}

fn clamp_cursor(page: &EditorPage, view_data: &mut ViewData) {
    let (rows, columns) = page.session().map_or((0, 0), |session| {
        (session.display_len(), session.columns().schema.columns.len())
    });
    view_data.cursor_row = view_data.cursor_row.min(rows.saturating_sub(1));
    view_data.cursor_col = view_data.cursor_col.min(columns.saturating_sub(1));
    let tables = page.tables().len();
    view_data.picker_selected = view_data.picker_selected.min(tables.saturating_sub(1));
}

fn render(
    frame: &mut ratatui::Frame<'_>,
    state: &AppState,
    page: &EditorPage,
    view_data: &ViewData,
    clock: Clock,
    loading: bool,
) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(4),
        ])
        .split(frame.area());

    let title = Paragraph::new(title_text(page))
        .block(Block::default().title("gridedit").borders(Borders::ALL));
    frame.render_widget(title, layout[0]);

    render_table(frame, layout[1], page, view_data);

    let status_style = match state.status.as_ref().map(|notice| notice.level) {
        Some(NoticeLevel::Error) => Style::default().fg(Color::Red),
        Some(NoticeLevel::Success) => Style::default().fg(Color::Green),
        Some(NoticeLevel::Info) | None => Style::default().fg(Color::Yellow),
    };
    let footer = Paragraph::new(footer_text(state, page, clock, loading))
        .style(status_style)
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(footer, layout[2]);

    match state.mode {
        AppMode::PickTable => {
            let area = centered_rect(40, 60, frame.area());
            frame.render_widget(Clear, area);
            let picker = Paragraph::new(picker_overlay_text(page, view_data))
                .block(Block::default().title("tables").borders(Borders::ALL));
            frame.render_widget(picker, area);
        }
        AppMode::EditCell => {
            if let Some(editor) = &view_data.editor {
                let area = centered_rect(60, 40, frame.area());
                frame.render_widget(Clear, area);
                let overlay = Paragraph::new(editor_overlay_text(editor)).block(
                    Block::default()
                        .title(format!("edit {}", editor.column_name))
                        .borders(Borders::ALL),
                );
                frame.render_widget(overlay, area);
            }
        }
        AppMode::FilterInput => {
            if let Some(filter) = &view_data.filter {
                let area = centered_rect(60, 30, frame.area());
                frame.render_widget(Clear, area);
                let overlay = Paragraph::new(filter_overlay_text(filter)).block(
                    Block::default()
                        .title(format!("filter {}", filter.column_name))
                        .borders(Borders::ALL),
                );
                frame.render_widget(overlay, area);
            }
        }
        AppMode::Help => {
            let area = centered_rect(80, 70, frame.area());
            frame.render_widget(Clear, area);
            let help = Paragraph::new(help_overlay_text())
                .block(Block::default().title("help").borders(Borders::ALL));
            frame.render_widget(help, area);
        }
        AppMode::Nav | AppMode::ConfirmDelete => {}
    }
}

fn title_text(page: &EditorPage) -> String {
    let Some(session) = page.session() else {
        return match page.route().selected_table() {
            Some(table) => format!("loading {table}…"),
            None => "no table selected | press t to pick one".to_owned(),
        };
    };

    let mut parts = vec![
        session.table().to_owned(),
        session.variant().label().to_owned(),
        format!("{} rows", session.row_count()),
    ];
    if let RowSource::Paged(paged) = session.source() {
        match paged.window() {
            Some(window) if !window.rows.is_empty() => parts.push(format!(
                "window {}-{}",
                window.start + 1,
                window.start + window.rows.len()
            )),
            Some(_) => parts.push("window empty".to_owned()),
            None => parts.push("window loading".to_owned()),
        }
    }
    if !session.filters().is_empty() {
        let filters = session
            .filters()
            .iter()
            .map(|filter| filter.describe())
            .collect::<Vec<_>>()
            .join(", ");
        parts.push(format!("filters: {filters}"));
    }
    parts.join(" | ")
}

fn footer_text(state: &AppState, page: &EditorPage, clock: Clock, loading: bool) -> String {
    let mut parts = vec![format!("[{}]", state.mode.label())];
    if loading {
        parts.push("loading…".to_owned());
    }
    if let Some(session) = page.session() {
        if let Some(label) = session.last_refresh_label(clock.wall) {
            parts.push(format!("refreshed {label}"));
        }
        if let Some(remaining) = session.delete_remaining(clock.instant) {
            parts.push(format!(
                "delete in {}s (y confirm, n cancel)",
                remaining.as_secs() + 1
            ));
        }
    }
    if let Some(notice) = &state.status {
        parts.push(notice.message.clone());
    }
    format!("{}\n{}", parts.join(" | "), mode_hints(state.mode))
}

fn mode_hints(mode: AppMode) -> &'static str {
    match mode {
        AppMode::Nav => {
            "t tables | a add | e edit | w save | d delete | r refresh | x clear new | / filter | ? help"
        }
        AppMode::PickTable => "j/k move | enter open | esc close",
        AppMode::EditCell => "type or up/down | enter apply | esc cancel",
        AppMode::FilterInput => "type expression | enter apply | esc cancel",
        AppMode::ConfirmDelete => "y delete | n or esc cancel",
        AppMode::Help => "any key closes",
    }
}

fn help_overlay_text() -> &'static str {
    "global: ctrl+q quit | ? help\n\
nav: j/k/h/l or arrows move | g/G first/last row | t pick table\n\
rows: a add | enter/e edit cell | w save new row | x clear new rows | r refresh\n\
delete: d request | y confirm | n/esc cancel (expires after 10s)\n\
view: / filter column | F clear filters | s sort (client-side) | ]/[ next/previous window (paged)\n\
edit: type value | up/down choose foreign key | enter apply | esc cancel\n\
filter: ~v contains | !~v not contains | =v | !=v | ^v starts | $v ends\n\
filter: <v <=v >v >=v (numbers) | empty | !empty | bare value contains (text) or equals (number)"
}

fn picker_overlay_text(page: &EditorPage, view_data: &ViewData) -> String {
    if page.tables().is_empty() {
        return "no tables loaded".to_owned();
    }
    page.tables()
        .iter()
        .enumerate()
        .map(|(index, table)| {
            let marker = if index == view_data.picker_selected {
                ">"
            } else {
                " "
            };
            format!("{marker} {table}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn editor_overlay_text(editor: &CellEditor) -> String {
    match &editor.input {
        EditorInput::Text(buffer) => format!("{buffer}▏\n\nempty input clears the cell"),
        EditorInput::Choice { choices, selected } => choices
            .iter()
            .enumerate()
            .map(|(index, choice)| {
                let marker = if index == *selected { ">" } else { " " };
                let label = if choice.value.is_null() {
                    "(none)".to_owned()
                } else {
                    format!("{} ({})", choice.label, choice.value.display())
                };
                format!("{marker} {label}")
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn filter_overlay_text(filter: &FilterInput) -> String {
    format!(
        "{}▏\n\n~v !~v =v !=v ^v $v <v <=v >v >=v empty !empty",
        filter.buffer
    )
}

fn header_label(session: &TableSession, column: usize) -> String {
    let Some(descriptor) = session.columns().schema.column(column) else {
        return String::new();
    };
    let mut label = descriptor.name.clone();
    if descriptor.is_key {
        label.push(' ');
        label.push_str(KEY_MARKER);
    }
    if descriptor.foreign_key_name.is_some() {
        label.push(' ');
        label.push_str(LINK_ARROW);
    }
    if let Some(sort) = session.sort().filter(|sort| sort.column == column) {
        label.push_str(match sort.direction {
            SortDirection::Asc => " ↑",
            SortDirection::Desc => " ↓",
        });
    }
    label
}

/// Display text per row: the new-row marker followed by one cell per column.
fn grid_cells(session: &TableSession) -> Vec<Vec<String>> {
    let columns = session.columns();
    session
        .display_rows()
        .into_iter()
        .map(|row| {
            let marker = if row.is_new() { NEW_ROW_MARKER } else { "" };
            let mut cells = vec![marker.to_owned()];
            cells.extend(row.cells.iter().enumerate().map(|(index, value)| {
                truncate_label(&columns.display_value(index, value), CELL_MAX_CHARS)
            }));
            cells
        })
        .collect()
}

fn render_table(frame: &mut ratatui::Frame<'_>, area: Rect, page: &EditorPage, view_data: &ViewData) {
    let Some(session) = page.session() else {
        let empty = Paragraph::new(String::new()).block(Block::default().borders(Borders::ALL));
        frame.render_widget(empty, area);
        return;
    };

    let column_count = session.columns().schema.columns.len();
    let mut widths = vec![Constraint::Length(1)];
    widths.extend(vec![Constraint::Min(8); column_count.max(1)]);

    let header_cells = std::iter::once(String::new())
        .chain((0..column_count).map(|column| header_label(session, column)))
        .map(|label| {
            Cell::from(label).style(
                Style::default()
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
            )
        });
    let header = Row::new(header_cells);

    let pending = session.pending_delete();
    let display_rows = session.display_rows();
    let rows = grid_cells(session)
        .into_iter()
        .enumerate()
        .map(|(row_index, cells)| {
            let selected_row = row_index == view_data.cursor_row;
            let doomed = pending.is_some() && display_rows.get(row_index).copied() == pending;
            let cells = cells
                .into_iter()
                .enumerate()
                .map(|(position, text)| {
                    let mut style = Style::default();
                    if position == 0 {
                        style = style.fg(Color::Green);
                    }
                    if doomed {
                        style = style.fg(Color::Red).add_modifier(Modifier::CROSSED_OUT);
                    }
                    if selected_row {
                        style = style.bg(Color::DarkGray);
                    }
                    if selected_row && position == view_data.cursor_col + 1 {
                        style = Style::default()
                            .fg(Color::Black)
                            .bg(Color::Cyan)
                            .add_modifier(Modifier::BOLD);
                    }
                    Cell::from(text).style(style)
                })
                .collect::<Vec<_>>();
            Row::new(cells)
        });

    let table = Table::new(rows, widths)
        .header(header)
        .column_spacing(1)
        .block(
            Block::default()
                .title(format!("{} ({} shown)", session.table(), session.display_len()))
                .borders(Borders::ALL),
        );
    frame.render_widget(table, area);
}

fn truncate_label(value: &str, max_chars: usize) -> String {
    let mut chars = value.chars();
    let truncated: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{truncated}…")
    } else {
        truncated
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
