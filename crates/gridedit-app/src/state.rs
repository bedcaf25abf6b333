// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::{Notice, TimerToken};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    Nav,
    PickTable,
    EditCell,
    FilterInput,
    ConfirmDelete,
    Help,
}

impl AppMode {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Nav => "NAV",
            Self::PickTable => "TABLES",
            Self::EditCell => "EDIT",
            Self::FilterInput => "FILTER",
            Self::ConfirmDelete => "DELETE?",
            Self::Help => "HELP",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
    pub mode: AppMode,
    pub status: Option<Notice>,
    status_token: TimerToken,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            mode: AppMode::Nav,
            status: None,
            status_token: TimerToken::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    OpenPicker,
    BeginEdit,
    BeginFilter,
    AwaitDeleteConfirm,
    ShowHelp,
    ExitToNav,
    ShowNotice(Notice),
    ClearStatus(TimerToken),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    ModeChanged(AppMode),
    /// The caller schedules a clear for `token`.
    StatusUpdated { notice: Notice, token: TimerToken },
    StatusCleared,
}

impl AppState {
    pub fn dispatch(&mut self, command: AppCommand) -> Vec<AppEvent> {
        match command {
            AppCommand::OpenPicker => self.enter(AppMode::PickTable),
            AppCommand::BeginEdit => self.enter(AppMode::EditCell),
            AppCommand::BeginFilter => self.enter(AppMode::FilterInput),
            AppCommand::AwaitDeleteConfirm => self.enter(AppMode::ConfirmDelete),
            AppCommand::ShowHelp => self.enter(AppMode::Help),
            AppCommand::ExitToNav => self.enter(AppMode::Nav),
            AppCommand::ShowNotice(notice) => vec![self.set_status(notice)],
            AppCommand::ClearStatus(token) => {
                // A newer notice owns the status line.
                if token != self.status_token || self.status.is_none() {
                    return Vec::new();
                }
                self.status = None;
                vec![AppEvent::StatusCleared]
            }
        }
    }

    fn enter(&mut self, mode: AppMode) -> Vec<AppEvent> {
        if self.mode == mode {
            return Vec::new();
        }
        self.mode = mode;
        vec![AppEvent::ModeChanged(mode)]
    }

    fn set_status(&mut self, notice: Notice) -> AppEvent {
        self.status_token = self.status_token.next();
        self.status = Some(notice.clone());
        AppEvent::StatusUpdated {
            notice,
            token: self.status_token,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AppCommand, AppEvent, AppMode, AppState};
    use crate::Notice;

    #[test]
    fn mode_transitions() {
        let mut state = AppState::default();

        let events = state.dispatch(AppCommand::OpenPicker);
        assert_eq!(state.mode, AppMode::PickTable);
        assert_eq!(events, vec![AppEvent::ModeChanged(AppMode::PickTable)]);

        state.dispatch(AppCommand::BeginEdit);
        assert_eq!(state.mode, AppMode::EditCell);

        state.dispatch(AppCommand::ExitToNav);
        assert_eq!(state.mode, AppMode::Nav);
        assert!(state.dispatch(AppCommand::ExitToNav).is_empty());
    }

    #[test]
    fn stale_clear_keeps_newer_notice() {
        let mut state = AppState::default();

        let first = state.dispatch(AppCommand::ShowNotice(Notice::info("one")));
        let [AppEvent::StatusUpdated { token: old, .. }] = first.as_slice() else {
            panic!("expected a status update, got {first:?}");
        };
        let old = *old;
        let second = state.dispatch(AppCommand::ShowNotice(Notice::error("two")));
        let [AppEvent::StatusUpdated { token: new, .. }] = second.as_slice() else {
            panic!("expected a status update, got {second:?}");
        };
        let new = *new;

        assert!(state.dispatch(AppCommand::ClearStatus(old)).is_empty());
        assert_eq!(state.status, Some(Notice::error("two")));

        assert_eq!(
            state.dispatch(AppCommand::ClearStatus(new)),
            vec![AppEvent::StatusCleared]
        );
        assert_eq!(state.status, None);
    }
}
