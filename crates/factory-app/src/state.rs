// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::{AppMode, FormKind, PageKind};

/// Blocking overlays that sit above whatever page is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overlay {
    None,
    SessionExpired,
    ConfirmLogout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
    pub mode: AppMode,
    pub active_page: PageKind,
    pub overlay: Overlay,
    pub status_line: Option<String>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            mode: AppMode::Nav,
            active_page: PageKind::Users,
            overlay: Overlay::None,
            status_line: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppCommand {
    NextPage,
    PrevPage,
    GoTo(PageKind),
    EnterSearch,
    ExitToNav,
    OpenForm(FormKind),
    SessionExpired,
    RequestLogout,
    ConfirmLogout,
    CancelLogout,
    ClearStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    ModeChanged(AppMode),
    PageChanged(PageKind),
    OverlayChanged(Overlay),
    StatusUpdated(String),
    StatusCleared,
}

impl AppState {
    pub fn dispatch(&mut self, command: AppCommand) -> Vec<AppEvent> {
        match command {
            AppCommand::NextPage => self.rotate_page(1),
            AppCommand::PrevPage => self.rotate_page(-1),
            AppCommand::GoTo(page) => {
                if page == self.active_page {
                    return Vec::new();
                }
                self.active_page = page;
                self.mode = AppMode::Nav;
                vec![AppEvent::PageChanged(page)]
            }
            AppCommand::EnterSearch => {
                self.mode = AppMode::Search;
                vec![AppEvent::ModeChanged(self.mode)]
            }
            AppCommand::ExitToNav => {
                self.mode = AppMode::Nav;
                vec![AppEvent::ModeChanged(self.mode)]
            }
            AppCommand::OpenForm(kind) => {
                if self.overlay == Overlay::SessionExpired && kind != FormKind::Login {
                    return vec![self.set_status("session expired -- log in again")];
                }
                self.mode = AppMode::Form(kind);
                vec![AppEvent::ModeChanged(self.mode)]
            }
            AppCommand::SessionExpired => {
                self.overlay = Overlay::SessionExpired;
                vec![
                    AppEvent::OverlayChanged(self.overlay),
                    self.set_status("session expired"),
                ]
            }
            AppCommand::RequestLogout => {
                self.overlay = Overlay::ConfirmLogout;
                vec![AppEvent::OverlayChanged(self.overlay)]
            }
            AppCommand::ConfirmLogout => {
                if self.overlay != Overlay::ConfirmLogout {
                    return Vec::new();
                }
                self.overlay = Overlay::None;
                self.mode = AppMode::Form(FormKind::Login);
                vec![
                    AppEvent::OverlayChanged(self.overlay),
                    AppEvent::ModeChanged(self.mode),
                    self.set_status("signed out"),
                ]
            }
            AppCommand::CancelLogout => {
                if self.overlay != Overlay::ConfirmLogout {
                    return Vec::new();
                }
                self.overlay = Overlay::None;
                vec![AppEvent::OverlayChanged(self.overlay)]
            }
            AppCommand::ClearStatus => {
                self.status_line = None;
                vec![AppEvent::StatusCleared]
            }
        }
    }

    /// Called once a login succeeds; drops any session overlay.
    pub fn signed_in(&mut self) -> Vec<AppEvent> {
        self.overlay = Overlay::None;
        self.mode = AppMode::Nav;
        vec![
            AppEvent::OverlayChanged(self.overlay),
            AppEvent::ModeChanged(self.mode),
            self.set_status("signed in"),
        ]
    }

    pub fn notify(&mut self, message: &str) -> AppEvent {
        self.set_status(message)
    }

    fn rotate_page(&mut self, delta: isize) -> Vec<AppEvent> {
        let pages = PageKind::ALL;
        let current = pages
            .iter()
            .position(|page| *page == self.active_page)
            .unwrap_or(0) as isize;
        let len = pages.len() as isize;
        let next = (current + delta).rem_euclid(len) as usize;
        self.active_page = pages[next];
        vec![AppEvent::PageChanged(self.active_page)]
    }

    fn set_status(&mut self, message: &str) -> AppEvent {
        self.status_line = Some(message.to_owned());
        AppEvent::StatusUpdated(message.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::{AppCommand, AppEvent, AppState, Overlay};
    use crate::{AppMode, FormKind, PageKind};

    #[test]
    fn page_rotation_wraps() {
        let mut state = AppState {
            active_page: PageKind::Jobs,
            ..AppState::default()
        };

        let events = state.dispatch(AppCommand::NextPage);
        assert_eq!(state.active_page, PageKind::Users);
        assert_eq!(events, vec![AppEvent::PageChanged(PageKind::Users)]);

        state.dispatch(AppCommand::PrevPage);
        assert_eq!(state.active_page, PageKind::Jobs);
    }

    #[test]
    fn expired_session_blocks_other_forms() {
        let mut state = AppState::default();

        state.dispatch(AppCommand::SessionExpired);
        assert_eq!(state.overlay, Overlay::SessionExpired);

        let events = state.dispatch(AppCommand::OpenForm(FormKind::AddUser));
        assert_eq!(state.mode, AppMode::Nav);
        assert!(matches!(events.as_slice(), [AppEvent::StatusUpdated(_)]));

        state.dispatch(AppCommand::OpenForm(FormKind::Login));
        assert_eq!(state.mode, AppMode::Form(FormKind::Login));

        state.signed_in();
        assert_eq!(state.overlay, Overlay::None);
        assert_eq!(state.mode, AppMode::Nav);
    }

    #[test]
    fn logout_confirmation_can_be_cancelled() {
        let mut state = AppState::default();

        state.dispatch(AppCommand::RequestLogout);
        assert_eq!(state.overlay, Overlay::ConfirmLogout);

        let events = state.dispatch(AppCommand::CancelLogout);
        assert_eq!(state.overlay, Overlay::None);
        assert_eq!(events, vec![AppEvent::OverlayChanged(Overlay::None)]);
    }

    #[test]
    fn confirmed_logout_lands_on_the_login_form() {
        let mut state = AppState::default();

        assert!(state.dispatch(AppCommand::ConfirmLogout).is_empty());

        state.dispatch(AppCommand::RequestLogout);
        state.dispatch(AppCommand::ConfirmLogout);
        assert_eq!(state.overlay, Overlay::None);
        assert_eq!(state.mode, AppMode::Form(FormKind::Login));
        assert_eq!(state.status_line.as_deref(), Some("signed out"));
    }

    #[test]
    fn search_mode_round_trip() {
        let mut state = AppState::default();

        state.dispatch(AppCommand::EnterSearch);
        assert_eq!(state.mode, AppMode::Search);

        state.dispatch(AppCommand::ExitToNav);
        assert_eq!(state.mode, AppMode::Nav);
    }
}
