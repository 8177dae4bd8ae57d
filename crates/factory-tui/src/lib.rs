// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod form;

use anyhow::{Context, Result, anyhow};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use factory_app::{
    ALL_SENTINEL, AppCommand, AppEvent, AppMode, AppState, AuthorizationError, Claims,
    ColumnConfig, ColumnSpec, Company, CompanyOption, DEFAULT_PAGE_SIZE, DateRangeInput,
    FieldErrors, FormKind, FormPayload, Item, Job, LoadOutcome, LoginFormInput, Overlay,
    PAGE_SIZE_OPTIONS, PageController, PageKind, Permission, Record, RemoteError, RequestTicket,
    Role, RoleId, SessionStatus, SortDirection, TableView, Team, User, UserAction,
    authorize_user_action, column_label, derive_columns, format_date,
};
use form::FormUiState;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Tabs};
use std::collections::BTreeMap;
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

const FILTER_MARK: &str = "▼";
const ITEM_DATE_FIELD: &str = "qcDate";
const HALF_PAGE_ROWS: isize = 5;

/// A page's full collection as fetched from the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum PageData {
    Users(Vec<User>),
    Companies(Vec<Company>),
    Roles(Vec<Role>),
    Items(Vec<Item>),
    Jobs(Vec<Job>),
}

/// Choice lists the user form needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormOptions {
    pub roles: Vec<Role>,
    pub teams: Vec<Team>,
    pub companies: Vec<CompanyOption>,
}

pub trait AppRuntime {
    fn session_status(&mut self) -> SessionStatus;
    fn claims(&mut self) -> Option<Claims>;
    fn current_role(&mut self) -> Option<String>;
    fn login(&mut self, input: &LoginFormInput) -> Result<(), RemoteError>;
    fn logout(&mut self) -> Result<()>;
    fn clear_session(&mut self) -> Result<()>;
    fn load_page(&mut self, page: PageKind) -> Result<PageData, RemoteError>;
    fn user_details(&mut self, id: &str) -> Result<User, RemoteError>;
    fn my_profile(&mut self) -> Result<User, RemoteError>;
    fn load_form_options(&mut self) -> Result<FormOptions, RemoteError>;
    fn load_role_permissions(
        &mut self,
        role_id: RoleId,
    ) -> Result<(Role, Vec<Permission>), RemoteError>;
    fn submit_form(&mut self, payload: &FormPayload, target: Option<&str>)
    -> Result<(), RemoteError>;
    fn delete_record(&mut self, page: PageKind, id: &str) -> Result<(), RemoteError>;
    fn load_column_config(&mut self) -> Result<Option<String>, RemoteError>;
    fn save_column_config(&mut self, stored: &str) -> Result<(), RemoteError>;
    fn filter_items(
        &mut self,
        filters: &BTreeMap<String, String>,
    ) -> Result<Vec<Item>, RemoteError>;
    fn spawn_item_filter(
        &mut self,
        ticket: RequestTicket,
        filters: BTreeMap<String, String>,
        tx: Sender<InternalEvent>,
    ) -> Result<()> {
        let result = self.filter_items(&filters);
        tx.send(InternalEvent::ItemsFiltered { ticket, result })
            .map_err(|_| anyhow!("item filter channel closed"))?;
        Ok(())
    }
    fn login_hint(&mut self) -> Option<String> {
        None
    }
    fn page_size(&self) -> usize {
        DEFAULT_PAGE_SIZE
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InternalEvent {
    ClearStatus {
        token: u64,
    },
    ItemsFiltered {
        ticket: RequestTicket,
        result: Result<Vec<Item>, RemoteError>,
    },
}

/// One table view per page, each driven through `PageController`.
#[derive(Debug, Clone, Default)]
struct Pages {
    users: TableView<User>,
    companies: TableView<Company>,
    roles: TableView<Role>,
    items: TableView<Item>,
    jobs: TableView<Job>,
    loaded: Vec<PageKind>,
}

impl Pages {
    fn new(page_size: usize) -> Self {
        Self {
            users: TableView::new(page_size),
            companies: TableView::new(page_size),
            roles: TableView::new(page_size),
            items: TableView::new(page_size),
            jobs: TableView::new(page_size),
            loaded: Vec::new(),
        }
    }

    fn controller(&self, page: PageKind) -> &dyn PageController {
        match page {
            PageKind::Users => &self.users,
            PageKind::Companies => &self.companies,
            PageKind::Roles => &self.roles,
            PageKind::Items => &self.items,
            PageKind::Jobs => &self.jobs,
        }
    }

    fn controller_mut(&mut self, page: PageKind) -> &mut dyn PageController {
        match page {
            PageKind::Users => &mut self.users,
            PageKind::Companies => &mut self.companies,
            PageKind::Roles => &mut self.roles,
            PageKind::Items => &mut self.items,
            PageKind::Jobs => &mut self.jobs,
        }
    }

    fn land(
        &mut self,
        page: PageKind,
        ticket: RequestTicket,
        result: Result<PageData, RemoteError>,
    ) -> LoadOutcome {
        match result {
            Ok(PageData::Users(rows)) => self.users.apply_response(ticket, Ok(rows)),
            Ok(PageData::Companies(rows)) => self.companies.apply_response(ticket, Ok(rows)),
            Ok(PageData::Roles(rows)) => self.roles.apply_response(ticket, Ok(rows)),
            Ok(PageData::Items(rows)) => self.items.apply_response(ticket, Ok(rows)),
            Ok(PageData::Jobs(rows)) => self.jobs.apply_response(ticket, Ok(rows)),
            Err(error) => match page {
                PageKind::Users => self.users.apply_response(ticket, Err(error)),
                PageKind::Companies => self.companies.apply_response(ticket, Err(error)),
                PageKind::Roles => self.roles.apply_response(ticket, Err(error)),
                PageKind::Items => self.items.apply_response(ticket, Err(error)),
                PageKind::Jobs => self.jobs.apply_response(ticket, Err(error)),
            },
        }
    }

    fn is_loaded(&self, page: PageKind) -> bool {
        self.loaded.contains(&page)
    }

    fn mark_loaded(&mut self, page: PageKind) {
        if !self.is_loaded(page) {
            self.loaded.push(page);
        }
    }

    fn mark_stale(&mut self, page: PageKind) {
        self.loaded.retain(|loaded| *loaded != page);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct TableUiState {
    selected_row: usize,
    selected_col: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableCommand {
    MoveRow(isize),
    MoveColumn(isize),
    MoveHalfPageDown,
    MoveHalfPageUp,
    JumpFirstRow,
    JumpLastRow,
    CycleSort,
    ClearSort,
    NextPage,
    PrevPage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TableStatus {
    SortUnavailable(&'static str),
    SortAsc(&'static str),
    SortDesc(&'static str),
    SortOff(&'static str),
    SortCleared,
    PageOf { page: usize, pages: usize },
    FirstPage,
    LastPage,
}

impl TableStatus {
    fn message(self) -> String {
        match self {
            Self::SortUnavailable(column) => format!("{column} is not sortable"),
            Self::SortAsc(column) => format!("sort {column} asc"),
            Self::SortDesc(column) => format!("sort {column} desc"),
            Self::SortOff(column) => format!("sort {column} off"),
            Self::SortCleared => "sort cleared".to_owned(),
            Self::PageOf { page, pages } => format!("page {page} of {pages}"),
            Self::FirstPage => "already on the first page".to_owned(),
            Self::LastPage => "already on the last page".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TableEvent {
    CursorUpdated,
    Status(TableStatus),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct ColumnPickerUiState {
    visible: bool,
    config: ColumnConfig,
    query: String,
    cursor: usize,
}

impl ColumnPickerUiState {
    fn matches(&self) -> Vec<String> {
        self.config
            .search(&self.query)
            .into_iter()
            .map(str::to_owned)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct DateRangeUiState {
    visible: bool,
    input: DateRangeInput,
    editing_to: bool,
    errors: FieldErrors,
}

impl DateRangeUiState {
    fn focused_mut(&mut self) -> &mut String {
        if self.editing_to {
            &mut self.input.to
        } else {
            &mut self.input.from
        }
    }
}

/// One user shown read-only, either a Users row or the signed-in profile.
#[derive(Debug, Clone, PartialEq, Eq)]
struct UserDetailView {
    title: &'static str,
    user: User,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingDelete {
    page: PageKind,
    id: String,
    label: String,
}

#[derive(Debug, Clone, Default)]
struct ViewData {
    pages: Pages,
    table_state: TableUiState,
    form: Option<FormUiState>,
    column_picker: ColumnPickerUiState,
    date_range: DateRangeUiState,
    detail: Option<UserDetailView>,
    item_columns: ColumnConfig,
    item_columns_loaded: bool,
    item_filter_options: BTreeMap<String, Vec<String>>,
    pending_delete: Option<PendingDelete>,
    help_visible: bool,
    claims: Option<Claims>,
    current_role: Option<String>,
    status_token: u64,
}

pub fn run_app<R: AppRuntime>(state: &mut AppState, runtime: &mut R) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen).context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let mut view_data = ViewData::default();
    let (internal_tx, internal_rx) = mpsc::channel();

    start_session(state, runtime, &mut view_data, &internal_tx);

    let mut result = Ok(());
    loop {
        process_internal_events(state, runtime, &mut view_data, &internal_tx, &internal_rx);

        if let Err(error) = terminal.draw(|frame| render(frame, state, &view_data)) {
            result = Err(error).context("draw frame");
            break;
        }

        let has_event = event::poll(Duration::from_millis(120)).context("poll event")?;
        if has_event {
            match event::read().context("read event")? {
                Event::Key(key) => {
                    if handle_key_event(state, runtime, &mut view_data, &internal_tx, key) {
                        break;
                    }
                }
                Event::Resize(_, _) => {}
                _ => {}
            }
        }
    }

    disable_raw_mode().context("disable raw mode")?;
    execute!(io::stdout(), terminal::LeaveAlternateScreen).context("leave alternate screen")?;
    result
}

fn start_session<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    view_data.pages = Pages::new(runtime.page_size());
    refresh_identity(runtime, view_data);
    load_page(state, runtime, view_data, internal_tx, state.active_page);
}

fn refresh_identity<R: AppRuntime>(runtime: &mut R, view_data: &mut ViewData) {
    view_data.claims = runtime.claims();
    view_data.current_role = runtime.current_role();
}

fn process_internal_events<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    rx: &Receiver<InternalEvent>,
) {
    while let Ok(event) = rx.try_recv() {
        match event {
            InternalEvent::ClearStatus { token } if token == view_data.status_token => {
                state.dispatch(AppCommand::ClearStatus);
            }
            InternalEvent::ClearStatus { .. } => {}
            InternalEvent::ItemsFiltered { ticket, result } => {
                let outcome = view_data.pages.items.apply_server_filter(ticket, result);
                if let LoadOutcome::Loaded { count } = outcome {
                    emit_status(state, view_data, tx, format!("{count} items match"));
                }
                after_load(state, runtime, view_data, PageKind::Items, outcome);
            }
        }
    }
}

fn schedule_status_clear(internal_tx: &Sender<InternalEvent>, token: u64) {
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_secs(4));
        let _ = sender.send(InternalEvent::ClearStatus { token });
    });
}

fn emit_status(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    message: impl Into<String>,
) {
    let message = message.into();
    state.notify(&message);
    view_data.status_token = view_data.status_token.saturating_add(1);
    schedule_status_clear(internal_tx, view_data.status_token);
}

fn handle_key_event<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    if key.code == KeyCode::Char('q') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return true;
    }

    if view_data.help_visible {
        if key.code == KeyCode::Esc || key.code == KeyCode::Char('?') {
            view_data.help_visible = false;
            emit_status(state, view_data, internal_tx, "help hidden");
        }
        return false;
    }

    if view_data.form.is_some() {
        handle_form_key(state, runtime, view_data, internal_tx, key);
        return false;
    }

    match state.overlay {
        Overlay::SessionExpired => {
            if key.code == KeyCode::Enter {
                open_login(state, runtime, view_data);
            }
            return false;
        }
        Overlay::ConfirmLogout => {
            handle_logout_key(state, runtime, view_data, internal_tx, key);
            return false;
        }
        Overlay::None => {}
    }

    if view_data.column_picker.visible {
        handle_column_picker_key(state, runtime, view_data, internal_tx, key);
        return false;
    }

    if view_data.detail.is_some() {
        if matches!(key.code, KeyCode::Esc | KeyCode::Enter | KeyCode::Char('i')) {
            view_data.detail = None;
        }
        return false;
    }

    if view_data.date_range.visible {
        handle_date_range_key(state, view_data, internal_tx, key);
        return false;
    }

    if let Some(pending) = view_data.pending_delete.take() {
        handle_delete_confirmation(state, runtime, view_data, internal_tx, pending, key);
        return false;
    }

    if state.mode == AppMode::Search {
        handle_search_key(state, view_data, key);
        return false;
    }

    if handle_table_key(state, view_data, internal_tx, key) {
        return false;
    }

    match (key.code, key.modifiers) {
        (KeyCode::Char('f'), KeyModifiers::NONE) | (KeyCode::Tab, _) => {
            switch_page(state, runtime, view_data, internal_tx, AppCommand::NextPage);
        }
        (KeyCode::Char('b'), KeyModifiers::NONE) | (KeyCode::BackTab, _) => {
            switch_page(state, runtime, view_data, internal_tx, AppCommand::PrevPage);
        }
        (KeyCode::Char(digit @ '1'..='5'), KeyModifiers::NONE) => {
            let index = digit as usize - '1' as usize;
            if let Some(page) = PageKind::ALL.get(index) {
                switch_page(state, runtime, view_data, internal_tx, AppCommand::GoTo(*page));
            }
        }
        (KeyCode::Char('/'), _) => {
            state.dispatch(AppCommand::EnterSearch);
        }
        (KeyCode::Esc, _) => {
            let page = state.active_page;
            if !view_data.pages.controller(page).search().is_empty() {
                view_data.pages.controller_mut(page).set_search("");
                clamp_table_cursor(state, view_data);
                emit_status(state, view_data, internal_tx, "search cleared");
            }
        }
        (KeyCode::Char('F'), _) => cycle_filter(state, runtime, view_data, internal_tx),
        (KeyCode::Char('D'), _) => open_date_range(state, view_data, internal_tx),
        (KeyCode::Enter, _) => open_user_details(state, runtime, view_data, internal_tx),
        (KeyCode::Char('i'), KeyModifiers::NONE) => {
            open_profile(state, runtime, view_data, internal_tx);
        }
        (KeyCode::Char('+'), _) | (KeyCode::Char('='), _) => {
            step_page_size(state, view_data, internal_tx, 1);
        }
        (KeyCode::Char('-'), _) => step_page_size(state, view_data, internal_tx, -1),
        (KeyCode::Char('r'), KeyModifiers::NONE) => {
            let page = state.active_page;
            load_page(state, runtime, view_data, internal_tx, page);
            if view_data.pages.controller(page).error().is_none() && state.overlay == Overlay::None
            {
                emit_status(state, view_data, internal_tx, format!("{} refreshed", page.label()));
            }
        }
        (KeyCode::Char('a'), KeyModifiers::NONE) => {
            open_add_form(state, runtime, view_data, internal_tx);
        }
        (KeyCode::Char('e'), KeyModifiers::NONE) => {
            open_edit_form(state, runtime, view_data, internal_tx);
        }
        (KeyCode::Char('d'), KeyModifiers::NONE) => {
            request_delete(state, view_data, internal_tx);
        }
        (KeyCode::Char('P'), _) => open_change_password(state, view_data, internal_tx),
        (KeyCode::Char('c'), KeyModifiers::NONE) => {
            open_column_picker(state, runtime, view_data, internal_tx);
        }
        (KeyCode::Char('L'), _) => {
            state.dispatch(AppCommand::RequestLogout);
        }
        (KeyCode::Char('?'), _) => {
            view_data.help_visible = true;
            emit_status(state, view_data, internal_tx, "help shown");
        }
        _ => {}
    }
    false
}

fn switch_page<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    command: AppCommand,
) {
    let events = state.dispatch(command);
    let Some(page) = events.iter().find_map(|event| match event {
        AppEvent::PageChanged(page) => Some(*page),
        _ => None,
    }) else {
        return;
    };
    view_data.table_state = TableUiState::default();
    if !view_data.pages.is_loaded(page) {
        load_page(state, runtime, view_data, internal_tx, page);
    }
}

/// Pulls a page's whole collection, or re-sends the active Items server filter.
fn load_page<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    page: PageKind,
) {
    match runtime.session_status() {
        SessionStatus::Missing => {
            open_login(state, runtime, view_data);
            return;
        }
        SessionStatus::Expired => {
            expire_session(state, runtime, view_data);
            return;
        }
        SessionStatus::Active(_) => {}
    }

    if page == PageKind::Items {
        if !view_data.item_columns_loaded {
            load_item_columns(runtime, view_data);
        }
        if !view_data.pages.items.server_filters().is_empty() {
            let ticket = view_data.pages.items.begin_request();
            let filters = view_data.pages.items.server_filters().clone();
            send_item_filter(state, runtime, view_data, internal_tx, ticket, filters);
            return;
        }
    }

    let ticket = view_data.pages.controller_mut(page).begin_request();
    let result = runtime.load_page(page);
    let outcome = view_data.pages.land(page, ticket, result);
    if page == PageKind::Items && matches!(outcome, LoadOutcome::Loaded { .. }) {
        cache_item_filter_options(view_data);
    }
    after_load(state, runtime, view_data, page, outcome);
}

/// Hands the filter to the runtime. If it cannot even be sent, the failure
/// lands on the ticket so the page stops loading.
fn send_item_filter<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    ticket: RequestTicket,
    filters: BTreeMap<String, String>,
) {
    let Err(error) = runtime.spawn_item_filter(ticket, filters, internal_tx.clone()) else {
        return;
    };
    warn!(%error, "item filter could not be sent");
    let failure = RemoteError::network("item filter", format!("{error:#}"));
    let outcome = view_data.pages.items.apply_server_filter(ticket, Err(failure));
    emit_status(
        state,
        view_data,
        internal_tx,
        format!("item filter failed: {error:#}"),
    );
    after_load(state, runtime, view_data, PageKind::Items, outcome);
}

fn after_load<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    page: PageKind,
    outcome: LoadOutcome,
) {
    match outcome {
        LoadOutcome::Loaded { count } => {
            info!(page = page.label(), count, "page loaded");
            view_data.pages.mark_loaded(page);
            clamp_table_cursor(state, view_data);
        }
        LoadOutcome::Failed {
            unauthorized: true,
            ..
        } => expire_session(state, runtime, view_data),
        LoadOutcome::Failed { .. } | LoadOutcome::Stale => {}
    }
}

fn item_column_keys() -> Vec<String> {
    derive_columns(Item::COLUMNS.iter().map(|column| column.key))
}

fn load_item_columns<R: AppRuntime>(runtime: &mut R, view_data: &mut ViewData) {
    match runtime.load_column_config() {
        Ok(stored) => {
            view_data.item_columns = ColumnConfig::from_stored(stored.as_deref(), item_column_keys());
            view_data.item_columns_loaded = true;
        }
        Err(error) => {
            warn!(%error, "column config unavailable, showing every column");
            view_data.item_columns = ColumnConfig::new(item_column_keys());
        }
    }
}

/// Filter choices come from the unfiltered collection so a server-narrowed
/// list never hides the other values.
fn cache_item_filter_options(view_data: &mut ViewData) {
    view_data.item_filter_options = Item::COLUMNS
        .iter()
        .filter(|column| column.filterable)
        .map(|column| {
            (
                column.key.to_owned(),
                view_data.pages.items.filter_options(column.key),
            )
        })
        .collect();
}

fn open_login<R: AppRuntime>(state: &mut AppState, runtime: &mut R, view_data: &mut ViewData) {
    let hint = runtime.login_hint().unwrap_or_default();
    view_data.form = Some(FormUiState::login(&hint));
    state.dispatch(AppCommand::OpenForm(FormKind::Login));
}

fn expire_session<R: AppRuntime>(state: &mut AppState, runtime: &mut R, view_data: &mut ViewData) {
    if let Err(error) = runtime.clear_session() {
        warn!(error = %format!("{error:#}"), "clearing expired session failed");
    }
    view_data.form = None;
    view_data.column_picker = ColumnPickerUiState::default();
    view_data.pending_delete = None;
    view_data.claims = None;
    view_data.current_role = None;
    state.dispatch(AppCommand::ExitToNav);
    state.dispatch(AppCommand::SessionExpired);
}

fn reset_signed_in_view<R: AppRuntime>(runtime: &mut R, view_data: &mut ViewData) {
    view_data.pages = Pages::new(runtime.page_size());
    view_data.table_state = TableUiState::default();
    view_data.item_columns = ColumnConfig::default();
    view_data.item_columns_loaded = false;
    view_data.item_filter_options.clear();
    view_data.pending_delete = None;
    view_data.column_picker = ColumnPickerUiState::default();
    refresh_identity(runtime, view_data);
}

fn handle_remote_error<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    error: &RemoteError,
) {
    if error.is_unauthorized() {
        expire_session(state, runtime, view_data);
    } else {
        emit_status(state, view_data, internal_tx, error.user_message());
    }
}

fn handle_logout_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    match key.code {
        KeyCode::Char('y') | KeyCode::Char('Y') => {
            if let Err(error) = runtime.logout() {
                warn!(error = %format!("{error:#}"), "logout failed");
            }
            state.dispatch(AppCommand::ConfirmLogout);
            reset_signed_in_view(runtime, view_data);
            let hint = runtime.login_hint().unwrap_or_default();
            view_data.form = Some(FormUiState::login(&hint));
            emit_status(state, view_data, internal_tx, "signed out");
        }
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
            state.dispatch(AppCommand::CancelLogout);
            emit_status(state, view_data, internal_tx, "logout canceled");
        }
        _ => {}
    }
}

fn handle_search_key(state: &mut AppState, view_data: &mut ViewData, key: KeyEvent) {
    let page = state.active_page;
    let mut query = view_data.pages.controller(page).search().to_owned();
    match key.code {
        KeyCode::Enter => {
            state.dispatch(AppCommand::ExitToNav);
            return;
        }
        KeyCode::Esc => {
            query.clear();
            state.dispatch(AppCommand::ExitToNav);
        }
        KeyCode::Backspace => {
            query.pop();
        }
        KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => query.push(ch),
        _ => return,
    }
    view_data.pages.controller_mut(page).set_search(&query);
    view_data.table_state.selected_row = 0;
}

fn handle_table_key(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    if state.mode != AppMode::Nav {
        return false;
    }
    let Some(command) = table_command_for_key(key) else {
        return false;
    };
    let event = apply_table_command(state, view_data, command);
    if let TableEvent::Status(status) = event {
        emit_status(state, view_data, internal_tx, status.message());
    }
    true
}

fn table_command_for_key(key: KeyEvent) -> Option<TableCommand> {
    match (key.code, key.modifiers) {
        (KeyCode::Char('j'), _) | (KeyCode::Down, _) => Some(TableCommand::MoveRow(1)),
        (KeyCode::Char('k'), _) | (KeyCode::Up, _) => Some(TableCommand::MoveRow(-1)),
        (KeyCode::Char('h'), _) | (KeyCode::Left, _) => Some(TableCommand::MoveColumn(-1)),
        (KeyCode::Char('l'), _) | (KeyCode::Right, _) => Some(TableCommand::MoveColumn(1)),
        (KeyCode::Char('d'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
            Some(TableCommand::MoveHalfPageDown)
        }
        (KeyCode::Char('u'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
            Some(TableCommand::MoveHalfPageUp)
        }
        (KeyCode::Char('g'), _) => Some(TableCommand::JumpFirstRow),
        (KeyCode::Char('G'), _) => Some(TableCommand::JumpLastRow),
        (KeyCode::Char('s'), KeyModifiers::NONE) => Some(TableCommand::CycleSort),
        (KeyCode::Char('S'), _) => Some(TableCommand::ClearSort),
        (KeyCode::Char('n'), KeyModifiers::NONE) | (KeyCode::PageDown, _) => {
            Some(TableCommand::NextPage)
        }
        (KeyCode::Char('p'), KeyModifiers::NONE) | (KeyCode::PageUp, _) => {
            Some(TableCommand::PrevPage)
        }
        _ => None,
    }
}

fn apply_table_command(
    state: &AppState,
    view_data: &mut ViewData,
    command: TableCommand,
) -> TableEvent {
    let page = state.active_page;
    match command {
        TableCommand::MoveRow(delta) => {
            move_row(state, view_data, delta);
            TableEvent::CursorUpdated
        }
        TableCommand::MoveColumn(delta) => {
            move_col(state, view_data, delta);
            TableEvent::CursorUpdated
        }
        TableCommand::MoveHalfPageDown => {
            move_row(state, view_data, HALF_PAGE_ROWS);
            TableEvent::CursorUpdated
        }
        TableCommand::MoveHalfPageUp => {
            move_row(state, view_data, -HALF_PAGE_ROWS);
            TableEvent::CursorUpdated
        }
        TableCommand::JumpFirstRow => {
            view_data.table_state.selected_row = 0;
            TableEvent::CursorUpdated
        }
        TableCommand::JumpLastRow => {
            let rows = view_data.pages.controller(page).visible_ids().len();
            view_data.table_state.selected_row = rows.saturating_sub(1);
            TableEvent::CursorUpdated
        }
        TableCommand::CycleSort => {
            let Some(column) = selected_column(state, view_data) else {
                return TableEvent::CursorUpdated;
            };
            if !column.sortable {
                return TableEvent::Status(TableStatus::SortUnavailable(column.label));
            }
            let status = match view_data.pages.controller_mut(page).cycle_sort(column.key) {
                Some(SortDirection::Asc) => TableStatus::SortAsc(column.label),
                Some(SortDirection::Desc) => TableStatus::SortDesc(column.label),
                None => TableStatus::SortOff(column.label),
            };
            clamp_table_cursor(state, view_data);
            TableEvent::Status(status)
        }
        TableCommand::ClearSort => {
            view_data.pages.controller_mut(page).clear_sort();
            clamp_table_cursor(state, view_data);
            TableEvent::Status(TableStatus::SortCleared)
        }
        TableCommand::NextPage => {
            let controller = view_data.pages.controller_mut(page);
            let pages = controller.page_count().max(1);
            let index = controller.page_index();
            if index + 1 >= pages {
                return TableEvent::Status(TableStatus::LastPage);
            }
            controller.set_page(index + 1);
            view_data.table_state.selected_row = 0;
            TableEvent::Status(TableStatus::PageOf {
                page: index + 2,
                pages,
            })
        }
        TableCommand::PrevPage => {
            let controller = view_data.pages.controller_mut(page);
            let pages = controller.page_count().max(1);
            let index = controller.page_index().min(pages - 1);
            if index == 0 {
                return TableEvent::Status(TableStatus::FirstPage);
            }
            controller.set_page(index - 1);
            view_data.table_state.selected_row = 0;
            TableEvent::Status(TableStatus::PageOf { page: index, pages })
        }
    }
}

fn move_row(state: &AppState, view_data: &mut ViewData, delta: isize) {
    let rows = view_data
        .pages
        .controller(state.active_page)
        .visible_ids()
        .len();
    if rows == 0 {
        view_data.table_state.selected_row = 0;
        return;
    }
    let current = view_data.table_state.selected_row;
    let next = if delta.is_negative() {
        current.saturating_sub(delta.unsigned_abs())
    } else {
        current.saturating_add(delta as usize)
    };
    view_data.table_state.selected_row = next.min(rows - 1);
}

fn move_col(state: &AppState, view_data: &mut ViewData, delta: isize) {
    let columns = visible_column_indices(state.active_page, view_data).len();
    if columns == 0 {
        view_data.table_state.selected_col = 0;
        return;
    }
    let current = view_data.table_state.selected_col;
    let next = if delta.is_negative() {
        current.saturating_sub(delta.unsigned_abs())
    } else {
        current.saturating_add(delta as usize)
    };
    view_data.table_state.selected_col = next.min(columns - 1);
}

fn clamp_table_cursor(state: &AppState, view_data: &mut ViewData) {
    let rows = view_data
        .pages
        .controller(state.active_page)
        .visible_ids()
        .len();
    let columns = visible_column_indices(state.active_page, view_data).len();
    let table_state = &mut view_data.table_state;
    table_state.selected_row = table_state.selected_row.min(rows.saturating_sub(1));
    table_state.selected_col = table_state.selected_col.min(columns.saturating_sub(1));
}

/// Indices into the page's column list, in display order. Items follow the
/// saved column config when it selects anything.
fn visible_column_indices(page: PageKind, view_data: &ViewData) -> Vec<usize> {
    let columns = view_data.pages.controller(page).columns();
    if page == PageKind::Items {
        let picked: Vec<usize> = view_data
            .item_columns
            .selected()
            .iter()
            .filter_map(|key| columns.iter().position(|column| column.key == key))
            .collect();
        if !picked.is_empty() {
            return picked;
        }
    }
    (0..columns.len()).collect()
}

fn selected_column(state: &AppState, view_data: &ViewData) -> Option<&'static ColumnSpec> {
    let columns = view_data.pages.controller(state.active_page).columns();
    visible_column_indices(state.active_page, view_data)
        .get(view_data.table_state.selected_col)
        .and_then(|index| columns.get(*index))
}

fn selected_row_id(state: &AppState, view_data: &ViewData) -> Option<String> {
    view_data
        .pages
        .controller(state.active_page)
        .visible_ids()
        .into_iter()
        .nth(view_data.table_state.selected_row)
}

fn active_filter_value(view_data: &ViewData, page: PageKind, key: &str) -> Option<String> {
    if page == PageKind::Items {
        return view_data.pages.items.server_filters().get(key).cloned();
    }
    view_data
        .pages
        .controller(page)
        .filter_value(key)
        .map(str::to_owned)
}

fn next_filter_value(options: &[String], current: Option<&str>) -> String {
    let current = current.unwrap_or(ALL_SENTINEL);
    let index = options
        .iter()
        .position(|option| option == current)
        .map_or(0, |index| (index + 1) % options.len());
    options
        .get(index)
        .cloned()
        .unwrap_or_else(|| ALL_SENTINEL.to_owned())
}

/// Steps the selected column's filter through `All` and its distinct values.
fn cycle_filter<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let page = state.active_page;
    let Some(column) = selected_column(state, view_data) else {
        return;
    };
    if !column.filterable {
        emit_status(
            state,
            view_data,
            internal_tx,
            format!("{} has no filter", column.label),
        );
        return;
    }

    let current = active_filter_value(view_data, page, column.key);
    if page == PageKind::Items {
        let options = view_data
            .item_filter_options
            .get(column.key)
            .cloned()
            .unwrap_or_else(|| view_data.pages.items.filter_options(column.key));
        let next = next_filter_value(&options, current.as_deref());
        let request = view_data.pages.items.set_server_filter(column.key, &next);
        view_data.table_state.selected_row = 0;
        emit_status(
            state,
            view_data,
            internal_tx,
            format!("filter {}: {next}", column.label),
        );
        send_item_filter(
            state,
            runtime,
            view_data,
            internal_tx,
            request.ticket,
            request.filters,
        );
        return;
    }

    let controller = view_data.pages.controller_mut(page);
    let options = controller.filter_options(column.key);
    let next = next_filter_value(&options, current.as_deref());
    controller.set_filter(column.key, &next);
    clamp_table_cursor(state, view_data);
    emit_status(
        state,
        view_data,
        internal_tx,
        format!("filter {}: {next}", column.label),
    );
}

fn step_page_size(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    delta: isize,
) {
    let controller = view_data.pages.controller_mut(state.active_page);
    let current = controller.page_size();
    let index = PAGE_SIZE_OPTIONS
        .iter()
        .position(|size| *size >= current)
        .unwrap_or(PAGE_SIZE_OPTIONS.len() - 1);
    let next = (index as isize + delta).clamp(0, PAGE_SIZE_OPTIONS.len() as isize - 1) as usize;
    let size = PAGE_SIZE_OPTIONS[next];
    controller.set_page_size(size);
    view_data.table_state.selected_row = 0;
    emit_status(state, view_data, internal_tx, format!("page size {size}"));
}

fn guard_user_action(
    view_data: &ViewData,
    action: UserAction,
    target_role: Option<&str>,
) -> Result<(), AuthorizationError> {
    let claims = view_data.claims.clone().unwrap_or_default();
    authorize_user_action(
        action,
        &claims,
        view_data.current_role.as_deref(),
        target_role,
    )
}

fn selected_user(state: &AppState, view_data: &ViewData) -> Option<User> {
    let id = selected_row_id(state, view_data)?;
    view_data.pages.users.find(&id).cloned()
}

fn selected_company(state: &AppState, view_data: &ViewData) -> Option<Company> {
    let id = selected_row_id(state, view_data)?;
    view_data.pages.companies.find(&id).cloned()
}

fn open_form(state: &mut AppState, view_data: &mut ViewData, form: FormUiState) {
    state.dispatch(AppCommand::OpenForm(form.kind));
    if state.mode == AppMode::Form(form.kind) {
        view_data.form = Some(form);
    }
}

fn open_user_form<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    existing: Option<&User>,
) {
    match runtime.load_form_options() {
        Ok(options) => open_form(state, view_data, FormUiState::user(&options, existing)),
        Err(error) => handle_remote_error(state, runtime, view_data, internal_tx, &error),
    }
}

fn open_add_form<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    match state.active_page {
        PageKind::Users => {
            if let Err(error) = guard_user_action(view_data, UserAction::Add, None) {
                emit_status(state, view_data, internal_tx, error.to_string());
                return;
            }
            open_user_form(state, runtime, view_data, internal_tx, None);
        }
        PageKind::Companies => open_form(state, view_data, FormUiState::company(None)),
        page => emit_status(
            state,
            view_data,
            internal_tx,
            format!("add unavailable on {}", page.label()),
        ),
    }
}

fn open_edit_form<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    match state.active_page {
        PageKind::Users => {
            let Some(user) = selected_user(state, view_data) else {
                emit_status(state, view_data, internal_tx, "no user selected");
                return;
            };
            if let Err(error) = guard_user_action(view_data, UserAction::Edit, Some(&user.role)) {
                emit_status(state, view_data, internal_tx, error.to_string());
                return;
            }
            open_user_form(state, runtime, view_data, internal_tx, Some(&user));
        }
        PageKind::Companies => {
            let Some(company) = selected_company(state, view_data) else {
                emit_status(state, view_data, internal_tx, "no company selected");
                return;
            };
            open_form(state, view_data, FormUiState::company(Some(&company)));
        }
        PageKind::Roles => {
            let Some(role_id) = selected_row_id(state, view_data)
                .and_then(|id| view_data.pages.roles.find(&id).map(|role| role.id))
            else {
                emit_status(state, view_data, internal_tx, "no role selected");
                return;
            };
            match runtime.load_role_permissions(role_id) {
                Ok((role, permissions)) => open_form(
                    state,
                    view_data,
                    FormUiState::role_permissions(&role, &permissions),
                ),
                Err(error) => handle_remote_error(state, runtime, view_data, internal_tx, &error),
            }
        }
        page => emit_status(
            state,
            view_data,
            internal_tx,
            format!("edit unavailable on {}", page.label()),
        ),
    }
}

fn open_change_password(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    if state.active_page != PageKind::Users {
        emit_status(state, view_data, internal_tx, "passwords are changed on users");
        return;
    }
    let Some(user) = selected_user(state, view_data) else {
        emit_status(state, view_data, internal_tx, "no user selected");
        return;
    };
    if let Err(error) = guard_user_action(view_data, UserAction::Edit, Some(&user.role)) {
        emit_status(state, view_data, internal_tx, error.to_string());
        return;
    }
    open_form(state, view_data, FormUiState::change_password(&user));
}

fn open_user_details<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    if state.active_page != PageKind::Users {
        return;
    }
    let Some(id) = selected_row_id(state, view_data) else {
        emit_status(state, view_data, internal_tx, "no user selected");
        return;
    };
    match runtime.user_details(&id) {
        Ok(user) => {
            view_data.detail = Some(UserDetailView {
                title: "user details",
                user,
            });
        }
        Err(error) => handle_remote_error(state, runtime, view_data, internal_tx, &error),
    }
}

fn open_profile<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    match runtime.my_profile() {
        Ok(user) => {
            view_data.detail = Some(UserDetailView {
                title: "my profile",
                user,
            });
        }
        Err(error) => handle_remote_error(state, runtime, view_data, internal_tx, &error),
    }
}

fn open_date_range(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    if state.active_page != PageKind::Items {
        emit_status(state, view_data, internal_tx, "date range applies to items");
        return;
    }
    let current = view_data.pages.items.date_range();
    let bound = |date: Option<time::Date>| date.map(format_date).unwrap_or_default();
    view_data.date_range = DateRangeUiState {
        visible: true,
        input: DateRangeInput {
            from: bound(current.and_then(|range| range.from)),
            to: bound(current.and_then(|range| range.to)),
        },
        ..DateRangeUiState::default()
    };
}

fn handle_date_range_key(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    match key.code {
        KeyCode::Esc => {
            view_data.date_range = DateRangeUiState::default();
            emit_status(state, view_data, internal_tx, "date range unchanged");
        }
        KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => {
            view_data.date_range.editing_to = !view_data.date_range.editing_to;
        }
        KeyCode::Backspace => {
            view_data.date_range.focused_mut().pop();
        }
        KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            view_data.date_range.focused_mut().push(ch);
        }
        KeyCode::Enter => apply_date_range(state, view_data, internal_tx),
        _ => {}
    }
}

fn apply_date_range(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let (from, to) = match view_data.date_range.input.validate() {
        Ok(bounds) => bounds,
        Err(errors) => {
            let message = errors.to_string();
            view_data.date_range.errors = errors;
            emit_status(state, view_data, internal_tx, message);
            return;
        }
    };
    view_data.date_range = DateRangeUiState::default();
    view_data
        .pages
        .items
        .set_date_range(ITEM_DATE_FIELD, from, to);
    view_data.table_state.selected_row = 0;
    clamp_table_cursor(state, view_data);
    let message = if from.is_none() && to.is_none() {
        "QC date range cleared".to_owned()
    } else {
        let label = |date: Option<time::Date>| date.map_or_else(|| "any".to_owned(), format_date);
        format!(
            "QC date {} to {}: {} items",
            label(from),
            label(to),
            view_data.pages.items.total_count()
        )
    };
    emit_status(state, view_data, internal_tx, message);
}

fn request_delete(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let pending = match state.active_page {
        PageKind::Users => {
            let Some(user) = selected_user(state, view_data) else {
                emit_status(state, view_data, internal_tx, "no user selected");
                return;
            };
            if let Err(error) =
                guard_user_action(view_data, UserAction::Delete, Some(&user.role))
            {
                emit_status(state, view_data, internal_tx, error.to_string());
                return;
            }
            PendingDelete {
                page: PageKind::Users,
                id: user.user_id.to_string(),
                label: user.username,
            }
        }
        PageKind::Companies => {
            let Some(company) = selected_company(state, view_data) else {
                emit_status(state, view_data, internal_tx, "no company selected");
                return;
            };
            PendingDelete {
                page: PageKind::Companies,
                id: company.id.to_string(),
                label: company.name,
            }
        }
        page => {
            emit_status(
                state,
                view_data,
                internal_tx,
                format!("delete unavailable on {}", page.label()),
            );
            return;
        }
    };
    let prompt = format!("delete {}? y confirms", pending.label);
    view_data.pending_delete = Some(pending);
    emit_status(state, view_data, internal_tx, prompt);
}

fn handle_delete_confirmation<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    pending: PendingDelete,
    key: KeyEvent,
) {
    if !matches!(key.code, KeyCode::Char('y') | KeyCode::Char('Y')) {
        emit_status(state, view_data, internal_tx, "delete canceled");
        return;
    }
    match runtime.delete_record(pending.page, &pending.id) {
        Ok(()) => {
            emit_status(
                state,
                view_data,
                internal_tx,
                format!("deleted {}", pending.label),
            );
            reload_page(state, runtime, view_data, internal_tx, pending.page);
        }
        Err(error) => handle_remote_error(state, runtime, view_data, internal_tx, &error),
    }
}

/// Mutations never patch rows in place; the owning page is fetched again.
fn reload_page<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    page: PageKind,
) {
    view_data.pages.mark_stale(page);
    if state.active_page == page {
        load_page(state, runtime, view_data, internal_tx, page);
    }
}

fn handle_form_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    match (key.code, key.modifiers) {
        (KeyCode::Esc, _) => {
            cancel_form(state, runtime, view_data, internal_tx);
            return;
        }
        (KeyCode::Enter, _) => {
            submit_form(state, runtime, view_data, internal_tx);
            return;
        }
        (KeyCode::Char('s'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
            submit_form(state, runtime, view_data, internal_tx);
            return;
        }
        _ => {}
    }

    let Some(form) = view_data.form.as_mut() else {
        return;
    };
    match (key.code, key.modifiers) {
        (KeyCode::Tab, _) | (KeyCode::Down, _) => form.move_focus(1),
        (KeyCode::BackTab, _) | (KeyCode::Up, _) => form.move_focus(-1),
        (KeyCode::Left, _) => form.shift(-1),
        (KeyCode::Right, _) => form.shift(1),
        (KeyCode::Char(' '), _) => form.toggle(),
        (KeyCode::Backspace, _) => form.backspace(),
        (KeyCode::Char(ch), modifiers) if !modifiers.contains(KeyModifiers::CONTROL) => {
            form.insert_char(ch);
        }
        _ => {}
    }
}

fn cancel_form<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let is_login = view_data
        .form
        .as_ref()
        .is_some_and(|form| form.kind == FormKind::Login);
    if is_login && !matches!(runtime.session_status(), SessionStatus::Active(_)) {
        emit_status(state, view_data, internal_tx, "log in to continue");
        return;
    }
    view_data.form = None;
    state.dispatch(AppCommand::ExitToNav);
    emit_status(state, view_data, internal_tx, "form canceled");
}

fn submit_form<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let Some(form) = view_data.form.as_mut() else {
        return;
    };
    let Some(payload) = form.payload() else {
        return;
    };
    if let Err(errors) = payload.validate() {
        let count = errors.len();
        form.errors = errors;
        let noun = if count == 1 { "field" } else { "fields" };
        emit_status(
            state,
            view_data,
            internal_tx,
            format!("fix {count} {noun} before saving"),
        );
        return;
    }
    form.errors = FieldErrors::default();
    let kind = form.kind;
    let target = form.target.clone();

    if let FormPayload::Login(input) = &payload {
        match runtime.login(input) {
            Ok(()) => finish_login(state, runtime, view_data, internal_tx),
            Err(error) => emit_status(state, view_data, internal_tx, error.user_message()),
        }
        return;
    }

    match runtime.submit_form(&payload, target.as_deref()) {
        Ok(()) => {
            view_data.form = None;
            state.dispatch(AppCommand::ExitToNav);
            emit_status(state, view_data, internal_tx, saved_message(kind));
            if let Some(page) = page_for_form(kind) {
                reload_page(state, runtime, view_data, internal_tx, page);
            }
        }
        Err(error) => handle_remote_error(state, runtime, view_data, internal_tx, &error),
    }
}

fn finish_login<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    view_data.form = None;
    state.signed_in();
    reset_signed_in_view(runtime, view_data);
    let who = view_data
        .claims
        .as_ref()
        .and_then(|claims| claims.subject.clone())
        .unwrap_or_else(|| "user".to_owned());
    emit_status(state, view_data, internal_tx, format!("signed in as {who}"));
    let page = state.active_page;
    load_page(state, runtime, view_data, internal_tx, page);
}

fn saved_message(kind: FormKind) -> &'static str {
    match kind {
        FormKind::AddUser => "user created",
        FormKind::EditUser => "user updated",
        FormKind::ChangePassword => "password changed",
        FormKind::AddCompany => "company created",
        FormKind::EditCompany => "company updated",
        FormKind::RolePermissions => "permissions saved",
        FormKind::Login | FormKind::ColumnConfig => "saved",
    }
}

fn page_for_form(kind: FormKind) -> Option<PageKind> {
    match kind {
        FormKind::AddUser | FormKind::EditUser => Some(PageKind::Users),
        FormKind::AddCompany | FormKind::EditCompany => Some(PageKind::Companies),
        FormKind::RolePermissions => Some(PageKind::Roles),
        FormKind::Login | FormKind::ChangePassword | FormKind::ColumnConfig => None,
    }
}

fn open_column_picker<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    if state.active_page != PageKind::Items {
        emit_status(state, view_data, internal_tx, "columns are configured on items");
        return;
    }
    let config = match runtime.load_column_config() {
        Ok(stored) => ColumnConfig::from_stored(stored.as_deref(), item_column_keys()),
        Err(error) if error.is_unauthorized() => {
            expire_session(state, runtime, view_data);
            return;
        }
        Err(error) => {
            warn!(%error, "column config reload failed, editing the current one");
            view_data.item_columns.clone()
        }
    };
    view_data.column_picker = ColumnPickerUiState {
        visible: true,
        config,
        query: String::new(),
        cursor: 0,
    };
    state.dispatch(AppCommand::OpenForm(FormKind::ColumnConfig));
}

fn handle_column_picker_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let picker = &mut view_data.column_picker;
    let matches = picker.matches();
    let current = matches.get(picker.cursor).cloned();
    match (key.code, key.modifiers) {
        (KeyCode::Esc, _) => {
            view_data.column_picker = ColumnPickerUiState::default();
            state.dispatch(AppCommand::ExitToNav);
            emit_status(state, view_data, internal_tx, "columns unchanged");
        }
        (KeyCode::Enter, _) => {
            let stored = picker.config.to_stored();
            match runtime.save_column_config(&stored) {
                Ok(()) => {
                    view_data.item_columns = view_data.column_picker.config.clone();
                    view_data.item_columns_loaded = true;
                    view_data.column_picker = ColumnPickerUiState::default();
                    state.dispatch(AppCommand::ExitToNav);
                    clamp_table_cursor(state, view_data);
                    emit_status(state, view_data, internal_tx, "columns saved");
                }
                Err(error) => handle_remote_error(state, runtime, view_data, internal_tx, &error),
            }
        }
        (KeyCode::Up, modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
            shift_selected_column(picker, current.as_deref(), -1);
        }
        (KeyCode::Down, modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
            shift_selected_column(picker, current.as_deref(), 1);
        }
        (KeyCode::Up, _) => {
            picker.cursor = picker.cursor.saturating_sub(1);
        }
        (KeyCode::Down, _) => {
            picker.cursor = (picker.cursor + 1).min(matches.len().saturating_sub(1));
        }
        (KeyCode::Char('a'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
            picker.config.toggle_all();
        }
        (KeyCode::Char(' '), _) => {
            if let Some(column) = current {
                picker.config.toggle(&column);
            }
        }
        (KeyCode::Backspace, _) => {
            picker.query.pop();
            picker.cursor = 0;
        }
        (KeyCode::Char(ch), modifiers) if !modifiers.contains(KeyModifiers::CONTROL) => {
            picker.query.push(ch);
            picker.cursor = 0;
        }
        _ => {}
    }
}

fn shift_selected_column(picker: &mut ColumnPickerUiState, key: Option<&str>, delta: isize) {
    let Some(key) = key else {
        return;
    };
    let Some(from) = picker
        .config
        .selected()
        .iter()
        .position(|selected| selected == key)
    else {
        return;
    };
    let Some(to) = from.checked_add_signed(delta) else {
        return;
    };
    picker.config.move_to(from, to);
}

fn tab_title(page: PageKind, state: &AppState, view_data: &ViewData) -> String {
    let filtered = if page == PageKind::Items {
        !view_data.pages.items.server_filters().is_empty()
            || !view_data.pages.items.filters().is_empty()
    } else {
        let controller = view_data.pages.controller(page);
        controller
            .columns()
            .iter()
            .any(|column| controller.filter_value(column.key).is_some())
    };
    if state.active_page == page && filtered {
        format!(" {} {FILTER_MARK} ", page.label())
    } else {
        format!(" {} ", page.label())
    }
}

fn render(frame: &mut ratatui::Frame<'_>, state: &AppState, view_data: &ViewData) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(2),
        ])
        .split(frame.area());

    let selected = PageKind::ALL
        .iter()
        .position(|page| *page == state.active_page)
        .unwrap_or(0);
    let titles = PageKind::ALL
        .iter()
        .map(|page| tab_title(*page, state, view_data))
        .collect::<Vec<String>>();
    let tabs = Tabs::new(titles)
        .block(Block::default().title("factory").borders(Borders::ALL))
        .style(Style::default().fg(Color::White))
        .highlight_style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .select(selected);
    frame.render_widget(tabs, layout[0]);

    render_page(frame, layout[1], state, view_data);

    let status = Paragraph::new(status_text(state, view_data))
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(status, layout[2]);

    if let Some(form) = &view_data.form {
        let area = centered_rect(70, 80, frame.area());
        frame.render_widget(Clear, area);
        let body = Paragraph::new(form.render_text())
            .block(Block::default().title(form.title()).borders(Borders::ALL));
        frame.render_widget(body, area);
    }

    if view_data.column_picker.visible {
        let area = centered_rect(60, 70, frame.area());
        frame.render_widget(Clear, area);
        let picker = Paragraph::new(render_column_picker_text(&view_data.column_picker))
            .block(Block::default().title("columns").borders(Borders::ALL));
        frame.render_widget(picker, area);
    }

    if view_data.date_range.visible {
        let area = centered_rect(50, 30, frame.area());
        frame.render_widget(Clear, area);
        let prompt = Paragraph::new(render_date_range_text(&view_data.date_range))
            .block(Block::default().title("qc date range").borders(Borders::ALL));
        frame.render_widget(prompt, area);
    }

    if let Some(detail) = &view_data.detail {
        let area = centered_rect(60, 60, frame.area());
        frame.render_widget(Clear, area);
        let body = Paragraph::new(render_user_detail_text(&detail.user))
            .block(Block::default().title(detail.title).borders(Borders::ALL));
        frame.render_widget(body, area);
    }

    match state.overlay {
        Overlay::SessionExpired if view_data.form.is_none() => {
            let area = centered_rect(50, 25, frame.area());
            frame.render_widget(Clear, area);
            let modal = Paragraph::new(
                "Your session has expired. Please log in again.\n\nenter log in | ctrl+q quit",
            )
            .block(
                Block::default()
                    .title("session expired")
                    .borders(Borders::ALL)
                    .style(Style::default().fg(Color::Red)),
            );
            frame.render_widget(modal, area);
        }
        Overlay::ConfirmLogout => {
            let area = centered_rect(40, 20, frame.area());
            frame.render_widget(Clear, area);
            let modal = Paragraph::new("Log out of the console?\n\ny log out | n stay")
                .block(Block::default().title("logout").borders(Borders::ALL));
            frame.render_widget(modal, area);
        }
        Overlay::SessionExpired | Overlay::None => {}
    }

    if view_data.help_visible {
        let area = centered_rect(80, 60, frame.area());
        frame.render_widget(Clear, area);
        let help = Paragraph::new(help_overlay_text())
            .block(Block::default().title("help").borders(Borders::ALL));
        frame.render_widget(help, area);
    }
}

fn render_page(frame: &mut ratatui::Frame<'_>, area: Rect, state: &AppState, view_data: &ViewData) {
    let controller = view_data.pages.controller(state.active_page);
    let area = match controller.error() {
        Some(error) => {
            let split = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Length(1), Constraint::Min(1)])
                .split(area);
            let banner = Paragraph::new(format!(" ! {error}")).style(
                Style::default()
                    .fg(Color::White)
                    .bg(Color::Red)
                    .add_modifier(Modifier::BOLD),
            );
            frame.render_widget(banner, split[0]);
            split[1]
        }
        None => area,
    };
    render_table(frame, area, state, view_data);
}

fn render_table(frame: &mut ratatui::Frame<'_>, area: Rect, state: &AppState, view_data: &ViewData) {
    let page = state.active_page;
    let controller = view_data.pages.controller(page);
    let columns = controller.columns();
    let visible = visible_column_indices(page, view_data);
    let widths = vec![Constraint::Min(8); visible.len().max(1)];

    let header_cells = visible.iter().filter_map(|index| columns.get(*index)).map(|column| {
        Cell::from(header_label(view_data, page, column)).style(
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
    });
    let header = Row::new(header_cells);

    let cells = controller.visible_cells();
    let rows = cells.iter().enumerate().map(|(row_index, row)| {
        let selected_row = row_index == view_data.table_state.selected_row;
        let cells = visible
            .iter()
            .enumerate()
            .map(|(position, column_index)| {
                let text = row.get(*column_index).cloned().unwrap_or_default();
                let mut style = Style::default();
                if selected_row {
                    style = style.bg(Color::DarkGray);
                }
                if selected_row && position == view_data.table_state.selected_col {
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
                .title(table_title(state, view_data))
                .borders(Borders::ALL),
        );
    frame.render_widget(table, area);
}

fn header_label(view_data: &ViewData, page: PageKind, column: &ColumnSpec) -> String {
    let controller = view_data.pages.controller(page);
    let mut label = column.label.to_owned();
    if let Some(direction) = controller.sort_direction(column.key) {
        label.push_str(direction.indicator());
    }
    if active_filter_value(view_data, page, column.key).is_some() {
        label.push(' ');
        label.push_str(FILTER_MARK);
    }
    label
}

fn table_title(state: &AppState, view_data: &ViewData) -> String {
    let page = state.active_page;
    let controller = view_data.pages.controller(page);
    let mut title = format!(
        " {} | page {}/{} | {} rows | {} per page",
        page.label(),
        controller.page_index() + 1,
        controller.page_count().max(1),
        controller.total_count(),
        controller.page_size(),
    );
    if !controller.search().is_empty() || state.mode == AppMode::Search {
        title.push_str(&format!(" | search: {}", controller.search()));
        if state.mode == AppMode::Search {
            title.push('_');
        }
    }
    if page == PageKind::Items
        && let Some(range) = view_data.pages.items.date_range()
    {
        let label = |date: Option<time::Date>| date.map_or_else(|| "any".to_owned(), format_date);
        title.push_str(&format!(" | qc {} to {}", label(range.from), label(range.to)));
    }
    if controller.is_loading() {
        title.push_str(" | loading");
    }
    title.push(' ');
    title
}

fn render_column_picker_text(picker: &ColumnPickerUiState) -> String {
    let mut lines = vec![format!("find: {}", picker.query), String::new()];
    let matches = picker.matches();
    if matches.is_empty() {
        lines.push("no columns match".to_owned());
    }
    for (index, key) in matches.iter().enumerate() {
        let cursor = if index == picker.cursor { ">" } else { " " };
        let position = picker
            .config
            .selected()
            .iter()
            .position(|selected| selected == key);
        let mark = match position {
            Some(position) => format!("[x] {}.", position + 1),
            None => "[ ]   ".to_owned(),
        };
        lines.push(format!("{cursor} {mark} {}", column_label(key)));
    }
    lines.push(String::new());
    let all = if picker.config.is_all_selected() {
        "all selected"
    } else {
        "ctrl+a all"
    };
    lines.push(format!(
        "space toggle | {all} | ctrl+↑/↓ reorder | enter save | esc cancel"
    ));
    lines.join("\n")
}

fn render_date_range_text(prompt: &DateRangeUiState) -> String {
    let mut lines = Vec::with_capacity(6);
    for (editing, label, key, value) in [
        (!prompt.editing_to, "From", "from", &prompt.input.from),
        (prompt.editing_to, "To", "to", &prompt.input.to),
    ] {
        let marker = if editing { ">" } else { " " };
        lines.push(format!("{marker} {label} (dd/mm/yyyy): {value}"));
        if let Some(message) = prompt.errors.message_for(key) {
            lines.push(format!("    ! {message}"));
        }
    }
    lines.push(String::new());
    lines.push("tab field | enter apply (blank clears) | esc cancel".to_owned());
    lines.join("\n")
}

fn render_user_detail_text(user: &User) -> String {
    let or_dash = |value: String| {
        if value.is_empty() {
            "-".to_owned()
        } else {
            value
        }
    };
    let project_manager = match user.project_manager {
        Some(true) => "Yes",
        Some(false) => "No",
        None => "-",
    };
    [
        format!("Username: {}", user.username),
        format!("Name: {}", or_dash(user.full_name())),
        format!("Role: {}", or_dash(user.role.clone())),
        format!("Companies: {}", or_dash(user.company.join(", "))),
        format!("Teams: {}", or_dash(user.engineering_team.join(", "))),
        format!(
            "Date of birth: {}",
            or_dash(user.date_of_birth.map(format_date).unwrap_or_default())
        ),
        format!("Status: {}", user.status.label()),
        format!("Project manager: {project_manager}"),
        String::new(),
        "esc close".to_owned(),
    ]
    .join("\n")
}

fn page_key_hints(page: PageKind) -> &'static str {
    match page {
        PageKind::Users => "enter details | a/e/d user | P password",
        PageKind::Companies => "a/e/d company",
        PageKind::Roles => "e permissions",
        PageKind::Items => "c columns | D qc dates",
        PageKind::Jobs => "read only",
    }
}

fn status_text(state: &AppState, view_data: &ViewData) -> String {
    if view_data.help_visible {
        return String::new();
    }
    let mode = match state.mode {
        AppMode::Nav => "NAV",
        AppMode::Search => "SEARCH",
        AppMode::Form(_) => "FORM",
    };
    let default = match state.mode {
        AppMode::Search => "type to search | enter keep | esc clear".to_owned(),
        AppMode::Form(_) => "tab field | enter submit | esc cancel".to_owned(),
        AppMode::Nav => format!(
            "j/k/h/l | s/S sort | F filter | / search | n/p page | +/- size | {} | r | L | ? | ctrl+q",
            page_key_hints(state.active_page)
        ),
    };
    match &state.status_line {
        Some(status) => format!("{mode} | {status} | {default}"),
        None => format!("{mode} | {default}"),
    }
}

fn help_overlay_text() -> &'static str {
    "global: ctrl+q quit | ? help | i my profile\n\
pages: f/b or tab/shift+tab next/prev | 1-5 jump | r refresh | L logout\n\
table: j/k/h/l move | g/G first/last row | ctrl+d/u half page | n/p page | +/- page size\n\
table: s sort selected column (asc, desc, off) | S clear sort | F cycle filter\n\
search: / start | type to narrow | enter keep | esc clear\n\
users: enter details | a add | e edit | d delete (y confirms) | P change password\n\
companies: a add | e edit | d delete | roles: e permissions\n\
items: c columns | D qc date range (dd/mm/yyyy, tab field, enter apply, blank clears)\n\
form: tab/shift+tab field | space toggle | ←/→ choose | enter or ctrl+s submit | esc cancel\n\
columns: type to find | space toggle | ctrl+a all | ctrl+↑/↓ reorder | enter save | esc cancel"
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
