// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Fetch-all table view: one controller per entity page that owns the fetched
//! collection and derives the visible page from search, filters, sort and the
//! page window.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use time::Date;
use tracing::{debug, warn};

use crate::{ColumnSpec, FieldValue, Record, RemoteError, SortDirection};

/// Filter value meaning "no constraint".
pub const ALL_SENTINEL: &str = "All";
pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const PAGE_SIZE_OPTIONS: [usize; 4] = [10, 20, 50, 100];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

/// Inclusive bounds on a date field. Rows without a date fall outside any
/// active range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRange {
    pub field: String,
    pub from: Option<Date>,
    pub to: Option<Date>,
}

impl DateRange {
    pub fn is_open(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    fn admits(&self, value: &FieldValue) -> bool {
        if self.is_open() {
            return true;
        }
        let FieldValue::Date(date) = value else {
            return false;
        };
        self.from.is_none_or(|from| *date >= from) && self.to.is_none_or(|to| *date <= to)
    }
}

/// Sequence number handed out per outgoing request; only the latest one may
/// land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestTicket(u64);

impl RequestTicket {
    pub const fn get(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { count: usize },
    Failed { message: String, unauthorized: bool },
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerFilterRequest {
    pub ticket: RequestTicket,
    pub filters: BTreeMap<String, String>,
}

/// Anything that can hand back the whole collection in one call.
pub trait CollectionSource<R> {
    fn fetch_all(&mut self) -> Result<Vec<R>, RemoteError>;
}

impl<R, F> CollectionSource<R> for F
where
    F: FnMut() -> Result<Vec<R>, RemoteError>,
{
    fn fetch_all(&mut self) -> Result<Vec<R>, RemoteError> {
        self()
    }
}

#[derive(Debug, Clone)]
pub struct TableView<R> {
    records: Vec<R>,
    filters: BTreeMap<String, String>,
    server_filters: BTreeMap<String, String>,
    search: String,
    sort: Option<SortSpec>,
    date_range: Option<DateRange>,
    page_index: usize,
    page_size: usize,
    loading: bool,
    error: Option<String>,
    issued: u64,
}

impl<R: Record> Default for TableView<R> {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl<R: Record> TableView<R> {
    pub fn new(page_size: usize) -> Self {
        Self {
            records: Vec::new(),
            filters: BTreeMap::new(),
            server_filters: BTreeMap::new(),
            search: String::new(),
            sort: None,
            date_range: None,
            page_index: 0,
            page_size: page_size.max(1),
            loading: false,
            error: None,
            issued: 0,
        }
    }

    pub fn with_records(records: Vec<R>) -> Self {
        let mut view = Self::default();
        view.records = records;
        view
    }

    pub fn records(&self) -> &[R] {
        &self.records
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn sort(&self) -> Option<&SortSpec> {
        self.sort.as_ref()
    }

    pub fn filters(&self) -> &BTreeMap<String, String> {
        &self.filters
    }

    pub fn server_filters(&self) -> &BTreeMap<String, String> {
        &self.server_filters
    }

    pub fn date_range(&self) -> Option<&DateRange> {
        self.date_range.as_ref()
    }

    pub fn page_index(&self) -> usize {
        self.page_index
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Fetches the full collection synchronously and applies it.
    pub fn load<S>(&mut self, source: &mut S) -> LoadOutcome
    where
        S: CollectionSource<R> + ?Sized,
    {
        let ticket = self.begin_request();
        let result = source.fetch_all();
        self.apply_response(ticket, result)
    }

    pub fn begin_request(&mut self) -> RequestTicket {
        self.issued += 1;
        self.loading = true;
        RequestTicket(self.issued)
    }

    pub fn is_latest(&self, ticket: RequestTicket) -> bool {
        ticket.0 == self.issued
    }

    /// Lands a fetch result. Responses for anything but the most recently
    /// issued ticket are dropped. A failure keeps the previous rows.
    pub fn apply_response(
        &mut self,
        ticket: RequestTicket,
        result: Result<Vec<R>, RemoteError>,
    ) -> LoadOutcome {
        self.land(ticket, result, false)
    }

    /// Items round trip: server content is narrowed by the local search and
    /// date range before it replaces the collection.
    pub fn apply_server_filter(
        &mut self,
        ticket: RequestTicket,
        result: Result<Vec<R>, RemoteError>,
    ) -> LoadOutcome {
        self.land(ticket, result, true)
    }

    fn land(
        &mut self,
        ticket: RequestTicket,
        result: Result<Vec<R>, RemoteError>,
        refine: bool,
    ) -> LoadOutcome {
        if !self.is_latest(ticket) {
            debug!(
                ticket = ticket.0,
                latest = self.issued,
                "dropping stale response"
            );
            return LoadOutcome::Stale;
        }
        self.loading = false;
        match result {
            Ok(mut records) => {
                if refine {
                    let needle = self.search.to_lowercase();
                    records.retain(|record| {
                        self.matches_search(record, &needle) && self.matches_date_range(record)
                    });
                }
                let count = records.len();
                self.records = records;
                self.error = None;
                self.clamp_page();
                LoadOutcome::Loaded { count }
            }
            Err(error) => {
                warn!(%error, "load failed, keeping previous rows");
                let message = error.user_message();
                self.error = Some(message.clone());
                LoadOutcome::Failed {
                    message,
                    unauthorized: error.is_unauthorized(),
                }
            }
        }
    }

    /// Empty or `All` removes the constraint.
    pub fn set_filter(&mut self, field: &str, value: &str) {
        if is_unconstrained(value) {
            self.filters.remove(field);
        } else {
            self.filters.insert(field.to_owned(), value.to_owned());
        }
        self.page_index = 0;
    }

    pub fn filter_value(&self, field: &str) -> Option<&str> {
        self.filters.get(field).map(String::as_str)
    }

    /// Records a server-side filter and issues the ticket for its round trip.
    pub fn set_server_filter(&mut self, field: &str, value: &str) -> ServerFilterRequest {
        if is_unconstrained(value) {
            self.server_filters.remove(field);
        } else {
            self.server_filters
                .insert(field.to_owned(), value.to_owned());
        }
        self.page_index = 0;
        ServerFilterRequest {
            ticket: self.begin_request(),
            filters: self.server_filters.clone(),
        }
    }

    pub fn set_search(&mut self, query: &str) {
        self.search = query.to_owned();
        self.page_index = 0;
    }

    pub fn set_date_range(&mut self, field: &str, from: Option<Date>, to: Option<Date>) {
        let range = DateRange {
            field: field.to_owned(),
            from,
            to,
        };
        self.date_range = (!range.is_open()).then_some(range);
        self.page_index = 0;
    }

    /// `none -> asc -> desc -> none` on `field`; any other active column is cleared.
    pub fn cycle_sort(&mut self, field: &str) -> Option<SortDirection> {
        let next = match self.sort_direction(field) {
            None => Some(SortDirection::Asc),
            Some(SortDirection::Asc) => Some(SortDirection::Desc),
            Some(SortDirection::Desc) => None,
        };
        self.sort = next.map(|direction| SortSpec {
            field: field.to_owned(),
            direction,
        });
        self.page_index = 0;
        next
    }

    pub fn clear_sort(&mut self) {
        self.sort = None;
        self.page_index = 0;
    }

    pub fn sort_direction(&self, field: &str) -> Option<SortDirection> {
        self.sort
            .as_ref()
            .filter(|sort| sort.field == field)
            .map(|sort| sort.direction)
    }

    pub fn set_page(&mut self, index: usize) {
        self.page_index = index;
    }

    /// One-based page number as shown in the pager.
    pub fn set_page_number(&mut self, number: usize) {
        self.page_index = number.saturating_sub(1);
    }

    pub fn set_page_size(&mut self, size: usize) {
        self.page_size = size.max(1);
        self.page_index = 0;
    }

    pub fn total_count(&self) -> usize {
        self.matching().count()
    }

    pub fn page_count(&self) -> usize {
        self.total_count().div_ceil(self.page_size)
    }

    /// Search, then filters, then the date range, then sort, then the page slice.
    pub fn visible_rows(&self) -> Vec<&R> {
        let mut rows: Vec<&R> = self.matching().collect();
        if let Some(sort) = &self.sort {
            sort_rows(&mut rows, sort);
        }
        let start = self.page_index.saturating_mul(self.page_size);
        rows.into_iter().skip(start).take(self.page_size).collect()
    }

    /// Distinct values of `field` in fetched order, led by the `All` sentinel.
    pub fn filter_options(&self, field: &str) -> Vec<String> {
        let mut options = vec![ALL_SENTINEL.to_owned()];
        for record in &self.records {
            let values = match record.field(field) {
                FieldValue::List(values) => values,
                FieldValue::Null => Vec::new(),
                other => vec![other.display()],
            };
            for value in values {
                if !value.is_empty() && !options.contains(&value) {
                    options.push(value);
                }
            }
        }
        options
    }

    pub fn find(&self, id: &str) -> Option<&R> {
        self.records.iter().find(|record| record.id() == id)
    }

    fn matching(&self) -> impl Iterator<Item = &R> + '_ {
        let needle = self.search.to_lowercase();
        self.records.iter().filter(move |record| {
            self.matches_search(record, &needle)
                && self.matches_filters(record)
                && self.matches_date_range(record)
        })
    }

    fn matches_search(&self, record: &R, needle: &str) -> bool {
        needle.is_empty()
            || R::SEARCH_FIELDS
                .iter()
                .any(|field| record.field(field).contains_folded(needle))
    }

    fn matches_filters(&self, record: &R) -> bool {
        self.filters
            .iter()
            .all(|(field, accepted)| record.field(field).matches(accepted))
    }

    fn matches_date_range(&self, record: &R) -> bool {
        self.date_range
            .as_ref()
            .is_none_or(|range| range.admits(&record.field(&range.field)))
    }

    fn clamp_page(&mut self) {
        let pages = self.page_count();
        if pages == 0 {
            self.page_index = 0;
        } else if self.page_index >= pages {
            self.page_index = pages - 1;
        }
    }
}

fn is_unconstrained(value: &str) -> bool {
    value.is_empty() || value == ALL_SENTINEL
}

/// Stable sort on one key. Missing values go last in either direction.
fn sort_rows<R: Record>(rows: &mut Vec<&R>, sort: &SortSpec) {
    let mut keyed: Vec<(FieldValue, &R)> = rows
        .iter()
        .map(|record| (record.field(&sort.field), *record))
        .collect();
    keyed.sort_by(|(left, _), (right, _)| {
        match (left.is_null(), right.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let ordering = left.compare(right);
                match sort.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            }
        }
    });
    *rows = keyed.into_iter().map(|(_, record)| record).collect();
}

/// Object-safe face of a table view so pages of different record types can
/// be driven uniformly.
pub trait PageController {
    fn columns(&self) -> &'static [ColumnSpec];
    fn visible_ids(&self) -> Vec<String>;
    fn visible_cells(&self) -> Vec<Vec<String>>;
    fn cycle_sort(&mut self, field: &str) -> Option<SortDirection>;
    fn clear_sort(&mut self);
    fn sort_direction(&self, field: &str) -> Option<SortDirection>;
    fn set_filter(&mut self, field: &str, value: &str);
    fn filter_value(&self, field: &str) -> Option<&str>;
    fn filter_options(&self, field: &str) -> Vec<String>;
    fn set_search(&mut self, query: &str);
    fn search(&self) -> &str;
    fn set_page(&mut self, index: usize);
    fn set_page_size(&mut self, size: usize);
    fn page_index(&self) -> usize;
    fn page_size(&self) -> usize;
    fn page_count(&self) -> usize;
    fn total_count(&self) -> usize;
    fn is_loading(&self) -> bool;
    fn error(&self) -> Option<&str>;
    fn begin_request(&mut self) -> RequestTicket;
}

impl<R: Record> PageController for TableView<R> {
    fn columns(&self) -> &'static [ColumnSpec] {
        R::COLUMNS
    }

    fn visible_ids(&self) -> Vec<String> {
        self.visible_rows()
            .into_iter()
            .map(|record| record.id())
            .collect()
    }

    fn visible_cells(&self) -> Vec<Vec<String>> {
        self.visible_rows()
            .into_iter()
            .map(|record| {
                R::COLUMNS
                    .iter()
                    .map(|column| record.field(column.key).display())
                    .collect()
            })
            .collect()
    }

    fn cycle_sort(&mut self, field: &str) -> Option<SortDirection> {
        TableView::cycle_sort(self, field)
    }

    fn clear_sort(&mut self) {
        TableView::clear_sort(self);
    }

    fn sort_direction(&self, field: &str) -> Option<SortDirection> {
        TableView::sort_direction(self, field)
    }

    fn set_filter(&mut self, field: &str, value: &str) {
        TableView::set_filter(self, field, value);
    }

    fn filter_value(&self, field: &str) -> Option<&str> {
        TableView::filter_value(self, field)
    }

    fn filter_options(&self, field: &str) -> Vec<String> {
        TableView::filter_options(self, field)
    }

    fn set_search(&mut self, query: &str) {
        TableView::set_search(self, query);
    }

    fn search(&self) -> &str {
        TableView::search(self)
    }

    fn set_page(&mut self, index: usize) {
        TableView::set_page(self, index);
    }

    fn set_page_size(&mut self, size: usize) {
        TableView::set_page_size(self, size);
    }

    fn page_index(&self) -> usize {
        TableView::page_index(self)
    }

    fn page_size(&self) -> usize {
        TableView::page_size(self)
    }

    fn page_count(&self) -> usize {
        TableView::page_count(self)
    }

    fn total_count(&self) -> usize {
        TableView::total_count(self)
    }

    fn is_loading(&self) -> bool {
        TableView::is_loading(self)
    }

    fn error(&self) -> Option<&str> {
        TableView::error(self)
    }

    fn begin_request(&mut self) -> RequestTicket {
        TableView::begin_request(self)
    }
}

#[cfg(test)]
mod tests {
    use time::{Date, Month};

    use super::{ALL_SENTINEL, LoadOutcome, PageController, TableView};
    use crate::{
        Company, CompanyId, Item, ItemId, RecordStatus, RemoteError, SortDirection, User, UserId,
    };

    fn user(username: &str, role: &str, status: RecordStatus) -> User {
        User {
            user_id: UserId::new(format!("u-{username}")),
            username: username.to_owned(),
            first_name: String::new(),
            last_name: String::new(),
            company: Vec::new(),
            engineering_team: Vec::new(),
            date_of_birth: None,
            role: role.to_owned(),
            status,
            image: String::new(),
            project_manager: None,
        }
    }

    fn company(id: i64, code: &str, state: &str, status: RecordStatus) -> Company {
        Company {
            id: CompanyId::new(id),
            code: code.to_owned(),
            name: format!("{code} Corp"),
            subcontractor: false,
            state: state.to_owned(),
            status,
            contact_name: String::new(),
            mobile_phone: String::new(),
            address: String::new(),
        }
    }

    fn item(id: i64, code: &str, quantity: f64, qc_date: Option<Date>) -> Item {
        Item {
            id: ItemId::new(id),
            code: code.to_owned(),
            name: format!("Item {code}"),
            category: "Raw".to_owned(),
            material: "Steel".to_owned(),
            quantity,
            unit: "kg".to_owned(),
            status: "Ready".to_owned(),
            qc_date,
            created_at: None,
            updated_at: None,
        }
    }

    fn day(d: u8) -> Date {
        Date::from_calendar_date(2025, Month::June, d).expect("valid day")
    }

    fn codes(view: &TableView<Company>) -> Vec<String> {
        view.visible_rows()
            .into_iter()
            .map(|company| company.code.clone())
            .collect()
    }

    fn numbered_users(count: usize) -> Vec<User> {
        (1..=count)
            .map(|n| user(&format!("user{n:02}"), "OPERATOR", RecordStatus::Active))
            .collect()
    }

    #[test]
    fn code_sort_cycles_back_to_fetch_order() {
        let mut view = TableView::with_records(vec![
            company(1, "CMP002", "Texas", RecordStatus::Active),
            company(2, "CMP001", "Texas", RecordStatus::Active),
            company(3, "CMP003", "Texas", RecordStatus::Active),
        ]);

        assert_eq!(view.cycle_sort("code"), Some(SortDirection::Asc));
        assert_eq!(codes(&view), ["CMP001", "CMP002", "CMP003"]);
        assert_eq!(view.cycle_sort("code"), Some(SortDirection::Desc));
        assert_eq!(codes(&view), ["CMP003", "CMP002", "CMP001"]);
        assert_eq!(view.cycle_sort("code"), None);
        assert_eq!(codes(&view), ["CMP002", "CMP001", "CMP003"]);
    }

    #[test]
    fn activating_another_column_clears_the_first() {
        let mut view = TableView::with_records(vec![
            company(1, "CMP002", "Texas", RecordStatus::Active),
            company(2, "CMP001", "Florida", RecordStatus::Active),
        ]);

        view.cycle_sort("code");
        view.cycle_sort("code");
        assert_eq!(view.sort_direction("code"), Some(SortDirection::Desc));

        assert_eq!(view.cycle_sort("state"), Some(SortDirection::Asc));
        assert_eq!(view.sort_direction("code"), None);
        assert_eq!(view.sort_direction("state"), Some(SortDirection::Asc));
        assert_eq!(codes(&view), ["CMP001", "CMP002"]);
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let mut view = TableView::with_records(vec![
            user("alice", "ADMIN", RecordStatus::Active),
            user("bob", "ADMIN", RecordStatus::Active),
        ]);

        view.set_search("ALI");
        let names: Vec<_> = view
            .visible_rows()
            .into_iter()
            .map(|user| user.username.as_str())
            .collect();
        assert_eq!(names, ["alice"]);
        assert_eq!(view.total_count(), 1);
    }

    #[test]
    fn search_only_looks_at_whitelisted_fields() {
        let mut view = TableView::with_records(vec![user("carol", "ADMIN", RecordStatus::Active)]);

        view.set_search("admin");
        assert!(view.visible_rows().is_empty());
    }

    #[test]
    fn combined_filters_and_then_re_evaluate_cleanly() {
        let mut view = TableView::with_records(vec![
            company(1, "CMP001", "Texas", RecordStatus::Active),
            company(2, "CMP002", "Texas", RecordStatus::Inactive),
            company(3, "CMP003", "Florida", RecordStatus::Active),
        ]);

        view.set_filter("state", "Texas");
        view.set_filter("status", "Active");
        assert_eq!(codes(&view), ["CMP001"]);

        view.set_filter("status", "Inactive");
        assert_eq!(codes(&view), ["CMP002"]);

        view.set_filter("state", "Florida");
        assert!(codes(&view).is_empty());

        view.set_filter("status", ALL_SENTINEL);
        assert_eq!(codes(&view), ["CMP003"]);
        assert!(view.filter_value("status").is_none());

        view.set_filter("state", "");
        assert_eq!(view.total_count(), 3);
    }

    #[test]
    fn every_input_change_resets_the_page() {
        let mut view = TableView::with_records(numbered_users(30));

        view.set_page(2);
        view.set_filter("role", "OPERATOR");
        assert_eq!(view.page_index(), 0);

        view.set_page(2);
        view.set_search("user");
        assert_eq!(view.page_index(), 0);

        view.set_page(2);
        view.cycle_sort("username");
        assert_eq!(view.page_index(), 0);

        view.set_page(2);
        view.set_page_size(20);
        assert_eq!(view.page_index(), 0);
    }

    #[test]
    fn twenty_five_users_second_page_of_ten() {
        let mut view = TableView::with_records(numbered_users(25));

        view.set_page_size(10);
        view.set_page_number(2);
        assert_eq!(view.page_index(), 1);

        let names: Vec<_> = view
            .visible_rows()
            .into_iter()
            .map(|user| user.username.clone())
            .collect();
        let expected: Vec<_> = (11..=20).map(|n| format!("user{n:02}")).collect();
        assert_eq!(names, expected);
        assert_eq!(view.page_count(), 3);
    }

    #[test]
    fn page_window_is_bounded() {
        let mut view = TableView::with_records(numbered_users(25));
        view.set_page_size(10);

        for page in 0..5 {
            view.set_page(page);
            assert!(view.visible_rows().len() <= 10);
        }

        view.set_page(2);
        assert_eq!(view.visible_rows().len(), 5);
        view.set_page(3);
        assert!(view.visible_rows().is_empty());
    }

    #[test]
    fn visible_rows_equal_slice_of_sorted_filtered_set() {
        let mut view = TableView::with_records(vec![
            company(1, "CMP005", "Texas", RecordStatus::Active),
            company(2, "CMP003", "Ohio", RecordStatus::Active),
            company(3, "CMP004", "Texas", RecordStatus::Active),
            company(4, "CMP001", "Texas", RecordStatus::Inactive),
            company(5, "CMP002", "Texas", RecordStatus::Active),
        ]);
        view.set_filter("state", "Texas");
        view.cycle_sort("code");
        view.set_page_size(2);
        view.set_page(1);

        let mut expected: Vec<_> = view
            .records()
            .iter()
            .filter(|company| company.state == "Texas")
            .map(|company| company.code.clone())
            .collect();
        expected.sort();
        let expected: Vec<_> = expected.into_iter().skip(2).take(2).collect();

        assert_eq!(codes(&view), expected);
        assert_eq!(view.total_count(), 4);
    }

    #[test]
    fn missing_values_sort_last_in_both_directions() {
        let mut view = TableView::with_records(vec![
            item(1, "A", 1.0, None),
            item(2, "B", 1.0, Some(day(3))),
            item(3, "C", 1.0, Some(day(1))),
        ]);

        view.cycle_sort("qcDate");
        let asc: Vec<_> = view.visible_rows().iter().map(|i| i.code.clone()).collect();
        assert_eq!(asc, ["C", "B", "A"]);

        view.cycle_sort("qcDate");
        let desc: Vec<_> = view.visible_rows().iter().map(|i| i.code.clone()).collect();
        assert_eq!(desc, ["B", "C", "A"]);
    }

    #[test]
    fn numeric_columns_sort_by_value() {
        let mut view = TableView::with_records(vec![
            item(1, "A", 100.0, None),
            item(2, "B", 9.5, None),
            item(3, "C", 20.0, None),
        ]);

        view.cycle_sort("quantity");
        let order: Vec<_> = view.visible_rows().iter().map(|i| i.code.clone()).collect();
        assert_eq!(order, ["B", "C", "A"]);
    }

    #[test]
    fn failed_load_keeps_rows_and_success_clears_error() {
        let mut view: TableView<Company> = TableView::default();

        let first = vec![company(1, "CMP001", "Texas", RecordStatus::Active)];
        let outcome = view.load(&mut || Ok::<_, RemoteError>(first.clone()));
        assert_eq!(outcome, LoadOutcome::Loaded { count: 1 });

        let outcome = view.load(&mut || {
            Err::<Vec<Company>, _>(RemoteError::from_status(500, Some("boom".to_owned())))
        });
        assert_eq!(
            outcome,
            LoadOutcome::Failed {
                message: "boom".to_owned(),
                unauthorized: false,
            }
        );
        assert_eq!(view.error(), Some("boom"));
        assert_eq!(codes(&view), ["CMP001"]);
        assert!(!view.is_loading());

        let second = vec![
            company(2, "CMP002", "Ohio", RecordStatus::Active),
            company(3, "CMP003", "Ohio", RecordStatus::Active),
        ];
        view.load(&mut || Ok::<_, RemoteError>(second.clone()));
        assert!(view.error().is_none());
        assert_eq!(codes(&view), ["CMP002", "CMP003"]);
    }

    #[test]
    fn unauthorized_failure_is_flagged() {
        let mut view: TableView<User> = TableView::default();

        let outcome = view.load(&mut || Err::<Vec<User>, _>(RemoteError::from_status(401, None)));
        assert!(matches!(
            outcome,
            LoadOutcome::Failed {
                unauthorized: true,
                ..
            }
        ));
    }

    #[test]
    fn stale_responses_are_discarded() {
        let mut view: TableView<Company> = TableView::default();

        let older = view.begin_request();
        let newer = view.begin_request();

        let landed = view.apply_response(
            newer,
            Ok(vec![company(2, "NEW", "Ohio", RecordStatus::Active)]),
        );
        assert_eq!(landed, LoadOutcome::Loaded { count: 1 });
        assert!(!view.is_loading());

        let late = view.apply_response(
            older,
            Ok(vec![company(1, "OLD", "Ohio", RecordStatus::Active)]),
        );
        assert_eq!(late, LoadOutcome::Stale);
        assert_eq!(codes(&view), ["NEW"]);
    }

    #[test]
    fn loading_stays_set_until_latest_request_lands() {
        let mut view: TableView<Company> = TableView::default();

        let older = view.begin_request();
        let newer = view.begin_request();
        view.apply_response(older, Ok(Vec::new()));
        assert!(view.is_loading());

        view.apply_response(newer, Err(RemoteError::network("api", "refused")));
        assert!(!view.is_loading());
    }

    #[test]
    fn server_filter_results_are_refined_locally() {
        let mut view: TableView<Item> = TableView::default();
        view.set_search("bolt");
        view.set_date_range("qcDate", Some(day(2)), Some(day(10)));

        let request = view.set_server_filter("category", "Raw");
        assert_eq!(request.filters.get("category").map(String::as_str), Some("Raw"));

        let mut bolt = item(1, "B-1", 5.0, Some(day(5)));
        bolt.name = "Hex Bolt".to_owned();
        let mut early_bolt = item(2, "B-2", 5.0, Some(day(1)));
        early_bolt.name = "Carriage Bolt".to_owned();
        let nut = item(3, "N-1", 5.0, Some(day(5)));

        let outcome = view.apply_server_filter(request.ticket, Ok(vec![bolt, early_bolt, nut]));
        assert_eq!(outcome, LoadOutcome::Loaded { count: 1 });
        assert_eq!(view.records().len(), 1);
        assert_eq!(view.records()[0].code, "B-1");
    }

    #[test]
    fn rapid_server_filters_keep_only_the_last() {
        let mut view: TableView<Item> = TableView::default();

        let first = view.set_server_filter("category", "Raw");
        let second = view.set_server_filter("category", "Finished");

        view.apply_server_filter(second.ticket, Ok(vec![item(2, "FIN", 1.0, None)]));
        let stale = view.apply_server_filter(first.ticket, Ok(vec![item(1, "RAW", 1.0, None)]));
        assert_eq!(stale, LoadOutcome::Stale);
        assert_eq!(view.records()[0].code, "FIN");
        assert!(view.server_filters().get("category").is_some_and(|v| v == "Finished"));
    }

    #[test]
    fn filter_options_start_with_all_and_keep_fetch_order() {
        let view = TableView::with_records(vec![
            company(1, "CMP001", "Texas", RecordStatus::Active),
            company(2, "CMP002", "Florida", RecordStatus::Active),
            company(3, "CMP003", "Texas", RecordStatus::Active),
        ]);

        assert_eq!(view.filter_options("state"), ["All", "Texas", "Florida"]);
    }

    #[test]
    fn reload_clamps_page_past_the_end() {
        let mut view = TableView::with_records(numbered_users(25));
        view.set_page(2);

        view.load(&mut || Ok::<_, RemoteError>(numbered_users(12)));
        assert_eq!(view.page_index(), 1);
    }

    #[test]
    fn controller_cells_follow_column_order() {
        let view = TableView::with_records(vec![company(7, "CMP007", "Ohio", RecordStatus::Inactive)]);
        let controller: &dyn PageController = &view;

        let cells = controller.visible_cells();
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0][0], "CMP007");
        assert_eq!(cells[0][4], "Inactive");
        assert_eq!(controller.visible_ids(), ["7"]);
    }
}
