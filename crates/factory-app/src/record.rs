// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::cmp::Ordering;

use time::Date;
use time::macros::format_description;

use crate::{Company, Item, Job, Role, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Numeric,
    Boolean,
    Date,
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub key: &'static str,
    pub label: &'static str,
    pub kind: ColumnKind,
    pub sortable: bool,
    pub filterable: bool,
}

impl ColumnSpec {
    const fn text(key: &'static str, label: &'static str) -> Self {
        Self {
            key,
            label,
            kind: ColumnKind::Text,
            sortable: true,
            filterable: false,
        }
    }

    const fn of(key: &'static str, label: &'static str, kind: ColumnKind) -> Self {
        Self {
            key,
            label,
            kind,
            sortable: true,
            filterable: false,
        }
    }

    const fn filterable(mut self) -> Self {
        self.filterable = true;
        self
    }

    const fn unsorted(mut self) -> Self {
        self.sortable = false;
        self
    }
}

/// A typed cell value pulled out of a record for display, matching and ordering.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Number(f64),
    Bool(bool),
    Date(Date),
    List(Vec<String>),
    Null,
}

impl FieldValue {
    pub fn text(value: &str) -> Self {
        Self::Text(value.to_owned())
    }

    pub fn date(value: Option<Date>) -> Self {
        value.map_or(Self::Null, Self::Date)
    }

    /// Empty text and empty lists count as missing.
    pub fn is_null(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(value) => value.is_empty(),
            Self::List(values) => values.is_empty(),
            Self::Number(value) => value.is_nan(),
            Self::Integer(_) | Self::Bool(_) | Self::Date(_) => false,
        }
    }

    pub fn display(&self) -> String {
        match self {
            Self::Text(value) => value.clone(),
            Self::Integer(value) => value.to_string(),
            Self::Number(value) => value.to_string(),
            Self::Bool(true) => "Yes".to_owned(),
            Self::Bool(false) => "No".to_owned(),
            Self::Date(value) => format_date(*value),
            Self::List(values) => values.join(", "),
            Self::Null => String::new(),
        }
    }

    /// Equality predicate; list fields match when any element is equal.
    pub fn matches(&self, accepted: &str) -> bool {
        match self {
            Self::List(values) => values.iter().any(|value| value == accepted),
            Self::Null => false,
            other => other.display() == accepted,
        }
    }

    /// `needle` must already be lowercase.
    pub fn contains_folded(&self, needle: &str) -> bool {
        if needle.is_empty() {
            return true;
        }
        self.display().to_lowercase().contains(needle)
    }

    /// Orders two present values. Null placement is the caller's concern.
    pub fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Integer(a), Self::Number(b)) => (*a as f64).total_cmp(b),
            (Self::Number(a), Self::Integer(b)) => a.total_cmp(&(*b as f64)),
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Date(a), Self::Date(b)) => a.cmp(b),
            _ => compare_text(&self.display(), &other.display()),
        }
    }
}

/// Case-insensitive order with lowercase ahead of uppercase on ties.
pub fn compare_text(left: &str, right: &str) -> Ordering {
    left.to_lowercase()
        .cmp(&right.to_lowercase())
        .then_with(|| right.cmp(left))
}

pub fn format_date(date: Date) -> String {
    date.format(format_description!("[day]/[month]/[year]"))
        .unwrap_or_else(|_| date.to_string())
}

/// A flat row the generic table view can search, filter and sort.
pub trait Record {
    const COLUMNS: &'static [ColumnSpec];
    /// Fields matched by the free-text search box.
    const SEARCH_FIELDS: &'static [&'static str];

    fn id(&self) -> String;

    /// Unknown keys yield `FieldValue::Null`.
    fn field(&self, key: &str) -> FieldValue;
}

pub fn column_spec<R: Record>(key: &str) -> Option<&'static ColumnSpec> {
    R::COLUMNS.iter().find(|column| column.key == key)
}

impl Record for User {
    const COLUMNS: &'static [ColumnSpec] = &[
        ColumnSpec::text("username", "Username"),
        ColumnSpec::text("name", "Name"),
        ColumnSpec::of("company", "Company", ColumnKind::List),
        ColumnSpec::of("engineeringTeam", "Team", ColumnKind::List),
        ColumnSpec::of("dateOfBirth", "Date of Birth", ColumnKind::Date),
        ColumnSpec::text("role", "Role").filterable(),
        ColumnSpec::text("status", "Status").filterable(),
    ];
    const SEARCH_FIELDS: &'static [&'static str] = &["username"];

    fn id(&self) -> String {
        self.user_id.to_string()
    }

    fn field(&self, key: &str) -> FieldValue {
        match key {
            "userId" => FieldValue::text(self.user_id.as_str()),
            "username" => FieldValue::text(&self.username),
            "firstName" => FieldValue::text(&self.first_name),
            "lastName" => FieldValue::text(&self.last_name),
            "name" => FieldValue::Text(self.full_name()),
            "company" => FieldValue::List(self.company.clone()),
            "engineeringTeam" => FieldValue::List(self.engineering_team.clone()),
            "dateOfBirth" => FieldValue::date(self.date_of_birth),
            "role" => FieldValue::text(&self.role),
            "status" => FieldValue::text(self.status.label()),
            "image" => FieldValue::text(&self.image),
            _ => FieldValue::Null,
        }
    }
}

impl Record for Company {
    const COLUMNS: &'static [ColumnSpec] = &[
        ColumnSpec::text("code", "Code"),
        ColumnSpec::text("name", "Company Name"),
        ColumnSpec::of("subcontractor", "Subcontractor", ColumnKind::Boolean).filterable(),
        ColumnSpec::text("state", "State").filterable(),
        ColumnSpec::text("status", "Status").filterable(),
        ColumnSpec::text("contactName", "Contact Name"),
        ColumnSpec::text("mobilePhone", "Mobile Phone").unsorted(),
        ColumnSpec::text("address", "Address").unsorted(),
    ];
    const SEARCH_FIELDS: &'static [&'static str] = &["code", "name"];

    fn id(&self) -> String {
        self.id.to_string()
    }

    fn field(&self, key: &str) -> FieldValue {
        match key {
            "id" => FieldValue::Integer(self.id.get()),
            "code" => FieldValue::text(&self.code),
            "name" => FieldValue::text(&self.name),
            "subcontractor" => FieldValue::Bool(self.subcontractor),
            "state" => FieldValue::text(&self.state),
            "status" => FieldValue::text(self.status.label()),
            "contactName" => FieldValue::text(&self.contact_name),
            "mobilePhone" => FieldValue::text(&self.mobile_phone),
            "address" => FieldValue::text(&self.address),
            _ => FieldValue::Null,
        }
    }
}

impl Record for Role {
    const COLUMNS: &'static [ColumnSpec] = &[
        ColumnSpec::of("id", "ID", ColumnKind::Numeric),
        ColumnSpec::text("name", "Role"),
        ColumnSpec::text("description", "Description"),
        ColumnSpec::of("permissions", "Permissions", ColumnKind::List).unsorted(),
    ];
    const SEARCH_FIELDS: &'static [&'static str] = &["name"];

    fn id(&self) -> String {
        self.id.to_string()
    }

    fn field(&self, key: &str) -> FieldValue {
        match key {
            "id" => FieldValue::Integer(self.id.get()),
            "name" => FieldValue::text(&self.name),
            "description" => FieldValue::text(&self.description),
            "permissions" => FieldValue::List(
                self.permissions
                    .iter()
                    .map(|permission| permission.label())
                    .collect(),
            ),
            _ => FieldValue::Null,
        }
    }
}

impl Record for Item {
    const COLUMNS: &'static [ColumnSpec] = &[
        ColumnSpec::text("code", "Code"),
        ColumnSpec::text("name", "Name"),
        ColumnSpec::text("category", "Category").filterable(),
        ColumnSpec::text("material", "Material").filterable(),
        ColumnSpec::of("quantity", "Quantity", ColumnKind::Numeric),
        ColumnSpec::text("unit", "Unit"),
        ColumnSpec::text("status", "Status").filterable(),
        ColumnSpec::of("qcDate", "QC Date", ColumnKind::Date),
    ];
    const SEARCH_FIELDS: &'static [&'static str] = &["code", "name"];

    fn id(&self) -> String {
        self.id.to_string()
    }

    fn field(&self, key: &str) -> FieldValue {
        match key {
            "id" => FieldValue::Integer(self.id.get()),
            "code" => FieldValue::text(&self.code),
            "name" => FieldValue::text(&self.name),
            "category" => FieldValue::text(&self.category),
            "material" => FieldValue::text(&self.material),
            "quantity" => FieldValue::Number(self.quantity),
            "unit" => FieldValue::text(&self.unit),
            "status" => FieldValue::text(&self.status),
            "qcDate" => FieldValue::date(self.qc_date),
            _ => FieldValue::Null,
        }
    }
}

impl Record for Job {
    const COLUMNS: &'static [ColumnSpec] = &[
        ColumnSpec::text("code", "Code"),
        ColumnSpec::text("name", "Job"),
        ColumnSpec::text("companyCode", "Company").filterable(),
        ColumnSpec::text("status", "Status").filterable(),
        ColumnSpec::of("startDate", "Start", ColumnKind::Date),
        ColumnSpec::of("dueDate", "Due", ColumnKind::Date),
    ];
    const SEARCH_FIELDS: &'static [&'static str] = &["code", "name"];

    fn id(&self) -> String {
        self.id.to_string()
    }

    fn field(&self, key: &str) -> FieldValue {
        match key {
            "id" => FieldValue::Integer(self.id.get()),
            "code" => FieldValue::text(&self.code),
            "name" => FieldValue::text(&self.name),
            "companyCode" => FieldValue::text(&self.company_code),
            "status" => FieldValue::text(self.status.label()),
            "startDate" => FieldValue::date(self.start_date),
            "dueDate" => FieldValue::date(self.due_date),
            _ => FieldValue::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use time::{Date, Month};

    use super::{FieldValue, compare_text};

    #[test]
    fn text_compare_folds_case_then_breaks_ties() {
        assert_eq!(compare_text("alpha", "Beta"), Ordering::Less);
        assert_eq!(compare_text("Beta", "alpha"), Ordering::Greater);
        assert_eq!(compare_text("a", "A"), Ordering::Less);
        assert_eq!(compare_text("same", "same"), Ordering::Equal);
    }

    #[test]
    fn numbers_compare_numerically_not_lexically() {
        let nine = FieldValue::Number(9.0);
        let ten = FieldValue::Integer(10);
        assert_eq!(nine.compare(&ten), Ordering::Less);
        assert_eq!(
            FieldValue::text("9").compare(&FieldValue::text("10")),
            Ordering::Greater
        );
    }

    #[test]
    fn dates_display_day_first() {
        let date = Date::from_calendar_date(2024, Month::March, 7).expect("valid date");
        assert_eq!(FieldValue::Date(date).display(), "07/03/2024");
    }

    #[test]
    fn list_fields_match_by_inclusion() {
        let teams = FieldValue::List(vec!["Welding".to_owned(), "Assembly".to_owned()]);
        assert!(teams.matches("Assembly"));
        assert!(!teams.matches("Paint"));
        assert!(!FieldValue::Null.matches(""));
    }

    #[test]
    fn empty_values_count_as_null() {
        assert!(FieldValue::text("").is_null());
        assert!(FieldValue::List(Vec::new()).is_null());
        assert!(FieldValue::date(None).is_null());
        assert!(!FieldValue::Bool(false).is_null());
    }
}
