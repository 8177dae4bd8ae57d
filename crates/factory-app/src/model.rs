// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::ids::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordStatus {
    Active,
    Inactive,
}

impl RecordStatus {
    pub const ALL: [Self; 2] = [Self::Active, Self::Inactive];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Inactive => "Inactive",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Some(Self::Active),
            "INACTIVE" => Some(Self::Inactive),
            _ => None,
        }
    }

    /// Anything the backend does not mark `ACTIVE` is shown as inactive.
    pub fn from_wire(value: &str) -> Self {
        if value == Self::Active.as_str() {
            Self::Active
        } else {
            Self::Inactive
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Planned,
    InProgress,
    OnHold,
    Completed,
}

impl JobStatus {
    pub const ALL: [Self; 4] = [
        Self::Planned,
        Self::InProgress,
        Self::OnHold,
        Self::Completed,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Planned => "PLANNED",
            Self::InProgress => "IN_PROGRESS",
            Self::OnHold => "ON_HOLD",
            Self::Completed => "COMPLETED",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Planned => "Planned",
            Self::InProgress => "In Progress",
            Self::OnHold => "On Hold",
            Self::Completed => "Completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PLANNED" => Some(Self::Planned),
            "IN_PROGRESS" => Some(Self::InProgress),
            "ON_HOLD" => Some(Self::OnHold),
            "COMPLETED" => Some(Self::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageKind {
    Users,
    Companies,
    Roles,
    Items,
    Jobs,
}

impl PageKind {
    pub const ALL: [Self; 5] = [
        Self::Users,
        Self::Companies,
        Self::Roles,
        Self::Items,
        Self::Jobs,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Companies => "companies",
            Self::Roles => "roles",
            Self::Items => "items",
            Self::Jobs => "jobs",
        }
    }

    /// Collection path relative to the API base URL.
    pub const fn collection_path(self) -> &'static str {
        match self {
            Self::Users => "users/get",
            Self::Companies => "companys/get",
            Self::Roles => "roles/get",
            Self::Items => "items/get",
            Self::Jobs => "jobs/get",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormKind {
    Login,
    AddUser,
    EditUser,
    ChangePassword,
    AddCompany,
    EditCompany,
    RolePermissions,
    ColumnConfig,
}

impl FormKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::AddUser => "add user",
            Self::EditUser => "edit user",
            Self::ChangePassword => "change password",
            Self::AddCompany => "add company",
            Self::EditCompany => "edit company",
            Self::RolePermissions => "role permissions",
            Self::ColumnConfig => "columns",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppMode {
    Nav,
    Search,
    Form(FormKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    pub const fn indicator(self) -> &'static str {
        match self {
            Self::Asc => " ↑",
            Self::Desc => " ↓",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: UserId,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub company: Vec<String>,
    pub engineering_team: Vec<String>,
    pub date_of_birth: Option<Date>,
    pub role: String,
    pub status: RecordStatus,
    pub image: String,
    pub project_manager: Option<bool>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_owned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub code: String,
    pub name: String,
    pub subcontractor: bool,
    pub state: String,
    pub status: RecordStatus,
    pub contact_name: String,
    pub mobile_phone: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub name: String,
}

impl Permission {
    pub fn label(&self) -> String {
        permission_label(&self.name)
    }
}

/// `ADD_USER` reads as `Add User`.
pub fn permission_label(name: &str) -> String {
    name.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let lower = word.to_ascii_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub description: String,
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub code: String,
    pub name: String,
    pub category: String,
    pub material: String,
    pub quantity: f64,
    pub unit: String,
    pub status: String,
    pub qc_date: Option<Date>,
    pub created_at: Option<OffsetDateTime>,
    pub updated_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub code: String,
    pub name: String,
    pub company_code: String,
    pub status: JobStatus,
    pub start_date: Option<Date>,
    pub due_date: Option<Date>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyOption {
    pub id: CompanyId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginGrant {
    pub authenticated: bool,
    pub token: String,
    pub expires_at: Option<OffsetDateTime>,
}

#[cfg(test)]
mod tests {
    use super::{JobStatus, PageKind, RecordStatus, permission_label};

    #[test]
    fn wire_status_maps_anything_but_active_to_inactive() {
        assert_eq!(RecordStatus::from_wire("ACTIVE"), RecordStatus::Active);
        assert_eq!(RecordStatus::from_wire("LOCKED"), RecordStatus::Inactive);
        assert_eq!(RecordStatus::from_wire("active"), RecordStatus::Inactive);
        assert_eq!(RecordStatus::parse("active"), Some(RecordStatus::Active));
    }

    #[test]
    fn job_status_round_trips_through_storage_names() {
        for status in JobStatus::ALL {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("paused"), None);
    }

    #[test]
    fn permission_names_read_as_title_case() {
        assert_eq!(permission_label("ADD_USER"), "Add User");
        assert_eq!(permission_label("VIEW__REPORTS"), "View Reports");
        assert_eq!(permission_label(""), "");
    }

    #[test]
    fn page_labels_are_unique() {
        let mut labels: Vec<_> = PageKind::ALL.iter().map(|page| page.label()).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), PageKind::ALL.len());
    }
}
