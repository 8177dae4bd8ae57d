// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use thiserror::Error;
use time::Date;
use time::macros::format_description;

use crate::{CompanyId, FormKind, PermissionId, RecordStatus, RoleId, TeamId};

pub const NAME_MIN: usize = 3;
pub const NAME_MAX: usize = 30;
pub const PASSWORD_MIN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Every invalid field of one submission, in form order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("{}", summarize(.errors))]
pub struct FieldErrors {
    errors: Vec<FieldError>,
}

impl FieldErrors {
    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.errors.iter()
    }

    /// First message for `field`, for inline display.
    pub fn message_for(&self, field: &str) -> Option<&str> {
        self.errors
            .iter()
            .find(|error| error.field == field)
            .map(|error| error.message.as_str())
    }

    fn into_result(self) -> Result<(), Self> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

fn summarize(errors: &[FieldError]) -> String {
    match errors {
        [] => "form is valid".to_owned(),
        [only] => format!("{}: {}", only.field, only.message),
        [first, rest @ ..] => format!(
            "{}: {} (and {} more -- fix the highlighted fields and retry)",
            first.field,
            first.message,
            rest.len()
        ),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginFormInput {
    pub username: String,
    pub password: String,
    pub remember_me: bool,
}

impl LoginFormInput {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::default();
        if self.username.trim().is_empty() {
            errors.push("username", "Username is required");
        }
        if self.password.is_empty() {
            errors.push("password", "Password is required");
        }
        errors.into_result()
    }
}

/// Create carries a password; edit leaves it `None` and skips that rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFormInput {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub password: Option<String>,
    pub role: Option<RoleId>,
    pub engineering_teams: Vec<TeamId>,
    pub company: Vec<CompanyId>,
    pub date_of_birth: String,
    pub status: Option<RecordStatus>,
}

impl UserFormInput {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::default();
        check_letters(&mut errors, "firstName", "First name", &self.first_name);
        check_letters(&mut errors, "lastName", "Last name", &self.last_name);

        let username = self.username.trim();
        if username.is_empty() {
            errors.push("userName", "Username is required");
        } else if !username.chars().all(|c| c.is_ascii_alphanumeric()) {
            errors.push("userName", "Username must only contain letters and numbers");
        } else if let Some(message) = length_problem(username) {
            errors.push("userName", message);
        }

        if let Some(password) = &self.password
            && let Err(message) = check_password(password)
        {
            errors.push("password", message);
        }
        if self.role.is_none() {
            errors.push("role", "Role is required");
        }
        if self.engineering_teams.is_empty() {
            errors.push("engineeringTeams", "At least one team must be selected");
        }
        if self.company.is_empty() {
            errors.push("company", "At least one company must be selected");
        }
        if let Err(message) = parse_birth_date(&self.date_of_birth) {
            errors.push("dateOfBirth", message);
        }
        if self.status.is_none() {
            errors.push("status", "Status is required");
        }
        errors.into_result()
    }

    pub fn birth_date(&self) -> Option<Date> {
        parse_birth_date(&self.date_of_birth).ok()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompanyFormInput {
    pub code: String,
    pub name: String,
    pub subcontractor: bool,
    pub state: String,
    pub status: Option<RecordStatus>,
    pub contact_name: String,
    pub mobile_phone: String,
    pub address: String,
}

impl CompanyFormInput {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::default();
        let required = [
            ("code", "Code", &self.code),
            ("name", "Company name", &self.name),
            ("state", "State", &self.state),
            ("contactName", "Contact name", &self.contact_name),
            ("mobilePhone", "Mobile phone", &self.mobile_phone),
            ("address", "Address", &self.address),
        ];
        for (field, label, value) in required {
            if value.trim().is_empty() {
                errors.push(field, format!("{label} is required"));
            }
        }
        if self.status.is_none() {
            errors.push("status", "Status is required");
        }
        errors.into_result()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangePasswordInput {
    pub new_password: String,
    pub confirm_password: String,
}

impl ChangePasswordInput {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::default();
        if let Err(message) = check_password(&self.new_password) {
            errors.push("newPassword", message);
        }
        if self.confirm_password != self.new_password {
            errors.push("confirmPassword", "Passwords do not match");
        }
        errors.into_result()
    }
}

/// Bounds typed as `dd/mm/yyyy`; a blank bound leaves that side open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateRangeInput {
    pub from: String,
    pub to: String,
}

impl DateRangeInput {
    pub fn validate(&self) -> Result<(Option<Date>, Option<Date>), FieldErrors> {
        let mut errors = FieldErrors::default();
        let mut bound = |field: &'static str, raw: &str| {
            let raw = raw.trim();
            if raw.is_empty() {
                return None;
            }
            match Date::parse(raw, format_description!("[day]/[month]/[year]")) {
                Ok(date) => Some(date),
                Err(_) => {
                    errors.push(field, "Date must be in dd/mm/yyyy format");
                    None
                }
            }
        };
        let from = bound("from", &self.from);
        let to = bound("to", &self.to);
        if let (Some(from), Some(to)) = (from, to)
            && to < from
        {
            errors.push("to", "End date must not be before start date");
        }
        errors.into_result().map(|()| (from, to))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePermissionsInput {
    pub role_id: RoleId,
    pub permission_ids: Vec<PermissionId>,
}

impl RolePermissionsInput {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::default();
        if self.role_id.get() <= 0 {
            errors.push("role", "Role is required");
        }
        errors.into_result()
    }

    pub fn toggle(&mut self, permission: PermissionId) {
        if let Some(index) = self.permission_ids.iter().position(|id| *id == permission) {
            self.permission_ids.remove(index);
        } else {
            self.permission_ids.push(permission);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormPayload {
    Login(LoginFormInput),
    User(UserFormInput),
    Company(CompanyFormInput),
    ChangePassword(ChangePasswordInput),
    RolePermissions(RolePermissionsInput),
}

impl FormPayload {
    pub fn blank_for(kind: FormKind) -> Option<Self> {
        match kind {
            FormKind::Login => Some(Self::Login(LoginFormInput::default())),
            FormKind::AddUser => Some(Self::User(UserFormInput {
                password: Some(String::new()),
                status: Some(RecordStatus::Active),
                ..UserFormInput::default()
            })),
            FormKind::EditUser => Some(Self::User(UserFormInput::default())),
            FormKind::AddCompany | FormKind::EditCompany => {
                Some(Self::Company(CompanyFormInput::default()))
            }
            FormKind::ChangePassword => Some(Self::ChangePassword(ChangePasswordInput::default())),
            FormKind::RolePermissions => Some(Self::RolePermissions(RolePermissionsInput {
                role_id: RoleId::new(0),
                permission_ids: Vec::new(),
            })),
            FormKind::ColumnConfig => None,
        }
    }

    pub fn validate(&self) -> Result<(), FieldErrors> {
        match self {
            Self::Login(login) => login.validate(),
            Self::User(user) => user.validate(),
            Self::Company(company) => company.validate(),
            Self::ChangePassword(change) => change.validate(),
            Self::RolePermissions(assign) => assign.validate(),
        }
    }
}

fn length_problem(value: &str) -> Option<&'static str> {
    let len = value.chars().count();
    if len < NAME_MIN {
        Some("Minimum 3 letters")
    } else if len > NAME_MAX {
        Some("Maximum 30 letters")
    } else {
        None
    }
}

fn check_letters(errors: &mut FieldErrors, field: &'static str, label: &str, value: &str) {
    let value = value.trim();
    if value.is_empty() {
        errors.push(field, format!("{label} is required"));
    } else if !value.chars().all(|c| c.is_ascii_alphabetic()) {
        errors.push(field, format!("{label} must only contain letters"));
    } else if let Some(message) = length_problem(value) {
        errors.push(field, message);
    }
}

/// At least eight characters with lower, upper, digit and a symbol.
pub fn check_password(password: &str) -> Result<(), &'static str> {
    if password.is_empty() {
        return Err("Password is required");
    }
    if password.chars().count() < PASSWORD_MIN {
        return Err("Password must be at least 8 characters");
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err("Password must contain at least 1 lowercase");
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err("Password must contain at least 1 uppercase");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain at least 1 number");
    }
    if password.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err("Password must contain at least 1 special character");
    }
    Ok(())
}

/// `dd/mm/yyyy`, a real calendar day, years 1900 through 2099.
pub fn parse_birth_date(raw: &str) -> Result<Date, &'static str> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("Date of birth is required");
    }
    let date = Date::parse(raw, format_description!("[day]/[month]/[year]"))
        .map_err(|_| "Date must be in dd/mm/yyyy format")?;
    if !(1900..=2099).contains(&date.year()) {
        return Err("Date must be in dd/mm/yyyy format");
    }
    Ok(date)
}

#[cfg(test)]
mod tests {
    use time::Month;

    use super::{
        ChangePasswordInput, CompanyFormInput, DateRangeInput, FieldErrors, FormPayload,
        LoginFormInput, UserFormInput, check_password, parse_birth_date,
    };
    use crate::{CompanyId, FormKind, RecordStatus, RoleId, TeamId};

    fn valid_user() -> UserFormInput {
        UserFormInput {
            first_name: "Alice".to_owned(),
            last_name: "Nguyen".to_owned(),
            username: "alice01".to_owned(),
            password: Some("Str0ng!pass".to_owned()),
            role: Some(RoleId::new(3)),
            engineering_teams: vec![TeamId::new(1)],
            company: vec![CompanyId::new(2)],
            date_of_birth: "07/03/1990".to_owned(),
            status: Some(RecordStatus::Active),
        }
    }

    #[test]
    fn blank_payload_is_available_for_forms_with_inputs() {
        assert!(FormPayload::blank_for(FormKind::AddUser).is_some());
        assert!(FormPayload::blank_for(FormKind::Login).is_some());
        assert!(FormPayload::blank_for(FormKind::ColumnConfig).is_none());
    }

    #[test]
    fn login_requires_both_fields() {
        let errors = LoginFormInput::default()
            .validate()
            .expect_err("empty login should fail");
        assert_eq!(errors.len(), 2);
        assert_eq!(errors.message_for("username"), Some("Username is required"));
    }

    #[test]
    fn valid_user_passes() {
        assert!(valid_user().validate().is_ok());
    }

    #[test]
    fn user_errors_are_reported_per_field() {
        let input = UserFormInput {
            first_name: "Al".to_owned(),
            last_name: "O'Neil".to_owned(),
            username: "bad name".to_owned(),
            engineering_teams: Vec::new(),
            ..valid_user()
        };
        let errors = input.validate().expect_err("invalid user should fail");
        assert_eq!(errors.message_for("firstName"), Some("Minimum 3 letters"));
        assert_eq!(
            errors.message_for("lastName"),
            Some("Last name must only contain letters")
        );
        assert!(errors.message_for("userName").is_some());
        assert!(errors.message_for("engineeringTeams").is_some());
        assert!(errors.message_for("company").is_none());
    }

    #[test]
    fn edit_skips_password_rule() {
        let input = UserFormInput {
            password: None,
            ..valid_user()
        };
        assert!(input.validate().is_ok());
    }

    #[test]
    fn password_policy_needs_every_class() {
        assert!(check_password("Str0ng!pass").is_ok());
        assert_eq!(
            check_password("Sh0rt!"),
            Err("Password must be at least 8 characters")
        );
        assert_eq!(
            check_password("NoDigits!!"),
            Err("Password must contain at least 1 number")
        );
        assert_eq!(
            check_password("N0symbolsHere"),
            Err("Password must contain at least 1 special character")
        );
        assert!(check_password("under_score1A").is_ok());
    }

    #[test]
    fn birth_date_bounds() {
        let date = parse_birth_date("29/02/2000").expect("leap day parses");
        assert_eq!(date.month(), Month::February);
        assert!(parse_birth_date("31/02/2000").is_err());
        assert!(parse_birth_date("01/01/1899").is_err());
        assert!(parse_birth_date("2000-01-01").is_err());
        assert_eq!(parse_birth_date(" "), Err("Date of birth is required"));
    }

    #[test]
    fn company_requires_every_field() {
        let errors = CompanyFormInput::default()
            .validate()
            .expect_err("blank company should fail");
        assert_eq!(errors.len(), 7);
        assert_eq!(errors.message_for("code"), Some("Code is required"));
    }

    #[test]
    fn change_password_must_match() {
        let input = ChangePasswordInput {
            new_password: "Str0ng!pass".to_owned(),
            confirm_password: "Str0ng!pas".to_owned(),
        };
        let errors = input.validate().expect_err("mismatch should fail");
        assert_eq!(errors.len(), 1);
        assert!(errors.to_string().starts_with("confirmPassword"));
    }

    #[test]
    fn date_range_accepts_open_and_closed_bounds() -> anyhow::Result<()> {
        let open = DateRangeInput::default().validate()?;
        assert_eq!(open, (None, None));

        let range = DateRangeInput {
            from: "01/02/2025".to_owned(),
            to: " ".to_owned(),
        }
        .validate()?;
        assert_eq!(range.0.map(|date| date.month()), Some(Month::February));
        assert_eq!(range.1, None);
        Ok(())
    }

    #[test]
    fn date_range_rejects_bad_text_and_reversed_bounds() {
        let errors = DateRangeInput {
            from: "2025-02-01".to_owned(),
            to: String::new(),
        }
        .validate()
        .expect_err("iso text should fail");
        assert_eq!(
            errors.message_for("from"),
            Some("Date must be in dd/mm/yyyy format")
        );

        let errors = DateRangeInput {
            from: "10/03/2025".to_owned(),
            to: "09/03/2025".to_owned(),
        }
        .validate()
        .expect_err("reversed range should fail");
        assert_eq!(
            errors.message_for("to"),
            Some("End date must not be before start date")
        );
    }

    #[test]
    fn field_errors_summarize_the_first_failure() {
        let mut errors = FieldErrors::default();
        assert_eq!(errors.to_string(), "form is valid");
        errors.push("code", "Code is required");
        errors.push("name", "Name is required");
        let boxed: Box<dyn std::error::Error> = Box::new(errors);
        assert_eq!(
            boxed.to_string(),
            "code: Code is required (and 1 more -- fix the highlighted fields and retry)"
        );
    }
}
