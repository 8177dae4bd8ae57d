// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::BTreeSet;

use factory_app::{
    ChangePasswordInput, Company, CompanyFormInput, CompanyId, FieldErrors, FormKind,
    FormPayload, LoginFormInput, Permission, PermissionId, RecordStatus, Role, RoleId,
    RolePermissionsInput, TeamId, User, UserFormInput, format_date,
};

use crate::FormOptions;

const MASK: char = '•';

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FieldInput {
    Text(String),
    Secret(String),
    Toggle(bool),
    Status(Option<RecordStatus>),
    Choice {
        options: Vec<(i64, String)>,
        selected: Option<usize>,
    },
    Multi {
        options: Vec<(i64, String)>,
        chosen: BTreeSet<usize>,
        cursor: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FormField {
    pub key: &'static str,
    pub label: &'static str,
    pub input: FieldInput,
}

impl FormField {
    fn text(key: &'static str, label: &'static str, value: &str) -> Self {
        Self {
            key,
            label,
            input: FieldInput::Text(value.to_owned()),
        }
    }

    fn secret(key: &'static str, label: &'static str) -> Self {
        Self {
            key,
            label,
            input: FieldInput::Secret(String::new()),
        }
    }

    fn display_value(&self, focused: bool) -> String {
        match &self.input {
            FieldInput::Text(value) => value.clone(),
            FieldInput::Secret(value) => value.chars().map(|_| MASK).collect(),
            FieldInput::Toggle(on) => if *on { "[x]" } else { "[ ]" }.to_owned(),
            FieldInput::Status(status) => status
                .map(|status| format!("< {} >", status.label()))
                .unwrap_or_else(|| "< choose >".to_owned()),
            FieldInput::Choice { options, selected } => selected
                .and_then(|index| options.get(index))
                .map(|(_, label)| format!("< {label} >"))
                .unwrap_or_else(|| "< choose >".to_owned()),
            FieldInput::Multi {
                options,
                chosen,
                cursor,
            } => options
                .iter()
                .enumerate()
                .map(|(index, (_, label))| {
                    let mark = if chosen.contains(&index) { "x" } else { " " };
                    if focused && index == *cursor {
                        format!(">[{mark}] {label}")
                    } else {
                        format!("[{mark}] {label}")
                    }
                })
                .collect::<Vec<_>>()
                .join("  "),
        }
    }
}

/// An open form: its fields, cursor, last validation result and the record
/// it edits, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FormUiState {
    pub kind: FormKind,
    pub fields: Vec<FormField>,
    pub focus: usize,
    pub errors: FieldErrors,
    pub target: Option<String>,
}

impl FormUiState {
    fn with_fields(kind: FormKind, fields: Vec<FormField>) -> Self {
        Self {
            kind,
            fields,
            focus: 0,
            errors: FieldErrors::default(),
            target: None,
        }
    }

    pub fn login(username: &str) -> Self {
        let mut form = Self::with_fields(
            FormKind::Login,
            vec![
                FormField::text("username", "Username", username),
                FormField::secret("password", "Password"),
                FormField {
                    key: "rememberMe",
                    label: "Remember me",
                    input: FieldInput::Toggle(false),
                },
            ],
        );
        if !username.is_empty() {
            form.focus = 1;
        }
        form
    }

    pub fn user(options: &FormOptions, existing: Option<&User>) -> Self {
        let kind = if existing.is_some() {
            FormKind::EditUser
        } else {
            FormKind::AddUser
        };
        let role_options: Vec<(i64, String)> = options
            .roles
            .iter()
            .map(|role| (role.id.get(), role.name.clone()))
            .collect();
        let team_options: Vec<(i64, String)> = options
            .teams
            .iter()
            .map(|team| (team.id.get(), team.name.clone()))
            .collect();
        let company_options: Vec<(i64, String)> = options
            .companies
            .iter()
            .map(|company| (company.id.get(), company.name.clone()))
            .collect();

        let pick_many = |options: &[(i64, String)], names: &[String]| -> BTreeSet<usize> {
            options
                .iter()
                .enumerate()
                .filter(|(_, (_, label))| names.iter().any(|name| name == label))
                .map(|(index, _)| index)
                .collect()
        };

        let (role, teams, companies) = match existing {
            Some(user) => (
                role_options
                    .iter()
                    .position(|(_, name)| name.eq_ignore_ascii_case(&user.role)),
                pick_many(&team_options, &user.engineering_team),
                pick_many(&company_options, &user.company),
            ),
            None => (None, BTreeSet::new(), BTreeSet::new()),
        };

        let mut fields = vec![
            FormField::text(
                "firstName",
                "First name",
                existing.map_or("", |user| user.first_name.as_str()),
            ),
            FormField::text(
                "lastName",
                "Last name",
                existing.map_or("", |user| user.last_name.as_str()),
            ),
            FormField::text(
                "userName",
                "Username",
                existing.map_or("", |user| user.username.as_str()),
            ),
        ];
        if existing.is_none() {
            fields.push(FormField::secret("password", "Password"));
        }
        fields.extend([
            FormField {
                key: "role",
                label: "Role",
                input: FieldInput::Choice {
                    options: role_options,
                    selected: role,
                },
            },
            FormField {
                key: "engineeringTeams",
                label: "Teams",
                input: FieldInput::Multi {
                    options: team_options,
                    chosen: teams,
                    cursor: 0,
                },
            },
            FormField {
                key: "company",
                label: "Companies",
                input: FieldInput::Multi {
                    options: company_options,
                    chosen: companies,
                    cursor: 0,
                },
            },
            FormField::text(
                "dateOfBirth",
                "Date of birth (dd/mm/yyyy)",
                &existing
                    .and_then(|user| user.date_of_birth)
                    .map(format_date)
                    .unwrap_or_default(),
            ),
            FormField {
                key: "status",
                label: "Status",
                input: FieldInput::Status(Some(
                    existing.map_or(RecordStatus::Active, |user| user.status),
                )),
            },
        ]);

        let mut form = Self::with_fields(kind, fields);
        form.target = existing.map(|user| user.user_id.to_string());
        form
    }

    pub fn company(existing: Option<&Company>) -> Self {
        let kind = if existing.is_some() {
            FormKind::EditCompany
        } else {
            FormKind::AddCompany
        };
        let value = |pick: fn(&Company) -> &str| existing.map_or("", pick);
        let fields = vec![
            FormField::text("code", "Code", value(|company| &company.code)),
            FormField::text("name", "Company name", value(|company| &company.name)),
            FormField {
                key: "subcontractor",
                label: "Subcontractor",
                input: FieldInput::Toggle(existing.is_some_and(|company| company.subcontractor)),
            },
            FormField::text("state", "State", value(|company| &company.state)),
            FormField {
                key: "status",
                label: "Status",
                input: FieldInput::Status(Some(
                    existing.map_or(RecordStatus::Active, |company| company.status),
                )),
            },
            FormField::text(
                "contactName",
                "Contact name",
                value(|company| &company.contact_name),
            ),
            FormField::text(
                "mobilePhone",
                "Mobile phone",
                value(|company| &company.mobile_phone),
            ),
            FormField::text("address", "Address", value(|company| &company.address)),
        ];
        let mut form = Self::with_fields(kind, fields);
        form.target = existing.map(|company| company.id.to_string());
        form
    }

    pub fn change_password(user: &User) -> Self {
        let mut form = Self::with_fields(
            FormKind::ChangePassword,
            vec![
                FormField::secret("newPassword", "New password"),
                FormField::secret("confirmPassword", "Confirm password"),
            ],
        );
        form.target = Some(user.user_id.to_string());
        form
    }

    pub fn role_permissions(role: &Role, permissions: &[Permission]) -> Self {
        let options: Vec<(i64, String)> = permissions
            .iter()
            .map(|permission| (permission.id.get(), permission.label()))
            .collect();
        let chosen = permissions
            .iter()
            .enumerate()
            .filter(|(_, permission)| role.permissions.iter().any(|held| held.id == permission.id))
            .map(|(index, _)| index)
            .collect();
        let mut form = Self::with_fields(
            FormKind::RolePermissions,
            vec![FormField {
                key: "permissions",
                label: "Permissions",
                input: FieldInput::Multi {
                    options,
                    chosen,
                    cursor: 0,
                },
            }],
        );
        form.target = Some(role.id.to_string());
        form
    }

    pub fn title(&self) -> &'static str {
        self.kind.label()
    }

    pub fn focused(&self) -> Option<&FormField> {
        self.fields.get(self.focus)
    }

    pub fn move_focus(&mut self, delta: isize) {
        if self.fields.is_empty() {
            return;
        }
        let len = self.fields.len() as isize;
        self.focus = (self.focus as isize + delta).rem_euclid(len) as usize;
    }

    pub fn insert_char(&mut self, ch: char) {
        if let Some(field) = self.fields.get_mut(self.focus) {
            match &mut field.input {
                FieldInput::Text(value) | FieldInput::Secret(value) => value.push(ch),
                _ => {}
            }
        }
    }

    pub fn backspace(&mut self) {
        if let Some(field) = self.fields.get_mut(self.focus) {
            match &mut field.input {
                FieldInput::Text(value) | FieldInput::Secret(value) => {
                    value.pop();
                }
                _ => {}
            }
        }
    }

    /// Space: flips toggles and checks the option under the cursor.
    pub fn toggle(&mut self) {
        let Some(field) = self.fields.get_mut(self.focus) else {
            return;
        };
        match &mut field.input {
            FieldInput::Toggle(on) => *on = !*on,
            FieldInput::Multi { chosen, cursor, .. } => {
                if !chosen.remove(cursor) {
                    chosen.insert(*cursor);
                }
            }
            FieldInput::Text(value) => value.push(' '),
            FieldInput::Secret(value) => value.push(' '),
            FieldInput::Status(_) | FieldInput::Choice { .. } => self.shift(1),
        }
    }

    /// Left/right: cycles choices or moves the option cursor.
    pub fn shift(&mut self, delta: isize) {
        let Some(field) = self.fields.get_mut(self.focus) else {
            return;
        };
        match &mut field.input {
            FieldInput::Status(status) => {
                *status = Some(match status {
                    Some(RecordStatus::Active) => RecordStatus::Inactive,
                    _ => RecordStatus::Active,
                });
            }
            FieldInput::Choice { options, selected } => {
                if options.is_empty() {
                    return;
                }
                let len = options.len() as isize;
                let next = match selected {
                    Some(index) => (*index as isize + delta).rem_euclid(len),
                    None if delta < 0 => len - 1,
                    None => 0,
                };
                *selected = Some(next as usize);
            }
            FieldInput::Multi {
                options, cursor, ..
            } => {
                if options.is_empty() {
                    return;
                }
                let len = options.len() as isize;
                *cursor = (*cursor as isize + delta).rem_euclid(len) as usize;
            }
            FieldInput::Toggle(on) => *on = !*on,
            FieldInput::Text(_) | FieldInput::Secret(_) => {}
        }
    }

    fn text(&self, key: &str) -> String {
        self.fields
            .iter()
            .find(|field| field.key == key)
            .map(|field| match &field.input {
                FieldInput::Text(value) | FieldInput::Secret(value) => value.clone(),
                _ => String::new(),
            })
            .unwrap_or_default()
    }

    fn flag(&self, key: &str) -> bool {
        self.fields.iter().any(|field| {
            field.key == key && matches!(field.input, FieldInput::Toggle(true))
        })
    }

    fn status(&self) -> Option<RecordStatus> {
        self.fields.iter().find_map(|field| match field.input {
            FieldInput::Status(status) => status,
            _ => None,
        })
    }

    fn choice(&self, key: &str) -> Option<i64> {
        self.fields
            .iter()
            .find(|field| field.key == key)
            .and_then(|field| match &field.input {
                FieldInput::Choice { options, selected } => {
                    selected.and_then(|index| options.get(index)).map(|(id, _)| *id)
                }
                _ => None,
            })
    }

    fn chosen(&self, key: &str) -> Vec<i64> {
        self.fields
            .iter()
            .find(|field| field.key == key)
            .map(|field| match &field.input {
                FieldInput::Multi {
                    options, chosen, ..
                } => chosen
                    .iter()
                    .filter_map(|index| options.get(*index))
                    .map(|(id, _)| *id)
                    .collect(),
                _ => Vec::new(),
            })
            .unwrap_or_default()
    }

    /// Typed input for submission; validation happens on the result.
    pub fn payload(&self) -> Option<FormPayload> {
        let payload = match self.kind {
            FormKind::Login => FormPayload::Login(LoginFormInput {
                username: self.text("username"),
                password: self.text("password"),
                remember_me: self.flag("rememberMe"),
            }),
            FormKind::AddUser | FormKind::EditUser => FormPayload::User(UserFormInput {
                first_name: self.text("firstName"),
                last_name: self.text("lastName"),
                username: self.text("userName"),
                password: (self.kind == FormKind::AddUser).then(|| self.text("password")),
                role: self.choice("role").map(RoleId::new),
                engineering_teams: self
                    .chosen("engineeringTeams")
                    .into_iter()
                    .map(TeamId::new)
                    .collect(),
                company: self
                    .chosen("company")
                    .into_iter()
                    .map(CompanyId::new)
                    .collect(),
                date_of_birth: self.text("dateOfBirth"),
                status: self.status(),
            }),
            FormKind::AddCompany | FormKind::EditCompany => {
                FormPayload::Company(CompanyFormInput {
                    code: self.text("code"),
                    name: self.text("name"),
                    subcontractor: self.flag("subcontractor"),
                    state: self.text("state"),
                    status: self.status(),
                    contact_name: self.text("contactName"),
                    mobile_phone: self.text("mobilePhone"),
                    address: self.text("address"),
                })
            }
            FormKind::ChangePassword => FormPayload::ChangePassword(ChangePasswordInput {
                new_password: self.text("newPassword"),
                confirm_password: self.text("confirmPassword"),
            }),
            FormKind::RolePermissions => FormPayload::RolePermissions(RolePermissionsInput {
                role_id: RoleId::new(
                    self.target
                        .as_deref()
                        .and_then(|id| id.parse().ok())
                        .unwrap_or(0),
                ),
                permission_ids: self
                    .chosen("permissions")
                    .into_iter()
                    .map(PermissionId::new)
                    .collect(),
            }),
            FormKind::ColumnConfig => return None,
        };
        Some(payload)
    }

    pub fn render_text(&self) -> String {
        let mut lines = Vec::with_capacity(self.fields.len() * 2 + 2);
        for (index, field) in self.fields.iter().enumerate() {
            let focused = index == self.focus;
            let marker = if focused { ">" } else { " " };
            lines.push(format!(
                "{marker} {}: {}",
                field.label,
                field.display_value(focused)
            ));
            if let Some(message) = self.errors.message_for(field.key) {
                lines.push(format!("    ! {message}"));
            }
        }
        lines.push(String::new());
        lines.push(
            "tab/shift+tab field | space toggle | ←/→ choose | enter submit | esc cancel"
                .to_owned(),
        );
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::{FieldInput, FormUiState};
    use crate::FormOptions;
    use factory_app::{
        CompanyOption, CompanyId, FormKind, FormPayload, Permission, PermissionId,
        RecordStatus, Role, RoleId, Team, TeamId, User, UserId,
    };
    use time::{Date, Month};

    fn options() -> FormOptions {
        FormOptions {
            roles: vec![
                Role {
                    id: RoleId::new(2),
                    name: "ADMIN".to_owned(),
                    description: String::new(),
                    permissions: Vec::new(),
                },
                Role {
                    id: RoleId::new(3),
                    name: "OPERATOR".to_owned(),
                    description: String::new(),
                    permissions: Vec::new(),
                },
            ],
            teams: vec![
                Team {
                    id: TeamId::new(1),
                    name: "Welding".to_owned(),
                },
                Team {
                    id: TeamId::new(2),
                    name: "Assembly".to_owned(),
                },
            ],
            companies: vec![CompanyOption {
                id: CompanyId::new(7),
                name: "Atlas Castings Ltd".to_owned(),
            }],
        }
    }

    fn type_text(form: &mut FormUiState, text: &str) {
        for ch in text.chars() {
            form.insert_char(ch);
        }
    }

    #[test]
    fn login_form_builds_payload_and_masks_password() {
        let mut form = FormUiState::login("");
        type_text(&mut form, "alice");
        form.move_focus(1);
        type_text(&mut form, "pw");
        form.move_focus(1);
        form.toggle();

        let Some(FormPayload::Login(login)) = form.payload() else {
            panic!("login payload expected");
        };
        assert_eq!(login.username, "alice");
        assert_eq!(login.password, "pw");
        assert!(login.remember_me);
        assert!(form.render_text().contains("Password: ••"));
        assert!(!form.render_text().contains("pw\n"));
    }

    #[test]
    fn edit_user_form_prefills_choices_by_name() {
        let user = User {
            user_id: UserId::new("11"),
            username: "jdoe".to_owned(),
            first_name: "Jane".to_owned(),
            last_name: "Doe".to_owned(),
            company: vec!["Atlas Castings Ltd".to_owned()],
            engineering_team: vec!["Assembly".to_owned()],
            date_of_birth: Date::from_calendar_date(1990, Month::March, 7).ok(),
            role: "operator".to_owned(),
            status: RecordStatus::Inactive,
            image: String::new(),
            project_manager: None,
        };
        let form = FormUiState::user(&options(), Some(&user));
        assert_eq!(form.kind, FormKind::EditUser);
        assert_eq!(form.target.as_deref(), Some("11"));
        assert!(form.fields.iter().all(|field| field.key != "password"));

        let Some(FormPayload::User(input)) = form.payload() else {
            panic!("user payload expected");
        };
        assert_eq!(input.role, Some(RoleId::new(3)));
        assert_eq!(input.engineering_teams, [TeamId::new(2)]);
        assert_eq!(input.company, [CompanyId::new(7)]);
        assert_eq!(input.date_of_birth, "07/03/1990");
        assert_eq!(input.status, Some(RecordStatus::Inactive));
        assert!(input.password.is_none());
        assert!(input.validate().is_ok());
    }

    #[test]
    fn multi_choice_toggles_under_the_cursor() {
        let mut form = FormUiState::user(&options(), None);
        form.focus = form
            .fields
            .iter()
            .position(|field| field.key == "engineeringTeams")
            .expect("teams field");
        form.toggle();
        form.shift(1);
        form.toggle();
        form.toggle();

        let FieldInput::Multi { chosen, cursor, .. } = &form.fields[form.focus].input else {
            panic!("multi field expected");
        };
        assert_eq!(*cursor, 1);
        assert_eq!(chosen.iter().copied().collect::<Vec<_>>(), [0]);
    }

    #[test]
    fn role_choice_wraps_both_ways() {
        let mut form = FormUiState::user(&options(), None);
        form.focus = form
            .fields
            .iter()
            .position(|field| field.key == "role")
            .expect("role field");

        form.shift(-1);
        let Some(FormPayload::User(input)) = form.payload() else {
            panic!("user payload expected");
        };
        assert_eq!(input.role, Some(RoleId::new(3)));

        form.shift(1);
        let Some(FormPayload::User(input)) = form.payload() else {
            panic!("user payload expected");
        };
        assert_eq!(input.role, Some(RoleId::new(2)));
    }

    #[test]
    fn validation_messages_render_under_their_fields() {
        let mut form = FormUiState::user(&options(), None);
        let payload = form.payload().expect("payload");
        form.errors = payload.validate().expect_err("blank form is invalid");

        let text = form.render_text();
        assert!(text.contains("First name is required"));
        assert!(text.contains("At least one team must be selected"));
    }

    #[test]
    fn role_permissions_start_from_the_held_set() {
        let permissions = vec![
            Permission {
                id: PermissionId::new(1),
                name: "ADD_USER".to_owned(),
            },
            Permission {
                id: PermissionId::new(2),
                name: "EDIT_USER".to_owned(),
            },
        ];
        let role = Role {
            id: RoleId::new(4),
            name: "SUPERVISOR".to_owned(),
            description: String::new(),
            permissions: vec![permissions[1].clone()],
        };
        let mut form = FormUiState::role_permissions(&role, &permissions);
        form.toggle();

        let Some(FormPayload::RolePermissions(input)) = form.payload() else {
            panic!("role payload expected");
        };
        assert_eq!(input.role_id, RoleId::new(4));
        assert_eq!(
            input.permission_ids,
            [PermissionId::new(1), PermissionId::new(2)]
        );
        assert!(form.render_text().contains("Add User"));
    }
}
