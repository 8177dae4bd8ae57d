// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Blocking client for the factory backend REST API.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use factory_app::{
    ChangePasswordInput, Company, CompanyFormInput, CompanyId, CompanyOption, Item, ItemId, Job,
    JobId, JobStatus, LoginFormInput, LoginGrant, PageKind, Permission, PermissionId,
    RecordStatus, RemoteError, Role, RoleId, RolePermissionsInput, Team, TeamId, Token, User,
    UserFormInput, UserId,
};
use reqwest::blocking::{Client as HttpClient, RequestBuilder};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/factory/api";
/// Page size used to pull a whole collection in one request.
pub const DEFAULT_FETCH_SIZE: usize = 10_000;

#[derive(Clone)]
pub struct Client {
    base_url: String,
    fetch_size: usize,
    timeout: Duration,
    http: HttpClient,
    bearer: Option<String>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url)
            .field("fetch_size", &self.fetch_size)
            .field("timeout", &self.timeout)
            .field("authorized", &self.bearer.is_some())
            .finish()
    }
}

impl Client {
    pub fn new(base_url: &str, fetch_size: usize, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            bail!("api.base_url must not be empty");
        }
        let parsed = Url::parse(&base_url)
            .with_context(|| format!("api.base_url {base_url:?} is not a valid URL"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!(
                "api.base_url must use http or https, got {}://",
                parsed.scheme()
            );
        }
        if fetch_size == 0 {
            bail!("api.fetch_size must be at least 1");
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            base_url,
            fetch_size,
            timeout,
            http,
            bearer: None,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn fetch_size(&self) -> usize {
        self.fetch_size
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_authorized(&self) -> bool {
        self.bearer.is_some()
    }

    /// Every later request carries `Authorization: Bearer <token>`.
    pub fn authorize(&mut self, token: Option<&Token>) {
        self.bearer = token.map(|token| token.value.clone());
    }

    pub fn login(&self, input: &LoginFormInput) -> Result<LoginGrant, RemoteError> {
        let body = LoginRequest {
            username: input.username.trim(),
            password: &input.password,
        };
        let result: LoginResult = self.send(
            self.request(Method::POST, "auth/login").json(&body),
            "login",
        )?;
        if !result.authenticated {
            return Err(RemoteError::from_status(
                401,
                Some("Invalid username or password.".to_owned()),
            ));
        }
        let token = result
            .token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| RemoteError::Decode("login response has no token".to_owned()))?;
        let expires_at = result.expiry_at.as_ref().and_then(parse_timestamp);
        info!(username = input.username.trim(), "login accepted");
        Ok(LoginGrant {
            authenticated: true,
            token,
            expires_at,
        })
    }

    /// Best effort; callers clear local state whatever the outcome.
    pub fn logout(&self, token: &Token) -> Result<(), RemoteError> {
        let body = LogoutRequest {
            token: &token.value,
        };
        self.send_empty(
            self.request(Method::POST, "auth/logout").json(&body),
            "logout",
        )
    }

    pub fn my_info(&self) -> Result<User, RemoteError> {
        let user: ApiUser = self.send(self.request(Method::GET, "users/getmyinfo"), "profile")?;
        Ok(user.into_user())
    }

    pub fn user_details(&self, user_id: &UserId) -> Result<User, RemoteError> {
        let user: ApiUser = self.send(
            self.request(Method::GET, &format!("users/get/{user_id}")),
            "user details",
        )?;
        Ok(user.into_user())
    }

    pub fn list_users(&self) -> Result<Vec<User>, RemoteError> {
        self.fetch_collection::<ApiUser, _>(PageKind::Users, ApiUser::into_user)
    }

    pub fn list_companies(&self) -> Result<Vec<Company>, RemoteError> {
        self.fetch_collection::<ApiCompany, _>(PageKind::Companies, ApiCompany::into_company)
    }

    pub fn list_roles(&self) -> Result<Vec<Role>, RemoteError> {
        self.fetch_collection::<ApiRole, _>(PageKind::Roles, ApiRole::into_role)
    }

    pub fn list_items(&self) -> Result<Vec<Item>, RemoteError> {
        self.fetch_collection::<ApiItem, _>(PageKind::Items, ApiItem::into_item)
    }

    pub fn list_jobs(&self) -> Result<Vec<Job>, RemoteError> {
        self.fetch_collection::<ApiJob, _>(PageKind::Jobs, ApiJob::into_job)
    }

    pub fn list_permissions(&self) -> Result<Vec<Permission>, RemoteError> {
        let listing: Listing<ApiPermission> =
            self.send(self.request(Method::GET, "permissions/get"), "permissions")?;
        Ok(listing
            .into_vec()
            .into_iter()
            .map(ApiPermission::into_permission)
            .collect())
    }

    pub fn role_details(&self, role_id: RoleId) -> Result<Role, RemoteError> {
        let role: ApiRole = self.send(
            self.request(Method::GET, &format!("roles/get/{role_id}")),
            "role details",
        )?;
        Ok(role.into_role())
    }

    pub fn assign_permissions(&self, input: &RolePermissionsInput) -> Result<(), RemoteError> {
        let body = AssignPermissionsRequest {
            permission_ids: input.permission_ids.iter().map(|id| id.get()).collect(),
        };
        self.send_empty(
            self.request(
                Method::PUT,
                &format!("roles/{}/assign-permissions", input.role_id),
            )
            .json(&body),
            "assign permissions",
        )
    }

    pub fn list_teams(&self) -> Result<Vec<Team>, RemoteError> {
        let listing: Listing<ApiTeam> = self.send(self.request(Method::GET, "teams/get"), "teams")?;
        Ok(listing
            .into_vec()
            .into_iter()
            .map(|team| Team {
                id: TeamId::new(team.id),
                name: team.name,
            })
            .collect())
    }

    pub fn company_options(&self) -> Result<Vec<CompanyOption>, RemoteError> {
        let listing: Listing<ApiCompanyOption> = self.send(
            self.request(Method::GET, "companys/dropdown-list"),
            "company options",
        )?;
        Ok(listing
            .into_vec()
            .into_iter()
            .map(|option| CompanyOption {
                id: CompanyId::new(option.id),
                name: option.name,
            })
            .collect())
    }

    pub fn create_user(&self, input: &UserFormInput) -> Result<(), RemoteError> {
        let body = UserRequest::from_input(input);
        self.send_empty(
            self.request(Method::POST, "users/create").json(&body),
            "create user",
        )
    }

    pub fn update_user(&self, user_id: &UserId, input: &UserFormInput) -> Result<(), RemoteError> {
        let body = UserRequest {
            password: None,
            ..UserRequest::from_input(input)
        };
        self.send_empty(
            self.request(Method::PUT, &format!("users/update/{user_id}"))
                .json(&body),
            "update user",
        )
    }

    pub fn delete_user(&self, user_id: &UserId) -> Result<(), RemoteError> {
        self.send_empty(
            self.request(Method::DELETE, &format!("users/delete/{user_id}")),
            "delete user",
        )
    }

    pub fn change_password(
        &self,
        user_id: &UserId,
        input: &ChangePasswordInput,
    ) -> Result<(), RemoteError> {
        let body = ChangePasswordRequest {
            new_password: &input.new_password,
        };
        self.send_empty(
            self.request(Method::PUT, &format!("users/change-password/{user_id}"))
                .json(&body),
            "change password",
        )
    }

    pub fn create_company(&self, input: &CompanyFormInput) -> Result<(), RemoteError> {
        self.send_empty(
            self.request(Method::POST, "companys/create")
                .json(&CompanyRequest::from_input(input)),
            "create company",
        )
    }

    pub fn update_company(
        &self,
        company_id: CompanyId,
        input: &CompanyFormInput,
    ) -> Result<(), RemoteError> {
        self.send_empty(
            self.request(Method::PUT, &format!("companys/update/{company_id}"))
                .json(&CompanyRequest::from_input(input)),
            "update company",
        )
    }

    pub fn delete_company(&self, company_id: CompanyId) -> Result<(), RemoteError> {
        self.send_empty(
            self.request(Method::DELETE, &format!("companys/delete/{company_id}")),
            "delete company",
        )
    }

    /// Server-side item filter; the response is the new base collection.
    pub fn filter_items(
        &self,
        filters: &BTreeMap<String, String>,
    ) -> Result<Vec<Item>, RemoteError> {
        let body = FilterRequest { filters };
        let listing: Listing<ApiItem> = self.send(
            self.request(Method::POST, "items/filter").json(&body),
            "item filter",
        )?;
        Ok(listing
            .into_vec()
            .into_iter()
            .map(ApiItem::into_item)
            .collect())
    }

    /// Raw stored column config for a screen, if one was ever saved.
    pub fn ui_config(&self, screen_code: &str) -> Result<Option<String>, RemoteError> {
        let result: Option<UiConfigResult> = self.send_optional(
            self.request(Method::GET, "ui-config/get")
                .query(&[("screenCode", screen_code)]),
            "ui config",
        )?;
        Ok(result.and_then(|config| config.config_json))
    }

    pub fn save_ui_config(&self, screen_code: &str, config_json: &str) -> Result<(), RemoteError> {
        let body = UiConfigRequest {
            screen_code,
            config_json,
        };
        self.send_empty(
            self.request(Method::POST, "ui-config/save").json(&body),
            "save ui config",
        )
    }

    fn fetch_collection<W, T>(
        &self,
        page: PageKind,
        convert: impl Fn(W) -> T,
    ) -> Result<Vec<T>, RemoteError>
    where
        W: DeserializeOwned,
    {
        let size = self.fetch_size.to_string();
        let listing: Listing<W> = self.send(
            self.request(Method::GET, page.collection_path())
                .query(&[("page", "0"), ("size", size.as_str())]),
            page.label(),
        )?;
        let records: Vec<T> = listing.into_vec().into_iter().map(convert).collect();
        debug!(page = page.label(), count = records.len(), "collection fetched");
        Ok(records)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = self.endpoint(path);
        debug!(%method, %url, "api request");
        let builder = self.http.request(method, url);
        match &self.bearer {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn send<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        what: &str,
    ) -> Result<T, RemoteError> {
        self.send_optional(builder, what)?
            .ok_or_else(|| RemoteError::Decode(format!("{what} response has no result")))
    }

    /// Like `send`, but a missing or null `result` is `None`.
    fn send_optional<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        what: &str,
    ) -> Result<Option<T>, RemoteError> {
        let response = builder
            .send()
            .map_err(|error| connection_error(&self.base_url, error))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(clean_error_response(status, &body));
        }
        let envelope: Envelope<T> = response
            .json()
            .map_err(|error| RemoteError::Decode(format!("decode {what}: {error}")))?;
        Ok(envelope.result)
    }

    fn send_empty(&self, builder: RequestBuilder, what: &str) -> Result<(), RemoteError> {
        let response = builder
            .send()
            .map_err(|error| connection_error(&self.base_url, error))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let error = clean_error_response(status, &body);
            warn!(%error, what, "api call failed");
            return Err(error);
        }
        debug!(what, status = status.as_u16(), "api call succeeded");
        Ok(())
    }
}

fn connection_error(base_url: &str, error: reqwest::Error) -> RemoteError {
    let detail = if error.is_timeout() {
        format!("timed out ({error})")
    } else {
        error.to_string()
    };
    warn!(base_url, %detail, "backend unreachable");
    RemoteError::network(base_url, detail)
}

fn clean_error_response(status: StatusCode, body: &str) -> RemoteError {
    if let Ok(parsed) = serde_json::from_str::<ErrorEnvelope>(body)
        && let Some(message) = parsed.message
        && !message.trim().is_empty()
    {
        return RemoteError::from_status(status.as_u16(), Some(message));
    }
    RemoteError::from_status(status.as_u16(), None)
}

/// Accepts RFC 3339, an offset-less ISO timestamp (read as UTC) or epoch
/// milliseconds.
pub fn parse_timestamp(value: &serde_json::Value) -> Option<OffsetDateTime> {
    match value {
        serde_json::Value::Number(number) => {
            let millis = number.as_i64()?;
            OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
        }
        serde_json::Value::String(raw) => {
            let raw = raw.trim();
            if let Ok(parsed) = OffsetDateTime::parse(raw, &Rfc3339) {
                return Some(parsed);
            }
            let without_fraction = raw.split('.').next().unwrap_or(raw);
            PrimitiveDateTime::parse(
                without_fraction,
                format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
            )
            .ok()
            .map(PrimitiveDateTime::assume_utc)
        }
        _ => None,
    }
}

/// Calendar date from `YYYY-MM-DD`, ignoring any time suffix.
pub fn parse_api_date(raw: Option<&str>) -> Option<Date> {
    let raw = raw?.trim();
    let day = raw.get(..10).unwrap_or(raw);
    Date::parse(day, format_description!("[year]-[month]-[day]")).ok()
}

fn format_api_date(date: Date) -> Option<String> {
    date.format(format_description!("[year]-[month]-[day]")).ok()
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    message: Option<String>,
}

/// Collections arrive either paged (`{content: [...]}`) or as a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Paged { content: Vec<T> },
    Plain(Vec<T>),
}

impl<T> Listing<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::Paged { content, .. } => content,
            Self::Plain(items) => items,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireId {
    Number(i64),
    Text(String),
}

impl fmt::Display for WireId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResult {
    #[serde(default)]
    authenticated: bool,
    token: Option<String>,
    #[serde(rename = "expiryAt")]
    expiry_at: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct LogoutRequest<'a> {
    token: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiUser {
    user_id: WireId,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    username: String,
    #[serde(default)]
    firstname: String,
    #[serde(default)]
    lastname: String,
    #[serde(default)]
    company: Option<Vec<ApiCompanyRef>>,
    #[serde(default)]
    team: Option<Vec<ApiTeamRef>>,
    date_of_birth: Option<String>,
    #[serde(default)]
    role_name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    project_manager: Option<bool>,
}

impl ApiUser {
    fn into_user(self) -> User {
        User {
            user_id: UserId::new(self.user_id.to_string()),
            username: self.username,
            first_name: self.firstname,
            last_name: self.lastname,
            company: self
                .company
                .unwrap_or_default()
                .into_iter()
                .map(|company| company.company_name)
                .collect(),
            engineering_team: self
                .team
                .unwrap_or_default()
                .into_iter()
                .map(|team| team.name)
                .collect(),
            date_of_birth: parse_api_date(self.date_of_birth.as_deref()),
            role: self.role_name,
            status: RecordStatus::from_wire(&self.status),
            image: self.image.unwrap_or_default(),
            project_manager: self.project_manager,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiCompanyRef {
    #[serde(default)]
    company_name: String,
}

#[derive(Debug, Deserialize)]
struct ApiTeamRef {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiCompany {
    id: i64,
    #[serde(default)]
    code: String,
    #[serde(default, alias = "companyName")]
    name: String,
    #[serde(default)]
    subcontractor: bool,
    #[serde(default)]
    state: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    contact_name: String,
    #[serde(default)]
    mobile_phone: String,
    #[serde(default)]
    address: String,
}

impl ApiCompany {
    fn into_company(self) -> Company {
        Company {
            id: CompanyId::new(self.id),
            code: self.code,
            name: self.name,
            subcontractor: self.subcontractor,
            state: self.state,
            status: RecordStatus::parse(&self.status).unwrap_or(RecordStatus::Inactive),
            contact_name: self.contact_name,
            mobile_phone: self.mobile_phone,
            address: self.address,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPermission {
    #[serde(alias = "id")]
    permission_id: i64,
    #[serde(default)]
    name: String,
}

impl ApiPermission {
    fn into_permission(self) -> Permission {
        Permission {
            id: PermissionId::new(self.permission_id),
            name: self.name,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiRole {
    #[serde(alias = "roleId")]
    id: i64,
    #[serde(default, alias = "roleName")]
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    permissions: Vec<ApiPermission>,
}

impl ApiRole {
    fn into_role(self) -> Role {
        Role {
            id: RoleId::new(self.id),
            name: self.name,
            description: self.description.unwrap_or_default(),
            permissions: self
                .permissions
                .into_iter()
                .map(ApiPermission::into_permission)
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiItem {
    id: i64,
    #[serde(default, alias = "itemCode")]
    code: String,
    #[serde(default, alias = "itemName")]
    name: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    material: String,
    #[serde(default)]
    quantity: f64,
    #[serde(default)]
    unit: String,
    #[serde(default)]
    status: String,
    qc_date: Option<String>,
    created_at: Option<serde_json::Value>,
    updated_at: Option<serde_json::Value>,
}

impl ApiItem {
    fn into_item(self) -> Item {
        Item {
            id: ItemId::new(self.id),
            code: self.code,
            name: self.name,
            category: self.category,
            material: self.material,
            quantity: self.quantity,
            unit: self.unit,
            status: self.status,
            qc_date: parse_api_date(self.qc_date.as_deref()),
            created_at: self.created_at.as_ref().and_then(parse_timestamp),
            updated_at: self.updated_at.as_ref().and_then(parse_timestamp),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiJob {
    id: i64,
    #[serde(default, alias = "jobCode")]
    code: String,
    #[serde(default, alias = "jobName")]
    name: String,
    #[serde(default)]
    company_code: String,
    #[serde(default)]
    status: String,
    start_date: Option<String>,
    due_date: Option<String>,
}

impl ApiJob {
    fn into_job(self) -> Job {
        Job {
            id: JobId::new(self.id),
            code: self.code,
            name: self.name,
            company_code: self.company_code,
            status: JobStatus::parse(&self.status).unwrap_or(JobStatus::Planned),
            start_date: parse_api_date(self.start_date.as_deref()),
            due_date: parse_api_date(self.due_date.as_deref()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiTeam {
    id: i64,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiCompanyOption {
    id: i64,
    #[serde(default, alias = "companyName")]
    name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UserRequest<'a> {
    firstname: &'a str,
    lastname: &'a str,
    username: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<&'a str>,
    role_id: Option<i64>,
    team_ids: Vec<i64>,
    company_ids: Vec<i64>,
    date_of_birth: Option<String>,
    status: Option<&'static str>,
}

impl<'a> UserRequest<'a> {
    fn from_input(input: &'a UserFormInput) -> Self {
        Self {
            firstname: input.first_name.trim(),
            lastname: input.last_name.trim(),
            username: input.username.trim(),
            password: input.password.as_deref(),
            role_id: input.role.map(RoleId::get),
            team_ids: input.engineering_teams.iter().map(|id| id.get()).collect(),
            company_ids: input.company.iter().map(|id| id.get()).collect(),
            date_of_birth: input.birth_date().and_then(format_api_date),
            status: input.status.map(RecordStatus::as_str),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompanyRequest<'a> {
    code: &'a str,
    company_name: &'a str,
    subcontractor: bool,
    state: &'a str,
    status: Option<&'static str>,
    contact_name: &'a str,
    mobile_phone: &'a str,
    address: &'a str,
}

impl<'a> CompanyRequest<'a> {
    fn from_input(input: &'a CompanyFormInput) -> Self {
        Self {
            code: input.code.trim(),
            company_name: input.name.trim(),
            subcontractor: input.subcontractor,
            state: input.state.trim(),
            status: input.status.map(RecordStatus::as_str),
            contact_name: input.contact_name.trim(),
            mobile_phone: input.mobile_phone.trim(),
            address: input.address.trim(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChangePasswordRequest<'a> {
    new_password: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssignPermissionsRequest {
    permission_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
struct FilterRequest<'a> {
    filters: &'a BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UiConfigResult {
    config_json: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UiConfigRequest<'a> {
    screen_code: &'a str,
    config_json: &'a str,
}
