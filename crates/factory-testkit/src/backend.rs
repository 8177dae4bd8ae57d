// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! In-process stand-in for the factory REST backend, served over real HTTP
//! so the production client runs unmodified against it.

use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Result, anyhow};
use factory_app::{
    Company, CompanyId, Item, Job, Permission, RecordStatus, Role, RoleId, User, UserId,
};
use serde_json::{Value, json};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime};
use tiny_http::{Header, Method, Request, Response, Server};
use tracing::{debug, warn};

use crate::{DemoData, demo_token};

/// Password every seeded account accepts.
pub const DEMO_PASSWORD: &str = "Factory#2026";

pub struct MockBackend {
    base_url: String,
    server: Arc<Server>,
    handle: Option<JoinHandle<()>>,
}

impl MockBackend {
    /// Binds an ephemeral local port and serves `data` until dropped.
    pub fn start(data: DemoData) -> Result<Self> {
        let server = Server::http("127.0.0.1:0")
            .map_err(|error| anyhow!("start mock backend: {error}"))?;
        let base_url = format!("http://{}/api", server.server_addr());
        let server = Arc::new(server);

        let worker = Arc::clone(&server);
        let handle = thread::Builder::new()
            .name("mock-backend".to_owned())
            .spawn(move || serve(&worker, BackendState::new(data)))
            .map_err(|error| anyhow!("spawn mock backend thread: {error}"))?;

        debug!(%base_url, "mock backend listening");
        Ok(Self {
            base_url,
            server,
            handle: Some(handle),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("mock backend thread panicked");
        }
    }
}

fn serve(server: &Server, mut state: BackendState) {
    while let Ok(request) = server.recv() {
        state.handle(request);
    }
}

struct Reply {
    status: u16,
    body: Value,
}

impl Reply {
    fn ok(result: Value) -> Self {
        Self {
            status: 200,
            body: json!({ "result": result }),
        }
    }

    fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "message": message.into() }),
        }
    }
}

struct BackendState {
    data: DemoData,
    sessions: HashMap<String, String>,
    next_user_id: i64,
    next_company_id: i64,
}

impl BackendState {
    fn new(data: DemoData) -> Self {
        let next_user_id = data
            .users
            .iter()
            .filter_map(|user| user.user_id.as_str().parse::<i64>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        let next_company_id = data
            .companies
            .iter()
            .map(|company| company.id.get())
            .max()
            .unwrap_or(0)
            + 1;
        Self {
            data,
            sessions: HashMap::new(),
            next_user_id,
            next_company_id,
        }
    }

    fn handle(&mut self, mut request: Request) {
        let method = request.method().clone();
        let url = request.url().to_owned();
        let (path, query) = url.split_once('?').unwrap_or((url.as_str(), ""));
        let path = path.trim_start_matches('/');
        let path = path.strip_prefix("api/").unwrap_or(path).to_owned();
        let query = parse_query(query);

        let mut raw = String::new();
        let body = match request.as_reader().read_to_string(&mut raw) {
            Ok(_) if raw.trim().is_empty() => Value::Null,
            Ok(_) => serde_json::from_str(&raw).unwrap_or(Value::Null),
            Err(_) => Value::Null,
        };

        let reply = if path == "auth/login" {
            self.login(&body)
        } else {
            match self.caller(&request) {
                Some(username) => self.route(&method, &path, &query, &body, &username),
                None => Reply::error(401, "Unauthorized"),
            }
        };

        debug!(%method, %path, status = reply.status, "mock backend reply");
        let mut response =
            Response::from_string(reply.body.to_string()).with_status_code(reply.status);
        if let Ok(header) = Header::from_bytes("Content-Type", "application/json") {
            response.add_header(header);
        }
        if let Err(error) = request.respond(response) {
            warn!(%error, "mock backend could not respond");
        }
    }

    fn caller(&self, request: &Request) -> Option<String> {
        let header = request
            .headers()
            .iter()
            .find(|header| header.field.equiv("Authorization"))?;
        let token = header.value.as_str().strip_prefix("Bearer ")?;
        self.sessions.get(token).cloned()
    }

    fn login(&mut self, body: &Value) -> Reply {
        let username = text(body, "username");
        let password = text(body, "password");
        let known = self.data.users.iter().any(|user| user.username == username);
        if !known || password != DEMO_PASSWORD {
            return Reply::ok(json!({ "authenticated": false }));
        }
        let token = demo_token(&username, &self.data.scopes_for(&username));
        let expiry = OffsetDateTime::now_utc() + Duration::hours(8);
        let expiry_millis = expiry.unix_timestamp() * 1000;
        self.sessions.insert(token.clone(), username);
        Reply::ok(json!({
            "authenticated": true,
            "token": token,
            "expiryAt": expiry_millis,
        }))
    }

    fn route(
        &mut self,
        method: &Method,
        path: &str,
        query: &HashMap<String, String>,
        body: &Value,
        caller: &str,
    ) -> Reply {
        let segments: Vec<&str> = path.split('/').collect();
        match (method, segments.as_slice()) {
            (Method::Post, ["auth", "logout"]) => {
                let token = text(body, "token");
                self.sessions.remove(&token);
                Reply::ok(Value::Null)
            }
            (Method::Get, ["users", "getmyinfo"]) => self
                .data
                .users
                .iter()
                .find(|user| user.username == caller)
                .map(|user| Reply::ok(user_wire(user)))
                .unwrap_or_else(|| Reply::error(404, "User not found")),
            (Method::Get, ["users", "get"]) => {
                paged(query, self.data.users.iter().map(user_wire).collect())
            }
            (Method::Get, ["users", "get", id]) => self
                .data
                .users
                .iter()
                .find(|user| user.user_id.as_str() == *id)
                .map(|user| Reply::ok(user_wire(user)))
                .unwrap_or_else(|| Reply::error(404, "User not found")),
            (Method::Get, ["companys", "get"]) => {
                paged(query, self.data.companies.iter().map(company_wire).collect())
            }
            (Method::Get, ["companys", "dropdown-list"]) => Reply::ok(Value::Array(
                self.data
                    .companies
                    .iter()
                    .map(|company| json!({ "id": company.id.get(), "companyName": company.name }))
                    .collect(),
            )),
            (Method::Get, ["roles", "get"]) => {
                Reply::ok(Value::Array(self.data.roles.iter().map(role_wire).collect()))
            }
            (Method::Get, ["roles", "get", id]) => match self.role_index(id) {
                Some(index) => Reply::ok(role_wire(&self.data.roles[index])),
                None => Reply::error(404, "Role not found"),
            },
            (Method::Put, ["roles", id, "assign-permissions"]) => self.assign(id, body),
            (Method::Get, ["permissions", "get"]) => Reply::ok(Value::Array(
                self.data.permissions.iter().map(permission_wire).collect(),
            )),
            (Method::Get, ["items", "get"]) => {
                paged(query, self.data.items.iter().map(item_wire).collect())
            }
            (Method::Post, ["items", "filter"]) => self.filter_items(body),
            (Method::Get, ["jobs", "get"]) => {
                paged(query, self.data.jobs.iter().map(job_wire).collect())
            }
            (Method::Get, ["teams", "get"]) => Reply::ok(Value::Array(
                self.data
                    .teams
                    .iter()
                    .map(|team| json!({ "id": team.id.get(), "name": team.name }))
                    .collect(),
            )),
            (Method::Post, ["users", "create"]) => self.save_user(None, body),
            (Method::Put, ["users", "update", id]) => self.save_user(Some(*id), body),
            (Method::Delete, ["users", "delete", id]) => {
                let before = self.data.users.len();
                self.data.users.retain(|user| user.user_id.as_str() != *id);
                if self.data.users.len() == before {
                    Reply::error(404, "User not found")
                } else {
                    Reply::ok(Value::Null)
                }
            }
            (Method::Put, ["users", "change-password", id]) => {
                if self.data.users.iter().any(|user| user.user_id.as_str() == *id) {
                    Reply::ok(Value::Null)
                } else {
                    Reply::error(404, "User not found")
                }
            }
            (Method::Post, ["companys", "create"]) => self.save_company(None, body),
            (Method::Put, ["companys", "update", id]) => self.save_company(Some(*id), body),
            (Method::Delete, ["companys", "delete", id]) => {
                let before = self.data.companies.len();
                self.data
                    .companies
                    .retain(|company| company.id.to_string() != *id);
                if self.data.companies.len() == before {
                    Reply::error(404, "Company not found")
                } else {
                    Reply::ok(Value::Null)
                }
            }
            (Method::Get, ["ui-config", "get"]) => match &self.data.column_config {
                Some(config) => Reply::ok(json!({ "configJson": config })),
                None => Reply::ok(Value::Null),
            },
            (Method::Post, ["ui-config", "save"]) => {
                self.data.column_config = Some(text(body, "configJson"));
                Reply::ok(Value::Null)
            }
            _ => Reply::error(404, format!("No handler for {method} {path}")),
        }
    }

    fn role_index(&self, id: &str) -> Option<usize> {
        self.data
            .roles
            .iter()
            .position(|role| role.id.to_string() == id)
    }

    fn assign(&mut self, id: &str, body: &Value) -> Reply {
        let Some(index) = self.role_index(id) else {
            return Reply::error(404, "Role not found");
        };
        let wanted = ids(body, "permissionIds");
        let permissions: Vec<Permission> = self
            .data
            .permissions
            .iter()
            .filter(|permission| wanted.contains(&permission.id.get()))
            .cloned()
            .collect();
        self.data.roles[index].permissions = permissions;
        Reply::ok(Value::Null)
    }

    fn filter_items(&self, body: &Value) -> Reply {
        let filters: Vec<(String, String)> = body
            .get("filters")
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .filter_map(|(key, value)| {
                        value
                            .as_str()
                            .filter(|value| !value.is_empty() && *value != "All")
                            .map(|value| (key.clone(), value.to_owned()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let content: Vec<Value> = self
            .data
            .items
            .iter()
            .map(item_wire)
            .filter(|item| {
                filters.iter().all(|(key, wanted)| {
                    item.get(key)
                        .map(|value| match value {
                            Value::String(text) => text.eq_ignore_ascii_case(wanted),
                            other => other.to_string() == *wanted,
                        })
                        .unwrap_or(false)
                })
            })
            .collect();
        Reply::ok(json!({ "content": content, "totalElements": content.len() }))
    }

    fn save_user(&mut self, id: Option<&str>, body: &Value) -> Reply {
        let username = text(body, "username");
        let clash = self
            .data
            .users
            .iter()
            .any(|user| user.username == username && Some(user.user_id.as_str()) != id);
        if clash {
            return Reply::error(400, "Username already exists");
        }

        let role_id = body
            .get("roleId")
            .or_else(|| body.get("role").and_then(|role| role.get("id")))
            .and_then(Value::as_i64);
        let role = role_id
            .and_then(|role_id| {
                self.data
                    .roles
                    .iter()
                    .find(|role| role.id == RoleId::new(role_id))
            })
            .map(|role| role.name.clone())
            .unwrap_or_default();
        let company_ids = ids(body, "companyIds");
        let team_ids = ids(body, "teamIds");

        let user_id = match id {
            Some(id) => UserId::new(id),
            None => {
                let next = self.next_user_id;
                self.next_user_id += 1;
                UserId::new(next.to_string())
            }
        };
        let user = User {
            user_id: user_id.clone(),
            username,
            first_name: text(body, "firstname"),
            last_name: text(body, "lastname"),
            company: self
                .data
                .companies
                .iter()
                .filter(|company| company_ids.contains(&company.id.get()))
                .map(|company| company.name.clone())
                .collect(),
            engineering_team: self
                .data
                .teams
                .iter()
                .filter(|team| team_ids.contains(&team.id.get()))
                .map(|team| team.name.clone())
                .collect(),
            date_of_birth: parse_date(&text(body, "dateOfBirth")),
            role,
            status: RecordStatus::from_wire(&text(body, "status")),
            image: text(body, "image"),
            project_manager: body.get("projectManager").and_then(Value::as_bool),
        };

        match self
            .data
            .users
            .iter_mut()
            .find(|existing| existing.user_id == user_id)
        {
            Some(existing) => *existing = user,
            None if id.is_some() => return Reply::error(404, "User not found"),
            None => self.data.users.push(user),
        }
        Reply::ok(Value::Null)
    }

    fn save_company(&mut self, id: Option<&str>, body: &Value) -> Reply {
        let company_id = match id {
            Some(id) => match id.parse::<i64>() {
                Ok(id) => CompanyId::new(id),
                Err(_) => return Reply::error(400, "Invalid company id"),
            },
            None => {
                let next = self.next_company_id;
                self.next_company_id += 1;
                CompanyId::new(next)
            }
        };
        let company = Company {
            id: company_id,
            code: text(body, "code"),
            name: text(body, "companyName"),
            subcontractor: body
                .get("subcontractor")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            state: text(body, "state"),
            status: RecordStatus::from_wire(&text(body, "status")),
            contact_name: text(body, "contactName"),
            mobile_phone: text(body, "mobilePhone"),
            address: text(body, "address"),
        };
        match self
            .data
            .companies
            .iter_mut()
            .find(|existing| existing.id == company_id)
        {
            Some(existing) => *existing = company,
            None if id.is_some() => return Reply::error(404, "Company not found"),
            None => self.data.companies.push(company),
        }
        Reply::ok(Value::Null)
    }
}

fn paged(query: &HashMap<String, String>, rows: Vec<Value>) -> Reply {
    let size = query
        .get("size")
        .and_then(|size| size.parse::<usize>().ok())
        .filter(|size| *size > 0)
        .unwrap_or(20);
    let page = query
        .get("page")
        .and_then(|page| page.parse::<usize>().ok())
        .unwrap_or(0);
    let total = rows.len();
    let content: Vec<Value> = rows.into_iter().skip(page * size).take(size).collect();
    Reply::ok(json!({ "content": content, "totalElements": total }))
}

fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .collect()
}

fn text(body: &Value, key: &str) -> String {
    body.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}

fn ids(body: &Value, key: &str) -> Vec<i64> {
    body.get(key)
        .and_then(Value::as_array)
        .map(|values| values.iter().filter_map(Value::as_i64).collect())
        .unwrap_or_default()
}

fn format_date(date: Option<Date>) -> Value {
    date.and_then(|date| date.format(format_description!("[year]-[month]-[day]")).ok())
        .map_or(Value::Null, Value::String)
}

fn format_timestamp(at: Option<OffsetDateTime>) -> Value {
    at.and_then(|at| at.format(&Rfc3339).ok())
        .map_or(Value::Null, Value::String)
}

fn parse_date(raw: &str) -> Option<Date> {
    Date::parse(raw, format_description!("[year]-[month]-[day]")).ok()
}

fn user_wire(user: &User) -> Value {
    json!({
        "userId": user.user_id.as_str(),
        "username": user.username,
        "firstname": user.first_name,
        "lastname": user.last_name,
        "company": user
            .company
            .iter()
            .map(|name| json!({ "companyName": name }))
            .collect::<Vec<_>>(),
        "team": user
            .engineering_team
            .iter()
            .map(|name| json!({ "name": name }))
            .collect::<Vec<_>>(),
        "dateOfBirth": format_date(user.date_of_birth),
        "roleName": user.role,
        "status": user.status.as_str(),
        "image": if user.image.is_empty() { Value::Null } else { Value::String(user.image.clone()) },
        "projectManager": user.project_manager,
    })
}

fn company_wire(company: &Company) -> Value {
    json!({
        "id": company.id.get(),
        "code": company.code,
        "companyName": company.name,
        "subcontractor": company.subcontractor,
        "state": company.state,
        "status": company.status.as_str(),
        "contactName": company.contact_name,
        "mobilePhone": company.mobile_phone,
        "address": company.address,
    })
}

fn permission_wire(permission: &Permission) -> Value {
    json!({ "permissionId": permission.id.get(), "name": permission.name })
}

fn role_wire(role: &Role) -> Value {
    json!({
        "id": role.id.get(),
        "name": role.name,
        "description": role.description,
        "permissions": role.permissions.iter().map(permission_wire).collect::<Vec<_>>(),
    })
}

fn item_wire(item: &Item) -> Value {
    json!({
        "id": item.id.get(),
        "code": item.code,
        "name": item.name,
        "category": item.category,
        "material": item.material,
        "quantity": item.quantity,
        "unit": item.unit,
        "status": item.status,
        "qcDate": format_date(item.qc_date),
        "createdAt": format_timestamp(item.created_at),
        "updatedAt": format_timestamp(item.updated_at),
    })
}

fn job_wire(job: &Job) -> Value {
    json!({
        "id": job.id.get(),
        "code": job.code,
        "name": job.name,
        "companyCode": job.company_code,
        "status": job.status.as_str(),
        "startDate": format_date(job.start_date),
        "dueDate": format_date(job.due_date),
    })
}

#[cfg(test)]
mod tests {
    use super::{DEMO_PASSWORD, MockBackend, parse_query};
    use crate::DemoData;
    use factory_app::JobStatus;

    #[test]
    fn query_pairs_are_split() {
        let query = parse_query("page=0&size=25&flag");
        assert_eq!(query.get("page").map(String::as_str), Some("0"));
        assert_eq!(query.get("size").map(String::as_str), Some("25"));
        assert!(!query.contains_key("flag"));
    }

    #[test]
    fn backend_binds_a_local_api_url() -> anyhow::Result<()> {
        let backend = MockBackend::start(DemoData::generate(1))?;
        assert!(backend.base_url().starts_with("http://127.0.0.1:"));
        assert!(backend.base_url().ends_with("/api"));
        assert!(!DEMO_PASSWORD.is_empty());
        assert!(JobStatus::parse(JobStatus::OnHold.as_str()).is_some());
        Ok(())
    }
}
