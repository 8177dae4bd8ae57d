// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use factory_api::Client;
use factory_app::{
    Claims, CompanyId, FormPayload, ITEM_SCREEN_CODE, Item, LoginFormInput, PageKind, Permission,
    RemoteError, RequestTicket, Role, RoleId, SessionContext, SessionStatus, Token, User, UserId,
    session_status,
};
use factory_store::SessionVault;
use factory_tui::{AppRuntime, FormOptions, InternalEvent, PageData};
use std::collections::BTreeMap;
use std::sync::mpsc::Sender;
use std::thread;
use time::OffsetDateTime;
use tracing::{info, warn};

/// Talks to the backend through `Client` and keeps the session in a `SessionVault`.
pub struct ApiRuntime {
    client: Client,
    vault: SessionVault,
    page_size: usize,
    login_hint: Option<String>,
}

impl ApiRuntime {
    pub fn new(client: Client, vault: SessionVault, page_size: usize) -> Self {
        let mut runtime = Self {
            client,
            vault,
            page_size,
            login_hint: None,
        };
        runtime.sync_authorization();
        runtime
    }

    pub fn with_login_hint(mut self, username: impl Into<String>) -> Self {
        self.login_hint = Some(username.into());
        self
    }

    /// The client only carries a bearer token while the stored one is live.
    fn sync_authorization(&mut self) -> SessionStatus {
        let status = session_status(&self.vault, OffsetDateTime::now_utc());
        match &status {
            SessionStatus::Active(token) => self.client.authorize(Some(token)),
            SessionStatus::Missing | SessionStatus::Expired => self.client.authorize(None),
        }
        status
    }
}

fn store_error(error: anyhow::Error) -> RemoteError {
    warn!(error = %format!("{error:#}"), "session store failed");
    RemoteError::Decode(format!("cannot store session: {error:#}"))
}

fn parse_company_id(raw: &str) -> Result<CompanyId, RemoteError> {
    raw.trim()
        .parse::<i64>()
        .map(CompanyId::new)
        .map_err(|_| RemoteError::Decode(format!("company id {raw:?} is not numeric")))
}

impl AppRuntime for ApiRuntime {
    fn session_status(&mut self) -> SessionStatus {
        self.sync_authorization()
    }

    fn claims(&mut self) -> Option<Claims> {
        let token = self.vault.token()?;
        match Claims::decode(&token.value) {
            Ok(claims) => Some(claims),
            Err(error) => {
                warn!(error = %format!("{error:#}"), "token claims unreadable, treating as no scopes");
                None
            }
        }
    }

    fn current_role(&mut self) -> Option<String> {
        SessionContext::current_role(&self.vault)
    }

    fn login(&mut self, input: &LoginFormInput) -> Result<(), RemoteError> {
        let grant = self.client.login(input)?;
        let token = Token::new(grant.token, grant.expires_at);
        self.vault
            .save(&token, input.remember_me)
            .map_err(store_error)?;
        self.client.authorize(Some(&token));

        match self.client.my_info() {
            Ok(user) => self
                .vault
                .set_current_role(&user.role)
                .map_err(store_error)?,
            Err(error) if error.is_unauthorized() => return Err(error),
            Err(error) => warn!(%error, "profile unavailable, role checks use scopes only"),
        }
        Ok(())
    }

    fn logout(&mut self) -> Result<()> {
        if let Some(token) = self.vault.load_token()? {
            match self.client.logout(&token) {
                Ok(()) => info!("server session closed"),
                Err(error) => warn!(%error, "server logout failed, clearing local session anyway"),
            }
        }
        self.clear_session()
    }

    fn clear_session(&mut self) -> Result<()> {
        self.client.authorize(None);
        self.vault.clear().context("clear stored session")
    }

    fn load_page(&mut self, page: PageKind) -> Result<PageData, RemoteError> {
        Ok(match page {
            PageKind::Users => PageData::Users(self.client.list_users()?),
            PageKind::Companies => PageData::Companies(self.client.list_companies()?),
            PageKind::Roles => PageData::Roles(self.client.list_roles()?),
            PageKind::Items => PageData::Items(self.client.list_items()?),
            PageKind::Jobs => PageData::Jobs(self.client.list_jobs()?),
        })
    }

    fn user_details(&mut self, id: &str) -> Result<User, RemoteError> {
        self.client.user_details(&UserId::new(id))
    }

    fn my_profile(&mut self) -> Result<User, RemoteError> {
        self.client.my_info()
    }

    fn load_form_options(&mut self) -> Result<FormOptions, RemoteError> {
        Ok(FormOptions {
            roles: self.client.list_roles()?,
            teams: self.client.list_teams()?,
            companies: self.client.company_options()?,
        })
    }

    fn load_role_permissions(
        &mut self,
        role_id: RoleId,
    ) -> Result<(Role, Vec<Permission>), RemoteError> {
        let role = self.client.role_details(role_id)?;
        let permissions = self.client.list_permissions()?;
        Ok((role, permissions))
    }

    fn submit_form(
        &mut self,
        payload: &FormPayload,
        target: Option<&str>,
    ) -> Result<(), RemoteError> {
        match payload {
            FormPayload::Login(input) => self.login(input),
            FormPayload::User(input) => match target {
                Some(id) => self.client.update_user(&UserId::new(id), input),
                None => self.client.create_user(input),
            },
            FormPayload::Company(input) => match target {
                Some(id) => self.client.update_company(parse_company_id(id)?, input),
                None => self.client.create_company(input),
            },
            FormPayload::ChangePassword(input) => {
                let id = target.ok_or_else(|| {
                    RemoteError::Decode("password change has no target user".to_owned())
                })?;
                self.client.change_password(&UserId::new(id), input)
            }
            FormPayload::RolePermissions(input) => self.client.assign_permissions(input),
        }
    }

    fn delete_record(&mut self, page: PageKind, id: &str) -> Result<(), RemoteError> {
        match page {
            PageKind::Users => self.client.delete_user(&UserId::new(id)),
            PageKind::Companies => self.client.delete_company(parse_company_id(id)?),
            other => Err(RemoteError::from_status(
                405,
                Some(format!("{} cannot be deleted", other.label())),
            )),
        }
    }

    fn load_column_config(&mut self) -> Result<Option<String>, RemoteError> {
        self.client.ui_config(ITEM_SCREEN_CODE)
    }

    fn save_column_config(&mut self, stored: &str) -> Result<(), RemoteError> {
        self.client.save_ui_config(ITEM_SCREEN_CODE, stored)
    }

    fn filter_items(
        &mut self,
        filters: &BTreeMap<String, String>,
    ) -> Result<Vec<Item>, RemoteError> {
        self.client.filter_items(filters)
    }

    fn spawn_item_filter(
        &mut self,
        ticket: RequestTicket,
        filters: BTreeMap<String, String>,
        tx: Sender<InternalEvent>,
    ) -> Result<()> {
        let client = self.client.clone();
        thread::Builder::new()
            .name("item-filter".to_owned())
            .spawn(move || {
                let result = client.filter_items(&filters);
                let _ = tx.send(InternalEvent::ItemsFiltered { ticket, result });
            })
            .context("spawn item filter thread")?;
        Ok(())
    }

    fn login_hint(&mut self) -> Option<String> {
        self.login_hint.clone()
    }

    fn page_size(&self) -> usize {
        self.page_size
    }
}

#[cfg(test)]
mod tests {
    use super::ApiRuntime;
    use anyhow::Result;
    use factory_api::Client;
    use factory_app::{
        CompanyFormInput, FormPayload, LoginFormInput, PageKind, RecordStatus, RemoteError,
        SessionStatus,
    };
    use factory_store::SessionVault;
    use factory_testkit::{DEMO_PASSWORD, DemoData, MockBackend};
    use factory_tui::{AppRuntime, InternalEvent, PageData};
    use std::collections::BTreeMap;
    use std::sync::mpsc;
    use std::time::Duration;

    fn runtime_for(backend: &MockBackend) -> Result<ApiRuntime> {
        let client = Client::new(backend.base_url(), 500, Duration::from_secs(5))?;
        Ok(ApiRuntime::new(client, SessionVault::in_memory()?, 10))
    }

    fn login(runtime: &mut ApiRuntime, username: &str, password: &str) -> Result<(), RemoteError> {
        runtime.login(&LoginFormInput {
            username: username.to_owned(),
            password: password.to_owned(),
            remember_me: false,
        })
    }

    #[test]
    fn login_stores_token_role_and_claims() -> Result<()> {
        let backend = MockBackend::start(DemoData::generate(3))?;
        let mut runtime = runtime_for(&backend)?;
        assert_eq!(runtime.session_status(), SessionStatus::Missing);

        login(&mut runtime, DemoData::ADMIN_USERNAME, DEMO_PASSWORD)
            .expect("demo password accepted");
        assert!(matches!(runtime.session_status(), SessionStatus::Active(_)));
        assert_eq!(runtime.current_role().as_deref(), Some("ADMIN"));
        let claims = runtime.claims().expect("claims decoded");
        assert_eq!(claims.subject.as_deref(), Some(DemoData::ADMIN_USERNAME));
        Ok(())
    }

    #[test]
    fn rejected_login_leaves_no_session() -> Result<()> {
        let backend = MockBackend::start(DemoData::generate(3))?;
        let mut runtime = runtime_for(&backend)?;
        let error = login(&mut runtime, DemoData::ADMIN_USERNAME, "wrong")
            .expect_err("wrong password should fail");
        assert!(error.is_unauthorized());
        assert_eq!(error.user_message(), "Invalid username or password.");
        assert_eq!(runtime.session_status(), SessionStatus::Missing);
        Ok(())
    }

    #[test]
    fn pages_load_once_signed_in() -> Result<()> {
        let data = DemoData::generate(5);
        let expected_users = data.users.len();
        let expected_items = data.items.len();
        let backend = MockBackend::start(data)?;
        let mut runtime = runtime_for(&backend)?;

        let error = runtime
            .load_page(PageKind::Users)
            .expect_err("anonymous load should fail");
        assert!(error.is_unauthorized());

        login(&mut runtime, DemoData::ROOT_USERNAME, DEMO_PASSWORD).expect("login");
        let PageData::Users(users) = runtime.load_page(PageKind::Users)? else {
            panic!("users page expected");
        };
        assert_eq!(users.len(), expected_users);
        let PageData::Items(items) = runtime.load_page(PageKind::Items)? else {
            panic!("items page expected");
        };
        assert_eq!(items.len(), expected_items);
        Ok(())
    }

    #[test]
    fn user_details_and_profile_come_from_the_backend() -> Result<()> {
        let data = DemoData::generate(5);
        let other = data
            .users
            .iter()
            .find(|user| user.username != DemoData::ADMIN_USERNAME)
            .cloned()
            .expect("seeded users");
        let backend = MockBackend::start(data)?;
        let mut runtime = runtime_for(&backend)?;
        login(&mut runtime, DemoData::ADMIN_USERNAME, DEMO_PASSWORD).expect("login");

        let profile = runtime.my_profile().expect("profile loads");
        assert_eq!(profile.username, DemoData::ADMIN_USERNAME);

        let details = runtime
            .user_details(other.user_id.as_str())
            .expect("details load");
        assert_eq!(details.username, other.username);
        assert_eq!(details.project_manager, other.project_manager);

        let error = runtime
            .user_details("99999")
            .expect_err("unknown user should fail");
        assert_eq!(error.user_message(), "User not found");
        Ok(())
    }

    #[test]
    fn company_edits_round_trip_through_the_backend() -> Result<()> {
        let backend = MockBackend::start(DemoData::generate(7))?;
        let mut runtime = runtime_for(&backend)?;
        login(&mut runtime, DemoData::ROOT_USERNAME, DEMO_PASSWORD).expect("login");

        let input = CompanyFormInput {
            code: "C001".to_owned(),
            name: "Renamed Works".to_owned(),
            subcontractor: true,
            state: "Ohio".to_owned(),
            status: Some(RecordStatus::Active),
            contact_name: "Dana Reyes".to_owned(),
            mobile_phone: "555-100-2000".to_owned(),
            address: "1 Mill Road".to_owned(),
        };
        runtime
            .submit_form(&FormPayload::Company(input), Some("1"))
            .expect("update accepted");

        let PageData::Companies(companies) = runtime.load_page(PageKind::Companies)? else {
            panic!("companies page expected");
        };
        let renamed = companies
            .iter()
            .find(|company| company.id.get() == 1)
            .expect("company 1 still listed");
        assert_eq!(renamed.name, "Renamed Works");
        Ok(())
    }

    #[test]
    fn deleting_from_read_only_pages_is_refused() -> Result<()> {
        let backend = MockBackend::start(DemoData::generate(7))?;
        let mut runtime = runtime_for(&backend)?;
        let error = runtime
            .delete_record(PageKind::Jobs, "1")
            .expect_err("jobs are read only");
        assert_eq!(error.user_message(), "jobs cannot be deleted");

        let error = runtime
            .delete_record(PageKind::Companies, "abc")
            .expect_err("non-numeric id should fail");
        assert!(matches!(error, RemoteError::Decode(_)));
        Ok(())
    }

    #[test]
    fn item_filter_result_arrives_on_the_channel() -> Result<()> {
        let data = DemoData::generate(9);
        let category = data.items[0].category.clone();
        let expected = data
            .items
            .iter()
            .filter(|item| item.category.eq_ignore_ascii_case(&category))
            .count();
        let backend = MockBackend::start(data)?;
        let mut runtime = runtime_for(&backend)?;
        login(&mut runtime, DemoData::ROOT_USERNAME, DEMO_PASSWORD).expect("login");

        let (tx, rx) = mpsc::channel();
        let ticket = factory_app::TableView::<factory_app::Item>::default().begin_request();
        let filters = BTreeMap::from([("category".to_owned(), category)]);
        runtime.spawn_item_filter(ticket, filters, tx)?;

        let event = rx.recv_timeout(Duration::from_secs(5))?;
        let InternalEvent::ItemsFiltered {
            ticket: received,
            result,
        } = event
        else {
            panic!("item filter event expected");
        };
        assert_eq!(received, ticket);
        assert_eq!(result.expect("filter succeeds").len(), expected);
        Ok(())
    }

    #[test]
    fn logout_clears_the_session() -> Result<()> {
        let backend = MockBackend::start(DemoData::generate(3))?;
        let mut runtime = runtime_for(&backend)?;
        login(&mut runtime, DemoData::ADMIN_USERNAME, DEMO_PASSWORD).expect("login");

        runtime.logout()?;
        assert_eq!(runtime.session_status(), SessionStatus::Missing);
        assert!(runtime.claims().is_none());
        assert!(runtime.current_role().is_none());
        Ok(())
    }

    #[test]
    fn column_config_saves_under_the_item_screen() -> Result<()> {
        let backend = MockBackend::start(DemoData::generate(3))?;
        let mut runtime = runtime_for(&backend)?;
        login(&mut runtime, DemoData::ADMIN_USERNAME, DEMO_PASSWORD).expect("login");

        assert_eq!(runtime.load_column_config().expect("config read"), None);
        runtime
            .save_column_config(r#"["code","name"]"#)
            .expect("config saved");
        assert_eq!(
            runtime.load_column_config().expect("config read").as_deref(),
            Some(r#"["code","name"]"#)
        );
        Ok(())
    }
}
