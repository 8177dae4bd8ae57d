// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, anyhow};
use factory_api::Client;
use factory_app::{
    LoginFormInput, NETWORK_ERROR_MESSAGE, RemoteError, RoleId, RolePermissionsInput,
    PermissionId, Token, UserId,
};
use std::collections::BTreeMap;
use std::io::Read;
use std::thread;
use std::time::Duration;
use tiny_http::{Header, Request, Response, Server};

fn json_response(body: &str, status: u16) -> Response<std::io::Cursor<Vec<u8>>> {
    Response::from_string(body)
        .with_status_code(status)
        .with_header(
            Header::from_bytes("Content-Type", "application/json")
                .expect("valid content type header"),
        )
}

fn header_value(request: &Request, name: &'static str) -> Option<String> {
    request
        .headers()
        .iter()
        .find(|header| header.field.equiv(name))
        .map(|header| header.value.as_str().to_owned())
}

fn read_body(request: &mut Request) -> String {
    let mut body = String::new();
    request
        .as_reader()
        .read_to_string(&mut body)
        .expect("request body should be readable");
    body
}

fn mock_server() -> Result<(Server, String)> {
    let server =
        Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
    let addr = format!("http://{}/api", server.server_addr());
    Ok((server, addr))
}

#[test]
fn new_rejects_bad_base_urls() {
    let timeout = Duration::from_secs(1);
    assert!(Client::new("", 100, timeout).is_err());
    assert!(Client::new("not a url", 100, timeout).is_err());
    assert!(Client::new("ftp://factory.local/api", 100, timeout).is_err());
    assert!(Client::new("http://factory.local/api", 0, timeout).is_err());

    let client = Client::new("http://factory.local/api/", 100, timeout)
        .expect("client should initialize");
    assert_eq!(client.base_url(), "http://factory.local/api");
}

#[test]
fn unreachable_backend_is_a_network_error() {
    let client = Client::new("http://127.0.0.1:1/api", 100, Duration::from_millis(50))
        .expect("client should initialize");

    let error = client
        .list_users()
        .expect_err("listing should fail for unreachable endpoint");
    assert!(matches!(error, RemoteError::Network { .. }));
    assert_eq!(error.user_message(), NETWORK_ERROR_MESSAGE);
}

#[test]
fn login_posts_credentials_and_reads_the_grant() -> Result<()> {
    let (server, addr) = mock_server()?;

    let handle = thread::spawn(move || {
        let mut request = server.recv().expect("request expected");
        assert_eq!(request.url(), "/api/auth/login");
        assert_eq!(request.method().as_str(), "POST");
        let body: serde_json::Value =
            serde_json::from_str(&read_body(&mut request)).expect("json body");
        assert_eq!(body["username"], "alice");
        assert_eq!(body["password"], "Secret#1");
        request
            .respond(json_response(
                r#"{"result":{"authenticated":true,"token":"tok-1","expiryAt":"2030-01-01T00:00:00Z"}}"#,
                200,
            ))
            .expect("response should succeed");
    });

    let client = Client::new(&addr, 100, Duration::from_secs(1))?;
    let grant = client.login(&LoginFormInput {
        username: " alice ".to_owned(),
        password: "Secret#1".to_owned(),
        remember_me: true,
    })?;
    assert!(grant.authenticated);
    assert_eq!(grant.token, "tok-1");
    assert_eq!(grant.expires_at.map(|at| at.year()), Some(2030));

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn rejected_login_is_unauthorized() -> Result<()> {
    let (server, addr) = mock_server()?;

    let handle = thread::spawn(move || {
        let request = server.recv().expect("request expected");
        request
            .respond(json_response(r#"{"result":{"authenticated":false}}"#, 200))
            .expect("response should succeed");
    });

    let client = Client::new(&addr, 100, Duration::from_secs(1))?;
    let error = client
        .login(&LoginFormInput::default())
        .expect_err("login should be refused");
    assert!(error.is_unauthorized());

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn collections_send_bearer_and_page_query() -> Result<()> {
    let (server, addr) = mock_server()?;

    let handle = thread::spawn(move || {
        let request = server.recv().expect("request expected");
        assert_eq!(request.url(), "/api/items/get?page=0&size=250");
        assert_eq!(
            header_value(&request, "Authorization").as_deref(),
            Some("Bearer tok-9")
        );
        let body = r#"{"result":{"content":[
            {"id":1,"code":"IT-1","name":"Bolt","category":"Fastener","material":"Steel",
             "quantity":12.5,"unit":"kg","status":"ACTIVE","qcDate":"2025-02-03"},
            {"id":2,"code":"IT-2","name":"Nut","status":"INACTIVE","qcDate":null}
        ],"totalElements":2}}"#;
        request
            .respond(json_response(body, 200))
            .expect("response should succeed");
    });

    let mut client = Client::new(&addr, 250, Duration::from_secs(1))?;
    client.authorize(Some(&Token::new("tok-9", None)));
    let items = client.list_items()?;
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].code, "IT-1");
    assert!(items[0].qc_date.is_some());
    assert!(items[1].qc_date.is_none());
    assert_eq!(items[1].category, "");

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn unauthorized_status_is_classified() -> Result<()> {
    let (server, addr) = mock_server()?;

    let handle = thread::spawn(move || {
        let request = server.recv().expect("request expected");
        request
            .respond(json_response(r#"{"message":"Token expired"}"#, 401))
            .expect("response should succeed");
    });

    let client = Client::new(&addr, 100, Duration::from_secs(1))?;
    let error = client
        .list_companies()
        .expect_err("listing should be refused");
    assert!(error.is_unauthorized());
    assert_eq!(error.user_message(), "Token expired");

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn server_error_without_message_uses_fallback() -> Result<()> {
    let (server, addr) = mock_server()?;

    let handle = thread::spawn(move || {
        let request = server.recv().expect("request expected");
        request
            .respond(json_response("{}", 500))
            .expect("response should succeed");
    });

    let client = Client::new(&addr, 100, Duration::from_secs(1))?;
    let error = client
        .delete_user(&UserId::new("7"))
        .expect_err("delete should fail");
    assert_eq!(
        error,
        RemoteError::Server {
            status: 500,
            message: None,
        }
    );
    assert_eq!(error.user_message(), "An unknown error occurred.");

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn proxy_error_page_is_not_shown_to_the_user() -> Result<()> {
    let (server, addr) = mock_server()?;

    let handle = thread::spawn(move || {
        let request = server.recv().expect("request expected");
        let response = Response::from_string("<html><h1>502 Bad Gateway</h1> nginx</html>")
            .with_status_code(502);
        request.respond(response).expect("response should succeed");
    });

    let client = Client::new(&addr, 100, Duration::from_secs(1))?;
    let error = client.list_jobs().expect_err("listing should fail");
    assert_eq!(
        error,
        RemoteError::Server {
            status: 502,
            message: None,
        }
    );
    assert_eq!(error.user_message(), "An unknown error occurred.");

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn user_details_fetches_one_user_by_id() -> Result<()> {
    let (server, addr) = mock_server()?;

    let handle = thread::spawn(move || {
        let request = server.recv().expect("request expected");
        assert_eq!(request.url(), "/api/users/get/42");
        assert_eq!(
            header_value(&request, "Authorization").as_deref(),
            Some("Bearer tok-3")
        );
        let body = r#"{"result":{"userId":42,"username":"mlee","firstname":"Mina",
            "lastname":"Lee","company":[{"companyName":"Atlas Castings Ltd"}],
            "team":[{"name":"Assembly"}],"dateOfBirth":"1991-04-02","roleName":"SUPERVISOR",
            "status":"ACTIVE","projectManager":true}}"#;
        request
            .respond(json_response(body, 200))
            .expect("response should succeed");
    });

    let mut client = Client::new(&addr, 100, Duration::from_secs(1))?;
    client.authorize(Some(&Token::new("tok-3", None)));
    let user = client.user_details(&UserId::new("42"))?;
    assert_eq!(user.user_id, UserId::new("42"));
    assert_eq!(user.full_name(), "Mina Lee");
    assert_eq!(user.company, ["Atlas Castings Ltd"]);
    assert_eq!(user.project_manager, Some(true));

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn item_filter_posts_the_filter_map() -> Result<()> {
    let (server, addr) = mock_server()?;

    let handle = thread::spawn(move || {
        let mut request = server.recv().expect("request expected");
        assert_eq!(request.url(), "/api/items/filter");
        let body: serde_json::Value =
            serde_json::from_str(&read_body(&mut request)).expect("json body");
        assert_eq!(body["filters"]["category"], "Fastener");
        request
            .respond(json_response(
                r#"{"result":[{"id":5,"code":"IT-5","name":"Washer","category":"Fastener"}]}"#,
                200,
            ))
            .expect("response should succeed");
    });

    let client = Client::new(&addr, 100, Duration::from_secs(1))?;
    let filters = BTreeMap::from([("category".to_owned(), "Fastener".to_owned())]);
    let items = client.filter_items(&filters)?;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "Washer");

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn role_permissions_round_trip() -> Result<()> {
    let (server, addr) = mock_server()?;

    let handle = thread::spawn(move || {
        let request = server.recv().expect("request expected");
        assert_eq!(request.url(), "/api/roles/get/4");
        request
            .respond(json_response(
                r#"{"result":{"id":4,"name":"SUPERVISOR","permissions":[{"permissionId":2,"name":"EDIT_USER"}]}}"#,
                200,
            ))
            .expect("response should succeed");

        let mut request = server.recv().expect("request expected");
        assert_eq!(request.url(), "/api/roles/4/assign-permissions");
        assert_eq!(request.method().as_str(), "PUT");
        let body: serde_json::Value =
            serde_json::from_str(&read_body(&mut request)).expect("json body");
        assert_eq!(body["permissionIds"], serde_json::json!([2, 9]));
        request
            .respond(json_response(r#"{"result":null}"#, 200))
            .expect("response should succeed");
    });

    let client = Client::new(&addr, 100, Duration::from_secs(1))?;
    let role = client.role_details(RoleId::new(4))?;
    assert_eq!(role.name, "SUPERVISOR");
    assert_eq!(role.permissions[0].label(), "Edit User");

    client.assign_permissions(&RolePermissionsInput {
        role_id: role.id,
        permission_ids: vec![PermissionId::new(2), PermissionId::new(9)],
    })?;

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn ui_config_reads_the_stored_json() -> Result<()> {
    let (server, addr) = mock_server()?;

    let handle = thread::spawn(move || {
        let request = server.recv().expect("request expected");
        assert_eq!(request.url(), "/api/ui-config/get?screenCode=ITEM_MANAGEMENT");
        request
            .respond(json_response(
                r#"{"result":{"configJson":"[\"code\",\"name\"]"}}"#,
                200,
            ))
            .expect("response should succeed");
    });

    let client = Client::new(&addr, 100, Duration::from_secs(1))?;
    let stored = client.ui_config("ITEM_MANAGEMENT")?;
    assert_eq!(stored.as_deref(), Some(r#"["code","name"]"#));

    handle.join().expect("server thread should join");
    Ok(())
}
