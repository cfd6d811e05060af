use httpmock::prelude::*;
use issue_sync::config::JiraInstance;
use issue_sync::tracker::{check_health, FieldUpdate, JiraClient, RemoteLink, HEALTH_QUERY};
use issue_sync::{Tracker, TrackerError};
use serde_json::json;

fn instance(server: &MockServer) -> JiraInstance {
    JiraInstance {
        server: server.base_url(),
        token: Some("secret".to_string()),
        username: None,
        password: None,
        timeout_secs: 5,
    }
}

fn raw_issue(key: &str) -> serde_json::Value {
    json!({
        "id": "10001",
        "key": key,
        "fields": {
            "summary": "[org/repo] Crash",
            "description": "It crashes",
            "status": { "name": "To Do", "statusCategory": { "key": "new" } },
            "issuetype": { "name": "Story" },
            "labels": ["bug"],
            "fixVersions": [],
            "created": "2024-01-02T03:04:05.000+0000",
            "updated": "2024-01-02T03:04:05.000+0000",
            "customfield_10002": 3
        }
    })
}

#[tokio::test]
async fn search_follows_pages_with_bearer_auth() {
    let server = MockServer::start_async().await;
    let first = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/rest/api/2/search")
                .header("authorization", "Bearer secret")
                .query_param("startAt", "0");
            then.status(200)
                .json_body(json!({ "total": 2, "issues": [raw_issue("FACTORY-1")] }));
        })
        .await;
    let second = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/rest/api/2/search")
                .query_param("startAt", "1");
            then.status(200)
                .json_body(json!({ "total": 2, "issues": [raw_issue("FACTORY-2")] }));
        })
        .await;

    let client = JiraClient::new(&instance(&server)).unwrap();
    let tickets = client.search("project = FACTORY").await.unwrap();

    first.assert_async().await;
    second.assert_async().await;
    assert_eq!(tickets.len(), 2);
    assert_eq!(tickets[1].key, "FACTORY-2");
    assert_eq!(tickets[0].status_category, "new");
    assert_eq!(tickets[0].fields["customfield_10002"], json!(3));
}

#[tokio::test]
async fn health_check_asks_for_a_single_key() {
    let server = MockServer::start_async().await;
    let probe = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/rest/api/2/search")
                .query_param("jql", HEALTH_QUERY)
                .query_param("maxResults", "1")
                .query_param("fields", "key");
            then.status(200).json_body(json!({
                "total": 5000,
                "issues": [{ "id": "10001", "key": "FACTORY-1" }]
            }));
        })
        .await;

    let client = JiraClient::new(&instance(&server)).unwrap();
    let healthy = check_health(&client).await.unwrap();

    probe.assert_async().await;
    assert!(healthy);
}

#[tokio::test]
async fn health_check_reports_an_empty_answer() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/rest/api/2/search");
            then.status(200).json_body(json!({ "total": 0, "issues": [] }));
        })
        .await;

    let client = JiraClient::new(&instance(&server)).unwrap();

    assert!(!check_health(&client).await.unwrap());
}

#[tokio::test]
async fn create_returns_the_fetched_ticket() {
    let server = MockServer::start_async().await;
    let create = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/rest/api/2/issue")
                .body_includes(r#""project":{"key":"FACTORY"}"#);
            then.status(201).json_body(json!({ "id": "10001", "key": "FACTORY-1" }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/rest/api/2/issue/FACTORY-1");
            then.status(200).json_body(raw_issue("FACTORY-1"));
        })
        .await;

    let client = JiraClient::new(&instance(&server)).unwrap();
    let ticket = client
        .create_ticket(&issue_sync::tracker::NewTicket {
            project: "FACTORY".to_string(),
            summary: "[org/repo] Crash".to_string(),
            description: "It crashes".to_string(),
            issue_type: "Story".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    create.assert_async().await;
    assert_eq!(ticket.key, "FACTORY-1");
    assert_eq!(ticket.labels, vec!["bug".to_string()]);
}

#[tokio::test]
async fn rejected_values_are_reported_as_rejections() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(PUT).path("/rest/api/2/issue/FACTORY-1");
            then.status(400).json_body(json!({
                "errorMessages": [],
                "errors": { "fixVersions": "Version 'v9' is not valid" }
            }));
        })
        .await;

    let client = JiraClient::new(&instance(&server)).unwrap();
    let err = client
        .update_field("FACTORY-1", &FieldUpdate::FixVersions(vec!["v9".to_string()]))
        .await
        .unwrap_err();

    assert!(err.is_rejection());
    assert!(err.to_string().contains("fixVersions: Version 'v9' is not valid"));
}

#[tokio::test]
async fn unauthorized_is_a_session_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/rest/api/2/issue/FACTORY-1/remotelink");
            then.status(401).body("expired");
        })
        .await;

    let client = JiraClient::new(&instance(&server)).unwrap();
    let err = client.remote_links("FACTORY-1").await.unwrap_err();

    assert!(err.is_session_error());
    assert!(matches!(err, TrackerError::Unauthorized { .. }));
}

#[tokio::test]
async fn remote_links_round_trip_through_the_link_object() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/rest/api/2/issue/FACTORY-1/remotelink");
            then.status(200).json_body(json!([
                { "id": 1, "object": { "url": "https://github.com/org/repo/issues/8", "title": "Upstream issue" } }
            ]));
        })
        .await;
    let add = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/rest/api/2/issue/FACTORY-1/remotelink")
                .json_body(json!({
                    "object": { "url": "https://github.com/org/repo/pull/9", "title": "[PR] org/repo#9" }
                }));
            then.status(201).json_body(json!({ "id": 2 }));
        })
        .await;

    let client = JiraClient::new(&instance(&server)).unwrap();
    let links = client.remote_links("FACTORY-1").await.unwrap();
    client
        .add_remote_link(
            "FACTORY-1",
            &RemoteLink::new("https://github.com/org/repo/pull/9", "[PR] org/repo#9"),
        )
        .await
        .unwrap();

    add.assert_async().await;
    assert_eq!(
        links,
        vec![RemoteLink::new(
            "https://github.com/org/repo/issues/8",
            "Upstream issue"
        )]
    );
}

#[test]
fn missing_credentials_are_a_configuration_error() {
    let instance = JiraInstance {
        server: "https://jira.example.com".to_string(),
        token: None,
        username: Some("bot".to_string()),
        password: None,
        timeout_secs: 5,
    };

    assert!(matches!(
        JiraClient::new(&instance),
        Err(TrackerError::Configuration(_))
    ));
}
