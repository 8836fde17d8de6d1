use pretty_assertions::assert_eq;
use reqwest::Client;
use serde_json::json;
use store::{
    AuthClient, AuthError, Direction, QueryRequest, QueryResult, RestRowStore, RowStore,
    StoreError,
};
use url::Url;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, header, method, path, query_param},
};

const KEY: &str = "anon-key";

fn project_url(server: &MockServer) -> Url {
    Url::parse(&format!("{}/", server.uri())).unwrap()
}

fn rows(server: &MockServer) -> RestRowStore {
    RestRowStore::new(Client::new(), &project_url(server), KEY).unwrap()
}

fn auth(server: &MockServer) -> AuthClient {
    AuthClient::new(Client::new(), &project_url(server), KEY).unwrap()
}

#[tokio::test]
async fn collection_read_sends_filter_order_and_keys() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/posts"))
        .and(query_param("select", "*"))
        .and(query_param("published", "eq.true"))
        .and(query_param("order", "published_at.desc"))
        .and(header("apikey", KEY))
        .and(header("authorization", "Bearer user-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 1, "title": "First" },
            { "id": 2, "title": "Second" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let request = QueryRequest::select("posts")
        .eq("published", "true")
        .order("published_at", Direction::Descending);

    let result = rows(&server)
        .fetch_all(&request, Some("user-token"))
        .await
        .unwrap();

    assert_eq!(result.len(), 2);
    assert_eq!(result[0]["title"], json!("First"));
}

#[tokio::test]
async fn anonymous_read_uses_project_key_as_bearer() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/jobs"))
        .and(header("authorization", "Bearer anon-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let result = rows(&server)
        .fetch(&QueryRequest::select("jobs"), None)
        .await
        .unwrap();

    assert_eq!(result, QueryResult::Rows(vec![]));
}

#[tokio::test]
async fn single_read_distinguishes_absence_from_errors() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/posts"))
        .and(query_param("id", "eq.999"))
        .and(query_param("limit", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/posts"))
        .and(query_param("id", "eq.123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 123 }])))
        .mount(&server)
        .await;

    let store = rows(&server);

    let missing = store
        .fetch_one(&QueryRequest::select("posts").eq("id", "999").single(), None)
        .await
        .unwrap();
    assert!(missing.is_none());

    let found = store
        .fetch_one(&QueryRequest::select("posts").eq("id", "123").single(), None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found["id"], json!(123));
}

#[tokio::test]
async fn single_read_rejects_duplicates() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/posts"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{ "slug": "a" }, { "slug": "a" }])),
        )
        .mount(&server)
        .await;

    let err = rows(&server)
        .fetch(&QueryRequest::select("posts").eq("slug", "a").single(), None)
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::MultipleRows { .. }));
}

#[tokio::test]
async fn unparseable_key_is_absent_only_in_single_mode() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/posts"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": "22P02",
            "message": "invalid input syntax for type bigint: \"abc\""
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/jobs"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": "42703",
            "message": "column jobs.nope does not exist"
        })))
        .mount(&server)
        .await;

    let store = rows(&server);

    let single = store
        .fetch(&QueryRequest::select("posts").eq("id", "abc").single(), None)
        .await
        .unwrap();
    assert_eq!(single, QueryResult::Single(None));

    let collection = store
        .fetch(&QueryRequest::select("posts").eq("id", "abc"), None)
        .await
        .unwrap_err();
    assert!(matches!(collection, StoreError::Service { .. }));

    let other_code = store
        .fetch(&QueryRequest::select("jobs").eq("nope", "1").single(), None)
        .await
        .unwrap_err();
    assert!(matches!(other_code, StoreError::Service { .. }));
}

#[tokio::test]
async fn error_statuses_are_typed() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/contact_messages"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/programs"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let store = rows(&server);

    let denied = store
        .fetch(&QueryRequest::select("contact_messages"), None)
        .await
        .unwrap_err();
    assert!(matches!(denied, StoreError::PermissionDenied { .. }));

    let unavailable = store
        .fetch(&QueryRequest::select("programs"), None)
        .await
        .unwrap_err();
    match unavailable {
        StoreError::Service { status, message } => {
            assert_eq!(status.as_u16(), 503);
            assert_eq!(message, "maintenance");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn invalid_identifier_never_reaches_the_network() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let err = rows(&server)
        .fetch(&QueryRequest::select("../auth/v1/admin"), None)
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::InvalidIdentifier(_)));
}

#[tokio::test]
async fn unreachable_row_store() {
    let url = Url::parse("http://127.0.0.1:9/").unwrap();
    let store = RestRowStore::new(Client::new(), &url, KEY).unwrap();

    let err = store
        .fetch(&QueryRequest::select("posts"), None)
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::Unreachable(_)));
}

#[tokio::test]
async fn get_user_maps_rejection_and_outage() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .and(header("authorization", "Bearer good"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "u-1",
            "email": "admin@example.com",
            "role": "authenticated",
            "aud": "authenticated"
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .and(header("authorization", "Bearer busy"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let client = auth(&server);

    let user = client.get_user("good").await.unwrap();
    assert_eq!(user.id, "u-1");
    assert_eq!(user.email.as_deref(), Some("admin@example.com"));

    let rejected = client.get_user("stale").await.unwrap_err();
    assert!(matches!(rejected, AuthError::Rejected));
    assert!(!rejected.is_unavailable());

    let outage = client.get_user("busy").await.unwrap_err();
    assert!(outage.is_unavailable());
}

#[tokio::test]
async fn refresh_posts_grant() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "refresh_token"))
        .and(body_json(json!({ "refresh_token": "r-1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "a-2",
            "refresh_token": "r-2",
            "expires_in": 3600,
            "token_type": "bearer",
            "user": { "id": "u-1", "email": "admin@example.com" }
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "refresh_token"))
        .and(body_json(json!({ "refresh_token": "spent" })))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant"
        })))
        .mount(&server)
        .await;

    let client = auth(&server);

    let grant = client.refresh("r-1").await.unwrap();
    assert_eq!(grant.access_token, "a-2");
    assert_eq!(grant.refresh_token, "r-2");
    assert_eq!(grant.expires_in, Some(3600));
    assert_eq!(grant.user.id, "u-1");

    assert!(matches!(
        client.refresh("spent").await.unwrap_err(),
        AuthError::Rejected
    ));
}

#[tokio::test]
async fn sign_in_and_out() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .and(body_json(json!({ "email": "admin@example.com", "password": "hunter2" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "a-1",
            "refresh_token": "r-1",
            "expires_in": 3600,
            "user": { "id": "u-1" }
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/logout"))
        .and(header("authorization", "Bearer a-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = auth(&server);

    let grant = client.sign_in("admin@example.com", "hunter2").await.unwrap();
    assert_eq!(grant.user.email, None);

    client.sign_out(&grant.access_token).await.unwrap();
}
