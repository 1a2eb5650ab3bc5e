use reqwest::StatusCode;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};
use xmind_core::{GithubClient, GithubError};

fn client_for(server: &MockServer) -> GithubClient {
    GithubClient::with_base_url(&server.uri(), "gh-token", "me/backups").unwrap()
}

#[tokio::test]
async fn get_file_returns_none_on_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/me/backups/contents/xmind_backup/Plan.xmind"))
        .and(header("authorization", "Bearer gh-token"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "message": "Not Found"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let file = client_for(&server)
        .get_file("xmind_backup/Plan.xmind")
        .await
        .unwrap();

    assert!(file.is_none());
}

#[tokio::test]
async fn get_file_decodes_content_and_uses_branch() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/me/backups/contents/xmind_backup/Plan.xmind"))
        .and(query_param("ref", "backup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "type": "file",
            "path": "xmind_backup/Plan.xmind",
            "sha": "abc123",
            "encoding": "base64",
            "content": "b2xk\n"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let file = client_for(&server)
        .with_branch(Some("backup".to_string()))
        .get_file("xmind_backup/Plan.xmind")
        .await
        .unwrap()
        .expect("file should exist");

    assert_eq!(file.sha, "abc123");
    assert_eq!(file.content.as_deref(), Some(&b"old"[..]));
}

#[tokio::test]
async fn get_file_surfaces_other_errors() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/me/backups/contents/a.xmind"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .get_file("a.xmind")
        .await
        .expect_err("expected api error");

    assert!(matches!(
        err,
        GithubError::Api { status, .. } if status == StatusCode::INTERNAL_SERVER_ERROR
    ));
}

#[tokio::test]
async fn create_file_puts_base64_without_sha() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/repos/me/backups/contents/xmind_backup/Plan.xmind"))
        .and(header("authorization", "Bearer gh-token"))
        .and(body_json(json!({
            "message": "Add Plan.xmind",
            "content": "aGVsbG8="
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "content": {"path": "xmind_backup/Plan.xmind", "sha": "new-sha"},
            "commit": {"sha": "commit-1"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = client_for(&server)
        .create_file("xmind_backup/Plan.xmind", b"hello", "Add Plan.xmind")
        .await
        .unwrap();

    assert_eq!(response.commit.sha, "commit-1");
    assert_eq!(response.content.map(|c| c.sha).as_deref(), Some("new-sha"));
}

#[tokio::test]
async fn update_file_sends_sha_and_branch() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/repos/me/backups/contents/xmind_backup/Plan.xmind"))
        .and(body_json(json!({
            "message": "Update Plan.xmind",
            "content": "aGVsbG8=",
            "sha": "abc123",
            "branch": "backup"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": {"path": "xmind_backup/Plan.xmind", "sha": "def456"},
            "commit": {"sha": "commit-2"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = client_for(&server)
        .with_branch(Some("backup".to_string()))
        .update_file("xmind_backup/Plan.xmind", b"hello", "abc123", "Update Plan.xmind")
        .await
        .unwrap();

    assert_eq!(response.commit.sha, "commit-2");
}

#[tokio::test]
async fn update_with_stale_sha_is_a_conflict() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/repos/me/backups/contents/Plan.xmind"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "message": "Plan.xmind does not match stale"
        })))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .update_file("Plan.xmind", b"x", "stale", "Update Plan.xmind")
        .await
        .expect_err("expected conflict");

    assert!(matches!(err, GithubError::Conflict { ref path, .. } if path == "Plan.xmind"));
}
