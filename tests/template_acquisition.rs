//! Template download against a scripted server: redirects, retries and the
//! default-source fallback chain.

mod common;

use azure_provision::api::http;
use azure_provision::error::AcquireError;
use azure_provision::provision::policy::{REDIRECT_CODES, TRANSIENT_CODES};
use azure_provision::provision::{FetchPolicy, TemplateAcquirer, TemplateDefaults, TemplateOrigin, load_template};
use common::{Reply, ScriptedServer};
use serde_json::json;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

const TEMPLATE: &str = r#"{"$schema":"x","resources":[{"type":"Microsoft.Web/sites"}]}"#;

fn acquirer() -> TemplateAcquirer {
    let client = http::default_client().unwrap();
    TemplateAcquirer::new(client, FetchPolicy::immediate(), CancellationToken::new())
}

#[tokio::test]
async fn test_redirect_then_success_returns_body_unchanged() {
    let server = ScriptedServer::start().await;
    server.route("GET", "/start", vec![Reply::redirect(302, &server.url("/final"))]);
    server.route("GET", "/final", vec![Reply::status(200).body(TEMPLATE)]);

    let bytes = acquirer().acquire(&server.url("/start")).await.unwrap();

    assert_eq!(bytes, TEMPLATE.as_bytes());
    assert_eq!(server.hits_on("GET", "/start"), 1);
    assert_eq!(server.hits_on("GET", "/final"), 1);
}

#[tokio::test]
async fn test_relative_location_resolves_against_current_url() {
    let server = ScriptedServer::start().await;
    server.route("GET", "/templates/latest", vec![Reply::redirect(307, "v2/azuredeploy.json")]);
    server.route("GET", "/templates/v2/azuredeploy.json", vec![Reply::status(200).body(TEMPLATE)]);

    let bytes = acquirer().acquire(&server.url("/templates/latest")).await.unwrap();

    assert_eq!(bytes, TEMPLATE.as_bytes());
}

#[tokio::test]
async fn test_every_transient_status_is_tried_exactly_three_times() {
    for code in TRANSIENT_CODES {
        let server = ScriptedServer::start().await;
        server.route("GET", "/flaky", vec![Reply::status(code)]);

        let err = acquirer().acquire(&server.url("/flaky")).await.unwrap_err();

        assert!(
            matches!(err, AcquireError::RetriesExhausted { last_status, .. } if last_status == code),
            "status {}: {:?}",
            code,
            err
        );
        assert_eq!(server.hits_on("GET", "/flaky"), 3, "status {}", code);
    }
}

#[tokio::test]
async fn test_transient_then_success_recovers() {
    let server = ScriptedServer::start().await;
    server.route(
        "GET",
        "/flaky",
        vec![Reply::status(429), Reply::status(504), Reply::status(200).body(TEMPLATE)],
    );

    let bytes = acquirer().acquire(&server.url("/flaky")).await.unwrap();

    assert_eq!(bytes, TEMPLATE.as_bytes());
    assert_eq!(server.hits_on("GET", "/flaky"), 3);
}

#[tokio::test]
async fn test_redirect_loop_is_bounded_for_every_redirect_status() {
    for code in REDIRECT_CODES {
        let server = ScriptedServer::start().await;
        server.route("GET", "/a", vec![Reply::redirect(code, "/b")]);
        server.route("GET", "/b", vec![Reply::redirect(code, "/a")]);

        let err = acquirer().acquire(&server.url("/a")).await.unwrap_err();

        assert!(matches!(err, AcquireError::RedirectLoop { .. }), "status {}: {:?}", code, err);
        assert_eq!(server.hits().len(), 5, "status {}", code);
    }
}

#[tokio::test]
async fn test_redirect_bound_holds_across_mixed_codes() {
    let server = ScriptedServer::start().await;
    let paths = ["/1", "/2", "/3", "/4", "/5", "/6"];
    for (i, code) in REDIRECT_CODES.iter().enumerate() {
        server.route("GET", paths[i], vec![Reply::redirect(*code, paths[i + 1])]);
    }
    server.route("GET", "/6", vec![Reply::status(200).body(TEMPLATE)]);

    let err = acquirer().acquire(&server.url("/1")).await.unwrap_err();

    assert!(matches!(err, AcquireError::RedirectLoop { .. }));
    assert_eq!(server.hits().len(), 5);
    assert_eq!(server.hits_on("GET", "/6"), 0);
}

#[tokio::test]
async fn test_four_redirects_then_success_is_within_bound() {
    let server = ScriptedServer::start().await;
    server.route("GET", "/1", vec![Reply::redirect(302, "/2")]);
    server.route("GET", "/2", vec![Reply::redirect(303, "/3")]);
    server.route("GET", "/3", vec![Reply::redirect(307, "/4")]);
    server.route("GET", "/4", vec![Reply::redirect(308, "/5")]);
    server.route("GET", "/5", vec![Reply::status(200).body(TEMPLATE)]);

    let bytes = acquirer().acquire(&server.url("/1")).await.unwrap();

    assert_eq!(bytes, TEMPLATE.as_bytes());
}

#[tokio::test]
async fn test_unexpected_status_fails_without_retry() {
    let server = ScriptedServer::start().await;
    server.route("GET", "/gone", vec![Reply::status(404)]);

    let err = acquirer().acquire(&server.url("/gone")).await.unwrap_err();

    assert!(matches!(err, AcquireError::UnexpectedStatus { status: 404, .. }));
    assert_eq!(server.hits_on("GET", "/gone"), 1);
}

#[tokio::test]
async fn test_redirect_without_location_fails() {
    let server = ScriptedServer::start().await;
    server.route("GET", "/moved", vec![Reply::status(302)]);

    let err = acquirer().acquire(&server.url("/moved")).await.unwrap_err();

    assert!(matches!(err, AcquireError::MissingLocation { status: 302, .. }));
}

#[tokio::test]
async fn test_local_path_is_read_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("azuredeploy.json");
    std::fs::write(&path, TEMPLATE).unwrap();

    let bytes = acquirer().acquire(path.to_str().unwrap()).await.unwrap();

    assert_eq!(bytes, TEMPLATE.as_bytes());
}

#[tokio::test]
async fn test_default_link_failure_falls_back_to_bundled_template() {
    let server = ScriptedServer::start().await;
    server.route("GET", "/template", vec![Reply::status(500)]);
    let dir = tempfile::tempdir().unwrap();
    let defaults = TemplateDefaults {
        local_path: dir.path().join("missing.json"),
        link: server.url("/template"),
    };

    let template = load_template(&acquirer(), None, &defaults).await.unwrap();

    assert_eq!(template.origin, TemplateOrigin::Bundled);
    assert!(template.document["parameters"].get("name").is_some());
}

#[tokio::test]
async fn test_default_link_is_used_when_no_local_file() {
    let server = ScriptedServer::start().await;
    server.route("GET", "/template", vec![Reply::json(200, json!({"resources": []}))]);
    let dir = tempfile::tempdir().unwrap();
    let defaults = TemplateDefaults {
        local_path: dir.path().join("missing.json"),
        link: server.url("/template"),
    };

    let template = load_template(&acquirer(), None, &defaults).await.unwrap();

    assert_eq!(template.origin, TemplateOrigin::DefaultRemote(server.url("/template")));
    assert_eq!(template.document, json!({"resources": []}));
}

#[tokio::test]
async fn test_local_default_wins_over_link() {
    let server = ScriptedServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let local_path = dir.path().join("azuredeploy.json");
    std::fs::write(&local_path, TEMPLATE).unwrap();
    let defaults = TemplateDefaults {
        local_path: local_path.clone(),
        link: server.url("/template"),
    };

    let template = load_template(&acquirer(), None, &defaults).await.unwrap();

    assert_eq!(template.origin, TemplateOrigin::DefaultLocal(local_path));
    assert!(server.hits().is_empty());
}

#[tokio::test]
async fn test_explicit_request_failure_is_terminal() {
    let server = ScriptedServer::start().await;
    server.route("GET", "/custom", vec![Reply::status(500)]);
    let defaults = TemplateDefaults {
        local_path: PathBuf::from("does-not-exist.json"),
        link: server.url("/template"),
    };

    let result = load_template(&acquirer(), Some(&server.url("/custom")), &defaults).await;

    assert!(matches!(result, Err(AcquireError::UnexpectedStatus { status: 500, .. })));
    assert_eq!(server.hits_on("GET", "/template"), 0);
}

#[tokio::test]
async fn test_cancelled_download_does_not_fall_back() {
    let server = ScriptedServer::start().await;
    server.route(
        "GET",
        "/template",
        vec![Reply::status(200).body(TEMPLATE).delayed(std::time::Duration::from_secs(5))],
    );
    let cancel = CancellationToken::new();
    let acquirer = TemplateAcquirer::new(http::default_client().unwrap(), FetchPolicy::immediate(), cancel.clone());
    let dir = tempfile::tempdir().unwrap();
    let defaults = TemplateDefaults {
        local_path: dir.path().join("missing.json"),
        link: server.url("/template"),
    };

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        cancel.cancel();
    });
    let result = load_template(&acquirer, None, &defaults).await;
    canceller.await.unwrap();

    assert!(matches!(result, Err(AcquireError::Cancelled)));
}
