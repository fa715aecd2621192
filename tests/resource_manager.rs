//! Identity and resource manager clients against a scripted server

mod common;

use azure_provision::api::models::{DeploymentMode, DeploymentProperties, ProvisioningState};
use azure_provision::api::{ArmClient, Authorizer, CloudEnvironment, DirectoryApi, ResourceApi, http};
use azure_provision::auth::{AadClient, CredentialResolver, IdentityApi};
use azure_provision::error::{AuthError, Error};
use azure_provision::provision::{DeploymentInvoker, ResourceGroupProvisioner};
use common::{Reply, ScriptedServer};
use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const GROUP_PATH: &str = "/subscriptions/sub/resourcegroups/demo-rg";
const DEPLOYMENT_PATH: &str =
    "/subscriptions/sub/resourcegroups/demo-rg/providers/Microsoft.Resources/deployments/buffalo-app";

fn environment(server: &ScriptedServer) -> CloudEnvironment {
    CloudEnvironment::new("Local", server.base(), server.base(), "https://portal.local", "sites.local")
}

fn arm(server: &ScriptedServer, cancel: &CancellationToken) -> ArmClient {
    ArmClient::new(http::default_client().unwrap(), environment(server), "sub", cancel.clone())
}

fn token_reply(access: &str) -> Reply {
    Reply::json(
        200,
        json!({"access_token": access, "refresh_token": "refresh", "expires_in": "3599"}),
    )
}

#[tokio::test]
async fn test_ensure_creates_missing_group_once() {
    let server = ScriptedServer::start().await;
    server.route("HEAD", GROUP_PATH, vec![Reply::status(404), Reply::status(204)]);
    server.route("PUT", GROUP_PATH, vec![Reply::json(201, json!({"location": "centralus"}))]);
    let client = arm(&server, &CancellationToken::new());
    let provisioner = ResourceGroupProvisioner::new(&client);

    assert!(provisioner.ensure("demo-rg", "centralus").await.unwrap());
    assert!(!provisioner.ensure("demo-rg", "eastus").await.unwrap());

    assert_eq!(server.hits_on("PUT", GROUP_PATH), 1);
    let put = server.hits().into_iter().find(|h| h.method == "PUT").unwrap();
    let body: serde_json::Value = serde_json::from_str(&put.body).unwrap();
    assert_eq!(body["location"], "centralus");
    assert!(put.query.contains("api-version=2017-05-10"));
}

#[tokio::test]
async fn test_deployment_is_submitted_incrementally_and_polled() {
    let server = ScriptedServer::start().await;
    server.route(
        "PUT",
        DEPLOYMENT_PATH,
        vec![Reply::json(201, json!({"properties": {"provisioningState": "Accepted"}}))],
    );
    server.route(
        "GET",
        DEPLOYMENT_PATH,
        vec![
            Reply::json(200, json!({"properties": {"provisioningState": "Running"}})),
            Reply::json(200, json!({"properties": {"provisioningState": "Succeeded"}})),
        ],
    );
    let cancel = CancellationToken::new();
    let client = arm(&server, &cancel);
    let properties = DeploymentProperties {
        template: json!({"resources": []}),
        parameters: json!({"name": {"value": "buffalo-app-x"}}),
        mode: DeploymentMode::Incremental,
    };

    let result = DeploymentInvoker::new(&client, Duration::from_millis(10))
        .deploy("demo-rg", "buffalo-app", &properties, "https://portal.local/rg", &cancel)
        .await
        .unwrap();

    assert_eq!(result.state, ProvisioningState::Succeeded);
    assert_eq!(server.hits_on("GET", DEPLOYMENT_PATH), 2);
    let put = server.hits().into_iter().find(|h| h.method == "PUT").unwrap();
    let body: serde_json::Value = serde_json::from_str(&put.body).unwrap();
    assert_eq!(body["properties"]["mode"], "Incremental");
    assert_eq!(body["properties"]["parameters"]["name"]["value"], "buffalo-app-x");
}

#[tokio::test]
async fn test_failed_deployment_carries_provider_message() {
    let server = ScriptedServer::start().await;
    server.route(
        "PUT",
        DEPLOYMENT_PATH,
        vec![Reply::json(
            200,
            json!({"properties": {"provisioningState": "Failed", "error": {"message": "quota exceeded"}}}),
        )],
    );
    let cancel = CancellationToken::new();
    let client = arm(&server, &cancel);
    let properties = DeploymentProperties {
        template: json!({}),
        parameters: json!({}),
        mode: DeploymentMode::Incremental,
    };

    let err = DeploymentInvoker::new(&client, Duration::from_millis(10))
        .deploy("demo-rg", "buffalo-app", &properties, "", &cancel)
        .await
        .unwrap_err();

    assert!(!err.is_cancelled());
    assert!(err.to_string().contains("quota exceeded"));
}

#[tokio::test]
async fn test_tenants_are_paged_through_next_link() {
    let server = ScriptedServer::start().await;
    server.route(
        "GET",
        "/tenants",
        vec![
            Reply::json(200, json!({"value": [{"tenantId": "t1"}], "nextLink": server.url("/tenants-2")})),
        ],
    );
    server.route("GET", "/tenants-2", vec![Reply::json(200, json!({"value": [{"tenantId": "t2"}]}))]);
    let client = arm(&server, &CancellationToken::new());
    let authorizer = Authorizer::bearer(azure_provision::api::TokenInfo {
        access_token: "token".to_string(),
        expires_at: std::time::SystemTime::now(),
        refresh_token: None,
    });

    let mut tenants = client.tenants(&authorizer).await.unwrap();
    let mut seen = Vec::new();
    while tenants.advance().await.unwrap() {
        seen.push(tenants.current().unwrap().tenant_id.clone());
    }

    assert_eq!(seen, vec!["t1", "t2"]);
}

#[tokio::test]
async fn test_service_principal_token_request() {
    let server = ScriptedServer::start().await;
    server.route("POST", "/tenant-a/oauth2/token", vec![token_reply("sp-token")]);
    let aad = AadClient::new(http::default_client().unwrap(), &environment(&server), CancellationToken::new());

    let token = aad.client_credentials("tenant-a", "app", "secret").await.unwrap();

    assert_eq!(token.access_token, "sp-token");
    let hit = &server.hits()[0];
    assert!(hit.body.contains("grant_type=client_credentials"));
    assert!(hit.body.contains("client_id=app"));
}

#[tokio::test]
async fn test_rejected_token_surfaces_provider_error() {
    let server = ScriptedServer::start().await;
    server.route(
        "POST",
        "/tenant-a/oauth2/token",
        vec![Reply::json(
            401,
            json!({"error": "invalid_client", "error_description": "bad secret"}),
        )],
    );
    let aad = AadClient::new(http::default_client().unwrap(), &environment(&server), CancellationToken::new());

    let err = aad.client_credentials("tenant-a", "app", "wrong").await.unwrap_err();

    assert!(matches!(err, AuthError::TokenRejected { ref code, .. } if code == "invalid_client"));
}

#[tokio::test]
async fn test_device_code_login_discovers_tenant() {
    let server = ScriptedServer::start().await;
    server.route(
        "POST",
        "/common/oauth2/devicecode",
        vec![Reply::json(
            200,
            json!({
                "device_code": "dev",
                "user_code": "ABCD",
                "verification_url": "https://microsoft.com/devicelogin",
                "expires_in": "900",
                "interval": "0"
            }),
        )],
    );
    server.route(
        "POST",
        "/common/oauth2/token",
        vec![
            Reply::json(400, json!({"error": "authorization_pending"})),
            token_reply("common-token"),
        ],
    );
    server.route(
        "GET",
        "/tenants",
        vec![Reply::json(200, json!({"value": [{"tenantId": "other"}, {"tenantId": "owner"}]}))],
    );
    server.route("POST", "/other/oauth2/token", vec![token_reply("other-token")]);
    server.route("POST", "/owner/oauth2/token", vec![token_reply("owner-token")]);
    server.route(
        "GET",
        "/subscriptions",
        vec![
            Reply::json(200, json!({"value": [{"subscriptionId": "unrelated"}]})),
            Reply::json(200, json!({"value": [{"subscriptionId": "SUB"}]})),
        ],
    );

    let cancel = CancellationToken::new();
    let aad = AadClient::new(http::default_client().unwrap(), &environment(&server), cancel.clone());
    let directory = arm(&server, &cancel);
    let prompted = std::sync::Arc::new(std::sync::Mutex::new(None));
    let seen = prompted.clone();

    let identity = CredentialResolver::new(&aad, &directory)
        .with_prompt(move |code| *seen.lock().unwrap() = Some(code.user_code.clone()))
        .resolve("sub", None, None, None)
        .await
        .unwrap();

    assert_eq!(identity.tenant_id, "owner");
    assert_eq!(identity.authorizer.access_token(), "owner-token");
    assert_eq!(prompted.lock().unwrap().as_deref(), Some("ABCD"));
    assert_eq!(server.hits_on("POST", "/common/oauth2/token"), 2);
}

#[tokio::test]
async fn test_unknown_subscription_is_not_found() {
    let server = ScriptedServer::start().await;
    server.route(
        "POST",
        "/common/oauth2/devicecode",
        vec![Reply::json(
            200,
            json!({"device_code": "dev", "user_code": "ABCD", "verification_url": "https://x", "interval": 0}),
        )],
    );
    server.route("POST", "/common/oauth2/token", vec![token_reply("common-token")]);
    server.route("GET", "/tenants", vec![Reply::json(200, json!({"value": [{"tenantId": "only"}]}))]);
    server.route("POST", "/only/oauth2/token", vec![token_reply("only-token")]);
    server.route("GET", "/subscriptions", vec![Reply::json(200, json!({"value": []}))]);

    let cancel = CancellationToken::new();
    let aad = AadClient::new(http::default_client().unwrap(), &environment(&server), cancel.clone());
    let directory = arm(&server, &cancel);

    let err = CredentialResolver::new(&aad, &directory)
        .with_prompt(|_| {})
        .resolve("missing-sub", None, None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NotFound(ref e) if e.subscription == "missing-sub"));
}
