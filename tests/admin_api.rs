//! Management API over HTTP.

mod common;

use bluegreen::config::{Environment, ServiceConfigStore};
use common::mock_backend::MockBackend;
use common::{document, TestGateway};
use reqwest::Client;
use serde_json::{json, Value};

async fn two_service_gateway() -> (TestGateway, MockBackend, MockBackend) {
    let blue = MockBackend::start().await;
    let green = MockBackend::start().await;
    let gateway = TestGateway::start(document(&[
        ("default", &blue.base_url(), &green.base_url()),
        ("billing", &blue.base_url(), &green.base_url()),
    ]))
    .await;
    (gateway, blue, green)
}

#[tokio::test]
async fn test_health_is_plain_ok() {
    let (gateway, _blue, _green) = two_service_gateway().await;

    let resp = Client::new()
        .get(gateway.admin_url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_status_lists_services_sorted() {
    let (gateway, _blue, _green) = two_service_gateway().await;

    let status: Value = Client::new()
        .get(gateway.admin_url("/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(status["status"], "running");
    assert_eq!(status["service_count"], 2);
    assert_eq!(status["services"][0]["id"], "billing");
    assert_eq!(status["services"][1]["id"], "default");
    assert_eq!(status["services"][0]["active_env"], "blue");
    assert_eq!(status["proxy_addr"], gateway.proxy_addr.to_string());
    assert!(status["recent_switches"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_status_for_one_service() {
    let (gateway, _blue, green) = two_service_gateway().await;
    let client = Client::new();

    let resp = client
        .get(gateway.admin_url("/status?service=billing"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let status: Value = resp.json().await.unwrap();
    assert_eq!(status["service_id"], "billing");
    assert_eq!(status["green_target"], green.base_url());

    let resp = client
        .get(gateway.admin_url("/status?service=nope"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_switch_one_service() {
    let (gateway, _blue, _green) = two_service_gateway().await;
    let client = Client::new();

    let resp = client
        .post(gateway.admin_url("/switch?service=billing&env=green"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["old_env"], "blue");
    assert_eq!(body["new_env"], "green");

    assert_eq!(
        gateway.router.service("billing").unwrap().active_env,
        Environment::Green
    );
    assert_eq!(
        gateway.router.service("default").unwrap().active_env,
        Environment::Blue
    );

    let status: Value = client
        .get(gateway.admin_url("/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let switches = status["recent_switches"].as_array().unwrap();
    assert_eq!(switches.len(), 1);
    assert_eq!(switches[0]["service"], "billing");
    assert_eq!(switches[0]["new_env"], "green");
}

#[tokio::test]
async fn test_switch_all_services() {
    let (gateway, _blue, _green) = two_service_gateway().await;

    let body: Value = Client::new()
        .post(gateway.admin_url("/switch?env=green"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["service_count"], 2);

    let on_disk = ServiceConfigStore::new(gateway.services_file()).load().unwrap();
    assert!(on_disk
        .services
        .values()
        .all(|r| r.active_env == Environment::Green));
}

#[tokio::test]
async fn test_switch_rejects_bad_input() {
    let (gateway, _blue, _green) = two_service_gateway().await;
    let client = Client::new();

    for query in ["env=purple", "", "env=GREEN"] {
        let resp = client
            .post(gateway.admin_url(&format!("/switch?{query}")))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400, "{query}");
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["success"], false);
    }

    let resp = client
        .post(gateway.admin_url("/switch?env=green&service=nope"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    assert!(gateway.router.switch_log().is_empty());
}

#[tokio::test]
async fn test_add_and_remove_service() {
    let (gateway, blue, _green) = two_service_gateway().await;
    let client = Client::new();

    let resp = client
        .post(gateway.admin_url("/services"))
        .json(&json!({
            "id": "orders",
            "blue_target": blue.base_url(),
            "green_target": "http://127.0.0.1:1",
            "jar_file": "orders-*.jar",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let record = gateway.router.service("orders").unwrap();
    assert_eq!(record.name, "orders");
    assert_eq!(record.app_name, "orders");
    assert_eq!(record.active_env, Environment::Blue);

    // The new service takes traffic immediately.
    client
        .get(gateway.proxy_url("/orders/1"))
        .send()
        .await
        .unwrap();
    let requests = blue.captured_requests().await;
    assert_eq!(requests.last().unwrap().path, "/1");
    assert_eq!(requests.last().unwrap().header("x-proxy-service"), Some("orders"));

    let list: Value = client
        .get(gateway.admin_url("/services"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["count"], 3);
    assert_eq!(list["services"], json!(["billing", "default", "orders"]));

    let resp = client
        .delete(gateway.admin_url("/services/orders"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(gateway.router.service("orders").is_none());

    let on_disk = ServiceConfigStore::new(gateway.services_file()).load().unwrap();
    assert!(on_disk.get("orders").is_none());
}

#[tokio::test]
async fn test_add_service_errors() {
    let (gateway, _blue, _green) = two_service_gateway().await;
    let client = Client::new();

    let resp = client
        .post(gateway.admin_url("/services"))
        .json(&json!({
            "id": "billing",
            "blue_target": "http://127.0.0.1:2",
            "green_target": "http://127.0.0.1:3",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    let resp = client
        .post(gateway.admin_url("/services"))
        .json(&json!({
            "id": "x",
            "blue_target": "not-a-url",
            "green_target": "http://127.0.0.1:3",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert!(gateway.router.get_config().get("x").is_none());

    let resp = client
        .post(gateway.admin_url("/services"))
        .header("content-type", "application/json")
        .body("{ not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_remove_errors() {
    let (gateway, _blue, _green) = two_service_gateway().await;
    let client = Client::new();

    let resp = client
        .delete(gateway.admin_url("/services/nope"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = client
        .delete(gateway.admin_url("/services/billing"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .delete(gateway.admin_url("/services/default"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    assert_eq!(gateway.router.len(), 1);
}

#[tokio::test]
async fn test_update_config() {
    let (gateway, blue, green) = two_service_gateway().await;
    let client = Client::new();

    let resp = client
        .post(gateway.admin_url("/config"))
        .json(&json!({
            "services": {
                "shop": {
                    "name": "Shop",
                    "blue_target": blue.base_url(),
                    "green_target": green.base_url(),
                    "active_env": "green"
                }
            }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["service_count"], 1);
    assert_eq!(gateway.router.service_ids(), vec!["shop".to_string()]);

    client.get(gateway.proxy_url("/cart")).send().await.unwrap();
    let requests = green.captured_requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].header("x-proxy-service"), Some("shop"));
}

#[tokio::test]
async fn test_update_config_rejects_invalid_documents() {
    let (gateway, _blue, _green) = two_service_gateway().await;
    let client = Client::new();
    let before = gateway.router.get_config();

    for body in [
        json!({"services": {}}),
        json!({"services": {"a": {"blue_target": "http://a", "green_target": "", "active_env": "blue"}}}),
        json!({"services": {"a": {"blue_target": "http://a", "green_target": "http://b", "active_env": "red"}}}),
    ] {
        let resp = client
            .post(gateway.admin_url("/config"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400, "{body}");
    }

    assert_eq!(gateway.router.get_config(), before);
}

#[tokio::test]
async fn test_save_config_rewrites_document() {
    let (gateway, _blue, _green) = two_service_gateway().await;
    std::fs::remove_file(gateway.services_file()).unwrap();

    let resp = Client::new()
        .post(gateway.admin_url("/config/save"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let on_disk = ServiceConfigStore::new(gateway.services_file()).load().unwrap();
    assert_eq!(on_disk, gateway.router.get_config());
}

#[tokio::test]
async fn test_service_health_probes() {
    let healthy = MockBackend::start().await;
    let gateway = TestGateway::start(document(&[
        ("default", &healthy.base_url(), &healthy.base_url()),
        ("down", "http://127.0.0.1:1", "http://127.0.0.1:1"),
    ]))
    .await;
    let client = Client::new();

    let all: Value = client
        .get(gateway.admin_url("/health/services"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all["default"]["status"], "healthy");
    assert_eq!(all["down"]["status"], "unhealthy");

    let probes = healthy.captured_requests().await;
    assert_eq!(probes[0].path, "/actuator/health");

    let one: Value = client
        .get(gateway.admin_url("/health/services/down"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(one["service_id"], "down");
    assert_eq!(one["status"], "unhealthy");

    let resp = client
        .get(gateway.admin_url("/health/services/nope"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}
