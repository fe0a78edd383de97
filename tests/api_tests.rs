use std::sync::Arc;
use std::thread::sleep;
use std::time::{Duration, Instant};

use actix_web::{App, test, web};
use rock64_gpio::{AppConfig, AppError, AppState, GpioManager, MockGpioBackend};
use serde_json::Value;

fn sample_config() -> AppConfig {
    AppConfig::from_json(
        r#"
        {
            "http": {
                "host": "localhost:8080",
                "path": "/api/v1",
                "timeout": 30
            },
            "gpio": {
                "boot_media": "sd-card",
                "event_history_capacity": 4,
                "labels": {
                    "2": "LED 1",
                    "7": "BUTTON 1"
                }
            }
        }
        "#,
    )
    .expect("valid sample config")
}

fn sample_state() -> (Arc<MockGpioBackend>, AppState<MockGpioBackend>, String) {
    let cfg = sample_config();
    let backend = Arc::new(MockGpioBackend::default());
    let manager = Arc::new(GpioManager::new(cfg.gpio.clone(), backend.clone()));
    (backend, AppState { manager }, cfg.http.path)
}

macro_rules! init_app {
    ($state:expr, $path:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state.clone()))
                .service($state.api_scope(&$path)),
        )
        .await
    };
}

#[actix_rt::test]
async fn config_defaults_and_validation() {
    let cfg = sample_config();
    assert_eq!(cfg.gpio.poll_interval_ms, 1);
    assert_eq!(cfg.gpio.sysfs_root.to_str(), Some("/sys/class/gpio"));
    assert_eq!(cfg.gpio.labels.get(&7).map(String::as_str), Some("BUTTON 1"));

    let zero_interval = r#"{ "http": { "path": "/", "timeout": 1 }, "gpio": { "poll_interval_ms": 0 } }"#;
    assert!(matches!(
        AppConfig::from_json(zero_interval),
        Err(AppError::Config(_))
    ));

    let bad_label = r#"{ "http": { "path": "/", "timeout": 1 }, "gpio": { "labels": { "40": "X" } } }"#;
    assert!(matches!(AppConfig::from_json(bad_label), Err(AppError::Config(_))));

    assert!(matches!(AppConfig::from_json("{"), Err(AppError::Config(_))));
}

#[actix_rt::test]
async fn list_gpios_returns_all() {
    let (_backend, state, path) = sample_state();
    let app = init_app!(state, path);

    let req = test::TestRequest::get().uri("/api/v1/gpios").to_request();
    let response: Vec<Value> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(response.len(), 32);

    let led = &response[2];
    assert_eq!(led["physical"], 89);
    assert_eq!(led["label"], "LED 1");
    assert_eq!(led["exported"], false);
    assert_eq!(led["edge"], "none");
    assert!(response[0]["physical"].is_null());
}

#[actix_rt::test]
async fn pin_not_found_returns_404() {
    let (_backend, state, path) = sample_state();
    let app = init_app!(state, path);

    let req = test::TestRequest::get().uri("/api/v1/gpio/99").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);

    let req = test::TestRequest::get()
        .uri("/api/v1/gpio/0/value")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);

    let req = test::TestRequest::get().uri("/api/v1/gpio/abc").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_rt::test]
async fn wrong_method_returns_405() {
    let (_backend, state, path) = sample_state();
    let app = init_app!(state, path);

    let req = test::TestRequest::post().uri("/api/v1/gpio/2").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 405);

    let req = test::TestRequest::get().uri("/api/v1/gpio/2/mode").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 405);
}

#[actix_rt::test]
async fn set_mode_and_value_happy_path() {
    let (backend, state, path) = sample_state();
    let app = init_app!(state, path);

    let req = test::TestRequest::post()
        .uri("/api/v1/gpio/2/mode")
        .set_payload("out")
        .to_request();
    let status: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(status["exported"], true);
    assert_eq!(backend.exported_pins(), vec![89]);

    let req = test::TestRequest::post()
        .uri("/api/v1/gpio/2/value")
        .set_payload("1")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let req = test::TestRequest::get()
        .uri("/api/v1/gpio/2/value")
        .to_request();
    let body = test::call_and_read_body(&app, req).await;
    assert_eq!(body, "1");
}

#[actix_rt::test]
async fn reject_invalid_payloads() {
    let (_backend, state, path) = sample_state();
    let app = init_app!(state, path);

    for (uri, payload) in [
        ("/api/v1/gpio/2/value", "2"),
        ("/api/v1/gpio/2/value", "high"),
        ("/api/v1/gpio/2/mode", "sideways"),
        ("/api/v1/gpio/2/pull", ""),
        ("/api/v1/gpio/2/edge", r#"{"edge":"up"}"#),
    ] {
        let req = test::TestRequest::post()
            .uri(uri)
            .set_payload(payload)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400, "{uri} <- {payload}");
    }
}

#[actix_rt::test]
async fn pull_up_marks_pin_active_low() {
    let (backend, state, path) = sample_state();
    let app = init_app!(state, path);

    let req = test::TestRequest::post()
        .uri("/api/v1/gpio/3/mode")
        .set_payload("\"in\"")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let req = test::TestRequest::post()
        .uri("/api/v1/gpio/3/pull")
        .set_payload("up")
        .to_request();
    let status: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(status["active_low"], true);
    assert_eq!(backend.active_low(88), Some(true));

    let req = test::TestRequest::get()
        .uri("/api/v1/gpio/3/value")
        .to_request();
    let body = test::call_and_read_body(&app, req).await;
    assert_eq!(body, "1");
}

#[actix_rt::test]
async fn edge_registration_round_trip() {
    let (_backend, state, path) = sample_state();
    let app = init_app!(state, path);

    let req = test::TestRequest::post()
        .uri("/api/v1/gpio/7/edge")
        .set_payload(r#"{"edge":"both"}"#)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let req = test::TestRequest::get().uri("/api/v1/gpio/7/edge").to_request();
    let edge: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(edge, "both");

    let req = test::TestRequest::post()
        .uri("/api/v1/gpio/7/edge")
        .set_payload(r#"{"edge":"none"}"#)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let req = test::TestRequest::get().uri("/api/v1/gpio/7").to_request();
    let status: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(status["edge"], "none");
}

#[actix_rt::test]
async fn detected_edges_are_listed() {
    let (backend, state, path) = sample_state();
    state.manager.initialize().unwrap();
    let app = init_app!(state, path);

    for (uri, payload) in [
        ("/api/v1/gpio/7/mode", "in"),
        ("/api/v1/gpio/7/edge", r#"{"edge":"rising"}"#),
    ] {
        let req = test::TestRequest::post()
            .uri(uri)
            .set_payload(payload)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
    }

    let req = test::TestRequest::get().uri("/api/v1/gpio/7/event").to_request();
    let body = test::call_and_read_body(&app, req).await;
    assert!(body.is_empty());

    backend.set_input_level(76, 1);
    let deadline = Instant::now() + Duration::from_secs(2);
    while state.manager.get_last_event(7).unwrap().is_none() && Instant::now() < deadline {
        sleep(Duration::from_millis(1));
    }

    let req = test::TestRequest::get()
        .uri("/api/v1/gpio/7/events")
        .to_request();
    let events: Vec<Value> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["pin"], 7);
    assert_eq!(events[0]["edge"], "rising");

    let req = test::TestRequest::get().uri("/api/v1/stats").to_request();
    let stats: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(stats["edges_detected"], 1);

    state.manager.shutdown();
    assert!(backend.exported_pins().is_empty());
}
