// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the full gateway pipeline.
//!
//! Each test assembles an isolated harness: in-memory SQLite, mock
//! Evolution and Home Assistant upstreams, and the real router served on
//! an ephemeral port.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use wagate::state::AppState;
use wagate::sync::SyncCoordinator;
use wagate_config::WagateConfig;
use wagate_evolution::EvolutionClient;
use wagate_hass::HassClient;
use wagate_rules::RuleEngine;
use wagate_storage::{Database, queries};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct TestHarness {
    base: String,
    http: reqwest::Client,
    evolution: MockServer,
    hass: MockServer,
    db: Database,
    sync: Arc<SyncCoordinator>,
    shutdown: CancellationToken,
}

impl TestHarness {
    async fn spawn(rules_yaml: &str) -> Self {
        let evolution_server = MockServer::start().await;
        let hass_server = MockServer::start().await;

        let mut config = WagateConfig::default();
        config.evolution.base_url = evolution_server.uri();
        config.evolution.timeout_secs = 5;
        config.hass.base_url = hass_server.uri();
        config.hass.allowed_services =
            vec!["script.turn_on".to_string(), "automation.trigger".to_string()];

        let db = Database::open_in_memory().await.unwrap();
        let evolution = EvolutionClient::new(&config.evolution).unwrap();
        let hass = HassClient::new(&config.hass).unwrap();

        let engine = Arc::new(RuleEngine::new(
            db.clone(),
            evolution.clone(),
            hass.clone(),
            config.evolution.instance.clone(),
            config.hass.allowed_services.clone(),
        ));
        if !rules_yaml.is_empty() {
            queries::ruleset::put_ruleset(&db, rules_yaml).await.unwrap();
        }
        engine.load_from_store().await.unwrap();

        let shutdown = CancellationToken::new();
        let sync = Arc::new(SyncCoordinator::new(
            db.clone(),
            evolution.clone(),
            config.evolution.instance.clone(),
            shutdown.clone(),
        ));

        let state = AppState {
            config: Arc::new(config),
            db: db.clone(),
            evolution,
            hass,
            engine,
            sync: Arc::clone(&sync),
        };
        let app = wagate::api::router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base: format!("http://{addr}"),
            http: reqwest::Client::new(),
            evolution: evolution_server,
            hass: hass_server,
            db,
            sync,
            shutdown,
        }
    }

    fn url(&self, p: &str) -> String {
        format!("{}{p}", self.base)
    }

    async fn post_webhook(&self, envelope: serde_json::Value) -> reqwest::StatusCode {
        self.http
            .post(self.url("/webhook/evolution"))
            .json(&envelope)
            .send()
            .await
            .unwrap()
            .status()
    }

    async fn get_json(&self, p: &str) -> serde_json::Value {
        self.http
            .get(self.url(p))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }
}

fn message_envelope(provider_id: &str, chat: &str, text: &str) -> serde_json::Value {
    serde_json::json!({
        "event": "messages.upsert",
        "instance": "wagate",
        "data": {
            "key": {"remoteJid": chat, "fromMe": false, "id": provider_id},
            "pushName": "Alice",
            "message": {"conversation": text}
        }
    })
}

const GOODNIGHT_RULES: &str = r#"
rules:
  - id: g
    name: Goodnight
    match:
      events: [MESSAGES_UPSERT]
      text: {mode: contains, patterns: ["goodnight"]}
    actions:
      - type: ha_service
        service: script.turn_on
        target: {entity_id: script.goodnight}
"#;

#[tokio::test]
async fn health_answers_ok() {
    let harness = TestHarness::spawn("").await;
    let body = harness.get_json("/api/health").await;
    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn webhook_match_calls_service_and_records_everything() {
    let harness = TestHarness::spawn(GOODNIGHT_RULES).await;

    Mock::given(method("POST"))
        .and(path("/api/services/script/turn_on"))
        .and(body_partial_json(serde_json::json!({"entity_id": "script.goodnight"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(1)
        .mount(&harness.hass)
        .await;

    let status = harness
        .post_webhook(message_envelope("m1", "A@s.whatsapp.net", "Goodnight!"))
        .await;
    assert_eq!(status, reqwest::StatusCode::OK);

    // One message row, processed after the engine ran.
    let messages = harness.get_json("/api/logs/messages").await;
    assert_eq!(messages["total"], 1);
    assert_eq!(messages["items"][0]["text"], "Goodnight!");
    assert_eq!(messages["items"][0]["processed"], true);

    // One successful fire.
    let fires = harness.get_json("/api/logs/rules").await;
    assert_eq!(fires["total"], 1);
    assert_eq!(fires["items"][0]["rule_id"], "g");
    assert_eq!(fires["items"][0]["success"], true);

    // One event-log row.
    let events = harness.get_json("/api/logs/events?event_type=MESSAGES_UPSERT").await;
    assert_eq!(events["total"], 1);

    // The chat appeared with derived kind and activity.
    let chats = harness.get_json("/api/wa/chats").await;
    assert_eq!(chats["total"], 1);
    assert_eq!(chats["chats"][0]["kind"], "direct");
}

#[tokio::test]
async fn duplicate_delivery_ingests_once() {
    let harness = TestHarness::spawn(GOODNIGHT_RULES).await;

    Mock::given(method("POST"))
        .and(path("/api/services/script/turn_on"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(1)
        .mount(&harness.hass)
        .await;

    let envelope = message_envelope("m1", "A@s.whatsapp.net", "goodnight");
    harness.post_webhook(envelope.clone()).await;
    harness.post_webhook(envelope).await;

    let messages = harness.get_json("/api/logs/messages").await;
    assert_eq!(messages["total"], 1, "exactly one row per provider id");

    let fires = harness.get_json("/api/logs/rules").await;
    assert_eq!(fires["total"], 1, "only the first delivery fires");

    // Both deliveries hit the event log.
    let events = harness.get_json("/api/logs/events").await;
    assert_eq!(events["total"], 2);
}

#[tokio::test]
async fn self_sent_messages_are_logged_but_not_processed() {
    let harness = TestHarness::spawn(GOODNIGHT_RULES).await;

    let envelope = serde_json::json!({
        "event": "messages.upsert",
        "instance": "wagate",
        "data": {
            "key": {"remoteJid": "A@s.whatsapp.net", "fromMe": true, "id": "m-self"},
            "message": {"conversation": "goodnight"}
        }
    });
    assert_eq!(harness.post_webhook(envelope).await, reqwest::StatusCode::OK);

    let events = harness.get_json("/api/logs/events").await;
    assert_eq!(events["total"], 1);
    assert!(
        events["items"][0]["summary"]
            .as_str()
            .unwrap()
            .starts_with("[sent]")
    );

    let messages = harness.get_json("/api/logs/messages").await;
    assert_eq!(messages["total"], 0);
    let fires = harness.get_json("/api/logs/rules").await;
    assert_eq!(fires["total"], 0);
}

#[tokio::test]
async fn webhook_answers_200_even_for_junk() {
    let harness = TestHarness::spawn("").await;
    let status = harness
        .post_webhook(serde_json::json!({"event": "whatever.odd", "data": 42}))
        .await;
    assert_eq!(status, reqwest::StatusCode::OK);

    let events = harness.get_json("/api/logs/events").await;
    assert_eq!(events["total"], 1);
    assert_eq!(events["items"][0]["event_type"], "WHATEVER_ODD");
}

#[tokio::test]
async fn connection_events_reach_subscribed_rules() {
    let harness = TestHarness::spawn(
        r#"
rules:
  - id: conn
    name: Connection watcher
    match:
      events: [CONNECTION_UPDATE]
    actions:
      - type: ha_service
        service: automation.trigger
        target: {entity_id: automation.wa_connection}
"#,
    )
    .await;

    Mock::given(method("POST"))
        .and(path("/api/services/automation/trigger"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(1)
        .mount(&harness.hass)
        .await;

    harness
        .post_webhook(serde_json::json!({
            "event": "connection.update",
            "instance": "wagate",
            "data": {"state": "open"}
        }))
        .await;

    let fires = harness.get_json("/api/logs/rules").await;
    assert_eq!(fires["total"], 1);
    assert_eq!(fires["items"][0]["rule_id"], "conn");
}

#[tokio::test]
async fn rules_roundtrip_and_reject_invalid() {
    let harness = TestHarness::spawn("").await;

    // Initially empty.
    let current = harness.get_json("/api/rules").await;
    assert_eq!(current["yaml"], "");
    assert_eq!(current["version"], 0);

    // Invalid document: 400, nothing saved.
    let response = harness
        .http
        .put(harness.url("/api/rules"))
        .json(&serde_json::json!({"yaml": "rules:\n  - actions: []\n"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let report: serde_json::Value = response.json().await.unwrap();
    assert_eq!(report["valid"], false);
    assert!(!report["errors"].as_array().unwrap().is_empty());
    assert_eq!(harness.get_json("/api/rules").await["version"], 0);

    // Valid document: saved, engine live immediately.
    let response = harness
        .http
        .put(harness.url("/api/rules"))
        .json(&serde_json::json!({"yaml": GOODNIGHT_RULES}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let saved: serde_json::Value = response.json().await.unwrap();
    assert_eq!(saved["version"], 1);
    assert_eq!(saved["rule_count"], 1);

    let current = harness.get_json("/api/rules").await;
    assert_eq!(current["yaml"], GOODNIGHT_RULES);
    assert_eq!(current["version"], 1);

    // Validation endpoint agrees.
    let report = harness
        .http
        .post(harness.url("/api/rules/validate"))
        .json(&serde_json::json!({"yaml": GOODNIGHT_RULES}))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    assert_eq!(report["valid"], true);
    assert_eq!(report["rule_count"], 1);
}

#[tokio::test]
async fn rules_test_endpoint_is_a_dry_run() {
    let harness = TestHarness::spawn(GOODNIGHT_RULES).await;

    let response = harness
        .http
        .post(harness.url("/api/rules/test"))
        .json(&serde_json::json!({"message": {"text": "Goodnight all"}}))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();

    assert_eq!(response["matched_rules"][0]["matched"], true);
    assert!(
        response["actions_preview"][0]
            .as_str()
            .unwrap()
            .contains("script.turn_on")
    );

    // Dry run: no fire rows, no cooldowns, no messages.
    assert_eq!(harness.get_json("/api/logs/rules").await["total"], 0);
    assert_eq!(harness.get_json("/api/logs/messages").await["total"], 0);
}

#[tokio::test]
async fn call_service_outside_allow_list_is_403() {
    let harness = TestHarness::spawn("").await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&harness.hass)
        .await;

    let response = harness
        .http
        .post(harness.url("/api/ha/call-service"))
        .json(&serde_json::json!({"service": "shell_command.run"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::FORBIDDEN);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("shell_command.run"));
}

#[tokio::test]
async fn notify_send_normalises_target_and_prefixes_title() {
    let harness = TestHarness::spawn("").await;

    Mock::given(method("POST"))
        .and(path("/message/sendText/wagate"))
        .and(body_partial_json(serde_json::json!({
            "number": "491701234567@s.whatsapp.net",
            "text": "*Alert*\n\ndoor open"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "key": {"id": "WAMID9"}
        })))
        .expect(1)
        .mount(&harness.evolution)
        .await;

    let response = harness
        .http
        .post(harness.url("/api/notify/send"))
        .json(&serde_json::json!({
            "message": "door open",
            "target": "+49 170 123-4567",
            "title": "Alert"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["message_id"], "WAMID9");
}

#[tokio::test]
async fn notify_send_attaches_media_after_text() {
    let harness = TestHarness::spawn("").await;

    Mock::given(method("POST"))
        .and(path("/message/sendText/wagate"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "key": {"id": "WAMID1"}
        })))
        .expect(1)
        .mount(&harness.evolution)
        .await;
    Mock::given(method("POST"))
        .and(path("/message/sendMedia/wagate"))
        .and(body_partial_json(serde_json::json!({
            "mediatype": "image",
            "media": "http://cam/snapshot.jpg"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "key": {"id": "WAMID2"}
        })))
        .expect(1)
        .mount(&harness.evolution)
        .await;

    let response = harness
        .http
        .post(harness.url("/api/notify/send"))
        .json(&serde_json::json!({
            "message": "movement",
            "target": "491701234567",
            "data": {"image": "http://cam/snapshot.jpg"}
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
}

#[tokio::test]
async fn chat_sync_is_single_flight_and_populates_chats() {
    let harness = TestHarness::spawn("").await;

    // Slow catalogue endpoints keep the first run in flight long enough
    // for the second start to observe it.
    Mock::given(method("GET"))
        .and(path("/group/fetchAllGroups/wagate"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(300))
                .set_body_json(serde_json::json!([
                    {"id": "g1@g.us", "subject": "Family"}
                ])),
        )
        .mount(&harness.evolution)
        .await;
    Mock::given(method("GET"))
        .and(path("/group/findGroupInfos/wagate"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&harness.evolution)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/findContacts/wagate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"id": "491701234567@s.whatsapp.net", "pushName": "Alice"}
        ])))
        .mount(&harness.evolution)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/findChats/wagate"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&harness.evolution)
        .await;

    let first: serde_json::Value = harness
        .http
        .post(harness.url("/api/wa/chats/refresh"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(first["status"], "started");

    let second: serde_json::Value = harness
        .http
        .post(harness.url("/api/wa/chats/refresh"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(second["status"], "already_running");

    // Poll until the run completes.
    let mut completed = false;
    for _ in 0..50 {
        let progress = harness.get_json("/api/wa/chats/refresh/status").await;
        if progress["state"] == "complete" {
            assert_eq!(progress["groups_found"], 1);
            assert_eq!(progress["contacts_found"], 1);
            assert_eq!(progress["chats_saved"], 2);
            completed = true;
            break;
        }
        assert_ne!(progress["state"], "error", "sync errored: {progress}");
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(completed, "sync did not complete in time");

    let chats = harness.get_json("/api/wa/chats").await;
    assert_eq!(chats["total"], 2);

    // Enable toggling round-trips; unknown ids are 404.
    let response = harness
        .http
        .patch(harness.url("/api/wa/chats/g1@g.us"))
        .json(&serde_json::json!({"enabled": false}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let disabled = harness.get_json("/api/wa/chats?enabled=false").await;
    assert_eq!(disabled["total"], 1);
    assert_eq!(disabled["chats"][0]["id"], "g1@g.us");

    let response = harness
        .http
        .patch(harness.url("/api/wa/chats/missing@g.us"))
        .json(&serde_json::json!({"enabled": false}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn shutdown_cancels_and_drains_an_in_flight_sync() {
    let harness = TestHarness::spawn("").await;

    // A catalogue fetch slow enough that the run is still in flight when
    // shutdown begins.
    Mock::given(method("GET"))
        .and(path("/group/fetchAllGroups/wagate"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(30))
                .set_body_json(serde_json::json!([])),
        )
        .mount(&harness.evolution)
        .await;

    let first: serde_json::Value = harness
        .http
        .post(harness.url("/api/wa/chats/refresh"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(first["status"], "started");

    // Cancel and drain, as serve does on SIGINT/SIGTERM. Drain must
    // return promptly instead of waiting out the catalogue fetch.
    harness.shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), harness.sync.drain())
        .await
        .expect("drain should not wait for the slow fetch");

    let progress = harness.get_json("/api/wa/chats/refresh/status").await;
    assert_eq!(progress["state"], "error");
    assert!(
        progress["error"]
            .as_str()
            .unwrap()
            .contains("interrupted by shutdown")
    );

    // The single-flight slot was released on the way out.
    let again: serde_json::Value = harness
        .http
        .post(harness.url("/api/wa/chats/refresh"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(again["status"], "started");
}

#[tokio::test]
async fn wa_send_returns_provider_message_id() {
    let harness = TestHarness::spawn("").await;

    Mock::given(method("POST"))
        .and(path("/message/sendText/wagate"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "key": {"id": "WAMID77"}
        })))
        .mount(&harness.evolution)
        .await;

    let response: serde_json::Value = harness
        .http
        .post(harness.url("/api/wa/send"))
        .json(&serde_json::json!({"to": "a@s.whatsapp.net", "text": "hi"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(response["message_id"], "WAMID77");
}

#[tokio::test]
async fn cooldown_spans_webhook_deliveries() {
    let harness = TestHarness::spawn(
        r#"
rules:
  - id: ping
    name: Ping
    cooldown_seconds: 60
    match:
      text: {mode: contains, patterns: ["ping"]}
    actions:
      - type: ha_service
        service: script.turn_on
"#,
    )
    .await;

    Mock::given(method("POST"))
        .and(path("/api/services/script/turn_on"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(1)
        .mount(&harness.hass)
        .await;

    harness
        .post_webhook(message_envelope("m1", "A@s.whatsapp.net", "ping"))
        .await;
    harness
        .post_webhook(message_envelope("m2", "A@s.whatsapp.net", "ping"))
        .await;

    let fires = harness.get_json("/api/logs/rules?rule_id=ping").await;
    assert_eq!(fires["total"], 1, "second delivery is inside the cooldown window");

    // Both messages were persisted regardless.
    let messages = harness.get_json("/api/logs/messages").await;
    assert_eq!(messages["total"], 2);

    // Cooldown row exists for the chat scope.
    assert!(
        queries::cooldowns::is_on_cooldown(&harness.db, "ping", "A@s.whatsapp.net")
            .await
            .unwrap()
    );
}
