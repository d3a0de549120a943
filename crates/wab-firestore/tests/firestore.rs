use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use serde_json::{json, Value};

use wab_core::{
    clinical::{HandoffSource, ShiftRecord, ShiftRepository},
    config::FirestoreConfig,
    domain::{ChatId, SessionId},
    parser::{ParsedShift, ShiftPeriod, StaffAssignment},
    session_store::{SessionBlob, SessionStore, StoreError},
    settings::{BotSettings, SettingsSource},
};
use wab_firestore::{
    FirestoreClient, FirestoreClinicalStore, FirestoreSessionStore, FirestoreSettingsSource,
};

type Docs = Arc<Mutex<HashMap<String, Value>>>;

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": { "code": 404, "message": "no entity", "status": "NOT_FOUND" } })),
    )
        .into_response()
}

async fn get_doc(State(docs): State<Docs>, Path(path): Path<String>) -> Response {
    match docs.lock().unwrap().get(&path) {
        Some(fields) => Json(json!({ "name": path, "fields": fields })).into_response(),
        None => not_found(),
    }
}

async fn patch_doc(
    State(docs): State<Docs>,
    Path(path): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let fields = body["fields"].clone();
    docs.lock().unwrap().insert(path.clone(), fields.clone());
    Json(json!({ "name": path, "fields": fields }))
}

async fn delete_doc(State(docs): State<Docs>, Path(path): Path<String>) -> Json<Value> {
    docs.lock().unwrap().remove(&path);
    Json(json!({}))
}

async fn unavailable() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "error": { "code": 503, "message": "backend down", "status": "UNAVAILABLE" } })),
    )
        .into_response()
}

async fn spawn_firestore() -> (FirestoreClient, FirestoreClient, Docs) {
    let docs: Docs = Arc::default();
    let app = Router::new()
        .route(
            "/v1/projects/hhr/databases/(default)/documents/{*path}",
            get(get_doc).patch(patch_doc).delete(delete_doc),
        )
        .route(
            "/v1/projects/down/databases/(default)/documents/{*path}",
            get(unavailable).patch(unavailable).delete(unavailable),
        )
        .with_state(docs.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral test port");
    let addr = listener.local_addr().expect("get local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("fake firestore failed");
    });

    let client = |project: &str| {
        FirestoreClient::new(&FirestoreConfig {
            project_id: project.into(),
            token: Some("test-token".into()),
            base_url: format!("http://{addr}/v1"),
        })
    };
    (client("hhr"), client("down"), docs)
}

#[tokio::test]
async fn session_document_lifecycle() {
    let (client, _, docs) = spawn_firestore().await;
    let store = FirestoreSessionStore::new(client, "whatsapp_sessions");
    let id = SessionId::for_client("hhr-bot");

    assert!(!store.exists(&id).await.unwrap());
    assert_eq!(store.extract(&id).await.unwrap(), None);

    store.store(&id, &SessionBlob("blob-v1".into())).await.unwrap();
    store.store(&id, &SessionBlob("blob-v2".into())).await.unwrap();
    assert!(store.exists(&id).await.unwrap());
    assert_eq!(
        store.extract(&id).await.unwrap(),
        Some(SessionBlob("blob-v2".into()))
    );

    {
        let docs = docs.lock().unwrap();
        let fields = &docs["whatsapp_sessions/RemoteAuth-hhr-bot"];
        assert_eq!(fields["session"], json!({ "stringValue": "blob-v2" }));
        assert!(fields["lastUpdated"]["stringValue"].is_string());
    }

    store.delete(&id).await.unwrap();
    store.delete(&id).await.unwrap();
    assert_eq!(store.extract(&id).await.unwrap(), None);
}

#[tokio::test]
async fn empty_session_blob_round_trips() {
    let (client, _, _) = spawn_firestore().await;
    let store = FirestoreSessionStore::new(client, "whatsapp_sessions");
    let id = SessionId::for_client("hhr-bot");

    store.store(&id, &SessionBlob(String::new())).await.unwrap();
    assert!(store.exists(&id).await.unwrap());
    assert_eq!(
        store.extract(&id).await.unwrap(),
        Some(SessionBlob(String::new()))
    );
}

#[tokio::test]
async fn unreachable_backend_is_distinct_from_absent() {
    let (_, down, _) = spawn_firestore().await;
    let store = FirestoreSessionStore::new(down, "whatsapp_sessions");
    let id = SessionId::for_client("hhr-bot");

    let err = store.extract(&id).await.unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(ref m) if m.contains("backend down")));
    assert!(store.store(&id, &SessionBlob("x".into())).await.is_err());
}

#[tokio::test]
async fn corrupt_session_document_is_reported() {
    let (client, _, docs) = spawn_firestore().await;
    docs.lock().unwrap().insert(
        "whatsapp_sessions/RemoteAuth-hhr-bot".into(),
        json!({ "session": { "stringValue": "x" }, "lastUpdated": { "stringValue": "yesterday" } }),
    );
    let store = FirestoreSessionStore::new(client, "whatsapp_sessions");
    let err = store
        .extract(&SessionId::for_client("hhr-bot"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Corrupt(_)));
}

#[tokio::test]
async fn shifts_are_keyed_by_date_and_handoffs_need_a_signature() {
    let (client, _, docs) = spawn_firestore().await;
    let store = FirestoreClinicalStore::new(client);
    let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();

    store
        .save_shift(&ShiftRecord {
            date,
            shift: ParsedShift {
                date: Some(date),
                shift_period: Some(ShiftPeriod::Night),
                staff_assignments: vec![StaffAssignment {
                    role: "Enfermería".into(),
                    name: "María López".into(),
                }],
                raw_text_ref: "m1".into(),
            },
            group_id: ChatId("123@g.us".into()),
            sender_id: "569@c.us".into(),
            received_at: chrono::Utc::now(),
        })
        .await
        .unwrap();
    {
        let docs = docs.lock().unwrap();
        let fields = &docs["whatsapp_shifts/2025-03-10"];
        assert_eq!(fields["groupId"], json!({ "stringValue": "123@g.us" }));
        assert_eq!(
            fields["shift"]["mapValue"]["fields"]["shiftPeriod"],
            json!({ "stringValue": "night" })
        );
    }

    assert_eq!(store.signed_handoff(date).await.unwrap(), None);

    let handoff_fields = |signed_by: &str| {
        json!({
            "date": { "stringValue": "2025-03-10" },
            "signedBy": { "stringValue": signed_by },
            "signedAt": { "stringValue": "08:15" },
            "summary": { "mapValue": { "fields": {
                "hospitalized": { "integerValue": "12" },
                "newAdmissions": { "integerValue": "3" },
                "discharges": { "integerValue": "2" }
            } } },
            "publicUrl": { "stringValue": "https://x/y" }
        })
    };

    docs.lock()
        .unwrap()
        .insert("handoff_notifications/2025-03-10".into(), handoff_fields(""));
    assert_eq!(store.signed_handoff(date).await.unwrap(), None);

    docs.lock()
        .unwrap()
        .insert("handoff_notifications/2025-03-10".into(), handoff_fields("Dra. Pérez"));
    let handoff = store.signed_handoff(date).await.unwrap().unwrap();
    assert_eq!(handoff.signed_by, "Dra. Pérez");
    assert_eq!(handoff.summary.hospitalized, 12);
}

#[tokio::test]
async fn settings_document_with_fallback() {
    let (client, _, docs) = spawn_firestore().await;
    let fallback = BotSettings {
        enabled: true,
        ..Default::default()
    };
    let source = FirestoreSettingsSource::new(client, fallback.clone());
    assert_eq!(source.load().await.unwrap(), fallback);

    docs.lock().unwrap().insert(
        "settings/whatsapp_bot".into(),
        json!({
            "enabled": { "booleanValue": true },
            "shiftParser": { "mapValue": { "fields": {
                "enabled": { "booleanValue": true },
                "sourceGroupId": { "stringValue": "111@g.us" }
            } } }
        }),
    );
    let settings = source.load().await.unwrap();
    assert_eq!(settings.shift_source(), Some(&ChatId("111@g.us".into())));
    assert!(settings.handoff_target().is_none());
}
