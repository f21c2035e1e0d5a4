use std::sync::Arc;
use std::time::Duration;

use colabri_draw::config::RelayConfig;
use colabri_draw::db::MemoryStore;
use colabri_draw::drawing::{project_factory, Snapshot};
use colabri_draw::models::{Mutation, SubscribeMessage};
use colabri_draw::rooms::{RelayError, RoomPhase};
use colabri_draw::services::RoomService;
use colabri_draw::websocket::msg_mutation_handler::handle_mutation_message;
use colabri_draw::websocket::msg_subscribe_handler::handle_subscribe_message;
use futures_util::future::join_all;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedReceiver;

const GRACE: Duration = Duration::from_millis(1000);

fn relay_config() -> RelayConfig {
    RelayConfig {
        eviction_grace: GRACE,
        flush_retry_attempts: 3,
        flush_retry_backoff: Duration::from_millis(100),
    }
}

fn setup() -> (RoomService, Arc<MemoryStore>) {
    setup_with(relay_config())
}

fn setup_with(config: RelayConfig) -> (RoomService, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let service = RoomService::new(store.clone(), project_factory(), config);
    (service, store)
}

fn draw_end(room: &str, uid: &str, coordinates: Value, name: Option<&str>) -> Mutation {
    let mut frame = json!({
        "event": "draw:end",
        "room": room,
        "uid": uid,
        "coordinates": coordinates,
    });
    if let Some(name) = name {
        frame["name"] = json!(name);
    }
    serde_json::from_value(frame).unwrap()
}

/// Every frame queued for a session so far.
fn drain(inbox: &mut UnboundedReceiver<String>) -> Vec<Value> {
    let mut frames = Vec::new();
    while let Ok(text) = inbox.try_recv() {
        frames.push(serde_json::from_str(&text).unwrap());
    }
    frames
}

fn events(frames: &[Value]) -> Vec<String> {
    frames
        .iter()
        .map(|frame| frame["event"].as_str().unwrap().to_string())
        .collect()
}

fn project_items(snapshot: &str) -> Vec<Value> {
    let project: Value = serde_json::from_str(snapshot).unwrap();
    project["items"].as_array().cloned().unwrap_or_default()
}

#[tokio::test(start_paused = true)]
async fn concurrent_subscribers_share_one_load() {
    let (service, store) = setup();
    store
        .insert("r1", Snapshot::new(r#"{"items":[{"type":"path","name":"a","points":[[1.0,1.0]]}]}"#))
        .await;
    store.set_read_delay(Duration::from_millis(50));

    let mut clients = Vec::new();
    for _ in 0..5 {
        clients.push(service.connect().await);
    }

    let results = join_all(
        clients
            .iter()
            .map(|(session, _)| service.subscribe(*session, "r1")),
    )
    .await;
    assert!(results.iter().all(|result| result.is_ok()));

    assert_eq!(store.reads(), 1);
    assert_eq!(service.phase_of("r1").await, Some(RoomPhase::Ready));

    for (_, inbox) in clients.iter_mut() {
        let frames = drain(inbox);
        let loads: Vec<&Value> = frames
            .iter()
            .filter(|frame| frame["event"] == "project:load")
            .collect();
        assert_eq!(loads.len(), 1);
        let items = project_items(loads[0]["project"].as_str().unwrap());
        assert_eq!(items[0]["name"], "a");
        assert!(events(&frames).contains(&"loading:end".to_string()));
    }
}

#[tokio::test(start_paused = true)]
async fn mutations_keep_their_order_in_document_and_relay() {
    let (service, _store) = setup();
    let (a, mut a_inbox) = service.connect().await;
    let (b, mut b_inbox) = service.connect().await;
    service.subscribe(a, "r1").await.unwrap();
    service.subscribe(b, "r1").await.unwrap();
    drain(&mut a_inbox);
    drain(&mut b_inbox);

    for i in 0..10 {
        let name = format!("p{}", i);
        service
            .submit(a, draw_end("r1", "u1", json!([[i as f64, 0.0]]), Some(&name)))
            .await
            .unwrap();
    }

    let expected: Vec<String> = (0..10).map(|i| format!("p{}", i)).collect();

    let relayed: Vec<String> = drain(&mut b_inbox)
        .iter()
        .map(|frame| frame["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(relayed, expected);

    // The sender never gets its own events back.
    assert!(drain(&mut a_inbox).is_empty());

    let snapshot = service.export_room("r1").await.unwrap().unwrap();
    let stored: Vec<String> = project_items(snapshot.as_str())
        .iter()
        .map(|item| item["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(stored, expected);
}

#[tokio::test(start_paused = true)]
async fn rejoining_a_draining_room_reuses_the_resident_project() {
    let (service, store) = setup();
    let (a, _a_inbox) = service.connect().await;
    service.subscribe(a, "r1").await.unwrap();
    service
        .submit(a, draw_end("r1", "u1", json!([[0.0, 0.0], [5.0, 5.0]]), None))
        .await
        .unwrap();
    service.disconnect(a).await;
    assert_eq!(service.phase_of("r1").await, Some(RoomPhase::Draining));

    tokio::time::sleep(GRACE / 2).await;

    let (b, mut b_inbox) = service.connect().await;
    service.subscribe(b, "r1").await.unwrap();
    assert_eq!(service.phase_of("r1").await, Some(RoomPhase::Ready));
    assert_eq!(store.reads(), 1);

    let frames = drain(&mut b_inbox);
    let load = frames
        .iter()
        .find(|frame| frame["event"] == "project:load")
        .unwrap();
    assert_eq!(project_items(load["project"].as_str().unwrap()).len(), 1);

    // The cancelled timer never fires.
    tokio::time::sleep(GRACE * 2).await;
    assert_eq!(service.phase_of("r1").await, Some(RoomPhase::Ready));
    assert_eq!(store.writes(), 0);
}

#[tokio::test(start_paused = true)]
async fn empty_room_is_flushed_once_and_evicted() {
    let (service, store) = setup();
    let (a, _a_inbox) = service.connect().await;
    service.subscribe(a, "r1").await.unwrap();
    service
        .submit(a, draw_end("r1", "u1", json!([[0.0, 0.0], [10.0, 10.0]]), None))
        .await
        .unwrap();
    service.leave(a, "r1").await;

    tokio::time::sleep(GRACE - Duration::from_millis(10)).await;
    assert_eq!(store.writes(), 0);
    assert_eq!(service.phase_of("r1").await, Some(RoomPhase::Draining));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(store.writes(), 1);
    assert!(service.registry().get("r1").await.is_none());
    assert_eq!(service.phase_of("r1").await, None);

    tokio::time::sleep(GRACE * 3).await;
    assert_eq!(store.writes(), 1);
}

#[tokio::test(start_paused = true)]
async fn mutations_are_rejected_while_loading() {
    let (service, store) = setup();
    store
        .insert("r1", Snapshot::new(r#"{"items":[{"type":"path","name":"a","points":[[1.0,1.0]]}]}"#))
        .await;
    store.set_read_delay(Duration::from_millis(100));

    let (a, _a_inbox) = service.connect().await;
    let (b, mut b_inbox) = service.connect().await;

    let loader = {
        let service = service.clone();
        tokio::spawn(async move { service.subscribe(a, "r1").await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(service.phase_of("r1").await, Some(RoomPhase::Loading));

    let rejected = service
        .submit(b, draw_end("r1", "u2", json!([[9.0, 9.0]]), Some("b")))
        .await;
    assert!(matches!(rejected, Err(RelayError::NotReady(room)) if room == "r1"));

    let mutation = draw_end("r1", "u2", json!([[9.0, 9.0]]), Some("b"));
    let frame = serde_json::to_string(&mutation).unwrap();
    handle_mutation_message(&service, b, mutation, frame).await;
    assert_eq!(events(&drain(&mut b_inbox)), vec!["project:load:error"]);

    loader.await.unwrap().unwrap();
    let snapshot = service.export_room("r1").await.unwrap().unwrap();
    let items = project_items(snapshot.as_str());
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["name"], "a");
}

#[tokio::test(start_paused = true)]
async fn draw_then_late_join_then_persist_on_leave() {
    let (service, store) = setup();
    let (a, mut a_inbox) = service.connect().await;
    service.subscribe(a, "r1").await.unwrap();
    assert_eq!(
        events(&drain(&mut a_inbox)),
        vec!["loading:start", "loading:end", "user:connect"]
    );

    service
        .submit(a, draw_end("r1", "u1", json!([[0, 0], [10, 10]]), None))
        .await
        .unwrap();

    let (b, mut b_inbox) = service.connect().await;
    service.subscribe(b, "r1").await.unwrap();
    let frames = drain(&mut b_inbox);
    assert_eq!(
        events(&frames),
        vec!["loading:start", "project:load", "loading:end", "user:connect"]
    );
    let items = project_items(frames[1]["project"].as_str().unwrap());
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["points"], json!([[0.0, 0.0], [10.0, 10.0]]));

    let a_frames = drain(&mut a_inbox);
    assert_eq!(a_frames.last().unwrap()["count"], 2);

    let exported = service.export_room("r1").await.unwrap().unwrap();

    service.disconnect(a).await;
    service.disconnect(b).await;
    // Disconnecting twice is harmless.
    service.disconnect(b).await;

    tokio::time::sleep(GRACE + Duration::from_millis(100)).await;
    assert_eq!(store.record("r1").await, Some(exported));
    assert!(service.registry().is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn failed_flush_keeps_room_resident_until_a_retry_succeeds() {
    let (service, store) = setup();
    let (a, _a_inbox) = service.connect().await;
    service.subscribe(a, "r1").await.unwrap();
    service
        .submit(a, draw_end("r1", "u1", json!([[1.0, 2.0]]), None))
        .await
        .unwrap();
    store.fail_next_writes(3);
    service.disconnect(a).await;

    // All three attempts fail by GRACE + 300ms.
    tokio::time::sleep(GRACE + Duration::from_millis(500)).await;
    assert_eq!(store.writes(), 0);
    assert!(store.record("r1").await.is_none());
    assert_eq!(service.phase_of("r1").await, Some(RoomPhase::Draining));

    tokio::time::sleep(GRACE).await;
    assert_eq!(store.writes(), 1);
    assert_eq!(project_items(store.record("r1").await.unwrap().as_str()).len(), 1);
    assert_eq!(service.phase_of("r1").await, None);
}

#[tokio::test(start_paused = true)]
async fn failed_load_reports_error_and_next_subscribe_retries() {
    let (service, store) = setup();
    store.set_fail_reads(true);

    let (a, mut a_inbox) = service.connect().await;
    let result = service.subscribe(a, "r1").await;
    assert!(matches!(result, Err(RelayError::LoadFailure { .. })));
    assert!(service.registry().is_empty().await);
    assert_eq!(service.membership().count("r1").await, 0);
    drain(&mut a_inbox);

    handle_subscribe_message(&service, a, &SubscribeMessage { room: "r1".to_string() }).await;
    assert_eq!(
        events(&drain(&mut a_inbox)),
        vec!["loading:start", "loading:end", "project:load:error"]
    );

    store.set_fail_reads(false);
    service.subscribe(a, "r1").await.unwrap();
    assert_eq!(store.reads(), 3);
    assert_eq!(service.phase_of("r1").await, Some(RoomPhase::Ready));
}

#[tokio::test(start_paused = true)]
async fn rejoin_during_final_flush_keeps_room_loaded() {
    let (service, store) = setup();
    store.set_write_delay(Duration::from_millis(500));
    let (a, _a_inbox) = service.connect().await;
    service.subscribe(a, "r1").await.unwrap();
    service
        .submit(a, draw_end("r1", "u1", json!([[3.0, 3.0]]), None))
        .await
        .unwrap();
    service.disconnect(a).await;

    // The flush starts at GRACE and is still in flight here.
    tokio::time::sleep(GRACE + Duration::from_millis(200)).await;
    let (b, mut b_inbox) = service.connect().await;
    service.subscribe(b, "r1").await.unwrap();
    assert!(events(&drain(&mut b_inbox)).contains(&"project:load".to_string()));
    assert_eq!(store.reads(), 1);

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(store.writes(), 1);
    assert_eq!(service.phase_of("r1").await, Some(RoomPhase::Ready));
    assert_eq!(store.reads(), 1);
}

#[tokio::test(start_paused = true)]
async fn change_during_final_flush_is_flushed_again() {
    let (service, store) = setup();
    store.set_write_delay(Duration::from_millis(500));
    let (a, _a_inbox) = service.connect().await;
    let (c, _c_inbox) = service.connect().await;
    service.subscribe(a, "r1").await.unwrap();
    service
        .submit(a, draw_end("r1", "u1", json!([[3.0, 3.0]]), Some("first")))
        .await
        .unwrap();
    service.disconnect(a).await;

    tokio::time::sleep(GRACE + Duration::from_millis(200)).await;
    service
        .submit(c, draw_end("r1", "u2", json!([[4.0, 4.0]]), Some("second")))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(2000)).await;
    assert_eq!(store.writes(), 2);
    assert_eq!(service.phase_of("r1").await, None);
    let names: Vec<Value> = project_items(store.record("r1").await.unwrap().as_str())
        .iter()
        .map(|item| item["name"].clone())
        .collect();
    assert_eq!(names, vec![json!("first"), json!("second")]);
}

#[tokio::test(start_paused = true)]
async fn shutdown_flushes_resident_rooms_and_closes_store() {
    let (service, store) = setup();
    let (a, _a_inbox) = service.connect().await;
    service.subscribe(a, "r1").await.unwrap();
    service
        .submit(a, draw_end("r1", "u1", json!([[0.0, 1.0]]), None))
        .await
        .unwrap();

    service.shutdown().await;

    assert_eq!(store.writes(), 1);
    assert!(store.record("r1").await.is_some());
    assert!(store.is_closed());
}

#[tokio::test]
async fn empty_room_name_is_rejected() {
    let (service, store) = setup();
    let (a, _a_inbox) = service.connect().await;
    assert!(matches!(service.subscribe(a, "").await, Err(RelayError::InvalidRoom)));
    assert_eq!(store.reads(), 0);
    assert!(service.membership().joined_rooms(a).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn abandoned_load_is_not_left_behind() {
    let (service, store) = setup();
    store.set_read_delay(Duration::from_millis(100));

    let (a, _a_inbox) = service.connect().await;
    let loader = {
        let service = service.clone();
        tokio::spawn(async move { service.subscribe(a, "r1").await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(service.phase_of("r1").await, Some(RoomPhase::Loading));

    loader.abort();
    assert!(loader.await.unwrap_err().is_cancelled());
    service.disconnect(a).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(service.registry().get("r1").await.is_none());

    let (b, _b_inbox) = service.connect().await;
    service.subscribe(b, "r1").await.unwrap();
    assert_eq!(store.reads(), 2);
    assert_eq!(service.phase_of("r1").await, Some(RoomPhase::Ready));
}

#[tokio::test(start_paused = true)]
async fn flush_retry_from_a_cancelled_eviction_never_overwrites_a_newer_one() {
    let (service, store) = setup_with(RelayConfig {
        eviction_grace: Duration::from_millis(100),
        flush_retry_attempts: 3,
        flush_retry_backoff: Duration::from_millis(1000),
    });
    store.fail_next_writes(1);

    let (a, _a_inbox) = service.connect().await;
    service.subscribe(a, "r1").await.unwrap();
    service
        .submit(a, draw_end("r1", "u1", json!([[1.0, 1.0]]), Some("old")))
        .await
        .unwrap();
    service.leave(a, "r1").await;

    // The first flush fails at 100ms and backs off until 1100ms.
    tokio::time::sleep(Duration::from_millis(150)).await;
    service.subscribe(a, "r1").await.unwrap();
    service
        .submit(a, draw_end("r1", "u1", json!([[2.0, 2.0]]), Some("new")))
        .await
        .unwrap();
    service.leave(a, "r1").await;

    tokio::time::sleep(Duration::from_millis(5000)).await;
    assert_eq!(service.phase_of("r1").await, None);
    assert_eq!(store.writes(), 1);
    let names: Vec<Value> = project_items(store.record("r1").await.unwrap().as_str())
        .iter()
        .map(|item| item["name"].clone())
        .collect();
    assert_eq!(names, vec![json!("old"), json!("new")]);
}

#[tokio::test(start_paused = true)]
async fn shutdown_during_eviction_flush_stores_the_latest_state() {
    let (service, store) = setup();
    store.set_write_delay(Duration::from_millis(500));
    let (a, _a_inbox) = service.connect().await;
    let (c, _c_inbox) = service.connect().await;
    service.subscribe(a, "r1").await.unwrap();
    service
        .submit(a, draw_end("r1", "u1", json!([[1.0, 1.0]]), Some("p1")))
        .await
        .unwrap();
    service.disconnect(a).await;

    // The eviction write of p1 is in flight.
    tokio::time::sleep(GRACE + Duration::from_millis(200)).await;
    service
        .submit(c, draw_end("r1", "u2", json!([[2.0, 2.0]]), Some("p2")))
        .await
        .unwrap();
    let latest = service.export_room("r1").await.unwrap().unwrap();

    service.shutdown().await;
    tokio::time::sleep(Duration::from_millis(2000)).await;

    assert_eq!(store.record("r1").await, Some(latest));
    assert_eq!(store.writes(), 2);
    assert_eq!(service.phase_of("r1").await, None);
}

#[tokio::test]
async fn peers_receive_the_frame_as_it_was_sent() {
    let (service, _store) = setup();
    let (a, _a_inbox) = service.connect().await;
    let (b, mut b_inbox) = service.connect().await;
    service.subscribe(a, "r1").await.unwrap();
    service.subscribe(b, "r1").await.unwrap();
    drain(&mut b_inbox);

    let frame = json!({
        "event": "draw:end",
        "room": "r1",
        "uid": "u1",
        "coordinates": [[0.0, 0.0], [4.0, 4.0]],
        "name": "u1:1",
        "pressure": 0.7,
    })
    .to_string();
    let mutation: Mutation = serde_json::from_str(&frame).unwrap();
    handle_mutation_message(&service, a, mutation, frame.clone()).await;

    assert_eq!(b_inbox.try_recv().unwrap(), frame);
    let items = project_items(service.export_room("r1").await.unwrap().unwrap().as_str());
    assert_eq!(items.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn late_subscriber_gets_its_snapshot_before_any_relayed_event() {
    let (service, store) = setup();
    let (a, _a_inbox) = service.connect().await;
    let (b, mut b_inbox) = service.connect().await;
    service.subscribe(a, "r1").await.unwrap();

    // Shutdown keeps the room locked while its slow write runs.
    store.set_write_delay(Duration::from_millis(500));
    let closing = {
        let service = service.clone();
        tokio::spawn(async move { service.shutdown().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let drawing = {
        let service = service.clone();
        tokio::spawn(async move {
            service
                .submit(a, draw_end("r1", "u1", json!([[5.0, 5.0]]), Some("queued")))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    let joining = {
        let service = service.clone();
        tokio::spawn(async move { service.subscribe(b, "r1").await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    closing.await.unwrap();
    drawing.await.unwrap().unwrap();
    joining.await.unwrap().unwrap();

    let frames = drain(&mut b_inbox);
    assert_eq!(
        events(&frames),
        vec!["loading:start", "project:load", "loading:end", "user:connect"]
    );
    let items = project_items(frames[1]["project"].as_str().unwrap());
    assert_eq!(items[0]["name"], "queued");
}
