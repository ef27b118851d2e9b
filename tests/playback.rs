//! End-to-end playback scenarios through the session API.
//!
//! These exercise the whole path a viewer sees: metadata delivery, control
//! dispatch, window resolution, paced delivery, replacement, and loop
//! rebasing, against an in-memory store and a recording sink.

use std::sync::Arc;

use bytes::Bytes;
use serde_json::{Value, json};
use vizstream::codec;
use vizstream::{
    ConnectionSession, Frame, FrameEncoding, FrameStore, RecordingSink, Settings, StructuredFrame,
    TickOutcome, WirePayload,
};

fn state_update(timestamp: f64) -> Value {
    json!({
        "type": "xviz/state_update",
        "data": {
            "updates": [{
                "timestamp": timestamp,
                "time_series": [{"timestamp": timestamp, "streams": ["/velocity"]}]
            }]
        }
    })
}

fn text_frame(timestamp: f64) -> Frame {
    Frame {
        timestamp,
        encoding: FrameEncoding::Text,
        payload: Bytes::from(serde_json::to_vec(&state_update(timestamp)).unwrap()),
    }
}

fn binary_frame(timestamp: f64) -> Frame {
    let structured = StructuredFrame {
        json: state_update(timestamp),
        encoding: FrameEncoding::Binary,
        tail: Bytes::new(),
    };
    let WirePayload::Binary(payload) = codec::pack(&structured).unwrap() else {
        panic!("expected binary payload");
    };
    Frame { timestamp, encoding: FrameEncoding::Binary, payload }
}

fn metadata() -> (Bytes, FrameEncoding) {
    let json = json!({
        "type": "xviz/metadata",
        "data": {"version": "2.0.0", "log_info": {"start_time": 0.0, "end_time": 40.0}}
    });
    (Bytes::from(serde_json::to_vec(&json).unwrap()), FrameEncoding::Text)
}

fn five_frame_store() -> Arc<FrameStore> {
    Arc::new(
        FrameStore::new(
            [0.0, 10.0, 20.0, 30.0, 40.0].map(text_frame).into(),
            Some(metadata()),
        )
        .unwrap(),
    )
}

fn message_type(payload: &WirePayload) -> Option<String> {
    let WirePayload::Text(text) = payload else { return None };
    let value: Value = serde_json::from_str(text).ok()?;
    value.get("type")?.as_str().map(str::to_string)
}

fn update_timestamp(payload: &WirePayload) -> f64 {
    let frame = codec::unpack(payload).unwrap();
    frame.json["data"]["updates"][0]["timestamp"].as_f64().unwrap()
}

async fn drain(session: &mut ConnectionSession<FrameStore>, sink: &mut RecordingSink) {
    for _ in 0..100 {
        match session.tick(sink).await.unwrap() {
            TickOutcome::Continue => {}
            TickOutcome::Completed | TickOutcome::Idle => return,
        }
    }
    panic!("playback did not settle within 100 ticks");
}

#[tokio::test]
async fn full_session_transcript() {
    let settings = Settings { frame_limit: 5, send_interval_ms: 0, ..Settings::default() };
    let mut session = ConnectionSession::new(7, five_frame_store(), Arc::new(settings));
    let mut sink = RecordingSink::new();

    session.send_metadata(&mut sink).await.unwrap();
    session
        .handle_message(r#"{"type":"xviz/start","data":{"log":"demo"}}"#)
        .await
        .unwrap();
    session
        .handle_message(
            r#"{"type":"xviz/transform_log","data":{"start_timestamp":5,"end_timestamp":25,"id":"t-1"}}"#,
        )
        .await
        .unwrap();
    drain(&mut session, &mut sink).await;

    // Metadata, the two frames in [5, 25), then the done envelope.
    assert_eq!(message_type(&sink.sent[0]).as_deref(), Some("xviz/metadata"));
    assert_eq!(update_timestamp(&sink.sent[1]), 10.0);
    assert_eq!(update_timestamp(&sink.sent[2]), 20.0);
    let done: Value = serde_json::from_str(sink.texts()[3]).unwrap();
    assert_eq!(done, json!({"type": "xviz/transform_log_done", "data": {"id": "t-1"}}));
    assert_eq!(sink.sent.len(), 4);

    // A later request on the same connection does not resend metadata.
    session.send_metadata(&mut sink).await.unwrap();
    assert_eq!(sink.sent.len(), 4);
}

#[tokio::test]
async fn replacement_mid_stream_yields_one_cancelled_then_new_frames() {
    let mut session =
        ConnectionSession::new(1, five_frame_store(), Arc::new(Settings::default()));
    let mut sink = RecordingSink::new();

    session
        .handle_message(
            r#"{"type":"xviz/transform_log","data":{"start_timestamp":0,"end_timestamp":45,"id":"a"}}"#,
        )
        .await
        .unwrap();
    session.tick(&mut sink).await.unwrap();
    session.tick(&mut sink).await.unwrap();

    session
        .handle_message(
            r#"{"type":"xviz/transform_log","data":{"start_timestamp":30,"end_timestamp":45,"id":"b"}}"#,
        )
        .await
        .unwrap();
    drain(&mut session, &mut sink).await;

    let types: Vec<Option<String>> = sink.sent.iter().map(message_type).collect();
    let cancelled_at = types
        .iter()
        .position(|t| t.as_deref() == Some("xviz/cancelled"))
        .expect("cancelled envelope present");
    assert_eq!(cancelled_at, 2);

    // Everything after the cancellation belongs to the replacement window.
    assert_eq!(update_timestamp(&sink.sent[3]), 30.0);
    assert_eq!(update_timestamp(&sink.sent[4]), 40.0);

    // Done echoes the replacement's id: the id tracks the latest request.
    let done: Value = serde_json::from_str(sink.texts().last().unwrap()).unwrap();
    assert_eq!(done["data"]["id"], "b");

    assert_eq!(
        types.iter().filter(|t| t.as_deref() == Some("xviz/cancelled")).count(),
        1
    );
}

#[tokio::test]
async fn looping_playback_rebases_monotonically() {
    let settings = Settings { loop_playback: true, frame_limit: 5, ..Settings::default() };
    let mut session = ConnectionSession::new(1, five_frame_store(), Arc::new(settings));
    let mut sink = RecordingSink::new();

    session
        .handle_message(
            r#"{"type":"xviz/transform_log","data":{"start_timestamp":0,"end_timestamp":45,"id":"loop"}}"#,
        )
        .await
        .unwrap();

    // Two and a half passes over the five-frame window.
    for _ in 0..13 {
        assert_eq!(session.tick(&mut sink).await.unwrap(), TickOutcome::Continue);
    }

    let timestamps: Vec<f64> = sink.sent.iter().map(update_timestamp).collect();
    // Pass one raw, later passes rebased by cumulative spans of 40.
    assert_eq!(
        timestamps,
        vec![0.0, 10.0, 20.0, 30.0, 40.0, 40.0, 50.0, 60.0, 70.0, 80.0, 80.0, 90.0, 100.0]
    );
    assert!(timestamps.windows(2).all(|pair| pair[1] >= pair[0]));

    // Nested time-series entries are rebased along with their update.
    let frame = codec::unpack(&sink.sent[5]).unwrap();
    assert_eq!(
        frame.json["data"]["updates"][0]["time_series"][0]["timestamp"]
            .as_f64()
            .unwrap(),
        40.0
    );
}

#[tokio::test]
async fn binary_frames_travel_as_binary_and_rebase_cleanly() {
    let store = Arc::new(
        FrameStore::new(vec![binary_frame(0.0), binary_frame(10.0)], None).unwrap(),
    );
    let settings = Settings { loop_playback: true, ..Settings::default() };
    let mut session = ConnectionSession::new(1, store, Arc::new(settings));
    let mut sink = RecordingSink::new();

    session
        .handle_message(
            r#"{"type":"xviz/transform_log","data":{"start_timestamp":0,"end_timestamp":15,"id":"bin"}}"#,
        )
        .await
        .unwrap();

    // One pass plus the first rebased frame of the second pass.
    for _ in 0..3 {
        session.tick(&mut sink).await.unwrap();
    }

    assert!(sink.sent.iter().all(|p| matches!(p, WirePayload::Binary(_))));
    assert_eq!(update_timestamp(&sink.sent[0]), 0.0);
    assert_eq!(update_timestamp(&sink.sent[1]), 10.0);
    assert_eq!(update_timestamp(&sink.sent[2]), 10.0); // frame 0 + offset 10
}

#[tokio::test]
async fn out_of_range_request_produces_no_traffic() {
    let mut session =
        ConnectionSession::new(1, five_frame_store(), Arc::new(Settings::default()));
    let mut sink = RecordingSink::new();

    session
        .handle_message(
            r#"{"type":"xviz/transform_log","data":{"start_timestamp":1000,"end_timestamp":2000,"id":"far"}}"#,
        )
        .await
        .unwrap();

    assert!(!session.is_inflight());
    assert_eq!(session.tick(&mut sink).await.unwrap(), TickOutcome::Idle);
    assert!(sink.sent.is_empty());
}
