use super::*;

fn sample_source() -> Source {
    Source { url: "https://example.org/report.pdf".to_owned(), page: Some(4), score: Some(0.82) }
}

#[test]
fn decode_inbound_classifies_delta() {
    let frame = decode_inbound(r#"{"type":"delta","statusCode":200,"format":"markdown","text":"Hel"}"#)
        .expect("delta should decode");
    assert_eq!(frame, InboundFrame::Delta { text: "Hel".to_owned() });
}

#[test]
fn decode_inbound_classifies_terminal_kinds() {
    assert_eq!(decode_inbound(r#"{"type":"end","statusCode":200}"#).expect("end"), InboundFrame::End);
    assert_eq!(
        decode_inbound(r#"{"type":"error","statusCode":500,"text":"KB unavailable"}"#).expect("error"),
        InboundFrame::Error { text: "KB unavailable".to_owned() }
    );
    assert_eq!(
        decode_inbound(r#"{"type":"text","text":"Done in one"}"#).expect("text"),
        InboundFrame::Text { text: "Done in one".to_owned() }
    );
}

#[test]
fn decode_inbound_error_without_text_has_empty_reason() {
    let frame = decode_inbound(r#"{"type":"error"}"#).expect("error");
    assert_eq!(frame, InboundFrame::Error { text: String::new() });
}

#[test]
fn decode_inbound_reads_sources_with_lenient_pages() {
    let frame = decode_inbound(
        r#"{"type":"sources","sources":[
            {"url":"a","page":3,"score":0.5},
            {"url":"b","page":7.0},
            {"url":"c","page":"12"},
            {"url":"d","page":true},
            {"url":"e"}
        ]}"#,
    )
    .expect("sources should decode");

    let InboundFrame::Sources { sources } = frame else {
        panic!("expected sources frame");
    };
    let pages = sources.iter().map(|s| s.page).collect::<Vec<_>>();
    assert_eq!(pages, vec![Some(3), Some(7), Some(12), None, None]);
    assert_eq!(sources[0].score, Some(0.5));
    assert_eq!(sources[4].url, "e");
}

#[test]
fn decode_inbound_skips_malformed_citations() {
    let frame = decode_inbound(
        r#"{"type":"sources","sources":[
            {"url":"https://a","page":1},
            {"page":2,"score":0.9},
            "not an object",
            {"url":"https://b","score":"0.5"}
        ]}"#,
    )
    .expect("valid json");

    let InboundFrame::Sources { sources } = frame else {
        panic!("expected sources frame");
    };
    let urls = sources.iter().map(|s| s.url.as_str()).collect::<Vec<_>>();
    assert_eq!(urls, vec!["https://a", "https://b"]);
    assert_eq!(sources[1].score, Some(0.5));
}

#[test]
fn decode_inbound_drops_unusable_scores() {
    let frame = decode_inbound(
        r#"{"type":"sources","sources":[
            {"url":"a","score":"high"},
            {"url":"b","score":"NaN"},
            {"url":"c","score":[1]},
            {"url":"d","score":null}
        ]}"#,
    )
    .expect("valid json");

    let InboundFrame::Sources { sources } = frame else {
        panic!("expected sources frame");
    };
    assert_eq!(sources.len(), 4);
    assert!(sources.iter().all(|s| s.score.is_none()));
}

#[test]
fn decode_inbound_unknown_type_is_unrecognized() {
    let frame = decode_inbound(r#"{"type":"heartbeat"}"#).expect("valid json");
    assert_eq!(frame, InboundFrame::Unrecognized { kind: "heartbeat".to_owned() });
    assert_eq!(frame.kind(), "heartbeat");
}

#[test]
fn decode_inbound_shape_mismatch_is_unrecognized() {
    let frame = decode_inbound(r#"{"type":"delta","text":42}"#).expect("valid json");
    assert_eq!(frame, InboundFrame::Unrecognized { kind: "delta".to_owned() });

    let frame = decode_inbound(r#"{"type":"sources"}"#).expect("valid json");
    assert_eq!(frame, InboundFrame::Unrecognized { kind: "sources".to_owned() });
}

#[test]
fn decode_inbound_non_object_json_is_unrecognized() {
    assert_eq!(decode_inbound("17").expect("valid json"), InboundFrame::Unrecognized { kind: String::new() });
    assert_eq!(
        decode_inbound(r#"{"text":"no discriminator"}"#).expect("valid json"),
        InboundFrame::Unrecognized { kind: String::new() }
    );
}

#[test]
fn decode_inbound_rejects_partial_json() {
    let err = decode_inbound(r#"{"type":"delta","te"#).expect_err("partial record should fail");
    assert!(matches!(err, CodecError::Parse(_)));
}

#[test]
fn message_entry_uses_backend_history_keys() {
    let entry = MessageEntry::bot_text("Hello", vec![sample_source()], 1_700_000_000_000);
    let json = serde_json::to_value(&entry).expect("serialize");

    assert_eq!(json["sentBy"], "BOT");
    assert_eq!(json["type"], "TEXT");
    assert_eq!(json["state"], "RECEIVED");
    assert_eq!(json["message"], "Hello");
    assert_eq!(json["timestamp"], 1_700_000_000_000_i64);
    assert_eq!(json["sources"][0]["page"], 4);
    assert!(json.get("fileName").is_none());
}

#[test]
fn message_entry_reads_file_entries() {
    let entry = serde_json::from_str::<MessageEntry>(
        r#"{"sentBy":"USER","type":"FILE","state":"SENT","message":"File uploaded: a.pdf",
            "fileName":"a.pdf","fileStatus":"File size limit exceeded.","sources":[],"timestamp":5}"#,
    )
    .expect("file entry");
    assert_eq!(entry.kind, EntryKind::File);
    assert_eq!(entry.file_name.as_deref(), Some("a.pdf"));
    assert!(!entry.is_text_from(Sender::User));
}

#[test]
fn encode_outbound_send_message_shape() {
    let frame = OutboundFrame::SendMessage {
        prompt: "What is the mission?".to_owned(),
        role: DEFAULT_ROLE.to_owned(),
        history: vec![MessageEntry::user_text("hi", 1)],
    };
    let json: Value = serde_json::from_str(&encode_outbound(&frame).expect("encode")).expect("json");

    assert_eq!(json["action"], "sendMessage");
    assert_eq!(json["prompt"], "What is the mission?");
    assert_eq!(json["role"], "researchAssistant");
    assert_eq!(json["history"][0]["sentBy"], "USER");
}

#[test]
fn encode_outbound_feedback_uses_camel_case_fields() {
    let frame = OutboundFrame::SubmitFeedback {
        rating: FeedbackRating::ThumbsDown,
        bot_message: "answer".to_owned(),
        user_message: "question".to_owned(),
        timestamp: 9,
        reason: "outdated".to_owned(),
    };
    let json: Value = serde_json::from_str(&encode_outbound(&frame).expect("encode")).expect("json");

    assert_eq!(json["action"], "submitFeedback");
    assert_eq!(json["rating"], "thumbsdown");
    assert_eq!(json["botMessage"], "answer");
    assert_eq!(json["userMessage"], "question");
    assert_eq!(json["reason"], "outdated");
}
