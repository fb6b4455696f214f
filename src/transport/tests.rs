use super::message::{ClientFrame, Delivery, DeliveryAckFrame, PublishFrame, ServerFrame};
use crate::utils::error::FrameError;
use serde_json::{Value, json};

#[test]
fn test_decode_publish_keeps_extra_fields_as_payload() {
    let frame = ClientFrame::decode(r#"{"tag":"orders","msg_mark":"m1","amount":10}"#).unwrap();
    match frame {
        ClientFrame::Publish(PublishFrame { topic, id, payload }) => {
            assert_eq!(topic, "orders");
            assert_eq!(id, "m1");
            assert_eq!(Value::Object(payload), json!({"amount": 10}));
        }
        other => panic!("Expected a publish frame, got {other:?}"),
    }
}

#[test]
fn test_decode_pull_preserves_priority_order() {
    let frame = ClientFrame::decode(r#"["b","a"]"#).unwrap();
    assert_eq!(frame, ClientFrame::Pull(vec!["b".to_string(), "a".to_string()]));
}

#[test]
fn test_decode_delivery_ack() {
    let frame = ClientFrame::decode(r#"{"ack_code":"200","ack_mark":"m1"}"#).unwrap();
    match frame {
        ClientFrame::DeliveryAck(ack) => {
            assert_eq!(ack.id, "m1");
            assert!(ack.is_success());
        }
        other => panic!("Expected a delivery ack, got {other:?}"),
    }
}

#[test]
fn test_numeric_ack_code_is_normalized() {
    let frame = ClientFrame::decode(r#"{"ack_code":500,"ack_mark":"m3"}"#).unwrap();
    assert_eq!(
        frame,
        ClientFrame::DeliveryAck(DeliveryAckFrame {
            id: "m3".to_string(),
            code: "500".to_string(),
        })
    );
}

#[test]
fn test_decode_rejects_non_json() {
    // a native literal is not JSON and is never evaluated
    let err = ClientFrame::decode("{'tag': 'orders', 'msg_mark': __import__('os')}").unwrap_err();
    assert!(matches!(err, FrameError::Malformed(_)));
}

#[test]
fn test_decode_rejects_unrecognized_shapes() {
    for line in [r#""none""#, "42", "null", r#"{"hello":"world"}"#] {
        let err = ClientFrame::decode(line).unwrap_err();
        assert!(
            matches!(err, FrameError::ProtocolViolation(_)),
            "{line} gave {err:?}"
        );
    }
}

#[test]
fn test_decode_rejects_missing_or_mistyped_fields() {
    let cases = [
        r#"{"tag":"orders"}"#,
        r#"{"msg_mark":"m1"}"#,
        r#"{"tag":"orders","msg_mark":7}"#,
        r#"{"ack_code":"200"}"#,
        r#"{"ack_code":true,"ack_mark":"m1"}"#,
        r#"["orders",1]"#,
    ];
    for line in cases {
        let err = ClientFrame::decode(line).unwrap_err();
        assert!(
            matches!(err, FrameError::InvalidField { .. }),
            "{line} gave {err:?}"
        );
    }
}

#[test]
fn test_decode_rejects_unsafe_names() {
    for line in [
        r#"{"tag":"../etc","msg_mark":"m1"}"#,
        r#"{"tag":"orders","msg_mark":"a/b"}"#,
        r#"{"tag":"","msg_mark":"m1"}"#,
        r#"[".hidden"]"#,
    ] {
        let err = ClientFrame::decode(line).unwrap_err();
        assert!(matches!(err, FrameError::InvalidField { .. }), "{line}");
    }
}

#[test]
fn test_server_frames_encode_to_wire_shapes() {
    assert_eq!(
        ServerFrame::PublishAck { id: "m1".to_string() }.encode(),
        r#"{"msg_mark":"m1"}"#
    );
    assert_eq!(ServerFrame::Empty.encode(), r#""none""#);
    assert_eq!(ServerFrame::error("bad frame").encode(), r#"{"error":"bad frame"}"#);
}

#[test]
fn test_delivery_carries_topic_and_id() {
    let delivery = Delivery {
        topic: "orders".to_string(),
        id: "m1".to_string(),
        payload: json!({"amount": 10}).as_object().unwrap().clone(),
    };
    let encoded: Value = serde_json::from_str(&ServerFrame::Delivery(delivery.clone()).encode()).unwrap();
    assert_eq!(encoded, json!({"tag": "orders", "msg_mark": "m1", "amount": 10}));

    let decoded = ServerFrame::decode(&encoded.to_string()).unwrap();
    assert_eq!(decoded, ServerFrame::Delivery(delivery));
}

#[test]
fn test_server_frame_decode() {
    assert_eq!(ServerFrame::decode(r#""none""#).unwrap(), ServerFrame::Empty);
    assert_eq!(
        ServerFrame::decode(r#"{"msg_mark":"m1"}"#).unwrap(),
        ServerFrame::PublishAck { id: "m1".to_string() }
    );
    assert_eq!(
        ServerFrame::decode(r#"{"error":"nope"}"#).unwrap(),
        ServerFrame::Error { message: "nope".to_string() }
    );
}
