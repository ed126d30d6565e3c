//! Inbound frame classification.
//!
//! Turns every socket frame into one [`Message`]:
//!
//! | Frame | Result |
//! |-------|--------|
//! | binary (any container), non-empty | [`Message::Binary`] |
//! | binary, zero length | [`Message::EmptyBinary`] |
//! | text, JSON object | [`Message::Control`] |
//! | text, anything else | [`Message::Malformed`] (verbatim) |
//!
//! Classification never fails and never drops a frame. The only fallible
//! step is awaiting a [`Frame::Deferred`] read; that error is returned to
//! the caller, which reports it as a transport error.

// ============================================================================
// Imports
// ============================================================================

use std::io;

use bytes::Bytes;
use serde_json::Value;

use crate::transport::Frame;

use super::message::{ControlMessage, Message};
use super::namespace::{Namespace, ProtocolVersion};

// ============================================================================
// Classification
// ============================================================================

/// Classifies one inbound frame.
///
/// # Errors
///
/// Returns the IO error of a failed deferred read. Every other frame
/// classifies successfully.
pub async fn classify(
    frame: Frame,
    namespace: Namespace,
    version: ProtocolVersion,
) -> io::Result<Message> {
    let message = match frame {
        Frame::Text(text) => classify_text(text, namespace, version),
        Frame::Binary(bytes) => classify_binary(bytes),
        Frame::Fixed(bytes) => classify_binary(Bytes::copy_from_slice(&bytes)),
        Frame::Deferred(read) => classify_binary(read.await?),
    };
    Ok(message)
}

/// Classifies a text frame.
#[must_use]
pub fn classify_text(text: String, namespace: Namespace, version: ProtocolVersion) -> Message {
    match serde_json::from_str::<Value>(&text) {
        Ok(value @ Value::Object(_)) => {
            Message::Control(ControlMessage::from_value(namespace, version, value))
        }
        // Scalars and arrays carry no discriminator.
        Ok(_) | Err(_) => Message::Malformed(text),
    }
}

/// Classifies a normalized binary payload.
#[inline]
#[must_use]
pub fn classify_binary(bytes: Bytes) -> Message {
    if bytes.is_empty() {
        Message::EmptyBinary
    } else {
        Message::Binary(bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use futures_util::FutureExt;
    use proptest::prelude::*;

    use crate::protocol::ControlKind;

    const NS: Namespace = Namespace::Listen;
    const V: ProtocolVersion = ProtocolVersion::V1;

    #[tokio::test]
    async fn test_json_object_is_control() {
        let frame = Frame::Text(r#"{"type":"Metadata","request_id":"r-1"}"#.into());
        let message = classify(frame, NS, V).await.expect("classify");

        match message {
            Message::Control(control) => {
                assert_eq!(control.kind, ControlKind::Metadata);
                assert_eq!(control.get_str("request_id"), Some("r-1"));
            }
            other => panic!("expected control, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unparseable_text_is_kept_verbatim() {
        let raw = "{not json at all";
        let message = classify(Frame::Text(raw.into()), NS, V).await.expect("classify");
        assert_eq!(message, Message::Malformed(raw.to_string()));
    }

    #[tokio::test]
    async fn test_json_scalar_is_malformed() {
        let message = classify(Frame::Text("42".into()), NS, V).await.expect("classify");
        assert_eq!(message, Message::Malformed("42".into()));
    }

    #[tokio::test]
    async fn test_binary_containers_normalize_identically() {
        const PAYLOAD: &[u8] = &[1, 2, 3, 4];
        let payload = PAYLOAD;

        let raw = classify(Frame::Binary(Bytes::from_static(payload)), NS, V).await;
        let fixed = classify(Frame::Fixed(Arc::from(payload)), NS, V).await;
        let deferred = classify(
            Frame::Deferred(async move { Ok::<_, io::Error>(Bytes::from_static(payload)) }.boxed()),
            NS,
            V,
        )
        .await;

        let expected = Message::Binary(Bytes::from_static(payload));
        assert_eq!(raw.expect("raw"), expected);
        assert_eq!(fixed.expect("fixed"), expected);
        assert_eq!(deferred.expect("deferred"), expected);
    }

    #[tokio::test]
    async fn test_zero_length_binary_is_distinct() {
        let message = classify(Frame::Fixed(Arc::from(&[][..])), NS, V)
            .await
            .expect("classify");
        assert_eq!(message, Message::EmptyBinary);
    }

    #[tokio::test]
    async fn test_failed_deferred_read_is_error() {
        let frame = Frame::Deferred(
            async { Err::<Bytes, _>(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated")) }
                .boxed(),
        );
        assert!(classify(frame, NS, V).await.is_err());
    }

    proptest! {
        #[test]
        fn prop_non_empty_binary_stays_binary(data in proptest::collection::vec(any::<u8>(), 1..512)) {
            let message = classify_binary(Bytes::from(data.clone()));
            prop_assert_eq!(message, Message::Binary(Bytes::from(data)));
        }

        #[test]
        fn prop_text_never_lost(text in ".*") {
            match classify_text(text.clone(), NS, V) {
                Message::Control(control) => {
                    let reparsed: Value = serde_json::from_str(&text).expect("was parsed once");
                    prop_assert_eq!(control.payload, reparsed);
                }
                Message::Malformed(raw) => prop_assert_eq!(raw, text),
                other => prop_assert!(false, "text became {:?}", other),
            }
        }
    }
}
