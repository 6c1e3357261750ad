//! Inbound trigger envelopes.
//!
//! Two envelopes reach the pipeline over HTTP: object-storage notifications
//! (one per uploaded image) and queue-trigger batches (one CropTask per
//! message body). Both decode strictly; a missing required field fails the
//! whole envelope.

use serde::{Deserialize, Serialize};

use crate::ids::ObjectId;

/// Batch of object-created notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectCreatedBatch {
    pub messages: Vec<ObjectCreatedMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectCreatedMessage {
    /// Transport metadata; carried through for logging only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_metadata: Option<serde_json::Value>,
    pub details: ObjectCreatedDetails,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectCreatedDetails {
    pub bucket_id: String,
    pub object_id: String,
}

impl ObjectCreatedDetails {
    /// Strip the images prefix from the object key.
    ///
    /// Returns `None` for keys outside the prefix (for example face crops).
    pub fn image_id(&self, images_prefix: &str) -> Option<ObjectId> {
        self.object_id
            .strip_prefix(images_prefix)
            .filter(|rest| !rest.is_empty())
            .map(ObjectId::new)
    }
}

/// Batch of queue messages, each wrapping one serialized CropTask.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueTriggerBatch {
    pub messages: Vec<QueueTriggerEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueTriggerEntry {
    pub details: QueueTriggerDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueTriggerDetails {
    pub message: QueueMessage,
}

/// One delivered queue message. `body` is the CropTask JSON, undecoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub message_id: String,
    pub body: String,
}

impl QueueMessage {
    pub fn new(message_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            body: body.into(),
        }
    }
}

impl QueueTriggerBatch {
    /// Unwrap the single envelope level around each message.
    pub fn into_messages(self) -> Vec<QueueMessage> {
        self.messages
            .into_iter()
            .map(|entry| entry.details.message)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_object_created() {
        let json = r#"{
            "messages": [{
                "event_metadata": {"event_id": "e1", "event_type": "ObjectCreate"},
                "details": {"bucket_id": "photos", "object_id": "images/img1.jpg"}
            }]
        }"#;
        let batch: ObjectCreatedBatch = serde_json::from_str(json).unwrap();
        assert_eq!(batch.messages.len(), 1);
        let details = &batch.messages[0].details;
        assert_eq!(details.bucket_id, "photos");
        assert_eq!(details.image_id("images/"), Some(ObjectId::new("img1.jpg")));
    }

    #[test]
    fn test_event_metadata_is_optional() {
        let json = r#"{"messages":[{"details":{"bucket_id":"b","object_id":"images/x"}}]}"#;
        let batch: ObjectCreatedBatch = serde_json::from_str(json).unwrap();
        assert!(batch.messages[0].event_metadata.is_none());
    }

    #[test]
    fn test_missing_details_fails() {
        let json = r#"{"messages":[{"event_metadata":{}}]}"#;
        assert!(serde_json::from_str::<ObjectCreatedBatch>(json).is_err());
    }

    #[test]
    fn test_keys_outside_prefix_are_not_images() {
        let details = ObjectCreatedDetails {
            bucket_id: "b".into(),
            object_id: "faces/abc.jpg".into(),
        };
        assert_eq!(details.image_id("images/"), None);

        let bare = ObjectCreatedDetails {
            bucket_id: "b".into(),
            object_id: "images/".into(),
        };
        assert_eq!(bare.image_id("images/"), None);
    }

    #[test]
    fn test_unwrap_queue_batch() {
        let json = r#"{"messages":[
            {"details":{"message":{"message_id":"m1","body":"{\"a\":1}"}}},
            {"details":{"message":{"message_id":"m2","body":"x"}}}
        ]}"#;
        let batch: QueueTriggerBatch = serde_json::from_str(json).unwrap();
        let messages = batch.into_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].message_id, "m1");
        assert_eq!(messages[0].body, r#"{"a":1}"#);
        assert_eq!(messages[1].body, "x");
    }
}
