//! Broker-neutral record types.
//!
//! These are what [`crate::event_bus::EventBus`] implementations produce and
//! consume. Payloads are opaque bytes; the catalog always writes JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A record to be produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundRecord {
    /// Destination topic
    pub topic: String,
    /// Partitioning key
    pub key: Option<String>,
    /// Payload bytes
    pub payload: Vec<u8>,
    /// String headers, in insertion order
    pub headers: Vec<(String, String)>,
}

impl OutboundRecord {
    /// Create a keyless record without headers.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            key: None,
            payload,
            headers: Vec::new(),
        }
    }

    /// Set the partitioning key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A consumed record with its broker coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerRecord {
    /// Source topic
    pub topic: String,
    /// Source partition
    pub partition: i32,
    /// Offset within the partition
    pub offset: i64,
    /// Record key, if UTF-8
    pub key: Option<String>,
    /// Payload bytes
    pub payload: Vec<u8>,
    /// String headers
    pub headers: Vec<(String, String)>,
    /// Broker-assigned timestamp
    pub timestamp: Option<DateTime<Utc>>,
}

impl BrokerRecord {
    /// Look up a header value by name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Where a produced record landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// Partition the record was written to
    pub partition: i32,
    /// Assigned offset
    pub offset: i64,
}

/// Topic to create at start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSpec {
    /// Topic name
    pub name: String,
    /// Partition count
    pub partitions: i32,
    /// Replication factor
    pub replication: i32,
}

impl TopicSpec {
    /// Create a topic spec.
    #[must_use]
    pub fn new(name: impl Into<String>, partitions: i32, replication: i32) -> Self {
        Self {
            name: name.into(),
            partitions,
            replication,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_returns_first_match() {
        let record = BrokerRecord {
            topic: "t".into(),
            partition: 0,
            offset: 0,
            key: None,
            payload: Vec::new(),
            headers: vec![("a".into(), "1".into()), ("a".into(), "2".into())],
            timestamp: None,
        };
        assert_eq!(record.header("a"), Some("1"));
        assert_eq!(record.header("b"), None);
    }
}
