//! Product change events and their dashboard projection.
//!
//! # Wire format
//!
//! Mutations publish a [`ProductEvent`] as JSON, keyed by product id:
//!
//! ```json
//! { "eventType": "CREATED", "productId": 12, "timestamp": "2025-01-01T00:00:00Z" }
//! ```
//!
//! The dashboard consumer turns each consumed record into a [`DashboardEvent`],
//! which wraps the raw payload together with its broker coordinates.

use crate::record::{BrokerRecord, OutboundRecord};
use crate::topics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Kind of product change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProductEventType {
    /// Product inserted
    Created,
    /// Product modified
    Updated,
    /// Product removed
    Deleted,
}

impl ProductEventType {
    /// Wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Updated => "UPDATED",
            Self::Deleted => "DELETED",
        }
    }

    /// Parse a wire value, falling back to [`Self::Created`] for anything unknown.
    ///
    /// ```
    /// use catalog_core::event::ProductEventType;
    ///
    /// assert_eq!(ProductEventType::parse_lenient("DELETED"), ProductEventType::Deleted);
    /// assert_eq!(ProductEventType::parse_lenient("UNKNOWN"), ProductEventType::Created);
    /// ```
    #[must_use]
    pub fn parse_lenient(value: &str) -> Self {
        match value {
            "UPDATED" => Self::Updated,
            "DELETED" => Self::Deleted,
            _ => Self::Created,
        }
    }
}

impl fmt::Display for ProductEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event published after a product mutation is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductEvent {
    /// What happened
    pub event_type: ProductEventType,
    /// Affected product
    pub product_id: i64,
    /// When it happened
    pub timestamp: DateTime<Utc>,
}

impl ProductEvent {
    /// Create an event stamped with `timestamp`.
    #[must_use]
    pub const fn new(event_type: ProductEventType, product_id: i64, timestamp: DateTime<Utc>) -> Self {
        Self {
            event_type,
            product_id,
            timestamp,
        }
    }

    /// Encode as a JSON record for `topic`, keyed by product id.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Encode`] if JSON serialization fails.
    pub fn to_record(&self, topic: &str) -> Result<OutboundRecord, EventError> {
        let payload = serde_json::to_vec(self).map_err(|e| EventError::Encode(e.to_string()))?;
        Ok(OutboundRecord::new(topic, payload).with_key(self.product_id.to_string()))
    }
}

/// Errors raised while encoding or decoding events.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventError {
    /// Serialization failed.
    #[error("Failed to encode event: {0}")]
    Encode(String),

    /// Payload is not valid JSON.
    #[error("Payload is not valid JSON: {0}")]
    InvalidPayload(String),
}

/// A consumed broker record, shaped for the live dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardEvent {
    /// Fresh id for this delivery
    pub id: String,
    /// Source topic
    pub topic: String,
    /// Source partition
    pub partition: i32,
    /// Source offset
    pub offset: i64,
    /// Record key
    pub key: Option<String>,
    /// JSON payload, re-serialized
    pub value: String,
    /// Consume time
    pub timestamp: DateTime<Utc>,
    /// Event kind, defaulting to `CREATED`
    #[serde(rename = "type")]
    pub event_type: ProductEventType,
}

impl DashboardEvent {
    /// Build a dashboard event from a consumed record.
    ///
    /// The payload must be JSON. Its `eventType` field is parsed leniently:
    /// a missing or unrecognized value becomes `CREATED`.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::InvalidPayload`] if the payload is not JSON.
    pub fn from_record(record: &BrokerRecord, received_at: DateTime<Utc>) -> Result<Self, EventError> {
        let json: serde_json::Value = serde_json::from_slice(&record.payload)
            .map_err(|e| EventError::InvalidPayload(e.to_string()))?;

        let event_type = json
            .get("eventType")
            .and_then(serde_json::Value::as_str)
            .map_or(ProductEventType::Created, ProductEventType::parse_lenient);

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            topic: record.topic.clone(),
            partition: record.partition,
            offset: record.offset,
            key: record.key.clone(),
            value: json.to_string(),
            timestamp: received_at,
            event_type,
        })
    }

    /// Whether this event came from the product topic.
    #[must_use]
    pub fn is_product_event(&self) -> bool {
        self.topic == topics::PRODUCT_EVENTS
    }
}
