// crates/mig-client/src/collection.rs
// ============================================================================
// Module: Collection Documents
// Description: Collection+JSON envelope returned by the MIG API.
// Purpose: Decode API responses into typed records.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Every API response is a Collection+JSON [`Resource`]. Records travel as
//! `items[].data[]` entries whose `name` identifies the record type
//! (`action`, `command`, `investigator`) and whose `value` holds the record.
//! Failures carry an [`ApiError`] with a code and message; the search
//! endpoint signals end-of-results with [`NO_RESULTS_MESSAGE`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::ClientError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Message the search endpoint uses when a page is empty.
pub const NO_RESULTS_MESSAGE: &str = "no results found";

/// Media type of API responses.
pub const COLLECTION_CONTENT_TYPE: &str = "application/vnd.collection+json";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Top-level API document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Collection body.
    #[serde(default)]
    pub collection: Collection,
}

/// Collection body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    /// Collection+JSON version.
    #[serde(default)]
    pub version: String,
    /// Location of the document.
    #[serde(default)]
    pub href: String,
    /// Records.
    #[serde(default)]
    pub items: Vec<Item>,
    /// Related links.
    #[serde(default)]
    pub links: Vec<Link>,
    /// Error payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

/// One record in a collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Record location.
    #[serde(default)]
    pub href: String,
    /// Named values.
    #[serde(default)]
    pub data: Vec<Data>,
    /// Related links.
    #[serde(default)]
    pub links: Vec<Link>,
}

/// Named value within an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Data {
    /// Record type name.
    pub name: String,
    /// Record content.
    #[serde(default)]
    pub value: Value,
}

/// Hypermedia link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Link relation.
    pub rel: String,
    /// Link target.
    pub href: String,
}

/// Error payload of a failed request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code (often a request identifier).
    #[serde(default)]
    pub code: String,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
}

// ============================================================================
// SECTION: Decoding
// ============================================================================

impl Resource {
    /// Returns the error message, or an empty string.
    #[must_use]
    pub fn error_message(&self) -> &str {
        self.collection.error.as_ref().map_or("", |error| error.message.as_str())
    }

    /// Returns the error code, or an empty string.
    #[must_use]
    pub fn error_code(&self) -> &str {
        self.collection.error.as_ref().map_or("", |error| error.code.as_str())
    }

    /// Returns true when the document reports the end of search results.
    #[must_use]
    pub fn is_no_results(&self) -> bool {
        self.error_message() == NO_RESULTS_MESSAGE
    }

    /// Decodes the first data entry of the first item as a `name` record.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Protocol`] when the document has no items, the
    /// first entry is not a `name` record, or the value does not decode.
    pub fn first_record<T: DeserializeOwned>(&self, name: &str) -> Result<T, ClientError> {
        let data = self
            .collection
            .items
            .first()
            .and_then(|item| item.data.first())
            .ok_or_else(|| ClientError::Protocol(format!("api returned no {name} record")))?;
        if data.name != name {
            return Err(ClientError::Protocol(format!(
                "api returned a {} record where {name} was expected",
                data.name
            )));
        }
        decode_value(name, &data.value)
    }

    /// Decodes every data entry named `name` across all items.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Protocol`] when a matching value does not decode.
    pub fn records<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>, ClientError> {
        self.collection
            .items
            .iter()
            .flat_map(|item| item.data.iter())
            .filter(|data| data.name == name)
            .map(|data| decode_value(name, &data.value))
            .collect()
    }

    /// Builds a single-record document.
    #[must_use]
    pub fn single(href: impl Into<String>, name: impl Into<String>, value: Value) -> Self {
        let href = href.into();
        Self {
            collection: Collection {
                version: "1.0".to_string(),
                href: href.clone(),
                items: vec![Item {
                    href,
                    data: vec![Data {
                        name: name.into(),
                        value,
                    }],
                    links: Vec::new(),
                }],
                links: Vec::new(),
                error: None,
            },
        }
    }
}

/// Decodes a record value.
fn decode_value<T: DeserializeOwned>(name: &str, value: &Value) -> Result<T, ClientError> {
    T::deserialize(value)
        .map_err(|err| ClientError::Protocol(format!("invalid {name} record: {err}")))
}
