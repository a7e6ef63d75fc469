//! Payload serialization for accepted events.
//!
//! Encodes a billing event into the canonical JSON payload POSTed to the
//! endpoint. Encoding is deterministic (field order is fixed by the struct
//! definition) so duplicate bus deliveries of the same event produce
//! byte-identical payloads.

use billhook_core::BillingEvent;
use bytes::Bytes;

use crate::error::{DispatchError, Result};

/// Upper bound on object identifier length accepted into a payload.
const MAX_OBJECT_ID_LEN: usize = 256;

/// Serializes an event into its notification payload.
///
/// # Errors
///
/// Returns `DispatchError::Serialization` when the event carries a malformed
/// object identifier (empty, oversized, or containing control characters).
/// Serialization failures are data-shaped, never transient: the caller logs
/// the error and drops the event without retry.
pub fn serialize(event: &BillingEvent) -> Result<Bytes> {
    validate_object_id(event.object_id.as_str())?;

    let encoded = serde_json::to_vec(event)
        .map_err(|e| DispatchError::serialization(format!("failed to encode event: {e}")))?;

    Ok(Bytes::from(encoded))
}

/// Rejects identifiers that cannot safely appear in a payload.
fn validate_object_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(DispatchError::serialization("object id is empty"));
    }
    if id.len() > MAX_OBJECT_ID_LEN {
        return Err(DispatchError::serialization(format!(
            "object id exceeds {MAX_OBJECT_ID_LEN} bytes ({} bytes)",
            id.len()
        )));
    }
    if id.chars().any(char::is_control) {
        return Err(DispatchError::serialization("object id contains control characters"));
    }
    Ok(())
}
