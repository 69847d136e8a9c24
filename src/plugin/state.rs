//! Persisted plugin state
//!
//! The blob is a small JSON document. Its bytes are not stable across
//! versions, only round-trippable within one format.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::StateError;

pub const STATE_FORMAT: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub format: u32,
    pub params: BTreeMap<String, bool>,
}

impl PersistedState {
    pub fn new(params: BTreeMap<String, bool>) -> Self {
        Self {
            format: STATE_FORMAT,
            params,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        // A map of strings to bools always serializes
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, StateError> {
        let state: Self = serde_json::from_slice(data)?;
        if state.format != STATE_FORMAT {
            return Err(StateError::UnsupportedFormat(state.format));
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let state = PersistedState::new(BTreeMap::from([("InOut".to_string(), true)]));
        let restored = PersistedState::from_bytes(&state.to_bytes()).unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn test_rejects_garbage_and_other_formats() {
        assert!(matches!(
            PersistedState::from_bytes(b"\x00\x01not json"),
            Err(StateError::Malformed(_))
        ));
        assert!(matches!(
            PersistedState::from_bytes(br#"{"format":7,"params":{}}"#),
            Err(StateError::UnsupportedFormat(7))
        ));
    }
}
