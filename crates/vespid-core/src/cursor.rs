// SPDX-License-Identifier: MIT OR Apache-2.0
//! Opaque pagination cursors.
//!
//! A cursor is `base64url(JSON)` of either `{createdAt, id}` (descending
//! lists) or `{seq}` (session events, ascending). Clients treat it as
//! opaque; an unparseable cursor is a 400.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Cursor decode failure; maps to 400 at the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid pagination cursor")]
pub struct CursorError;

/// A decoded pagination cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cursor {
    /// Position in a `(created_at, id)`-descending list.
    #[serde(rename_all = "camelCase")]
    CreatedAt {
        /// Creation instant of the last row of the previous page.
        created_at: DateTime<Utc>,
        /// Row id, tie-breaking equal instants.
        id: Uuid,
    },
    /// Position in a seq-ascending event list.
    Seq {
        /// Last seq of the previous page.
        seq: i64,
    },
}

impl Cursor {
    /// Encode into the opaque wire form.
    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(self).expect("cursor serializes"))
    }

    /// Decode the opaque wire form.
    pub fn decode(raw: &str) -> Result<Self, CursorError> {
        let bytes = URL_SAFE_NO_PAD.decode(raw).map_err(|_| CursorError)?;
        serde_json::from_slice(&bytes).map_err(|_| CursorError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_at_cursor_round_trips() {
        let cursor = Cursor::CreatedAt {
            created_at: Utc::now(),
            id: Uuid::new_v4(),
        };
        let decoded = Cursor::decode(&cursor.encode()).unwrap();
        assert_eq!(decoded, cursor);
    }

    #[test]
    fn seq_cursor_round_trips() {
        let cursor = Cursor::Seq { seq: 41 };
        assert_eq!(Cursor::decode(&cursor.encode()).unwrap(), cursor);
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(Cursor::decode("!!!"), Err(CursorError));
        let not_json = URL_SAFE_NO_PAD.encode(b"plain text");
        assert_eq!(Cursor::decode(&not_json), Err(CursorError));
    }
}
