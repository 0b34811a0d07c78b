//! Opaque pagination cursors.
//!
//! A cursor is base64(JSON) of the sort mode plus the full sort tuple of
//! the last returned row (primary sort value, published_at, id). Decoding
//! checks the embedded sort mode against the current query; a mismatch
//! invalidates the cursor and pagination restarts from the first page.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::search::query::SortBy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchCursor {
    pub sort_by: String,
    /// Tie-breaker: id of the last row
    pub id: Uuid,
    pub published_at: Option<DateTime<Utc>>,
    pub quality_score: Option<f64>,
    pub search_score: Option<f64>,
}

impl SearchCursor {
    pub fn encode(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json.as_bytes())
    }

    /// Decode a cursor, rejecting malformed input and sort-mode mismatches.
    pub fn decode(encoded: &str, current_sort: SortBy) -> Option<SearchCursor> {
        let bytes = match URL_SAFE_NO_PAD.decode(encoded) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Invalid cursor: not valid base64");
                return None;
            }
        };

        let cursor: SearchCursor = match serde_json::from_slice(&bytes) {
            Ok(cursor) => cursor,
            Err(e) => {
                warn!(error = %e, "Invalid cursor: malformed payload");
                return None;
            }
        };

        if cursor.sort_by != current_sort.as_str() {
            warn!(
                cursor_sort = %cursor.sort_by,
                current_sort = current_sort.as_str(),
                "Cursor sort mode mismatch, ignoring cursor"
            );
            return None;
        }

        Some(cursor)
    }
}
