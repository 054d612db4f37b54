//! Page tokens and count results.
//!
//! Tokens are opaque to clients: a URL-safe base64 wrapper around a small
//! JSON payload. They are minted after a page is produced, consumed by
//! the next request, and never stored server-side.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use feature_common::{FeatureError, FeatureResult};
use feature_query::FeatureQuery;
use sql_dialect::KeysetCursor;

/// A decoded page token.
#[derive(Debug, Clone, PartialEq)]
pub enum PageToken {
    /// Stateless offset continuation (OGC API Features).
    Offset { offset: u64, limit: u32 },
    /// Keyset continuation (STAC-style catalog search).
    Keyset(KeysetCursor),
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
enum TokenRepr {
    Offset { offset: u64, limit: u32 },
    Keyset { collection: String, item: String },
}

impl PageToken {
    /// The token for the page after `query`, offset mode.
    pub fn next_offset(query: &FeatureQuery) -> Self {
        PageToken::Offset {
            offset: query.offset + query.limit as u64,
            limit: query.limit,
        }
    }

    /// The token continuing after the last emitted row, keyset mode.
    pub fn next_keyset(collection_id: impl Into<String>, item_id: impl Into<String>) -> Self {
        PageToken::Keyset(KeysetCursor {
            collection_id: collection_id.into(),
            item_id: item_id.into(),
        })
    }

    /// Encode to the opaque wire form.
    pub fn encode(&self) -> String {
        let repr = match self {
            PageToken::Offset { offset, limit } => TokenRepr::Offset {
                offset: *offset,
                limit: *limit,
            },
            PageToken::Keyset(cursor) => TokenRepr::Keyset {
                collection: cursor.collection_id.clone(),
                item: cursor.item_id.clone(),
            },
        };
        let json = serde_json::to_vec(&repr).expect("token repr serializes");
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Decode a client-supplied token.
    pub fn decode(token: &str) -> FeatureResult<Self> {
        let invalid =
            || FeatureError::invalid_parameter("token", "malformed or truncated page token");
        let bytes = URL_SAFE_NO_PAD.decode(token).map_err(|_| invalid())?;
        let repr: TokenRepr = serde_json::from_slice(&bytes).map_err(|_| invalid())?;
        Ok(match repr {
            TokenRepr::Offset { offset, limit } => PageToken::Offset { offset, limit },
            TokenRepr::Keyset { collection, item } => PageToken::Keyset(KeysetCursor {
                collection_id: collection,
                item_id: item,
            }),
        })
    }
}

/// Outcome of a count request.
///
/// `Estimated` comes from catalog statistics when the exact count would
/// exceed its time budget or the table is past the configured row
/// threshold; `Skipped` means neither completed in budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountResult {
    Exact(u64),
    Estimated(u64),
    Skipped,
}

impl CountResult {
    /// The numeric value, when one is known.
    pub fn value(&self) -> Option<u64> {
        match self {
            CountResult::Exact(n) | CountResult::Estimated(n) => Some(*n),
            CountResult::Skipped => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feature_common::Crs;
    use feature_query::ResultType;

    fn query(offset: u64, limit: u32) -> FeatureQuery {
        FeatureQuery {
            limit,
            offset,
            bbox: None,
            temporal: None,
            result_type: ResultType::Results,
            property_names: None,
            sort_orders: None,
            filter: None,
            crs: Crs::default_crs(),
        }
    }

    #[test]
    fn test_offset_token_round_trip() {
        let token = PageToken::next_offset(&query(40, 20)).encode();
        assert_eq!(
            PageToken::decode(&token).unwrap(),
            PageToken::Offset {
                offset: 60,
                limit: 20
            }
        );
    }

    #[test]
    fn test_keyset_token_round_trip() {
        let token = PageToken::next_keyset("roads", "item-42").encode();
        match PageToken::decode(&token).unwrap() {
            PageToken::Keyset(cursor) => {
                assert_eq!(cursor.collection_id, "roads");
                assert_eq!(cursor.item_id, "item-42");
            }
            other => panic!("expected keyset, got {:?}", other),
        }
    }

    #[test]
    fn test_token_survives_awkward_ids() {
        let token = PageToken::next_keyset("col:with/sep", "id\nwith:stuff").encode();
        match PageToken::decode(&token).unwrap() {
            PageToken::Keyset(cursor) => assert_eq!(cursor.item_id, "id\nwith:stuff"),
            other => panic!("expected keyset, got {:?}", other),
        }
    }

    #[test]
    fn test_garbage_token_rejected() {
        for bad in ["not-base64!!", "", "YWJj"] {
            let err = PageToken::decode(bad).unwrap_err();
            assert_eq!(err.parameter(), Some("token"), "input {:?}", bad);
        }
    }

    #[test]
    fn test_count_result_value() {
        assert_eq!(CountResult::Exact(5).value(), Some(5));
        assert_eq!(CountResult::Estimated(100).value(), Some(100));
        assert_eq!(CountResult::Skipped.value(), None);
    }
}
