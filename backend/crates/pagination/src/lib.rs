//! Opaque cursor and page envelope primitives shared by paginated endpoints.
//!
//! A [`Cursor`] wraps an ordering key (for example `(created_at, id)`) and
//! encodes it as URL-safe base64 JSON so clients treat it as an opaque token.
//! [`Page`] is the response envelope: the items, the effective limit, the next
//! cursor when more data exists, and navigation links.
//!
//! Repositories fetch `limit + 1` rows; [`Page::from_overfetched`] trims the
//! extra row and derives the next cursor from the last item kept.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Page size used when the client does not request one.
pub const DEFAULT_LIMIT: usize = 20;

/// Largest page size a client may request.
pub const MAX_LIMIT: usize = 100;

const CURSOR_PARAM: &str = "cursor";
const LIMIT_PARAM: &str = "limit";

/// Errors raised while encoding or decoding cursors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CursorError {
    /// The token is not valid URL-safe base64.
    #[error("cursor is not valid base64")]
    Encoding,
    /// The decoded token does not describe a valid key.
    #[error("cursor payload is malformed: {message}")]
    Payload {
        /// Decoder error text.
        message: String,
    },
    /// The key could not be serialised.
    #[error("cursor key could not be serialised: {message}")]
    Serialize {
        /// Encoder error text.
        message: String,
    },
}

/// Opaque position within an ordered listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor<K> {
    key: K,
}

impl<K> Cursor<K> {
    /// Wrap an ordering key.
    #[must_use]
    pub const fn new(key: K) -> Self {
        Self { key }
    }

    /// Borrow the ordering key.
    #[must_use]
    pub const fn key(&self) -> &K {
        &self.key
    }

    /// Consume the cursor, returning its key.
    #[must_use]
    pub fn into_key(self) -> K {
        self.key
    }
}

impl<K: Serialize> Cursor<K> {
    /// Encode the cursor as an opaque token.
    ///
    /// # Errors
    ///
    /// Returns [`CursorError::Serialize`] when the key cannot be serialised.
    pub fn encode(&self) -> Result<String, CursorError> {
        let json = serde_json::to_vec(&self.key).map_err(|err| CursorError::Serialize {
            message: err.to_string(),
        })?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }
}

impl<K: DeserializeOwned> Cursor<K> {
    /// Decode an opaque token produced by [`Cursor::encode`].
    ///
    /// # Errors
    ///
    /// Returns [`CursorError::Encoding`] for invalid base64 and
    /// [`CursorError::Payload`] when the JSON does not match `K`.
    pub fn decode(token: &str) -> Result<Self, CursorError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| CursorError::Encoding)?;
        let key = serde_json::from_slice(&bytes).map_err(|err| CursorError::Payload {
            message: err.to_string(),
        })?;
        Ok(Self { key })
    }
}

/// Errors raised while validating page parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PageParamsError {
    /// The requested limit was zero.
    #[error("limit must be at least 1")]
    ZeroLimit,
}

/// Validated page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageParams {
    cursor: Option<String>,
    limit: usize,
}

impl PageParams {
    /// Validate raw query parameters.
    ///
    /// A missing limit becomes [`DEFAULT_LIMIT`]; limits above [`MAX_LIMIT`]
    /// are clamped. Blank cursors are treated as absent.
    ///
    /// # Errors
    ///
    /// Returns [`PageParamsError::ZeroLimit`] when `limit` is zero.
    pub fn new(cursor: Option<String>, limit: Option<usize>) -> Result<Self, PageParamsError> {
        let effective = limit.unwrap_or(DEFAULT_LIMIT);
        if effective == 0 {
            return Err(PageParamsError::ZeroLimit);
        }
        Ok(Self {
            cursor: cursor.filter(|token| !token.trim().is_empty()),
            limit: effective.min(MAX_LIMIT),
        })
    }

    /// Opaque cursor token, if any.
    #[must_use]
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    /// Effective page size.
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Number of rows a repository should fetch to detect a following page.
    #[must_use]
    pub const fn fetch_limit(&self) -> usize {
        self.limit.saturating_add(1)
    }
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            cursor: None,
            limit: DEFAULT_LIMIT,
        }
    }
}

/// Navigation links for a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLinks {
    /// Link to the current page.
    #[serde(rename = "self")]
    pub current: String,
    /// Link to the following page, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

/// Paginated response envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// Items on this page.
    pub data: Vec<T>,
    /// Effective page size.
    pub limit: usize,
    /// Cursor for the following page, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    /// Navigation links.
    pub links: PageLinks,
}

impl<T> Page<T> {
    /// Build a page from up to `limit + 1` rows.
    ///
    /// The extra row only signals that another page exists and is dropped.
    /// `key_of` extracts the ordering key of the last row kept. Links are
    /// derived from `request_url`, preserving its other query parameters.
    ///
    /// # Errors
    ///
    /// Returns [`CursorError`] when the next cursor cannot be encoded.
    pub fn from_overfetched<K, F>(
        mut rows: Vec<T>,
        params: &PageParams,
        request_url: &Url,
        key_of: F,
    ) -> Result<Self, CursorError>
    where
        K: Serialize,
        F: Fn(&T) -> K,
    {
        let has_more = rows.len() > params.limit();
        rows.truncate(params.limit());
        let next_cursor = match rows.last() {
            Some(last) if has_more => Some(Cursor::new(key_of(last)).encode()?),
            _ => None,
        };
        let links = PageLinks {
            current: link_with(request_url, params.cursor(), params.limit()),
            next: next_cursor
                .as_deref()
                .map(|token| link_with(request_url, Some(token), params.limit())),
        };
        Ok(Self {
            data: rows,
            limit: params.limit(),
            next_cursor,
            links,
        })
    }

    /// Transform every item while keeping the envelope.
    #[must_use]
    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            data: self.data.into_iter().map(f).collect(),
            limit: self.limit,
            next_cursor: self.next_cursor,
            links: self.links,
        }
    }
}

fn link_with(base: &Url, cursor: Option<&str>, limit: usize) -> String {
    let retained: Vec<(String, String)> = base
        .query_pairs()
        .filter(|(name, _)| name != CURSOR_PARAM && name != LIMIT_PARAM)
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();
    let mut link = base.clone();
    {
        let mut pairs = link.query_pairs_mut();
        pairs.clear();
        for (name, value) in &retained {
            pairs.append_pair(name, value);
        }
        if let Some(token) = cursor {
            pairs.append_pair(CURSOR_PARAM, token);
        }
        pairs.append_pair(LIMIT_PARAM, &limit.to_string());
    }
    link.to_string()
}

#[cfg(test)]
mod tests {
    //! Unit coverage for cursor encoding and page assembly.

    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn request_url() -> Url {
        Url::parse("http://localhost/api/v1/items?accountId=abc&limit=2")
            .unwrap_or_else(|err| panic!("fixture url must parse: {err}"))
    }

    #[rstest]
    fn cursor_decodes_what_it_encodes() {
        let cursor = Cursor::new(("2026-01-01T00:00:00Z".to_owned(), 42_u32));
        let token = cursor
            .encode()
            .unwrap_or_else(|err| panic!("encode failed: {err}"));
        let decoded: Cursor<(String, u32)> =
            Cursor::decode(&token).unwrap_or_else(|err| panic!("decode failed: {err}"));
        assert_eq!(decoded, cursor);
    }

    #[rstest]
    #[case("%%%", CursorError::Encoding)]
    fn rejects_invalid_tokens(#[case] token: &str, #[case] expected: CursorError) {
        let result: Result<Cursor<u32>, _> = Cursor::decode(token);
        assert_eq!(result.err(), Some(expected));
    }

    #[rstest]
    fn rejects_mismatched_payloads() {
        let token = URL_SAFE_NO_PAD.encode(b"\"text\"");
        let result: Result<Cursor<u32>, _> = Cursor::decode(&token);
        assert!(matches!(result, Err(CursorError::Payload { .. })));
    }

    #[rstest]
    #[case(None, Ok(DEFAULT_LIMIT))]
    #[case(Some(5), Ok(5))]
    #[case(Some(1_000), Ok(MAX_LIMIT))]
    #[case(Some(0), Err(PageParamsError::ZeroLimit))]
    fn page_params_normalise_limits(
        #[case] requested: Option<usize>,
        #[case] expected: Result<usize, PageParamsError>,
    ) {
        let result = PageParams::new(None, requested).map(|params| params.limit());
        assert_eq!(result, expected);
    }

    #[rstest]
    fn overfetched_rows_produce_next_cursor(request_url: Url) {
        let params =
            PageParams::new(None, Some(2)).unwrap_or_else(|err| panic!("valid params: {err}"));
        let page = Page::from_overfetched(vec![30_u32, 20, 10], &params, &request_url, |n| *n)
            .unwrap_or_else(|err| panic!("page assembly failed: {err}"));

        assert_eq!(page.data, vec![30, 20]);
        let token = page.next_cursor.clone().unwrap_or_default();
        let decoded: Cursor<u32> =
            Cursor::decode(&token).unwrap_or_else(|err| panic!("decode failed: {err}"));
        assert_eq!(*decoded.key(), 20);
        let next = page.links.next.unwrap_or_default();
        assert!(next.contains("accountId=abc"));
        assert!(next.contains("cursor="));
        assert!(next.ends_with("limit=2"));
    }

    #[rstest]
    fn final_page_has_no_next_link(request_url: Url) {
        let params =
            PageParams::new(None, Some(5)).unwrap_or_else(|err| panic!("valid params: {err}"));
        let page = Page::from_overfetched(vec![1_u32, 2], &params, &request_url, |n| *n)
            .unwrap_or_else(|err| panic!("page assembly failed: {err}"))
            .map(|n| n * 10);

        assert_eq!(page.data, vec![10, 20]);
        assert!(page.next_cursor.is_none());
        assert!(page.links.next.is_none());
        assert!(page.links.current.ends_with("limit=5"));
    }
}
