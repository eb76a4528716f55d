//! Drains a paginated bucket listing into a complete key set.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::contract::{ListPage, ListQuery, ObjectStore};
use crate::error::ListError;
use crate::keymap::StorageKey;

pub const DEFAULT_MAX_KEYS: i32 = 1000;
pub const DEFAULT_MAX_PAGES: usize = 10_000;

/// Where the next page of a listing resumes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingCursor {
    pub marker: Option<String>,
    pub is_truncated: bool,
}

impl ListingCursor {
    /// Move past `page`. Prefers the server's `next_marker`, falling back to
    /// the last key of the page for backends that omit it.
    ///
    /// Returns `false` when the page is truncated but the cursor could not
    /// move forward.
    pub fn advance(&mut self, page: &ListPage) -> bool {
        self.is_truncated = page.is_truncated;
        if !page.is_truncated {
            return true;
        }
        let next = page
            .next_marker
            .clone()
            .or_else(|| page.keys.last().cloned());
        match next {
            Some(marker) if self.marker.as_deref() != Some(marker.as_str()) => {
                self.marker = Some(marker);
                true
            }
            _ => false,
        }
    }
}

/// Eager listing of every key under an optional prefix.
#[derive(Debug, Clone)]
pub struct PaginatedLister {
    max_keys: i32,
    max_pages: usize,
}

impl Default for PaginatedLister {
    fn default() -> Self {
        Self {
            max_keys: DEFAULT_MAX_KEYS,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

impl PaginatedLister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Page size requested from the backend.
    pub fn with_max_keys(mut self, max_keys: i32) -> Self {
        self.max_keys = max_keys.max(1);
        self
    }

    /// Hard cap on the number of pages fetched.
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// All keys in `bucket` under `prefix`, in arrival order, without
    /// duplicates.
    pub async fn list_all<S: ObjectStore + ?Sized>(
        &self,
        store: &S,
        bucket: &str,
        prefix: Option<&str>,
    ) -> Result<Vec<StorageKey>, ListError> {
        let mut cursor = ListingCursor::default();
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        let mut pages = 0;

        loop {
            if pages >= self.max_pages {
                warn!(bucket, pages, "Listing page cap reached");
                return Err(ListError::TooManyPages { pages });
            }
            let query = ListQuery {
                prefix: prefix.map(str::to_owned),
                delimiter: None,
                marker: cursor.marker.clone(),
                max_keys: self.max_keys,
            };
            let page = store.list_objects(bucket, &query).await?;
            pages += 1;
            debug!(
                bucket,
                page = pages,
                keys = page.keys.len(),
                truncated = page.is_truncated,
                "Fetched listing page"
            );

            let progressed = cursor.advance(&page);
            for key in page.keys {
                if seen.insert(key.clone()) {
                    keys.push(StorageKey::from(key));
                }
            }

            if !cursor.is_truncated {
                break;
            }
            if !progressed {
                warn!(bucket, marker = ?cursor.marker, pages, "Listing cursor did not advance");
                return Err(ListError::Stalled {
                    marker: cursor.marker,
                    pages,
                });
            }
        }

        info!(bucket, keys = keys.len(), pages, "Listed bucket");
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(keys: &[&str], truncated: bool, next: Option<&str>) -> ListPage {
        ListPage {
            keys: keys.iter().map(|k| k.to_string()).collect(),
            is_truncated: truncated,
            next_marker: next.map(str::to_owned),
        }
    }

    #[test]
    fn cursor_prefers_next_marker() {
        let mut cursor = ListingCursor::default();
        assert!(cursor.advance(&page(&["a", "b"], true, Some("zz"))));
        assert_eq!(cursor.marker.as_deref(), Some("zz"));
    }

    #[test]
    fn cursor_falls_back_to_last_key() {
        let mut cursor = ListingCursor::default();
        assert!(cursor.advance(&page(&["a", "b"], true, None)));
        assert_eq!(cursor.marker.as_deref(), Some("b"));
    }

    #[test]
    fn cursor_refuses_to_stand_still() {
        let mut cursor = ListingCursor {
            marker: Some("b".into()),
            is_truncated: true,
        };
        assert!(!cursor.advance(&page(&["a", "b"], true, None)));
        assert!(!cursor.advance(&page(&[], true, None)));
    }

    #[test]
    fn final_page_ends_listing() {
        let mut cursor = ListingCursor::default();
        assert!(cursor.advance(&page(&["a"], false, None)));
        assert!(!cursor.is_truncated);
    }
}
