//! Pagination over unstable listing endpoints
//!
//! Two cursor flavors share one contract:
//! - [`NumberedPager`] increments an integer page and stops when a batch
//!   comes back smaller than the requested page size
//! - [`CursorPager`] threads an opaque offset and stops when the server
//!   omits the next one
//!
//! Fetch closures are expected to be retry-wrapped and return `Option`: a
//! `None` page means the retry budget ran out, which the pager treats as
//! end-of-stream rather than an error, so everything collected so far is
//! still delivered. Both pagers are lazy pull streams (`next_batch`), which
//! lets the moments flow dispatch each listing page before requesting the
//! next one; `collect` drains a pager for the flows that want the full list.

use std::future::Future;
use std::marker::PhantomData;
use std::time::Duration;

/// Shared pagination settings.
///
/// Pages before `start_page` are still fetched (cursors have to be walked
/// sequentially) but their items are discarded; `max_pages` bounds how many
/// pages past the start are yielded. The inter-page delay is light server
/// courtesy, not a correctness requirement.
#[derive(Debug, Clone)]
pub struct PagerSettings {
    pub inter_page_delay: Duration,
    pub start_page: u32,
    pub max_pages: Option<u32>,
}

impl Default for PagerSettings {
    fn default() -> Self {
        Self {
            inter_page_delay: Duration::from_millis(500),
            start_page: 1,
            max_pages: None,
        }
    }
}

impl PagerSettings {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            inter_page_delay: delay,
            ..Self::default()
        }
    }
}

/// Page-number pagination: stop on the first short batch.
pub struct NumberedPager<T, F, Fut> {
    fetch: F,
    settings: PagerSettings,
    page_size: usize,
    next_page: u32,
    pages_yielded: u32,
    fetched_any: bool,
    done: bool,
    _marker: PhantomData<fn() -> (T, Fut)>,
}

impl<T, F, Fut> NumberedPager<T, F, Fut>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Option<Vec<T>>>,
{
    pub fn new(page_size: usize, settings: PagerSettings, fetch: F) -> Self {
        Self {
            fetch,
            settings,
            page_size,
            next_page: 1,
            pages_yielded: 0,
            fetched_any: false,
            done: false,
            _marker: PhantomData,
        }
    }

    /// Fetches forward until the next non-discarded batch is available.
    pub async fn next_batch(&mut self) -> Option<Vec<T>> {
        loop {
            if self.done {
                return None;
            }
            if let Some(max) = self.settings.max_pages {
                if self.pages_yielded >= max {
                    self.done = true;
                    return None;
                }
            }

            if self.fetched_any && !self.settings.inter_page_delay.is_zero() {
                tokio::time::sleep(self.settings.inter_page_delay).await;
            }

            let page = self.next_page;
            let batch = match (self.fetch)(page).await {
                Some(batch) => batch,
                None => {
                    // Retries exhausted upstream: keep what we have
                    self.done = true;
                    return None;
                }
            };
            self.fetched_any = true;
            self.next_page += 1;

            if batch.len() < self.page_size {
                self.done = true;
            }
            if batch.is_empty() {
                return None;
            }
            if page < self.settings.start_page {
                continue;
            }

            self.pages_yielded += 1;
            return Some(batch);
        }
    }

    /// Drains the pager into one list.
    pub async fn collect(mut self) -> Vec<T> {
        let mut all = Vec::new();
        while let Some(batch) = self.next_batch().await {
            all.extend(batch);
        }
        all
    }
}

/// One fetched page of an opaque-offset listing.
#[derive(Debug)]
pub struct CursorBatch<T> {
    pub items: Vec<T>,
    /// Offset for the following page; `None` or empty signals exhaustion
    pub next: Option<String>,
}

/// Opaque-offset pagination: stop when the server stops handing out offsets.
pub struct CursorPager<T, F, Fut> {
    fetch: F,
    settings: PagerSettings,
    cursor: String,
    page: u32,
    pages_yielded: u32,
    fetched_any: bool,
    done: bool,
    _marker: PhantomData<fn() -> (T, Fut)>,
}

impl<T, F, Fut> CursorPager<T, F, Fut>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Option<CursorBatch<T>>>,
{
    pub fn new(settings: PagerSettings, fetch: F) -> Self {
        Self {
            fetch,
            settings,
            cursor: String::new(),
            page: 1,
            pages_yielded: 0,
            fetched_any: false,
            done: false,
            _marker: PhantomData,
        }
    }

    pub async fn next_batch(&mut self) -> Option<Vec<T>> {
        loop {
            if self.done {
                return None;
            }
            if let Some(max) = self.settings.max_pages {
                if self.pages_yielded >= max {
                    self.done = true;
                    return None;
                }
            }

            if self.fetched_any && !self.settings.inter_page_delay.is_zero() {
                tokio::time::sleep(self.settings.inter_page_delay).await;
            }

            let batch = match (self.fetch)(self.cursor.clone()).await {
                Some(batch) => batch,
                None => {
                    self.done = true;
                    return None;
                }
            };
            self.fetched_any = true;
            let page = self.page;
            self.page += 1;

            match batch.next {
                Some(next) if !next.is_empty() => self.cursor = next,
                _ => self.done = true,
            }
            if batch.items.is_empty() {
                self.done = true;
                return None;
            }
            if page < self.settings.start_page {
                continue;
            }

            self.pages_yielded += 1;
            return Some(batch.items);
        }
    }

    pub async fn collect(mut self) -> Vec<T> {
        let mut all = Vec::new();
        while let Some(batch) = self.next_batch().await {
            all.extend(batch);
        }
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn no_delay() -> PagerSettings {
        PagerSettings {
            inter_page_delay: Duration::ZERO,
            start_page: 1,
            max_pages: None,
        }
    }

    #[tokio::test]
    async fn test_numbered_stops_on_short_batch() {
        // Pages of 5, 5, then 2: the short page ends the stream with no
        // further fetch.
        let calls = Cell::new(0u32);
        let pager = NumberedPager::new(5, no_delay(), |pn| {
            calls.set(calls.get() + 1);
            async move {
                Some(match pn {
                    1 | 2 => vec![pn; 5],
                    3 => vec![pn; 2],
                    _ => panic!("page {} should never be requested", pn),
                })
            }
        });

        let items = pager.collect().await;
        assert_eq!(items.len(), 12);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_numbered_stops_on_empty_batch() {
        let pager = NumberedPager::new(5, no_delay(), |pn| async move {
            Some(if pn == 1 { vec![1u32; 5] } else { vec![] })
        });
        assert_eq!(pager.collect().await.len(), 5);
    }

    #[tokio::test]
    async fn test_numbered_treats_none_as_end_of_stream() {
        // Page 2 exhausts its retries: the items from page 1 survive.
        let pager = NumberedPager::new(3, no_delay(), |pn| async move {
            if pn == 1 {
                Some(vec![10u32, 20, 30])
            } else {
                None
            }
        });
        assert_eq!(pager.collect().await, vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn test_numbered_start_page_discards_earlier_items() {
        let fetched = Cell::new(0u32);
        let settings = PagerSettings {
            start_page: 3,
            ..no_delay()
        };
        let pager = NumberedPager::new(2, settings, |pn| {
            fetched.set(fetched.get() + 1);
            async move { Some(if pn <= 4 { vec![pn, pn] } else { vec![] }) }
        });

        let items = pager.collect().await;
        // Pages 1 and 2 were fetched but discarded
        assert_eq!(items, vec![3, 3, 4, 4]);
        assert_eq!(fetched.get(), 5);
    }

    #[tokio::test]
    async fn test_numbered_max_pages_limits_collection() {
        let settings = PagerSettings {
            max_pages: Some(2),
            ..no_delay()
        };
        let pager = NumberedPager::new(2, settings, |pn| async move { Some(vec![pn, pn]) });
        assert_eq!(pager.collect().await, vec![1, 1, 2, 2]);
    }

    #[tokio::test]
    async fn test_cursor_follows_offsets_until_omitted() {
        let mut pager = CursorPager::new(no_delay(), |offset: String| async move {
            Some(match offset.as_str() {
                "" => CursorBatch {
                    items: vec!["a"],
                    next: Some("c1".to_string()),
                },
                "c1" => CursorBatch {
                    items: vec!["b"],
                    next: Some("c2".to_string()),
                },
                "c2" => CursorBatch {
                    items: vec!["c"],
                    next: None,
                },
                other => panic!("unexpected offset {}", other),
            })
        });

        assert_eq!(pager.next_batch().await, Some(vec!["a"]));
        assert_eq!(pager.next_batch().await, Some(vec!["b"]));
        assert_eq!(pager.next_batch().await, Some(vec!["c"]));
        assert_eq!(pager.next_batch().await, None);
    }

    #[tokio::test]
    async fn test_cursor_empty_next_ends_stream() {
        let pager = CursorPager::new(no_delay(), |offset: String| async move {
            assert_eq!(offset, "");
            Some(CursorBatch {
                items: vec![1],
                next: Some(String::new()),
            })
        });
        assert_eq!(pager.collect().await, vec![1]);
    }

    #[tokio::test]
    async fn test_cursor_none_page_keeps_partial_results() {
        let mut pager = CursorPager::new(no_delay(), |offset: String| async move {
            if offset.is_empty() {
                Some(CursorBatch {
                    items: vec![1, 2],
                    next: Some("x".to_string()),
                })
            } else {
                None
            }
        });
        assert_eq!(pager.next_batch().await, Some(vec![1, 2]));
        assert_eq!(pager.next_batch().await, None);
    }
}
