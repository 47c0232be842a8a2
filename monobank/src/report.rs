//! Per-account cache of fetched statement items and their paginated view.
//!
//! Items are cached under a [`CacheKey`] that leaves out the page number, so
//! paging through a report never triggers another upstream call. Totals are
//! always computed over the whole cached set.

use std::{collections::HashMap, fmt, sync::Arc};

use chrono::DateTime;
use chrono_tz::Tz;
use parking_lot::Mutex;
use tracing::debug;

use crate::{
    model::StatementItem,
    period::{now_in, Period},
};

pub const DEFAULT_PAGE_SIZE: usize = 5;

/// Scope of one cached statement fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub period: Period,
    pub chat_id: i64,
    pub user_id: i64,
    pub client_id: u32,
}

#[derive(Debug)]
pub struct Report {
    account: String,
    tz: Tz,
    page_size: usize,
    cache: Mutex<Cache>,
}

#[derive(Debug, Default)]
struct Cache {
    entries: HashMap<CacheKey, Arc<[StatementItem]>>,
    /// Bumped by every reset.
    generation: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportPage {
    /// Items visible on this page.
    pub items: Vec<StatementItem>,
    pub page: u32,
    pub total_pages: u32,
    /// Absolute sum of every debit in the set.
    pub spent_total: i64,
    /// Sum of absolute amounts across the set.
    pub amount_total: i64,
    pub cashback_total: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageButton {
    pub label: String,
    pub page: u32,
}

impl CacheKey {
    pub fn new(period: Period, chat_id: i64, user_id: i64, client_id: u32) -> Self {
        Self {
            period,
            chat_id,
            user_id,
            client_id,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-report-{}-{}-{}",
            self.period.token(),
            self.chat_id,
            self.user_id,
            self.client_id
        )
    }
}

impl Report {
    pub fn new(account: impl Into<String>, tz: Tz, page_size: usize) -> Self {
        Self {
            account: account.into(),
            tz,
            page_size: page_size.max(1),
            cache: Mutex::new(Cache::default()),
        }
    }

    pub fn is_cached(&self, key: &CacheKey) -> bool {
        self.cache.lock().entries.contains_key(key)
    }

    pub fn cached(&self, key: &CacheKey) -> Option<Arc<[StatementItem]>> {
        self.cache.lock().entries.get(key).cloned()
    }

    /// Current reset generation; pass it to [`Report::set_cache_data_since`]
    /// before starting a fetch.
    pub fn generation(&self) -> u64 {
        self.cache.lock().generation
    }

    /// Unconditionally replaces whatever is stored under `key`.
    pub fn set_cache_data(&self, key: CacheKey, items: impl Into<Arc<[StatementItem]>>) {
        let items = items.into();
        debug!(account = %self.account, %key, count = items.len(), "caching statement");
        self.cache.lock().entries.insert(key, items);
    }

    /// Stores `items` only if no reset happened since `generation` was read.
    pub fn set_cache_data_since(
        &self,
        key: CacheKey,
        items: impl Into<Arc<[StatementItem]>>,
        generation: u64,
    ) -> bool {
        let items = items.into();
        let mut cache = self.cache.lock();
        if cache.generation != generation {
            debug!(account = %self.account, %key, "reset during fetch, not caching");
            return false;
        }
        debug!(account = %self.account, %key, count = items.len(), "caching statement");
        cache.entries.insert(key, items);
        true
    }

    /// Drops every entry whose period still includes "now"; far-past months stay.
    pub fn reset_cache(&self) -> usize {
        self.reset_cache_at(now_in(self.tz))
    }

    pub fn reset_cache_at(&self, now: DateTime<Tz>) -> usize {
        let mut cache = self.cache.lock();
        cache.generation += 1;
        let before = cache.entries.len();
        cache.entries.retain(|key, _| !key.period.is_current(now));
        let removed = before - cache.entries.len();
        debug!(account = %self.account, removed, remaining = cache.entries.len(), "report cache reset");
        removed
    }

    /// Cached page for `key`, if the items are present.
    pub fn page(&self, key: &CacheKey, page: u32) -> Option<ReportPage> {
        let items = self.cached(key)?;
        Some(self.page_of(&items, page))
    }

    pub fn page_of(&self, items: &[StatementItem], page: u32) -> ReportPage {
        build_page(items, page, self.page_size)
    }

    pub fn page_selector(&self, total: usize, current: u32) -> Vec<PageButton> {
        build_page_selector(total, current, self.page_size)
    }
}

pub fn total_pages(total: usize, page_size: usize) -> u32 {
    let page_size = page_size.max(1);
    u32::try_from(total.div_ceil(page_size)).unwrap_or(u32::MAX)
}

/// Windows `items` into the 1-based `page`; out-of-range pages clamp to the nearest end.
pub fn build_page(items: &[StatementItem], page: u32, page_size: usize) -> ReportPage {
    let page_size = page_size.max(1);
    let total_pages = total_pages(items.len(), page_size);
    let page = page.clamp(1, total_pages.max(1));

    let mut spent_total = 0;
    let mut amount_total = 0;
    let mut cashback_total = 0;
    for item in items {
        if item.amount < 0 {
            spent_total += -item.amount;
        }
        amount_total += item.amount.abs();
        cashback_total += item.cashback_amount;
    }

    let start = (page as usize - 1).saturating_mul(page_size).min(items.len());
    let end = start.saturating_add(page_size).min(items.len());

    ReportPage {
        items: items[start..end].to_vec(),
        page,
        total_pages,
        spent_total,
        amount_total,
        cashback_total,
    }
}

/// At most five page buttons around `current`.
///
/// Up to four consecutive pages are shown; `«1` jumps to the first page once
/// the window has scrolled past page 3 and `N»` jumps to the last page while
/// the window has not reached it. Neighbours of the current page carry `‹`/`›`
/// and the current page is shown as `·N·`.
pub fn build_page_selector(total: usize, current: u32, page_size: usize) -> Vec<PageButton> {
    let total_pages = i64::from(total_pages(total, page_size));
    let page = i64::from(current);
    let mut buttons = Vec::new();

    let button = |label: String, page: i64| PageButton {
        label,
        page: u32::try_from(page).unwrap_or_default(),
    };

    if total_pages > 1 {
        let mut start = 1;
        let mut last = total_pages.min(4);

        if page > 3 {
            (start, last) = if page == total_pages {
                (page - 3, page)
            } else if page > total_pages - 2 {
                (page - 2, page)
            } else {
                (page - 1, page + 1)
            };
            buttons.push(button("«1".to_owned(), 1));
        }

        for i in start..=last {
            let label = if i == page {
                format!("·{i}·")
            } else if page > 3 && i == start {
                format!("‹{i}")
            } else if i == last && total_pages > 4 {
                format!("{i}›")
            } else {
                i.to_string()
            };
            buttons.push(button(label, i));
        }
    }

    if page != total_pages && total_pages > 4 {
        let label = if page > total_pages - 2 {
            total_pages.to_string()
        } else {
            format!("{total_pages}»")
        };
        buttons.push(button(label, total_pages));
    }

    buttons
}
