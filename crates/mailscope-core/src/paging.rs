//! Pagination over the cached order.

use std::fmt::Write as _;
use std::sync::Arc;

use thiserror::Error;

use crate::Result;
use crate::cache::OrderedCache;
use crate::config::PagingConfig;
use crate::model::MessageSummary;
use crate::search::ValidationError;

/// A page that cannot be served.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PageError {
    /// The cache is empty; nothing has been listed or searched yet.
    #[error("No emails loaded yet; list or search a folder first")]
    NothingLoaded,

    /// The page number is past the last page.
    #[error("Page {page} is out of range; there are {total_pages} pages")]
    OutOfRange {
        /// Requested page.
        page: usize,
        /// Number of pages available.
        total_pages: usize,
    },
}

/// Position of a page within the whole listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInfo {
    /// 1-based page number.
    pub page: usize,
    /// Effective page size after clamping.
    pub page_size: usize,
    /// Number of cached messages.
    pub total_items: usize,
    /// `ceil(total_items / page_size)`.
    pub total_pages: usize,
}

impl PageInfo {
    /// Position (1-based) of the first item on this page.
    #[must_use]
    pub const fn first_position(&self) -> usize {
        (self.page - 1) * self.page_size + 1
    }

    /// Returns true if another page follows.
    #[must_use]
    pub const fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

/// One page of messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Messages on this page, newest first.
    pub items: Vec<Arc<MessageSummary>>,
    /// Page arithmetic.
    pub info: PageInfo,
}

impl Page {
    /// Renders a header and one numbered line per message.
    #[must_use]
    pub fn render(&self) -> String {
        let info = &self.info;
        let mut out = format!(
            "Page {} of {} ({} emails)\n",
            info.page, info.total_pages, info.total_items
        );
        for (offset, message) in self.items.iter().enumerate() {
            out.push_str(&message.render_line(info.first_position() + offset));
            out.push('\n');
        }
        if info.has_next() {
            let _ = writeln!(out, "Next: page {}", info.page + 1);
        }
        out
    }
}

/// Serves page `page` of `page_size` messages from `cache`.
///
/// Page sizes above the configured maximum are clamped to it.
///
/// # Errors
///
/// Returns [`crate::Error::Validation`] for a zero page or page size, and
/// [`crate::Error::Page`] for an empty cache or a page past the end.
pub fn page(cache: &OrderedCache, page: usize, page_size: usize, config: &PagingConfig) -> Result<Page> {
    if page == 0 {
        return Err(ValidationError::ZeroPage.into());
    }
    if page_size == 0 {
        return Err(ValidationError::ZeroPageSize.into());
    }
    let page_size = page_size.min(config.max_page_size.max(1));

    let ids = cache.ordered_ids();
    let total_items = ids.len();
    if total_items == 0 {
        return Err(PageError::NothingLoaded.into());
    }

    let total_pages = total_items.div_ceil(page_size);
    if page > total_pages {
        return Err(PageError::OutOfRange { page, total_pages }.into());
    }

    let start = (page - 1) * page_size;
    let end = (start + page_size).min(total_items);
    Ok(Page {
        items: cache.get_many(&ids[start..end]),
        info: PageInfo {
            page,
            page_size,
            total_items,
            total_pages,
        },
    })
}
