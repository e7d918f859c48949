use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use domain::{CustomerId, Money, Order, OrderStatus};
use serde::{Deserialize, Serialize};

/// Page size used when a request doesn't set one.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Largest page size a request may ask for.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Criteria an order must match to be listed. All set fields must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub customer_id: Option<CustomerId>,

    /// Minimum total price (inclusive).
    pub min_total: Option<Money>,

    /// Maximum total price (inclusive).
    pub max_total: Option<Money>,

    /// Orders created at or after this instant.
    pub created_from: Option<DateTime<Utc>>,

    /// Orders created at or before this instant.
    pub created_to: Option<DateTime<Utc>>,

    /// Orders last updated at or after this instant.
    pub updated_from: Option<DateTime<Utc>>,

    /// Orders last updated at or before this instant.
    pub updated_to: Option<DateTime<Utc>>,
}

impl OrderFilter {
    /// Checks an order against every set criterion.
    pub fn matches(&self, order: &Order) -> bool {
        self.status.is_none_or(|status| order.status() == status)
            && self.customer_id.is_none_or(|id| order.customer_id() == id)
            && self.min_total.is_none_or(|min| order.total_price() >= min)
            && self.max_total.is_none_or(|max| order.total_price() <= max)
            && self.created_from.is_none_or(|from| order.created_at() >= from)
            && self.created_to.is_none_or(|to| order.created_at() <= to)
            && self.updated_from.is_none_or(|from| order.updated_at() >= from)
            && self.updated_to.is_none_or(|to| order.updated_at() <= to)
    }
}

/// Listing order. Ties are broken by order ID so pages are stable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSort {
    CreatedAsc,
    #[default]
    CreatedDesc,
    CustomerAsc,
    CustomerDesc,
    TotalAsc,
    TotalDesc,
    IdAsc,
    IdDesc,
}

impl OrderSort {
    /// Compares two orders under this sort, including the ID tie-break.
    pub fn compare(&self, a: &Order, b: &Order) -> Ordering {
        let primary = match self {
            OrderSort::CreatedAsc => a.created_at().cmp(&b.created_at()),
            OrderSort::CreatedDesc => b.created_at().cmp(&a.created_at()),
            OrderSort::CustomerAsc => a.customer_id().cmp(&b.customer_id()),
            OrderSort::CustomerDesc => b.customer_id().cmp(&a.customer_id()),
            OrderSort::TotalAsc => a.total_price().cmp(&b.total_price()),
            OrderSort::TotalDesc => b.total_price().cmp(&a.total_price()),
            OrderSort::IdAsc => a.id().cmp(&b.id()),
            OrderSort::IdDesc => b.id().cmp(&a.id()),
        };
        primary.then_with(|| a.id().cmp(&b.id()))
    }

    /// ORDER BY clause for the `orders` table.
    pub fn sql_order_by(&self) -> &'static str {
        match self {
            OrderSort::CreatedAsc => "created_at ASC, id ASC",
            OrderSort::CreatedDesc => "created_at DESC, id ASC",
            OrderSort::CustomerAsc => "customer_id ASC, id ASC",
            OrderSort::CustomerDesc => "customer_id DESC, id ASC",
            OrderSort::TotalAsc => "total_cents ASC, id ASC",
            OrderSort::TotalDesc => "total_cents DESC, id ASC",
            OrderSort::IdAsc => "id ASC",
            OrderSort::IdDesc => "id DESC",
        }
    }
}

/// A 1-based page number and a page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    number: u32,
    size: u32,
}

impl PageRequest {
    /// Creates a page request. Page 0 is treated as page 1 and the size is
    /// clamped to `1..=MAX_PAGE_SIZE`.
    pub fn new(number: u32, size: u32) -> Self {
        Self {
            number: number.max(1),
            size: size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Number of items to skip.
    pub fn offset(&self) -> u64 {
        u64::from(self.number - 1) * u64::from(self.size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_SIZE)
    }
}

/// Builder for constructing order listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderQuery {
    pub filter: OrderFilter,
    pub sort: OrderSort,
    pub page: PageRequest,
}

impl OrderQuery {
    /// Creates a query for the first page of all orders, newest first.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters by status.
    pub fn status(mut self, status: OrderStatus) -> Self {
        self.filter.status = Some(status);
        self
    }

    /// Filters by owning customer.
    pub fn customer(mut self, customer_id: CustomerId) -> Self {
        self.filter.customer_id = Some(customer_id);
        self
    }

    /// Filters to orders totalling at least `min`.
    pub fn min_total(mut self, min: Money) -> Self {
        self.filter.min_total = Some(min);
        self
    }

    /// Filters to orders totalling at most `max`.
    pub fn max_total(mut self, max: Money) -> Self {
        self.filter.max_total = Some(max);
        self
    }

    /// Filters to orders created at or after this timestamp.
    pub fn created_from(mut self, from: DateTime<Utc>) -> Self {
        self.filter.created_from = Some(from);
        self
    }

    /// Filters to orders created at or before this timestamp.
    pub fn created_to(mut self, to: DateTime<Utc>) -> Self {
        self.filter.created_to = Some(to);
        self
    }

    /// Filters to orders last updated at or after this timestamp.
    pub fn updated_from(mut self, from: DateTime<Utc>) -> Self {
        self.filter.updated_from = Some(from);
        self
    }

    /// Filters to orders last updated at or before this timestamp.
    pub fn updated_to(mut self, to: DateTime<Utc>) -> Self {
        self.filter.updated_to = Some(to);
        self
    }

    pub fn sort(mut self, sort: OrderSort) -> Self {
        self.sort = sort;
        self
    }

    /// Selects a page. See [`PageRequest::new`] for clamping.
    pub fn page(mut self, number: u32, size: u32) -> Self {
        self.page = PageRequest::new(number, size);
        self
    }
}

/// One page of results plus the counts needed to page through the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,

    /// Number of items matching the filter across all pages.
    pub total_count: u64,

    pub page_number: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

impl<T> Page<T> {
    /// Wraps one page of items. `total_pages` is `ceil(total_count / size)`.
    pub fn new(items: Vec<T>, total_count: u64, request: PageRequest) -> Self {
        let size = u64::from(request.size());
        let total_pages = u32::try_from(total_count.div_ceil(size)).unwrap_or(u32::MAX);
        Self {
            items,
            total_count,
            page_number: request.number(),
            page_size: request.size(),
            total_pages,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_next(&self) -> bool {
        self.page_number < self.total_pages
    }

    /// Transforms the items, keeping the paging counts.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total_count: self.total_count,
            page_number: self.page_number,
            page_size: self.page_size,
            total_pages: self.total_pages,
        }
    }
}
