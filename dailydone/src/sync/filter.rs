//! Client-side filtering, sorting and pagination of a synced errand list.
//!
//! Everything here is a pure function of the cached full set and a
//! [`FilterScope`]; changing filters never goes back to the backend.

use std::cmp::Ordering;

use dailydone_proto::task::{Category, Task, TaskStatus};

/// Page size used when a scope does not set one.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Ordering applied before pagination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    /// Most recently created first; undated errands last.
    #[default]
    Newest,
    /// Oldest first; undated errands last.
    Oldest,
    /// Highest price first.
    PriceHighToLow,
    /// Lowest price first.
    PriceLowToHigh,
    /// Backend order.
    AsReceived,
}

/// Error returned for an unknown sort key name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown sort key {0:?} (expected newest, oldest, price-desc, price-asc or received)")]
pub struct UnknownSortKey(pub String);

impl std::str::FromStr for SortKey {
    type Err = UnknownSortKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "newest" | "new" => Ok(Self::Newest),
            "oldest" | "old" => Ok(Self::Oldest),
            "price-desc" | "price_desc" | "price-high" => Ok(Self::PriceHighToLow),
            "price-asc" | "price_asc" | "price-low" => Ok(Self::PriceLowToHigh),
            "received" | "none" => Ok(Self::AsReceived),
            _ => Err(UnknownSortKey(s.to_string())),
        }
    }
}

/// What the view wants to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterScope {
    /// Only errands with this status.
    pub status: Option<TaskStatus>,
    /// Fuzzy category filter, see [`category_matches`].
    pub category: Option<String>,
    /// Case-insensitive free-text search.
    pub search: Option<String>,
    /// 1-based page number.
    pub page: usize,
    /// Items per page.
    pub page_size: usize,
    /// Ordering.
    pub sort: SortKey,
}

impl Default for FilterScope {
    fn default() -> Self {
        Self {
            status: None,
            category: None,
            search: None,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            sort: SortKey::default(),
        }
    }
}

impl FilterScope {
    /// First page, no filters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps only errands in `status`.
    #[must_use]
    pub const fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Keeps errands whose category loosely matches `category`.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Keeps errands mentioning `search`, ignoring case.
    #[must_use]
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// Selects a 1-based page; out-of-range pages are clamped when the
    /// page is derived.
    #[must_use]
    pub const fn with_page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    /// Sets the page size; zero is raised to one.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Sets the ordering.
    #[must_use]
    pub const fn with_sort(mut self, sort: SortKey) -> Self {
        self.sort = sort;
        self
    }

    /// Returns `true` if `task` passes the status, category and search
    /// predicates.
    #[must_use]
    pub fn matches(&self, task: &Task) -> bool {
        if self.status.is_some_and(|status| task.status != status) {
            return false;
        }
        if let Some(category) = &self.category {
            if !category_matches(&task.category, category) {
                return false;
            }
        }
        self.search
            .as_deref()
            .is_none_or(|needle| search_matches(task, needle))
    }
}

/// One page of a filtered list.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct VisiblePage {
    /// Errands on this page.
    pub items: Vec<Task>,
    /// The page actually returned (after clamping).
    pub page: usize,
    /// Number of pages for the current filters.
    pub total_pages: usize,
    /// Number of errands matching the filters.
    pub total_matches: usize,
    /// `true` if `page` differs from the requested page.
    pub page_corrected: bool,
}

/// Filters, sorts and slices `full` for `scope`.
///
/// A page past the end is clamped to the last page that has data and the
/// correction is reported, so a stale page index never shows an empty page
/// while matches exist. Page 0 is treated as page 1.
#[must_use]
pub fn visible_page(full: &[Task], scope: &FilterScope) -> VisiblePage {
    let mut matches: Vec<&Task> = full.iter().filter(|t| scope.matches(t)).collect();
    sort_tasks(&mut matches, scope.sort);

    let size = scope.page_size.max(1);
    let total_matches = matches.len();
    let total_pages = total_matches.div_ceil(size);
    let page = scope.page.clamp(1, total_pages.max(1));

    let items = matches
        .into_iter()
        .skip((page - 1) * size)
        .take(size)
        .cloned()
        .collect();

    VisiblePage {
        items,
        page,
        total_pages,
        total_matches,
        page_corrected: page != scope.page,
    }
}

/// Tolerant category comparison.
///
/// Both sides are lowercased and stripped to alphanumerics, so
/// `"Pet Care"`, `"pet-care"` and `"PETCARE"` are the same category, then
/// compared by substring in either direction. An empty filter or `"all"`
/// matches everything; an errand without a category matches no real
/// filter. An exact category id match also counts.
#[must_use]
pub fn category_matches(category: &Category, filter: &str) -> bool {
    let wanted = fold(filter);
    if wanted.is_empty() || wanted == "all" {
        return true;
    }
    if category
        .id
        .as_deref()
        .is_some_and(|id| id.eq_ignore_ascii_case(filter.trim()))
    {
        return true;
    }
    let have = fold(&category.name);
    !have.is_empty() && (have.contains(&wanted) || wanted.contains(&have))
}

fn search_matches(task: &Task, needle: &str) -> bool {
    let needle = needle.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }
    [
        Some(task.description.as_str()),
        Some(task.category.name.as_str()),
        Some(task.pickup.address.as_str()),
        task.poster.name.as_deref(),
    ]
    .into_iter()
    .flatten()
    .any(|field| field.to_lowercase().contains(&needle))
}

/// Lowercase alphanumeric words joined together, with `&` and the word
/// `and` dropped so "Home & Garden" and "home and garden" fold alike.
fn fold(s: &str) -> String {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty() && *word != "and")
        .collect()
}

fn sort_tasks(tasks: &mut [&Task], key: SortKey) {
    match key {
        SortKey::Newest => tasks.sort_by(|a, b| dated_last(a, b, |x, y| y.cmp(x))),
        SortKey::Oldest => tasks.sort_by(|a, b| dated_last(a, b, |x, y| x.cmp(y))),
        SortKey::PriceHighToLow => tasks.sort_by(|a, b| b.price.total_cmp(&a.price)),
        SortKey::PriceLowToHigh => tasks.sort_by(|a, b| a.price.total_cmp(&b.price)),
        SortKey::AsReceived => {}
    }
}

/// Orders dated errands with `cmp`, undated ones after them.
fn dated_last<F>(a: &Task, b: &Task, cmp: F) -> Ordering
where
    F: Fn(&chrono::DateTime<chrono::Utc>, &chrono::DateTime<chrono::Utc>) -> Ordering,
{
    match (&a.created_at, &b.created_at) {
        (Some(x), Some(y)) => cmp(x, y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
