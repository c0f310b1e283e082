//! Building blocks for paginated, sortable admin tables.
//!
//! Request parameters arrive as raw query-string and form pairs; they are
//! parsed once into [`ListRequest`] so table implementations only deal with
//! typed values.

use diesel::SqliteConnection;
use serde::Serialize;
use url::form_urlencoded::parse;

use crate::errors::DBError;

/// Columns a list request may ask to sort by. Which of them a table actually
/// honours is up to [`ListTable::sortable_columns`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderBy {
    Title,
    Isbn,
    Date,
}

impl OrderBy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "title" => Some(OrderBy::Title),
            "isbn" => Some(OrderBy::Isbn),
            "date" => Some(OrderBy::Date),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderBy::Title => "title",
            OrderBy::Isbn => "isbn",
            OrderBy::Date => "date",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("desc") {
            SortOrder::Desc
        } else {
            SortOrder::Asc
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }

    pub fn flipped(&self) -> Self {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }
}

/// A row action requested through the query string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowAction {
    pub action: String,
    /// Target id exactly as submitted; tokens are bound to this text.
    pub target: String,
    pub nonce: Option<String>,
}

/// A bulk action submitted from the table form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BulkAction {
    /// Every non-empty `action`/`action2` value, in submission order.
    pub actions: Vec<String>,
    pub ids: Vec<i32>,
    pub nonce: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListRequest {
    pub paged: u32,
    pub orderby: Option<OrderBy>,
    pub order: SortOrder,
    pub row_action: Option<RowAction>,
    pub bulk_action: Option<BulkAction>,
}

/// Non-negative integer value of `s`, 0 when it does not parse.
pub fn absint(s: &str) -> i32 {
    s.trim()
        .parse::<i64>()
        .map(|n| n.unsigned_abs().min(i32::MAX as u64) as i32)
        .unwrap_or(0)
}

impl ListRequest {
    /// Parses the query string and, for form submissions, the form body.
    ///
    /// Row actions come from the query string (`action`, `book`, `_nonce`);
    /// bulk actions from the form, where either `action` or `action2` selects
    /// the action and `bulk-delete[]` carries the ids in submission order.
    pub fn parse(query: &[u8], form: Option<&[u8]>, target_param: &str, bulk_field: &str) -> Self {
        let mut req = ListRequest { paged: 1, ..ListRequest::default() };
        let mut action = None;
        let mut target = None;
        let mut nonce = None;

        for (k, v) in parse(query) {
            match &*k {
                "page" | "paged" => {
                    let n = absint(&v);
                    if n > 0 {
                        req.paged = n as u32;
                    }
                }
                "orderby" => req.orderby = OrderBy::parse(&v),
                "order" => req.order = SortOrder::parse(&v),
                "action" => action = Some(v.into_owned()),
                crate::NONCE_FIELD => nonce = Some(v.into_owned()),
                k if k == target_param => target = Some(v.into_owned()),
                _ => (),
            }
        }

        if let (Some(action), Some(target)) = (action, target) {
            req.row_action = Some(RowAction { action, target, nonce });
        }

        if let Some(form) = form {
            let bulk_key = format!("{}[]", bulk_field);
            let mut actions = vec![];
            let mut ids = vec![];
            let mut form_nonce = None;
            for (k, v) in parse(form) {
                match &*k {
                    "action" | "action2" if v != "-1" && !v.is_empty() => actions.push(v.into_owned()),
                    crate::NONCE_FIELD => form_nonce = Some(v.into_owned()),
                    k if k == bulk_key || k == bulk_field => ids.push(absint(&v)),
                    _ => (),
                }
            }
            if !actions.is_empty() {
                req.bulk_action = Some(BulkAction { actions, ids, nonce: form_nonce });
            }
        }

        req
    }

    pub fn bulk_action_is(&self, name: &str) -> bool {
        self.bulk_action
            .as_ref()
            .map_or(false, |b| b.actions.iter().any(|a| a == name))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub total_items: i64,
    pub per_page: u32,
    pub total_pages: u32,
    pub current_page: u32,
}

impl Pagination {
    pub fn new(total_items: i64, per_page: u32, requested_page: u32) -> Self {
        let per_page = per_page.max(1);
        let total_pages = ((total_items.max(0) as u64 + per_page as u64 - 1) / per_page as u64) as u32;
        Self {
            total_items,
            per_page,
            total_pages,
            current_page: requested_page.max(1),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.current_page as i64 - 1) * self.per_page as i64
    }
}

/// What a table does with the write half of a request.
#[derive(Debug, PartialEq, Eq)]
pub enum ActionResult {
    /// Nothing applied; render the table.
    None,
    /// Something changed; send the client back to this location.
    Redirect(String),
}

/// An admin table: pagination, sorting, per-row rendering and bulk actions.
pub trait ListTable {
    type Item;
    type Row: Serialize;

    /// Column keys and headings, in display order.
    fn columns(&self) -> Vec<(&'static str, &'static str)>;

    /// Columns the table honours as sort keys.
    fn sortable_columns(&self) -> &'static [OrderBy];

    fn bulk_actions(&self) -> Vec<(&'static str, &'static str)>;

    /// Sort column to apply for `req`; `None` when the request asks for a
    /// column the table does not sort by.
    fn resolve_sort(&self, req: &ListRequest) -> Option<(OrderBy, SortOrder)> {
        req.orderby
            .filter(|o| self.sortable_columns().contains(o))
            .map(|o| (o, req.order))
    }

    /// Loads the current page of items and the pagination totals.
    fn prepare_items(
        &mut self,
        conn: &mut SqliteConnection,
        req: &ListRequest,
        per_page: u32,
    ) -> Result<(), DBError>;

    fn items(&self) -> &[Self::Item];

    fn pagination(&self) -> Option<&Pagination>;

    fn render_row(&self, item: &Self::Item) -> Self::Row;

    /// Applies any row or bulk action in `req`. Runs before rendering.
    fn process_bulk_action(
        &self,
        conn: &mut SqliteConnection,
        req: &ListRequest,
    ) -> Result<ActionResult, DBError>;
}
