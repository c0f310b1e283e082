use std::collections::HashMap;
use std::sync::Arc;

use axum::response::{Html, IntoResponse, Redirect, Response};
use bytes::Bytes;
use diesel::prelude::*;
use http::{HeaderMap, Method, StatusCode};
use log::{error, info, warn};
use url::form_urlencoded::parse;

use crate::auth::{Capability, CurrentUser};
use crate::errors::*;
use crate::handler::{BooksDB, DbPool, WithDB};
use crate::list_table::{
    ActionResult, ListRequest, ListTable, OrderBy, Pagination, SortOrder,
};
use crate::models::Term;
use crate::nonce::NonceIssuer;
use crate::plugin::Site;
use crate::schema::{book_info, posts};
use crate::templates;
use crate::view_models::{BookRow, ColumnHeader, PaginationView, TermLink};
use crate::{book_info as book_info_store, post_util};

/// One listed book: the post joined with its optional `book_info` row.
#[derive(Debug, Queryable)]
pub struct BookItem {
    pub post_id: i32,
    pub title: String,
    pub status: String,
    pub isbn: Option<String>,
}

pub fn edit_link(post_id: i32) -> String {
    format!("/admin/books/{}/edit", post_id)
}

pub fn term_edit_link(term: &Term) -> String {
    format!("/admin/terms/{}/{}", urlencoding::encode(&term.taxonomy), term.term_id)
}

pub fn list_url(params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        return crate::BOOKS_LIST_PATH.into();
    }
    let query: Vec<String> = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect();
    format!("{}?{}", crate::BOOKS_LIST_PATH, query.join("&"))
}

/// Removes the book's `book_info` row, then the post itself.
///
/// The two deletes are separate statements; a failure in the second leaves
/// the first applied.
pub fn delete_book(conn: &mut SqliteConnection, post_id: i32) -> QueryResult<()> {
    book_info_store::delete_for_post(conn, post_id)?;
    let removed = post_util::delete_post(conn, post_id)?;
    info!("deleted book {} ({} post rows)", post_id, removed);
    Ok(())
}

/// Page size for `user`: their `books_per_page` screen option when set and
/// valid, `default` otherwise.
pub fn per_page_for(conn: &mut SqliteConnection, user: &CurrentUser, default: u32) -> QueryResult<u32> {
    let option = post_util::get_user_option(conn, user.id, crate::PER_PAGE_OPTION)?;
    Ok(option
        .and_then(|v| v.trim().parse::<u32>().ok())
        .filter(|n| (1..=crate::MAX_PER_PAGE).contains(n))
        .unwrap_or(default))
}

pub struct BooksListTable<'a> {
    nonces: &'a NonceIssuer,
    user: &'a CurrentUser,
    items: Vec<BookItem>,
    terms: HashMap<i32, Vec<Term>>,
    pagination: Option<Pagination>,
}

impl<'a> BooksListTable<'a> {
    pub fn new(nonces: &'a NonceIssuer, user: &'a CurrentUser) -> Self {
        Self {
            nonces,
            user,
            items: vec![],
            terms: HashMap::new(),
            pagination: None,
        }
    }

    pub fn record_count(conn: &mut SqliteConnection) -> QueryResult<i64> {
        posts::table
            .left_join(book_info::table.on(book_info::post_id.eq(posts::id)))
            .filter(posts::post_type.eq(crate::BOOK_POST_TYPE))
            .filter(posts::post_status.ne_all(crate::LISTED_EXCLUDED_STATUSES.to_vec()))
            .select(diesel::dsl::count(posts::id).aggregate_distinct())
            .first(conn)
    }

    pub fn get_books(
        conn: &mut SqliteConnection,
        sort: Option<(OrderBy, SortOrder)>,
        per_page: u32,
        offset: i64,
    ) -> QueryResult<Vec<BookItem>> {
        let mut query = posts::table
            .left_join(book_info::table.on(book_info::post_id.eq(posts::id)))
            .filter(posts::post_type.eq(crate::BOOK_POST_TYPE))
            .filter(posts::post_status.ne_all(crate::LISTED_EXCLUDED_STATUSES.to_vec()))
            .select((
                posts::id,
                posts::post_title,
                posts::post_status,
                book_info::isbn.nullable(),
            ))
            .into_boxed();

        if let Some((OrderBy::Isbn, order)) = sort {
            query = match order {
                SortOrder::Asc => query.order(book_info::isbn.nullable().asc()),
                SortOrder::Desc => query.order(book_info::isbn.nullable().desc()),
            };
        }

        query
            .then_order_by(posts::id.asc())
            .limit(per_page as i64)
            .offset(offset)
            .load::<BookItem>(conn)
    }

    fn delete_and_redirect(&self, conn: &mut SqliteConnection, ids: &[i32]) -> Result<ActionResult, DBError> {
        for id in ids {
            delete_book(conn, *id).map_err(|e| {
                error!("{:?}", e);
                DBError::new()
            })?;
        }
        Ok(ActionResult::Redirect(list_url(&[])))
    }

    fn term_links(&self, post_id: i32, taxonomy: &str) -> Vec<TermLink> {
        self.terms
            .get(&post_id)
            .map(|terms| {
                terms
                    .iter()
                    .filter(|t| t.taxonomy == taxonomy)
                    .map(|t| TermLink { name: t.name.clone(), edit_link: term_edit_link(t) })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn sort_params(req: &ListRequest) -> Vec<(&'static str, &'static str)> {
        match req.orderby {
            Some(orderby) => vec![("orderby", orderby.as_str()), ("order", req.order.as_str())],
            None => vec![],
        }
    }

    pub fn column_headers(&self, req: &ListRequest) -> Vec<ColumnHeader> {
        let current = self.resolve_sort(req);
        self.columns()
            .into_iter()
            .map(|(key, label)| {
                let sortable = OrderBy::parse(key).filter(|o| self.sortable_columns().contains(o));
                let sorted = match (sortable, current) {
                    (Some(column), Some((by, order))) if column == by => Some(order),
                    _ => None,
                };
                let sort_link = sortable.map(|column| {
                    let next = sorted.map(|o| o.flipped()).unwrap_or(SortOrder::Asc);
                    list_url(&[("orderby", column.as_str()), ("order", next.as_str())])
                });
                ColumnHeader {
                    key: key.into(),
                    label: label.into(),
                    sort_link,
                    sorted: sorted.map(|o| o.as_str().to_string()),
                }
            })
            .collect()
    }

    pub fn pagination_view(&self, req: &ListRequest) -> Option<PaginationView> {
        let p = self.pagination.as_ref()?;
        let sort = Self::sort_params(req);
        let link = |page: u32| {
            let page = page.to_string();
            let mut params: Vec<(&str, &str)> = vec![("page", page.as_str())];
            params.extend(sort.iter().copied());
            list_url(&params)
        };
        let has_prev = p.current_page > 1;
        let has_next = p.current_page < p.total_pages;
        Some(PaginationView {
            total_items: p.total_items,
            total_pages: p.total_pages,
            current_page: p.current_page,
            per_page: p.per_page,
            first_link: has_prev.then(|| link(1)),
            prev_link: has_prev.then(|| link(p.current_page - 1)),
            next_link: has_next.then(|| link(p.current_page + 1)),
            last_link: has_next.then(|| link(p.total_pages)),
        })
    }

    /// Renders the whole screen. `prepare_items` must have run.
    pub fn display(&self, templates: &templates::Templates, req: &ListRequest) -> Result<String, anyhow::Error> {
        let rows: Vec<BookRow> = self.items().iter().map(|item| self.render_row(item)).collect();
        let bulk_actions: Vec<(String, String)> = self
            .bulk_actions()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        templates
            .add_context("heading", "Books Information")
            .add_context("form_action", &list_url(&Self::sort_params(req)))
            .add_context("columns", &self.column_headers(req))
            .add_context("rows", &rows)
            .add_context("pagination", &self.pagination_view(req))
            .add_context("bulk_actions", &bulk_actions)
            .add_context("nonce_field", crate::NONCE_FIELD)
            .add_context("bulk_nonce", &self.nonces.create(crate::BULK_NONCE_ACTION, self.user))
            .add_context(
                "screen_options_nonce",
                &self.nonces.create(crate::SCREEN_OPTIONS_NONCE_ACTION, self.user),
            )
            .render("books_list.html")
    }
}

impl<'a> ListTable for BooksListTable<'a> {
    type Item = BookItem;
    type Row = BookRow;

    fn columns(&self) -> Vec<(&'static str, &'static str)> {
        vec![
            ("cb", ""),
            ("title", "Title"),
            ("isbn", "ISBN"),
            ("authors", "Authors"),
            ("publisher", "Publisher"),
        ]
    }

    fn sortable_columns(&self) -> &'static [OrderBy] {
        &[OrderBy::Isbn]
    }

    fn bulk_actions(&self) -> Vec<(&'static str, &'static str)> {
        vec![(crate::BULK_DELETE_ACTION, "Delete")]
    }

    fn prepare_items(
        &mut self,
        conn: &mut SqliteConnection,
        req: &ListRequest,
        per_page: u32,
    ) -> Result<(), DBError> {
        let to_db_err = |e: diesel::result::Error| {
            error!("{:?}", e);
            DBError::new()
        };

        let total_items = Self::record_count(conn).map_err(to_db_err)?;
        let pagination = Pagination::new(total_items, per_page, req.paged);
        let items = Self::get_books(conn, self.resolve_sort(req), pagination.per_page, pagination.offset())
            .map_err(to_db_err)?;

        let ids: Vec<i32> = items.iter().map(|i| i.post_id).collect();
        let mut terms: HashMap<i32, Vec<Term>> = HashMap::new();
        for (post_id, term) in post_util::get_terms_for_posts(conn, &ids).map_err(to_db_err)? {
            terms.entry(post_id).or_default().push(term);
        }

        self.items = items;
        self.terms = terms;
        self.pagination = Some(pagination);
        Ok(())
    }

    fn items(&self) -> &[BookItem] {
        &self.items
    }

    fn pagination(&self) -> Option<&Pagination> {
        self.pagination.as_ref()
    }

    fn render_row(&self, item: &BookItem) -> BookRow {
        let target = item.post_id.to_string();
        let nonce = self.nonces.create(&format!("delete_book_{}", target), self.user);
        BookRow {
            post_id: item.post_id,
            title: item.title.clone(),
            edit_link: edit_link(item.post_id),
            delete_link: list_url(&[
                ("action", "delete"),
                ("book", target.as_str()),
                (crate::NONCE_FIELD, nonce.as_str()),
            ]),
            is_draft: item.status == crate::STATUS_DRAFT,
            isbn: item.isbn.clone().unwrap_or_default(),
            authors: self.term_links(item.post_id, crate::AUTHOR_TAXONOMY),
            publishers: self.term_links(item.post_id, crate::PUBLISHER_TAXONOMY),
        }
    }

    fn process_bulk_action(
        &self,
        conn: &mut SqliteConnection,
        req: &ListRequest,
    ) -> Result<ActionResult, DBError> {
        if !self.user.can(Capability::DeletePosts) {
            if req.row_action.is_some() || req.bulk_action.is_some() {
                warn!("ignoring book actions from {}: may not delete posts", self.user.login);
            }
            return Ok(ActionResult::None);
        }

        if let Some(row) = &req.row_action {
            let nonce_ok = row.nonce.as_deref().map_or(false, |n| {
                self.nonces.verify(n, &format!("delete_book_{}", row.target), self.user)
            });
            if nonce_ok && row.action == "delete" {
                let id = crate::list_table::absint(&row.target);
                return self.delete_and_redirect(conn, &[id]);
            }
            if !nonce_ok {
                warn!("ignoring '{}' on book {}: bad token", row.action, row.target);
            }
        }

        if req.bulk_action_is(crate::BULK_DELETE_ACTION) {
            if let Some(bulk) = &req.bulk_action {
                let nonce_ok = bulk
                    .nonce
                    .as_deref()
                    .map_or(false, |n| self.nonces.verify(n, crate::BULK_NONCE_ACTION, self.user));
                if !nonce_ok {
                    warn!("ignoring bulk delete: bad token");
                    return Ok(ActionResult::None);
                }
                return self.delete_and_redirect(conn, &bulk.ids);
            }
        }

        Ok(ActionResult::None)
    }
}

pub async fn books_list_handler(
    site: Arc<Site>,
    pool: Arc<DbPool>,
    templates: Arc<templates::Templates>,
    method: Method,
    headers: HeaderMap,
    query: Option<String>,
    body: Bytes,
) -> Result<Response, StatusCode> {
    let user = site.authenticate_for(&headers, crate::BOOKS_LIST_SLUG)?;
    let db = BooksDB::new(pool);
    let mut conn = db.dbconn()?;

    let form = if method == Method::POST { Some(&body[..]) } else { None };
    let req = ListRequest::parse(query.unwrap_or_default().as_bytes(), form, "book", crate::BULK_DELETE_ACTION);

    let mut table = BooksListTable::new(&site.nonces, &user);
    if let ActionResult::Redirect(to) = table.process_bulk_action(&mut conn, &req)? {
        return Ok(Redirect::to(&to).into_response());
    }

    let per_page = per_page_for(&mut conn, &user, site.per_page).map_err(|e| db.handle_errors(e))?;
    table.prepare_items(&mut conn, &req, per_page)?;

    let page = table
        .display(&site.admin_templates(&templates, &user), &req)
        .map_err(|e| {
            error!("{:?}", e);
            TemplateError
        })?;
    Ok(Html(page).into_response())
}

/// `POST /admin/books-list/screen-options`: stores the user's page size.
pub async fn screen_options_handler(
    site: Arc<Site>,
    pool: Arc<DbPool>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Redirect, StatusCode> {
    let user = site.authenticate_for(&headers, crate::BOOKS_LIST_SLUG)?;

    let mut per_page = None;
    let mut nonce = None;
    for (k, v) in parse(&body) {
        match &*k {
            crate::PER_PAGE_OPTION => per_page = v.trim().parse::<u32>().ok(),
            crate::NONCE_FIELD => nonce = Some(v.into_owned()),
            _ => (),
        }
    }

    let nonce_ok = nonce
        .as_deref()
        .map_or(false, |n| site.nonces.verify(n, crate::SCREEN_OPTIONS_NONCE_ACTION, &user));
    if let (true, Some(n)) = (nonce_ok, per_page) {
        let n = n.clamp(1, crate::MAX_PER_PAGE);
        let db = BooksDB::new(pool);
        let mut conn = db.dbconn()?;
        post_util::update_user_option(&mut conn, user.id, crate::PER_PAGE_OPTION, &n.to_string())
            .map_err(|e| db.handle_errors(e))?;
    }

    Ok(Redirect::to(crate::BOOKS_LIST_PATH))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::auth::Role;
    use crate::post_util::test::{new_book, test_conn};

    fn admin() -> CurrentUser {
        CurrentUser { id: 1, login: "admin".into(), role: Role::Administrator, session_token: "s".into() }
    }

    fn req(query: &str) -> ListRequest {
        ListRequest::parse(query.as_bytes(), None, "book", crate::BULK_DELETE_ACTION)
    }

    #[test]
    fn it_excludes_auto_drafts_trash_and_other_types() {
        let mut conn = test_conn();
        new_book(&mut conn, "Listed", "publish");
        new_book(&mut conn, "Draft", "draft");
        new_book(&mut conn, "", "auto-draft");
        new_book(&mut conn, "Binned", "trash");
        post_util::insert_post(
            &mut conn,
            &crate::models::NewPost {
                post_author: 1,
                post_title: "A page",
                post_content: "",
                post_excerpt: "",
                post_status: "publish",
                post_type: "page",
            },
        )
        .unwrap();

        assert_eq!(BooksListTable::record_count(&mut conn).unwrap(), 2);
        let titles: Vec<String> = BooksListTable::get_books(&mut conn, None, 20, 0)
            .unwrap()
            .into_iter()
            .map(|b| b.title)
            .collect();
        assert_eq!(titles, vec!["Listed".to_string(), "Draft".to_string()]);
    }

    #[test]
    fn it_needs_delete_posts_to_delete() {
        let mut conn = test_conn();
        let id = new_book(&mut conn, "Kept", "publish");
        let nonces = NonceIssuer::new("k");
        let author = CurrentUser { id: 2, login: "author".into(), role: Role::Author, session_token: "a".into() };
        let form = format!(
            "action=bulk-delete&bulk-delete%5B%5D={}&_nonce={}",
            id,
            nonces.create(crate::BULK_NONCE_ACTION, &author)
        );
        let req = ListRequest::parse(b"", Some(form.as_bytes()), "book", crate::BULK_DELETE_ACTION);

        let table = BooksListTable::new(&nonces, &author);
        assert_eq!(table.process_bulk_action(&mut conn, &req).unwrap(), ActionResult::None);
        assert!(post_util::get_post(&mut conn, id).unwrap().is_some());

        let user = admin();
        let form = format!(
            "action=foo&action2=bulk-delete&bulk-delete%5B%5D={}&_nonce={}",
            id,
            nonces.create(crate::BULK_NONCE_ACTION, &user)
        );
        let req = ListRequest::parse(b"", Some(form.as_bytes()), "book", crate::BULK_DELETE_ACTION);
        let table = BooksListTable::new(&nonces, &user);
        assert!(matches!(table.process_bulk_action(&mut conn, &req).unwrap(), ActionResult::Redirect(_)));
        assert!(post_util::get_post(&mut conn, id).unwrap().is_none());
    }

    #[test]
    fn only_isbn_is_sortable() {
        let nonces = NonceIssuer::new("k");
        let user = admin();
        let table = BooksListTable::new(&nonces, &user);

        assert_eq!(table.resolve_sort(&req("orderby=isbn&order=desc")), Some((OrderBy::Isbn, SortOrder::Desc)));
        assert_eq!(table.resolve_sort(&req("orderby=title&order=desc")), None);
        assert_eq!(table.resolve_sort(&req("orderby=date")), None);

        let headers = table.column_headers(&req("orderby=isbn&order=asc"));
        let isbn = headers.iter().find(|h| h.key == "isbn").unwrap();
        assert_eq!(isbn.sorted.as_deref(), Some("asc"));
        assert_eq!(isbn.sort_link.as_deref(), Some("/admin/books-list?orderby=isbn&order=desc"));
        assert!(headers.iter().find(|h| h.key == "title").unwrap().sort_link.is_none());
    }

    #[test]
    fn it_sorts_by_isbn_with_missing_rows_first_ascending() {
        let mut conn = test_conn();
        let a = new_book(&mut conn, "A", "publish");
        let b = new_book(&mut conn, "B", "publish");
        let c = new_book(&mut conn, "C", "publish");
        book_info_store::upsert(&mut conn, a, "222").unwrap();
        book_info_store::upsert(&mut conn, c, "111").unwrap();

        assert_eq!(sorted_ids(&mut conn, Some((OrderBy::Isbn, SortOrder::Asc))), vec![b, c, a]);
        assert_eq!(sorted_ids(&mut conn, Some((OrderBy::Isbn, SortOrder::Desc))), vec![a, c, b]);
        assert_eq!(sorted_ids(&mut conn, None), vec![a, b, c]);
    }

    fn sorted_ids(conn: &mut SqliteConnection, sort: Option<(OrderBy, SortOrder)>) -> Vec<i32> {
        BooksListTable::get_books(conn, sort, 20, 0)
            .unwrap()
            .into_iter()
            .map(|i| i.post_id)
            .collect()
    }

    #[test]
    fn rows_link_terms_and_mark_drafts() {
        let mut conn = test_conn();
        let nonces = NonceIssuer::new("k");
        let user = admin();
        let id = new_book(&mut conn, "Good Omens", "draft");
        book_info_store::upsert(&mut conn, id, "9780060853983").unwrap();
        post_util::set_post_terms(&mut conn, id, "author", &["Terry Pratchett".into(), "Neil Gaiman".into()]).unwrap();
        post_util::set_post_terms(&mut conn, id, "publisher", &["Harper".into()]).unwrap();

        let mut table = BooksListTable::new(&nonces, &user);
        table.prepare_items(&mut conn, &req(""), 20).unwrap();
        let row = table.render_row(&table.items()[0]);

        assert!(row.is_draft);
        assert_eq!(row.isbn, "9780060853983");
        assert_eq!(row.edit_link, format!("/admin/books/{}/edit", id));
        let authors: Vec<&str> = row.authors.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(authors, vec!["Neil Gaiman", "Terry Pratchett"]);
        assert_eq!(row.publishers.len(), 1);
        assert!(row.publishers[0].edit_link.starts_with("/admin/terms/publisher/"));
        assert!(row.delete_link.contains(&format!("action=delete&book={}&_nonce=", id)));
    }

    #[test]
    fn per_page_falls_back_on_bad_options() {
        let mut conn = test_conn();
        let user = admin();
        assert_eq!(per_page_for(&mut conn, &user, 20).unwrap(), 20);
        post_util::update_user_option(&mut conn, 1, crate::PER_PAGE_OPTION, "5").unwrap();
        assert_eq!(per_page_for(&mut conn, &user, 20).unwrap(), 5);
        post_util::update_user_option(&mut conn, 1, crate::PER_PAGE_OPTION, "0").unwrap();
        assert_eq!(per_page_for(&mut conn, &user, 20).unwrap(), 20);
        post_util::update_user_option(&mut conn, 1, crate::PER_PAGE_OPTION, "lots").unwrap();
        assert_eq!(per_page_for(&mut conn, &user, 20).unwrap(), 20);
    }

    #[test]
    fn pagination_links_keep_sorting() {
        let mut conn = test_conn();
        let nonces = NonceIssuer::new("k");
        let user = admin();
        for i in 0..5 {
            new_book(&mut conn, &format!("Book {}", i), "publish");
        }

        let r = req("page=2&orderby=isbn&order=desc");
        let mut table = BooksListTable::new(&nonces, &user);
        table.prepare_items(&mut conn, &r, 2).unwrap();
        assert_eq!(table.items().len(), 2);

        let view = table.pagination_view(&r).unwrap();
        assert_eq!(view.total_pages, 3);
        assert_eq!(view.prev_link.as_deref(), Some("/admin/books-list?page=1&orderby=isbn&order=desc"));
        assert_eq!(view.next_link.as_deref(), Some("/admin/books-list?page=3&orderby=isbn&order=desc"));
    }
}
