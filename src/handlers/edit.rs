use std::sync::Arc;

use axum::response::{Html, IntoResponse, Redirect};
use bytes::Bytes;
use diesel::prelude::*;
use http::{HeaderMap, StatusCode};
use log::{error, info};
use serde::Serialize;
use url::form_urlencoded::parse;

use crate::auth::{Capability, CurrentUser};
use crate::errors::*;
use crate::handler::{BooksDB, DbPool, WithDB};
use crate::handlers::books_list::edit_link;
use crate::models::{NewPost, Post, PostChangeset};
use crate::plugin::Site;
use crate::post_types::{self, SaveRequest};
use crate::post_util;
use crate::templates;
use crate::view_models::EditBook;

/// Fields of the book edit form, other than the meta box fields.
#[derive(Debug, Default, PartialEq)]
pub struct BookForm {
    pub title: Option<String>,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    pub publish: bool,
    pub authors: Option<Vec<String>>,
    pub publishers: Option<Vec<String>>,
}

fn split_terms(v: &str) -> Vec<String> {
    v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
}

impl BookForm {
    pub fn from_form_bytes(b: &[u8]) -> Self {
        let mut form = BookForm::default();
        for (k, v) in parse(b) {
            match &*k {
                "post_title" => form.title = Some(v.into_owned()),
                "content" => form.content = Some(v.into_owned()),
                "excerpt" => form.excerpt = Some(v.into_owned()),
                "publish" => form.publish = true,
                "tax_input[author]" => form.authors = Some(split_terms(&v)),
                "tax_input[publisher]" => form.publishers = Some(split_terms(&v)),
                _ => (),
            }
        }
        form
    }

    /// Status the post moves to when this form is saved, if it changes.
    pub fn next_status(&self, current: &str) -> Option<&'static str> {
        if self.publish {
            Some(crate::STATUS_PUBLISH)
        } else if current == crate::STATUS_AUTO_DRAFT {
            Some(crate::STATUS_DRAFT)
        } else {
            None
        }
    }
}

fn term_names(conn: &mut SqliteConnection, post_id: i32, taxonomy: &str) -> QueryResult<String> {
    let names: Vec<String> = post_util::get_the_terms(conn, post_id, taxonomy)?
        .into_iter()
        .map(|t| t.name)
        .collect();
    Ok(names.join(", "))
}

#[derive(Debug, Serialize)]
struct MetaBoxView {
    id: String,
    title: String,
    html: String,
}

fn require_editable_book(
    db: &BooksDB,
    user: &CurrentUser,
    post_id: i32,
) -> Result<Post, StatusCode> {
    let mut conn = db.dbconn()?;
    let post = post_util::get_post(&mut conn, post_id)
        .map_err(|e| db.handle_errors(e))?
        .filter(|p| p.post_type == crate::BOOK_POST_TYPE)
        .ok_or(DBError::not_found())?;
    if !user.can_edit_post(post.post_author) {
        return Err(NotAuthorized.into());
    }
    Ok(post)
}

/// `GET /admin/books/new`: starts a book as an auto-draft and opens it.
pub async fn new_book_handler(
    site: Arc<Site>,
    pool: Arc<DbPool>,
    headers: HeaderMap,
) -> Result<Redirect, StatusCode> {
    let user = site.authenticate(&headers)?;
    if !user.can(Capability::EditPosts) {
        return Err(NotAuthorized.into());
    }

    let db = BooksDB::new(pool);
    let post_id = db.run_txn(|conn| {
        post_util::insert_post(
            conn,
            &NewPost {
                post_author: user.id,
                post_title: "",
                post_content: "",
                post_excerpt: "",
                post_status: crate::STATUS_AUTO_DRAFT,
                post_type: crate::BOOK_POST_TYPE,
            },
        )
    })?;
    info!("created auto-draft book {} for {}", post_id, user.login);

    Ok(Redirect::to(&edit_link(post_id)))
}

/// `GET /admin/books/:id/edit`
pub async fn edit_book_handler(
    site: Arc<Site>,
    pool: Arc<DbPool>,
    templates: Arc<templates::Templates>,
    headers: HeaderMap,
    post_id: i32,
) -> Result<impl IntoResponse, StatusCode> {
    let user = site.authenticate(&headers)?;
    let db = BooksDB::new(pool);
    let post = require_editable_book(&db, &user, post_id)?;
    let mut conn = db.dbconn()?;

    let authors = term_names(&mut conn, post_id, crate::AUTHOR_TAXONOMY).map_err(|e| db.handle_errors(e))?;
    let publishers = term_names(&mut conn, post_id, crate::PUBLISHER_TAXONOMY).map_err(|e| db.handle_errors(e))?;

    let mut meta_boxes = vec![];
    for meta_box in site.registry.meta_boxes_for(crate::BOOK_POST_TYPE) {
        if meta_box.id != crate::ISBN_FIELD {
            continue;
        }
        let html = post_types::render_isbn_field(&mut conn, &templates, &site.nonces, &user, post_id)
            .map_err(|e| {
                error!("{:?}", e);
                TemplateError
            })?;
        meta_boxes.push(MetaBoxView { id: meta_box.id.clone(), title: meta_box.title.clone(), html });
    }

    let heading = site
        .registry
        .post_type(crate::BOOK_POST_TYPE)
        .map(|args| args.labels.edit_item.clone())
        .unwrap_or_else(|| "Edit Book".into());

    let book = EditBook {
        post_id,
        title: post.post_title,
        content: post.post_content,
        excerpt: post.post_excerpt,
        status: post.post_status,
        authors,
        publishers,
        form_action: format!("/admin/books/{}", post_id),
        heading,
    };

    let page = site
        .admin_templates(&templates, &user)
        .add_context("book", &book)
        .add_context("meta_boxes", &meta_boxes)
        .render("edit_book.html")
        .map_err(|e| {
            error!("{:?}", e);
            TemplateError
        })?;

    Ok(Html(page))
}

/// `POST /admin/books/:id`: saves the post, its terms, then fires the
/// content-save event.
pub async fn save_book_handler(
    site: Arc<Site>,
    pool: Arc<DbPool>,
    headers: HeaderMap,
    post_id: i32,
    body: Bytes,
) -> Result<Redirect, StatusCode> {
    let user = site.authenticate(&headers)?;
    let db = BooksDB::new(pool);
    let post = require_editable_book(&db, &user, post_id)?;

    let form = BookForm::from_form_bytes(&body);
    let save = SaveRequest::from_form_bytes(&body, false);

    let outcome = db.run_txn(|conn| {
        let changes = PostChangeset {
            post_title: form.title.as_deref(),
            post_content: form.content.as_deref(),
            post_excerpt: form.excerpt.as_deref(),
            post_status: form.next_status(&post.post_status),
        };
        post_util::update_post(conn, post_id, &changes)?;
        if let Some(authors) = &form.authors {
            post_util::set_post_terms(conn, post_id, crate::AUTHOR_TAXONOMY, authors)?;
        }
        if let Some(publishers) = &form.publishers {
            post_util::set_post_terms(conn, post_id, crate::PUBLISHER_TAXONOMY, publishers)?;
        }
        site.plugin.on_content_save(conn, &site.nonces, &user, post_id, &save)
    })?;
    info!("saved book {}: {:?}", post_id, outcome);

    Ok(Redirect::to(&edit_link(post_id)))
}

/// `POST /admin/books/:id/autosave`: keeps title and body, leaves status
/// alone and flags the save event as an autosave.
pub async fn autosave_handler(
    site: Arc<Site>,
    pool: Arc<DbPool>,
    headers: HeaderMap,
    post_id: i32,
    body: Bytes,
) -> Result<StatusCode, StatusCode> {
    let user = site.authenticate(&headers)?;
    let db = BooksDB::new(pool);
    require_editable_book(&db, &user, post_id)?;

    let form = BookForm::from_form_bytes(&body);
    let save = SaveRequest::from_form_bytes(&body, true);

    db.run_txn(|conn| {
        let changes = PostChangeset {
            post_title: form.title.as_deref(),
            post_content: form.content.as_deref(),
            ..PostChangeset::default()
        };
        if changes.post_title.is_some() || changes.post_content.is_some() {
            post_util::update_post(conn, post_id, &changes)?;
        }
        site.plugin.on_content_save(conn, &site.nonces, &user, post_id, &save)
    })?;

    Ok(StatusCode::NO_CONTENT)
}
