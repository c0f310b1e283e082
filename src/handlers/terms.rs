use std::sync::Arc;

use axum::response::{Html, IntoResponse, Redirect};
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use log::{error, info, warn};
use url::form_urlencoded::parse;

use crate::auth::{Capability, CurrentUser};
use crate::errors::*;
use crate::handler::{BooksDB, DbPool, WithDB};
use crate::handlers::books_list::term_edit_link;
use crate::plugin::Site;
use crate::post_util;
use crate::templates;

fn term_nonce_action(term_id: i32) -> String {
    format!("update-tag_{}", term_id)
}

fn authorize(site: &Site, headers: &HeaderMap, taxonomy: &str) -> Result<CurrentUser, StatusCode> {
    let user = site.authenticate(headers)?;
    if !user.can(Capability::EditOthersPosts) {
        return Err(NotAuthorized.into());
    }
    if site.registry.taxonomy(taxonomy).map_or(true, |t| !t.show_ui) {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(user)
}

/// `GET /admin/terms/:taxonomy/:id`
pub async fn edit_term_handler(
    site: Arc<Site>,
    pool: Arc<DbPool>,
    templates: Arc<templates::Templates>,
    headers: HeaderMap,
    taxonomy: String,
    term_id: i32,
) -> Result<impl IntoResponse, StatusCode> {
    let user = authorize(&site, &headers, &taxonomy)?;
    let db = BooksDB::new(pool);
    let mut conn = db.dbconn()?;
    let term = post_util::get_term(&mut conn, &taxonomy, term_id)
        .map_err(|e| db.handle_errors(e))?
        .ok_or(DBError::not_found())?;

    let labels = site.registry.taxonomy(&taxonomy).map(|t| t.labels.clone()).unwrap_or_default();
    let page = site
        .admin_templates(&templates, &user)
        .add_context("heading", &labels.edit_item)
        .add_context("update_label", &labels.update_item)
        .add_context("form_action", &term_edit_link(&term))
        .add_context("nonce_field", crate::NONCE_FIELD)
        .add_context("nonce", &site.nonces.create(&term_nonce_action(term_id), &user))
        .add_context("term", &term)
        .render("edit_term.html")
        .map_err(|e| {
            error!("{:?}", e);
            TemplateError
        })?;

    Ok(Html(page))
}

/// `POST /admin/terms/:taxonomy/:id`: renames the term.
pub async fn update_term_handler(
    site: Arc<Site>,
    pool: Arc<DbPool>,
    headers: HeaderMap,
    taxonomy: String,
    term_id: i32,
    body: Bytes,
) -> Result<Redirect, StatusCode> {
    let user = authorize(&site, &headers, &taxonomy)?;

    let mut name = None;
    let mut nonce = None;
    for (k, v) in parse(&body) {
        match &*k {
            "name" => name = Some(post_util::sanitize_text_field(&v)),
            crate::NONCE_FIELD => nonce = Some(v.into_owned()),
            _ => (),
        }
    }

    let db = BooksDB::new(pool);
    let mut conn = db.dbconn()?;
    let term = post_util::get_term(&mut conn, &taxonomy, term_id)
        .map_err(|e| db.handle_errors(e))?
        .ok_or(DBError::not_found())?;

    let nonce_ok = nonce
        .as_deref()
        .map_or(false, |n| site.nonces.verify(n, &term_nonce_action(term_id), &user));
    match name.filter(|n| !n.is_empty()) {
        Some(name) if nonce_ok => {
            if post_util::rename_term(&mut conn, term_id, &name).map_err(|e| db.handle_errors(e))? {
                info!("renamed {} term {} to '{}'", taxonomy, term_id, name);
            } else {
                warn!("not renaming {} term {} to '{}': slug already in use", taxonomy, term_id, name);
            }
        }
        _ => warn!("ignoring update of {} term {}", taxonomy, term_id),
    }

    Ok(Redirect::to(&term_edit_link(&term)))
}
