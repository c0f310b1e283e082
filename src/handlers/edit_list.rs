use std::collections::HashMap;
use std::sync::Arc;

use axum::response::{Html, IntoResponse};
use http::{HeaderMap, StatusCode};
use log::error;

use crate::auth::Capability;
use crate::errors::*;
use crate::handler::{BooksDB, DbPool, WithDB};
use crate::handlers::books_list::{edit_link, term_edit_link};
use crate::models::{Post, Term};
use crate::plugin::Site;
use crate::post_util;
use crate::registry::Column;
use crate::templates;
use crate::view_models::{Cell, Date as DateView, EditListRow, TermLink};

fn status_label(status: &str) -> &'static str {
    match status {
        crate::STATUS_PUBLISH => "Published",
        crate::STATUS_DRAFT => "Last Modified",
        _ => "",
    }
}

fn date_cell(post: &Post) -> String {
    match post_util::get_local_datetime(&post.post_date, None) {
        Ok(dt) => {
            let date = DateView::from(&dt);
            format!("{} {} at {}", status_label(&post.post_status), date.date, date.time)
                .trim()
                .to_string()
        }
        Err(e) => {
            error!("bad post_date on post {}: {:?}", post.id, e);
            String::new()
        }
    }
}

/// Builds one row, cell per column. Columns the screen has no data for
/// render empty.
pub fn build_row(post: &Post, columns: &[Column], terms: &[Term], author: Option<&str>) -> EditListRow {
    let cells = columns
        .iter()
        .map(|(key, _)| {
            let (text, links) = match key.as_str() {
                "title" => (post.post_title.clone(), vec![]),
                "author" => (author.unwrap_or("").to_string(), vec![]),
                "date" => (date_cell(post), vec![]),
                key => match key.strip_prefix("taxonomy-") {
                    Some(taxonomy) => (
                        String::new(),
                        terms
                            .iter()
                            .filter(|t| t.taxonomy == taxonomy)
                            .map(|t| TermLink { name: t.name.clone(), edit_link: term_edit_link(t) })
                            .collect(),
                    ),
                    None => (String::new(), vec![]),
                },
            };
            Cell { key: key.clone(), text, links }
        })
        .collect();

    EditListRow {
        post_id: post.id,
        title: post.post_title.clone(),
        edit_link: edit_link(post.id),
        status: post.post_status.clone(),
        cells,
    }
}

/// `GET /admin/edit/:post_type`: the default list screen of a content type.
pub async fn edit_list_handler(
    site: Arc<Site>,
    pool: Arc<DbPool>,
    templates: Arc<templates::Templates>,
    headers: HeaderMap,
    post_type: String,
) -> Result<impl IntoResponse, StatusCode> {
    let user = site.authenticate(&headers)?;
    if !user.can(Capability::EditPosts) {
        return Err(NotAuthorized.into());
    }
    let args = site
        .registry
        .post_type(&post_type)
        .filter(|a| a.show_ui)
        .ok_or(StatusCode::NOT_FOUND)?;

    let db = BooksDB::new(pool);
    let mut conn = db.dbconn()?;
    let posts = post_util::list_posts(&mut conn, &post_type).map_err(|e| db.handle_errors(e))?;
    let ids: Vec<i32> = posts.iter().map(|p| p.id).collect();
    let mut terms: HashMap<i32, Vec<Term>> = HashMap::new();
    for (post_id, term) in post_util::get_terms_for_posts(&mut conn, &ids).map_err(|e| db.handle_errors(e))? {
        terms.entry(post_id).or_default().push(term);
    }

    let columns = site.registry.list_columns(&post_type);
    let rows: Vec<EditListRow> = posts
        .iter()
        .map(|post| {
            let author = site.users.iter().find(|u| u.id == post.post_author).map(|u| u.login.as_str());
            let post_terms = terms.get(&post.id).map(Vec::as_slice).unwrap_or(&[]);
            build_row(post, &columns, post_terms, author)
        })
        .collect();

    let page = site
        .admin_templates(&templates, &user)
        .add_context("heading", &args.labels.name)
        .add_context("not_found", &args.labels.not_found)
        .add_context("columns", &columns)
        .add_context("rows", &rows)
        .render("edit_list.html")
        .map_err(|e| {
            error!("{:?}", e);
            TemplateError
        })?;

    Ok(Html(page))
}
