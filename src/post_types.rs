//! The "book" content type: its declaration, the author and publisher
//! taxonomies, and the ISBN box on the edit form with its save handler.

use diesel::prelude::*;
use log::{debug, info};
use serde::Serialize;
use url::form_urlencoded::parse;

use crate::auth::CurrentUser;
use crate::errors::BootError;
use crate::nonce::NonceIssuer;
use crate::registry::{
    Labels, MetaBox, MetaBoxContext, MetaBoxPriority, PostTypeArgs, Registry, Supports, TaxonomyArgs,
};
use crate::templates::Templates;
use crate::{book_info, post_util};

pub fn register_content_type(registry: &mut Registry) -> Result<(), BootError> {
    let labels = Labels {
        name: "Books".into(),
        singular_name: "Book".into(),
        menu_name: "Books".into(),
        add_new: "Add New".into(),
        add_new_item: "Add New Book".into(),
        new_item: "New Book".into(),
        edit_item: "Edit Book".into(),
        view_item: "View Book".into(),
        all_items: "All Books".into(),
        search_items: "Search Books".into(),
        not_found: "No books found.".into(),
        not_found_in_trash: "No books found in Trash.".into(),
        ..Labels::default()
    };

    registry.register_post_type(
        crate::BOOK_POST_TYPE,
        PostTypeArgs {
            labels,
            public: true,
            publicly_queryable: true,
            show_ui: true,
            show_in_menu: true,
            query_var: true,
            rewrite_slug: "book".into(),
            capability_type: "post".into(),
            has_archive: true,
            hierarchical: false,
            menu_position: 2,
            menu_icon: "dashicons-book-alt".into(),
            supports: vec![
                Supports::Title,
                Supports::Editor,
                Supports::Author,
                Supports::Thumbnail,
                Supports::Excerpt,
                Supports::Comments,
            ],
        },
    )
}

fn taxonomy_labels(plural: &str, singular: &str) -> Labels {
    Labels {
        name: plural.into(),
        singular_name: singular.into(),
        menu_name: plural.into(),
        search_items: format!("Search {}", plural),
        all_items: format!("All {}", plural),
        edit_item: format!("Edit {}", singular),
        update_item: format!("Update {}", singular),
        add_new_item: format!("Add New {}", singular),
        new_item_name: format!("New {} Name", singular),
        ..Labels::default()
    }
}

fn flat_taxonomy(slug: &str, labels: Labels) -> TaxonomyArgs {
    TaxonomyArgs {
        labels,
        object_types: vec![crate::BOOK_POST_TYPE.into()],
        hierarchical: false,
        show_ui: true,
        show_admin_column: true,
        query_var: true,
        rewrite_slug: slug.into(),
    }
}

pub fn register_taxonomies(registry: &mut Registry) -> Result<(), BootError> {
    registry.register_taxonomy(
        crate::PUBLISHER_TAXONOMY,
        flat_taxonomy(crate::PUBLISHER_TAXONOMY, taxonomy_labels("Publishers", "Publisher")),
    )?;
    registry.register_taxonomy(
        crate::AUTHOR_TAXONOMY,
        flat_taxonomy(crate::AUTHOR_TAXONOMY, taxonomy_labels("Authors", "Author")),
    )
}

pub fn add_isbn_meta_box(registry: &mut Registry) -> Result<(), BootError> {
    registry.add_meta_box(MetaBox {
        id: crate::ISBN_FIELD.into(),
        title: "ISBN".into(),
        post_type: crate::BOOK_POST_TYPE.into(),
        context: MetaBoxContext::Side,
        priority: MetaBoxPriority::High,
    })
}

#[derive(Debug, Serialize)]
struct IsbnField<'a> {
    field: &'a str,
    nonce_field: &'a str,
    nonce: &'a str,
    value: &'a str,
    size: usize,
}

/// Renders the ISBN input for `post_id`, pre-filled from its metadata.
pub fn render_isbn_field(
    conn: &mut SqliteConnection,
    templates: &Templates,
    nonces: &NonceIssuer,
    user: &CurrentUser,
    post_id: i32,
) -> Result<String, anyhow::Error> {
    let value = post_util::get_post_meta(conn, post_id, crate::ISBN_META_KEY)?.unwrap_or_default();
    let nonce = nonces.create(crate::ISBN_NONCE_ACTION, user);
    templates
        .add_context(
            "isbn_field",
            &IsbnField {
                field: crate::ISBN_FIELD,
                nonce_field: crate::ISBN_NONCE_FIELD,
                nonce: &nonce,
                value: &value,
                size: crate::ISBN_MAX_LENGTH,
            },
        )
        .render("isbn_meta_box.html")
}

/// The fields of a content save that the ISBN handler looks at.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SaveRequest {
    pub isbn_nonce: Option<String>,
    pub isbn: Option<String>,
    pub autosave: bool,
}

impl SaveRequest {
    pub fn from_form_bytes(b: &[u8], autosave: bool) -> Self {
        let mut req = SaveRequest { autosave, ..SaveRequest::default() };
        for (k, v) in parse(b) {
            match &*k {
                crate::ISBN_NONCE_FIELD => req.isbn_nonce = Some(v.into_owned()),
                crate::ISBN_FIELD => req.isbn = Some(v.into_owned()),
                _ => (),
            }
        }
        req
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    InvalidNonce,
    Autosave,
    NotPermitted,
    NoIsbnSubmitted,
    /// Metadata written, auxiliary table untouched because the post is still
    /// an auto-draft.
    MetaOnly,
    Stored,
    Removed,
}

/// Synchronizes a submitted ISBN into post metadata and the `book_info` table.
///
/// Each guard short-circuits silently; the returned outcome says which one
/// fired. Storage errors propagate.
pub fn on_save(
    conn: &mut SqliteConnection,
    nonces: &NonceIssuer,
    user: &CurrentUser,
    post_id: i32,
    req: &SaveRequest,
) -> QueryResult<SaveOutcome> {
    let nonce_ok = req
        .isbn_nonce
        .as_deref()
        .map_or(false, |n| nonces.verify(n, crate::ISBN_NONCE_ACTION, user));
    if !nonce_ok {
        return Ok(SaveOutcome::InvalidNonce);
    }

    if req.autosave {
        return Ok(SaveOutcome::Autosave);
    }

    let post = match post_util::get_post(conn, post_id)? {
        Some(post) if user.can_edit_post(post.post_author) => post,
        _ => return Ok(SaveOutcome::NotPermitted),
    };

    let submitted = match &req.isbn {
        Some(isbn) => isbn,
        None => return Ok(SaveOutcome::NoIsbnSubmitted),
    };

    let isbn = post_util::sanitize_text_field(submitted);
    post_util::update_post_meta(conn, post_id, crate::ISBN_META_KEY, &isbn)?;

    if post.post_status == crate::STATUS_AUTO_DRAFT {
        debug!("post {} is an auto-draft, leaving book_info alone", post_id);
        return Ok(SaveOutcome::MetaOnly);
    }

    if isbn.is_empty() {
        book_info::delete_for_post(conn, post_id)?;
        info!("cleared isbn for post {}", post_id);
        Ok(SaveOutcome::Removed)
    } else {
        book_info::upsert(conn, post_id, &isbn)?;
        info!("stored isbn for post {}", post_id);
        Ok(SaveOutcome::Stored)
    }
}
