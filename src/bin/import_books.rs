use std::env;
use std::io::Read;
use std::path::PathBuf;

use anyhow::{anyhow, Context};
use diesel::prelude::*;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use books_rs::auth::CurrentUser;
use books_rs::config::BooksSiteConfig;
use books_rs::models::NewPost;
use books_rs::nonce::NonceIssuer;
use books_rs::plugin::{BooksPlugin, Lifecycle};
use books_rs::post_types::SaveRequest;
use books_rs::{database, post_util};

#[derive(Debug, Deserialize)]
struct ImportedBook {
    title: String,
    #[serde(default)]
    content: String,
    status: Option<String>,
    isbn: Option<String>,
    #[serde(default)]
    authors: Vec<String>,
    #[serde(default)]
    publishers: Vec<String>,
}

fn import(
    conn: &mut SqliteConnection,
    plugin: &dyn Lifecycle,
    nonces: &NonceIssuer,
    user: &CurrentUser,
    book: &ImportedBook,
) -> QueryResult<i32> {
    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        let post_id = post_util::insert_post(
            conn,
            &NewPost {
                post_author: user.id,
                post_title: &book.title,
                post_content: &book.content,
                post_excerpt: "",
                post_status: book.status.as_deref().unwrap_or(books_rs::STATUS_PUBLISH),
                post_type: books_rs::BOOK_POST_TYPE,
            },
        )?;
        post_util::set_post_terms(conn, post_id, books_rs::AUTHOR_TAXONOMY, &book.authors)?;
        post_util::set_post_terms(conn, post_id, books_rs::PUBLISHER_TAXONOMY, &book.publishers)?;

        let save = SaveRequest {
            isbn_nonce: Some(nonces.create(books_rs::ISBN_NONCE_ACTION, user)),
            isbn: book.isbn.clone(),
            autosave: false,
        };
        plugin.on_content_save(conn, nonces, user, post_id, &save)?;
        Ok(post_id)
    })
}

fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = env::var(books_rs::CONFIG_VAR)
        .map(PathBuf::from)
        .map_err(|e| anyhow!("error reading env var {}: {:?}", books_rs::CONFIG_VAR, e))?;
    let config = BooksSiteConfig::load(&config_path)?;
    let login = config
        .import_user
        .as_deref()
        .ok_or(anyhow!("import_user is not set in {:?}", config_path))?;
    let user = config
        .users
        .iter()
        .find(|u| u.login == login)
        .map(CurrentUser::from_config)
        .ok_or(anyhow!("unknown import user {}", login))?;

    // read in body from stdin
    let mut body = String::new();
    std::io::stdin().read_to_string(&mut body)?;
    let books: Vec<ImportedBook> = serde_json::from_str(&body).context("expected a JSON array of books")?;

    let dbpool = books_rs::new_dbconn_pool(&config.database_url)?;
    let mut conn = dbpool.get()?;
    let plugin = BooksPlugin::new(&config.schema.collation);
    database::install_host_tables(&mut conn, &config.schema.collation)?;
    plugin.on_activate(&mut conn)?;

    let nonces = NonceIssuer::new(&config.nonce_secret);
    for book in &books {
        match import(&mut conn, &plugin, &nonces, &user, book) {
            Ok(post_id) => println!("imported '{}' as post {}", book.title, post_id),
            Err(e) => println!("error importing '{}': {:?}", book.title, e),
        }
    }

    Ok(())
}
