#[macro_use]
extern crate diesel;

use diesel::prelude::SqliteConnection;
use diesel::r2d2;

pub mod auth;
pub mod book_info;
pub mod config;
pub mod constants;
pub mod database;
pub mod errors;
pub mod handler;
pub mod handlers;
pub mod list_table;
pub mod models;
pub mod nonce;
pub mod plugin;
pub mod post_types;
pub mod post_util;
pub mod registry;
pub mod schema;
pub mod templates;
pub mod view_models;

pub use crate::constants::*;

pub fn new_dbconn_pool(
    db_file: &str,
) -> Result<r2d2::Pool<r2d2::ConnectionManager<SqliteConnection>>, anyhow::Error> {
    let manager = r2d2::ConnectionManager::<SqliteConnection>::new(db_file);
    Ok(r2d2::Pool::new(manager)?)
}

/// A pool over one in-memory database. A single connection keeps every
/// checkout on the same database.
pub fn new_test_pool() -> Result<r2d2::Pool<r2d2::ConnectionManager<SqliteConnection>>, anyhow::Error> {
    let manager = r2d2::ConnectionManager::<SqliteConnection>::new(":memory:");
    Ok(r2d2::Pool::builder().max_size(1).build(manager)?)
}
