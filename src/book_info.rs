use diesel::prelude::*;
use log::debug;

use crate::models::{BookInfo, NewBookInfo};
use crate::schema::book_info;

/// Column value for `isbn`: at most `ISBN_MAX_LENGTH` characters.
pub fn isbn_column_value(isbn: &str) -> &str {
    match isbn.char_indices().nth(crate::ISBN_MAX_LENGTH) {
        Some((end, _)) => &isbn[..end],
        None => isbn,
    }
}

pub fn find_by_post(conn: &mut SqliteConnection, post_id: i32) -> QueryResult<Option<BookInfo>> {
    book_info::table
        .filter(book_info::post_id.eq(post_id))
        .first::<BookInfo>(conn)
        .optional()
}

/// Updates the row for `post_id` if there is one, inserts it otherwise.
pub fn upsert(conn: &mut SqliteConnection, post_id: i32, isbn: &str) -> QueryResult<()> {
    let isbn = isbn_column_value(isbn);
    let existing = book_info::table
        .select(book_info::id)
        .filter(book_info::post_id.eq(post_id))
        .first::<i32>(conn)
        .optional()?;

    match existing {
        Some(_) => {
            diesel::update(book_info::table.filter(book_info::post_id.eq(post_id)))
                .set(book_info::isbn.eq(isbn))
                .execute(conn)?;
            debug!("updated isbn for post {}", post_id);
        }
        None => {
            diesel::insert_into(book_info::table)
                .values(NewBookInfo { post_id, isbn })
                .execute(conn)?;
            debug!("inserted isbn for post {}", post_id);
        }
    }
    Ok(())
}

pub fn delete_for_post(conn: &mut SqliteConnection, post_id: i32) -> QueryResult<usize> {
    diesel::delete(book_info::table.filter(book_info::post_id.eq(post_id))).execute(conn)
}
