use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};
use diesel::prelude::*;

use crate::models::{
    NewPost, NewPostMeta, NewTerm, NewTermRelationship, NewUserMeta, Post, PostChangeset, Term,
};
use crate::schema::{postmeta, posts, term_relationships, terms, usermeta};

const DB_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Lowercased, hyphenated slug used for term lookups. Names with nothing
/// alphanumeric in them fall back to their percent-encoded form.
pub fn sanitize_title(name: &str) -> String {
    let cleaned: String = name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '-')
        .collect();
    let slug = cleaned.split_whitespace().collect::<Vec<_>>().join("-");
    if slug.trim_matches('-').is_empty() {
        return urlencoding::encode(name.trim()).to_lowercase();
    }
    slug
}

/// Drops tags, percent-encoded octets, line breaks, tabs and other control
/// characters, collapses runs of whitespace and trims the result.
pub fn sanitize_text_field(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '<' if chars.peek().map_or(false, |n| n.is_alphabetic() || *n == '/' || *n == '!') => {
                in_tag = true;
            }
            '>' if in_tag => in_tag = false,
            _ if in_tag => {}
            '%' => {
                let mut lookahead = chars.clone();
                let is_octet = matches!(
                    (lookahead.next(), lookahead.next()),
                    (Some(a), Some(b)) if a.is_ascii_hexdigit() && b.is_ascii_hexdigit()
                );
                if is_octet {
                    chars.next();
                    chars.next();
                } else {
                    out.push('%');
                }
            }
            c if c.is_control() => out.push(' '),
            c => out.push(c),
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn now_string() -> String {
    Utc::now().format(DB_DATETIME_FORMAT).to_string()
}

pub fn get_local_datetime(
    datetime: &str,
    offset: Option<FixedOffset>,
) -> Result<DateTime<FixedOffset>, chrono::format::ParseError> {
    let offset = offset.unwrap_or_else(|| Utc.fix());
    NaiveDateTime::parse_from_str(datetime, DB_DATETIME_FORMAT)
        .map(|ndt| offset.from_utc_datetime(&ndt))
}

pub fn get_post(conn: &mut SqliteConnection, post_id: i32) -> QueryResult<Option<Post>> {
    posts::table.find(post_id).first::<Post>(conn).optional()
}

pub fn insert_post(conn: &mut SqliteConnection, new_post: &NewPost) -> QueryResult<i32> {
    diesel::insert_into(posts::table).values(new_post).execute(conn)?;
    posts::table.select(posts::id).order(posts::id.desc()).first(conn)
}

pub fn update_post(conn: &mut SqliteConnection, post_id: i32, changes: &PostChangeset) -> QueryResult<usize> {
    diesel::update(posts::table.find(post_id))
        .set((changes, posts::post_modified.eq(now_string())))
        .execute(conn)
}

/// Posts of `post_type` shown on admin lists, newest first. Auto-drafts and
/// trashed posts are left out.
pub fn list_posts(conn: &mut SqliteConnection, post_type: &str) -> QueryResult<Vec<Post>> {
    posts::table
        .filter(posts::post_type.eq(post_type))
        .filter(posts::post_status.ne_all(crate::LISTED_EXCLUDED_STATUSES.to_vec()))
        .order((posts::post_date.desc(), posts::id.desc()))
        .load(conn)
}

/// Removes a post outright (no trash), along with its metadata and term
/// assignments.
pub fn delete_post(conn: &mut SqliteConnection, post_id: i32) -> QueryResult<usize> {
    diesel::delete(postmeta::table.filter(postmeta::post_id.eq(post_id))).execute(conn)?;
    diesel::delete(term_relationships::table.filter(term_relationships::object_id.eq(post_id)))
        .execute(conn)?;
    diesel::delete(posts::table.find(post_id)).execute(conn)
}

pub fn get_post_meta(conn: &mut SqliteConnection, post_id: i32, key: &str) -> QueryResult<Option<String>> {
    postmeta::table
        .select(postmeta::meta_value)
        .filter(postmeta::post_id.eq(post_id))
        .filter(postmeta::meta_key.eq(key))
        .order(postmeta::meta_id.asc())
        .first(conn)
        .optional()
}

pub fn update_post_meta(conn: &mut SqliteConnection, post_id: i32, key: &str, value: &str) -> QueryResult<()> {
    let updated = diesel::update(
        postmeta::table
            .filter(postmeta::post_id.eq(post_id))
            .filter(postmeta::meta_key.eq(key)),
    )
    .set(postmeta::meta_value.eq(value))
    .execute(conn)?;

    if updated == 0 {
        diesel::insert_into(postmeta::table)
            .values(NewPostMeta { post_id, meta_key: key, meta_value: value })
            .execute(conn)?;
    }
    Ok(())
}

pub fn get_user_option(conn: &mut SqliteConnection, user_id: i32, key: &str) -> QueryResult<Option<String>> {
    usermeta::table
        .select(usermeta::meta_value)
        .filter(usermeta::user_id.eq(user_id))
        .filter(usermeta::meta_key.eq(key))
        .first(conn)
        .optional()
}

pub fn update_user_option(conn: &mut SqliteConnection, user_id: i32, key: &str, value: &str) -> QueryResult<()> {
    let updated = diesel::update(
        usermeta::table
            .filter(usermeta::user_id.eq(user_id))
            .filter(usermeta::meta_key.eq(key)),
    )
    .set(usermeta::meta_value.eq(value))
    .execute(conn)?;

    if updated == 0 {
        diesel::insert_into(usermeta::table)
            .values(NewUserMeta { user_id, meta_key: key, meta_value: value })
            .execute(conn)?;
    }
    Ok(())
}

fn get_or_create_term(conn: &mut SqliteConnection, taxonomy: &str, name: &str) -> QueryResult<i32> {
    let slug = sanitize_title(name);
    let existing = terms::table
        .select(terms::term_id)
        .filter(terms::taxonomy.eq(taxonomy))
        .filter(terms::slug.eq(&slug))
        .first::<i32>(conn)
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }

    diesel::insert_into(terms::table)
        .values(NewTerm { taxonomy, name, slug: &slug })
        .execute(conn)?;
    terms::table.select(terms::term_id).order(terms::term_id.desc()).first(conn)
}

/// Replaces the post's terms in `taxonomy` with `names`, creating terms that do
/// not exist yet. Blank names are skipped.
pub fn set_post_terms(
    conn: &mut SqliteConnection,
    post_id: i32,
    taxonomy: &str,
    names: &[String],
) -> QueryResult<()> {
    let current: Vec<i32> = terms::table
        .select(terms::term_id)
        .filter(terms::taxonomy.eq(taxonomy))
        .load(conn)?;
    diesel::delete(
        term_relationships::table
            .filter(term_relationships::object_id.eq(post_id))
            .filter(term_relationships::term_id.eq_any(current)),
    )
    .execute(conn)?;

    let mut assigned = vec![];
    for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
        let term_id = get_or_create_term(conn, taxonomy, name)?;
        if assigned.contains(&term_id) {
            continue;
        }
        diesel::insert_into(term_relationships::table)
            .values(NewTermRelationship { object_id: post_id, term_id })
            .execute(conn)?;
        assigned.push(term_id);
    }
    Ok(())
}

pub fn get_the_terms(conn: &mut SqliteConnection, post_id: i32, taxonomy: &str) -> QueryResult<Vec<Term>> {
    terms::table
        .inner_join(term_relationships::table)
        .filter(term_relationships::object_id.eq(post_id))
        .filter(terms::taxonomy.eq(taxonomy))
        .select((terms::term_id, terms::taxonomy, terms::name, terms::slug))
        .order(terms::name.asc())
        .load(conn)
}

pub fn get_term(conn: &mut SqliteConnection, taxonomy: &str, term_id: i32) -> QueryResult<Option<Term>> {
    terms::table
        .find(term_id)
        .filter(terms::taxonomy.eq(taxonomy))
        .first(conn)
        .optional()
}

/// Renames a term; the slug follows the new name. Returns `false` and leaves
/// the term as it was when another term of its taxonomy already has the slug.
pub fn rename_term(conn: &mut SqliteConnection, term_id: i32, name: &str) -> QueryResult<bool> {
    let slug = sanitize_title(name);
    let taxonomy = match terms::table
        .find(term_id)
        .select(terms::taxonomy)
        .first::<String>(conn)
        .optional()?
    {
        Some(taxonomy) => taxonomy,
        None => return Ok(false),
    };

    let taken = terms::table
        .select(terms::term_id)
        .filter(terms::taxonomy.eq(&taxonomy))
        .filter(terms::slug.eq(&slug))
        .filter(terms::term_id.ne(term_id))
        .first::<i32>(conn)
        .optional()?;
    if taken.is_some() {
        return Ok(false);
    }

    diesel::update(terms::table.find(term_id))
        .set((terms::name.eq(name), terms::slug.eq(&slug)))
        .execute(conn)?;
    Ok(true)
}

/// Terms of every post in `post_ids`, as `(post_id, term)` pairs.
pub fn get_terms_for_posts(conn: &mut SqliteConnection, post_ids: &[i32]) -> QueryResult<Vec<(i32, Term)>> {
    let rows: Vec<(i32, i32, String, String, String)> = terms::table
        .inner_join(term_relationships::table)
        .filter(term_relationships::object_id.eq_any(post_ids.to_vec()))
        .select((
            term_relationships::object_id,
            terms::term_id,
            terms::taxonomy,
            terms::name,
            terms::slug,
        ))
        .order((term_relationships::object_id.asc(), terms::name.asc()))
        .load(conn)?;

    Ok(rows
        .into_iter()
        .map(|(post_id, term_id, taxonomy, name, slug)| (post_id, Term { term_id, taxonomy, name, slug }))
        .collect())
}

#[cfg(test)]
pub(crate) mod test {
    use diesel::prelude::*;

    use super::*;
    use crate::models::NewPost;

    pub(crate) fn test_conn() -> SqliteConnection {
        let mut conn = SqliteConnection::establish(":memory:").unwrap();
        crate::database::install_all(&mut conn, "BINARY").unwrap();
        conn
    }

    pub(crate) fn new_book(conn: &mut SqliteConnection, title: &str, status: &str) -> i32 {
        insert_post(
            conn,
            &NewPost {
                post_author: 1,
                post_title: title,
                post_content: "",
                post_excerpt: "",
                post_status: status,
                post_type: crate::BOOK_POST_TYPE,
            },
        )
        .unwrap()
    }

    #[test]
    fn it_slugifies_term_names() {
        assert_eq!(sanitize_title("Penguin Random House"), "penguin-random-house");
        assert_eq!(sanitize_title("  O'Reilly  Media! "), "oreilly-media");
        assert_eq!(sanitize_title("李白"), "李白");
        assert_eq!(sanitize_title("!!!"), "%21%21%21");
        assert_eq!(sanitize_title("???"), "%3f%3f%3f");
    }

    #[test]
    fn it_keeps_terms_without_alphanumeric_names_apart() {
        let mut conn = test_conn();
        let id = new_book(&mut conn, "Poems", "publish");
        set_post_terms(&mut conn, id, "author", &["!!!".into(), "???".into(), "李白".into()]).unwrap();

        let mut authors: Vec<String> = get_the_terms(&mut conn, id, "author").unwrap().into_iter().map(|t| t.name).collect();
        authors.sort();
        assert_eq!(authors, vec!["!!!".to_string(), "???".to_string(), "李白".to_string()]);
    }

    #[test]
    fn it_strips_tags_and_control_characters() {
        assert_eq!(sanitize_text_field("  978-0134<b>190440</b>\n"), "978-0134190440");
        assert_eq!(sanitize_text_field("<script>x</script>123"), "x123");
        assert_eq!(sanitize_text_field("a\tb\r\nc"), "a b c");
        assert_eq!(sanitize_text_field("50%2F50 100%"), "5050 100%");
        assert_eq!(sanitize_text_field("1 < 2"), "1 < 2");
    }

    #[test]
    fn it_parses_db_datetimes() {
        let dt = get_local_datetime("2020-10-24 20:32:33", FixedOffset::east_opt(3600)).unwrap();
        assert_eq!(dt.to_rfc3339(), "2020-10-24T21:32:33+01:00");
        assert!(get_local_datetime("yesterday", None).is_err());
    }

    #[test]
    fn it_upserts_post_meta() {
        let mut conn = test_conn();
        let id = new_book(&mut conn, "Dune", "publish");

        assert_eq!(get_post_meta(&mut conn, id, "_book_isbn").unwrap(), None);
        update_post_meta(&mut conn, id, "_book_isbn", "123").unwrap();
        update_post_meta(&mut conn, id, "_book_isbn", "456").unwrap();
        assert_eq!(get_post_meta(&mut conn, id, "_book_isbn").unwrap(), Some("456".into()));

        let rows: i64 = crate::schema::postmeta::table.count().get_result(&mut conn).unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn it_replaces_terms_per_taxonomy() {
        let mut conn = test_conn();
        let id = new_book(&mut conn, "Good Omens", "publish");

        set_post_terms(&mut conn, id, "author", &["Terry Pratchett".into(), "Neil Gaiman".into()]).unwrap();
        set_post_terms(&mut conn, id, "publisher", &["Gollancz".into()]).unwrap();
        set_post_terms(&mut conn, id, "author", &["Neil Gaiman".into(), " ".into()]).unwrap();

        let authors: Vec<String> = get_the_terms(&mut conn, id, "author").unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(authors, vec!["Neil Gaiman".to_string()]);
        assert_eq!(get_the_terms(&mut conn, id, "publisher").unwrap().len(), 1);
    }

    #[test]
    fn it_hard_deletes_posts_with_meta_and_terms() {
        let mut conn = test_conn();
        let id = new_book(&mut conn, "Emma", "draft");
        update_post_meta(&mut conn, id, "_book_isbn", "1").unwrap();
        set_post_terms(&mut conn, id, "author", &["Jane Austen".into()]).unwrap();

        assert_eq!(delete_post(&mut conn, id).unwrap(), 1);
        assert!(get_post(&mut conn, id).unwrap().is_none());
        assert_eq!(get_post_meta(&mut conn, id, "_book_isbn").unwrap(), None);
        assert!(get_terms_for_posts(&mut conn, &[id]).unwrap().is_empty());
        assert_eq!(delete_post(&mut conn, id).unwrap(), 0);
    }

    #[test]
    fn it_stores_user_options() {
        let mut conn = test_conn();
        assert_eq!(get_user_option(&mut conn, 1, "books_per_page").unwrap(), None);
        update_user_option(&mut conn, 1, "books_per_page", "50").unwrap();
        update_user_option(&mut conn, 1, "books_per_page", "10").unwrap();
        assert_eq!(get_user_option(&mut conn, 1, "books_per_page").unwrap(), Some("10".into()));
        assert_eq!(get_user_option(&mut conn, 2, "books_per_page").unwrap(), None);
    }

    #[test]
    fn it_lists_posts_newest_first() {
        let mut conn = test_conn();
        let old = new_book(&mut conn, "Old", "publish");
        let new = new_book(&mut conn, "New", "draft");
        new_book(&mut conn, "", "auto-draft");
        diesel::update(crate::schema::posts::table.find(old))
            .set(crate::schema::posts::post_date.eq("2001-01-01 00:00:00"))
            .execute(&mut conn)
            .unwrap();

        let ids: Vec<i32> = list_posts(&mut conn, "book").unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![new, old]);
        assert!(list_posts(&mut conn, "page").unwrap().is_empty());
    }

    #[test]
    fn it_renames_terms_within_their_taxonomy() {
        let mut conn = test_conn();
        let id = new_book(&mut conn, "Dune", "publish");
        set_post_terms(&mut conn, id, "publisher", &["Chilton".into()]).unwrap();
        let term = get_the_terms(&mut conn, id, "publisher").unwrap().remove(0);

        assert!(get_term(&mut conn, "author", term.term_id).unwrap().is_none());
        assert!(rename_term(&mut conn, term.term_id, "Chilton Books").unwrap());
        let renamed = get_term(&mut conn, "publisher", term.term_id).unwrap().unwrap();
        assert_eq!(renamed.name, "Chilton Books");
        assert_eq!(renamed.slug, "chilton-books");
    }

    #[test]
    fn it_refuses_renames_onto_a_taken_slug() {
        let mut conn = test_conn();
        let id = new_book(&mut conn, "Anthology", "publish");
        set_post_terms(&mut conn, id, "author", &["Ann Smith".into(), "Bob Jones".into()]).unwrap();
        set_post_terms(&mut conn, id, "publisher", &["Bob Jones".into()]).unwrap();
        let terms = get_the_terms(&mut conn, id, "author").unwrap();
        let bob = terms.iter().find(|t| t.name == "Bob Jones").unwrap().term_id;

        assert!(!rename_term(&mut conn, bob, "ann  smith").unwrap());
        assert_eq!(get_term(&mut conn, "author", bob).unwrap().unwrap().name, "Bob Jones");

        // same slug in another taxonomy and the term's own slug are fine
        let publisher = get_the_terms(&mut conn, id, "publisher").unwrap().remove(0);
        assert!(rename_term(&mut conn, publisher.term_id, "Ann Smith").unwrap());
        assert!(rename_term(&mut conn, bob, "BOB Jones").unwrap());
        assert!(!rename_term(&mut conn, 999, "Nobody").unwrap());
    }
}
