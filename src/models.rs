use diesel::{AsChangeset, Insertable, Queryable};
use serde::Serialize;

use crate::schema::{book_info, postmeta, posts, term_relationships, terms, usermeta};

#[derive(Debug, Queryable, Serialize)]
pub struct Post {
    pub id: i32,
    pub post_author: i32,
    pub post_title: String,
    pub post_content: String,
    pub post_excerpt: String,
    pub post_status: String,
    pub post_type: String,
    pub post_date: String,
    pub post_modified: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = posts)]
pub struct NewPost<'a> {
    pub post_author: i32,
    pub post_title: &'a str,
    pub post_content: &'a str,
    pub post_excerpt: &'a str,
    pub post_status: &'a str,
    pub post_type: &'a str,
}

/// Post fields touched by the edit screen. `None` leaves a column unchanged.
#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = posts)]
pub struct PostChangeset<'a> {
    pub post_title: Option<&'a str>,
    pub post_content: Option<&'a str>,
    pub post_excerpt: Option<&'a str>,
    pub post_status: Option<&'a str>,
}

#[derive(Debug, Queryable, Serialize)]
pub struct BookInfo {
    pub id: i32,
    pub post_id: i32,
    pub isbn: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = book_info)]
pub struct NewBookInfo<'a> {
    pub post_id: i32,
    pub isbn: &'a str,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = postmeta)]
pub struct NewPostMeta<'a> {
    pub post_id: i32,
    pub meta_key: &'a str,
    pub meta_value: &'a str,
}

#[derive(Clone, Debug, Queryable, Serialize)]
pub struct Term {
    pub term_id: i32,
    pub taxonomy: String,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = terms)]
pub struct NewTerm<'a> {
    pub taxonomy: &'a str,
    pub name: &'a str,
    pub slug: &'a str,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = term_relationships)]
pub struct NewTermRelationship {
    pub object_id: i32,
    pub term_id: i32,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = usermeta)]
pub struct NewUserMeta<'a> {
    pub user_id: i32,
    pub meta_key: &'a str,
    pub meta_value: &'a str,
}
