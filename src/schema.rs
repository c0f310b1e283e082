table! {
    book_info (id) {
        id -> Integer,
        post_id -> Integer,
        isbn -> Text,
    }
}

table! {
    posts (id) {
        id -> Integer,
        post_author -> Integer,
        post_title -> Text,
        post_content -> Text,
        post_excerpt -> Text,
        post_status -> Text,
        post_type -> Text,
        post_date -> Text,
        post_modified -> Text,
    }
}

table! {
    postmeta (meta_id) {
        meta_id -> Integer,
        post_id -> Integer,
        meta_key -> Text,
        meta_value -> Text,
    }
}

table! {
    terms (term_id) {
        term_id -> Integer,
        taxonomy -> Text,
        name -> Text,
        slug -> Text,
    }
}

table! {
    term_relationships (object_id, term_id) {
        object_id -> Integer,
        term_id -> Integer,
    }
}

table! {
    usermeta (umeta_id) {
        umeta_id -> Integer,
        user_id -> Integer,
        meta_key -> Text,
        meta_value -> Text,
    }
}

joinable!(postmeta -> posts (post_id));
joinable!(term_relationships -> terms (term_id));

allow_tables_to_appear_in_same_query!(
    book_info,
    postmeta,
    posts,
    term_relationships,
    terms,
    usermeta,
);
