pub const BOOK_POST_TYPE: &str = "book";
pub const AUTHOR_TAXONOMY: &str = "author";
pub const PUBLISHER_TAXONOMY: &str = "publisher";

pub const BOOK_INFO_TABLE: &str = "book_info";
pub const ISBN_META_KEY: &str = "_book_isbn";
pub const ISBN_FIELD: &str = "book_isbn";
pub const ISBN_MAX_LENGTH: usize = 13;

pub const ISBN_NONCE_ACTION: &str = "book_isbn_nonce";
pub const ISBN_NONCE_FIELD: &str = "book_isbn_nonce";
pub const BULK_NONCE_ACTION: &str = "bulk-books";
pub const SCREEN_OPTIONS_NONCE_ACTION: &str = "screen-options-nonce";
pub const NONCE_FIELD: &str = "_nonce";

pub const BOOKS_LIST_SLUG: &str = "books-list";
pub const BOOKS_LIST_PATH: &str = "/admin/books-list";
pub const BULK_DELETE_ACTION: &str = "bulk-delete";
pub const PER_PAGE_OPTION: &str = "books_per_page";
pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 999;

pub const STATUS_AUTO_DRAFT: &str = "auto-draft";
pub const STATUS_DRAFT: &str = "draft";
pub const STATUS_PUBLISH: &str = "publish";
pub const STATUS_TRASH: &str = "trash";
pub const LISTED_EXCLUDED_STATUSES: &[&str] = &[STATUS_AUTO_DRAFT, STATUS_TRASH];

pub const SESSION_COOKIE: &str = "books_session";
pub const NONCE_LIFETIME_SECS: i64 = 24 * 60 * 60;

pub const CONFIG_VAR: &str = "BOOKS_RS_CONFIG";
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:3030";
pub const DEFAULT_COLLATION: &str = "BINARY";
