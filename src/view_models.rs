use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct Date {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub date: String,
    pub time: String,
}

impl<T> std::convert::From<&T> for Date
where
    T: chrono::Datelike + chrono::Timelike,
{
    fn from(date: &T) -> Self {
        let date_str = format!("{}/{:02}/{:02}", date.year(), date.month(), date.day());
        let time_str = format!("{:02}:{:02}", date.hour(), date.minute());
        Self {
            year: date.year(),
            month: date.month(),
            day: date.day(),
            date: date_str,
            time: time_str,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TermLink {
    pub name: String,
    pub edit_link: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BookRow {
    pub post_id: i32,
    pub title: String,
    pub edit_link: String,
    pub delete_link: String,
    pub is_draft: bool,
    pub isbn: String,
    pub authors: Vec<TermLink>,
    pub publishers: Vec<TermLink>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ColumnHeader {
    pub key: String,
    pub label: String,
    /// Set for sortable columns.
    pub sort_link: Option<String>,
    /// "asc"/"desc" when the table is currently sorted by this column.
    pub sorted: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaginationView {
    pub total_items: i64,
    pub total_pages: u32,
    pub current_page: u32,
    pub per_page: u32,
    pub first_link: Option<String>,
    pub prev_link: Option<String>,
    pub next_link: Option<String>,
    pub last_link: Option<String>,
}

/// A cell of the default edit-list screen.
#[derive(Debug, Serialize, Deserialize)]
pub struct Cell {
    pub key: String,
    pub text: String,
    pub links: Vec<TermLink>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EditListRow {
    pub post_id: i32,
    pub title: String,
    pub edit_link: String,
    pub status: String,
    pub cells: Vec<Cell>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EditBook {
    pub post_id: i32,
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub status: String,
    pub authors: String,
    pub publishers: String,
    pub form_action: String,
    pub heading: String,
}
