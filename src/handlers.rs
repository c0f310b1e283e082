pub mod books_list;
pub mod edit;
pub mod edit_list;
pub mod terms;

pub use books_list::{books_list_handler, screen_options_handler};
pub use edit::{autosave_handler, edit_book_handler, new_book_handler, save_book_handler};
pub use edit_list::edit_list_handler;
pub use terms::{edit_term_handler, update_term_handler};
