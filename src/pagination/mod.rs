//! Cursor pagination and canonical addressing for the serving path.

pub mod canonical;
pub mod cursor;
pub mod page;

pub use canonical::DataUrls;
pub use cursor::{format_timestamp, parse_since};
pub use page::{read_page, Page};
