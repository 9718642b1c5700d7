//! Read side of the collection index.
//!
//! Paginated browsing, sibling lookup and dashboard aggregation served
//! entirely from the index keyspaces. Nothing here depends on the rebuild
//! engine, and every read is safe while a rebuild is running.

pub mod cursor;
pub mod error;
pub mod reader;

pub use cursor::Cursor;
pub use error::NavigationError;
pub use reader::{IndexStatistics, NavigationReader, Page, Siblings, MAX_PAGE_SIZE};
