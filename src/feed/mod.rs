mod fetch;
mod parse;
mod summary;

pub use fetch::fetch_feed;
pub use parse::{FeedDocument, FeedEntry, parse_feed};
pub use summary::clean_summary;
