pub mod search;

pub use search::{HttpWebSearch, WebResult, WebSearch};
