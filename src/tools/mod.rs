//! External tools the analysis tasks call.
//!
//! Only web search is needed today; see [`search::WebSearch`].

/// Web search via DuckDuckGo.
pub mod search;

pub use search::{DuckDuckGoSearch, SearchHit, WebSearch};
