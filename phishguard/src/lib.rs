// Include handlers module directly from handlers.rs
#[path = "handlers.rs"]
pub mod handlers;

// Re-export commonly used handler functions for convenience
pub use handlers::{
    check_bundle, collect_warm_urls, dedupe_urls, format_sources, load_config,
    load_urls_from_file, parse_url_line,
};
