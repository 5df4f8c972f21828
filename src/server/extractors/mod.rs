mod own_base_url_extractor;

pub use own_base_url_extractor::*;
