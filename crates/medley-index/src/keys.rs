//! Key layout for the metadata index.
//!
//! Centralized here so every component that touches the store agrees on the
//! layout: one record key per asset, one index key, one usage key per asset.

/// Ordered list of all known asset ids, newest first.
pub const INDEX_KEY: &str = "asset:index";

/// Record key for one asset.
pub fn asset_key(id: &str) -> String {
    format!("asset:{}", id)
}

/// Usage-list key for one asset.
pub fn usage_key(id: &str) -> String {
    format!("asset:{}:usage", id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        assert_eq!(asset_key("abc"), "asset:abc");
        assert_eq!(usage_key("abc"), "asset:abc:usage");
        assert_eq!(INDEX_KEY, "asset:index");
    }
}
