//! Product-page signals used by the link extractor.
//!
//! Every marker the heuristic matches on lives in [`ProductPatterns`].
//! Supporting another storefront platform means adding one path marker or
//! query key to the lists below.
//!
//! Callers can override the defaults via
//! [`crate::config::CollectionConfigBuilder::patterns`].
//!
//! The query keys come from hosted storefront platforms common in Korea and
//! Japan (Cafe24, Godomall, MakeShop). They are a platform signal rather than
//! proof of a product page: any site that reuses a key such as `pid` for
//! something else will produce false positives.

use serde::{Deserialize, Serialize};
use url::Url;

/// Path substrings that mark a product detail page.
pub const DEFAULT_PATH_MARKERS: &[&str] = &[
    "/products/",
    "/product/",
    "/item/",
    "/items/",
    "/goods/",
    "/shop/view",
];

/// Query parameter keys storefront platforms use for product ids.
pub const DEFAULT_QUERY_KEYS: &[&str] = &[
    "product_no",
    "goodsNo",
    "branduid",
    "itemId",
    "item_id",
    "productId",
    "product_id",
    "pid",
];

/// Words that mark product markup in class names, ids and attributes.
pub const DEFAULT_VOCABULARY: &[&str] = &[
    "product", "item", "goods", "prd", "prod", "card", "상품", "商品",
];

/// The full set of signals the extractor matches against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPatterns {
    /// Matched ASCII case-insensitively against the URL path.
    pub path_markers: Vec<String>,
    /// Matched exactly against query parameter names.
    pub query_keys: Vec<String>,
    /// Matched case-insensitively against markup in the fallback strategy.
    pub vocabulary: Vec<String>,
}

impl Default for ProductPatterns {
    fn default() -> Self {
        Self {
            path_markers: owned(DEFAULT_PATH_MARKERS),
            query_keys: owned(DEFAULT_QUERY_KEYS),
            vocabulary: owned(DEFAULT_VOCABULARY),
        }
    }
}

impl ProductPatterns {
    /// True when the path contains a product marker or the query carries a
    /// storefront product key.
    pub fn matches_url(&self, url: &Url) -> bool {
        self.matches_path(url.path()) || self.matches_query(url)
    }

    pub fn matches_path(&self, path: &str) -> bool {
        let path = path.to_ascii_lowercase();
        self.path_markers
            .iter()
            .any(|m| path.contains(&m.to_ascii_lowercase()))
    }

    pub fn matches_query(&self, url: &Url) -> bool {
        url.query_pairs()
            .any(|(key, _)| self.query_keys.iter().any(|k| k == key.as_ref()))
    }

    /// True when `text` mentions any vocabulary word.
    pub fn mentions_product(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.vocabulary
            .iter()
            .any(|w| text.contains(&w.to_lowercase()))
    }
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
