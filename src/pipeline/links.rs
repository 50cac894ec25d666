//! Product-link discovery on a listing page.
//!
//! Two strategies run in order and the first one that finds anything wins:
//!
//! 1. **Pattern** — same-host links whose path carries a product marker
//!    (`/products/`, `/goods/`, …) or whose query carries a storefront
//!    product key (`product_no`, `goodsNo`, …).
//! 2. **Fallback** — only when the pattern strategy found nothing:
//!    same-host links that wrap an image and mention product vocabulary, or
//!    that sit inside a container whose class/id mentions it.
//!
//! The result is deduplicated on the normalized URL and sorted
//! lexicographically, so identical HTML always yields the identical list.
//! That order is what sequence indices are later assigned from.

use crate::error::CollectionError;
use crate::output::{normalize_url, CandidateLink, DiscoveryStrategy};
use crate::patterns::ProductPatterns;
use crate::pipeline::fetch::{decode_page, PageFetcher};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeSet;
use tracing::{debug, info};
use url::Url;

static ANCHORS: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static IMAGES: Lazy<Selector> = Lazy::new(|| Selector::parse("img").unwrap());
static BASE: Lazy<Selector> = Lazy::new(|| Selector::parse("base[href]").unwrap());

/// Fetch `listing_url` and extract its candidate product links.
///
/// An empty result is not an error here; the caller decides.
pub async fn extract(
    listing_url: &Url,
    fetcher: &dyn PageFetcher,
    patterns: &ProductPatterns,
) -> Result<Vec<CandidateLink>, CollectionError> {
    let page = fetcher.fetch(listing_url).await?;
    let (html, encoding) = decode_page(&page);
    debug!("Decoded listing page as {}", encoding.name());

    let mut links = extract_links(&html, &page.final_url, patterns);
    if page.final_url != *listing_url {
        let original = normalize_url(listing_url.clone());
        links.retain(|l| l.url != original);
    }

    info!("Discovered {} candidate product links", links.len());
    Ok(links)
}

/// Apply the heuristic to already-decoded HTML.
///
/// `page_url` is both the default base for relative links and the host
/// every kept link must share.
pub fn extract_links(html: &str, page_url: &Url, patterns: &ProductPatterns) -> Vec<CandidateLink> {
    let document = Html::parse_document(html);
    let base = base_url(&document, page_url);
    let own = normalize_url(page_url.clone());

    let anchors: Vec<(ElementRef, Url)> = document
        .select(&ANCHORS)
        .filter_map(|a| {
            let href = a.value().attr("href")?;
            let url = resolve_href(&base, href)?;
            let url = normalize_url(url);
            (url.host_str() == page_url.host_str() && url != own).then_some((a, url))
        })
        .collect();

    let by_pattern: BTreeSet<CandidateLink> = anchors
        .iter()
        .filter(|(_, url)| patterns.matches_url(url))
        .map(|(_, url)| CandidateLink::new(url.clone(), DiscoveryStrategy::Pattern))
        .collect();

    if !by_pattern.is_empty() {
        debug!("Pattern strategy matched {} links", by_pattern.len());
        return by_pattern.into_iter().collect();
    }

    let by_fallback: BTreeSet<CandidateLink> = anchors
        .iter()
        .filter(|(a, _)| image_link_mentions_product(a, patterns) || inside_product_container(a, patterns))
        .map(|(_, url)| CandidateLink::new(url.clone(), DiscoveryStrategy::Fallback))
        .collect();

    debug!(
        "Pattern strategy matched nothing; fallback matched {} links",
        by_fallback.len()
    );
    by_fallback.into_iter().collect()
}

/// `<base href>` if present and valid, else the page URL.
fn base_url(document: &Html, page_url: &Url) -> Url {
    document
        .select(&BASE)
        .next()
        .and_then(|b| b.value().attr("href"))
        .and_then(|href| page_url.join(href.trim()).ok())
        .unwrap_or_else(|| page_url.clone())
}

/// Resolve an href to an absolute http(s) URL.
fn resolve_href(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }
    let url = base.join(href).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

/// Fallback (a): the link wraps an image and its text, descriptive
/// attributes, or its parent's class mention product vocabulary.
fn image_link_mentions_product(anchor: &ElementRef, patterns: &ProductPatterns) -> bool {
    if anchor.select(&IMAGES).next().is_none() {
        return false;
    }
    if patterns.mentions_product(&descriptive_text(anchor)) {
        return true;
    }
    anchor
        .parent()
        .and_then(ElementRef::wrap)
        .and_then(|p| p.value().attr("class"))
        .is_some_and(|class| patterns.mentions_product(class))
}

/// Element text plus `class`, `id`, `alt` and `title` of the anchor and
/// everything inside it. URLs (`href`, `src`) are left out.
fn descriptive_text(anchor: &ElementRef) -> String {
    let mut parts: Vec<&str> = anchor.text().collect();
    for el in anchor.descendants().filter_map(ElementRef::wrap) {
        let v = el.value();
        parts.extend(["class", "id", "alt", "title"].iter().filter_map(|name| v.attr(name)));
    }
    parts.join(" ")
}

/// Fallback (b): some ancestor below `<body>` has product vocabulary in its
/// class or id.
fn inside_product_container(anchor: &ElementRef, patterns: &ProductPatterns) -> bool {
    anchor
        .ancestors()
        .filter_map(ElementRef::wrap)
        .take_while(|el| !matches!(el.value().name(), "body" | "html"))
        .any(|el| {
            let v = el.value();
            v.attr("class").is_some_and(|c| patterns.mentions_product(c))
                || v.attr("id").is_some_and(|i| patterns.mentions_product(i))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "https://shop.test/collections/all";

    fn run(html: &str) -> Vec<CandidateLink> {
        extract_links(html, &Url::parse(LISTING).unwrap(), &ProductPatterns::default())
    }

    fn urls(links: &[CandidateLink]) -> Vec<&str> {
        links.iter().map(|l| l.as_str()).collect()
    }

    #[test]
    fn pattern_links_sorted_and_deduped() {
        let html = r##"
            <a href="/products/zebra">Z</a>
            <a href="/products/apple#reviews">A</a>
            <a href="https://shop.test/products/apple">A again</a>
            <a href="https://shop.test:443/products/mango">M</a>
            <a href="/pages/about">About</a>
        "##;
        let links = run(html);
        assert_eq!(
            urls(&links),
            vec![
                "https://shop.test/products/apple",
                "https://shop.test/products/mango",
                "https://shop.test/products/zebra",
            ]
        );
        assert!(links.iter().all(|l| l.strategy == DiscoveryStrategy::Pattern));
    }

    #[test]
    fn other_hosts_are_ignored() {
        let html = r#"
            <a href="https://other.test/products/a">elsewhere</a>
            <a href="https://cdn.shop.test/products/b">cdn</a>
            <a href="/products/c">ours</a>
        "#;
        assert_eq!(urls(&run(html)), vec!["https://shop.test/products/c"]);
    }

    #[test]
    fn storefront_query_key_matches() {
        let html = r#"
            <a href="/shop/detail.html?product_no=12&cate_no=4">p12</a>
            <a href="/shop/list.html?cate_no=4">category</a>
            <a href="/exec/front/view.php?goodsNo=1000">g</a>
        "#;
        assert_eq!(
            urls(&run(html)),
            vec![
                "https://shop.test/exec/front/view.php?goodsNo=1000",
                "https://shop.test/shop/detail.html?product_no=12&cate_no=4",
            ]
        );
    }

    #[test]
    fn own_url_and_non_http_links_excluded() {
        let html = r##"
            <a href="/collections/all">self</a>
            <a href="#top">top</a>
            <a href="javascript:void(0)">js</a>
            <a href="mailto:shop@shop.test">mail</a>
        "##;
        assert!(run(html).is_empty());
    }

    #[test]
    fn base_element_changes_resolution() {
        let html = r#"
            <head><base href="https://shop.test/kr/"></head>
            <body><a href="products/kimchi">k</a></body>
        "#;
        assert_eq!(urls(&run(html)), vec!["https://shop.test/kr/products/kimchi"]);
    }

    #[test]
    fn fallback_image_link_with_vocabulary() {
        let html = r#"
            <body>
              <a href="/shop/1001"><img src="/img/1001.jpg" alt="상품 이미지"></a>
              <a href="/shop/1002"><img src="/img/banner.jpg" alt="banner"></a>
              <a href="/shop/1003">text only product</a>
            </body>
        "#;
        let links = run(html);
        assert_eq!(urls(&links), vec!["https://shop.test/shop/1001"]);
        assert_eq!(links[0].strategy, DiscoveryStrategy::Fallback);
    }

    #[test]
    fn fallback_ignores_vocabulary_in_urls() {
        let html = r#"
            <body>
              <a href="/pages/gift-card"><img src="/img/hero.jpg" alt="Holiday"></a>
              <a href="/shop/77"><img src="/img/product-card.jpg"></a>
              <a href="/shop/78" title="Product detail"><img src="/img/78.jpg"></a>
            </body>
        "#;
        assert_eq!(urls(&run(html)), vec!["https://shop.test/shop/78"]);
    }

    #[test]
    fn fallback_container_class() {
        let html = r#"
            <body class="product-page">
              <nav><a href="/about">About</a></nav>
              <ul class="prdList grid4">
                <li><a href="/shop/2">Two</a></li>
                <li><a href="/shop/1">One</a></li>
              </ul>
            </body>
        "#;
        assert_eq!(
            urls(&run(html)),
            vec!["https://shop.test/shop/1", "https://shop.test/shop/2"]
        );
    }

    #[test]
    fn fallback_not_used_when_pattern_matches() {
        let html = r#"
            <div class="product-grid">
              <a href="/shop/1"><img src="a.jpg" alt="product"></a>
            </div>
            <a href="/products/real">real</a>
        "#;
        let links = run(html);
        assert_eq!(urls(&links), vec!["https://shop.test/products/real"]);
        assert_eq!(links[0].strategy, DiscoveryStrategy::Pattern);
    }

    #[test]
    fn extraction_is_deterministic() {
        let html = r#"
            <a href="/products/c">c</a><a href="/products/a">a</a>
            <a href="/products/b">b</a><a href="/products/a#x">a</a>
        "#;
        let first = run(html);
        for _ in 0..5 {
            assert_eq!(urls(&run(html)), urls(&first));
        }
    }

    #[test]
    fn empty_page_is_empty_result() {
        assert!(run("<html><body><p>Nothing here</p></body></html>").is_empty());
    }
}
