use crate::domain::currency::CurrencyCode;
use crate::scrape::ScrapedProduct;
use anyhow::Context;
use regex::Regex;
use reqwest::Url;
use serde_json::{Map, Value};
use std::collections::HashMap;

const PRICE_KEYS: &[&str] = &["product:price:amount", "og:price:amount", "price"];
const CURRENCY_KEYS: &[&str] = &[
    "product:price:currency",
    "og:price:currency",
    "pricecurrency",
];
const NAME_KEYS: &[&str] = &["og:title", "twitter:title"];
const IMAGE_KEYS: &[&str] = &["og:image", "og:image:url", "twitter:image", "image"];

/// Pulls product fields out of raw HTML using JSON-LD first, then meta tags,
/// then `<title>`. Regexes are compiled once per extractor.
#[derive(Debug, Clone)]
pub struct ProductExtractor {
    meta_tag: Regex,
    attribute: Regex,
    json_ld: Regex,
    title: Regex,
}

impl ProductExtractor {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            meta_tag: Regex::new(r"(?is)<meta\b[^>]*>").context("meta tag regex")?,
            attribute: Regex::new(
                r#"(?is)([a-z_:][-a-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#,
            )
            .context("attribute regex")?,
            json_ld: Regex::new(
                r#"(?is)<script\b[^>]*type\s*=\s*["']?application/ld\+json["']?[^>]*>(.*?)</script>"#,
            )
            .context("json-ld regex")?,
            title: Regex::new(r"(?is)<title\b[^>]*>(.*?)</title>").context("title regex")?,
        })
    }

    pub fn extract(&self, html: &str, page_url: &Url) -> anyhow::Result<ScrapedProduct> {
        let meta = self.meta_content(html);
        let ld = self.json_ld_product(html);

        let name = ld
            .as_ref()
            .and_then(|p| p.get("name"))
            .and_then(Value::as_str)
            .map(clean_text)
            .filter(|s| !s.is_empty())
            .or_else(|| first_meta(&meta, NAME_KEYS).map(|s| clean_text(&s)))
            .or_else(|| {
                self.title
                    .captures(html)
                    .and_then(|c| c.get(1))
                    .map(|m| clean_text(m.as_str()))
            })
            .filter(|s| !s.is_empty())
            .context("no product name found on page")?;

        let offer = ld.as_ref().and_then(first_offer);

        let price = offer
            .and_then(offer_price)
            .or_else(|| first_meta(&meta, PRICE_KEYS).and_then(|s| parse_price(&s)));

        let currency = offer
            .and_then(|o| o.get("priceCurrency"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| first_meta(&meta, CURRENCY_KEYS))
            .and_then(|code| CurrencyCode::parse(&code).ok());

        let image_url = ld
            .as_ref()
            .and_then(|p| p.get("image"))
            .and_then(image_value)
            .or_else(|| first_meta(&meta, IMAGE_KEYS))
            .and_then(|raw| page_url.join(raw.trim()).ok())
            .map(|u| u.to_string());

        Ok(ScrapedProduct {
            name,
            price,
            currency,
            image_url,
        })
    }

    /// Maps `property`/`name`/`itemprop` (lowercased) to `content`; first tag wins.
    fn meta_content(&self, html: &str) -> HashMap<String, String> {
        let mut out = HashMap::new();
        for tag in self.meta_tag.find_iter(html) {
            let mut attrs: HashMap<String, String> = HashMap::new();
            for cap in self.attribute.captures_iter(tag.as_str()) {
                let Some(key) = cap.get(1) else { continue };
                let value = cap
                    .get(2)
                    .or_else(|| cap.get(3))
                    .or_else(|| cap.get(4))
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default();
                attrs.entry(key.as_str().to_ascii_lowercase()).or_insert(value);
            }

            let Some(content) = attrs.get("content") else {
                continue;
            };
            for key_attr in ["property", "name", "itemprop"] {
                if let Some(key) = attrs.get(key_attr) {
                    out.entry(key.to_ascii_lowercase())
                        .or_insert_with(|| content.clone());
                }
            }
        }
        out
    }

    fn json_ld_product(&self, html: &str) -> Option<Map<String, Value>> {
        self.json_ld
            .captures_iter(html)
            .filter_map(|c| c.get(1))
            .filter_map(|m| serde_json::from_str::<Value>(m.as_str().trim()).ok())
            .find_map(|v| find_product(&v).cloned())
    }
}

fn first_meta(meta: &HashMap<String, String>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| meta.get(*k))
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

fn is_product_type(v: &Value) -> bool {
    match v {
        Value::String(s) => s.eq_ignore_ascii_case("Product"),
        Value::Array(types) => types.iter().any(is_product_type),
        _ => false,
    }
}

fn find_product(v: &Value) -> Option<&Map<String, Value>> {
    match v {
        Value::Object(obj) => {
            if obj.get("@type").is_some_and(is_product_type) {
                return Some(obj);
            }
            obj.get("@graph").and_then(find_product)
        }
        Value::Array(arr) => arr.iter().find_map(find_product),
        _ => None,
    }
}

fn first_offer(product: &Map<String, Value>) -> Option<&Map<String, Value>> {
    match product.get("offers")? {
        Value::Object(o) => Some(o),
        Value::Array(arr) => arr.iter().find_map(Value::as_object),
        _ => None,
    }
}

fn offer_price(offer: &Map<String, Value>) -> Option<f64> {
    let price_spec = offer.get("priceSpecification").and_then(|s| match s {
        Value::Array(arr) => arr.first(),
        other => Some(other),
    });

    ["price", "lowPrice"]
        .iter()
        .filter_map(|k| offer.get(*k))
        .chain(price_spec.and_then(|s| s.get("price")))
        .find_map(json_price)
}

fn json_price(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64().filter(|p| p.is_finite() && *p >= 0.0),
        Value::String(s) => parse_price(s),
        _ => None,
    }
}

fn image_value(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Array(arr) => arr.iter().find_map(image_value),
        Value::Object(o) => o.get("url").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

/// Normalises a displayed price: `"$ 1,299.99"`, `"1.299,99 €"`, `"49,90"`.
pub fn parse_price(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let normalized = match (cleaned.rfind('.'), cleaned.rfind(',')) {
        (Some(dot), Some(comma)) if dot > comma => cleaned.replace(',', ""),
        (Some(_), Some(_)) => cleaned.replace('.', "").replace(',', "."),
        (None, Some(comma)) => {
            let decimals = cleaned.len() - comma - 1;
            if cleaned.matches(',').count() == 1 && (1..=2).contains(&decimals) {
                cleaned.replace(',', ".")
            } else {
                cleaned.replace(',', "")
            }
        }
        (Some(_), None) if cleaned.matches('.').count() > 1 => cleaned.replace('.', ""),
        _ => cleaned,
    };

    normalized
        .trim_matches('.')
        .parse::<f64>()
        .ok()
        .filter(|p| p.is_finite() && *p >= 0.0)
}

fn clean_text(raw: &str) -> String {
    let decoded = raw
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Url {
        Url::parse("https://shop.example/products/kettle").unwrap()
    }

    #[test]
    fn parse_price_handles_common_formats() {
        assert_eq!(parse_price("$ 49"), Some(49.0));
        assert_eq!(parse_price("1,299.99"), Some(1299.99));
        assert_eq!(parse_price("1.299,99 €"), Some(1299.99));
        assert_eq!(parse_price("49,90"), Some(49.9));
        assert_eq!(parse_price("12,000"), Some(12000.0));
        assert_eq!(parse_price("1.234.567"), Some(1234567.0));
        assert_eq!(parse_price("free"), None);
    }

    #[test]
    fn extracts_from_json_ld_graph() {
        let html = r#"
            <html><head>
            <title>Ignored title</title>
            <script type="application/ld+json">
            {"@context": "https://schema.org", "@graph": [
                {"@type": "BreadcrumbList"},
                {"@type": ["Product"], "name": "Steel Kettle &amp; Lid",
                 "image": ["/img/kettle.jpg"],
                 "offers": [{"@type": "Offer", "price": "39.95", "priceCurrency": "eur"}]}
            ]}
            </script>
            </head></html>"#;

        let p = ProductExtractor::new().unwrap().extract(html, &page()).unwrap();
        assert_eq!(p.name, "Steel Kettle & Lid");
        assert_eq!(p.price, Some(39.95));
        assert_eq!(p.currency.unwrap().as_str(), "EUR");
        assert_eq!(p.image_url.as_deref(), Some("https://shop.example/img/kettle.jpg"));
    }

    #[test]
    fn falls_back_to_meta_tags() {
        let html = r#"
            <meta content="Desk Lamp" property="og:title">
            <meta property='og:image' content='https://cdn.example/lamp.png'/>
            <meta property="product:price:amount" content="1.299,00">
            <meta property="product:price:currency" content="SEK">
            <title>Lamp | Shop</title>"#;

        let p = ProductExtractor::new().unwrap().extract(html, &page()).unwrap();
        assert_eq!(p.name, "Desk Lamp");
        assert_eq!(p.price, Some(1299.0));
        assert_eq!(p.currency.unwrap().as_str(), "SEK");
        assert_eq!(p.image_url.as_deref(), Some("https://cdn.example/lamp.png"));
    }

    #[test]
    fn uses_title_when_nothing_else_and_tolerates_missing_price() {
        let html = "<html><head><title>\n  Plain   page \n</title></head></html>";
        let p = ProductExtractor::new().unwrap().extract(html, &page()).unwrap();
        assert_eq!(p.name, "Plain page");
        assert_eq!(p.price, None);
        assert_eq!(p.currency, None);
    }

    #[test]
    fn itemprop_price_and_unknown_currency() {
        let html = r#"
            <meta itemprop="name" content="x"><meta itemprop="price" content="15">
            <meta itemprop="priceCurrency" content="BTCX">
            <meta name="twitter:title" content="Socks">"#;
        let p = ProductExtractor::new().unwrap().extract(html, &page()).unwrap();
        assert_eq!(p.name, "Socks");
        assert_eq!(p.price, Some(15.0));
        assert!(p.currency.is_none());
    }

    #[test]
    fn errors_without_any_name() {
        let html = "<html><body>nothing here</body></html>";
        assert!(ProductExtractor::new().unwrap().extract(html, &page()).is_err());
    }
}
