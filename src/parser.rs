use scraper::{Html, Selector};
use url::Url;

/// Links and word tokens from a fetched page body.
pub trait HtmlExtractor: Send + Sync {
    /// Absolute, defragmented link targets in document order.
    fn links(&self, content: &str, base_url: &str) -> Vec<String>;

    /// Lowercase word tokens of the page's visible text.
    fn text(&self, content: &str) -> Vec<String>;
}

#[derive(Debug)]
pub struct HtmlParser {
    anchors: Selector,
    body: Selector,
}

impl Default for HtmlParser {
    fn default() -> Self {
        Self::new()
    }
}

impl HtmlParser {
    pub fn new() -> Self {
        Self {
            anchors: Selector::parse("a[href]").expect("Invalid CSS selector"),
            body: Selector::parse("body").expect("Invalid CSS selector"),
        }
    }
}

const SKIPPED_SCHEMES: [&str; 5] = ["javascript:", "mailto:", "tel:", "data:", "file:"];

fn is_skipped_href(href: &str) -> bool {
    let lower = href.to_ascii_lowercase();
    href.is_empty() || href.starts_with('#') || SKIPPED_SCHEMES.iter().any(|s| lower.starts_with(s))
}

/// Split text into lowercase alphanumeric words, keeping inner apostrophes.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|word| word.trim_matches('\''))
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect()
}

impl HtmlExtractor for HtmlParser {
    fn links(&self, content: &str, base_url: &str) -> Vec<String> {
        let base = match Url::parse(base_url) {
            Ok(base) => base,
            Err(_) => return Vec::new(),
        };
        let document = Html::parse_document(content);

        let mut links = Vec::new();
        for element in document.select(&self.anchors) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let href = href.trim();
            if is_skipped_href(href) {
                continue;
            }
            if let Ok(mut resolved) = base.join(href) {
                resolved.set_fragment(None);
                links.push(resolved.to_string());
            }
        }
        links
    }

    fn text(&self, content: &str) -> Vec<String> {
        let document = Html::parse_document(content);
        let mut tokens = Vec::new();

        // Script and style bodies are text nodes too; skip any node under them.
        let roots: Vec<_> = document.select(&self.body).collect();
        let roots = if roots.is_empty() {
            vec![document.root_element()]
        } else {
            roots
        };

        for root in roots {
            for node in root.descendants() {
                let Some(text) = node.value().as_text() else {
                    continue;
                };
                let hidden = node.ancestors().any(|ancestor| {
                    ancestor
                        .value()
                        .as_element()
                        .map(|el| matches!(el.name(), "script" | "style" | "noscript"))
                        .unwrap_or(false)
                });
                if !hidden {
                    tokens.extend(tokenize(text));
                }
            }
        }
        tokens
    }
}
