use scraper::{Html, Selector};
use std::sync::OnceLock;
use url::Url;

use crate::domain::models::DomSummary;

pub struct PageExtractor;

impl PageExtractor {
    /// Derive the DOM summary and raw ld+json blocks from rendered HTML.
    ///
    /// `Html` is not `Send`; callers must finish with it before awaiting.
    pub fn summarize(html: &str, page_url: &str) -> (DomSummary, Vec<String>) {
        let document = Html::parse_document(html);
        let (image_count, images_missing_alt) = Self::count_images(&document);
        let (internal_links, external_links) = Self::count_links(&document, page_url);

        let summary = DomSummary {
            title: Self::extract_title(&document),
            heading_counts: Self::count_headings(&document),
            word_count: Self::extract_word_count(&document),
            image_count,
            images_missing_alt,
            internal_links,
            external_links,
            canonical_url: Self::extract_canonical(&document),
            robots_meta: Self::extract_meta(&document, "robots"),
            viewport_meta: Self::extract_meta(&document, "viewport"),
        };

        (summary, Self::extract_structured_data(&document))
    }

    pub fn extract_title(html: &Html) -> Option<String> {
        static SELECTOR: OnceLock<Selector> = OnceLock::new();
        let selector = SELECTOR.get_or_init(|| Selector::parse("title").unwrap());
        html.select(selector)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Content of `<meta name="...">`, matched case-insensitively.
    pub fn extract_meta(html: &Html, name: &str) -> Option<String> {
        static SELECTOR: OnceLock<Selector> = OnceLock::new();
        let selector = SELECTOR.get_or_init(|| Selector::parse("meta[name]").unwrap());
        html.select(selector)
            .find(|el| {
                el.value()
                    .attr("name")
                    .is_some_and(|n| n.trim().eq_ignore_ascii_case(name))
            })
            .and_then(|el| el.value().attr("content"))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    pub fn extract_canonical(html: &Html) -> Option<String> {
        static SELECTOR: OnceLock<Selector> = OnceLock::new();
        let selector = SELECTOR.get_or_init(|| Selector::parse("link[rel='canonical']").unwrap());
        html.select(selector)
            .next()
            .and_then(|el| el.value().attr("href"))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    pub fn extract_word_count(html: &Html) -> u32 {
        static SELECTOR: OnceLock<Selector> = OnceLock::new();
        let selector = SELECTOR.get_or_init(|| Selector::parse("body").unwrap());
        html.select(selector)
            .next()
            .map(|body| body.text().collect::<String>().split_whitespace().count() as u32)
            .unwrap_or(0)
    }

    pub fn count_headings(html: &Html) -> [u32; 6] {
        static SELECTOR: OnceLock<Selector> = OnceLock::new();
        let selector = SELECTOR.get_or_init(|| Selector::parse("h1, h2, h3, h4, h5, h6").unwrap());

        let mut counts = [0u32; 6];
        for element in html.select(selector) {
            let level = element
                .value()
                .name()
                .trim_start_matches('h')
                .parse::<usize>()
                .ok();
            if let Some(level @ 1..=6) = level {
                counts[level - 1] += 1;
            }
        }
        counts
    }

    /// (total images, images without a non-empty alt)
    pub fn count_images(html: &Html) -> (u32, u32) {
        static SELECTOR: OnceLock<Selector> = OnceLock::new();
        let selector = SELECTOR.get_or_init(|| Selector::parse("img").unwrap());

        html.select(selector).fold((0, 0), |(total, missing), img| {
            let has_alt = img
                .value()
                .attr("alt")
                .is_some_and(|a| !a.trim().is_empty());
            let decorative = img.value().attr("role") == Some("presentation")
                || img.value().attr("aria-hidden") == Some("true");
            let missing_alt = !has_alt && !decorative;
            (total + 1, missing + u32::from(missing_alt))
        })
    }

    /// (internal, external) anchor counts relative to the page's host and port.
    pub fn count_links(html: &Html, page_url: &str) -> (u32, u32) {
        static SELECTOR: OnceLock<Selector> = OnceLock::new();
        let selector = SELECTOR.get_or_init(|| Selector::parse("a[href]").unwrap());

        let Ok(base) = Url::parse(page_url) else {
            return (0, 0);
        };

        let mut internal = 0;
        let mut external = 0;
        for element in html.select(selector) {
            let href = element.value().attr("href").unwrap_or("").trim();
            if href.is_empty()
                || href.starts_with('#')
                || href.starts_with("javascript:")
                || href.starts_with("mailto:")
                || href.starts_with("tel:")
            {
                continue;
            }
            let Ok(target) = base.join(href) else {
                continue;
            };
            if target.host_str() == base.host_str() && target.port() == base.port() {
                internal += 1;
            } else {
                external += 1;
            }
        }
        (internal, external)
    }

    /// Raw text of every `<script type="application/ld+json">` block.
    pub fn extract_structured_data(html: &Html) -> Vec<String> {
        static SELECTOR: OnceLock<Selector> = OnceLock::new();
        let selector = SELECTOR.get_or_init(|| Selector::parse("script[type]").unwrap());

        html.select(selector)
            .filter(|el| {
                el.value()
                    .attr("type")
                    .is_some_and(|t| t.trim().eq_ignore_ascii_case("application/ld+json"))
            })
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"
        <html>
            <head>
                <title>Family Dental Clinic</title>
                <meta name="Viewport" content="width=device-width, initial-scale=1">
                <meta name="robots" content="index, follow">
                <link rel="canonical" href="https://clinic.test/">
                <script type="application/ld+json">{"@type": "Dentist", "name": "Smile"}</script>
                <script type="application/LD+JSON">{"@type": "FAQPage",</script>
                <script type="text/javascript">var x = 1;</script>
            </head>
            <body>
                <h1>Welcome</h1>
                <h2>Services</h2><h2>Team</h2>
                <img src="a.jpg" alt="Dr. Smith">
                <img src="b.jpg">
                <img src="spacer.gif" role="presentation">
                <a href="/services">Services</a>
                <a href="https://clinic.test/team">Team</a>
                <a href="https://maps.example.com/">Directions</a>
                <a href="tel:555">Call</a>
                <a href="#top">Top</a>
            </body>
        </html>
    "##;

    #[test]
    fn summarizes_document_structure() {
        let (dom, _) = PageExtractor::summarize(PAGE, "https://clinic.test/");

        assert_eq!(dom.title.as_deref(), Some("Family Dental Clinic"));
        assert_eq!(dom.heading_counts, [1, 2, 0, 0, 0, 0]);
        assert_eq!(dom.image_count, 3);
        assert_eq!(dom.images_missing_alt, 1);
        assert_eq!(dom.internal_links, 2);
        assert_eq!(dom.external_links, 1);
        assert_eq!(dom.canonical_url.as_deref(), Some("https://clinic.test/"));
        assert_eq!(dom.robots_meta.as_deref(), Some("index, follow"));
        assert_eq!(
            dom.viewport_meta.as_deref(),
            Some("width=device-width, initial-scale=1")
        );
        assert!(!dom.is_noindex());
    }

    #[test]
    fn collects_every_ld_json_block_verbatim() {
        let (_, blocks) = PageExtractor::summarize(PAGE, "https://clinic.test/");

        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].contains("Dentist"));
        // Malformed blocks are kept; the schema check decides what to do with them
        assert_eq!(blocks[1], r#"{"@type": "FAQPage","#);
    }

    #[test]
    fn empty_document_yields_empty_summary() {
        let (dom, blocks) = PageExtractor::summarize("<html></html>", "https://clinic.test/");
        assert_eq!(dom.title, None);
        assert_eq!(dom.word_count, 0);
        assert!(blocks.is_empty());
    }
}
