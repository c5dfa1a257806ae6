use quick_xml::events::Event;

pub const SITE_MAP_PATH: &str = "/sitemap.xml";
pub const ROBOTS_PATH: &str = "/robots.txt";

/// Structural verdict on a sitemap body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SitemapValidation {
    /// Balanced tags under exactly one root element
    pub well_formed: bool,
    /// Number of `<loc>` entries
    pub url_count: usize,
}

pub fn validate_sitemap(text: &str) -> SitemapValidation {
    let mut reader = quick_xml::Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut depth = 0usize;
    let mut roots = 0usize;
    let mut url_count = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if depth == 0 {
                    roots += 1;
                }
                if e.local_name().as_ref() == b"loc" {
                    url_count += 1;
                }
                depth += 1;
            }
            Ok(Event::Empty(_)) => {
                if depth == 0 {
                    roots += 1;
                }
            }
            Ok(Event::End(_)) => {
                if depth == 0 {
                    return SitemapValidation { well_formed: false, url_count };
                }
                depth -= 1;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                log::debug!(
                    "[SITEMAP] Malformed XML at byte {}: {}",
                    reader.buffer_position(),
                    e
                );
                return SitemapValidation { well_formed: false, url_count };
            }
        }
    }

    SitemapValidation {
        well_formed: depth == 0 && roots == 1,
        url_count,
    }
}
