//! Atom feed decoding for query API responses.
//!
//! Only the handful of fields the crawler needs are read. Elements are matched
//! by local name, so the `opensearch:` and `arxiv:` prefixes do not matter.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use super::CrawlError;
use crate::models::RawEntry;

/// One decoded response page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Feed {
    /// `opensearch:totalResults`, the API's approximate result count
    pub total_results: Option<u64>,

    /// Entries in document order
    pub entries: Vec<RawEntry>,
}

/// Decode a response body into its entries
pub fn decode(body: &[u8]) -> Result<Vec<RawEntry>, CrawlError> {
    decode_feed(body).map(|feed| feed.entries)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextField {
    Id,
    Published,
    Updated,
    TotalResults,
}

#[derive(Debug, Default)]
struct Link {
    href: String,
    rel: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Default)]
struct EntryBuilder {
    entry: RawEntry,
    links: Vec<Link>,
}

impl EntryBuilder {
    fn finish(mut self) -> RawEntry {
        let alternate = self
            .links
            .iter()
            .position(|l| l.rel.as_deref() == Some("alternate"))
            .or_else(|| self.links.iter().position(|l| l.title.is_none()))
            .or(if self.links.is_empty() { None } else { Some(0) });

        if let Some(index) = alternate {
            self.entry.link = std::mem::take(&mut self.links[index].href);
        }
        self.entry
    }
}

/// Decode a response body into the reported total and its entries
///
/// A feed without entries is valid and yields an empty list. Bodies that are
/// not XML, lack a `<feed>` root, or end before the root is closed fail with
/// [`CrawlError::Decode`].
pub fn decode_feed(body: &[u8]) -> Result<Feed, CrawlError> {
    let mut reader = Reader::from_reader(body);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut feed = Feed::default();
    let mut opened = false;
    let mut closed = false;
    let mut entry: Option<EntryBuilder> = None;
    let mut field: Option<TextField> = None;
    let mut text = String::new();

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| {
            CrawlError::Decode(format!(
                "malformed feed near byte {}: {}",
                reader.buffer_position(),
                e
            ))
        })?;

        match event {
            Event::Eof => break,
            Event::Start(e) => {
                match e.local_name().as_ref() {
                    b"feed" => opened = true,
                    b"entry" => entry = Some(EntryBuilder::default()),
                    b"id" if entry.is_some() => field = Some(TextField::Id),
                    b"published" if entry.is_some() => field = Some(TextField::Published),
                    b"updated" if entry.is_some() => field = Some(TextField::Updated),
                    b"totalResults" if entry.is_none() => field = Some(TextField::TotalResults),
                    _ => on_element(&e, entry.as_mut())?,
                }
                if field.is_some() {
                    text.clear();
                }
            }
            Event::Empty(e) => on_element(&e, entry.as_mut())?,
            Event::Text(t) => {
                if field.is_some() {
                    let value = t
                        .unescape()
                        .map_err(|e| CrawlError::Decode(format!("bad text: {}", e)))?;
                    text.push_str(&value);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"feed" => closed = true,
                b"entry" => {
                    if let Some(builder) = entry.take() {
                        feed.entries.push(builder.finish());
                    }
                }
                b"id" | b"published" | b"updated" | b"totalResults" => {
                    if let Some(done) = field.take() {
                        store(done, std::mem::take(&mut text), &mut feed, entry.as_mut())?;
                    }
                }
                _ => {}
            },
            _ => {}
        }
        buf.clear();
    }

    if !opened {
        return Err(CrawlError::Decode("missing <feed> root element".to_string()));
    }
    if !closed {
        return Err(CrawlError::Decode("feed ended before </feed>".to_string()));
    }

    Ok(feed)
}

fn store(
    field: TextField,
    value: String,
    feed: &mut Feed,
    entry: Option<&mut EntryBuilder>,
) -> Result<(), CrawlError> {
    match (field, entry) {
        (TextField::TotalResults, _) => {
            let total = value.trim().parse::<u64>().map_err(|_| {
                CrawlError::Decode(format!("totalResults is not a count: '{}'", value))
            })?;
            feed.total_results = Some(total);
        }
        (TextField::Id, Some(builder)) => builder.entry.id_url = value,
        (TextField::Published, Some(builder)) => builder.entry.published = value,
        (TextField::Updated, Some(builder)) => builder.entry.updated = value,
        _ => {}
    }
    Ok(())
}

/// Attribute-carrying elements of an entry
fn on_element(element: &BytesStart<'_>, entry: Option<&mut EntryBuilder>) -> Result<(), CrawlError> {
    let Some(builder) = entry else {
        return Ok(());
    };

    match element.local_name().as_ref() {
        b"primary_category" => {
            if let Some(term) = attribute(element, b"term")? {
                builder.entry.primary_category = term;
            }
        }
        b"category" => {
            if let Some(term) = attribute(element, b"term")? {
                builder.entry.categories.push(term);
            }
        }
        b"link" => {
            if let Some(href) = attribute(element, b"href")? {
                builder.links.push(Link {
                    href,
                    rel: attribute(element, b"rel")?,
                    title: attribute(element, b"title")?,
                });
            }
        }
        _ => {}
    }
    Ok(())
}

fn attribute(element: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>, CrawlError> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| CrawlError::Decode(format!("bad attribute: {}", e)))?;
        if attr.key.local_name().as_ref() == name {
            let value = attr
                .unescape_value()
                .map_err(|e| CrawlError::Decode(format!("bad attribute value: {}", e)))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <link href="http://arxiv.org/api/query?search_query%3Dcat%3Acs.CR" rel="self" type="application/atom+xml"/>
  <title type="html">ArXiv Query: search_query=cat:cs.CR</title>
  <id>http://arxiv.org/api/feedid</id>
  <updated>2021-11-11T00:00:00-05:00</updated>
  <opensearch:totalResults xmlns:opensearch="http://a9.com/-/spec/opensearch/1.1/">42156</opensearch:totalResults>
  <opensearch:startIndex xmlns:opensearch="http://a9.com/-/spec/opensearch/1.1/">0</opensearch:startIndex>
  <opensearch:itemsPerPage xmlns:opensearch="http://a9.com/-/spec/opensearch/1.1/">2</opensearch:itemsPerPage>
  <entry>
    <id>http://arxiv.org/abs/2101.00001v1</id>
    <updated>2021-01-05T10:00:00Z</updated>
    <published>2021-01-01T09:30:00Z</published>
    <title>A &amp; B: secure things</title>
    <summary>Abstract text.</summary>
    <author><name>Ada Lovelace</name></author>
    <link href="http://arxiv.org/abs/2101.00001v1" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/2101.00001v1" rel="related" type="application/pdf"/>
    <arxiv:primary_category xmlns:arxiv="http://arxiv.org/schemas/atom" term="cs.CR" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.CR" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.LG" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/math/0701001v2</id>
    <updated>2007-01-03T00:00:00Z</updated>
    <published>2007-01-01T00:00:00Z</published>
    <title>Old style</title>
    <link title="pdf" href="http://arxiv.org/pdf/math/0701001v2" rel="related" type="application/pdf"/>
    <link href="http://arxiv.org/abs/math/0701001v2" rel="alternate" type="text/html"/>
    <arxiv:primary_category xmlns:arxiv="http://arxiv.org/schemas/atom" term="math.GT" scheme="http://arxiv.org/schemas/atom"/>
    <category term="math.GT" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
</feed>"#;

    #[test]
    fn test_decode_feed_entries() {
        let feed = decode_feed(PAGE.as_bytes()).unwrap();

        assert_eq!(feed.total_results, Some(42156));
        assert_eq!(feed.entries.len(), 2);

        let first = &feed.entries[0];
        assert_eq!(first.id_url, "http://arxiv.org/abs/2101.00001v1");
        assert_eq!(first.published, "2021-01-01T09:30:00Z");
        assert_eq!(first.updated, "2021-01-05T10:00:00Z");
        assert_eq!(first.primary_category, "cs.CR");
        assert_eq!(first.categories, vec!["cs.CR", "cs.LG"]);
        assert_eq!(first.link, "http://arxiv.org/abs/2101.00001v1");
    }

    #[test]
    fn test_alternate_link_preferred_regardless_of_order() {
        let entries = decode(PAGE.as_bytes()).unwrap();
        assert_eq!(entries[1].link, "http://arxiv.org/abs/math/0701001v2");
        assert_eq!(entries[1].primary_category, "math.GT");
    }

    #[test]
    fn test_feed_level_id_not_mistaken_for_entry() {
        let entries = decode(PAGE.as_bytes()).unwrap();
        assert!(entries.iter().all(|e| e.id_url != "http://arxiv.org/api/feedid"));
    }

    #[test]
    fn test_empty_feed_is_not_an_error() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>ArXiv Query</title>
  <opensearch:totalResults xmlns:opensearch="http://a9.com/-/spec/opensearch/1.1/">0</opensearch:totalResults>
</feed>"#;

        let feed = decode_feed(body.as_bytes()).unwrap();
        assert!(feed.entries.is_empty());
        assert_eq!(feed.total_results, Some(0));
        assert!(decode(body.as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn test_self_closing_feed() {
        let feed = decode_feed(br#"<feed xmlns="http://www.w3.org/2005/Atom"></feed>"#).unwrap();
        assert!(feed.entries.is_empty());
        assert_eq!(feed.total_results, None);
    }

    #[test]
    fn test_malformed_documents() {
        assert!(matches!(
            decode(b"this is not xml"),
            Err(CrawlError::Decode(_))
        ));
        assert!(matches!(
            decode(b"<feed><entry><id>x</title></entry></feed>"),
            Err(CrawlError::Decode(_))
        ));
        assert!(matches!(
            decode(b"<feed><entry><id>x</id>"),
            Err(CrawlError::Decode(_))
        ));
        assert!(matches!(
            decode(b"<html><body>Rate exceeded</body></html>"),
            Err(CrawlError::Decode(_))
        ));
    }

    #[test]
    fn test_bad_total_results() {
        let body = br#"<feed><totalResults>many</totalResults></feed>"#;
        assert!(matches!(decode_feed(body), Err(CrawlError::Decode(_))));
    }
}
