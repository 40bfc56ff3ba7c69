//! Deterministic in-memory transport for testing purposes.
//!
//! [`MockTransport`] serves a fixed, ordered result set the way the query API
//! does: pages are cut by `start`/`max_results`, descending requests see the
//! set from the end, and a zero page size returns only the count.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::{CrawlError, RawResponse, Transport};
use crate::models::{SearchParameters, SortOrder};

/// A scripted reply replacing the normal page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockReply {
    /// Connection failure
    Network,
    /// Non-success HTTP status
    Status(u16),
    /// Body that is not a feed
    Malformed,
    /// Valid feed with no entries
    Empty,
    /// Valid feed without an `opensearch:totalResults` element
    NoTotal,
}

/// Paper id of the record at `index` in the mock result set
pub fn paper_id(index: usize) -> String {
    format!("{}.{:05}", 2101 + index / 100_000, index % 100_000)
}

/// One Atom `<entry>` for the record at `index`
pub fn entry_xml(index: usize) -> String {
    let id = paper_id(index);
    format!(
        r#"  <entry>
    <id>http://arxiv.org/abs/{id}v1</id>
    <updated>2021-01-02T00:00:00Z</updated>
    <published>2021-01-01T00:00:00Z</published>
    <title>Paper {index}</title>
    <link href="http://arxiv.org/abs/{id}v1" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/{id}v1" rel="related" type="application/pdf"/>
    <arxiv:primary_category xmlns:arxiv="http://arxiv.org/schemas/atom" term="cs.CR" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.CR" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.LG" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
"#
    )
}

fn broken_entry_xml(index: usize) -> String {
    format!(
        r#"  <entry>
    <id>http://arxiv.org/broken-{index}</id>
    <updated>2021-01-02T00:00:00Z</updated>
    <published>2021-01-01T00:00:00Z</published>
    <link href="http://arxiv.org/broken-{index}" rel="alternate" type="text/html"/>
    <arxiv:primary_category xmlns:arxiv="http://arxiv.org/schemas/atom" term="cs.CR"/>
  </entry>
"#
    )
}

fn feed_document(total_results: u64, entries: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title type="html">ArXiv Query</title>
  <id>http://arxiv.org/api/mock</id>
  <updated>2021-11-11T00:00:00-05:00</updated>
  <opensearch:totalResults xmlns:opensearch="http://a9.com/-/spec/opensearch/1.1/">{total_results}</opensearch:totalResults>
{entries}</feed>
"#
    )
}

/// A complete feed document with the given record indices
pub fn feed_xml(total_results: u64, indices: impl IntoIterator<Item = usize>) -> String {
    let entries: String = indices.into_iter().map(entry_xml).collect();
    feed_document(total_results, &entries)
}

/// In-memory query API
#[derive(Debug)]
pub struct MockTransport {
    available: usize,
    reported_total: u64,
    broken: HashSet<usize>,
    replies: HashMap<usize, MockReply>,
    fail_from: Option<(usize, MockReply)>,
    cancel_on: Option<(usize, CancellationToken)>,
    requests: Mutex<Vec<SearchParameters>>,
}

impl MockTransport {
    /// Serve `available` records and report the same total
    pub fn new(available: usize) -> Self {
        Self {
            available,
            reported_total: available as u64,
            broken: HashSet::new(),
            replies: HashMap::new(),
            fail_from: None,
            cancel_on: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Report a different total than what is actually served
    pub fn reported_total(mut self, total: u64) -> Self {
        self.reported_total = total;
        self
    }

    /// Serve the record at `index` with an unparseable identifier
    pub fn broken_entry(mut self, index: usize) -> Self {
        self.broken.insert(index);
        self
    }

    /// Replace the reply to request number `request` (1-based)
    pub fn reply(mut self, request: usize, reply: MockReply) -> Self {
        self.replies.insert(request, reply);
        self
    }

    /// Replace every reply from request number `request` onwards
    pub fn fail_from(mut self, request: usize, reply: MockReply) -> Self {
        self.fail_from = Some((request, reply));
        self
    }

    /// Cancel `token` while serving request number `request`
    pub fn cancel_on(mut self, request: usize, token: CancellationToken) -> Self {
        self.cancel_on = Some((request, token));
        self
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<SearchParameters> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Number of requests received so far
    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }

    fn page(&self, params: &SearchParameters) -> String {
        let end = params
            .start
            .saturating_add(params.max_results)
            .min(self.available);
        let entries: String = (params.start.min(end)..end)
            .map(|position| match params.sort_order {
                SortOrder::Ascending => position,
                SortOrder::Descending => self.available - 1 - position,
            })
            .map(|index| {
                if self.broken.contains(&index) {
                    broken_entry_xml(index)
                } else {
                    entry_xml(index)
                }
            })
            .collect();
        feed_document(self.reported_total, &entries)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, params: &SearchParameters) -> Result<RawResponse, CrawlError> {
        let number = {
            let mut requests = self
                .requests
                .lock()
                .map_err(|_| CrawlError::Network("mock poisoned".to_string()))?;
            requests.push(params.clone());
            requests.len()
        };

        if let Some((at, token)) = &self.cancel_on {
            if *at == number {
                token.cancel();
            }
        }

        let scripted = self.replies.get(&number).copied().or(match self.fail_from {
            Some((from, reply)) if number >= from => Some(reply),
            _ => None,
        });

        let body = match scripted {
            Some(MockReply::Network) => {
                return Err(CrawlError::Network("connection reset by mock".to_string()))
            }
            Some(MockReply::Status(status)) => return Err(CrawlError::Http { status }),
            Some(MockReply::Malformed) => "<html><body>Service hiccup</body></html>".to_string(),
            Some(MockReply::Empty) => feed_document(self.reported_total, ""),
            Some(MockReply::NoTotal) => feed_document(self.reported_total, "")
                .lines()
                .filter(|line| !line.contains("totalResults"))
                .collect::<Vec<_>>()
                .join("\n"),
            None => self.page(params),
        };

        Ok(RawResponse {
            status: 200,
            body: body.into_bytes(),
        })
    }
}
