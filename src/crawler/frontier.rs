//! Crawl frontier: pending queue, visited set and per-URL failure counts

use std::collections::{HashMap, HashSet, VecDeque};

use url::Url;

/// Normalize a URL to `scheme://host[:port]/path` with the trailing slash,
/// query and fragment removed. Returns `None` for non-http(s) or unparsable input.
pub fn normalize_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    normalize_parsed(&url)
}

pub(crate) fn normalize_parsed(url: &Url) -> Option<String> {
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let host = url.host_str()?;
    let authority = match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    let normalized = format!("{}://{}{}", url.scheme(), authority, url.path());
    Some(normalized.trim_end_matches('/').to_string())
}

/// Whether `candidate` has the same host and explicit port as `origin`.
/// The scheme is ignored, so an http link on an https site stays in scope.
pub fn same_domain(origin: &Url, candidate: &Url) -> bool {
    origin.host_str() == candidate.host_str() && origin.port() == candidate.port()
}

/// A URL waiting to be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    /// Dedup key
    pub normalized: String,

    /// URL as discovered, used for the fetch
    pub fetch_url: String,
}

/// FIFO frontier owned by a single crawl run
#[derive(Debug)]
pub struct Frontier {
    queue: VecDeque<FrontierEntry>,
    queued: HashSet<String>,
    visited: HashSet<String>,
    failed_attempts: HashMap<String, u32>,
    max_pending: usize,
    max_retries: u32,
}

impl Frontier {
    pub fn new(max_pending: usize, max_retries: u32) -> Self {
        Self {
            queue: VecDeque::new(),
            queued: HashSet::new(),
            visited: HashSet::new(),
            failed_attempts: HashMap::new(),
            max_pending,
            max_retries,
        }
    }

    /// Enqueue a newly discovered URL. Returns `false` when it was already
    /// seen, exhausted, or the frontier is full.
    pub fn push(&mut self, fetch_url: &str) -> bool {
        let Some(normalized) = normalize_url(fetch_url) else {
            return false;
        };
        if self.queue.len() >= self.max_pending
            || self.visited.contains(&normalized)
            || self.queued.contains(&normalized)
            || self.is_exhausted(&normalized)
        {
            return false;
        }
        self.queued.insert(normalized.clone());
        self.queue.push_back(FrontierEntry {
            normalized,
            fetch_url: fetch_url.to_string(),
        });
        true
    }

    /// Take the next entry in discovery order.
    pub fn pop(&mut self) -> Option<FrontierEntry> {
        let entry = self.queue.pop_front()?;
        self.queued.remove(&entry.normalized);
        Some(entry)
    }

    /// Whether the entry must not be fetched (already visited or out of retries)
    pub fn should_skip(&self, entry: &FrontierEntry) -> bool {
        self.visited.contains(&entry.normalized) || self.is_exhausted(&entry.normalized)
    }

    pub fn mark_visited(&mut self, entry: &FrontierEntry) {
        self.visited.insert(entry.normalized.clone());
    }

    /// Record a failed fetch and return the attempt count so far.
    pub fn record_failure(&mut self, entry: &FrontierEntry) -> u32 {
        let attempts = self
            .failed_attempts
            .entry(entry.normalized.clone())
            .or_insert(0);
        *attempts += 1;
        *attempts
    }

    /// Make the URL permanently ineligible for this run.
    pub fn mark_exhausted(&mut self, entry: &FrontierEntry) {
        self.failed_attempts
            .insert(entry.normalized.clone(), self.max_retries);
    }

    pub fn is_exhausted(&self, normalized: &str) -> bool {
        self.failed_attempts
            .get(normalized)
            .is_some_and(|attempts| *attempts >= self.max_retries)
    }

    /// Put a failed entry back at the end of the queue for another attempt.
    pub fn retry_later(&mut self, entry: FrontierEntry) -> bool {
        if self.is_exhausted(&entry.normalized) || self.queued.contains(&entry.normalized) {
            return false;
        }
        self.visited.remove(&entry.normalized);
        self.queued.insert(entry.normalized.clone());
        self.queue.push_back(entry);
        true
    }

    /// Put an entry back at the front of the queue so it is fetched next.
    pub fn retry_now(&mut self, entry: FrontierEntry) {
        self.visited.remove(&entry.normalized);
        self.queued.insert(entry.normalized.clone());
        self.queue.push_front(entry);
    }

    pub fn visited(&self) -> &HashSet<String> {
        &self.visited
    }

    pub fn attempts(&self, normalized: &str) -> u32 {
        self.failed_attempts.get(normalized).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
