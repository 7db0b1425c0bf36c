//! Content extraction functionality for the crawler module
//!
//! Everything here is synchronous and returns owned data; parsed documents
//! never live across an await point.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::trace;
use url::Url;

use crate::media::{MediaKind, MediaRef};

/// Subtrees dropped before text is collected
const BOILERPLATE_TAGS: [&str; 6] = ["script", "style", "nav", "footer", "header", "noscript"];

/// Direct media file extensions recognised during discovery
pub const MEDIA_EXTENSIONS: [&str; 9] = [
    ".mp3", ".mp4", ".webm", ".wav", ".ogg", ".m4a", ".avi", ".mov", ".flv",
];

const AUDIO_EXTENSIONS: [&str; 4] = [".mp3", ".wav", ".ogg", ".m4a"];

/// Title and visible text of a page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedContent {
    pub title: String,
    pub content: String,
}

/// Limits applied while analysing one page
#[derive(Debug, Clone)]
pub struct ExtractionOptions {
    pub max_content_chars: usize,
    pub max_media: usize,
    pub max_links_examined: usize,
    pub scan_media: bool,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            max_content_chars: 50_000,
            max_media: 3,
            max_links_examined: 100,
            scan_media: true,
        }
    }
}

/// Everything the crawler needs from one rendered page
#[derive(Debug, Clone, Default)]
pub struct PageAnalysis {
    pub content: ExtractedContent,
    pub media_refs: Vec<MediaRef>,
    pub links: Vec<Url>,
}

/// Parse `html` once and extract content, media references and links.
pub fn analyze_page(html: &str, page_url: &Url, options: &ExtractionOptions) -> PageAnalysis {
    let document = Html::parse_document(html);
    let media_refs = if options.scan_media {
        media_refs_in(&document, page_url, options.max_media)
    } else {
        Vec::new()
    };
    PageAnalysis {
        content: content_in(&document, options.max_content_chars),
        media_refs,
        links: links_in(&document, page_url, options.max_links_examined),
    }
}

/// Extract the title and boilerplate-free text of a page.
pub fn extract_content(html: &str, max_chars: usize) -> ExtractedContent {
    content_in(&Html::parse_document(html), max_chars)
}

/// Discover up to `limit` media references, resolved against `base_url`.
pub fn extract_media_refs(html: &str, base_url: &Url, limit: usize) -> Vec<MediaRef> {
    media_refs_in(&Html::parse_document(html), base_url, limit)
}

/// Resolve the first `limit` anchors of a page against `page_url`.
pub fn extract_links(html: &str, page_url: &Url, limit: usize) -> Vec<Url> {
    links_in(&Html::parse_document(html), page_url, limit)
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn content_in(document: &Html, max_chars: usize) -> ExtractedContent {
    let title = selector("title")
        .and_then(|s| document.select(&s).next())
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default();

    let root = ["main", "article", "body"]
        .iter()
        .filter_map(|css| selector(css))
        .find_map(|s| document.select(&s).next())
        .unwrap_or_else(|| document.root_element());

    let mut pieces = Vec::new();
    collect_text(root, &mut pieces);
    let content: String = pieces.join(" ");
    let content = if content.chars().count() > max_chars {
        content.chars().take(max_chars).collect()
    } else {
        content
    };

    ExtractedContent { title, content }
}

fn collect_text(element: ElementRef<'_>, out: &mut Vec<String>) {
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            if BOILERPLATE_TAGS.contains(&child_element.value().name()) {
                continue;
            }
            collect_text(child_element, out);
        } else if let Some(text) = child.value().as_text() {
            let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
            if !text.is_empty() {
                out.push(text);
            }
        }
    }
}

fn youtube_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?:youtube(?:-nocookie)?\.com/watch\?v=|youtu\.be/|youtube(?:-nocookie)?\.com/embed/)([^&\n?#/]+)",
            r"youtube(?:-nocookie)?\.com/.*[?&]v=([^&\n?#]+)",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

fn vimeo_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"vimeo\.com/(?:video/)?(\d+)").ok())
        .as_ref()
}

/// Map an embedded player URL to the canonical page on its video host.
pub fn canonical_video_url(src: &str) -> Option<MediaRef> {
    for pattern in youtube_patterns() {
        if let Some(id) = pattern.captures(src).and_then(|c| c.get(1)) {
            return Some(MediaRef {
                url: format!("https://www.youtube.com/watch?v={}", id.as_str()),
                kind: MediaKind::Youtube,
            });
        }
    }
    let id = vimeo_pattern()?.captures(src)?.get(1)?;
    Some(MediaRef {
        url: format!("https://vimeo.com/{}", id.as_str()),
        kind: MediaKind::Vimeo,
    })
}

fn has_media_extension(url: &Url, extensions: &[&str]) -> bool {
    let path = url.path().to_lowercase();
    extensions.iter().any(|ext| path.ends_with(ext))
}

fn media_refs_in(document: &Html, base_url: &Url, limit: usize) -> Vec<MediaRef> {
    let mut found = Vec::new();
    let mut seen = HashSet::new();
    let mut add = |media: MediaRef, found: &mut Vec<MediaRef>| {
        if found.len() < limit && seen.insert(media.url.clone()) {
            trace!(url = %media.url, kind = %media.kind, "Discovered media");
            found.push(media);
        }
    };

    let source = selector("source[src]");
    for (tag, kind) in [("audio", MediaKind::Audio), ("video", MediaKind::Video)] {
        let Some(tag_selector) = selector(tag) else {
            continue;
        };
        for element in document.select(&tag_selector) {
            let nested = source
                .as_ref()
                .map(|s| element.select(s).filter_map(|el| el.value().attr("src")).collect::<Vec<_>>())
                .unwrap_or_default();
            for src in element.value().attr("src").into_iter().chain(nested) {
                if let Ok(url) = base_url.join(src.trim()) {
                    if has_media_extension(&url, &MEDIA_EXTENSIONS) {
                        add(MediaRef { url: url.to_string(), kind }, &mut found);
                    }
                }
            }
        }
    }

    if let Some(iframe) = selector("iframe") {
        for element in document.select(&iframe) {
            let src = element
                .value()
                .attr("src")
                .or_else(|| element.value().attr("data-src"));
            let Some(src) = src else { continue };
            let resolved = base_url
                .join(src.trim())
                .map(|u| u.to_string())
                .unwrap_or_else(|_| src.to_string());
            if let Some(media) = canonical_video_url(&resolved) {
                add(media, &mut found);
            }
        }
    }

    if let Some(data_src) = selector("[data-src]") {
        for element in document.select(&data_src) {
            let Some(src) = element.value().attr("data-src") else {
                continue;
            };
            let Ok(url) = base_url.join(src.trim()) else {
                continue;
            };
            if !has_media_extension(&url, &MEDIA_EXTENSIONS) {
                continue;
            }
            let kind = if has_media_extension(&url, &AUDIO_EXTENSIONS) {
                MediaKind::Audio
            } else {
                MediaKind::Video
            };
            add(MediaRef { url: url.to_string(), kind }, &mut found);
        }
    }

    found
}

fn links_in(document: &Html, page_url: &Url, limit: usize) -> Vec<Url> {
    let Some(anchor) = selector("a[href]") else {
        return Vec::new();
    };
    document
        .select(&anchor)
        .take(limit)
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| page_url.join(href.trim()).ok())
        .collect()
}
