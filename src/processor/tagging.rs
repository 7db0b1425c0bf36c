//! Topical tags for pages
//!
//! Two taggers are provided: a deterministic keyword ranker that needs nothing
//! but the text, and an LLM-backed tagger that falls back to the keyword ranker
//! whenever the model fails or answers with nothing usable.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use rig::agent::{Agent, AgentBuilder};
use rig::completion::{CompletionModel, Prompt};
use tracing::{debug, instrument, warn};

/// Derives a small set of lowercase topical labels from a page.
#[async_trait]
pub trait Tagger: Send + Sync {
    async fn tags(&self, title: &str, content: &str) -> Vec<String>;
}

const STOP_WORDS: &[&str] = &[
    "about", "above", "after", "again", "against", "all", "also", "and", "any", "are", "because",
    "been", "before", "being", "below", "between", "both", "but", "can", "could", "did", "does",
    "doing", "down", "during", "each", "few", "for", "from", "further", "had", "has", "have",
    "having", "her", "here", "hers", "herself", "him", "himself", "his", "how", "into", "its",
    "itself", "just", "more", "most", "not", "now", "off", "once", "only", "other", "our", "ours",
    "out", "over", "own", "same", "she", "should", "some", "such", "than", "that", "the", "their",
    "theirs", "them", "then", "there", "these", "they", "this", "those", "through", "too", "under",
    "until", "very", "was", "were", "what", "when", "where", "which", "while", "who", "whom", "why",
    "will", "with", "would", "you", "your", "yours", "yourself", "home", "page", "click", "here",
    "read", "more", "menu", "login", "sign", "www", "http", "https", "com",
];

const TITLE_WEIGHT: usize = 3;

/// Keep tags that are 3..=24 characters long and do not start with `-`,
/// lowercased and deduplicated, at most `max`.
pub fn sanitize_tags<'a>(candidates: impl IntoIterator<Item = &'a str>, max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .map(|tag| {
            tag.trim()
                .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '*' | '#' | '.'))
                .trim()
                .to_lowercase()
        })
        .filter(|tag| {
            let len = tag.chars().count();
            len > 2 && len < 25 && !tag.starts_with('-')
        })
        .filter(|tag| seen.insert(tag.clone()))
        .take(max)
        .collect()
}

/// Frequency-ranked keywords with stop words removed
#[derive(Debug, Clone)]
pub struct KeywordTagger {
    max_tags: usize,
}

impl KeywordTagger {
    pub fn new(max_tags: usize) -> Self {
        Self { max_tags }
    }

    /// Rank keywords of `title` and `content`. Title words count triple; ties
    /// keep the order of first appearance.
    pub fn rank(&self, title: &str, content: &str) -> Vec<String> {
        let stop: HashSet<&str> = STOP_WORDS.iter().copied().collect();
        let mut scores: HashMap<String, (usize, usize)> = HashMap::new();
        let mut order = 0usize;

        let mut count = |text: &str, weight: usize| {
            for token in text
                .split(|c: char| !c.is_alphanumeric())
                .map(str::to_lowercase)
                .filter(|t| {
                    let len = t.chars().count();
                    (3..=24).contains(&len)
                        && !stop.contains(t.as_str())
                        && !t.chars().all(|c| c.is_ascii_digit())
                })
            {
                let entry = scores.entry(token).or_insert_with(|| {
                    order += 1;
                    (0, order)
                });
                entry.0 += weight;
            }
        };
        count(title, TITLE_WEIGHT);
        count(content, 1);

        let mut ranked: Vec<_> = scores.into_iter().collect();
        ranked.sort_by(|(_, (score_a, first_a)), (_, (score_b, first_b))| {
            score_b.cmp(score_a).then(first_a.cmp(first_b))
        });
        ranked
            .into_iter()
            .take(self.max_tags)
            .map(|(token, _)| token)
            .collect()
    }
}

impl Default for KeywordTagger {
    fn default() -> Self {
        Self::new(5)
    }
}

#[async_trait]
impl Tagger for KeywordTagger {
    async fn tags(&self, title: &str, content: &str) -> Vec<String> {
        self.rank(title, content)
    }
}

const TAG_PREAMBLE: &str = "You label web pages with short topical tags. \
Answer with 3-5 relevant tags, comma-separated, lowercase, and nothing else.";

/// Characters of page content sent to the model
const PROMPT_CONTENT_CHARS: usize = 1000;

/// Asks a completion model for tags
pub struct CompletionTagger<C: CompletionModel> {
    agent: Agent<C>,
    fallback: KeywordTagger,
    max_tags: usize,
}

impl<C: CompletionModel> CompletionTagger<C> {
    pub fn new(model: C, max_tags: usize) -> Self {
        let agent = AgentBuilder::new(model)
            .preamble(TAG_PREAMBLE)
            .temperature(0.3)
            .build();
        Self {
            agent,
            fallback: KeywordTagger::new(max_tags),
            max_tags,
        }
    }

    fn prompt(title: &str, content: &str) -> String {
        let snippet: String = content.chars().take(PROMPT_CONTENT_CHARS).collect();
        format!("Title: {title}\nContent: {snippet}\n\nTags:")
    }
}

#[async_trait]
impl<C> Tagger for CompletionTagger<C>
where
    C: CompletionModel + 'static,
{
    #[instrument(skip(self, content))]
    async fn tags(&self, title: &str, content: &str) -> Vec<String> {
        match self.agent.prompt(Self::prompt(title, content)).await {
            Ok(answer) => {
                let tags = sanitize_tags(answer.split([',', '\n']), self.max_tags);
                if !tags.is_empty() {
                    debug!(?tags, "Model tags");
                    return tags;
                }
                debug!("Model returned no usable tags");
            }
            Err(e) => warn!(error = %e, "Tag generation failed"),
        }
        self.fallback.rank(title, content)
    }
}
