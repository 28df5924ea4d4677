//! Candidate payloads for the action cycle.
//!
//! A [`PayloadSet`] is an immutable, shared word list. Refreshes swap in a new
//! set wholesale; nothing ever edits one in place, so an index recorded
//! against an old set can only go stale, never point at a shifted entry.

pub mod remote;

use std::sync::Arc;

use rand::Rng;
use tracing::{info, warn};

pub use remote::{parse_word_payload, spawn_refresher, RemoteWordList};

const DEFAULT_WORDS: &[&str] = &[
    "apple", "banana", "computer", "database", "elephant", "forest", "guitar", "horizon",
    "island", "journey", "kitchen", "library", "mountain", "notebook", "ocean", "penguin",
    "question", "rainbow", "satellite", "telescope", "umbrella", "volcano", "waterfall",
    "xylophone", "yesterday", "zebra", "astronomy", "bicycle", "chocolate", "dinosaur",
];

/// The built-in fallback word list.
pub fn default_words() -> PayloadSet {
    PayloadSet(DEFAULT_WORDS.iter().map(|w| w.to_string()).collect())
}

// ---------------------------------------------------------------------------
// PayloadSet
// ---------------------------------------------------------------------------

/// A non-empty, ordered, immutable list of payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadSet(Arc<[String]>);

impl PayloadSet {
    /// Build a set from raw words. Entries are trimmed and blanks dropped;
    /// returns `None` if nothing is left.
    pub fn from_words<I>(words: I) -> Option<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let cleaned: Vec<String> = words
            .into_iter()
            .map(|w| w.trim().to_string())
            .filter(|w| !w.is_empty())
            .collect();
        if cleaned.is_empty() {
            None
        } else {
            Some(Self(cleaned.into()))
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Pick a uniformly random index, avoiding `exclude` when there is more
    /// than one entry. A single-entry set always yields index 0.
    pub fn pick_next<R: Rng + ?Sized>(&self, exclude: Option<usize>, rng: &mut R) -> (usize, String) {
        let len = self.len();
        let index = match exclude {
            _ if len <= 1 => 0,
            Some(ex) if ex < len => {
                let i = rng.gen_range(0..len - 1);
                if i >= ex {
                    i + 1
                } else {
                    i
                }
            }
            _ => rng.gen_range(0..len),
        };
        (index, self.0[index].clone())
    }
}

// ---------------------------------------------------------------------------
// WordSource
// ---------------------------------------------------------------------------

/// Outcome of one refresh attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refresh {
    /// A remote list replaced the current set.
    Replaced { count: usize },
    /// The fetch failed; the last-known set stays current.
    KeptLastKnown { reason: String },
}

/// Owns the current payload set and knows how to refresh it.
pub struct WordSource {
    current: PayloadSet,
    remote: Option<RemoteWordList>,
}

impl WordSource {
    pub fn new(current: PayloadSet, remote: Option<RemoteWordList>) -> Self {
        Self { current, remote }
    }

    pub fn current(&self) -> PayloadSet {
        self.current.clone()
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Fetch the remote list and swap it in. Failures are logged and leave
    /// the current set untouched.
    pub async fn refresh(&mut self) -> Refresh {
        let Some(remote) = &self.remote else {
            return Refresh::KeptLastKnown {
                reason: "no remote word list configured".into(),
            };
        };
        match remote.fetch().await {
            Ok(set) => {
                let count = set.len();
                info!(count, url = remote.url(), "loaded remote word list");
                self.current = set;
                Refresh::Replaced { count }
            }
            Err(e) => {
                warn!(error = %e, "word list refresh failed; keeping last-known list");
                Refresh::KeptLastKnown {
                    reason: e.to_string(),
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
