//! Element locator cascade.
//!
//! A semantic target ("the address input", "the identify tool") is described
//! by an ordered list of [`Strategy`] values. Each strategy is a CSS query
//! plus pure [`Matcher`] predicates over the element snapshots it returns.
//! The cascade tries strategies in order and returns the first visible
//! element that satisfies every matcher of its strategy.

use crate::page::{ElementInfo, PortalPage};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::{Duration, Instant};
use tracing::debug;

/// One way of finding a target on the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    /// Short label used in logs and step messages.
    pub name: String,
    pub css: String,
    /// Written as single-key maps in YAML: `- text_contains: Accepter`.
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        with = "serde_yaml::with::singleton_map_recursive"
    )]
    pub matchers: Vec<Matcher>,
}

impl Strategy {
    pub fn css(name: impl Into<String>, css: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            css: css.into(),
            matchers: Vec::new(),
        }
    }

    pub fn matching(mut self, matcher: Matcher) -> Self {
        self.matchers.push(matcher);
        self
    }

    /// Visible and accepted by every matcher.
    pub fn accepts(&self, element: &ElementInfo) -> bool {
        element.visible && self.matchers.iter().all(|m| m.matches(element))
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.css)
    }
}

/// Predicate over an element snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Matcher {
    /// Visible text contains the needle, ignoring case and accents.
    TextContains(String),
    /// class, title, aria-label or placeholder contains any needle, ignoring case and accents.
    HintContains(Vec<String>),
    /// Bounding box at least this large.
    MinSize { width: f64, height: f64 },
}

impl Matcher {
    pub fn text(needle: impl Into<String>) -> Self {
        Self::TextContains(needle.into())
    }

    pub fn hint<S: Into<String>>(needles: impl IntoIterator<Item = S>) -> Self {
        Self::HintContains(needles.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, element: &ElementInfo) -> bool {
        match self {
            Self::TextContains(needle) => fold(&element.text).contains(&fold(needle)),
            Self::HintContains(needles) => {
                let hints: Vec<String> = element.hints().iter().map(|h| fold(h)).collect();
                needles.iter().map(|n| fold(n)).any(|needle| {
                    !needle.is_empty() && hints.iter().any(|h| h.contains(&needle))
                })
            }
            Self::MinSize { width, height } => {
                element.bbox.width >= *width && element.bbox.height >= *height
            }
        }
    }
}

/// Lowercase, strip French diacritics and collapse whitespace.
pub fn fold(text: &str) -> String {
    let folded: String = text
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
            'ç' => 'c',
            'è' | 'é' | 'ê' | 'ë' => 'e',
            'ì' | 'í' | 'î' | 'ï' => 'i',
            'ñ' => 'n',
            'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
            'ù' | 'ú' | 'û' | 'ü' => 'u',
            'ý' | 'ÿ' => 'y',
            '\u{a0}' => ' ',
            other => other,
        })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// An element found by the cascade, with the strategy that found it.
#[derive(Debug, Clone, PartialEq)]
pub struct Located {
    pub strategy: String,
    pub element: ElementInfo,
}

/// Run the cascade once. Query failures skip to the next strategy.
pub async fn locate<P>(page: &P, strategies: &[Strategy]) -> Option<Located>
where
    P: PortalPage + ?Sized,
{
    for strategy in strategies {
        let elements = match page.query_all(&strategy.css).await {
            Ok(elements) => elements,
            Err(e) => {
                debug!("strategy {} failed: {}", strategy, e);
                continue;
            }
        };
        if let Some(element) = elements.into_iter().find(|el| strategy.accepts(el)) {
            debug!("located {} via {}", element.selector, strategy);
            return Some(Located {
                strategy: strategy.name.clone(),
                element,
            });
        }
        debug!("strategy {} matched nothing visible", strategy);
    }
    None
}

/// Re-run the cascade every `poll_ms` until something matches or
/// `timeout_ms` elapses. Always makes at least one attempt.
pub async fn locate_within<P>(
    page: &P,
    strategies: &[Strategy],
    timeout_ms: u64,
    poll_ms: u64,
) -> Option<Located>
where
    P: PortalPage + ?Sized,
{
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        if let Some(found) = locate(page, strategies).await {
            return Some(found);
        }
        if Instant::now() >= deadline {
            return None;
        }
        page.wait(poll_ms.max(1)).await;
    }
}
