//! Per-category rankings built from raw score events.
//!
//! Each category keeps the single best event per user and orders the
//! survivors best-first according to the category's direction.

use crate::domain::score::{ScoreDirection, ScoreEvent};
use ahash::AHashMap;
use serde::Serialize;
use std::collections::BTreeMap;

/// Best-per-user results for one category, ordered best-first.
///
/// Rank 0 is the leader. A user appears at most once.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedList {
    category: String,
    direction: ScoreDirection,
    entries: Vec<ScoreEvent>,
}

impl RankedList {
    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn direction(&self) -> ScoreDirection {
        self.direction
    }

    /// Each user's best event, best first.
    pub fn entries(&self) -> &[ScoreEvent] {
        &self.entries
    }

    /// The rank-0 entry, if any.
    pub fn leader(&self) -> Option<&ScoreEvent> {
        self.entries.first()
    }

    /// Zero-based rank of a user, if they have an entry.
    pub fn rank_of(&self, user_id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.user_id() == user_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

struct CategoryGroup<'a> {
    direction: ScoreDirection,
    by_user: AHashMap<&'a str, usize>,
    best: Vec<&'a ScoreEvent>,
}

impl<'a> CategoryGroup<'a> {
    fn new(direction: ScoreDirection) -> Self {
        Self {
            direction,
            by_user: AHashMap::new(),
            best: Vec::new(),
        }
    }

    fn offer(&mut self, event: &'a ScoreEvent) {
        match self.by_user.get(event.user_id()) {
            Some(&slot) => {
                if self.direction.is_better(event.value(), self.best[slot].value()) {
                    self.best[slot] = event;
                }
            }
            None => {
                self.by_user.insert(event.user_id(), self.best.len());
                self.best.push(event);
            }
        }
    }

    fn into_ranked(mut self, category: &str) -> RankedList {
        let direction = self.direction;
        // sort_by is stable: equal values keep first-seen order
        self.best
            .sort_by(|a, b| direction.rank_order(a.value(), b.value()));

        RankedList {
            category: category.to_owned(),
            direction,
            entries: self.best.into_iter().cloned().collect(),
        }
    }
}

/// Group events by category and rank each user's best result.
///
/// Ties between a user's own events go to the one seen first, so callers
/// wanting deterministic tie-breaks should pass events in a fixed order
/// (for example newest first). The first event seen in a category fixes the
/// direction used for that whole category.
///
/// Categories with no events are simply absent from the result.
pub fn best_scores_by_category<'a, I>(events: I) -> BTreeMap<String, RankedList>
where
    I: IntoIterator<Item = &'a ScoreEvent>,
{
    let mut groups: BTreeMap<&'a str, CategoryGroup<'a>> = BTreeMap::new();

    for event in events {
        groups
            .entry(event.category_slug())
            .or_insert_with(|| CategoryGroup::new(event.direction()))
            .offer(event);
    }

    groups
        .into_iter()
        .map(|(slug, group)| (slug.to_owned(), group.into_ranked(slug)))
        .collect()
}
