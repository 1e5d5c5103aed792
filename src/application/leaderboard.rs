//! Leaderboard assembly.
//!
//! Ties the pure ranking and standings functions to a fixed roster and
//! points table so request handlers make a single call per response.

use crate::domain::ranking::{best_scores_by_category, RankedList};
use crate::domain::score::ScoreEvent;
use crate::domain::standings::{overall_standings, PlacementPoints, PlayerStanding, Roster};
use ahash::AHashSet;
use serde::Serialize;
use std::collections::BTreeMap;

/// Everything a leaderboard page needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardView {
    pub categories: BTreeMap<String, RankedList>,
    pub standings: Vec<PlayerStanding>,
}

/// Roster and scoring curve for one family's board.
///
/// Holds no per-request state; share one instance across handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leaderboard {
    roster: Roster,
    points: PlacementPoints,
}

impl Leaderboard {
    /// A board using the default 4-3-2-1 points table.
    pub fn new(roster: Roster) -> Self {
        Self {
            roster,
            points: PlacementPoints::default(),
        }
    }

    pub fn with_points(mut self, points: PlacementPoints) -> Self {
        self.points = points;
        self
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn points(&self) -> &PlacementPoints {
        &self.points
    }

    /// Best-per-user rankings for every category present in `events`.
    pub fn rankings<'a, I>(&self, events: I) -> BTreeMap<String, RankedList>
    where
        I: IntoIterator<Item = &'a ScoreEvent>,
    {
        best_scores_by_category(events)
    }

    /// Overall standings for pre-computed rankings.
    ///
    /// Identities outside the roster are left out. The count of such
    /// identities is logged at debug level.
    pub fn standings_for(&self, ranked: &BTreeMap<String, RankedList>) -> Vec<PlayerStanding> {
        let foreign: AHashSet<&str> = ranked
            .values()
            .flat_map(|list| list.entries())
            .map(|e| e.user_id())
            .filter(|id| !self.roster.contains(id))
            .collect();

        if !foreign.is_empty() {
            tracing::debug!(
                foreign = foreign.len(),
                "ignoring scores from identities outside the roster"
            );
        }

        overall_standings(ranked, &self.roster, &self.points)
    }

    /// Overall standings straight from events.
    pub fn standings<'a, I>(&self, events: I) -> Vec<PlayerStanding>
    where
        I: IntoIterator<Item = &'a ScoreEvent>,
    {
        self.standings_for(&self.rankings(events))
    }

    /// Rankings and standings in one pass over the events.
    pub fn view<'a, I>(&self, events: I) -> LeaderboardView
    where
        I: IntoIterator<Item = &'a ScoreEvent>,
    {
        let categories = self.rankings(events);
        let standings = self.standings_for(&categories);

        tracing::debug!(
            categories = categories.len(),
            players = standings.len(),
            "built leaderboard"
        );

        LeaderboardView {
            categories,
            standings,
        }
    }
}
