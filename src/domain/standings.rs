//! Cross-category standings from placement points.
//!
//! Every category's ranking awards points by position using a
//! [`PlacementPoints`] table. Points are summed per player over a closed
//! [`Roster`]; identities outside the roster still occupy their rank in a
//! category but their points are discarded.

use crate::domain::ranking::RankedList;
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Error returned when a placement points table is invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointsError {
    /// A rank awards more points than the rank before it
    Increasing {
        /// The first offending rank (zero-based)
        rank: usize,
    },
}

impl std::fmt::Display for PointsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PointsError::Increasing { rank } => write!(
                f,
                "rank {} awards more points than rank {}",
                rank,
                rank - 1
            ),
        }
    }
}

impl std::error::Error for PointsError {}

/// Points awarded by rank position within one category.
///
/// Index 0 is the leader's award. Ranks past the end of the table earn 0.
/// Deserializes from a plain list such as `[4, 3, 2, 1]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u32>", into = "Vec<u32>")]
pub struct PlacementPoints {
    table: Vec<u32>,
}

impl PlacementPoints {
    /// Create a table from per-rank awards.
    ///
    /// # Errors
    /// Returns `PointsError::Increasing` if a later rank would earn more than
    /// an earlier one.
    pub fn new(table: Vec<u32>) -> Result<Self, PointsError> {
        if let Some(rank) = table.windows(2).position(|w| w[1] > w[0]) {
            return Err(PointsError::Increasing { rank: rank + 1 });
        }
        Ok(Self { table })
    }

    /// `top` points for the leader, one fewer per rank down to 1.
    pub fn descending_from(top: u32) -> Self {
        Self {
            table: (1..=top).rev().collect(),
        }
    }

    /// Award for a zero-based rank.
    pub fn for_rank(&self, rank: usize) -> u32 {
        self.table.get(rank).copied().unwrap_or(0)
    }

    /// Number of ranks that can earn points.
    pub fn paying_ranks(&self) -> usize {
        self.table.iter().take_while(|&&p| p > 0).count()
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.table
    }
}

impl Default for PlacementPoints {
    /// 4, 3, 2, 1 for the top four.
    fn default() -> Self {
        Self::descending_from(4)
    }
}

impl TryFrom<Vec<u32>> for PlacementPoints {
    type Error = PointsError;

    fn try_from(table: Vec<u32>) -> Result<Self, Self::Error> {
        PlacementPoints::new(table)
    }
}

impl From<PlacementPoints> for Vec<u32> {
    fn from(points: PlacementPoints) -> Self {
        points.table
    }
}

/// A participant eligible for the overall standings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub user_id: String,
    pub name: String,
}

impl Player {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            name: name.into(),
        }
    }
}

/// Closed, ordered allow-list of players.
///
/// Order matters: it breaks ties in the standings. A repeated `user_id` keeps
/// its first position and later duplicates are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Player>", into = "Vec<Player>")]
pub struct Roster {
    players: Vec<Player>,
}

impl Roster {
    pub fn new(players: impl IntoIterator<Item = Player>) -> Self {
        let mut seen = ahash::AHashSet::new();
        let players = players
            .into_iter()
            .filter(|p| seen.insert(p.user_id.clone()))
            .collect();
        Self { players }
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.players.iter().any(|p| p.user_id == user_id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

impl From<Vec<Player>> for Roster {
    fn from(players: Vec<Player>) -> Self {
        Roster::new(players)
    }
}

impl From<Roster> for Vec<Player> {
    fn from(roster: Roster) -> Self {
        roster.players
    }
}

/// A player's accumulated placement points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerStanding {
    pub user_id: String,
    pub name: String,
    pub points: u32,
}

/// Sum placement points across every category for each roster player.
///
/// The result has exactly one entry per roster player, sorted by points
/// descending. Equal totals keep roster order.
pub fn overall_standings(
    ranked: &BTreeMap<String, RankedList>,
    roster: &Roster,
    points: &PlacementPoints,
) -> Vec<PlayerStanding> {
    let slots: AHashMap<&str, usize> = roster
        .players()
        .iter()
        .enumerate()
        .map(|(i, p)| (p.user_id.as_str(), i))
        .collect();

    let mut totals = vec![0u32; roster.len()];

    for list in ranked.values() {
        for (rank, entry) in list.entries().iter().enumerate() {
            if let Some(&slot) = slots.get(entry.user_id()) {
                totals[slot] = totals[slot].saturating_add(points.for_rank(rank));
            }
        }
    }

    let mut standings: Vec<PlayerStanding> = roster
        .players()
        .iter()
        .zip(totals)
        .map(|(player, points)| PlayerStanding {
            user_id: player.user_id.clone(),
            name: player.name.clone(),
            points,
        })
        .collect();

    standings.sort_by(|a, b| b.points.cmp(&a.points));
    standings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ranking::best_scores_by_category;
    use crate::domain::score::{ScoreDirection, ScoreEvent};

    fn roster(ids: &[&str]) -> Roster {
        Roster::new(ids.iter().map(|id| Player::new(*id, id.to_uppercase())))
    }

    fn ranking(category: &str, users_best_first: &[&str]) -> Vec<ScoreEvent> {
        let n = users_best_first.len();
        users_best_first
            .iter()
            .enumerate()
            .map(|(i, user)| {
                ScoreEvent::new(
                    format!("{}-{}", category, i),
                    *user,
                    category,
                    (n - i) as f64,
                    ScoreDirection::HigherBetter,
                )
            })
            .collect()
    }

    fn points_of(standings: &[PlayerStanding], user: &str) -> Option<u32> {
        standings.iter().find(|s| s.user_id == user).map(|s| s.points)
    }

    #[test]
    fn test_default_table() {
        let points = PlacementPoints::default();
        assert_eq!(points.as_slice(), &[4, 3, 2, 1]);
        assert_eq!(points.for_rank(0), 4);
        assert_eq!(points.for_rank(3), 1);
        assert_eq!(points.for_rank(4), 0);
        assert_eq!(points.for_rank(100), 0);
        assert_eq!(points.paying_ranks(), 4);
    }

    #[test]
    fn test_table_rejects_increasing() {
        assert_eq!(
            PlacementPoints::new(vec![3, 5, 1]),
            Err(PointsError::Increasing { rank: 1 })
        );
        assert!(PlacementPoints::new(vec![]).is_ok());
        assert!(PlacementPoints::new(vec![2, 2, 0]).is_ok());
    }

    #[test]
    fn test_five_ranked_players_earn_4_3_2_1_0() {
        let events = ranking("darts", &["p1", "p2", "p3", "p4", "p5"]);
        let ranked = best_scores_by_category(&events);
        let roster = roster(&["p1", "p2", "p3", "p4", "p5"]);

        let standings = overall_standings(&ranked, &roster, &PlacementPoints::default());

        assert_eq!(points_of(&standings, "p1"), Some(4));
        assert_eq!(points_of(&standings, "p2"), Some(3));
        assert_eq!(points_of(&standings, "p3"), Some(2));
        assert_eq!(points_of(&standings, "p4"), Some(1));
        assert_eq!(points_of(&standings, "p5"), Some(0));
    }

    #[test]
    fn test_unknown_players_excluded_but_hold_rank() {
        let events = ranking("darts", &["stranger", "p1", "p2"]);
        let ranked = best_scores_by_category(&events);
        let roster = roster(&["p1", "p2"]);

        let standings = overall_standings(&ranked, &roster, &PlacementPoints::default());

        assert_eq!(standings.len(), 2);
        assert!(standings.iter().all(|s| s.user_id != "stranger"));
        // p1 was second behind the stranger
        assert_eq!(points_of(&standings, "p1"), Some(3));
        assert_eq!(points_of(&standings, "p2"), Some(2));
    }

    #[test]
    fn test_points_accumulate_across_categories() {
        let mut events = ranking("darts", &["a", "b", "c"]);
        events.extend(ranking("mile", &["c", "b", "a"]));
        events.extend(ranking("chess", &["b"]));
        let ranked = best_scores_by_category(&events);
        let roster = roster(&["a", "b", "c"]);

        let standings = overall_standings(&ranked, &roster, &PlacementPoints::default());

        assert_eq!(standings[0].user_id, "b");
        assert_eq!(standings[0].points, 3 + 3 + 4);
        // a and c tie on 6; roster order breaks the tie
        assert_eq!(standings[1].user_id, "a");
        assert_eq!(standings[2].user_id, "c");
        assert_eq!(standings[1].points, 6);
        assert_eq!(standings[2].points, 6);
    }

    #[test]
    fn test_roster_without_events_all_zero() {
        let ranked = BTreeMap::new();
        let roster = roster(&["x", "y", "z"]);

        let standings = overall_standings(&ranked, &roster, &PlacementPoints::default());

        let ids: Vec<_> = standings.iter().map(|s| s.user_id.as_str()).collect();
        assert_eq!(ids, vec!["x", "y", "z"]);
        assert!(standings.iter().all(|s| s.points == 0));
    }

    #[test]
    fn test_custom_table() {
        let events = ranking("darts", &["a", "b", "c"]);
        let ranked = best_scores_by_category(&events);
        let roster = roster(&["c", "b", "a"]);
        let points = PlacementPoints::new(vec![10, 5]).unwrap();

        let standings = overall_standings(&ranked, &roster, &points);

        assert_eq!(points_of(&standings, "a"), Some(10));
        assert_eq!(points_of(&standings, "b"), Some(5));
        assert_eq!(points_of(&standings, "c"), Some(0));
        assert_eq!(standings[0].user_id, "a");
    }

    #[test]
    fn test_roster_drops_duplicates() {
        let roster = Roster::new(vec![
            Player::new("a", "Alice"),
            Player::new("b", "Bob"),
            Player::new("a", "Alice again"),
        ]);

        assert_eq!(roster.len(), 2);
        assert_eq!(roster.players()[0].name, "Alice");
        assert!(roster.contains("b"));
        assert!(!roster.contains("c"));
    }

    #[test]
    fn test_points_from_json() {
        let points: PlacementPoints = serde_json::from_str("[5, 3, 1]").unwrap();
        assert_eq!(points.for_rank(2), 1);

        let bad = serde_json::from_str::<PlacementPoints>("[1, 2]");
        assert!(bad.is_err());
    }
}
