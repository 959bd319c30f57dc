//! Single-elimination bracket: the advancement rule tournament sessions
//! step through. Winners proceed to the next scheduled match; the final has
//! no successor.

use std::collections::HashMap;

pub type MatchId = u32;

#[derive(Debug, Clone)]
pub struct BracketMatch {
    pub id: MatchId,
    /// Participants by user id. A `None` slot is a bye.
    pub players: [Option<String>; 2],
    pub winner: Option<String>,
    /// Successor match and which of its slots the winner fills.
    feeds: Option<(MatchId, usize)>,
}

#[derive(Debug)]
pub struct Bracket {
    matches: HashMap<MatchId, BracketMatch>,
    final_id: MatchId,
}

impl Bracket {
    /// Builds a single-elimination bracket over the given players. The
    /// field is padded with byes up to the next power of two; byes resolve
    /// immediately at build time.
    pub fn single_elimination(players: &[String]) -> Self {
        let field = players.len().max(2).next_power_of_two();

        let mut matches: HashMap<MatchId, BracketMatch> = HashMap::new();
        let mut next_id: MatchId = 1;
        let mut current_round: Vec<MatchId> = Vec::new();

        for pair in 0..field / 2 {
            let a = players.get(pair * 2).cloned();
            let b = players.get(pair * 2 + 1).cloned();
            matches.insert(
                next_id,
                BracketMatch {
                    id: next_id,
                    players: [a, b],
                    winner: None,
                    feeds: None,
                },
            );
            current_round.push(next_id);
            next_id += 1;
        }

        while current_round.len() > 1 {
            let mut next_round = Vec::new();
            for pair in current_round.chunks(2) {
                let successor = next_id;
                matches.insert(
                    successor,
                    BracketMatch {
                        id: successor,
                        players: [None, None],
                        winner: None,
                        feeds: None,
                    },
                );
                next_id += 1;
                for (i, &m) in pair.iter().enumerate() {
                    matches.get_mut(&m).unwrap().feeds = Some((successor, i));
                }
                next_round.push(successor);
            }
            current_round = next_round;
        }

        let final_id = current_round[0];
        let mut bracket = Bracket { matches, final_id };
        bracket.resolve_byes();
        bracket
    }

    /// A leaf match with a single participant is won by default.
    fn resolve_byes(&mut self) {
        let bye_matches: Vec<(MatchId, String)> = self
            .matches
            .values()
            .filter(|m| m.winner.is_none())
            .filter_map(|m| match (&m.players[0], &m.players[1]) {
                (Some(p), None) | (None, Some(p)) => Some((m.id, p.clone())),
                _ => None,
            })
            .collect();
        for (id, player) in bye_matches {
            self.on_match_complete(id, &player);
        }
    }

    /// Records the winner of a match and advances them into the next
    /// scheduled match. Returns that match's id, or `None` for the champion.
    pub fn on_match_complete(&mut self, match_id: MatchId, winner_id: &str) -> Option<MatchId> {
        let feeds = {
            let m = self.matches.get_mut(&match_id)?;
            if m.winner.is_some() {
                // Already decided; advancing twice would corrupt the draw.
                return None;
            }
            m.winner = Some(winner_id.to_string());
            m.feeds
        };

        let (next, slot) = feeds?;
        if let Some(successor) = self.matches.get_mut(&next) {
            successor.players[slot] = Some(winner_id.to_string());
        }
        Some(next)
    }

    pub fn get(&self, id: MatchId) -> Option<&BracketMatch> {
        self.matches.get(&id)
    }

    /// The tournament winner, once the final is decided.
    pub fn champion(&self) -> Option<&str> {
        self.matches
            .get(&self.final_id)
            .and_then(|m| m.winner.as_deref())
    }
}
