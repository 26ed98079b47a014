//! Player identity and Elo rating.

use std::fmt;

/// Rating assigned to a player the first time they are seen.
pub const PLAYER_INITIAL_RATING: i32 = 1500;

/// Elo K-factor.
const K_FACTOR: f64 = 32.0;
/// Elo rating scale divisor.
const RATING_SCALE: f64 = 400.0;

/// The outcome of a finished game, from the perspective of a pair of
/// players passed to [`post_result`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameResult {
    /// Neither player won.
    Draw,
    /// The first player of the pair won.
    FirstWon,
    /// The second player of the pair won.
    SecondWon,
}

/// A persistent player identity: an immutable username and a mutable Elo
/// rating. Outlives any single client session — the registry holds the
/// only reference that matters; `Player` itself carries no connection
/// state.
pub struct Player {
    username: String,
    rating: i32,
}

impl Player {
    /// Creates a fresh player at the initial rating.
    pub fn new(username: String) -> Self {
        Player {
            username,
            rating: PLAYER_INITIAL_RATING,
        }
    }

    /// The player's username.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The player's current rating.
    pub fn rating(&self) -> i32 {
        self.rating
    }

    /// Applies the Elo update for a single game between `p1` and `p2` with
    /// the given `result`. K=32, scale=400. The probability-of-winning
    /// formula and truncating round are applied to both ratings using the
    /// *pre-update* ratings of both players, so the order of the two
    /// assignments below does not matter.
    ///
    /// Callers are responsible for acquiring both players' locks in a
    /// fixed order (by username) before calling this, matching the lock
    /// order mandated for invitation/game/player objects.
    pub fn post_result(p1: &mut Player, p2: &mut Player, result: GameResult) {
        let (s1, s2) = match result {
            GameResult::Draw => (0.5, 0.5),
            GameResult::FirstWon => (1.0, 0.0),
            GameResult::SecondWon => (0.0, 1.0),
        };

        let r1 = p1.rating as f64;
        let r2 = p2.rating as f64;
        let e1 = 1.0 / (1.0 + 10f64.powf((r2 - r1) / RATING_SCALE));
        let e2 = 1.0 - e1;

        p1.rating += (K_FACTOR * (s1 - e1)).trunc() as i32;
        p2.rating += (K_FACTOR * (s2 - e2)).trunc() as i32;
    }
}

impl fmt::Display for Player {
    /// Formats as a `USERS` reply line: `"<username>\t<rating>\n"`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}\t{}", self.username, self.rating)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draw_between_equal_ratings_conserves_both() {
        let mut p1 = Player::new("alice".into());
        let mut p2 = Player::new("bob".into());
        Player::post_result(&mut p1, &mut p2, GameResult::Draw);
        assert_eq!(p1.rating(), PLAYER_INITIAL_RATING);
        assert_eq!(p2.rating(), PLAYER_INITIAL_RATING);
    }

    #[test]
    fn win_moves_ratings_by_the_expected_amount() {
        let mut p1 = Player::new("alice".into());
        let mut p2 = Player::new("bob".into());
        Player::post_result(&mut p1, &mut p2, GameResult::FirstWon);
        assert_eq!(p1.rating(), 1516);
        assert_eq!(p2.rating(), 1484);
    }

    #[test]
    fn symmetry_of_swapped_players_and_inverted_result() {
        let mut a1 = Player::new("alice".into());
        let mut a2 = Player::new("bob".into());
        Player::post_result(&mut a1, &mut a2, GameResult::FirstWon);

        let mut b1 = Player::new("bob".into());
        let mut b2 = Player::new("alice".into());
        Player::post_result(&mut b1, &mut b2, GameResult::SecondWon);

        assert_eq!(a1.rating(), b2.rating());
        assert_eq!(a2.rating(), b1.rating());
    }

    #[test]
    fn display_matches_users_reply_line_format() {
        let player = Player::new("alice".into());
        assert_eq!(format!("{player}"), "alice\t1500\n");
    }
}
