//! 3x3 tic-tac-toe board state, move legality, and serialization.
//!
//! Grounded on the win-check scan in
//! `tic_tac_toe_logic::traits_implementation::ViewState::check_for`
//! from the reference game package, adapted from a `Vec<Vec<u8>>` board to
//! a flat nine-cell array and from a four-state `GameState` enum to the
//! spec's terminated-flag-plus-winner-role pair.

use protocol::{FIRST_PLAYER_ROLE, NULL_ROLE, SECOND_PLAYER_ROLE};
use thiserror::Error;

/// Which of the two seats a participant occupies, or no seat at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// No role — an empty cell, a draw, or "use role-to-move".
    Null,
    /// The first player to move.
    First,
    /// The second player to move.
    Second,
}

impl Role {
    /// The other seat. `Null` is its own opposite since it has no peer.
    pub fn other(self) -> Role {
        match self {
            Role::First => Role::Second,
            Role::Second => Role::First,
            Role::Null => Role::Null,
        }
    }

    /// Decodes a wire role byte.
    pub fn from_wire(byte: u8) -> Option<Role> {
        match byte {
            NULL_ROLE => Some(Role::Null),
            FIRST_PLAYER_ROLE => Some(Role::First),
            SECOND_PLAYER_ROLE => Some(Role::Second),
            _ => None,
        }
    }

    /// Encodes this role as the wire byte used in packet headers.
    pub fn to_wire(self) -> u8 {
        match self {
            Role::Null => NULL_ROLE,
            Role::First => FIRST_PLAYER_ROLE,
            Role::Second => SECOND_PLAYER_ROLE,
        }
    }
}

/// A single, immutable move: a board position and the role that played it.
#[derive(Debug, Clone, Copy)]
pub struct Move {
    /// Board cell index, `0..9`.
    pub position: u8,
    /// The role making this move.
    pub role: Role,
}

/// Errors raised while applying or parsing a move.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GameError {
    /// The target cell is occupied, the role is out of turn, or the game
    /// has already terminated.
    #[error("illegal move")]
    IllegalMove,
    /// An operation required a particular game state that did not hold
    /// (e.g. resigning a game that already ended).
    #[error("illegal state")]
    IllegalState,
    /// A move's text representation could not be parsed.
    #[error("malformed move text")]
    MalformedMove,
}

/// 3x3 board state for one tic-tac-toe game.
pub struct Game {
    cells: [Role; 9],
    role_to_move: Role,
    terminated: bool,
    winner: Role,
    move_count: u8,
}

impl Game {
    /// A fresh board with no moves played; `First` moves first.
    pub fn new() -> Self {
        Game {
            cells: [Role::Null; 9],
            role_to_move: Role::First,
            terminated: false,
            winner: Role::Null,
            move_count: 0,
        }
    }

    /// Whether the game has terminated (win or draw).
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// The winning role, or `Role::Null` if the game is a draw or still
    /// in progress.
    pub fn winner(&self) -> Role {
        self.winner
    }

    /// The role whose move is next. Meaningless once terminated.
    pub fn role_to_move(&self) -> Role {
        self.role_to_move
    }

    /// Applies `mv`, rejecting it without mutating state if it is illegal:
    /// the cell is occupied, `mv.role` is not the role-to-move, or the
    /// game has already terminated.
    pub fn apply_move(&mut self, mv: Move) -> Result<(), GameError> {
        if self.terminated {
            return Err(GameError::IllegalMove);
        }
        if mv.role != self.role_to_move {
            return Err(GameError::IllegalMove);
        }
        let idx = mv.position as usize;
        if idx >= self.cells.len() || self.cells[idx] != Role::Null {
            return Err(GameError::IllegalMove);
        }

        self.cells[idx] = mv.role;
        self.move_count += 1;
        self.role_to_move = self.role_to_move.other();

        if let Some(winner) = self.check_winner() {
            self.winner = winner;
            self.terminated = true;
        } else if self.move_count == 9 {
            self.terminated = true;
        }
        Ok(())
    }

    /// Resigns on behalf of `role`: the other role wins. Fails if the game
    /// already terminated.
    pub fn resign(&mut self, role: Role) -> Result<(), GameError> {
        if self.terminated {
            return Err(GameError::IllegalState);
        }
        self.winner = role.other();
        self.terminated = true;
        Ok(())
    }

    /// Scans rows, columns, and diagonals for three equal non-null roles.
    fn check_winner(&self) -> Option<Role> {
        const LINES: [[usize; 3]; 8] = [
            [0, 1, 2],
            [3, 4, 5],
            [6, 7, 8],
            [0, 3, 6],
            [1, 4, 7],
            [2, 5, 8],
            [0, 4, 8],
            [2, 4, 6],
        ];
        for line in LINES {
            let [a, b, c] = line;
            if self.cells[a] != Role::Null && self.cells[a] == self.cells[b] && self.cells[b] == self.cells[c] {
                return Some(self.cells[a]);
            }
        }
        None
    }

    /// Parses a move from its wire text: a single digit `'1'..'9'`, cell
    /// index = digit - 1. `role` of `Role::Null` means "use role-to-move";
    /// otherwise it must equal the role-to-move.
    pub fn parse_move(&self, role: Role, text: &[u8]) -> Result<Move, GameError> {
        if text.len() != 1 {
            return Err(GameError::MalformedMove);
        }
        let digit = text[0];
        if !digit.is_ascii_digit() || digit == b'0' {
            return Err(GameError::MalformedMove);
        }
        let position = digit - b'1';

        let effective_role = if role == Role::Null {
            self.role_to_move
        } else {
            if role != self.role_to_move {
                return Err(GameError::IllegalMove);
            }
            role
        };

        Ok(Move {
            position,
            role: effective_role,
        })
    }

    /// Formats a move as `"<1-based position>←X"` or `"...←O"`.
    pub fn unparse_move(mv: Move) -> String {
        let symbol = match mv.role {
            Role::First => 'X',
            Role::Second => 'O',
            Role::Null => ' ',
        };
        format!("{}\u{2190}{}", mv.position + 1, symbol)
    }

    /// Renders the board as a fixed 30-byte NUL-terminated grid: three
    /// rows of `c|c|c` separated by `\n-----\n`, NUL at index 29. (The
    /// spec text describes this as "29 bytes"; the reference
    /// implementation's own buffer is 30 bytes with the terminator at
    /// index 29, which is what every wire example in the spec actually
    /// matches — see [`Self::unparse_state`]'s test below.)
    pub fn unparse_state(&self) -> [u8; 30] {
        let mut out = [0u8; 30];
        let symbol = |r: Role| match r {
            Role::First => b'X',
            Role::Second => b'O',
            Role::Null => b' ',
        };
        let mut cursor = 0usize;
        for row in 0..3 {
            for col in 0..3 {
                out[cursor] = symbol(self.cells[row * 3 + col]);
                cursor += 1;
                if col < 2 {
                    out[cursor] = b'|';
                    cursor += 1;
                }
            }
            if row < 2 {
                out[cursor..cursor + 7].copy_from_slice(b"\n-----\n");
                cursor += 7;
            }
        }
        debug_assert_eq!(cursor, 29);
        out[cursor] = 0;
        out
    }
}

impl Default for Game {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_board_is_first_to_move() {
        let game = Game::new();
        assert_eq!(game.role_to_move(), Role::First);
        assert!(!game.is_terminated());
    }

    #[test]
    fn occupied_cell_is_illegal_and_does_not_mutate() {
        let mut game = Game::new();
        game.apply_move(Move { position: 0, role: Role::First }).unwrap();
        let err = game
            .apply_move(Move { position: 0, role: Role::Second })
            .unwrap_err();
        assert_eq!(err, GameError::IllegalMove);
        assert_eq!(game.role_to_move(), Role::Second);
    }

    #[test]
    fn out_of_turn_move_is_illegal() {
        let mut game = Game::new();
        let err = game
            .apply_move(Move { position: 0, role: Role::Second })
            .unwrap_err();
        assert_eq!(err, GameError::IllegalMove);
    }

    #[test]
    fn row_win_terminates_with_winner() {
        let mut game = Game::new();
        // X: 0,1,2  O: 3,4
        game.apply_move(Move { position: 0, role: Role::First }).unwrap();
        game.apply_move(Move { position: 3, role: Role::Second }).unwrap();
        game.apply_move(Move { position: 1, role: Role::First }).unwrap();
        game.apply_move(Move { position: 4, role: Role::Second }).unwrap();
        game.apply_move(Move { position: 2, role: Role::First }).unwrap();

        assert!(game.is_terminated());
        assert_eq!(game.winner(), Role::First);
    }

    #[test]
    fn full_board_with_no_line_is_a_draw() {
        let mut game = Game::new();
        // X O X
        // X O O
        // O X X
        let moves = [
            (0, Role::First),
            (1, Role::Second),
            (2, Role::First),
            (4, Role::Second),
            (3, Role::First),
            (5, Role::Second),
            (7, Role::First),
            (6, Role::Second),
            (8, Role::First),
        ];
        for (position, role) in moves {
            game.apply_move(Move { position, role }).unwrap();
        }
        assert!(game.is_terminated());
        assert_eq!(game.winner(), Role::Null);
    }

    #[test]
    fn resign_hands_victory_to_the_other_role() {
        let mut game = Game::new();
        game.resign(Role::First).unwrap();
        assert!(game.is_terminated());
        assert_eq!(game.winner(), Role::Second);
    }

    #[test]
    fn resign_after_termination_is_illegal_state() {
        let mut game = Game::new();
        game.resign(Role::First).unwrap();
        let err = game.resign(Role::Second).unwrap_err();
        assert_eq!(err, GameError::IllegalState);
    }

    #[test]
    fn parse_move_uses_role_to_move_when_null() {
        let game = Game::new();
        let mv = game.parse_move(Role::Null, b"5").unwrap();
        assert_eq!(mv.position, 4);
        assert_eq!(mv.role, Role::First);
    }

    #[test]
    fn parse_move_rejects_mismatched_role() {
        let game = Game::new();
        let err = game.parse_move(Role::Second, b"5").unwrap_err();
        assert_eq!(err, GameError::IllegalMove);
    }

    #[test]
    fn unparse_state_matches_expected_layout_after_one_move() {
        let mut game = Game::new();
        game.apply_move(Move { position: 0, role: Role::First }).unwrap();
        let rendered = game.unparse_state();
        let text = std::str::from_utf8(&rendered[..29]).unwrap();
        assert_eq!(text, "X| | \n-----\n | | \n-----\n | | ");
        assert_eq!(rendered[29], 0);
    }
}
