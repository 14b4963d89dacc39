//! # Connect 4 Game Implementation
//!
//! Players take turns dropping discs into columns, trying to get 4 discs
//! in a row (horizontally, vertically, or diagonally). The extra-info bytes
//! carry the fill level of each column, which lets both the host rules and
//! the device mechanics test legality and find the landing row without
//! scanning the board.

use std::fmt;

use super::GameState;

/// Number of rows in the board
pub const ROWS: usize = 6;
/// Number of columns in the board (also the branching factor)
pub const COLS: usize = 7;

/// Device mechanics adapter for Connect 4.
///
/// Kept in lockstep with the host rules below; the search kernels call these
/// three functions for every legality test, transition and outcome check.
const MECHANICS_WGSL: &str = r#"
fn ms_is_action_legal(board: ptr<function, Board>, extra: ptr<function, Extra>, turn: i32, action: u32) -> bool {
    return (*extra)[action] < BOARD_M;
}

fn ms_take_action(board: ptr<function, Board>, extra: ptr<function, Extra>, turn: i32, action: u32) {
    (*extra)[action] = (*extra)[action] + 1;
    let row = BOARD_M - (*extra)[action];
    (*board)[u32(row * BOARD_N) + action] = turn;
}

fn ms_compute_outcome(board: ptr<function, Board>, extra: ptr<function, Extra>, turn: i32, last_action: i32) -> i32 {
    if (last_action < 0) {
        return OUTCOME_ONGOING;
    }
    let last_token = -turn;
    let j = last_action;
    let i = BOARD_M - (*extra)[u32(last_action)];
    var dirs = array<vec2<i32>, 4>(
        vec2<i32>(1, 0), vec2<i32>(0, 1), vec2<i32>(1, 1), vec2<i32>(1, -1),
    );
    for (var d = 0u; d < 4u; d++) {
        var total = 0;
        for (var s = 0; s < 2; s++) {
            var dvec = dirs[d];
            if (s == 1) {
                dvec = -dvec;
            }
            for (var k = 1; k < 4; k++) {
                let ii = i + k * dvec.x;
                let jj = j + k * dvec.y;
                if (ii < 0 || ii >= BOARD_M || jj < 0 || jj >= BOARD_N) {
                    break;
                }
                if ((*board)[u32(ii * BOARD_N + jj)] != last_token) {
                    break;
                }
                total += 1;
            }
        }
        if (total >= 3) {
            return last_token;
        }
    }
    for (var c = 0; c < BOARD_N; c++) {
        if ((*extra)[u32(c)] < BOARD_M) {
            return OUTCOME_ONGOING;
        }
    }
    return 0;
}
"#;

/// Complete state of a Connect 4 game.
///
/// The board is row-major with row 0 at the top; cells hold 1, -1 or 0.
#[derive(Debug, Clone)]
pub struct Connect4State {
    board: [i8; ROWS * COLS],
    column_fills: [i8; COLS],
    turn: i32,
    last_move: Option<(usize, usize)>,
}

impl fmt::Display for Connect4State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in 0..ROWS {
            write!(f, "|")?;
            for c in 0..COLS {
                let symbol = match self.board[r * COLS + c] {
                    1 => "X",
                    -1 => "O",
                    _ => ".",
                };
                write!(f, "{}|", symbol)?;
            }
            writeln!(f)?;
        }
        write!(f, " ")?;
        for c in 0..COLS {
            write!(f, "{} ", c)?;
        }
        Ok(())
    }
}

impl GameState for Connect4State {
    fn game_name() -> &'static str {
        "Connect4_6x7"
    }

    fn board_shape() -> (usize, usize) {
        (ROWS, COLS)
    }

    fn extra_info_size() -> usize {
        COLS
    }

    fn max_actions() -> usize {
        COLS
    }

    fn device_mechanics_wgsl() -> &'static str {
        MECHANICS_WGSL
    }

    fn new_game() -> Self {
        Self {
            board: [0; ROWS * COLS],
            column_fills: [0; COLS],
            turn: 1,
            last_move: None,
        }
    }

    fn turn(&self) -> i32 {
        self.turn
    }

    fn is_action_legal(&self, action: usize) -> bool {
        action < COLS && (self.column_fills[action] as usize) < ROWS
    }

    fn apply(&mut self, action: usize) {
        self.column_fills[action] += 1;
        let row = ROWS - self.column_fills[action] as usize;
        self.board[row * COLS + action] = self.turn as i8;
        self.last_move = Some((row, action));
        self.turn = -self.turn;
    }

    fn outcome(&self) -> Option<i32> {
        let (i, j) = self.last_move?;
        let last_token = self.board[i * COLS + j] as i32;
        let dirs: [(isize, isize); 4] = [(1, 0), (0, 1), (1, 1), (1, -1)];
        for (di, dj) in dirs {
            let mut total = 0;
            for (si, sj) in [(di, dj), (-di, -dj)] {
                for k in 1..4isize {
                    let ii = i as isize + k * si;
                    let jj = j as isize + k * sj;
                    if ii < 0 || ii >= ROWS as isize || jj < 0 || jj >= COLS as isize {
                        break;
                    }
                    if self.board[(ii as usize) * COLS + jj as usize] as i32 != last_token {
                        break;
                    }
                    total += 1;
                }
            }
            if total >= 3 {
                return Some(last_token);
            }
        }
        if self.column_fills.iter().all(|&fill| fill as usize == ROWS) {
            return Some(0);
        }
        None
    }

    fn encode_board(&self, out: &mut [i8]) {
        out.copy_from_slice(&self.board);
    }

    fn encode_extra_info(&self, out: &mut [i8]) {
        out.copy_from_slice(&self.column_fills);
    }

    fn action_name(action: usize) -> String {
        action.to_string()
    }

    fn action_index(name: &str) -> Option<usize> {
        let index = name.trim().parse::<usize>().ok()?;
        (index < COLS).then_some(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_game() {
        let game = Connect4State::new_game();
        assert_eq!(game.turn(), 1);
        assert_eq!(game.legal_actions().len(), 7);
        assert!(game.outcome().is_none());
    }

    #[test]
    fn discs_stack_and_turn_alternates() {
        let mut game = Connect4State::new_game();
        game.apply(3);
        assert_eq!(game.board[5 * COLS + 3], 1);
        assert_eq!(game.turn(), -1);
        game.apply(3);
        assert_eq!(game.board[4 * COLS + 3], -1);
        assert_eq!(game.turn(), 1);
    }

    #[test]
    fn full_column_becomes_illegal() {
        let mut game = Connect4State::new_game();
        for _ in 0..ROWS {
            game.apply(0);
        }
        assert!(!game.is_action_legal(0));
        assert!(game.is_action_legal(1));
    }

    #[test]
    fn horizontal_win() {
        let mut game = Connect4State::new_game();
        for moves in [(0, 0), (1, 1), (2, 2)] {
            game.apply(moves.0);
            game.apply(moves.1);
        }
        game.apply(3);
        assert_eq!(game.outcome(), Some(1));
    }

    #[test]
    fn vertical_win_for_second_player() {
        let mut game = Connect4State::new_game();
        // player 1 spreads, player -1 stacks column 6
        for col in [0, 6, 1, 6, 2, 6, 4] {
            game.apply(col);
        }
        game.apply(6);
        assert_eq!(game.outcome(), Some(-1));
    }

    #[test]
    fn diagonal_win() {
        let mut game = Connect4State::new_game();
        for col in [0, 1, 1, 2, 2, 3, 2, 3, 3, 0] {
            game.apply(col);
        }
        game.apply(3); // completes the rising diagonal for player 1
        assert_eq!(game.outcome(), Some(1));
    }

    #[test]
    fn encoding_matches_state() {
        let mut game = Connect4State::new_game();
        game.apply(2);
        let mut board = [0i8; ROWS * COLS];
        let mut extra = [0i8; COLS];
        game.encode_board(&mut board);
        game.encode_extra_info(&mut extra);
        assert_eq!(board[5 * COLS + 2], 1);
        assert_eq!(extra[2], 1);
        assert_eq!(extra[0], 0);
    }

    #[test]
    fn action_names_round_trip() {
        for a in 0..COLS {
            assert_eq!(
                Connect4State::action_index(&Connect4State::action_name(a)),
                Some(a)
            );
        }
        assert_eq!(Connect4State::action_index("7"), None);
        assert_eq!(Connect4State::action_index("x"), None);
    }
}
