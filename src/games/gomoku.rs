//! # Gomoku (Five in a Row) Game Implementation
//!
//! Stones are placed on the crossings of a 15x15 board; the winner is the
//! first player to connect exactly five stones in a line. Overlines (six or
//! more) do not count, matching the traditional rule. The board itself is
//! the whole state, so no extra-info bytes are needed.

use std::fmt;

use super::GameState;

/// Board side length; the board is square
pub const SIZE: usize = 15;

/// Device mechanics adapter for Gomoku.
const MECHANICS_WGSL: &str = r#"
fn ms_is_action_legal(board: ptr<function, Board>, extra: ptr<function, Extra>, turn: i32, action: u32) -> bool {
    return (*board)[action] == 0;
}

fn ms_take_action(board: ptr<function, Board>, extra: ptr<function, Extra>, turn: i32, action: u32) {
    (*board)[action] = turn;
}

fn ms_compute_outcome(board: ptr<function, Board>, extra: ptr<function, Extra>, turn: i32, last_action: i32) -> i32 {
    if (last_action < 0) {
        return OUTCOME_ONGOING;
    }
    let last_token = -turn;
    let i = last_action / BOARD_N;
    let j = last_action % BOARD_N;
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
            for (var k = 1; k < 6; k++) {
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
        // exactly five in a row wins; overlines do not
        if (total == 4) {
            return last_token;
        }
    }
    for (var c = 0u; c < u32(BOARD_M * BOARD_N); c++) {
        if ((*board)[c] == 0) {
            return OUTCOME_ONGOING;
        }
    }
    return 0;
}
"#;

/// Complete state of a Gomoku game.
///
/// Row 0 is the bottom rank (label "1"); columns are lettered from 'A'.
#[derive(Debug, Clone)]
pub struct GomokuState {
    board: [i8; SIZE * SIZE],
    turn: i32,
    last_move: Option<usize>,
}

impl fmt::Display for GomokuState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "  ")?;
        for c in 0..SIZE {
            write!(f, "{}", (b'A' + c as u8) as char)?;
        }
        writeln!(f)?;
        for r in (0..SIZE).rev() {
            write!(f, "{:>2}", r + 1)?;
            for c in 0..SIZE {
                let symbol = match self.board[r * SIZE + c] {
                    1 => 'X',
                    -1 => 'O',
                    _ => '+',
                };
                write!(f, "{}", symbol)?;
            }
            writeln!(f, "{:<2}", r + 1)?;
        }
        write!(f, "  ")?;
        for c in 0..SIZE {
            write!(f, "{}", (b'A' + c as u8) as char)?;
        }
        Ok(())
    }
}

impl GameState for GomokuState {
    fn game_name() -> &'static str {
        "Gomoku_15x15"
    }

    fn board_shape() -> (usize, usize) {
        (SIZE, SIZE)
    }

    fn extra_info_size() -> usize {
        0
    }

    fn max_actions() -> usize {
        SIZE * SIZE
    }

    fn device_mechanics_wgsl() -> &'static str {
        MECHANICS_WGSL
    }

    fn new_game() -> Self {
        Self {
            board: [0; SIZE * SIZE],
            turn: 1,
            last_move: None,
        }
    }

    fn turn(&self) -> i32 {
        self.turn
    }

    fn is_action_legal(&self, action: usize) -> bool {
        action < SIZE * SIZE && self.board[action] == 0
    }

    fn apply(&mut self, action: usize) {
        self.board[action] = self.turn as i8;
        self.last_move = Some(action);
        self.turn = -self.turn;
    }

    fn outcome(&self) -> Option<i32> {
        let last = self.last_move?;
        let last_token = self.board[last] as i32;
        let (i, j) = ((last / SIZE) as isize, (last % SIZE) as isize);
        let dirs: [(isize, isize); 4] = [(1, 0), (0, 1), (1, 1), (1, -1)];
        for (di, dj) in dirs {
            let mut total = 0;
            for (si, sj) in [(di, dj), (-di, -dj)] {
                for k in 1..6isize {
                    let ii = i + k * si;
                    let jj = j + k * sj;
                    if ii < 0 || ii >= SIZE as isize || jj < 0 || jj >= SIZE as isize {
                        break;
                    }
                    if self.board[(ii as usize) * SIZE + jj as usize] as i32 != last_token {
                        break;
                    }
                    total += 1;
                }
            }
            // exactly five in a row wins; overlines do not
            if total == 4 {
                return Some(last_token);
            }
        }
        if self.board.iter().all(|&cell| cell != 0) {
            return Some(0);
        }
        None
    }

    fn encode_board(&self, out: &mut [i8]) {
        out.copy_from_slice(&self.board);
    }

    fn encode_extra_info(&self, _out: &mut [i8]) {}

    fn action_name(action: usize) -> String {
        let row = action / SIZE + 1;
        let col = (b'A' + (action % SIZE) as u8) as char;
        format!("{}{}", col, row)
    }

    fn action_index(name: &str) -> Option<usize> {
        let name = name.trim().to_ascii_uppercase();
        let mut chars = name.chars();
        let col = chars.next()?;
        if !col.is_ascii_uppercase() {
            return None;
        }
        let col = (col as u8 - b'A') as usize;
        let row = chars.as_str().parse::<usize>().ok()?;
        if col >= SIZE || row == 0 || row > SIZE {
            return None;
        }
        Some((row - 1) * SIZE + col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play(game: &mut GomokuState, names: &[&str]) {
        for name in names {
            let action = GomokuState::action_index(name).unwrap();
            assert!(game.is_action_legal(action), "illegal move {}", name);
            game.apply(action);
        }
    }

    #[test]
    fn new_game() {
        let game = GomokuState::new_game();
        assert_eq!(game.turn(), 1);
        assert_eq!(game.legal_actions().len(), SIZE * SIZE);
        assert!(game.outcome().is_none());
    }

    #[test]
    fn five_in_a_row_wins() {
        let mut game = GomokuState::new_game();
        play(
            &mut game,
            &["A1", "A2", "B1", "B2", "C1", "C2", "D1", "D2", "E1"],
        );
        assert_eq!(game.outcome(), Some(1));
    }

    #[test]
    fn overline_does_not_win() {
        let mut game = GomokuState::new_game();
        // X builds A1..D1 and F1..G1, then fills E1 making a line of seven
        play(
            &mut game,
            &[
                "A1", "A2", "B1", "B2", "C1", "C2", "D1", "D2", "F1", "F2", "G1", "G2",
            ],
        );
        assert!(game.outcome().is_none());
        play(&mut game, &["E1"]);
        assert!(game.outcome().is_none());
    }

    #[test]
    fn occupied_crossing_is_illegal() {
        let mut game = GomokuState::new_game();
        let action = GomokuState::action_index("H8").unwrap();
        game.apply(action);
        assert!(!game.is_action_legal(action));
    }

    #[test]
    fn action_names_round_trip() {
        for a in [0, 14, 15, 112, 224] {
            assert_eq!(
                GomokuState::action_index(&GomokuState::action_name(a)),
                Some(a)
            );
        }
        assert_eq!(GomokuState::action_index("A1"), Some(0));
        assert_eq!(GomokuState::action_index("O15"), Some(224));
        assert_eq!(GomokuState::action_index("P1"), None);
        assert_eq!(GomokuState::action_index("A16"), None);
        assert_eq!(GomokuState::action_index(""), None);
    }
}
