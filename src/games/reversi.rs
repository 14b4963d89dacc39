//! # Reversi Game Implementation
//!
//! A 6x6 Reversi. Discs bracket and flip opponent discs; a player with no
//! bracketing move must play the explicit pass action (the last action
//! index), which keeps the turn alternation unconditional for the search
//! kernels. The game ends when neither player has a bracketing move; the
//! higher disc count wins.

use std::fmt;

use super::GameState;

/// Board side length; the board is square
pub const SIZE: usize = 6;
/// Index of the pass action
pub const PASS: usize = SIZE * SIZE;

/// Device mechanics adapter for Reversi.
const MECHANICS_WGSL: &str = r#"
// Opponent discs bracketed along one direction from (i, j); 0 when the run
// is not closed by one of `player`'s discs.
fn rv_flips_in_direction(board: ptr<function, Board>, player: i32, i: i32, j: i32, di: i32, dj: i32) -> i32 {
    var row = i + di;
    var col = j + dj;
    var count = 0;
    while (row >= 0 && row < BOARD_M && col >= 0 && col < BOARD_N) {
        let cell = (*board)[u32(row * BOARD_N + col)];
        if (cell == -player) {
            count = count + 1;
        } else if (cell == player) {
            return count;
        } else {
            return 0;
        }
        row = row + di;
        col = col + dj;
    }
    return 0;
}

fn rv_has_normal_move(board: ptr<function, Board>, player: i32) -> bool {
    for (var a = 0; a < BOARD_M * BOARD_N; a++) {
        if ((*board)[u32(a)] != 0) {
            continue;
        }
        let i = a / BOARD_N;
        let j = a % BOARD_N;
        for (var di = -1; di <= 1; di++) {
            for (var dj = -1; dj <= 1; dj++) {
                if (di == 0 && dj == 0) {
                    continue;
                }
                if (rv_flips_in_direction(board, player, i, j, di, dj) > 0) {
                    return true;
                }
            }
        }
    }
    return false;
}

fn ms_is_action_legal(board: ptr<function, Board>, extra: ptr<function, Extra>, turn: i32, action: u32) -> bool {
    if (action == u32(BOARD_M * BOARD_N)) {
        // pass is legal only when no bracketing move exists
        return !rv_has_normal_move(board, turn);
    }
    if ((*board)[action] != 0) {
        return false;
    }
    let i = i32(action) / BOARD_N;
    let j = i32(action) % BOARD_N;
    for (var di = -1; di <= 1; di++) {
        for (var dj = -1; dj <= 1; dj++) {
            if (di == 0 && dj == 0) {
                continue;
            }
            if (rv_flips_in_direction(board, turn, i, j, di, dj) > 0) {
                return true;
            }
        }
    }
    return false;
}

fn ms_take_action(board: ptr<function, Board>, extra: ptr<function, Extra>, turn: i32, action: u32) {
    if (action == u32(BOARD_M * BOARD_N)) {
        return;
    }
    let i = i32(action) / BOARD_N;
    let j = i32(action) % BOARD_N;
    (*board)[action] = turn;
    for (var di = -1; di <= 1; di++) {
        for (var dj = -1; dj <= 1; dj++) {
            if (di == 0 && dj == 0) {
                continue;
            }
            let flips = rv_flips_in_direction(board, turn, i, j, di, dj);
            var row = i;
            var col = j;
            for (var k = 0; k < flips; k++) {
                row = row + di;
                col = col + dj;
                (*board)[u32(row * BOARD_N + col)] = turn;
            }
        }
    }
}

fn ms_compute_outcome(board: ptr<function, Board>, extra: ptr<function, Extra>, turn: i32, last_action: i32) -> i32 {
    if (rv_has_normal_move(board, turn) || rv_has_normal_move(board, -turn)) {
        return OUTCOME_ONGOING;
    }
    var plus = 0;
    var minus = 0;
    for (var a = 0u; a < u32(BOARD_M * BOARD_N); a++) {
        if ((*board)[a] == 1) {
            plus = plus + 1;
        } else if ((*board)[a] == -1) {
            minus = minus + 1;
        }
    }
    if (plus > minus) {
        return 1;
    }
    if (minus > plus) {
        return -1;
    }
    return 0;
}
"#;

const DIRECTIONS: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Complete state of a Reversi game
#[derive(Debug, Clone)]
pub struct ReversiState {
    board: [i8; SIZE * SIZE],
    turn: i32,
}

impl ReversiState {
    fn flips_in_direction(&self, player: i32, i: isize, j: isize, di: isize, dj: isize) -> usize {
        let mut row = i + di;
        let mut col = j + dj;
        let mut count = 0;
        while row >= 0 && row < SIZE as isize && col >= 0 && col < SIZE as isize {
            match self.board[(row as usize) * SIZE + col as usize] as i32 {
                cell if cell == -player => count += 1,
                cell if cell == player => return count,
                _ => return 0,
            }
            row += di;
            col += dj;
        }
        0
    }

    fn has_normal_move(&self, player: i32) -> bool {
        (0..SIZE * SIZE).any(|a| self.is_normal_move_legal(player, a))
    }

    fn is_normal_move_legal(&self, player: i32, action: usize) -> bool {
        if self.board[action] != 0 {
            return false;
        }
        let (i, j) = ((action / SIZE) as isize, (action % SIZE) as isize);
        DIRECTIONS
            .iter()
            .any(|&(di, dj)| self.flips_in_direction(player, i, j, di, dj) > 0)
    }

    /// Disc counts as (maximizing player, minimizing player)
    pub fn disc_counts(&self) -> (usize, usize) {
        let plus = self.board.iter().filter(|&&c| c == 1).count();
        let minus = self.board.iter().filter(|&&c| c == -1).count();
        (plus, minus)
    }

    #[cfg(test)]
    fn from_cells(cells: &[(usize, usize, i32)], turn: i32) -> Self {
        let mut board = [0i8; SIZE * SIZE];
        for &(i, j, player) in cells {
            board[i * SIZE + j] = player as i8;
        }
        Self { board, turn }
    }
}

impl fmt::Display for ReversiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in 0..SIZE {
            write!(f, "{}| ", r + 1)?;
            for c in 0..SIZE {
                let symbol = match self.board[r * SIZE + c] {
                    1 => 'X',
                    -1 => 'O',
                    _ => '+',
                };
                write!(f, "{} ", symbol)?;
            }
            writeln!(f)?;
        }
        write!(f, "   ")?;
        for c in 0..SIZE {
            write!(f, "{} ", (b'A' + c as u8) as char)?;
        }
        Ok(())
    }
}

impl GameState for ReversiState {
    fn game_name() -> &'static str {
        "Reversi_6x6"
    }

    fn board_shape() -> (usize, usize) {
        (SIZE, SIZE)
    }

    fn extra_info_size() -> usize {
        0
    }

    fn max_actions() -> usize {
        PASS + 1
    }

    fn device_mechanics_wgsl() -> &'static str {
        MECHANICS_WGSL
    }

    fn new_game() -> Self {
        let mut board = [0i8; SIZE * SIZE];
        let mid = SIZE / 2;
        board[(mid - 1) * SIZE + (mid - 1)] = -1;
        board[mid * SIZE + mid] = -1;
        board[(mid - 1) * SIZE + mid] = 1;
        board[mid * SIZE + (mid - 1)] = 1;
        Self { board, turn: 1 }
    }

    fn turn(&self) -> i32 {
        self.turn
    }

    fn is_action_legal(&self, action: usize) -> bool {
        if action == PASS {
            return !self.has_normal_move(self.turn);
        }
        action < PASS && self.is_normal_move_legal(self.turn, action)
    }

    fn apply(&mut self, action: usize) {
        if action != PASS {
            let (i, j) = ((action / SIZE) as isize, (action % SIZE) as isize);
            self.board[action] = self.turn as i8;
            for &(di, dj) in &DIRECTIONS {
                let flips = self.flips_in_direction(self.turn, i, j, di, dj);
                let (mut row, mut col) = (i, j);
                for _ in 0..flips {
                    row += di;
                    col += dj;
                    self.board[(row as usize) * SIZE + col as usize] = self.turn as i8;
                }
            }
        }
        self.turn = -self.turn;
    }

    fn outcome(&self) -> Option<i32> {
        if self.has_normal_move(1) || self.has_normal_move(-1) {
            return None;
        }
        let (plus, minus) = self.disc_counts();
        Some(match plus.cmp(&minus) {
            std::cmp::Ordering::Greater => 1,
            std::cmp::Ordering::Less => -1,
            std::cmp::Ordering::Equal => 0,
        })
    }

    fn encode_board(&self, out: &mut [i8]) {
        out.copy_from_slice(&self.board);
    }

    fn encode_extra_info(&self, _out: &mut [i8]) {}

    fn action_name(action: usize) -> String {
        if action == PASS {
            return "pass".to_string();
        }
        let row = action / SIZE + 1;
        let col = (b'A' + (action % SIZE) as u8) as char;
        format!("{}{}", col, row)
    }

    fn action_index(name: &str) -> Option<usize> {
        let name = name.trim();
        if name.eq_ignore_ascii_case("pass") {
            return Some(PASS);
        }
        let upper = name.to_ascii_uppercase();
        let mut chars = upper.chars();
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

    #[test]
    fn opening_moves() {
        let game = ReversiState::new_game();
        assert_eq!(game.turn(), 1);
        let legal = game.legal_actions();
        assert_eq!(legal, vec![8, 13, 22, 27]);
        assert!(!game.is_action_legal(PASS));
        assert!(game.outcome().is_none());
    }

    #[test]
    fn move_flips_bracketed_discs() {
        let mut game = ReversiState::new_game();
        // black at C2 brackets the white disc at C3 vertically
        game.apply(8);
        assert_eq!(game.board[2 * SIZE + 2], 1);
        assert_eq!(game.turn(), -1);
        let (plus, minus) = game.disc_counts();
        assert_eq!((plus, minus), (4, 1));
    }

    #[test]
    fn pass_is_forced_without_bracketing_moves() {
        // black cannot bracket the corner white disc, white can answer
        let game = ReversiState::from_cells(&[(0, 0, -1), (0, 1, 1)], 1);
        assert!(game.is_action_legal(PASS));
        assert_eq!(game.legal_actions(), vec![PASS]);
        assert!(game.outcome().is_none());
        let mut game = game;
        game.apply(PASS);
        assert_eq!(game.turn(), -1);
        assert!(game.is_action_legal(2));
    }

    #[test]
    fn game_ends_when_neither_side_can_move() {
        let game = ReversiState::from_cells(&[(0, 0, 1), (5, 5, 1), (3, 3, -1)], 1);
        assert_eq!(game.outcome(), Some(1));
        let drawn = ReversiState::from_cells(&[(0, 0, 1), (5, 5, -1)], 1);
        assert_eq!(drawn.outcome(), Some(0));
    }

    #[test]
    fn action_names_round_trip() {
        assert_eq!(ReversiState::action_name(0), "A1");
        assert_eq!(ReversiState::action_name(PASS), "pass");
        assert_eq!(ReversiState::action_index("A1"), Some(0));
        assert_eq!(ReversiState::action_index("F6"), Some(35));
        assert_eq!(ReversiState::action_index("PASS"), Some(PASS));
        assert_eq!(ReversiState::action_index("G1"), None);
    }
}
