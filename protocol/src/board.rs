//! 棋盘状态

use crate::constants::BOARD_SIZE;
use crate::piece::{Piece, Position, Side};

/// 棋盘
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    /// 8x8 棋盘，索引为 y * 8 + x
    squares: Vec<Option<Piece>>,
}

impl Board {
    /// 创建空棋盘
    pub fn empty() -> Self {
        Self {
            squares: vec![None; BOARD_SIZE * BOARD_SIZE],
        }
    }

    /// 创建初始棋盘：双方各 12 个兵，只放在深色格上
    pub fn initial() -> Self {
        let mut board = Self::empty();

        for side in [Side::Black, Side::Red] {
            for y in side.home_rows() {
                for x in 0..BOARD_SIZE as u8 {
                    let pos = Position::new_unchecked(x, y);
                    if pos.is_dark() {
                        board.set(pos, Some(Piece::man(side)));
                    }
                }
            }
        }

        board
    }

    /// 获取指定位置的棋子
    pub fn get(&self, pos: Position) -> Option<Piece> {
        if pos.is_valid() {
            self.squares[pos.to_index()]
        } else {
            None
        }
    }

    /// 设置指定位置的棋子
    pub fn set(&mut self, pos: Position, piece: Option<Piece>) {
        if pos.is_valid() {
            self.squares[pos.to_index()] = piece;
        }
    }

    /// 检查位置是否在棋盘内且为空
    pub fn is_empty_at(&self, pos: Position) -> bool {
        pos.is_valid() && self.get(pos).is_none()
    }

    /// 获取指定阵营的所有棋子位置（行优先顺序）
    pub fn pieces(&self, side: Side) -> Vec<(Position, Piece)> {
        self.squares
            .iter()
            .enumerate()
            .filter_map(|(index, square)| {
                let piece = (*square)?;
                if piece.side != side {
                    return None;
                }
                Position::from_index(index).map(|pos| (pos, piece))
            })
            .collect()
    }

    /// 指定阵营的棋子数量
    pub fn count(&self, side: Side) -> usize {
        self.squares
            .iter()
            .filter(|square| matches!(square, Some(p) if p.side == side))
            .count()
    }

    /// 按行优先顺序遍历所有格子
    pub fn squares(&self) -> impl Iterator<Item = Option<Piece>> + '_ {
        self.squares.iter().copied()
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::initial()
    }
}

impl std::fmt::Display for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "  01234567")?;
        for y in 0..BOARD_SIZE as u8 {
            write!(f, "{} ", y)?;
            for x in 0..BOARD_SIZE as u8 {
                let pos = Position::new_unchecked(x, y);
                let c = match self.get(pos) {
                    Some(piece) => piece.display_char(),
                    None if pos.is_dark() => '.',
                    None => ' ',
                };
                write!(f, "{}", c)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::PIECES_PER_SIDE;

    #[test]
    fn test_initial_board() {
        let board = Board::initial();

        assert_eq!(board.count(Side::Red), PIECES_PER_SIDE);
        assert_eq!(board.count(Side::Black), PIECES_PER_SIDE);

        for side in [Side::Red, Side::Black] {
            for (pos, piece) in board.pieces(side) {
                assert!(pos.is_dark(), "{} is a light square", pos);
                assert!(side.home_rows().contains(&pos.y));
                assert!(!piece.is_king());
            }
        }

        // 中间两行为空
        for x in 0..8 {
            assert!(board.get(Position::new_unchecked(x, 3)).is_none());
            assert!(board.get(Position::new_unchecked(x, 4)).is_none());
        }
    }

    #[test]
    fn test_set_and_get() {
        let mut board = Board::empty();
        let pos = Position::new_unchecked(3, 4);
        board.set(pos, Some(Piece::king(Side::Black)));
        assert_eq!(board.get(pos), Some(Piece::king(Side::Black)));
        assert!(!board.is_empty_at(pos));
        assert!(!board.is_empty_at(Position::new_unchecked(9, 9)));
    }

    #[test]
    fn test_display() {
        let text = Board::initial().to_string();
        assert_eq!(text.lines().count(), 9);
        assert_eq!(text.lines().nth(1).unwrap(), "0  b b b b");
        assert!(text.lines().last().unwrap().contains('r'));
    }
}
