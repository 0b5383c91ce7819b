//! 走法生成和验证
//!
//! 规则要点：
//! - 兵只能沿前进方向的两个斜向走一步，王四个斜向都可以；
//! - 强制吃子：只要本方任意棋子存在一步吃子，就只能走吃子走法；
//! - 连跳：吃子后若落点还能继续吃，则必须跳完整条链，每条链作为一个独立走法。

use crate::board::Board;
use crate::piece::{Piece, Position, Side};

/// 走法
///
/// 相等性只比较起点和终点；吃子列表由走法生成器推导，调用方给出的不作数。
#[derive(Debug, Clone, Eq)]
pub struct Move {
    /// 起始位置
    pub from: Position,
    /// 目标位置
    pub to: Position,
    /// 按跳跃顺序被吃掉的棋子位置
    pub captures: Vec<Position>,
}

impl Move {
    /// 创建新走法
    pub fn new(from: Position, to: Position) -> Self {
        Self {
            from,
            to,
            captures: Vec::new(),
        }
    }

    /// 创建带吃子的走法
    pub fn with_captures(from: Position, to: Position, captures: Vec<Position>) -> Self {
        Self { from, to, captures }
    }

    /// 是否为吃子走法
    pub fn is_capture(&self) -> bool {
        !self.captures.is_empty()
    }
}

impl PartialEq for Move {
    fn eq(&self, other: &Self) -> bool {
        self.from == other.from && self.to == other.to
    }
}

impl std::fmt::Display for Move {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)?;
        if !self.captures.is_empty() {
            write!(f, " x{}", self.captures.len())?;
        }
        Ok(())
    }
}

/// 走法生成器
pub struct MoveGenerator;

impl MoveGenerator {
    /// 生成指定位置棋子的合法走法（按棋子所属阵营判断强制吃子）
    pub fn legal_moves(board: &Board, from: Position) -> Vec<Move> {
        let Some(piece) = board.get(from) else {
            return Vec::new();
        };

        let captures = Self::capture_moves(board, from, piece);
        if !captures.is_empty() || Self::side_has_capture(board, piece.side) {
            // 本方存在吃子时只能吃子，这枚棋子吃不了就没有走法
            return captures;
        }

        Self::simple_moves(board, from, piece)
    }

    /// 指定阵营中至少有一个合法走法的棋子
    pub fn movable_pieces(board: &Board, side: Side) -> Vec<Position> {
        let must_capture = Self::side_has_capture(board, side);

        board
            .pieces(side)
            .into_iter()
            .filter(|&(pos, piece)| {
                if must_capture {
                    Self::can_capture(board, pos, piece)
                } else {
                    !Self::simple_moves(board, pos, piece).is_empty()
                }
            })
            .map(|(pos, _)| pos)
            .collect()
    }

    /// 指定阵营是否有任意棋子可以吃子
    pub fn side_has_capture(board: &Board, side: Side) -> bool {
        board
            .pieces(side)
            .into_iter()
            .any(|(pos, piece)| Self::can_capture(board, pos, piece))
    }

    /// 棋子在当前位置是否存在一步吃子
    pub fn can_capture(board: &Board, from: Position, piece: Piece) -> bool {
        piece
            .directions()
            .iter()
            .any(|&(dx, dy)| Self::jump_target(board, from, piece.side, dx, dy).is_some())
    }

    /// 某个方向上的跳吃：返回 (被吃位置, 落点)
    fn jump_target(board: &Board, from: Position, side: Side, dx: i8, dy: i8) -> Option<(Position, Position)> {
        let over = from.offset(dx, dy)?;
        let landing = from.offset(dx * 2, dy * 2)?;
        let victim = board.get(over)?;
        if victim.side != side && board.is_empty_at(landing) {
            Some((over, landing))
        } else {
            None
        }
    }

    /// 生成不吃子的一步走法
    fn simple_moves(board: &Board, from: Position, piece: Piece) -> Vec<Move> {
        piece
            .directions()
            .iter()
            .filter_map(|&(dx, dy)| from.offset(dx, dy))
            .filter(|&to| board.is_empty_at(to))
            .map(|to| Move::new(from, to))
            .collect()
    }

    /// 生成所有吃子走法（包含连跳的每一条完整链）
    fn capture_moves(board: &Board, from: Position, piece: Piece) -> Vec<Move> {
        let mut moves = Vec::new();
        let mut captured = Vec::new();
        let scratch = board.clone();
        Self::search_jumps(scratch, from, from, piece, &mut captured, &mut moves);
        moves
    }

    /// 在草稿棋盘上深度优先搜索连跳
    ///
    /// 每一跳先在草稿棋盘上执行（清空起点和被吃格、占据落点），回溯时还原。
    /// 搜索过程中棋子类型不变，升王只在整步走完后判定。
    fn search_jumps(
        mut scratch: Board,
        origin: Position,
        current: Position,
        piece: Piece,
        captured: &mut Vec<Position>,
        moves: &mut Vec<Move>,
    ) -> Board {
        let mut extended = false;

        for &(dx, dy) in piece.directions() {
            let Some((over, landing)) = Self::jump_target(&scratch, current, piece.side, dx, dy) else {
                continue;
            };
            let victim = scratch.get(over);
            extended = true;

            scratch.set(current, None);
            scratch.set(over, None);
            scratch.set(landing, Some(piece));
            captured.push(over);

            scratch = Self::search_jumps(scratch, origin, landing, piece, captured, moves);

            captured.pop();
            scratch.set(landing, None);
            scratch.set(over, victim);
            scratch.set(current, Some(piece));
        }

        if !extended && !captured.is_empty() {
            moves.push(Move::with_captures(origin, current, captured.clone()));
        }

        scratch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::piece::PieceKind;

    fn pos(x: u8, y: u8) -> Position {
        Position::new_unchecked(x, y)
    }

    fn place(board: &mut Board, x: u8, y: u8, kind: PieceKind, side: Side) {
        board.set(pos(x, y), Some(Piece::new(kind, side)));
    }

    #[test]
    fn test_initial_moves() {
        let board = Board::initial();

        // 红方只有第 5 行的棋子能走，共 7 步
        let movable = MoveGenerator::movable_pieces(&board, Side::Red);
        assert_eq!(movable.len(), 4);
        assert!(movable.iter().all(|p| p.y == 5));

        let total: usize = movable
            .iter()
            .map(|&p| MoveGenerator::legal_moves(&board, p).len())
            .sum();
        assert_eq!(total, 7);
    }

    #[test]
    fn test_man_moves_forward_only() {
        let mut board = Board::empty();
        place(&mut board, 3, 4, PieceKind::Man, Side::Red);
        place(&mut board, 4, 1, PieceKind::Man, Side::Black);

        let red = MoveGenerator::legal_moves(&board, pos(3, 4));
        assert_eq!(red.len(), 2);
        assert!(red.iter().all(|m| m.to.y == 3));

        let black = MoveGenerator::legal_moves(&board, pos(4, 1));
        assert_eq!(black.len(), 2);
        assert!(black.iter().all(|m| m.to.y == 2));
    }

    #[test]
    fn test_king_moves_all_directions() {
        let mut board = Board::empty();
        place(&mut board, 3, 4, PieceKind::King, Side::Red);

        let moves = MoveGenerator::legal_moves(&board, pos(3, 4));
        assert_eq!(moves.len(), 4);
    }

    #[test]
    fn test_empty_square_has_no_moves() {
        let board = Board::initial();
        assert!(MoveGenerator::legal_moves(&board, pos(0, 4)).is_empty());
    }

    #[test]
    fn test_forced_capture() {
        let mut board = Board::empty();
        // 红兵 (2,5) 可以吃 (3,4) 的黑兵
        place(&mut board, 2, 5, PieceKind::Man, Side::Red);
        place(&mut board, 3, 4, PieceKind::Man, Side::Black);
        // 另一个红兵只能普通走
        place(&mut board, 6, 5, PieceKind::Man, Side::Red);

        let movable = MoveGenerator::movable_pieces(&board, Side::Red);
        assert_eq!(movable, vec![pos(2, 5)]);

        // 不能吃子的棋子没有走法
        assert!(MoveGenerator::legal_moves(&board, pos(6, 5)).is_empty());

        let moves = MoveGenerator::legal_moves(&board, pos(2, 5));
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].to, pos(4, 3));
        assert_eq!(moves[0].captures, vec![pos(3, 4)]);
    }

    #[test]
    fn test_cannot_jump_own_piece_or_off_board() {
        let mut board = Board::empty();
        place(&mut board, 1, 2, PieceKind::Man, Side::Red);
        place(&mut board, 0, 1, PieceKind::Man, Side::Black);
        place(&mut board, 2, 1, PieceKind::Man, Side::Red);

        // (0,1) 之外没有落点，(2,1) 是己方
        assert!(!MoveGenerator::side_has_capture(&board, Side::Red));
    }

    #[test]
    fn test_multi_jump() {
        let mut board = Board::empty();
        place(&mut board, 1, 6, PieceKind::Man, Side::Red);
        place(&mut board, 2, 5, PieceKind::Man, Side::Black);
        place(&mut board, 4, 3, PieceKind::Man, Side::Black);

        let moves = MoveGenerator::legal_moves(&board, pos(1, 6));
        assert_eq!(moves.len(), 1, "intermediate landing must not be reported");
        assert_eq!(moves[0].to, pos(5, 2));
        assert_eq!(moves[0].captures, vec![pos(2, 5), pos(4, 3)]);
    }

    #[test]
    fn test_branching_chains_of_different_length() {
        let mut board = Board::empty();
        // 向左只能跳一次，向右可以连跳两次
        place(&mut board, 3, 6, PieceKind::Man, Side::Red);
        place(&mut board, 2, 5, PieceKind::Man, Side::Black);
        place(&mut board, 4, 5, PieceKind::Man, Side::Black);
        place(&mut board, 6, 3, PieceKind::Man, Side::Black);

        let moves = MoveGenerator::legal_moves(&board, pos(3, 6));
        assert_eq!(moves.len(), 2);

        let short = moves.iter().find(|m| m.to == pos(1, 4)).unwrap();
        assert_eq!(short.captures.len(), 1);

        let long = moves.iter().find(|m| m.to == pos(7, 2)).unwrap();
        assert_eq!(long.captures, vec![pos(4, 5), pos(6, 3)]);
    }

    #[test]
    fn test_man_does_not_jump_backwards_mid_chain() {
        let mut board = Board::empty();
        place(&mut board, 1, 6, PieceKind::Man, Side::Red);
        place(&mut board, 2, 5, PieceKind::Man, Side::Black);
        // 落点 (3,4) 后方还有黑子，兵不能向后吃
        place(&mut board, 4, 5, PieceKind::Man, Side::Black);

        let moves = MoveGenerator::legal_moves(&board, pos(1, 6));
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].to, pos(3, 4));
    }

    #[test]
    fn test_king_multi_jump_around() {
        let mut board = Board::empty();
        place(&mut board, 2, 5, PieceKind::King, Side::Black);
        place(&mut board, 3, 4, PieceKind::Man, Side::Red);
        place(&mut board, 5, 4, PieceKind::Man, Side::Red);

        // 黑王向上跳到 (4,3)，再向下跳到 (6,5)
        let moves = MoveGenerator::legal_moves(&board, pos(2, 5));
        assert!(moves
            .iter()
            .any(|m| m.to == pos(6, 5) && m.captures == vec![pos(3, 4), pos(5, 4)]));
        assert!(!moves.iter().any(|m| m.to == pos(4, 3)));
    }

    #[test]
    fn test_search_leaves_board_untouched() {
        let mut board = Board::empty();
        place(&mut board, 1, 6, PieceKind::Man, Side::Red);
        place(&mut board, 2, 5, PieceKind::Man, Side::Black);
        place(&mut board, 4, 3, PieceKind::Man, Side::Black);
        let before = board.clone();

        let _ = MoveGenerator::legal_moves(&board, pos(1, 6));
        assert_eq!(board, before);
    }

    #[test]
    fn test_move_equality_ignores_captures() {
        let a = Move::new(pos(1, 6), pos(5, 2));
        let b = Move::with_captures(pos(1, 6), pos(5, 2), vec![pos(2, 5), pos(4, 3)]);
        assert_eq!(a, b);
        assert!(b.is_capture());
    }
}
