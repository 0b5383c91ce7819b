//! 棋子定义

use serde::{Deserialize, Serialize};

use crate::constants::BOARD_SIZE;

/// 棋子类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PieceKind {
    /// 兵（只能斜向前走）
    Man,
    /// 王（四个斜向都能走）
    King,
}

/// 阵营
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// 红方（先手，初始在第 5-7 行，向行号减小方向前进）
    Red,
    /// 黑方（后手，初始在第 0-2 行，向行号增大方向前进）
    Black,
}

impl Side {
    /// 获取对方阵营
    pub fn opponent(&self) -> Side {
        match self {
            Side::Red => Side::Black,
            Side::Black => Side::Red,
        }
    }

    /// 升王所在行
    pub fn promotion_row(&self) -> u8 {
        match self {
            Side::Red => 0,
            Side::Black => (BOARD_SIZE - 1) as u8,
        }
    }

    /// 初始占据的三行
    pub fn home_rows(&self) -> std::ops::Range<u8> {
        match self {
            Side::Red => 5..8,
            Side::Black => 0..3,
        }
    }

    /// 快照编码（0 表示无）
    pub fn code(side: Option<Side>) -> i32 {
        match side {
            None => 0,
            Some(Side::Red) => 1,
            Some(Side::Black) => 2,
        }
    }

    /// 从快照编码解析，编码非法时返回 `None`
    pub fn from_code(code: i32) -> Option<Option<Side>> {
        match code {
            0 => Some(None),
            1 => Some(Some(Side::Red)),
            2 => Some(Some(Side::Black)),
            _ => None,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Red => write!(f, "Red"),
            Side::Black => write!(f, "Black"),
        }
    }
}

static FORWARD_RED: [(i8, i8); 2] = [(-1, -1), (1, -1)];
static FORWARD_BLACK: [(i8, i8); 2] = [(-1, 1), (1, 1)];
static ALL_DIAGONALS: [(i8, i8); 4] = [(-1, -1), (1, -1), (-1, 1), (1, 1)];

/// 棋子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Piece {
    pub kind: PieceKind,
    pub side: Side,
}

impl Piece {
    /// 创建新棋子
    pub fn new(kind: PieceKind, side: Side) -> Self {
        Self { kind, side }
    }

    /// 创建兵
    pub fn man(side: Side) -> Self {
        Self::new(PieceKind::Man, side)
    }

    /// 创建王
    pub fn king(side: Side) -> Self {
        Self::new(PieceKind::King, side)
    }

    pub fn is_king(&self) -> bool {
        self.kind == PieceKind::King
    }

    /// 升王后的棋子
    pub fn crowned(&self) -> Piece {
        Piece::king(self.side)
    }

    /// 可走的斜向 (dx, dy)
    pub fn directions(&self) -> &'static [(i8, i8)] {
        match (self.kind, self.side) {
            (PieceKind::King, _) => &ALL_DIAGONALS,
            (PieceKind::Man, Side::Red) => &FORWARD_RED,
            (PieceKind::Man, Side::Black) => &FORWARD_BLACK,
        }
    }

    /// 快照中的格子编码：0 空，1 红兵，2 黑兵，3 红王，4 黑王
    pub fn square_code(square: Option<Piece>) -> i32 {
        match square {
            None => 0,
            Some(p) => match (p.kind, p.side) {
                (PieceKind::Man, Side::Red) => 1,
                (PieceKind::Man, Side::Black) => 2,
                (PieceKind::King, Side::Red) => 3,
                (PieceKind::King, Side::Black) => 4,
            },
        }
    }

    /// 解析格子编码，编码非法时返回 `None`
    pub fn from_square_code(code: i32) -> Option<Option<Piece>> {
        match code {
            0 => Some(None),
            1 => Some(Some(Piece::man(Side::Red))),
            2 => Some(Some(Piece::man(Side::Black))),
            3 => Some(Some(Piece::king(Side::Red))),
            4 => Some(Some(Piece::king(Side::Black))),
            _ => None,
        }
    }

    /// 文本显示字符（红方 r/R，黑方 b/B，大写为王）
    pub fn display_char(&self) -> char {
        match (self.kind, self.side) {
            (PieceKind::Man, Side::Red) => 'r',
            (PieceKind::Man, Side::Black) => 'b',
            (PieceKind::King, Side::Red) => 'R',
            (PieceKind::King, Side::Black) => 'B',
        }
    }
}

/// 棋盘位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    /// 列 (0-7)
    pub x: u8,
    /// 行 (0-7)
    pub y: u8,
}

impl Position {
    /// 创建新位置
    pub fn new(x: u8, y: u8) -> Option<Self> {
        if (x as usize) < BOARD_SIZE && (y as usize) < BOARD_SIZE {
            Some(Self { x, y })
        } else {
            None
        }
    }

    /// 创建新位置（不检查边界，内部使用）
    pub const fn new_unchecked(x: u8, y: u8) -> Self {
        Self { x, y }
    }

    /// 从网络上的有符号坐标创建
    pub fn from_wire(x: i32, y: i32) -> Option<Self> {
        let x = u8::try_from(x).ok()?;
        let y = u8::try_from(y).ok()?;
        Self::new(x, y)
    }

    /// 检查位置是否在棋盘内
    pub fn is_valid(&self) -> bool {
        (self.x as usize) < BOARD_SIZE && (self.y as usize) < BOARD_SIZE
    }

    /// 是否是深色格（棋子只能站在深色格上）
    pub fn is_dark(&self) -> bool {
        (self.x + self.y) % 2 == 1
    }

    /// 获取偏移后的位置
    pub fn offset(&self, dx: i8, dy: i8) -> Option<Position> {
        let new_x = self.x as i8 + dx;
        let new_y = self.y as i8 + dy;
        if new_x >= 0 && (new_x as usize) < BOARD_SIZE && new_y >= 0 && (new_y as usize) < BOARD_SIZE {
            Some(Position {
                x: new_x as u8,
                y: new_y as u8,
            })
        } else {
            None
        }
    }

    /// 转换为数组索引（行优先）
    pub fn to_index(&self) -> usize {
        self.y as usize * BOARD_SIZE + self.x as usize
    }

    /// 从数组索引转换
    pub fn from_index(index: usize) -> Option<Self> {
        if index < BOARD_SIZE * BOARD_SIZE {
            Some(Position {
                x: (index % BOARD_SIZE) as u8,
                y: (index / BOARD_SIZE) as u8,
            })
        } else {
            None
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_square_codes() {
        for code in 0..=4 {
            let square = Piece::from_square_code(code).unwrap();
            assert_eq!(Piece::square_code(square), code);
        }
        assert!(Piece::from_square_code(5).is_none());
        assert!(Piece::from_square_code(-1).is_none());
    }

    #[test]
    fn test_side_codes() {
        assert_eq!(Side::code(None), 0);
        assert_eq!(Side::from_code(1), Some(Some(Side::Red)));
        assert_eq!(Side::from_code(2), Some(Some(Side::Black)));
        assert_eq!(Side::from_code(3), None);
    }

    #[test]
    fn test_directions() {
        assert_eq!(Piece::man(Side::Red).directions(), &[(-1i8, -1i8), (1, -1)][..]);
        assert_eq!(Piece::man(Side::Black).directions(), &[(-1i8, 1i8), (1, 1)][..]);
        assert_eq!(Piece::king(Side::Black).directions().len(), 4);
    }

    #[test]
    fn test_position_valid() {
        assert!(Position::new(0, 0).is_some());
        assert!(Position::new(7, 7).is_some());
        assert!(Position::new(8, 0).is_none());
        assert!(Position::from_wire(-1, 2).is_none());
        assert!(Position::from_wire(300, 2).is_none());
        assert_eq!(Position::from_wire(3, 4), Some(Position::new_unchecked(3, 4)));
    }

    #[test]
    fn test_position_offset() {
        let pos = Position::new_unchecked(0, 7);
        assert_eq!(pos.offset(1, -1), Some(Position::new_unchecked(1, 6)));
        assert_eq!(pos.offset(-1, -1), None);
        assert_eq!(pos.offset(1, 1), None);
    }

    #[test]
    fn test_dark_squares() {
        assert!(Position::new_unchecked(1, 0).is_dark());
        assert!(!Position::new_unchecked(0, 0).is_dark());
    }

    #[test]
    fn test_side_opponent() {
        assert_eq!(Side::Red.opponent(), Side::Black);
        assert_eq!(Side::Black.opponent(), Side::Red);
    }
}
