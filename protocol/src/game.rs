//! 对局状态
//!
//! `CheckersGame` 独占棋盘，只能通过 `apply_move` / `reset` / `restore` 修改。
//! 状态变化通过 `subscribe` 注册的监听器通知给表现层。

use crate::board::Board;
use crate::constants::BOARD_SIZE;
use crate::error::ChessError;
use crate::moves::{Move, MoveGenerator};
use crate::piece::{Piece, Position, Side};

/// 快照字节数：64 个格子 + 当前走子方 + 胜者，每项 4 字节
pub const SNAPSHOT_LEN: usize = (BOARD_SIZE * BOARD_SIZE + 2) * 4;

/// 对局事件
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    /// 棋盘内容变化
    BoardChanged,
    /// 轮到某方走棋
    TurnChanged(Side),
    /// 游戏结束，携带胜者
    GameOver(Side),
    /// 本步被吃掉的棋子
    PiecesCaptured(Vec<Position>),
    /// 兵在该位置升王
    PieceCrowned(Position),
}

type Listener = Box<dyn FnMut(&GameEvent) + Send>;

/// 跳棋对局
pub struct CheckersGame {
    board: Board,
    current_turn: Side,
    winner: Option<Side>,
    listeners: Vec<Listener>,
}

impl CheckersGame {
    /// 创建初始对局（红方先走）
    pub fn new() -> Self {
        Self::from_board(Board::initial(), Side::Red)
    }

    /// 从指定棋盘创建对局
    pub fn from_board(board: Board, current_turn: Side) -> Self {
        Self {
            board,
            current_turn,
            winner: None,
            listeners: Vec::new(),
        }
    }

    /// 注册事件监听器
    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: FnMut(&GameEvent) + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    fn emit(&mut self, event: GameEvent) {
        for listener in &mut self.listeners {
            listener(&event);
        }
    }

    /// 重新开局
    pub fn reset(&mut self) {
        self.board = Board::initial();
        self.current_turn = Side::Red;
        self.winner = None;
        self.emit(GameEvent::BoardChanged);
        self.emit(GameEvent::TurnChanged(self.current_turn));
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn piece_at(&self, pos: Position) -> Option<Piece> {
        self.board.get(pos)
    }

    pub fn current_turn(&self) -> Side {
        self.current_turn
    }

    pub fn winner(&self) -> Option<Side> {
        self.winner
    }

    pub fn is_game_over(&self) -> bool {
        self.winner.is_some()
    }

    /// 当前走子方在该位置的合法走法
    ///
    /// 空格、越界或对方棋子返回空列表。
    pub fn moves_from(&self, pos: Position) -> Vec<Move> {
        match self.board.get(pos) {
            Some(piece) if piece.side == self.current_turn => MoveGenerator::legal_moves(&self.board, pos),
            _ => Vec::new(),
        }
    }

    /// 指定阵营可以走动的棋子
    pub fn movable_pieces(&self, side: Side) -> Vec<Position> {
        MoveGenerator::movable_pieces(&self.board, side)
    }

    /// 检查走法是否合法（只比较起点和终点）
    pub fn is_valid_move(&self, mv: &Move) -> bool {
        self.moves_from(mv.from).contains(mv)
    }

    /// 执行走法
    ///
    /// 走法会与重新生成的合法走法比对，吃子列表以生成结果为准。
    /// 被拒绝时棋盘不变，也不发出任何事件。成功时返回实际执行的走法。
    pub fn apply_move(&mut self, mv: &Move) -> Result<Move, ChessError> {
        if self.is_game_over() {
            return Err(ChessError::GameOver);
        }

        let full = self
            .moves_from(mv.from)
            .into_iter()
            .find(|candidate| candidate == mv)
            .ok_or_else(|| {
                tracing::debug!("Rejected move {} for {}", mv, self.current_turn);
                ChessError::InvalidMove {
                    from: mv.from,
                    to: mv.to,
                }
            })?;

        let Some(piece) = self.board.get(full.from) else {
            return Err(ChessError::InvalidMove {
                from: mv.from,
                to: mv.to,
            });
        };

        self.board.set(full.from, None);
        self.board.set(full.to, Some(piece));

        if full.is_capture() {
            for &captured in &full.captures {
                self.board.set(captured, None);
            }
            self.emit(GameEvent::PiecesCaptured(full.captures.clone()));
        }

        if !piece.is_king() && full.to.y == piece.side.promotion_row() {
            self.board.set(full.to, Some(piece.crowned()));
            self.emit(GameEvent::PieceCrowned(full.to));
        }

        self.emit(GameEvent::BoardChanged);

        self.current_turn = self.current_turn.opponent();
        self.emit(GameEvent::TurnChanged(self.current_turn));
        self.check_for_winner();

        Ok(full)
    }

    /// 当前走子方无子可动则判负
    fn check_for_winner(&mut self) {
        if self.movable_pieces(self.current_turn).is_empty() {
            let winner = self.current_turn.opponent();
            tracing::info!("{} has no legal move, {} wins", self.current_turn, winner);
            self.winner = Some(winner);
            self.emit(GameEvent::GameOver(winner));
        }
    }

    /// 序列化为快照：64 个格子编码（行优先），然后是当前走子方和胜者，均为大端 i32
    pub fn snapshot(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(SNAPSHOT_LEN);
        for square in self.board.squares() {
            data.extend_from_slice(&Piece::square_code(square).to_be_bytes());
        }
        data.extend_from_slice(&Side::code(Some(self.current_turn)).to_be_bytes());
        data.extend_from_slice(&Side::code(self.winner).to_be_bytes());
        data
    }

    /// 从快照恢复
    ///
    /// 快照整体校验通过后才替换当前状态。
    pub fn restore(&mut self, data: &[u8]) -> Result<(), ChessError> {
        if data.len() != SNAPSHOT_LEN {
            return Err(ChessError::InvalidSnapshot {
                reason: format!("expected {} bytes, got {}", SNAPSHOT_LEN, data.len()),
            });
        }

        let mut codes = data
            .chunks_exact(4)
            .map(|chunk| i32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));

        let mut board = Board::empty();
        for index in 0..BOARD_SIZE * BOARD_SIZE {
            let code = codes.next().unwrap_or_default();
            let square = Piece::from_square_code(code).ok_or_else(|| ChessError::InvalidSnapshot {
                reason: format!("bad piece code {} at square {}", code, index),
            })?;
            if let Some(pos) = Position::from_index(index) {
                board.set(pos, square);
            }
        }

        let turn_code = codes.next().unwrap_or_default();
        let current_turn = Side::from_code(turn_code)
            .flatten()
            .ok_or_else(|| ChessError::InvalidSnapshot {
                reason: format!("bad current player code {}", turn_code),
            })?;

        let winner_code = codes.next().unwrap_or_default();
        let winner = Side::from_code(winner_code).ok_or_else(|| ChessError::InvalidSnapshot {
            reason: format!("bad winner code {}", winner_code),
        })?;

        self.board = board;
        self.current_turn = current_turn;
        self.winner = winner;

        self.emit(GameEvent::BoardChanged);
        self.emit(GameEvent::TurnChanged(self.current_turn));
        if let Some(winner) = self.winner {
            self.emit(GameEvent::GameOver(winner));
        }

        Ok(())
    }
}

impl Default for CheckersGame {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CheckersGame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckersGame")
            .field("board", &self.board)
            .field("current_turn", &self.current_turn)
            .field("winner", &self.winner)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::piece::PieceKind;
    use std::sync::{Arc, Mutex};

    fn pos(x: u8, y: u8) -> Position {
        Position::new_unchecked(x, y)
    }

    fn recorder(game: &mut CheckersGame) -> Arc<Mutex<Vec<GameEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        game.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
        events
    }

    #[test]
    fn test_new_game() {
        let game = CheckersGame::new();
        assert_eq!(game.current_turn(), Side::Red);
        assert_eq!(game.winner(), None);
        assert!(!game.is_game_over());
        assert_eq!(game.board().count(Side::Red), 12);
        assert_eq!(game.board().count(Side::Black), 12);
    }

    #[test]
    fn test_reset_after_moves() {
        let mut game = CheckersGame::new();
        game.apply_move(&Move::new(pos(2, 5), pos(3, 4))).unwrap();
        game.reset();
        assert_eq!(game.board(), &Board::initial());
        assert_eq!(game.current_turn(), Side::Red);
        assert_eq!(game.winner(), None);
    }

    #[test]
    fn test_moves_from_opponent_square_is_empty() {
        let game = CheckersGame::new();
        // 黑方棋子，但轮到红方
        assert!(game.moves_from(pos(1, 2)).is_empty());
        // 越界
        assert!(game.moves_from(pos(8, 8)).is_empty());
        assert!(!game.moves_from(pos(2, 5)).is_empty());
    }

    #[test]
    fn test_apply_simple_move_switches_turn() {
        let mut game = CheckersGame::new();
        let events = recorder(&mut game);

        let done = game.apply_move(&Move::new(pos(2, 5), pos(3, 4))).unwrap();
        assert!(done.captures.is_empty());
        assert_eq!(game.piece_at(pos(3, 4)), Some(Piece::man(Side::Red)));
        assert_eq!(game.piece_at(pos(2, 5)), None);
        assert_eq!(game.current_turn(), Side::Black);

        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            vec![GameEvent::BoardChanged, GameEvent::TurnChanged(Side::Black)]
        );
    }

    #[test]
    fn test_rejected_move_changes_nothing() {
        let mut game = CheckersGame::new();
        let events = recorder(&mut game);
        let before = game.board().clone();

        // 向后走
        let err = game.apply_move(&Move::new(pos(2, 5), pos(3, 6))).unwrap_err();
        assert!(matches!(err, ChessError::InvalidMove { .. }));
        // 黑方棋子，不是黑方回合
        assert!(game.apply_move(&Move::new(pos(1, 2), pos(0, 3))).is_err());

        assert_eq!(game.board(), &before);
        assert_eq!(game.current_turn(), Side::Red);
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_caller_captures_are_ignored() {
        let mut board = Board::empty();
        board.set(pos(2, 5), Some(Piece::man(Side::Red)));
        board.set(pos(3, 4), Some(Piece::man(Side::Black)));
        board.set(pos(7, 0), Some(Piece::man(Side::Black)));
        board.set(pos(0, 1), Some(Piece::man(Side::Black)));
        let mut game = CheckersGame::from_board(board, Side::Red);

        // 伪造的吃子列表不会被执行
        let forged = Move::with_captures(pos(2, 5), pos(4, 3), vec![pos(7, 0)]);
        let done = game.apply_move(&forged).unwrap();
        assert_eq!(done.captures, vec![pos(3, 4)]);
        assert_eq!(game.piece_at(pos(7, 0)), Some(Piece::man(Side::Black)));
        assert_eq!(game.piece_at(pos(3, 4)), None);
    }

    #[test]
    fn test_forced_capture_rejects_simple_move() {
        let mut board = Board::empty();
        board.set(pos(2, 5), Some(Piece::man(Side::Red)));
        board.set(pos(3, 4), Some(Piece::man(Side::Black)));
        board.set(pos(6, 5), Some(Piece::man(Side::Red)));
        board.set(pos(0, 1), Some(Piece::man(Side::Black)));
        let mut game = CheckersGame::from_board(board, Side::Red);

        assert_eq!(game.movable_pieces(Side::Red), vec![pos(2, 5)]);
        assert!(game.moves_from(pos(6, 5)).is_empty());
        assert!(game.is_valid_move(&Move::new(pos(2, 5), pos(4, 3))));
        assert!(!game.is_valid_move(&Move::new(pos(6, 5), pos(5, 4))));
        assert!(game.apply_move(&Move::new(pos(6, 5), pos(5, 4))).is_err());
    }

    #[test]
    fn test_multi_jump_removes_all_captured() {
        let mut board = Board::empty();
        board.set(pos(1, 6), Some(Piece::man(Side::Red)));
        board.set(pos(2, 5), Some(Piece::man(Side::Black)));
        board.set(pos(4, 3), Some(Piece::man(Side::Black)));
        board.set(pos(0, 1), Some(Piece::man(Side::Black)));
        let mut game = CheckersGame::from_board(board, Side::Red);
        let events = recorder(&mut game);

        // 中间落点不是合法终点
        assert!(game.apply_move(&Move::new(pos(1, 6), pos(3, 4))).is_err());

        let done = game.apply_move(&Move::new(pos(1, 6), pos(5, 2))).unwrap();
        assert_eq!(done.captures.len(), 2);
        assert_eq!(game.board().count(Side::Black), 1);
        assert_eq!(game.piece_at(pos(5, 2)), Some(Piece::man(Side::Red)));

        let events = events.lock().unwrap();
        assert_eq!(events[0], GameEvent::PiecesCaptured(vec![pos(2, 5), pos(4, 3)]));
    }

    #[test]
    fn test_promotion_on_last_row_only() {
        let mut board = Board::empty();
        board.set(pos(3, 2), Some(Piece::man(Side::Red)));
        board.set(pos(6, 1), Some(Piece::man(Side::Black)));
        let mut game = CheckersGame::from_board(board, Side::Red);
        let events = recorder(&mut game);

        game.apply_move(&Move::new(pos(3, 2), pos(2, 1))).unwrap();
        assert_eq!(game.piece_at(pos(2, 1)), Some(Piece::man(Side::Red)));

        game.apply_move(&Move::new(pos(6, 1), pos(5, 2))).unwrap();
        game.apply_move(&Move::new(pos(2, 1), pos(1, 0))).unwrap();
        assert_eq!(game.piece_at(pos(1, 0)), Some(Piece::king(Side::Red)));

        let crowned: Vec<_> = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, GameEvent::PieceCrowned(_)))
            .cloned()
            .collect();
        assert_eq!(crowned, vec![GameEvent::PieceCrowned(pos(1, 0))]);
    }

    #[test]
    fn test_black_promotes_on_row_seven() {
        let mut board = Board::empty();
        board.set(pos(3, 6), Some(Piece::man(Side::Black)));
        board.set(pos(0, 3), Some(Piece::man(Side::Red)));
        let mut game = CheckersGame::from_board(board, Side::Black);

        game.apply_move(&Move::new(pos(3, 6), pos(4, 7))).unwrap();
        assert_eq!(game.piece_at(pos(4, 7)), Some(Piece::new(PieceKind::King, Side::Black)));
    }

    #[test]
    fn test_capturing_last_piece_wins_once() {
        let mut board = Board::empty();
        board.set(pos(2, 5), Some(Piece::man(Side::Red)));
        board.set(pos(3, 4), Some(Piece::man(Side::Black)));
        let mut game = CheckersGame::from_board(board, Side::Red);
        let events = recorder(&mut game);

        game.apply_move(&Move::new(pos(2, 5), pos(4, 3))).unwrap();
        assert_eq!(game.winner(), Some(Side::Red));
        assert!(game.is_game_over());

        // 结束后任何走法都被拒绝
        assert_eq!(
            game.apply_move(&Move::new(pos(4, 3), pos(3, 2))),
            Err(ChessError::GameOver)
        );

        let game_overs = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, GameEvent::GameOver(_)))
            .count();
        assert_eq!(game_overs, 1);
    }

    #[test]
    fn test_blocked_player_loses() {
        let mut board = Board::empty();
        // 黑兵在 (0,5)，前方 (1,6) 被红兵挡住且无法吃（(2,7) 有红子）
        board.set(pos(0, 5), Some(Piece::man(Side::Black)));
        board.set(pos(1, 6), Some(Piece::man(Side::Red)));
        board.set(pos(2, 7), Some(Piece::man(Side::Red)));
        board.set(pos(5, 6), Some(Piece::man(Side::Red)));
        let mut game = CheckersGame::from_board(board, Side::Red);

        game.apply_move(&Move::new(pos(5, 6), pos(4, 5))).unwrap();
        assert_eq!(game.movable_pieces(Side::Black), Vec::<Position>::new());
        assert_eq!(game.winner(), Some(Side::Red));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut game = CheckersGame::new();
        game.apply_move(&Move::new(pos(2, 5), pos(3, 4))).unwrap();
        game.apply_move(&Move::new(pos(1, 2), pos(2, 3))).unwrap();

        let data = game.snapshot();
        assert_eq!(data.len(), SNAPSHOT_LEN);

        let mut restored = CheckersGame::new();
        restored.restore(&data).unwrap();
        assert_eq!(restored.board(), game.board());
        assert_eq!(restored.current_turn(), game.current_turn());
        assert_eq!(restored.winner(), game.winner());
    }

    #[test]
    fn test_snapshot_with_winner_and_kings() {
        let mut board = Board::empty();
        board.set(pos(3, 0), Some(Piece::king(Side::Red)));
        let mut game = CheckersGame::from_board(board, Side::Black);
        game.winner = Some(Side::Red);

        let mut restored = CheckersGame::new();
        let events = recorder(&mut restored);
        restored.restore(&game.snapshot()).unwrap();

        assert_eq!(restored.piece_at(pos(3, 0)), Some(Piece::king(Side::Red)));
        assert_eq!(restored.winner(), Some(Side::Red));
        assert!(events.lock().unwrap().contains(&GameEvent::GameOver(Side::Red)));
    }

    #[test]
    fn test_snapshot_layout() {
        let data = CheckersGame::new().snapshot();
        // (1,0) 是黑兵，编码 2
        assert_eq!(&data[4..8], &2i32.to_be_bytes());
        // 当前走子方红方 = 1，胜者无 = 0
        assert_eq!(&data[256..260], &1i32.to_be_bytes());
        assert_eq!(&data[260..264], &0i32.to_be_bytes());
    }

    #[test]
    fn test_restore_rejects_bad_input() {
        let mut game = CheckersGame::new();
        let before = game.board().clone();

        assert!(game.restore(&[0u8; 10]).is_err());

        let mut data = game.snapshot();
        data[0..4].copy_from_slice(&9i32.to_be_bytes());
        assert!(game.restore(&data).is_err());

        let mut data = game.snapshot();
        data[256..260].copy_from_slice(&0i32.to_be_bytes());
        assert!(game.restore(&data).is_err());

        assert_eq!(game.board(), &before);
    }
}
