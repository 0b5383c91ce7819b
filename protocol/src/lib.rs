//! 局域网跳棋共享协议库
//!
//! 包含:
//! - 棋子、棋盘、位置等核心数据结构
//! - 走法生成、对局状态和规则验证
//! - 消息类型定义 (Message)
//! - 帧编解码 (FrameDecoder)
//! - 传输层抽象 (Connector, Connection, Listener traits)

mod board;
mod codec;
mod constants;
mod error;
mod game;
mod message;
mod moves;
mod piece;
mod transport;

pub use board::Board;
pub use codec::{encode_frame, Frame, FrameDecoder};
pub use constants::*;
pub use error::{ChessError, ProtocolError, Result};
pub use game::{CheckersGame, GameEvent, SNAPSHOT_LEN};
pub use message::{validate_nickname, Message, MessageType};
pub use moves::{Move, MoveGenerator};
pub use piece::{Piece, PieceKind, Position, Side};
pub use transport::{
    Connection, Connector, Listener,
    TcpConnection, TcpConnector, TcpListener,
    FrameReader, FrameWriter,
};
