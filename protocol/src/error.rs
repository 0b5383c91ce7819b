//! 错误类型定义

use thiserror::Error;

use crate::piece::Position;

/// 跳棋规则错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChessError {
    /// 无效的位置
    #[error("Invalid position: ({x}, {y})")]
    InvalidPosition { x: i32, y: i32 },

    /// 无效的走法（不在当前合法走法列表中）
    #[error("Invalid move: from {from} to {to}")]
    InvalidMove { from: Position, to: Position },

    /// 不是你的回合
    #[error("Not your turn")]
    NotYourTurn,

    /// 游戏已结束
    #[error("Game is already over")]
    GameOver,

    /// 无效的棋盘快照
    #[error("Invalid snapshot: {reason}")]
    InvalidSnapshot { reason: String },
}

/// 协议错误类型
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 序列化错误
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// 帧大小超限
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// 帧头与长度字段不一致
    #[error("Malformed frame: {reason}")]
    MalformedFrame { reason: String },

    /// 未知的消息类型
    #[error("Unknown message type: {0}")]
    UnknownMessageType(u8),

    /// 消息体无法解析
    #[error("Invalid {kind} payload: {reason}")]
    InvalidPayload { kind: &'static str, reason: String },

    /// 连接超时
    #[error("Connection timeout")]
    ConnectionTimeout,

    /// 连接已关闭
    #[error("Connection closed")]
    ConnectionClosed,

    /// 昵称为空
    #[error("Nickname is empty")]
    NicknameEmpty,

    /// 昵称过长
    #[error("Nickname too long: {len} chars (max: {max})")]
    NicknameTooLong { len: usize, max: usize },

    /// 跳棋规则错误
    #[error("Chess error: {0}")]
    Chess(#[from] ChessError),
}

impl ProtocolError {
    /// 该错误发生后连接是否仍可继续使用
    ///
    /// 整帧已被消费、仅消息体无法解释的错误可以跳过；
    /// 其余（IO、帧错误、连接关闭）都意味着字节流已不可用。
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProtocolError::UnknownMessageType(_)
                | ProtocolError::InvalidPayload { .. }
                | ProtocolError::Json(_)
                | ProtocolError::Chess(_)
        )
    }
}

/// 协议操作结果类型
pub type Result<T> = std::result::Result<T, ProtocolError>;
