//! 会话错误类型

use std::net::SocketAddr;

use checkers_protocol::{ChessError, ProtocolError};
use thiserror::Error;

/// 会话层错误
#[derive(Error, Debug)]
pub enum SessionError {
    /// 监听端口绑定失败
    #[error("Failed to listen on port {port}: {reason}")]
    Bind { port: u16, reason: String },

    /// 连接对方失败
    #[error("Failed to connect to {addr}: {reason}")]
    Connect { addr: SocketAddr, reason: String },

    /// 当前没有连接
    #[error("Not connected")]
    NotConnected,

    /// 已有活动会话（正在监听、连接或已连接）
    #[error("Session is busy: {0}")]
    Busy(String),

    /// 发送队列已满，对方长时间没有读取
    #[error("Send queue is full")]
    SendQueueFull,

    /// 对局未在进行
    #[error("No match in progress")]
    NoMatch,

    /// 走法被规则拒绝
    #[error("Rule error: {0}")]
    Rule(#[from] ChessError),

    /// 会话任务已退出
    #[error("Session task has stopped")]
    Closed,

    /// 协议错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// 会话操作结果类型
pub type Result<T> = std::result::Result<T, SessionError>;
