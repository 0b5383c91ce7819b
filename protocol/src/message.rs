//! 消息类型定义

use serde::{Deserialize, Serialize};

use crate::codec::Frame;
use crate::constants::MAX_NICKNAME_LEN;
use crate::error::{ChessError, ProtocolError, Result};
use crate::moves::Move;
use crate::piece::Position;

/// 消息类型编码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    GameState = 1,
    Move = 2,
    ChatMessage = 3,
    PlayerReady = 4,
    GameStart = 5,
    GameReset = 6,
    Ping = 7,
    Pong = 8,
    Disconnect = 9,
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            1 => MessageType::GameState,
            2 => MessageType::Move,
            3 => MessageType::ChatMessage,
            4 => MessageType::PlayerReady,
            5 => MessageType::GameStart,
            6 => MessageType::GameReset,
            7 => MessageType::Ping,
            8 => MessageType::Pong,
            9 => MessageType::Disconnect,
            other => return Err(ProtocolError::UnknownMessageType(other)),
        })
    }
}

/// PlayerReady 的 JSON 消息体
#[derive(Debug, Serialize, Deserialize)]
struct ReadyPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

/// 对局连接上的消息
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// 完整对局快照
    GameState(Vec<u8>),
    /// 走法提议（只含起点和终点）
    Move(Move),
    /// 聊天文本
    Chat(String),
    /// 玩家就绪，携带昵称
    ///
    /// 消息体缺少昵称或不是 JSON 时 `name` 为 `None`，消息本身仍然有效。
    PlayerReady { name: Option<String> },
    GameStart,
    GameReset,
    Ping,
    Pong,
    /// 主动断开
    Disconnect,
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::GameState(_) => MessageType::GameState,
            Message::Move(_) => MessageType::Move,
            Message::Chat(_) => MessageType::ChatMessage,
            Message::PlayerReady { .. } => MessageType::PlayerReady,
            Message::GameStart => MessageType::GameStart,
            Message::GameReset => MessageType::GameReset,
            Message::Ping => MessageType::Ping,
            Message::Pong => MessageType::Pong,
            Message::Disconnect => MessageType::Disconnect,
        }
    }

    /// 编码消息体
    pub fn payload(&self) -> Result<Vec<u8>> {
        Ok(match self {
            Message::GameState(snapshot) => snapshot.clone(),
            Message::Move(mv) => {
                let mut data = Vec::with_capacity(16);
                for value in [mv.from.x, mv.from.y, mv.to.x, mv.to.y] {
                    data.extend_from_slice(&(value as i32).to_be_bytes());
                }
                data
            }
            Message::Chat(text) => text.as_bytes().to_vec(),
            Message::PlayerReady { name } => serde_json::to_vec(&ReadyPayload { name: name.clone() })?,
            _ => Vec::new(),
        })
    }

    /// 转换为帧
    pub fn to_frame(&self) -> Result<Frame> {
        Ok(Frame {
            kind: self.message_type() as u8,
            payload: self.payload()?,
        })
    }

    /// 从帧解析
    ///
    /// 未知类型返回 `UnknownMessageType`，消息体无法解析返回 `InvalidPayload`，
    /// 两者都可以跳过后继续读取。
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let kind = MessageType::try_from(frame.kind)?;
        let payload = frame.payload.as_slice();

        Ok(match kind {
            MessageType::GameState => Message::GameState(payload.to_vec()),
            MessageType::Move => Message::Move(decode_move(payload)?),
            MessageType::ChatMessage => Message::Chat(String::from_utf8_lossy(payload).into_owned()),
            MessageType::PlayerReady => Message::PlayerReady {
                name: decode_ready_name(payload),
            },
            MessageType::GameStart => Message::GameStart,
            MessageType::GameReset => Message::GameReset,
            MessageType::Ping => Message::Ping,
            MessageType::Pong => Message::Pong,
            MessageType::Disconnect => Message::Disconnect,
        })
    }
}

/// 验证昵称，返回去掉首尾空白后的结果
pub fn validate_nickname(nickname: &str) -> Result<&str> {
    let trimmed = nickname.trim();
    if trimmed.is_empty() {
        return Err(ProtocolError::NicknameEmpty);
    }
    let len = trimmed.chars().count();
    if len > MAX_NICKNAME_LEN {
        return Err(ProtocolError::NicknameTooLong {
            len,
            max: MAX_NICKNAME_LEN,
        });
    }
    Ok(trimmed)
}

fn decode_ready_name(payload: &[u8]) -> Option<String> {
    let ready: ReadyPayload = serde_json::from_slice(payload).ok()?;
    ready
        .name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}

fn decode_move(payload: &[u8]) -> Result<Move> {
    if payload.len() < 16 {
        return Err(ProtocolError::InvalidPayload {
            kind: "Move",
            reason: format!("expected 16 bytes, got {}", payload.len()),
        });
    }

    let mut values = [0i32; 4];
    for (value, chunk) in values.iter_mut().zip(payload.chunks_exact(4)) {
        *value = i32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    let [from_x, from_y, to_x, to_y] = values;

    let from = Position::from_wire(from_x, from_y).ok_or(ChessError::InvalidPosition { x: from_x, y: from_y })?;
    let to = Position::from_wire(to_x, to_y).ok_or(ChessError::InvalidPosition { x: to_x, y: to_y })?;

    Ok(Move::new(from, to))
}
