//! 帧编解码
//!
//! 帧格式（大端序）：
//!
//! ```text
//! u32 inner_length | u8 type | u32 payload_length | payload
//! ```
//!
//! 其中 `inner_length = 5 + payload_length`。解码器从累积缓冲区增量解析，
//! 在整帧到齐之前不消费任何字节。

use crate::constants::MAX_FRAME_SIZE;
use crate::error::{ProtocolError, Result};

/// 长度前缀大小
const LENGTH_PREFIX: usize = 4;

/// 类型字节 + 消息体长度
const INNER_HEADER: usize = 5;

/// 空消息体的另一种写法
const NULL_PAYLOAD: u32 = u32::MAX;

/// 一帧原始数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: u8,
    pub payload: Vec<u8>,
}

/// 编码一帧
pub fn encode_frame(kind: u8, payload: &[u8]) -> Result<Vec<u8>> {
    let inner = INNER_HEADER + payload.len();
    if inner > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: inner,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut data = Vec::with_capacity(LENGTH_PREFIX + inner);
    data.extend_from_slice(&(inner as u32).to_be_bytes());
    data.push(kind);
    data.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    data.extend_from_slice(payload);
    Ok(data)
}

impl Frame {
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_frame(self.kind, &self.payload)
    }
}

fn read_u32(data: &[u8]) -> u32 {
    u32::from_be_bytes([data[0], data[1], data[2], data[3]])
}

/// 增量帧解码器
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加收到的字节
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// 尝试取出一帧
    ///
    /// 数据不足时返回 `Ok(None)`；长度字段不合法时返回错误，此后字节流不可再用。
    pub fn decode(&mut self) -> Result<Option<Frame>> {
        if self.buffer.len() < LENGTH_PREFIX {
            return Ok(None);
        }

        let inner = read_u32(&self.buffer) as usize;
        if inner > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: inner,
                max: MAX_FRAME_SIZE,
            });
        }
        if inner < INNER_HEADER {
            return Err(ProtocolError::MalformedFrame {
                reason: format!("inner length {} shorter than header", inner),
            });
        }

        if self.buffer.len() < LENGTH_PREFIX + inner {
            return Ok(None);
        }

        let kind = self.buffer[LENGTH_PREFIX];
        let declared = read_u32(&self.buffer[LENGTH_PREFIX + 1..]);
        let payload_len = if declared == NULL_PAYLOAD { 0 } else { declared as usize };

        if INNER_HEADER + payload_len != inner {
            return Err(ProtocolError::MalformedFrame {
                reason: format!("payload length {} does not match inner length {}", declared, inner),
            });
        }

        let start = LENGTH_PREFIX + INNER_HEADER;
        let payload = self.buffer[start..start + payload_len].to_vec();
        self.buffer.drain(..LENGTH_PREFIX + inner);

        Ok(Some(Frame { kind, payload }))
    }

    /// 已缓冲但尚未解码的字节数
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
