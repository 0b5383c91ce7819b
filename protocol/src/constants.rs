//! 协议常量定义

use std::time::Duration;

/// 棋盘边长（8x8）
pub const BOARD_SIZE: usize = 8;

/// 每方初始棋子数
pub const PIECES_PER_SIDE: usize = 12;

/// 默认对局端口（TCP）
pub const DEFAULT_PORT: u16 = 45678;

/// 默认发现端口（UDP 广播）
pub const DISCOVERY_PORT: u16 = 45679;

/// 发现报文的类型标识
pub const DISCOVERY_MAGIC: &str = "CHECKERS_GAME";

/// 昵称最大长度
pub const MAX_NICKNAME_LEN: usize = 32;

/// 消息帧最大大小（innerLength 上限）
pub const MAX_FRAME_SIZE: usize = 65536;

/// 主机广播间隔（毫秒）
pub const DISCOVERY_INTERVAL_MS: u64 = 2000;

/// 过期节点清理间隔（毫秒）
pub const PEER_SWEEP_INTERVAL_MS: u64 = 1000;

/// 节点超时（毫秒）- 超过此时间未收到广播则移除
pub const PEER_TIMEOUT_MS: u64 = 6000;

/// 心跳间隔（毫秒）
pub const PING_INTERVAL_MS: u64 = 5000;

/// 断开时发送缓冲区的最长等待（毫秒）
pub const DISCONNECT_FLUSH_TIMEOUT_MS: u64 = 1000;

/// 连接超时（秒）
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// 连接超时 Duration
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(CONNECT_TIMEOUT_SECS);
