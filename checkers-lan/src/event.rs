//! 会话事件与状态

use checkers_protocol::{Move, Side};

use crate::discovery::PeerInfo;

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// 空闲
    Idle,
    /// 主机方等待连接
    Listening,
    /// 加入方正在连接
    Connecting,
    /// 已连接
    Connected,
    /// 对方已断开
    Disconnected,
}

/// 本地角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// 主机（执红）
    Host,
    /// 加入方（执黑）
    Client,
}

impl Role {
    /// 本地执子颜色
    pub fn side(&self) -> Side {
        match self {
            Role::Host => Side::Red,
            Role::Client => Side::Black,
        }
    }
}

/// 会话状态快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: SessionState,
    pub role: Option<Role>,
    pub local_name: String,
    pub opponent_name: Option<String>,
    /// 主机方实际监听的端口
    pub listen_port: Option<u16>,
    /// 正在接收公告的 UDP 端口
    pub discovery_port: Option<u16>,
}

/// 会话向上层发出的事件
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// 连接建立
    Connected,
    /// 连接断开
    Disconnected,
    /// 建立连接失败
    ConnectionError(String),
    /// 对手已连接，携带对手名称
    OpponentConnected(String),
    /// 对手断开
    OpponentDisconnected,
    /// 收到走法
    MoveReceived(Move),
    /// 收到对局快照
    GameStateReceived(Vec<u8>),
    /// 收到聊天消息
    ChatReceived { from: String, text: String },
    /// 对手就绪
    PlayerReady,
    /// 对局开始
    GameStart,
    /// 对手要求重新开局
    GameReset,
    /// 发现新的主机
    PeerDiscovered(PeerInfo),
    /// 主机过期，携带 `address:port`
    PeerLost(String),
    /// 主机列表变化
    PeersChanged,
    /// 会话状态变化
    StateChanged(SessionState),
}
