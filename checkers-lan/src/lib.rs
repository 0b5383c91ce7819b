//! 局域网跳棋对战
//!
//! 包含:
//! - 局域网发现 (Discovery)
//! - 会话管理 (SessionManager, SessionHandle)
//! - 联网对局控制 (NetworkMatch)
//! - 用户设置 (Settings)

pub mod config;
pub mod discovery;
pub mod error;
pub mod event;
pub mod match_play;
pub mod session;

pub use config::{LogLevel, SessionConfig, Settings};
pub use discovery::{parse_announcement, primary_ipv4, Announcement, Discovery, DiscoveryEvent, PeerInfo, PeerTable};
pub use error::{Result, SessionError};
pub use event::{Role, SessionEvent, SessionState, SessionStatus};
pub use match_play::NetworkMatch;
pub use session::{SessionHandle, SessionManager};
