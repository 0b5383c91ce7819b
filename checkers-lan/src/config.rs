//! 设置与运行时配置
//!
//! `Settings` 持久化为 `<config_dir>/lan-checkers/settings.json`，
//! `SessionConfig` 是会话任务实际使用的部分。

use std::path::{Path, PathBuf};
use std::time::Duration;

use checkers_protocol::{
    DEFAULT_PORT, DISCONNECT_FLUSH_TIMEOUT_MS, DISCOVERY_INTERVAL_MS, DISCOVERY_PORT,
    PEER_SWEEP_INTERVAL_MS, PEER_TIMEOUT_MS, PING_INTERVAL_MS,
};
use serde::{Deserialize, Serialize};

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// 转换为 EnvFilter 指令
    pub fn directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// 用户设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // === 玩家 ===
    /// 默认昵称
    pub nickname: String,

    // === 网络 ===
    /// 对局端口（TCP）
    pub game_port: u16,
    /// 发现端口（UDP）
    pub discovery_port: u16,
    /// 广播间隔（毫秒）
    pub discovery_interval_ms: u64,
    /// 节点超时（毫秒）
    pub peer_timeout_ms: u64,
    /// 心跳间隔（毫秒）
    pub ping_interval_ms: u64,
    /// 静默超过该时间则断开（毫秒），为空时不检查
    pub keepalive_timeout_ms: Option<u64>,

    // === 高级 ===
    /// 日志级别
    pub log_level: LogLevel,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            nickname: "Player".to_string(),
            game_port: DEFAULT_PORT,
            discovery_port: DISCOVERY_PORT,
            discovery_interval_ms: DISCOVERY_INTERVAL_MS,
            peer_timeout_ms: PEER_TIMEOUT_MS,
            ping_interval_ms: PING_INTERVAL_MS,
            keepalive_timeout_ms: None,
            log_level: LogLevel::default(),
        }
    }
}

impl Settings {
    /// 获取设置文件路径
    pub fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut path| {
            path.push("lan-checkers");
            path.push("settings.json");
            path
        })
    }

    /// 从默认位置加载设置
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else {
            tracing::warn!("Config directory unavailable, using default settings");
            return Self::default();
        };
        Self::load_from(&path)
    }

    /// 从指定文件加载设置，失败时回退到默认值
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            tracing::info!("Settings file not found, using defaults");
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(settings) => {
                    tracing::info!("Loaded settings from {:?}", path);
                    settings
                }
                Err(e) => {
                    tracing::warn!("Invalid settings file: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Cannot read settings file: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// 保存到默认位置
    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::settings_path().ok_or_else(|| anyhow::anyhow!("config directory unavailable"))?;
        self.save_to(&path)
    }

    /// 保存到指定文件
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::info!("Settings saved to {:?}", path);
        Ok(())
    }

    /// 生成会话配置
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            discovery_port: self.discovery_port,
            discovery_interval: Duration::from_millis(self.discovery_interval_ms),
            peer_timeout: Duration::from_millis(self.peer_timeout_ms),
            ping_interval: Duration::from_millis(self.ping_interval_ms),
            keepalive_timeout: self.keepalive_timeout_ms.map(Duration::from_millis),
            ..SessionConfig::default()
        }
    }
}

/// 会话运行时配置
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// 发现端口
    pub discovery_port: u16,
    /// 广播间隔
    pub discovery_interval: Duration,
    /// 过期清理间隔
    pub sweep_interval: Duration,
    /// 节点超时
    pub peer_timeout: Duration,
    /// 心跳间隔
    pub ping_interval: Duration,
    /// 断开时等待发送完成的上限
    pub disconnect_flush_timeout: Duration,
    /// 静默超时，`None` 表示不检查
    pub keepalive_timeout: Option<Duration>,
    /// 是否忽略本机发出的广播
    pub filter_own_announcements: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            discovery_port: DISCOVERY_PORT,
            discovery_interval: Duration::from_millis(DISCOVERY_INTERVAL_MS),
            sweep_interval: Duration::from_millis(PEER_SWEEP_INTERVAL_MS),
            peer_timeout: Duration::from_millis(PEER_TIMEOUT_MS),
            ping_interval: Duration::from_millis(PING_INTERVAL_MS),
            disconnect_flush_timeout: Duration::from_millis(DISCONNECT_FLUSH_TIMEOUT_MS),
            keepalive_timeout: None,
            filter_own_announcements: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("settings.json");

        let settings = Settings {
            nickname: "Alice".to_string(),
            game_port: 50000,
            keepalive_timeout_ms: Some(15000),
            log_level: LogLevel::Debug,
            ..Settings::default()
        };
        settings.save_to(&path).unwrap();

        assert_eq!(Settings::load_from(&path), settings);
    }

    #[test]
    fn test_missing_or_invalid_file_falls_back() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        assert_eq!(Settings::load_from(&path), Settings::default());

        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(Settings::load_from(&path), Settings::default());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        std::fs::write(&path, r#"{"nickname":"Bob"}"#).unwrap();

        let settings = Settings::load_from(&path);
        assert_eq!(settings.nickname, "Bob");
        assert_eq!(settings.game_port, DEFAULT_PORT);
    }

    #[test]
    fn test_session_config() {
        let settings = Settings {
            ping_interval_ms: 250,
            keepalive_timeout_ms: Some(1000),
            ..Settings::default()
        };
        let config = settings.session_config();
        assert_eq!(config.ping_interval, Duration::from_millis(250));
        assert_eq!(config.keepalive_timeout, Some(Duration::from_secs(1)));
        assert_eq!(config.sweep_interval, Duration::from_millis(PEER_SWEEP_INTERVAL_MS));
        assert!(config.filter_own_announcements);
    }
}
