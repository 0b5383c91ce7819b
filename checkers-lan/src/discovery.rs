//! 局域网发现
//!
//! 主机方定期向所有 IPv4 广播地址发送 JSON 公告；浏览方在发现端口上收集公告，
//! 维护 `address:port` 为键的节点表，并按超时清理。

use std::collections::BTreeMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use checkers_protocol::DISCOVERY_MAGIC;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;

/// 单个公告报文的接收缓冲大小
const DATAGRAM_BUFFER: usize = 2048;

/// 广播公告
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub port: u16,
    /// 发送时间（毫秒），仅供参考
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl Announcement {
    pub fn new(name: &str, port: u16) -> Self {
        Self {
            kind: DISCOVERY_MAGIC.to_string(),
            name: name.to_string(),
            port,
            timestamp: Some(now_millis()),
        }
    }
}

/// 解析公告报文
///
/// 非 JSON、类型不符、名称为空或端口为 0 的报文返回 `None`。
pub fn parse_announcement(data: &[u8]) -> Option<Announcement> {
    let announcement: Announcement = serde_json::from_slice(data).ok()?;
    if announcement.kind != DISCOVERY_MAGIC || announcement.name.is_empty() || announcement.port == 0 {
        return None;
    }
    Some(announcement)
}

/// 发现的主机
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub name: String,
    pub address: IpAddr,
    pub port: u16,
    /// 最后一次收到公告的时间（毫秒）
    pub last_seen: i64,
}

impl PeerInfo {
    /// 节点键 `address:port`
    pub fn id(&self) -> String {
        peer_id(self.address, self.port)
    }

    /// 对局连接地址
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

fn peer_id(address: IpAddr, port: u16) -> String {
    SocketAddr::new(address, port).to_string()
}

/// 节点表变化
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    Discovered(PeerInfo),
    Lost(PeerInfo),
    Changed,
}

/// 节点表
#[derive(Debug, Clone)]
pub struct PeerTable {
    peers: BTreeMap<String, PeerInfo>,
    timeout_ms: i64,
}

impl PeerTable {
    pub fn new(timeout_ms: i64) -> Self {
        Self {
            peers: BTreeMap::new(),
            timeout_ms,
        }
    }

    /// 记录一条公告
    ///
    /// 新节点产生 `Discovered` + `Changed`；已有节点只刷新时间和名称，不产生事件。
    pub fn observe(&mut self, sender: IpAddr, announcement: &Announcement, now_ms: i64) -> Vec<DiscoveryEvent> {
        let id = peer_id(sender, announcement.port);

        if let Some(peer) = self.peers.get_mut(&id) {
            peer.name = announcement.name.clone();
            peer.last_seen = now_ms;
            return Vec::new();
        }

        let peer = PeerInfo {
            name: announcement.name.clone(),
            address: sender,
            port: announcement.port,
            last_seen: now_ms,
        };
        info!("Discovered game '{}' at {}", peer.name, id);
        self.peers.insert(id, peer.clone());

        vec![DiscoveryEvent::Discovered(peer), DiscoveryEvent::Changed]
    }

    /// 清理超时节点
    pub fn sweep(&mut self, now_ms: i64) -> Vec<DiscoveryEvent> {
        let expired: Vec<String> = self
            .peers
            .iter()
            .filter(|(_, peer)| now_ms - peer.last_seen > self.timeout_ms)
            .map(|(id, _)| id.clone())
            .collect();

        let mut events = Vec::new();
        for id in expired {
            if let Some(peer) = self.peers.remove(&id) {
                debug!("Game '{}' at {} expired", peer.name, id);
                events.push(DiscoveryEvent::Lost(peer));
            }
        }
        if !events.is_empty() {
            events.push(DiscoveryEvent::Changed);
        }
        events
    }

    pub fn peers(&self) -> Vec<PeerInfo> {
        self.peers.values().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn clear(&mut self) {
        self.peers.clear();
    }
}

/// 正在广播的公告
struct Advertisement {
    socket: UdpSocket,
    name: String,
    port: u16,
    targets: Vec<SocketAddr>,
    timer: Interval,
}

/// 浏览状态
struct Browser {
    socket: UdpSocket,
    sweep: Interval,
    local_addrs: Vec<IpAddr>,
}

enum Wake {
    Announce,
    Sweep,
    Datagram(io::Result<(usize, SocketAddr)>),
}

/// 发现服务
pub struct Discovery {
    config: SessionConfig,
    advertisement: Option<Advertisement>,
    browser: Option<Browser>,
    table: PeerTable,
    buffer: Vec<u8>,
}

impl Discovery {
    pub fn new(config: SessionConfig) -> Self {
        let timeout_ms = config.peer_timeout.as_millis() as i64;
        Self {
            config,
            advertisement: None,
            browser: None,
            table: PeerTable::new(timeout_ms),
            buffer: vec![0; DATAGRAM_BUFFER],
        }
    }

    /// 开始广播本机对局，第一条公告立即发出
    pub async fn advertise(&mut self, name: &str, port: u16) -> io::Result<()> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.set_broadcast(true)?;

        let targets = broadcast_targets(self.config.discovery_port);
        info!("Advertising '{}' on port {} to {} broadcast address(es)", name, port, targets.len());

        let mut timer = interval(self.config.discovery_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.advertisement = Some(Advertisement {
            socket,
            name: name.to_string(),
            port,
            targets,
            timer,
        });
        Ok(())
    }

    /// 开始监听其他主机的公告
    pub fn browse(&mut self) -> io::Result<()> {
        if self.browser.is_some() {
            return Ok(());
        }

        let socket = bind_discovery_socket(self.config.discovery_port)?;
        let mut sweep = interval(self.config.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Listening for games on UDP port {}", self.config.discovery_port);
        self.browser = Some(Browser {
            socket,
            sweep,
            local_addrs: local_addresses(),
        });
        Ok(())
    }

    /// 停止广播和监听，清空节点表
    ///
    /// 返回节点表在清空前是否非空。
    pub fn stop(&mut self) -> bool {
        if self.advertisement.take().is_some() {
            debug!("Stopped advertising");
        }
        if self.browser.take().is_some() {
            debug!("Stopped browsing");
        }
        let had_peers = !self.table.is_empty();
        self.table.clear();
        had_peers
    }

    pub fn is_browsing(&self) -> bool {
        self.browser.is_some()
    }

    /// 监听套接字实际绑定的端口
    pub fn browse_port(&self) -> Option<u16> {
        self.browser
            .as_ref()
            .and_then(|b| b.socket.local_addr().ok())
            .map(|addr| addr.port())
    }

    pub fn peers(&self) -> Vec<PeerInfo> {
        self.table.peers()
    }

    /// 等待下一批节点表变化
    ///
    /// 广播、清理、收包都在这里驱动；未启动时永远挂起。可以在 `select!` 中安全取消。
    pub async fn next_events(&mut self) -> Vec<DiscoveryEvent> {
        let wake = {
            let Self {
                advertisement,
                browser,
                buffer,
                ..
            } = self;

            let (sweep, socket) = match browser {
                Some(b) => (Some(&mut b.sweep), Some(&b.socket)),
                None => (None, None),
            };

            tokio::select! {
                _ = tick(advertisement.as_mut().map(|a| &mut a.timer)) => Wake::Announce,
                _ = tick(sweep) => Wake::Sweep,
                result = recv(socket, buffer) => Wake::Datagram(result),
            }
        };

        match wake {
            Wake::Announce => {
                self.announce().await;
                Vec::new()
            }
            Wake::Sweep => self.table.sweep(now_millis()),
            Wake::Datagram(Ok((len, from))) => self.handle_datagram(len, from),
            Wake::Datagram(Err(e)) => {
                debug!("Discovery receive error: {}", e);
                Vec::new()
            }
        }
    }

    async fn announce(&mut self) {
        let Some(ad) = self.advertisement.as_mut() else {
            return;
        };

        let announcement = Announcement::new(&ad.name, ad.port);
        let data = match serde_json::to_vec(&announcement) {
            Ok(data) => data,
            Err(e) => {
                warn!("Failed to encode announcement: {}", e);
                return;
            }
        };

        for target in &ad.targets {
            if let Err(e) = ad.socket.send_to(&data, target).await {
                debug!("Broadcast to {} failed: {}", target, e);
            }
        }
    }

    fn handle_datagram(&mut self, len: usize, from: SocketAddr) -> Vec<DiscoveryEvent> {
        let Some(browser) = self.browser.as_ref() else {
            return Vec::new();
        };

        if self.config.filter_own_announcements && browser.local_addrs.contains(&from.ip()) {
            return Vec::new();
        }

        match parse_announcement(&self.buffer[..len]) {
            Some(announcement) => self.table.observe(from.ip(), &announcement, now_millis()),
            None => {
                debug!("Dropped malformed datagram from {}", from);
                Vec::new()
            }
        }
    }
}

async fn tick(timer: Option<&mut Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn recv(socket: Option<&UdpSocket>, buffer: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
    match socket {
        Some(socket) => socket.recv_from(buffer).await,
        None => std::future::pending().await,
    }
}

/// 当前时间（毫秒）
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// 绑定可复用、允许广播的发现套接字
fn bind_discovery_socket(port: u16) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    socket.bind(&addr.into())?;

    UdpSocket::from_std(socket.into())
}

/// 所有非回环 IPv4 接口的广播地址，加上 255.255.255.255
fn broadcast_targets(port: u16) -> Vec<SocketAddr> {
    let mut targets: Vec<SocketAddr> = Vec::new();

    match if_addrs::get_if_addrs() {
        Ok(interfaces) => {
            for iface in interfaces {
                if iface.is_loopback() {
                    continue;
                }
                if let if_addrs::IfAddr::V4(v4) = &iface.addr {
                    let broadcast = v4
                        .broadcast
                        .unwrap_or_else(|| Ipv4Addr::from(u32::from(v4.ip) | !u32::from(v4.netmask)));
                    let target = SocketAddr::from((broadcast, port));
                    if !targets.contains(&target) {
                        targets.push(target);
                    }
                }
            }
        }
        Err(e) => warn!("Cannot enumerate network interfaces: {}", e),
    }

    let global = SocketAddr::from((Ipv4Addr::BROADCAST, port));
    if !targets.contains(&global) {
        targets.push(global);
    }
    targets
}

/// 本机所有地址（含回环）
fn local_addresses() -> Vec<IpAddr> {
    let mut addrs = vec![IpAddr::V4(Ipv4Addr::LOCALHOST)];
    if let Ok(interfaces) = if_addrs::get_if_addrs() {
        addrs.extend(interfaces.iter().map(|iface| iface.ip()));
    }
    addrs
}

/// 本机首选 IPv4 地址（第一个非回环接口），找不到时返回 127.0.0.1
pub fn primary_ipv4() -> Ipv4Addr {
    if_addrs::get_if_addrs()
        .ok()
        .and_then(|interfaces| {
            interfaces.into_iter().find_map(|iface| match iface.addr {
                if_addrs::IfAddr::V4(v4) if !v4.ip.is_loopback() => Some(v4.ip),
                _ => None,
            })
        })
        .unwrap_or(Ipv4Addr::LOCALHOST)
}
