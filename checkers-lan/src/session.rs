//! 会话管理
//!
//! 一个 tokio 任务独占全部会话状态，用 `select!` 同时等待命令、监听、拨号、
//! 连接读取、心跳和发现服务。连接的写端由单独的写任务驱动，会话任务只向
//! 有界队列投递消息。上层通过 [`SessionHandle`] 发送命令，
//! 通过 `spawn` 返回的通道接收 [`SessionEvent`]。

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;

use checkers_protocol::{
    validate_nickname, Connection, Connector, FrameReader, FrameWriter, Listener, Message, Move,
    ProtocolError, TcpConnection, TcpConnector, TcpListener,
};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Duration, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::config::SessionConfig;
use crate::discovery::{Discovery, DiscoveryEvent, PeerInfo};
use crate::error::{Result, SessionError};
use crate::event::{Role, SessionEvent, SessionState, SessionStatus};

/// 对手名称未知时的显示名
const UNKNOWN_OPPONENT: &str = "Opponent";

/// 每个连接的发送队列容量
const SEND_QUEUE_CAPACITY: usize = 256;

type DialFuture = Pin<Box<dyn Future<Output = checkers_protocol::Result<TcpConnection>> + Send>>;

/// 会话命令
enum Command {
    Host {
        name: String,
        port: u16,
        reply: oneshot::Sender<Result<u16>>,
    },
    Join {
        name: String,
        addr: SocketAddr,
        reply: oneshot::Sender<Result<()>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Send {
        msg: Message,
        reply: oneshot::Sender<Result<()>>,
    },
    StartDiscovery {
        reply: oneshot::Sender<Result<()>>,
    },
    StopDiscovery {
        reply: oneshot::Sender<()>,
    },
    Peers {
        reply: oneshot::Sender<Vec<PeerInfo>>,
    },
    Status {
        reply: oneshot::Sender<SessionStatus>,
    },
}

/// 会话句柄
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl SessionHandle {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(make(tx)).map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// 作为主机开始监听，返回实际监听的端口（`port` 为 0 时由系统分配）
    pub async fn host(&self, name: &str, port: u16) -> Result<u16> {
        let name = name.to_string();
        self.request(|reply| Command::Host { name, port, reply }).await?
    }

    /// 连接主机，连接建立或失败后返回
    pub async fn join(&self, name: &str, addr: SocketAddr) -> Result<()> {
        let name = name.to_string();
        self.request(|reply| Command::Join { name, addr, reply }).await?
    }

    /// 断开并回到空闲状态
    pub async fn disconnect(&self) -> Result<()> {
        self.request(|reply| Command::Disconnect { reply }).await
    }

    /// 发送任意消息
    pub async fn send(&self, msg: Message) -> Result<()> {
        self.request(|reply| Command::Send { msg, reply }).await?
    }

    pub async fn send_move(&self, mv: &Move) -> Result<()> {
        self.send(Message::Move(mv.clone())).await
    }

    pub async fn send_game_state(&self, snapshot: Vec<u8>) -> Result<()> {
        self.send(Message::GameState(snapshot)).await
    }

    pub async fn send_chat(&self, text: &str) -> Result<()> {
        self.send(Message::Chat(text.to_string())).await
    }

    pub async fn send_player_ready(&self, name: &str) -> Result<()> {
        self.send(Message::PlayerReady {
            name: Some(name.to_string()),
        })
        .await
    }

    pub async fn send_game_start(&self) -> Result<()> {
        self.send(Message::GameStart).await
    }

    pub async fn send_game_reset(&self) -> Result<()> {
        self.send(Message::GameReset).await
    }

    /// 开始浏览局域网内的主机
    pub async fn start_discovery(&self) -> Result<()> {
        self.request(|reply| Command::StartDiscovery { reply }).await?
    }

    pub async fn stop_discovery(&self) -> Result<()> {
        self.request(|reply| Command::StopDiscovery { reply }).await
    }

    /// 当前发现的主机
    pub async fn peers(&self) -> Result<Vec<PeerInfo>> {
        self.request(|reply| Command::Peers { reply }).await
    }

    pub async fn status(&self) -> Result<SessionStatus> {
        self.request(|reply| Command::Status { reply }).await
    }
}

/// 会话管理器
pub struct SessionManager;

impl SessionManager {
    /// 启动会话任务
    ///
    /// 必须在 tokio 运行时内调用。所有句柄被丢弃后任务断开连接并退出。
    pub fn spawn(config: SessionConfig) -> (SessionHandle, mpsc::UnboundedReceiver<SessionEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let driver = SessionDriver::new(config, command_rx, event_tx);
        tokio::spawn(driver.run());

        (SessionHandle { commands: command_tx }, event_rx)
    }
}

/// 已建立的连接
///
/// 读端留在会话任务里，写端交给写任务。对方不读取时队列写满，
/// 新消息返回 `SendQueueFull`，会话任务本身不会阻塞。
struct Link {
    reader: FrameReader<OwnedReadHalf>,
    outbound: mpsc::Sender<Message>,
    writer: JoinHandle<()>,
}

impl Link {
    fn open(conn: TcpConnection) -> Self {
        let (reader, writer) = conn.split();
        let (outbound, queue) = mpsc::channel(SEND_QUEUE_CAPACITY);
        Self {
            reader,
            outbound,
            writer: tokio::spawn(write_loop(writer, queue)),
        }
    }

    fn queue(&self, msg: Message) -> Result<()> {
        self.outbound.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => SessionError::SendQueueFull,
            TrySendError::Closed(_) => SessionError::NotConnected,
        })
    }

    /// 关闭队列，最多等待 `flush` 让写任务发完剩余消息
    ///
    /// 超时返回 `false`，写任务被终止。
    async fn close(self, flush: Duration) -> bool {
        let Link {
            outbound, mut writer, ..
        } = self;
        drop(outbound);

        if timeout(flush, &mut writer).await.is_ok() {
            true
        } else {
            writer.abort();
            false
        }
    }

    /// 不再发送，直接结束写任务
    fn abort(self) {
        self.writer.abort();
    }
}

/// 写任务：按顺序写出队列里的消息，队列关闭后关闭写端
async fn write_loop(mut writer: FrameWriter<OwnedWriteHalf>, mut queue: mpsc::Receiver<Message>) {
    while let Some(msg) = queue.recv().await {
        if let Err(e) = writer.send(&msg).await {
            debug!("Failed to write {:?}: {}", msg.message_type(), e);
            return;
        }
    }
    let _ = writer.close().await;
}

/// 进行中的拨号
struct Dial {
    future: DialFuture,
    addr: SocketAddr,
    reply: oneshot::Sender<Result<()>>,
}

enum Wake {
    Command(Option<Command>),
    Accepted(checkers_protocol::Result<TcpConnection>),
    Dialed(checkers_protocol::Result<TcpConnection>),
    Received(checkers_protocol::Result<Message>),
    Ping,
    Discovery(Vec<DiscoveryEvent>),
}

struct SessionDriver {
    config: SessionConfig,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<SessionEvent>,

    state: SessionState,
    role: Option<Role>,
    local_name: String,
    opponent_name: Option<String>,

    listener: Option<TcpListener>,
    listen_port: Option<u16>,
    dialing: Option<Dial>,
    link: Option<Link>,
    ping: Option<Interval>,
    last_heard: Instant,

    discovery: Discovery,
}

impl SessionDriver {
    fn new(
        config: SessionConfig,
        commands: mpsc::UnboundedReceiver<Command>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        let discovery = Discovery::new(config.clone());
        Self {
            config,
            commands,
            events,
            state: SessionState::Idle,
            role: None,
            local_name: String::new(),
            opponent_name: None,
            listener: None,
            listen_port: None,
            dialing: None,
            link: None,
            ping: None,
            last_heard: Instant::now(),
            discovery,
        }
    }

    async fn run(mut self) {
        loop {
            let wake = tokio::select! {
                cmd = self.commands.recv() => Wake::Command(cmd),
                result = accept(self.listener.as_mut()) => Wake::Accepted(result),
                result = dial(self.dialing.as_mut()) => Wake::Dialed(result),
                result = receive(self.link.as_mut()) => Wake::Received(result),
                _ = tick(self.ping.as_mut()) => Wake::Ping,
                events = self.discovery.next_events() => Wake::Discovery(events),
            };

            match wake {
                Wake::Command(None) => {
                    debug!("All session handles dropped, shutting down");
                    self.disconnect().await;
                    break;
                }
                Wake::Command(Some(cmd)) => self.handle_command(cmd).await,
                Wake::Accepted(result) => self.on_accepted(result).await,
                Wake::Dialed(result) => self.on_dialed(result),
                Wake::Received(result) => self.on_received(result).await,
                Wake::Ping => self.on_ping().await,
                Wake::Discovery(events) => {
                    for event in events {
                        self.emit(match event {
                            DiscoveryEvent::Discovered(peer) => SessionEvent::PeerDiscovered(peer),
                            DiscoveryEvent::Lost(peer) => SessionEvent::PeerLost(peer.id()),
                            DiscoveryEvent::Changed => SessionEvent::PeersChanged,
                        });
                    }
                }
            }
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!("Session state {:?} -> {:?}", self.state, state);
            self.state = state;
            self.emit(SessionEvent::StateChanged(state));
        }
    }

    fn is_busy(&self) -> bool {
        matches!(
            self.state,
            SessionState::Listening | SessionState::Connecting | SessionState::Connected
        )
    }

    fn status(&self) -> SessionStatus {
        SessionStatus {
            state: self.state,
            role: self.role,
            local_name: self.local_name.clone(),
            opponent_name: self.opponent_name.clone(),
            listen_port: self.listen_port,
            discovery_port: self.discovery.browse_port(),
        }
    }

    fn stop_discovery(&mut self) {
        if self.discovery.stop() {
            self.emit(SessionEvent::PeersChanged);
        }
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Host { name, port, reply } => {
                let result = self.host(&name, port).await;
                let _ = reply.send(result);
            }
            Command::Join { name, addr, reply } => self.join(&name, addr, reply),
            Command::Disconnect { reply } => {
                self.disconnect().await;
                let _ = reply.send(());
            }
            Command::Send { msg, reply } => {
                let kind = msg.message_type();
                let result = match self.link.as_ref() {
                    Some(link) => link.queue(msg),
                    None => Err(SessionError::NotConnected),
                };
                if let Err(e) = &result {
                    debug!("Send {:?} failed: {}", kind, e);
                }
                let _ = reply.send(result);
            }
            Command::StartDiscovery { reply } => {
                let _ = reply.send(self.discovery.browse().map_err(SessionError::from));
            }
            Command::StopDiscovery { reply } => {
                self.stop_discovery();
                let _ = reply.send(());
            }
            Command::Peers { reply } => {
                let _ = reply.send(self.discovery.peers());
            }
            Command::Status { reply } => {
                let _ = reply.send(self.status());
            }
        }
    }

    async fn host(&mut self, name: &str, port: u16) -> Result<u16> {
        let name = validate_nickname(name)?.to_string();
        if self.is_busy() {
            return Err(SessionError::Busy(format!("{:?}", self.state)));
        }

        let listener = match TcpListener::bind(&format!("0.0.0.0:{}", port)).await {
            Ok(listener) => listener,
            Err(e) => {
                let reason = e.to_string();
                error!("Cannot listen on port {}: {}", port, reason);
                self.emit(SessionEvent::ConnectionError(format!(
                    "Cannot listen on port {}: {}",
                    port, reason
                )));
                self.set_state(SessionState::Idle);
                return Err(SessionError::Bind { port, reason });
            }
        };

        let bound = listener.local_addr().map(|addr| addr.port()).unwrap_or(port);
        info!("Hosting as '{}' on port {}", name, bound);

        self.local_name = name;
        self.role = Some(Role::Host);
        self.listener = Some(listener);
        self.listen_port = Some(bound);
        self.set_state(SessionState::Listening);
        self.start_advertising().await;

        Ok(bound)
    }

    /// 广播本机对局，同时接收其他主机的公告
    async fn start_advertising(&mut self) {
        let Some(port) = self.listen_port else {
            return;
        };
        if let Err(e) = self.discovery.advertise(&self.local_name, port).await {
            warn!("Cannot advertise game: {}", e);
        }
        if let Err(e) = self.discovery.browse() {
            warn!("Cannot listen for other games: {}", e);
        }
    }

    fn join(&mut self, name: &str, addr: SocketAddr, reply: oneshot::Sender<Result<()>>) {
        let name = match validate_nickname(name) {
            Ok(name) => name.to_string(),
            Err(e) => {
                let _ = reply.send(Err(e.into()));
                return;
            }
        };
        if self.is_busy() {
            let _ = reply.send(Err(SessionError::Busy(format!("{:?}", self.state))));
            return;
        }

        info!("Joining {} as '{}'", addr, name);
        self.local_name = name;
        self.role = Some(Role::Client);
        self.set_state(SessionState::Connecting);
        self.dialing = Some(Dial {
            future: Box::pin(async move { TcpConnector.connect(addr).await }),
            addr,
            reply,
        });
    }

    fn on_dialed(&mut self, result: checkers_protocol::Result<TcpConnection>) {
        let Some(Dial { addr, reply, .. }) = self.dialing.take() else {
            return;
        };

        match result {
            Ok(conn) => {
                info!("Connected to {}", addr);
                self.establish(conn);
                self.emit(SessionEvent::Connected);
                let _ = reply.send(Ok(()));
            }
            Err(e) => {
                let reason = e.to_string();
                warn!("Cannot connect to {}: {}", addr, reason);
                self.role = None;
                self.set_state(SessionState::Idle);
                self.emit(SessionEvent::ConnectionError(format!(
                    "Cannot connect to {}: {}",
                    addr, reason
                )));
                let _ = reply.send(Err(SessionError::Connect { addr, reason }));
            }
        }
    }

    async fn on_accepted(&mut self, result: checkers_protocol::Result<TcpConnection>) {
        let mut conn = match result {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Accept failed: {}", e);
                return;
            }
        };

        let peer = conn
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| UNKNOWN_OPPONENT.to_string());

        if self.link.is_some() {
            info!("Rejecting extra connection from {}", peer);
            let _ = timeout(self.config.disconnect_flush_timeout, conn.close()).await;
            return;
        }

        info!("Opponent connected from {}", peer);
        self.opponent_name = Some(peer.clone());
        self.establish(conn);
        self.emit(SessionEvent::Connected);
        self.emit(SessionEvent::OpponentConnected(peer));
    }

    /// 连接建立后的公共步骤：停止发现、启动心跳、发送就绪
    fn establish(&mut self, conn: TcpConnection) {
        self.stop_discovery();

        let link = Link::open(conn);
        let ready = Message::PlayerReady {
            name: Some(self.local_name.clone()),
        };
        if let Err(e) = link.queue(ready) {
            warn!("Failed to send PlayerReady: {}", e);
        }

        let period = self.config.ping_interval;
        let mut ping = interval_at(Instant::now() + period, period);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.link = Some(link);
        self.ping = Some(ping);
        self.last_heard = Instant::now();
        self.set_state(SessionState::Connected);
    }

    async fn on_received(&mut self, result: checkers_protocol::Result<Message>) {
        let msg = match result {
            Ok(msg) => msg,
            Err(e) if e.is_recoverable() => {
                warn!("Skipping undecodable message: {}", e);
                self.last_heard = Instant::now();
                return;
            }
            Err(ProtocolError::ConnectionClosed) => {
                info!("Connection closed by peer");
                self.on_remote_closed().await;
                return;
            }
            Err(e) => {
                warn!("Connection error: {}", e);
                self.on_remote_closed().await;
                return;
            }
        };

        self.last_heard = Instant::now();
        trace!("Received {:?}", msg.message_type());

        match msg {
            Message::GameState(snapshot) => self.emit(SessionEvent::GameStateReceived(snapshot)),
            Message::Move(mv) => self.emit(SessionEvent::MoveReceived(mv)),
            Message::Chat(text) => {
                let from = self
                    .opponent_name
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_OPPONENT.to_string());
                self.emit(SessionEvent::ChatReceived { from, text });
            }
            Message::PlayerReady { name } => {
                match name {
                    Some(name) => {
                        info!("Opponent is '{}'", name);
                        self.opponent_name = Some(name);
                    }
                    None => debug!("PlayerReady without a usable name"),
                }
                let name = self
                    .opponent_name
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_OPPONENT.to_string());
                self.emit(SessionEvent::PlayerReady);
                self.emit(SessionEvent::OpponentConnected(name));
            }
            Message::GameStart => self.emit(SessionEvent::GameStart),
            Message::GameReset => self.emit(SessionEvent::GameReset),
            Message::Ping => {
                if let Some(link) = self.link.as_ref() {
                    if let Err(e) = link.queue(Message::Pong) {
                        debug!("Failed to answer ping: {}", e);
                    }
                }
            }
            Message::Pong => {}
            Message::Disconnect => {
                info!("Opponent left the game");
                self.on_remote_closed().await;
            }
        }
    }

    async fn on_ping(&mut self) {
        if let Some(limit) = self.config.keepalive_timeout {
            if self.last_heard.elapsed() > limit {
                warn!("No data from opponent for {:?}, closing connection", limit);
                self.on_remote_closed().await;
                return;
            }
        }

        let Some(link) = self.link.as_ref() else {
            return;
        };
        match link.queue(Message::Ping) {
            Ok(()) => {}
            Err(SessionError::SendQueueFull) => debug!("Send queue full, skipping ping"),
            Err(e) => {
                warn!("Failed to send ping: {}", e);
                self.on_remote_closed().await;
            }
        }
    }

    /// 对方关闭或连接出错
    async fn on_remote_closed(&mut self) {
        if let Some(link) = self.link.take() {
            link.abort();
        }
        self.ping = None;
        self.opponent_name = None;

        self.emit(SessionEvent::OpponentDisconnected);
        self.emit(SessionEvent::Disconnected);
        self.set_state(SessionState::Disconnected);

        if self.role == Some(Role::Host) && self.listener.is_some() {
            info!("Waiting for a new opponent");
            self.set_state(SessionState::Listening);
            self.start_advertising().await;
        } else {
            self.role = None;
        }
    }

    /// 本地断开
    async fn disconnect(&mut self) {
        let was_connected = self.link.is_some();

        if let Some(link) = self.link.take() {
            if let Err(e) = link.queue(Message::Disconnect) {
                debug!("Failed to queue Disconnect: {}", e);
            }
            if link.close(self.config.disconnect_flush_timeout).await {
                debug!("Disconnect flushed");
            } else {
                debug!("Timed out flushing Disconnect");
            }
        }

        if let Some(Dial { addr, reply, .. }) = self.dialing.take() {
            let _ = reply.send(Err(SessionError::Connect {
                addr,
                reason: "cancelled".to_string(),
            }));
        }

        self.listener = None;
        self.listen_port = None;
        self.ping = None;
        self.role = None;
        self.opponent_name = None;
        self.stop_discovery();

        if was_connected {
            self.emit(SessionEvent::Disconnected);
        }
        self.set_state(SessionState::Idle);
    }
}

async fn accept(listener: Option<&mut TcpListener>) -> checkers_protocol::Result<TcpConnection> {
    match listener {
        Some(listener) => listener.accept().await,
        None => std::future::pending().await,
    }
}

async fn dial(dialing: Option<&mut Dial>) -> checkers_protocol::Result<TcpConnection> {
    match dialing {
        Some(dial) => (&mut dial.future).await,
        None => std::future::pending().await,
    }
}

async fn receive(link: Option<&mut Link>) -> checkers_protocol::Result<Message> {
    match link {
        Some(link) => link.reader.recv().await,
        None => std::future::pending().await,
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
