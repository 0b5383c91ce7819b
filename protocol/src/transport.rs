//! 传输层抽象
//!
//! 提供 Connector/Connection/Listener traits 使会话层与具体传输实现解耦。

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::codec::{Frame, FrameDecoder};
use crate::error::{ProtocolError, Result};
use crate::message::Message;
use crate::CONNECT_TIMEOUT;

/// 单次读取的块大小
const READ_CHUNK: usize = 4096;

/// 连接抽象 trait
#[async_trait]
pub trait Connection: Send {
    /// 发送消息
    async fn send(&mut self, msg: &Message) -> Result<()>;

    /// 接收消息
    ///
    /// 可恢复的错误（见 [`ProtocolError::is_recoverable`]）返回后连接仍可继续读取。
    async fn recv(&mut self) -> Result<Message>;

    /// 关闭写端
    async fn close(&mut self) -> Result<()>;

    /// 获取远端地址
    fn peer_addr(&self) -> Option<SocketAddr>;
}

/// 连接器 trait（加入方使用）
#[async_trait]
pub trait Connector: Send + Sync {
    type Conn: Connection;

    /// 建立连接
    async fn connect(&self, addr: SocketAddr) -> Result<Self::Conn>;
}

/// 监听器 trait（主机方使用）
#[async_trait]
pub trait Listener: Send + Sized {
    type Conn: Connection;

    /// 绑定地址
    async fn bind(addr: &str) -> Result<Self>;

    /// 接受连接
    async fn accept(&mut self) -> Result<Self::Conn>;

    /// 获取本地地址
    fn local_addr(&self) -> Option<SocketAddr>;
}

// ============================================================================
// TCP 实现
// ============================================================================

/// TCP 连接器
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    type Conn = TcpConnection;

    async fn connect(&self, addr: SocketAddr) -> Result<Self::Conn> {
        let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| ProtocolError::ConnectionTimeout)?
            .map_err(ProtocolError::Io)?;

        TcpConnection::from_stream(stream)
    }
}

/// TCP 连接
pub struct TcpConnection {
    reader: FrameReader<OwnedReadHalf>,
    writer: FrameWriter<OwnedWriteHalf>,
    peer_addr: Option<SocketAddr>,
}

impl TcpConnection {
    /// 从 TcpStream 创建
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        let peer_addr = stream.peer_addr().ok();
        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            reader: FrameReader::new(read_half),
            writer: FrameWriter::new(write_half),
            peer_addr,
        })
    }

    /// 分离读写端
    pub fn split(self) -> (FrameReader<OwnedReadHalf>, FrameWriter<OwnedWriteHalf>) {
        (self.reader, self.writer)
    }
}

#[async_trait]
impl Connection for TcpConnection {
    async fn send(&mut self, msg: &Message) -> Result<()> {
        self.writer.send(msg).await
    }

    async fn recv(&mut self) -> Result<Message> {
        self.reader.recv().await
    }

    async fn close(&mut self) -> Result<()> {
        self.writer.close().await
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }
}

/// TCP 监听器
pub struct TcpListener {
    listener: tokio::net::TcpListener,
}

#[async_trait]
impl Listener for TcpListener {
    type Conn = TcpConnection;

    async fn bind(addr: &str) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(ProtocolError::Io)?;
        Ok(Self { listener })
    }

    async fn accept(&mut self) -> Result<Self::Conn> {
        let (stream, _addr) = self.listener.accept().await.map_err(ProtocolError::Io)?;
        TcpConnection::from_stream(stream)
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().ok()
    }
}

// ============================================================================
// 帧读写
// ============================================================================

/// 帧读取器
///
/// `read_frame` 可以在 `select!` 中安全取消：已读到的字节都保存在解码器里。
pub struct FrameReader<R> {
    reader: R,
    decoder: FrameDecoder,
    chunk: Vec<u8>,
}

impl<R: AsyncRead + Unpin + Send> FrameReader<R> {
    /// 创建新的帧读取器
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            decoder: FrameDecoder::new(),
            chunk: vec![0; READ_CHUNK],
        }
    }

    /// 读取一帧
    pub async fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.decoder.decode()? {
                return Ok(frame);
            }

            let n = self.reader.read(&mut self.chunk).await?;
            if n == 0 {
                return Err(ProtocolError::ConnectionClosed);
            }
            self.decoder.extend(&self.chunk[..n]);
        }
    }

    /// 读取并解析一条消息
    pub async fn recv(&mut self) -> Result<Message> {
        let frame = self.read_frame().await?;
        Message::from_frame(&frame)
    }
}

/// 帧写入器
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin + Send> FrameWriter<W> {
    /// 创建新的帧写入器
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// 写入一帧并刷新
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let bytes = frame.encode()?;
        self.writer.write_all(&bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// 发送消息
    pub async fn send(&mut self, msg: &Message) -> Result<()> {
        self.write_frame(&msg.to_frame()?).await
    }

    /// 关闭写端
    pub async fn close(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}
