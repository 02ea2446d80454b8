/// 数据面加密接口
///
/// 真正的流加密套件不在本库内，这里只定义协调器消费的接口：
/// 一个可以按连接克隆会话的 cipher 原型，以及暴露会话 iv/key 的
/// 帧化字节流。原型在构造协调器时注入，进程内没有全局 cipher。
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

use crate::error::Result;

/// 经过 cipher 包装后的数据流
///
/// 除了读写之外还要能取出本会话的 iv 与 key，一次性认证校验
/// 依赖这两个值。
pub trait SsStream: AsyncRead + AsyncWrite + Unpin + Send {
    /// 本会话的初始化向量
    fn iv(&self) -> &[u8];

    /// 本会话的密钥
    fn key(&self) -> &[u8];
}

/// cipher 原型
///
/// 每条数据面连接各自包装一次，包装产生的会话之间互不共享状态。
pub trait Cipher: Send + Sync {
    /// 加密方法名
    fn method(&self) -> &str;

    /// 用本原型的一个新会话包装一条 TCP 连接
    fn wrap(&self, stream: TcpStream) -> Box<dyn SsStream>;
}

/// 明文直通 cipher
///
/// 不做任何加解密，iv 固定为零、key 取口令字节。用于测试环境
/// 和对端同样以明文运行的部署。
pub struct PlainCipher {
    key: Vec<u8>,
    iv: Vec<u8>,
}

const PLAIN_IV_LEN: usize = 16;

impl PlainCipher {
    /// 由口令构造
    pub fn new(password: &str) -> Self {
        Self {
            key: password.as_bytes().to_vec(),
            iv: vec![0u8; PLAIN_IV_LEN],
        }
    }
}

impl Cipher for PlainCipher {
    fn method(&self) -> &str {
        "plain"
    }

    fn wrap(&self, stream: TcpStream) -> Box<dyn SsStream> {
        Box::new(PlainStream::new(stream, self.key.clone(), self.iv.clone()))
    }
}

/// 明文会话流，读写直接透传到内层连接
pub struct PlainStream<S> {
    inner: S,
    key: Vec<u8>,
    iv: Vec<u8>,
}

impl<S> PlainStream<S> {
    pub fn new(inner: S, key: Vec<u8>, iv: Vec<u8>) -> Self {
        Self { inner, key, iv }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for PlainStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for PlainStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> SsStream for PlainStream<S> {
    fn iv(&self) -> &[u8] {
        &self.iv
    }

    fn key(&self) -> &[u8] {
        &self.key
    }
}

/// 按方法名构造 cipher 原型
pub fn build_cipher(method: &str, password: &str) -> Result<std::sync::Arc<dyn Cipher>> {
    match method {
        "plain" | "none" => Ok(std::sync::Arc::new(PlainCipher::new(password))),
        other => Err(crate::error::CoordError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unsupported cipher method: {}", other),
        ))),
    }
}
