/// TLV 帧编解码
///
/// 线上格式固定为大端序的 16 位类型、16 位长度，以及 length 字节的负载。
/// 每帧恰好 4 + length 字节，负载上限 65535 字节。
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{trace, warn};

use crate::error::{CoordError, Result};

/// 一条 TLV 帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// 命令类型
    pub typ: u16,
    /// 负载长度
    pub len: u16,
    /// 负载
    pub value: Vec<u8>,
}

impl Frame {
    /// 由类型和负载构造，长度字段取负载实际长度
    pub fn new(typ: u16, value: Vec<u8>) -> Self {
        let len = value.len() as u16;
        Self { typ, len, value }
    }
}

/// 写出一条 TLV 帧
///
/// 先在本地缓冲区完成序列化，再一次性写出，保证失败时不会产生半帧。
/// 声明长度与负载长度不一致时不写任何字节。
pub async fn write_frame<W>(w: &mut W, frame: &Frame) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    trace!("write frame: {:?}", frame);

    if frame.len as usize != frame.value.len() {
        warn!(
            "frame length mismatch: expect[{}], but got[{}]",
            frame.len,
            frame.value.len()
        );
        return Err(CoordError::length_mismatch(
            frame.len as usize,
            frame.value.len(),
        ));
    }

    let mut buf = Vec::with_capacity(4 + frame.value.len());
    buf.extend_from_slice(&frame.typ.to_be_bytes());
    buf.extend_from_slice(&frame.len.to_be_bytes());
    buf.extend_from_slice(&frame.value);

    w.write_all(&buf).await?;
    Ok(())
}

/// 读入一条 TLV 帧
///
/// 三个读阶段各自映射到独立的错误变体，帧边界上的干净 EOF 表现为
/// `ReadType`，帧中途断流表现为 `ReadLen` 或 `ReadValue`。
pub async fn read_frame<R>(r: &mut R) -> Result<Frame>
where
    R: AsyncRead + Unpin,
{
    let mut hdr = [0u8; 2];
    r.read_exact(&mut hdr)
        .await
        .map_err(CoordError::ReadType)?;
    let typ = u16::from_be_bytes(hdr);

    r.read_exact(&mut hdr).await.map_err(CoordError::ReadLen)?;
    let len = u16::from_be_bytes(hdr);

    let mut value = vec![0u8; len as usize];
    r.read_exact(&mut value)
        .await
        .map_err(CoordError::ReadValue)?;

    let frame = Frame { typ, len, value };
    trace!("read frame: {:?}", frame);

    Ok(frame)
}
