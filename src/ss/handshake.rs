/// 数据隧道握手
///
/// 握手帧是 2 字节大端长度加紧凑 JSON `{"socketkey":"<key>"}`，
/// 一次写出。对端以 ASCII "200" 应答表示接受。
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;

use crate::error::{CoordError, Result};

#[derive(Serialize)]
struct SocketKeyMessage<'a> {
    #[serde(rename = "socketkey")]
    key: &'a str,
}

const ACK_OK: &[u8] = b"200";

/// 在一条新连接上交换 socket key
///
/// 应答不是 "200"、读到的字节不足，或任何读写失败，都算握手失败。
pub async fn establish_tunnel<S>(conn: &mut S, key: &str) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let payload = serde_json::to_vec(&SocketKeyMessage { key }).map_err(|e| {
        warn!("[ss]: marshal socket key[{}] failed: {}", key, e);
        CoordError::EstablishTunnelFailed
    })?;

    let mut buf = Vec::with_capacity(2 + payload.len());
    buf.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    buf.extend_from_slice(&payload);

    if let Err(e) = conn.write_all(&buf).await {
        warn!("[ss]: write handshake failed: {}", e);
        return Err(CoordError::EstablishTunnelFailed);
    }

    // 应答最多 3 字节，单次读取后直接比较
    let mut ack = [0u8; 3];
    let n = match conn.read(&mut ack).await {
        Ok(n) => n,
        Err(e) => {
            warn!("[ss]: read handshake response failed: {}", e);
            return Err(CoordError::EstablishTunnelFailed);
        }
    };

    if &ack[..n] != ACK_OK {
        warn!(
            "[ss]: handshake rejected, response {:?}",
            String::from_utf8_lossy(&ack[..n])
        );
        return Err(CoordError::EstablishTunnelFailed);
    }

    Ok(())
}
