/// 数据面流程
///
/// 每个 CreateSsConnect 请求孵化一个独立任务：连数据端点、用
/// socket key 握手、包上 cipher 会话、解出目标地址、连目标，最后
/// 两条反向 pipe 对拷。任务除了端点地址、cipher 原型和读超时之外
/// 不持有协调器的任何状态。
pub mod addr;
pub mod cipher;
pub mod handshake;

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::{debug, warn};

pub use cipher::{build_cipher, Cipher, PlainCipher, SsStream};

use crate::error::Result;
use crate::pipe::pipe_then_close;

/// 处理一条数据连接请求
///
/// 所有失败都记录日志后就地终止，不向协调器回报。
pub async fn handle_connect_request(
    data_addr: String,
    socket_key: String,
    cipher: Arc<dyn Cipher>,
    read_timeout: Option<Duration>,
) {
    debug!(
        "[ss]: handle connect request, data addr[{}], key[{}]",
        data_addr, socket_key
    );

    let conn = match make_tunnel(&data_addr, &socket_key).await {
        Ok(conn) => conn,
        Err(e) => {
            warn!("[ss]: make tunnel failed: {}", e);
            return;
        }
    };

    let stream = cipher.wrap(conn);
    handle_connection(stream, false, read_timeout).await;
}

/// 连上数据端点并完成 socket key 握手
async fn make_tunnel(addr: &str, key: &str) -> Result<TcpStream> {
    let mut conn = TcpStream::connect(addr).await?;
    handshake::establish_tunnel(&mut conn, key).await?;
    Ok(conn)
}

/// 在握手完成的会话上解析目标并对拷
async fn handle_connection(
    mut stream: Box<dyn SsStream>,
    force_ota: bool,
    read_timeout: Option<Duration>,
) {
    let (host, ota) = match addr::read_request(stream.as_mut(), force_ota).await {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("[ss]: error getting request: {}", e);
            return;
        }
    };

    if ota {
        warn!("[ss]: one time auth not supported");
        return;
    }

    debug!("[ss]: connecting {}", host);
    let remote = match TcpStream::connect(host.as_str()).await {
        Ok(remote) => remote,
        Err(e) => {
            warn!("[ss]: connect to {} error: {}", host, e);
            return;
        }
    };

    let (local_read, local_write) = tokio::io::split(stream);
    let (remote_read, remote_write) = remote.into_split();

    // 任一方向收尾即整体收尾，返回时两侧连接一并释放
    tokio::select! {
        _ = pipe_then_close(local_read, remote_write, read_timeout) => {
            debug!("[ss]: piping local -> remote[{}] return", host);
        }
        _ = pipe_then_close(remote_read, local_write, read_timeout) => {
            debug!("[ss]: piping remote[{}] -> local return", host);
        }
    }
}
