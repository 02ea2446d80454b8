/// 单向数据搬运
///
/// 数据面连接由两条反向的 pipe 组成，每条只负责关闭自己的写端，
/// 读端留给配对的另一条。
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::debug;

const PIPE_BUF_SIZE: usize = 4096;

/// 从 src 搬运数据到 dst，结束后关闭 dst 的写方向
///
/// 配置了读超时则每次读都受其约束，超时视为数据流结束。
/// 写失败立即停止。src 不在这里关闭。
pub async fn pipe_then_close<R, W>(mut src: R, mut dst: W, read_timeout: Option<Duration>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; PIPE_BUF_SIZE];

    loop {
        let read = match read_timeout {
            Some(limit) => match timeout(limit, src.read(&mut buf)).await {
                Ok(res) => res,
                Err(_) => {
                    debug!("[pipe]: read deadline exceeded");
                    break;
                }
            },
            None => src.read(&mut buf).await,
        };

        match read {
            Ok(0) => break,
            Ok(n) => {
                if let Err(e) = dst.write_all(&buf[..n]).await {
                    debug!("[pipe]: write error: {}", e);
                    break;
                }
            }
            Err(e) => {
                debug!("[pipe]: read error: {}", e);
                break;
            }
        }
    }

    // 关闭写方向即可，重复关闭无害
    let _ = dst.shutdown().await;
}
