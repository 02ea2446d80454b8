/// 对端轮询任务
///
/// 每条对端连接配一个解码循环，隧道侧再加一个心跳检查器。任务
/// 只通过请求通道、错误通道和原子时间戳与协调器交互，取消经由
/// 各自的子作用域令牌观察。解码和入队都和取消竞争，协调器等待
/// 旧任务退出时不会被满队列卡住。
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant as TokioInstant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::CoordError;
use crate::protocol::{plugin, tunnel, Request};

use super::{millis_since, SharedWriter};

/// 入队一条请求，等待期间可被取消
///
/// 返回 false 表示应当退出循环。
async fn enqueue(
    scope: &CancellationToken,
    reqs: &mpsc::Sender<Request>,
    req: Request,
) -> bool {
    tokio::select! {
        _ = scope.cancelled() => false,
        sent = reqs.send(req) => sent.is_ok(),
    }
}

/// 插件侧解码循环
pub(super) async fn poll_plugin(
    scope: CancellationToken,
    mut conn: OwnedReadHalf,
    reqs: mpsc::Sender<Request>,
    errs: mpsc::Sender<CoordError>,
) {
    loop {
        tokio::select! {
            _ = scope.cancelled() => break,
            decoded = plugin::read_request(&mut conn) => match decoded {
                Ok(req) => {
                    if !enqueue(&scope, &reqs, req).await {
                        break;
                    }
                }
                Err(e) => {
                    let _ = errs.try_send(e);
                    break;
                }
            },
        }
    }
    debug!("[server]: plugin poller exits");
}

/// 隧道侧解码循环
///
/// 第一个动作是向请求通道上报连接成功，插件由此得知隧道（重新）
/// 建立。每解出一帧就推进接收时间戳。
pub(super) async fn poll_tunnel(
    scope: CancellationToken,
    mut conn: OwnedReadHalf,
    reqs: mpsc::Sender<Request>,
    errs: mpsc::Sender<CoordError>,
    last_recv: Arc<AtomicU64>,
    epoch: Instant,
) {
    if !enqueue(&scope, &reqs, Request::tunnel_connect_ok()).await {
        return;
    }

    loop {
        tokio::select! {
            _ = scope.cancelled() => break,
            decoded = tunnel::read_request(&mut conn) => match decoded {
                Ok(req) => {
                    // fetch_max 保证时间戳只进不退
                    last_recv.fetch_max(millis_since(epoch), Ordering::AcqRel);
                    if !enqueue(&scope, &reqs, req).await {
                        break;
                    }
                }
                Err(e) => {
                    let _ = errs.try_send(e);
                    break;
                }
            },
        }
    }
    debug!("[server]: tunnel poller exits");
}

/// 隧道心跳检查器
///
/// 每个周期先核对接收时间戳，超过窗口就上报超时并退出，否则发一个
/// 心跳帧。首次滴答落在一个周期之后。
pub(super) async fn check_tunnel(
    scope: CancellationToken,
    writer: SharedWriter,
    errs: mpsc::Sender<CoordError>,
    last_recv: Arc<AtomicU64>,
    epoch: Instant,
    check_interval: Duration,
    check_timeout: Duration,
) {
    let mut ticker = interval_at(TokioInstant::now() + check_interval, check_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = scope.cancelled() => break,
            _ = ticker.tick() => {
                let now = epoch.elapsed();
                let last = Duration::from_millis(last_recv.load(Ordering::Acquire));
                if now > last + check_timeout {
                    let _ = errs.try_send(CoordError::TunnelPingTimeout);
                    break;
                }

                tokio::select! {
                    _ = scope.cancelled() => break,
                    mut guard = writer.lock() => {
                        if let Some(conn) = guard.as_mut() {
                            if let Err(e) = tunnel::write_request(conn, &Request::ping()).await {
                                warn!("[server]: send ping failed: {}", e);
                            }
                        }
                    }
                }
            }
        }
    }
    debug!("[server]: tunnel checker exits");
}
