/// 协调器
///
/// 单一所有者的状态机：持有插件与隧道两条控制连接，把两侧解出的
/// 帧汇聚到一个请求通道，由事件循环统一分发。隧道侧带心跳检测，
/// 断链后做有限次重连并向插件上报结果。数据面连接按需孵化，和
/// 协调器之间没有回边。
mod poller;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::{CoordError, Result};
use crate::protocol::{plugin, tunnel, Request, RequestKind};
use crate::ss::{self, Cipher};

/// 隧道断链后的连续重连次数
const RECONNECT_ATTEMPTS: usize = 3;
/// 请求通道容量
const REQUEST_QUEUE_CAPACITY: usize = 16;

/// 共享的写半连接，转发任务与心跳检查器通过它写出
pub(crate) type SharedWriter = Arc<Mutex<Option<OwnedWriteHalf>>>;

/// 自纪元起经过的毫秒数，接收时间戳以此为刻度
pub(crate) fn millis_since(epoch: Instant) -> u64 {
    epoch.elapsed().as_millis() as u64
}

/// 协调器运行参数
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    /// 心跳检查周期
    pub check_interval: Duration,
    /// 接收活动超时窗口
    pub check_timeout: Duration,
    /// 数据面 pipe 的读超时，None 表示不限制
    pub read_timeout: Option<Duration>,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(1),
            check_timeout: Duration::from_secs(30),
            read_timeout: None,
        }
    }
}

/// 单个对端的连接状态
///
/// 作用域存活期间恰有一条连接和既定数量的轮询任务。重建连接前
/// 必须先取消作用域并等旧任务全部退出。
struct PeerLink {
    addr: String,
    writer: SharedWriter,
    scope: Option<CancellationToken>,
    tasks: Vec<JoinHandle<()>>,
}

impl PeerLink {
    fn new(addr: String) -> Self {
        Self {
            addr,
            writer: Arc::new(Mutex::new(None)),
            scope: None,
            tasks: Vec::new(),
        }
    }

    /// 终止当前连接并等所有任务退出
    async fn teardown(&mut self) {
        if let Some(scope) = self.scope.take() {
            scope.cancel();
        }
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        *self.writer.lock().await = None;
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator").finish_non_exhaustive()
    }
}

/// 代理协调器
pub struct Coordinator {
    data_addr: String,
    cipher: Arc<dyn Cipher>,
    timing: Timing,

    cancel: CancellationToken,
    req_tx: mpsc::Sender<Request>,
    req_rx: mpsc::Receiver<Request>,

    plugin: PeerLink,
    plugin_err_tx: mpsc::Sender<CoordError>,
    plugin_err_rx: mpsc::Receiver<CoordError>,

    tunnel: PeerLink,
    tunnel_err_tx: mpsc::Sender<CoordError>,
    tunnel_err_rx: mpsc::Receiver<CoordError>,

    epoch: Instant,
    last_recv: Arc<AtomicU64>,
}

impl Coordinator {
    /// 创建协调器并完成插件侧接线
    ///
    /// 插件拨号失败直接返回，不再碰隧道。隧道侧不在这里拨号，而是
    /// 往隧道错误通道塞一个哨兵，事件循环的第一轮会走重连路径完成
    /// 首次建链。空地址表示对应对端禁用。
    pub async fn new(
        plugin_addr: impl Into<String>,
        tunnel_addr: impl Into<String>,
        data_addr: impl Into<String>,
        cipher: Arc<dyn Cipher>,
        timing: Timing,
    ) -> Result<Self> {
        let plugin_addr = plugin_addr.into();
        let tunnel_addr = tunnel_addr.into();
        let data_addr = data_addr.into();
        debug!(
            "[server]: addresses: plugin[{}], control[{}], data[{}]",
            plugin_addr, tunnel_addr, data_addr
        );

        let (req_tx, req_rx) = mpsc::channel(REQUEST_QUEUE_CAPACITY);
        let (plugin_err_tx, plugin_err_rx) = mpsc::channel(1);
        let (tunnel_err_tx, tunnel_err_rx) = mpsc::channel(1);

        let mut coordinator = Self {
            data_addr,
            cipher,
            timing,
            cancel: CancellationToken::new(),
            req_tx,
            req_rx,
            plugin: PeerLink::new(plugin_addr),
            plugin_err_tx,
            plugin_err_rx,
            tunnel: PeerLink::new(tunnel_addr),
            tunnel_err_tx,
            tunnel_err_rx,
            epoch: Instant::now(),
            last_recv: Arc::new(AtomicU64::new(0)),
        };

        if let Err(e) = coordinator.setup_plugin().await {
            error!("[server]: setup plugin failed: {}", e);
            return Err(CoordError::SetupPluginFailed);
        }

        // 先排队一个假错误，让事件循环的第一轮去建隧道
        let _ = coordinator
            .tunnel_err_tx
            .try_send(CoordError::SetupTunnelFailed);

        Ok(coordinator)
    }

    /// 根取消令牌的克隆，供信号处理等外部挂接
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 取消整个协调器，所有任务与事件循环一并退出
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    async fn setup_plugin(&mut self) -> Result<()> {
        if self.plugin.addr.is_empty() {
            debug!("[server]: plugin address is nil, skip");
            return Ok(());
        }

        self.plugin.teardown().await;

        let conn = TcpStream::connect(self.plugin.addr.as_str()).await?;
        let (read_half, write_half) = conn.into_split();
        *self.plugin.writer.lock().await = Some(write_half);

        let scope = self.cancel.child_token();
        self.plugin.scope = Some(scope.clone());
        self.plugin.tasks.push(tokio::spawn(poller::poll_plugin(
            scope,
            read_half,
            self.req_tx.clone(),
            self.plugin_err_tx.clone(),
        )));

        Ok(())
    }

    async fn setup_tunnel(&mut self) -> Result<()> {
        if self.tunnel.addr.is_empty() {
            debug!("[server]: tunnel address is nil, skip");
            return Ok(());
        }

        self.tunnel.teardown().await;

        let conn = TcpStream::connect(self.tunnel.addr.as_str()).await?;
        let (read_half, write_half) = conn.into_split();
        *self.tunnel.writer.lock().await = Some(write_half);

        // 时间戳对齐到建连时刻，检查器不会拿旧值误判
        self.last_recv
            .store(millis_since(self.epoch), Ordering::Release);

        let scope = self.cancel.child_token();
        self.tunnel.scope = Some(scope.clone());
        self.tunnel.tasks.push(tokio::spawn(poller::poll_tunnel(
            scope.clone(),
            read_half,
            self.req_tx.clone(),
            self.tunnel_err_tx.clone(),
            self.last_recv.clone(),
            self.epoch,
        )));
        self.tunnel.tasks.push(tokio::spawn(poller::check_tunnel(
            scope,
            self.tunnel.writer.clone(),
            self.tunnel_err_tx.clone(),
            self.last_recv.clone(),
            self.epoch,
            self.timing.check_interval,
            self.timing.check_timeout,
        )));

        Ok(())
    }

    /// 事件循环
    ///
    /// 取消返回 Ok；隧道错误走重连，不致命；插件错误记录后带错
    /// 返回，事件循环到此为止。
    pub async fn run(&mut self) -> Result<()> {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                Some(req) = self.req_rx.recv() => self.handle_request(req),
                Some(err) = self.tunnel_err_rx.recv() => {
                    let _ = self.handle_tunnel_err(err).await;
                }
                Some(err) = self.plugin_err_rx.recv() => {
                    return Err(self.handle_plugin_err(err));
                }
            }
        }
    }

    /// 请求分发
    ///
    /// 转发动作都孵化成独立任务，事件循环从不等待对端写完成。
    fn handle_request(&self, req: Request) {
        debug!("[server]: handle request {:?}", req);
        match req.kind {
            RequestKind::CreateSsConnect => {
                tokio::spawn(ss::handle_connect_request(
                    self.data_addr.clone(),
                    req.socket_key,
                    self.cipher.clone(),
                    self.timing.read_timeout,
                ));
            }
            RequestKind::PushTaskRecv | RequestKind::PushTask => self.forward_to_tunnel(req),
            RequestKind::TaskResult
            | RequestKind::TunnelReconnectFailed
            | RequestKind::TunnelConnectOk => self.forward_to_plugin(req),
            RequestKind::Ping => debug!("[server]: recv ping ack"),
            RequestKind::Exit => {
                let _ = self.plugin_err_tx.try_send(CoordError::PluginExit);
            }
        }
    }

    fn forward_to_tunnel(&self, req: Request) {
        let writer = self.tunnel.writer.clone();
        tokio::spawn(async move {
            let mut writer = writer.lock().await;
            let Some(conn) = writer.as_mut() else {
                debug!("[server]: tunnel connection absent, drop {:?}", req.kind);
                return;
            };
            if let Err(e) = tunnel::write_request(conn, &req).await {
                warn!("[server]: forward to tunnel failed: {}", e);
            }
        });
    }

    fn forward_to_plugin(&self, req: Request) {
        let writer = self.plugin.writer.clone();
        tokio::spawn(async move {
            let mut writer = writer.lock().await;
            let Some(conn) = writer.as_mut() else {
                debug!("[server]: plugin connection absent, drop {:?}", req.kind);
                return;
            };
            if let Err(e) = plugin::write_request(conn, &req).await {
                warn!("[server]: forward to plugin failed: {}", e);
            }
        });
    }

    /// 隧道错误处理：就地重连，打满次数后向插件通告失败
    async fn handle_tunnel_err(&mut self, err: CoordError) -> Result<()> {
        warn!("[server]: an error happens on control link: {}", err);

        let mut reconnect_err = CoordError::SetupTunnelFailed;
        for _ in 0..RECONNECT_ATTEMPTS {
            match self.setup_tunnel().await {
                Ok(()) => return Ok(()),
                Err(e) => reconnect_err = e,
            }
        }

        error!("[server]: reconnect failure: {}", reconnect_err);
        // 从孵化的任务里入队，事件循环不会卡在自己的队列上
        let req_tx = self.req_tx.clone();
        tokio::spawn(async move {
            let _ = req_tx.send(Request::tunnel_reconnect_failed()).await;
        });
        Err(reconnect_err)
    }

    fn handle_plugin_err(&self, err: CoordError) -> CoordError {
        error!("[server]: an error happens on plugin link: {}", err);
        err
    }
}
