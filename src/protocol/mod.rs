/// 控制面消息定义
///
/// 插件侧与隧道侧共用同一个内部请求表示，各自的适配器负责
/// 在 TLV 命令码与请求变体之间转换。
pub mod plugin;
pub mod tunnel;

/// 请求种类
///
/// 隧道方向的任务推送和任务结果共用一个线上命令码，但在这里
/// 始终保持两个独立的变体，按方向区分。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// 建立一条 shadowsocks 数据连接
    CreateSsConnect,
    /// 任务回执，转发给隧道
    PushTaskRecv,
    /// 任务下发，转发给隧道
    PushTask,
    /// 任务结果，转发给插件
    TaskResult,
    /// 隧道重连失败通告
    TunnelReconnectFailed,
    /// 隧道连接成功通告
    TunnelConnectOk,
    /// 心跳
    Ping,
    /// 插件要求退出
    Exit,
}

/// 协调器内部消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// 请求种类
    pub kind: RequestKind,
    /// 数据连接标识，仅 CreateSsConnect 填写
    pub socket_key: String,
    /// 任务负载，仅任务类请求填写
    pub task_data: Vec<u8>,
}

impl Request {
    fn bare(kind: RequestKind) -> Self {
        Self {
            kind,
            socket_key: String::new(),
            task_data: Vec::new(),
        }
    }

    /// 创建数据连接请求
    pub fn create_ss_connect(socket_key: impl Into<String>) -> Self {
        Self {
            socket_key: socket_key.into(),
            ..Self::bare(RequestKind::CreateSsConnect)
        }
    }

    /// 创建任务回执请求
    pub fn push_task_recv(task_data: Vec<u8>) -> Self {
        Self {
            task_data,
            ..Self::bare(RequestKind::PushTaskRecv)
        }
    }

    /// 创建任务下发请求
    pub fn push_task(task_data: Vec<u8>) -> Self {
        Self {
            task_data,
            ..Self::bare(RequestKind::PushTask)
        }
    }

    /// 创建任务结果请求
    pub fn task_result(task_data: Vec<u8>) -> Self {
        Self {
            task_data,
            ..Self::bare(RequestKind::TaskResult)
        }
    }

    /// 创建隧道重连失败通告
    pub fn tunnel_reconnect_failed() -> Self {
        Self::bare(RequestKind::TunnelReconnectFailed)
    }

    /// 创建隧道连接成功通告
    pub fn tunnel_connect_ok() -> Self {
        Self::bare(RequestKind::TunnelConnectOk)
    }

    /// 创建心跳请求
    pub fn ping() -> Self {
        Self::bare(RequestKind::Ping)
    }

    /// 创建退出请求
    pub fn exit() -> Self {
        Self::bare(RequestKind::Exit)
    }
}
