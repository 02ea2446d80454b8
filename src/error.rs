/// 自定义错误类型
///
/// 使用 thiserror 定义精确的错误类型，二进制入口处再用 anyhow 聚合。
/// 三个读阶段的错误各自独立，调用方可以区分帧边界上的干净 EOF
/// 和帧中途的读失败。
use std::io;
use thiserror::Error;

/// 协调器的主要错误类型
#[derive(Error, Debug)]
pub enum CoordError {
    /// 读取帧类型字段失败
    #[error("read type error")]
    ReadType(#[source] io::Error),

    /// 读取帧长度字段失败
    #[error("read length error")]
    ReadLen(#[source] io::Error),

    /// 读取帧负载失败
    #[error("read value error")]
    ReadValue(#[source] io::Error),

    /// 帧声明长度与负载长度不一致
    #[error("length mismatch: expect {expect}, but got {got}")]
    LengthMismatch { expect: usize, got: usize },

    /// 未知的命令类型
    #[error("unknown type [{0:#06x}]")]
    UnknownType(u16),

    /// 不支持的地址类型
    #[error("addr type {0} not supported")]
    UnsupportedAddrType(u8),

    /// 一次性认证校验失败
    #[error("verify one time auth failed")]
    OtaVerifyFailed,

    /// 建立数据隧道失败
    #[error("establish tunnel failed")]
    EstablishTunnelFailed,

    /// 隧道心跳超时
    #[error("tunnel ping timeout")]
    TunnelPingTimeout,

    /// 插件连接初始化失败
    #[error("setup plugin failed")]
    SetupPluginFailed,

    /// 隧道连接初始化失败
    #[error("setup tunnel failed")]
    SetupTunnelFailed,

    /// 插件要求退出（用于终止事件循环的哨兵）
    #[error("plugin exit")]
    PluginExit,

    /// I/O 错误
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, CoordError>;

impl CoordError {
    /// 创建长度不一致错误
    pub fn length_mismatch(expect: usize, got: usize) -> Self {
        Self::LengthMismatch { expect, got }
    }

    /// 是否为读帧阶段的错误
    pub fn is_frame_read(&self) -> bool {
        matches!(
            self,
            Self::ReadType(_) | Self::ReadLen(_) | Self::ReadValue(_)
        )
    }

    /// 是否为心跳超时
    pub fn is_ping_timeout(&self) -> bool {
        matches!(self, Self::TunnelPingTimeout)
    }

    /// 是否为插件退出哨兵
    pub fn is_plugin_exit(&self) -> bool {
        matches!(self, Self::PluginExit)
    }
}
