/// 运行配置
///
/// 地址一律来自命令行，这里只承载可调参数：心跳节奏、数据面读
/// 超时和数据 cipher 的选择。所有字段都有默认值，不给配置文件时
/// 直接用默认配置运行。
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::coordinator::Timing;

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 心跳检查周期，毫秒
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,

    /// 接收活动超时窗口，毫秒
    #[serde(default = "default_check_timeout_ms")]
    pub check_timeout_ms: u64,

    /// 数据面 pipe 读超时，毫秒，0 表示不限制
    #[serde(default)]
    pub read_timeout_ms: u64,

    /// 数据 cipher 方法名
    #[serde(default = "default_method")]
    pub method: String,

    /// 数据 cipher 口令
    #[serde(default)]
    pub password: String,
}

fn default_check_interval_ms() -> u64 {
    1000
}

fn default_check_timeout_ms() -> u64 {
    30_000
}

fn default_method() -> String {
    "plain".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: default_check_interval_ms(),
            check_timeout_ms: default_check_timeout_ms(),
            read_timeout_ms: 0,
            method: default_method(),
            password: String::new(),
        }
    }
}

impl AppConfig {
    /// 从 TOML 文件加载
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;
        Ok(config)
    }

    /// 转换为协调器的运行参数
    pub fn timing(&self) -> Timing {
        Timing {
            check_interval: Duration::from_millis(self.check_interval_ms),
            check_timeout: Duration::from_millis(self.check_timeout_ms),
            read_timeout: match self.read_timeout_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
        }
    }
}
