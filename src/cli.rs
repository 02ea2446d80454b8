/// 命令行参数
use clap::Parser;

/// 代理服务协调器
#[derive(Parser, Debug)]
#[command(name = "ss-coordinator", version, about = "Coordinates a task plugin and a VM agent over framed control links")]
pub struct Cli {
    /// 插件地址
    #[arg(short = 'p', long = "plugin", value_name = "ADDR", default_value = "")]
    pub plugin_addr: String,

    /// 客户端控制（隧道）地址
    #[arg(long = "cc", value_name = "ADDR", default_value = "")]
    pub control_addr: String,

    /// 客户端数据地址
    #[arg(long = "cd", value_name = "ADDR", default_value = "")]
    pub data_addr: String,

    /// 开启调试日志
    #[arg(short = 'd', long = "debug")]
    pub debug: bool,

    /// 可选的 TOML 调优配置文件
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<String>,
}
