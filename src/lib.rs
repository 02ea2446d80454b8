/// 代理协调器库入口
///
/// 将核心模块导出为库，方便测试和复用
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod pipe;
pub mod protocol;
pub mod ss;
pub mod tlv;

// 重新导出常用类型
pub use config::AppConfig;
pub use coordinator::{Coordinator, Timing};
pub use error::{CoordError, Result};
pub use protocol::{Request, RequestKind};
pub use tlv::Frame;
