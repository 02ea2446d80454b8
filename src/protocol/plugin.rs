/// 插件方向的协议适配
///
/// 与隧道方向使用同一套 TLV 编解码，但命令码空间独立。
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::warn;

use crate::error::{CoordError, Result};
use crate::protocol::{Request, RequestKind};
use crate::tlv::{self, Frame};

const P_PUSH_TASK_RECV: u16 = 0x1001;
const P_PUSH_TASK: u16 = 0x1002;
const P_EXIT: u16 = 0x1003;
const P_TASK_RESULT: u16 = 0x0001;
const P_TUNNEL_RECONNECT_FAILED: u16 = 0x0002;
const P_TUNNEL_CONNECT_OK: u16 = 0x0003;

/// 从插件读取一条请求
pub async fn read_request<R>(r: &mut R) -> Result<Request>
where
    R: AsyncRead + Unpin,
{
    let frame = tlv::read_frame(r).await.map_err(|e| {
        warn!("[plugin]: read request failed: {}", e);
        e
    })?;

    match frame.typ {
        P_PUSH_TASK_RECV => Ok(Request::push_task_recv(frame.value)),
        P_PUSH_TASK => Ok(Request::push_task(frame.value)),
        P_EXIT => Ok(Request::exit()),
        typ => {
            warn!("[plugin]: unknown type[{:#06x}]", typ);
            Err(CoordError::UnknownType(typ))
        }
    }
}

/// 向插件写出一条请求
pub async fn write_request<W>(w: &mut W, req: &Request) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = match req.kind {
        RequestKind::TaskResult => Frame::new(P_TASK_RESULT, req.task_data.clone()),
        RequestKind::TunnelReconnectFailed => Frame::new(P_TUNNEL_RECONNECT_FAILED, Vec::new()),
        RequestKind::TunnelConnectOk => Frame::new(P_TUNNEL_CONNECT_OK, Vec::new()),
        kind => {
            warn!("[plugin]: unknown request kind {:?}", kind);
            return Err(CoordError::UnknownType(0));
        }
    };

    tlv::write_frame(w, &frame).await.map_err(|e| {
        warn!("[plugin]: write plugin request {:?} failed: {}", req, e);
        e
    })
}
