/// 隧道方向的协议适配
///
/// 命令码 0x0003 在两个方向上共用：入站解码为任务结果，出站编码
/// 自任务下发。两个变体不会合并。
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::warn;

use crate::error::{CoordError, Result};
use crate::protocol::{Request, RequestKind};
use crate::tlv::{self, Frame};

const T_CREATE_SS_CONNECT: u16 = 0x0001;
const T_TASK_RECV: u16 = 0x0002;
const T_TASK: u16 = 0x0003;
const T_PING: u16 = 0x0004;

/// 从隧道读取一条控制请求
pub async fn read_request<R>(r: &mut R) -> Result<Request>
where
    R: AsyncRead + Unpin,
{
    let frame = tlv::read_frame(r).await.map_err(|e| {
        warn!("[tunnel]: read control request failed: {}", e);
        e
    })?;

    match frame.typ {
        T_CREATE_SS_CONNECT => Ok(Request::create_ss_connect(
            String::from_utf8_lossy(&frame.value).into_owned(),
        )),
        T_TASK => Ok(Request::task_result(frame.value)),
        T_PING => Ok(Request::ping()),
        typ => {
            warn!("[tunnel]: unknown command type[{:#06x}]", typ);
            Err(CoordError::UnknownType(typ))
        }
    }
}

/// 向隧道写出一条控制请求
pub async fn write_request<W>(w: &mut W, req: &Request) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = match req.kind {
        RequestKind::PushTaskRecv => Frame::new(T_TASK_RECV, req.task_data.clone()),
        RequestKind::PushTask => Frame::new(T_TASK, req.task_data.clone()),
        RequestKind::Ping => Frame::new(T_PING, Vec::new()),
        kind => {
            warn!("[tunnel]: unknown request kind {:?}", kind);
            return Err(CoordError::UnknownType(0));
        }
    };

    tlv::write_frame(w, &frame).await.map_err(|e| {
        warn!("[tunnel]: write control request {:?} failed: {}", req, e);
        e
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_create_ss_connect() {
        let mut input: &[u8] = &[0x00, 0x01, 0x00, 0x02, 0x74, 0x77];
        let req = read_request(&mut input).await.unwrap();
        assert_eq!(req, Request::create_ss_connect("tw"));
    }

    #[tokio::test]
    async fn test_read_task_result() {
        let mut input: &[u8] = &[0x00, 0x03, 0x00, 0x02, 0x74, 0x77];
        let req = read_request(&mut input).await.unwrap();
        assert_eq!(req, Request::task_result(vec![0x74, 0x77]));
    }

    #[tokio::test]
    async fn test_read_ping() {
        let mut input: &[u8] = &[0x00, 0x04, 0x00, 0x00];
        let req = read_request(&mut input).await.unwrap();
        assert_eq!(req, Request::ping());
    }

    #[tokio::test]
    async fn test_read_unknown_type() {
        let mut input: &[u8] = &[0x99, 0x99, 0x00, 0x01, 0x05];
        let err = read_request(&mut input).await.unwrap_err();
        assert!(matches!(err, CoordError::UnknownType(0x9999)));
    }

    #[tokio::test]
    async fn test_read_truncated() {
        let mut input: &[u8] = &[0x00];
        let err = read_request(&mut input).await.unwrap_err();
        assert!(err.is_frame_read());
    }

    #[tokio::test]
    async fn test_write_push_task() {
        let mut buf = Vec::new();
        write_request(&mut buf, &Request::push_task(vec![1, 2, 3]))
            .await
            .unwrap();
        assert_eq!(buf, vec![0x00, 0x03, 0x00, 0x03, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_write_push_task_recv() {
        let mut buf = Vec::new();
        write_request(&mut buf, &Request::push_task_recv(vec![1]))
            .await
            .unwrap();
        assert_eq!(buf, vec![0x00, 0x02, 0x00, 0x01, 1]);
    }

    #[tokio::test]
    async fn test_write_ping() {
        let mut buf = Vec::new();
        write_request(&mut buf, &Request::ping()).await.unwrap();
        assert_eq!(buf, vec![0x00, 0x04, 0x00, 0x00]);
    }

    #[tokio::test]
    async fn test_write_unknown_kind() {
        let mut buf = Vec::new();
        let err = write_request(&mut buf, &Request::exit()).await.unwrap_err();
        assert!(matches!(err, CoordError::UnknownType(_)));
        assert!(buf.is_empty());
    }
}
