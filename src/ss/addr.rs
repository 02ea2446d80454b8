/// shadowsocks 请求头解析
///
/// 请求头格式：1 字节地址类型，变长地址与 2 字节大端端口，低 4 位
/// 选择地址格式，0x10 位表示带一次性认证后缀。认证后缀是对
/// iv||key 做密钥、对头部原始字节做消息的 HMAC-SHA1 的前 10 字节。
use std::net::{Ipv4Addr, Ipv6Addr};

use hmac::{Hmac, Mac};
use sha1::Sha1;
use tokio::io::AsyncReadExt;

use crate::error::{CoordError, Result};
use crate::ss::cipher::SsStream;

const ADDR_MASK: u8 = 0x0f;
const ONE_TIME_AUTH_MASK: u8 = 0x10;

const TYPE_IPV4: u8 = 1;
const TYPE_DOMAIN: u8 = 3;
const TYPE_IPV6: u8 = 4;

const HMAC_SHA1_LEN: usize = 10;

type HmacSha1 = Hmac<Sha1>;

/// 读取并解析一个请求头，返回 `host:port` 与是否带一次性认证
///
/// `force_ota` 为真时即使头部未标记也按带认证处理。认证不匹配
/// 返回 `OtaVerifyFailed`，地址类型不认识返回 `UnsupportedAddrType`。
pub async fn read_request<S>(stream: &mut S, force_ota: bool) -> Result<(String, bool)>
where
    S: SsStream + ?Sized,
{
    // 原始头部字节要留下来做认证输入
    let mut header = Vec::with_capacity(1 + 1 + 255 + 2);

    let mut atyp_buf = [0u8; 1];
    stream.read_exact(&mut atyp_buf).await?;
    let atyp = atyp_buf[0];
    header.push(atyp);

    let (host, port) = match atyp & ADDR_MASK {
        TYPE_IPV4 => {
            let mut buf = [0u8; 4 + 2];
            stream.read_exact(&mut buf).await?;
            header.extend_from_slice(&buf);
            let ip = Ipv4Addr::new(buf[0], buf[1], buf[2], buf[3]);
            let port = u16::from_be_bytes([buf[4], buf[5]]);
            (ip.to_string(), port)
        }
        TYPE_IPV6 => {
            let mut buf = [0u8; 16 + 2];
            stream.read_exact(&mut buf).await?;
            header.extend_from_slice(&buf);
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&buf[..16]);
            let ip = Ipv6Addr::from(octets);
            let port = u16::from_be_bytes([buf[16], buf[17]]);
            (format!("[{}]", ip), port)
        }
        TYPE_DOMAIN => {
            let mut len_buf = [0u8; 1];
            stream.read_exact(&mut len_buf).await?;
            header.push(len_buf[0]);

            let mut buf = vec![0u8; len_buf[0] as usize + 2];
            stream.read_exact(&mut buf).await?;
            header.extend_from_slice(&buf);

            let host = String::from_utf8_lossy(&buf[..len_buf[0] as usize]).into_owned();
            let port = u16::from_be_bytes([buf[buf.len() - 2], buf[buf.len() - 1]]);
            (host, port)
        }
        other => return Err(CoordError::UnsupportedAddrType(other)),
    };

    let host_port = format!("{}:{}", host, port);

    let ota = force_ota || atyp & ONE_TIME_AUTH_MASK != 0;
    if ota {
        let mut tag = [0u8; HMAC_SHA1_LEN];
        stream.read_exact(&mut tag).await?;

        let mut mac_key = stream.iv().to_vec();
        mac_key.extend_from_slice(stream.key());
        let mut mac =
            HmacSha1::new_from_slice(&mac_key).expect("HMAC accepts keys of any length");
        mac.update(&header);
        let digest = mac.finalize().into_bytes();

        if digest[..HMAC_SHA1_LEN] != tag {
            return Err(CoordError::OtaVerifyFailed);
        }
    }

    Ok((host_port, ota))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ss::cipher::PlainStream;
    use tokio::io::{duplex, AsyncWriteExt, DuplexStream};

    fn session(far_capacity: usize) -> (PlainStream<DuplexStream>, DuplexStream) {
        let (near, far) = duplex(far_capacity);
        (
            PlainStream::new(near, b"123".to_vec(), vec![0u8; 16]),
            far,
        )
    }

    fn ota_tag(iv: &[u8], key: &[u8], header: &[u8]) -> Vec<u8> {
        let mut mac_key = iv.to_vec();
        mac_key.extend_from_slice(key);
        let mut mac = HmacSha1::new_from_slice(&mac_key).unwrap();
        mac.update(header);
        mac.finalize().into_bytes()[..HMAC_SHA1_LEN].to_vec()
    }

    #[tokio::test]
    async fn test_parse_ipv4() {
        let (mut stream, mut far) = session(64);
        far.write_all(&[0x01, 127, 0, 0, 1, 0x1f, 0x90]).await.unwrap();

        let (host, ota) = read_request(&mut stream, false).await.unwrap();
        assert_eq!(host, "127.0.0.1:8080");
        assert!(!ota);
    }

    #[tokio::test]
    async fn test_parse_ipv6_bracketed() {
        let (mut stream, mut far) = session(64);
        let mut header = vec![0x04];
        let ip: Ipv6Addr = "2001:db8::1".parse().unwrap();
        header.extend_from_slice(&ip.octets());
        header.extend_from_slice(&443u16.to_be_bytes());
        far.write_all(&header).await.unwrap();

        let (host, _) = read_request(&mut stream, false).await.unwrap();
        assert_eq!(host, "[2001:db8::1]:443");
    }

    #[tokio::test]
    async fn test_parse_domain() {
        let (mut stream, mut far) = session(64);
        let mut header = vec![0x03, 11];
        header.extend_from_slice(b"example.com");
        header.extend_from_slice(&80u16.to_be_bytes());
        far.write_all(&header).await.unwrap();

        let (host, _) = read_request(&mut stream, false).await.unwrap();
        assert_eq!(host, "example.com:80");
    }

    #[tokio::test]
    async fn test_unsupported_addr_type() {
        let (mut stream, mut far) = session(64);
        far.write_all(&[0x02]).await.unwrap();

        let err = read_request(&mut stream, false).await.unwrap_err();
        assert!(matches!(err, CoordError::UnsupportedAddrType(2)));
    }

    #[tokio::test]
    async fn test_ota_flag_with_valid_tag() {
        let (mut stream, mut far) = session(128);
        // 0x11 = IPv4 地址类型加一次性认证标记
        let header = [0x11, 10, 0, 0, 1, 0x00, 0x50];
        let tag = ota_tag(&[0u8; 16], b"123", &header);

        far.write_all(&header).await.unwrap();
        far.write_all(&tag).await.unwrap();

        let (host, ota) = read_request(&mut stream, false).await.unwrap();
        assert_eq!(host, "10.0.0.1:80");
        assert!(ota);
    }

    #[tokio::test]
    async fn test_ota_tag_mismatch() {
        let (mut stream, mut far) = session(128);
        let header = [0x11, 10, 0, 0, 1, 0x00, 0x50];

        far.write_all(&header).await.unwrap();
        far.write_all(&[0u8; HMAC_SHA1_LEN]).await.unwrap();

        let err = read_request(&mut stream, false).await.unwrap_err();
        assert!(matches!(err, CoordError::OtaVerifyFailed));
    }

    #[tokio::test]
    async fn test_force_ota_reads_tag() {
        let (mut stream, mut far) = session(128);
        // 头部本身不带认证标记，由调用方强制开启
        let header = [0x01, 10, 0, 0, 1, 0x00, 0x50];
        let tag = ota_tag(&[0u8; 16], b"123", &header);

        far.write_all(&header).await.unwrap();
        far.write_all(&tag).await.unwrap();

        let (host, ota) = read_request(&mut stream, true).await.unwrap();
        assert_eq!(host, "10.0.0.1:80");
        assert!(ota);
    }
}
