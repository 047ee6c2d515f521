//! SOCKS5 Client Handshake
//!
//! Opens a TCP stream to a remote host through a SOCKS5 proxy
//! (RFC 1928, no-auth, CONNECT only). The remote name is sent as a
//! domain so DNS resolution happens at the proxy egress.
//!
//! ```text
//! client → [05 01 00]                      greeting
//! proxy  → [05 00]                         no-auth accepted
//! client → [05 01 00 03 len host.. port]   CONNECT domain
//! proxy  → [05 00 00 atyp addr.. port]     success
//! ```

use std::net::SocketAddr;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// SOCKS5 version
const SOCKS5_VERSION: u8 = 0x05;

/// SOCKS5 authentication methods
const AUTH_NO_AUTH: u8 = 0x00;

/// SOCKS5 commands
const CMD_CONNECT: u8 = 0x01;

/// SOCKS5 address types
const ADDR_IPV4: u8 = 0x01;
const ADDR_DOMAIN: u8 = 0x03;
const ADDR_IPV6: u8 = 0x04;

/// SOCKS5 reply codes
const REPLY_SUCCESS: u8 = 0x00;

/// SOCKS5 client errors
#[derive(Debug, Error)]
pub enum SocksError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Proxy speaks unsupported version {0:#04x}")]
    BadVersion(u8),

    #[error("Proxy requires authentication")]
    AuthRequired,

    #[error("Host name too long for SOCKS5 ({0} bytes)")]
    HostTooLong(usize),

    #[error("Proxy refused CONNECT (reply {0:#04x})")]
    Refused(u8),

    #[error("Unknown address type {0:#04x} in reply")]
    BadAddressType(u8),
}

/// Connect to `host:port` through the SOCKS5 proxy at `proxy`.
pub async fn connect(proxy: SocketAddr, host: &str, port: u16) -> Result<TcpStream, SocksError> {
    let mut stream = TcpStream::connect(proxy).await?;

    // Greeting
    stream.write_all(&[SOCKS5_VERSION, 1, AUTH_NO_AUTH]).await?;
    let mut choice = [0u8; 2];
    stream.read_exact(&mut choice).await?;
    if choice[0] != SOCKS5_VERSION {
        return Err(SocksError::BadVersion(choice[0]));
    }
    if choice[1] != AUTH_NO_AUTH {
        return Err(SocksError::AuthRequired);
    }

    // CONNECT
    stream.write_all(&connect_request(host, port)?).await?;

    let mut head = [0u8; 4];
    stream.read_exact(&mut head).await?;
    if head[0] != SOCKS5_VERSION {
        return Err(SocksError::BadVersion(head[0]));
    }
    if head[1] != REPLY_SUCCESS {
        return Err(SocksError::Refused(head[1]));
    }

    // Drain the bound address, we have no use for it
    let addr_len = match head[3] {
        ADDR_IPV4 => 4,
        ADDR_IPV6 => 16,
        ADDR_DOMAIN => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            len[0] as usize
        }
        other => return Err(SocksError::BadAddressType(other)),
    };
    let mut bound = vec![0u8; addr_len + 2];
    stream.read_exact(&mut bound).await?;

    debug!("SOCKS5 tunnel to {}:{} via {}", host, port, proxy);
    Ok(stream)
}

/// Encode a CONNECT request for a domain target.
fn connect_request(host: &str, port: u16) -> Result<Vec<u8>, SocksError> {
    let name = host.as_bytes();
    if name.len() > u8::MAX as usize {
        return Err(SocksError::HostTooLong(name.len()));
    }

    let mut request = Vec::with_capacity(7 + name.len());
    request.extend_from_slice(&[SOCKS5_VERSION, CMD_CONNECT, 0x00, ADDR_DOMAIN, name.len() as u8]);
    request.extend_from_slice(name);
    request.extend_from_slice(&port.to_be_bytes());
    Ok(request)
}
