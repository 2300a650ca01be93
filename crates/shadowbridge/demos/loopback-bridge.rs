//! Loopback bridge: an in-process echo peer behind a bridge, driven over RPC.
//!
//! Run with:
//!   cargo run --example loopback-bridge
//!
//! Against a separately running bridge, the CLI does the same:
//!   cargo run --features cli -- echo-peer 127.0.0.1:6000
//!   cargo run --features cli -- serve --listen 127.0.0.1:50051
//!   cargo run --features cli -- call 127.0.0.1:50051 --data ping

use std::sync::Arc;

use shadowbridge::bridge::{Bridge, BridgeConfig, Logger, Payload, TasksClient};
use shadowbridge::frame::{encode_envelope, mli_for};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let peer = TcpListener::bind("127.0.0.1:0").await?;
    let peer_addr = peer.local_addr()?;
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = peer.accept().await {
            tokio::spawn(async move {
                let mut buf = [0_u8; 1024];
                while let Ok(n) = stream.read(&mut buf).await {
                    if n == 0 || stream.write_all(&buf[..n]).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
    eprintln!("Echo peer on {peer_addr}");

    let config = BridgeConfig::new("127.0.0.1:0", peer_addr.ip().to_string(), peer_addr.port());
    let bridge = Arc::new(Bridge::new(config, Logger::disabled()).await?);
    let bridge_addr = bridge.local_addr();
    let server = {
        let bridge = Arc::clone(&bridge);
        tokio::spawn(async move { bridge.start().await })
    };
    eprintln!("Bridge on {bridge_addr}");

    let mut client = TasksClient::connect(format!("http://{bridge_addr}")).await?;
    for body in [&b"ping"[..], b"hello, legacy world"] {
        let mut data = bytes::BytesMut::new();
        encode_envelope(b"DEMOHEADER", &mli_for(body)?, body, &mut data);
        let reply = client.call(Payload { data: data.to_vec() }).await?;
        eprintln!(
            "Sent {} bytes, got {:?}",
            data.len(),
            String::from_utf8_lossy(&reply.into_inner().data)
        );
    }

    bridge.shutdown().await;
    server.await??;
    Ok(())
}
