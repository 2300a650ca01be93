use std::net::SocketAddr;

use bytes::{Bytes, BytesMut};
use shadowbridge_bridge::Logger;
use shadowbridge_frame::{encode_length_prefixed, FrameError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::cmd::EchoPeerArgs;
use crate::exit::{io_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_listening, OutputFormat};

pub async fn run(args: EchoPeerArgs, format: OutputFormat, logger: Logger) -> CliResult<i32> {
    if args.max_bytes == 0 {
        return Err(CliError::new(USAGE, "--max-bytes must be greater than zero"));
    }

    let listener = TcpListener::bind(&args.addr)
        .await
        .map_err(|err| io_error(&format!("failed to bind {}", args.addr), err))?;
    let local_addr = listener
        .local_addr()
        .map_err(|err| io_error("failed to read bound address", err))?;
    print_listening("echo-peer", local_addr, None, format);
    info!(%local_addr, length_prefixed = args.length_prefixed, "echo peer ready");

    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    info!(%peer, "peer connected");
                    tokio::spawn(logger.instrument(echo_connection(
                        stream,
                        peer,
                        args.length_prefixed,
                        args.max_bytes,
                    )));
                }
                Err(err) => warn!(error = %err, "accept failed"),
            },
            _ = &mut interrupt => {
                info!("interrupt received, stopping echo peer");
                break;
            }
        }
    }

    Ok(SUCCESS)
}

async fn echo_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    length_prefixed: bool,
    max_bytes: usize,
) {
    let mut buf = vec![0_u8; max_bytes];
    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) => {
                info!(%peer, "peer disconnected");
                return;
            }
            Ok(n) => n,
            Err(err) => {
                warn!(%peer, error = %err, "read failed");
                return;
            }
        };
        debug!(%peer, len = n, "echoing");

        let reply = match echo_reply(&buf[..n], length_prefixed) {
            Ok(reply) => reply,
            Err(err) => {
                warn!(%peer, error = %err, "reply too large");
                return;
            }
        };
        if let Err(err) = stream.write_all(&reply).await {
            warn!(%peer, error = %err, "write failed");
            return;
        }
    }
}

fn echo_reply(data: &[u8], length_prefixed: bool) -> Result<Bytes, FrameError> {
    if !length_prefixed {
        return Ok(Bytes::copy_from_slice(data));
    }
    let mut reply = BytesMut::new();
    encode_length_prefixed(data, &mut reply)?;
    Ok(reply.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_reply_is_unchanged() {
        let reply = echo_reply(b"ping", false).expect("reply should build");
        assert_eq!(&reply[..], b"ping");
    }

    #[test]
    fn prefixed_reply_carries_big_endian_length() {
        let reply = echo_reply(b"ping", true).expect("reply should build");
        assert_eq!(&reply[..], b"\x00\x00\x00\x04ping");
    }
}
