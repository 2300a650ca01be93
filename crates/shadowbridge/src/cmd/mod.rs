use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use shadowbridge_bridge::Logger;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod call;
pub mod echo_peer;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the bridge: accept RPCs and forward bodies downstream.
    Serve(ServeArgs),
    /// Run a downstream echo peer.
    EchoPeer(EchoPeerArgs),
    /// Send one RPC call to a running bridge and print the reply.
    Call(CallArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(command: Command, format: OutputFormat, logger: Logger) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format, logger).await,
        Command::EchoPeer(args) => echo_peer::run(args, format, logger).await,
        Command::Call(args) => call::run(args, format).await,
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// JSON config file. Flags override its values.
    #[arg(long, value_name = "FILE", env = "SHADOWBRIDGE_CONFIG")]
    pub config: Option<PathBuf>,
    /// RPC listen address (e.g. 0.0.0.0:50051 or :50051).
    #[arg(long, value_name = "ADDR", env = "SHADOWBRIDGE_LISTEN")]
    pub listen: Option<String>,
    /// Downstream host.
    #[arg(long, value_name = "HOST", env = "SHADOWBRIDGE_DOWNSTREAM_HOST")]
    pub downstream_host: Option<String>,
    /// Downstream port.
    #[arg(long, value_name = "PORT", env = "SHADOWBRIDGE_DOWNSTREAM_PORT")]
    pub downstream_port: Option<u16>,
    /// PEM certificate chain (RPC server and downstream client identity).
    #[arg(long, value_name = "FILE", env = "SHADOWBRIDGE_TLS_CERT", requires = "tls_key")]
    pub tls_cert: Option<PathBuf>,
    /// PEM private key for --tls-cert.
    #[arg(long, value_name = "FILE", env = "SHADOWBRIDGE_TLS_KEY", requires = "tls_cert")]
    pub tls_key: Option<PathBuf>,
    /// PEM trust anchors for the downstream peer.
    #[arg(long, value_name = "FILE", env = "SHADOWBRIDGE_TLS_CA")]
    pub tls_ca: Option<PathBuf>,
    /// Dial the downstream peer over TLS.
    #[arg(long, env = "SHADOWBRIDGE_DOWNSTREAM_TLS")]
    pub downstream_tls: bool,
    /// TLS server name for the downstream peer (default: host).
    #[arg(long, value_name = "NAME", env = "SHADOWBRIDGE_DOWNSTREAM_SERVER_NAME")]
    pub server_name: Option<String>,
    /// Expect 4-byte big-endian length-prefixed downstream replies.
    #[arg(long, env = "SHADOWBRIDGE_LENGTH_PREFIXED", conflicts_with = "max_response_bytes")]
    pub length_prefixed: bool,
    /// Read size for single-read replies.
    #[arg(long, value_name = "BYTES", env = "SHADOWBRIDGE_MAX_RESPONSE_BYTES")]
    pub max_response_bytes: Option<usize>,
    /// Reject payloads whose MLI differs from the body length.
    #[arg(long, env = "SHADOWBRIDGE_STRICT_MLI")]
    pub strict_mli: bool,
    /// Bound on each downstream exchange (e.g. 5s, 500ms).
    #[arg(long, value_name = "DURATION", env = "SHADOWBRIDGE_IO_TIMEOUT")]
    pub io_timeout: Option<String>,
    /// Bound on dialing the downstream peer (e.g. 5s, 500ms).
    #[arg(long, value_name = "DURATION", env = "SHADOWBRIDGE_CONNECT_TIMEOUT")]
    pub connect_timeout: Option<String>,
    /// Redial the downstream peer after a failed exchange.
    #[arg(long, env = "SHADOWBRIDGE_RECONNECT")]
    pub reconnect: bool,
}

#[derive(Args, Debug)]
pub struct EchoPeerArgs {
    /// Address to bind (e.g. 127.0.0.1:6000).
    pub addr: String,
    /// Prefix each reply with its 4-byte big-endian length.
    #[arg(long)]
    pub length_prefixed: bool,
    /// Maximum bytes read per request.
    #[arg(long, default_value = "1024")]
    pub max_bytes: usize,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Bridge address (host:port, http://host:port or https://host:port).
    pub addr: String,
    /// 10-byte header as hex.
    #[arg(long, default_value = "00000000000000000000")]
    pub header: String,
    /// 4-byte MLI as hex.
    #[arg(long, default_value = "00000000", conflicts_with = "mli_auto")]
    pub mli: String,
    /// Set the MLI to the big-endian body length.
    #[arg(long)]
    pub mli_auto: bool,
    /// Body as a UTF-8 string.
    #[arg(long, conflicts_with_all = ["hex", "file"])]
    pub data: Option<String>,
    /// Body as hex.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub hex: Option<String>,
    /// Read body from file.
    #[arg(long, conflicts_with_all = ["data", "hex"])]
    pub file: Option<PathBuf>,
    /// Call deadline, sent as grpc-timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
    /// PEM trust anchors; enables TLS.
    #[arg(long, value_name = "FILE")]
    pub ca: Option<PathBuf>,
    /// TLS server name (default: host from ADDR).
    #[arg(long, value_name = "NAME", requires = "ca")]
    pub domain: Option<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        _ => Err(CliError::new(
            USAGE,
            format!("unsupported duration unit: {unit}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }
}
