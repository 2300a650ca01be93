use std::sync::Arc;

use shadowbridge_bridge::{Bridge, BridgeConfig, Logger, TlsFiles};
use shadowbridge_frame::{MliPolicy, ResponseFramer};
use tracing::info;

use crate::cmd::{parse_duration, ServeArgs};
use crate::exit::{bridge_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_listening, OutputFormat};

pub async fn run(args: ServeArgs, format: OutputFormat, logger: Logger) -> CliResult<i32> {
    let config = build_config(&args)?;
    let downstream = format!("{}:{}", config.downstream_host, config.downstream_port);

    let bridge = Bridge::new(config, logger.clone())
        .await
        .map_err(|err| bridge_error("bridge startup failed", err))?;
    let bridge = Arc::new(bridge);
    print_listening("bridge", bridge.local_addr(), Some(&downstream), format);

    let interrupt = {
        let bridge = Arc::clone(&bridge);
        tokio::spawn(logger.instrument(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
                bridge.shutdown().await;
            }
        }))
    };

    let result = bridge.start().await;
    interrupt.abort();
    result.map_err(|err| bridge_error("bridge stopped with error", err))?;

    Ok(SUCCESS)
}

/// Load the optional config file, then apply flag overrides.
fn build_config(args: &ServeArgs) -> CliResult<BridgeConfig> {
    let mut config = match &args.config {
        Some(path) => BridgeConfig::from_json_file(path)
            .map_err(|err| bridge_error("config load failed", err))?,
        None => BridgeConfig::default(),
    };

    if let Some(listen) = &args.listen {
        config.listen_addr = listen.clone();
    }
    if let Some(host) = &args.downstream_host {
        config.downstream_host = host.clone();
    }
    if let Some(port) = args.downstream_port {
        config.downstream_port = port;
    }

    match (&args.tls_cert, &args.tls_key) {
        (Some(cert_path), Some(key_path)) => {
            let ca_path = args
                .tls_ca
                .clone()
                .or_else(|| config.tls.as_ref().and_then(|tls| tls.ca_path.clone()));
            config.tls = Some(TlsFiles {
                cert_path: cert_path.clone(),
                key_path: key_path.clone(),
                ca_path,
            });
        }
        _ => {
            if let Some(ca_path) = &args.tls_ca {
                let Some(tls) = config.tls.as_mut() else {
                    return Err(CliError::new(
                        USAGE,
                        "--tls-ca requires --tls-cert and --tls-key",
                    ));
                };
                tls.ca_path = Some(ca_path.clone());
            }
        }
    }

    if args.downstream_tls {
        config.enable_downstream_tls = true;
    }
    if let Some(name) = &args.server_name {
        config.downstream_server_name = Some(name.clone());
    }
    if args.length_prefixed {
        config.response_framing = ResponseFramer::length_prefixed();
    }
    if let Some(max_bytes) = args.max_response_bytes {
        config.response_framing = ResponseFramer::BestEffortSingleRead { max_bytes };
    }
    if args.strict_mli {
        config.mli_policy = MliPolicy::Strict;
    }
    if let Some(timeout) = &args.io_timeout {
        config.io_timeout_ms = Some(duration_ms(timeout)?);
    }
    if let Some(timeout) = &args.connect_timeout {
        config.connect_timeout_ms = Some(duration_ms(timeout)?);
    }
    if args.reconnect {
        config.reconnect_on_failure = true;
    }

    Ok(config)
}

fn duration_ms(input: &str) -> CliResult<u64> {
    let duration = parse_duration(input)?;
    Ok(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}
