use std::fs;
use std::time::Duration;

use bytes::BytesMut;
use shadowbridge_bridge::{Payload, TasksClient};
use shadowbridge_frame::{encode_envelope, mli_for, HEADER_LEN, MLI_LEN};
use tonic::transport::{Certificate, ClientTlsConfig, Endpoint};

use crate::cmd::{parse_duration, CallArgs};
use crate::exit::{
    io_error, rpc_transport_error, status_error, CliError, CliResult, DATA_INVALID, SUCCESS, USAGE,
};
use crate::output::{print_response, OutputFormat};

pub async fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let payload = build_payload(&args)?;
    let endpoint = endpoint(&args, timeout)?;

    let channel = endpoint
        .connect()
        .await
        .map_err(|err| rpc_transport_error(&format!("failed to connect to {}", args.addr), err))?;
    let mut client = TasksClient::new(channel);

    let mut request = tonic::Request::new(Payload { data: payload });
    request.set_timeout(timeout);
    let reply = client
        .call(request)
        .await
        .map_err(|status| status_error("call failed", status))?;

    print_response(&reply.into_inner().data, format);
    Ok(SUCCESS)
}

/// `[header][mli][body]` from the command-line flags.
fn build_payload(args: &CallArgs) -> CliResult<Vec<u8>> {
    let header: [u8; HEADER_LEN] = decode_fixed("--header", &args.header)?;
    let body = resolve_body(args)?;
    let mli: [u8; MLI_LEN] = if args.mli_auto {
        mli_for(&body).map_err(|err| CliError::new(DATA_INVALID, format!("--mli-auto: {err}")))?
    } else {
        decode_fixed("--mli", &args.mli)?
    };

    let mut payload = BytesMut::new();
    encode_envelope(&header, &mli, &body, &mut payload);
    Ok(payload.to_vec())
}

fn resolve_body(args: &CallArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(hex_body) = &args.hex {
        return hex::decode(hex_body.trim())
            .map_err(|err| CliError::new(USAGE, format!("--hex is not valid hex: {err}")));
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}

fn decode_fixed<const N: usize>(flag: &str, value: &str) -> CliResult<[u8; N]> {
    let bytes = hex::decode(value.trim())
        .map_err(|err| CliError::new(USAGE, format!("{flag} is not valid hex: {err}")))?;
    <[u8; N]>::try_from(bytes.as_slice()).map_err(|_| {
        CliError::new(
            USAGE,
            format!("{flag} must be {N} bytes, got {}", bytes.len()),
        )
    })
}

fn endpoint(args: &CallArgs, timeout: Duration) -> CliResult<Endpoint> {
    let uri = if args.addr.contains("://") {
        args.addr.clone()
    } else if args.ca.is_some() {
        format!("https://{}", args.addr)
    } else {
        format!("http://{}", args.addr)
    };

    let mut endpoint = Endpoint::from_shared(uri)
        .map_err(|err| CliError::new(USAGE, format!("invalid address {}: {err}", args.addr)))?
        .connect_timeout(timeout);

    if let Some(ca_path) = &args.ca {
        let pem = fs::read(ca_path)
            .map_err(|err| io_error(&format!("failed reading {}", ca_path.display()), err))?;
        let domain = args
            .domain
            .clone()
            .or_else(|| {
                endpoint
                    .uri()
                    .host()
                    .map(|host| host.trim_start_matches('[').trim_end_matches(']').to_string())
            })
            .unwrap_or_default();
        endpoint = endpoint
            .tls_config(
                ClientTlsConfig::new()
                    .ca_certificate(Certificate::from_pem(pem))
                    .domain_name(domain),
            )
            .map_err(|err| rpc_transport_error("tls setup failed", err))?;
    }

    Ok(endpoint)
}
