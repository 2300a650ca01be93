use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use shadowbridge_frame::{Envelope, MliPolicy, ResponseFramer};
use tonic::{Request, Response, Status};
use tracing::{debug, error, info, warn};

use crate::channel::SerializedStreamChannel;
use crate::deadline;
use crate::error::{BridgeError, Result};
use crate::logger::Logger;
use crate::proto::{Payload, Tasks};

/// Applies the framing contract to one call.
#[derive(Debug)]
pub struct CallHandler {
    channel: Arc<SerializedStreamChannel>,
    framer: ResponseFramer,
    mli_policy: MliPolicy,
    io_timeout: Option<Duration>,
}

impl CallHandler {
    pub fn new(
        channel: Arc<SerializedStreamChannel>,
        framer: ResponseFramer,
        mli_policy: MliPolicy,
        io_timeout: Option<Duration>,
    ) -> Self {
        Self {
            channel,
            framer,
            mli_policy,
            io_timeout,
        }
    }

    /// Strip the envelope, forward the body, return the raw reply.
    ///
    /// Payloads shorter than the envelope are rejected before any downstream
    /// I/O. The header and MLI are never re-attached to the reply.
    pub async fn handle_call(&self, payload: &[u8], caller_deadline: Option<Duration>) -> Result<Bytes> {
        info!(len = payload.len(), "call received");

        let envelope = Envelope::parse_with_policy(payload, self.mli_policy).map_err(|err| {
            warn!(len = payload.len(), error = %err, "payload rejected");
            BridgeError::MalformedPayload(err)
        })?;
        debug!(
            header = %hex::encode(envelope.header),
            mli = %hex::encode(envelope.mli),
            body_len = envelope.body.len(),
            "envelope stripped"
        );

        let timeout = deadline::effective_timeout(caller_deadline, self.io_timeout);
        match self
            .channel
            .round_trip(envelope.body, &self.framer, timeout)
            .await
        {
            Ok(reply) => {
                info!(reply_len = reply.len(), "call complete");
                Ok(reply)
            }
            Err(err) => {
                error!(error = %err, "downstream exchange failed");
                Err(err)
            }
        }
    }
}

/// `shadowworkflow.Tasks` implementation backed by a [`CallHandler`].
#[derive(Debug, Clone)]
pub struct BridgeService {
    handler: Arc<CallHandler>,
    logger: Logger,
}

impl BridgeService {
    pub fn new(handler: Arc<CallHandler>, logger: Logger) -> Self {
        Self { handler, logger }
    }
}

#[tonic::async_trait]
impl Tasks for BridgeService {
    async fn call(&self, request: Request<Payload>) -> std::result::Result<Response<Payload>, Status> {
        let caller_deadline = deadline::from_metadata(request.metadata());
        let payload = request.into_inner();
        let reply = self
            .logger
            .instrument(self.handler.handle_call(&payload.data, caller_deadline))
            .await?;
        Ok(Response::new(Payload {
            data: reply.to_vec(),
        }))
    }
}
