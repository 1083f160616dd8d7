//! Request handlers for the two query channels.

use crate::authority::ServerSynchronisedData;
use crate::error::{ServerError, ServerResult};
use pagesync_protocol::{
    Channel, ChecksumRequest, ChecksumResponse, DataDiffRequest, DataDiffResponse, DataUnit,
    SyncMessage,
};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Answers replica queries against an authority.
pub struct RequestHandler<T: DataUnit> {
    authority: Arc<ServerSynchronisedData<T>>,
}

impl<T: DataUnit> RequestHandler<T> {
    /// Creates a new request handler.
    pub fn new(authority: Arc<ServerSynchronisedData<T>>) -> Self {
        Self { authority }
    }

    /// The authority being served.
    pub fn authority(&self) -> &Arc<ServerSynchronisedData<T>> {
        &self.authority
    }

    /// Handles a checksum query.
    pub fn handle_checksum_request(&self, request: &ChecksumRequest) -> ChecksumResponse {
        self.authority.record_checksum_request();
        match self.authority.get_checksums(request.page) {
            Some(checksums) => {
                trace!(page = request.page, items = checksums.len(), "checksums served");
                ChecksumResponse::present(request.page, checksums)
            }
            None => {
                trace!(page = request.page, "checksums requested for absent page");
                ChecksumResponse::absent(request.page)
            }
        }
    }

    /// Handles a data-diff query.
    pub fn handle_data_diff_request(
        &self,
        request: &DataDiffRequest,
    ) -> ServerResult<DataDiffResponse> {
        let max = self.authority.config().max_request_indices;
        if request.indices.len() > max {
            self.authority.record_rejected();
            return Err(ServerError::InvalidRequest(format!(
                "Too many indices: {} > {}",
                request.indices.len(),
                max
            )));
        }

        self.authority.record_diff_request();
        let response = match self.authority.get_data_diff(request.page, &request.indices) {
            Some(diff) => {
                DataDiffResponse::from_units(request.page, diff.new_data, diff.removed_indices)
            }
            None => DataDiffResponse::absent(request.page),
        };
        trace!(
            page = request.page,
            items = response.new_data.len(),
            bytes = response.payload_size(),
            "data diff served"
        );
        Ok(response)
    }

    /// Dispatches a decoded request to its handler.
    pub fn handle_message(&self, message: SyncMessage) -> ServerResult<SyncMessage> {
        match message {
            SyncMessage::ChecksumRequest(request) => Ok(SyncMessage::ChecksumResponse(
                self.handle_checksum_request(&request),
            )),
            SyncMessage::DataDiffRequest(request) => self
                .handle_data_diff_request(&request)
                .map(SyncMessage::DataDiffResponse),
            other => {
                self.authority.record_rejected();
                Err(ServerError::UnexpectedMessage(other.name()))
            }
        }
    }

    /// Decodes a frame received on `channel`, handles it and encodes the reply.
    pub fn handle_frame(&self, channel: Channel, frame: &[u8]) -> ServerResult<Vec<u8>> {
        let message = match SyncMessage::decode_frame(frame) {
            Ok(message) => message,
            Err(e) => {
                self.authority.record_rejected();
                return Err(e.into());
            }
        };

        if message.channel() != channel {
            self.authority.record_rejected();
            return Err(ServerError::ChannelMismatch {
                message: message.name(),
                expected: message.channel(),
                actual: channel,
            });
        }

        let reply = self.handle_message(message)?;
        Ok(reply.encode_frame()?)
    }

    /// Like [`handle_frame`](Self::handle_frame), but logs and drops failures.
    ///
    /// Returns the reply to send back on the same channel, if any.
    pub fn serve_frame(&self, channel: Channel, frame: &[u8]) -> Option<Vec<u8>> {
        let name = self.authority.config().channel_name(channel);
        match self.handle_frame(channel, frame) {
            Ok(reply) => {
                debug!(channel = %name, bytes = reply.len(), "request answered");
                Some(reply)
            }
            Err(e) => {
                warn!(channel = %name, error = %e, "dropping request");
                None
            }
        }
    }
}
