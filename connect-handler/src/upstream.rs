// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// # Upstream CONNECT handler
//
// Opens a tunnel through an upstream HTTP proxy: sends the configured
// CONNECT request, reads the response header and, when the response
// carries a Content-Length, its body. An empty request host means no
// upstream proxy is configured and the handler completes at once.

use crate::buffer::HeaderStage;
use crate::error::{Error, Result};
use crate::handler::{ConnectHandler, ConnectState, Progress};
use crate::header::RequestHeader;
use crate::io::{
    drain_buffer_into, read_bytes_from_socket, read_header_from_socket,
    serialize_header_to_buffer, write_buffer_to_socket, Transfer, TransferProgress,
};
use crate::socket::Socket;
use http::StatusCode;
use log::{debug, info, warn};

/// Largest upstream response body the handler will buffer.
pub const MAX_BODY_LEN: usize = 1024 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    CheckingConfig,
    SendingRequest,
    ReadingResponseHeaders,
    ReadingBody,
    Finalizing,
    Done,
    Failed,
}

pub struct UpstreamConnectHandler {
    phase: Phase,
    state: ConnectState,
    response_status: Option<StatusCode>,
}

impl UpstreamConnectHandler {
    /// A handler that sends `request` to the upstream proxy.
    pub fn new(request: RequestHeader) -> Self {
        UpstreamConnectHandler {
            phase: Phase::CheckingConfig,
            state: ConnectState::new(request),
            response_status: None,
        }
    }

    /// A handler for a direct connection; it completes without I/O
    /// unless a target is set through `connect_request_mut` first.
    pub fn direct() -> Self {
        Self::new(RequestHeader::default())
    }

    /// Status of the upstream response, once its header is parsed.
    pub fn response_status(&self) -> Option<StatusCode> {
        self.response_status
    }

    fn advance<S: Socket>(&mut self, socket: &mut S) -> Result<Progress> {
        loop {
            let (transfer, waiting_for) = match self.phase {
                Phase::CheckingConfig => (self.check_configured(), Progress::Done),
                Phase::SendingRequest => (self.send_upstream_connect(socket)?, Progress::NeedsWrite),
                Phase::ReadingResponseHeaders => {
                    (self.read_upstream_connect_response(socket)?, Progress::NeedsRead)
                }
                Phase::ReadingBody => {
                    (self.read_upstream_connect_response_body(socket)?, Progress::NeedsRead)
                }
                Phase::Finalizing => (self.finalize()?, Progress::Done),
                Phase::Done => return Ok(Progress::Done),
                Phase::Failed => return Err(Error::HandlerFailed),
            };
            if transfer == Transfer::WouldBlock {
                return Ok(waiting_for);
            }
        }
    }

    fn check_configured(&mut self) -> Transfer {
        if self.state.request.host().is_empty() {
            debug!(target: "upstream_connect_handler", "Upstream proxy not set");
            self.state.work_complete = true;
            self.phase = Phase::Done;
        } else {
            debug!(
                target: "upstream_connect_handler",
                "Upstream proxy set, tunnelling to {}", self.state.request.target
            );
            self.phase = Phase::SendingRequest;
        }
        Transfer::Done
    }

    /// Serializes the request once, then writes it out chunk by chunk.
    fn send_upstream_connect<S: Socket>(&mut self, socket: &mut S) -> Result<Transfer> {
        let request = &self.state.request;
        let stage = self.state.stage.get_or_insert_with(|| {
            let mut stage = HeaderStage::new();
            let size = serialize_header_to_buffer(request, &mut stage.buffer);
            stage.progress = TransferProgress::new(size);
            stage
        });

        let transfer = write_buffer_to_socket(socket, &mut stage.buffer, &mut stage.progress)?;
        if transfer == Transfer::Done {
            debug!(target: "upstream_connect_handler", "CONNECT sent upstream");
            self.state.stage = None;
            self.phase = Phase::ReadingResponseHeaders;
        }
        Ok(transfer)
    }

    /// Reads the response header and sizes the body from Content-Length.
    fn read_upstream_connect_response<S: Socket>(&mut self, socket: &mut S) -> Result<Transfer> {
        let state = &mut self.state;
        let stage = state.stage.get_or_insert_with(HeaderStage::new);
        let mut response = state.response.get_mut();
        if read_header_from_socket(socket, &mut *response, &mut stage.buffer, &mut stage.parser)?
            == Transfer::WouldBlock
        {
            return Ok(Transfer::WouldBlock);
        }

        state.response_parse_complete = true;
        self.response_status = Some(response.status);
        let length = response.content_length()?.unwrap_or(0);
        drop(response);
        let length = usize::try_from(length)
            .ok()
            .filter(|length| *length <= MAX_BODY_LEN)
            .ok_or_else(|| Error::InvalidHeader(format!("content-length {} too large", length)))?;

        // The header read drains the socket, so the start of the body
        // may already be staged behind the header.
        let mut body = state.body.get_mut();
        body.clear();
        body.resize(length, 0);
        state.body_moved = 0;
        if length > 0 {
            debug!(
                target: "upstream_connect_handler",
                "CONNECT response body detected of length {}", length
            );
            drain_buffer_into(&mut stage.buffer, &mut body, &mut state.body_moved);
        }
        drop(body);
        state.free_stage();

        self.phase = if state.body_moved < length { Phase::ReadingBody } else { Phase::Finalizing };
        Ok(Transfer::Done)
    }

    fn read_upstream_connect_response_body<S: Socket>(
        &mut self,
        socket: &mut S,
    ) -> Result<Transfer> {
        let state = &mut self.state;
        let mut body = state.body.get_mut();
        let transfer = read_bytes_from_socket(socket, &mut body, &mut state.body_moved)?;
        if transfer == Transfer::Done {
            self.phase = Phase::Finalizing;
        }
        Ok(transfer)
    }

    fn finalize(&mut self) -> Result<Transfer> {
        self.state.work_complete = true;
        self.phase = Phase::Done;
        match self.response_status {
            Some(StatusCode::OK) => {
                info!(target: "upstream_connect_handler", "Upstream proxy processed");
                Ok(Transfer::Done)
            }
            Some(status) => Err(Error::UpstreamRejected(status)),
            None => Err(Error::InvalidHeader("missing upstream response".into())),
        }
    }
}

impl ConnectHandler for UpstreamConnectHandler {
    fn do_work<S: Socket>(&mut self, socket: &mut S) -> Result<Progress> {
        let result = self.advance(socket);
        if let Err(e) = &result {
            if self.phase != Phase::Failed {
                warn!(target: "upstream_connect_handler", "Upstream CONNECT failed: {}", e);
                self.phase = Phase::Failed;
            }
        }
        result
    }

    fn state(&self) -> &ConnectState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ConnectState {
        &mut self.state
    }
}
