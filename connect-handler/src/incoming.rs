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

// # Incoming CONNECT handler
//
// Runs on the client facing side of a TLS terminating listener. The
// first byte decides whether the client speaks TLS directly or sends
// an HTTP CONNECT first. A CONNECT request is parsed, handed to the
// registered hook and answered before the TLS handshake starts.

use crate::buffer::HeaderStage;
use crate::error::{Error, Result};
use crate::handler::{ConnectHandler, ConnectState, Progress};
use crate::header::{RequestHeader, ResponseHeader};
use crate::held::Held;
use crate::hook::ConnectHook;
use crate::io::{
    closed_by_peer, read_header_from_socket, serialize_header_to_buffer, write_buffer_to_socket,
    write_bytes_to_socket, Transfer, TransferProgress,
};
use crate::socket::{is_transient, Socket};
use log::{debug, warn};
use std::io;
use std::rc::Rc;

/// First byte of a TLS handshake record.
pub const TLS_HANDSHAKE: u8 = 0x16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Detecting,
    ParsingRequest,
    SendingResponse,
    Done,
    Failed,
}

pub struct IncomingConnectHandler {
    phase: Phase,
    state: ConnectState,
    connect_received: bool,
    hook: Option<Rc<dyn ConnectHook>>,
}

impl Default for IncomingConnectHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl IncomingConnectHandler {
    pub fn new() -> Self {
        IncomingConnectHandler {
            phase: Phase::Detecting,
            state: ConnectState::new(RequestHeader::default()),
            connect_received: false,
            hook: None,
        }
    }

    pub fn with_hook(mut self, hook: impl ConnectHook + 'static) -> Self {
        self.hook = Some(Rc::new(hook));
        self
    }

    /// Whether the connection started with a CONNECT rather than TLS.
    pub fn connect_received(&self) -> bool {
        self.connect_received
    }

    fn advance<S: Socket>(&mut self, socket: &mut S) -> Result<Progress> {
        loop {
            let (transfer, waiting_for) = match self.phase {
                Phase::Detecting => (self.detect_connect(socket)?, Progress::NeedsRead),
                Phase::ParsingRequest => (self.parse_incoming_connect(socket)?, Progress::NeedsRead),
                Phase::SendingResponse => {
                    (self.send_connect_response(socket)?, Progress::NeedsWrite)
                }
                Phase::Done => return Ok(Progress::Done),
                Phase::Failed => return Err(Error::HandlerFailed),
            };
            if transfer == Transfer::WouldBlock {
                return Ok(waiting_for);
            }
        }
    }

    /// Peeks at the first byte to tell raw TLS from a CONNECT request.
    fn detect_connect<S: Socket>(&mut self, socket: &mut S) -> Result<Transfer> {
        let mut first = [0u8; 1];
        let peeked = loop {
            match socket.peek(&mut first) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_transient(&e) => return Ok(Transfer::WouldBlock),
                Err(e) => return Err(e.into()),
            }
        };
        if peeked == 0 {
            return Err(closed_by_peer());
        }

        if first[0] == TLS_HANDSHAKE {
            debug!(target: "incoming_connect_handler", "Raw TLS detected");
            self.state.work_complete = true;
            self.phase = Phase::Done;
        } else {
            debug!(target: "incoming_connect_handler", "CONNECT detected");
            self.connect_received = true;
            self.phase = Phase::ParsingRequest;
        }
        Ok(Transfer::Done)
    }

    /// Reads and parses the CONNECT request, then runs the hook.
    fn parse_incoming_connect<S: Socket>(&mut self, socket: &mut S) -> Result<Transfer> {
        let stage = self.state.stage.get_or_insert_with(HeaderStage::new);
        let transfer = read_header_from_socket(
            socket,
            &mut self.state.request,
            &mut stage.buffer,
            &mut stage.parser,
        )?;
        if transfer == Transfer::WouldBlock {
            return Ok(transfer);
        }

        debug!(
            target: "incoming_connect_handler",
            "CONNECT request parsed for {}", self.state.request.target
        );
        self.state.request_parse_complete = true;
        self.state.free_stage();
        self.phase = Phase::SendingResponse;

        if let Some(hook) = self.hook.clone() {
            hook.connect_received(self);
        }
        Ok(Transfer::Done)
    }

    /// Writes the response header, then the response body if any.
    fn send_connect_response<S: Socket>(&mut self, socket: &mut S) -> Result<Transfer> {
        let state = &mut self.state;
        let stage = state
            .stage
            .get_or_insert_with(|| prepare_response(&mut state.response, &state.body));

        if !stage.progress.is_complete()
            && write_buffer_to_socket(socket, &mut stage.buffer, &mut stage.progress)?
                == Transfer::WouldBlock
        {
            return Ok(Transfer::WouldBlock);
        }

        let body = state.body.get();
        if write_bytes_to_socket(socket, &body, &mut state.body_moved)? == Transfer::WouldBlock {
            return Ok(Transfer::WouldBlock);
        }
        drop(body);

        state.stage = None;
        state.work_complete = true;
        self.phase = Phase::Done;
        debug!(target: "incoming_connect_handler", "CONNECT processed");
        Ok(Transfer::Done)
    }
}

/// Finalizes the response and serializes it into a fresh stage.
fn prepare_response(response: &mut Held<ResponseHeader>, body: &Held<Vec<u8>>) -> HeaderStage {
    let body_len = body.get().len();
    let mut response = response.get_mut();
    response.default_reason();
    if body_len > 0 {
        response.set_content_length(body_len as u64);
    }

    let mut stage = HeaderStage::new();
    let size = serialize_header_to_buffer(&*response, &mut stage.buffer);
    stage.progress = TransferProgress::new(size);
    stage
}

impl ConnectHandler for IncomingConnectHandler {
    fn do_work<S: Socket>(&mut self, socket: &mut S) -> Result<Progress> {
        let result = self.advance(socket);
        if let Err(e) = &result {
            if self.phase != Phase::Failed {
                warn!(target: "incoming_connect_handler", "CONNECT handling failed: {}", e);
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
