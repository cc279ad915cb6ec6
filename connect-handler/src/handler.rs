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

//! State and accessors shared by the incoming and upstream handlers.

use crate::buffer::HeaderStage;
use crate::error::Result;
use crate::header::{RequestHeader, ResponseHeader};
use crate::held::{Held, HeldMut, HeldRef};
use crate::socket::Socket;
use bytes::BytesMut;
use std::cell::RefCell;
use std::rc::Rc;

/// What the owning connection should wait for before calling
/// `do_work` again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Progress {
    Done,
    NeedsRead,
    NeedsWrite,
}

/// The negotiated request and response of one CONNECT handshake.
#[derive(Debug)]
pub struct ConnectState {
    pub(crate) request: RequestHeader,
    pub(crate) response: Held<ResponseHeader>,
    pub(crate) body: Held<Vec<u8>>,
    /// Buffer, parser and write progress of the current header phase.
    pub(crate) stage: Option<HeaderStage>,
    /// Body bytes written (incoming) or read (upstream) so far.
    pub(crate) body_moved: usize,
    pub(crate) request_parse_complete: bool,
    pub(crate) response_parse_complete: bool,
    pub(crate) work_complete: bool,
    /// Bytes that arrived after the handshake message.
    pub(crate) leftover: BytesMut,
}

impl ConnectState {
    pub(crate) fn new(request: RequestHeader) -> Self {
        ConnectState {
            request,
            response: Held::default(),
            body: Held::default(),
            stage: None,
            body_moved: 0,
            request_parse_complete: false,
            response_parse_complete: false,
            work_complete: false,
            leftover: BytesMut::new(),
        }
    }

    /// Releases the general purpose resources of the finished header
    /// phase, keeping any unconsumed bytes aside.
    pub(crate) fn free_stage(&mut self) {
        if let Some(mut stage) = self.stage.take() {
            let rest = stage.buffer.bytes_mut().split();
            if !rest.is_empty() {
                self.leftover.unsplit(rest);
            }
        }
    }
}

/// A resumable CONNECT handshake driven by readiness events.
///
/// `do_work` never blocks. It is called again after every
/// [`Progress::NeedsRead`] or [`Progress::NeedsWrite`] and keeps
/// returning [`Progress::Done`] once the handshake is over. After an
/// error the handler stops advancing.
pub trait ConnectHandler {
    fn do_work<S: Socket>(&mut self, socket: &mut S) -> Result<Progress>;

    fn state(&self) -> &ConnectState;

    fn state_mut(&mut self) -> &mut ConnectState;

    fn connect_request(&self) -> &RequestHeader {
        &self.state().request
    }

    fn connect_request_mut(&mut self) -> &mut RequestHeader {
        &mut self.state_mut().request
    }

    fn connect_response(&self) -> HeldRef<'_, ResponseHeader> {
        self.state().response.get()
    }

    fn connect_response_mut(&mut self) -> HeldMut<'_, ResponseHeader> {
        self.state_mut().response.get_mut()
    }

    /// Uses an external response header from now on. The handler drops
    /// its own header and never frees the external one.
    fn set_connect_response(&mut self, response: Rc<RefCell<ResponseHeader>>) {
        self.state_mut().response.borrow_from(response);
    }

    fn connect_response_body(&self) -> HeldRef<'_, Vec<u8>> {
        self.state().body.get()
    }

    fn connect_response_body_mut(&mut self) -> HeldMut<'_, Vec<u8>> {
        self.state_mut().body.get_mut()
    }

    /// Uses an external response body from now on. The handler drops
    /// its own body and never frees the external one.
    ///
    /// Set it before the response is sent. Bytes already written are
    /// not resent, and a body shorter than what was written completes
    /// the send as is.
    fn set_connect_response_body(&mut self, body: Rc<RefCell<Vec<u8>>>) {
        self.state_mut().body.borrow_from(body);
    }

    fn owns_connect_response(&self) -> bool {
        self.state().response.is_owned()
    }

    fn owns_connect_response_body(&self) -> bool {
        self.state().body.is_owned()
    }

    fn connect_request_parse_complete(&self) -> bool {
        self.state().request_parse_complete
    }

    fn connect_response_parse_complete(&self) -> bool {
        self.state().response_parse_complete
    }

    fn work_complete(&self) -> bool {
        self.state().work_complete
    }

    /// Takes the bytes that followed the handshake message on the wire
    /// so the tunnel can forward them.
    fn take_leftover(&mut self) -> BytesMut {
        self.state_mut().leftover.split()
    }
}
