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

use crate::error::Result;
use crate::handler::{ConnectHandler, Progress};
use crate::socket::TokioSocket;
use log::trace;
use tokio::net::TcpStream;

/// Runs `handler` to completion on `stream`, waiting for readiness
/// between `do_work` calls.
///
/// Handlers are not `Send`; run this on a current-thread runtime or in
/// a `LocalSet`.
pub async fn drive<H: ConnectHandler>(handler: &mut H, stream: &TcpStream) -> Result<()> {
    let mut socket = TokioSocket(stream);
    loop {
        match handler.do_work(&mut socket)? {
            Progress::Done => return Ok(()),
            Progress::NeedsRead => {
                trace!(target: "connect_handler", "waiting for read readiness");
                stream.readable().await?;
            }
            Progress::NeedsWrite => {
                trace!(target: "connect_handler", "waiting for write readiness");
                stream.writable().await?;
            }
        }
    }
}
