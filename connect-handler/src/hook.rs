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

use crate::incoming::IncomingConnectHandler;

/// Notified once an incoming CONNECT request has been parsed.
///
/// Runs synchronously before the response is built, so it may change
/// the response status, reason, fields and body, or swap in external
/// ones with `set_connect_response`/`set_connect_response_body`.
pub trait ConnectHook {
    fn connect_received(&self, handler: &mut IncomingConnectHandler);
}

impl<F> ConnectHook for F
where
    F: Fn(&mut IncomingConnectHandler),
{
    fn connect_received(&self, handler: &mut IncomingConnectHandler) {
        self(handler)
    }
}
