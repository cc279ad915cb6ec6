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

// # CONNECT header objects
//
// Request and response header objects exchanged during the CONNECT
// handshake. Parsing is delegated to `httparse` and runs over the
// whole staged byte range on every attempt, so the parsed result does
// not depend on how the bytes arrived. Printing writes HTTP/1.x wire
// format into a `BytesMut`.

use crate::error::{Error, Result};
use bytes::{BufMut, BytesMut};
use http::header::{HeaderName, HeaderValue, CONTENT_LENGTH, HOST};
use http::{HeaderMap, Method, StatusCode, Version};
use httparse::Status;

/// A header object that can be parsed from and printed to the wire.
pub trait HeaderMessage {
    /// Parses `bytes` into `self` using `slots` as header storage.
    ///
    /// `self` is only updated when the parse completes.
    fn parse_from<'b>(
        &mut self,
        bytes: &'b [u8],
        slots: &mut [httparse::Header<'b>],
    ) -> Result<Status<usize>>;

    /// Appends the wire format of `self` to `buf` and returns the
    /// number of bytes written.
    fn print(&self, buf: &mut BytesMut) -> usize;
}

/// A CONNECT request: `CONNECT host:port HTTP/1.1`.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestHeader {
    pub method: Method,
    pub target: String,
    pub version: Version,
    pub headers: HeaderMap,
}

impl Default for RequestHeader {
    fn default() -> Self {
        RequestHeader {
            method: Method::CONNECT,
            target: String::new(),
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
        }
    }
}

impl RequestHeader {
    pub fn connect(target: impl Into<String>) -> Self {
        RequestHeader { target: target.into(), ..Default::default() }
    }

    /// Host part of the request target, falling back to the `Host`
    /// field. Empty when neither is set.
    pub fn host(&self) -> &str {
        let authority = if self.target.is_empty() {
            self.headers.get(HOST).and_then(|v| v.to_str().ok()).unwrap_or("")
        } else {
            self.target.as_str()
        };
        host_of(authority)
    }

    pub fn content_length(&self) -> Result<Option<u64>> {
        content_length(&self.headers)
    }
}

impl HeaderMessage for RequestHeader {
    fn parse_from<'b>(
        &mut self,
        bytes: &'b [u8],
        slots: &mut [httparse::Header<'b>],
    ) -> Result<Status<usize>> {
        let mut req = httparse::Request::new(slots);
        let consumed = match req.parse(bytes)? {
            Status::Partial => return Ok(Status::Partial),
            Status::Complete(consumed) => consumed,
        };

        let method = req.method.ok_or_else(|| Error::InvalidHeader("missing method".into()))?;
        self.method = Method::from_bytes(method.as_bytes())
            .map_err(|_| Error::InvalidHeader(format!("bad method {}", method)))?;
        self.target = req.path.unwrap_or_default().to_string();
        self.version = version_of(req.version);
        self.headers = header_map(req.headers)?;
        Ok(Status::Complete(consumed))
    }

    fn print(&self, buf: &mut BytesMut) -> usize {
        let start = buf.len();
        buf.put_slice(self.method.as_str().as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(self.target.as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(version_str(self.version).as_bytes());
        buf.put_slice(b"\r\n");
        print_fields(&self.headers, buf);
        buf.len() - start
    }
}

/// A CONNECT response: `HTTP/1.1 200 Connection established`.
#[derive(Clone, Debug, PartialEq)]
pub struct ResponseHeader {
    pub version: Version,
    pub status: StatusCode,
    /// Reason phrase. `None` until parsed or set explicitly.
    pub reason: Option<String>,
    pub headers: HeaderMap,
}

impl Default for ResponseHeader {
    fn default() -> Self {
        ResponseHeader::new(StatusCode::OK)
    }
}

impl ResponseHeader {
    pub fn new(status: StatusCode) -> Self {
        ResponseHeader { version: Version::HTTP_11, status, reason: None, headers: HeaderMap::new() }
    }

    pub fn content_length(&self) -> Result<Option<u64>> {
        content_length(&self.headers)
    }

    pub fn set_content_length(&mut self, length: u64) {
        self.headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    }

    /// Fills in the standard reason phrase for the status when no
    /// reason has been set.
    pub fn default_reason(&mut self) {
        if self.reason.as_deref().map_or(true, str::is_empty) {
            self.reason = Some(self.status.canonical_reason().unwrap_or("").to_string());
        }
    }
}

impl HeaderMessage for ResponseHeader {
    fn parse_from<'b>(
        &mut self,
        bytes: &'b [u8],
        slots: &mut [httparse::Header<'b>],
    ) -> Result<Status<usize>> {
        let mut resp = httparse::Response::new(slots);
        let consumed = match resp.parse(bytes)? {
            Status::Partial => return Ok(Status::Partial),
            Status::Complete(consumed) => consumed,
        };

        let code = resp.code.ok_or_else(|| Error::InvalidHeader("missing status".into()))?;
        self.status = StatusCode::from_u16(code)
            .map_err(|_| Error::InvalidHeader(format!("bad status {}", code)))?;
        self.reason = resp.reason.filter(|r| !r.is_empty()).map(str::to_string);
        self.version = version_of(resp.version);
        self.headers = header_map(resp.headers)?;
        Ok(Status::Complete(consumed))
    }

    fn print(&self, buf: &mut BytesMut) -> usize {
        let start = buf.len();
        buf.put_slice(version_str(self.version).as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(self.status.as_str().as_bytes());
        buf.put_u8(b' ');
        if let Some(reason) = &self.reason {
            buf.put_slice(reason.as_bytes());
        }
        buf.put_slice(b"\r\n");
        print_fields(&self.headers, buf);
        buf.len() - start
    }
}

fn print_fields(headers: &HeaderMap, buf: &mut BytesMut) {
    for (name, value) in headers {
        buf.put_slice(name.as_str().as_bytes());
        buf.put_slice(b": ");
        buf.put_slice(value.as_bytes());
        buf.put_slice(b"\r\n");
    }
    buf.put_slice(b"\r\n");
}

fn header_map(parsed: &[httparse::Header<'_>]) -> Result<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(parsed.len());
    for h in parsed {
        let name = HeaderName::from_bytes(h.name.as_bytes())
            .map_err(|_| Error::InvalidHeader(format!("bad field name {}", h.name)))?;
        let value = HeaderValue::from_bytes(h.value)
            .map_err(|_| Error::InvalidHeader(format!("bad value for {}", h.name)))?;
        headers.append(name, value);
    }
    Ok(headers)
}

fn content_length(headers: &HeaderMap) -> Result<Option<u64>> {
    match headers.get(CONTENT_LENGTH) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Some)
            .ok_or_else(|| Error::InvalidHeader("bad content-length".into())),
    }
}

fn version_of(minor: Option<u8>) -> Version {
    match minor {
        Some(0) => Version::HTTP_10,
        _ => Version::HTTP_11,
    }
}

fn version_str(version: Version) -> &'static str {
    if version == Version::HTTP_10 {
        "HTTP/1.0"
    } else {
        "HTTP/1.1"
    }
}

/// Strips the port and any IPv6 brackets from an authority.
fn host_of(authority: &str) -> &str {
    if let Some(rest) = authority.strip_prefix('[') {
        return rest.split(']').next().unwrap_or("");
    }
    match authority.rsplit_once(':') {
        Some((host, port)) if port.bytes().all(|b| b.is_ascii_digit()) => host,
        _ => authority,
    }
}
