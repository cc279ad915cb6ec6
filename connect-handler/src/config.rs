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

// # Upstream proxy configuration
//
// Parses upstream proxy configuration strings of the form
// `[protocol://][username:password@]host:port` and builds the CONNECT
// request the upstream handler sends, including Basic
// `Proxy-Authorization` when credentials are configured.

use crate::error::Error;
use crate::header::RequestHeader;
use crate::upstream::UpstreamConnectHandler;
use base64::{engine::general_purpose, Engine as _};
use http::header::{HeaderValue, HOST, PROXY_AUTHORIZATION};
use regex::Regex;
use std::net::{SocketAddr, ToSocketAddrs};

/// Upstream proxy configuration
pub struct ProxyConfig {
    pub protocol: String,
    pub addr: SocketAddr,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ProxyConfig {
    /// Parses a proxy configuration string and returns a `ProxyConfig` struct.
    ///
    /// The function expects the proxy configuration string to be in the following format:
    ///
    /// ```
    /// [protocol://][username:password@]host:port
    /// ```
    ///
    /// where:
    ///
    /// * `protocol`: The network protocol. If not provided, defaults to `http`.
    /// * `username`: and `password` are optional credentials for authentication.
    /// * `host`: The hostname or IP address of the proxy server. If
    /// it's an IPv6 address, it should be enclosed in square brackets
    /// (e.g., "[::1]").
    /// * `port`: The port number on which the proxy server is listening.
    ///
    /// # Errors
    /// Returns a `Error` if the input string is not in a
    /// valid format or if the hostname/port resolution fails.
    ///
    /// # Limitations
    /// * Usernames and passwords cannot contain `@` or `:`.
    pub fn from_string(config_string: &str) -> Result<ProxyConfig, Error> {
        let re = Regex::new(r"^(?:(?P<protocol>\w+)://)?(?:(?P<user>\w+):(?P<pass>\w+)@)?(?P<host>(?:[\w\.-]+|\[[^\]]+\])):(?P<port>\d+)$")
            .map_err(|_| Error::MalformedConfigString)?;
        let caps = re.captures(config_string).ok_or(Error::MalformedConfigString)?;

        let protocol =
            caps.name("protocol").map_or_else(|| "http".to_string(), |m| m.as_str().to_string());
        let username = caps.name("user").map(|m| m.as_str().to_string());
        let password = caps.name("pass").map(|m| m.as_str().to_string());

        // Extract host, removing surrounding brackets if present
        let hostname = caps
            .name("host")
            .ok_or(Error::MalformedConfigString)?
            .as_str()
            .trim_matches(|c| c == '[' || c == ']')
            .to_string();

        let port = caps
            .name("port")
            .ok_or(Error::MalformedConfigString)?
            .as_str()
            .parse::<u16>()
            .map_err(|_| Error::InvalidPortNumber)?;

        let host = (hostname, port)
            .to_socket_addrs()
            .map_err(|_| Error::InvalidHost)?
            .next() // Take the first resolved address
            .ok_or(Error::InvalidHost)?
            .ip();

        Ok(ProxyConfig { protocol, username, password, addr: SocketAddr::from((host, port)) })
    }

    /// Builds the CONNECT request for tunnelling to `target` (`host:port`)
    /// through this proxy.
    pub fn connect_request(&self, target: &str) -> Result<RequestHeader, Error> {
        let mut request = RequestHeader::connect(target);
        let host = HeaderValue::from_str(target).map_err(|_| Error::InvalidHost)?;
        request.headers.insert(HOST, host);

        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            let encoded_auth = base64_encode(format!("{}:{}", username, password).as_bytes());
            let mut auth = b"Basic ".to_vec();
            auth.extend_from_slice(&encoded_auth);
            let auth = HeaderValue::from_bytes(&auth).map_err(|_| Error::MalformedConfigString)?;
            request.headers.insert(PROXY_AUTHORIZATION, auth);
        }
        Ok(request)
    }

    /// An upstream handler that tunnels to `target` through this proxy.
    pub fn upstream_handler(&self, target: &str) -> Result<UpstreamConnectHandler, Error> {
        Ok(UpstreamConnectHandler::new(self.connect_request(target)?))
    }
}

fn base64_encode(src: &[u8]) -> Vec<u8> {
    general_purpose::STANDARD.encode(src).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use crate::header::HeaderMessage;
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    #[test]
    fn parse_configuration_string_success() {
        let data = [
            ("127.0.0.1:8080", "http", SocketAddr::from((Ipv4Addr::new(127, 0, 0, 1), 8080)), None),
            (
                "https://127.0.0.1:8080",
                "https",
                SocketAddr::from((Ipv4Addr::new(127, 0, 0, 1), 8080)),
                None,
            ),
            (
                "user:pass@192.168.0.18:3128",
                "http",
                SocketAddr::from((Ipv4Addr::new(192, 168, 0, 18), 3128)),
                Some(("user", "pass")),
            ),
            (
                "[::1]:7000",
                "http",
                SocketAddr::from((IpAddr::V6(Ipv6Addr::LOCALHOST), 7000)),
                None,
            ),
        ];

        for (input, protocol, addr, credentials) in data {
            let result = ProxyConfig::from_string(input);
            assert!(result.is_ok(), "Unexpected error {} for input: {}", result.err().unwrap(), input);
            let result = result.ok().unwrap();
            assert_eq!(result.protocol, protocol, "For input: {}", input);
            assert_eq!(result.addr, addr, "For input: {}", input);
            assert_eq!(result.username.as_deref(), credentials.map(|c| c.0), "For input: {}", input);
            assert_eq!(result.password.as_deref(), credentials.map(|c| c.1), "For input: {}", input);
        }
    }

    #[test]
    fn parse_configuration_string_with_errors() {
        let data = [
            ("http://", Error::MalformedConfigString),
            ("", Error::MalformedConfigString),
            ("256.0.0.1:8080", Error::InvalidHost),
            ("127.0.0.1:foo", Error::MalformedConfigString),
            ("127.0.0.1:100000", Error::InvalidPortNumber),
            ("127.0.0.1", Error::MalformedConfigString),
            ("user@127.0.0.1:8080", Error::MalformedConfigString),
            ("[::1}:7000", Error::MalformedConfigString),
        ];

        for (input, expected_error) in data {
            let result = ProxyConfig::from_string(input);
            assert_eq!(
                result.err().unwrap().to_string(),
                expected_error.to_string(),
                "Expected an error for input: {}",
                input
            );
        }
    }

    #[test]
    fn connect_request_without_credentials() {
        let config = ProxyConfig::from_string("127.0.0.1:3128").unwrap();
        let request = config.connect_request("example.com:443").unwrap();

        let mut buf = BytesMut::new();
        request.print(&mut buf);
        assert_eq!(&buf[..], b"CONNECT example.com:443 HTTP/1.1\r\nhost: example.com:443\r\n\r\n");
    }

    #[test]
    fn connect_request_with_credentials() {
        let config = ProxyConfig::from_string("user:password@127.0.0.1:3128").unwrap();
        let request = config.connect_request("example.com:443").unwrap();
        assert_eq!(
            request.headers.get(PROXY_AUTHORIZATION).unwrap(),
            "Basic dXNlcjpwYXNzd29yZA=="
        );
        assert_eq!(request.host(), "example.com");
    }

    #[test]
    fn test_proxy_base64_encode() {
        assert_eq!(base64_encode(b"hello world"), b"aGVsbG8gd29ybGQ=");
        assert_eq!(base64_encode(b""), b"");
    }
}
