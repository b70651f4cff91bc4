/*   Copyright 2026 The dnsfuzz Authors
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 *
 *  SPDX-License-Identifier: Apache-2.0
 *
 *  Delivery of raw payloads to a DNS server.
 */

// Everything in here is about getting bytes onto the wire and (optionally) a few bytes back.
// Nothing in here looks inside a payload: callers hand us whatever they built, valid or not.
//
// Every operation is bounded by a timeout, and every socket is owned by the call (or the value)
// that created it, so it is closed on every return path.

pub mod tcp;
pub mod udp;

/// Largest payload that fits in a single UDP/IPv4 datagram.
pub const MAX_UDP_PAYLOAD: usize = 65507;
/// Largest message that can be described by the 2 byte TCP length prefix.
pub const MAX_TCP_MESSAGE: usize = 65535;

#[derive(Debug)]
pub enum Error {
    Bind(std::io::Error),
    Connect(std::io::Error),
    Send(std::io::Error),
    Recv(std::io::Error),
    Timeout(&'static str),
    NoReply,
    TooLarge { size: usize, limit: usize },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use Error::*;
        match self {
            Bind(io) => write!(f, "Failed to bind local socket: {}", io),
            Connect(io) => write!(f, "Failed to connect: {}", io),
            Send(io) => write!(f, "Failed to send: {}", io),
            Recv(io) => write!(f, "Failed to receive: {}", io),
            Timeout(what) => write!(f, "Timed out while {}", what),
            NoReply => write!(f, "Timed out waiting for a reply"),
            TooLarge { size, limit } => write!(
                f,
                "Payload of {} bytes exceeds transport limit of {} bytes",
                size, limit
            ),
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// True if the harness never managed to hand the payload to the network.
    pub fn is_delivery_failure(&self) -> bool {
        !matches!(self, Error::Recv(_) | Error::NoReply)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Transport {
    Udp,
    Tcp,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match &self {
            Transport::Udp => write!(f, "UDP"),
            Transport::Tcp => write!(f, "TCP"),
        }
    }
}

/// The wildcard address of the same family as `target`, for binding ephemeral sockets.
pub(crate) fn unspecified_for(target: &std::net::SocketAddr) -> std::net::SocketAddr {
    match target {
        std::net::SocketAddr::V4(_) => (std::net::Ipv4Addr::UNSPECIFIED, 0).into(),
        std::net::SocketAddr::V6(_) => (std::net::Ipv6Addr::UNSPECIFIED, 0).into(),
    }
}

#[test]
fn test_unspecified_matches_family() {
    let v4: std::net::SocketAddr = "127.0.0.1:53".parse().unwrap();
    let v6: std::net::SocketAddr = "[::1]:53".parse().unwrap();
    assert!(unspecified_for(&v4).is_ipv4());
    assert!(unspecified_for(&v6).is_ipv6());
    assert_eq!(unspecified_for(&v4).port(), 0);
}

#[test]
fn test_delivery_failure_classification() {
    assert!(Error::TooLarge {
        size: 70000,
        limit: MAX_UDP_PAYLOAD
    }
    .is_delivery_failure());
    assert!(Error::Timeout("connecting").is_delivery_failure());
    assert!(!Error::NoReply.is_delivery_failure());
}
