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
 *  Catalog of malformed DNS payloads.
 */

/* Every strategy is a pure function of a seed.  The seed picks the transaction id and, for the
 * handful of strategies that need them, lengths and contents.  Given the same seed a strategy
 * always produces the same bytes, so a culprit can be reproduced from the name and seed printed
 * in the report.
 *
 * Most of these are assembled by hand rather than through dnspkt, since the whole point is to
 * produce things dnspkt would never emit.
 */

#[cfg(test)]
mod test;

use crate::dns::dnspkt;
use bytes::{BufMut as _, Bytes, BytesMut};
use dnsfuzz_net::Transport;
use rand::{Rng as _, SeedableRng as _};

/// qtype + qclass for IN A.
const TAIL_A_IN: [u8; 4] = [0x00, 0x01, 0x00, 0x01];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    Truncation,
    Noise,
    Compression,
    CountDesync,
    Label,
    Semantic,
    Oversized,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        use Category::*;
        match self {
            Truncation => write!(f, "truncation"),
            Noise => write!(f, "noise"),
            Compression => write!(f, "compression"),
            CountDesync => write!(f, "count desync"),
            Label => write!(f, "label"),
            Semantic => write!(f, "semantic"),
            Oversized => write!(f, "oversized"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Strategy {
    Empty,
    ShortHeader,
    TruncatedHeader,
    NullBytes,
    NullBytesLarge,
    Garbage,
    CompressionLoop,
    CompressionLoopChain,
    NestedCompression,
    InvalidCounts,
    QuestionCountMax,
    AdditionalCountMax,
    MissingQuestion,
    LabelOverflow,
    NegativeLength,
    LongLabel,
    NameTooLong,
    LabelCountOverflow,
    InvalidQtype,
    QtypeSweep,
    OversizedMedium,
    OversizedMax,
}

impl Strategy {
    /// The whole catalog, in the order it is exercised.
    pub const ALL: [Strategy; 22] = [
        Strategy::Empty,
        Strategy::ShortHeader,
        Strategy::TruncatedHeader,
        Strategy::NullBytes,
        Strategy::NullBytesLarge,
        Strategy::Garbage,
        Strategy::CompressionLoop,
        Strategy::CompressionLoopChain,
        Strategy::NestedCompression,
        Strategy::InvalidCounts,
        Strategy::QuestionCountMax,
        Strategy::AdditionalCountMax,
        Strategy::MissingQuestion,
        Strategy::LabelOverflow,
        Strategy::NegativeLength,
        Strategy::LongLabel,
        Strategy::NameTooLong,
        Strategy::LabelCountOverflow,
        Strategy::InvalidQtype,
        Strategy::QtypeSweep,
        Strategy::OversizedMedium,
        Strategy::OversizedMax,
    ];

    pub fn name(&self) -> &'static str {
        use Strategy::*;
        match self {
            Empty => "empty",
            ShortHeader => "short_header",
            TruncatedHeader => "truncated_header",
            NullBytes => "null_bytes",
            NullBytesLarge => "null_bytes_large",
            Garbage => "garbage",
            CompressionLoop => "compression_loop",
            CompressionLoopChain => "compression_loop_chain",
            NestedCompression => "nested_compression",
            InvalidCounts => "invalid_counts",
            QuestionCountMax => "question_count_max",
            AdditionalCountMax => "additional_count_max",
            MissingQuestion => "missing_question",
            LabelOverflow => "label_overflow",
            NegativeLength => "negative_length",
            LongLabel => "long_label",
            NameTooLong => "name_too_long",
            LabelCountOverflow => "label_count_overflow",
            InvalidQtype => "invalid_qtype",
            QtypeSweep => "qtype_sweep",
            OversizedMedium => "oversized_medium",
            OversizedMax => "oversized_max",
        }
    }

    pub fn category(&self) -> Category {
        use Strategy::*;
        match self {
            Empty | ShortHeader | TruncatedHeader => Category::Truncation,
            NullBytes | NullBytesLarge | Garbage => Category::Noise,
            CompressionLoop | CompressionLoopChain | NestedCompression => Category::Compression,
            InvalidCounts | QuestionCountMax | AdditionalCountMax | MissingQuestion => {
                Category::CountDesync
            }
            LabelOverflow | NegativeLength | LongLabel | NameTooLong | LabelCountOverflow => {
                Category::Label
            }
            InvalidQtype | QtypeSweep => Category::Semantic,
            OversizedMedium | OversizedMax => Category::Oversized,
        }
    }

    /// Position in `ALL`.
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Build the payload for this strategy.
    pub fn generate(&self, seed: u64) -> Bytes {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let txid: u16 = rng.gen();
        let mut buf = BytesMut::new();
        use Strategy::*;
        match self {
            Empty => (),
            ShortHeader => {
                buf.put_u16(txid);
                buf.put_u16(dnspkt::FLAGS_QUERY_RD);
            }
            TruncatedHeader => {
                buf.put_u16(txid);
                buf.put_u16(dnspkt::FLAGS_QUERY_RD);
                buf.put_u16(1);
            }
            NullBytes => {
                let n = rng.gen_range(12..=100);
                buf.put_bytes(0x00, n);
            }
            NullBytesLarge => buf.put_bytes(0x00, 512),
            Garbage => {
                let n = rng.gen_range(1..=512);
                let mut noise = vec![0u8; n];
                rng.fill(noise.as_mut_slice());
                buf.put_slice(&noise);
            }
            CompressionLoop => {
                // A pointer at offset 12 to offset 12.
                put_header(&mut buf, txid, [1, 0, 0, 0]);
                buf.put_slice(&[0xC0, 0x0C]);
                buf.put_slice(&TAIL_A_IN);
            }
            CompressionLoopChain => {
                // 12 -> 14 -> 12.
                put_header(&mut buf, txid, [1, 0, 0, 0]);
                buf.put_slice(&[0xC0, 0x0E, 0xC0, 0x0C, 0x00]);
                buf.put_slice(&TAIL_A_IN);
            }
            NestedCompression => {
                // The first question points at the second, which points back at the first.
                put_header(&mut buf, txid, [2, 0, 0, 0]);
                buf.put_slice(&[0xC0, 0x12]);
                buf.put_slice(&TAIL_A_IN);
                buf.put_slice(&[0xC0, 0x0C]);
                buf.put_slice(&TAIL_A_IN);
            }
            InvalidCounts => put_header(&mut buf, txid, [0xFFFF; 4]),
            QuestionCountMax => put_header(&mut buf, txid, [0xFFFF, 0, 0, 0]),
            AdditionalCountMax => put_header(&mut buf, txid, [0, 0, 0, 0xFFFF]),
            MissingQuestion => put_header(&mut buf, txid, [1, 0, 0, 0]),
            LabelOverflow | NegativeLength => {
                // 0xFF read as a label length, whether signed or unsigned, runs off the end.
                put_header(&mut buf, txid, [1, 0, 0, 0]);
                buf.put_u8(0xFF);
                buf.put_bytes(b'A', 10);
                buf.put_u8(0x00);
                buf.put_slice(&TAIL_A_IN);
            }
            LongLabel => {
                put_header(&mut buf, txid, [1, 0, 0, 0]);
                buf.put_u8(100);
                buf.put_bytes(b'A', 100);
                buf.put_u8(0x00);
                buf.put_slice(&TAIL_A_IN);
            }
            NameTooLong => {
                put_header(&mut buf, txid, [1, 0, 0, 0]);
                for _ in 0..5 {
                    buf.put_u8(63);
                    buf.put_bytes(b'A', 63);
                }
                buf.put_u8(0x00);
                buf.put_slice(&TAIL_A_IN);
            }
            LabelCountOverflow => {
                put_header(&mut buf, txid, [1, 0, 0, 0]);
                for _ in 0..250 {
                    buf.put_slice(&[0x01, b'A']);
                }
                buf.put_u8(0x00);
                buf.put_slice(&TAIL_A_IN);
            }
            InvalidQtype => put_query(&mut buf, txid, &["test", "zone1", "test"], 0xFFFF),
            QtypeSweep => put_query(
                &mut buf,
                txid,
                &["host1", "zone1", "test"],
                (seed % 256) as u16,
            ),
            OversizedMedium => buf.put_bytes(0xFF, 10000),
            OversizedMax => buf.put_bytes(0xFF, dnsfuzz_net::MAX_UDP_PAYLOAD),
        }
        buf.freeze()
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Strategy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Strategy::ALL
            .iter()
            .find(|st| st.name() == s)
            .copied()
            .ok_or_else(|| format!("Unknown strategy {:?}", s))
    }
}

fn put_header(buf: &mut BytesMut, txid: u16, counts: [u16; 4]) {
    buf.put_u16(txid);
    buf.put_u16(dnspkt::FLAGS_QUERY_RD);
    for c in counts {
        buf.put_u16(c);
    }
}

/// A well formed single question query.  Only for fixed, short labels.
fn put_query(buf: &mut BytesMut, txid: u16, labels: &[&str], qtype: u16) {
    put_header(buf, txid, [1, 0, 0, 0]);
    for l in labels {
        buf.put_u8(l.len() as u8);
        buf.put_slice(l.as_bytes());
    }
    buf.put_u8(0x00);
    buf.put_u16(qtype);
    buf.put_u16(dnspkt::CLASS_IN.0);
}

/// Look up a strategy by name and build its payload.  Unknown names produce an empty payload.
pub fn payload_for_name(name: &str, seed: u64) -> Bytes {
    match name.parse::<Strategy>() {
        Ok(strategy) => strategy.generate(seed),
        Err(_) => Bytes::new(),
    }
}

/// A well formed IN query for `domain`, with the transaction id drawn from `seed`.
pub fn valid_query(
    domain: &dnspkt::Domain,
    qtype: dnspkt::Type,
    seed: u64,
) -> Result<Bytes, dnspkt::Error> {
    let qid = rand::rngs::StdRng::seed_from_u64(seed).gen();
    query_with_id(domain, qtype, qid)
}

pub fn query_with_id(
    domain: &dnspkt::Domain,
    qtype: dnspkt::Type,
    qid: u16,
) -> Result<Bytes, dnspkt::Error> {
    dnspkt::Message::query(
        qid,
        dnspkt::Question {
            qdomain: domain.clone(),
            qtype,
            qclass: dnspkt::CLASS_IN,
        },
    )
    .serialise()
    .map(Bytes::from)
}

pub const VALID_QUERY: &str = "valid_query";

/// A payload ready to send, and where it came from.
#[derive(Clone, Debug)]
pub struct Packet {
    pub strategy: String,
    pub seed: u64,
    pub payload: Bytes,
    pub transport: Transport,
}

impl Packet {
    pub fn from_strategy(strategy: Strategy, seed: u64) -> Self {
        Self {
            strategy: strategy.name().into(),
            seed,
            payload: strategy.generate(seed),
            transport: Transport::Udp,
        }
    }

    /// Build a packet from a strategy name that may not be in the catalog.
    pub fn from_name(name: &str, seed: u64) -> Self {
        if name.parse::<Strategy>().is_err() {
            log::warn!("Unknown strategy {:?}, sending an empty payload", name);
        }
        Self {
            strategy: name.into(),
            seed,
            payload: payload_for_name(name, seed),
            transport: Transport::Udp,
        }
    }

    pub fn query(
        domain: &dnspkt::Domain,
        qtype: dnspkt::Type,
        seed: u64,
    ) -> Result<Self, dnspkt::Error> {
        Ok(Self {
            strategy: VALID_QUERY.into(),
            seed,
            payload: valid_query(domain, qtype, seed)?,
            transport: Transport::Udp,
        })
    }

    pub fn over(self, transport: Transport) -> Self {
        Self { transport, ..self }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

impl std::fmt::Display for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.strategy)?;
        if let Ok(strategy) = self.strategy.parse::<Strategy>() {
            write!(f, " [{}]", strategy.category())?;
        }
        write!(
            f,
            " (seed {}, {} bytes over {})",
            self.seed,
            self.payload.len(),
            self.transport
        )
    }
}
