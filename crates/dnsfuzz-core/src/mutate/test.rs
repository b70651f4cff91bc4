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
 *  Tests for the payload catalog.
 */

use super::*;
use crate::dns::parse;

fn with_txid_zero(mut payload: Vec<u8>) -> Vec<u8> {
    if payload.len() >= 2 {
        payload[0] = 0;
        payload[1] = 0;
    }
    payload
}

#[test]
fn test_same_seed_same_bytes() {
    for strategy in Strategy::ALL {
        assert_eq!(
            strategy.generate(42),
            strategy.generate(42),
            "{} is not deterministic",
            strategy
        );
    }
}

#[test]
fn test_fixed_lengths() {
    let expected = [
        (Strategy::Empty, 0),
        (Strategy::ShortHeader, 4),
        (Strategy::TruncatedHeader, 6),
        (Strategy::NullBytesLarge, 512),
        (Strategy::CompressionLoop, 18),
        (Strategy::CompressionLoopChain, 21),
        (Strategy::NestedCompression, 24),
        (Strategy::InvalidCounts, 12),
        (Strategy::QuestionCountMax, 12),
        (Strategy::AdditionalCountMax, 12),
        (Strategy::MissingQuestion, 12),
        (Strategy::LabelOverflow, 12 + 1 + 10 + 1 + 4),
        (Strategy::LongLabel, 12 + 1 + 100 + 1 + 4),
        (Strategy::NameTooLong, 12 + 5 * 64 + 1 + 4),
        (Strategy::LabelCountOverflow, 12 + 500 + 1 + 4),
        (Strategy::OversizedMedium, 10000),
        (Strategy::OversizedMax, 65507),
    ];
    for (strategy, len) in expected {
        for seed in [0, 1, 0xDEAD_BEEF] {
            assert_eq!(strategy.generate(seed).len(), len, "{}", strategy);
        }
    }
}

/// Header with a zero txid, RD set, and the given counts.
fn header(counts: [u16; 4]) -> Vec<u8> {
    let mut v = vec![0x00, 0x00, 0x01, 0x00];
    for c in counts {
        v.extend_from_slice(&c.to_be_bytes());
    }
    v
}

/// A single question made of `name` followed by IN A.
fn question(name: &[u8]) -> Vec<u8> {
    let mut v = header([1, 0, 0, 0]);
    v.extend_from_slice(name);
    v.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]);
    v
}

fn labels(count: usize, len: u8) -> Vec<u8> {
    let mut v = vec![];
    for _ in 0..count {
        v.push(len);
        v.extend(std::iter::repeat(b'A').take(len as usize));
    }
    v.push(0x00);
    v
}

#[test]
fn test_fixed_payload_bytes() {
    let mut overflow = vec![0xFF];
    overflow.extend_from_slice(&[b'A'; 10]);
    overflow.push(0x00);

    let expected: Vec<(Strategy, Vec<u8>)> = vec![
        (Strategy::Empty, vec![]),
        (Strategy::ShortHeader, vec![0x00, 0x00, 0x01, 0x00]),
        (Strategy::TruncatedHeader, vec![0x00, 0x00, 0x01, 0x00, 0x00, 0x01]),
        (Strategy::NullBytesLarge, vec![0x00; 512]),
        (
            Strategy::CompressionLoopChain,
            question(&[0xC0, 0x0E, 0xC0, 0x0C, 0x00]),
        ),
        (Strategy::InvalidCounts, header([0xFFFF; 4])),
        (Strategy::QuestionCountMax, header([0xFFFF, 0, 0, 0])),
        (Strategy::AdditionalCountMax, header([0, 0, 0, 0xFFFF])),
        (Strategy::MissingQuestion, header([1, 0, 0, 0])),
        (Strategy::LabelOverflow, question(&overflow)),
        (Strategy::NegativeLength, question(&overflow)),
        (Strategy::LongLabel, question(&labels(1, 100))),
        (Strategy::NameTooLong, question(&labels(5, 63))),
        (Strategy::LabelCountOverflow, question(&labels(250, 1))),
        (Strategy::OversizedMedium, vec![0xFF; 10000]),
        (Strategy::OversizedMax, vec![0xFF; 65507]),
    ];
    for (strategy, bytes) in expected {
        for seed in [0, 77, u64::MAX] {
            let payload = strategy.generate(seed).to_vec();
            // The oversized and noise payloads have no txid to zero.
            let payload = match strategy.category() {
                Category::Oversized | Category::Noise => payload,
                _ => with_txid_zero(payload),
            };
            assert!(payload == bytes, "{} (seed {}) changed shape", strategy, seed);
        }
    }
}

#[test]
fn test_categories() {
    use Category::*;
    let families = [
        (Truncation, vec!["empty", "short_header", "truncated_header"]),
        (Noise, vec!["null_bytes", "null_bytes_large", "garbage"]),
        (
            Compression,
            vec!["compression_loop", "compression_loop_chain", "nested_compression"],
        ),
        (
            CountDesync,
            vec![
                "invalid_counts",
                "question_count_max",
                "additional_count_max",
                "missing_question",
            ],
        ),
        (
            Label,
            vec![
                "label_overflow",
                "negative_length",
                "long_label",
                "name_too_long",
                "label_count_overflow",
            ],
        ),
        (Semantic, vec!["invalid_qtype", "qtype_sweep"]),
        (Oversized, vec!["oversized_medium", "oversized_max"]),
    ];
    let mut seen = 0;
    for (category, names) in families {
        for name in names {
            let strategy: Strategy = name.parse().unwrap();
            assert_eq!(strategy.category(), category, "{}", name);
            seen += 1;
        }
    }
    assert_eq!(seen, Strategy::ALL.len());
    assert_eq!(
        Packet::from_strategy(Strategy::CompressionLoop, 4).to_string(),
        "compression_loop [compression] (seed 4, 18 bytes over UDP)"
    );
    assert_eq!(
        Packet::from_name("no_such_strategy", 4).to_string(),
        "no_such_strategy (seed 4, 0 bytes over UDP)"
    );
}

#[test]
fn test_seeded_lengths_in_range() {
    for seed in 0..200 {
        let n = Strategy::NullBytes.generate(seed);
        assert!((12..=100).contains(&n.len()));
        assert!(n.iter().all(|&b| b == 0));
        let g = Strategy::Garbage.generate(seed);
        assert!((1..=512).contains(&g.len()));
    }
}

#[test]
fn test_compression_loop_fixture() {
    let fixture = [
        0x00, 0x00, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xC0, 0x0C, 0x00,
        0x01, 0x00, 0x01,
    ];
    let payload = with_txid_zero(Strategy::CompressionLoop.generate(7).to_vec());
    assert_eq!(payload, fixture);
}

#[test]
fn test_compression_family_has_loop_candidates() {
    for strategy in [
        Strategy::CompressionLoop,
        Strategy::CompressionLoopChain,
        Strategy::NestedCompression,
    ] {
        let payload = strategy.generate(1);
        let pointers = parse::compression_pointers(&payload);
        assert!(
            pointers.iter().any(|p| p.is_loop_candidate()),
            "{} has no pointer at or after its own offset: {:?}",
            strategy,
            pointers
        );
        // And something pointing back to close the cycle.
        assert!(
            pointers.iter().any(|p| p.target <= p.offset),
            "{} has no pointer back to or before its own offset: {:?}",
            strategy,
            pointers
        );
        // The harness's own decoder must refuse these rather than spin.
        assert!(parse::PktParser::new(&payload).get_query().is_err());
    }
}

#[test]
fn test_nested_compression_layout() {
    let pointers = parse::compression_pointers(&Strategy::NestedCompression.generate(3));
    assert_eq!(
        &pointers[..2],
        &[
            parse::Pointer {
                offset: 12,
                target: 18
            },
            parse::Pointer {
                offset: 18,
                target: 12
            },
        ]
    );
}

#[test]
fn test_invalid_counts() {
    let payload = Strategy::InvalidCounts.generate(9);
    assert_eq!(&payload[4..], &[0xFF; 8]);
}

#[test]
fn test_negative_length_matches_label_overflow() {
    assert_eq!(
        Strategy::NegativeLength.generate(5),
        Strategy::LabelOverflow.generate(5)
    );
}

#[test]
fn test_qtype_sweep_follows_seed() {
    for seed in [0u64, 1, 28, 255, 256, 511] {
        let payload = Strategy::QtypeSweep.generate(seed);
        let msg = parse::PktParser::new(&payload).get_query().unwrap();
        assert_eq!(msg.questions[0].qtype, dnspkt::Type((seed % 256) as u16));
        assert_eq!(msg.questions[0].qdomain.to_string(), "host1.zone1.test");
    }
}

#[test]
fn test_invalid_qtype_is_otherwise_valid() {
    let payload = Strategy::InvalidQtype.generate(0);
    let msg = parse::PktParser::new(&payload).get_query().unwrap();
    assert_eq!(msg.questions[0].qtype, dnspkt::Type(65535));
    assert_eq!(msg.questions[0].qdomain.to_string(), "test.zone1.test");
}

#[test]
fn test_names_roundtrip() {
    for strategy in Strategy::ALL {
        assert_eq!(strategy.name().parse::<Strategy>().unwrap(), strategy);
    }
    assert_eq!(Strategy::ALL[Strategy::OversizedMax.index()], Strategy::OversizedMax);
}

#[test]
fn test_unknown_name_is_empty() {
    assert!(payload_for_name("no_such_strategy", 1).is_empty());
    let p = Packet::from_name("no_such_strategy", 1);
    assert!(p.is_empty());
    assert_eq!(p.strategy, "no_such_strategy");
}

#[test]
fn test_valid_query_uses_seeded_id() {
    let domain: dnspkt::Domain = "host1.zone1.test".parse().unwrap();
    let a = valid_query(&domain, dnspkt::RR_A, 10).unwrap();
    let b = valid_query(&domain, dnspkt::RR_A, 10).unwrap();
    assert_eq!(a, b);
    let msg = parse::PktParser::new(&a).get_query().unwrap();
    assert_eq!(msg.header.flags, dnspkt::FLAGS_QUERY_RD);
    assert_eq!(msg.questions.len(), 1);
}
