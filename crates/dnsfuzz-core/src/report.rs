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
 *  Collecting outcomes and writing the final report.
 */

use std::io::Write;

/// Only this much of a culprit payload is dumped.
pub const HEX_DUMP_LIMIT: usize = 256;
pub const HEX_DUMP_WIDTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioOutcome {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

impl ScenarioOutcome {
    pub fn pass(name: &str, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            detail: detail.into(),
        }
    }

    pub fn fail(name: &str, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            detail: detail.into(),
        }
    }
}

/// The payload that took the server down.
#[derive(Debug, Clone)]
pub struct Culprit {
    pub strategy: String,
    pub seed: u64,
    pub payload: bytes::Bytes,
    /// What our own decoder makes of the payload.
    pub verdict: String,
}

#[derive(Debug, Default)]
struct Section {
    title: String,
    outcomes: Vec<ScenarioOutcome>,
}

#[derive(Debug, Default)]
pub struct Report {
    sections: Vec<Section>,
    culprit: Option<Culprit>,
    aborted: Option<String>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new heading; subsequent outcomes are listed under it.
    pub fn begin(&mut self, title: &str) {
        self.sections.push(Section {
            title: title.into(),
            outcomes: vec![],
        });
    }

    pub fn record(&mut self, outcome: ScenarioOutcome) {
        if outcome.passed {
            log::info!("PASS {}: {}", outcome.name, outcome.detail);
        } else {
            log::error!("FAIL {}: {}", outcome.name, outcome.detail);
        }
        if self.sections.is_empty() {
            self.begin("results");
        }
        if let Some(section) = self.sections.last_mut() {
            section.outcomes.push(outcome);
        }
    }

    pub fn set_culprit(&mut self, culprit: Culprit) {
        self.culprit = Some(culprit);
    }

    pub fn culprit(&self) -> Option<&Culprit> {
        self.culprit.as_ref()
    }

    /// The run stopped before it could finish (eg the server was down to begin with).
    pub fn abort(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        log::error!("Aborted: {}", reason);
        self.aborted = Some(reason);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    pub fn outcomes(&self) -> impl Iterator<Item = &ScenarioOutcome> {
        self.sections.iter().flat_map(|s| s.outcomes.iter())
    }

    pub fn passed(&self) -> usize {
        self.outcomes().filter(|o| o.passed).count()
    }

    pub fn total(&self) -> usize {
        self.outcomes().count()
    }

    pub fn all_passed(&self) -> bool {
        !self.is_aborted() && self.outcomes().all(|o| o.passed)
    }

    pub fn exit_code(&self) -> i32 {
        if self.all_passed() {
            0
        } else {
            1
        }
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        for section in &self.sections {
            writeln!(out, "== {} ==", section.title)?;
            for o in &section.outcomes {
                writeln!(
                    out,
                    "  {} {}{}{}",
                    if o.passed { "PASS" } else { "FAIL" },
                    o.name,
                    if o.detail.is_empty() { "" } else { ": " },
                    o.detail
                )?;
            }
        }
        if let Some(c) = &self.culprit {
            writeln!(out)?;
            writeln!(out, "CULPRIT FOUND: {}", c.strategy)?;
            writeln!(out, "  Seed: {}", c.seed)?;
            writeln!(out, "  Packet size: {} bytes", c.payload.len())?;
            writeln!(out, "  Decoder: {}", c.verdict)?;
            writeln!(
                out,
                "  Packet hex dump (first {} bytes):",
                HEX_DUMP_LIMIT.min(c.payload.len())
            )?;
            for line in hex_dump(&c.payload, HEX_DUMP_LIMIT, HEX_DUMP_WIDTH) {
                writeln!(out, "    {}", line)?;
            }
        }
        if let Some(reason) = &self.aborted {
            writeln!(out)?;
            writeln!(out, "ABORTED: {}", reason)?;
        }
        writeln!(out)?;
        writeln!(out, "Total: {}/{} passed", self.passed(), self.total())?;
        Ok(())
    }
}

/// Lower case hex, `width` bytes per line, at most `limit` bytes.
pub fn hex_dump(bytes: &[u8], limit: usize, width: usize) -> Vec<String> {
    bytes[..bytes.len().min(limit)]
        .chunks(width.max(1))
        .map(|line| {
            line.iter()
                .map(|b| format!("{:02x}", b))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_hex_dump_layout() {
        let data: Vec<u8> = (0..=255u8).chain(0..10).collect();
        let lines = hex_dump(&data, HEX_DUMP_LIMIT, HEX_DUMP_WIDTH);
        assert_eq!(lines.len(), 16);
        assert_eq!(
            lines[0],
            "00 01 02 03 04 05 06 07 08 09 0a 0b 0c 0d 0e 0f"
        );
        assert_eq!(lines[15].split(' ').count(), 16);
        assert!(lines[15].ends_with("ff"));
    }

    #[test]
    fn test_hex_dump_short() {
        assert_eq!(hex_dump(&[0xC0, 0x0C], 256, 16), vec!["c0 0c".to_string()]);
        assert!(hex_dump(&[], 256, 16).is_empty());
    }

    #[test]
    fn test_exit_codes() {
        let mut r = Report::new();
        assert_eq!(r.exit_code(), 0);
        r.begin("race");
        r.record(ScenarioOutcome::pass("a", ""));
        assert_eq!(r.exit_code(), 0);
        r.record(ScenarioOutcome::fail("b", "server not responding"));
        assert_eq!(r.exit_code(), 1);
        assert_eq!((r.passed(), r.total()), (1, 2));

        let mut aborted = Report::new();
        aborted.abort("server not responding at start");
        assert_eq!(aborted.exit_code(), 1);
    }

    #[test]
    fn test_written_report() {
        let mut r = Report::new();
        r.begin("isolation");
        r.record(ScenarioOutcome::pass("empty", "server alive"));
        r.record(ScenarioOutcome::fail("invalid_counts", "server unresponsive"));
        r.set_culprit(Culprit {
            strategy: "invalid_counts".into(),
            seed: 99,
            payload: bytes::Bytes::from_static(&[0xFF; 12]),
            verdict: "rejected: Truncated Packet (u8)".into(),
        });
        let mut out = vec![];
        r.write_to(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("== isolation =="));
        assert!(text.contains("  PASS empty: server alive"));
        assert!(text.contains("CULPRIT FOUND: invalid_counts"));
        assert!(text.contains("Packet size: 12 bytes"));
        assert!(text.contains("    ff ff ff ff ff ff ff ff ff ff ff ff\n"));
        assert!(text.contains("Total: 1/2 passed"));
    }
}
