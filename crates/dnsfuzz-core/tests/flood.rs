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
 *  Flood protocol against fake servers.
 */

mod common;

use dnsfuzz::harness::Protocol;
use dnsfuzz::report::Report;

fn is_null_bytes_large(p: &[u8]) -> bool {
    p.len() == 512 && p.iter().all(|&b| b == 0)
}

#[tokio::test]
async fn test_flood_against_healthy_server() {
    let server = common::FakeServer::healthy().await;
    let h = common::harness(
        common::test_config(server.addr, ""),
        common::RecordingTrigger::new(1),
    );
    let mut report = Report::new();
    h.run(Protocol::Flood, &mut report).await.unwrap();
    let outcomes: Vec<_> = report.outcomes().collect();
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].name, "catalog_sweep");
    assert_eq!(outcomes[1].name, "random_mix");
    assert!(outcomes.iter().all(|o| o.passed));
    assert_eq!(report.exit_code(), 0);
    // At least the whole catalog arrived.
    assert!(server.received() > dnsfuzz::mutate::Strategy::ALL.len());
}

#[tokio::test]
async fn test_flood_stops_after_failed_sweep() {
    let server = common::FakeServer::poisoned_by(is_null_bytes_large).await;
    let h = common::harness(
        common::test_config(server.addr, ""),
        common::RecordingTrigger::new(1),
    );
    let mut report = Report::new();
    h.run(Protocol::Flood, &mut report).await.unwrap();
    let outcomes: Vec<_> = report.outcomes().collect();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].name, "catalog_sweep");
    assert!(!outcomes[0].passed);
    assert!(server.is_hung());
    assert!(!report.is_aborted());
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn test_flood_needs_a_live_server() {
    let silent = common::silent_server().await;
    let h = common::harness(
        common::test_config(silent.local_addr().unwrap(), ""),
        common::RecordingTrigger::new(1),
    );
    let mut report = Report::new();
    assert!(h.run(Protocol::Flood, &mut report).await.is_err());
    assert_eq!(report.total(), 0);
    assert_eq!(report.exit_code(), 1);
}
