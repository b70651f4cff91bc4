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
 *  Application logic scenarios against fake servers.
 */

mod common;

use dnsfuzz::harness::{AppScenario, Protocol};
use dnsfuzz::report::Report;

/// A query for host1.zone1.test of type ANY.
fn is_any_for_host1(p: &[u8]) -> bool {
    let name = b"\x05host1\x05zone1\x04test\x00";
    p.len() == 12 + name.len() + 4
        && &p[12..12 + name.len()] == name
        && p[p.len() - 4..p.len() - 2] == [0x00, 0xFF]
}

#[tokio::test]
async fn test_scenarios_pass_against_healthy_server() {
    let server = common::FakeServer::healthy().await;
    let trigger = common::RecordingTrigger::new(1);
    let h = common::harness(common::test_config(server.addr, ""), trigger.clone());
    let mut report = Report::new();
    h.run(Protocol::Scenarios, &mut report).await.unwrap();

    let names: Vec<_> = report.outcomes().map(|o| o.name.clone()).collect();
    let expected: Vec<_> = AppScenario::ALL.iter().map(|s| s.name().to_string()).collect();
    assert_eq!(names, expected);
    assert!(report.outcomes().all(|o| o.passed), "{:?}", names);
    assert_eq!(report.exit_code(), 0);
    assert!(server.received() > 0);
    // Nothing here reloads anything.
    assert_eq!(trigger.locates(), 0);
}

#[tokio::test]
async fn test_one_failure_does_not_stop_the_rest() {
    let server = common::FakeServer::poisoned_by(is_any_for_host1).await;
    let h = common::harness(
        common::test_config(server.addr, ""),
        common::RecordingTrigger::new(1),
    );
    let mut report = Report::new();
    h.run(Protocol::Scenarios, &mut report).await.unwrap();

    let results: Vec<_> = report.outcomes().map(|o| o.passed).collect();
    assert_eq!(results.len(), AppScenario::ALL.len());
    assert!(results[0], "enumeration flood should pass");
    assert!(!results[1], "query type flood should fail");
    assert!(server.is_hung());
    assert!(!report.is_aborted());
    assert_eq!(report.exit_code(), 1);
}
