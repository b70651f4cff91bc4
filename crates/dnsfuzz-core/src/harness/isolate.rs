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
 *  Isolation: one payload at a time, until one of them takes the server down.
 */

use super::{workers, Error, Harness};
use crate::dns::parse;
use crate::mutate::{Packet, Strategy};
use crate::report::{Culprit, Report, ScenarioOutcome};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    Idle,
    Probing,
    Attacking(String),
    Verifying(String),
    Pass,
    CulpritFound(String),
}

struct Isolation<'h> {
    harness: &'h Harness,
    state: State,
}

impl<'h> Isolation<'h> {
    fn goto(&mut self, next: State) {
        log::debug!("Isolation: {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

/// Configured strategy names in catalog order.  Names we don't know go last, in the order given.
pub(super) fn ordered(names: &[String]) -> Vec<String> {
    let mut names = names.to_vec();
    names.sort_by_key(|n| {
        n.parse::<Strategy>()
            .map(|s| s.index())
            .unwrap_or(usize::MAX)
    });
    names
}

/// What the harness's own decoder thinks of a payload.
fn verdict(payload: &[u8]) -> String {
    let mut ret = parse::describe(payload);
    let loops: Vec<String> = parse::compression_pointers(payload)
        .iter()
        .filter(|p| p.is_loop_candidate())
        .map(|p| format!("{}->{}", p.offset, p.target))
        .collect();
    if !loops.is_empty() {
        ret.push_str(&format!("; non-backward pointers {}", loops.join(", ")));
    }
    ret
}

pub(super) async fn run(harness: &Harness, report: &mut Report) -> Result<(), Error> {
    let conf = &harness.config().isolation;
    let names = match &conf.strategies {
        Some(names) => ordered(names),
        None => Strategy::ALL.iter().map(|s| s.name().to_string()).collect(),
    };
    let mut machine = Isolation {
        harness,
        state: State::Idle,
    };

    machine.goto(State::Probing);
    machine.harness.precondition().await?;

    for name in names {
        let packet = Packet::from_name(&name, Harness::seed());
        log::info!("Testing {}", packet);
        machine.goto(State::Attacking(name.clone()));

        let sent = workers::deliver(
            &packet,
            harness.config().target,
            harness.oracle().timeout(),
        )
        .await;
        if let Err(e) = sent {
            // If we couldn't send it, it can't have hurt the server.
            log::warn!("{} not delivered: {}", packet, e);
            report.record(ScenarioOutcome::pass(
                &name,
                format!("not delivered ({})", e),
            ));
            continue;
        }

        tokio::time::sleep(conf.settle).await;
        machine.goto(State::Verifying(name.clone()));
        let probe = harness.oracle().probe().await;
        if probe.alive {
            report.record(ScenarioOutcome::pass(
                &name,
                format!("{} bytes, server answered in {:?}", packet.len(), probe.elapsed),
            ));
            continue;
        }

        machine.goto(State::CulpritFound(name.clone()));
        report.record(ScenarioOutcome::fail(
            &name,
            format!(
                "{} bytes (seed {}), server hung or crashed",
                packet.len(),
                packet.seed
            ),
        ));
        report.set_culprit(Culprit {
            strategy: packet.strategy,
            seed: packet.seed,
            verdict: verdict(&packet.payload),
            payload: packet.payload,
        });
        return Ok(());
    }

    machine.goto(State::Pass);
    Ok(())
}
