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
 *  Shared entry point for the binaries.
 */

use crate::config;
use crate::harness::{Harness, Protocol};
use crate::report::Report;

#[derive(Debug)]
pub enum Error {
    ConfigError(std::path::PathBuf, config::Error),
    Usage(String),
    Output(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::ConfigError(path, e) => write!(
                f,
                "Failed to load config from {}: {}",
                path.to_string_lossy(),
                e
            ),
            Error::Usage(argv0) => write!(f, "Usage: {} [configfile]", argv0),
            Error::Output(e) => write!(f, "Failed to write report: {}", e),
        }
    }
}

pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

/// No argument means built in defaults; one argument is a config file (or program).
async fn load_config() -> Result<config::SharedConfig, Error> {
    let args: Vec<_> = std::env::args_os().collect();
    match args.len() {
        0 | 1 => Ok(std::sync::Arc::new(config::Config::default())),
        2 => {
            let path = std::path::Path::new(&args[1]);
            config::load_config_from_path(path)
                .await
                .map_err(|e| Error::ConfigError(path.to_path_buf(), e))
        }
        _ => Err(Error::Usage(args[0].to_string_lossy().into())),
    }
}

async fn go(protocols: &[Protocol]) -> Result<i32, Error> {
    let conf = load_config().await?;
    log::info!("Target: {}", conf.target);
    let harness = Harness::with_signal_trigger(conf);
    let mut report = Report::new();
    if let Err(e) = harness.run_all(protocols, &mut report).await {
        log::error!("Run abandoned: {}", e);
    }
    let stdout = std::io::stdout();
    report
        .write_to(&mut stdout.lock())
        .map_err(Error::Output)?;
    Ok(report.exit_code())
}

/// Run `protocols` against the configured target and return the process exit code.
pub async fn run(protocols: &[Protocol]) -> i32 {
    match go(protocols).await {
        Ok(code) => code,
        Err(x) => {
            println!("Error: {}", x);
            1
        }
    }
}
