// Copyright (c) 2025 ADBC Drivers Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Tracing setup driven by the `adbc.cube.log_level` and
//! `adbc.cube.log_file` database options.
//!
//! The driver is usually loaded as a shared library inside a host that
//! owns stderr, so nothing is installed until the first
//! `Database::new_connection()` call, and a level of `off` suppresses the
//! subscriber entirely. When no level option is given, `RUST_LOG` is
//! honored with a `cube_adbc=warn` fallback.

use std::fs::OpenOptions;
use std::io;
use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

static INSTALLED: OnceLock<()> = OnceLock::new();

/// Logging settings collected from the database option bag.
#[derive(Debug, Clone, Default)]
pub(crate) struct LogConfig {
    /// `adbc.cube.log_level`: off, error, warn, info, debug, or trace.
    pub level: Option<String>,
    /// `adbc.cube.log_file`: append target; stderr when unset.
    pub file: Option<String>,
}

impl LogConfig {
    /// The filter to install, or `None` when logging is switched off.
    fn filter(&self) -> Option<EnvFilter> {
        match self.level.as_deref() {
            Some(level) if level.eq_ignore_ascii_case("off") => None,
            Some(level) => Some(EnvFilter::new(format!(
                "cube_adbc={}",
                level.to_lowercase()
            ))),
            None => Some(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("cube_adbc=warn")),
            ),
        }
    }
}

/// Install the process-wide subscriber once; later calls are no-ops, so
/// only the first connection's options take effect.
pub(crate) fn init_logging(config: &LogConfig) {
    INSTALLED.get_or_init(|| {
        let Some(filter) = config.filter() else {
            return;
        };

        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false);

        match config.file.as_deref() {
            Some(path) => {
                let opened = OpenOptions::new().create(true).append(true).open(path);
                match opened {
                    Ok(file) => {
                        builder.with_ansi(false).with_writer(file).try_init().ok();
                    }
                    Err(e) => {
                        eprintln!("cube-adbc: cannot open log file {path}: {e}");
                    }
                }
            }
            None => {
                builder.with_writer(io::stderr).try_init().ok();
            }
        }
    });
}
