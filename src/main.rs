// SPDX-License-Identifier: MIT

use std::process::ExitCode;

use simlaunch::{LauncherConfig, launcher, logging};

fn main() -> ExitCode {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();
    logging::init_logger();

    let config = LauncherConfig::from_env();
    if let Ok(config) = &config {
        log::debug!("configuration: {config:?}");
    }
    launcher::run(config)
}
