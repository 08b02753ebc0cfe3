// SPDX-License-Identifier: MIT

//! Diagnostic logging for the launcher binaries.
//!
//! Records go to standard error.  Standard output carries the launcher's
//! progress lines and must stay free of log noise.

use log::LevelFilter;

/// Initialize env_logger.
///
/// `RUST_LOG` selects the level; without it only warnings and errors are
/// shown.  Calling this more than once is harmless.
pub fn init_logger() {
    let mut builder = env_logger::Builder::from_default_env();

    if std::env::var("RUST_LOG").is_err() {
        builder.filter_level(LevelFilter::Warn);
    }

    builder.target(env_logger::Target::Stderr);
    builder.format(|buf, record| {
        use std::io::Write;
        writeln!(
            buf,
            "[{}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        )
    });

    let _ = builder.try_init();
}
