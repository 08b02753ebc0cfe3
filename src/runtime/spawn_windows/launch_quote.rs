// SPDX-License-Identifier: MIT

//! Windows command line and environment block encoding.
//!
//! CreateProcessW takes the whole command line as one string, which the
//! child splits again with the `CommandLineToArgvW` rules.  See "Everyone
//! quotes command line arguments the wrong way":
//!   https://learn.microsoft.com/en-us/archive/blogs/twistylittlepassagesallalike/everyone-quotes-command-line-arguments-the-wrong-way
//!
//! The command name is included as the first argument.

use std::{
    ffi::{OsStr, OsString},
    os::windows::ffi::OsStrExt,
};

/// Encode environment pairs as a CREATE_UNICODE_ENVIRONMENT block:
/// `KEY=VALUE` entries, each NUL-terminated, sorted case-insensitively by key,
/// and the block closed with an extra NUL.
pub fn encode_env_block(env: &[(OsString, OsString)]) -> Result<Vec<u16>, std::io::Error> {
    if env.is_empty() {
        return Ok(vec![0, 0]);
    }
    let mut pairs: Vec<&(OsString, OsString)> = env.iter().collect();
    pairs.sort_by_cached_key(|(k, _)| k.to_string_lossy().to_lowercase());

    let mut block: Vec<u16> = Vec::new();
    for (k, v) in pairs {
        block.extend(no_nul(k)?.encode_wide());
        block.push('=' as u16);
        block.extend(no_nul(v)?.encode_wide());
        block.push(0);
    }
    block.push(0);
    Ok(block)
}

/// Quote the command and its arguments into a NUL-terminated command line.
pub fn command_line(cmd: &OsStr, args: &[OsString]) -> Result<Vec<u16>, std::io::Error> {
    let mut line = vec![];
    append_arg(&mut line, cmd)?;
    for arg in args {
        line.push(' ' as u16);
        append_arg(&mut line, arg)?;
    }
    line.push(0);
    Ok(line)
}

fn append_arg(line: &mut Vec<u16>, arg: &OsStr) -> Result<(), std::io::Error> {
    let arg = no_nul(arg)?;
    if !requires_quoting(arg) {
        line.extend(arg.encode_wide());
        return Ok(());
    }

    line.push('"' as u16);
    let mut backslashes = 0;
    for c in arg.encode_wide() {
        if c == '\\' as u16 {
            backslashes += 1;
            continue;
        }
        // Backslashes only escape when they run into a quote.
        let escaped = if c == '"' as u16 { backslashes * 2 + 1 } else { backslashes };
        line.extend(std::iter::repeat_n('\\' as u16, escaped));
        line.push(c);
        backslashes = 0;
    }
    // Trailing backslashes precede the closing quote, so they double.
    line.extend(std::iter::repeat_n('\\' as u16, backslashes * 2));
    line.push('"' as u16);
    Ok(())
}

fn no_nul(val: &OsStr) -> Result<&OsStr, std::io::Error> {
    if val.encode_wide().any(|c| c == 0) {
        Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "nul byte found in value",
        ))
    } else {
        Ok(val)
    }
}

fn requires_quoting(val: &OsStr) -> bool {
    val.is_empty()
        || val.encode_wide().any(|c| {
            c == ' ' as u16 || c == '\t' as u16 || c == '\n' as u16 || c == 0x0b || c == '"' as u16
        })
}
