//! Decoding of `|N <assignments> <shell> -c <command>` history lines.
//!
//! The legacy builder records RUN steps that saw build arguments by prefixing the shell
//! invocation with the `N` assignments that were in effect, e.g.
//! `|2 PORT=8080 DEBUG=true /bin/sh -c echo hi`.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgLineError {
    #[error("Error processing command line with arguments (argument count missing): {line}")]
    MissingCount { line: String },

    #[error("Error processing command line with arguments (invalid argument count '{count}')")]
    InvalidCount { count: String },

    #[error("Error processing command line with arguments (expected {expected} assignments): {line}")]
    MissingAssignments { expected: usize, line: String },

    #[error("Error processing command line with arguments (-c parameter not found): {line}")]
    MissingShellFlag { line: String },

    #[error("Error processing command line with arguments (shell {shell} not found): {line}")]
    ShellNotFound { shell: String, line: String },
}

/// A decoded RUN step: the command body plus the assignments that precede the shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedCommand<'a> {
    pub body: &'a str,
    pub env_prefix: &'a str,
}

/// Decode a `|N ...` line.
///
/// Returns `Ok(None)` when nothing follows the count; the caller skips such lines.
/// Every `Err` is fatal for the run.
pub fn decode_arg_line<'a>(
    line: &'a str,
    shell_path: &str,
) -> Result<Option<DecodedCommand<'a>>, ArgLineError> {
    let digits = line.strip_prefix('|').unwrap_or(line);
    let Some(digits_end) = digits.find(|c: char| !c.is_ascii_digit()) else {
        return Ok(None);
    };

    let count_str = &digits[..digits_end];
    if count_str.is_empty() {
        return Err(ArgLineError::MissingCount {
            line: line.to_string(),
        });
    }
    let count: usize = count_str.parse().map_err(|_| ArgLineError::InvalidCount {
        count: count_str.to_string(),
    })?;

    let value = digits[digits_end..].trim_start();
    decode_assignments(value, count, shell_path).map(Some)
}

/// Split `value` into assignments and command once `count` assignments are accounted for.
///
/// The count is checked with `count + 1` probes: probe `k` requires an `=` at or after byte
/// offset `k`. The ` -c ` separator is then searched from offset `count + 1`, and the
/// environment prefix ends where the last occurrence of `shell_path` before it starts.
fn decode_assignments<'a>(
    value: &'a str,
    count: usize,
    shell_path: &str,
) -> Result<DecodedCommand<'a>, ArgLineError> {
    let bytes = value.as_bytes();

    for probe in 0..=count {
        let found = bytes
            .get(probe..)
            .map(|tail| tail.contains(&b'='))
            .unwrap_or(false);
        if !found {
            return Err(ArgLineError::MissingAssignments {
                expected: count,
                line: value.to_string(),
            });
        }
    }

    let search_from = count + 1;
    let flag_at = bytes
        .get(search_from..)
        .and_then(|tail| tail.windows(4).position(|w| w == b" -c "))
        .map(|i| i + search_from)
        .ok_or_else(|| ArgLineError::MissingShellFlag {
            line: value.to_string(),
        })?;

    let invocation = &value[..flag_at];
    let shell_at = invocation
        .rfind(shell_path)
        .ok_or_else(|| ArgLineError::ShellNotFound {
            shell: shell_path.to_string(),
            line: value.to_string(),
        })?;

    Ok(DecodedCommand {
        body: &value[flag_at + 4..],
        env_prefix: &value[..shell_at],
    })
}
