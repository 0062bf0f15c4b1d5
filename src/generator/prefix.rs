//! Learning the image's instruction-prefix convention.
//!
//! Legacy builders record metadata-only steps as `<shell> -c #(nop) <INSTRUCTION>`. The first
//! such entry tells us which shell binary the image used, so nothing here hard-codes `/bin/sh`.

use regex::Regex;
use std::sync::LazyLock;

/// Group 1: the whole no-op prefix, marker and one trailing whitespace included.
/// Group 2: the bare shell invocation (`<shell> -c `).
static NO_OP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(([\w/\\.]*\s*-c\s)#\(nop\)\s)").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LearnedPrefixes {
    /// e.g. `/bin/sh -c #(nop) `
    pub no_ops_prefix: String,
    /// e.g. `/bin/sh -c `
    pub instruction_prefix: String,
}

/// Match a history line against the no-op marker pattern.
///
/// The match is not anchored at the start of the line; the prefixes are taken from wherever
/// the marker is first found.
pub fn match_no_op_prefix(line: &str) -> Option<LearnedPrefixes> {
    let caps = NO_OP_RE.captures(line)?;
    Some(LearnedPrefixes {
        no_ops_prefix: caps.get(1)?.as_str().to_string(),
        instruction_prefix: caps.get(2)?.as_str().to_string(),
    })
}
