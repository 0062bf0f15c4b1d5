//! Parsing of Dockerfile-style instruction sentences into [`Directive`]s.

use regex::Regex;
use std::sync::LazyLock;

/// Group 1: variable name. Group 2: value, absent when there is no `=`.
static KEY_VALUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([\w-]*)(?:=(.*))?").unwrap());

/// How CMD/ENTRYPOINT exec arrays are read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecFormParsing {
    /// Split on quotes, spaces and commas, rejoin with single spaces. Elements with
    /// internal spaces or quotes are not preserved.
    #[default]
    Lossy,
    /// Parse the array as JSON; falls back to `Lossy` when that fails.
    Json,
}

/// One parsed instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive<'a> {
    Label(&'a str),
    /// The whole sentence, keyword included.
    Maintainer(&'a str),
    Env { name: &'a str, value: &'a str },
    /// `default` is always `Some` when produced by [`Directive::parse`].
    Arg { name: &'a str, default: Option<&'a str> },
    User(&'a str),
    Workdir(&'a str),
    Expose(&'a str),
    Cmd(String),
    Entrypoint(String),
    Add(&'a str),
    Copy(&'a str),
    /// Remainder of a raw history line starting with `RUN `.
    Run(&'a str),
    /// An ENV/ARG whose text did not match the key/value grammar.
    Invalid { keyword: &'static str, text: &'a str },
    Unsupported(&'a str),
}

impl<'a> Directive<'a> {
    /// Parse `sentence` (the line with any no-op prefix stripped). `line` is the raw
    /// history line, consulted only for `RUN `.
    pub fn parse(sentence: &'a str, line: &'a str, exec_form: ExecFormParsing) -> Self {
        let (keyword, rest) = sentence.split_once(' ').unwrap_or((sentence, ""));
        let has_argument = sentence.len() > keyword.len();

        match keyword {
            "LABEL" if has_argument => Directive::Label(rest),
            "MAINTAINER" if has_argument => Directive::Maintainer(sentence),
            "ENV" if has_argument => match parse_key_value(rest) {
                Some((name, value)) => Directive::Env {
                    name,
                    value: value.unwrap_or(""),
                },
                None => Directive::Invalid {
                    keyword: "ENV",
                    text: rest,
                },
            },
            "ARG" if has_argument => match parse_key_value(rest) {
                Some((name, value)) => Directive::Arg {
                    name,
                    default: Some(value.unwrap_or("")),
                },
                None => Directive::Invalid {
                    keyword: "ARG",
                    text: rest,
                },
            },
            "USER" if has_argument => Directive::User(rest),
            "WORKDIR" if has_argument => Directive::Workdir(rest),
            "EXPOSE" if has_argument => Directive::Expose(rest),
            "CMD" if has_argument => Directive::Cmd(parse_process(rest, exec_form)),
            "ENTRYPOINT" if has_argument => Directive::Entrypoint(parse_process(rest, exec_form)),
            "ADD" if has_argument => Directive::Add(rest),
            "COPY" if has_argument => Directive::Copy(rest),
            _ => match line.strip_prefix("RUN ") {
                Some(rest) => Directive::Run(rest),
                None => Directive::Unsupported(sentence),
            },
        }
    }
}

/// Match `NAME[=value]` at the start of `text`.
///
/// Returns `None` if no name could be read. A missing `=` yields `Some((name, None))`.
pub fn parse_key_value(text: &str) -> Option<(&str, Option<&str>)> {
    let caps = KEY_VALUE_RE.captures(text)?;
    let name = caps.get(1)?.as_str();
    if name.is_empty() {
        return None;
    }
    Some((name, caps.get(2).map(|value| value.as_str())))
}

/// Read a CMD/ENTRYPOINT argument: exec array (`["a" "b"]`) or shell string.
pub fn parse_process(rest: &str, mode: ExecFormParsing) -> String {
    let rest = rest.trim();
    if rest.len() < 4 || !rest.starts_with("[\"") || !rest.ends_with("\"]") {
        return rest.to_string();
    }

    if mode == ExecFormParsing::Json {
        if let Ok(elements) = serde_json::from_str::<Vec<String>>(rest) {
            return elements.join(" ");
        }
    }
    parse_exec_form(&rest[2..rest.len() - 2])
}

/// Tokenize the inside of an exec array (outer `["` and `"]` already removed).
pub fn parse_exec_form(inner: &str) -> String {
    inner
        .split(|c: char| matches!(c, '"' | ' ' | ','))
        .filter(|token| !token.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
