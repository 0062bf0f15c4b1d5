use super::prefix::LearnedPrefixes;

/// What an anchored history line turns into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryClass<'a> {
    /// An instruction sentence for the directive parser.
    Sentence(&'a str),
    /// A shell command to emit verbatim.
    Command(&'a str),
    /// A `|N ...` positional-argument line.
    ArgLine(&'a str),
}

/// Classify one history line once the prefixes are known.
pub fn classify<'a>(line: &'a str, empty_layer: bool, prefixes: &LearnedPrefixes) -> EntryClass<'a> {
    if let Some(rest) = line.strip_prefix(prefixes.no_ops_prefix.as_str()) {
        return EntryClass::Sentence(rest.trim_start());
    }
    if empty_layer {
        return EntryClass::Sentence(line);
    }

    if let Some(rest) = line.strip_prefix(prefixes.instruction_prefix.as_str()) {
        EntryClass::Command(rest.trim_start())
    } else if line.starts_with('|') && line.len() > 1 {
        EntryClass::ArgLine(line)
    } else {
        EntryClass::Sentence(line)
    }
}
