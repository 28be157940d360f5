//! Snippet Script Parser
//!
//! A script is a `;`-separated list of commands, each a snippet name followed
//! by whitespace-separated arguments:
//!
//! ```text
//! race start 2; hide-if-contains 'Sponsored post' div; race end
//! ```
//!
//! Single quotes group text, a backslash escapes the next character, and
//! `\n`, `\r`, `\t` and `\uXXXX` produce the corresponding characters.

use serde::Serialize;

/// A parsed snippet invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnippetCall {
    pub name: String,
    pub args: Vec<String>,
}

impl SnippetCall {
    pub fn new(name: &str, args: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
        }
    }
}

/// Parse a snippet script into calls. Never fails; malformed input degrades
/// to whatever words could be read.
pub fn parse_script(script: &str) -> Vec<SnippetCall> {
    let chars: Vec<char> = script.chars().collect();
    let mut calls = Vec::new();
    let mut words: Vec<String> = Vec::new();
    let mut word = String::new();
    let mut has_word = false;
    let mut quoted = false;

    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        i += 1;

        match ch {
            '\\' => {
                let escaped = match chars.get(i) {
                    Some(&escaped) => escaped,
                    None => break,
                };
                i += 1;
                match escaped {
                    'n' => word.push('\n'),
                    'r' => word.push('\r'),
                    't' => word.push('\t'),
                    'u' => match decode_unicode_escape(&chars[i..]) {
                        Some(decoded) => {
                            word.push(decoded);
                            i += 4;
                        }
                        None => word.push('u'),
                    },
                    other => word.push(other),
                }
                has_word = true;
            }
            '\'' => {
                quoted = !quoted;
                has_word = true;
            }
            ';' if !quoted => {
                flush_word(&mut words, &mut word, &mut has_word);
                flush_call(&mut calls, &mut words);
            }
            c if c.is_ascii_whitespace() && !quoted => {
                flush_word(&mut words, &mut word, &mut has_word);
            }
            c => {
                word.push(c);
                has_word = true;
            }
        }
    }

    flush_word(&mut words, &mut word, &mut has_word);
    flush_call(&mut calls, &mut words);

    calls
}

fn decode_unicode_escape(rest: &[char]) -> Option<char> {
    if rest.len() < 4 {
        return None;
    }
    let mut code = 0u32;
    for ch in &rest[..4] {
        code = code * 16 + ch.to_digit(16)?;
    }
    char::from_u32(code)
}

fn flush_word(words: &mut Vec<String>, word: &mut String, has_word: &mut bool) {
    if *has_word {
        words.push(std::mem::take(word));
        *has_word = false;
    }
}

fn flush_call(calls: &mut Vec<SnippetCall>, words: &mut Vec<String>) {
    if words.is_empty() {
        return;
    }
    let mut args = std::mem::take(words);
    let name = args.remove(0);
    calls.push(SnippetCall { name, args });
}

/// Parse the comma-separated form used by `+js(...)` rules:
/// `name, arg1, arg2`. The `+js(` wrapper is optional.
pub fn parse_scriptlet_call(raw: &str) -> Option<SnippetCall> {
    let mut raw = raw.trim();
    if let Some(inner) = raw.strip_prefix("+js(").and_then(|rest| rest.strip_suffix(')')) {
        raw = inner;
    }

    // Blank slots are dropped before unquoting so `''` stays an empty argument.
    let mut parts = split_unescaped_commas(raw)
        .into_iter()
        .filter(|part| !part.trim().is_empty())
        .map(|part| unquote(part.trim()).to_string());
    let name = parts.next().filter(|name| !name.is_empty())?;
    let args = parts.collect();
    Some(SnippetCall { name, args })
}

fn split_unescaped_commas(raw: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some(',') => current.push(','),
                Some(other) => {
                    current.push('\\');
                    current.push(other);
                }
                None => current.push('\\'),
            },
            ',' => parts.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    parts.push(current);
    parts
}

fn unquote(part: &str) -> &str {
    for quote in ['\'', '"', '`'] {
        if part.len() >= 2 && part.starts_with(quote) && part.ends_with(quote) {
            return &part[1..part.len() - 1];
        }
    }
    part
}
