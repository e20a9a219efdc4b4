//! Snippet script tokenizer.
//!
//! A script is a `;`-separated list of calls; each call is a
//! whitespace-separated command followed by its arguments. Single quotes
//! group whitespace and `;` into one argument, and a backslash escapes the
//! next character (`\n`, `\r`, `\t` and `\uXXXX` are decoded).

use bw_core::SnippetCall;

#[derive(Default)]
struct Tokenizer {
    calls: Vec<Vec<String>>,
    call: Vec<String>,
    argument: String,
    /// The current argument saw a quote, so it is kept even if empty.
    quoted: bool,
    in_quotes: bool,
}

impl Tokenizer {
    fn end_argument(&mut self) {
        if !self.argument.is_empty() || self.quoted {
            self.call.push(std::mem::take(&mut self.argument));
        }
        self.quoted = false;
    }

    fn end_call(&mut self) {
        self.end_argument();
        if !self.call.is_empty() {
            self.calls.push(std::mem::take(&mut self.call));
        }
    }
}

fn decode_escape(c: char) -> char {
    match c {
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        other => other,
    }
}

/// Split a snippet script into calls. Empty calls are dropped.
pub fn tokenize(script: &str) -> Vec<SnippetCall> {
    let mut state = Tokenizer::default();
    let mut chars = script.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('u') => {
                    let hex: String = chars.by_ref().take(4).collect();
                    if let Some(decoded) = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                        state.argument.push(decoded);
                    }
                }
                Some(escaped) => state.argument.push(decode_escape(escaped)),
                None => {}
            },
            '\'' => {
                state.in_quotes = !state.in_quotes;
                state.quoted = true;
            }
            _ if state.in_quotes => state.argument.push(c),
            ';' => state.end_call(),
            _ if c.is_whitespace() => state.end_argument(),
            _ => state.argument.push(c),
        }
    }
    state.end_call();

    state
        .calls
        .into_iter()
        .filter_map(|mut call| {
            if call.is_empty() {
                return None;
            }
            let command = call.remove(0);
            Some(SnippetCall {
                command,
                arguments: call,
            })
        })
        .collect()
}
