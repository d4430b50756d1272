// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::iter::Peekable;
use std::path::Path;
use std::str::Chars;

use tracing::debug;

use crate::error::ErrorKind;
use crate::Error;

/// Variable in the defaults file that gates the daemon
pub const START_VAR: &str = "START";
/// Value of `START` assumed when the defaults file doesn't assign it
pub const START_DEFAULT: &str = "yes";

/// Assignments read from the defaults file, in file order
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Overlay {
    vars: Vec<(String, String)>,
}

impl Overlay {
    /// Reads the defaults file
    ///
    /// Returns `None` if the file does not exist. The file is read the way `.` would read a file of
    ///   plain assignments: `export`, quoting, comments, `$NAME` and `${NAME}` are understood.
    ///   References resolve against earlier assignments in the file first, then `inherited`.
    pub fn load(path: &Path, inherited: &[(OsString, OsString)]) -> Result<Option<Self>, Error> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("no defaults file at {}", path.display());
                return Ok(None);
            }
            Err(source) => {
                return Err(ErrorKind::ReadDefaults {
                    path: path.to_path_buf(),
                    source,
                }
                .into())
            }
        };

        let overlay = Self::parse(&contents, inherited).map_err(|(line, reason)| {
            ErrorKind::DefaultsSyntax {
                path: path.to_path_buf(),
                line,
                reason,
            }
        })?;

        debug!(
            "read {} assignments from {}",
            overlay.vars.len(),
            path.display()
        );
        Ok(Some(overlay))
    }

    /// Parses assignments, failing with the 1-based line number and the reason
    pub fn parse(
        contents: &str,
        inherited: &[(OsString, OsString)],
    ) -> Result<Self, (usize, &'static str)> {
        let mut overlay = Self::default();

        for (idx, line) in contents.lines().enumerate() {
            let assignment = parse_line(line, |name| overlay.lookup(name, inherited))
                .map_err(|reason| (idx + 1, reason))?;

            if let Some(assignment) = assignment {
                overlay.vars.push(assignment);
            }
        }

        Ok(overlay)
    }

    /// The last value assigned to `key`, later assignments replace earlier ones
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Unset variables expand to nothing
    fn lookup(&self, name: &str, inherited: &[(OsString, OsString)]) -> String {
        if let Some(value) = self.get(name) {
            return value.to_string();
        }

        inherited
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl<K: Into<String>, V: Into<String>> std::iter::FromIterator<(K, V)> for Overlay {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

type ParseResult<T> = Result<T, &'static str>;

fn parse_line<F>(line: &str, lookup: F) -> ParseResult<Option<(String, String)>>
where
    F: Fn(&str) -> String,
{
    let mut line = line.trim_start();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    if let Some(rest) = line.strip_prefix("export") {
        if rest.starts_with(|c: char| c.is_whitespace()) {
            line = rest.trim_start();
        }
    }

    let mut chars = line.chars().peekable();
    let key = take_name(&mut chars).ok_or("expected a variable name")?;
    if chars.next() != Some('=') {
        return Err("expected '=' directly after the variable name");
    }

    let value = parse_value(&mut chars, &lookup)?;
    Ok(Some((key, value)))
}

fn take_name(chars: &mut Peekable<Chars<'_>>) -> Option<String> {
    match chars.peek().copied() {
        Some(c) if is_name_start(c) => (),
        _ => return None,
    }

    let mut name = String::new();
    while let Some(&c) = chars.peek() {
        if !is_name_char(c) {
            break;
        }
        name.push(c);
        chars.next();
    }

    Some(name)
}

fn parse_value<F>(chars: &mut Peekable<Chars<'_>>, lookup: &F) -> ParseResult<String>
where
    F: Fn(&str) -> String,
{
    let mut value = String::new();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                // a trailing comment is the only thing allowed after the value
                let rest: String = chars.by_ref().collect();
                let rest = rest.trim_start();
                if rest.is_empty() || rest.starts_with('#') {
                    break;
                }
                return Err("unquoted whitespace in value");
            }
            '\'' => loop {
                match chars.next() {
                    Some('\'') => break,
                    Some(c) => value.push(c),
                    None => return Err("unterminated single quote"),
                }
            },
            '"' => loop {
                match chars.next() {
                    Some('"') => break,
                    Some('\\') => match chars.next() {
                        Some(c @ '$') | Some(c @ '`') | Some(c @ '"') | Some(c @ '\\') => {
                            value.push(c)
                        }
                        Some(c) => {
                            value.push('\\');
                            value.push(c);
                        }
                        None => return Err("unterminated double quote"),
                    },
                    Some('$') => expand(chars, lookup, &mut value)?,
                    Some('`') => return Err("command substitution is not supported"),
                    Some(c) => value.push(c),
                    None => return Err("unterminated double quote"),
                }
            },
            '\\' => match chars.next() {
                Some(c) => value.push(c),
                None => return Err("line continuation is not supported"),
            },
            '$' => expand(chars, lookup, &mut value)?,
            '`' => return Err("command substitution is not supported"),
            ';' | '&' | '|' | '<' | '>' | '(' | ')' => return Err("unsupported shell syntax"),
            c => value.push(c),
        }
    }

    Ok(value)
}

/// Expands the reference following a `$`
fn expand<F>(chars: &mut Peekable<Chars<'_>>, lookup: &F, value: &mut String) -> ParseResult<()>
where
    F: Fn(&str) -> String,
{
    match chars.peek().copied() {
        Some('{') => {
            chars.next();
            let name = take_name(chars).ok_or("bad substitution")?;
            if chars.next() != Some('}') {
                return Err("unsupported parameter expansion");
            }
            value.push_str(&lookup(&name));
        }
        Some('(') => return Err("command substitution is not supported"),
        Some(c) if is_name_start(c) => {
            let name = take_name(chars).ok_or("bad substitution")?;
            value.push_str(&lookup(&name));
        }
        _ => value.push('$'),
    }

    Ok(())
}

/// Whether the daemon should be started at all
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartDecision {
    Start,
    Disabled,
}

impl StartDecision {
    /// Only the exact value `yes` starts the daemon; with no defaults file the daemon is started.
    pub fn from_overlay(overlay: Option<&Overlay>) -> Self {
        let start = overlay
            .and_then(|o| o.get(START_VAR))
            .unwrap_or(START_DEFAULT);

        if start == START_DEFAULT {
            StartDecision::Start
        } else {
            StartDecision::Disabled
        }
    }

    pub fn should_start(self) -> bool {
        self == StartDecision::Start
    }
}
