// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command lexer and encoder.
//!
//! Every history line has the shape `<opcode> <arg> <arg> ...`, optionally
//! preceded by a share prefix `$<uuid> `. An argument consisting purely of
//! ASCII alphanumerics is written raw; everything else is wrapped in double
//! quotes with embedded quotes doubled. The byte shape of a line is part of
//! the on-disk contract, so encoding and lexing are exact inverses for any
//! argument value.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use uuid::Uuid;

static SHARE_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("^[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}$")
        .expect("share id pattern is valid")
});

/// The closed set of history opcodes.
///
/// `sep`/`sem` and `dep`/`dem` are token aliases for the same operations;
/// the lexer accepts both, the encoder always emits the canonical form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Set format tag.
    Fmt,
    /// Set vault id.
    Aid,
    /// Comment, a replay no-op.
    Cmm,
    /// Padding nonce, a replay no-op.
    Pad,
    /// Create group `(parent_id, group_id)`.
    Cgr,
    /// Set group title.
    Tgr,
    /// Move group `(group_id, new_parent_id)`.
    Mgr,
    /// Delete group.
    Dgr,
    /// Set group attribute.
    Sga,
    /// Delete group attribute.
    Dga,
    /// Create entry `(group_id, entry_id)`.
    Cen,
    /// Move entry `(entry_id, group_id)`.
    Men,
    /// Delete entry.
    Den,
    /// Set entry property.
    Sep,
    /// Delete entry property.
    Dep,
    /// Set entry attribute.
    Sea,
    /// Delete entry attribute.
    Dea,
    /// Set vault attribute.
    Saa,
    /// Delete vault attribute.
    Daa,
}

impl Opcode {
    pub const ALL: [Opcode; 19] = [
        Opcode::Fmt,
        Opcode::Aid,
        Opcode::Cmm,
        Opcode::Pad,
        Opcode::Cgr,
        Opcode::Tgr,
        Opcode::Mgr,
        Opcode::Dgr,
        Opcode::Sga,
        Opcode::Dga,
        Opcode::Cen,
        Opcode::Men,
        Opcode::Den,
        Opcode::Sep,
        Opcode::Dep,
        Opcode::Sea,
        Opcode::Dea,
        Opcode::Saa,
        Opcode::Daa,
    ];

    pub fn from_token(token: &str) -> Option<Self> {
        let opcode = match token {
            "fmt" => Opcode::Fmt,
            "aid" => Opcode::Aid,
            "cmm" => Opcode::Cmm,
            "pad" => Opcode::Pad,
            "cgr" => Opcode::Cgr,
            "tgr" => Opcode::Tgr,
            "mgr" => Opcode::Mgr,
            "dgr" => Opcode::Dgr,
            "sga" => Opcode::Sga,
            "dga" => Opcode::Dga,
            "cen" => Opcode::Cen,
            "men" => Opcode::Men,
            "den" => Opcode::Den,
            "sep" | "sem" => Opcode::Sep,
            "dep" | "dem" => Opcode::Dep,
            "sea" => Opcode::Sea,
            "dea" => Opcode::Dea,
            "saa" => Opcode::Saa,
            "daa" => Opcode::Daa,
            _ => return None,
        };
        Some(opcode)
    }

    /// Canonical three-letter token.
    pub fn token(self) -> &'static str {
        match self {
            Opcode::Fmt => "fmt",
            Opcode::Aid => "aid",
            Opcode::Cmm => "cmm",
            Opcode::Pad => "pad",
            Opcode::Cgr => "cgr",
            Opcode::Tgr => "tgr",
            Opcode::Mgr => "mgr",
            Opcode::Dgr => "dgr",
            Opcode::Sga => "sga",
            Opcode::Dga => "dga",
            Opcode::Cen => "cen",
            Opcode::Men => "men",
            Opcode::Den => "den",
            Opcode::Sep => "sep",
            Opcode::Dep => "dep",
            Opcode::Sea => "sea",
            Opcode::Dea => "dea",
            Opcode::Saa => "saa",
            Opcode::Daa => "daa",
        }
    }

    pub fn arity(self) -> usize {
        match self {
            Opcode::Fmt
            | Opcode::Aid
            | Opcode::Cmm
            | Opcode::Pad
            | Opcode::Dgr
            | Opcode::Den
            | Opcode::Daa => 1,
            Opcode::Cgr
            | Opcode::Tgr
            | Opcode::Mgr
            | Opcode::Dga
            | Opcode::Cen
            | Opcode::Men
            | Opcode::Dep
            | Opcode::Dea
            | Opcode::Saa => 2,
            Opcode::Sga | Opcode::Sep | Opcode::Sea => 3,
        }
    }

    /// Destructive opcodes remove state without a tombstone. The merge
    /// engine strips them from the remote divergent suffix.
    pub fn is_destructive(self) -> bool {
        matches!(
            self,
            Opcode::Dgr | Opcode::Dga | Opcode::Den | Opcode::Dep | Opcode::Dea | Opcode::Daa
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// One parsed history line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    /// Share this command belongs to, when the line carried a `$<uuid>`
    /// prefix.
    pub share: Option<String>,
    pub opcode: Opcode,
    pub args: Vec<String>,
}

impl Command {
    pub fn new(opcode: Opcode, args: Vec<String>) -> Self {
        Self {
            share: None,
            opcode,
            args,
        }
    }

    pub fn shared(share_id: impl Into<String>, opcode: Opcode, args: Vec<String>) -> Self {
        Self {
            share: Some(share_id.into()),
            opcode,
            args,
        }
    }

    /// A fresh padding line with a random nonce. The nonce is hex so the
    /// line stays in the raw (unquoted) argument form.
    pub fn pad() -> Self {
        Self::new(Opcode::Pad, vec![Uuid::new_v4().simple().to_string()])
    }

    /// A comment carrying arbitrary text.
    pub fn comment(text: impl Into<String>) -> Self {
        Self::new(Opcode::Cmm, vec![text.into()])
    }

    pub fn is_padding(&self) -> bool {
        self.opcode == Opcode::Pad
    }

    /// Re-tag this command with a share id (used when recombining extracted
    /// share sub-histories).
    pub fn with_share(mut self, share_id: impl Into<String>) -> Self {
        self.share = Some(share_id.into());
        self
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(share) = &self.share {
            write!(f, "${share} ")?;
        }
        f.write_str(self.opcode.token())?;
        for arg in &self.args {
            write!(f, " {}", encode_arg(arg))?;
        }
        Ok(())
    }
}

impl FromStr for Command {
    type Err = LexError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        parse_line(line)
    }
}

/// Errors raised while lexing a command line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LexError {
    #[error("empty command line")]
    Empty,

    #[error("share prefix without a command")]
    MissingOpcode,

    #[error("malformed share id {0:?}")]
    InvalidShareId(String),

    #[error("unknown opcode {0:?}")]
    UnknownOpcode(String),

    #[error("unterminated quoted argument")]
    Unterminated,

    #[error("{opcode} expects {expected} arguments, found {found}")]
    Arity {
        opcode: Opcode,
        expected: usize,
        found: usize,
    },
}

/// Encode a single argument for emission.
///
/// Purely alphanumeric arguments are written raw; everything else (including
/// the empty string) is quoted, with embedded double quotes doubled.
pub fn encode_arg(arg: &str) -> String {
    if !arg.is_empty() && arg.bytes().all(|b| b.is_ascii_alphanumeric()) {
        arg.to_string()
    } else {
        format!("\"{}\"", arg.replace('"', "\"\""))
    }
}

/// Lex one history line into a [`Command`].
pub fn parse_line(line: &str) -> Result<Command, LexError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Err(LexError::Empty);
    }

    let mut rest = line.trim_start();
    let mut share = None;

    if let Some(prefixed) = rest.strip_prefix('$') {
        let (token, remainder) = split_token(prefixed);
        if !SHARE_ID.is_match(token) {
            return Err(LexError::InvalidShareId(token.to_string()));
        }
        share = Some(token.to_string());
        rest = remainder.trim_start();
        if rest.is_empty() {
            return Err(LexError::MissingOpcode);
        }
    }

    let (token, remainder) = split_token(rest);
    let opcode =
        Opcode::from_token(token).ok_or_else(|| LexError::UnknownOpcode(token.to_string()))?;

    let args = parse_args(remainder)?;
    if args.len() != opcode.arity() {
        return Err(LexError::Arity {
            opcode,
            expected: opcode.arity(),
            found: args.len(),
        });
    }

    Ok(Command {
        share,
        opcode,
        args,
    })
}

fn split_token(input: &str) -> (&str, &str) {
    match input.find(char::is_whitespace) {
        Some(index) => (&input[..index], &input[index..]),
        None => (input, ""),
    }
}

fn parse_args(input: &str) -> Result<Vec<String>, LexError> {
    let mut args = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }
        let Some(&first) = chars.peek() else {
            break;
        };

        if first == '"' {
            chars.next();
            let mut value = String::new();
            let mut terminated = false;
            while let Some(c) = chars.next() {
                if c == '"' {
                    // A doubled quote is an escaped literal quote.
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        value.push('"');
                    } else {
                        terminated = true;
                        break;
                    }
                } else {
                    value.push(c);
                }
            }
            if !terminated {
                return Err(LexError::Unterminated);
            }
            args.push(value);
        } else {
            let mut value = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                value.push(c);
                chars.next();
            }
            args.push(value);
        }
    }

    Ok(args)
}
