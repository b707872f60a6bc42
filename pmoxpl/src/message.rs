//! Format texte des messages xPL
//!
//! ```text
//! xpl-trig
//! {
//! hop=1
//! source=slimdev-slimserv.salon
//! target=*
//! }
//! remote.basic
//! {
//! keys=7689807f
//! }
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, XplError};

/// Cible de diffusion
pub const BROADCAST_TARGET: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Command,
    Status,
    Trigger,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Command => "xpl-cmnd",
            Self::Status => "xpl-stat",
            Self::Trigger => "xpl-trig",
        }
    }
}

impl FromStr for MessageType {
    type Err = XplError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "xpl-cmnd" => Ok(Self::Command),
            "xpl-stat" => Ok(Self::Status),
            "xpl-trig" => Ok(Self::Trigger),
            other => Err(XplError::UnknownType(other.to_string())),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XplMessage {
    pub message_type: MessageType,
    pub hop: u32,
    pub source: String,
    pub target: String,
    pub schema: String,
    /// Paires du corps, dans l'ordre d'émission
    pub body: Vec<(String, String)>,
}

impl XplMessage {
    pub fn new(
        message_type: MessageType,
        source: impl Into<String>,
        target: impl Into<String>,
        schema: impl Into<String>,
    ) -> Self {
        Self {
            message_type,
            hop: 1,
            source: source.into(),
            target: target.into(),
            schema: schema.into(),
            body: Vec::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.body.push((key.into(), value.into()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.body
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Vrai si le message vise `source`, directement ou par diffusion.
    pub fn is_for(&self, source: &str) -> bool {
        self.target == BROADCAST_TARGET || self.target.eq_ignore_ascii_case(source)
    }

    pub fn compile(&self) -> String {
        self.to_string()
    }

    pub fn parse(input: &str) -> Result<Self> {
        let mut lines = input.lines().map(|l| l.trim_end_matches('\r'));

        let message_type: MessageType = lines
            .next()
            .ok_or_else(|| XplError::malformed("empty message"))?
            .trim()
            .parse()?;
        let header = read_block(&mut lines, "header")?;
        let schema = lines
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| XplError::malformed("missing schema"))?
            .to_string();
        let body = read_block(&mut lines, "body")?;

        let field = |key: &str| {
            header
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| XplError::malformed(format!("missing {} in header", key)))
        };
        let hop = field("hop")?
            .parse()
            .map_err(|_| XplError::malformed("invalid hop count"))?;

        Ok(Self {
            message_type,
            hop,
            source: field("source")?,
            target: field("target")?,
            schema,
            body,
        })
    }
}

impl fmt::Display for XplMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\n{{\nhop={}\nsource={}\ntarget={}\n}}\n{}\n{{\n",
            self.message_type, self.hop, self.source, self.target, self.schema
        )?;
        for (key, value) in &self.body {
            writeln!(f, "{}={}", key, value)?;
        }
        f.write_str("}\n")
    }
}

/// Lit `{`, des lignes `clé=valeur`, puis `}`.
fn read_block<'a>(
    lines: &mut impl Iterator<Item = &'a str>,
    what: &str,
) -> Result<Vec<(String, String)>> {
    if lines.next().map(str::trim) != Some("{") {
        return Err(XplError::malformed(format!("{} must start with '{{'", what)));
    }
    let mut pairs = Vec::new();
    for line in lines.by_ref() {
        let line = line.trim();
        if line == "}" {
            return Ok(pairs);
        }
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| XplError::malformed(format!("invalid {} line: {}", what, line)))?;
        pairs.push((key.to_string(), value.to_string()));
    }
    Err(XplError::malformed(format!("unterminated {}", what)))
}
