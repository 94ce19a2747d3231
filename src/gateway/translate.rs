//! Request → command-line token translation.
//!
//! A request like
//!
//! ```text
//! POST /api/fct1/sf11   {"p2": 255, "p3": "Hi there!", "p1": true}
//! ```
//!
//! becomes the token sequence `fct1 sf11 --p2 255 --p3 "Hi there!" --p1`.
//!
//! Flag names of exactly one character get a single dash, all others two.
//! Boolean values contribute only the flag token; every other value adds a
//! second token holding its string form. Under [`FalseFlags::Emit`] a JSON
//! `false` therefore still produces the bare flag, which the command tree
//! reads as `true`. [`FalseFlags::Omit`] drops such flags instead.

use percent_encoding::percent_decode_str;
use serde_json::Value;
use tracing::warn;

use crate::config::{FalseFlags, TranslateSection};
use crate::errors::TranslationError;

/// Command path segments taken from a URL path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPath(Vec<String>);

impl CommandPath {
    /// Split `url_path` on `/`, percent-decode each segment, drop empty
    /// segments and a leading `api_prefix` segment.
    ///
    /// Decoding happens after the split, so `%2F` stays inside its segment
    /// (`/api/a%2Fb` is the single command `a/b`) instead of starting a new one.
    pub fn from_url_path(url_path: &str, api_prefix: &str) -> Self {
        let mut segments = url_path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| percent_decode_str(segment).decode_utf8_lossy().into_owned())
            .peekable();

        if !api_prefix.is_empty() && segments.peek().is_some_and(|first| first == api_prefix) {
            segments.next();
        }

        Self(segments.collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A flag value from the JSON body.
#[derive(Debug, Clone, PartialEq)]
pub enum FlagValue {
    Bool(bool),
    Int(i64),
    /// Integers above `i64::MAX`.
    Uint(u64),
    Float(f64),
    String(String),
    /// Null, arrays and objects. Rendered as compact JSON on a best-effort
    /// basis.
    Unsupported(Value),
}

impl From<Value> for FlagValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Bool(b) => Self::Bool(b),
            Value::String(s) => Self::String(s),
            Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
                (Some(i), _, _) => Self::Int(i),
                (None, Some(u), _) => Self::Uint(u),
                (None, None, Some(f)) => Self::Float(f),
                (None, None, None) => Self::Unsupported(Value::Number(n)),
            },
            other => Self::Unsupported(other),
        }
    }
}

impl FlagValue {
    /// The token following the flag name, if any.
    pub fn value_token(&self) -> Option<String> {
        match self {
            Self::Bool(_) => None,
            Self::Int(i) => Some(i.to_string()),
            Self::Uint(u) => Some(u.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::String(s) => Some(s.clone()),
            Self::Unsupported(v) => Some(v.to_string()),
        }
    }
}

/// Flag names and values in body order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlagSet(Vec<(String, FlagValue)>);

impl FlagSet {
    /// Parse a request body. An empty body or a JSON `null` yields no flags.
    pub fn parse(body: &[u8]) -> Result<Self, TranslationError> {
        if body.is_empty() {
            return Ok(Self::default());
        }

        let value: Value = serde_json::from_slice(body).map_err(TranslationError::MalformedBody)?;
        let object = match value {
            Value::Object(object) => object,
            Value::Null => return Ok(Self::default()),
            Value::Array(_) => return Err(TranslationError::NotAnObject { found: "array" }),
            Value::String(_) => return Err(TranslationError::NotAnObject { found: "string" }),
            Value::Number(_) => return Err(TranslationError::NotAnObject { found: "number" }),
            Value::Bool(_) => return Err(TranslationError::NotAnObject { found: "boolean" }),
        };

        let mut flags = Vec::with_capacity(object.len());
        for (name, value) in object {
            if name.is_empty() {
                return Err(TranslationError::EmptyFlagName);
            }
            flags.push((name, FlagValue::from(value)));
        }
        Ok(Self(flags))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FlagValue)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Render the flags as command-line tokens.
    pub fn to_tokens(&self, false_flags: FalseFlags) -> Vec<String> {
        let mut tokens = Vec::with_capacity(self.0.len() * 2);
        for (name, value) in &self.0 {
            if false_flags == FalseFlags::Omit && *value == FlagValue::Bool(false) {
                continue;
            }
            if let FlagValue::Unsupported(raw) = value {
                warn!(flag = %name, value = %raw, "Unsupported flag value passed as raw JSON");
            }

            let prefix = if name.chars().count() == 1 { "-" } else { "--" };
            tokens.push(format!("{}{}", prefix, name));
            if let Some(token) = value.value_token() {
                tokens.push(token);
            }
        }
        tokens
    }
}

/// Command path tokens followed by flag tokens, as handed to the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenSequence(Vec<String>);

impl TokenSequence {
    pub fn new(tokens: Vec<String>) -> Self {
        Self(tokens)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<String>> for TokenSequence {
    fn from(tokens: Vec<String>) -> Self {
        Self(tokens)
    }
}

/// Translates request paths and bodies into token sequences.
#[derive(Debug, Clone)]
pub struct Translator {
    api_prefix: String,
    false_flags: FalseFlags,
}

impl Default for Translator {
    fn default() -> Self {
        Self::from_config(&TranslateSection::default())
    }
}

impl Translator {
    pub fn new(api_prefix: impl Into<String>, false_flags: FalseFlags) -> Self {
        Self {
            api_prefix: api_prefix.into(),
            false_flags,
        }
    }

    pub fn from_config(config: &TranslateSection) -> Self {
        Self::new(config.api_prefix.clone(), config.false_flags)
    }

    pub fn command_path(&self, url_path: &str) -> CommandPath {
        CommandPath::from_url_path(url_path, &self.api_prefix)
    }

    pub fn translate(&self, url_path: &str, body: &[u8]) -> Result<TokenSequence, TranslationError> {
        let flags = FlagSet::parse(body)?;
        let CommandPath(mut tokens) = self.command_path(url_path);
        tokens.extend(flags.to_tokens(self.false_flags));
        Ok(TokenSequence(tokens))
    }
}

/// Translate with the default `api` prefix and `false` handling.
pub fn translate(url_path: &str, body: &[u8]) -> Result<TokenSequence, TranslationError> {
    Translator::default().translate(url_path, body)
}
