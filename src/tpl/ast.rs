use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    Section,
    Inverted,
    EndSection,
    Comment,
    Partial,
    Parent,
    DelimChange,
    Escaped,
    /// `{{{ name }}}`
    Unescaped,
    /// `{{& name }}`
    UnescapedAmp,
    Text,
    Pragma,
    BlockVar,
    BlockArg,
}

impl TokenType {
    /// Classify the sigil following an opening delimiter.
    pub fn from_sigil(c: char) -> Option<TokenType> {
        match c {
            '#' => Some(TokenType::Section),
            '^' => Some(TokenType::Inverted),
            '/' => Some(TokenType::EndSection),
            '!' => Some(TokenType::Comment),
            '>' => Some(TokenType::Partial),
            '<' => Some(TokenType::Parent),
            '=' => Some(TokenType::DelimChange),
            '{' => Some(TokenType::Unescaped),
            '&' => Some(TokenType::UnescapedAmp),
            '%' => Some(TokenType::Pragma),
            '$' => Some(TokenType::BlockVar),
            _ => None,
        }
    }

    /// Human-readable tag name, used in error messages.
    pub fn tag_name(&self) -> &'static str {
        match self {
            TokenType::Section => "section",
            TokenType::Inverted => "inverted section",
            TokenType::EndSection => "section end",
            TokenType::Comment => "comment",
            TokenType::Partial => "partial",
            TokenType::Parent => "parent",
            TokenType::DelimChange => "set delimiter",
            TokenType::Escaped => "variable",
            TokenType::Unescaped | TokenType::UnescapedAmp => "unescaped variable",
            TokenType::Text => "text",
            TokenType::Pragma => "pragma",
            TokenType::BlockVar | TokenType::BlockArg => "block variable",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag_name())
    }
}

/// Opening and closing tag delimiters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Delimiters {
    pub open: String,
    pub close: String,
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            open: "{{".to_string(),
            close: "}}".to_string(),
        }
    }
}

impl Delimiters {
    /// Parse an `open close` pair: two runs of non-space separated by space.
    pub fn parse(spec: &str) -> Result<Self> {
        let mut parts = spec.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some(open), Some(close), None) => Ok(Self {
                open: open.to_string(),
                close: close.to_string(),
            }),
            _ => Err(Error::InvalidArgument(format!("Invalid delimiters: {}", spec))),
        }
    }

    pub fn is_default(&self) -> bool {
        self.open == "{{" && self.close == "}}"
    }

    /// The set-delimiter tag that would switch to these delimiters.
    pub fn to_tag(&self) -> String {
        format!("{{{{= {} {} =}}}}", self.open, self.close)
    }
}

impl fmt::Display for Delimiters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.open, self.close)
    }
}

/// A single lexical token, later grown into a parse tree node.
///
/// Section-like tokens only receive `end` and `nodes` once the parser has
/// found their closing tag.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenType,
    pub line: usize,
    pub index: Option<usize>,
    pub name: Option<String>,
    pub value: Option<String>,
    pub delimiters: Option<Delimiters>,
    pub dynamic: bool,
    pub filters: Vec<String>,
    pub indent: Option<String>,
    pub end: Option<usize>,
    pub nodes: Option<Vec<Token>>,
}

impl Token {
    fn bare(kind: TokenType, line: usize) -> Self {
        Self {
            kind,
            line,
            index: None,
            name: None,
            value: None,
            delimiters: None,
            dynamic: false,
            filters: Vec::new(),
            indent: None,
            end: None,
            nodes: None,
        }
    }

    pub fn text(value: impl Into<String>, line: usize) -> Self {
        let mut token = Self::bare(TokenType::Text, line);
        token.value = Some(value.into());
        token
    }

    pub fn tag(kind: TokenType, name: impl Into<String>, line: usize) -> Self {
        let mut token = Self::bare(kind, line);
        token.name = Some(name.into());
        token
    }

    pub fn delim_change(line: usize) -> Self {
        Self::bare(TokenType::DelimChange, line)
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }

    pub fn value(&self) -> &str {
        self.value.as_deref().unwrap_or_default()
    }

    pub fn nodes(&self) -> &[Token] {
        self.nodes.as_deref().unwrap_or_default()
    }

    /// True for text tokens made only of whitespace.
    pub fn is_whitespace(&self) -> bool {
        self.kind == TokenType::Text && self.value().chars().all(char::is_whitespace)
    }
}

/// Grammar-altering feature flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Pragma {
    Filters,
    Blocks,
    AnchoredDot,
    DynamicNames,
}

impl Pragma {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pragma::Filters => "FILTERS",
            Pragma::Blocks => "BLOCKS",
            Pragma::AnchoredDot => "ANCHORED-DOT",
            Pragma::DynamicNames => "DYNAMIC-NAMES",
        }
    }
}

impl FromStr for Pragma {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "FILTERS" => Ok(Pragma::Filters),
            "BLOCKS" => Ok(Pragma::Blocks),
            "ANCHORED-DOT" => Ok(Pragma::AnchoredDot),
            "DYNAMIC-NAMES" => Ok(Pragma::DynamicNames),
            _ => Err(Error::InvalidArgument(format!("Unknown pragma: \"{}\".", s))),
        }
    }
}

impl fmt::Display for Pragma {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The pragmas in effect for one parse or compile.
///
/// In-template pragma tags may name anything; only the known names change
/// behavior.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PragmaSet {
    names: BTreeSet<String>,
}

impl PragmaSet {
    pub fn new(defaults: &[Pragma]) -> Self {
        Self {
            names: defaults.iter().map(|p| p.as_str().to_string()).collect(),
        }
    }

    pub fn enable(&mut self, name: &str) {
        self.names.insert(name.to_string());
    }

    pub fn contains(&self, pragma: Pragma) -> bool {
        self.names.contains(pragma.as_str())
    }

    /// Sorted pragma names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}
