use crate::error::{Error, Result};
use crate::tpl::ast::{Delimiters, Token, TokenType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    InText,
    InTagType,
    InTag,
}

/// Finite-state scanner turning template source into a flat token list.
///
/// All fields are scratch state for a single `scan` call.
pub struct Tokenizer {
    state: State,
    tag_type: TokenType,
    buffer: String,
    tokens: Vec<Token>,
    tag_start: usize,
    line: usize,
    delimiters: Delimiters,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer {
    pub fn new() -> Self {
        Self {
            state: State::InText,
            tag_type: TokenType::Escaped,
            buffer: String::new(),
            tokens: Vec::new(),
            tag_start: 0,
            line: 0,
            delimiters: Delimiters::default(),
        }
    }

    fn reset(&mut self, delimiters: Option<&Delimiters>) {
        self.state = State::InText;
        self.tag_type = TokenType::Escaped;
        self.buffer.clear();
        self.tokens = Vec::new();
        self.tag_start = 0;
        self.line = 0;
        self.delimiters = delimiters.cloned().unwrap_or_default();
    }

    /// Scan template source into tokens, starting with the given delimiters
    /// (default `{{ }}`).
    pub fn scan(&mut self, text: &str, delimiters: Option<&Delimiters>) -> Result<Vec<Token>> {
        self.reset(delimiters);

        let len = text.len();
        let mut i = 0;
        while i < len {
            match self.state {
                State::InText => {
                    if text[i..].starts_with(self.delimiters.open.as_str()) {
                        self.flush_buffer();
                        self.tag_start = i;
                        self.state = State::InTagType;
                        continue;
                    }

                    let ch = next_char(text, i);
                    self.buffer.push(ch);
                    i += ch.len_utf8();
                    if ch == '\n' {
                        self.flush_buffer();
                        self.line += 1;
                    }
                }
                State::InTagType => {
                    let after = i + self.delimiters.open.len();
                    let tag = text[after..].chars().next().and_then(TokenType::from_sigil);
                    self.tag_type = tag.unwrap_or(TokenType::Escaped);

                    match tag {
                        Some(TokenType::DelimChange) => {
                            i = self.change_delimiters(text, after)?;
                            self.state = State::InText;
                        }
                        Some(TokenType::Pragma) => {
                            i = self.add_pragma(text, after)?;
                            self.state = State::InText;
                        }
                        // every sigil is a single ASCII byte
                        Some(_) => {
                            i = after + 1;
                            self.state = State::InTag;
                        }
                        None => {
                            i = after;
                            self.state = State::InTag;
                        }
                    }
                }
                State::InTag => {
                    if !text[i..].starts_with(self.delimiters.close.as_str()) {
                        let ch = next_char(text, i);
                        self.buffer.push(ch);
                        i += ch.len_utf8();
                        continue;
                    }

                    let close_len = self.delimiters.close.len();
                    let mut token = Token::tag(self.tag_type, self.buffer.trim(), self.line);
                    token.delimiters = Some(self.delimiters.clone());
                    token.index = Some(if self.tag_type == TokenType::EndSection {
                        self.tag_start
                    } else {
                        i + close_len
                    });

                    if self.tag_type == TokenType::Unescaped {
                        // `{{{ name }}}` needs one more brace than the close tag
                        if self.delimiters.close == "}}" {
                            if text.as_bytes().get(i + 2) != Some(&b'}') {
                                return Err(mismatched_delimiters(&token));
                            }
                            i += 1;
                        } else {
                            let name = token.name().to_string();
                            match name.strip_suffix('}') {
                                Some(stripped) => token.name = Some(stripped.trim().to_string()),
                                None => return Err(mismatched_delimiters(&token)),
                            }
                        }
                    }

                    self.buffer.clear();
                    i += close_len;
                    self.state = State::InText;
                    self.tokens.push(token);
                }
            }
        }

        if self.state != State::InText {
            return Err(self.unclosed_tag());
        }

        self.flush_buffer();

        Ok(std::mem::take(&mut self.tokens))
    }

    fn flush_buffer(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let value = std::mem::take(&mut self.buffer);
        self.tokens.push(Token::text(value, self.line));
    }

    /// Consume a `{{= open close =}}` tag starting right after the opening
    /// delimiter; returns the index just past the tag.
    fn change_delimiters(&mut self, text: &str, after: usize) -> Result<usize> {
        let start = after + 1;
        let close = format!("={}", self.delimiters.close);
        let close_index = match text.get(start..).and_then(|rest| rest.find(&close)) {
            Some(offset) => start + offset,
            None => return Err(self.unclosed_tag()),
        };

        let token = Token::delim_change(self.line);
        self.delimiters = Delimiters::parse(text[start..close_index].trim()).map_err(|e| {
            let message = match e {
                Error::InvalidArgument(msg) => msg,
                other => other.to_string(),
            };
            Error::syntax(message, &token)
        })?;
        self.tokens.push(token);

        Ok(close_index + close.len())
    }

    /// Consume a `{{% NAME }}` tag. Pragmas are hoisted to the front of the
    /// token list so the parser sees them before anything else.
    fn add_pragma(&mut self, text: &str, after: usize) -> Result<usize> {
        let start = after + 1;
        let end = match text.get(start..).and_then(|rest| rest.find(self.delimiters.close.as_str())) {
            Some(offset) => start + offset,
            None => return Err(self.unclosed_tag()),
        };

        let name = text[start..end].trim();
        self.tokens.insert(0, Token::tag(TokenType::Pragma, name, 0));

        Ok(end + self.delimiters.close.len())
    }

    fn unclosed_tag(&self) -> Error {
        let name = self.buffer.trim();
        let message = if name.is_empty() {
            format!("Unclosed tag on line {}", self.line)
        } else {
            format!("Unclosed tag: {} on line {}", name, self.line)
        };

        let mut token = Token::tag(self.tag_type, name, self.line);
        token.delimiters = Some(self.delimiters.clone());
        token.index = Some(self.tag_start);
        Error::syntax(message, &token)
    }
}

fn next_char(text: &str, i: usize) -> char {
    text[i..].chars().next().unwrap_or_default()
}

fn mismatched_delimiters(token: &Token) -> Error {
    Error::syntax(
        format!(
            "Mismatched tag delimiters: {} on line {}",
            token.name(),
            token.line
        ),
        token,
    )
}
