use crate::error::{Error, Result};
use crate::tpl::ast::{Pragma, PragmaSet, Token, TokenType};
use std::collections::VecDeque;

/// Turns a token list into a parse tree.
///
/// Section-like tokens come back with `nodes` (children) and `end` (offset of
/// their closing tag) filled in. Standalone tag lines are trimmed here.
#[derive(Default)]
pub struct Parser {
    line_num: Option<usize>,
    line_tokens: usize,
    default_pragmas: Vec<Pragma>,
    pragmas: PragmaSet,
    pragma_filters: bool,
    pragma_blocks: bool,
    pragma_dynamic_names: bool,
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pragmas enabled for every template, before any in-template pragma tag.
    pub fn set_pragmas(&mut self, pragmas: &[Pragma]) {
        self.default_pragmas = pragmas.to_vec();
    }

    pub fn parse(&mut self, tokens: Vec<Token>) -> Result<Vec<Token>> {
        self.line_num = None;
        self.line_tokens = 0;
        self.pragmas = PragmaSet::new(&self.default_pragmas);
        self.pragma_filters = self.pragmas.contains(Pragma::Filters);
        self.pragma_blocks = self.pragmas.contains(Pragma::Blocks);
        self.pragma_dynamic_names = self.pragmas.contains(Pragma::DynamicNames);

        let mut tokens = VecDeque::from(tokens);
        let (nodes, _) = self.build_tree(&mut tokens, None)?;
        Ok(nodes)
    }

    /// The pragmas in effect at the end of the last parse.
    pub fn pragmas(&self) -> &PragmaSet {
        &self.pragmas
    }

    /// Collect sibling nodes until the input runs out or `parent` is closed.
    /// Returns the nodes along with the closing tag, if one was consumed.
    fn build_tree(
        &mut self,
        tokens: &mut VecDeque<Token>,
        parent: Option<&Token>,
    ) -> Result<(Vec<Token>, Option<Token>)> {
        let mut nodes: Vec<Token> = Vec::new();

        while let Some(mut token) = tokens.pop_front() {
            if self.line_num == Some(token.line) {
                self.line_tokens += 1;
            } else {
                self.line_num = Some(token.line);
                self.line_tokens = 0;
            }

            if token.kind != TokenType::Comment && token.name.is_some() {
                if self.pragma_dynamic_names {
                    self.apply_dynamic_name(&mut token)?;
                }
                if self.pragma_filters {
                    apply_filters(&mut token);
                }
            }

            match token.kind {
                TokenType::DelimChange => {
                    check_allowed_in_parent(parent, &token)?;
                    self.clear_standalone_lines(&mut nodes, tokens);
                }
                TokenType::Section | TokenType::Inverted => {
                    check_allowed_in_parent(parent, &token)?;
                    self.clear_standalone_lines(&mut nodes, tokens);
                    nodes.push(self.build_section(tokens, token)?);
                }
                TokenType::EndSection => {
                    let Some(open) = parent else {
                        return Err(Error::syntax(
                            format!(
                                "Unexpected closing tag: /{} on line {}",
                                token.name(),
                                token.line
                            ),
                            &token,
                        ));
                    };

                    if token.name() != open.name() || token.dynamic != open.dynamic {
                        return Err(Error::syntax(
                            format!(
                                "Nesting error: {}{} (on line {}) vs. {}{} (on line {})",
                                if open.dynamic { "*" } else { "" },
                                open.name(),
                                open.line,
                                if token.dynamic { "*" } else { "" },
                                token.name(),
                                token.line
                            ),
                            &token,
                        ));
                    }

                    self.clear_standalone_lines(&mut nodes, tokens);
                    return Ok((nodes, Some(token)));
                }
                TokenType::Partial => {
                    check_allowed_in_parent(parent, &token)?;
                    // the stripped whitespace prefix becomes the partial's indent
                    if let Some(indent) = self.clear_standalone_lines(&mut nodes, tokens) {
                        token.indent = indent.value;
                    }
                    nodes.push(token);
                }
                TokenType::Parent => {
                    check_allowed_in_parent(parent, &token)?;
                    nodes.push(self.build_section(tokens, token)?);
                }
                TokenType::BlockVar => {
                    if self.pragma_blocks {
                        if parent.is_some_and(|p| p.kind == TokenType::Parent) {
                            token.kind = TokenType::BlockArg;
                        }
                        self.clear_standalone_lines(&mut nodes, tokens);
                        nodes.push(self.build_section(tokens, token)?);
                    } else {
                        // without BLOCKS this is just a variable named `$...`
                        token.kind = TokenType::Escaped;
                        token.name = Some(format!("${}", token.name()));
                        nodes.push(token);
                    }
                }
                TokenType::Pragma | TokenType::Comment => {
                    if token.kind == TokenType::Pragma {
                        self.enable_pragma(token.name());
                    }
                    self.clear_standalone_lines(&mut nodes, tokens);
                    nodes.push(token);
                }
                _ => nodes.push(token),
            }
        }

        if let Some(open) = parent {
            return Err(Error::syntax(
                format!(
                    "Missing closing tag: {} opened on line {}",
                    open.name(),
                    open.line
                ),
                open,
            ));
        }

        Ok((nodes, None))
    }

    fn build_section(&mut self, tokens: &mut VecDeque<Token>, mut token: Token) -> Result<Token> {
        let (nodes, close) = self.build_tree(tokens, Some(&token))?;
        token.end = close.and_then(|c| c.index);
        token.nodes = Some(nodes);
        Ok(token)
    }

    /// Drop the whitespace around a tag that sits alone on its line.
    ///
    /// The trailing whitespace token is discarded from `tokens`. The leading
    /// one, if any, is popped from `nodes` and handed back so partials can
    /// reuse it as their indent.
    fn clear_standalone_lines(
        &self,
        nodes: &mut Vec<Token>,
        tokens: &mut VecDeque<Token>,
    ) -> Option<Token> {
        if self.line_tokens > 1 {
            // third or later token on this line
            return None;
        }

        let mut has_prefix = false;
        if self.line_tokens == 1 {
            // second token: standalone only after pure whitespace
            if let Some(prev) = nodes.last() {
                if !prev.is_whitespace() {
                    return None;
                }
                has_prefix = true;
            }
        }

        if let Some(next) = tokens.front() {
            if Some(next.line) == self.line_num {
                if !next.is_whitespace() {
                    return None;
                }
                // unless it ends the template, the suffix must close the line
                if tokens.len() != 1 && !next.value().ends_with('\n') {
                    return None;
                }
                tokens.pop_front();
            }
        }

        if has_prefix { nodes.pop() } else { None }
    }

    fn apply_dynamic_name(&self, token: &mut Token) -> Result<()> {
        let name = token.name();
        let Some(stripped) = name.trim_start().strip_prefix('*') else {
            return Ok(());
        };

        match token.kind {
            TokenType::Partial | TokenType::Parent | TokenType::EndSection => {}
            _ => {
                return Err(Error::syntax(
                    format!(
                        "Invalid dynamic name: {} in {} tag",
                        name,
                        token.kind.tag_name()
                    ),
                    token,
                ));
            }
        }

        token.name = Some(stripped.trim_start().to_string());
        token.dynamic = true;
        Ok(())
    }

    fn enable_pragma(&mut self, name: &str) {
        self.pragmas.enable(name);
        match name.parse::<Pragma>() {
            Ok(Pragma::Blocks) => self.pragma_blocks = true,
            Ok(Pragma::Filters) => self.pragma_filters = true,
            Ok(Pragma::DynamicNames) => self.pragma_dynamic_names = true,
            _ => {}
        }
    }
}

/// Split `name | filter | filter` into the real name and its filter chain.
fn apply_filters(token: &mut Token) {
    let mut parts = token.name().split('|').map(|s| s.trim().to_string());
    let name = parts.next().unwrap_or_default();
    let filters: Vec<String> = parts.collect();
    if !filters.is_empty() {
        token.name = Some(name);
        token.filters = filters;
    }
}

fn check_allowed_in_parent(parent: Option<&Token>, token: &Token) -> Result<()> {
    if parent.is_some_and(|p| p.kind == TokenType::Parent) {
        return Err(Error::syntax("Illegal content in < parent tag", token));
    }
    Ok(())
}
