use crate::error::{Error, Result};
use crate::tpl::ast::{Delimiters, Pragma, PragmaSet, Token, TokenType};
use crate::tpl::escape::EntityFlags;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// How a tag name is resolved against the context stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lookup {
    /// `.`, the top frame.
    Last,
    Find(String),
    FindDot(String),
    FindAnchoredDot(String),
}

/// A partial or parent name, fixed or resolved from the context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Name {
    Static(String),
    Dynamic(Lookup),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub name: String,
    pub lookup: Lookup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Escape {
    /// The engine's custom escape function.
    Custom,
    Html(u32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instr {
    Text {
        value: String,
        indent: bool,
    },
    Variable {
        lookup: Lookup,
        filters: Vec<Filter>,
        escape: bool,
        indent: bool,
    },
    Section {
        lookup: Lookup,
        filters: Vec<Filter>,
        key: String,
    },
    Inverted {
        lookup: Lookup,
        filters: Vec<Filter>,
        body: Vec<Instr>,
    },
    Partial {
        name: Name,
        indent: Option<String>,
    },
    /// `overrides` pairs block names with keys into `CompiledTemplate::blocks`.
    Parent {
        name: Name,
        overrides: Vec<(String, String)>,
    },
    BlockVar {
        name: String,
        default: Vec<Instr>,
    },
}

/// Shared by every use of one section: its raw text (for lambdas), the
/// delimiters it was written with, and its compiled body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionProc {
    pub source: String,
    pub delimiters: Option<Delimiters>,
    pub body: Vec<Instr>,
}

/// The compiled form of one template. This is what gets cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledTemplate {
    pub name: String,
    pub strict_callables: bool,
    pub escape: Escape,
    pub body: Vec<Instr>,
    pub sections: IndexMap<String, SectionProc>,
    pub blocks: IndexMap<String, Vec<Instr>>,
}

/// Engine settings that change the compiled output.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub custom_escape: bool,
    pub charset: String,
    pub strict_callables: bool,
    pub entity_flags: EntityFlags,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            custom_escape: false,
            charset: "UTF-8".to_string(),
            strict_callables: false,
            entity_flags: EntityFlags::default(),
        }
    }
}

/// Turns a parse tree into a [`CompiledTemplate`].
///
/// Identical sections (same delimiters and text) and identical block bodies
/// are stored once and shared by every tag that uses them.
#[derive(Default)]
pub struct Compiler {
    default_pragmas: Vec<Pragma>,
    pragmas: PragmaSet,
    sections: IndexMap<String, SectionProc>,
    blocks: IndexMap<String, Vec<Instr>>,
    source: String,
    indent_next_line: bool,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pragmas(&mut self, pragmas: &[Pragma]) {
        self.default_pragmas = pragmas.to_vec();
    }

    pub fn compile(
        &mut self,
        source: &str,
        tree: &[Token],
        name: &str,
        options: &CompileOptions,
    ) -> Result<CompiledTemplate> {
        self.pragmas = PragmaSet::new(&self.default_pragmas);
        self.sections = IndexMap::new();
        self.blocks = IndexMap::new();
        self.source = source.to_string();
        self.indent_next_line = true;

        let body = self.walk(tree)?;
        let escape = if options.custom_escape {
            Escape::Custom
        } else {
            Escape::Html(options.entity_flags.bits())
        };

        Ok(CompiledTemplate {
            name: name.to_string(),
            strict_callables: options.strict_callables,
            escape,
            body,
            sections: std::mem::take(&mut self.sections),
            blocks: std::mem::take(&mut self.blocks),
        })
    }

    fn walk(&mut self, nodes: &[Token]) -> Result<Vec<Instr>> {
        let mut code = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node.kind {
                TokenType::Pragma => self.pragmas.enable(node.name()),
                TokenType::Section => code.push(self.section(node)?),
                TokenType::Inverted => code.push(Instr::Inverted {
                    lookup: self.lookup(node.name()),
                    filters: self.filters(&node.filters),
                    body: self.walk(node.nodes())?,
                }),
                TokenType::Partial => code.push(Instr::Partial {
                    name: self.name(node),
                    indent: node.indent.clone().filter(|s| !s.is_empty()),
                }),
                TokenType::Parent => code.push(self.parent(node)?),
                TokenType::BlockVar => code.push(Instr::BlockVar {
                    name: node.name().to_string(),
                    default: self.walk(node.nodes())?,
                }),
                TokenType::Comment => {}
                TokenType::Escaped | TokenType::Unescaped | TokenType::UnescapedAmp => {
                    code.push(Instr::Variable {
                        lookup: self.lookup(node.name()),
                        filters: self.filters(&node.filters),
                        escape: node.kind == TokenType::Escaped,
                        indent: self.flush_indent(),
                    })
                }
                TokenType::Text => {
                    let indent = self.flush_indent();
                    self.indent_next_line = node.value().ends_with('\n');
                    code.push(Instr::Text {
                        value: node.value().to_string(),
                        indent,
                    });
                }
                _ => {
                    return Err(Error::syntax(
                        format!("Unknown token type: {}", node.kind),
                        node,
                    ));
                }
            }
        }
        Ok(code)
    }

    fn section(&mut self, node: &Token) -> Result<Instr> {
        let start = node.index.unwrap_or_default();
        let end = node.end.unwrap_or(start);
        let source = self.source.get(start..end).unwrap_or_default().to_string();
        let delimiters = node.delimiters.clone().filter(|d| !d.is_default());
        let delim_tag = delimiters.as_ref().map(Delimiters::to_tag).unwrap_or_default();

        let key = hash(format!("{}\n{}", delim_tag, source).as_bytes());
        if !self.sections.contains_key(&key) {
            let body = self.walk(node.nodes())?;
            self.sections.insert(
                key.clone(),
                SectionProc {
                    source,
                    delimiters,
                    body,
                },
            );
        }

        Ok(Instr::Section {
            lookup: self.lookup(node.name()),
            filters: self.filters(&node.filters),
            key,
        })
    }

    fn parent(&mut self, node: &Token) -> Result<Instr> {
        let mut overrides = Vec::new();
        // everything but block arguments is scaffolding here
        for child in node.nodes().iter().filter(|n| n.kind == TokenType::BlockArg) {
            let key = self.block(child.nodes())?;
            overrides.push((child.name().to_string(), key));
        }

        Ok(Instr::Parent {
            name: self.name(node),
            overrides,
        })
    }

    fn block(&mut self, nodes: &[Token]) -> Result<String> {
        let body = self.walk(nodes)?;
        let key = hash(&serde_json::to_vec(&body)?);
        self.blocks.entry(key.clone()).or_insert(body);
        Ok(key)
    }

    fn name(&self, node: &Token) -> Name {
        if node.dynamic {
            Name::Dynamic(self.lookup(node.name()))
        } else {
            Name::Static(node.name().to_string())
        }
    }

    fn filters(&self, names: &[String]) -> Vec<Filter> {
        names
            .iter()
            .map(|name| Filter {
                name: name.clone(),
                lookup: self.lookup(name),
            })
            .collect()
    }

    fn lookup(&self, id: &str) -> Lookup {
        if id == "." {
            Lookup::Last
        } else if self.pragmas.contains(Pragma::AnchoredDot) && id.starts_with('.') {
            Lookup::FindAnchoredDot(id.to_string())
        } else if !id.contains('.') {
            Lookup::Find(id.to_string())
        } else {
            Lookup::FindDot(id.to_string())
        }
    }

    fn flush_indent(&mut self) -> bool {
        std::mem::replace(&mut self.indent_next_line, false)
    }
}

pub(crate) fn hash(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}
