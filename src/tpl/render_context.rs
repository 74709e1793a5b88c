use crate::error::{Error, Result};
use crate::tpl::compiler::CompiledTemplate;
use crate::value::Value;
use indexmap::IndexMap;
use std::sync::Arc;

/// A block override: a block procedure of a particular compiled template.
#[derive(Clone)]
pub struct BlockRef {
    pub template: Arc<CompiledTemplate>,
    pub key: String,
}

/// Block overrides pushed by one `{{< parent }}` tag, by block name.
pub type BlockFrame = IndexMap<String, BlockRef>;

/// The value stack a template renders against.
///
/// Created fresh for each top-level render.
#[derive(Default)]
pub struct Context {
    stack: Vec<Value>,
    block_stack: Vec<BlockFrame>,
    buggy_property_shadowing: bool,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let null entries fall through to lower frames instead of masking them.
    pub fn with_buggy_property_shadowing(mut self, enabled: bool) -> Self {
        self.buggy_property_shadowing = enabled;
        self
    }

    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub fn pop(&mut self) -> Option<Value> {
        self.stack.pop()
    }

    pub fn last(&self) -> Option<&Value> {
        self.stack.last()
    }

    pub fn push_block_context(&mut self, frame: BlockFrame) {
        self.block_stack.push(frame);
    }

    pub fn pop_block_context(&mut self) -> Option<BlockFrame> {
        self.block_stack.pop()
    }

    /// Find `id` in the nearest frame that has it. Missing names resolve to
    /// an empty string.
    pub fn find(&self, id: &str) -> Result<Value> {
        for frame in self.stack.iter().rev() {
            if let Some(value) = frame.lookup(id, self.buggy_property_shadowing)? {
                return Ok(value);
            }
        }
        Ok(missing())
    }

    /// Resolve `a.b.c`: `a` through the whole stack, then each further
    /// segment inside the previous result only.
    pub fn find_dot(&self, id: &str) -> Result<Value> {
        let mut chunks = id.split('.');
        let first = chunks.next().unwrap_or_default();
        let value = self.find(first)?;
        self.descend(value, chunks)
    }

    /// Resolve `.a.b` starting at the top frame, without searching the stack.
    pub fn find_anchored_dot(&self, id: &str) -> Result<Value> {
        let mut chunks = id.split('.');
        if chunks.next() != Some("") {
            return Err(Error::InvalidArgument(format!(
                "Unexpected id for findAnchoredDot: {}",
                id
            )));
        }

        match self.last() {
            Some(top) => self.descend(top.clone(), chunks),
            None => Ok(missing()),
        }
    }

    /// The override for block `id`. The outermost frame wins, so the most
    /// derived template's version is used.
    pub fn find_in_block(&self, id: &str) -> Option<&BlockRef> {
        self.block_stack.iter().find_map(|frame| frame.get(id))
    }

    fn descend<'a>(&self, mut value: Value, chunks: impl Iterator<Item = &'a str>) -> Result<Value> {
        for chunk in chunks {
            if is_missing(&value) {
                return Ok(value);
            }
            value = value
                .lookup(chunk, self.buggy_property_shadowing)?
                .unwrap_or_else(missing);
        }
        Ok(value)
    }
}

fn missing() -> Value {
    Value::Str(String::new())
}

fn is_missing(value: &Value) -> bool {
    matches!(value, Value::Str(s) if s.is_empty())
}
