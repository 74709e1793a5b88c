use crate::error::{Error, Result};
use crate::tpl::ast::Delimiters;
use crate::tpl::engine::Engine;
use crate::tpl::render::render_internal;
use crate::tpl::render_context::Context;
use std::cell::RefCell;

/// Handed to section lambdas so they can render text against the live
/// context, using the delimiters the section was written with.
pub struct LambdaHelper<'a> {
    engine: &'a Engine,
    context: &'a RefCell<Context>,
    delimiters: Option<Delimiters>,
}

impl<'a> LambdaHelper<'a> {
    pub(crate) fn new(
        engine: &'a Engine,
        context: &'a RefCell<Context>,
        delimiters: Option<Delimiters>,
    ) -> Self {
        Self {
            engine,
            context,
            delimiters,
        }
    }

    pub fn render(&self, text: &str) -> Result<String> {
        let template = self.engine.load_lambda(text, self.delimiters.as_ref())?;
        let mut context = self.context.try_borrow_mut().map_err(|_| {
            Error::Runtime("lambda helper used while its context is borrowed".to_string())
        })?;
        render_internal(&template, self.engine, &mut context, "")
    }

    /// A helper sharing this context but rendering with other delimiters.
    pub fn with_delimiters(&self, delimiters: Delimiters) -> LambdaHelper<'a> {
        LambdaHelper {
            engine: self.engine,
            context: self.context,
            delimiters: (!delimiters.is_default()).then_some(delimiters),
        }
    }

    pub fn delimiters(&self) -> Option<&Delimiters> {
        self.delimiters.as_ref()
    }
}
