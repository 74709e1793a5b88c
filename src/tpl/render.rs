use crate::error::{Error, Result};
use crate::tpl::compiler::{CompiledTemplate, Escape, Filter, Instr, Lookup, Name, SectionProc};
use crate::tpl::engine::Engine;
use crate::tpl::escape::{EntityFlags, escape_html};
use crate::tpl::lambda::LambdaHelper;
use crate::tpl::render_context::{BlockFrame, BlockRef, Context};
use crate::value::{Lambda, Value};
use std::cell::RefCell;
use std::sync::Arc;

/// Render a compiled template against `ctx`, prefixing indented lines with
/// `indent`.
pub fn render_internal(
    template: &Arc<CompiledTemplate>,
    engine: &Engine,
    ctx: &mut Context,
    indent: &str,
) -> Result<String> {
    let mut buf = String::new();
    Renderer { engine, template }.render(&template.body, ctx, indent, &mut buf)?;
    Ok(buf)
}

struct Renderer<'r> {
    engine: &'r Engine,
    template: &'r Arc<CompiledTemplate>,
}

impl Renderer<'_> {
    fn render(&self, code: &[Instr], ctx: &mut Context, indent: &str, buf: &mut String) -> Result<()> {
        for instr in code {
            match instr {
                Instr::Text {
                    value,
                    indent: indented,
                } => {
                    if *indented {
                        buf.push_str(indent);
                    }
                    buf.push_str(value);
                }
                Instr::Variable {
                    lookup,
                    filters,
                    escape,
                    indent: indented,
                } => {
                    let value = self.find(ctx, lookup)?;
                    let value = self.resolve_value(value, ctx)?;
                    let value = self.apply_filters(value, filters, ctx)?;
                    if *indented {
                        buf.push_str(indent);
                    }
                    let text = value.to_text();
                    if *escape {
                        buf.push_str(&self.escape(&text));
                    } else {
                        buf.push_str(&text);
                    }
                }
                Instr::Section {
                    lookup,
                    filters,
                    key,
                } => {
                    let value = self.find(ctx, lookup)?;
                    let value = self.apply_filters(value, filters, ctx)?;
                    if let Some(section) = self.template.sections.get(key) {
                        self.section(section, value, ctx, indent, buf)?;
                    }
                }
                Instr::Inverted {
                    lookup,
                    filters,
                    body,
                } => {
                    let value = self.find(ctx, lookup)?;
                    let value = self.apply_filters(value, filters, ctx)?;
                    if value.is_empty() {
                        self.render(body, ctx, indent, buf)?;
                    }
                }
                Instr::Partial {
                    name,
                    indent: captured,
                } => {
                    let name = self.resolve_name(name, ctx)?;
                    if let Some(partial) = self.engine.load_partial(&name)? {
                        let partial_indent = match captured {
                            Some(captured) => format!("{}{}", indent, captured),
                            None => String::new(),
                        };
                        buf.push_str(&render_internal(&partial, self.engine, ctx, &partial_indent)?);
                    }
                }
                Instr::Parent { name, overrides } => {
                    let name = self.resolve_name(name, ctx)?;
                    let Some(parent) = self.engine.load_partial(&name)? else {
                        continue;
                    };

                    if overrides.is_empty() {
                        buf.push_str(&render_internal(&parent, self.engine, ctx, indent)?);
                        continue;
                    }

                    let frame: BlockFrame = overrides
                        .iter()
                        .map(|(block, key)| {
                            let block_ref = BlockRef {
                                template: self.template.clone(),
                                key: key.clone(),
                            };
                            (block.clone(), block_ref)
                        })
                        .collect();
                    ctx.push_block_context(frame);
                    let rendered = render_internal(&parent, self.engine, ctx, indent);
                    ctx.pop_block_context();
                    buf.push_str(&rendered?);
                }
                Instr::BlockVar { name, default } => match ctx.find_in_block(name).cloned() {
                    Some(block) => {
                        if let Some(body) = block.template.blocks.get(&block.key) {
                            let owner = Renderer {
                                engine: self.engine,
                                template: &block.template,
                            };
                            owner.render(body, ctx, "", buf)?;
                        }
                    }
                    None => self.render(default, ctx, indent, buf)?,
                },
            }
        }
        Ok(())
    }

    fn section(
        &self,
        section: &SectionProc,
        value: Value,
        ctx: &mut Context,
        indent: &str,
        buf: &mut String,
    ) -> Result<()> {
        if let Some(lambda) = value.callable(self.template.strict_callables) {
            let result = self.call_section_lambda(&lambda, section, ctx)?;
            let open = section
                .delimiters
                .as_ref()
                .map(|d| d.open.as_str())
                .unwrap_or("{{");
            if result.contains(open) {
                let template = self
                    .engine
                    .load_lambda(&result, section.delimiters.as_ref())?;
                buf.push_str(&render_internal(&template, self.engine, ctx, "")?);
            } else {
                buf.push_str(&result);
            }
            return Ok(());
        }

        if value.is_empty() {
            return Ok(());
        }

        let values = match value.iterable() {
            Some(values) => values,
            None => vec![value],
        };
        for value in values {
            ctx.push(value);
            let rendered = self.render(&section.body, ctx, indent, buf);
            ctx.pop();
            rendered?;
        }
        Ok(())
    }

    /// The helper needs shared access to the context, so it is moved into a
    /// cell for the duration of the call and put back afterwards.
    fn call_section_lambda(
        &self,
        lambda: &Lambda,
        section: &SectionProc,
        ctx: &mut Context,
    ) -> Result<String> {
        let cell = RefCell::new(std::mem::take(ctx));
        let result = {
            let helper = LambdaHelper::new(self.engine, &cell, section.delimiters.clone());
            lambda.call(&[Value::Str(section.source.clone())], Some(&helper))
        };
        *ctx = cell.into_inner();
        // Lambda output is not re-indented inside an indented partial.
        Ok(result?.to_text())
    }

    fn find(&self, ctx: &Context, lookup: &Lookup) -> Result<Value> {
        match lookup {
            Lookup::Last => Ok(ctx.last().cloned().unwrap_or_default()),
            Lookup::Find(id) => ctx.find(id),
            Lookup::FindDot(id) => ctx.find_dot(id),
            Lookup::FindAnchoredDot(id) => ctx.find_anchored_dot(id),
        }
    }

    /// Callables found by interpolation are called and their output rendered
    /// as a template.
    fn resolve_value(&self, value: Value, ctx: &mut Context) -> Result<Value> {
        let Some(lambda) = value.callable(self.template.strict_callables) else {
            return Ok(value);
        };

        let source = lambda.call(&[], None)?.to_text();
        let template = self.engine.load_lambda(&source, None)?;
        render_internal(&template, self.engine, ctx, "").map(Value::Str)
    }

    fn apply_filters(&self, mut value: Value, filters: &[Filter], ctx: &Context) -> Result<Value> {
        for filter in filters {
            let Some(lambda) = self
                .find(ctx, &filter.lookup)?
                .callable(self.template.strict_callables)
            else {
                return Err(Error::UnknownFilter(filter.name.clone()));
            };
            value = lambda.call(&[value], None)?;
        }
        Ok(value)
    }

    fn resolve_name(&self, name: &Name, ctx: &mut Context) -> Result<String> {
        match name {
            Name::Static(name) => Ok(name.clone()),
            Name::Dynamic(lookup) => {
                let value = self.find(ctx, lookup)?;
                Ok(self.resolve_value(value, ctx)?.to_text())
            }
        }
    }

    fn escape(&self, text: &str) -> String {
        match (self.template.escape, self.engine.escape()) {
            (Escape::Custom, Some(escape)) => escape(text),
            (Escape::Html(bits), _) => escape_html(text, EntityFlags::from_bits_retain(bits)),
            (Escape::Custom, None) => escape_html(text, EntityFlags::default()),
        }
    }
}
