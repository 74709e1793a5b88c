use crate::error::{Error, Result};
use crate::tpl::ast::{Delimiters, Pragma};
use crate::tpl::cache::{Cache, NoopCache};
use crate::tpl::compiler::{CompileOptions, CompiledTemplate, Compiler, hash};
use crate::tpl::escape::{EntityFlags, EscapeFn};
use crate::tpl::helpers::HelperCollection;
use crate::tpl::loader::{ArrayLoader, Loaded, Loader, StringLoader};
use crate::tpl::parser::Parser;
use crate::tpl::render::render_internal;
use crate::tpl::render_context::Context;
use crate::tpl::tokenizer::Tokenizer;
use crate::value::{Object, Value, to_value};
use dashmap::DashMap;
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine configuration, built with chained setters.
pub struct EngineOptions {
    template_class_prefix: String,
    cache: Arc<dyn Cache>,
    cache_lambda_templates: bool,
    loader: Arc<dyn Loader>,
    partials_loader: Option<Arc<dyn Loader>>,
    partials: Option<IndexMap<String, String>>,
    helpers: HelperCollection,
    escape: Option<EscapeFn>,
    entity_flags: EntityFlags,
    charset: String,
    strict_callables: bool,
    delimiters: Option<String>,
    pragmas: Vec<String>,
    buggy_property_shadowing: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            template_class_prefix: "__Stache_".to_string(),
            cache: Arc::new(NoopCache),
            cache_lambda_templates: false,
            loader: Arc::new(StringLoader),
            partials_loader: None,
            partials: None,
            helpers: HelperCollection::new(),
            escape: None,
            entity_flags: EntityFlags::default(),
            charset: "UTF-8".to_string(),
            strict_callables: true,
            delimiters: None,
            pragmas: Vec::new(),
            buggy_property_shadowing: false,
        }
    }
}

impl EngineOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn template_class_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.template_class_prefix = prefix.into();
        self
    }

    pub fn cache(mut self, cache: impl Cache + 'static) -> Self {
        self.cache = Arc::new(cache);
        self
    }

    /// Share one cache between engines.
    pub fn shared_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = cache;
        self
    }

    /// Also cache templates compiled from lambda output.
    pub fn cache_lambda_templates(mut self, enabled: bool) -> Self {
        self.cache_lambda_templates = enabled;
        self
    }

    pub fn loader(mut self, loader: impl Loader + 'static) -> Self {
        self.loader = Arc::new(loader);
        self
    }

    pub fn partials_loader(mut self, loader: impl Loader + 'static) -> Self {
        self.partials_loader = Some(Arc::new(loader));
        self
    }

    pub fn partials<I, K, V>(mut self, partials: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.partials = Some(
            partials
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    pub fn helpers(mut self, helpers: HelperCollection) -> Self {
        self.helpers = helpers;
        self
    }

    pub fn helper(mut self, name: impl Into<String>, helper: impl Into<Value>) -> Self {
        self.helpers.add(name, helper);
        self
    }

    pub fn escape<F>(mut self, escape: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.escape = Some(Arc::new(escape));
        self
    }

    pub fn entity_flags(mut self, flags: EntityFlags) -> Self {
        self.entity_flags = flags;
        self
    }

    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = charset.into();
        self
    }

    pub fn strict_callables(mut self, strict: bool) -> Self {
        self.strict_callables = strict;
        self
    }

    /// Starting delimiters, e.g. `"<% %>"`.
    pub fn delimiters(mut self, delimiters: impl Into<String>) -> Self {
        self.delimiters = Some(delimiters.into());
        self
    }

    /// Pragmas enabled for every template.
    pub fn pragmas<I>(mut self, pragmas: I) -> Self
    where
        I: IntoIterator,
        I::Item: ToString,
    {
        self.pragmas = pragmas.into_iter().map(|p| p.to_string()).collect();
        self
    }

    /// Let a null value in an upper frame fall through to lower frames.
    pub fn buggy_property_shadowing(mut self, enabled: bool) -> Self {
        self.buggy_property_shadowing = enabled;
        self
    }
}

/// Loads, compiles, caches and renders templates.
///
/// Compiled templates are remembered by class name for the life of the
/// engine, on top of whatever the configured [`Cache`] keeps.
pub struct Engine {
    template_class_prefix: String,
    cache: Arc<dyn Cache>,
    lambda_cache: Arc<dyn Cache>,
    loader: Arc<dyn Loader>,
    partials_loader: Option<Arc<dyn Loader>>,
    helpers: Arc<HelperCollection>,
    escape: Option<EscapeFn>,
    entity_flags: EntityFlags,
    charset: String,
    strict_callables: bool,
    delimiters: Option<Delimiters>,
    pragmas: Vec<Pragma>,
    buggy_property_shadowing: bool,
    templates: DashMap<String, Arc<CompiledTemplate>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::build(EngineOptions::default(), None, Vec::new())
    }
}

impl Engine {
    pub fn new(mut options: EngineOptions) -> Result<Self> {
        if options.template_class_prefix.is_empty() {
            return Err(Error::InvalidArgument(
                "Template class prefix must not be empty".to_string(),
            ));
        }

        if !matches!(
            options.charset.to_ascii_uppercase().as_str(),
            "UTF-8" | "UTF8"
        ) {
            return Err(Error::InvalidArgument(format!(
                "Unsupported charset: {}",
                options.charset
            )));
        }

        let delimiters = options
            .delimiters
            .as_deref()
            .map(Delimiters::parse)
            .transpose()?
            .filter(|d| !d.is_default());

        let mut pragmas: Vec<Pragma> = Vec::with_capacity(options.pragmas.len());
        for name in &options.pragmas {
            let pragma = name.parse::<Pragma>()?;
            if !pragmas.contains(&pragma) {
                pragmas.push(pragma);
            }
        }
        pragmas.sort();

        let partials = options.partials.take();
        let mut engine = Self::build(options, delimiters, pragmas);
        if let Some(partials) = partials {
            engine.set_partials(partials)?;
        }
        Ok(engine)
    }

    fn build(options: EngineOptions, delimiters: Option<Delimiters>, pragmas: Vec<Pragma>) -> Self {
        let lambda_cache: Arc<dyn Cache> = if options.cache_lambda_templates {
            options.cache.clone()
        } else {
            Arc::new(NoopCache)
        };

        Self {
            template_class_prefix: options.template_class_prefix,
            cache: options.cache,
            lambda_cache,
            loader: options.loader,
            partials_loader: options.partials_loader,
            helpers: Arc::new(options.helpers),
            escape: options.escape,
            entity_flags: options.entity_flags,
            charset: options.charset,
            strict_callables: options.strict_callables,
            delimiters,
            pragmas,
            buggy_property_shadowing: options.buggy_property_shadowing,
            templates: DashMap::new(),
        }
    }

    /// Load the template called `name` and render it with `data`.
    pub fn render<T: ?Sized + Serialize>(&self, name: &str, data: &T) -> Result<String> {
        self.load_template(name)?.render(data)
    }

    pub fn render_value(&self, name: &str, data: Value) -> Result<String> {
        self.load_template(name)?.render_value(data)
    }

    pub fn load_template(&self, name: &str) -> Result<Template<'_>> {
        let loaded = self.loader.load(name)?;
        let compiled = self.load_source(loaded, None, self.cache.as_ref())?;
        Ok(Template {
            engine: self,
            compiled,
        })
    }

    /// A missing partial renders as nothing; other failures propagate.
    pub fn load_partial(&self, name: &str) -> Result<Option<Arc<CompiledTemplate>>> {
        let loader = match &self.partials_loader {
            Some(loader) => loader.as_ref(),
            None if self.loader.serves_partials() => self.loader.as_ref(),
            None => {
                warn!(partial = name, "Partial not found, no partials loader configured");
                return Ok(None);
            }
        };

        match loader.load(name) {
            Ok(loaded) => self
                .load_source(loaded, None, self.cache.as_ref())
                .map(Some),
            Err(Error::UnknownTemplate(_)) => {
                warn!(partial = name, "Partial not found");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Compile text produced by a lambda, optionally under non-default
    /// starting delimiters. Uses the regular cache only when
    /// `cache_lambda_templates` is on.
    pub fn load_lambda(
        &self,
        source: &str,
        delimiters: Option<&Delimiters>,
    ) -> Result<Arc<CompiledTemplate>> {
        let delimiters = delimiters.filter(|d| !d.is_default());
        self.load_source(
            Loaded::Text(source.to_string()),
            delimiters,
            self.lambda_cache.as_ref(),
        )
    }

    /// Replace every partial. A partials loader is created when none is set.
    pub fn set_partials(&mut self, partials: IndexMap<String, String>) -> Result<()> {
        match &self.partials_loader {
            None => {
                self.partials_loader = Some(Arc::new(ArrayLoader::with_templates(partials)));
                Ok(())
            }
            Some(loader) => match loader.as_mutable() {
                Some(mutable) => {
                    mutable.set_templates(partials);
                    Ok(())
                }
                None => Err(Error::Runtime(
                    "Unable to set partials on an immutable loader".to_string(),
                )),
            },
        }
    }

    pub fn set_partials_loader(&mut self, loader: impl Loader + 'static) {
        self.partials_loader = Some(Arc::new(loader));
    }

    pub fn helpers(&self) -> &HelperCollection {
        &self.helpers
    }

    pub fn add_helper(&mut self, name: impl Into<String>, helper: impl Into<Value>) {
        Arc::make_mut(&mut self.helpers).add(name, helper);
    }

    pub fn has_helper(&self, name: &str) -> bool {
        self.helpers.has(name)
    }

    pub fn remove_helper(&mut self, name: &str) -> Result<Value> {
        Arc::make_mut(&mut self.helpers).remove(name)
    }

    pub fn escape(&self) -> Option<&EscapeFn> {
        self.escape.as_ref()
    }

    pub fn entity_flags(&self) -> EntityFlags {
        self.entity_flags
    }

    pub fn charset(&self) -> &str {
        &self.charset
    }

    pub fn pragmas(&self) -> &[Pragma] {
        &self.pragmas
    }

    pub fn delimiters(&self) -> Option<&Delimiters> {
        self.delimiters.as_ref()
    }

    pub fn strict_callables(&self) -> bool {
        self.strict_callables
    }

    pub fn template_class_prefix(&self) -> &str {
        &self.template_class_prefix
    }

    /// The cache key for a template: the prefix plus a digest of every
    /// setting that changes compiled output, and of the source itself (or
    /// the source's own key).
    pub fn template_class_name(
        &self,
        source: &Loaded,
        delimiters: Option<&Delimiters>,
    ) -> Result<String> {
        let delimiters = delimiters
            .or(self.delimiters.as_ref())
            .map(ToString::to_string)
            .unwrap_or_else(|| "{{ }}".to_string());
        let key = match source {
            Loaded::Text(_) => "source".to_string(),
            Loaded::Source(source) => source.key()?,
        };
        let pragmas: Vec<&str> = self.pragmas.iter().map(Pragma::as_str).collect();
        let escape = if self.escape.is_some() { "custom" } else { "default" };

        let chunks = serde_json::json!({
            "charset": self.charset,
            "delimiters": delimiters,
            "entityFlags": self.entity_flags.bits(),
            "escape": escape,
            "key": key,
            "pragmas": pragmas,
            "strictCallables": self.strict_callables,
            "version": VERSION,
        });

        let mut digest = serde_json::to_string(&chunks)?;
        if let Loaded::Text(text) = source {
            digest.push('\n');
            digest.push_str(text);
        }
        Ok(format!(
            "{}{}",
            self.template_class_prefix,
            hash(digest.as_bytes())
        ))
    }

    fn load_source(
        &self,
        loaded: Loaded,
        delimiters: Option<&Delimiters>,
        cache: &dyn Cache,
    ) -> Result<Arc<CompiledTemplate>> {
        let class_name = self.template_class_name(&loaded, delimiters)?;
        if let Some(compiled) = self.templates.get(&class_name) {
            return Ok(compiled.value().clone());
        }

        let compiled = match cache.load(&class_name)? {
            Some(stored) => match serde_json::from_str::<CompiledTemplate>(&stored) {
                Ok(compiled) => compiled,
                Err(e) => {
                    warn!(class_name = %class_name, error = %e, "Discarding unreadable cached template");
                    self.compile_and_cache(&loaded, delimiters, &class_name, cache)?
                }
            },
            None => self.compile_and_cache(&loaded, delimiters, &class_name, cache)?,
        };

        debug!(class_name = %class_name, "Instantiating template");
        let compiled = Arc::new(compiled);
        self.templates.insert(class_name, compiled.clone());
        Ok(compiled)
    }

    fn compile_and_cache(
        &self,
        loaded: &Loaded,
        delimiters: Option<&Delimiters>,
        class_name: &str,
        cache: &dyn Cache,
    ) -> Result<CompiledTemplate> {
        let source = match loaded {
            Loaded::Text(text) => text.clone(),
            Loaded::Source(source) => source.source()?,
        };
        info!(class_name, "Compiling template");
        let compiled = self.compile(&source, delimiters, class_name)?;
        cache.cache(class_name, &serde_json::to_string(&compiled)?)?;
        Ok(compiled)
    }

    fn compile(
        &self,
        source: &str,
        delimiters: Option<&Delimiters>,
        class_name: &str,
    ) -> Result<CompiledTemplate> {
        let delimiters = delimiters.or(self.delimiters.as_ref());
        let tokens = Tokenizer::new().scan(source, delimiters)?;

        let mut parser = Parser::new();
        parser.set_pragmas(&self.pragmas);
        let tree = parser.parse(tokens)?;

        let mut compiler = Compiler::new();
        compiler.set_pragmas(&self.pragmas);
        let options = CompileOptions {
            custom_escape: self.escape.is_some(),
            charset: self.charset.clone(),
            strict_callables: self.strict_callables,
            entity_flags: self.entity_flags,
        };
        compiler.compile(source, &tree, class_name, &options)
    }

    fn context(&self) -> Context {
        let mut context =
            Context::new().with_buggy_property_shadowing(self.buggy_property_shadowing);
        if !self.helpers.is_empty() {
            let helpers: Arc<dyn Object> = self.helpers.clone();
            context.push(Value::Object(helpers));
        }
        context
    }
}

/// A compiled template bound to the engine that loaded it.
pub struct Template<'e> {
    engine: &'e Engine,
    compiled: Arc<CompiledTemplate>,
}

impl Template<'_> {
    pub fn name(&self) -> &str {
        &self.compiled.name
    }

    pub fn compiled(&self) -> &Arc<CompiledTemplate> {
        &self.compiled
    }

    pub fn render<T: ?Sized + Serialize>(&self, data: &T) -> Result<String> {
        self.render_value(to_value(data)?)
    }

    pub fn render_value(&self, data: Value) -> Result<String> {
        let mut context = self.engine.context();
        if !data.is_empty() {
            context.push(data);
        }
        render_internal(&self.compiled, self.engine, &mut context, "")
    }
}
