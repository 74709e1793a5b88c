pub mod ast;
pub mod cache;
pub mod compiler;
pub mod engine;
pub mod escape;
pub mod helpers;
pub mod lambda;
pub mod loader;
pub mod parser;
mod render;
pub mod render_context;
pub mod tokenizer;

pub use ast::{Delimiters, Pragma, Token, TokenType};
pub use cache::{Cache, FilesystemCache, MemoryCache, NoopCache};
pub use compiler::{CompiledTemplate, Compiler};
pub use engine::{Engine, EngineOptions, Template};
pub use escape::{EntityFlags, escape_html};
pub use helpers::HelperCollection;
pub use lambda::LambdaHelper;
pub use loader::{
    ArrayLoader, CascadingLoader, FilesystemLoader, FilesystemSource, InlineLoader, Loaded,
    Loader, MutableLoader, ProductionFilesystemLoader, Source, StringLoader,
};
pub use parser::Parser;
pub use render_context::Context;
pub use tokenizer::Tokenizer;
