use proc_macro::TokenStream;

mod assets;

/// Embed every file matching a glob (relative to the calling crate's
/// `Cargo.toml`) as `(name, contents)` pairs.
///
/// Names are paths relative to the pattern's fixed prefix, without the file
/// extension: `templates/**/*.mustache` turns
/// `templates/layouts/base.mustache` into `layouts/base`.
///
/// ```ignore
/// let loader = stache::tpl::ArrayLoader::from_assets(
///     stache::template_assets!("templates/**/*.mustache"),
/// );
/// ```
#[proc_macro]
pub fn template_assets(input: TokenStream) -> TokenStream {
    assets::template_assets_impl(input)
}
