use glob::glob;
use proc_macro::TokenStream;
use quote::quote;
use std::env;
use std::path::{Path, PathBuf};
use syn::{LitStr, parse_macro_input};

pub fn template_assets_impl(input: TokenStream) -> TokenStream {
    let pattern = parse_macro_input!(input as LitStr);
    let pattern_str = pattern.value();

    let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") else {
        return syn::Error::new(pattern.span(), "CARGO_MANIFEST_DIR is not set")
            .to_compile_error()
            .into();
    };
    let root = PathBuf::from(manifest_dir);
    let base = root.join(fixed_prefix(&pattern_str));
    let full_pattern = root.join(&pattern_str);

    let mut files: Vec<PathBuf> = match glob(&full_pattern.to_string_lossy()) {
        Ok(paths) => paths
            .filter_map(|entry| entry.ok())
            .filter(|path| path.is_file())
            .collect(),
        Err(e) => {
            return syn::Error::new(pattern.span(), format!("Invalid glob pattern: {}", e))
                .to_compile_error()
                .into();
        }
    };
    files.sort();

    let assets = files.iter().map(|path| {
        let name = template_name(&base, path);
        let file = path.to_string_lossy().to_string();
        quote! { (#name, include_str!(#file)) }
    });

    quote! {
        ::std::vec![ #(#assets),* ]
    }
    .into()
}

/// The directory part of the pattern before the first wildcard.
fn fixed_prefix(pattern: &str) -> &str {
    let wildcard = pattern.find(['*', '?', '[']).unwrap_or(pattern.len());
    match pattern[..wildcard].rfind('/') {
        Some(slash) => &pattern[..slash],
        None => "",
    }
}

fn template_name(base: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(base).unwrap_or(path);
    let relative = relative.with_extension("");
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_prefix() {
        assert_eq!(fixed_prefix("templates/**/*.mustache"), "templates");
        assert_eq!(fixed_prefix("a/b/c.mustache"), "a/b");
        assert_eq!(fixed_prefix("*.mustache"), "");
    }

    #[test]
    fn test_template_name() {
        let base = Path::new("/app/templates");
        assert_eq!(
            template_name(base, Path::new("/app/templates/layouts/base.mustache")),
            "layouts/base"
        );
        assert_eq!(
            template_name(base, Path::new("/app/templates/index.mustache")),
            "index"
        );
    }
}
