use bitflags::bitflags;
use std::sync::Arc;

/// A custom escaper for `{{ escaped }}` tags.
pub type EscapeFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

bitflags! {
    /// Options for the default HTML escaper.
    ///
    /// The bit values feed into template class names, so they must stay fixed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EntityFlags: u32 {
        /// Escape double quotes only.
        const COMPAT = 2;
        /// Escape double and single quotes.
        const QUOTES = 3;
        const IGNORE = 4;
        const SUBSTITUTE = 8;
        /// Zero-valued: the absence of any other doctype flag.
        const HTML401 = 0;
        const XML1 = 16;
        const XHTML = 32;
        const HTML5 = 48;
    }
}

impl Default for EntityFlags {
    fn default() -> Self {
        EntityFlags::QUOTES | EntityFlags::SUBSTITUTE | EntityFlags::HTML401
    }
}

const DOCTYPE_MASK: u32 = 48;

/// Escape `&`, `<` and `>`, plus quotes as `flags` ask.
pub fn escape_html(text: &str, flags: EntityFlags) -> String {
    let double = flags.bits() & EntityFlags::COMPAT.bits() != 0;
    let single = flags.contains(EntityFlags::QUOTES);
    let apos = if flags.bits() & DOCTYPE_MASK == 0 {
        "&#039;"
    } else {
        "&apos;"
    };

    let mut out = String::with_capacity(text.len() + text.len() / 8);
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if double => out.push_str("&quot;"),
            '\'' if single => out.push_str(apos),
            _ => out.push(c),
        }
    }
    out
}
