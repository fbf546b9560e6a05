//! ASCII normalization of agent text.

/// Maps typographic punctuation to ASCII and replaces any other non-ASCII
/// character with `?`.
#[must_use]
pub fn sanitize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{00AB}' | '\u{00BB}' => out.push('"'),
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => out.push('\''),
            '\u{2013}' | '\u{2014}' | '\u{2212}' => out.push('-'),
            '\u{2026}' => out.push_str("..."),
            '\u{2022}' | '\u{00B7}' => out.push('*'),
            '\u{00A0}' => out.push(' '),
            c if c.is_ascii() => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_typographic_punctuation() {
        let text = "\u{201C}Done\u{201D} \u{2014} it\u{2019}s fine\u{2026}\n\u{2022} item";
        assert_eq!(sanitize_text(text), "\"Done\" - it's fine...\n* item");
    }

    #[test]
    fn test_other_non_ascii_replaced() {
        assert_eq!(sanitize_text("caf\u{00E9} \u{1F680}"), "caf? ?");
    }

    #[test]
    fn test_ascii_untouched() {
        let code = "fn main() {\n    println!(\"hi\");\n}";
        assert_eq!(sanitize_text(code), code);
    }
}
