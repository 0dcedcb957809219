use std::fmt::Write;

use crate::config::DecompilerConfig;

use super::{Marker, Printer, ReferenceKind};

/// Accumulates printed source as a `String`.
#[derive(Debug, Default)]
pub struct PlainTextPrinter {
    output: String,
    indent_unit: String,
    indent_level: usize,
    escape_unicode: bool,
    show_line_numbers: bool,
    omit_optional_prefix: bool,
    /// Digits of the widest line number; zero disables the prefix.
    line_number_width: usize,
    /// Depth of suppressed optional prefixes.
    hidden: usize,
}

impl PlainTextPrinter {
    pub fn new(config: &DecompilerConfig) -> Self {
        PlainTextPrinter {
            indent_unit: config.indent.clone(),
            escape_unicode: config.escape_unicode_characters,
            show_line_numbers: config.show_line_numbers,
            omit_optional_prefix: config.omit_this_prefix,
            ..Default::default()
        }
    }

    pub fn as_str(&self) -> &str {
        &self.output
    }

    pub fn into_string(self) -> String {
        self.output
    }

    fn push(&mut self, text: &str) {
        if self.hidden > 0 {
            return;
        }
        if self.escape_unicode {
            self.output.push_str(&escape_unicode(text));
        } else {
            self.output.push_str(text);
        }
    }

    fn prefix(&mut self, line_number: Option<u32>) {
        if self.line_number_width == 0 {
            return;
        }
        let width = self.line_number_width;
        // Writing into a String cannot fail.
        let _ = match line_number {
            Some(n) => write!(self.output, "/* {n:>width$} */ "),
            None => write!(self.output, "/* {:width$} */ ", ""),
        };
    }
}

/// Escapes control characters as three-digit octal and everything outside
/// ASCII as UTF-16 `\uXXXX` units.
pub fn escape_unicode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii() && !c.is_ascii_control() {
            out.push(c);
        } else if c.is_ascii_control() {
            let _ = write!(out, "\\{:03o}", c as u32);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                let _ = write!(out, "\\u{:04X}", unit);
            }
        }
    }
    out
}

impl Printer for PlainTextPrinter {
    fn start(&mut self, max_line_number: u32, _major_version: u16, _minor_version: u16) {
        self.output.clear();
        self.indent_level = 0;
        self.hidden = 0;
        self.line_number_width = if self.show_line_numbers && max_line_number > 0 {
            max_line_number.to_string().len()
        } else {
            0
        };
    }

    fn end(&mut self) {}

    fn print_text(&mut self, text: &str) {
        self.push(text);
    }

    fn print_numeric_constant(&mut self, constant: &str) {
        self.push(constant);
    }

    fn print_string_constant(&mut self, constant: &str, _owner_internal_name: &str) {
        self.push(constant);
    }

    fn print_keyword(&mut self, keyword: &str) {
        self.push(keyword);
    }

    fn print_declaration(&mut self, _kind: ReferenceKind, _internal_name: &str, name: &str, _descriptor: &str) {
        self.push(name);
    }

    fn print_reference(
        &mut self,
        _kind: ReferenceKind,
        _internal_name: &str,
        name: &str,
        _descriptor: &str,
        _owner_internal_name: &str,
    ) {
        self.push(name);
    }

    fn indent(&mut self) {
        self.indent_level += 1;
    }

    fn unindent(&mut self) {
        self.indent_level = self.indent_level.saturating_sub(1);
    }

    fn start_line(&mut self, line_number: Option<u32>) {
        self.prefix(line_number);
        for _ in 0..self.indent_level {
            self.output.push_str(&self.indent_unit);
        }
    }

    fn end_line(&mut self) {
        self.output.push('\n');
    }

    fn extra_line(&mut self, count: u32) {
        for _ in 0..count {
            self.prefix(None);
            if self.line_number_width > 0 {
                // Keep blank lines free of trailing whitespace.
                let trimmed = self.output.trim_end_matches(' ').len();
                self.output.truncate(trimmed);
            }
            self.output.push('\n');
        }
    }

    fn start_marker(&mut self, marker: Marker) {
        if marker == Marker::OptionalPrefix && self.omit_optional_prefix {
            self.hidden += 1;
        }
    }

    fn end_marker(&mut self, marker: Marker) {
        if marker == Marker::OptionalPrefix && self.omit_optional_prefix {
            self.hidden = self.hidden.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn printer(config: DecompilerConfig) -> PlainTextPrinter {
        let mut p = PlainTextPrinter::new(&config);
        p.start(120, 52, 0);
        p
    }

    #[test]
    fn test_escape_unicode() {
        assert_eq!(escape_unicode("caf\u{e9}"), "caf\\u00E9");
        assert_eq!(escape_unicode("\u{1F600}"), "\\uD83D\\uDE00");
        assert_eq!(escape_unicode("a\u{1b}"), "a\\033");
        assert_eq!(escape_unicode("plain"), "plain");
    }

    #[test]
    fn test_line_number_prefix_and_indent() {
        let mut p = printer(DecompilerConfig {
            show_line_numbers: true,
            ..Default::default()
        });
        p.indent();
        p.start_line(Some(7));
        p.print_keyword("return");
        p.print_text(";");
        p.end_line();
        p.start_line(None);
        p.print_text("}");
        p.end_line();
        assert_eq!(p.as_str(), "/*   7 */     return;\n/*     */     }\n");
    }

    #[test]
    fn test_optional_prefix_is_hidden_when_omitted() {
        for (omit, expected) in [(true, "x = 1;"), (false, "this.x = 1;")] {
            let mut p = printer(DecompilerConfig {
                omit_this_prefix: omit,
                ..Default::default()
            });
            p.start_marker(Marker::OptionalPrefix);
            p.print_keyword("this");
            p.print_text(".");
            p.end_marker(Marker::OptionalPrefix);
            p.print_text("x = 1;");
            assert_eq!(p.as_str(), expected);
        }
    }
}
