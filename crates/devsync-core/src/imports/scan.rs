//! Import specifier scanner.
//!
//! Scans JavaScript/TypeScript source code for module specifiers without
//! full parsing. Strings, template literals, comments, and regex literals
//! are skipped so specifier-like text inside them is not reported.

use std::collections::HashMap;
use thiserror::Error;

/// How a specifier was referenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportKind {
    /// `import x from "y"`
    Static,
    /// `import "y"`
    SideEffect,
    /// `import("y")`
    Dynamic,
    /// `export ... from "y"`
    ReExport,
    /// `require("y")`
    Require,
    /// `import type ... from "y"` / `export type ... from "y"`; erased at runtime.
    TypeOnly,
}

impl ImportKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::SideEffect => "side_effect",
            Self::Dynamic => "dynamic",
            Self::ReExport => "re_export",
            Self::Require => "require",
            Self::TypeOnly => "type_only",
        }
    }

    /// Whether the import survives type erasure.
    #[must_use]
    pub fn is_runtime(self) -> bool {
        !matches!(self, Self::TypeOnly)
    }
}

/// Import specifier found in source code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpec {
    /// Specifier exactly as written.
    pub specifier: String,
    pub kind: ImportKind,
    /// Line of the introducing keyword (1-indexed).
    pub line: u32,
}

impl ImportSpec {
    #[must_use]
    pub fn new(specifier: impl Into<String>, kind: ImportKind, line: u32) -> Self {
        Self {
            specifier: specifier.into(),
            kind,
            line,
        }
    }
}

/// Source that cannot be tokenized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("unterminated string literal on line {line}")]
    UnterminatedString { line: u32 },

    #[error("unterminated block comment starting on line {line}")]
    UnterminatedComment { line: u32 },

    #[error("unterminated template literal starting on line {line}")]
    UnterminatedTemplate { line: u32 },
}

/// Scan source code for module specifiers.
///
/// Returns discovered imports in first-appearance order, deduplicated by
/// specifier. A specifier seen both type-only and at runtime is reported
/// with its runtime kind.
pub fn scan_imports(source: &str) -> Result<Vec<ImportSpec>, ScanError> {
    let mut scanner = Scanner::new(source);
    let mut results: Vec<ImportSpec> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    while let Some(found) = scanner.next_import()? {
        if found.specifier.is_empty() {
            continue;
        }
        match index.get(&found.specifier) {
            Some(&i) => {
                if !results[i].kind.is_runtime() && found.kind.is_runtime() {
                    results[i].kind = found.kind;
                }
            }
            None => {
                index.insert(found.specifier.clone(), results.len());
                results.push(found);
            }
        }
    }

    Ok(results)
}

/// Specifiers a module loads at runtime, in first-appearance order.
pub fn resolve_imports(source: &str) -> Result<Vec<String>, ScanError> {
    Ok(scan_imports(source)?
        .into_iter()
        .filter(|spec| spec.kind.is_runtime())
        .map(|spec| spec.specifier)
        .collect())
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

/// Whether a `/` after `prev` starts a regex literal rather than a division.
fn regex_allowed(prev: Option<u8>) -> bool {
    match prev {
        None => true,
        Some(b) => b"(,=:[!&|?{};+-*%~^".contains(&b),
    }
}

/// Words that cannot appear inside an import/export clause.
const CLAUSE_BREAKERS: &[&str] = &[
    "import", "export", "require", "const", "let", "var", "function", "class",
];

#[derive(Clone, Copy)]
struct Checkpoint {
    pos: usize,
    line: u32,
    prev: Option<u8>,
}

struct Scanner<'a> {
    src: &'a [u8],
    pos: usize,
    line: u32,
    /// Last significant byte consumed.
    prev: Option<u8>,
}

impl<'a> Scanner<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            src: source.as_bytes(),
            pos: 0,
            line: 1,
            prev: None,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
        }
        Some(b)
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            pos: self.pos,
            line: self.line,
            prev: self.prev,
        }
    }

    fn restore(&mut self, cp: Checkpoint) {
        self.pos = cp.pos;
        self.line = cp.line;
        self.prev = cp.prev;
    }

    fn lossy(&self, start: usize, end: usize) -> String {
        String::from_utf8_lossy(&self.src[start..end]).into_owned()
    }

    fn next_import(&mut self) -> Result<Option<ImportSpec>, ScanError> {
        loop {
            self.skip_trivia()?;
            let Some(b) = self.peek() else {
                return Ok(None);
            };

            match b {
                b'"' | b'\'' => {
                    // An apostrophe glued to a word is prose (JSX text), not a literal.
                    if self.pos > 0 && is_ident_byte(self.src[self.pos - 1]) {
                        self.pos += 1;
                    } else {
                        self.skip_quoted();
                    }
                }
                b'`' => {
                    self.read_template()?;
                }
                b'/' if regex_allowed(self.prev) => self.skip_regex(),
                b if is_ident_byte(b) => {
                    let after_dot = self.prev == Some(b'.');
                    let line = self.line;
                    let word = self.read_word();
                    if after_dot {
                        continue;
                    }
                    let found = match word {
                        "import" => self.after_import(line)?,
                        "export" => self.after_export(line)?,
                        "require" => self.after_require(line)?,
                        _ => None,
                    };
                    if found.is_some() {
                        return Ok(found);
                    }
                }
                _ => {
                    self.bump();
                    self.prev = Some(b);
                }
            }
        }
    }

    /// Skip whitespace and comments.
    fn skip_trivia(&mut self) -> Result<(), ScanError> {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(b), _) if b.is_ascii_whitespace() => {
                    self.bump();
                }
                (Some(b'/'), Some(b'/')) => {
                    while self.peek().is_some_and(|b| b != b'\n') {
                        self.pos += 1;
                    }
                }
                (Some(b'/'), Some(b'*')) => self.skip_block_comment()?,
                _ => return Ok(()),
            }
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), ScanError> {
        let line = self.line;
        self.pos += 2;
        loop {
            match self.bump() {
                None => return Err(ScanError::UnterminatedComment { line }),
                Some(b'*') if self.peek() == Some(b'/') => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(_) => {}
            }
        }
    }

    /// Read a `'` or `"` literal. The cursor is on the opening quote.
    fn read_string(&mut self) -> Result<String, ScanError> {
        let line = self.line;
        let quote = self.src[self.pos];
        self.pos += 1;
        let start = self.pos;
        loop {
            match self.peek() {
                None | Some(b'\n') => return Err(ScanError::UnterminatedString { line }),
                Some(b'\\') => {
                    self.pos += 1;
                    self.bump();
                }
                Some(b) if b == quote => {
                    let text = self.lossy(start, self.pos);
                    self.pos += 1;
                    self.prev = Some(quote);
                    return Ok(text);
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    /// Skip a quoted literal outside an import clause.
    ///
    /// A literal cannot span lines, so a quote left open at the end of its
    /// line is JSX text such as `{name}'s board` and only the quote is skipped.
    fn skip_quoted(&mut self) {
        let cp = self.checkpoint();
        if self.read_string().is_err() {
            self.restore(cp);
            self.prev = self.peek();
            self.pos += 1;
        }
    }

    /// Read a template literal. The cursor is on the opening backtick.
    ///
    /// Returns the text only when the template has no substitutions.
    fn read_template(&mut self) -> Result<Option<String>, ScanError> {
        let line = self.line;
        self.pos += 1;
        let start = self.pos;
        let mut plain = true;
        loop {
            match self.bump() {
                None => return Err(ScanError::UnterminatedTemplate { line }),
                Some(b'\\') => {
                    self.bump();
                }
                Some(b'`') => {
                    self.prev = Some(b'`');
                    return Ok(plain.then(|| self.lossy(start, self.pos - 1)));
                }
                Some(b'$') if self.peek() == Some(b'{') => {
                    self.pos += 1;
                    plain = false;
                    self.skip_substitution()?;
                }
                Some(_) => {}
            }
        }
    }

    /// Skip a `${ ... }` body through its closing brace.
    fn skip_substitution(&mut self) -> Result<(), ScanError> {
        let mut depth = 1usize;
        loop {
            self.skip_trivia()?;
            match self.peek() {
                // The enclosing template reports the missing backtick.
                None => return Ok(()),
                Some(b'{') => {
                    depth += 1;
                    self.pos += 1;
                }
                Some(b'}') => {
                    self.pos += 1;
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Some(b'"' | b'\'') => self.skip_quoted(),
                Some(b'`') => {
                    self.read_template()?;
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
    }

    /// Skip a regex literal; stops quietly at a newline.
    fn skip_regex(&mut self) {
        self.pos += 1;
        let mut in_class = false;
        while let Some(b) = self.peek() {
            match b {
                b'\n' => break,
                b'\\' => self.pos += 2,
                b'[' => {
                    in_class = true;
                    self.pos += 1;
                }
                b']' => {
                    in_class = false;
                    self.pos += 1;
                }
                b'/' if !in_class => {
                    self.pos += 1;
                    while self.peek().is_some_and(is_ident_byte) {
                        self.pos += 1;
                    }
                    break;
                }
                _ => self.pos += 1,
            }
        }
        self.pos = self.pos.min(self.src.len());
        self.prev = Some(b'/');
    }

    fn read_word(&mut self) -> &'a str {
        let src: &'a [u8] = self.src;
        let start = self.pos;
        while self.peek().is_some_and(is_ident_byte) {
            self.pos += 1;
        }
        if self.pos > start {
            self.prev = Some(src[self.pos - 1]);
        }
        // Identifier bytes are ASCII.
        std::str::from_utf8(&src[start..self.pos]).unwrap_or_default()
    }

    fn peek_word(&mut self) -> &'a str {
        let cp = self.checkpoint();
        let word = self.read_word();
        self.restore(cp);
        word
    }

    /// A string or substitution-free template at the cursor.
    fn literal_specifier(&mut self) -> Result<Option<String>, ScanError> {
        match self.peek() {
            Some(b'"' | b'\'') => self.read_string().map(Some),
            Some(b'`') => self.read_template(),
            _ => Ok(None),
        }
    }

    /// Consume a leading `type` modifier, if present.
    fn eat_type_modifier(&mut self) -> Result<bool, ScanError> {
        if !self.peek().is_some_and(is_ident_byte) || self.peek_word() != "type" {
            return Ok(false);
        }
        let before = self.checkpoint();
        self.read_word();
        let after = self.checkpoint();
        self.skip_trivia()?;
        match self.peek() {
            Some(b'{' | b'*') => Ok(true),
            Some(b) if is_ident_byte(b) => {
                // `import type from "x"` imports a binding named `type`.
                if self.peek_word() == "from" {
                    self.restore(before);
                    Ok(false)
                } else {
                    self.restore(after);
                    Ok(true)
                }
            }
            _ => {
                self.restore(before);
                Ok(false)
            }
        }
    }

    /// Walk an import/export clause up to `from "<specifier>"`.
    fn clause_then_from(&mut self) -> Result<Option<String>, ScanError> {
        loop {
            self.skip_trivia()?;
            match self.peek() {
                Some(b) if is_ident_byte(b) => {
                    let cp = self.checkpoint();
                    let word = self.read_word();
                    if word == "from" {
                        self.skip_trivia()?;
                        return self.literal_specifier();
                    }
                    if CLAUSE_BREAKERS.contains(&word) {
                        self.restore(cp);
                        return Ok(None);
                    }
                }
                Some(b @ (b'{' | b'}' | b',' | b'*')) => {
                    self.pos += 1;
                    self.prev = Some(b);
                }
                // `import { "string name" as x }`
                Some(b'"' | b'\'') => self.skip_quoted(),
                _ => return Ok(None),
            }
        }
    }

    fn after_import(&mut self, line: u32) -> Result<Option<ImportSpec>, ScanError> {
        self.skip_trivia()?;
        match self.peek() {
            Some(b'(') => {
                self.pos += 1;
                self.prev = Some(b'(');
                self.skip_trivia()?;
                return Ok(self
                    .literal_specifier()?
                    .map(|s| ImportSpec::new(s, ImportKind::Dynamic, line)));
            }
            Some(b'"' | b'\'') => {
                let s = self.read_string()?;
                return Ok(Some(ImportSpec::new(s, ImportKind::SideEffect, line)));
            }
            // import.meta
            Some(b'.') => return Ok(None),
            _ => {}
        }

        let kind = if self.eat_type_modifier()? {
            ImportKind::TypeOnly
        } else {
            ImportKind::Static
        };
        Ok(self
            .clause_then_from()?
            .map(|s| ImportSpec::new(s, kind, line)))
    }

    fn after_export(&mut self, line: u32) -> Result<Option<ImportSpec>, ScanError> {
        self.skip_trivia()?;
        let kind = if self.eat_type_modifier()? {
            ImportKind::TypeOnly
        } else {
            ImportKind::ReExport
        };
        self.skip_trivia()?;
        if !matches!(self.peek(), Some(b'{' | b'*')) {
            return Ok(None);
        }
        Ok(self
            .clause_then_from()?
            .map(|s| ImportSpec::new(s, kind, line)))
    }

    fn after_require(&mut self, line: u32) -> Result<Option<ImportSpec>, ScanError> {
        self.skip_trivia()?;
        if self.peek() != Some(b'(') {
            return Ok(None);
        }
        self.pos += 1;
        self.prev = Some(b'(');
        self.skip_trivia()?;
        Ok(self
            .literal_specifier()?
            .map(|s| ImportSpec::new(s, ImportKind::Require, line)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specs(source: &str) -> Vec<(String, ImportKind)> {
        scan_imports(source)
            .unwrap()
            .into_iter()
            .map(|s| (s.specifier, s.kind))
            .collect()
    }

    #[test]
    fn test_static_import_forms() {
        let source = r#"
import React from "react";
import { Led, Resistor as R } from "@tsci/seveibar.led";
import * as utils from './utils';
import Default, { named } from "./both";
"#;
        assert_eq!(
            specs(source),
            vec![
                ("react".to_string(), ImportKind::Static),
                ("@tsci/seveibar.led".to_string(), ImportKind::Static),
                ("./utils".to_string(), ImportKind::Static),
                ("./both".to_string(), ImportKind::Static),
            ]
        );
    }

    #[test]
    fn test_side_effect_dynamic_and_require() {
        let source = r#"
import "./polyfill";
const lazy = await import("./lazy");
const fs = require('fs');
"#;
        assert_eq!(
            specs(source),
            vec![
                ("./polyfill".to_string(), ImportKind::SideEffect),
                ("./lazy".to_string(), ImportKind::Dynamic),
                ("fs".to_string(), ImportKind::Require),
            ]
        );
    }

    #[test]
    fn test_re_exports() {
        let source = r#"
export * from "./all";
export { a, b as c } from "./some";
export * as ns from "./ns";
export const x = 1;
export { local };
"#;
        assert_eq!(
            specs(source),
            vec![
                ("./all".to_string(), ImportKind::ReExport),
                ("./some".to_string(), ImportKind::ReExport),
                ("./ns".to_string(), ImportKind::ReExport),
            ]
        );
    }

    #[test]
    fn test_type_only_imports() {
        let source = r#"
import type { Props } from "./types";
export type { Shape } from "./shapes";
import type from "./named-type";
"#;
        assert_eq!(
            specs(source),
            vec![
                ("./types".to_string(), ImportKind::TypeOnly),
                ("./shapes".to_string(), ImportKind::TypeOnly),
                ("./named-type".to_string(), ImportKind::Static),
            ]
        );
        assert_eq!(resolve_imports(source).unwrap(), vec!["./named-type"]);
    }

    #[test]
    fn test_runtime_kind_wins_over_type_only() {
        let source = r#"
import type { A } from "./dep";
import { b } from "./dep";
"#;
        assert_eq!(specs(source), vec![("./dep".to_string(), ImportKind::Static)]);
    }

    #[test]
    fn test_ignores_comments_and_strings() {
        let source = r#"
// import a from "line-comment"
/* import b from "block-comment" */
const s = "import c from 'in-string'";
const t = `require("in-template")`;
import real from "./real";
"#;
        assert_eq!(specs(source), vec![("./real".to_string(), ImportKind::Static)]);
    }

    #[test]
    fn test_template_with_substitution_is_not_a_specifier() {
        let source = r#"
const m = import(`./locale/${lang}`);
const n = import(`./fixed`);
"#;
        assert_eq!(specs(source), vec![("./fixed".to_string(), ImportKind::Dynamic)]);
    }

    #[test]
    fn test_regex_literal_with_quote() {
        let source = r#"
const re = /["']/g;
import x from "./after-regex";
"#;
        assert_eq!(
            specs(source),
            vec![("./after-regex".to_string(), ImportKind::Static)]
        );
    }

    #[test]
    fn test_division_is_not_regex() {
        let source = "const half = total / 2; const q = a / b;\nimport y from './y';";
        assert_eq!(specs(source), vec![("./y".to_string(), ImportKind::Static)]);
    }

    #[test]
    fn test_apostrophe_in_jsx_text() {
        let source = r#"
import { Board } from "./board";
export default () => <div>Don't panic, it's fine</div>;
"#;
        assert_eq!(specs(source), vec![("./board".to_string(), ImportKind::Static)]);
    }

    #[test]
    fn test_quotes_in_jsx_text_after_expressions() {
        let source = r#"import { Led } from "@tsci/led";
import footprint from "vendor-lib/fp/a.kicad_mod";
export const Board = ({ name }) => <board>{name}'s board</board>;
export const Note = () => <text> 'quoted on one side</text>;
export const Inch = () => <text>{size}" wide</text>;
import later from "./later";
"#;
        assert_eq!(
            specs(source),
            vec![
                ("@tsci/led".to_string(), ImportKind::Static),
                ("vendor-lib/fp/a.kicad_mod".to_string(), ImportKind::Static),
                ("./later".to_string(), ImportKind::Static),
            ]
        );
    }

    #[test]
    fn test_closed_string_in_jsx_text_still_hides_keywords() {
        let source = "const a = <p>{x}'s \"import x from './no'\" tip'</p>;\nimport y from './y';";
        assert_eq!(specs(source), vec![("./y".to_string(), ImportKind::Static)]);
    }

    #[test]
    fn test_member_access_is_not_keyword() {
        let source = r#"
module.require("./not-this");
const meta = import.meta.url;
"#;
        assert!(specs(source).is_empty());
    }

    #[test]
    fn test_ts_import_equals_require() {
        let source = r#"import fs = require("fs");"#;
        assert_eq!(specs(source), vec![("fs".to_string(), ImportKind::Require)]);
    }

    #[test]
    fn test_export_clause_without_from_does_not_swallow_next_import() {
        let source = "export { a }\nimport b from './b'";
        assert_eq!(specs(source), vec![("./b".to_string(), ImportKind::Static)]);
    }

    #[test]
    fn test_line_numbers() {
        let source = "\nimport a from \"./a\";\n\nimport b from \"./b\";\n";
        let imports = scan_imports(source).unwrap();
        assert_eq!(imports[0].line, 2);
        assert_eq!(imports[1].line, 4);
    }

    #[test]
    fn test_deduplicates() {
        let source = "import a from './dep';\nconst b = require('./dep');";
        assert_eq!(specs(source), vec![("./dep".to_string(), ImportKind::Static)]);
    }

    #[test]
    fn test_unterminated_specifier_is_error() {
        let source = "import a from \"./a;\nconst x = 1;";
        assert_eq!(
            scan_imports(source),
            Err(ScanError::UnterminatedString { line: 1 })
        );
    }

    #[test]
    fn test_unterminated_block_comment_is_error() {
        let source = "import a from './a';\n/* never closed\nimport b from './b';";
        assert_eq!(
            scan_imports(source),
            Err(ScanError::UnterminatedComment { line: 2 })
        );
    }

    #[test]
    fn test_unterminated_template_is_error() {
        let source = "const t = `open ${x}";
        assert!(matches!(
            scan_imports(source),
            Err(ScanError::UnterminatedTemplate { line: 1 })
        ));
    }

    #[test]
    fn test_empty_and_import_free_sources() {
        assert!(scan_imports("").unwrap().is_empty());
        assert!(scan_imports("console.log('hello');").unwrap().is_empty());
    }
}
