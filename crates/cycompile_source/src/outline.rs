use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::lexer::{tokenize, LexResult, LogicalLine, TokenKind, TokenStream};
use crate::scope::EnclosingScope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeclarationKind {
    Function,
    Class,
}

/// A `def` or `class` header found in a module, with the span of its text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub name: String,
    pub qualname: String,
    pub kind: DeclarationKind,
    pub scope: EnclosingScope,
    pub indent: usize,
    /// First line of the declaration, decorators included.
    pub start_line: usize,
    pub header_line: usize,
    pub end_line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start_line: usize,
    end_line: usize,
}

/// Structural view of one source module: its declarations and its top-level
/// import statements.
#[derive(Debug, Clone, Default)]
pub struct ModuleOutline {
    declarations: Vec<Declaration>,
    imports: Vec<Span>,
}

struct Frame {
    indent: usize,
    name: String,
    qualname: String,
    kind: DeclarationKind,
}

impl ModuleOutline {
    pub fn parse(source: &str) -> LexResult<Self> {
        let stream = tokenize(source)?;
        let mut outline = ModuleOutline::default();
        let mut stack: Vec<Frame> = Vec::new();

        for (index, line) in stream.lines.iter().enumerate() {
            // Any statement at or left of a frame's header closes that frame.
            while stack.last().is_some_and(|frame| frame.indent >= line.indent) {
                stack.pop();
            }

            let tokens = stream.line_tokens(line);
            let words: Vec<Option<&str>> = tokens.iter().take(3).map(|t| t.identifier()).collect();

            if line.indent == 0 && matches!(words.first(), Some(Some("import" | "from"))) {
                outline.imports.push(Span {
                    start_line: line.start_line,
                    end_line: line.end_line,
                });
                continue;
            }

            let header = match words.as_slice() {
                [Some("def"), Some(name), ..] => Some((DeclarationKind::Function, *name)),
                [Some("async"), Some("def"), Some(name)] => Some((DeclarationKind::Function, *name)),
                [Some("class"), Some(name), ..] => Some((DeclarationKind::Class, *name)),
                _ => None,
            };
            let Some((kind, name)) = header else {
                continue;
            };

            let (scope, qualname) = match stack.last() {
                None => (EnclosingScope::Module, name.to_string()),
                Some(parent) => match parent.kind {
                    DeclarationKind::Class => (
                        EnclosingScope::Class {
                            name: parent.name.clone(),
                        },
                        format!("{}.{name}", parent.qualname),
                    ),
                    DeclarationKind::Function => (
                        EnclosingScope::Function {
                            name: parent.name.clone(),
                        },
                        format!("{}.<locals>.{name}", parent.qualname),
                    ),
                },
            };

            outline.declarations.push(Declaration {
                name: name.to_string(),
                qualname: qualname.clone(),
                kind,
                scope,
                indent: line.indent,
                start_line: decorated_start(&stream, index),
                header_line: line.start_line,
                end_line: block_end(&stream.lines, index),
            });
            stack.push(Frame {
                indent: line.indent,
                name: name.to_string(),
                qualname,
                kind,
            });
        }

        Ok(outline)
    }

    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    pub fn find(&self, qualname: &str) -> Option<&Declaration> {
        self.declarations
            .iter()
            .find(|decl| decl.qualname == qualname)
    }

    /// Functions and classes declared at the top level of the module.
    pub fn top_level_names(&self) -> BTreeSet<String> {
        self.declarations
            .iter()
            .filter(|decl| decl.scope == EnclosingScope::Module)
            .map(|decl| decl.name.clone())
            .collect()
    }

    /// Verbatim text of every top-level import statement, in file order.
    pub fn import_statements(&self, source: &str) -> Vec<String> {
        let lines: Vec<&str> = source.lines().collect();
        self.imports
            .iter()
            .map(|span| slice_lines(&lines, span.start_line, span.end_line))
            .collect()
    }

    /// Verbatim text of a declaration, decorators included.
    pub fn text_of(&self, declaration: &Declaration, source: &str) -> String {
        let lines: Vec<&str> = source.lines().collect();
        slice_lines(&lines, declaration.start_line, declaration.end_line)
    }
}

fn slice_lines(lines: &[&str], start_line: usize, end_line: usize) -> String {
    let start = start_line.saturating_sub(1).min(lines.len());
    let end = end_line.min(lines.len()).max(start);
    lines[start..end]
        .iter()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

fn decorated_start(stream: &TokenStream, index: usize) -> usize {
    let indent = stream.lines[index].indent;
    let mut first = index;
    while first > 0 {
        let previous = &stream.lines[first - 1];
        let is_decorator = previous.indent == indent
            && stream
                .line_tokens(previous)
                .first()
                .is_some_and(|token| token.kind == TokenKind::At);
        if !is_decorator {
            break;
        }
        first -= 1;
    }
    stream.lines[first].start_line
}

fn block_end(lines: &[LogicalLine], index: usize) -> usize {
    let indent = lines[index].indent;
    let next = lines[index + 1..]
        .iter()
        .position(|line| line.indent <= indent)
        .map_or(lines.len(), |offset| index + 1 + offset);
    lines[next - 1].end_line
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODULE: &str = "\
import math
from cycompile import cycompile

@cycompile(opt=\"fast\")
def is_even(n):
    if n == 0:
        return True
    return is_odd(n - 1)

class Shape:
    @classmethod
    def unit(cls):
        return cls()

def outer():
    def inner():
        pass
    inner()
";

    #[test]
    fn finds_scopes_and_spans() -> LexResult<()> {
        let outline = ModuleOutline::parse(MODULE)?;

        let is_even = outline.find("is_even").expect("is_even");
        assert_eq!(is_even.scope, EnclosingScope::Module);
        assert_eq!((is_even.start_line, is_even.header_line, is_even.end_line), (4, 5, 8));

        let unit = outline.find("Shape.unit").expect("Shape.unit");
        assert_eq!(
            unit.scope,
            EnclosingScope::Class {
                name: "Shape".into()
            }
        );
        assert_eq!(unit.start_line, 11);

        let inner = outline.find("outer.<locals>.inner").expect("inner");
        assert_eq!(
            inner.scope,
            EnclosingScope::Function {
                name: "outer".into()
            }
        );
        Ok(())
    }

    #[test]
    fn conditional_definitions_after_a_function_stay_module_level() -> LexResult<()> {
        let source = "\
def first():
    return 1

if True:
    def g(x):
        return x

try:
    import fast_path
except ImportError:
    def h():
        pass
";
        let outline = ModuleOutline::parse(source)?;
        let scopes: Vec<(&str, &EnclosingScope)> = outline
            .declarations()
            .iter()
            .map(|decl| (decl.qualname.as_str(), &decl.scope))
            .collect();
        assert_eq!(
            scopes,
            vec![
                ("first", &EnclosingScope::Module),
                ("g", &EnclosingScope::Module),
                ("h", &EnclosingScope::Module),
            ]
        );
        let names: Vec<String> = outline.top_level_names().into_iter().collect();
        assert_eq!(names, vec!["first", "g", "h"]);
        Ok(())
    }

    #[test]
    fn top_level_names_skip_members() -> LexResult<()> {
        let outline = ModuleOutline::parse(MODULE)?;
        let names: Vec<String> = outline.top_level_names().into_iter().collect();
        assert_eq!(names, vec!["Shape", "is_even", "outer"]);
        Ok(())
    }

    #[test]
    fn import_statements_are_verbatim() -> LexResult<()> {
        let outline = ModuleOutline::parse(MODULE)?;
        assert_eq!(
            outline.import_statements(MODULE),
            vec!["import math", "from cycompile import cycompile"]
        );
        Ok(())
    }

    #[test]
    fn text_of_includes_decorators() -> LexResult<()> {
        let outline = ModuleOutline::parse(MODULE)?;
        let decl = outline.find("is_even").expect("is_even");
        let text = outline.text_of(decl, MODULE);
        assert!(text.starts_with("@cycompile(opt=\"fast\")\ndef is_even(n):"));
        assert!(text.ends_with("return is_odd(n - 1)"));
        Ok(())
    }
}
