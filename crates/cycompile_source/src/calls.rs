use std::collections::BTreeSet;

use crate::lexer::{tokenize, LexResult, Token, TokenKind};

/// Strategy for finding the names a function calls.
///
/// Results are only ever intersected with the module's declarations, so a
/// strategy may over-approximate freely; under-approximation drops siblings
/// from the translation unit.
pub trait CallScanner: Send + Sync {
    fn called_names(&self, source: &str) -> LexResult<BTreeSet<String>>;
}

const KEYWORDS: &[&str] = &[
    "and", "as", "assert", "async", "await", "class", "def", "del", "elif", "else", "except",
    "for", "from", "global", "if", "import", "in", "is", "lambda", "nonlocal", "not", "or",
    "raise", "return", "while", "with", "yield",
];

/// Token-level call detection.
///
/// `name(...)` contributes `name`; `receiver.name(...)` contributes `name` when
/// the receiver is a plain identifier. A method call that shares its name with
/// a module-level function is indistinguishable from a call to that function.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokenCallScanner;

impl CallScanner for TokenCallScanner {
    fn called_names(&self, source: &str) -> LexResult<BTreeSet<String>> {
        let stream = tokenize(source)?;
        let tokens = &stream.tokens;
        let mut called = BTreeSet::new();

        for (index, token) in tokens.iter().enumerate() {
            if token.kind != TokenKind::LParen || index == 0 {
                continue;
            }
            let Some(name) = tokens[index - 1].identifier() else {
                continue;
            };
            if KEYWORDS.contains(&name) {
                continue;
            }

            let before = index.checked_sub(2).map(|i| &tokens[i]);
            match before.map(|token| &token.kind) {
                Some(TokenKind::Dot) => {
                    if plain_receiver(tokens, index - 2) {
                        called.insert(name.to_string());
                    }
                }
                Some(TokenKind::Identifier(word)) if word == "def" || word == "class" => {}
                _ => {
                    called.insert(name.to_string());
                }
            }
        }

        Ok(called)
    }
}

/// The token before the dot at `dot` is an identifier that is not itself the
/// tail of a longer attribute chain.
fn plain_receiver(tokens: &[Token], dot: usize) -> bool {
    let Some(receiver) = dot.checked_sub(1).map(|i| &tokens[i]) else {
        return false;
    };
    if receiver.identifier().is_none() {
        return false;
    }
    !matches!(
        dot.checked_sub(2).map(|i| &tokens[i].kind),
        Some(TokenKind::Dot)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(source: &str) -> Vec<String> {
        TokenCallScanner
            .called_names(source)
            .expect("scan")
            .into_iter()
            .collect()
    }

    #[test]
    fn direct_and_attribute_calls() {
        let source = "def f(obj):\n    g(1)\n    obj.helper()\n    return np.array(h(2))\n";
        assert_eq!(scan(source), vec!["array", "g", "h", "helper"]);
    }

    #[test]
    fn chained_receivers_are_ignored() {
        assert_eq!(scan("a.b.c()\nf().g()\n"), vec!["f"]);
    }

    #[test]
    fn definitions_are_not_calls() {
        assert_eq!(scan("def f(x):\n    class K(Base):\n        pass\n"), Vec::<String>::new());
    }

    #[test]
    fn decorator_invocations_count() {
        assert_eq!(scan("@cycompile(opt=\"fast\")\ndef f():\n    pass\n"), vec!["cycompile"]);
    }

    #[test]
    fn calls_inside_f_string_fields_count() {
        let source = "def f(x, obj):\n    return f\"{helper(x)} / {obj.render(x)!s} {{skip(1)}}\"\n";
        assert_eq!(scan(source), vec!["helper", "render"]);
    }
}
