use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexError {
    #[error("unterminated string literal (line {line}, column {column})")]
    UnterminatedString { line: usize, column: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Identifier(String),
    Literal,
    Dot,
    At,
    LParen,
    RParen,
    Punct(char),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// 1-based line the token starts on.
    pub line: usize,
    /// 0-based column the token starts on.
    pub column: usize,
}

impl Token {
    pub fn identifier(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Identifier(name) => Some(name),
            _ => None,
        }
    }
}

/// A statement-level line: everything between two newlines that are not
/// inside brackets, strings, or after a backslash continuation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    pub indent: usize,
    pub start_line: usize,
    pub end_line: usize,
    pub first_token: usize,
    pub token_count: usize,
}

#[derive(Debug, Default)]
pub struct TokenStream {
    pub tokens: Vec<Token>,
    pub lines: Vec<LogicalLine>,
}

impl TokenStream {
    pub fn line_tokens(&self, line: &LogicalLine) -> &[Token] {
        &self.tokens[line.first_token..line.first_token + line.token_count]
    }
}

pub type LexResult<T> = Result<T, LexError>;

const STRING_PREFIXES: &[&str] = &["r", "u", "b", "f", "br", "rb", "fr", "rf"];

struct Cursor {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Cursor {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn eat_while(&mut self, mut predicate: impl FnMut(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(ch) = self.peek() {
            if !predicate(ch) {
                break;
            }
            out.push(ch);
            self.bump();
        }
        out
    }

    /// Consumes a string literal starting at its opening quote and returns the
    /// text between the quotes, escapes left as written.
    fn read_string(&mut self, start_line: usize, start_column: usize) -> LexResult<String> {
        let unterminated = LexError::UnterminatedString {
            line: start_line,
            column: start_column,
        };
        let Some(quote) = self.bump() else {
            return Err(unterminated);
        };
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.bump();
            self.bump();
        }

        let mut body = String::new();
        loop {
            match self.bump() {
                None => return Err(unterminated),
                Some('\\') => {
                    body.push('\\');
                    if let Some(escaped) = self.bump() {
                        body.push(escaped);
                    }
                }
                Some('\n') if !triple => return Err(unterminated),
                Some(ch) if ch == quote => {
                    if !triple {
                        return Ok(body);
                    }
                    if self.peek() == Some(quote) && self.peek_at(1) == Some(quote) {
                        self.bump();
                        self.bump();
                        return Ok(body);
                    }
                    body.push(ch);
                }
                Some(ch) => body.push(ch),
            }
        }
    }
}

/// Expressions inside the replacement fields of an f-string body. `{{` and
/// `}}` are literal braces; a format spec stays attached to its expression.
fn replacement_fields(body: &str) -> Vec<String> {
    let chars: Vec<char> = body.chars().collect();
    let mut fields = Vec::new();
    let mut index = 0;

    while index < chars.len() {
        if chars[index] != '{' {
            index += 1;
            continue;
        }
        if chars.get(index + 1) == Some(&'{') {
            index += 2;
            continue;
        }

        index += 1;
        let mut depth = 1usize;
        let mut quote: Option<char> = None;
        let mut field = String::new();
        while let Some(&ch) = chars.get(index) {
            index += 1;
            match quote {
                Some(open) if ch == open => quote = None,
                Some(_) => {}
                None => match ch {
                    '\'' | '"' => quote = Some(ch),
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    _ => {}
                },
            }
            field.push(ch);
        }
        fields.push(field);
    }

    fields
}

/// Tokens of an f-string's embedded expressions, positioned at the string.
/// A field that does not tokenize on its own contributes nothing.
fn embedded_tokens(body: &str, line: usize, column: usize) -> Vec<Token> {
    replacement_fields(body)
        .iter()
        .filter_map(|field| tokenize(field).ok())
        .flat_map(|stream| stream.tokens)
        .map(|token| Token {
            line,
            column,
            ..token
        })
        .collect()
}

fn is_identifier_start(ch: char) -> bool {
    ch == '_' || ch.is_alphabetic()
}

fn is_identifier_continue(ch: char) -> bool {
    ch == '_' || ch.is_alphanumeric()
}

/// Tokenizes module or function source, tracking logical lines and their
/// indentation. Only the token classes needed for outlining and call scanning
/// are distinguished.
pub fn tokenize(source: &str) -> LexResult<TokenStream> {
    let mut cursor = Cursor {
        chars: source.chars().collect(),
        pos: 0,
        line: 1,
        column: 0,
    };
    let mut stream = TokenStream::default();
    let mut depth = 0usize;
    let mut continued = false;
    let mut at_line_start = true;

    while let Some(ch) = cursor.peek() {
        match ch {
            '\n' => {
                cursor.bump();
                if depth == 0 && !continued {
                    at_line_start = true;
                }
                continued = false;
                continue;
            }
            '#' => {
                cursor.eat_while(|c| c != '\n');
                continue;
            }
            '\\' if cursor.peek_at(1) == Some('\n') => {
                cursor.bump();
                continued = true;
                continue;
            }
            c if c.is_whitespace() => {
                cursor.bump();
                continue;
            }
            _ => {}
        }

        let line = cursor.line;
        let column = cursor.column;

        let mut embedded = Vec::new();
        let kind = if is_identifier_start(ch) {
            let ident = cursor.eat_while(is_identifier_continue);
            let prefix = ident.to_ascii_lowercase();
            let quoted = matches!(cursor.peek(), Some('\'' | '"'));
            if quoted && STRING_PREFIXES.contains(&prefix.as_str()) {
                let body = cursor.read_string(line, column)?;
                if prefix.contains('f') {
                    embedded = embedded_tokens(&body, line, column);
                }
                TokenKind::Literal
            } else {
                TokenKind::Identifier(ident)
            }
        } else if ch == '\'' || ch == '"' {
            cursor.read_string(line, column)?;
            TokenKind::Literal
        } else if ch.is_ascii_digit()
            || (ch == '.' && cursor.peek_at(1).is_some_and(|c| c.is_ascii_digit()))
        {
            cursor.eat_while(|c| c.is_alphanumeric() || c == '.' || c == '_');
            TokenKind::Literal
        } else {
            cursor.bump();
            match ch {
                '(' => {
                    depth += 1;
                    TokenKind::LParen
                }
                '[' | '{' => {
                    depth += 1;
                    TokenKind::Punct(ch)
                }
                ')' => {
                    depth = depth.saturating_sub(1);
                    TokenKind::RParen
                }
                ']' | '}' => {
                    depth = depth.saturating_sub(1);
                    TokenKind::Punct(ch)
                }
                '.' => TokenKind::Dot,
                '@' => TokenKind::At,
                other => TokenKind::Punct(other),
            }
        };

        if at_line_start {
            stream.lines.push(LogicalLine {
                indent: column,
                start_line: line,
                end_line: line,
                first_token: stream.tokens.len(),
                token_count: 0,
            });
            at_line_start = false;
        }
        if let Some(current) = stream.lines.last_mut() {
            current.token_count += 1 + embedded.len();
            current.end_line = cursor.line;
        }
        stream.tokens.push(Token { kind, line, column });
        stream.tokens.append(&mut embedded);
    }

    Ok(stream)
}
