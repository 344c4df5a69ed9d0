//! Lexer for condition expressions.

use std::iter::Peekable;
use std::str::CharIndices;

use super::ExpressionError;

/// Kind of a lexed token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
    Ident(String),

    Dot,
    Comma,
    Minus,
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,

    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,

    And,
    Or,
    Not,
    In,
    Contains,

    Eof,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Number(n) => write!(f, "number {}", n),
            TokenKind::Str(s) => write!(f, "string '{}'", s),
            TokenKind::Bool(b) => write!(f, "{}", b),
            TokenKind::Null => write!(f, "null"),
            TokenKind::Ident(name) => write!(f, "identifier '{}'", name),
            TokenKind::Dot => write!(f, "'.'"),
            TokenKind::Comma => write!(f, "','"),
            TokenKind::Minus => write!(f, "'-'"),
            TokenKind::LeftParen => write!(f, "'('"),
            TokenKind::RightParen => write!(f, "')'"),
            TokenKind::LeftBracket => write!(f, "'['"),
            TokenKind::RightBracket => write!(f, "']'"),
            TokenKind::Equal => write!(f, "'=='"),
            TokenKind::NotEqual => write!(f, "'!='"),
            TokenKind::Less => write!(f, "'<'"),
            TokenKind::LessEqual => write!(f, "'<='"),
            TokenKind::Greater => write!(f, "'>'"),
            TokenKind::GreaterEqual => write!(f, "'>='"),
            TokenKind::And => write!(f, "'and'"),
            TokenKind::Or => write!(f, "'or'"),
            TokenKind::Not => write!(f, "'not'"),
            TokenKind::In => write!(f, "'in'"),
            TokenKind::Contains => write!(f, "'contains'"),
            TokenKind::Eof => write!(f, "end of expression"),
        }
    }
}

/// A token with its byte offset in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: usize,
}

/// Converts an expression string into tokens.
pub struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
        }
    }

    /// Tokenize the whole input. The last token is always `Eof`.
    pub fn tokenize(mut self) -> Result<Vec<Token>, ExpressionError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, ExpressionError> {
        while self.chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}

        let Some((position, ch)) = self.chars.next() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                position: self.input.len(),
            });
        };

        let kind = match ch {
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            '[' => TokenKind::LeftBracket,
            ']' => TokenKind::RightBracket,
            '.' => TokenKind::Dot,
            ',' => TokenKind::Comma,
            '-' => TokenKind::Minus,
            '=' if self.eat('=') => {
                // `===` reads as `==`
                self.eat('=');
                TokenKind::Equal
            }
            '!' if self.eat('=') => {
                self.eat('=');
                TokenKind::NotEqual
            }
            '!' => TokenKind::Not,
            '<' if self.eat('=') => TokenKind::LessEqual,
            '<' => TokenKind::Less,
            '>' if self.eat('=') => TokenKind::GreaterEqual,
            '>' => TokenKind::Greater,
            '&' if self.eat('&') => TokenKind::And,
            '|' if self.eat('|') => TokenKind::Or,
            '\'' | '"' => self.string(ch, position)?,
            c if c.is_ascii_digit() => self.number(position)?,
            c if c.is_alphabetic() || c == '_' => self.word(c, position),
            other => {
                return Err(ExpressionError::UnexpectedChar {
                    ch: other,
                    position,
                })
            }
        };

        Ok(Token { kind, position })
    }

    fn eat(&mut self, expected: char) -> bool {
        self.chars.next_if(|(_, c)| *c == expected).is_some()
    }

    fn string(&mut self, quote: char, start: usize) -> Result<TokenKind, ExpressionError> {
        let mut value = String::new();
        while let Some((_, ch)) = self.chars.next() {
            match ch {
                c if c == quote => return Ok(TokenKind::Str(value)),
                '\\' => match self.chars.next() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, escaped)) => value.push(escaped),
                    None => break,
                },
                c => value.push(c),
            }
        }
        Err(ExpressionError::UnterminatedString(start))
    }

    fn number(&mut self, start: usize) -> Result<TokenKind, ExpressionError> {
        let mut end = start + 1;
        while let Some((i, _)) = self.chars.next_if(|(_, c)| c.is_ascii_digit()) {
            end = i + 1;
        }

        // Only a dot followed by a digit continues the literal; `hosts.0.name` keeps its dots.
        let mut lookahead = self.chars.clone();
        if let (Some((_, '.')), Some((_, d))) = (lookahead.next(), lookahead.next()) {
            if d.is_ascii_digit() {
                self.chars.next();
                while let Some((i, _)) = self.chars.next_if(|(_, c)| c.is_ascii_digit()) {
                    end = i + 1;
                }
            }
        }

        let text = &self.input[start..end];
        text.parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| ExpressionError::InvalidNumber(text.to_string()))
    }

    fn word(&mut self, first: char, start: usize) -> TokenKind {
        let mut end = start + first.len_utf8();
        while let Some((i, c)) = self
            .chars
            .next_if(|(_, c)| c.is_alphanumeric() || *c == '_')
        {
            end = i + c.len_utf8();
        }

        match &self.input[start..end] {
            "true" | "True" => TokenKind::Bool(true),
            "false" | "False" => TokenKind::Bool(false),
            "null" | "None" => TokenKind::Null,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            "in" => TokenKind::In,
            "contains" => TokenKind::Contains,
            ident => TokenKind::Ident(ident.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_comparison_tokens() {
        assert_eq!(
            kinds("severity == 'critical'"),
            vec![
                TokenKind::Ident("severity".to_string()),
                TokenKind::Equal,
                TokenKind::Str("critical".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_non_ascii_identifiers() {
        assert_eq!(
            kinds("é == 1"),
            vec![
                TokenKind::Ident("é".to_string()),
                TokenKind::Equal,
                TokenKind::Number(1.0),
                TokenKind::Eof,
            ]
        );
        assert_eq!(kinds("π")[0], TokenKind::Ident("π".to_string()));
        assert_eq!(kinds("sévérité")[0], TokenKind::Ident("sévérité".to_string()));
    }

    #[test]
    fn test_strict_equality_alias() {
        assert_eq!(kinds("a === 1")[1], TokenKind::Equal);
        assert_eq!(kinds("a !== 1")[1], TokenKind::NotEqual);
    }

    #[test]
    fn test_numbers_and_paths() {
        assert_eq!(
            kinds("hosts.0.score >= 7.5"),
            vec![
                TokenKind::Ident("hosts".to_string()),
                TokenKind::Dot,
                TokenKind::Number(0.0),
                TokenKind::Dot,
                TokenKind::Ident("score".to_string()),
                TokenKind::GreaterEqual,
                TokenKind::Number(7.5),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_keywords_and_symbols() {
        assert_eq!(
            kinds("not a && b || c and d or e"),
            vec![
                TokenKind::Not,
                TokenKind::Ident("a".to_string()),
                TokenKind::And,
                TokenKind::Ident("b".to_string()),
                TokenKind::Or,
                TokenKind::Ident("c".to_string()),
                TokenKind::And,
                TokenKind::Ident("d".to_string()),
                TokenKind::Or,
                TokenKind::Ident("e".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#""say \"hi\"""#)[0],
            TokenKind::Str("say \"hi\"".to_string())
        );
    }

    #[test]
    fn test_unterminated_string() {
        let err = Lexer::new("name == 'oops").tokenize().unwrap_err();
        assert_eq!(err, ExpressionError::UnterminatedString(8));
    }

    #[test]
    fn test_rejects_single_equals_and_calls_syntax() {
        assert!(matches!(
            Lexer::new("a = 1").tokenize(),
            Err(ExpressionError::UnexpectedChar { ch: '=', .. })
        ));
        assert!(matches!(
            Lexer::new("a; b").tokenize(),
            Err(ExpressionError::UnexpectedChar { ch: ';', .. })
        ));
    }
}
