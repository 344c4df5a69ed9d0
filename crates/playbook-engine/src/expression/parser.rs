//! Recursive-descent parser for condition expressions.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! or         := and (("||" | "or") and)*
//! and        := unary (("&&" | "and") unary)*
//! unary      := ("!" | "not") unary | comparison
//! comparison := operand (op operand)?
//! operand    := primary ("." (ident | int) | "[" (int | string) "]")*
//! primary    := number | "-" number | string | bool | null | ident
//!             | "(" or ")" | "[" (or ("," or)*)? "]"
//! ```
//!
//! Comparisons do not chain: `a < b < c` is rejected.

use serde_json::Value;

use super::ast::{CompareOp, Expr, PathSegment};
use super::lexer::{Token, TokenKind};
use super::ExpressionError;

pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    /// Parse the whole token stream into a single expression.
    pub fn parse(mut self) -> Result<Expr, ExpressionError> {
        let expr = self.parse_or()?;
        if self.current().kind != TokenKind::Eof {
            return Err(self.unexpected());
        }
        Ok(expr)
    }

    fn current(&self) -> &Token {
        // tokenize() always ends with Eof, so clamp to it.
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.position.min(last)]
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.tokens.get(self.position + 1).map(|t| &t.kind)
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.position < self.tokens.len() {
            self.position += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.current().kind == kind
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), ExpressionError> {
        if self.check(&kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn unexpected(&self) -> ExpressionError {
        let token = self.current();
        ExpressionError::UnexpectedToken {
            found: token.kind.to_string(),
            position: token.position,
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_and()?;
        while self.check(&TokenKind::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_unary()?;
        while self.check(&TokenKind::And) {
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        if self.check(&TokenKind::Not) {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(operand)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExpressionError> {
        let left = self.parse_operand()?;

        let op = match &self.current().kind {
            TokenKind::Equal => CompareOp::Equal,
            TokenKind::NotEqual => CompareOp::NotEqual,
            TokenKind::Less => CompareOp::Less,
            TokenKind::LessEqual => CompareOp::LessEqual,
            TokenKind::Greater => CompareOp::Greater,
            TokenKind::GreaterEqual => CompareOp::GreaterEqual,
            TokenKind::In => CompareOp::In,
            TokenKind::Contains => CompareOp::Contains,
            TokenKind::Not if self.peek_kind() == Some(&TokenKind::In) => {
                self.advance();
                CompareOp::NotIn
            }
            _ => return Ok(left),
        };
        self.advance();

        let right = self.parse_operand()?;
        Ok(Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_operand(&mut self) -> Result<Expr, ExpressionError> {
        let primary = self.parse_primary()?;

        let Expr::Path(mut segments) = primary else {
            return Ok(primary);
        };

        loop {
            match self.current().kind {
                TokenKind::Dot => {
                    self.advance();
                    let token = self.advance();
                    match token.kind {
                        TokenKind::Ident(name) => segments.push(PathSegment::Key(name)),
                        TokenKind::Number(n) => segments.push(index_segment(n, &token)?),
                        other => {
                            return Err(ExpressionError::UnexpectedToken {
                                found: other.to_string(),
                                position: token.position,
                            })
                        }
                    }
                }
                TokenKind::LeftBracket => {
                    self.advance();
                    let token = self.advance();
                    match token.kind {
                        TokenKind::Number(n) => segments.push(index_segment(n, &token)?),
                        TokenKind::Str(key) => segments.push(PathSegment::Key(key)),
                        other => {
                            return Err(ExpressionError::UnexpectedToken {
                                found: other.to_string(),
                                position: token.position,
                            })
                        }
                    }
                    self.expect(TokenKind::RightBracket)?;
                }
                _ => break,
            }
        }

        Ok(Expr::Path(segments))
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        let token = self.advance();
        match token.kind {
            TokenKind::Number(n) => Ok(Expr::Literal(number_value(n))),
            TokenKind::Minus => {
                let next = self.advance();
                match next.kind {
                    TokenKind::Number(n) => Ok(Expr::Literal(number_value(-n))),
                    other => Err(ExpressionError::UnexpectedToken {
                        found: other.to_string(),
                        position: next.position,
                    }),
                }
            }
            TokenKind::Str(s) => Ok(Expr::Literal(Value::String(s))),
            TokenKind::Bool(b) => Ok(Expr::Literal(Value::Bool(b))),
            TokenKind::Null => Ok(Expr::Literal(Value::Null)),
            TokenKind::Ident(name) => Ok(Expr::Path(vec![PathSegment::Key(name)])),
            TokenKind::LeftParen => {
                let inner = self.parse_or()?;
                self.expect(TokenKind::RightParen)?;
                Ok(inner)
            }
            TokenKind::LeftBracket => {
                let mut items = Vec::new();
                if self.check(&TokenKind::RightBracket) {
                    self.advance();
                    return Ok(Expr::List(items));
                }
                loop {
                    items.push(self.parse_or()?);
                    if self.check(&TokenKind::Comma) {
                        self.advance();
                        continue;
                    }
                    self.expect(TokenKind::RightBracket)?;
                    return Ok(Expr::List(items));
                }
            }
            other => Err(ExpressionError::UnexpectedToken {
                found: other.to_string(),
                position: token.position,
            }),
        }
    }
}

fn index_segment(n: f64, token: &Token) -> Result<PathSegment, ExpressionError> {
    if n.fract() != 0.0 || n < 0.0 {
        return Err(ExpressionError::UnexpectedToken {
            found: token.kind.to_string(),
            position: token.position,
        });
    }
    Ok(PathSegment::Index(n as usize))
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::lexer::Lexer;
    use serde_json::json;

    fn parse(input: &str) -> Result<Expr, ExpressionError> {
        Parser::new(Lexer::new(input).tokenize()?).parse()
    }

    fn path(keys: &[&str]) -> Expr {
        Expr::Path(keys.iter().map(|k| PathSegment::Key(k.to_string())).collect())
    }

    #[test]
    fn test_simple_comparison() {
        assert_eq!(
            parse("severity == 'high'").unwrap(),
            Expr::Compare {
                op: CompareOp::Equal,
                left: Box::new(path(&["severity"])),
                right: Box::new(Expr::Literal(json!("high"))),
            }
        );
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let expr = parse("a or b and c").unwrap();
        assert_eq!(
            expr,
            Expr::Or(
                Box::new(path(&["a"])),
                Box::new(Expr::And(Box::new(path(&["b"])), Box::new(path(&["c"])))),
            )
        );
    }

    #[test]
    fn test_not_in() {
        let expr = parse("ip not in allowlist").unwrap();
        assert!(matches!(expr, Expr::Compare { op: CompareOp::NotIn, .. }));
    }

    #[test]
    fn test_not_binds_to_comparison() {
        let expr = parse("!score > 5").unwrap();
        assert!(matches!(expr, Expr::Not(inner) if matches!(*inner, Expr::Compare { .. })));
    }

    #[test]
    fn test_paths_with_indexes() {
        assert_eq!(
            parse("alert.hosts[0].name").unwrap(),
            Expr::Path(vec![
                PathSegment::Key("alert".to_string()),
                PathSegment::Key("hosts".to_string()),
                PathSegment::Index(0),
                PathSegment::Key("name".to_string()),
            ])
        );
        assert_eq!(parse("hosts.1").unwrap(), parse("hosts[1]").unwrap());
    }

    #[test]
    fn test_list_and_negative_literals() {
        assert_eq!(
            parse("[1, -2.5, 'x']").unwrap(),
            Expr::List(vec![
                Expr::Literal(json!(1)),
                Expr::Literal(json!(-2.5)),
                Expr::Literal(json!("x")),
            ])
        );
    }

    #[test]
    fn test_parenthesized() {
        let expr = parse("(a or b) and c").unwrap();
        assert!(matches!(expr, Expr::And(..)));
    }

    #[test]
    fn test_rejects_trailing_tokens_and_chained_comparisons() {
        assert!(parse("a == 1 2").is_err());
        assert!(parse("a < b < c").is_err());
    }

    #[test]
    fn test_rejects_incomplete() {
        let err = parse("severity ==").unwrap_err();
        assert_eq!(
            err,
            ExpressionError::UnexpectedToken {
                found: "end of expression".to_string(),
                position: 11,
            }
        );
        assert!(parse("(a == 1").is_err());
    }

    #[test]
    fn test_rejects_function_calls() {
        assert!(parse("exec('rm -rf /')").is_err());
    }
}
