//! Recursive-descent parser for the CQL text dialect.
//!
//! Grammar (restricted subset):
//!
//! ```text
//! expr     := and_expr (OR and_expr)*
//! and_expr := unary (AND unary)*
//! unary    := NOT unary | '(' expr ')' | predicate
//! predicate:= prop IS [NOT] NULL
//!           | prop [NOT] IN '(' literal (',' literal)* ')'
//!           | prop [NOT] LIKE string
//!           | prop [NOT] BETWEEN literal AND literal
//!           | prop BEFORE string | prop AFTER string | prop DURING string
//!           | prop cmp literal
//!           | SPATIAL_FN '(' prop ',' wkt ')'
//! ```
//!
//! Temporal operands are quoted strings (`ts DURING '2024-01-01/..'`);
//! bare ISO timestamps are not tokenized in this subset.

use feature_common::TemporalInterval;

use crate::ast::{ComparisonOp, LogicalOp, RawExpr, RawLiteral, SpatialOp, TemporalOp};
use crate::geometry::{self, GeometryError};
use crate::lexer::{tokenize, LexError, Token};

/// Parse a CQL text filter into the raw expression tree.
pub(crate) fn parse_text(input: &str) -> Result<RawExpr, TextParseError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if let Some(tok) = parser.peek() {
        return Err(TextParseError::TrailingToken(tok.to_string()));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, expected: &Token) -> Result<(), TextParseError> {
        match self.bump() {
            Some(tok) if tok == *expected => Ok(()),
            Some(tok) => Err(TextParseError::Unexpected {
                found: tok.to_string(),
                expected: expected.to_string(),
            }),
            None => Err(TextParseError::UnexpectedEnd),
        }
    }

    /// Consume an identifier matching `kw` case-insensitively.
    fn eat_keyword(&mut self, kw: &str) -> bool {
        if let Some(Token::Ident(word)) = self.peek() {
            if word.eq_ignore_ascii_case(kw) {
                self.pos += 1;
                return true;
            }
        }
        false
    }

    fn parse_or(&mut self) -> Result<RawExpr, TextParseError> {
        let mut children = vec![self.parse_and()?];
        while self.eat_keyword("OR") {
            children.push(self.parse_and()?);
        }
        Ok(fold_logical(LogicalOp::Or, children))
    }

    fn parse_and(&mut self) -> Result<RawExpr, TextParseError> {
        let mut children = vec![self.parse_unary()?];
        while self.eat_keyword("AND") {
            children.push(self.parse_unary()?);
        }
        Ok(fold_logical(LogicalOp::And, children))
    }

    fn parse_unary(&mut self) -> Result<RawExpr, TextParseError> {
        if self.eat_keyword("NOT") {
            let inner = self.parse_unary()?;
            return Ok(RawExpr::Logical {
                op: LogicalOp::Not,
                children: vec![inner],
            });
        }

        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let expr = self.parse_or()?;
            self.expect(&Token::RParen)?;
            return Ok(expr);
        }

        match self.bump() {
            Some(Token::Ident(word)) => {
                if let Some(op) = spatial_op(&word) {
                    self.parse_spatial(op)
                } else {
                    self.parse_predicate(word)
                }
            }
            Some(tok) => Err(TextParseError::Unexpected {
                found: tok.to_string(),
                expected: "property name or predicate".to_string(),
            }),
            None => Err(TextParseError::UnexpectedEnd),
        }
    }

    /// Predicate continuation after the property name.
    fn parse_predicate(&mut self, property: String) -> Result<RawExpr, TextParseError> {
        if self.eat_keyword("IS") {
            let negated = self.eat_keyword("NOT");
            if !self.eat_keyword("NULL") {
                return Err(TextParseError::Unexpected {
                    found: self.peek().map(|t| t.to_string()).unwrap_or_default(),
                    expected: "NULL".to_string(),
                });
            }
            let expr = RawExpr::IsNull { property };
            return Ok(if negated { negate(expr) } else { expr });
        }

        let negated = self.eat_keyword("NOT");

        if self.eat_keyword("IN") {
            let expr = self.parse_in(property)?;
            return Ok(if negated { negate(expr) } else { expr });
        }

        if self.eat_keyword("LIKE") {
            let pattern = self.parse_string("LIKE pattern")?;
            let expr = RawExpr::Comparison {
                property,
                op: ComparisonOp::Like,
                value: RawLiteral::Text(pattern),
            };
            return Ok(if negated { negate(expr) } else { expr });
        }

        if self.eat_keyword("BETWEEN") {
            let low = self.parse_literal()?;
            if !self.eat_keyword("AND") {
                return Err(TextParseError::Unexpected {
                    found: self.peek().map(|t| t.to_string()).unwrap_or_default(),
                    expected: "AND".to_string(),
                });
            }
            let high = self.parse_literal()?;
            let expr = RawExpr::Between {
                property,
                low,
                high,
            };
            return Ok(if negated { negate(expr) } else { expr });
        }

        if negated {
            return Err(TextParseError::Unexpected {
                found: self.peek().map(|t| t.to_string()).unwrap_or_default(),
                expected: "IN, LIKE or BETWEEN after NOT".to_string(),
            });
        }

        for (kw, op) in [
            ("BEFORE", TemporalOp::Before),
            ("AFTER", TemporalOp::After),
            ("DURING", TemporalOp::During),
        ] {
            if self.eat_keyword(kw) {
                let raw = self.parse_string("temporal operand")?;
                let interval = TemporalInterval::from_query_string(&raw)
                    .map_err(|e| TextParseError::Temporal(e.to_string()))?;
                return Ok(RawExpr::Temporal {
                    op,
                    property,
                    interval,
                });
            }
        }

        let op = match self.bump() {
            Some(Token::Eq) => ComparisonOp::Eq,
            Some(Token::Neq) => ComparisonOp::Neq,
            Some(Token::Lt) => ComparisonOp::Lt,
            Some(Token::Lte) => ComparisonOp::Lte,
            Some(Token::Gt) => ComparisonOp::Gt,
            Some(Token::Gte) => ComparisonOp::Gte,
            Some(tok) => {
                return Err(TextParseError::Unexpected {
                    found: tok.to_string(),
                    expected: "comparison operator".to_string(),
                })
            }
            None => return Err(TextParseError::UnexpectedEnd),
        };

        let value = self.parse_literal()?;
        Ok(RawExpr::Comparison {
            property,
            op,
            value,
        })
    }

    fn parse_in(&mut self, property: String) -> Result<RawExpr, TextParseError> {
        self.expect(&Token::LParen)?;
        let mut values = vec![self.parse_literal()?];
        loop {
            match self.bump() {
                Some(Token::Comma) => values.push(self.parse_literal()?),
                Some(Token::RParen) => break,
                Some(tok) => {
                    return Err(TextParseError::Unexpected {
                        found: tok.to_string(),
                        expected: "',' or ')'".to_string(),
                    })
                }
                None => return Err(TextParseError::UnexpectedEnd),
            }
        }
        Ok(RawExpr::InSet { property, values })
    }

    /// `SPATIAL_FN '(' prop ',' wkt ')'` — the WKT operand is re-assembled
    /// from tokens and normalized by the geometry module.
    fn parse_spatial(&mut self, op: SpatialOp) -> Result<RawExpr, TextParseError> {
        self.expect(&Token::LParen)?;
        let property = match self.bump() {
            Some(Token::Ident(name)) => name,
            Some(tok) => {
                return Err(TextParseError::Unexpected {
                    found: tok.to_string(),
                    expected: "property name".to_string(),
                })
            }
            None => return Err(TextParseError::UnexpectedEnd),
        };
        self.expect(&Token::Comma)?;

        let wkt_text = self.take_wkt_tokens()?;
        let parsed = geometry::parse_wkt(&wkt_text)?;

        self.expect(&Token::RParen)?;
        Ok(RawExpr::Spatial {
            op,
            property,
            wkt: parsed.wkt,
            vertex_count: parsed.vertex_count,
        })
    }

    /// Collect the tokens forming a WKT literal (keyword plus balanced
    /// parens) back into a string.
    fn take_wkt_tokens(&mut self) -> Result<String, TextParseError> {
        let keyword = match self.bump() {
            Some(Token::Ident(word)) => word,
            Some(tok) => {
                return Err(TextParseError::Unexpected {
                    found: tok.to_string(),
                    expected: "geometry keyword".to_string(),
                })
            }
            None => return Err(TextParseError::UnexpectedEnd),
        };

        let mut text = keyword;
        let mut depth = 0usize;
        let mut prev_was_number = false;

        loop {
            match self.peek() {
                Some(Token::LParen) => {
                    text.push('(');
                    depth += 1;
                    prev_was_number = false;
                }
                Some(Token::RParen) => {
                    if depth == 0 {
                        break;
                    }
                    text.push(')');
                    depth -= 1;
                    prev_was_number = false;
                }
                Some(Token::Comma) => {
                    if depth == 0 {
                        break;
                    }
                    text.push(',');
                    prev_was_number = false;
                }
                Some(Token::Number(n)) => {
                    if prev_was_number {
                        text.push(' ');
                    }
                    text.push_str(n);
                    prev_was_number = true;
                }
                Some(tok) => {
                    return Err(TextParseError::Unexpected {
                        found: tok.to_string(),
                        expected: "WKT coordinates".to_string(),
                    })
                }
                None => return Err(TextParseError::UnexpectedEnd),
            }
            self.pos += 1;
            if depth == 0 && prev_was_number {
                // A bare keyword without parens is malformed; parse_wkt
                // reports it with the full context.
                break;
            }
        }

        Ok(text)
    }

    fn parse_literal(&mut self) -> Result<RawLiteral, TextParseError> {
        match self.bump() {
            Some(Token::Number(raw)) => parse_number_literal(&raw),
            Some(Token::Str(s)) => Ok(RawLiteral::Text(s)),
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("TRUE") => {
                Ok(RawLiteral::Bool(true))
            }
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("FALSE") => {
                Ok(RawLiteral::Bool(false))
            }
            Some(tok) => Err(TextParseError::Unexpected {
                found: tok.to_string(),
                expected: "literal".to_string(),
            }),
            None => Err(TextParseError::UnexpectedEnd),
        }
    }

    fn parse_string(&mut self, what: &str) -> Result<String, TextParseError> {
        match self.bump() {
            Some(Token::Str(s)) => Ok(s),
            Some(tok) => Err(TextParseError::Unexpected {
                found: tok.to_string(),
                expected: format!("quoted {}", what),
            }),
            None => Err(TextParseError::UnexpectedEnd),
        }
    }
}

fn parse_number_literal(raw: &str) -> Result<RawLiteral, TextParseError> {
    if raw.contains('.') || raw.contains('e') || raw.contains('E') {
        raw.parse::<f64>()
            .map(RawLiteral::Float)
            .map_err(|_| TextParseError::InvalidNumber(raw.to_string()))
    } else {
        raw.parse::<i64>()
            .map(RawLiteral::Int)
            .map_err(|_| TextParseError::InvalidNumber(raw.to_string()))
    }
}

fn fold_logical(op: LogicalOp, mut children: Vec<RawExpr>) -> RawExpr {
    if children.len() == 1 {
        children.pop().expect("len checked")
    } else {
        RawExpr::Logical { op, children }
    }
}

fn negate(expr: RawExpr) -> RawExpr {
    RawExpr::Logical {
        op: LogicalOp::Not,
        children: vec![expr],
    }
}

fn spatial_op(word: &str) -> Option<SpatialOp> {
    match word.to_ascii_uppercase().as_str() {
        "INTERSECTS" => Some(SpatialOp::Intersects),
        "CONTAINS" => Some(SpatialOp::Contains),
        "WITHIN" => Some(SpatialOp::Within),
        "TOUCHES" => Some(SpatialOp::Touches),
        "CROSSES" => Some(SpatialOp::Crosses),
        "OVERLAPS" => Some(SpatialOp::Overlaps),
        "DISJOINT" => Some(SpatialOp::Disjoint),
        "EQUALS" => Some(SpatialOp::Equals),
        _ => None,
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub(crate) enum TextParseError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error("Unexpected '{found}', expected {expected}")]
    Unexpected { found: String, expected: String },

    #[error("Unexpected end of filter")]
    UnexpectedEnd,

    #[error("Trailing input after filter: {0}")]
    TrailingToken(String),

    #[error("Invalid numeric literal: {0}")]
    InvalidNumber(String),

    #[error("Invalid temporal operand: {0}")]
    Temporal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_comparison() {
        let expr = parse_text("name = 'Main St'").unwrap();
        assert_eq!(
            expr,
            RawExpr::Comparison {
                property: "name".into(),
                op: ComparisonOp::Eq,
                value: RawLiteral::Text("Main St".into()),
            }
        );
    }

    #[test]
    fn test_precedence_and_binds_tighter_than_or() {
        let expr = parse_text("a = 1 OR b = 2 AND c = 3").unwrap();
        match expr {
            RawExpr::Logical {
                op: LogicalOp::Or,
                children,
            } => {
                assert_eq!(children.len(), 2);
                assert!(matches!(
                    children[1],
                    RawExpr::Logical {
                        op: LogicalOp::And,
                        ..
                    }
                ));
            }
            other => panic!("expected OR at root, got {:?}", other),
        }
    }

    #[test]
    fn test_parens_override_precedence() {
        let expr = parse_text("(a = 1 OR b = 2) AND c = 3").unwrap();
        assert!(matches!(
            expr,
            RawExpr::Logical {
                op: LogicalOp::And,
                ..
            }
        ));
    }

    #[test]
    fn test_not_in_between_null() {
        let expr = parse_text("status NOT IN (1, 2, 3)").unwrap();
        assert!(matches!(expr, RawExpr::Logical { op: LogicalOp::Not, .. }));

        let expr = parse_text("height BETWEEN 1.5 AND 10").unwrap();
        assert_eq!(
            expr,
            RawExpr::Between {
                property: "height".into(),
                low: RawLiteral::Float(1.5),
                high: RawLiteral::Int(10),
            }
        );

        let expr = parse_text("name IS NOT NULL").unwrap();
        assert!(matches!(expr, RawExpr::Logical { op: LogicalOp::Not, .. }));
    }

    #[test]
    fn test_spatial_predicate_normalizes_wkt() {
        let expr = parse_text("INTERSECTS(geom, POLYGON((0 0, 10 0, 10 10, 0 0)))").unwrap();
        match expr {
            RawExpr::Spatial {
                op,
                property,
                wkt,
                vertex_count,
            } => {
                assert_eq!(op, SpatialOp::Intersects);
                assert_eq!(property, "geom");
                assert_eq!(wkt, "POLYGON((0 0, 10 0, 10 10, 0 0))");
                assert_eq!(vertex_count, 4);
            }
            other => panic!("expected spatial, got {:?}", other),
        }
    }

    #[test]
    fn test_temporal_predicates() {
        let expr = parse_text("updated DURING '2024-01-01T00:00:00Z/..'").unwrap();
        match expr {
            RawExpr::Temporal { op, interval, .. } => {
                assert_eq!(op, TemporalOp::During);
                assert!(interval.end.is_none());
            }
            other => panic!("expected temporal, got {:?}", other),
        }

        assert!(parse_text("updated BEFORE 'not a date'").is_err());
    }

    #[test]
    fn test_like() {
        let expr = parse_text("name LIKE 'Main%'").unwrap();
        assert!(matches!(
            expr,
            RawExpr::Comparison {
                op: ComparisonOp::Like,
                ..
            }
        ));
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        assert!(matches!(
            parse_text("a = 1 b"),
            Err(TextParseError::TrailingToken(_))
        ));
    }

    #[test]
    fn test_unbalanced_paren_rejected() {
        assert!(parse_text("(a = 1").is_err());
    }
}
