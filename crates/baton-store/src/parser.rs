//! Recursive-descent parser for the trace-query language.
//!
//! ```text
//! expr     := or
//! or       := and ( "||" and )*
//! and      := unary ( "&&" unary )*
//! unary    := "!" unary | primary
//! primary  := "(" expr ")" | hier | cmp
//! hier     := ("descendant-of" | "ancestor-of") "(" (string | expr) ")"
//! cmp      := field op literal | field "in" "[" literal ("," literal)* "]"
//! op       := "=" | "!=" | "=~" | ">=" | "<=" | ">" | "<"
//! literal  := string | number | "true" | "false"
//! ```
//!
//! Regexes are compiled here, so a bad pattern is a parse error and the
//! query never runs. Nesting through `(`, `!` and hierarchy predicates is
//! limited to `MAX_DEPTH` levels; deeper input is a parse error.

use std::fmt;

use regex::Regex;

use baton_contracts::{
    error::{BatonError, BatonResult},
    record::keys,
};

use crate::lexer::{tokenize, Token, TokenKind};

/// Deepest nesting of `(`, `!` and hierarchy predicates a query may use.
pub const MAX_DEPTH: usize = 128;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Number(f64),
    Bool(bool),
}

impl Literal {
    /// The term this literal matches in the attribute index.
    pub fn term(&self) -> String {
        match self {
            Literal::Str(s) => s.clone(),
            Literal::Number(n) => n.to_string(),
            Literal::Bool(b) => b.to_string(),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Str(s) => write!(f, "{s:?}"),
            Literal::Number(n) => write!(f, "{n}"),
            Literal::Bool(b) => write!(f, "{b}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Ge,
    Le,
    Gt,
    Lt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// Matches records with an ancestor matching the inner expression.
    DescendantOf,
    /// Matches records with a descendant matching the inner expression.
    AncestorOf,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Or(Vec<Expr>),
    And(Vec<Expr>),
    Not(Box<Expr>),
    Cmp {
        field: String,
        op: CmpOp,
        value: Literal,
    },
    Regex {
        field: String,
        pattern: Regex,
    },
    In {
        field: String,
        values: Vec<Literal>,
    },
    /// `slot` numbers hierarchy nodes so the evaluator can cache them.
    Hier {
        axis: Axis,
        inner: Box<Expr>,
        slot: usize,
    },
}

impl Expr {
    /// `(field, term)` pairs that every match must carry, taken from the
    /// top-level conjunction. Used to narrow candidates through the index.
    ///
    /// Numeric equalities are left out: `= 3` also matches the string
    /// `"3.0"`, which is indexed under a different term.
    pub fn required_terms(&self) -> Vec<(String, String)> {
        match self {
            Expr::Cmp {
                field,
                op: CmpOp::Eq,
                value: value @ (Literal::Str(_) | Literal::Bool(_)),
            } => vec![(field.clone(), value.term())],
            Expr::And(parts) => parts.iter().flat_map(Expr::required_terms).collect(),
            _ => Vec::new(),
        }
    }
}

/// A parsed, ready-to-run query.
#[derive(Debug, Clone)]
pub struct Query {
    pub source: String,
    pub expr: Expr,
    /// Number of hierarchy nodes in `expr`.
    pub hier_slots: usize,
}

impl Query {
    pub fn parse(source: &str) -> BatonResult<Self> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens,
            cursor: 0,
            hier_slots: 0,
            depth: 0,
        };
        let expr = parser.expr()?;
        let trailing = parser.peek();
        if trailing.kind != TokenKind::Eof {
            return Err(error(
                format!("unexpected {} after expression", trailing.kind.describe()),
                trailing.position,
            ));
        }
        Ok(Self {
            source: source.to_string(),
            expr,
            hier_slots: parser.hier_slots,
        })
    }
}

fn error(reason: impl Into<String>, position: usize) -> BatonError {
    BatonError::Query {
        reason: reason.into(),
        position,
    }
}

struct Parser {
    tokens: Vec<Token>,
    cursor: usize,
    hier_slots: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // The token list always ends with Eof and the cursor never passes it.
        &self.tokens[self.cursor.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        &self.tokens[(self.cursor + offset).min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.cursor += 1;
        }
        token
    }

    fn expect(&mut self, kind: TokenKind) -> BatonResult<Token> {
        let token = self.advance();
        if token.kind == kind {
            Ok(token)
        } else {
            Err(error(
                format!("expected {}, found {}", kind.describe(), token.kind.describe()),
                token.position,
            ))
        }
    }

    fn expr(&mut self) -> BatonResult<Expr> {
        self.or()
    }

    /// Enter one nesting level opened by the token at `position`.
    fn descend(&mut self, position: usize) -> BatonResult<()> {
        if self.depth >= MAX_DEPTH {
            return Err(error(
                format!("expression nests deeper than {MAX_DEPTH} levels"),
                position,
            ));
        }
        self.depth += 1;
        Ok(())
    }

    fn ascend(&mut self) {
        self.depth -= 1;
    }

    fn or(&mut self) -> BatonResult<Expr> {
        let mut parts = vec![self.and()?];
        while self.peek().kind == TokenKind::Or {
            self.advance();
            parts.push(self.and()?);
        }
        Ok(if parts.len() == 1 {
            parts.remove(0)
        } else {
            Expr::Or(parts)
        })
    }

    fn and(&mut self) -> BatonResult<Expr> {
        let mut parts = vec![self.unary()?];
        while self.peek().kind == TokenKind::And {
            self.advance();
            parts.push(self.unary()?);
        }
        Ok(if parts.len() == 1 {
            parts.remove(0)
        } else {
            Expr::And(parts)
        })
    }

    fn unary(&mut self) -> BatonResult<Expr> {
        if self.peek().kind == TokenKind::Not {
            let bang = self.advance();
            self.descend(bang.position)?;
            let inner = self.unary()?;
            self.ascend();
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.primary()
    }

    fn primary(&mut self) -> BatonResult<Expr> {
        let token = self.advance();
        match token.kind {
            TokenKind::LParen => {
                self.descend(token.position)?;
                let inner = self.expr()?;
                self.expect(TokenKind::RParen)?;
                self.ascend();
                Ok(inner)
            }
            TokenKind::Ident(name) if name == "descendant-of" || name == "ancestor-of" => {
                let axis = if name == "descendant-of" {
                    Axis::DescendantOf
                } else {
                    Axis::AncestorOf
                };
                self.descend(token.position)?;
                let expr = self.hier(axis)?;
                self.ascend();
                Ok(expr)
            }
            TokenKind::Ident(field) => self.cmp(field),
            other => Err(error(
                format!("expected a field name or '(', found {}", other.describe()),
                token.position,
            )),
        }
    }

    fn hier(&mut self, axis: Axis) -> BatonResult<Expr> {
        self.expect(TokenKind::LParen)?;
        let shorthand = match (&self.peek().kind, &self.peek_at(1).kind) {
            (TokenKind::Str(id), TokenKind::RParen) => Some(id.clone()),
            _ => None,
        };
        let inner = match shorthand {
            Some(id) => {
                self.advance();
                Expr::Cmp {
                    field: keys::RECORD_ID.to_string(),
                    op: CmpOp::Eq,
                    value: Literal::Str(id),
                }
            }
            None => self.expr()?,
        };
        self.expect(TokenKind::RParen)?;

        let slot = self.hier_slots;
        self.hier_slots += 1;
        Ok(Expr::Hier {
            axis,
            inner: Box::new(inner),
            slot,
        })
    }

    fn cmp(&mut self, field: String) -> BatonResult<Expr> {
        let token = self.advance();
        let op = match token.kind {
            TokenKind::Eq => CmpOp::Eq,
            TokenKind::Ne => CmpOp::Ne,
            TokenKind::Ge => CmpOp::Ge,
            TokenKind::Le => CmpOp::Le,
            TokenKind::Gt => CmpOp::Gt,
            TokenKind::Lt => CmpOp::Lt,
            TokenKind::Match => {
                let literal = self.advance();
                let TokenKind::Str(pattern) = literal.kind else {
                    return Err(error(
                        format!("'=~' needs a string pattern, found {}", literal.kind.describe()),
                        literal.position,
                    ));
                };
                let pattern = Regex::new(&pattern)
                    .map_err(|e| error(format!("invalid regex: {e}"), literal.position))?;
                return Ok(Expr::Regex { field, pattern });
            }
            TokenKind::Ident(ref kw) if kw == "in" => {
                self.expect(TokenKind::LBracket)?;
                let mut values = vec![self.literal()?];
                while self.peek().kind == TokenKind::Comma {
                    self.advance();
                    values.push(self.literal()?);
                }
                self.expect(TokenKind::RBracket)?;
                return Ok(Expr::In { field, values });
            }
            other => {
                return Err(error(
                    format!("expected an operator after '{field}', found {}", other.describe()),
                    token.position,
                ))
            }
        };
        let value = self.literal()?;
        Ok(Expr::Cmp { field, op, value })
    }

    fn literal(&mut self) -> BatonResult<Literal> {
        let token = self.advance();
        match token.kind {
            TokenKind::Str(s) => Ok(Literal::Str(s)),
            TokenKind::Number(n) => Ok(Literal::Number(n)),
            TokenKind::Ident(ref word) if word == "true" => Ok(Literal::Bool(true)),
            TokenKind::Ident(ref word) if word == "false" => Ok(Literal::Bool(false)),
            other => Err(error(
                format!("expected a literal, found {}", other.describe()),
                token.position,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Expr {
        Query::parse(s).unwrap().expr
    }

    fn position(s: &str) -> usize {
        match Query::parse(s).unwrap_err() {
            BatonError::Query { position, .. } => position,
            other => panic!("expected query error, got {other}"),
        }
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let Expr::Or(parts) = parse(r#"a = 1 || b = 2 && c = 3"#) else {
            panic!("expected Or at top level");
        };
        assert_eq!(parts.len(), 2);
        assert!(matches!(&parts[1], Expr::And(inner) if inner.len() == 2));
    }

    #[test]
    fn not_and_parentheses() {
        let expr = parse(r#"!(a = "x" || b != "y")"#);
        let Expr::Not(inner) = expr else {
            panic!("expected Not");
        };
        assert!(matches!(*inner, Expr::Or(_)));
    }

    #[test]
    fn in_list_of_mixed_literals() {
        let Expr::In { field, values } = parse(r#"handoff.status in ["SENT", 3, true]"#) else {
            panic!("expected In");
        };
        assert_eq!(field, "handoff.status");
        assert_eq!(
            values,
            vec![Literal::Str("SENT".into()), Literal::Number(3.0), Literal::Bool(true)]
        );
    }

    #[test]
    fn hierarchy_string_shorthand_means_record_id() {
        let query = Query::parse(r#"descendant-of("abc") && ancestor-of(record.kind = "gate")"#).unwrap();
        assert_eq!(query.hier_slots, 2);
        let Expr::And(parts) = query.expr else {
            panic!("expected And");
        };
        let Expr::Hier { axis, inner, .. } = &parts[0] else {
            panic!("expected Hier");
        };
        assert_eq!(*axis, Axis::DescendantOf);
        assert!(matches!(
            inner.as_ref(),
            Expr::Cmp { field, op: CmpOp::Eq, value: Literal::Str(id) } if field == "record.id" && id == "abc"
        ));
    }

    #[test]
    fn required_terms_come_from_top_level_equalities() {
        let query =
            Query::parse(r#"record.kind = "gate" && gate.decision = "fail" && n = 2 && x > 1"#).unwrap();
        assert_eq!(
            query.expr.required_terms(),
            vec![
                ("record.kind".to_string(), "gate".to_string()),
                ("gate.decision".to_string(), "fail".to_string())
            ]
        );
        let or = Query::parse(r#"a = "1" || b = "2""#).unwrap();
        assert!(or.expr.required_terms().is_empty());
    }

    #[test]
    fn malformed_queries_report_positions() {
        assert_eq!(position(r#"a = "x" &&"#), 10);
        assert_eq!(position(r#"a "x""#), 2);
        assert_eq!(position(r#"(a = 1"#), 6);
        assert_eq!(position(r#"a = 1 b = 2"#), 6);
        assert_eq!(position(r#"a in [1, ]"#), 9);
        assert_eq!(position(r#"a =~ 5"#), 5);
    }

    #[test]
    fn nesting_is_limited() {
        let inside = format!("{}a = 1{}", "(".repeat(MAX_DEPTH), ")".repeat(MAX_DEPTH));
        assert!(Query::parse(&inside).is_ok());
        let negated = format!("{}a = 1", "!".repeat(MAX_DEPTH));
        assert!(Query::parse(&negated).is_ok());

        assert_eq!(position(&format!("{}a = 1", "(".repeat(20_000))), MAX_DEPTH);
        assert_eq!(position(&format!("{}a = 1", "!".repeat(200_000))), MAX_DEPTH);

        let hier = format!(
            "{}record.kind = \"gate\"{}",
            "descendant-of(".repeat(MAX_DEPTH + 1),
            ")".repeat(MAX_DEPTH + 1)
        );
        assert_eq!(position(&hier), MAX_DEPTH * "descendant-of(".len());
    }

    #[test]
    fn invalid_regex_is_rejected_at_parse_time() {
        assert_eq!(position(r#"summary =~ "(unclosed""#), 11);
    }
}
