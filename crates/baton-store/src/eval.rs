//! Query evaluation against a store snapshot.
//!
//! Comparison rules:
//! - A missing attribute fails every comparison, including `!=`.
//! - List attributes match if any element matches.
//! - `=` with a number compares numerically (numeric strings included).
//!   With a string or bool it compares the value's string form.
//! - Ordering with a number is numeric; with a string it is lexicographic
//!   over string values; bools are unordered.
//!
//! Hierarchy predicates are computed once per query for the whole snapshot.
//! Parents always precede their children, so one pass in sequence order
//! (or reverse order) fills the table.
//!
//! Recursion follows the expression tree, which the parser caps at
//! `parser::MAX_DEPTH` levels.

use std::cmp::Ordering;
use std::sync::Arc;

use baton_contracts::record::AttrValue;

use crate::parser::{Axis, CmpOp, Expr, Literal};
use crate::store::Entry;

pub(crate) struct Evaluator<'a> {
    entries: &'a [Arc<Entry>],
    hier: Vec<Option<Vec<bool>>>,
}

impl<'a> Evaluator<'a> {
    pub(crate) fn new(entries: &'a [Arc<Entry>], hier_slots: usize) -> Self {
        Self {
            entries,
            hier: vec![None; hier_slots],
        }
    }

    /// Whether the record at sequence `seq` matches `expr`.
    pub(crate) fn matches(&mut self, expr: &Expr, seq: usize) -> bool {
        match expr {
            Expr::Or(parts) => parts.iter().any(|p| self.matches(p, seq)),
            Expr::And(parts) => parts.iter().all(|p| self.matches(p, seq)),
            Expr::Not(inner) => !self.matches(inner, seq),
            Expr::Cmp { field, op, value } => self
                .attribute(seq, field)
                .is_some_and(|v| compare(&v, *op, value)),
            Expr::Regex { field, pattern } => self
                .attribute(seq, field)
                .is_some_and(|v| v.index_terms().iter().any(|t| pattern.is_match(t))),
            Expr::In { field, values } => self
                .attribute(seq, field)
                .is_some_and(|v| values.iter().any(|lit| equals(&v, lit))),
            Expr::Hier { axis, inner, slot } => {
                if self.hier[*slot].is_none() {
                    let table = self.hier_table(*axis, inner);
                    self.hier[*slot] = Some(table);
                }
                self.hier[*slot]
                    .as_ref()
                    .is_some_and(|table| table.get(seq).copied().unwrap_or(false))
            }
        }
    }

    fn attribute(&self, seq: usize, field: &str) -> Option<AttrValue> {
        self.entries.get(seq).and_then(|e| e.record.attribute(field))
    }

    fn hier_table(&mut self, axis: Axis, inner: &Expr) -> Vec<bool> {
        let n = self.entries.len();
        let hits: Vec<bool> = (0..n).map(|i| self.matches(inner, i)).collect();
        let parents: Vec<Option<usize>> = self.entries.iter().map(|e| e.parent_seq).collect();
        let mut table = vec![false; n];

        match axis {
            Axis::DescendantOf => {
                for i in 0..n {
                    if let Some(p) = parents[i] {
                        table[i] = hits[p] || table[p];
                    }
                }
            }
            Axis::AncestorOf => {
                for i in (0..n).rev() {
                    if let Some(p) = parents[i] {
                        if hits[i] || table[i] {
                            table[p] = true;
                        }
                    }
                }
            }
        }
        table
    }
}

fn numbers(value: &AttrValue) -> Vec<f64> {
    match value {
        AttrValue::Int(_) | AttrValue::Float(_) => value.as_f64().into_iter().collect(),
        AttrValue::Str(s) => s.trim().parse().ok().into_iter().collect(),
        AttrValue::List(items) => items.iter().filter_map(|s| s.trim().parse().ok()).collect(),
        AttrValue::Bool(_) => Vec::new(),
    }
}

fn strings(value: &AttrValue) -> Vec<&str> {
    match value {
        AttrValue::Str(s) => vec![s.as_str()],
        AttrValue::List(items) => items.iter().map(String::as_str).collect(),
        _ => Vec::new(),
    }
}

fn equals(value: &AttrValue, literal: &Literal) -> bool {
    match literal {
        Literal::Number(n) => numbers(value).iter().any(|x| x == n),
        other => {
            let term = other.term();
            value.index_terms().iter().any(|t| *t == term)
        }
    }
}

fn compare(value: &AttrValue, op: CmpOp, literal: &Literal) -> bool {
    let ordered = |ord: Ordering| match op {
        CmpOp::Ge => ord != Ordering::Less,
        CmpOp::Le => ord != Ordering::Greater,
        CmpOp::Gt => ord == Ordering::Greater,
        CmpOp::Lt => ord == Ordering::Less,
        CmpOp::Eq | CmpOp::Ne => false,
    };

    match op {
        CmpOp::Eq => equals(value, literal),
        CmpOp::Ne => !equals(value, literal),
        _ => match literal {
            Literal::Number(n) => numbers(value)
                .iter()
                .any(|x| x.partial_cmp(n).is_some_and(|o| ordered(o))),
            Literal::Str(s) => strings(value)
                .iter()
                .any(|x| ordered((*x).cmp(s.as_str()))),
            Literal::Bool(_) => false,
        },
    }
}
