// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Strong-null analysis: which expressions are NULL, or cannot be TRUE, when
//! some of their inputs are NULL.
//!
//! An operator is *strict* when its result is NULL whenever any of its
//! operands is NULL. Strictness lets `IS NULL` checks and contradiction
//! detection see through operator applications.

use std::collections::BTreeSet;

use crate::scalar::func::{BinaryFunc, UnaryFunc, VariadicFunc};
use crate::scalar::ScalarExpr;
use crate::UnknownAs;

/// How an operator's nullability relates to its operands'.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Policy {
    /// The result is never NULL.
    NotNull,
    /// The result is NULL whenever some operand is NULL (the operator is
    /// strict).
    Any,
    /// Nothing useful is known.
    AsIs,
    /// Handled case by case.
    Custom,
}

/// The null-propagation policy of the expression's head operator.
pub fn policy(expr: &ScalarExpr) -> Policy {
    match expr {
        ScalarExpr::Literal(_, _) => Policy::Custom,
        ScalarExpr::Column(_) => Policy::AsIs,
        ScalarExpr::CallNullary(_) => Policy::NotNull,
        ScalarExpr::Parameter(_, _) | ScalarExpr::Aggregate { .. } => Policy::AsIs,
        ScalarExpr::If { .. } => Policy::Custom,
        ScalarExpr::CallUnary { func, .. } => match func {
            UnaryFunc::IsNull
            | UnaryFunc::IsNotNull
            | UnaryFunc::IsTrue
            | UnaryFunc::IsNotTrue
            | UnaryFunc::IsFalse
            | UnaryFunc::IsNotFalse => Policy::NotNull,
            UnaryFunc::Not
            | UnaryFunc::Neg
            | UnaryFunc::CheckedNeg
            | UnaryFunc::Pos
            | UnaryFunc::CeilNumeric
            | UnaryFunc::FloorNumeric
            | UnaryFunc::CeilTo(_)
            | UnaryFunc::FloorTo(_)
            | UnaryFunc::MeasureToValue
            | UnaryFunc::ValueToMeasure => Policy::Any,
            // Strict on NULL inputs like the rest. Whether a non-NULL input
            // can still come out NULL (a failed safe cast, a null field) is
            // a separate question; callers with custom nullability rules
            // gate on it before consulting the policy.
            UnaryFunc::Cast { .. } | UnaryFunc::RecordGet(_) => Policy::Any,
            UnaryFunc::Search(sarg) => {
                if sarg.null_as == UnknownAs::Unknown {
                    Policy::Any
                } else {
                    Policy::NotNull
                }
            }
        },
        ScalarExpr::CallBinary { func, .. } => match func {
            BinaryFunc::IsDistinctFrom | BinaryFunc::IsNotDistinctFrom => Policy::NotNull,
            _ => Policy::Any,
        },
        ScalarExpr::CallVariadic { func, .. } => match func {
            VariadicFunc::Between => Policy::Any,
            VariadicFunc::And
            | VariadicFunc::Or
            | VariadicFunc::Coalesce
            | VariadicFunc::In
            | VariadicFunc::NotIn => Policy::Custom,
        },
    }
}

/// Whether `expr` is provably NULL, assuming no columns are NULL.
pub fn is_null(expr: &ScalarExpr) -> bool {
    Strong::of(&BTreeSet::new()).is_null(expr)
}

/// Strong-null analysis under the assumption that a given set of expressions
/// (typically columns) evaluate to NULL.
#[derive(Debug)]
pub struct Strong<'a> {
    null_exprs: &'a BTreeSet<ScalarExpr>,
}

impl<'a> Strong<'a> {
    pub fn of(null_exprs: &'a BTreeSet<ScalarExpr>) -> Strong<'a> {
        Strong { null_exprs }
    }

    /// Whether `expr` is NULL under the assumed NULL inputs. Conservative:
    /// `false` means "not provable", not "not NULL".
    pub fn is_null(&self, expr: &ScalarExpr) -> bool {
        if self.null_exprs.contains(expr) {
            return true;
        }
        match policy(expr) {
            Policy::NotNull => false,
            Policy::Any => {
                let mut any_null = false;
                expr.visit1(|operand| any_null = any_null || self.is_null(operand));
                any_null
            }
            Policy::AsIs => false,
            Policy::Custom => match expr {
                ScalarExpr::Literal(res, _) => matches!(res, Ok(d) if d.is_null()),
                // NULL AND NULL is NULL; any non-NULL operand may decide the
                // result, so require all of them to be NULL.
                ScalarExpr::CallVariadic {
                    func: VariadicFunc::And | VariadicFunc::Or | VariadicFunc::Coalesce,
                    exprs,
                } => !exprs.is_empty() && exprs.iter().all(|e| self.is_null(e)),
                // A NULL needle makes IN and NOT IN NULL regardless of the
                // list.
                ScalarExpr::CallVariadic {
                    func: VariadicFunc::In | VariadicFunc::NotIn,
                    exprs,
                } => self.is_null(&exprs[0]),
                ScalarExpr::If { cond: _, then, els } => {
                    self.is_null(then) && self.is_null(els)
                }
                _ => false,
            },
        }
    }

    /// Whether `expr` is provably not TRUE under the assumed NULL inputs.
    pub fn is_not_true(&self, expr: &ScalarExpr) -> bool {
        match expr {
            ScalarExpr::CallUnary {
                func: UnaryFunc::IsNotNull,
                expr,
            } => self.is_null(expr),
            _ => self.is_null(expr),
        }
    }
}

#[cfg(test)]
mod tests {
    use tern_repr::{Datum, ScalarType};

    use super::*;
    use crate::scalar::func::BinaryFunc;

    fn columns(is: &[usize]) -> BTreeSet<ScalarExpr> {
        is.iter().map(|i| ScalarExpr::Column(*i)).collect()
    }

    #[test]
    fn test_is_null() {
        let nulls = columns(&[0]);
        let strong = Strong::of(&nulls);
        let lit5 = ScalarExpr::literal_ok(Datum::Int64(5), ScalarType::Int64);

        // #0 < 5 is NULL when #0 is.
        let e = ScalarExpr::column(0).call_binary(lit5.clone(), BinaryFunc::Lt);
        assert!(strong.is_null(&e));
        assert!(strong.is_not_true(&e));

        // #1 < 5 is not provably NULL.
        let e = ScalarExpr::column(1).call_binary(lit5.clone(), BinaryFunc::Lt);
        assert!(!strong.is_null(&e));

        // #0 IS NOT NULL is never NULL, but it is not true.
        let e = ScalarExpr::column(0).call_unary(UnaryFunc::IsNotNull);
        assert!(!strong.is_null(&e));
        assert!(strong.is_not_true(&e));

        // A NULL input propagates through any cast, safe or not.
        for safe in [false, true] {
            let e = ScalarExpr::column(0).call_unary(UnaryFunc::Cast {
                to: ScalarType::Int32.nullable(true),
                safe,
            });
            assert!(strong.is_null(&e));
        }

        // NULL + 5 is NULL with no assumptions at all.
        let e = ScalarExpr::literal_null(ScalarType::Int64).call_binary(lit5, BinaryFunc::Add);
        assert!(is_null(&e));
    }
}
