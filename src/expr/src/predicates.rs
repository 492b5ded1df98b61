// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Predicates known to hold on the input row.

use serde::{Deserialize, Serialize};

use tern_repr::RelationType;

use crate::scalar::func::UnaryFunc;
use crate::scalar::ScalarExpr;
use crate::strong::{self, Policy};

/// An ordered multiset of boolean expressions that evaluate to TRUE on every
/// input row. Produced by whatever metadata machinery surrounds the caller;
/// consumed here as an opaque list.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct PredicateList {
    pulled_up: Vec<ScalarExpr>,
}

impl PredicateList {
    pub fn empty() -> PredicateList {
        PredicateList::default()
    }

    pub fn new(pulled_up: Vec<ScalarExpr>) -> PredicateList {
        PredicateList { pulled_up }
    }

    /// The predicates, in order.
    pub fn pulled_up(&self) -> &[ScalarExpr] {
        &self.pulled_up
    }

    pub fn is_empty(&self) -> bool {
        self.pulled_up.is_empty()
    }

    pub fn contains(&self, expr: &ScalarExpr) -> bool {
        self.pulled_up.contains(expr)
    }

    /// Appends `other`'s predicates to `self`'s, keeping duplicates.
    pub fn union(&self, other: &PredicateList) -> PredicateList {
        let mut pulled_up = self.pulled_up.clone();
        pulled_up.extend(other.pulled_up.iter().cloned());
        PredicateList { pulled_up }
    }

    /// A copy of this list with one predicate appended.
    pub fn with(&self, expr: ScalarExpr) -> PredicateList {
        let mut pulled_up = self.pulled_up.clone();
        pulled_up.push(expr);
        PredicateList { pulled_up }
    }

    /// Whether `expr` is known to never be NULL: its type is non-nullable,
    /// the list asserts `expr IS NOT NULL`, or it is a deterministic strict
    /// call all of whose operands are effectively not null.
    pub fn is_effectively_not_null(
        &self,
        expr: &ScalarExpr,
        relation_type: &RelationType,
    ) -> bool {
        if !expr.typ(relation_type).nullable {
            return true;
        }
        for p in &self.pulled_up {
            if let ScalarExpr::CallUnary {
                func: UnaryFunc::IsNotNull,
                expr: operand,
            } = p
            {
                if **operand == *expr {
                    return true;
                }
            }
        }
        // A strict call over non-null operands cannot be NULL, unless the
        // operator has nullability rules of its own (a safe cast, a record
        // field).
        if !crate::simplify::has_custom_nullability_rules(expr)
            && expr.is_deterministic()
            && strong::policy(expr) == Policy::Any
        {
            let mut all_not_null = true;
            let mut any_operand = false;
            expr.visit1(|operand| {
                any_operand = true;
                all_not_null =
                    all_not_null && self.is_effectively_not_null(operand, relation_type);
            });
            return any_operand && all_not_null;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use tern_repr::{Datum, ScalarType};

    use super::*;
    use crate::scalar::func::BinaryFunc;

    #[test]
    fn test_is_effectively_not_null() {
        let relation_type = RelationType::new(vec![
            ScalarType::Int64.nullable(true),
            ScalarType::Int64.nullable(false),
        ]);
        let col0 = ScalarExpr::column(0);
        let col1 = ScalarExpr::column(1);
        let lit = ScalarExpr::literal_ok(Datum::Int64(1), ScalarType::Int64);

        let empty = PredicateList::empty();
        assert!(!empty.is_effectively_not_null(&col0, &relation_type));
        assert!(empty.is_effectively_not_null(&col1, &relation_type));

        let with_fact = empty.with(col0.clone().call_unary(UnaryFunc::IsNotNull));
        assert!(with_fact.is_effectively_not_null(&col0, &relation_type));

        // A strict call over known-non-null operands is itself non-null.
        let sum = col0.clone().call_binary(lit, BinaryFunc::Add);
        assert!(!empty.is_effectively_not_null(&sum, &relation_type));
        assert!(with_fact.is_effectively_not_null(&sum, &relation_type));

        // Not so for a cast: a safe cast may fail to NULL even over a
        // non-null operand.
        let safe_cast = col1.clone().call_unary(UnaryFunc::Cast {
            to: ScalarType::Int32.nullable(true),
            safe: true,
        });
        assert!(!empty.is_effectively_not_null(&safe_cast, &relation_type));
    }
}
