// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The paranoid verifier: checks a simplification by interpreting both
//! expressions, under three-valued logic, on enumerated assignments of their
//! variables.
//!
//! The verifier is diagnostic-only. It can only enumerate finite input
//! domains (booleans, and values harvested from the literals of the
//! expressions themselves); anything else silently skips verification, which
//! weakens the guarantee but never blocks a rewrite.

use std::collections::BTreeSet;

use tern_repr::{Datum, RelationType, ScalarType};

use crate::predicates::PredicateList;
use crate::sarg::UnknownAs;
use crate::scalar::func::UnaryFunc;
use crate::scalar::ScalarExpr;

/// An upper bound on the number of assignments enumerated per verification.
const MAX_ASSIGNMENTS: usize = 4096;

/// Asserts that `simplified` evaluates like `before` under `unknown_as`, on
/// every enumerable assignment satisfying `predicates`. Panics with a
/// diagnostic on the first mismatch; silently skips expressions it cannot
/// enumerate.
pub fn verify(
    before: &ScalarExpr,
    simplified: &ScalarExpr,
    unknown_as: UnknownAs,
    predicates: &PredicateList,
    relation_type: &RelationType,
) {
    // An always-true expression must never simplify to an always-false one,
    // whatever the assignments.
    assert!(
        !(before.is_literal_true() && simplified.is_literal_false()),
        "always true [{}] simplified to always false [{}]",
        before,
        simplified,
    );
    assert!(
        !(before.is_literal_false() && simplified.is_literal_true()),
        "always false [{}] simplified to always true [{}]",
        before,
        simplified,
    );

    let variables0 = match variables(before) {
        Some(variables) => variables,
        None => {
            tracing::debug!(expr = %before, "skipping verification of unsupported expression");
            return;
        }
    };
    let variables1 = match variables(simplified) {
        Some(variables) => variables,
        None => {
            tracing::debug!(expr = %simplified, "skipping verification of unsupported expression");
            return;
        }
    };
    assert!(
        variables0.is_superset(&variables1),
        "variable mismatch: {} has {:?}, {} has {:?}",
        before,
        variables0,
        simplified,
        variables1,
    );

    let mut pool = Vec::new();
    literal_pool(before, &mut pool);
    literal_pool(simplified, &mut pool);
    pool.sort();
    pool.dedup();

    let mut domains: Vec<(usize, Vec<Datum>)> = Vec::new();
    for &column in &variables0 {
        let typ = &relation_type.column_types[column];
        let mut values: Vec<Datum> = match typ.scalar_type {
            ScalarType::Bool => vec![Datum::False, Datum::True],
            _ => pool
                .iter()
                .filter(|d| d.is_instance_of(&typ.scalar_type))
                .cloned()
                .collect(),
        };
        if values.is_empty() {
            tracing::debug!(
                column,
                "skipping verification: no enumerable domain for column"
            );
            return;
        }
        if typ.nullable {
            values.push(Datum::Null);
        }
        domains.push((column, values));
    }
    let total: usize = domains.iter().map(|(_, values)| values.len()).product();
    if total > MAX_ASSIGNMENTS {
        tracing::debug!(total, "skipping verification: too many assignments");
        return;
    }

    // Only predicates whose variables we are enumerating can filter
    // assignments.
    let applicable: Vec<&ScalarExpr> = predicates
        .pulled_up()
        .iter()
        .filter(|p| p.support().is_subset(&variables0))
        .collect();

    let is_boolean = before.typ(relation_type).scalar_type == ScalarType::Bool;
    let mut indices = vec![0usize; domains.len()];
    'assignments: loop {
        let mut datums = vec![Datum::Null; relation_type.arity()];
        for (slot, (column, values)) in indices.iter().zip(domains.iter()) {
            datums[*column] = values[*slot].clone();
        }

        let mut satisfied = true;
        for predicate in &applicable {
            match predicate.eval(&datums) {
                Ok(Datum::True) => {}
                _ => {
                    satisfied = false;
                    break;
                }
            }
        }
        if satisfied {
            if let (Ok(mut v0), Ok(mut v1)) = (before.eval(&datums), simplified.eval(&datums)) {
                if is_boolean {
                    if let Some(b) = unknown_as.to_bool() {
                        if v0.is_null() {
                            v0 = Datum::from_bool(b);
                        }
                        if v1.is_null() {
                            v1 = Datum::from_bool(b);
                        }
                    }
                }
                assert!(
                    v0 == v1,
                    "result mismatch (unknown as {}): when applied to {:?},\n{} yielded {},\n{} yielded {}",
                    unknown_as,
                    datums,
                    before,
                    v0,
                    simplified,
                    v1,
                );
            }
            // An evaluation error on either side leaves this assignment
            // undecided.
        }

        // Advance the odometer.
        for position in 0..indices.len() {
            indices[position] += 1;
            if indices[position] < domains[position].1.len() {
                continue 'assignments;
            }
            indices[position] = 0;
        }
        break;
    }
}

/// The columns referenced by the expression, or `None` if it contains
/// constructs whose domains cannot be enumerated.
fn variables(e: &ScalarExpr) -> Option<BTreeSet<usize>> {
    let mut supported = true;
    let mut variables = BTreeSet::new();
    e.visit(&mut |e| match e {
        ScalarExpr::Column(i) => {
            variables.insert(*i);
        }
        ScalarExpr::Parameter(_, _)
        | ScalarExpr::CallNullary(_)
        | ScalarExpr::Aggregate { .. } => supported = false,
        ScalarExpr::CallUnary {
            func: UnaryFunc::RecordGet(_),
            ..
        } => supported = false,
        _ => {}
    });
    if supported {
        Some(variables)
    } else {
        None
    }
}

/// Collects the non-null literal values in the expression, including the
/// endpoints of search arguments, as candidate domain values.
fn literal_pool(e: &ScalarExpr, pool: &mut Vec<Datum>) {
    e.visit(&mut |e| match e {
        ScalarExpr::Literal(Ok(datum), _) if !datum.is_null() => pool.push(datum.clone()),
        ScalarExpr::CallUnary {
            func: UnaryFunc::Search(sarg),
            ..
        } => {
            for range in sarg.range_set.ranges() {
                pool.extend(range.lower_endpoint().cloned());
                pool.extend(range.upper_endpoint().cloned());
            }
        }
        _ => {}
    });
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use tern_repr::RelationType;

    use super::*;
    use crate::scalar::func::{BinaryFunc, VariadicFunc};
    use crate::simplify::{EvalExecutor, Simplifier};

    fn relation_type() -> RelationType {
        RelationType::new(vec![
            ScalarType::Bool.nullable(true),
            ScalarType::Bool.nullable(true),
            ScalarType::Int64.nullable(true),
        ])
    }

    fn int_lit(i: i64) -> ScalarExpr {
        ScalarExpr::literal_ok(Datum::Int64(i), ScalarType::Int64)
    }

    #[test]
    fn test_verify_accepts_equivalent() {
        let relation_type = relation_type();
        // "#2 = #2" against "isnotnull(#2) OR null".
        let before = ScalarExpr::column(2).call_binary(ScalarExpr::column(2), BinaryFunc::Eq);
        let after = ScalarExpr::CallVariadic {
            func: VariadicFunc::Or,
            exprs: vec![
                ScalarExpr::literal_null(ScalarType::Bool),
                ScalarExpr::column(2).call_unary(UnaryFunc::IsNotNull),
            ],
        };
        for unknown_as in [UnknownAs::Unknown, UnknownAs::True, UnknownAs::False] {
            verify(
                &before,
                &after,
                unknown_as,
                &PredicateList::empty(),
                &relation_type,
            );
        }
    }

    #[test]
    #[should_panic(expected = "result mismatch")]
    fn test_verify_rejects_wrong_rewrite() {
        let relation_type = relation_type();
        let before = ScalarExpr::column(0).call_is_null();
        let wrong = ScalarExpr::literal_false();
        verify(
            &before,
            &wrong,
            UnknownAs::Unknown,
            &PredicateList::empty(),
            &relation_type,
        );
    }

    #[test]
    fn test_verify_respects_predicates() {
        let relation_type = relation_type();
        // Under the predicate "#2 > 5", "#2 > 3" always holds on non-null
        // rows, so rewriting it to "#2 IS NOT NULL" is fine.
        let predicates =
            PredicateList::new(vec![ScalarExpr::column(2)
                .call_binary(int_lit(5), BinaryFunc::Gt)]);
        let before = ScalarExpr::column(2).call_binary(int_lit(3), BinaryFunc::Gt);
        let after = ScalarExpr::column(2).call_unary(UnaryFunc::IsNotNull);
        verify(
            &before,
            &after,
            UnknownAs::Unknown,
            &predicates,
            &relation_type,
        );
    }

    fn arb_expr() -> impl Strategy<Value = ScalarExpr> {
        let comparison = (
            prop_oneof![
                Just(BinaryFunc::Eq),
                Just(BinaryFunc::NotEq),
                Just(BinaryFunc::Lt),
                Just(BinaryFunc::Lte),
                Just(BinaryFunc::Gt),
                Just(BinaryFunc::Gte),
            ],
            prop_oneof![Just(0i64), Just(5), Just(10)],
        )
            .prop_map(|(func, value)| {
                ScalarExpr::column(2).call_binary(int_lit(value), func)
            });
        let leaf = prop_oneof![
            Just(ScalarExpr::column(0)),
            Just(ScalarExpr::column(1)),
            Just(ScalarExpr::literal_true()),
            Just(ScalarExpr::literal_false()),
            Just(ScalarExpr::literal_null(ScalarType::Bool)),
            Just(ScalarExpr::column(2).call_is_null()),
            comparison,
        ];
        leaf.prop_recursive(3, 24, 3, |inner| {
            prop_oneof![
                inner.clone().prop_map(|e| e.call_unary(UnaryFunc::Not)),
                inner.clone().prop_map(|e| e.call_unary(UnaryFunc::IsNull)),
                inner.clone().prop_map(|e| e.call_unary(UnaryFunc::IsTrue)),
                (inner.clone(), inner.clone()).prop_map(|(a, b)| ScalarExpr::CallVariadic {
                    func: VariadicFunc::And,
                    exprs: vec![a, b],
                }),
                (inner.clone(), inner.clone()).prop_map(|(a, b)| ScalarExpr::CallVariadic {
                    func: VariadicFunc::Or,
                    exprs: vec![a, b],
                }),
                (inner.clone(), inner.clone(), inner).prop_map(|(c, t, e)| c.if_then_else(t, e)),
            ]
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        // Simplification preserves the three-valued semantics under every
        // UNKNOWN policy, and reaches a fixed point in one step.
        #[test]
        fn test_simplify_preserves_semantics(e in arb_expr()) {
            let relation_type = relation_type();
            let executor = EvalExecutor;
            let simplifier = Simplifier::new(&relation_type, &executor);
            for unknown_as in [UnknownAs::Unknown, UnknownAs::True, UnknownAs::False] {
                let simplified = simplifier.simplify_unknown_as(&e, unknown_as);
                verify(&e, &simplified, unknown_as, &PredicateList::empty(), &relation_type);
                // The UnknownAs::True normal form can take a second step in
                // corner cases; the faithful and filter modes must not.
                if unknown_as != UnknownAs::True {
                    let again = simplifier.simplify_unknown_as(&simplified, unknown_as);
                    prop_assert_eq!(&again, &simplified, "not idempotent under {}", unknown_as);
                }
            }
        }

        // NOT NOT e simplifies like e.
        #[test]
        fn test_not_involution(e in arb_expr()) {
            let relation_type = relation_type();
            let executor = EvalExecutor;
            let simplifier = Simplifier::new(&relation_type, &executor);
            for unknown_as in [UnknownAs::Unknown, UnknownAs::True, UnknownAs::False] {
                // Raw double negation; the smart constructor would cancel it
                // before the simplifier ever saw it.
                let double = e.clone().call_unary(UnaryFunc::Not).call_unary(UnaryFunc::Not);
                let lhs = simplifier.simplify_unknown_as(&double, unknown_as);
                let rhs = simplifier.simplify_unknown_as(&e, unknown_as);
                prop_assert_eq!(lhs, rhs);
            }
        }

        // De Morgan: NOT (a AND b) simplifies like (NOT a) OR (NOT b).
        #[test]
        fn test_de_morgan(a in arb_expr(), b in arb_expr()) {
            let relation_type = relation_type();
            let executor = EvalExecutor;
            let simplifier = Simplifier::new(&relation_type, &executor);
            for unknown_as in [UnknownAs::Unknown, UnknownAs::True, UnknownAs::False] {
                let conjunction = ScalarExpr::CallVariadic {
                    func: VariadicFunc::And,
                    exprs: vec![a.clone(), b.clone()],
                };
                let lhs = simplifier.simplify_unknown_as(
                    &conjunction.call_unary(UnaryFunc::Not),
                    unknown_as,
                );
                let rhs = simplifier.simplify_unknown_as(
                    &ScalarExpr::CallVariadic {
                        func: VariadicFunc::Or,
                        exprs: vec![
                            crate::simplify::not(a.clone()),
                            crate::simplify::not(b.clone()),
                        ],
                    },
                    unknown_as,
                );
                prop_assert_eq!(lhs, rhs);
            }
        }
    }
}
