// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The expression simplifier.
//!
//! [`Simplifier`] rewrites a [`ScalarExpr`] into an equivalent, usually
//! smaller one, under a declared interpretation of boolean NULL results
//! ([`UnknownAs`]) and a list of predicates known to hold on the input. The
//! rewrite never turns TRUE into FALSE (or vice versa) on any input; with
//! `paranoid` enabled every public call re-checks that claim by evaluating
//! both expressions on enumerated assignments.

use std::collections::BTreeSet;

use tern_repr::{ColumnType, Datum, RelationType, ScalarType};

use crate::interpret;
use crate::predicates::PredicateList;
use crate::sarg::{
    range_for_comparison, range_set_for_comparison, sarg_expansion, RangeSet, Sarg, UnknownAs,
};
use crate::scalar::func::{
    can_cast, datum_scalar_type, is_lossless, BinaryFunc, UnaryFunc, VariadicFunc, WindowFrame,
};
use crate::scalar::ScalarExpr;
use crate::strong::{self, Policy};

mod logic;

/// Folds expressions whose operands are all literals. The simplifier invokes
/// it only from CAST folding; implementations must be side-effect free.
pub trait Executor: std::fmt::Debug {
    /// Attempts to reduce `expr` to a literal. Implementations may return
    /// the expression (or parts of it) unreduced; failures are returned as
    /// error literals.
    fn reduce(&self, expr: &ScalarExpr, relation_type: &RelationType) -> ScalarExpr;
}

/// The default executor: evaluates the expression over an empty row and
/// rebuilds it as a literal, folding evaluation failures into error
/// literals.
#[derive(Clone, Copy, Debug, Default)]
pub struct EvalExecutor;

impl Executor for EvalExecutor {
    fn reduce(&self, expr: &ScalarExpr, relation_type: &RelationType) -> ScalarExpr {
        let typ = expr.typ(relation_type);
        ScalarExpr::literal(expr.eval(&[]), typ.scalar_type)
    }
}

/// An immutable handle bundling everything a simplification needs. The
/// `with_*` methods return new handles sharing the heavy parts.
#[derive(Clone, Debug)]
pub struct Simplifier<'a> {
    relation_type: &'a RelationType,
    predicates: PredicateList,
    default_unknown_as: UnknownAs,
    predicate_elimination: bool,
    paranoid: bool,
    executor: &'a dyn Executor,
}

impl<'a> Simplifier<'a> {
    pub fn new(relation_type: &'a RelationType, executor: &'a dyn Executor) -> Simplifier<'a> {
        Simplifier {
            relation_type,
            predicates: PredicateList::empty(),
            default_unknown_as: UnknownAs::Unknown,
            predicate_elimination: true,
            paranoid: false,
            executor,
        }
    }

    pub fn relation_type(&self) -> &RelationType {
        self.relation_type
    }

    pub fn predicates(&self) -> &PredicateList {
        &self.predicates
    }

    pub fn with_predicates(&self, predicates: PredicateList) -> Simplifier<'a> {
        Simplifier {
            predicates,
            ..self.clone()
        }
    }

    pub fn with_unknown_as(&self, unknown_as: UnknownAs) -> Simplifier<'a> {
        Simplifier {
            default_unknown_as: unknown_as,
            ..self.clone()
        }
    }

    pub fn with_predicate_elimination(&self, predicate_elimination: bool) -> Simplifier<'a> {
        Simplifier {
            predicate_elimination,
            ..self.clone()
        }
    }

    pub fn with_paranoid(&self, paranoid: bool) -> Simplifier<'a> {
        Simplifier {
            paranoid,
            ..self.clone()
        }
    }

    /// Simplifies under the handle's default interpretation of UNKNOWN.
    pub fn simplify(&self, e: &ScalarExpr) -> ScalarExpr {
        self.simplify_unknown_as(e, self.default_unknown_as)
    }

    /// Simplifies assuming an UNKNOWN result will be treated as FALSE, as in
    /// a WHERE, ON, HAVING or FILTER clause. This enables rewrites that a
    /// faithful UNKNOWN result would forbid.
    pub fn simplify_unknown_as_false(&self, e: &ScalarExpr) -> ScalarExpr {
        self.simplify_unknown_as(e, UnknownAs::False)
    }

    /// Simplifies under an explicit interpretation of UNKNOWN results.
    pub fn simplify_unknown_as(&self, e: &ScalarExpr, unknown_as: UnknownAs) -> ScalarExpr {
        let simplified = self.with_paranoid(false).simplify_under(e, unknown_as);
        if simplified != *e {
            tracing::trace!(input = %e, output = %simplified, %unknown_as, "simplified");
        }
        if self.paranoid {
            interpret::verify(e, &simplified, unknown_as, &self.predicates, self.relation_type);
        }
        simplified
    }

    /// As [`Simplifier::simplify`], but wraps the result in a cast back to
    /// the original type if simplification would have changed it.
    pub fn simplify_preserving_type(&self, e: &ScalarExpr) -> ScalarExpr {
        self.simplify_preserving_type_as(e, self.default_unknown_as, true)
    }

    /// As [`Simplifier::simplify_preserving_type`], with the UNKNOWN policy
    /// explicit. When `match_nullability` is unset, a result type that
    /// differs only in nullability is accepted without a cast.
    pub fn simplify_preserving_type_as(
        &self,
        e: &ScalarExpr,
        unknown_as: UnknownAs,
        match_nullability: bool,
    ) -> ScalarExpr {
        let e2 = self.simplify_unknown_as(e, unknown_as);
        let e_typ = e.typ(self.relation_type);
        let e2_typ = e2.typ(self.relation_type);
        if e2_typ == e_typ {
            return e2;
        }
        if !match_nullability && e2_typ.base_eq(&e_typ) {
            return e2;
        }
        let e3 = e2.call_unary(UnaryFunc::Cast {
            to: e_typ,
            safe: false,
        });
        if e3 == *e {
            return e.clone();
        }
        e3
    }

    /// AND-combines `predicates`, simplifies treating UNKNOWN as FALSE, and
    /// strips any nullability-only cast. Returns `None` iff the result is
    /// always false, i.e. the filter would discard every row.
    pub fn simplify_filter_predicates(&self, predicates: &[ScalarExpr]) -> Option<ScalarExpr> {
        let conjunction = compose_conjunction(predicates.to_vec());
        let simplified = self.simplify_unknown_as_false(&conjunction);
        if simplified.is_literal_false() {
            return None;
        }
        Some(self.remove_nullability_cast(&simplified))
    }

    /// Simplifies a conjunction of boolean expressions under the handle's
    /// default UNKNOWN policy.
    pub fn simplify_ands(&self, exprs: &[ScalarExpr]) -> ScalarExpr {
        assert!(!self.paranoid, "paranoid mode is not supported here");
        let mut terms = Vec::new();
        let mut not_terms = Vec::new();
        for e in exprs {
            decompose_conjunction(e, &mut terms, &mut not_terms);
        }
        self.simplify_list(&mut terms, UnknownAs::Unknown);
        self.simplify_list(&mut not_terms, UnknownAs::Unknown);
        if self.default_unknown_as == UnknownAs::False {
            self.simplify_and2_unknown_as_false(terms, not_terms)
        } else {
            self.simplify_and2(terms, not_terms, self.default_unknown_as)
        }
    }

    /// Simplifies a disjunction of boolean expressions. The result returns
    /// UNKNOWN values as is.
    pub fn simplify_ors(&self, exprs: &[ScalarExpr]) -> ScalarExpr {
        assert!(!self.paranoid, "paranoid mode is not supported here");
        let mut terms = exprs.to_vec();
        self.simplify_list(&mut terms, UnknownAs::Unknown);
        self.simplify_ors_internal(&mut terms, UnknownAs::Unknown)
    }

    /// Removes casts that change nullability but not type.
    pub fn remove_nullability_cast(&self, e: &ScalarExpr) -> ScalarExpr {
        let mut cur = e;
        while let ScalarExpr::CallUnary {
            func: UnaryFunc::Cast { to, .. },
            expr,
        } = cur
        {
            if to.scalar_type == expr.typ(self.relation_type).scalar_type {
                cur = expr;
            } else {
                break;
            }
        }
        cur.clone()
    }

    /// The internal dispatcher. Unlike the public entry points this never
    /// verifies; verification is only worth its cost at top level.
    pub(crate) fn simplify_under(&self, e: &ScalarExpr, unknown_as: UnknownAs) -> ScalarExpr {
        if is_safe_expression(e, self.relation_type) && strong::is_null(e) {
            // Only boolean NULL (aka UNKNOWN) can be converted to FALSE or
            // TRUE. A NULL of any other type stays a typed NULL literal.
            let typ = e.typ(self.relation_type);
            if typ.scalar_type == ScalarType::Bool {
                match unknown_as.to_bool() {
                    Some(true) => return ScalarExpr::literal_true(),
                    Some(false) => return ScalarExpr::literal_false(),
                    None => {}
                }
            }
            return ScalarExpr::literal_null(typ.scalar_type);
        }
        match e {
            ScalarExpr::CallVariadic {
                func: VariadicFunc::And,
                ..
            } => self.simplify_and(e, unknown_as),
            ScalarExpr::CallVariadic {
                func: VariadicFunc::Or,
                ..
            } => self.simplify_or(e, unknown_as),
            ScalarExpr::CallUnary {
                func: UnaryFunc::Not,
                expr,
            } => self.simplify_not(e, expr, unknown_as),
            ScalarExpr::If { .. } => self.simplify_case(e, unknown_as),
            ScalarExpr::CallVariadic {
                func: VariadicFunc::Coalesce,
                exprs,
            } => self.simplify_coalesce(e, exprs),
            ScalarExpr::CallUnary {
                func: UnaryFunc::Cast { .. },
                ..
            } => self.simplify_cast(e),
            ScalarExpr::CallUnary {
                func: UnaryFunc::CeilTo(_) | UnaryFunc::FloorTo(_),
                ..
            } => self.simplify_ceil_floor(e),
            ScalarExpr::CallBinary {
                func: BinaryFunc::Trim | BinaryFunc::TrimLeading | BinaryFunc::TrimTrailing,
                ..
            } => self.simplify_trim(e),
            ScalarExpr::CallUnary {
                func:
                    func @ (UnaryFunc::IsNull
                    | UnaryFunc::IsNotNull
                    | UnaryFunc::IsTrue
                    | UnaryFunc::IsNotTrue
                    | UnaryFunc::IsFalse
                    | UnaryFunc::IsNotFalse),
                expr,
            } => self.simplify_is(e, func, expr, unknown_as),
            ScalarExpr::CallBinary { func, .. } if func.is_comparison() => {
                self.simplify_comparison(e, unknown_as)
            }
            ScalarExpr::CallUnary {
                func: UnaryFunc::Search(_),
                ..
            } => self.simplify_search(e, unknown_as),
            ScalarExpr::CallBinary {
                func: BinaryFunc::Like,
                ..
            } => self.simplify_like(e, unknown_as),
            ScalarExpr::CallUnary {
                func: UnaryFunc::Neg | UnaryFunc::CheckedNeg,
                expr,
            } => self.simplify_unary_minus(e, expr, unknown_as),
            ScalarExpr::CallUnary {
                func: UnaryFunc::Pos,
                expr,
            } => self.simplify_under(expr, unknown_as),
            ScalarExpr::CallBinary {
                func:
                    BinaryFunc::Add
                    | BinaryFunc::CheckedAdd
                    | BinaryFunc::Sub
                    | BinaryFunc::CheckedSub
                    | BinaryFunc::Mul
                    | BinaryFunc::CheckedMul
                    | BinaryFunc::Div
                    | BinaryFunc::CheckedDiv,
                ..
            } => self.simplify_arithmetic(e),
            ScalarExpr::CallVariadic {
                func: VariadicFunc::In | VariadicFunc::NotIn,
                ..
            } => self.simplify_in(e, unknown_as),
            ScalarExpr::CallVariadic {
                func: VariadicFunc::Between,
                ..
            } => self.simplify_between(e, unknown_as),
            ScalarExpr::CallUnary {
                func: UnaryFunc::MeasureToValue,
                expr,
            } => self.simplify_m2v(e, expr),
            ScalarExpr::Column(_)
            | ScalarExpr::Literal(_, _)
            | ScalarExpr::CallNullary(_)
            | ScalarExpr::Parameter(_, _)
            | ScalarExpr::Aggregate { .. } => e.clone(),
            _ => self.simplify_generic_node(e),
        }
    }

    pub(crate) fn simplify_list(&self, terms: &mut Vec<ScalarExpr>, unknown_as: UnknownAs) {
        for term in terms.iter_mut() {
            *term = self.simplify_under(term, unknown_as);
        }
    }

    /// Runs simplification inside a non-specialized node.
    fn simplify_generic_node(&self, e: &ScalarExpr) -> ScalarExpr {
        let mut e2 = e.clone();
        let mut changed = false;
        e2.visit1_mut(|operand| {
            let simplified = self.simplify_under(operand, UnknownAs::Unknown);
            if simplified != *operand {
                *operand = simplified;
                changed = true;
            }
        });
        if changed {
            e2
        } else {
            e.clone()
        }
    }

    fn simplify_not(&self, e: &ScalarExpr, a: &ScalarExpr, unknown_as: UnknownAs) -> ScalarExpr {
        match a {
            // NOT NOT x ==> x
            ScalarExpr::CallUnary {
                func: UnaryFunc::Not,
                expr,
            } => self.simplify_under(expr, unknown_as),
            // NOT SEARCH(x, s) ==> SEARCH(x, s.negate())
            ScalarExpr::CallUnary {
                func: UnaryFunc::Search(sarg),
                expr,
            } => {
                let negated = expr
                    .clone()
                    .call_unary(UnaryFunc::Search(Box::new(sarg.negate())));
                self.simplify_search(&negated, unknown_as.negate())
            }
            ScalarExpr::Literal(Ok(Datum::True), _) => ScalarExpr::literal_false(),
            ScalarExpr::Literal(Ok(Datum::False), _) => ScalarExpr::literal_true(),
            // NOT distributivity for AND and OR.
            ScalarExpr::CallVariadic {
                func: func @ (VariadicFunc::And | VariadicFunc::Or),
                exprs,
            } => {
                let new_operands = exprs
                    .iter()
                    .map(|operand| self.simplify_under(&not(operand.clone()), unknown_as))
                    .collect();
                let dual = match func {
                    VariadicFunc::And => VariadicFunc::Or,
                    _ => VariadicFunc::And,
                };
                self.simplify_under(
                    &ScalarExpr::CallVariadic {
                        func: dual,
                        exprs: new_operands,
                    },
                    unknown_as,
                )
            }
            // NOT CASE pushes the negation into the value positions.
            ScalarExpr::If { cond, then, els } => self.simplify_under(
                &ScalarExpr::If {
                    cond: cond.clone(),
                    then: Box::new(not((**then).clone())),
                    els: Box::new(not((**els).clone())),
                },
                unknown_as,
            ),
            // Do not try to negate IN or NOT IN.
            ScalarExpr::CallVariadic {
                func: VariadicFunc::In | VariadicFunc::NotIn,
                ..
            } => self.simplify_not_generic(e, a, unknown_as),
            ScalarExpr::CallBinary { func, expr1, expr2 } => match func.negate() {
                Some(negated) => self.simplify_under(
                    &ScalarExpr::CallBinary {
                        func: negated,
                        expr1: expr1.clone(),
                        expr2: expr2.clone(),
                    },
                    unknown_as,
                ),
                None => self.simplify_not_generic(e, a, unknown_as),
            },
            ScalarExpr::CallUnary { func, expr } => match func.negate() {
                Some(negated) => self.simplify_under(
                    &expr.as_ref().clone().call_unary(negated),
                    unknown_as,
                ),
                None => self.simplify_not_generic(e, a, unknown_as),
            },
            _ => self.simplify_not_generic(e, a, unknown_as),
        }
    }

    fn simplify_not_generic(
        &self,
        e: &ScalarExpr,
        a: &ScalarExpr,
        unknown_as: UnknownAs,
    ) -> ScalarExpr {
        let a2 = self.simplify_under(a, unknown_as.negate());
        if a2 == *a {
            e.clone()
        } else {
            not(a2)
        }
    }

    fn simplify_unary_minus(
        &self,
        e: &ScalarExpr,
        a: &ScalarExpr,
        unknown_as: UnknownAs,
    ) -> ScalarExpr {
        if let ScalarExpr::CallUnary {
            func: UnaryFunc::Neg | UnaryFunc::CheckedNeg,
            expr,
        } = a
        {
            // -(-(x)) ==> x
            return self.simplify_under(expr, unknown_as);
        }
        self.simplify_generic_node(e)
    }

    fn simplify_is(
        &self,
        e: &ScalarExpr,
        func: &UnaryFunc,
        a: &ScalarExpr,
        unknown_as: UnknownAs,
    ) -> ScalarExpr {
        match self.simplify_is1(func, a, unknown_as) {
            Some(simplified) => simplified,
            None => e.clone(),
        }
    }

    pub(crate) fn simplify_is1(
        &self,
        func: &UnaryFunc,
        a: &ScalarExpr,
        unknown_as: UnknownAs,
    ) -> Option<ScalarExpr> {
        // In UnknownAs::False mode the whole expression is evaluated as if
        // under IS TRUE, so "x IS TRUE" adds nothing; dually for
        // UnknownAs::True and "x IS NOT FALSE". "x IS FALSE" and
        // "x IS NOT TRUE" reduce through the negation.
        match (func, unknown_as) {
            (UnaryFunc::IsTrue, UnknownAs::False) => {
                return Some(self.simplify_under(a, unknown_as))
            }
            (UnaryFunc::IsFalse, UnknownAs::False) => {
                return Some(self.simplify_under(&not(a.clone()), unknown_as))
            }
            (UnaryFunc::IsNotFalse, UnknownAs::True) => {
                return Some(self.simplify_under(a, unknown_as))
            }
            (UnaryFunc::IsNotTrue, UnknownAs::True) => {
                return Some(self.simplify_under(&not(a.clone()), unknown_as))
            }
            _ => {}
        }
        if let Some(pred) = self.simplify_is_predicate(func, a) {
            return Some(pred);
        }
        self.simplify_is2(func, a, unknown_as)
    }

    /// If the predicate list already asserts exactly this IS predicate,
    /// the answer is TRUE.
    fn simplify_is_predicate(&self, func: &UnaryFunc, a: &ScalarExpr) -> Option<ScalarExpr> {
        if !(is_ref_or_access(a, true) || a.is_deterministic()) {
            return None;
        }
        for p in self.predicates.pulled_up() {
            if let Some(pred) = IsPredicate::of(p) {
                if pred.ref_expr == *a && pred.func == *func {
                    return Some(ScalarExpr::literal_true());
                }
            }
        }
        None
    }

    fn simplify_is2(
        &self,
        func: &UnaryFunc,
        a: &ScalarExpr,
        unknown_as: UnknownAs,
    ) -> Option<ScalarExpr> {
        match func {
            UnaryFunc::IsNull => {
                self.validate_strong_policy(a);
                if let Some(simplified) = self.simplify_is_null(a) {
                    return Some(simplified);
                }
            }
            UnaryFunc::IsNotNull => {
                self.validate_strong_policy(a);
                if let Some(simplified) = self.simplify_is_not_null(a) {
                    return Some(simplified);
                }
            }
            UnaryFunc::IsTrue => {
                // x IS TRUE ==> x (if x is not nullable)
                if self
                    .predicates
                    .is_effectively_not_null(a, self.relation_type)
                {
                    return Some(self.simplify_under(a, unknown_as));
                }
                let simplified = self.simplify_under(a, UnknownAs::False);
                if simplified == *a {
                    return None;
                }
                return Some(self.is_true(simplified));
            }
            UnaryFunc::IsNotFalse => {
                // x IS NOT FALSE ==> x (if x is not nullable)
                if self
                    .predicates
                    .is_effectively_not_null(a, self.relation_type)
                {
                    return Some(self.simplify_under(a, unknown_as));
                }
                let simplified = self.simplify_under(a, UnknownAs::True);
                if simplified == *a {
                    return None;
                }
                return Some(self.is_not_false(simplified));
            }
            UnaryFunc::IsFalse | UnaryFunc::IsNotTrue => {
                // x IS FALSE ==> NOT x (if x is not nullable), and likewise
                // for x IS NOT TRUE.
                if self
                    .predicates
                    .is_effectively_not_null(a, self.relation_type)
                {
                    return Some(self.simplify_under(&not(a.clone()), unknown_as));
                }
            }
            _ => unreachable!("simplify_is2 called on a non-IS function"),
        }
        if let ScalarExpr::CallUnary {
            func: UnaryFunc::Not,
            expr,
        } = a
        {
            // (NOT x) IS TRUE ==> x IS NOT TRUE, and so on; the negation is
            // the null-safe one because of NULL values.
            let negated = func.negate().expect("IS predicates have negations");
            return Some(self.simplify_under(
                &expr.as_ref().clone().call_unary(negated),
                UnknownAs::Unknown,
            ));
        }
        let a2 = self.simplify_under(a, UnknownAs::Unknown);
        if a2 != *a {
            return Some(a2.call_unary(func.clone()));
        }
        None // cannot be simplified
    }

    /// Checks the §4.4 invariant relating the strong policy to static
    /// nullability.
    fn validate_strong_policy(&self, expr: &ScalarExpr) {
        if has_custom_nullability_rules(expr) {
            return;
        }
        match strong::policy(expr) {
            Policy::NotNull => {
                debug_assert!(!expr.typ(self.relation_type).nullable);
            }
            Policy::Any => {
                if !expr.typ(self.relation_type).nullable {
                    let mut any_nullable = false;
                    expr.visit1(|operand| {
                        any_nullable = any_nullable || operand.typ(self.relation_type).nullable;
                    });
                    debug_assert!(!any_nullable);
                }
            }
            _ => {}
        }
    }

    fn simplify_is_null(&self, a: &ScalarExpr) -> Option<ScalarExpr> {
        // Simplify the argument first: given "(CASE WHEN FALSE THEN 1 ELSE
        // 2 END) IS NULL" we reduce the argument to "2" before deciding.
        let a = self.simplify_under(a, UnknownAs::Unknown);
        if !a.typ(self.relation_type).nullable && is_safe_expression(&a, self.relation_type) {
            return Some(ScalarExpr::literal_false());
        }
        if self.is_lossless_cast(&a) {
            if !a.typ(self.relation_type).nullable {
                return Some(ScalarExpr::literal_false());
            }
            if let ScalarExpr::CallUnary { expr, .. } = &a {
                return Some(expr.as_ref().clone().call_is_null());
            }
        }
        if a.is_literal_null() {
            return Some(ScalarExpr::literal_true());
        }
        if has_custom_nullability_rules(&a) {
            return None;
        }
        match strong::policy(&a) {
            Policy::NotNull => Some(ScalarExpr::literal_false()),
            Policy::Any => {
                // "f" is strict, so "f(o0, o1) IS NULL" simplifies to
                // "o0 IS NULL OR o1 IS NULL".
                let mut operands = Vec::new();
                a.visit1(|operand| {
                    operands.push(match self.simplify_is_null(operand) {
                        Some(simplified) => simplified,
                        None => operand.clone().call_is_null(),
                    });
                });
                Some(compose_disjunction(operands))
            }
            _ => None,
        }
    }

    fn simplify_is_not_null(&self, a: &ScalarExpr) -> Option<ScalarExpr> {
        let a = self.simplify_under(a, UnknownAs::Unknown);
        if !a.typ(self.relation_type).nullable && is_safe_expression(&a, self.relation_type) {
            return Some(ScalarExpr::literal_true());
        }
        if self.is_lossless_cast(&a) {
            if !a.typ(self.relation_type).nullable {
                return Some(ScalarExpr::literal_true());
            }
            if let ScalarExpr::CallUnary { expr, .. } = &a {
                return Some(expr.as_ref().clone().call_unary(UnaryFunc::IsNotNull));
            }
        }
        if self.predicates.contains(&a) {
            return Some(ScalarExpr::literal_true());
        }
        if has_custom_nullability_rules(&a) {
            return None;
        }
        match strong::policy(&a) {
            Policy::NotNull => Some(ScalarExpr::literal_true()),
            Policy::Any => {
                // "f" is strict, so "f(o0, o1) IS NOT NULL" simplifies to
                // "o0 IS NOT NULL AND o1 IS NOT NULL".
                let mut always_false = false;
                let mut operands = Vec::new();
                a.visit1(|operand| {
                    match self.simplify_is_not_null(operand) {
                        Some(simplified) if simplified.is_literal_false() => always_false = true,
                        Some(simplified) => operands.push(simplified),
                        None => operands.push(
                            operand.clone().call_unary(UnaryFunc::IsNotNull),
                        ),
                    }
                });
                if always_false {
                    return Some(ScalarExpr::literal_false());
                }
                Some(compose_conjunction(operands))
            }
            Policy::Custom => match &a {
                ScalarExpr::Literal(res, _) => {
                    Some(ScalarExpr::literal_ok(
                        Datum::from_bool(!matches!(res, Ok(d) if d.is_null())),
                        ScalarType::Bool,
                    ))
                }
                _ => None,
            },
            Policy::AsIs => None,
        }
    }

    /// Whether `e` is a cast that embeds its operand's values injectively
    /// into the target type.
    pub(crate) fn is_lossless_cast(&self, e: &ScalarExpr) -> bool {
        if let ScalarExpr::CallUnary {
            func: UnaryFunc::Cast { to, safe: false },
            expr,
        } = e
        {
            return is_lossless(&expr.typ(self.relation_type).scalar_type, &to.scalar_type);
        }
        false
    }

    fn simplify_comparison(&self, e: &ScalarExpr, unknown_as: UnknownAs) -> ScalarExpr {
        let (func, expr1, expr2) = match e {
            ScalarExpr::CallBinary { func, expr1, expr2 } => (*func, expr1, expr2),
            _ => unreachable!("simplify_comparison called on a non-comparison"),
        };
        // UNKNOWN mode is warranted here: false = null.
        let o0 = self.simplify_under(expr1, UnknownAs::Unknown);
        let o1 = self.simplify_under(expr2, UnknownAs::Unknown);

        // Simplify "x <op> x".
        if o0 == o1 && o0.is_deterministic() {
            match func {
                BinaryFunc::Eq | BinaryFunc::Gte | BinaryFunc::Lte => {
                    // "x = x" simplifies to "null or x is not null".
                    let new_expr = ScalarExpr::CallVariadic {
                        func: VariadicFunc::Or,
                        exprs: vec![
                            ScalarExpr::literal_null(ScalarType::Bool),
                            o0.call_unary(UnaryFunc::IsNotNull),
                        ],
                    };
                    return self.simplify_under(&new_expr, unknown_as);
                }
                BinaryFunc::NotEq | BinaryFunc::Lt | BinaryFunc::Gt => {
                    // "x != x" simplifies to "null and x is null".
                    let new_expr = ScalarExpr::CallVariadic {
                        func: VariadicFunc::And,
                        exprs: vec![
                            ScalarExpr::literal_null(ScalarType::Bool),
                            o0.call_is_null(),
                        ],
                    };
                    return self.simplify_under(&new_expr, unknown_as);
                }
                _ => {}
            }
        }

        // Comparisons of a boolean against a boolean constant mostly reduce
        // to the operand or its negation.
        if o0.typ(self.relation_type).scalar_type == ScalarType::Bool {
            let cmp = if o1.is_literal_ok() {
                Some((&o0, func, &o1))
            } else if o0.is_literal_ok() {
                func.reverse().map(|f| (&o1, f, &o0))
            } else {
                None
            };
            if let Some((reference, kind, literal)) = cmp {
                let nullable = reference.typ(self.relation_type).nullable;
                if literal.is_literal_true() {
                    match kind {
                        BinaryFunc::Gte | BinaryFunc::Eq => return reference.clone(),
                        BinaryFunc::Lt | BinaryFunc::NotEq => {
                            return self.simplify_under(&not(reference.clone()), unknown_as)
                        }
                        // false, but could be null if the operand is null
                        BinaryFunc::Gt if !nullable => return ScalarExpr::literal_false(),
                        // true, but could be null if the operand is null
                        BinaryFunc::Lte if !nullable => return ScalarExpr::literal_true(),
                        _ => {}
                    }
                }
                if literal.is_literal_false() {
                    match kind {
                        BinaryFunc::Eq | BinaryFunc::Lte => {
                            return self.simplify_under(&not(reference.clone()), unknown_as)
                        }
                        BinaryFunc::NotEq | BinaryFunc::Gt => return reference.clone(),
                        BinaryFunc::Gte if !nullable => return ScalarExpr::literal_true(),
                        BinaryFunc::Lt if !nullable => return ScalarExpr::literal_false(),
                        _ => {}
                    }
                }
            }
        }

        // Simplify "<literal1> <op> <literal2>" when the types agree up to
        // nullability. "1 != NULL" becomes UNKNOWN (or FALSE if
        // unknownAsFalse); "1 != '1'" is left alone.
        if let (ScalarExpr::Literal(Ok(v0), t0), ScalarExpr::Literal(Ok(v1), t1)) = (&o0, &o1) {
            if t0.scalar_type.base_eq(&t1.scalar_type) {
                if v0.is_null() || v1.is_null() {
                    return match unknown_as {
                        UnknownAs::False => ScalarExpr::literal_false(),
                        _ => ScalarExpr::literal_null(ScalarType::Bool),
                    };
                }
                let ord = v0.cmp(v1);
                let result = match func {
                    BinaryFunc::Eq => ord.is_eq(),
                    BinaryFunc::NotEq => ord.is_ne(),
                    BinaryFunc::Lt => ord.is_lt(),
                    BinaryFunc::Lte => ord.is_le(),
                    BinaryFunc::Gt => ord.is_gt(),
                    BinaryFunc::Gte => ord.is_ge(),
                    _ => unreachable!(),
                };
                return ScalarExpr::literal_ok(Datum::from_bool(result), ScalarType::Bool);
            }
        }

        // If no argument was simplified, keep the original call.
        let e2 = if o0 == **expr1 && o1 == **expr2 {
            e.clone()
        } else {
            ScalarExpr::CallBinary {
                func,
                expr1: Box::new(o0),
                expr2: Box::new(o1),
            }
        };
        self.simplify_using_predicates(&e2)
    }

    /// Weakens a comparison term to what is not already implied by the
    /// predicate list; see [`residue`].
    pub(crate) fn simplify_using_predicates(&self, e: &ScalarExpr) -> ScalarExpr {
        if self.predicates.is_empty() {
            return e.clone();
        }
        let comparison = match Comparison::of(e) {
            Some(c) if !c.value.is_null() => c,
            _ => return e.clone(),
        };
        let range_set = match range_set_for_comparison(comparison.func, &comparison.value) {
            Some(range_set) => range_set,
            None => return e.clone(),
        };
        let residue = residue(&comparison.ref_expr, range_set.clone(), &self.predicates);
        if residue.is_empty() {
            // The term is impossible to satisfy given the predicates.
            return ScalarExpr::literal_false();
        }
        if residue == range_set {
            return e.clone();
        }
        if residue.is_all() {
            // Always satisfied given the predicates, except perhaps on NULL.
            return self.simplify_under(
                &comparison.ref_expr.call_unary(UnaryFunc::IsNotNull),
                UnknownAs::Unknown,
            );
        }
        if residue.ranges().len() == 1 {
            if let Some(point) = residue.ranges()[0].as_point() {
                // The residue is a single point; it is worth simplifying.
                return comparison.ref_expr.call_binary(
                    ScalarExpr::literal_ok(
                        point.clone(),
                        comparison.value_type.scalar_type.clone(),
                    ),
                    BinaryFunc::Eq,
                );
            }
        }
        // The range was narrowed, but not enough to be worth rewriting.
        e.clone()
    }

    fn simplify_arithmetic(&self, e: &ScalarExpr) -> ScalarExpr {
        let (func, expr1, expr2) = match e {
            ScalarExpr::CallBinary { func, expr1, expr2 } => (*func, expr1, expr2),
            _ => unreachable!("simplify_arithmetic called on a non-arithmetic call"),
        };
        let e_typ = e.typ(self.relation_type);
        if !e_typ.scalar_type.is_numeric()
            || !expr1.typ(self.relation_type).scalar_type.is_numeric()
            || !expr2.typ(self.relation_type).scalar_type.is_numeric()
        {
            return self.simplify_generic_node(e);
        }
        let is_value = |operand: &ScalarExpr, value: f64| match operand.as_literal() {
            Some(Ok(datum)) => datum.as_float64() == Some(value),
            _ => false,
        };
        // These identities are safe for checked and unchecked arithmetic
        // alike.
        let kept = match func {
            BinaryFunc::Add | BinaryFunc::CheckedAdd => {
                if is_value(expr1, 0.0) {
                    Some(expr2)
                } else if is_value(expr2, 0.0) {
                    Some(expr1)
                } else {
                    None
                }
            }
            BinaryFunc::Sub | BinaryFunc::CheckedSub => {
                if is_value(expr2, 0.0) {
                    Some(expr1)
                } else {
                    None
                }
            }
            BinaryFunc::Mul | BinaryFunc::CheckedMul => {
                if is_value(expr1, 1.0) {
                    Some(expr2)
                } else if is_value(expr2, 1.0) {
                    Some(expr1)
                } else {
                    None
                }
            }
            BinaryFunc::Div | BinaryFunc::CheckedDiv => {
                if is_value(expr2, 1.0) {
                    Some(expr1)
                } else {
                    None
                }
            }
            _ => unreachable!(),
        };
        match kept {
            Some(operand) => {
                if operand.typ(self.relation_type) == e_typ {
                    (**operand).clone()
                } else {
                    operand.as_ref().clone().call_unary(UnaryFunc::Cast {
                        to: e_typ,
                        safe: false,
                    })
                }
            }
            None => self.simplify_generic_node(e),
        }
    }

    fn simplify_like(&self, e: &ScalarExpr, unknown_as: UnknownAs) -> ScalarExpr {
        if let ScalarExpr::CallBinary { expr1, expr2, .. } = e {
            if expr2.as_literal_str() == Some("%") {
                // "x LIKE '%'" simplifies to "x = x".
                let x = expr1.as_ref().clone();
                return self.simplify_under(
                    &x.clone().call_binary(x, BinaryFunc::Eq),
                    unknown_as,
                );
            }
        }
        self.simplify_generic_node(e)
    }

    /// CEIL/FLOOR on top of CEIL/FLOOR with a coarser unit rolls up:
    /// `floor(floor($0, hour), day)` is `floor($0, day)`, but
    /// `floor(floor($0, day), second)` does not change.
    fn simplify_ceil_floor(&self, e: &ScalarExpr) -> ScalarExpr {
        let (func, expr) = match e {
            ScalarExpr::CallUnary { func, expr } => (func, expr),
            _ => unreachable!("simplify_ceil_floor called on a non-call"),
        };
        let operand = self.simplify_under(expr, UnknownAs::Unknown);
        if let ScalarExpr::CallUnary {
            func: inner_func,
            expr: inner_expr,
        } = &operand
        {
            let units = match (func, inner_func) {
                (UnaryFunc::CeilTo(outer), UnaryFunc::CeilTo(inner)) => Some((outer, inner)),
                (UnaryFunc::FloorTo(outer), UnaryFunc::FloorTo(inner)) => Some((outer, inner)),
                _ => None,
            };
            if let Some((outer, inner)) = units {
                if can_roll_up(*outer, *inner) {
                    return ScalarExpr::CallUnary {
                        func: func.clone(),
                        expr: inner_expr.clone(),
                    };
                }
            }
        }
        if operand == **expr {
            e.clone()
        } else {
            operand.call_unary(func.clone())
        }
    }

    /// TRIM of an identical TRIM (same kind, same characters) is redundant.
    fn simplify_trim(&self, e: &ScalarExpr) -> ScalarExpr {
        let (func, expr1, expr2) = match e {
            ScalarExpr::CallBinary { func, expr1, expr2 } => (*func, expr1, expr2),
            _ => unreachable!("simplify_trim called on a non-call"),
        };
        let inner = self.simplify_under(expr1, UnknownAs::Unknown);
        let chars = self.simplify_under(expr2, UnknownAs::Unknown);
        if let ScalarExpr::CallBinary {
            func: inner_func,
            expr2: inner_chars,
            ..
        } = &inner
        {
            if *inner_func == func && **inner_chars == chars {
                return inner;
            }
        }
        if inner == **expr1 && chars == **expr2 {
            e.clone()
        } else {
            ScalarExpr::CallBinary {
                func,
                expr1: Box::new(inner),
                expr2: Box::new(chars),
            }
        }
    }

    fn simplify_cast(&self, e: &ScalarExpr) -> ScalarExpr {
        let (to, safe, operand) = match e {
            ScalarExpr::CallUnary {
                func: UnaryFunc::Cast { to, safe },
                expr,
            } => (to, *safe, expr),
            _ => unreachable!("simplify_cast called on a non-cast"),
        };
        let operand = self.simplify_under(operand, UnknownAs::Unknown);
        // The type of a parameter is indeterminate, so its cast stays.
        // Casts to NUMERIC perform bounds checking and are never no-ops.
        if !matches!(operand, ScalarExpr::Parameter(_, _))
            && same_type_or_narrows_nullability(to, &operand.typ(self.relation_type))
            && !matches!(to.scalar_type, ScalarType::Numeric { .. })
        {
            return operand;
        }
        if self.is_lossless_cast(&operand) {
            if let ScalarExpr::CallUnary {
                expr: inner,
                ..
            } = &operand
            {
                // Remove both casts when the innermost type is preserved:
                // intExpr :: bigint :: int ==> intExpr.
                if same_type_or_narrows_nullability(to, &inner.typ(self.relation_type)) {
                    return (**inner).clone();
                }
                // Otherwise remove just the inner cast when the outer cast
                // could have been applied directly.
                let inner_type = inner.typ(self.relation_type);
                if is_lossless(
                    &inner_type.scalar_type,
                    &operand.typ(self.relation_type).scalar_type,
                ) && can_cast(&inner_type.scalar_type, &to.scalar_type)
                {
                    return inner.as_ref().clone().call_unary(UnaryFunc::Cast {
                        to: to.clone(),
                        safe,
                    });
                }
            }
        }
        match &operand {
            ScalarExpr::Literal(Ok(datum), _) => {
                // First, try to remove the cast without changing the value.
                if can_remove_cast_from_literal(datum, to) {
                    return ScalarExpr::literal_ok(datum.clone(), to.scalar_type.clone());
                }
                // Next, ask the executor to convert the value, e.g.
                // CAST('123' AS bigint).
                let cast_expr = operand.clone().call_unary(UnaryFunc::Cast {
                    to: to.clone(),
                    safe,
                });
                let reduced = self.executor.reduce(&cast_expr, self.relation_type);
                if let ScalarExpr::CallUnary {
                    func: UnaryFunc::Cast { to: to2, .. },
                    expr: reduced_operand,
                } = &reduced
                {
                    if same_type_or_narrows_nullability(
                        to2,
                        &reduced_operand.typ(self.relation_type),
                    ) {
                        return (**reduced_operand).clone();
                    }
                }
                reduced
            }
            ScalarExpr::Literal(Err(err), _) => {
                ScalarExpr::literal(Err(err.clone()), to.scalar_type.clone())
            }
            _ => {
                if let ScalarExpr::CallUnary { expr, .. } = e {
                    if operand == **expr {
                        return e.clone();
                    }
                }
                operand.call_unary(UnaryFunc::Cast {
                    to: to.clone(),
                    safe,
                })
            }
        }
    }

    fn simplify_coalesce(&self, e: &ScalarExpr, exprs: &[ScalarExpr]) -> ScalarExpr {
        let mut seen = BTreeSet::new();
        let mut operands = Vec::new();
        for operand in exprs {
            let operand = self.simplify_under(operand, UnknownAs::Unknown);
            if !operand.is_literal_null() && seen.insert(operand.clone()) {
                operands.push(operand.clone());
            }
            // Everything after the first non-nullable operand is dead.
            if !operand.typ(self.relation_type).nullable {
                break;
            }
        }
        match operands.len() {
            0 => ScalarExpr::literal_null(e.typ(self.relation_type).scalar_type),
            1 => operands.pop().expect("one operand"),
            _ => {
                if operands == exprs {
                    e.clone()
                } else {
                    ScalarExpr::CallVariadic {
                        func: VariadicFunc::Coalesce,
                        exprs: operands,
                    }
                }
            }
        }
    }

    fn simplify_in(&self, e: &ScalarExpr, unknown_as: UnknownAs) -> ScalarExpr {
        let (func, exprs) = match e {
            ScalarExpr::CallVariadic { func, exprs } => (*func, exprs),
            _ => unreachable!("simplify_in called on a non-call"),
        };
        let (needle, haystack) = exprs.split_first().expect("IN without needle");
        if !needle.is_deterministic() {
            return self.simplify_generic_node(e);
        }
        let equalities = haystack
            .iter()
            .map(|item| needle.clone().call_binary(item.clone(), BinaryFunc::Eq))
            .collect();
        let disjunction = compose_disjunction(equalities);
        match func {
            VariadicFunc::In => self.simplify_under(&disjunction, unknown_as),
            _ => self.simplify_under(&not(disjunction), unknown_as),
        }
    }

    fn simplify_between(&self, e: &ScalarExpr, unknown_as: UnknownAs) -> ScalarExpr {
        let exprs = match e {
            ScalarExpr::CallVariadic { exprs, .. } => exprs,
            _ => unreachable!("simplify_between called on a non-call"),
        };
        assert_eq!(exprs.len(), 3, "BETWEEN requires exactly 3 arguments");
        if !exprs[0].is_deterministic() {
            return self.simplify_generic_node(e);
        }
        let conjunction = ScalarExpr::CallVariadic {
            func: VariadicFunc::And,
            exprs: vec![
                exprs[0].clone().call_binary(exprs[1].clone(), BinaryFunc::Gte),
                exprs[0].clone().call_binary(exprs[2].clone(), BinaryFunc::Lte),
            ],
        };
        self.simplify_under(&conjunction, unknown_as)
    }

    /// A measure converted immediately back to a value: "m2v(v2m(e))"
    /// simplifies to "e", with aggregate calls inside "e" rewritten to
    /// single-row window aggregates.
    fn simplify_m2v(&self, e: &ScalarExpr, a: &ScalarExpr) -> ScalarExpr {
        match a {
            ScalarExpr::CallUnary {
                func: UnaryFunc::ValueToMeasure,
                expr,
            } => flatten_aggregate((**expr).clone()),
            _ => e.clone(),
        }
    }

    fn simplify_search(&self, e: &ScalarExpr, unknown_as: UnknownAs) -> ScalarExpr {
        let (sarg, a) = match e {
            ScalarExpr::CallUnary {
                func: UnaryFunc::Search(sarg),
                expr,
            } => (sarg, expr),
            _ => unreachable!("simplify_search called on a non-search"),
        };
        if sarg.is_all() || sarg.is_none() {
            let expanded = sarg_expansion(a, sarg, None, unknown_as);
            return self.simplify_under(&expanded, unknown_as);
        }
        if sarg.null_as != UnknownAs::Unknown {
            // Remove the null branch of the sarg if the left-hand side is
            // never null, then try again on the strengthened sarg.
            if let Some(simplified) = self.simplify_is1(&UnaryFunc::IsNull, a, unknown_as) {
                if simplified.is_literal_false() {
                    let sarg2 = Sarg::of(UnknownAs::Unknown, sarg.range_set.clone());
                    let search2 = a
                        .as_ref()
                        .clone()
                        .call_unary(UnaryFunc::Search(Box::new(sarg2)));
                    return self.simplify_search(&search2, unknown_as);
                }
            }
        } else if sarg.is_points() && sarg.point_count() <= 1 {
            // Expand "SEARCH(x, Sarg[point])" to "x = point".
            return sarg_expansion(a, sarg, None, unknown_as);
        }
        e.clone()
    }
}

/// Applies NOT to an expression, cancelling double negations and flipping
/// boolean literals.
pub(crate) fn not(e: ScalarExpr) -> ScalarExpr {
    match e {
        ScalarExpr::Literal(Ok(Datum::True), _) => ScalarExpr::literal_false(),
        ScalarExpr::Literal(Ok(Datum::False), _) => ScalarExpr::literal_true(),
        ScalarExpr::CallUnary {
            func: UnaryFunc::Not,
            expr,
        } => *expr,
        other => other.call_unary(UnaryFunc::Not),
    }
}

impl<'a> Simplifier<'a> {
    /// Applies IS TRUE, using the predicate list to avoid the wrapper when
    /// the operand cannot be null.
    pub(crate) fn is_true(&self, e: ScalarExpr) -> ScalarExpr {
        if e.is_literal_true() {
            return ScalarExpr::literal_true();
        }
        if e.is_literal_false() {
            return ScalarExpr::literal_false();
        }
        if let ScalarExpr::CallUnary {
            func: UnaryFunc::Not,
            expr,
        } = &e
        {
            return self.is_false((**expr).clone());
        }
        if self.predicates.is_effectively_not_null(&e, self.relation_type) {
            return e;
        }
        e.call_unary(UnaryFunc::IsTrue)
    }

    /// Applies IS FALSE; see [`Simplifier::is_true`].
    pub(crate) fn is_false(&self, e: ScalarExpr) -> ScalarExpr {
        if e.is_literal_true() {
            return ScalarExpr::literal_false();
        }
        if e.is_literal_false() {
            return ScalarExpr::literal_true();
        }
        if let ScalarExpr::CallUnary {
            func: UnaryFunc::Not,
            expr,
        } = &e
        {
            return self.is_true((**expr).clone());
        }
        if self.predicates.is_effectively_not_null(&e, self.relation_type) {
            return not(e);
        }
        e.call_unary(UnaryFunc::IsFalse)
    }

    /// Applies IS NOT TRUE; see [`Simplifier::is_true`].
    pub(crate) fn is_not_true(&self, e: ScalarExpr) -> ScalarExpr {
        if e.is_literal_true() {
            return ScalarExpr::literal_false();
        }
        if e.is_literal_false() {
            return ScalarExpr::literal_true();
        }
        if let ScalarExpr::CallUnary {
            func: UnaryFunc::Not,
            expr,
        } = &e
        {
            return self.is_not_false((**expr).clone());
        }
        if self.predicates.is_effectively_not_null(&e, self.relation_type) {
            return not(e);
        }
        e.call_unary(UnaryFunc::IsNotTrue)
    }

    /// Applies IS NOT FALSE; see [`Simplifier::is_true`].
    pub(crate) fn is_not_false(&self, e: ScalarExpr) -> ScalarExpr {
        if e.is_literal_true() {
            return ScalarExpr::literal_true();
        }
        if e.is_literal_false() {
            return ScalarExpr::literal_false();
        }
        if let ScalarExpr::CallUnary {
            func: UnaryFunc::Not,
            expr,
        } = &e
        {
            return self.is_not_true((**expr).clone());
        }
        if self.predicates.is_effectively_not_null(&e, self.relation_type) {
            return e;
        }
        e.call_unary(UnaryFunc::IsNotFalse)
    }
}

/// Rewrites bare aggregate calls into single-row window aggregates.
fn flatten_aggregate(mut e: ScalarExpr) -> ScalarExpr {
    e.visit_mut(&mut |e| {
        if let ScalarExpr::Aggregate {
            window: window @ None,
            ..
        } = e
        {
            *window = Some(WindowFrame::current_row());
        }
    });
    e
}

/// Whether the operator's nullability follows rules of its own rather than
/// its operands': a cast may change nullability outright, and a record field
/// may be null inside a non-null record.
pub(crate) fn has_custom_nullability_rules(e: &ScalarExpr) -> bool {
    matches!(
        e,
        ScalarExpr::CallUnary {
            func: UnaryFunc::Cast { .. } | UnaryFunc::RecordGet(_),
            ..
        }
    )
}

/// Whether the new type is the same as the old and at most narrows the
/// nullability.
pub(crate) fn same_type_or_narrows_nullability(old: &ColumnType, new: &ColumnType) -> bool {
    old == new || (old.scalar_type == new.scalar_type && old.nullable)
}

fn can_remove_cast_from_literal(datum: &Datum, to: &ColumnType) -> bool {
    datum.is_null() || datum_scalar_type(datum).as_ref() == Some(&to.scalar_type)
}

/// Whether we can roll up directly from the inner datetime unit to the outer
/// one. Units are ordered year > quarter > month > day > hour > minute >
/// second > milliseconds > microseconds, except that quarters only roll up
/// to years.
fn can_roll_up(
    outer: tern_repr::adt::datetime::DateTimeUnits,
    inner: tern_repr::adt::datetime::DateTimeUnits,
) -> bool {
    use tern_repr::adt::datetime::DateTimeUnits::*;
    if outer == Quarter {
        return inner >= Quarter;
    }
    if inner == Quarter {
        return outer == Year;
    }
    outer <= inner
}

/// Whether an expression is a column, a record field access, or (when
/// `allow_cast` is set) a cast of one.
pub(crate) fn is_ref_or_access(e: &ScalarExpr, allow_cast: bool) -> bool {
    match e {
        ScalarExpr::Column(_) => true,
        ScalarExpr::CallUnary {
            func: UnaryFunc::RecordGet(_),
            ..
        } => true,
        ScalarExpr::CallUnary {
            func: UnaryFunc::Cast { .. },
            expr,
        } if allow_cast => is_ref_or_access(expr, false),
        _ => false,
    }
}

/// Whether it is safe to duplicate or unguard the expression: evaluating it
/// can never raise. Division is unsafe unless the divisor is a non-null,
/// non-zero literal; window aggregates, subquery-like placeholders and
/// volatile functions are always unsafe.
pub fn is_safe_expression(e: &ScalarExpr, relation_type: &RelationType) -> bool {
    let safe = |e: &ScalarExpr| is_safe_expression(e, relation_type);
    match e {
        ScalarExpr::Column(_) | ScalarExpr::Literal(_, _) => true,
        ScalarExpr::CallNullary(_) | ScalarExpr::Parameter(_, _) | ScalarExpr::Aggregate { .. } => {
            false
        }
        ScalarExpr::CallUnary { func, expr } => {
            let func_safe = match func {
                // A safe cast never raises; a plain cast is safe only when
                // it cannot lose information.
                UnaryFunc::Cast { to, safe } => {
                    *safe || is_lossless(&expr.typ(relation_type).scalar_type, &to.scalar_type)
                }
                UnaryFunc::MeasureToValue | UnaryFunc::ValueToMeasure => false,
                _ => true,
            };
            func_safe && safe(expr)
        }
        ScalarExpr::CallBinary { func, expr1, expr2 } => match func {
            BinaryFunc::Div | BinaryFunc::CheckedDiv | BinaryFunc::Mod => {
                safe(expr1) && is_safe_divisor(expr2)
            }
            _ => safe(expr1) && safe(expr2),
        },
        ScalarExpr::CallVariadic { exprs, .. } => exprs.iter().all(safe),
        ScalarExpr::If { cond, then, els } => safe(cond) && safe(then) && safe(els),
    }
}

fn is_safe_divisor(e: &ScalarExpr) -> bool {
    match e.as_literal() {
        Some(Ok(datum)) => !datum.is_null() && datum.as_float64() != Some(0.0),
        _ => false,
    }
}

/// Combines terms with AND, flattening trivially: TRUE and duplicate terms
/// vanish, a FALSE term collapses the result.
pub fn compose_conjunction(terms: Vec<ScalarExpr>) -> ScalarExpr {
    if terms.iter().any(|t| t.is_literal_false()) {
        return ScalarExpr::literal_false();
    }
    let mut seen = BTreeSet::new();
    let mut terms: Vec<_> = terms
        .into_iter()
        .filter(|t| !t.is_literal_true() && seen.insert(t.clone()))
        .collect();
    match terms.len() {
        0 => ScalarExpr::literal_true(),
        1 => terms.pop().expect("one term"),
        _ => ScalarExpr::CallVariadic {
            func: VariadicFunc::And,
            exprs: terms,
        },
    }
}

/// Combines terms with OR, flattening trivially: FALSE and duplicate terms
/// vanish, a TRUE term collapses the result.
pub fn compose_disjunction(terms: Vec<ScalarExpr>) -> ScalarExpr {
    if terms.iter().any(|t| t.is_literal_true()) {
        return ScalarExpr::literal_true();
    }
    let mut seen = BTreeSet::new();
    let mut terms: Vec<_> = terms
        .into_iter()
        .filter(|t| !t.is_literal_false() && seen.insert(t.clone()))
        .collect();
    match terms.len() {
        0 => ScalarExpr::literal_false(),
        1 => terms.pop().expect("one term"),
        _ => ScalarExpr::CallVariadic {
            func: VariadicFunc::Or,
            exprs: terms,
        },
    }
}

/// The conjuncts of an expression: nested ANDs are flattened, TRUE vanishes.
pub(crate) fn conjunctions(e: &ScalarExpr) -> Vec<ScalarExpr> {
    let mut out = Vec::new();
    fn walk(e: &ScalarExpr, out: &mut Vec<ScalarExpr>) {
        match e {
            ScalarExpr::CallVariadic {
                func: VariadicFunc::And,
                exprs,
            } => {
                for operand in exprs {
                    walk(operand, out);
                }
            }
            e if e.is_literal_true() => {}
            other => out.push(other.clone()),
        }
    }
    walk(e, &mut out);
    out
}

/// The disjuncts of an expression: nested ORs are flattened, FALSE vanishes.
pub(crate) fn disjunctions(e: &ScalarExpr) -> Vec<ScalarExpr> {
    let mut out = Vec::new();
    fn walk(e: &ScalarExpr, out: &mut Vec<ScalarExpr>) {
        match e {
            ScalarExpr::CallVariadic {
                func: VariadicFunc::Or,
                exprs,
            } => {
                for operand in exprs {
                    walk(operand, out);
                }
            }
            e if e.is_literal_false() => {}
            other => out.push(other.clone()),
        }
    }
    walk(e, &mut out);
    out
}

/// Splits an expression into positive conjuncts and negated conjuncts,
/// flattening nested ANDs.
pub(crate) fn decompose_conjunction(
    e: &ScalarExpr,
    terms: &mut Vec<ScalarExpr>,
    not_terms: &mut Vec<ScalarExpr>,
) {
    for conjunct in conjunctions(e) {
        match conjunct {
            ScalarExpr::CallUnary {
                func: UnaryFunc::Not,
                expr,
            } => not_terms.push(*expr),
            other => terms.push(other),
        }
    }
}

/// A simple comparison: a reference-like expression against a literal. The
/// reversed form `literal <op> ref` is recognized by flipping the operator.
#[derive(Clone, Debug)]
pub(crate) struct Comparison {
    pub ref_expr: ScalarExpr,
    pub func: BinaryFunc,
    pub value: Datum,
    pub value_type: ColumnType,
}

impl Comparison {
    pub fn of(e: &ScalarExpr) -> Option<Comparison> {
        Comparison::of_with(e, |node| {
            is_ref_or_access(node, true) || node.is_deterministic()
        })
    }

    pub fn of_with(
        e: &ScalarExpr,
        node_predicate: impl Fn(&ScalarExpr) -> bool,
    ) -> Option<Comparison> {
        if let ScalarExpr::CallBinary { func, expr1, expr2 } = e {
            if !func.is_comparison() {
                return None;
            }
            if let ScalarExpr::Literal(Ok(value), value_type) = &**expr2 {
                if node_predicate(expr1) {
                    return Some(Comparison {
                        ref_expr: (**expr1).clone(),
                        func: *func,
                        value: value.clone(),
                        value_type: value_type.clone(),
                    });
                }
            }
            if let ScalarExpr::Literal(Ok(value), value_type) = &**expr1 {
                if node_predicate(expr2) {
                    return Some(Comparison {
                        ref_expr: (**expr2).clone(),
                        func: func.reverse().expect("comparisons reverse"),
                        value: value.clone(),
                        value_type: value_type.clone(),
                    });
                }
            }
        }
        None
    }

    /// Whether this comparison may be assumed not-true while simplifying
    /// other OR operands: the reference must be free of lossy casts and
    /// effectively not null.
    pub fn allowed_in_or(&self, simplifier: &Simplifier) -> bool {
        if matches!(
            self.ref_expr,
            ScalarExpr::CallUnary {
                func: UnaryFunc::Cast { .. },
                ..
            }
        ) && !simplifier.is_lossless_cast(&self.ref_expr)
        {
            return false;
        }
        !self.ref_expr.typ(simplifier.relation_type).nullable
            || simplifier
                .predicates
                .is_effectively_not_null(&self.ref_expr, simplifier.relation_type)
    }
}

/// An `IS [NOT] NULL` test of a reference-like or deterministic expression.
#[derive(Clone, Debug)]
pub(crate) struct IsPredicate {
    pub ref_expr: ScalarExpr,
    pub func: UnaryFunc,
}

impl IsPredicate {
    pub fn of(e: &ScalarExpr) -> Option<IsPredicate> {
        if let ScalarExpr::CallUnary {
            func: func @ (UnaryFunc::IsNull | UnaryFunc::IsNotNull),
            expr,
        } = e
        {
            if is_ref_or_access(expr, true) || expr.is_deterministic() {
                return Some(IsPredicate {
                    ref_expr: (**expr).clone(),
                    func: func.clone(),
                });
            }
        }
        None
    }
}

/// Intersects a term's range with the constraints the predicates imply on
/// the same reference. `residue(x < 10, [x < 5])` is everything (the
/// predicate implies the term); `residue(x < 10, [x < 20, x > 0])` is the
/// term's own range, unimproved.
pub(crate) fn residue(
    ref_expr: &ScalarExpr,
    r0: RangeSet,
    predicates: &PredicateList,
) -> RangeSet {
    let mut result = r0;
    for p in predicates.pulled_up() {
        let comparison = match Comparison::of(p) {
            Some(c) if c.ref_expr == *ref_expr && !c.value.is_null() => c,
            _ => continue,
        };
        match comparison.func {
            BinaryFunc::NotEq => {
                // Intersecting with "everything but c" is subtracting the
                // point c.
                let point = crate::sarg::Range::point(comparison.value.clone());
                let not_equals = RangeSet::single(point.clone()).complement();
                if result.encloses_all(&not_equals) {
                    result = RangeSet::all();
                    continue;
                }
                result = result.minus_range(&point);
            }
            func if func.is_comparison() => {
                let r1 = match range_for_comparison(func, &comparison.value) {
                    Some(r1) => r1,
                    None => continue,
                };
                if result.encloses(&r1) {
                    // Given these predicates, the term is always satisfied.
                    result = RangeSet::all();
                    continue;
                }
                result = result.intersect_range(&r1);
            }
            _ => {}
        }
        if result.is_empty() {
            break;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use tern_repr::adt::datetime::DateTimeUnits;
    use tern_repr::{Datum, RelationType, ScalarType};

    use super::*;
    use crate::sarg::Range;
    use crate::scalar::func::AggregateFunc;

    // Columns: #0 nullable bigint, #1 bigint, #2 nullable boolean,
    // #3 boolean, #4 nullable bigint, #5 nullable timestamp,
    // #6 nullable int, #7 nullable text.
    fn relation_type() -> RelationType {
        RelationType::new(vec![
            ScalarType::Int64.nullable(true),
            ScalarType::Int64.nullable(false),
            ScalarType::Bool.nullable(true),
            ScalarType::Bool.nullable(false),
            ScalarType::Int64.nullable(true),
            ScalarType::Timestamp.nullable(true),
            ScalarType::Int32.nullable(true),
            ScalarType::String.nullable(true),
        ])
    }

    fn x() -> ScalarExpr {
        ScalarExpr::column(0)
    }

    fn y() -> ScalarExpr {
        ScalarExpr::column(1)
    }

    fn b() -> ScalarExpr {
        ScalarExpr::column(2)
    }

    fn c() -> ScalarExpr {
        ScalarExpr::column(3)
    }

    fn z() -> ScalarExpr {
        ScalarExpr::column(4)
    }

    fn lit(i: i64) -> ScalarExpr {
        ScalarExpr::literal_ok(Datum::Int64(i), ScalarType::Int64)
    }

    fn null_bool() -> ScalarExpr {
        ScalarExpr::literal_null(ScalarType::Bool)
    }

    fn and(exprs: Vec<ScalarExpr>) -> ScalarExpr {
        ScalarExpr::CallVariadic {
            func: VariadicFunc::And,
            exprs,
        }
    }

    fn or(exprs: Vec<ScalarExpr>) -> ScalarExpr {
        ScalarExpr::CallVariadic {
            func: VariadicFunc::Or,
            exprs,
        }
    }

    fn cmp(a: ScalarExpr, f: BinaryFunc, b: ScalarExpr) -> ScalarExpr {
        a.call_binary(b, f)
    }

    fn search(e: ScalarExpr, ranges: Vec<Range>, null_as: UnknownAs) -> ScalarExpr {
        let mut range_set = RangeSet::empty();
        for range in ranges {
            range_set.add(range);
        }
        e.call_unary(UnaryFunc::Search(Box::new(Sarg::of(null_as, range_set))))
    }

    fn simplify_with(
        e: &ScalarExpr,
        unknown_as: UnknownAs,
        predicates: PredicateList,
    ) -> ScalarExpr {
        let relation_type = relation_type();
        let executor = EvalExecutor;
        Simplifier::new(&relation_type, &executor)
            .with_predicates(predicates)
            .with_paranoid(true)
            .simplify_unknown_as(e, unknown_as)
    }

    fn simplify(e: &ScalarExpr, unknown_as: UnknownAs) -> ScalarExpr {
        simplify_with(e, unknown_as, PredicateList::empty())
    }

    #[test]
    fn test_or_with_negation_and_null_test_is_true() {
        // x = 1 OR NOT (x = 1) OR x IS NULL covers every input.
        let e = or(vec![
            cmp(x(), BinaryFunc::Eq, lit(1)),
            not(cmp(x(), BinaryFunc::Eq, lit(1))),
            x().call_is_null(),
        ]);
        for unknown_as in [UnknownAs::Unknown, UnknownAs::True, UnknownAs::False] {
            assert_eq!(simplify(&e, unknown_as), ScalarExpr::literal_true());
        }
    }

    #[test]
    fn test_and_false() {
        let e = and(vec![cmp(x(), BinaryFunc::Eq, lit(1)), ScalarExpr::literal_false()]);
        for unknown_as in [UnknownAs::Unknown, UnknownAs::False] {
            assert_eq!(simplify(&e, unknown_as), ScalarExpr::literal_false());
        }
    }

    #[test]
    fn test_and_null() {
        let e = and(vec![b(), null_bool()]);
        assert_eq!(simplify(&e, UnknownAs::False), ScalarExpr::literal_false());
        // Faithfully interpreted, the conjunction must stay: it is NULL, not
        // FALSE, on rows where b is TRUE or NULL.
        assert_eq!(
            simplify(&e, UnknownAs::Unknown),
            and(vec![b(), null_bool()])
        );
    }

    #[test]
    fn test_ranges_collapse_to_search() {
        // x >= 5 AND x BETWEEN 3 AND 10 ==> SEARCH(x, [5..10])
        let e = and(vec![
            cmp(x(), BinaryFunc::Gte, lit(5)),
            ScalarExpr::CallVariadic {
                func: VariadicFunc::Between,
                exprs: vec![x(), lit(3), lit(10)],
            },
        ]);
        let expected = search(
            x(),
            vec![Range::new(
                std::ops::Bound::Included(Datum::Int64(5)),
                std::ops::Bound::Included(Datum::Int64(10)),
            )],
            UnknownAs::Unknown,
        );
        assert_eq!(simplify(&e, UnknownAs::Unknown), expected);
    }

    #[test]
    fn test_residue_under_predicates() {
        // Under "x >= 5": x < 10 cannot be improved, x < 5 is absurd.
        let ge5 = PredicateList::new(vec![cmp(x(), BinaryFunc::Gte, lit(5))]);
        let e = cmp(x(), BinaryFunc::Lt, lit(10));
        assert_eq!(simplify_with(&e, UnknownAs::Unknown, ge5.clone()), e);
        assert_eq!(
            simplify_with(&cmp(x(), BinaryFunc::Lt, lit(5)), UnknownAs::Unknown, ge5),
            ScalarExpr::literal_false()
        );
        // Under "x < 5": x < 20 is implied for every non-null x.
        let lt5 = PredicateList::new(vec![cmp(x(), BinaryFunc::Lt, lit(5))]);
        assert_eq!(
            simplify_with(&cmp(x(), BinaryFunc::Lt, lit(20)), UnknownAs::Unknown, lt5),
            x().call_unary(UnaryFunc::IsNotNull)
        );
    }

    #[test]
    fn test_case_with_false_condition_is_not_null() {
        // (CASE WHEN FALSE THEN 1 ELSE 2 END) IS NULL ==> FALSE
        let e = ScalarExpr::literal_false()
            .if_then_else(lit(1), lit(2))
            .call_is_null();
        assert_eq!(simplify(&e, UnknownAs::Unknown), ScalarExpr::literal_false());
    }

    #[test]
    fn test_not_equals_on_distinct_constants() {
        // x <> 1 OR x <> 2 ==> x IS NOT NULL OR NULL
        let e = or(vec![
            cmp(x(), BinaryFunc::NotEq, lit(1)),
            cmp(x(), BinaryFunc::NotEq, lit(2)),
        ]);
        assert_eq!(
            simplify(&e, UnknownAs::Unknown),
            or(vec![x().call_unary(UnaryFunc::IsNotNull), null_bool()])
        );
        assert_eq!(
            simplify(&e, UnknownAs::False),
            x().call_unary(UnaryFunc::IsNotNull)
        );
    }

    #[test]
    fn test_ceil_floor_roll_up() {
        let t = ScalarExpr::column(5);
        let floor = |e: ScalarExpr, unit| e.call_unary(UnaryFunc::FloorTo(unit));
        let ceil = |e: ScalarExpr, unit| e.call_unary(UnaryFunc::CeilTo(unit));

        let e = floor(floor(t.clone(), DateTimeUnits::Hour), DateTimeUnits::Day);
        assert_eq!(
            simplify(&e, UnknownAs::Unknown),
            floor(t.clone(), DateTimeUnits::Day)
        );

        // Day does not roll up to second.
        let e = floor(floor(t.clone(), DateTimeUnits::Day), DateTimeUnits::Second);
        assert_eq!(simplify(&e, UnknownAs::Unknown), e);

        let e = ceil(ceil(t.clone(), DateTimeUnits::Second), DateTimeUnits::Minute);
        assert_eq!(
            simplify(&e, UnknownAs::Unknown),
            ceil(t.clone(), DateTimeUnits::Minute)
        );

        // Quarters only roll up to years.
        let e = floor(floor(t.clone(), DateTimeUnits::Quarter), DateTimeUnits::Year);
        assert_eq!(
            simplify(&e, UnknownAs::Unknown),
            floor(t.clone(), DateTimeUnits::Year)
        );
        let e = floor(floor(t.clone(), DateTimeUnits::Quarter), DateTimeUnits::Month);
        assert_eq!(simplify(&e, UnknownAs::Unknown), e);

        // Mixing ceil and floor never rolls up.
        let e = ceil(floor(t, DateTimeUnits::Hour), DateTimeUnits::Day);
        assert_eq!(simplify(&e, UnknownAs::Unknown), e);
    }

    #[test]
    fn test_comparison_of_operand_with_itself() {
        let e = cmp(x(), BinaryFunc::Eq, x());
        assert_eq!(
            simplify(&e, UnknownAs::Unknown),
            or(vec![null_bool(), x().call_unary(UnaryFunc::IsNotNull)])
        );
        assert_eq!(
            simplify(&e, UnknownAs::False),
            x().call_unary(UnaryFunc::IsNotNull)
        );
        // On a non-nullable column the tautology is plain TRUE.
        assert_eq!(
            simplify(&cmp(y(), BinaryFunc::Eq, y()), UnknownAs::Unknown),
            ScalarExpr::literal_true()
        );
        assert_eq!(
            simplify(&cmp(x(), BinaryFunc::NotEq, x()), UnknownAs::Unknown),
            and(vec![null_bool(), x().call_is_null()])
        );
        assert_eq!(
            simplify(&cmp(x(), BinaryFunc::Lt, x()), UnknownAs::False),
            ScalarExpr::literal_false()
        );
    }

    #[test]
    fn test_boolean_constant_comparisons() {
        let t = ScalarExpr::literal_true();
        let f = ScalarExpr::literal_false();
        assert_eq!(simplify(&cmp(b(), BinaryFunc::Eq, t.clone()), UnknownAs::Unknown), b());
        assert_eq!(
            simplify(&cmp(b(), BinaryFunc::NotEq, t.clone()), UnknownAs::Unknown),
            not(b())
        );
        assert_eq!(
            simplify(&cmp(b(), BinaryFunc::Eq, f.clone()), UnknownAs::Unknown),
            not(b())
        );
        assert_eq!(
            simplify(&cmp(b(), BinaryFunc::NotEq, f.clone()), UnknownAs::Unknown),
            b()
        );
        // Reversed operands flip the comparison.
        assert_eq!(simplify(&cmp(t.clone(), BinaryFunc::Eq, b()), UnknownAs::Unknown), b());
        // Forms that are constant only over non-nullable operands.
        assert_eq!(
            simplify(&cmp(c(), BinaryFunc::Gt, t.clone()), UnknownAs::Unknown),
            ScalarExpr::literal_false()
        );
        assert_eq!(
            simplify(&cmp(c(), BinaryFunc::Lte, t.clone()), UnknownAs::Unknown),
            ScalarExpr::literal_true()
        );
        assert_eq!(
            simplify(&cmp(c(), BinaryFunc::Lt, f.clone()), UnknownAs::Unknown),
            ScalarExpr::literal_false()
        );
        // With a nullable operand they must survive.
        let e = cmp(b(), BinaryFunc::Gt, t);
        assert_eq!(simplify(&e, UnknownAs::Unknown), e);
    }

    #[test]
    fn test_literal_comparisons() {
        assert_eq!(
            simplify(&cmp(lit(1), BinaryFunc::Lt, lit(2)), UnknownAs::Unknown),
            ScalarExpr::literal_true()
        );
        assert_eq!(
            simplify(&cmp(lit(2), BinaryFunc::Eq, lit(1)), UnknownAs::Unknown),
            ScalarExpr::literal_false()
        );
        let vs_null = cmp(lit(1), BinaryFunc::NotEq, ScalarExpr::literal_null(ScalarType::Int64));
        assert_eq!(simplify(&vs_null, UnknownAs::False), ScalarExpr::literal_false());
        assert_eq!(simplify(&vs_null, UnknownAs::Unknown), null_bool());
    }

    #[test]
    fn test_arithmetic_identities() {
        let zero = lit(0);
        let one = lit(1);
        for func in [BinaryFunc::Add, BinaryFunc::CheckedAdd] {
            assert_eq!(simplify(&cmp(x(), func, zero.clone()), UnknownAs::Unknown), x());
            assert_eq!(simplify(&cmp(zero.clone(), func, x()), UnknownAs::Unknown), x());
        }
        assert_eq!(
            simplify(&cmp(x(), BinaryFunc::Sub, zero.clone()), UnknownAs::Unknown),
            x()
        );
        // 0 - x is not an identity.
        let e = cmp(zero.clone(), BinaryFunc::Sub, x());
        assert_eq!(simplify(&e, UnknownAs::Unknown), e);
        assert_eq!(simplify(&cmp(x(), BinaryFunc::Mul, one.clone()), UnknownAs::Unknown), x());
        assert_eq!(simplify(&cmp(one.clone(), BinaryFunc::Mul, x()), UnknownAs::Unknown), x());
        assert_eq!(simplify(&cmp(x(), BinaryFunc::Div, one.clone()), UnknownAs::Unknown), x());
        let e = cmp(one, BinaryFunc::Div, x());
        assert_eq!(simplify(&e, UnknownAs::Unknown), e);

        // The identity inserts a cast when it would change the result type.
        let w = ScalarExpr::column(6);
        assert_eq!(
            simplify(&cmp(w.clone(), BinaryFunc::Add, zero), UnknownAs::Unknown),
            w.call_unary(UnaryFunc::Cast {
                to: ScalarType::Int64.nullable(true),
                safe: false,
            })
        );
    }

    #[test]
    fn test_unary_minus() {
        let neg = |e: ScalarExpr| e.call_unary(UnaryFunc::Neg);
        assert_eq!(simplify(&neg(neg(x())), UnknownAs::Unknown), x());
        assert_eq!(simplify(&x().call_unary(UnaryFunc::Pos), UnknownAs::Unknown), x());
        let e = neg(x());
        assert_eq!(simplify(&e, UnknownAs::Unknown), e);
    }

    #[test]
    fn test_like_percent() {
        let s = ScalarExpr::column(7);
        let percent = ScalarExpr::literal_ok(Datum::from("%"), ScalarType::String);
        let e = cmp(s.clone(), BinaryFunc::Like, percent);
        assert_eq!(
            simplify(&e, UnknownAs::Unknown),
            or(vec![null_bool(), s.clone().call_unary(UnaryFunc::IsNotNull)])
        );
        assert_eq!(
            simplify(&e, UnknownAs::False),
            s.clone().call_unary(UnaryFunc::IsNotNull)
        );
        let prefix = ScalarExpr::literal_ok(Datum::from("a%"), ScalarType::String);
        let e = cmp(s, BinaryFunc::Like, prefix);
        assert_eq!(simplify(&e, UnknownAs::Unknown), e);
    }

    #[test]
    fn test_trim_of_identical_trim() {
        let s = ScalarExpr::column(7);
        let space = || ScalarExpr::literal_ok(Datum::from(" "), ScalarType::String);
        let btrim = |e: ScalarExpr| cmp(e, BinaryFunc::Trim, space());
        let ltrim = |e: ScalarExpr| cmp(e, BinaryFunc::TrimLeading, space());
        assert_eq!(simplify(&btrim(btrim(s.clone())), UnknownAs::Unknown), btrim(s.clone()));
        // A different trim kind, or different characters, must not collapse.
        let e = ltrim(btrim(s.clone()));
        assert_eq!(simplify(&e, UnknownAs::Unknown), e);
        let dot = ScalarExpr::literal_ok(Datum::from("."), ScalarType::String);
        let e = cmp(btrim(s), BinaryFunc::Trim, dot);
        assert_eq!(simplify(&e, UnknownAs::Unknown), e);
    }

    #[test]
    fn test_coalesce() {
        let coalesce = |exprs| ScalarExpr::CallVariadic {
            func: VariadicFunc::Coalesce,
            exprs,
        };
        let null = || ScalarExpr::literal_null(ScalarType::Int64);
        assert_eq!(simplify(&coalesce(vec![x()]), UnknownAs::Unknown), x());
        assert_eq!(
            simplify(&coalesce(vec![null(), x(), null(), lit(2), lit(3)]), UnknownAs::Unknown),
            coalesce(vec![x(), lit(2)])
        );
        assert_eq!(simplify(&coalesce(vec![x(), x()]), UnknownAs::Unknown), x());
        assert_eq!(
            simplify(&coalesce(vec![x(), y(), z()]), UnknownAs::Unknown),
            coalesce(vec![x(), y()])
        );
        assert_eq!(simplify(&coalesce(vec![null(), null()]), UnknownAs::Unknown), null());
    }

    #[test]
    fn test_cast() {
        let cast = |e: ScalarExpr, to: ColumnType| {
            e.call_unary(UnaryFunc::Cast { to, safe: false })
        };
        // A cast to the operand's own type disappears.
        assert_eq!(
            simplify(&cast(x(), ScalarType::Int64.nullable(true)), UnknownAs::Unknown),
            x()
        );
        // Nested lossless casts that return to the original type vanish.
        let w = ScalarExpr::column(6);
        let e = cast(
            cast(w.clone(), ScalarType::Int64.nullable(true)),
            ScalarType::Int32.nullable(true),
        );
        assert_eq!(simplify(&e, UnknownAs::Unknown), w);
        // Literal casts fold through the executor.
        let e = cast(
            ScalarExpr::literal_ok(Datum::from("12"), ScalarType::String),
            ScalarType::Int64.nullable(false),
        );
        assert_eq!(
            simplify(&e, UnknownAs::Unknown),
            ScalarExpr::literal_ok(Datum::Int64(12), ScalarType::Int64)
        );
        // A failed safe cast folds to a typed NULL.
        let e = ScalarExpr::literal_ok(Datum::from("abc"), ScalarType::String).call_unary(
            UnaryFunc::Cast {
                to: ScalarType::Int64.nullable(true),
                safe: true,
            },
        );
        assert_eq!(
            simplify(&e, UnknownAs::Unknown),
            ScalarExpr::literal_null(ScalarType::Int64)
        );
        // Casts to NUMERIC perform scale checking and never disappear.
        let e = cast(x(), ScalarType::Numeric { max_scale: None }.nullable(true));
        assert_eq!(simplify(&e, UnknownAs::Unknown), e);
    }

    #[test]
    fn test_is_predicates() {
        assert_eq!(simplify(&y().call_is_null(), UnknownAs::Unknown), ScalarExpr::literal_false());
        assert_eq!(
            simplify(&y().call_unary(UnaryFunc::IsNotNull), UnknownAs::Unknown),
            ScalarExpr::literal_true()
        );
        let e = x().call_is_null();
        assert_eq!(simplify(&e, UnknownAs::Unknown), e);

        // IS NULL distributes over strict operators.
        let sum = cmp(x(), BinaryFunc::Add, z());
        assert_eq!(
            simplify(&sum.clone().call_is_null(), UnknownAs::Unknown),
            or(vec![x().call_is_null(), z().call_is_null()])
        );
        assert_eq!(
            simplify(&sum.call_unary(UnaryFunc::IsNotNull), UnknownAs::Unknown),
            and(vec![
                x().call_unary(UnaryFunc::IsNotNull),
                z().call_unary(UnaryFunc::IsNotNull),
            ])
        );

        // IS TRUE and friends over a non-nullable operand.
        assert_eq!(simplify(&c().call_unary(UnaryFunc::IsTrue), UnknownAs::Unknown), c());
        assert_eq!(
            simplify(&c().call_unary(UnaryFunc::IsNotFalse), UnknownAs::Unknown),
            c()
        );
        assert_eq!(
            simplify(&c().call_unary(UnaryFunc::IsFalse), UnknownAs::Unknown),
            not(c())
        );
        assert_eq!(
            simplify(&c().call_unary(UnaryFunc::IsNotTrue), UnknownAs::Unknown),
            not(c())
        );

        // (NOT x) IS kind negates null-safely.
        assert_eq!(
            simplify(&not(b()).call_unary(UnaryFunc::IsNotTrue), UnknownAs::Unknown),
            b().call_unary(UnaryFunc::IsTrue)
        );
        assert_eq!(
            simplify(&not(b()).call_is_null(), UnknownAs::Unknown),
            b().call_is_null()
        );

        // In UnknownAs::False mode, IS TRUE is a no-op wrapper.
        assert_eq!(simplify(&b().call_unary(UnaryFunc::IsTrue), UnknownAs::False), b());
    }

    #[test]
    fn test_is_predicate_from_predicate_list() {
        let predicates = PredicateList::new(vec![x().call_unary(UnaryFunc::IsNotNull)]);
        assert_eq!(
            simplify_with(
                &x().call_unary(UnaryFunc::IsNotNull),
                UnknownAs::Unknown,
                predicates.clone()
            ),
            ScalarExpr::literal_true()
        );
        // The opposite test is not refuted by the predicate machinery here.
        let e = x().call_is_null();
        assert_eq!(simplify_with(&e, UnknownAs::Unknown, predicates), e);
    }

    #[test]
    fn test_strict_operand_contradiction() {
        // IS NULL(x) AND x + z < 5 can never be TRUE.
        let e = and(vec![
            x().call_is_null(),
            cmp(cmp(x(), BinaryFunc::Add, z()), BinaryFunc::Lt, lit(5)),
        ]);
        assert_eq!(simplify(&e, UnknownAs::False), ScalarExpr::literal_false());
    }

    #[test]
    fn test_redundant_is_not_null_dropped() {
        let e = and(vec![
            x().call_unary(UnaryFunc::IsNotNull),
            cmp(x(), BinaryFunc::Lt, lit(5)),
        ]);
        assert_eq!(
            simplify(&e, UnknownAs::False),
            cmp(x(), BinaryFunc::Lt, lit(5))
        );
    }

    #[test]
    fn test_equality_propagation() {
        let e = and(vec![
            cmp(x(), BinaryFunc::Eq, lit(5)),
            cmp(x(), BinaryFunc::Eq, lit(6)),
        ]);
        assert_eq!(simplify(&e, UnknownAs::False), ScalarExpr::literal_false());

        let e = and(vec![
            cmp(x(), BinaryFunc::Eq, lit(5)),
            cmp(z(), BinaryFunc::Eq, lit(6)),
            cmp(x(), BinaryFunc::Eq, z()),
        ]);
        assert_eq!(simplify(&e, UnknownAs::False), ScalarExpr::literal_false());

        // With agreeing constants the reference equality is redundant.
        let e = and(vec![
            cmp(x(), BinaryFunc::Eq, lit(5)),
            cmp(z(), BinaryFunc::Eq, lit(5)),
            cmp(x(), BinaryFunc::Eq, z()),
        ]);
        assert_eq!(
            simplify(&e, UnknownAs::False),
            and(vec![
                cmp(x(), BinaryFunc::Eq, lit(5)),
                cmp(z(), BinaryFunc::Eq, lit(5)),
            ])
        );
    }

    #[test]
    fn test_contradictory_ranges() {
        let e = and(vec![
            cmp(x(), BinaryFunc::Lt, lit(5)),
            cmp(x(), BinaryFunc::Gte, lit(5)),
        ]);
        assert_eq!(simplify(&e, UnknownAs::False), ScalarExpr::literal_false());

        // The same contradiction between non-literal comparisons is caught
        // by negated-term detection.
        let e = and(vec![
            cmp(x(), BinaryFunc::Lt, z()),
            cmp(x(), BinaryFunc::Gte, z()),
        ]);
        assert_eq!(simplify(&e, UnknownAs::False), ScalarExpr::literal_false());
    }

    #[test]
    fn test_or_of_value_and_negation() {
        // x OR NOT x over a nullable operand keeps a NULL witness.
        let e = or(vec![b(), not(b())]);
        assert_eq!(
            simplify(&e, UnknownAs::Unknown),
            or(vec![b().call_unary(UnaryFunc::IsNotNull), null_bool()])
        );
        assert_eq!(
            simplify(&or(vec![c(), not(c())]), UnknownAs::Unknown),
            ScalarExpr::literal_true()
        );
        // x IS NOT TRUE OR x is TRUE for safe x.
        let e = or(vec![b().call_unary(UnaryFunc::IsNotTrue), b()]);
        assert_eq!(simplify(&e, UnknownAs::Unknown), ScalarExpr::literal_true());
    }

    #[test]
    fn test_case_branches_with_equal_values_merge() {
        let e = b()
            .if_then_else(lit(1), c().if_then_else(lit(1), lit(1)));
        assert_eq!(simplify(&e, UnknownAs::Unknown), lit(1));
    }

    #[test]
    fn test_boolean_case_flattens() {
        let e = c().if_then_else(ScalarExpr::literal_true(), ScalarExpr::literal_false());
        assert_eq!(simplify(&e, UnknownAs::Unknown), c());

        // A non-boolean CASE with distinct values stays put.
        let e = c().if_then_else(lit(1), lit(2));
        assert_eq!(simplify(&e, UnknownAs::Unknown), e);
    }

    #[test]
    fn test_in_list() {
        let in_list = |exprs| ScalarExpr::CallVariadic {
            func: VariadicFunc::In,
            exprs,
        };
        assert_eq!(
            simplify(&in_list(vec![x(), lit(1)]), UnknownAs::Unknown),
            cmp(x(), BinaryFunc::Eq, lit(1))
        );
        assert_eq!(
            simplify(&in_list(vec![x(), lit(1), lit(2), lit(3)]), UnknownAs::Unknown),
            search(
                x(),
                vec![
                    Range::point(Datum::Int64(1)),
                    Range::point(Datum::Int64(2)),
                    Range::point(Datum::Int64(3)),
                ],
                UnknownAs::Unknown,
            )
        );
        let not_in = ScalarExpr::CallVariadic {
            func: VariadicFunc::NotIn,
            exprs: vec![x(), lit(1), lit(2)],
        };
        assert_eq!(
            simplify(&not_in, UnknownAs::Unknown),
            search(
                x(),
                vec![
                    Range::less_than(Datum::Int64(1)),
                    Range::new(
                        std::ops::Bound::Excluded(Datum::Int64(1)),
                        std::ops::Bound::Excluded(Datum::Int64(2)),
                    ),
                    Range::greater_than(Datum::Int64(2)),
                ],
                UnknownAs::Unknown,
            )
        );
    }

    #[test]
    fn test_not_search_negates_sarg() {
        let e = not(search(
            x(),
            vec![Range::new(
                std::ops::Bound::Included(Datum::Int64(5)),
                std::ops::Bound::Included(Datum::Int64(10)),
            )],
            UnknownAs::Unknown,
        ));
        assert_eq!(
            simplify(&e, UnknownAs::Unknown),
            search(
                x(),
                vec![
                    Range::less_than(Datum::Int64(5)),
                    Range::greater_than(Datum::Int64(10)),
                ],
                UnknownAs::Unknown,
            )
        );
    }

    #[test]
    fn test_search_on_non_null_operand_drops_null_branch() {
        // SEARCH(y, Sarg[[5..5]; NULL AS TRUE]) over non-nullable y loses
        // its null branch and expands to the point comparison.
        let e = search(y(), vec![Range::point(Datum::Int64(5))], UnknownAs::True);
        assert_eq!(
            simplify(&e, UnknownAs::Unknown),
            cmp(y(), BinaryFunc::Eq, lit(5))
        );
    }

    #[test]
    fn test_measure_round_trip_windows_aggregates() {
        let agg = ScalarExpr::Aggregate {
            func: AggregateFunc::Sum,
            expr: Box::new(x()),
            window: None,
        };
        let e = agg
            .clone()
            .call_unary(UnaryFunc::ValueToMeasure)
            .call_unary(UnaryFunc::MeasureToValue);
        assert_eq!(
            simplify(&e, UnknownAs::Unknown),
            ScalarExpr::Aggregate {
                func: AggregateFunc::Sum,
                expr: Box::new(x()),
                window: Some(WindowFrame::current_row()),
            }
        );
        // Without the inner lifting there is nothing to do.
        let e = agg.call_unary(UnaryFunc::MeasureToValue);
        assert_eq!(simplify(&e, UnknownAs::Unknown), e);
    }

    #[test]
    fn test_simplify_filter_predicates() {
        let relation_type = relation_type();
        let executor = EvalExecutor;
        let simplifier = Simplifier::new(&relation_type, &executor);
        assert_eq!(
            simplifier.simplify_filter_predicates(&[
                cmp(x(), BinaryFunc::Lt, lit(5)),
                cmp(x(), BinaryFunc::Gte, lit(5)),
            ]),
            None
        );
        assert_eq!(
            simplifier.simplify_filter_predicates(&[cmp(x(), BinaryFunc::Lt, lit(10))]),
            Some(cmp(x(), BinaryFunc::Lt, lit(10)))
        );
        assert_eq!(
            simplifier.simplify_filter_predicates(&[and(vec![
                cmp(x(), BinaryFunc::Eq, lit(1)),
                ScalarExpr::literal_false(),
            ])]),
            None
        );
    }

    #[test]
    fn test_simplify_preserving_type() {
        let relation_type = relation_type();
        let executor = EvalExecutor;
        let simplifier = Simplifier::new(&relation_type, &executor);
        // OR(b, TRUE) is TRUE, but that narrows nullability; the type is
        // preserved with a cast.
        let e = or(vec![b(), ScalarExpr::literal_true()]);
        assert_eq!(
            simplifier.simplify_preserving_type(&e),
            ScalarExpr::literal_true().call_unary(UnaryFunc::Cast {
                to: ScalarType::Bool.nullable(true),
                safe: false,
            })
        );
        assert_eq!(
            simplifier.simplify_preserving_type_as(&e, UnknownAs::Unknown, false),
            ScalarExpr::literal_true()
        );
    }

    #[test]
    fn test_remove_nullability_cast() {
        let relation_type = relation_type();
        let executor = EvalExecutor;
        let simplifier = Simplifier::new(&relation_type, &executor);
        let e = cmp(y(), BinaryFunc::Eq, lit(5)).call_unary(UnaryFunc::Cast {
            to: ScalarType::Bool.nullable(true),
            safe: false,
        });
        assert_eq!(
            simplifier.remove_nullability_cast(&e),
            cmp(y(), BinaryFunc::Eq, lit(5))
        );
        // A cast that changes the type stays.
        let e = ScalarExpr::column(6).call_unary(UnaryFunc::Cast {
            to: ScalarType::Int64.nullable(true),
            safe: false,
        });
        assert_eq!(simplifier.remove_nullability_cast(&e), e);
    }

    #[test]
    #[should_panic(expected = "paranoid mode is not supported here")]
    fn test_list_entry_points_reject_paranoid() {
        let relation_type = relation_type();
        let executor = EvalExecutor;
        let simplifier = Simplifier::new(&relation_type, &executor).with_paranoid(true);
        simplifier.simplify_ands(&[b()]);
    }

    #[test]
    fn test_simplify_ands_ors_lists() {
        let relation_type = relation_type();
        let executor = EvalExecutor;
        let simplifier = Simplifier::new(&relation_type, &executor);
        assert_eq!(
            simplifier.simplify_ands(&[b(), ScalarExpr::literal_true()]),
            b()
        );
        assert_eq!(
            simplifier.simplify_ors(&[ScalarExpr::literal_false(), b()]),
            b()
        );
    }
}
