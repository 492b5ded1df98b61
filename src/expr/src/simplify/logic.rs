// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The boolean engine: conjunction and disjunction normalization,
//! contradiction detection, and CASE simplification.

use std::collections::{BTreeMap, BTreeSet};

use tern_repr::{ColumnType, Datum, ScalarType};

use crate::sarg::{range_for_comparison, Range, SargCollector, UnknownAs};
use crate::scalar::func::{BinaryFunc, UnaryFunc, VariadicFunc};
use crate::scalar::ScalarExpr;
use crate::strong::Strong;

use super::{
    compose_conjunction, compose_disjunction, conjunctions, decompose_conjunction, disjunctions,
    is_ref_or_access, is_safe_expression, not, same_type_or_narrows_nullability, Comparison,
    IsPredicate, Simplifier,
};

impl<'a> Simplifier<'a> {
    pub(crate) fn simplify_and(&self, e: &ScalarExpr, unknown_as: UnknownAs) -> ScalarExpr {
        let mut operands = conjunctions(e);
        if unknown_as == UnknownAs::False && self.predicate_elimination {
            self.simplify_and_terms(&mut operands, UnknownAs::False);
        } else {
            self.simplify_list(&mut operands, unknown_as);
        }

        let mut collector = SargCollector::new(true);
        let mut sarg_terms = Vec::new();
        for term in &operands {
            collector.accept(term.clone(), &mut sarg_terms);
        }
        if collector.need_to_fix() {
            operands = sarg_terms
                .into_iter()
                .map(|term| collector.fix(term, unknown_as))
                .collect();
        }

        let mut terms = Vec::new();
        let mut not_terms = Vec::new();
        for operand in &operands {
            decompose_conjunction(operand, &mut terms, &mut not_terms);
        }

        match unknown_as {
            UnknownAs::False => self.simplify_and2_unknown_as_false(terms, not_terms),
            _ => self.simplify_and2(terms, not_terms, unknown_as),
        }
    }

    /// Simplifies conjuncts left to right, letting each recognized conjunct
    /// serve as a known predicate while simplifying the ones after it.
    fn simplify_and_terms(&self, terms: &mut Vec<ScalarExpr>, unknown_as: UnknownAs) {
        let mut simplify = self.clone();
        for i in 0..terms.len() {
            let t = terms[i].clone();
            if Comparison::of(&t).is_none() && IsPredicate::of(&t).is_none() {
                continue;
            }
            let t2 = simplify.simplify_under(&t, unknown_as);
            terms[i] = t2.clone();
            simplify = simplify.with_predicates(simplify.predicates().with(t2));
        }
        for i in 0..terms.len() {
            let t = terms[i].clone();
            if Comparison::of(&t).is_some() || IsPredicate::of(&t).is_some() {
                continue;
            }
            terms[i] = simplify.simplify_under(&t, unknown_as);
        }
    }

    pub(crate) fn simplify_and2(
        &self,
        mut terms: Vec<ScalarExpr>,
        mut not_terms: Vec<ScalarExpr>,
        unknown_as: UnknownAs,
    ) -> ScalarExpr {
        for term in &terms {
            if term.is_literal_false() {
                return ScalarExpr::literal_false();
            }
        }
        if terms.is_empty() && not_terms.is_empty() {
            return ScalarExpr::literal_true();
        }
        // If one of the negated conjunctions is wholly contained in the
        // terms, the expression cannot be TRUE:
        //   x AND y AND NOT (x AND y)        - not satisfiable
        //   x AND y AND NOT (x AND y AND z)  - may be satisfiable
        // With a non-nullable conjunction that means FALSE outright; with a
        // nullable one, NULL inputs can still yield UNKNOWN, so the
        // intersection becomes "NULL AND d IS NULL".
        let mut not_satisfiable_nullables: Vec<ScalarExpr> = Vec::new();
        for not_disjunction in &not_terms {
            let terms2 = conjunctions(not_disjunction);
            if !terms2.iter().all(|t| terms.contains(t)) {
                continue;
            }
            if !not_disjunction.typ(self.relation_type()).nullable {
                return ScalarExpr::literal_false();
            }
            not_satisfiable_nullables.push(not_disjunction.clone());
        }
        if !not_satisfiable_nullables.is_empty() {
            terms.retain(|t| !not_satisfiable_nullables.contains(t));
            not_terms.retain(|t| !not_satisfiable_nullables.contains(t));
            let null_witness = ScalarExpr::literal_null(
                not_satisfiable_nullables[0]
                    .typ(self.relation_type())
                    .scalar_type,
            );
            terms.push(self.simplify_under(&null_witness, unknown_as));
            for x in &not_satisfiable_nullables {
                terms.push(self.simplify_under(&x.clone().call_is_null(), UnknownAs::Unknown));
            }
        }
        // Add the NOT disjunctions back in.
        for not_disjunction in &not_terms {
            terms.push(self.simplify_under(&not(not_disjunction.clone()), UnknownAs::Unknown));
        }
        compose_conjunction(terms)
    }

    /// As [`Simplifier::simplify_and2`], but assuming an UNKNOWN result will
    /// be interpreted as FALSE, which admits much stronger rewrites.
    pub(crate) fn simplify_and2_unknown_as_false(
        &self,
        mut terms: Vec<ScalarExpr>,
        not_terms: Vec<ScalarExpr>,
    ) -> ScalarExpr {
        for term in &terms {
            if term.is_literal_false() || term.is_literal_null() {
                return ScalarExpr::literal_false();
            }
        }
        if terms.is_empty() && not_terms.is_empty() {
            return ScalarExpr::literal_true();
        }
        if terms.len() == 1 && not_terms.is_empty() {
            // Make sure "x OR y OR x" (a single-term conjunction) gets
            // simplified.
            return self.simplify_under(&terms[0], UnknownAs::False);
        }

        let mut equality_terms: BTreeMap<ScalarExpr, Vec<(ScalarExpr, ScalarExpr)>> =
            BTreeMap::new();
        let mut range_terms: BTreeMap<ScalarExpr, (Range, Vec<ScalarExpr>)> = BTreeMap::new();
        let mut equality_constant_terms: BTreeMap<ScalarExpr, (Datum, ColumnType)> =
            BTreeMap::new();
        let mut negated_terms: BTreeSet<ScalarExpr> = BTreeSet::new();
        let mut null_operands: BTreeSet<ScalarExpr> = BTreeSet::new();
        let mut not_null_operands: Vec<ScalarExpr> = Vec::new();

        // Seed the range map with the predicates known on the input.
        for predicate in self.predicates().pulled_up().to_vec() {
            let comparison = match Comparison::of(&predicate) {
                // != is not supported by the range map.
                Some(c) if c.func != BinaryFunc::NotEq && !c.value.is_null() => c,
                _ => continue,
            };
            if let Some(result) = process_range(
                &mut terms,
                &mut range_terms,
                &predicate,
                &comparison.ref_expr,
                &comparison.value,
                comparison.func,
            ) {
                return result;
            }
        }

        let mut i = 0;
        while i < terms.len() {
            let mut term = terms[i].clone();
            if !term.is_deterministic() {
                i += 1;
                continue;
            }
            // Unwrap "TRUE = t" where possible.
            loop {
                if let ScalarExpr::CallBinary {
                    func: BinaryFunc::Eq,
                    expr1,
                    expr2,
                } = &term
                {
                    if expr1.is_literal_true() {
                        term = (**expr2).clone();
                        terms[i] = term.clone();
                        continue;
                    }
                    if expr2.is_literal_true() {
                        term = (**expr1).clone();
                        terms[i] = term.clone();
                        continue;
                    }
                }
                break;
            }
            match &term {
                ScalarExpr::CallBinary { func, expr1, expr2 } if func.is_comparison() => {
                    let comparison = Comparison::of(&term);
                    // Comparison against a NULL literal can never be TRUE.
                    if let Some(c) = &comparison {
                        if c.value.is_null() {
                            return ScalarExpr::literal_false();
                        }
                    }
                    if *func == BinaryFunc::Eq {
                        if let Some(c) = &comparison {
                            // The same reference equated to two different
                            // constants cannot be satisfied.
                            if let Some((prev_value, prev_type)) = equality_constant_terms
                                .insert(c.ref_expr.clone(), (c.value.clone(), c.value_type.clone()))
                            {
                                if prev_type == c.value_type && prev_value != c.value {
                                    return ScalarExpr::literal_false();
                                }
                            }
                        } else if is_ref_or_access(expr1, true) && is_ref_or_access(expr2, true) {
                            equality_terms
                                .entry((**expr1).clone())
                                .or_default()
                                .push(((**expr2).clone(), term.clone()));
                        }
                    }
                    // From "a > 5" derive the negated term "a <= 5", and its
                    // operand-swapped form "5 >= a", to catch textual
                    // contradictions among the terms.
                    if let Some(negated) = negate_comparison(&term) {
                        if let Some(inverted) = invert_comparison(&negated) {
                            negated_terms.insert(inverted);
                        }
                        negated_terms.insert(negated);
                    }
                    // Remove or weaken terms implied by the input predicates:
                    // given "x >= 5", the term "x between 3 and 10" weakens
                    // to "x between 5 and 10".
                    let term2 = self.simplify_using_predicates(&term);
                    if term2 != term {
                        terms[i] = term2.clone();
                        term = term2;
                    }
                    if let Some(c) = Comparison::of(&term) {
                        if c.func != BinaryFunc::NotEq && !c.value.is_null() {
                            if let Some(result) = process_range(
                                &mut terms,
                                &mut range_terms,
                                &term,
                                &c.ref_expr,
                                &c.value,
                                c.func,
                            ) {
                                return result;
                            }
                        }
                    }
                }
                ScalarExpr::CallUnary {
                    func: UnaryFunc::IsNotNull,
                    expr,
                } => {
                    let operand = (**expr).clone();
                    if !not_null_operands.contains(&operand) {
                        not_null_operands.push(operand);
                    }
                    terms.remove(i);
                    continue;
                }
                ScalarExpr::CallUnary {
                    func: UnaryFunc::IsNull,
                    expr,
                } => {
                    null_operands.insert((**expr).clone());
                }
                _ => {}
            }
            i += 1;
        }

        // Equality between two references, with both pinned to constants:
        //   x = 5 AND y = 5 AND x = y   - the equality is redundant
        //   x = 5 AND y = 6 AND x = y   - not satisfiable
        for (ref1, pairs) in &equality_terms {
            let (value1, type1) = match equality_constant_terms.get(ref1) {
                Some(entry) => entry,
                None => continue,
            };
            for (ref2, term) in pairs {
                let (value2, type2) = match equality_constant_terms.get(ref2) {
                    Some(entry) => entry,
                    None => continue,
                };
                if type1 == type2 && value1 != value2 {
                    return ScalarExpr::literal_false();
                }
                if let Some(index) = terms.iter().position(|t| t == term) {
                    terms.remove(index);
                }
            }
        }
        // A negated conjunction wholly contained in the terms is not
        // satisfiable; see simplify_and2.
        for not_disjunction in &not_terms {
            if !not_disjunction.is_deterministic() {
                continue;
            }
            let terms2 = conjunctions(not_disjunction);
            if terms2.iter().all(|t| terms.contains(t)) {
                return ScalarExpr::literal_false();
            }
        }
        // Only deterministic expressions contribute negated terms.
        for negated in &negated_terms {
            if terms.contains(negated) {
                return ScalarExpr::literal_false();
            }
        }
        // Add the NOT disjunctions back in.
        for not_disjunction in not_terms {
            terms.push(not(not_disjunction));
        }
        // Find the operands that force a term to be non-TRUE when set to
        // NULL.
        let mut strong_operands: BTreeSet<ScalarExpr> = BTreeSet::new();
        for term in &terms {
            if !term.is_deterministic() {
                continue;
            }
            for column in term.support() {
                let operand = ScalarExpr::Column(column);
                let mask: BTreeSet<ScalarExpr> = std::iter::once(operand.clone()).collect();
                if Strong::of(&mask).is_not_true(term) {
                    strong_operands.insert(operand);
                }
            }
            let mut accesses = Vec::new();
            term.visit(&mut |e| {
                if matches!(
                    e,
                    ScalarExpr::CallUnary {
                        func: UnaryFunc::RecordGet(_),
                        ..
                    }
                ) {
                    accesses.push(e.clone());
                }
            });
            for access in accesses {
                let mask: BTreeSet<ScalarExpr> = std::iter::once(access.clone()).collect();
                if Strong::of(&mask).is_not_true(term) {
                    strong_operands.insert(access);
                }
            }
        }
        // An operand that must be NULL inside a strict term is not
        // satisfiable: IS NULL(x) AND x < 5.
        if null_operands.iter().any(|op| strong_operands.contains(op)) {
            return ScalarExpr::literal_false();
        }
        // Re-add the IS NOT NULL terms that no strict term already implies:
        // IS NOT NULL(x) AND x < 5 keeps only x < 5.
        for operand in not_null_operands {
            if !strong_operands.contains(&operand) {
                terms.push(operand.call_unary(UnaryFunc::IsNotNull));
            }
        }
        compose_conjunction(terms)
    }

    pub(crate) fn simplify_or(&self, e: &ScalarExpr, unknown_as: UnknownAs) -> ScalarExpr {
        let mut terms = disjunctions(e);
        if self.predicate_elimination {
            // IS NULL terms go first; they may refute the terms after them.
            let (null_tests, rest): (Vec<_>, Vec<_>) = terms.into_iter().partition(|t| {
                matches!(
                    t,
                    ScalarExpr::CallUnary {
                        func: UnaryFunc::IsNull,
                        ..
                    }
                )
            });
            terms = null_tests;
            terms.extend(rest);
            self.simplify_or_terms(&mut terms, unknown_as);
        } else {
            self.simplify_list(&mut terms, unknown_as);
        }
        self.simplify_ors_internal(&mut terms, unknown_as)
    }

    /// While visiting "e3(x)" of "e1(x) OR e2(x) OR e3(x)" we know that
    /// neither earlier term was TRUE, or evaluation would have stopped; each
    /// recognized term therefore contributes its inverse as a predicate for
    /// the terms after it. Terms are visited once: recognized ones in the
    /// first loop, the rest in the second.
    fn simplify_or_terms(&self, terms: &mut Vec<ScalarExpr>, unknown_as: UnknownAs) {
        let mut simplify = self.clone();
        let mut done = vec![false; terms.len()];
        for i in 0..terms.len() {
            let t = terms[i].clone();
            if !simplify.allowed_as_predicate(&t) {
                continue;
            }
            done[i] = true;
            let t2 = simplify.simplify_under(&t, unknown_as);
            terms[i] = t2.clone();
            let inverse = simplify.simplify_under(&simplify.is_not_true(t2), UnknownAs::Unknown);
            simplify = simplify.with_predicates(simplify.predicates().with(inverse));
        }
        for i in 0..terms.len() {
            if done[i] {
                continue;
            }
            let t = terms[i].clone();
            terms[i] = simplify.simplify_under(&t, unknown_as);
        }
    }

    /// Whether the term may be used as a predicate while simplifying the
    /// other OR operands.
    fn allowed_as_predicate(&self, t: &ScalarExpr) -> bool {
        if let Some(comparison) = Comparison::of(t) {
            return comparison.allowed_in_or(self);
        }
        IsPredicate::of(t).is_some()
    }

    pub(crate) fn simplify_ors_internal(
        &self,
        terms: &mut Vec<ScalarExpr>,
        unknown_as: UnknownAs,
    ) -> ScalarExpr {
        let mut collector = SargCollector::new(false);
        let mut sarg_terms = Vec::new();
        for term in terms.iter() {
            collector.accept(term.clone(), &mut sarg_terms);
        }
        if collector.need_to_fix() {
            *terms = sarg_terms
                .into_iter()
                .map(|term| collector.fix(term, unknown_as))
                .collect();
        }

        // Auxiliary map to simplify "X <> A OR X <> B" (distinct constants)
        // into "X IS NOT NULL OR NULL". The key is X; the value the first
        // "X <> A" term found, replaced by "X IS NOT NULL" once the
        // simplification fires.
        let mut not_equals_map: BTreeMap<ScalarExpr, ScalarExpr> = BTreeMap::new();
        let mut i = 0;
        while i < terms.len() {
            let term = terms[i].clone();
            match &term {
                ScalarExpr::Literal(Ok(datum), _) => match datum {
                    Datum::Null => match unknown_as {
                        UnknownAs::False => {
                            terms.remove(i);
                            continue;
                        }
                        UnknownAs::True => return ScalarExpr::literal_true(),
                        UnknownAs::Unknown => {}
                    },
                    Datum::True => return term,
                    Datum::False => {
                        terms.remove(i);
                        continue;
                    }
                    _ => {}
                },
                ScalarExpr::CallBinary {
                    func: BinaryFunc::NotEq,
                    ..
                } => {
                    if let Some(comparison) = Comparison::of(&term) {
                        match not_equals_map.get(&comparison.ref_expr).cloned() {
                            None => {
                                not_equals_map.insert(comparison.ref_expr.clone(), term.clone());
                            }
                            Some(prev) => {
                                let prev_is_not_null = matches!(
                                    prev,
                                    ScalarExpr::CallUnary {
                                        func: UnaryFunc::IsNotNull,
                                        ..
                                    }
                                );
                                if !prev_is_not_null {
                                    let prev_comparison =
                                        Comparison::of(&prev).expect("map holds comparisons");
                                    if !comparison.value.is_null()
                                        && !prev_comparison.value.is_null()
                                        && comparison.value != prev_comparison.value
                                    {
                                        let is_not_null = comparison
                                            .ref_expr
                                            .clone()
                                            .call_unary(UnaryFunc::IsNotNull);
                                        let new_condition = self.simplify_under(
                                            &ScalarExpr::CallVariadic {
                                                func: VariadicFunc::Or,
                                                exprs: vec![
                                                    is_not_null.clone(),
                                                    ScalarExpr::literal_null(ScalarType::Bool),
                                                ],
                                            },
                                            unknown_as,
                                        );
                                        if new_condition.is_literal_true() {
                                            return ScalarExpr::literal_true();
                                        }
                                        not_equals_map
                                            .insert(comparison.ref_expr.clone(), is_not_null);
                                        if let Some(pos) = terms.iter().position(|t| t == &prev) {
                                            terms[pos] = new_condition;
                                        }
                                    }
                                }
                                terms.remove(i);
                                continue;
                            }
                        }
                    }
                }
                ScalarExpr::CallUnary {
                    func: UnaryFunc::IsNotTrue,
                    expr,
                } => {
                    // "x IS NOT TRUE OR x" is always TRUE for safe x.
                    if is_safe_expression(expr, self.relation_type())
                        && terms.contains(expr.as_ref())
                    {
                        return ScalarExpr::literal_true();
                    }
                }
                ScalarExpr::CallUnary {
                    func: UnaryFunc::Not,
                    expr,
                } => {
                    // "x OR NOT x": TRUE for non-nullable x; otherwise one
                    // occurrence weakens to "x IS NOT NULL", the other to
                    // NULL.
                    if is_safe_expression(expr, self.relation_type())
                        && terms.contains(expr.as_ref())
                    {
                        if !expr.typ(self.relation_type()).nullable {
                            return ScalarExpr::literal_true();
                        }
                        let is_not_null =
                            expr.as_ref().clone().call_unary(UnaryFunc::IsNotNull);
                        if let Some(pos) = terms.iter().position(|t| t == expr.as_ref()) {
                            terms[pos] = self.simplify_under(&is_not_null, unknown_as);
                        }
                        terms[i] = ScalarExpr::literal_null(ScalarType::Bool);
                        continue;
                    }
                }
                _ => {}
            }
            i += 1;
        }
        compose_disjunction(std::mem::take(terms))
    }

    pub(crate) fn simplify_case(&self, e: &ScalarExpr, unknown_as: UnknownAs) -> ScalarExpr {
        let input_branches = case_branches(e);

        // Conditions are simplified without the ambient predicates (their
        // truth may depend on the branch taken); values inherit everything.
        let cond_simplifier = self.with_predicates(crate::predicates::PredicateList::empty());
        let case_type = e.typ(self.relation_type());

        let mut condition_needs_simplify = false;
        let mut last_branch: Option<CaseBranch> = None;
        let mut branches: Vec<CaseBranch> = Vec::new();
        'branches: for input_branch in input_branches {
            // Simplify the condition; an always-false branch disappears.
            let mut new_cond =
                cond_simplifier.simplify_under(&input_branch.cond, UnknownAs::False);
            if new_cond.is_literal_false() {
                continue;
            }

            let new_value = self.simplify_under(&input_branch.value, unknown_as);

            if let Some(last) = last_branch.take() {
                if last.value == new_value
                    && is_safe_expression(&new_cond, self.relation_type())
                {
                    // The previous branch reaches the same conclusion: merge
                    // the conditions and keep the pair pending.
                    new_cond = ScalarExpr::CallVariadic {
                        func: VariadicFunc::Or,
                        exprs: vec![last.cond, new_cond],
                    };
                    condition_needs_simplify = true;
                } else {
                    // Not mergeable: flush the pending branch, simplifying
                    // its condition first if it was merged.
                    let branch =
                        generate_branch(condition_needs_simplify, &cond_simplifier, last);
                    if !branch.cond.is_literal_false() {
                        let done = branch.cond.is_literal_true();
                        branches.push(branch);
                        if done {
                            last_branch = None;
                            break 'branches;
                        }
                    }
                    condition_needs_simplify = false;
                }
            }
            let always_true = new_cond.is_literal_true();
            last_branch = Some(CaseBranch {
                cond: new_cond,
                value: new_value,
            });
            if always_true {
                break;
            }
        }
        if let Some(last) = last_branch {
            let branch = generate_branch(condition_needs_simplify, &cond_simplifier, last);
            if !branch.cond.is_literal_false() {
                branches.push(branch);
            }
        }

        if branches.len() == 1 {
            // A single remaining branch is just its value, matching the CASE
            // type.
            let value = branches.pop().expect("one branch").value;
            if same_type_or_narrows_nullability(&case_type, &value.typ(self.relation_type())) {
                return value;
            }
            return value.call_unary(UnaryFunc::Cast {
                to: case_type,
                safe: false,
            });
        }

        if case_type.scalar_type == ScalarType::Bool {
            if let Some(result) = self.simplify_boolean_case(&branches, &case_type) {
                if same_type_or_narrows_nullability(&case_type, &result.typ(self.relation_type()))
                {
                    return self.simplify_under(&result, unknown_as);
                }
                // The flattening would widen the nullability; re-simplify
                // faithfully and cast back if it stays nullable.
                let simplified = self.simplify_under(&result, UnknownAs::Unknown);
                if !simplified.typ(self.relation_type()).nullable {
                    return simplified;
                }
                return simplified.call_unary(UnaryFunc::Cast {
                    to: case_type,
                    safe: false,
                });
            }
        }

        let rebuilt = rebuild_case(branches);
        if rebuilt == *e {
            e.clone()
        } else {
            rebuilt
        }
    }

    /// Flattens a boolean CASE into a disjunction:
    ///
    /// ```text
    /// CASE WHEN p1 THEN x WHEN p2 THEN y ELSE z END
    /// ==> (p1 AND x) OR (p2 AND y AND NOT p1) OR (z AND NOT p1 AND NOT p2)
    /// ```
    ///
    /// Only when every branch is safe to unwind; a CASE may be guarding a
    /// division.
    fn simplify_boolean_case(
        &self,
        input_branches: &[CaseBranch],
        case_type: &ColumnType,
    ) -> Option<ScalarExpr> {
        let mut branches = Vec::new();
        for (index, branch) in input_branches.iter().enumerate() {
            if (index > 0 && !is_safe_expression(&branch.cond, self.relation_type()))
                || !is_safe_expression(&branch.value, self.relation_type())
            {
                return None;
            }
            let cond = self.is_true(branch.cond.clone());
            let value = if branch.value.typ(self.relation_type()) != *case_type {
                branch.value.clone().call_unary(UnaryFunc::Cast {
                    to: case_type.clone(),
                    safe: false,
                })
            } else {
                branch.value.clone()
            };
            branches.push(CaseBranch { cond, value });
        }

        let boolean_branches = branches
            .iter()
            .all(|b| b.value.is_literal_true() || b.value.is_literal_false());
        let mut terms = Vec::new();
        let mut not_terms: Vec<ScalarExpr> = Vec::new();
        for branch in branches {
            let use_branch = !branch.value.is_literal_false();
            if use_branch {
                let branch_term = if branch.value.is_literal_true() {
                    branch.cond.clone()
                } else {
                    ScalarExpr::CallVariadic {
                        func: VariadicFunc::And,
                        exprs: vec![branch.cond.clone(), branch.value],
                    }
                };
                let mut conjuncts = vec![branch_term];
                conjuncts.extend(not_terms.iter().cloned().map(not));
                terms.push(compose_conjunction(conjuncts));
            }
            if boolean_branches && use_branch {
                // For boolean true branches, a || (b && !a) === a || b, so
                // the negation is not needed downstream.
            } else {
                not_terms.push(branch.cond);
            }
        }
        Some(compose_disjunction(terms))
    }
}

/// One branch of a CASE: "WHEN cond THEN value". The final branch of a
/// normalized list has a TRUE condition holding the default.
#[derive(Clone, Debug)]
struct CaseBranch {
    cond: ScalarExpr,
    value: ScalarExpr,
}

/// Given `CASE WHEN p1 THEN v1 ... ELSE e END` (a chain of conditionals)
/// returns `[(p1, v1), ..., (true, e)]`.
fn case_branches(e: &ScalarExpr) -> Vec<CaseBranch> {
    let mut out = Vec::new();
    let mut cur = e;
    while let ScalarExpr::If { cond, then, els } = cur {
        out.push(CaseBranch {
            cond: (**cond).clone(),
            value: (**then).clone(),
        });
        cur = els;
    }
    out.push(CaseBranch {
        cond: ScalarExpr::literal_true(),
        value: cur.clone(),
    });
    out
}

fn rebuild_case(mut branches: Vec<CaseBranch>) -> ScalarExpr {
    let last = branches.pop().expect("a CASE has at least its default");
    assert!(
        last.cond.is_literal_true(),
        "normalized CASE ends in its default branch"
    );
    let mut result = last.value;
    for branch in branches.into_iter().rev() {
        result = branch.cond.if_then_else(branch.value, result);
    }
    result
}

/// If the pending branch was merged, its combined condition still needs a
/// simplification pass before it is emitted.
fn generate_branch(
    simplify_cond: bool,
    simplifier: &Simplifier,
    branch: CaseBranch,
) -> CaseBranch {
    if simplify_cond {
        CaseBranch {
            cond: simplifier.simplify_under(&branch.cond, UnknownAs::False),
            value: branch.value,
        }
    } else {
        branch
    }
}

/// The negation of a comparison: "a > 5" becomes "a <= 5".
fn negate_comparison(e: &ScalarExpr) -> Option<ScalarExpr> {
    if let ScalarExpr::CallBinary { func, expr1, expr2 } = e {
        if func.is_comparison() {
            return func.negate().map(|negated| ScalarExpr::CallBinary {
                func: negated,
                expr1: expr1.clone(),
                expr2: expr2.clone(),
            });
        }
    }
    None
}

/// The operand-swapped form of a comparison: "a <= 5" becomes "5 >= a".
fn invert_comparison(e: &ScalarExpr) -> Option<ScalarExpr> {
    if let ScalarExpr::CallBinary { func, expr1, expr2 } = e {
        if let Some(reversed) = func.reverse() {
            return Some(ScalarExpr::CallBinary {
                func: reversed,
                expr1: expr2.clone(),
                expr2: expr1.clone(),
            });
        }
    }
    None
}

/// Replaces the last occurrence of `old` in `list` with `new`. Does not
/// change the size of the list.
fn replace_last(list: &mut [ScalarExpr], old: &ScalarExpr, new: &ScalarExpr) -> bool {
    match list.iter().rposition(|e| e == old) {
        Some(index) => {
            list[index] = new.clone();
            true
        }
        None => false,
    }
}

fn is_upper_bound(e: &ScalarExpr) -> bool {
    match e {
        ScalarExpr::CallBinary {
            func: BinaryFunc::Lt | BinaryFunc::Lte,
            expr1,
            expr2,
        } => is_ref_or_access(expr1, true) && expr2.is_literal(),
        ScalarExpr::CallBinary {
            func: BinaryFunc::Gt | BinaryFunc::Gte,
            expr1,
            expr2,
        } => expr1.is_literal() && is_ref_or_access(expr2, true),
        _ => false,
    }
}

fn is_lower_bound(e: &ScalarExpr) -> bool {
    match e {
        ScalarExpr::CallBinary {
            func: BinaryFunc::Lt | BinaryFunc::Lte,
            expr1,
            expr2,
        } => expr1.is_literal() && is_ref_or_access(expr2, true),
        ScalarExpr::CallBinary {
            func: BinaryFunc::Gt | BinaryFunc::Gte,
            expr1,
            expr2,
        } => is_ref_or_access(expr1, true) && expr2.is_literal(),
        _ => false,
    }
}

/// Maintains one contiguous range per reference as comparison terms stream
/// by, tightening it and blanking out terms that the tightened range makes
/// redundant. Returns FALSE when the range empties: the conjunction is not
/// satisfiable.
fn process_range(
    terms: &mut Vec<ScalarExpr>,
    range_terms: &mut BTreeMap<ScalarExpr, (Range, Vec<ScalarExpr>)>,
    term: &ScalarExpr,
    ref_expr: &ScalarExpr,
    value: &Datum,
    func: BinaryFunc,
) -> Option<ScalarExpr> {
    use std::ops::Bound;

    let (r, sources) = match range_terms.get(ref_expr) {
        None => {
            let range = range_for_comparison(func, value).expect("range comparison");
            range_terms.insert(ref_expr.clone(), (range, vec![term.clone()]));
            return None;
        }
        Some(entry) => entry.clone(),
    };

    let true_literal = ScalarExpr::literal_true();
    let false_result = || Some(ScalarExpr::literal_false());
    let mut new_range = r.clone();
    let mut remove_upper_bound = false;
    let mut remove_lower_bound = false;
    match func {
        BinaryFunc::Eq => {
            if !r.contains(value) {
                // The range is empty, not satisfiable.
                return false_result();
            }
            for e in &sources {
                replace_last(terms, e, &true_literal);
            }
            range_terms.insert(
                ref_expr.clone(),
                (Range::point(value.clone()), vec![term.clone()]),
            );
            return None;
        }
        BinaryFunc::Lt => {
            let tightens = match r.upper_endpoint() {
                None => true,
                Some(upper) => value <= upper,
            };
            if tightens {
                if let Some(lower) = r.lower_endpoint() {
                    if value <= lower {
                        return false_result();
                    }
                    new_range = Range::new(r.lower.clone(), Bound::Excluded(value.clone()));
                } else {
                    new_range = Range::less_than(value.clone());
                }
                if new_range.is_empty() {
                    return false_result();
                }
                remove_upper_bound = true;
            } else {
                // The term is contained in the current upper bound.
                replace_last(terms, term, &true_literal);
            }
        }
        BinaryFunc::Lte => {
            let tightens = match r.upper_endpoint() {
                None => true,
                Some(upper) => value < upper,
            };
            if tightens {
                if let Some(lower) = r.lower_endpoint() {
                    if value < lower {
                        return false_result();
                    }
                    new_range = Range::new(r.lower.clone(), Bound::Included(value.clone()));
                } else {
                    new_range = Range::at_most(value.clone());
                }
                if new_range.is_empty() {
                    return false_result();
                }
                remove_upper_bound = true;
            } else {
                replace_last(terms, term, &true_literal);
            }
        }
        BinaryFunc::Gt => {
            let tightens = match r.lower_endpoint() {
                None => true,
                Some(lower) => value >= lower,
            };
            if tightens {
                if let Some(upper) = r.upper_endpoint() {
                    if value >= upper {
                        return false_result();
                    }
                    new_range = Range::new(Bound::Excluded(value.clone()), r.upper.clone());
                } else {
                    new_range = Range::greater_than(value.clone());
                }
                if new_range.is_empty() {
                    return false_result();
                }
                remove_lower_bound = true;
            } else {
                replace_last(terms, term, &true_literal);
            }
        }
        BinaryFunc::Gte => {
            let tightens = match r.lower_endpoint() {
                None => true,
                Some(lower) => value > lower,
            };
            if tightens {
                if let Some(upper) = r.upper_endpoint() {
                    if value > upper {
                        return false_result();
                    }
                    new_range = Range::new(Bound::Included(value.clone()), r.upper.clone());
                } else {
                    new_range = Range::at_least(value.clone());
                }
                if new_range.is_empty() {
                    return false_result();
                }
                remove_lower_bound = true;
            } else {
                replace_last(terms, term, &true_literal);
            }
        }
        _ => unreachable!("process_range sees only =, <, <=, >, >="),
    }

    if remove_upper_bound || remove_lower_bound {
        let mut new_bounds = Vec::new();
        for e in sources {
            let replaced = if remove_upper_bound {
                is_upper_bound(&e)
            } else {
                is_lower_bound(&e)
            };
            if replaced {
                replace_last(terms, &e, &true_literal);
            } else {
                new_bounds.push(e);
            }
        }
        new_bounds.push(term.clone());
        range_terms.insert(ref_expr.clone(), (new_range, new_bounds));
    }
    None
}
