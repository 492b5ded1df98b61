// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Search arguments: sets of disjoint ranges over a comparable type,
//! together with a policy for NULL inputs.
//!
//! A [`Sarg`] represents the predicate `value ∈ ranges OR (value IS NULL AND
//! null_as = TRUE)`. The [`SargCollector`] gathers chains of comparisons on
//! a shared reference from AND/OR term lists into a single `SEARCH` call.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;

use serde::{Deserialize, Serialize};

use tern_repr::{ColumnType, Datum, ScalarType};

use crate::scalar::func::{cast_datum, datum_scalar_type, BinaryFunc, UnaryFunc};
use crate::scalar::ScalarExpr;

/// How a boolean NULL (UNKNOWN) is interpreted at a point of use.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize, Hash)]
pub enum UnknownAs {
    Unknown,
    True,
    False,
}

impl UnknownAs {
    pub fn from_bool(b: bool) -> UnknownAs {
        if b {
            UnknownAs::True
        } else {
            UnknownAs::False
        }
    }

    pub fn is_unknown(self) -> bool {
        self == UnknownAs::Unknown
    }

    /// The policy for `NOT e`, given the policy for `e`.
    pub fn negate(self) -> UnknownAs {
        match self {
            UnknownAs::Unknown => UnknownAs::Unknown,
            UnknownAs::True => UnknownAs::False,
            UnknownAs::False => UnknownAs::True,
        }
    }

    /// The boolean this policy maps NULL to, if any.
    pub fn to_bool(self) -> Option<bool> {
        match self {
            UnknownAs::Unknown => None,
            UnknownAs::True => Some(true),
            UnknownAs::False => Some(false),
        }
    }

    /// Joins two policies the way OR joins its operands: TRUE wins over
    /// UNKNOWN, which wins over FALSE.
    pub fn or(self, other: UnknownAs) -> UnknownAs {
        match (self, other) {
            (UnknownAs::True, _) | (_, UnknownAs::True) => UnknownAs::True,
            (UnknownAs::Unknown, _) | (_, UnknownAs::Unknown) => UnknownAs::Unknown,
            (UnknownAs::False, UnknownAs::False) => UnknownAs::False,
        }
    }
}

impl fmt::Display for UnknownAs {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UnknownAs::Unknown => f.write_str("UNKNOWN"),
            UnknownAs::True => f.write_str("TRUE"),
            UnknownAs::False => f.write_str("FALSE"),
        }
    }
}

/// A position on the value line, used to order and merge range bounds. A cut
/// sits either immediately before or immediately after a value.
#[derive(PartialEq, Eq, PartialOrd, Ord)]
enum Cut<'a> {
    Below,
    At(&'a Datum, bool),
    Above,
}

/// A contiguous, possibly unbounded range of non-null values.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Hash)]
pub struct Range {
    pub lower: Bound<Datum>,
    pub upper: Bound<Datum>,
}

impl Range {
    pub fn new(lower: Bound<Datum>, upper: Bound<Datum>) -> Range {
        Range { lower, upper }
    }

    pub fn all() -> Range {
        Range::new(Bound::Unbounded, Bound::Unbounded)
    }

    pub fn point(datum: Datum) -> Range {
        Range::new(Bound::Included(datum.clone()), Bound::Included(datum))
    }

    pub fn less_than(datum: Datum) -> Range {
        Range::new(Bound::Unbounded, Bound::Excluded(datum))
    }

    pub fn at_most(datum: Datum) -> Range {
        Range::new(Bound::Unbounded, Bound::Included(datum))
    }

    pub fn greater_than(datum: Datum) -> Range {
        Range::new(Bound::Excluded(datum), Bound::Unbounded)
    }

    pub fn at_least(datum: Datum) -> Range {
        Range::new(Bound::Included(datum), Bound::Unbounded)
    }

    fn lower_cut(&self) -> Cut {
        match &self.lower {
            Bound::Unbounded => Cut::Below,
            Bound::Included(d) => Cut::At(d, false),
            Bound::Excluded(d) => Cut::At(d, true),
        }
    }

    fn upper_cut(&self) -> Cut {
        match &self.upper {
            Bound::Unbounded => Cut::Above,
            Bound::Included(d) => Cut::At(d, true),
            Bound::Excluded(d) => Cut::At(d, false),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lower_cut() >= self.upper_cut()
    }

    pub fn has_lower_bound(&self) -> bool {
        !matches!(self.lower, Bound::Unbounded)
    }

    pub fn has_upper_bound(&self) -> bool {
        !matches!(self.upper, Bound::Unbounded)
    }

    pub fn lower_endpoint(&self) -> Option<&Datum> {
        match &self.lower {
            Bound::Unbounded => None,
            Bound::Included(d) | Bound::Excluded(d) => Some(d),
        }
    }

    pub fn upper_endpoint(&self) -> Option<&Datum> {
        match &self.upper {
            Bound::Unbounded => None,
            Bound::Included(d) | Bound::Excluded(d) => Some(d),
        }
    }

    /// The single datum this range contains, if it contains exactly one.
    pub fn as_point(&self) -> Option<&Datum> {
        match (&self.lower, &self.upper) {
            (Bound::Included(a), Bound::Included(b)) if a == b => Some(a),
            _ => None,
        }
    }

    pub fn contains(&self, datum: &Datum) -> bool {
        self.lower_cut() <= Cut::At(datum, false) && Cut::At(datum, true) <= self.upper_cut()
    }

    /// Whether the union of `self` and `other` is contiguous.
    pub fn connected(&self, other: &Range) -> bool {
        self.lower_cut() <= other.upper_cut() && other.lower_cut() <= self.upper_cut()
    }

    pub fn encloses(&self, other: &Range) -> bool {
        self.lower_cut() <= other.lower_cut() && other.upper_cut() <= self.upper_cut()
    }

    /// The smallest range covering both `self` and `other`.
    pub fn span(&self, other: &Range) -> Range {
        let lower = if self.lower_cut() <= other.lower_cut() {
            self.lower.clone()
        } else {
            other.lower.clone()
        };
        let upper = if self.upper_cut() >= other.upper_cut() {
            self.upper.clone()
        } else {
            other.upper.clone()
        };
        Range::new(lower, upper)
    }

    pub fn intersect(&self, other: &Range) -> Option<Range> {
        let lower = if self.lower_cut() >= other.lower_cut() {
            self.lower.clone()
        } else {
            other.lower.clone()
        };
        let upper = if self.upper_cut() <= other.upper_cut() {
            self.upper.clone()
        } else {
            other.upper.clone()
        };
        let range = Range::new(lower, upper);
        if range.is_empty() {
            None
        } else {
            Some(range)
        }
    }
}

impl Ord for Range {
    fn cmp(&self, other: &Range) -> Ordering {
        self.lower_cut()
            .cmp(&other.lower_cut())
            .then_with(|| self.upper_cut().cmp(&other.upper_cut()))
    }
}

impl PartialOrd for Range {
    fn partial_cmp(&self, other: &Range) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(point) = self.as_point() {
            return write!(f, "[{}]", point);
        }
        match &self.lower {
            Bound::Unbounded => f.write_str("(-∞")?,
            Bound::Included(d) => write!(f, "[{}", d)?,
            Bound::Excluded(d) => write!(f, "({}", d)?,
        }
        f.write_str("..")?;
        match &self.upper {
            Bound::Unbounded => f.write_str("+∞)"),
            Bound::Included(d) => write!(f, "{}]", d),
            Bound::Excluded(d) => write!(f, "{})", d),
        }
    }
}

/// A set of disjoint, non-adjacent ranges in canonical (sorted, coalesced)
/// form.
#[derive(
    Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize, Hash,
)]
pub struct RangeSet {
    ranges: Vec<Range>,
}

impl RangeSet {
    pub fn empty() -> RangeSet {
        RangeSet { ranges: vec![] }
    }

    pub fn all() -> RangeSet {
        RangeSet::single(Range::all())
    }

    pub fn single(range: Range) -> RangeSet {
        let mut set = RangeSet::empty();
        set.add(range);
        set
    }

    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    pub fn add(&mut self, range: Range) {
        if range.is_empty() {
            return;
        }
        self.ranges.push(range);
        self.normalize();
    }

    pub fn add_all(&mut self, other: &RangeSet) {
        self.ranges.extend(other.ranges.iter().cloned());
        self.normalize();
    }

    fn normalize(&mut self) {
        self.ranges.retain(|r| !r.is_empty());
        self.ranges.sort();
        let mut out: Vec<Range> = Vec::with_capacity(self.ranges.len());
        for r in self.ranges.drain(..) {
            if let Some(last) = out.last_mut() {
                if last.connected(&r) {
                    *last = last.span(&r);
                    continue;
                }
            }
            out.push(r);
        }
        self.ranges = out;
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn is_all(&self) -> bool {
        self.ranges.len() == 1
            && !self.ranges[0].has_lower_bound()
            && !self.ranges[0].has_upper_bound()
    }

    pub fn contains(&self, datum: &Datum) -> bool {
        self.ranges.iter().any(|r| r.contains(datum))
    }

    pub fn encloses(&self, range: &Range) -> bool {
        // The ranges are disjoint and non-adjacent, so a contiguous range is
        // enclosed iff a single member encloses it.
        self.ranges.iter().any(|r| r.encloses(range))
    }

    pub fn encloses_all(&self, other: &RangeSet) -> bool {
        other.ranges.iter().all(|r| self.encloses(r))
    }

    pub fn complement(&self) -> RangeSet {
        let mut out = Vec::new();
        let mut lower: Bound<Datum> = Bound::Unbounded;
        for r in &self.ranges {
            match &r.lower {
                Bound::Unbounded => {}
                Bound::Included(d) => {
                    let gap = Range::new(lower, Bound::Excluded(d.clone()));
                    if !gap.is_empty() {
                        out.push(gap);
                    }
                }
                Bound::Excluded(d) => {
                    let gap = Range::new(lower, Bound::Included(d.clone()));
                    if !gap.is_empty() {
                        out.push(gap);
                    }
                }
            }
            lower = match &r.upper {
                Bound::Unbounded => return RangeSet { ranges: out },
                Bound::Included(d) => Bound::Excluded(d.clone()),
                Bound::Excluded(d) => Bound::Included(d.clone()),
            };
        }
        out.push(Range::new(lower, Bound::Unbounded));
        RangeSet { ranges: out }
    }

    pub fn intersect_range(&self, range: &Range) -> RangeSet {
        RangeSet {
            ranges: self
                .ranges
                .iter()
                .filter_map(|r| r.intersect(range))
                .collect(),
        }
    }

    pub fn intersect(&self, other: &RangeSet) -> RangeSet {
        let mut out = RangeSet::empty();
        for r in &other.ranges {
            out.ranges.extend(self.intersect_range(r).ranges);
        }
        out.normalize();
        out
    }

    pub fn minus_range(&self, range: &Range) -> RangeSet {
        self.intersect(&RangeSet::single(range.clone()).complement())
    }

    /// Whether every range in the set is a single value.
    pub fn is_points(&self) -> bool {
        !self.ranges.is_empty() && self.ranges.iter().all(|r| r.as_point().is_some())
    }

    pub fn points(&self) -> Vec<&Datum> {
        self.ranges.iter().filter_map(|r| r.as_point()).collect()
    }

    pub fn point_count(&self) -> usize {
        self.points().len()
    }

    /// Whether the complement of the set is a non-empty set of points.
    pub fn is_complemented_points(&self) -> bool {
        !self.is_empty() && self.complement().is_points()
    }

    /// Whether the set is a single range that is unbounded on at least one
    /// side.
    pub fn is_open_interval(&self) -> bool {
        self.ranges.len() == 1
            && (!self.ranges[0].has_lower_bound() || !self.ranges[0].has_upper_bound())
    }
}

impl fmt::Display for RangeSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, r) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", r)?;
        }
        Ok(())
    }
}

/// A search argument: a set of ranges plus a policy classifying NULL.
#[derive(
    Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize, Hash,
)]
pub struct Sarg {
    pub range_set: RangeSet,
    pub null_as: UnknownAs,
}

impl Sarg {
    pub fn of(null_as: UnknownAs, range_set: RangeSet) -> Sarg {
        Sarg { range_set, null_as }
    }

    /// Complements the ranges, leaving the NULL policy unchanged.
    pub fn complement(&self) -> Sarg {
        Sarg::of(self.null_as, self.range_set.complement())
    }

    /// The sarg matched by exactly the values this one does not match:
    /// complements the ranges and flips the NULL policy.
    pub fn negate(&self) -> Sarg {
        Sarg::of(self.null_as.negate(), self.range_set.complement())
    }

    pub fn is_all(&self) -> bool {
        self.range_set.is_all()
    }

    pub fn is_none(&self) -> bool {
        self.range_set.is_empty()
    }

    pub fn is_points(&self) -> bool {
        self.range_set.is_points()
    }

    pub fn is_complemented_points(&self) -> bool {
        self.range_set.is_complemented_points()
    }

    pub fn point_count(&self) -> usize {
        self.range_set.point_count()
    }

    /// A measure of how many terms expanding this sarg would take. All and
    /// none match a one-term encoding whatever the NULL policy; point sets
    /// count their points, complemented point sets their complement's
    /// points, anything else its ranges; matching NULL costs one more.
    pub fn complexity(&self) -> usize {
        if self.is_all() || self.is_none() {
            return 1;
        }
        let base = if self.range_set.is_points() {
            self.range_set.point_count()
        } else if self.range_set.is_complemented_points() {
            self.range_set.complement().point_count()
        } else {
            self.range_set.ranges().len()
        };
        base + usize::from(self.null_as == UnknownAs::True)
    }

    /// Whether this sarg has an equivalent spelled with ordinary
    /// comparisons.
    pub fn is_simple(&self) -> bool {
        self.is_all()
            || self.is_none()
            || self.is_points()
            || self.is_complemented_points()
            || self.range_set.is_open_interval()
    }

    /// Evaluates the sarg against a datum, yielding a three-valued boolean.
    pub fn matches(&self, datum: &Datum) -> Datum {
        if datum.is_null() {
            match self.null_as {
                UnknownAs::Unknown => Datum::Null,
                UnknownAs::True => Datum::True,
                UnknownAs::False => Datum::False,
            }
        } else {
            Datum::from_bool(self.range_set.contains(datum))
        }
    }
}

impl fmt::Display for Sarg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Sarg[{}", self.range_set)?;
        match self.null_as {
            UnknownAs::Unknown => {}
            null_as => write!(f, "; NULL AS {}", null_as)?,
        }
        f.write_str("]")
    }
}

/// The range of values satisfying `x <op> datum`, for the six comparisons.
pub(crate) fn range_for_comparison(func: BinaryFunc, datum: &Datum) -> Option<Range> {
    match func {
        BinaryFunc::Eq => Some(Range::point(datum.clone())),
        BinaryFunc::Lt => Some(Range::less_than(datum.clone())),
        BinaryFunc::Lte => Some(Range::at_most(datum.clone())),
        BinaryFunc::Gt => Some(Range::greater_than(datum.clone())),
        BinaryFunc::Gte => Some(Range::at_least(datum.clone())),
        _ => None,
    }
}

/// As [`range_for_comparison`], but as a range set, which additionally
/// supports `!=`.
pub(crate) fn range_set_for_comparison(func: BinaryFunc, datum: &Datum) -> Option<RangeSet> {
    match func {
        BinaryFunc::NotEq => {
            let mut set = RangeSet::empty();
            set.add(Range::less_than(datum.clone()));
            set.add(Range::greater_than(datum.clone()));
            Some(set)
        }
        other => range_for_comparison(other, datum).map(RangeSet::single),
    }
}

/// Expands a sarg applied to `ref_expr` into ordinary comparisons. The
/// expansion is exact for any sarg; callers that care about size should
/// consult [`Sarg::complexity`] first.
pub(crate) fn sarg_expansion(
    ref_expr: &ScalarExpr,
    sarg: &Sarg,
    value_type: Option<&ScalarType>,
    unknown_as: UnknownAs,
) -> ScalarExpr {
    use crate::simplify::{compose_conjunction, compose_disjunction};

    let is_null = || ref_expr.clone().call_unary(UnaryFunc::IsNull);
    let is_not_null = || ref_expr.clone().call_unary(UnaryFunc::IsNotNull);
    let null_bool = || ScalarExpr::literal_null(ScalarType::Bool);

    if sarg.is_none() {
        return match (sarg.null_as, unknown_as) {
            (UnknownAs::True, _) => is_null(),
            (UnknownAs::False, _) => ScalarExpr::literal_false(),
            // Nothing matches except perhaps NULL; the policy at the point
            // of use may already decide that.
            (UnknownAs::Unknown, UnknownAs::False) => ScalarExpr::literal_false(),
            (UnknownAs::Unknown, UnknownAs::True) => is_null(),
            (UnknownAs::Unknown, UnknownAs::Unknown) => {
                compose_conjunction(vec![null_bool(), is_null()])
            }
        };
    }
    if sarg.is_all() {
        return match (sarg.null_as, unknown_as) {
            (UnknownAs::True, _) => ScalarExpr::literal_true(),
            (UnknownAs::False, _) => is_not_null(),
            (UnknownAs::Unknown, UnknownAs::False) => is_not_null(),
            (UnknownAs::Unknown, UnknownAs::True) => ScalarExpr::literal_true(),
            (UnknownAs::Unknown, UnknownAs::Unknown) => {
                compose_disjunction(vec![is_not_null(), null_bool()])
            }
        };
    }

    let literal = |datum: &Datum| {
        let typ = match value_type {
            Some(typ) if !datum.is_instance_of(typ) => match cast_datum(
                datum,
                &typ.clone().nullable(false),
                false,
            ) {
                Ok(cast) => return ScalarExpr::literal_ok(cast, typ.clone()),
                Err(_) => datum_scalar_type(datum).expect("endpoint datums are typed"),
            },
            Some(typ) => typ.clone(),
            None => datum_scalar_type(datum).expect("endpoint datums are typed"),
        };
        ScalarExpr::literal_ok(datum.clone(), typ)
    };
    let cmp = |func: BinaryFunc, datum: &Datum| {
        ref_expr.clone().call_binary(literal(datum), func)
    };

    let core = if sarg.is_points() {
        compose_disjunction(
            sarg.range_set
                .points()
                .into_iter()
                .map(|p| cmp(BinaryFunc::Eq, p))
                .collect(),
        )
    } else if sarg.is_complemented_points() {
        compose_conjunction(
            sarg.range_set
                .complement()
                .points()
                .into_iter()
                .map(|p| cmp(BinaryFunc::NotEq, p))
                .collect(),
        )
    } else {
        compose_disjunction(
            sarg.range_set
                .ranges()
                .iter()
                .map(|r| {
                    let mut terms = Vec::new();
                    match &r.lower {
                        Bound::Unbounded => {}
                        Bound::Included(d) => terms.push(cmp(BinaryFunc::Gte, d)),
                        Bound::Excluded(d) => terms.push(cmp(BinaryFunc::Gt, d)),
                    }
                    match &r.upper {
                        Bound::Unbounded => {}
                        Bound::Included(d) => terms.push(cmp(BinaryFunc::Lte, d)),
                        Bound::Excluded(d) => terms.push(cmp(BinaryFunc::Lt, d)),
                    }
                    compose_conjunction(terms)
                })
                .collect(),
        )
    };

    match sarg.null_as {
        UnknownAs::Unknown => core,
        UnknownAs::True if unknown_as == UnknownAs::True => core,
        UnknownAs::True => compose_disjunction(vec![core, is_null()]),
        UnknownAs::False if unknown_as == UnknownAs::False => core,
        UnknownAs::False => compose_conjunction(vec![core, is_not_null()]),
    }
}

/// A term produced by the [`SargCollector`]: either an expression passed
/// through untouched, or a reference to a builder that absorbed one or more
/// terms.
#[derive(Debug)]
pub(crate) enum SargTerm {
    Expr(ScalarExpr),
    Builder(usize),
}

/// Accumulates per-reference range constraints from a flat list of AND or OR
/// terms.
///
/// In `negate` mode (used for conjunctions) terms are recorded through their
/// complement, so that the builder's union of ranges corresponds to the
/// intersection demanded by AND; `build` then complements back.
#[derive(Debug)]
pub(crate) struct SargCollector {
    builders: Vec<SargBuilder>,
    map: BTreeMap<ScalarExpr, usize>,
    negate: bool,
    new_terms_count: usize,
}

#[derive(Debug)]
struct SargBuilder {
    ref_expr: ScalarExpr,
    types: Vec<ColumnType>,
    range_set: RangeSet,
    null_as: UnknownAs,
    has_sarg: bool,
    merged_sarg: bool,
}

impl SargBuilder {
    fn new(ref_expr: ScalarExpr) -> SargBuilder {
        SargBuilder {
            ref_expr,
            types: Vec::new(),
            range_set: RangeSet::empty(),
            null_as: UnknownAs::False,
            has_sarg: false,
            merged_sarg: false,
        }
    }

    fn build(&self, negate: bool) -> Sarg {
        if negate {
            Sarg::of(self.null_as.negate(), self.range_set.complement())
        } else {
            Sarg::of(self.null_as, self.range_set.clone())
        }
    }

    fn value_type(&self) -> Option<ScalarType> {
        let mut iter = self.types.iter();
        let mut typ = iter.next()?.scalar_type.clone();
        for t in iter {
            typ = typ.least_restrictive(&t.scalar_type)?;
        }
        Some(typ)
    }
}

/// Whether an expression can occupy the reference slot of a search argument.
fn is_ref_candidate(e: &ScalarExpr) -> bool {
    matches!(
        e,
        ScalarExpr::Column(_)
            | ScalarExpr::CallUnary {
                func: UnaryFunc::RecordGet(_) | UnaryFunc::Cast { .. },
                ..
            }
    )
}

impl SargCollector {
    pub fn new(negate: bool) -> SargCollector {
        SargCollector {
            builders: Vec::new(),
            map: BTreeMap::new(),
            negate,
            new_terms_count: 0,
        }
    }

    pub fn accept(&mut self, term: ScalarExpr, new_terms: &mut Vec<SargTerm>) {
        if !self.accept_expr(&term, new_terms) {
            new_terms.push(SargTerm::Expr(term));
        }
        self.new_terms_count = new_terms.len();
    }

    fn accept_expr(&mut self, e: &ScalarExpr, new_terms: &mut Vec<SargTerm>) -> bool {
        match e {
            ScalarExpr::CallBinary { func, expr1, expr2 } if func.is_comparison() => {
                if is_ref_candidate(expr1) {
                    if let ScalarExpr::Literal(Ok(datum), typ) = &**expr2 {
                        return self.accept_comparison(expr1, *func, datum, typ, new_terms);
                    }
                }
                if is_ref_candidate(expr2) {
                    if let ScalarExpr::Literal(Ok(datum), typ) = &**expr1 {
                        let func = func.reverse().expect("comparisons reverse");
                        return self.accept_comparison(expr2, func, datum, typ, new_terms);
                    }
                }
                false
            }
            ScalarExpr::CallUnary {
                func: func @ (UnaryFunc::IsNull | UnaryFunc::IsNotNull),
                expr,
            } if is_ref_candidate(expr) => {
                self.accept_is(expr, func.clone(), new_terms);
                true
            }
            ScalarExpr::CallUnary {
                func: UnaryFunc::Search(sarg),
                expr,
            } if is_ref_candidate(expr) => {
                self.accept_search(expr, sarg, new_terms);
                true
            }
            _ => false,
        }
    }

    fn accept_comparison(
        &mut self,
        ref_expr: &ScalarExpr,
        func: BinaryFunc,
        datum: &Datum,
        typ: &ColumnType,
        new_terms: &mut Vec<SargTerm>,
    ) -> bool {
        if datum.is_null() {
            // Comparisons against a NULL literal always yield UNKNOWN; they
            // are handled by other rules, never folded into a sarg.
            return false;
        }
        let func = if self.negate {
            func.negate().expect("comparisons negate")
        } else {
            func
        };
        let index = self.builder_for(ref_expr, new_terms);
        let builder = &mut self.builders[index];
        builder.types.push(typ.clone());
        match func {
            BinaryFunc::NotEq => {
                builder.range_set.add(Range::less_than(datum.clone()));
                builder.range_set.add(Range::greater_than(datum.clone()));
            }
            other => {
                let range = range_for_comparison(other, datum).expect("comparison range");
                builder.range_set.add(range);
            }
        }
        builder.merged_sarg |= builder.has_sarg;
        builder.null_as = builder.null_as.or(UnknownAs::Unknown);
        true
    }

    fn accept_is(
        &mut self,
        ref_expr: &ScalarExpr,
        func: UnaryFunc,
        new_terms: &mut Vec<SargTerm>,
    ) {
        let func = if self.negate {
            func.negate().expect("IS NULL negates")
        } else {
            func
        };
        let index = self.builder_for(ref_expr, new_terms);
        let builder = &mut self.builders[index];
        match func {
            UnaryFunc::IsNull => {
                builder.null_as = builder.null_as.or(UnknownAs::True);
            }
            UnaryFunc::IsNotNull => {
                builder.null_as = builder.null_as.or(UnknownAs::False);
                builder.range_set.add(Range::all());
            }
            _ => unreachable!("accept_is called on IS [NOT] NULL only"),
        }
    }

    fn accept_search(
        &mut self,
        ref_expr: &ScalarExpr,
        sarg: &Sarg,
        new_terms: &mut Vec<SargTerm>,
    ) {
        let (range_set, null_as) = if self.negate {
            let negated = sarg.negate();
            (negated.range_set, negated.null_as)
        } else {
            (sarg.range_set.clone(), sarg.null_as)
        };
        let index = self.builder_for(ref_expr, new_terms);
        let builder = &mut self.builders[index];
        builder.range_set.add_all(&range_set);
        builder.merged_sarg |= !builder.range_set.is_empty();
        builder.has_sarg = true;
        builder.null_as = builder.null_as.or(null_as);
    }

    fn builder_for(&mut self, ref_expr: &ScalarExpr, new_terms: &mut Vec<SargTerm>) -> usize {
        if let Some(index) = self.map.get(ref_expr) {
            return *index;
        }
        let index = self.builders.len();
        self.builders.push(SargBuilder::new(ref_expr.clone()));
        self.map.insert(ref_expr.clone(), index);
        new_terms.push(SargTerm::Builder(index));
        index
    }

    /// Whether rewriting the terms through the builders is worthwhile: a
    /// builder reached complexity above one, a sarg was merged into another
    /// constraint, or the whole term list collapsed into one simple sarg.
    pub fn need_to_fix(&self) -> bool {
        !self.builders.is_empty()
            && (self
                .builders
                .iter()
                .any(|b| b.build(false).complexity() > 1 || b.merged_sarg)
                || (self.new_terms_count == 1
                    && self.builders.iter().all(|b| b.build(self.negate).is_simple())))
    }

    /// Converts a collected term back into an expression: small simple sargs
    /// expand into ordinary comparisons, anything else becomes a `SEARCH`.
    pub fn fix(&self, term: SargTerm, unknown_as: UnknownAs) -> ScalarExpr {
        match term {
            SargTerm::Expr(e) => e,
            SargTerm::Builder(index) => {
                let builder = &self.builders[index];
                let sarg = builder.build(self.negate);
                if sarg.complexity() <= 1 && sarg.is_simple() {
                    sarg_expansion(
                        &builder.ref_expr,
                        &sarg,
                        builder.value_type().as_ref(),
                        unknown_as,
                    )
                } else {
                    builder
                        .ref_expr
                        .clone()
                        .call_unary(UnaryFunc::Search(Box::new(sarg)))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(i: i64) -> Datum {
        Datum::Int64(i)
    }

    #[test]
    fn test_range_set_add_coalesces() {
        let mut set = RangeSet::empty();
        set.add(Range::at_least(int(5)));
        set.add(Range::less_than(int(3)));
        assert_eq!(set.ranges().len(), 2);

        // [3..5) plugs the gap exactly.
        set.add(Range::new(Bound::Included(int(3)), Bound::Excluded(int(5))));
        assert!(set.is_all());

        let mut set = RangeSet::empty();
        set.add(Range::new(Bound::Included(int(1)), Bound::Included(int(5))));
        set.add(Range::new(Bound::Excluded(int(5)), Bound::Included(int(10))));
        assert_eq!(set.ranges().len(), 1);
        assert!(set.contains(&int(5)));
        assert!(set.contains(&int(10)));
        assert!(!set.contains(&int(11)));

        // (1..5) and (5..10) leave 5 uncovered.
        let mut set = RangeSet::empty();
        set.add(Range::new(Bound::Excluded(int(1)), Bound::Excluded(int(5))));
        set.add(Range::new(Bound::Excluded(int(5)), Bound::Excluded(int(10))));
        assert_eq!(set.ranges().len(), 2);
        assert!(!set.contains(&int(5)));
    }

    #[test]
    fn test_range_set_complement() {
        let set = RangeSet::single(Range::point(int(5)));
        let complement = set.complement();
        assert_eq!(complement.ranges().len(), 2);
        assert!(complement.contains(&int(4)));
        assert!(!complement.contains(&int(5)));
        assert!(set.is_points());
        assert!(complement.is_complemented_points());
        assert_eq!(set.complement().complement(), set);

        assert!(RangeSet::empty().complement().is_all());
        assert!(RangeSet::all().complement().is_empty());
    }

    #[test]
    fn test_range_set_intersect() {
        let mut set = RangeSet::empty();
        set.add(Range::less_than(int(10)));
        let narrowed = set.intersect_range(&Range::at_least(int(5)));
        assert_eq!(narrowed.ranges().len(), 1);
        assert!(narrowed.contains(&int(5)));
        assert!(narrowed.contains(&int(9)));
        assert!(!narrowed.contains(&int(10)));

        let empty = set.intersect_range(&Range::at_least(int(10)));
        assert!(empty.is_empty());

        let minus = set.minus_range(&Range::point(int(5)));
        assert!(!minus.contains(&int(5)));
        assert!(minus.contains(&int(4)));
    }

    #[test]
    fn test_sarg_negate_and_complexity() {
        let eq5 = Sarg::of(UnknownAs::Unknown, RangeSet::single(Range::point(int(5))));
        assert_eq!(eq5.complexity(), 1);
        assert!(eq5.is_simple());
        let ne5 = eq5.negate();
        assert_eq!(ne5.null_as, UnknownAs::Unknown);
        assert!(ne5.is_complemented_points());
        assert_eq!(ne5.complexity(), 1);
        assert_eq!(ne5.negate(), eq5);

        let with_null = Sarg::of(UnknownAs::True, RangeSet::single(Range::point(int(5))));
        assert_eq!(with_null.complexity(), 2);

        assert_eq!(eq5.matches(&int(5)), Datum::True);
        assert_eq!(eq5.matches(&int(6)), Datum::False);
        assert_eq!(eq5.matches(&Datum::Null), Datum::Null);
        assert_eq!(with_null.matches(&Datum::Null), Datum::True);
    }

    #[test]
    fn test_unknown_as_lattice() {
        use UnknownAs::*;
        assert_eq!(False.or(Unknown), Unknown);
        assert_eq!(Unknown.or(True), True);
        assert_eq!(False.or(False), False);
        assert_eq!(True.negate(), False);
        assert_eq!(Unknown.negate(), Unknown);
        assert_eq!(True.to_bool(), Some(true));
        assert_eq!(Unknown.to_bool(), None);
    }

    mod collector {
        use proptest::prelude::*;

        use super::*;
        use crate::scalar::func::BinaryFunc;
        use crate::simplify::{compose_conjunction, compose_disjunction};
        use crate::ScalarExpr;
        use tern_repr::{Datum, ScalarType};

        proptest! {
            // Collecting comparisons on a shared reference and expanding
            // them back preserves their three-valued AND (in negate mode)
            // or OR on every input, including NULL.
            #[test]
            fn test_collector_round_trip(
                comparisons in prop::collection::vec(
                    (
                        prop_oneof![
                            Just(BinaryFunc::Eq),
                            Just(BinaryFunc::NotEq),
                            Just(BinaryFunc::Lt),
                            Just(BinaryFunc::Lte),
                            Just(BinaryFunc::Gt),
                            Just(BinaryFunc::Gte),
                        ],
                        0..5i64,
                    ),
                    1..5,
                ),
                negate in proptest::bool::ANY,
            ) {
                let terms: Vec<ScalarExpr> = comparisons
                    .iter()
                    .map(|(func, value)| {
                        ScalarExpr::column(0).call_binary(
                            ScalarExpr::literal_ok(Datum::Int64(*value), ScalarType::Int64),
                            *func,
                        )
                    })
                    .collect();
                let mut collector = SargCollector::new(negate);
                let mut sarg_terms = Vec::new();
                for term in &terms {
                    collector.accept(term.clone(), &mut sarg_terms);
                }
                let fixed: Vec<ScalarExpr> = if collector.need_to_fix() {
                    sarg_terms
                        .into_iter()
                        .map(|term| collector.fix(term, UnknownAs::Unknown))
                        .collect()
                } else {
                    terms.clone()
                };
                let compose: fn(Vec<ScalarExpr>) -> ScalarExpr = if negate {
                    compose_conjunction
                } else {
                    compose_disjunction
                };
                let original = compose(terms);
                let rewritten = compose(fixed);
                let mut samples: Vec<Datum> = (-1..=5).map(Datum::Int64).collect();
                samples.push(Datum::Null);
                for sample in samples {
                    let row = vec![sample];
                    prop_assert_eq!(
                        original.eval(&row),
                        rewritten.eval(&row),
                        "on input {:?}: {} vs {}",
                        row,
                        &original,
                        &rewritten
                    );
                }
            }
        }
    }
}
