/**************************************************************************/
/*  This file is part of DEWEIGHT.                                        */
/*                                                                        */
/*  Copyright (C) 2025                                                    */
/*    CEA (Commissariat à l'énergie atomique et aux énergies              */
/*         alternatives)                                                  */
/*                                                                        */
/*  you can redistribute it and/or modify it under the terms of the GNU   */
/*  Lesser General Public License as published by the Free Software       */
/*  Foundation, version 2.1.                                              */
/*                                                                        */
/*  It is distributed in the hope that it will be useful,                 */
/*  but WITHOUT ANY WARRANTY; without even the implied warranty of        */
/*  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the         */
/*  GNU Lesser General Public License for more details.                   */
/*                                                                        */
/*  See the GNU Lesser General Public License version 2.1                 */
/*  for more details (enclosed in the file licenses/LGPLv2.1).            */
/*                                                                        */
/**************************************************************************/

//! Reductions from weighted to unweighted model counting
//!
//! Both reductions add auxiliary variables and clauses so that each assignment of a weighted
//! variable `x` has as many extensions to the auxiliary variables as the numerator of the
//! weight of the corresponding literal. The weighted model count of the original formula is then
//! the unweighted model count of the new formula divided by the returned denominator.

use crate::chain::chain_formula;
use crate::formula::Formula;
use crate::rational::{gcd, Rational, RoundingStrategy};
use num_bigint::BigUint;
use num_rational::BigRational;
use num_traits::{One, Zero};
use serde::Serialize;
use tracing::{debug, warn};
use varisat_formula::{Lit, Var};

/// Largest number of bits per weight supported by the dyadic reduction.
pub const MAX_DYADIC_BITS: u32 = 62;

/// Allocates `n` variables, added to the independent support if the formula has one.
fn add_auxiliary_variables(formula: &mut Formula, n: u32) -> Vec<Var> {
    let in_support = formula.has_independent_support();
    (0..n)
        .map(|_| {
            let var = formula.add_variable();
            if in_support {
                formula.add_independent_support(var);
            }
            var
        })
        .collect()
}

/// Adds the chain formula for `count` over `aux`, only binding when `guard` is false.
fn add_guarded_chain(formula: &mut Formula, guard: Lit, aux: &[Lit], count: u128) {
    for mut clause in chain_formula(aux, count) {
        clause.insert(0, guard);
        formula.add_clause(clause);
    }
}

/// Removes all weights from the formula, exactly.
///
/// Returns the denominator `d` such that the weighted model count of the formula before the call
/// is the unweighted model count after the call divided by `d`. Variables with invalid or
/// negative weights are left as they are, with a warning.
pub fn reduce(formula: &mut Formula) -> BigUint {
    let mut net_denom = BigUint::one();
    for var in formula.free_variables() {
        let variable = var.to_dimacs();
        let x = Lit::from_var(var, true);
        let pos = formula.weight(x);
        let neg = formula.weight(!x);
        if !pos.is_valid() || !neg.is_valid() {
            warn!(variable, "skipping variable with invalid weight");
            continue;
        }

        let (mut pos_count, mut neg_count, mut denom) = if pos.denom() == neg.denom() {
            (pos.num() as i128, neg.num() as i128, pos.denom() as i128)
        } else {
            (
                pos.num() as i128 * neg.denom() as i128,
                neg.num() as i128 * pos.denom() as i128,
                pos.denom() as i128 * neg.denom() as i128,
            )
        };
        // not 0 because denom is not
        let divisor = gcd(gcd(pos_count, neg_count), denom);
        pos_count /= divisor;
        neg_count /= divisor;
        denom /= divisor;
        if denom < 0 {
            pos_count = -pos_count;
            neg_count = -neg_count;
            denom = -denom;
        }
        if pos_count < 0 || neg_count < 0 {
            warn!(variable, %pos, %neg, "skipping variable with negative weight");
            continue;
        }
        if (pos_count, neg_count, denom) == (1, 1, 1) {
            continue;
        }

        let (pos_count, neg_count) = (pos_count as u128, neg_count as u128);
        // smallest m such that 2^m > max(pos_count, neg_count)
        let bits = 128 - pos_count.max(neg_count).leading_zeros();
        let aux: Vec<Lit> = add_auxiliary_variables(formula, bits)
            .into_iter()
            .map(|v| Lit::from_var(v, true))
            .collect();
        if pos_count == 0 {
            formula.add_clause(vec![!x]);
        } else {
            add_guarded_chain(formula, !x, &aux, pos_count);
        }
        if neg_count == 0 {
            formula.add_clause(vec![x]);
        } else {
            add_guarded_chain(formula, x, &aux, neg_count);
        }
        debug!(variable, %pos, %neg, auxiliary = bits, "removed weight");
        net_denom *= BigUint::from(denom as u128);
    }
    net_denom
}

/// A weight rounded by the dyadic reduction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Adjustment {
    /// the variable, in dimacs numbering
    pub variable: isize,
    /// weight of the positive literal in the input
    pub original: Rational,
    /// what it was rounded to
    pub approximation: Rational,
}

/// Result of the dyadic reduction
#[derive(Debug, Clone)]
pub struct DyadicReduction {
    /// the unweighted model count divided by this is the approximate weighted model count
    pub denominator: BigUint,
    /// every rounding, in the order of the variables
    pub adjustments: Vec<Adjustment>,
}

impl DyadicReduction {
    /// Returns `(lower, upper)` such that the weighted model count of the original formula is
    /// between `lower * count / denominator` and `upper * count / denominator`.
    pub fn approximation_bounds(&self) -> (BigRational, BigRational) {
        let one = BigRational::one();
        let mut lower = one.clone();
        let mut upper = one.clone();
        for adjustment in &self.adjustments {
            let (real, approx) = match (
                adjustment.original.to_big(),
                adjustment.approximation.to_big(),
            ) {
                (Some(real), Some(approx)) => (real, approx),
                _ => continue,
            };
            // rounding never reaches 0 or 1 from a different weight
            if real == approx || approx.is_zero() || approx == one {
                continue;
            }
            let positive = &real / &approx;
            let negative = (&one - &real) / (&one - &approx);
            if approx < real {
                upper *= positive;
                lower *= negative;
            } else {
                lower *= positive;
                upper *= negative;
            }
        }
        (lower, upper)
    }
}

/// Removes all weights from the formula, after rounding them to multiples of
/// `2^-bits_per_var`.
///
/// Only probabilistic weights (`w(x) + w(-x) == 1`) are rounded and removed, others are left
/// as they are with a warning. Variables without weights count twice in the denominator.
pub fn reduce_dyadic(
    formula: &mut Formula,
    bits_per_var: u32,
    rounding: RoundingStrategy,
) -> anyhow::Result<DyadicReduction> {
    anyhow::ensure!(
        (1..=MAX_DYADIC_BITS).contains(&bits_per_var),
        "bits per weight must be between 1 and {}, not {}",
        MAX_DYADIC_BITS,
        bits_per_var
    );
    let new_denom = 1i64 << bits_per_var;
    let mut res = DyadicReduction {
        denominator: BigUint::one(),
        adjustments: Vec::new(),
    };
    for var in formula.free_variables() {
        let variable = var.to_dimacs();
        let x = Lit::from_var(var, true);
        let pos = formula.weight(x).simplify();
        let neg = formula.weight(!x).simplify();

        if pos == Rational::ONE && neg == Rational::ONE {
            res.denominator *= 2u32;
            continue;
        }
        if pos.denom() <= 0 || neg.denom() <= 0 {
            warn!(variable, "skipping variable with invalid weight");
            continue;
        }
        if pos.denom() != neg.denom() || pos.num().checked_add(neg.num()) != Some(pos.denom()) {
            warn!(variable, %pos, %neg, "skipping variable with non-probabilistic weights");
            continue;
        }
        if pos.num() < 0 || neg.num() < 0 {
            warn!(variable, %pos, %neg, "skipping variable with negative weight");
            continue;
        }

        let approx = pos.round(new_denom, rounding).simplify();
        if !approx.is_valid() {
            warn!(variable, %pos, "unable to round weight");
            continue;
        }
        formula.add_comment(format!("adjust w {} {} to {}", variable, pos, approx));
        res.adjustments.push(Adjustment {
            variable,
            original: pos,
            approximation: approx,
        });

        if approx == Rational::HALF {
            res.denominator *= 2u32;
            continue;
        }
        if approx.num() == 0 {
            formula.add_clause(vec![!x]);
            continue;
        }
        if approx.num() == approx.denom() {
            formula.add_clause(vec![x]);
            continue;
        }

        // smallest b such that 2^b >= approx.denom
        let bits = 64 - (approx.denom() as u64 - 1).leading_zeros();
        let positive: Vec<Lit> = add_auxiliary_variables(formula, bits)
            .into_iter()
            .map(|v| Lit::from_var(v, true))
            .collect();
        add_guarded_chain(formula, !x, &positive, approx.num() as u128);
        // the negative branch counts from the other end
        let negative: Vec<Lit> = positive.iter().map(|&l| !l).collect();
        add_guarded_chain(formula, x, &negative, approx.complement().num() as u128);
        debug!(variable, %pos, %approx, auxiliary = bits, "removed weight");
        res.denominator *= BigUint::from(approx.denom() as u64);
    }
    Ok(res)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cnf::{brute_force_model_count, check_exact_reduction};
    use crate::formula::WeightFormat;
    use rand::{Rng, SeedableRng};
    use std::fmt::Write;

    fn parse(text: &str) -> Formula {
        Formula::parse(text.as_bytes(), WeightFormat::Detect)
    }

    fn clauses(formula: &Formula) -> Vec<Vec<isize>> {
        formula
            .to_cnf()
            .unwrap()
            .iter()
            .map(|clause| clause.iter().map(|l| l.to_dimacs()).collect())
            .collect()
    }

    fn written(formula: &Formula) -> String {
        let mut buf = Vec::new();
        formula.write(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn ratio(num: i64, denom: i64) -> BigRational {
        BigRational::new(num.into(), denom.into())
    }

    #[test]
    fn half_half_is_not_special_cased() -> anyhow::Result<()> {
        let original = parse("p cnf 1 0\nw 1 1/2\nw -1 1/2\n");
        let mut f = original.clone();
        let denom = reduce(&mut f);
        assert_eq!(denom, BigUint::from(2u32));
        assert_eq!(f.num_variables(), 2);
        assert_eq!(clauses(&f), vec![vec![-1, 2], vec![1, 2]]);
        check_exact_reduction(&original, &f, &denom)
    }

    #[test]
    fn unweighted_formula_is_unchanged() {
        let mut f = parse("p cnf 3 2\n1 2 0\n-1 3 0\n");
        let before = written(&f);
        assert_eq!(reduce(&mut f), BigUint::one());
        assert_eq!(f.num_clauses(), 2);
        assert_eq!(f.num_variables(), 3);
        assert_eq!(written(&f), before);
    }

    #[test]
    fn zero_weight() -> anyhow::Result<()> {
        let original = parse("p cnf 2 1\n1 2 0\nw 1 0\nw -1 1\n");
        let mut f = original.clone();
        let denom = reduce(&mut f);
        assert_eq!(denom, BigUint::one());
        assert_eq!(clauses(&f), vec![vec![1, 2], vec![-1], vec![1, 3]]);
        check_exact_reduction(&original, &f, &denom)
    }

    #[test]
    fn different_denominators() -> anyhow::Result<()> {
        let original = parse("p cnf 2 1\n-1 -2 0\nw 1 1/2\nw -1 1/3\nw 2 2/2\nw -2 3/3\n");
        let mut f = original.clone();
        let denom = reduce(&mut f);
        // (3, 2, 6) and (1, 1, 1)
        assert_eq!(denom, BigUint::from(6u32));
        assert_eq!(f.num_variables(), 2 + 2);
        check_exact_reduction(&original, &f, &denom)
    }

    #[test]
    fn negative_weight_leaves_variable_unweighted() {
        // documented limitation: the variable keeps its weight, and the result is not exact
        let mut f = parse("p cnf 2 1\n1 2 0\n");
        f.set_weight(Lit::from_dimacs(1), Rational::new(-1, 2));
        f.set_weight(Lit::from_dimacs(-1), Rational::new(3, 2));
        let mut g = f.clone();
        assert_eq!(reduce(&mut f), BigUint::one());
        assert_eq!(f.num_variables(), 2);
        assert_eq!(f.num_clauses(), 1);

        let dyadic = reduce_dyadic(&mut g, 4, RoundingStrategy::Down).unwrap();
        assert_eq!(dyadic.denominator, BigUint::from(2u32));
        assert!(dyadic.adjustments.is_empty());
        assert_eq!(g.num_variables(), 2);
    }

    #[test]
    fn invalid_weight_is_skipped() {
        let mut f = parse("p cnf 2 1\n1 2 0\nw 1 1/0\nw 2 1/2\nw -2 1/3\n");
        assert_eq!(reduce(&mut f), BigUint::from(6u32));
    }

    #[test]
    fn independent_support() -> anyhow::Result<()> {
        let original = parse("p cnf 3 1\nc ind 1 2 0\n1 2 3 0\nw 1 1/3\n");
        let mut f = original.clone();
        let denom = reduce(&mut f);
        // cachet gives 1/2 to variable 2
        assert_eq!(denom, BigUint::from(6u32));
        let support: Vec<isize> = f.independent_support().iter().map(|v| v.to_dimacs()).collect();
        assert_eq!(support, vec![1, 2, 4, 5, 6]);
        check_exact_reduction(&original, &f, &denom)
    }

    #[test]
    fn repeated_support_variable() -> anyhow::Result<()> {
        let original = parse(
            "p cnf 2 1\nc ind 1 2 0\nc ind 1 0\n1 2 0\nw 1 1/3\nw -1 2/3\nw 2 1/2\nw -2 1/2\n",
        );
        let mut f = original.clone();
        let denom = reduce(&mut f);
        // (1, 2, 3) and (1, 1, 2), once each
        assert_eq!(denom, BigUint::from(6u32));
        let support: Vec<isize> = f.independent_support().iter().map(|v| v.to_dimacs()).collect();
        assert_eq!(support, vec![1, 2, 3, 4, 5]);
        check_exact_reduction(&original, &f, &denom)
    }

    #[test]
    fn dyadic_independent_support() -> anyhow::Result<()> {
        let original = parse("p cnf 3 1\nc ind 1 2 0\n1 2 3 0\nw 1 0.25\nw 3 0.75\n");
        let mut f = original.clone();
        let res = reduce_dyadic(&mut f, 2, RoundingStrategy::Down)?;
        // 1/4 needs 2 auxiliary variables, cachet gives 1/2 to variable 2, 3 is not in the support
        assert_eq!(res.denominator, BigUint::from(8u32));
        assert_eq!(res.adjustments.len(), 2);
        assert!(res.adjustments.iter().all(|a| a.variable != 3));
        let support: Vec<isize> = f.independent_support().iter().map(|v| v.to_dimacs()).collect();
        assert_eq!(support, vec![1, 2, 4, 5]);
        assert_eq!(f.num_variables(), 5);
        // every weight is dyadic already, so the reduction is exact
        check_exact_reduction(&original, &f, &res.denominator)
    }

    #[test]
    fn random_weights() -> anyhow::Result<()> {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x5eed);
        for _ in 0..30 {
            let mut text = String::from("p cnf 3 2\n");
            for _ in 0..2 {
                for _ in 0..2 {
                    let var: i64 = rng.gen_range(1..=3);
                    let sign = if rng.gen() { 1 } else { -1 };
                    write!(text, "{} ", sign * var)?;
                }
                text.push_str("0\n");
            }
            for lit in &[1, -1, 2, -2, 3, -3] {
                let num: i64 = rng.gen_range(0..=3);
                let denom: i64 = rng.gen_range(1..=4);
                writeln!(text, "w {} {}/{}", lit, num, denom)?;
            }
            let original = parse(&text);
            assert_eq!(original.weight_format(), WeightFormat::Mc20);
            let mut f = original.clone();
            let denom = reduce(&mut f);
            check_exact_reduction(&original, &f, &denom)
                .map_err(|e| e.context(format!("formula:\n{}", text)))?;
        }
        Ok(())
    }

    #[test]
    fn dyadic() -> anyhow::Result<()> {
        let original = parse("p cnf 2 1\n1 2 0\nw 1 0.25\nw 2 0.5\n");
        let mut f = original.clone();
        let res = reduce_dyadic(&mut f, 2, RoundingStrategy::Down)?;
        assert_eq!(res.denominator, BigUint::from(8u32));
        assert_eq!(f.num_variables(), 4);
        assert_eq!(res.adjustments.len(), 2);
        assert_eq!(
            res.adjustments[0],
            Adjustment {
                variable: 1,
                original: Rational::new(1, 4),
                approximation: Rational::new(1, 4)
            }
        );
        // 1 - 3/4 * 1/2 = 5/8
        let count = brute_force_model_count(&f.to_cnf()?, None)?;
        assert_eq!(count, BigUint::from(5u32));
        assert_eq!(res.approximation_bounds(), (ratio(1, 1), ratio(1, 1)));
        assert!(written(&f).contains("c adjust w 1 1/4 to 1/4\n"));
        Ok(())
    }

    #[test]
    fn dyadic_unweighted() -> anyhow::Result<()> {
        let mut f = parse("p cnf 2 1\n1 2 0\n");
        let res = reduce_dyadic(&mut f, 8, RoundingStrategy::Near)?;
        assert_eq!(res.denominator, BigUint::from(4u32));
        assert!(res.adjustments.is_empty());
        assert_eq!(f.num_variables(), 2);
        Ok(())
    }

    #[test]
    fn dyadic_rounds_to_half() -> anyhow::Result<()> {
        let mut f = parse("p cnf 1 0\nw 1 0.3\n");
        let res = reduce_dyadic(&mut f, 1, RoundingStrategy::Up)?;
        assert_eq!(res.denominator, BigUint::from(2u32));
        assert_eq!(f.num_variables(), 1);
        assert_eq!(res.adjustments[0].approximation, Rational::HALF);
        Ok(())
    }

    #[test]
    fn dyadic_bounds() -> anyhow::Result<()> {
        let mut f = parse("p cnf 1 0\nw 1 0.3\n");
        let res = reduce_dyadic(&mut f, 2, RoundingStrategy::Down)?;
        assert_eq!(res.denominator, BigUint::from(4u32));
        assert_eq!(res.adjustments[0].approximation, Rational::new(1, 4));
        assert_eq!(res.approximation_bounds(), (ratio(14, 15), ratio(6, 5)));
        // one model for x, three for -x
        assert_eq!(brute_force_model_count(&f.to_cnf()?, None)?, BigUint::from(4u32));

        let mut g = parse("p cnf 1 0\nw 1 0.3\n");
        let res = reduce_dyadic(&mut g, 1, RoundingStrategy::Up)?;
        // 0.3 -> 0.5
        assert_eq!(res.approximation_bounds(), (ratio(3, 5), ratio(7, 5)));
        Ok(())
    }

    #[test]
    fn dyadic_zero_weight() -> anyhow::Result<()> {
        let mut f = parse("p cnf 1 0\nw 1 0\nw -1 1\n");
        let res = reduce_dyadic(&mut f, 3, RoundingStrategy::Up)?;
        assert_eq!(res.denominator, BigUint::one());
        assert_eq!(f.num_variables(), 1);
        assert_eq!(clauses(&f), vec![vec![-1]]);
        Ok(())
    }

    #[test]
    fn dyadic_non_probabilistic() -> anyhow::Result<()> {
        let mut f = parse("p cnf 1 0\nw 1 1/3\nw -1 1/3\n");
        let res = reduce_dyadic(&mut f, 3, RoundingStrategy::Down)?;
        assert_eq!(res.denominator, BigUint::one());
        assert!(res.adjustments.is_empty());
        assert_eq!(f.num_clauses(), 0);
        Ok(())
    }

    #[test]
    fn dyadic_bits_range() {
        let f = parse("p cnf 1 0\nw 1 0.3\n");
        assert!(reduce_dyadic(&mut f.clone(), 0, RoundingStrategy::Down).is_err());
        assert!(reduce_dyadic(&mut f.clone(), 63, RoundingStrategy::Down).is_err());
        assert!(reduce_dyadic(&mut f.clone(), 62, RoundingStrategy::Down).is_ok());
    }
}
