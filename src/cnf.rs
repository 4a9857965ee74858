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

//! Model counting by enumeration, to check reductions on small formulas

use crate::formula::Formula;
use crate::model::Model;
use anyhow::Context;
use fixedbitset::FixedBitSet;
use num_bigint::{BigInt, BigUint};
use num_rational::BigRational;
use num_traits::{One, Zero};
use std::collections::BTreeSet;
use tracing::debug;
pub use varisat_formula::{CnfFormula, ExtendFormula, Lit, Var};

/// Enumerating models of more variables than this takes too long.
pub const MAX_BRUTE_FORCE_VARS: usize = 30;

/// returns the model count of the formula by testing all models sequentially.
///
/// With a projection, models which only differ outside of it count once.
pub fn brute_force_model_count(
    f: &CnfFormula,
    projection: Option<&FixedBitSet>,
) -> anyhow::Result<BigUint> {
    let nvars = f.var_count();
    anyhow::ensure!(
        nvars <= MAX_BRUTE_FORCE_VARS,
        "refusing to enumerate the models of a formula with {} variables",
        nvars
    );
    if let Some(projection) = projection {
        anyhow::ensure!(
            projection.len() == nvars,
            "projection on {} variables for a formula with {} variables",
            projection.len(),
            nvars
        );
    }
    let mut m = Model::first_model(nvars);
    let mut n = BigUint::zero();
    let mut projected = BTreeSet::new();
    loop {
        if m.satisfies(f) {
            match projection {
                Some(projection) => {
                    projected.insert(m.restrict(projection));
                }
                None => n += 1u32,
            }
        }
        if !m.next_model() {
            break;
        }
    }
    if projection.is_some() {
        n = BigUint::from(projected.len());
    }
    Ok(n)
}

/// The variables of the independent support, or `None` when all variables are free.
fn support_projection(formula: &Formula) -> Option<FixedBitSet> {
    if !formula.has_independent_support() {
        return None;
    }
    let mut projection = FixedBitSet::with_capacity(formula.num_variables());
    for var in formula.independent_support() {
        projection.insert(var.index());
    }
    Some(projection)
}

/// Unweighted model count of the formula, projected on its independent support.
pub fn brute_force_unweighted_count(formula: &Formula) -> anyhow::Result<BigUint> {
    let cnf = formula.to_cnf().context("converting formula for enumeration")?;
    brute_force_model_count(&cnf, support_projection(formula).as_ref())
}

/// Weighted model count of the formula, projected on its independent support.
///
/// The weight of a model is the product of the weights of the literals of the free variables
/// it makes true. Fails on invalid weights.
pub fn brute_force_weighted_count(formula: &Formula) -> anyhow::Result<BigRational> {
    let cnf = formula.to_cnf().context("converting formula for enumeration")?;
    let nvars = cnf.var_count();
    anyhow::ensure!(
        nvars <= MAX_BRUTE_FORCE_VARS,
        "refusing to enumerate the models of a formula with {} variables",
        nvars
    );
    let projection = support_projection(formula).unwrap_or_else(|| {
        let mut all = FixedBitSet::with_capacity(nvars);
        all.insert_range(..);
        all
    });
    let mut weights = Vec::new();
    for index in projection.ones() {
        let var = Var::from_index(index);
        let weight = |polarity| {
            formula
                .weight(Lit::from_var(var, polarity))
                .to_big()
                .with_context(|| format!("invalid weight for variable {}", var.to_dimacs()))
        };
        weights.push((var, weight(true)?, weight(false)?));
    }

    let mut models = BTreeSet::new();
    let mut m = Model::first_model(nvars);
    loop {
        if m.satisfies(&cnf) {
            models.insert(m.restrict(&projection));
        }
        if !m.next_model() {
            break;
        }
    }

    let mut total = BigRational::zero();
    for model in &models {
        let mut product = BigRational::one();
        for (var, pos, neg) in &weights {
            product *= if model.var(*var) { pos.clone() } else { neg.clone() };
        }
        total += product;
    }
    Ok(total)
}

/// Checks that `weighted(original) == count(reduced) / denominator`, projected on the respective
/// independent supports.
pub fn check_exact_reduction(
    original: &Formula,
    reduced: &Formula,
    denominator: &BigUint,
) -> anyhow::Result<()> {
    let weighted =
        brute_force_weighted_count(original).context("counting models of the weighted formula")?;
    let count =
        brute_force_unweighted_count(reduced).context("counting models of the reduced formula")?;
    let from_integer = |n: &BigUint| BigRational::from_integer(BigInt::from(n.clone()));
    debug!(%weighted, %count, %denominator, "brute force counts");
    anyhow::ensure!(
        weighted * from_integer(denominator) == from_integer(&count),
        "reduced formula has {} models, expected {} times the weighted count of the original formula",
        count,
        denominator
    );
    Ok(())
}
