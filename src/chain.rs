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

//! Chain formulas: CNF with a prescribed number of models

use std::convert::TryFrom;
use varisat_formula::Lit;

/// Returns clauses over `vars` with exactly `num_solutions` models on these variables.
///
/// `vars[i]` stands for bit `i` of `num_solutions`. Literals can be negative: the model count
/// does not change, but the models do.
///
/// # Panics
///
/// when `num_solutions > 2^vars.len()`, or when `num_solutions == 0` and `vars` is empty.
///
/// # Example
/// ```
/// use deweight::chain::chain_formula;
/// use varisat_formula::Lit;
///
/// let vars: Vec<Lit> = (1..=3).map(Lit::from_dimacs).collect();
/// // 5 = 0b101
/// let expected: Vec<Vec<Lit>> = vec![
///     vec![Lit::from_dimacs(1), Lit::from_dimacs(3)],
///     vec![Lit::from_dimacs(2), Lit::from_dimacs(3)],
/// ];
/// assert_eq!(chain_formula(&vars, 5), expected);
/// assert!(chain_formula(&vars, 8).is_empty());
/// ```
pub fn chain_formula(vars: &[Lit], num_solutions: u128) -> Vec<Vec<Lit>> {
    if num_solutions == 0 {
        assert!(
            !vars.is_empty(),
            "cannot build an unsatisfiable chain formula without variables"
        );
        return vec![vec![vars[0]], vec![!vars[0]]];
    }

    // None when 2^n does not fit
    let all = u32::try_from(vars.len())
        .ok()
        .and_then(|n| 1u128.checked_shl(n));
    match all {
        Some(all) if num_solutions == all => return Vec::new(),
        Some(all) => assert!(
            num_solutions < all,
            "unable to form {} solutions with {} variables",
            num_solutions,
            vars.len()
        ),
        None => {}
    }

    let bit_set = |bit: usize| {
        u32::try_from(bit)
            .ok()
            .and_then(|b| num_solutions.checked_shr(b))
            .map_or(false, |x| x & 1 == 1)
    };

    // variables below the lowest 1 bit are unconstrained
    let lowest = num_solutions.trailing_zeros() as usize;
    let mut clauses = vec![vec![vars[lowest]]];
    for (bit, &var) in vars.iter().enumerate().skip(lowest + 1) {
        if bit_set(bit) {
            for clause in clauses.iter_mut() {
                clause.push(var);
            }
        } else {
            clauses.push(vec![var]);
        }
    }
    clauses
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cnf::brute_force_model_count;
    use num_bigint::BigUint;
    use varisat_formula::{CnfFormula, ExtendFormula, Var};

    fn count(n: usize, clauses: &[Vec<Lit>]) -> BigUint {
        let mut f = CnfFormula::new();
        f.set_var_count(n);
        for clause in clauses {
            f.add_clause(clause);
        }
        brute_force_model_count(&f, None).unwrap()
    }

    #[test]
    fn exact_model_count() {
        for n in 0..=6usize {
            let vars: Vec<Lit> = (0..n)
                .map(|i| Lit::from_var(Var::from_index(i), true))
                .collect();
            for k in 0..=(1u128 << n) {
                if k == 0 && n == 0 {
                    continue;
                }
                let clauses = chain_formula(&vars, k);
                assert_eq!(count(n, &clauses), BigUint::from(k), "n={} k={}", n, k);
                // no variable outside of vars
                for clause in &clauses {
                    for lit in clause {
                        assert!(vars.iter().any(|v| v.var() == lit.var()));
                    }
                }
            }
        }
    }

    #[test]
    fn negated_variables() {
        let n = 5;
        let vars: Vec<Lit> = (0..n)
            .map(|i| Lit::from_var(Var::from_index(i), false))
            .collect();
        for k in 0..=(1u128 << n) {
            let clauses = chain_formula(&vars, k);
            assert_eq!(count(n, &clauses), BigUint::from(k), "k={}", k);
        }
    }

    #[test]
    fn clause_count() {
        let n = 6;
        let vars: Vec<Lit> = (1..=n as isize).map(Lit::from_dimacs).collect();
        for k in 1..(1u128 << n) {
            let lowest = k.trailing_zeros() as usize;
            let zeros_above = (lowest + 1..n).filter(|&b| (k >> b) & 1 == 0).count();
            assert_eq!(chain_formula(&vars, k).len(), 1 + zeros_above, "k={}", k);
        }
        assert_eq!(
            chain_formula(&vars[..1], 0),
            vec![vec![vars[0]], vec![!vars[0]]]
        );
    }

    #[test]
    fn many_variables() {
        let vars: Vec<Lit> = (1..=200).map(Lit::from_dimacs).collect();
        let clauses = chain_formula(&vars, 1);
        // variables above bit 0 are all forced
        assert_eq!(clauses.len(), 200);
        assert!(clauses.iter().all(|c| c.len() == 1));
    }

    #[test]
    #[should_panic]
    fn too_many_solutions() {
        let vars: Vec<Lit> = (1..=2).map(Lit::from_dimacs).collect();
        chain_formula(&vars, 5);
    }
}
