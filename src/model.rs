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

//! A type for an assignment of all variables
use fixedbitset::FixedBitSet;
use varisat_formula::{CnfFormula, Lit, Var};

#[derive(Clone, PartialOrd, Ord, PartialEq, Eq)]
/// Represents a model by the set of true variables
pub struct Model(pub FixedBitSet);

impl std::fmt::Debug for Model {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.debug_set()
            .entries(self.0.ones().map(|i| Var::from_index(i).to_dimacs()))
            .finish()
    }
}

impl Model {
    /// creates a model for a formula of `nvars` variables with all variables false
    pub fn empty(nvars: usize) -> Model {
        Self(FixedBitSet::with_capacity(nvars))
    }

    /// number of variables for the whole formula
    pub fn nvars(&self) -> usize {
        self.0.len()
    }

    /// value of the variable
    pub fn var(&self, var: Var) -> bool {
        self.0[var.index()]
    }

    /// whether the literal is true in this model
    pub fn lit(&self, lit: Lit) -> bool {
        self.var(lit.var()) ^ lit.is_negative()
    }

    /// set the specified variable to the specified value
    pub fn set(&mut self, var: Var, value: bool) {
        self.0.set(var.index(), value)
    }

    /// returns the first model to iterate over all possible models with `next_model`
    pub fn first_model(nvars: usize) -> Model {
        Model::empty(nvars)
    }

    /// modifies a model in place to get to the next one, returns wether there are further models
    ///
    /// Models are enumerated as binary numbers, variable 1 being the least significant bit.
    /// # Example
    /// ```
    /// use deweight::model::Model;
    /// let mut model = Model::first_model(2);
    /// let mut count = 1;
    /// while model.next_model() {
    ///     count += 1;
    /// }
    /// assert_eq!(count, 4);
    /// assert_eq!(model, Model::empty(2));
    /// ```
    pub fn next_model(&mut self) -> bool {
        for i in 0..self.0.len() {
            if self.0[i] {
                self.0.set(i, false);
            } else {
                self.0.set(i, true);
                return true;
            }
        }
        false
    }

    /// Checks wether the model satisfies a formula.
    pub fn satisfies(&self, formula: &CnfFormula) -> bool {
        formula
            .iter()
            .all(|clause| clause.iter().any(|&lit| self.lit(lit)))
    }

    /// Only keeps the variables in `projection`, the others become false.
    #[must_use]
    pub fn restrict(&self, projection: &FixedBitSet) -> Model {
        let mut res = self.clone();
        res.0.intersect_with(projection);
        res
    }
}

#[test]
fn test_satisfies() -> anyhow::Result<()> {
    let f = b"p cnf 3 3
-1 3 -2 0
-2 1 3 0
3 -1 -2 0
";
    let formula = varisat_dimacs::DimacsParser::parse(f as &[u8])?;
    let mut model = Model::empty(3);
    assert!(model.satisfies(&formula));
    model.set(Var::from_dimacs(1), true);
    model.set(Var::from_dimacs(2), true);
    assert!(!model.satisfies(&formula));
    assert!(model.lit(Lit::from_dimacs(2)));
    assert!(model.lit(Lit::from_dimacs(-3)));
    Ok(())
}

#[test]
fn test_restrict() {
    let mut model = Model::empty(3);
    model.set(Var::from_dimacs(1), true);
    model.set(Var::from_dimacs(3), true);
    let mut projection = FixedBitSet::with_capacity(3);
    projection.insert(2);
    let restricted = model.restrict(&projection);
    assert!(!restricted.var(Var::from_dimacs(1)));
    assert!(restricted.var(Var::from_dimacs(3)));
    assert_eq!(restricted.nvars(), 3);
}

#[test]
fn test_next_model() {
    let mut m = Model::first_model(3);
    let mut seen = vec![m.clone()];
    while m.next_model() {
        seen.push(m.clone());
    }
    assert_eq!(seen.len(), 8);
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 8);
    let mut empty = Model::first_model(0);
    assert!(!empty.next_model());
}
