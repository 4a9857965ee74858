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

//! Weighted CNF formulas in DIMACS format

use crate::input::{parse_integer, CharStream};
use crate::rational::Rational;
use anyhow::Context;
use fixedbitset::FixedBitSet;
use itertools::Itertools;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::convert::TryFrom;
use std::fmt::Display;
use std::io::{Read, Write};
use tracing::{info, trace, warn};
use varisat_dimacs::DimacsParser;
use varisat_formula::{CnfFormula, Lit, Var};

/// How weights are written in a DIMACS file.
///
/// `Detect` moves to `CachetOrMc20` on the first `w` line, which becomes `Mc20` on the first
/// weight of a negative literal and `Cachet` on the first weight `-1` or at end of input.
/// `Detect` moves to `Minic2d` on a `c weights` line.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightFormat {
    /// Nothing seen yet
    Detect,
    /// `w <lit> <weight>` for positive literals, the negative literal gets the complement
    Cachet,
    /// `w` lines seen, but nothing to tell cachet and mc20 apart
    CachetOrMc20,
    /// a single `c weights w(1) w(-1) w(2) w(-2) ...` line
    Minic2d,
    /// `w <lit> <weight> 0` for both literals of each variable
    Mc20,
}

impl Display for WeightFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            WeightFormat::Detect => "detect",
            WeightFormat::Cachet => "cachet",
            WeightFormat::CachetOrMc20 => "cachet_or_mc20",
            WeightFormat::Minic2d => "minic2d",
            WeightFormat::Mc20 => "mc20",
        };
        f.write_str(name)
    }
}

/// A line of the body of a formula.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    /// copied from the input
    Raw(String),
    /// added clause
    Clause(Vec<Lit>),
    /// added comment, without the leading `c `
    Comment(String),
}

/// A CNF formula with literal weights.
///
/// Clauses read from the input are kept as text, only clauses added afterwards are structured.
#[derive(Debug, Clone)]
pub struct Formula {
    num_variables: usize,
    num_clauses: usize,
    body: Vec<Line>,
    /// in file order, empty when all variables are free
    independent_support: Vec<Var>,
    /// same variables as `independent_support`, by index
    in_support: FixedBitSet,
    /// missing literals have weight 1
    weights: BTreeMap<Lit, Rational>,
    weight_format: WeightFormat,
}

impl Default for Formula {
    fn default() -> Self {
        Formula {
            num_variables: 0,
            num_clauses: 0,
            body: Vec::new(),
            independent_support: Vec::new(),
            in_support: FixedBitSet::new(),
            weights: BTreeMap::new(),
            weight_format: WeightFormat::Detect,
        }
    }
}

impl Formula {
    /// An empty formula with the specified header.
    pub fn new(num_variables: usize, num_clauses: usize) -> Formula {
        let mut f = Formula::default();
        f.set_header(num_variables, num_clauses);
        f
    }

    /// Parses a DIMACS file with weights in the specified format (or `Detect`).
    ///
    /// Never fails: when the input is malformed, the returned formula has 0 variables and 0
    /// clauses, and must not be used.
    pub fn parse<R: Read>(read: R, format: WeightFormat) -> Formula {
        let mut reader = DimacsReader {
            input: CharStream::new(read),
            format,
            formula: Formula::default(),
        };
        if let Err(e) = reader.run() {
            warn!("unable to parse formula: {:#}", e);
            reader.formula.set_header(0, 0);
        }
        reader.formula.weight_format = reader.format;
        reader.formula
    }

    /// Sets the `p cnf` line.
    pub fn set_header(&mut self, num_variables: usize, num_clauses: usize) {
        self.num_variables = num_variables;
        self.num_clauses = num_clauses;
    }

    /// Number of variables, 0 when parsing failed.
    pub fn num_variables(&self) -> usize {
        self.num_variables
    }

    /// Number of clauses.
    pub fn num_clauses(&self) -> usize {
        self.num_clauses
    }

    /// Weight format detected while parsing.
    pub fn weight_format(&self) -> WeightFormat {
        self.weight_format
    }

    /// Appends a clause.
    pub fn add_clause(&mut self, literals: Vec<Lit>) {
        self.body.push(Line::Clause(literals));
        self.num_clauses += 1;
    }

    /// Appends a comment, `c ` is added in front.
    pub fn add_comment(&mut self, comment: String) {
        self.body.push(Line::Comment(comment));
    }

    /// Creates a fresh variable, without clauses nor weight.
    pub fn add_variable(&mut self) -> Var {
        self.num_variables += 1;
        Var::from_dimacs(self.num_variables as isize)
    }

    /// Weight of the literal, 1 when it was never set.
    pub fn weight(&self, literal: Lit) -> Rational {
        self.weights.get(&literal).copied().unwrap_or(Rational::ONE)
    }

    /// Sets the weight of a literal, unless it already has one.
    pub fn set_weight(&mut self, literal: Lit, weight: Rational) {
        self.weights.entry(literal).or_insert(weight);
    }

    /// Whether this dimacs literal refers to a variable of the formula.
    pub fn is_valid_literal(&self, literal: i64) -> bool {
        literal != 0 && literal.unsigned_abs() <= self.num_variables as u64
    }

    /// Adds a variable at the end of the independent support, unless it is already in it.
    pub fn add_independent_support(&mut self, var: Var) {
        if self.in_support.contains(var.index()) {
            return;
        }
        self.in_support.grow(var.index() + 1);
        self.in_support.insert(var.index());
        self.independent_support.push(var);
    }

    /// false when all variables are free
    pub fn has_independent_support(&self) -> bool {
        !self.independent_support.is_empty()
    }

    /// The independent support, in file order.
    pub fn independent_support(&self) -> &[Var] {
        &self.independent_support
    }

    /// Variables whose weights matter: the independent support, or all variables if there is none.
    pub fn free_variables(&self) -> Vec<Var> {
        if self.has_independent_support() {
            self.independent_support.clone()
        } else {
            (1..=self.num_variables)
                .map(|v| Var::from_dimacs(v as isize))
                .collect()
        }
    }

    /// Writes the formula in unweighted DIMACS format.
    pub fn write<W: Write>(&self, mut out: W) -> std::io::Result<()> {
        writeln!(out, "p cnf {} {}", self.num_variables, self.num_clauses)?;
        if self.has_independent_support() {
            writeln!(
                out,
                "c ind {} 0",
                self.independent_support
                    .iter()
                    .map(|v| v.to_dimacs())
                    .join(" ")
            )?;
        }
        for line in &self.body {
            match line {
                Line::Raw(text) => writeln!(out, "{}", text)?,
                Line::Comment(text) => writeln!(out, "c {}", text)?,
                Line::Clause(literals) => writeln!(
                    out,
                    "{} 0",
                    literals.iter().map(|l| l.to_dimacs()).join(" ")
                )?,
            }
        }
        Ok(())
    }

    /// Converts the formula to a `CnfFormula`, weights and independent support are lost.
    pub fn to_cnf(&self) -> anyhow::Result<CnfFormula> {
        let mut buf = Vec::new();
        self.write(&mut buf)
            .context("writing formula to a buffer")?;
        let mut cnf = DimacsParser::parse(&buf as &[u8]).context("parsing written formula")?;
        cnf.set_var_count(self.num_variables);
        Ok(cnf)
    }
}

/// Parsing state
struct DimacsReader<R: Read> {
    input: CharStream<R>,
    format: WeightFormat,
    formula: Formula,
}

impl<R: Read> DimacsReader<R> {
    /// Reads the whole input. On error, the caller must discard the formula.
    fn run(&mut self) -> anyhow::Result<()> {
        loop {
            self.input.skip_whitespace()?;
            let (line, _) = self.input.position();
            let res = match self.input.peek()? {
                None => {
                    self.finish();
                    return Ok(());
                }
                Some(b'p') => self.header(),
                Some(b'w') => self.weight_line(),
                Some(b'c') => self.comment(),
                Some(_) => self.clause(),
            };
            res.with_context(|| format!("line {}", line))?;
            self.input.skip_line()?;
        }
    }

    /// Clauses are copied as is.
    fn clause(&mut self) -> anyhow::Result<()> {
        let mut text = String::new();
        self.input.append_line(&mut text)?;
        self.formula.body.push(Line::Raw(text));
        Ok(())
    }

    /// `p cnf <vars> <clauses>`
    fn header(&mut self) -> anyhow::Result<()> {
        anyhow::ensure!(self.input.consume(b"p cnf ")?, "malformed header");
        let num_variables = self.input.parse_int()?;
        let num_clauses = self.input.parse_int()?;
        let num_variables = usize::try_from(num_variables)
            .with_context(|| format!("negative variable count {}", num_variables))?;
        let num_clauses = usize::try_from(num_clauses)
            .with_context(|| format!("negative clause count {}", num_clauses))?;
        trace!(num_variables, num_clauses, "read header");
        self.formula.set_header(num_variables, num_clauses);
        Ok(())
    }

    /// Switches to the specified format, and says so.
    fn detected(&mut self, format: WeightFormat) {
        info!("detected weight format: {}", format);
        self.formula
            .add_comment(format!("detected weight format: {}", format));
        self.format = format;
    }

    /// Parses a literal, and checks it is in range.
    fn literal(&self, literal: i64) -> anyhow::Result<Lit> {
        anyhow::ensure!(
            self.formula.is_valid_literal(literal),
            "literal {} is out of range for {} variables",
            literal,
            self.formula.num_variables
        );
        Ok(Lit::from_dimacs(literal as isize))
    }

    /// `w <lit> <weight>`, maybe followed by ` 0`
    fn weight_line(&mut self) -> anyhow::Result<()> {
        anyhow::ensure!(self.input.consume(b"w ")?, "malformed weight line");
        match self.format {
            WeightFormat::Minic2d => anyhow::bail!("w lines are not allowed in minic2d format"),
            WeightFormat::Detect => self.format = WeightFormat::CachetOrMc20,
            WeightFormat::CachetOrMc20 | WeightFormat::Cachet | WeightFormat::Mc20 => {}
        }
        let literal = self.input.parse_int()?;
        let literal = self.literal(literal)?;
        if literal.is_negative() {
            match self.format {
                WeightFormat::Cachet => {
                    anyhow::bail!(
                        "weight of negative literal {} in cachet format",
                        literal.to_dimacs()
                    )
                }
                WeightFormat::CachetOrMc20 => self.detected(WeightFormat::Mc20),
                _ => {}
            }
        }
        let entry = self.input.parse_token()?;
        if entry == "-1" {
            match self.format {
                WeightFormat::CachetOrMc20 | WeightFormat::Cachet => {
                    if self.format == WeightFormat::CachetOrMc20 {
                        self.detected(WeightFormat::Cachet);
                    }
                    // both literals have weight 1
                    self.formula.set_weight(literal, Rational::ONE);
                    self.formula.set_weight(!literal, Rational::ONE);
                }
                _ => anyhow::bail!("weight -1 is not allowed in {} format", self.format),
            }
        } else {
            self.formula.set_weight(literal, Rational::parse(&entry));
        }
        Ok(())
    }

    /// Returns the next word of the current line, or continues on the next lines.
    fn next_word(&mut self, words: &mut VecDeque<String>) -> anyhow::Result<String> {
        match words.pop_front() {
            Some(w) => Ok(w),
            None => self.input.parse_token(),
        }
    }

    /// `c ind ...`, `c weights ...`, or any other comment.
    fn comment(&mut self) -> anyhow::Result<()> {
        anyhow::ensure!(self.input.consume(b"c")?, "malformed comment");
        let mut rest = String::new();
        self.input.append_line(&mut rest)?;
        let separated = rest.starts_with(|c: char| c.is_ascii_whitespace());
        let mut words: VecDeque<String> = rest.split_whitespace().map(str::to_owned).collect();
        let keyword = words.front().cloned();
        match keyword.as_deref() {
            Some("ind") if separated => {
                words.pop_front();
                self.independent_support(&mut words)
            }
            Some("weights")
                if separated
                    && matches!(self.format, WeightFormat::Detect | WeightFormat::Minic2d) =>
            {
                words.pop_front();
                self.minic2d_weights(&mut words)
            }
            _ => {
                self.formula.body.push(Line::Raw(format!("c{}", rest)));
                Ok(())
            }
        }
    }

    /// `<var> ... 0` after `c ind`
    fn independent_support(&mut self, words: &mut VecDeque<String>) -> anyhow::Result<()> {
        loop {
            let word = self.next_word(words)?;
            let var = parse_integer(&word).context("in independent support")?;
            if var == 0 {
                return Ok(());
            }
            anyhow::ensure!(
                var > 0 && self.formula.is_valid_literal(var),
                "variable {} in independent support is out of range for {} variables",
                var,
                self.formula.num_variables
            );
            self.formula
                .add_independent_support(Var::from_dimacs(var as isize));
        }
    }

    /// `w(1) w(-1) w(2) w(-2) ...` after `c weights`
    fn minic2d_weights(&mut self, words: &mut VecDeque<String>) -> anyhow::Result<()> {
        if self.format == WeightFormat::Detect {
            self.detected(WeightFormat::Minic2d);
        }
        for v in 1..=self.formula.num_variables {
            let var = Var::from_dimacs(v as isize);
            let positive = self
                .next_word(words)
                .with_context(|| format!("weight of {}", v))?;
            self.formula
                .set_weight(Lit::from_var(var, true), Rational::parse(&positive));
            let negative = self
                .next_word(words)
                .with_context(|| format!("weight of -{}", v))?;
            self.formula
                .set_weight(Lit::from_var(var, false), Rational::parse(&negative));
        }
        Ok(())
    }

    /// At end of input, fills missing weights for cachet.
    fn finish(&mut self) {
        match self.format {
            WeightFormat::Detect | WeightFormat::Minic2d | WeightFormat::Mc20 => {}
            WeightFormat::CachetOrMc20 | WeightFormat::Cachet => {
                if self.format == WeightFormat::CachetOrMc20 {
                    // only positive literals were weighted
                    self.detected(WeightFormat::Cachet);
                }
                for v in 1..=self.formula.num_variables {
                    let var = Var::from_dimacs(v as isize);
                    match self.formula.weights.get(&Lit::from_var(var, true)).copied() {
                        Some(weight) => {
                            self.formula.set_weight(Lit::from_var(var, false), weight.complement())
                        }
                        None => {
                            self.formula.set_weight(Lit::from_var(var, true), Rational::HALF);
                            self.formula.set_weight(Lit::from_var(var, false), Rational::HALF);
                        }
                    }
                }
            }
        }
    }
}
