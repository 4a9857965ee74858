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

#![warn(missing_docs)]

//! Reduction of weighted model counting on CNF formulas to unweighted model counting

pub mod chain;
pub mod cnf;
pub mod formula;
pub mod input;
pub mod model;
pub mod rational;
pub mod reduce;

use anyhow::Context;
use formula::{Formula, WeightFormat};
use num_bigint::{BigInt, BigUint};
use num_rational::BigRational;
use num_traits::ToPrimitive;
use rational::RoundingStrategy;
use reduce::Adjustment;
use serde::{Serialize, Serializer};
use std::cell::RefCell;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::ops::DerefMut;
use std::path::PathBuf;
use std::time::Instant;
use structopt::clap::arg_enum;
use structopt::StructOpt;
use tracing::info;

#[derive(Debug)]
/// Writes the result in json to a file.
pub struct ResultWriter {
    file: RefCell<File>,
    path: PathBuf,
}

impl ResultWriter {
    fn write<R: serde::Serialize>(&self, result: &R) -> anyhow::Result<()> {
        serde_json::to_writer_pretty(self.file.borrow_mut().deref_mut(), result)
            .with_context(|| format!("writing result to {}", self.path.display()))
    }
}

impl From<&std::ffi::OsStr> for ResultWriter {
    fn from(path: &std::ffi::OsStr) -> ResultWriter {
        let path: PathBuf = path.into();
        let file = match File::create(&path) {
            Ok(f) => RefCell::new(f),
            Err(e) => {
                tracing::error!(
                    "failed to open {} to write results (--json option): {}",
                    path.display(),
                    e
                );
                std::process::exit(1);
            }
        };
        ResultWriter { path, file }
    }
}

arg_enum! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    enum RoundingName {
        Up,
        Down,
        Near,
    }
}

arg_enum! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    enum WeightsName {
        Detect,
        Cachet,
        Minic2d,
        Mc20,
    }
}

/// Configuration options
#[derive(Debug, StructOpt)]
#[structopt(
    name = "deweight",
    about = "Reduces weighted model counting to unweighted model counting"
)]
pub struct Opt {
    /// Weighted CNF file, standard input when absent
    #[structopt(parse(from_os_str))]
    input: Option<PathBuf>,

    /// Where to write the unweighted CNF formula, standard output when absent
    #[structopt(short, long, parse(from_os_str))]
    output: Option<PathBuf>,

    /// Use the dyadic reduction with this many bits per weight (1 to 62)
    #[structopt(short, long)]
    dyadic: Option<u32>,

    #[structopt(possible_values = &RoundingName::variants(), case_insensitive = true, default_value = "down", short, long)]
    /// How to round the weight of positive literals in the dyadic reduction.
    ///
    /// Weights are never rounded to 0 or 1.
    rounding: RoundingName,

    #[structopt(possible_values = &WeightsName::variants(), case_insensitive = true, default_value = "detect", short, long)]
    /// Format of the weights in the input
    weights: WeightsName,

    /// JSON output to the specified file
    #[structopt(short, long, parse(from_os_str))]
    json: Option<ResultWriter>,

    /// Check the reduction by enumerating models. Only for tiny formulas.
    #[structopt(long)]
    verify: bool,

    /// Enable debug output
    #[structopt(long)]
    debug: bool,
}

impl Opt {
    fn rounding(&self) -> RoundingStrategy {
        match self.rounding {
            RoundingName::Up => RoundingStrategy::Up,
            RoundingName::Down => RoundingStrategy::Down,
            RoundingName::Near => RoundingStrategy::Near,
        }
    }

    fn weight_format(&self) -> WeightFormat {
        match self.weights {
            WeightsName::Detect => WeightFormat::Detect,
            WeightsName::Cachet => WeightFormat::Cachet,
            WeightsName::Minic2d => WeightFormat::Minic2d,
            WeightsName::Mc20 => WeightFormat::Mc20,
        }
    }
}

fn biguint_to_string<S: Serializer>(n: &BigUint, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&n.to_string())
}

/// What happened during a run
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// the unweighted model count divided by this is the weighted model count
    #[serde(serialize_with = "biguint_to_string")]
    pub denominator: BigUint,
    /// weight format of the input
    pub weight_format: WeightFormat,
    /// number of variables of the unweighted formula
    pub variables: usize,
    /// number of clauses of the unweighted formula
    pub clauses: usize,
    /// roundings of the dyadic reduction
    pub adjustments: Vec<Adjustment>,
    /// lower and upper bounds of the error factor of the dyadic reduction
    pub bounds: Option<(f64, f64)>,
    /// time spent parsing and reducing
    pub time_ms: u64,
}

fn to_f64(r: &BigRational) -> f64 {
    match (r.numer().to_f64(), r.denom().to_f64()) {
        (Some(n), Some(d)) => n / d,
        _ => f64::NAN,
    }
}

/// Reads a weighted formula from `read` and writes the unweighted formula to `write`.
pub fn process<R: Read, W: Write>(opt: &Opt, read: R, mut write: W) -> anyhow::Result<Report> {
    let start_time = Instant::now();
    let mut formula = Formula::parse(read, opt.weight_format());
    anyhow::ensure!(formula.num_variables() > 0, "unable to read formula");
    let original = if opt.verify {
        Some(formula.clone())
    } else {
        None
    };

    let (denominator, adjustments, bounds) = match opt.dyadic {
        Some(bits) => {
            let res = reduce::reduce_dyadic(&mut formula, bits, opt.rounding())?;
            let bounds = res.approximation_bounds();
            (res.denominator, res.adjustments, Some(bounds))
        }
        None => (reduce::reduce(&mut formula), Vec::new(), None),
    };
    let elapsed = start_time.elapsed();
    info!(
        %denominator,
        variables = formula.num_variables(),
        clauses = formula.num_clauses(),
        "reduction done in {:?}",
        elapsed
    );

    writeln!(write, "c denom {}", denominator)?;
    if let Some((lower, upper)) = &bounds {
        writeln!(write, "c weight adjustment {} {}", to_f64(lower), to_f64(upper))?;
    }
    writeln!(write, "c deweight time {}", elapsed.as_secs_f64())?;
    formula.write(&mut write).context("writing output formula")?;
    write.flush().context("writing output formula")?;

    if let Some(original) = original {
        match &bounds {
            None => {
                cnf::check_exact_reduction(&original, &formula, &denominator)
                    .context("verifying reduction")?;
                info!("reduction verified");
            }
            Some((lower, upper)) => {
                let count = cnf::brute_force_unweighted_count(&formula)
                    .context("counting models of the reduced formula")?;
                let estimate = BigRational::new(
                    BigInt::from(count),
                    BigInt::from(denominator.clone()),
                );
                info!(
                    %estimate,
                    lower = %(&estimate * lower),
                    upper = %(&estimate * upper),
                    "approximate weighted model count"
                );
            }
        }
    }

    Ok(Report {
        denominator,
        weight_format: formula.weight_format(),
        variables: formula.num_variables(),
        clauses: formula.num_clauses(),
        adjustments,
        bounds: bounds.map(|(lower, upper)| (to_f64(&lower), to_f64(&upper))),
        time_ms: start_time.elapsed().as_millis() as u64,
    })
}

/// Opens input and output files as specified, and runs `process`.
pub fn run_with(opt: &Opt) -> anyhow::Result<Report> {
    let read: Box<dyn Read> = match &opt.input {
        Some(path) => Box::new(
            File::open(path)
                .with_context(|| format!("opening input file {}", path.display()))?,
        ),
        None => Box::new(std::io::stdin()),
    };
    let write: Box<dyn Write> = match &opt.output {
        Some(path) => Box::new(BufWriter::new(File::create(path).with_context(|| {
            format!("opening output file {}", path.display())
        })?)),
        None => Box::new(BufWriter::new(std::io::stdout())),
    };
    let report = process(opt, read, write)?;
    if let Some(writer) = &opt.json {
        writer.write(&report)?;
    }
    Ok(report)
}

fn setup_tracing(opt: &Opt) -> anyhow::Result<()> {
    use tracing::Level;
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::layer::SubscriberExt;
    let min_level = if opt.debug { Level::TRACE } else { Level::INFO };
    // stdout is for the formula
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    let subscriber = tracing_subscriber::Registry::default()
        .with(LevelFilter::from_level(min_level))
        .with(fmt_layer);
    #[cfg(feature = "tracy")]
    let subscriber = subscriber.with(tracing_tracy::TracyLayer::new());
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default tracing collector")?;
    Ok(())
}

/// entrypoint of the binary
pub fn run() -> anyhow::Result<()> {
    let opt = Opt::from_args();
    setup_tracing(&opt)?;
    run_with(&opt)?;
    Ok(())
}
