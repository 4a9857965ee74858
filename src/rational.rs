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

//! Exact literal weights

use num_bigint::BigInt;
use num_rational::BigRational;
use serde::{Serialize, Serializer};
use std::convert::TryFrom;
use std::fmt::Display;
use std::str::FromStr;

/// How to round a weight to a fixed denominator.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RoundingStrategy {
    /// Round up, but never to 1
    Up,
    /// Round down, but never to 0
    Down,
    /// Round to the closest of `Up` and `Down`, ties going to `Up`
    Near,
}

/// A fraction `num/denom`.
///
/// Fractions are never simplified implicitly: `2/4` and `1/2` are different values for `==`.
/// A denominator of 0 marks a weight that could not be parsed, see `Rational::INVALID`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Rational {
    num: i64,
    denom: i64,
}

impl Rational {
    /// What unparseable weights become.
    pub const INVALID: Rational = Rational { num: 1, denom: 0 };

    /// Weight of a literal without annotation.
    pub const ONE: Rational = Rational { num: 1, denom: 1 };

    /// Weight of both literals of a variable in a probabilistic formula without annotation.
    pub const HALF: Rational = Rational { num: 1, denom: 2 };

    /// Creates `num/denom`, as is.
    pub const fn new(num: i64, denom: i64) -> Rational {
        Rational { num, denom }
    }

    /// numerator
    pub fn num(&self) -> i64 {
        self.num
    }

    /// denominator
    pub fn denom(&self) -> i64 {
        self.denom
    }

    /// false for the `INVALID` sentinel, and anything else with a zero denominator
    pub fn is_valid(&self) -> bool {
        self.denom != 0
    }

    /// Divides numerator and denominator by their gcd.
    #[must_use]
    pub fn simplify(&self) -> Rational {
        let gcd = gcd(self.num, self.denom);
        if gcd == 0 {
            return *self;
        }
        Rational::new(self.num / gcd, self.denom / gcd)
    }

    /// `1 - self`, with the same denominator.
    #[must_use]
    pub fn complement(&self) -> Rational {
        Rational::new(self.denom - self.num, self.denom)
    }

    /// Floating point approximation, only for comparisons.
    pub fn value(&self) -> f64 {
        self.num as f64 / self.denom as f64
    }

    /// Rounds to a fraction with denominator `new_denom`.
    ///
    /// `Down` never returns 0 and `Up` never returns 1, so that a weight strictly between 0 and 1
    /// stays strictly between 0 and 1. Requires a positive denominator, otherwise returns
    /// `Rational::INVALID`.
    #[must_use]
    pub fn round(&self, new_denom: i64, strategy: RoundingStrategy) -> Rational {
        if self.denom <= 0 {
            return Rational::INVALID;
        }
        let scaled = self.num as i128 * new_denom as i128;
        let denom = self.denom as i128;
        let new_num = match strategy {
            RoundingStrategy::Down => {
                let n = scaled.div_euclid(denom);
                if n == 0 {
                    1
                } else {
                    n
                }
            }
            RoundingStrategy::Up => {
                let n = -(-scaled).div_euclid(denom);
                if n == new_denom as i128 {
                    n - 1
                } else {
                    n
                }
            }
            RoundingStrategy::Near => {
                let upper = self.round(new_denom, RoundingStrategy::Up);
                let lower = self.round(new_denom, RoundingStrategy::Down);
                let value = self.value();
                return if (lower.value() - value).abs() < (upper.value() - value).abs() {
                    lower
                } else {
                    upper
                };
            }
        };
        match i64::try_from(new_num) {
            Ok(n) => Rational::new(n, new_denom),
            Err(_) => Rational::INVALID,
        }
    }

    /// Parses a weight, either a decimal like `0.25` or a fraction like `1/4`.
    ///
    /// Unparseable tokens are logged and yield `Rational::INVALID`.
    pub fn parse(token: &str) -> Rational {
        match token.parse() {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("{:#}", e);
                Rational::INVALID
            }
        }
    }

    /// Exact arbitrary precision value, `None` for invalid weights.
    pub fn to_big(&self) -> Option<BigRational> {
        if self.is_valid() {
            Some(BigRational::new(
                BigInt::from(self.num),
                BigInt::from(self.denom),
            ))
        } else {
            None
        }
    }
}

/// gcd of absolute values, `gcd(0, 0) == 0`
pub(crate) fn gcd<T>(a: T, b: T) -> T
where
    T: Copy + PartialEq + PartialOrd + std::ops::Rem<Output = T> + std::ops::Neg<Output = T> + From<i8>,
{
    let zero = T::from(0);
    let abs = |x: T| if x < zero { -x } else { x };
    let (mut a, mut b) = (abs(a), abs(b));
    while b != zero {
        let r = a % b;
        a = b;
        b = r;
    }
    a
}

/// Appends a decimal digit to `acc`, failing on overflow.
fn push_digit(acc: i64, digit: char, token: &str) -> anyhow::Result<i64> {
    let d = i64::from(digit as u8 - b'0');
    acc.checked_mul(10)
        .and_then(|x| x.checked_add(d))
        .ok_or_else(|| anyhow::anyhow!("weight {} overflows", token))
}

impl FromStr for Rational {
    type Err = anyhow::Error;

    fn from_str(token: &str) -> anyhow::Result<Rational> {
        if token.contains('/') {
            let mut num = 0;
            let mut denom = 0;
            let mut seen_slash = false;
            for c in token.chars() {
                match c {
                    '/' if !seen_slash => seen_slash = true,
                    '0'..='9' if seen_slash => denom = push_digit(denom, c, token)?,
                    '0'..='9' => num = push_digit(num, c, token)?,
                    _ => anyhow::bail!("unknown fraction: {}", token),
                }
            }
            Ok(Rational::new(num, denom))
        } else {
            let mut num = 0;
            let mut denom: i64 = 1;
            let mut seen_point = false;
            for c in token.chars() {
                match c {
                    '.' if !seen_point => seen_point = true,
                    '0'..='9' => {
                        num = push_digit(num, c, token)?;
                        if seen_point {
                            denom = denom
                                .checked_mul(10)
                                .ok_or_else(|| anyhow::anyhow!("weight {} overflows", token))?;
                        }
                    }
                    _ => anyhow::bail!("unknown decimal: {}", token),
                }
            }
            Ok(Rational::new(num, denom))
        }
    }
}

impl Display for Rational {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}/{}", self.num, self.denom)
    }
}

impl Serialize for Rational {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_decimal() {
        assert_eq!(Rational::parse("0.25"), Rational::new(25, 100));
        assert_eq!(Rational::parse("3"), Rational::new(3, 1));
        assert_eq!(Rational::parse(".5"), Rational::new(5, 10));
        assert_eq!(Rational::parse("1."), Rational::new(1, 1));
    }

    #[test]
    fn parse_fraction() {
        assert_eq!(Rational::parse("1/3"), Rational::new(1, 3));
        assert_eq!(Rational::parse("10/4"), Rational::new(10, 4));
        assert!(!Rational::parse("1/").is_valid());
    }

    #[test]
    fn parse_garbage() {
        assert_eq!(Rational::parse("abc"), Rational::INVALID);
        assert_eq!(Rational::parse("1.2.3"), Rational::INVALID);
        assert_eq!(Rational::parse("1/2/3"), Rational::INVALID);
        assert_eq!(Rational::parse("-0.5"), Rational::INVALID);
        assert_eq!(Rational::parse("99999999999999999999"), Rational::INVALID);
        assert!("0.5x".parse::<Rational>().is_err());
    }

    #[test]
    fn simplify() {
        assert_eq!(Rational::new(25, 100).simplify(), Rational::new(1, 4));
        assert_eq!(Rational::new(0, 8).simplify(), Rational::new(0, 1));
        assert_eq!(Rational::new(0, 0).simplify(), Rational::new(0, 0));
        assert_eq!(Rational::new(3, 0).simplify(), Rational::new(1, 0));
    }

    #[test]
    fn complement_is_an_involution() {
        for denom in 1..20 {
            for num in 0..=denom {
                let r = Rational::new(num, denom);
                assert_eq!(r.complement().complement(), r);
                assert_eq!(r.complement(), Rational::new(denom - num, denom));
            }
        }
    }

    #[test]
    fn round_examples() {
        let r = Rational::new(3, 10);
        assert_eq!(r.round(4, RoundingStrategy::Down), Rational::new(1, 4));
        assert_eq!(r.round(4, RoundingStrategy::Up), Rational::new(2, 4));
        assert_eq!(r.round(4, RoundingStrategy::Near), Rational::new(1, 4));
        // tie
        assert_eq!(
            Rational::new(3, 8).round(4, RoundingStrategy::Near),
            Rational::new(2, 4)
        );
        // never 0, never 1
        assert_eq!(
            Rational::new(1, 1000).round(8, RoundingStrategy::Down),
            Rational::new(1, 8)
        );
        assert_eq!(
            Rational::new(999, 1000).round(8, RoundingStrategy::Up),
            Rational::new(7, 8)
        );
        // exact values are kept
        assert_eq!(
            Rational::new(1, 2).round(8, RoundingStrategy::Up),
            Rational::new(4, 8)
        );
        assert_eq!(Rational::INVALID.round(8, RoundingStrategy::Up), Rational::INVALID);
    }

    #[test]
    fn round_bounds() {
        for &new_denom in &[2, 4, 8, 16, 1024] {
            for denom in 2..30 {
                for num in 1..denom {
                    let r = Rational::new(num, denom);
                    let down = r.round(new_denom, RoundingStrategy::Down);
                    let up = r.round(new_denom, RoundingStrategy::Up);
                    let near = r.round(new_denom, RoundingStrategy::Near);
                    assert_eq!(down.denom(), new_denom);
                    assert!(down.num() >= 1, "{} rounded down to 0", r);
                    assert!(up.num() <= new_denom - 1, "{} rounded up to 1", r);
                    assert!(down.value() <= r.value() || down.num() == 1);
                    assert!(up.value() >= r.value() || up.num() == new_denom - 1);
                    let d_down = (down.value() - r.value()).abs();
                    let d_up = (up.value() - r.value()).abs();
                    if d_down < d_up {
                        assert_eq!(near, down);
                    } else {
                        assert_eq!(near, up);
                    }
                }
            }
        }
    }

    #[test]
    fn to_big() {
        assert_eq!(
            Rational::new(2, 4).to_big(),
            Some(BigRational::new(1.into(), 2.into()))
        );
        assert_eq!(Rational::INVALID.to_big(), None);
    }
}
