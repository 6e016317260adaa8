//! Text syntax for linear constraints and regions.
//!
//! A constraint compares two linear expressions over named coordinates with `<=`, `>=` or `==`.
//! Expressions are sums of terms, each term being a number, a coordinate name, or a number
//! multiplied by a coordinate name:
//!
//! ```text
//! 2.5*x - t <= 3
//! x + 0.5 >= -y
//! ```
//!
//! A region is either `true` or a conjunction of constraints separated by `&&`, which is the same
//! form produced by [`ConvexRegion::render`].
//!
//! # Examples
//!
//! ```rust
//! use pwl_synth::parser::parse_region;
//! use pwl_synth::region::{ConvexRegion, Polyhedron};
//!
//! let band = parse_region::<Polyhedron>("x >= 0 && x <= 5", &["t", "x"]).unwrap();
//!
//! assert!(!band.is_empty());
//! assert_eq!(band.dim(), 2);
//! ```

use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::{alpha1, alphanumeric1, digit1, space0};
use nom::combinator::{map, map_opt, opt, recognize};
use nom::multi::many0;
use nom::sequence::{delimited, pair, preceded, separated_pair, tuple};
use nom::IResult;
use num_rational::BigRational;
use num_traits::{One, Zero};
use thiserror::Error;

use crate::rational::decimal_to_rational;
use crate::region::{Comparison, ConvexRegion, LinearConstraint};

#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum ParseError {
    #[error("Could not parse constraint \"{0}\"")]
    Syntax(String),

    #[error("Could not parse remaining input \"{0}\"")]
    Incomplete(String),

    #[error("Unknown variable \"{0}\"")]
    UnknownVariable(String),
}

/// One term of an expression, with its sign already applied.
type Term = (BigRational, Option<String>);

/// Unsigned decimal literal, read exactly.
fn decimal(input: &str) -> IResult<&str, BigRational> {
    let literal = pair(digit1, opt(preceded(tag("."), digit1)));
    let mut parser = map_opt(literal, |(whole, fraction): (&str, Option<&str>)| {
        decimal_to_rational(whole, fraction.unwrap_or(""))
    });

    parser(input)
}

fn var_name(input: &str) -> IResult<&str, String> {
    let mut parser = recognize(pair(alpha1, many0(alt((alphanumeric1, tag("_"))))));
    let (rest, name) = parser(input)?;

    Ok((rest, name.to_string()))
}

fn op0<'a>(value: &'a str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    move |input: &'a str| -> IResult<&'a str, &'a str> {
        let mut parser = delimited(space0, tag(value), space0);
        parser(input)
    }
}

fn coeff(input: &str) -> IResult<&str, (BigRational, String)> {
    let mut parser = separated_pair(decimal, op0("*"), var_name);
    parser(input)
}

fn term(input: &str) -> IResult<&str, Term> {
    let p1 = map(coeff, |(value, name)| (value, Some(name)));
    let p2 = map(decimal, |value| (value, None));
    let p3 = map(var_name, |name| (BigRational::one(), Some(name)));
    let mut parser = alt((p1, p2, p3));

    parser(input)
}

fn signed_term(input: &str) -> IResult<&str, Term> {
    let sign = alt((map(op0("+"), |_| false), map(op0("-"), |_| true)));
    let mut parser = pair(sign, term);
    let (rest, (negated, (value, name))) = parser(input)?;
    let value = if negated { -value } else { value };

    Ok((rest, (value, name)))
}

fn expression(input: &str) -> IResult<&str, Vec<Term>> {
    let leading = map(pair(opt(op0("-")), term), |(negated, (value, name))| {
        if negated.is_some() {
            (-value, name)
        } else {
            (value, name)
        }
    });

    let mut parser = pair(preceded(space0, leading), many0(signed_term));
    let (rest, (first, mut others)) = parser(input)?;
    others.insert(0, first);

    Ok((rest, others))
}

fn comparison(input: &str) -> IResult<&str, Comparison> {
    let mut parser = alt((
        map(op0("<="), |_| Comparison::LessEq),
        map(op0(">="), |_| Comparison::GreaterEq),
        map(op0("=="), |_| Comparison::Equal),
    ));

    parser(input)
}

fn constraint(input: &str) -> IResult<&str, (Vec<Term>, Comparison, Vec<Term>)> {
    let mut parser = tuple((expression, comparison, expression));
    let (rest, result) = parser(input)?;
    let (rest, _) = space0(rest)?;

    Ok((rest, result))
}

/// Parse a single linear constraint over the coordinates listed in `names`.
///
/// The position of a name in `names` is the index of its coordinate, so for regions of an
/// automaton `names` is usually the output of `coordinate_names`.
pub fn parse_constraint<S: AsRef<str>>(input: &str, names: &[S]) -> Result<LinearConstraint, ParseError> {
    let (rest, (left, comparison, right)) = constraint(input).map_err(|_| ParseError::Syntax(input.to_string()))?;

    if !rest.is_empty() {
        return Err(ParseError::Incomplete(rest.to_string()));
    }

    let mut coefficients = vec![BigRational::zero(); names.len()];
    let mut bound = BigRational::zero();

    // Variables move to the left-hand side and constants to the bound.
    let moved = left
        .into_iter()
        .chain(right.into_iter().map(|(value, name)| (-value, name)));

    for (value, name) in moved {
        match name {
            Some(name) => {
                let index = names
                    .iter()
                    .position(|candidate| candidate.as_ref() == name)
                    .ok_or(ParseError::UnknownVariable(name))?;

                coefficients[index] += value;
            }
            None => bound -= value,
        }
    }

    Ok(LinearConstraint::from_rationals(&coefficients, comparison, &bound))
}

/// Parse a conjunction of constraints separated by `&&`, or `true` for the whole space.
pub fn parse_region<R: ConvexRegion>(input: &str, names: &[&str]) -> Result<R, ParseError> {
    let trimmed = input.trim();

    if trimmed == "true" {
        return Ok(R::universe(names.len()));
    }

    let constraints = trimmed
        .split("&&")
        .map(|part| parse_constraint(part.trim(), names))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(R::from_constraints(names.len(), constraints))
}
