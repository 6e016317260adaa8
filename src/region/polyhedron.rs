use std::fmt::{Display, Formatter};

use num_bigint::BigInt;
use num_traits::{Signed, Zero};

use super::double_description::{self as dd, dot, is_zero, unit, Generators, Vector};
use super::{contradiction, Comparison, ConvexRegion, LinearConstraint};

/// Exact closed convex polyhedron.
///
/// A polyhedron in `R^dim` is stored through its homogenization, the cone
/// `{(x, s) : a . x + c s >= 0, s >= 0}` in `R^(dim + 1)`. Both descriptions of the cone are kept
/// in minimal form:
///
///   - rows `[a, c]` for the irredundant inequalities `a . x + c >= 0` and for a basis of the
///     equalities `a . x + c = 0`
///   - generators, where a ray with `s > 0` is the point `x / s`, a ray with `s = 0` is a
///     direction of recession, and lines span the lineality space
///
/// Every operation is implemented on whichever description makes it trivial (intersection joins
/// rows, hull and Minkowski sums join generators) and the result is converted back so that both
/// descriptions stay current.
#[derive(Clone, Debug)]
pub struct Polyhedron {
    dim: usize,
    inequalities: Vec<Vector>,
    equalities: Vec<Vector>,
    generators: Option<Generators>,
}

fn homogenize(constraint: &LinearConstraint) -> Vector {
    let (sign, bound_sign) = match constraint.comparison() {
        Comparison::LessEq => (-1, 1),
        Comparison::GreaterEq | Comparison::Equal => (1, -1),
    };

    let mut row = constraint
        .coefficients()
        .iter()
        .map(|coefficient| coefficient * sign)
        .collect::<Vector>();
    row.push(constraint.bound() * bound_sign);

    dd::normalize(row)
}

impl Polyhedron {
    fn positivity(&self) -> Vector {
        unit(self.dim + 1, self.dim)
    }

    fn has_point(&self, generators: &Generators) -> bool {
        generators.rays.iter().any(|ray| ray[self.dim].is_positive())
    }

    fn from_rows(dim: usize, inequalities: Vec<Vector>, equalities: Vec<Vector>) -> Self {
        let mut polyhedron = Self::empty(dim);
        let mut rows = vec![polyhedron.positivity()];
        rows.extend(inequalities);

        let generators = dd::generators(dim + 1, &rows, &equalities);

        if polyhedron.has_point(&generators) {
            polyhedron.set_rows_from(&generators);
            polyhedron.generators = Some(generators);
        }

        polyhedron
    }

    fn from_generators(dim: usize, generators: Generators) -> Self {
        let mut polyhedron = Self::empty(dim);

        if polyhedron.has_point(&generators) {
            polyhedron.set_rows_from(&generators);

            let mut rows = vec![polyhedron.positivity()];
            rows.extend(polyhedron.inequalities.iter().cloned());
            polyhedron.generators = Some(dd::generators(dim + 1, &rows, &polyhedron.equalities));
        }

        polyhedron
    }

    fn set_rows_from(&mut self, generators: &Generators) {
        let dual = dd::generators(self.dim + 1, &generators.rays, &generators.lines);
        let dim = self.dim;
        let nontrivial = |row: &Vector| !is_zero(&row[..dim]);

        let mut inequalities = dual.rays.into_iter().filter(nontrivial).collect::<Vec<_>>();
        inequalities.sort();

        self.inequalities = inequalities;
        self.equalities = dual.lines.into_iter().filter(nontrivial).collect();
    }

    fn generators_or_none(&self) -> Option<&Generators> {
        self.generators.as_ref()
    }

    fn satisfies(&self, vector: &[BigInt], is_line: bool) -> bool {
        let inequalities_hold = self.inequalities.iter().all(|row| {
            let value = dot(row, vector);
            if is_line {
                value.is_zero()
            } else {
                !value.is_negative()
            }
        });

        inequalities_hold && self.equalities.iter().all(|row| dot(row, vector).is_zero())
    }

    /// Points (vertices of the minimal faces) of the polyhedron as `(numerators, denominator)`.
    pub(crate) fn points(&self) -> impl Iterator<Item = (&[BigInt], &BigInt)> {
        let dim = self.dim;

        self.generators_or_none()
            .into_iter()
            .flat_map(|generators| generators.rays.iter())
            .filter(move |ray| ray[dim].is_positive())
            .map(move |ray| (&ray[..dim], &ray[dim]))
    }

    /// Directions of recession that are not part of the lineality space.
    pub(crate) fn rays(&self) -> impl Iterator<Item = &[BigInt]> {
        let dim = self.dim;

        self.generators_or_none()
            .into_iter()
            .flat_map(|generators| generators.rays.iter())
            .filter(move |ray| ray[dim].is_zero())
            .map(move |ray| &ray[..dim])
    }

    /// Basis of the lineality space.
    pub(crate) fn lines(&self) -> impl Iterator<Item = &[BigInt]> {
        let dim = self.dim;

        self.generators_or_none()
            .into_iter()
            .flat_map(|generators| generators.lines.iter())
            .map(move |line| &line[..dim])
    }

    fn extend_generators(&self, rays: Vec<Vector>, lines: Vec<Vector>) -> Self {
        match &self.generators {
            None => self.clone(),
            Some(generators) => {
                let mut extended = generators.clone();
                extended.rays.extend(rays);
                extended.lines.extend(lines);
                Self::from_generators(self.dim, extended)
            }
        }
    }
}

impl ConvexRegion for Polyhedron {
    fn universe(dim: usize) -> Self {
        let generators = Generators {
            rays: vec![unit(dim + 1, dim)],
            lines: (0..dim).map(|index| unit(dim + 1, index)).collect(),
        };

        Self {
            dim,
            inequalities: Vec::new(),
            equalities: Vec::new(),
            generators: Some(generators),
        }
    }

    fn empty(dim: usize) -> Self {
        Self {
            dim,
            inequalities: Vec::new(),
            equalities: Vec::new(),
            generators: None,
        }
    }

    fn from_constraints<I>(dim: usize, constraints: I) -> Self
    where
        I: IntoIterator<Item = LinearConstraint>,
    {
        let mut inequalities = Vec::new();
        let mut equalities = Vec::new();

        for constraint in constraints {
            debug_assert_eq!(constraint.dim(), dim, "constraint dimension mismatch");

            let row = homogenize(&constraint);
            match constraint.comparison() {
                Comparison::Equal => equalities.push(row),
                _ => inequalities.push(row),
            }
        }

        Self::from_rows(dim, inequalities, equalities)
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn is_empty(&self) -> bool {
        self.generators.is_none()
    }

    fn is_universe(&self) -> bool {
        !self.is_empty() && self.inequalities.is_empty() && self.equalities.is_empty()
    }

    fn intersection(&self, other: &Self) -> Self {
        if self.is_empty() || other.is_empty() {
            return Self::empty(self.dim);
        }

        let inequalities = self.inequalities.iter().chain(&other.inequalities).cloned().collect();
        let equalities = self.equalities.iter().chain(&other.equalities).cloned().collect();

        Self::from_rows(self.dim, inequalities, equalities)
    }

    fn hull(&self, other: &Self) -> Self {
        match &other.generators {
            None => self.clone(),
            Some(generators) if self.generators.is_some() => {
                self.extend_generators(generators.rays.clone(), generators.lines.clone())
            }
            Some(_) => other.clone(),
        }
    }

    fn add_ray(&self, direction: &[BigInt]) -> Self {
        debug_assert_eq!(direction.len(), self.dim, "ray dimension mismatch");

        if is_zero(direction) {
            return self.clone();
        }

        let mut ray = direction.to_vec();
        ray.push(BigInt::zero());

        self.extend_generators(vec![dd::normalize(ray)], Vec::new())
    }

    fn unconstrain(&self, coordinate: usize) -> Self {
        self.extend_generators(Vec::new(), vec![unit(self.dim + 1, coordinate)])
    }

    fn contains(&self, other: &Self) -> bool {
        match (&self.generators, &other.generators) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(_), Some(generators)) => {
                generators.rays.iter().all(|ray| self.satisfies(ray, false))
                    && generators.lines.iter().all(|line| self.satisfies(line, true))
            }
        }
    }

    fn constraints(&self) -> Vec<LinearConstraint> {
        if self.is_empty() {
            return vec![contradiction(self.dim)];
        }

        let convert = |row: &Vector, comparison| {
            let coefficients = row[..self.dim].to_vec();
            let bound = -&row[self.dim];
            LinearConstraint::from_integers(coefficients, comparison, bound)
        };

        self.equalities
            .iter()
            .map(|row| convert(row, Comparison::Equal))
            .chain(self.inequalities.iter().map(|row| convert(row, Comparison::GreaterEq)))
            .collect()
    }
}

impl PartialEq for Polyhedron {
    fn eq(&self, other: &Self) -> bool {
        self.dim == other.dim && self.same_set(other)
    }
}

impl Display for Polyhedron {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render(&[]))
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use num_bigint::BigInt;

    use super::Polyhedron;
    use crate::region::{ConvexRegion, LinearConstraint};

    type TestResult = Result<(), Box<dyn Error>>;

    fn rect(t: (f64, f64), x: (f64, f64)) -> Result<Polyhedron, Box<dyn Error>> {
        let constraints = vec![
            LinearConstraint::greater_eq(&[1.0, 0.0], t.0)?,
            LinearConstraint::less_eq(&[1.0, 0.0], t.1)?,
            LinearConstraint::greater_eq(&[0.0, 1.0], x.0)?,
            LinearConstraint::less_eq(&[0.0, 1.0], x.1)?,
        ];

        Ok(Polyhedron::from_constraints(2, constraints))
    }

    fn ray(values: &[i64]) -> Vec<BigInt> {
        values.iter().map(|value| BigInt::from(*value)).collect()
    }

    #[test]
    fn emptiness() -> TestResult {
        let disjoint = vec![
            LinearConstraint::greater_eq(&[1.0, 0.0], 2.0)?,
            LinearConstraint::less_eq(&[1.0, 0.0], 1.0)?,
        ];

        assert!(Polyhedron::from_constraints(2, disjoint).is_empty());
        assert!(!rect((0.0, 1.0), (0.0, 1.0))?.is_empty());
        assert!(Polyhedron::universe(2).is_universe());

        Ok(())
    }

    #[test]
    fn redundant_constraints_are_removed() -> TestResult {
        let constraints = vec![
            LinearConstraint::less_eq(&[0.0, 1.0], 1.0)?,
            LinearConstraint::less_eq(&[0.0, 1.0], 3.0)?,
            LinearConstraint::greater_eq(&[0.0, 1.0], 0.0)?,
            LinearConstraint::less_eq(&[0.0, 2.0], 10.0)?,
        ];

        let polyhedron = Polyhedron::from_constraints(2, constraints);

        // 0 <= x <= 1 is all that remains, t is free
        assert_eq!(polyhedron.constraints().len(), 2);
        assert_eq!(polyhedron.lines().count(), 1);

        Ok(())
    }

    #[test]
    fn intersection_and_containment() -> TestResult {
        let outer = rect((0.0, 4.0), (0.0, 4.0))?;
        let inner = rect((1.0, 2.0), (1.0, 2.0))?;
        let shifted = rect((3.0, 5.0), (3.0, 5.0))?;

        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert_eq!(outer.intersection(&inner), inner);
        assert_eq!(outer.intersection(&shifted), rect((3.0, 4.0), (3.0, 4.0))?);
        assert!(inner.intersection(&shifted).is_empty());

        Ok(())
    }

    #[test]
    fn hull_of_two_boxes() -> TestResult {
        let left = rect((0.0, 1.0), (0.0, 1.0))?;
        let right = rect((2.0, 3.0), (0.0, 1.0))?;
        let hull = left.hull(&right);

        assert_eq!(hull, rect((0.0, 3.0), (0.0, 1.0))?);
        assert_eq!(left.hull(&Polyhedron::empty(2)), left);
        assert_eq!(Polyhedron::empty(2).hull(&left), left);

        Ok(())
    }

    #[test]
    fn hull_of_points_is_a_triangle() -> TestResult {
        let point = |t: f64, x: f64| -> Result<Polyhedron, Box<dyn Error>> {
            Ok(Polyhedron::from_constraints(
                2,
                [LinearConstraint::pin(2, 0, t)?, LinearConstraint::pin(2, 1, x)?],
            ))
        };

        let triangle = point(0.0, 0.0)?.hull(&point(1.0, 0.0)?).hull(&point(0.0, 1.0)?);

        assert_eq!(triangle.constraints().len(), 3);
        assert_eq!(triangle.points().count(), 3);
        assert!(triangle.contains(&point(0.25, 0.25)?));
        assert!(!triangle.contains(&point(0.75, 0.75)?));

        Ok(())
    }

    #[test]
    fn minkowski_sum_with_ray() -> TestResult {
        let origin = rect((0.0, 0.0), (0.0, 1.0))?;
        let swept = origin.add_ray(&ray(&[1, 2]));

        // swept = {(t, x) : t >= 0, 2t <= x <= 2t + 1}
        let expected = Polyhedron::from_constraints(
            2,
            [
                LinearConstraint::greater_eq(&[1.0, 0.0], 0.0)?,
                LinearConstraint::greater_eq(&[-2.0, 1.0], 0.0)?,
                LinearConstraint::less_eq(&[-2.0, 1.0], 1.0)?,
            ],
        );

        assert_eq!(swept, expected);
        assert_eq!(swept.rays().count(), 1);

        Ok(())
    }

    #[test]
    fn unconstrain_time() -> TestResult {
        let square = rect((0.0, 1.0), (2.0, 3.0))?;
        let band = square.unconstrain(0);
        let expected = Polyhedron::from_constraints(
            2,
            [
                LinearConstraint::greater_eq(&[0.0, 1.0], 2.0)?,
                LinearConstraint::less_eq(&[0.0, 1.0], 3.0)?,
            ],
        );

        assert_eq!(band, expected);
        assert_eq!(square.projection(&[1]), expected);

        Ok(())
    }

    #[test]
    fn empty_inputs() -> TestResult {
        let empty = Polyhedron::empty(2);
        let square = rect((0.0, 1.0), (0.0, 1.0))?;

        assert!(empty.add_ray(&ray(&[1, 1])).is_empty());
        assert!(empty.unconstrain(0).is_empty());
        assert!(square.contains(&empty));
        assert!(!empty.contains(&square));
        assert_eq!(empty.constraints().len(), 1);

        Ok(())
    }
}
