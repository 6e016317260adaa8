//! Conversion between the constraint and generator descriptions of polyhedral cones.
//!
//! A cone `{y : a . y >= 0 for every inequality a, a . y = 0 for every equality a}` is converted
//! into its generators: a basis of its lineality space and one vector per extreme ray. The
//! conversion is the incremental double description method, processing one constraint at a time
//! and using the combinatorial adjacency test to decide which pairs of rays to combine.
//!
//! Applying the same conversion to the rows `g . a >= 0` (one per ray) and `l . a = 0` (one per
//! line) produces the generators of the dual cone, which are exactly the irredundant constraints
//! of the original cone. [`Polyhedron`](super::Polyhedron) uses both directions to keep its
//! descriptions minimal.
//!
//! All vectors are integer vectors normalized by the gcd of their entries.

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{One, Signed, Zero};

pub(crate) type Vector = Vec<BigInt>;

/// Generator description of a cone.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Generators {
    pub(crate) rays: Vec<Vector>,
    pub(crate) lines: Vec<Vector>,
}

#[derive(Clone, Debug)]
struct Ray {
    vector: Vector,
    zeros: Vec<bool>,
}

pub(crate) fn dot(left: &[BigInt], right: &[BigInt]) -> BigInt {
    left.iter().zip(right).map(|(l, r)| l * r).sum()
}

pub(crate) fn unit(dim: usize, index: usize) -> Vector {
    let mut vector = vec![BigInt::zero(); dim];
    vector[index] = BigInt::one();
    vector
}

pub(crate) fn negate(vector: &[BigInt]) -> Vector {
    vector.iter().map(|value| -value).collect()
}

pub(crate) fn is_zero(vector: &[BigInt]) -> bool {
    vector.iter().all(Zero::is_zero)
}

/// Divide a vector by the gcd of its entries, keeping its direction.
pub(crate) fn normalize(mut vector: Vector) -> Vector {
    let divisor = vector.iter().fold(BigInt::zero(), |acc, value| acc.gcd(value));

    if !divisor.is_zero() && !divisor.is_one() {
        for value in vector.iter_mut() {
            *value = &*value / &divisor;
        }
    }

    vector
}

/// Compute `alpha * u - beta * v`, normalized.
fn combine(alpha: &BigInt, u: &[BigInt], beta: &BigInt, v: &[BigInt]) -> Vector {
    let combined = u.iter().zip(v).map(|(x, y)| alpha * x - beta * y).collect();
    normalize(combined)
}

fn adjacent(rays: &[Ray], first: usize, second: usize, rank: usize) -> bool {
    let common = rays[first]
        .zeros
        .iter()
        .zip(&rays[second].zeros)
        .map(|(l, r)| *l && *r)
        .collect::<Vec<_>>();

    let saturated = common.iter().filter(|zero| **zero).count();

    if saturated + 2 < rank {
        return false;
    }

    let dominated = |ray: &Ray| common.iter().zip(&ray.zeros).all(|(c, z)| !*c || *z);

    !rays
        .iter()
        .enumerate()
        .any(|(index, ray)| index != first && index != second && dominated(ray))
}

/// Compute the generators of the cone described by the given rows in `R^dim`.
pub(crate) fn generators(dim: usize, inequalities: &[Vector], equalities: &[Vector]) -> Generators {
    let rows = equalities
        .iter()
        .flat_map(|row| [row.clone(), negate(row)])
        .chain(inequalities.iter().cloned())
        .collect::<Vec<_>>();

    let mut lines = (0..dim).map(|index| unit(dim, index)).collect::<Vec<_>>();
    let mut rays: Vec<Ray> = Vec::new();

    for (index, row) in rows.iter().enumerate() {
        if is_zero(row) {
            for ray in rays.iter_mut() {
                ray.zeros[index] = true;
            }
            continue;
        }

        if let Some(position) = lines.iter().position(|line| !dot(row, line).is_zero()) {
            let mut pivot = lines.remove(position);
            let mut product = dot(row, &pivot);

            if product.is_negative() {
                pivot = negate(&pivot);
                product = -product;
            }

            for line in lines.iter_mut() {
                let value = dot(row, line);
                if !value.is_zero() {
                    *line = combine(&product, line, &value, &pivot);
                }
            }

            for ray in rays.iter_mut() {
                let value = dot(row, &ray.vector);
                if !value.is_zero() {
                    ray.vector = combine(&product, &ray.vector, &value, &pivot);
                }
                ray.zeros[index] = true;
            }

            let zeros = (0..rows.len()).map(|other| other < index).collect();
            rays.push(Ray { vector: pivot, zeros });
            continue;
        }

        let values = rays.iter().map(|ray| dot(row, &ray.vector)).collect::<Vec<_>>();
        let rank = dim - lines.len();
        let mut next = Vec::with_capacity(rays.len());

        for (ray, value) in rays.iter().zip(&values) {
            if !value.is_negative() {
                let mut kept = ray.clone();
                kept.zeros[index] = value.is_zero();
                next.push(kept);
            }
        }

        for (positive, positive_value) in values.iter().enumerate().filter(|(_, v)| v.is_positive()) {
            for (negative, negative_value) in values.iter().enumerate().filter(|(_, v)| v.is_negative()) {
                if !adjacent(&rays, positive, negative, rank) {
                    continue;
                }

                let vector = combine(
                    positive_value,
                    &rays[negative].vector,
                    negative_value,
                    &rays[positive].vector,
                );

                if is_zero(&vector) {
                    continue;
                }

                let mut zeros = rays[positive]
                    .zeros
                    .iter()
                    .zip(&rays[negative].zeros)
                    .map(|(l, r)| *l && *r)
                    .collect::<Vec<_>>();
                zeros[index] = true;

                next.push(Ray { vector, zeros });
            }
        }

        rays = next;
    }

    let mut unique: Vec<Vector> = Vec::with_capacity(rays.len());
    for ray in rays {
        if !unique.contains(&ray.vector) {
            unique.push(ray.vector);
        }
    }

    Generators { rays: unique, lines }
}
