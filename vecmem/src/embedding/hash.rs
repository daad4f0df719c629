//! Deterministic hash embeddings
//!
//! Last-resort backend: no model, no network, never fails. The same text
//! always maps to the same unit vector, and different texts land at
//! unrelated points on the hypersphere. Not semantic.

use crate::math::l2_normalize;

/// Java-style polynomial hash (`h * 31 + c`) over the text's chars
fn polynomial_hash(text: &str) -> i32 {
    text.chars().fold(0i32, |h, c| {
        h.wrapping_shl(5).wrapping_sub(h).wrapping_add(c as i32)
    })
}

/// FNV-1a style multiplicative hash over the text's chars
fn multiplicative_hash(text: &str) -> i32 {
    let h = text.chars().fold(0x811c_9dc5u32, |h, c| {
        (h ^ c as u32).wrapping_mul(0x0100_0193)
    });
    h as i32
}

#[inline]
fn fract(x: f64) -> f64 {
    x - x.floor()
}

/// Embed `text` into a `dimension`-long unit vector.
pub fn hash_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let h1 = polynomial_hash(text) as f64;
    let h2 = multiplicative_hash(text) as f64;

    let mut vector: Vec<f32> = (0..dimension)
        .map(|i| {
            let i = i as f64;
            let a = fract((h1 + i).sin() * 10_000.0);
            let b = fract((h2 + i * 0.5).cos() * 10_000.0);
            // Centre on zero so unrelated texts are near-orthogonal
            ((a + b) / 2.0 - 0.5) as f32
        })
        .collect();

    if !l2_normalize(&mut vector) {
        if let Some(first) = vector.first_mut() {
            *first = 1.0;
        }
    }
    vector
}
