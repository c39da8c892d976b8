//! Strength checks for the session signing secrets both servers load.

use std::collections::HashMap;

/// Shortest accepted secret.
pub const MIN_SECRET_LENGTH: usize = 32;

/// Minimum Shannon entropy, in bits per character.
const MIN_BITS_PER_CHAR: f64 = 3.3;

/// Fragments that give away a value copied from a sample `.env`.
const PLACEHOLDERS: &[&str] = &[
    "changeme",
    "placeholder",
    "example",
    "secret",
    "password",
    "senha",
    "your-",
    "xxx",
    "troque",
];

/// Why a secret was refused.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum WeakSecret {
    #[error("must be at least {MIN_SECRET_LENGTH} characters (got {0})")]
    TooShort(usize),
    #[error("looks like a placeholder (contains '{0}')")]
    Placeholder(&'static str),
    #[error("entropy too low ({0:.2} bits/char); generate a random value")]
    LowEntropy(f64),
}

/// Shannon entropy of `s` in bits per character.
#[must_use]
pub fn bits_per_char(s: &str) -> f64 {
    let mut counts: HashMap<char, u32> = HashMap::new();
    let mut total = 0_u32;
    for c in s.chars() {
        *counts.entry(c).or_default() += 1;
        total += 1;
    }
    if total == 0 {
        return 0.0;
    }

    let total = f64::from(total);
    counts
        .values()
        .map(|&n| {
            let p = f64::from(n) / total;
            -p * p.log2()
        })
        .sum()
}

/// Accept `value` as a session secret.
///
/// # Errors
///
/// Returns the first [`WeakSecret`] reason that applies.
pub fn check(value: &str) -> Result<(), WeakSecret> {
    let length = value.chars().count();
    if length < MIN_SECRET_LENGTH {
        return Err(WeakSecret::TooShort(length));
    }

    let lower = value.to_lowercase();
    if let Some(found) = PLACEHOLDERS.iter().find(|p| lower.contains(*p)) {
        return Err(WeakSecret::Placeholder(*found));
    }

    let bits = bits_per_char(value);
    if bits < MIN_BITS_PER_CHAR {
        return Err(WeakSecret::LowEntropy(bits));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_entropy_of_repeated_char_is_zero() {
        assert!(bits_per_char("").abs() < f64::EPSILON);
        assert!(bits_per_char("aaaaaaaa").abs() < f64::EPSILON);
        assert!(bits_per_char("aB3$xY9!mK2@nL5#") > MIN_BITS_PER_CHAR);
    }

    #[test]
    fn test_check_reasons() {
        assert_eq!(check("curta"), Err(WeakSecret::TooShort(5)));
        assert_eq!(
            check("troque-esta-chave-antes-de-subir-em-producao"),
            Err(WeakSecret::Placeholder("troque"))
        );
        assert!(matches!(check(&"ab".repeat(20)), Err(WeakSecret::LowEntropy(_))));
        assert!(check("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6%").is_ok());
    }
}
