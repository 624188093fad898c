//! Random identifier generation for file keys, short-URL keys and API tokens.
//!
//! Uniqueness is only guaranteed against the values passed in, so callers must
//! hold the owning collection's lock from generation through insertion.

use rand::Rng;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Generate a random alphanumeric string of `len` characters that does not
/// collide with anything in `taken`. Regenerates until it finds a free value.
#[must_use]
pub fn generate<'a, I>(len: usize, taken: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let taken: Vec<&str> = taken.into_iter().collect();

    loop {
        let candidate = random_string(len);
        if !taken.iter().any(|t| *t == candidate) {
            return candidate;
        }
    }
}

fn random_string(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| {
            let idx = rng.random_range(0..ALPHABET.len());
            ALPHABET[idx] as char
        })
        .collect()
}
