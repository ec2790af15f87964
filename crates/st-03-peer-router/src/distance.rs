//! XOR distance over SHA-512 digests of identifier and peer strings.
//!
//! Both sides are hashed to fixed-width seeds so arbitrary-length peer ids
//! and canonical identifiers compare in the same metric space. Distances
//! order lexicographically over the XOR of the two seeds.

use sha2::{Digest, Sha512};

pub const SEED_BYTES: usize = 64;

/// Fixed-width seed for distance comparison.
pub type DistanceSeed = [u8; SEED_BYTES];

/// Hash an arbitrary string into the distance space.
pub fn seed(input: &str) -> DistanceSeed {
    Sha512::digest(input.as_bytes()).into()
}

/// XOR metric between two seeds. Zero means identical inputs.
pub fn xor_distance(a: &DistanceSeed, b: &DistanceSeed) -> DistanceSeed {
    let mut out = [0u8; SEED_BYTES];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = a[i] ^ b[i];
    }
    out
}
