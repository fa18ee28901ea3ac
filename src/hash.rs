use crate::error::FilterError;
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::f64::consts::LN_2;
use std::fmt;
use std::str::FromStr;

/// Digest family used to derive bit positions for a value.
///
/// The same engine must be used for inserts and lookups against a given
/// filter; switching engines silently changes which bits a value maps to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashEngine {
    #[default]
    Sha1,
    Md5,
    Crc32,
}

impl HashEngine {
    pub fn name(&self) -> &'static str {
        match self {
            HashEngine::Sha1 => "sha1",
            HashEngine::Md5 => "md5",
            HashEngine::Crc32 => "crc32",
        }
    }

    /// Computes `num_hashes` bit positions in `[0, num_bits)` for `value`.
    ///
    /// SHA-1 and MD5 go through the double-hashing scheme of [`double_hash`];
    /// CRC-32 hashes `"{i}-{value}"` once per probe.
    pub fn bit_indices(
        &self,
        value: &str,
        num_hashes: usize,
        num_bits: u64,
    ) -> Vec<u64> {
        match self {
            HashEngine::Sha1 => {
                double_hash(&digest_words(&Sha1::digest(value.as_bytes())))
                    .take(num_hashes)
                    .map(|raw| raw % num_bits)
                    .collect()
            }
            HashEngine::Md5 => {
                double_hash(&digest_words(&Md5::digest(value.as_bytes())))
                    .take(num_hashes)
                    .map(|raw| raw % num_bits)
                    .collect()
            }
            HashEngine::Crc32 => (1..=num_hashes)
                .map(|i| {
                    let probe = format!("{i}-{value}");
                    crc32fast::hash(probe.as_bytes()) as u64 % num_bits
                })
                .collect(),
        }
    }
}

impl fmt::Display for HashEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashEngine {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha1" => Ok(HashEngine::Sha1),
            "md5" => Ok(HashEngine::Md5),
            "crc32" => Ok(HashEngine::Crc32),
            _ => Err(FilterError::UnknownHashEngine(s.to_string())),
        }
    }
}

/// Splits the first 16 bytes of a digest into four big-endian `u32` words.
///
/// Equivalent to reading the first 32 hex characters of the digest as four
/// base-16 numbers of 8 characters each.
pub fn digest_words(digest: &[u8]) -> [u32; 4] {
    let mut words = [0u32; 4];
    for (word, chunk) in words.iter_mut().zip(digest.chunks_exact(4)) {
        *word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    words
}

/// SHA-1 words of `value`, as seen by the server-side programs.
pub fn sha1_words(value: &str) -> [u32; 4] {
    digest_words(&Sha1::digest(value.as_bytes()))
}

/// Unreduced double-hashing probes for i = 1, 2, 3, ...
///
/// Probe `i` is `h[i mod 2] + i * h[2 + ((i + i mod 2) mod 4) / 2]`. Callers
/// reduce each probe modulo the bit-array length, which lets one probe
/// sequence serve generations of different sizes.
pub fn double_hash(h: &[u32; 4]) -> impl Iterator<Item = u64> + '_ {
    (1u64..).map(move |i| {
        let base = h[(i % 2) as usize] as u64;
        let step = h[2 + (((i + (i % 2)) % 4) / 2) as usize] as u64;
        base + i * step
    })
}

/// Optimal bit-array length for `n` elements at false-positive rate `fpr`.
pub fn optimal_bits(n: usize, fpr: f64) -> u64 {
    optimal_bits_for_ln(n, fpr.ln())
}

/// Same as [`optimal_bits`], taking `ln(fpr)` directly.
pub fn optimal_bits_for_ln(n: usize, ln_fpr: f64) -> u64 {
    (-(n as f64 * ln_fpr) / (LN_2 * LN_2)).round() as u64
}

/// Optimal number of probes for `n` elements in `m` bits, never less than one.
///
/// `m / n` is an integer division.
pub fn optimal_hash_count(n: usize, m: u64) -> usize {
    let k = (LN_2 * (m / n as u64) as f64).round() as usize;
    k.max(1)
}
