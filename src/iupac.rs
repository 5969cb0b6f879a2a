//! IUPAC-aware base matching between a primer and a read.
//!
//! Matching is directional: the primer symbol may be an ambiguity code that
//! stands for several literal bases, while the read symbol is only ever taken
//! literally. A read `N` therefore never matches anything, not even a primer `N`.

use std::fmt;

use crate::errors::*;

const A: u8 = 0b0001;
const C: u8 = 0b0010;
const G: u8 = 0b0100;
const T: u8 = 0b1000;

/// Bases admitted by each primer symbol. Zero means "not a primer symbol".
static PRIMER_MASKS: [u8; 256] = primer_masks();

/// The literal base carried by each read symbol. Zero never matches.
static READ_BASES: [u8; 256] = read_bases();

const fn primer_masks() -> [u8; 256] {
    let mut t = [0u8; 256];
    t[b'A' as usize] = A;
    t[b'C' as usize] = C;
    t[b'G' as usize] = G;
    t[b'T' as usize] = T;
    t[b'W' as usize] = A | T;
    t[b'S' as usize] = C | G;
    t[b'M' as usize] = A | C;
    t[b'K' as usize] = G | T;
    t[b'R' as usize] = A | G;
    t[b'Y' as usize] = C | T;
    t[b'B' as usize] = C | G | T;
    t[b'D' as usize] = A | G | T;
    t[b'H' as usize] = A | C | T;
    t[b'V' as usize] = A | C | G;
    t[b'N' as usize] = A | C | G | T;
    t
}

const fn read_bases() -> [u8; 256] {
    let mut t = [0u8; 256];
    t[b'A' as usize] = A;
    t[b'C' as usize] = C;
    t[b'G' as usize] = G;
    t[b'T' as usize] = T;
    t
}

/// Whether `primer` (possibly an ambiguity code) can stand for the literal `read` base.
#[inline]
pub fn compatible(primer: u8, read: u8) -> bool {
    PRIMER_MASKS[primer as usize] & READ_BASES[read as usize] != 0
}

/// Number of positions where `window` is not compatible with `primer`.
///
/// Substitutions only. Fails with [`TrimError::LengthMismatch`] if the two
/// slices differ in length, which means the caller computed a bad window.
pub fn distance(primer: &[u8], window: &[u8]) -> Result<usize> {
    if primer.len() != window.len() {
        return Err(TrimError::LengthMismatch {
            primer: primer.len(),
            window: window.len(),
        });
    }

    Ok(primer
        .iter()
        .zip(window)
        .filter(|&(&p, &r)| !compatible(p, r))
        .count())
}

/// A validated, upper-case primer sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Primer {
    seq: Vec<u8>,
}

impl Primer {
    pub fn new(seq: impl AsRef<[u8]>) -> Result<Self> {
        let seq = seq.as_ref().to_ascii_uppercase();

        if seq.is_empty() {
            return Err(TrimError::EmptyPrimer);
        }

        if let Some(&bad) = seq.iter().find(|&&b| PRIMER_MASKS[b as usize] == 0) {
            return Err(TrimError::InvalidPrimer {
                primer: String::from_utf8_lossy(&seq).into_owned(),
                symbol: bad as char,
            });
        }

        Ok(Self { seq })
    }

    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.seq
    }

    pub fn distance(&self, window: &[u8]) -> Result<usize> {
        distance(&self.seq, window)
    }
}

impl fmt::Display for Primer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.as_bytes()))
    }
}
