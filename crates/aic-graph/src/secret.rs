//! Generated credentials
//!
//! Mirrors the character-class rules of a managed secret store's
//! `GenerateSecretString`: every included class appears at least once and
//! excluded classes never appear.

use rand::seq::SliceRandom;
use rand::Rng;

const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
const PUNCTUATION: &[u8] = b"!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

/// Default length used by the secret store
pub const DEFAULT_PASSWORD_LENGTH: usize = 32;

/// Character-class policy for generated passwords
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordPolicy {
    /// Minimum password length
    pub length: usize,
    /// Leave out ASCII punctuation
    pub exclude_punctuation: bool,
    /// Allow the space character
    pub include_space: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            length: DEFAULT_PASSWORD_LENGTH,
            exclude_punctuation: false,
            include_space: false,
        }
    }
}

impl PasswordPolicy {
    /// Alphanumeric only, no spaces
    pub fn alphanumeric(length: usize) -> Self {
        Self {
            length,
            exclude_punctuation: true,
            include_space: false,
        }
    }

    fn classes(&self) -> Vec<&'static [u8]> {
        let mut classes = vec![LOWERCASE, UPPERCASE, DIGITS];
        if !self.exclude_punctuation {
            classes.push(PUNCTUATION);
        }
        if self.include_space {
            classes.push(b" ");
        }
        classes
    }

    /// Generate a password satisfying the policy
    ///
    /// The result is never shorter than the number of required classes.
    pub fn generate<R: Rng>(&self, rng: &mut R) -> String {
        let classes = self.classes();
        let alphabet: Vec<u8> = classes.iter().flat_map(|c| c.iter().copied()).collect();
        let length = self.length.max(classes.len());

        let mut out: Vec<u8> = classes
            .iter()
            .map(|class| class[rng.random_range(0..class.len())])
            .collect();
        while out.len() < length {
            out.push(alphabet[rng.random_range(0..alphabet.len())]);
        }
        out.shuffle(rng);

        out.into_iter().map(char::from).collect()
    }

    /// Whether `candidate` could have been produced under this policy
    pub fn admits(&self, candidate: &str) -> bool {
        let bytes = candidate.as_bytes();
        let classes = self.classes();
        let allowed = |b: &u8| classes.iter().any(|class| class.contains(b));

        candidate.is_ascii()
            && bytes.len() >= self.length.max(classes.len())
            && bytes.iter().all(allowed)
            && classes
                .iter()
                .filter(|class| **class != b" ".as_slice())
                .all(|class| bytes.iter().any(|b| class.contains(b)))
    }
}
