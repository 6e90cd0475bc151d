//! Short-hash candidates and the space they are enumerated from.

use std::fmt;

use super::config::{ConfigError, MAX_HASH_DIGITS, MIN_HASH_DIGITS};

/// A lowercase hexadecimal short hash to probe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CandidateHash(String);

impl CandidateHash {
  /// Render `value` as lowercase hex with no prefix and no padding
  pub fn from_value(value: u64) -> Self {
    Self(format!("{:x}", value))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl From<&str> for CandidateHash {
  fn from(value: &str) -> Self {
    Self(value.to_lowercase())
  }
}

impl AsRef<str> for CandidateHash {
  fn as_ref(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for CandidateHash {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Every `digits`-wide hex value, i.e. the closed range `[16^(d-1), 16^d - 1]`.
///
/// Values below `16^(d-1)` are skipped since they would need leading zeros to
/// reach `d` digits. The space only holds its bounds, so it can be iterated
/// any number of times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashSpace {
  digits: u32,
  first: u64,
  last: u64,
}

impl HashSpace {
  pub fn new(digits: u32) -> Result<Self, ConfigError> {
    if !(MIN_HASH_DIGITS..=MAX_HASH_DIGITS).contains(&digits) {
      return Err(ConfigError::Digits(digits));
    }

    Ok(Self {
      digits,
      first: 16u64.pow(digits - 1),
      last: 16u64.pow(digits) - 1,
    })
  }

  pub fn digits(&self) -> u32 {
    self.digits
  }

  pub fn first(&self) -> u64 {
    self.first
  }

  pub fn last(&self) -> u64 {
    self.last
  }

  /// Number of candidates: `16^d - 16^(d-1)`
  pub fn len(&self) -> u64 {
    self.last - self.first + 1
  }

  pub fn is_empty(&self) -> bool {
    false
  }

  /// Candidates in ascending numeric order
  pub fn iter(&self) -> impl Iterator<Item = CandidateHash> + Send + 'static {
    (self.first..=self.last).map(CandidateHash::from_value)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_four_digit_bounds() {
    let space = HashSpace::new(4).unwrap();
    assert_eq!(space.first(), 0x1000);
    assert_eq!(space.last(), 0xffff);
    assert_eq!(space.len(), 16u64.pow(4) - 16u64.pow(3));

    let mut iter = space.iter();
    assert_eq!(iter.next().unwrap().as_str(), "1000");
    assert_eq!(iter.next().unwrap().as_str(), "1001");
    assert_eq!(space.iter().last().unwrap().as_str(), "ffff");
  }

  #[test]
  fn test_sequence_is_ascending_and_fixed_width() {
    let space = HashSpace::new(4).unwrap();
    let hashes: Vec<CandidateHash> = space.iter().collect();

    assert_eq!(hashes.len() as u64, space.len());
    for pair in hashes.windows(2) {
      let a = u64::from_str_radix(pair[0].as_str(), 16).unwrap();
      let b = u64::from_str_radix(pair[1].as_str(), 16).unwrap();
      assert!(a < b);
    }
    for hash in &hashes {
      assert_eq!(hash.as_str().len(), 4);
      assert!(!hash.as_str().starts_with("0x"));
      assert!(hash.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
  }

  #[test]
  fn test_counts_for_wider_spaces() {
    for digits in 5..=8 {
      let space = HashSpace::new(digits).unwrap();
      assert_eq!(space.len(), 16u64.pow(digits) - 16u64.pow(digits - 1));
      assert_eq!(space.iter().next().unwrap().as_str().len(), digits as usize);
    }

    let widest = HashSpace::new(MAX_HASH_DIGITS).unwrap();
    assert_eq!(widest.iter().next().unwrap().as_str(), "100000000000000");
  }

  #[test]
  fn test_space_is_restartable() {
    let space = HashSpace::new(4).unwrap();
    let first: Vec<_> = space.iter().take(3).collect();
    let again: Vec<_> = space.iter().take(3).collect();
    assert_eq!(first, again);
  }

  #[test]
  fn test_rejects_out_of_range_digits() {
    assert!(matches!(HashSpace::new(3), Err(ConfigError::Digits(3))));
    assert!(matches!(HashSpace::new(16), Err(ConfigError::Digits(16))));
  }

  #[test]
  fn test_candidate_from_str_lowercases() {
    assert_eq!(CandidateHash::from("BEEF").as_str(), "beef");
    assert_eq!(CandidateHash::from_value(0xbeef).to_string(), "beef");
  }
}
