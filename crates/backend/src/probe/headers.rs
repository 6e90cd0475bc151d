// Randomised request headers for commit probes
//
// Each probe carries seven spoofed-origin headers with random dotted quads and
// a random five character user agent. None of this is security relevant, so a
// small xorshift generator is plenty.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};

/// Headers that each get an independent random IP
pub const SPOOFED_IP_HEADERS: [&str; 7] = [
  "X-Originating-IP",
  "X-Forwarded-For",
  "X-Remote-IP",
  "X-Remote-Addr",
  "X-Client-IP",
  "X-Host",
  "X-Forwarded-Host",
];

const USER_AGENT_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const USER_AGENT_LEN: usize = 5;
/// Octets are drawn from `0..=127`
const OCTET_SPAN: u64 = 128;
const GOLDEN_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;

/// Xorshift64 generator (Marsaglia 13/7/17).
#[derive(Debug, Clone)]
pub struct XorShift64 {
  state: u64,
}

impl XorShift64 {
  pub fn new(seed: u64) -> Self {
    // zero is the one state xorshift never leaves
    let seed = if seed == 0 { GOLDEN_GAMMA } else { seed };
    Self { state: seed }
  }

  pub fn next_u64(&mut self) -> u64 {
    let mut x = self.state;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    self.state = x;
    x
  }

  /// Value in `0..upper`
  pub fn below(&mut self, upper: u64) -> u64 {
    self.next_u64() % upper
  }
}

/// Hands out independently seeded generators from shared, lock-free state.
///
/// Seeds advance by a fixed gamma and are scrambled with the SplitMix64
/// finaliser, so concurrent callers never share a stream.
#[derive(Debug)]
pub struct SeedSequence {
  next: AtomicU64,
}

impl SeedSequence {
  pub fn new(seed: u64) -> Self {
    Self {
      next: AtomicU64::new(seed),
    }
  }

  /// Seed from the wall clock
  pub fn from_clock() -> Self {
    let nanos = SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .unwrap_or_default()
      .as_nanos() as u64;
    Self::new(nanos)
  }

  pub fn generator(&self) -> XorShift64 {
    let mut z = self.next.fetch_add(GOLDEN_GAMMA, Ordering::Relaxed).wrapping_add(GOLDEN_GAMMA);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    XorShift64::new(z ^ (z >> 31))
  }
}

/// Random dotted quad with every octet in `0..=127`
pub fn random_ip(rng: &mut XorShift64) -> String {
  let [a, b, c, d] = std::array::from_fn(|_| rng.below(OCTET_SPAN));
  format!("{}.{}.{}.{}", a, b, c, d)
}

/// Random five character `[a-z0-9]` user agent
pub fn random_user_agent(rng: &mut XorShift64) -> String {
  (0..USER_AGENT_LEN)
    .map(|_| USER_AGENT_ALPHABET[rng.below(USER_AGENT_ALPHABET.len() as u64) as usize] as char)
    .collect()
}

/// Full header set for one probe request
pub fn spoofed_headers(rng: &mut XorShift64) -> HeaderMap {
  let mut headers = HeaderMap::with_capacity(SPOOFED_IP_HEADERS.len() + 1);

  for name in SPOOFED_IP_HEADERS {
    // generated values are plain ASCII and the names are static, so both conversions hold
    if let (Ok(name), Ok(value)) = (
      HeaderName::from_bytes(name.as_bytes()),
      HeaderValue::from_str(&random_ip(rng)),
    ) {
      headers.insert(name, value);
    }
  }

  if let Ok(agent) = HeaderValue::from_str(&random_user_agent(rng)) {
    headers.insert(USER_AGENT, agent);
  }

  headers
}
