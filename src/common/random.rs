use rand::Rng;

const SEQ_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Source of randomness for link generation.
///
/// Reality links pick a server name and short id per generation and carry a
/// fresh spider path, so that repeated fetches of the same subscription do not
/// produce identical fingerprints.
pub trait RandomSource: Send + Sync {
    /// Uniform index in `0..len`. `len` is never zero.
    fn index(&self, len: usize) -> usize;

    /// Alphanumeric string of exactly `len` characters.
    fn seq(&self, len: usize) -> String;
}

/// Thread-local CSPRNG backed source.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn index(&self, len: usize) -> usize {
        rand::thread_rng().gen_range(0..len)
    }

    fn seq(&self, len: usize) -> String {
        let mut rng = rand::thread_rng();
        (0..len)
            .map(|_| SEQ_CHARSET[rng.gen_range(0..SEQ_CHARSET.len())] as char)
            .collect()
    }
}

/// Deterministic source: always the same index (clamped), a fixed filler char.
#[derive(Debug, Clone, Copy)]
pub struct FixedRandom {
    pub index: usize,
    pub fill: char,
}

impl FixedRandom {
    pub fn new(index: usize, fill: char) -> Self {
        Self { index, fill }
    }
}

impl RandomSource for FixedRandom {
    fn index(&self, len: usize) -> usize {
        self.index.min(len.saturating_sub(1))
    }

    fn seq(&self, len: usize) -> String {
        std::iter::repeat(self.fill).take(len).collect()
    }
}

/// Pick one element uniformly; `None` for an empty slice.
pub fn choose<'a, T>(random: &dyn RandomSource, items: &'a [T]) -> Option<&'a T> {
    if items.is_empty() {
        return None;
    }
    items.get(random.index(items.len()))
}
