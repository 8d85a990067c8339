//! Bounded rolling log buffer

use parking_lot::Mutex;

/// Characters retained by default; older output is truncated from the front.
const DEFAULT_CAP: usize = 8000;

/// Append-only text buffer that keeps only the most recent output.
///
/// Appends past the capacity evict the oldest characters, so the contents
/// are always a suffix of everything ever appended. Truncation lands on a
/// UTF-8 character boundary.
pub struct LogBuffer {
    inner: Mutex<String>,
    cap: usize,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAP)
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            inner: Mutex::new(String::new()),
            cap,
        }
    }

    /// Append a chunk, evicting the oldest characters when over capacity.
    pub fn append(&self, chunk: &str) {
        let mut buf = self.inner.lock();
        buf.push_str(chunk);
        if buf.len() > self.cap {
            let mut cut = buf.len() - self.cap;
            while !buf.is_char_boundary(cut) {
                cut += 1;
            }
            buf.drain(..cut);
        }
    }

    /// Snapshot of the current contents.
    pub fn contents(&self) -> String {
        self.inner.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_exceeds_capacity() {
        let buf = LogBuffer::new();
        for _ in 0..2000 {
            buf.append("0123456789");
        }
        assert!(buf.len() <= 8000);
    }

    #[test]
    fn contents_are_a_suffix_of_all_appends() {
        let buf = LogBuffer::with_capacity(32);
        let mut full = String::new();
        for i in 0..50 {
            let chunk = format!("line {}\n", i);
            buf.append(&chunk);
            full.push_str(&chunk);
        }
        let tail = buf.contents();
        assert!(tail.len() <= 32);
        assert!(full.ends_with(&tail));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let buf = LogBuffer::with_capacity(10);
        for _ in 0..20 {
            buf.append("héllo");
        }
        // must not panic and must stay valid UTF-8 within the cap
        let tail = buf.contents();
        assert!(tail.len() <= 10);
        assert!(tail.chars().count() > 0);
    }

    #[test]
    fn small_appends_accumulate() {
        let buf = LogBuffer::new();
        buf.append("a");
        buf.append("b");
        assert_eq!(buf.contents(), "ab");
    }
}
