//! POSIX.1-2001 extended header records.
//!
//! A record is `"<len> <key>=<value>\n"` where `<len>` is the decimal length
//! of the whole record, its own digits included.
use std::collections::BTreeMap;

/// Keyword prefix for extended attributes understood by GNU tar, bsdtar and
/// Python's `tarfile`.
pub const XATTR_PREFIX: &str = "SCHILY.xattr.";

/// Ordered set of extended header records for one entry.
///
/// Records are kept sorted by key so encoding is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaxRecords {
    records: BTreeMap<String, Vec<u8>>,
}

impl PaxRecords {
    /// No records.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a record, replacing any previous value for the key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.records.insert(key.into(), value.into());
    }

    /// Add an extended attribute record.
    pub fn insert_xattr(&mut self, name: &str, value: &[u8]) {
        self.insert(format!("{XATTR_PREFIX}{name}"), value);
    }

    /// Returns `true` if there is nothing to encode.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Encode every record, sorted by key.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (key, value) in &self.records {
            encode_record(&mut out, key, value);
        }
        out
    }
}

/// Append one record to `out`.
pub fn encode_record(out: &mut Vec<u8>, key: &str, value: &[u8]) {
    let len = record_len(key.len() + value.len() + 3);
    out.extend_from_slice(len.to_string().as_bytes());
    out.push(b' ');
    out.extend_from_slice(key.as_bytes());
    out.push(b'=');
    out.extend_from_slice(value);
    out.push(b'\n');
}

/// Total record length for a body of `base` bytes (space, `=` and newline
/// included), accounting for the digits of the length itself.
fn record_len(base: usize) -> usize {
    let mut len = base + digits(base);
    loop {
        let next = base + digits(len);
        if next == len {
            return len;
        }
        len = next;
    }
}

const fn digits(mut n: usize) -> usize {
    let mut count = 1;
    while n >= 10 {
        n /= 10;
        count += 1;
    }
    count
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn record(key: &str, value: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        encode_record(&mut out, key, value);
        out
    }

    #[test]
    fn length_counts_its_own_digits() {
        let r = record("SCHILY.xattr.user.managed", b"true");
        assert_eq!(r, b"34 SCHILY.xattr.user.managed=true\n".to_vec());
        assert_eq!(r.len(), 34);
    }

    #[test]
    fn length_rolls_over_digit_boundary() {
        // body of 96 bytes: 96 + 2 = 98, fits in two digits
        let r = record("k", &[b'v'; 92]);
        assert_eq!(r.len(), 98);
        assert!(r.starts_with(b"98 "));
        // body of 98 bytes: 98 + 2 = 100 needs three digits, so 101
        let r = record("k", &[b'v'; 94]);
        assert_eq!(r.len(), 101);
        assert!(r.starts_with(b"101 "));
    }

    #[test]
    fn values_are_raw_bytes() {
        let r = record("SCHILY.xattr.user.bin", &[0, 0xff, b'\n']);
        assert!(r.ends_with(&[b'=', 0, 0xff, b'\n', b'\n']));
    }

    #[test]
    fn records_are_sorted_by_key() {
        let mut records = PaxRecords::new();
        records.insert_xattr("user.b", b"2");
        records.insert("path", "a/very/long/path");
        records.insert_xattr("user.a", b"1");
        let text = String::from_utf8(records.encode()).unwrap();
        let keys: Vec<&str> = text
            .lines()
            .map(|l| l.split_once(' ').unwrap().1.split_once('=').unwrap().0)
            .collect();
        assert_eq!(keys, vec!["SCHILY.xattr.user.a", "SCHILY.xattr.user.b", "path"]);
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn empty_records_encode_to_nothing() {
        assert!(PaxRecords::new().encode().is_empty());
        assert!(PaxRecords::new().is_empty());
    }
}
