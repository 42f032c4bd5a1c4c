/// Compute the BLAKE3 hash of a byte slice, returning the hex-encoded digest.
///
/// Used to recognise content the engine wrote itself when the watcher
/// reports it back.
#[must_use]
pub fn content_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_known_value() {
        // Known BLAKE3 hash of "hello world"
        assert_eq!(
            content_hash(b"hello world"),
            "d74981efa70a0c880b8d8c1985d075dbcbf679b99a5f9914e5aaf96b831a9e24"
        );
    }

    #[test]
    fn test_content_hash_differs_on_change() {
        assert_ne!(content_hash(b"{\"a\":1}"), content_hash(b"{\"a\":2}"));
    }
}
