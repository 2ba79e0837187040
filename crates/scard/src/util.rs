//! Multi-string codec for reader and group listings
//!
//! The service reports name lists as a sequence of null-terminated strings
//! followed by an extra null (a "multi-string").

/// Split a multi-string buffer into its member names
///
/// Trailing terminators and empty members are dropped; a buffer of only
/// terminators decodes to an empty list.
pub(crate) fn decode_multi_string(buf: &[u8]) -> Vec<String> {
    buf.split(|&b| b == 0)
        .filter(|s| !s.is_empty())
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_two_names() {
        let buf = b"Reader A\0Reader B\0\0";
        assert_eq!(decode_multi_string(buf), vec!["Reader A", "Reader B"]);
    }

    #[test]
    fn decodes_single_name_without_final_terminator() {
        assert_eq!(decode_multi_string(b"Reader A\0"), vec!["Reader A"]);
    }

    #[test]
    fn empty_buffer_decodes_to_no_names() {
        assert!(decode_multi_string(b"").is_empty());
        assert!(decode_multi_string(b"\0").is_empty());
        assert!(decode_multi_string(b"\0\0").is_empty());
    }

    #[test]
    fn non_utf8_names_are_replaced_not_dropped() {
        let buf = b"Reader \xff\0\0";
        let names = decode_multi_string(buf);
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("Reader "));
    }
}
