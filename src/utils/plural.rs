//! Count formatting for log lines.

/// `"1 file"`, `"3 files"`, `"0 warnings"`.
pub fn plural_count(count: usize, noun: &str) -> String {
    let suffix = if count == 1 { "" } else { "s" };
    format!("{count} {noun}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plural_count() {
        assert_eq!(plural_count(0, "warning"), "0 warnings");
        assert_eq!(plural_count(1, "file"), "1 file");
        assert_eq!(plural_count(12, "file"), "12 files");
    }
}
