//! ANSI escape stripping for error text

use once_cell::sync::Lazy;
use regex::Regex;

// CSI/OSC sequences introduced by ESC or the 8-bit CSI byte.
static ANSI_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"[\x1B\x{9B}][\[\]()#;?]*",
        r"(?:(?:(?:(?:;[-a-zA-Z\d/#&.:=?%@~_]+)*",
        r"|[a-zA-Z\d]+(?:;[-a-zA-Z\d/#&.:=?%@~_]*)*)?\x07)",
        r"|(?:(?:\d{1,4}(?:;\d{0,4})*)?[\dA-PR-TZcf-nq-uy=><~]))",
    ))
    .expect("ANSI pattern is valid")
});

/// Remove terminal colour and cursor sequences
pub fn strip_ansi(text: &str) -> String {
    ANSI_PATTERN.replace_all(text, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("\u{1b}[31mTest failed\u{1b}[0m", "Test failed"; "color codes")]
    #[test_case("plain text", "plain text"; "no escapes")]
    #[test_case("\u{1b}[1;32mok\u{1b}[39m done", "ok done"; "compound parameters")]
    #[test_case("\u{1b}]8;;https://example.com\u{7}link\u{1b}]8;;\u{7}", "link"; "hyperlink")]
    #[test_case("\u{1b}[2K\u{1b}[1Gprogress", "progress"; "cursor control")]
    fn test_strip_ansi(input: &str, expected: &str) {
        assert_eq!(strip_ansi(input), expected);
    }

    #[test]
    fn test_strip_preserves_multiline_stack() {
        let stack = "\u{1b}[90mat foo (a.js:1:1)\u{1b}[39m\n\u{1b}[90mat bar (b.js:2:2)\u{1b}[39m";
        assert_eq!(strip_ansi(stack), "at foo (a.js:1:1)\nat bar (b.js:2:2)");
    }
}
