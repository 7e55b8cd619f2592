use crate::error::{Error, Result};

/// Split a command string into words using shell quoting rules.
///
/// Rules:
/// - Words are separated by unquoted whitespace.
/// - Single quotes are literal: every byte up to the closing quote is kept.
/// - Inside double quotes, backslash escapes only `"`, `\`, `$`, and
///   backtick; any other backslash is kept verbatim.
/// - Outside quotes, a backslash escapes the next character.
/// - A backslash immediately before a newline is a line continuation and
///   both characters are dropped.
/// - An unterminated quote is an error.
pub fn split(input: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut has_word = false;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if has_word {
                    words.push(std::mem::take(&mut current));
                    has_word = false;
                }
            }
            '\'' => {
                has_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => current.push(c),
                        None => {
                            return Err(Error::Cli(
                                "unterminated single quote in curl command".into(),
                            ));
                        }
                    }
                }
            }
            '"' => {
                has_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(esc @ ('"' | '\\' | '$' | '`')) => current.push(esc),
                            Some('\n') => {}
                            Some(other) => {
                                current.push('\\');
                                current.push(other);
                            }
                            None => {
                                return Err(Error::Cli(
                                    "unterminated double quote in curl command".into(),
                                ));
                            }
                        },
                        Some(c) => current.push(c),
                        None => {
                            return Err(Error::Cli(
                                "unterminated double quote in curl command".into(),
                            ));
                        }
                    }
                }
            }
            '\\' => match chars.next() {
                // Line continuation: drop the backslash and the newline.
                Some('\n') => {}
                Some(esc) => {
                    has_word = true;
                    current.push(esc);
                }
                None => {
                    return Err(Error::Cli(
                        "trailing backslash in curl command".into(),
                    ));
                }
            },
            c => {
                has_word = true;
                current.push(c);
            }
        }
    }

    if has_word {
        words.push(current);
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(input: &str) -> Vec<String> {
        split(input).unwrap()
    }

    #[test]
    fn splits_on_whitespace() {
        assert_eq!(ok("curl -X POST url"), vec!["curl", "-X", "POST", "url"]);
        assert_eq!(ok("  a \t b \n c  "), vec!["a", "b", "c"]);
    }

    #[test]
    fn single_quotes_are_literal() {
        assert_eq!(ok(r#"'a b' c"#), vec!["a b", "c"]);
        assert_eq!(ok(r#"'\n$HOME"x"'"#), vec![r#"\n$HOME"x""#]);
    }

    #[test]
    fn double_quote_escapes() {
        assert_eq!(ok(r#""{\"k\":1}""#), vec![r#"{"k":1}"#]);
        assert_eq!(ok(r#""a\\b""#), vec![r"a\b"]);
        assert_eq!(ok(r#""\$HOME""#), vec!["$HOME"]);
        // Backslash before an unlisted character stays verbatim.
        assert_eq!(ok(r#""a\nb""#), vec![r"a\nb"]);
    }

    #[test]
    fn backslash_outside_quotes_escapes_next() {
        assert_eq!(ok(r"a\ b"), vec!["a b"]);
        assert_eq!(ok(r"\'"), vec!["'"]);
    }

    #[test]
    fn backslash_newline_continues_line() {
        assert_eq!(ok("curl \\\n -v url"), vec!["curl", "-v", "url"]);
    }

    #[test]
    fn adjacent_quoted_segments_join() {
        assert_eq!(ok(r#"a'b'"c"d"#), vec!["abcd"]);
    }

    #[test]
    fn empty_quotes_produce_empty_word() {
        assert_eq!(ok(r#"'' x"#), vec!["", "x"]);
        assert_eq!(ok(r#""""#), vec![""]);
    }

    #[test]
    fn unterminated_quotes_error() {
        assert!(split("'abc").is_err());
        assert!(split("\"abc").is_err());
        assert!(split("abc\\").is_err());
    }
}
