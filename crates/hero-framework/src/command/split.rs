use thiserror::Error;

/// A message body that cannot be split into words.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SplitError {
    #[error("unclosed {0} quote")]
    UnclosedQuote(char),
}

/// Shell-like splitting of a command line.
///
/// Handles:
/// - Whitespace-separated words
/// - Quoted words (single and double quotes)
/// - Backslash escapes inside double quotes
pub fn shell_split(input: &str) -> Result<Vec<String>, SplitError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut in_single_quote = false;
    let mut in_double_quote = false;
    let mut escape_next = false;

    for ch in input.chars() {
        if escape_next {
            current.push(ch);
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_double_quote => {
                escape_next = true;
            }
            '\'' if !in_double_quote => {
                in_single_quote = !in_single_quote;
                in_word = true;
            }
            '"' if !in_single_quote => {
                in_double_quote = !in_double_quote;
                in_word = true;
            }
            c if c.is_whitespace() && !in_single_quote && !in_double_quote => {
                if in_word {
                    args.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            _ => {
                current.push(ch);
                in_word = true;
            }
        }
    }

    if in_single_quote {
        return Err(SplitError::UnclosedQuote('\''));
    }
    if in_double_quote {
        return Err(SplitError::UnclosedQuote('"'));
    }
    if in_word {
        args.push(current);
    }

    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_words_split_on_whitespace() {
        let args = shell_split("settings set_prefix ?").unwrap();
        assert_eq!(args, vec!["settings", "set_prefix", "?"]);
    }

    #[test]
    fn double_quotes_group_words() {
        let args = shell_split(r#"set_description "a friendly bot" now"#).unwrap();
        assert_eq!(args, vec!["set_description", "a friendly bot", "now"]);
    }

    #[test]
    fn single_quotes_are_literal() {
        let args = shell_split("echo 'hello world'").unwrap();
        assert_eq!(args, vec!["echo", "hello world"]);
    }

    #[test]
    fn backslash_escapes_inside_double_quotes() {
        let args = shell_split(r#"echo "say \"hi\"""#).unwrap();
        assert_eq!(args, vec!["echo", r#"say "hi""#]);
    }

    #[test]
    fn empty_quotes_yield_an_empty_word() {
        let args = shell_split(r#"set_status """#).unwrap();
        assert_eq!(args, vec!["set_status", ""]);
    }

    #[test]
    fn runs_of_whitespace_collapse() {
        let args = shell_split("  ping \t  now\n").unwrap();
        assert_eq!(args, vec!["ping", "now"]);
    }

    #[test]
    fn unclosed_quote_is_an_error() {
        assert_eq!(
            shell_split("echo \"oops"),
            Err(SplitError::UnclosedQuote('"'))
        );
    }
}
