//! Minimal shell command tokenization for rule predicates.
//!
//! This is not a shell parser; rules only need the program name, the
//! short/long flags, and the remaining operand tokens. Quoting is
//! honored just enough that `rm "my file"` yields one operand.

/// A whitespace/quote tokenized command with `sudo` and leading
/// `VAR=value` assignments stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub program: String,
    pub flags: Vec<String>,
    pub operands: Vec<String>,
    pub elevated: bool,
}

/// Split a command line into tokens, honoring single and double quotes.
pub fn tokenize(command: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for ch in command.chars() {
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                } else {
                    current.push(ch);
                }
            }
            None => match ch {
                '\'' | '"' => quote = Some(ch),
                c if c.is_whitespace() => {
                    if !current.is_empty() {
                        tokens.push(std::mem::take(&mut current));
                    }
                }
                c => current.push(c),
            },
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Parse a command into program / flags / operands.
///
/// Returns None for an empty line. Only the first pipeline stage is
/// parsed; pipe-sensitive rules match on the raw text instead.
pub fn parse(command: &str) -> Option<ParsedCommand> {
    let mut tokens = tokenize(command).into_iter().peekable();

    let mut elevated = false;
    let mut program = tokens.next()?;

    // Skip leading environment assignments and sudo/doas prefixes.
    loop {
        if program == "sudo" || program == "doas" {
            elevated = true;
            program = tokens.next()?;
        } else if program.contains('=') && !program.starts_with('-') {
            program = tokens.next()?;
        } else {
            break;
        }
    }

    let mut flags = Vec::new();
    let mut operands = Vec::new();
    for token in tokens {
        // Stop at the first shell operator; later stages are out of
        // scope for operand-based rules.
        if matches!(token.as_str(), "|" | "||" | "&&" | ";") {
            break;
        }
        if token.starts_with('-') && token.len() > 1 {
            flags.push(token);
        } else {
            operands.push(token);
        }
    }

    Some(ParsedCommand {
        program,
        flags,
        operands,
        elevated,
    })
}

impl ParsedCommand {
    /// True if any short flag group contains `c` (e.g. `-rf` has 'r')
    /// or an exact long flag matches (e.g. `--recursive`).
    pub fn has_flag(&self, c: char, long: &str) -> bool {
        self.flags.iter().any(|f| {
            if let Some(rest) = f.strip_prefix("--") {
                rest == long
            } else {
                f[1..].contains(c)
            }
        })
    }

    pub fn has_long_flag(&self, long: &str) -> bool {
        self.flags.iter().any(|f| f == &format!("--{long}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_quotes() {
        assert_eq!(
            tokenize(r#"rm "my file" other"#),
            vec!["rm", "my file", "other"]
        );
        assert_eq!(tokenize("echo 'a b'"), vec!["echo", "a b"]);
    }

    #[test]
    fn test_parse_strips_sudo_and_env() {
        let parsed = parse("sudo FOO=1 rm -rf /tmp/x").unwrap();
        assert_eq!(parsed.program, "rm");
        assert!(parsed.elevated);
        assert_eq!(parsed.flags, vec!["-rf"]);
        assert_eq!(parsed.operands, vec!["/tmp/x"]);
    }

    #[test]
    fn test_parse_stops_at_pipe() {
        let parsed = parse("ls -la | grep foo").unwrap();
        assert_eq!(parsed.program, "ls");
        assert_eq!(parsed.operands, Vec::<String>::new());
    }

    #[test]
    fn test_has_flag() {
        let parsed = parse("rm -r --force a").unwrap();
        assert!(parsed.has_flag('r', "recursive"));
        assert!(parsed.has_flag('f', "force"));
        assert!(!parsed.has_flag('i', "interactive"));
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse("   ").is_none());
        assert!(parse("sudo").is_none());
    }
}
