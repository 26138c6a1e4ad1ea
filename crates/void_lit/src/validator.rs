//! Light block validation
//!
//! Structural self-check run on the printed text of every light block before
//! it is spliced into the program. Blocks are built from a nested IR, so a
//! failure here means the printer or the expander is broken, never that the
//! caller passed bad input.

use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("line {line}: '{found}' closes '{open}' opened on line {opened}")]
    Mismatched {
        line: usize,
        opened: usize,
        open: &'static str,
        found: &'static str,
    },

    #[error("line {line}: '{found}' without a matching opener")]
    UnexpectedClose { line: usize, found: &'static str },

    #[error("line {line}: '{open}' is never closed")]
    Unclosed { line: usize, open: &'static str },

    #[error("line {line}: unterminated string literal")]
    UnterminatedString { line: usize },

    #[error("{0}")]
    Rule(String),
}

/// Result of block validation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    /// Balanced `{ }` pairs
    pub scopes: usize,
    /// Balanced `( )` and `[ ]` pairs
    pub groups: usize,
    /// Balanced `#if*` / `#endif` sections
    pub conditionals: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Open {
    Brace,
    Paren,
    Bracket,
    Conditional,
}

impl Open {
    fn token(self) -> &'static str {
        match self {
            Self::Brace => "{",
            Self::Paren => "(",
            Self::Bracket => "[",
            Self::Conditional => "#if",
        }
    }
}

/// Checks printed blocks for balanced scopes and conditional sections
pub struct BlockValidator {
    /// Extra rules run after the balance check
    rules: Vec<Box<dyn ValidationRule>>,
}

impl BlockValidator {
    /// Validator with only the balance check
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Add a custom validation rule
    pub fn add_rule(&mut self, rule: Box<dyn ValidationRule>) {
        self.rules.push(rule);
    }

    /// Add a rule, builder style
    pub fn with_rule(mut self, rule: Box<dyn ValidationRule>) -> Self {
        self.add_rule(rule);
        self
    }

    /// Validate one printed block
    pub fn validate(&self, text: &str) -> Result<ValidationResult, ValidationError> {
        let result = check_balance(text)?;
        for rule in &self.rules {
            rule.validate(text)?;
        }
        Ok(result)
    }
}

impl Default for BlockValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Scan `text` and match every opener with its closer
pub fn check_balance(text: &str) -> Result<ValidationResult, ValidationError> {
    let mut stack: Vec<(Open, usize)> = Vec::new();
    let mut result = ValidationResult::default();

    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw.trim_start();

        if let Some(directive) = trimmed.strip_prefix('#') {
            let word = directive.split_whitespace().next().unwrap_or("");
            match word {
                "if" | "ifdef" | "ifndef" => stack.push((Open::Conditional, line)),
                "else" | "elif" => match stack.last() {
                    Some((Open::Conditional, _)) => {}
                    Some(&(open, opened)) => {
                        return Err(ValidationError::Mismatched {
                            line,
                            opened,
                            open: open.token(),
                            found: "#else",
                        })
                    }
                    None => {
                        return Err(ValidationError::UnexpectedClose { line, found: "#else" })
                    }
                },
                "endif" => {
                    close(&mut stack, Open::Conditional, "#endif", line)?;
                    result.conditionals += 1;
                }
                _ => {}
            }
            continue;
        }

        let code = match trimmed.find("//") {
            Some(pos) => &trimmed[..pos],
            None => trimmed,
        };

        let mut in_string = false;
        for c in code.chars() {
            if in_string {
                in_string = c != '"';
                continue;
            }
            match c {
                '"' => in_string = true,
                '{' => stack.push((Open::Brace, line)),
                '(' => stack.push((Open::Paren, line)),
                '[' => stack.push((Open::Bracket, line)),
                '}' => {
                    close(&mut stack, Open::Brace, "}", line)?;
                    result.scopes += 1;
                }
                ')' => {
                    close(&mut stack, Open::Paren, ")", line)?;
                    result.groups += 1;
                }
                ']' => {
                    close(&mut stack, Open::Bracket, "]", line)?;
                    result.groups += 1;
                }
                _ => {}
            }
        }
        if in_string {
            return Err(ValidationError::UnterminatedString { line });
        }
    }

    match stack.pop() {
        Some((open, line)) => Err(ValidationError::Unclosed {
            line,
            open: open.token(),
        }),
        None => Ok(result),
    }
}

fn close(
    stack: &mut Vec<(Open, usize)>,
    expected: Open,
    found: &'static str,
    line: usize,
) -> Result<(), ValidationError> {
    match stack.pop() {
        Some((open, _)) if open == expected => Ok(()),
        Some((open, opened)) => Err(ValidationError::Mismatched {
            line,
            opened,
            open: open.token(),
            found,
        }),
        None => Err(ValidationError::UnexpectedClose { line, found }),
    }
}

/// Custom validation rule trait
pub trait ValidationRule: Send + Sync {
    /// Validate the block text, return error if invalid
    fn validate(&self, text: &str) -> Result<(), ValidationError>;
}

/// Rejects references to another slot's `lightN_` names
pub struct SlotIsolationRule {
    pub slot: usize,
}

impl ValidationRule for SlotIsolationRule {
    fn validate(&self, text: &str) -> Result<(), ValidationError> {
        let bytes = text.as_bytes();
        let mut search = 0;
        while let Some(pos) = text[search..].find("light") {
            let start = search + pos;
            search = start + "light".len();

            let boundary = start == 0 || {
                let prev = bytes[start - 1];
                !(prev.is_ascii_alphanumeric() || prev == b'_')
            };
            if !boundary {
                continue;
            }

            let digits: String = text[search..]
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            if digits.is_empty() || !text[search + digits.len()..].starts_with('_') {
                continue;
            }
            if digits.parse::<usize>().ok() != Some(self.slot) {
                return Err(ValidationError::Rule(format!(
                    "block for slot {} references 'light{}_'",
                    self.slot, digits
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK: &str = r#"
void evaluateLight0() {
    vec3 lightDirW = light0_direction;
    if (attenuation > 0.00001) {
        dDiffuseLight += attenuation * light0_color;
    }
    #ifdef LIT_LIGHTMAPPER
    dAtten = attenuation;
    #endif
}
"#;

    #[test]
    fn test_balanced_block() {
        let result = check_balance(BLOCK).unwrap();
        assert_eq!(result.scopes, 2);
        assert_eq!(result.conditionals, 1);
        assert_eq!(result.groups, 2);
    }

    #[test]
    fn test_unclosed_scope() {
        let err = check_balance("void f() {\n    if (x > 0.0) {\n}\n").unwrap_err();
        assert_eq!(err, ValidationError::Unclosed { line: 1, open: "{" });
    }

    #[test]
    fn test_unexpected_close() {
        let err = check_balance("x = f(a));\n").unwrap_err();
        assert!(matches!(err, ValidationError::UnexpectedClose { line: 1, found: ")" }));
    }

    #[test]
    fn test_conditional_crossing_scope() {
        let text = "void f() {\n#ifdef A\n}\n#endif\n";
        let err = check_balance(text).unwrap_err();
        assert!(matches!(err, ValidationError::Mismatched { line: 3, open: "#if", .. }));
    }

    #[test]
    fn test_stray_endif() {
        let err = check_balance("#endif\n").unwrap_err();
        assert!(matches!(err, ValidationError::UnexpectedClose { found: "#endif", .. }));
    }

    #[test]
    fn test_comments_and_strings_ignored() {
        let text = "#include \"chunk{\"\n// unmatched ( in a comment\nx = 1.0; // }\n";
        assert!(check_balance(text).is_ok());
    }

    #[test]
    fn test_slot_isolation_rule() {
        let validator = BlockValidator::new().with_rule(Box::new(SlotIsolationRule { slot: 0 }));
        assert!(validator.validate(BLOCK).is_ok());

        let leaking = "x = light1_color * lightDirW;\n";
        assert!(matches!(validator.validate(leaking), Err(ValidationError::Rule(_))));

        // `dlight3_x` and `light_x` are not slot names
        assert!(validator.validate("dlight3_x = light_x;\n").is_ok());
    }
}
