//! Arithmetic worker.
//!
//! Pulls the arithmetic expression out of the latest user message and
//! evaluates `+`, `-`, `*`, `/`, parentheses, and unary negation with a
//! recursive-descent parser.

use std::sync::OnceLock;

use futures::future::BoxFuture;
use regex::Regex;
use tracing::debug;

use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::traits::Worker;
use switchyard_core::types::{ConversationState, Message, WorkerReply};

pub struct MathWorker {
    name: String,
    description: String,
}

impl MathWorker {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
        }
    }
}

impl Worker for MathWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn run<'a>(&'a self, state: &'a ConversationState) -> BoxFuture<'a, Result<WorkerReply>> {
        Box::pin(async move {
            let request = state
                .last_user_message()
                .ok_or_else(|| SwitchyardError::worker(&self.name, "no user request to evaluate"))?;

            let expr = extract_expression(request).ok_or_else(|| {
                SwitchyardError::worker(&self.name, "no arithmetic expression found in the request")
            })?;
            debug!(worker = %self.name, expression = %expr, "Evaluating expression");

            let message = match evaluate(&expr) {
                Ok(value) => Message::worker(&self.name, format!("{} = {}", expr, format_number(value)))
                    .with_payload(serde_json::json!({
                        "expression": expr,
                        "result": value,
                    })),
                Err(e) => Message::worker(&self.name, format!("Error: {}", e)).with_payload(
                    serde_json::json!({
                        "expression": expr,
                        "error": e,
                    }),
                ),
            };

            Ok(WorkerReply::new(vec![message]))
        })
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

fn expression_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"[-+*/().\d\s]*\d[-+*/().\d\s]*").ok())
        .as_ref()
}

/// Whole-word spelled-out operators and their symbols.
fn operator_words() -> Option<&'static [(Regex, &'static str)]> {
    static WORDS: OnceLock<Option<Vec<(Regex, &'static str)>>> = OnceLock::new();
    WORDS
        .get_or_init(|| {
            [
                (r"\bmultiplied\s+by\b", "*"),
                (r"\bdivided\s+by\b", "/"),
                (r"\btimes\b", "*"),
                (r"\bplus\b", "+"),
                (r"\bminus\b", "-"),
            ]
            .into_iter()
            .map(|(pattern, symbol)| Regex::new(pattern).ok().map(|re| (re, symbol)))
            .collect()
        })
        .as_deref()
}

/// Find the arithmetic expression in free text.
///
/// Spelled-out operators are rewritten first. Among the candidate spans,
/// the longest one containing an operator wins; a bare number is the
/// fallback.
pub fn extract_expression(text: &str) -> Option<String> {
    let mut normalized = text.to_lowercase();
    for (word, symbol) in operator_words()? {
        normalized = word.replace_all(&normalized, *symbol).into_owned();
    }

    let has_operator = |s: &str| s.chars().skip(1).any(|c| "+-*/".contains(c));

    let candidates: Vec<&str> = expression_pattern()?
        .find_iter(&normalized)
        .map(|m| m.as_str().trim().trim_end_matches('.'))
        .filter(|s| !s.is_empty())
        .collect();

    candidates
        .iter()
        .filter(|s| has_operator(s))
        .max_by_key(|s| s.len())
        .or_else(|| candidates.iter().max_by_key(|s| s.len()))
        .map(|s| s.to_string())
}

/// Evaluate a mathematical expression string.
pub fn evaluate(expr: &str) -> std::result::Result<f64, String> {
    let tokens = tokenize(expr)?;
    let mut parser = Parser::new(&tokens);
    let result = parser.parse_expr()?;
    if parser.pos < parser.tokens.len() {
        return Err(format!(
            "Unexpected token at position {}: {:?}",
            parser.pos, parser.tokens[parser.pos]
        ));
    }
    Ok(result)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> std::result::Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        let token = match c {
            c if c.is_whitespace() => {
                chars.next();
                continue;
            }
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '(' => Token::LParen,
            ')' => Token::RParen,
            c if c.is_ascii_digit() || c == '.' => {
                let mut num = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        num.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = num
                    .parse()
                    .map_err(|_| format!("Invalid number: {}", num))?;
                tokens.push(Token::Number(value));
                continue;
            }
            c => return Err(format!("Unexpected character: '{}'", c)),
        };
        tokens.push(token);
        chars.next();
    }

    Ok(tokens)
}

/// Deepest nesting of unary minus and parentheses accepted.
const MAX_DEPTH: usize = 256;

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&'a Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn descend(&mut self) -> std::result::Result<(), String> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err("Expression nested too deeply".into());
        }
        Ok(())
    }

    // expr = term (('+' | '-') term)*
    fn parse_expr(&mut self) -> std::result::Result<f64, String> {
        let mut left = self.parse_term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.advance();
                    left += self.parse_term()?;
                }
                Some(Token::Minus) => {
                    self.advance();
                    left -= self.parse_term()?;
                }
                _ => return Ok(left),
            }
        }
    }

    // term = unary (('*' | '/') unary)*
    fn parse_term(&mut self) -> std::result::Result<f64, String> {
        let mut left = self.parse_unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.advance();
                    left *= self.parse_unary()?;
                }
                Some(Token::Slash) => {
                    self.advance();
                    let right = self.parse_unary()?;
                    if right == 0.0 {
                        return Err("Division by zero".into());
                    }
                    left /= right;
                }
                _ => return Ok(left),
            }
        }
    }

    // unary = '-' unary | primary
    fn parse_unary(&mut self) -> std::result::Result<f64, String> {
        if let Some(Token::Minus) = self.peek() {
            self.advance();
            self.descend()?;
            let value = self.parse_unary();
            self.depth -= 1;
            return value.map(|v| -v);
        }
        self.parse_primary()
    }

    // primary = NUMBER | '(' expr ')'
    fn parse_primary(&mut self) -> std::result::Result<f64, String> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(*n),
            Some(Token::LParen) => {
                self.descend()?;
                let val = self.parse_expr();
                self.depth -= 1;
                let val = val?;
                match self.advance() {
                    Some(Token::RParen) => Ok(val),
                    _ => Err("Expected closing parenthesis".into()),
                }
            }
            Some(tok) => Err(format!("Unexpected token: {:?}", tok)),
            None => Err("Unexpected end of expression".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_test_utils::state_with_user;

    #[test]
    fn precedence_and_parentheses() {
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluate("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(evaluate("-5 + 3").unwrap(), -2.0);
        assert_eq!(evaluate("10 / 4").unwrap(), 2.5);
    }

    #[test]
    fn evaluation_errors() {
        assert_eq!(evaluate("1 / 0").unwrap_err(), "Division by zero");
        assert!(evaluate("2 +").is_err());
        assert!(evaluate("(1 + 2").is_err());
        assert!(evaluate("").is_err());
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let minus = format!("{}1", "-".repeat(100_000));
        assert_eq!(evaluate(&minus).unwrap_err(), "Expression nested too deeply");

        let parens = format!("{}1{}", "(".repeat(100_000), ")".repeat(100_000));
        assert_eq!(evaluate(&parens).unwrap_err(), "Expression nested too deeply");

        let ok = format!("{}7{}", "(".repeat(200), ")".repeat(200));
        assert_eq!(evaluate(&ok).unwrap(), 7.0);
        assert_eq!(evaluate("--3").unwrap(), 3.0);
    }

    #[test]
    fn operator_words_only_match_whole_words() {
        assert_eq!(
            extract_expression("Sometimes I wonder: what is 3 times 4?").as_deref(),
            Some("3 * 4")
        );
        assert_eq!(
            extract_expression("Room 12, sometimes 3 guests").as_deref(),
            Some("12")
        );
        assert_eq!(
            extract_expression("surplus of 10 minus 4").as_deref(),
            Some("10 - 4")
        );
    }

    #[test]
    fn extracts_expression_from_prose() {
        assert_eq!(extract_expression("What is 2+2?").as_deref(), Some("2+2"));
        assert_eq!(
            extract_expression("Please compute (3 + 4) * 2 for me").as_deref(),
            Some("(3 + 4) * 2")
        );
        assert_eq!(
            extract_expression("what is 12 divided by 4").as_deref(),
            Some("12 / 4")
        );
        assert_eq!(extract_expression("hello there"), None);
    }

    #[tokio::test]
    async fn worker_reports_result_with_payload() {
        let worker = MathWorker::new("math_agent", "Arithmetic");
        let reply = worker.run(&state_with_user("s", "What is 6 * 7?")).await.unwrap();

        let msg = &reply.messages[0];
        assert_eq!(msg.content, "6 * 7 = 42");
        let payload = msg.payload.as_ref().unwrap();
        assert_eq!(payload["expression"], "6 * 7");
        assert_eq!(payload["result"], 42.0);
    }

    #[tokio::test]
    async fn worker_reports_division_by_zero_as_content() {
        let worker = MathWorker::new("math_agent", "Arithmetic");
        let reply = worker.run(&state_with_user("s", "What is 1/0?")).await.unwrap();
        assert_eq!(reply.messages[0].content, "Error: Division by zero");
    }

    #[tokio::test]
    async fn worker_reports_deep_nesting_as_content() {
        let worker = MathWorker::new("math_agent", "Arithmetic");
        let request = format!("What is {}1?", "-".repeat(200_000));
        let reply = worker.run(&state_with_user("s", &request)).await.unwrap();
        assert_eq!(reply.messages[0].content, "Error: Expression nested too deeply");
    }

    #[tokio::test]
    async fn worker_errors_without_expression() {
        let worker = MathWorker::new("math_agent", "Arithmetic");
        let err = worker
            .run(&state_with_user("s", "tell me a joke"))
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchyardError::Worker { .. }));
    }
}
