//! Quote-aware decomposition of Bash command text.
//!
//! The injection and exfiltration checks need to see command *structure* —
//! what is piped into what, which commands run inside `$()` — without
//! spawning a shell. This module splits a command at compound operators,
//! lifts out command/process substitutions, and spots output redirection,
//! all while respecting single/double quotes and backslash escapes.

/// Shell operator between consecutive pipeline segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `&&`
    And,
    /// `||`
    Or,
    /// `;`
    Semi,
    /// `|`
    Pipe,
    /// `|&`
    PipeErr,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::And => "&&",
            Operator::Or => "||",
            Operator::Semi => ";",
            Operator::Pipe => "|",
            Operator::PipeErr => "|&",
        }
    }

    /// True for operators that feed the previous segment's output into
    /// the next segment.
    pub fn is_pipe(self) -> bool {
        matches!(self, Operator::Pipe | Operator::PipeErr)
    }
}

/// A command decomposed at top-level operators, with substitution bodies
/// lifted out. `ls $(which cargo) | rg foo` becomes segments
/// `["ls __SUBST__", "rg foo"]`, operators `[Pipe]`, substitutions
/// `["which cargo"]`.
#[derive(Debug, Clone)]
pub struct CommandShape {
    pub segments: Vec<String>,
    pub operators: Vec<Operator>,
    pub substitutions: Vec<String>,
}

/// Tracks quote/escape state while scanning command text.
#[derive(Default)]
struct QuoteState {
    single: bool,
    double: bool,
    escaped: bool,
}

impl QuoteState {
    /// Advance over one character. Returns true if the character was
    /// consumed as quote/escape syntax state (it still belongs to the
    /// current word, but operators must not fire on it).
    fn step(&mut self, c: char) -> bool {
        if self.escaped {
            self.escaped = false;
            return true;
        }
        match c {
            '\\' if !self.single => {
                self.escaped = true;
                true
            }
            '\'' if !self.double => {
                self.single = !self.single;
                true
            }
            '"' if !self.single => {
                self.double = !self.double;
                true
            }
            _ => self.single || self.double,
        }
    }
}

/// Decompose a command into its shape: operators split, substitutions
/// extracted (recursive bodies are returned whole for the caller to
/// decompose again if needed).
pub fn decompose(command: &str) -> CommandShape {
    let (outer, substitutions) = extract_substitutions(command);
    let (segments, operators) = split_compound(&outer);
    CommandShape {
        segments,
        operators,
        substitutions,
    }
}

/// Split at `&&`, `||`, `;`, `|`, `|&` outside quotes.
fn split_compound(command: &str) -> (Vec<String>, Vec<Operator>) {
    let chars: Vec<char> = command.chars().collect();
    let mut state = QuoteState::default();
    let mut segments = Vec::new();
    let mut operators = Vec::new();
    let mut buf = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if state.step(c) {
            buf.push(c);
            i += 1;
            continue;
        }

        let two = chars.get(i + 1).map(|&n| (c, n));
        let op = match two {
            Some(('&', '&')) => Some((Operator::And, 2)),
            Some(('|', '|')) => Some((Operator::Or, 2)),
            Some(('|', '&')) => Some((Operator::PipeErr, 2)),
            _ => match c {
                '|' => Some((Operator::Pipe, 1)),
                ';' => Some((Operator::Semi, 1)),
                _ => None,
            },
        };

        if let Some((op, width)) = op {
            segments.push(buf.trim().to_string());
            operators.push(op);
            buf.clear();
            i += width;
        } else {
            buf.push(c);
            i += 1;
        }
    }

    let tail = buf.trim().to_string();
    if !tail.is_empty() {
        segments.push(tail);
    }
    segments.retain(|s| !s.is_empty());
    (segments, operators)
}

/// Lift out `$(...)`, backtick, and `<()`/`>()` substitution bodies,
/// replacing each span with `__SUBST__` in the outer text.
///
/// Single quotes suppress substitution; double quotes do not (the shell
/// expands `$()` inside them). Nested `$()` stays inside the extracted
/// body so the caller can recurse.
fn extract_substitutions(command: &str) -> (String, Vec<String>) {
    let chars: Vec<char> = command.chars().collect();
    let mut state = QuoteState::default();
    let mut outer = String::new();
    let mut bodies = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if state.escaped || c == '\\' && !state.single {
            state.step(c);
            outer.push(c);
            i += 1;
            continue;
        }
        if c == '\'' && !state.double || c == '"' && !state.single {
            state.step(c);
            outer.push(c);
            i += 1;
            continue;
        }
        if state.single {
            outer.push(c);
            i += 1;
            continue;
        }

        // $( ... ), <( ... ), >( ... ) — balanced-paren spans.
        // Process substitution is not recognized inside double quotes.
        let paren = c == '$' && chars.get(i + 1) == Some(&'(')
            || (c == '<' || c == '>') && chars.get(i + 1) == Some(&'(') && !state.double;
        if paren {
            let (body, consumed) = scan_balanced(&chars[i + 2..]);
            if !body.trim().is_empty() {
                bodies.push(body.trim().to_string());
            }
            // The < / > prefix is dropped so redirection detection does
            // not fire on a process substitution.
            outer.push_str("__SUBST__");
            i += 2 + consumed;
            continue;
        }

        // Backtick spans (no nesting).
        if c == '`' {
            let mut body = String::new();
            i += 1;
            while i < chars.len() && chars[i] != '`' {
                if chars[i] == '\\' && i + 1 < chars.len() {
                    body.push(chars[i]);
                    body.push(chars[i + 1]);
                    i += 2;
                    continue;
                }
                body.push(chars[i]);
                i += 1;
            }
            if i < chars.len() {
                i += 1; // closing backtick
            }
            if !body.trim().is_empty() {
                bodies.push(body.trim().to_string());
            }
            outer.push_str("__SUBST__");
            continue;
        }

        outer.push(c);
        i += 1;
    }

    (outer, bodies)
}

/// Scan to the parenthesis balancing an already-consumed `(`, respecting
/// quotes. Returns the enclosed text and the characters consumed
/// including the closing paren.
fn scan_balanced(chars: &[char]) -> (String, usize) {
    let mut state = QuoteState::default();
    let mut body = String::new();
    let mut depth: u32 = 1;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if !state.step(c) {
            if c == '(' {
                depth += 1;
            } else if c == ')' {
                depth -= 1;
                if depth == 0 {
                    return (body, i + 1);
                }
            }
        }
        body.push(c);
        i += 1;
    }
    (body, i)
}

/// Detect output redirection (`>`, `>>`, `&>`, `N>`) outside quotes.
///
/// Not flagged: input redirection (`<`, here-docs), fd duplication and
/// closing (`2>&1`, `>&2`, `2>&-`), process substitution (`>(...)`).
pub fn output_redirection(command: &str) -> Option<String> {
    let chars: Vec<char> = command.chars().collect();
    let mut state = QuoteState::default();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if state.step(c) {
            i += 1;
            continue;
        }

        // &> / &>> always writes a file
        if c == '&' && chars.get(i + 1) == Some(&'>') {
            return Some("output redirection (&>)".into());
        }

        // N> family: N>&M and N>&- are fd plumbing, the rest write files
        if c.is_ascii_digit() && chars.get(i + 1) == Some(&'>') {
            if chars.get(i + 2) == Some(&'&')
                && chars
                    .get(i + 3)
                    .is_some_and(|&n| n.is_ascii_digit() || n == '-')
            {
                i += 4;
                continue;
            }
            return Some(format!("output redirection ({c}>)"));
        }

        if c == '>' {
            // >( is process substitution
            if chars.get(i + 1) == Some(&'(') {
                i += 1;
                continue;
            }
            // >&N / >&- is fd plumbing
            if chars.get(i + 1) == Some(&'&')
                && chars
                    .get(i + 2)
                    .is_some_and(|&n| n.is_ascii_digit() || n == '-')
            {
                i += 3;
                continue;
            }
            return Some("output redirection (>)".into());
        }

        i += 1;
    }
    None
}

/// First real command word: leading `VAR=value` assignments skipped,
/// quotes resolved via [`tokenize`], leading path stripped
/// (`/usr/bin/ls` → `ls`).
pub fn base_command(segment: &str) -> String {
    let mut rest = segment.trim();
    loop {
        let Some(eq) = rest.find('=') else { break };
        let name = &rest[..eq];
        let valid = !name.is_empty()
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            && name
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        if !valid {
            break;
        }
        match rest[eq + 1..].find(char::is_whitespace) {
            Some(sp) => rest = rest[eq + 1 + sp..].trim_start(),
            None => break,
        }
    }
    let word = tokenize(rest).into_iter().next().unwrap_or_default();
    match word.rsplit_once('/') {
        Some((_, name)) if !name.is_empty() => name.to_string(),
        _ => word,
    }
}

/// POSIX word splitting via shlex, with a whitespace fallback for text
/// shlex cannot parse (unterminated quotes).
pub fn tokenize(segment: &str) -> Vec<String> {
    shlex::split(segment)
        .unwrap_or_else(|| segment.split_whitespace().map(String::from).collect())
}
