//! Spot Extraction
//!
//! Pure domain logic turning a free-text comment body into the number of
//! raffle spots the commenter asks for.
//!
//! The body is tokenized once and then run through [`RULE_TABLE`] in order.
//! The first rule that produces a value wins; inside a rule the first match
//! in reading order wins. When no rule matches the entry gets
//! [`DEFAULT_SPOTS`].
//!
//! | rule | example | spots |
//! |------|---------|-------|
//! | [`SpotRule::KeywordDeclaration`] | `I'll take 3 spots`, `spots: 0`, `two entries`, `spots x2` | stated number |
//! | [`SpotRule::HashPicks`] | `#7 and #12` | number of picks |
//! | [`SpotRule::PickList`] | `7, 12, 44` | length of the list |
//! | [`SpotRule::StandaloneNumber`] | `3 please` | the number |
//! | none | `Count me in!` | [`DEFAULT_SPOTS`] |
//!
//! Extraction is total: any input, including empty or huge bodies, yields a
//! value in `0..=MAX_DECLARED_SPOTS`.

/// Spots assigned when a comment joins without stating a count
pub const DEFAULT_SPOTS: u32 = 1;

/// Only this many characters of a body are scanned
pub const MAX_SCANNED_CHARS: usize = 2_000;

/// Upper bound for an explicit declaration
pub const MAX_DECLARED_SPOTS: u32 = 1_000;

/// Plain numbers above this are not read as spot counts (years, prices)
pub const MAX_STANDALONE_SPOTS: i64 = 1_000;

/// Nouns that turn an adjacent number into a declaration
const SPOT_KEYWORDS: &[&str] = &[
    "spot", "spots", "entry", "entries", "slot", "slots", "ticket", "tickets", "random",
    "randoms",
];

/// Words allowed between a number and its keyword (`3 more spots`)
const FILLER_WORDS: &[&str] = &["more", "random", "total", "extra", "additional"];

/// Tokens allowed between a keyword and its number (`spots: 2`, `spots x 2`)
const DECLARATION_SEPARATORS: &[char] = &[':', '=', '-', '(', '\u{2013}', '\u{00d7}'];

/// Tokens allowed between numbers of a pick list
const LIST_SEPARATORS: &[char] = &[',', '&', '/', ';', '+'];

const NUMBER_WORDS: &[(&str, i64)] = &[
    ("zero", 0),
    ("one", 1),
    ("two", 2),
    ("three", 3),
    ("four", 4),
    ("five", 5),
    ("six", 6),
    ("seven", 7),
    ("eight", 8),
    ("nine", 9),
    ("ten", 10),
];

/// Rules in evaluation order
pub const RULE_TABLE: [SpotRule; 4] = [
    SpotRule::KeywordDeclaration,
    SpotRule::HashPicks,
    SpotRule::PickList,
    SpotRule::StandaloneNumber,
];

/// A single extraction rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpotRule {
    /// Number next to a spot keyword, either order
    KeywordDeclaration,
    /// `#n` picks, counted
    HashPicks,
    /// Run of distinct plain numbers joined by list separators, counted
    PickList,
    /// Exactly one plain number in the whole body
    StandaloneNumber,
}

impl SpotRule {
    fn apply(&self, tokens: &[Token]) -> Option<i64> {
        match self {
            SpotRule::KeywordDeclaration => keyword_declaration(tokens),
            SpotRule::HashPicks => hash_picks(tokens),
            SpotRule::PickList => pick_list(tokens),
            SpotRule::StandaloneNumber => standalone_number(tokens),
        }
    }
}

/// Outcome of an extraction with the rule that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpotExtraction {
    pub spots: u32,
    /// `None` when the default applied
    pub rule: Option<SpotRule>,
}

/// Spots requested by a comment body
pub fn extract(body: &str) -> u32 {
    extract_detailed(body).spots
}

/// Spots requested by a comment body, with the deciding rule
pub fn extract_detailed(body: &str) -> SpotExtraction {
    let tokens = tokenize(body);

    for rule in RULE_TABLE {
        if let Some(value) = rule.apply(&tokens) {
            return SpotExtraction {
                spots: clamp_spots(value),
                rule: Some(rule),
            };
        }
    }

    SpotExtraction {
        spots: DEFAULT_SPOTS,
        rule: None,
    }
}

fn clamp_spots(value: i64) -> u32 {
    value.clamp(0, MAX_DECLARED_SPOTS as i64) as u32
}

// ============================================================================
// Tokenizer
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Number(Numeral),
    Punct(char),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Numeral {
    magnitude: i64,
    negative: bool,
    currency: bool,
    hash: bool,
    percent: bool,
    fractional: bool,
}

impl Numeral {
    fn value(&self) -> i64 {
        if self.negative {
            -self.magnitude
        } else {
            self.magnitude
        }
    }

    /// Usable as a count: not money, not a pick, not a ratio
    fn is_count(&self) -> bool {
        !self.currency && !self.hash && !self.percent && !self.fractional
    }

    fn is_plain(&self) -> bool {
        self.is_count() && self.magnitude <= MAX_STANDALONE_SPOTS
    }
}

fn tokenize(body: &str) -> Vec<Token> {
    let chars: Vec<char> = body.chars().take(MAX_SCANNED_CHARS).collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if !c.is_alphanumeric() {
            tokens.push(Token::Punct(c));
            i += 1;
            continue;
        }

        let start = i;
        while i < chars.len() && chars[i].is_alphanumeric() {
            i += 1;
        }
        let run = &chars[start..i];

        if !run.iter().all(|c| c.is_ascii_digit()) {
            tokens.push(Token::Word(run.iter().flat_map(|c| c.to_lowercase()).collect()));
            continue;
        }

        let mut numeral = Numeral {
            magnitude: digits_value(run),
            ..Numeral::default()
        };

        match start.checked_sub(1).map(|j| chars[j]) {
            Some('-') => {
                let prior = start.checked_sub(2).map(|j| chars[j]);
                numeral.negative = !prior.is_some_and(char::is_alphanumeric);
            }
            Some('$' | '\u{20ac}' | '\u{00a3}') => numeral.currency = true,
            Some('#') => numeral.hash = true,
            _ => {}
        }

        if i + 1 < chars.len() && chars[i] == '.' && chars[i + 1].is_ascii_digit() {
            numeral.fractional = true;
            i += 1;
            while i < chars.len() && chars[i].is_alphanumeric() {
                i += 1;
            }
        }

        if chars.get(i) == Some(&'%') {
            numeral.percent = true;
        }

        tokens.push(Token::Number(numeral));
    }

    tokens
}

fn digits_value(digits: &[char]) -> i64 {
    digits.iter().fold(0i64, |acc, d| {
        acc.saturating_mul(10)
            .saturating_add(i64::from(d.to_digit(10).unwrap_or(0)))
    })
}

// ============================================================================
// Rules
// ============================================================================

fn is_keyword(token: Option<&Token>) -> bool {
    matches!(token, Some(Token::Word(w)) if SPOT_KEYWORDS.contains(&w.as_str()))
}

fn is_filler(token: Option<&Token>) -> bool {
    matches!(token, Some(Token::Word(w)) if FILLER_WORDS.contains(&w.as_str()))
}

/// Numeric value of a token usable inside a declaration
fn declared_value(token: &Token) -> Option<i64> {
    match token {
        Token::Number(n) if n.is_count() => Some(n.value()),
        Token::Word(w) => number_word(w).or_else(|| multiplier(w)),
        _ => None,
    }
}

fn number_word(word: &str) -> Option<i64> {
    NUMBER_WORDS
        .iter()
        .find(|(name, _)| *name == word)
        .map(|(_, value)| *value)
}

/// `x3` or `3x`
fn multiplier(word: &str) -> Option<i64> {
    let digits = word
        .strip_prefix('x')
        .or_else(|| word.strip_suffix('x'))?;
    parse_digits(digits)
}

/// `3spots`
fn compound_declaration(word: &str) -> Option<i64> {
    let split = word.find(|c: char| !c.is_ascii_digit())?;
    let (digits, rest) = word.split_at(split);
    if SPOT_KEYWORDS.contains(&rest) {
        parse_digits(digits)
    } else {
        None
    }
}

fn parse_digits(digits: &str) -> Option<i64> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let chars: Vec<char> = digits.chars().collect();
    Some(digits_value(&chars))
}

fn keyword_declaration(tokens: &[Token]) -> Option<i64> {
    for (i, token) in tokens.iter().enumerate() {
        // <number> [filler] <keyword>
        if let Some(value) = declared_value(token) {
            let next = tokens.get(i + 1);
            if is_keyword(next) || (is_filler(next) && is_keyword(tokens.get(i + 2))) {
                return Some(value);
            }
        }

        if let Token::Word(word) = token {
            if let Some(value) = compound_declaration(word) {
                return Some(value);
            }
        }

        // <keyword> [separators] <number>
        if is_keyword(Some(token)) {
            let mut j = i + 1;
            let mut skipped = 0;
            while skipped < 2 {
                match tokens.get(j) {
                    Some(Token::Punct(c)) if DECLARATION_SEPARATORS.contains(c) => {}
                    Some(Token::Word(w)) if w == "x" => {}
                    _ => break,
                }
                j += 1;
                skipped += 1;
            }
            if let Some(value) = tokens.get(j).and_then(declared_value) {
                return Some(value);
            }
        }
    }
    None
}

fn hash_picks(tokens: &[Token]) -> Option<i64> {
    let picks = tokens
        .iter()
        .filter(|t| matches!(t, Token::Number(n) if n.hash && !n.fractional))
        .count();
    (picks > 0).then_some(picks as i64)
}

fn plain_number_positions(tokens: &[Token]) -> Vec<(usize, i64)> {
    tokens
        .iter()
        .enumerate()
        .filter_map(|(i, t)| match t {
            Token::Number(n) if n.is_plain() => Some((i, n.value())),
            _ => None,
        })
        .collect()
}

fn pick_list(tokens: &[Token]) -> Option<i64> {
    let numbers = plain_number_positions(tokens);
    if numbers.len() < 2 {
        return None;
    }

    let joined = numbers.windows(2).all(|pair| {
        tokens[pair[0].0 + 1..pair[1].0].iter().all(|t| match t {
            Token::Punct(c) => LIST_SEPARATORS.contains(c),
            Token::Word(w) => w == "and",
            Token::Number(_) => false,
        })
    });
    if !joined {
        return None;
    }

    let mut values: Vec<i64> = numbers.iter().map(|(_, v)| *v).collect();
    values.sort_unstable();
    values.dedup();
    (values.len() == numbers.len()).then_some(numbers.len() as i64)
}

fn standalone_number(tokens: &[Token]) -> Option<i64> {
    match plain_number_positions(tokens).as_slice() {
        [(_, value)] => Some(*value),
        _ => None,
    }
}
