//! Turn submission source text into a sequence of comparable token symbols.
//!
//! Every token becomes a single `char`, so a token sequence is stored as a plain
//! string and its length in chars is the token count. Identifiers, numbers and
//! literals collapse into class symbols so renaming variables or changing
//! constants does not hide copied structure. Keywords and operators keep their
//! own symbols, taken from the Unicode private use area. Single character
//! punctuation is its own symbol.

use crate::provider::Provider;
use crate::store::SubmissionStore;
use crate::{ExerciseRecord, SubmissionRecord, TokenizerKind};
use anyhow::{Context, Result};
use log::debug;
use thiserror::Error;

const IDENTIFIER: char = '\u{E000}';
const NUMBER: char = '\u{E001}';
const STRING: char = '\u{E002}';
const INDENT: char = '\u{E003}';
const DEDENT: char = '\u{E004}';

const KEYWORD_BASE: u32 = 0xE100;
const OPERATOR_BASE: u32 = 0xE200;
const WORD_BASE: u32 = 0xF0000;
const WORD_SPACE: u32 = 0xFFFE;

const TAB_WIDTH: usize = 8;

/// Why a submission could not be tokenized. A rejected submission can never
/// be compared, so the pipeline drops it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenizeError {
    #[error("the exercise is configured to skip tokenization")]
    Skipped,
    #[error("could not read the submission source: {0}")]
    SourceUnavailable(String),
    #[error("unterminated string literal starting on line {line}")]
    UnterminatedString { line: usize },
    #[error("unterminated block comment starting on line {line}")]
    UnterminatedComment { line: usize },
    #[error("unexpected {found:?} on line {line}")]
    UnbalancedBracket { found: char, line: usize },
    #[error("{open:?} opened on line {line} is never closed")]
    UnclosedBracket { open: char, line: usize },
    #[error("dedent on line {line} does not match any outer indentation level")]
    InconsistentDedent { line: usize },
    #[error("unexpected character {found:?} on line {line}")]
    UnexpectedCharacter { found: char, line: usize },
}

/// What happened to one submission handed to the tokenizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenizeOutcome {
    Tokenized { token_count: usize },
    Rejected(TokenizeError),
}

struct Language {
    keywords: &'static [&'static str],
    operators: &'static [&'static str],
    line_comment: &'static str,
    block_comment: Option<(&'static str, &'static str)>,
    quotes: &'static [char],
    multiline_quote: Option<char>,
    triple_quotes: bool,
    string_prefixes: bool,
    indentation: bool,
}

const C_LIKE: Language = Language {
    keywords: &[
        "abstract", "boolean", "break", "byte", "case", "catch", "char", "class", "const",
        "continue", "def", "default", "do", "double", "else", "enum", "extends", "false", "final",
        "finally", "float", "for", "function", "if", "implements", "import", "instanceof", "int",
        "interface", "let", "long", "match", "new", "null", "object", "package", "private",
        "protected", "public", "return", "short", "static", "struct", "super", "switch", "this",
        "throw", "true", "try", "typeof", "val", "var", "void", "while", "yield",
    ],
    operators: &[
        ">>>=", "<<=", ">>=", ">>>", "===", "!==", "...", "->", "=>", "::", "++", "--", "<<",
        ">>", "<=", ">=", "==", "!=", "&&", "||", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=",
    ],
    line_comment: "//",
    block_comment: Some(("/*", "*/")),
    quotes: &['"', '\''],
    multiline_quote: Some('`'),
    triple_quotes: false,
    string_prefixes: false,
    indentation: false,
};

const PYTHON: Language = Language {
    keywords: &[
        "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
        "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
        "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return",
        "try", "while", "with", "yield",
    ],
    operators: &[
        "**=", "//=", ">>=", "<<=", "->", "**", "//", "<<", ">>", "<=", ">=", "==", "!=", "+=",
        "-=", "*=", "/=", "%=", "&=", "|=", "^=", ":=", "@=",
    ],
    line_comment: "#",
    block_comment: None,
    quotes: &['"', '\''],
    multiline_quote: None,
    triple_quotes: true,
    string_prefixes: true,
    indentation: true,
};

/// Tokenize source text with the given tokenizer.
///
/// Deterministic: the same text and tokenizer always give the same symbols.
///
/// # Errors
/// Returns a [`TokenizeError`] if the text cannot be parsed by the tokenizer.
pub fn tokenize(source: &str, kind: TokenizerKind) -> Result<String, TokenizeError> {
    match kind {
        TokenizerKind::Skip => Err(TokenizeError::Skipped),
        TokenizerKind::Text => Ok(tokenize_text(source)),
        TokenizerKind::CLike => Lexer::new(&C_LIKE, source).run(),
        TokenizerKind::Python => Lexer::new(&PYTHON, source).run(),
    }
}

/// Fetch a submission's source through its provider, tokenize it and persist the tokens.
/// On success the tokens are also set on `submission`.
///
/// # Errors
/// Returns an error only if the tokens could not be saved. A source that cannot
/// be read or parsed is reported as [`TokenizeOutcome::Rejected`].
pub fn tokenize_submission<S: SubmissionStore + ?Sized>(
    store: &mut S,
    provider: &dyn Provider,
    submission: &mut SubmissionRecord,
    exercise: &ExerciseRecord,
) -> Result<TokenizeOutcome> {
    let source = match provider.get_submission_text(submission) {
        Ok(source) => source,
        Err(err) => {
            return Ok(TokenizeOutcome::Rejected(TokenizeError::SourceUnavailable(
                format!("{err:#}"),
            )));
        }
    };

    let tokens = match tokenize(&source, exercise.tokenizer) {
        Ok(tokens) => tokens,
        Err(err) => return Ok(TokenizeOutcome::Rejected(err)),
    };
    let token_count = tokens.chars().count();

    store
        .set_submission_tokens(submission.submission_id, &tokens)
        .with_context(|| {
            format!(
                "Failed to save tokens for submission #{}",
                submission.submission_id
            )
        })?;
    debug!(
        "Submission #{} tokenized into {token_count} tokens with {}",
        submission.submission_id, exercise.tokenizer
    );
    submission.tokens = Some(tokens);

    Ok(TokenizeOutcome::Tokenized { token_count })
}

/// Plain text: every distinct word gets its own stable symbol.
fn tokenize_text(source: &str) -> String {
    let mut symbols = String::new();
    let mut word = String::new();
    let flush = |word: &mut String, symbols: &mut String| {
        if word.is_empty() {
            return;
        }
        if word.chars().all(|c| c.is_ascii_digit()) {
            symbols.push(NUMBER);
        } else {
            symbols.push(word_symbol(word));
        }
        word.clear();
    };

    for c in source.chars() {
        if c.is_alphanumeric() {
            word.extend(c.to_lowercase());
            continue;
        }
        flush(&mut word, &mut symbols);
        // control characters cannot be stored in a text column
        if !c.is_whitespace() && !c.is_control() {
            symbols.push(c);
        }
    }
    flush(&mut word, &mut symbols);
    symbols
}

/// FNV-1a folded into a supplementary private use plane.
fn word_symbol(word: &str) -> char {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in word.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    private_symbol(WORD_BASE, (hash % WORD_SPACE) as usize)
}

fn private_symbol(base: u32, index: usize) -> char {
    u32::try_from(index)
        .ok()
        .and_then(|index| char::from_u32(base + index))
        .unwrap_or(char::REPLACEMENT_CHARACTER)
}

struct Lexer<'a> {
    language: &'a Language,
    chars: Vec<char>,
    pos: usize,
    line: usize,
    symbols: String,
    brackets: Vec<(char, usize)>,
    indents: Vec<usize>,
    line_start: bool,
}

impl<'a> Lexer<'a> {
    fn new(language: &'a Language, source: &str) -> Self {
        Lexer {
            language,
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            symbols: String::new(),
            brackets: Vec::new(),
            indents: vec![0],
            line_start: true,
        }
    }

    fn run(mut self) -> Result<String, TokenizeError> {
        while let Some(c) = self.peek(0) {
            if self.language.indentation && self.line_start {
                self.line_start = false;
                self.indentation()?;
                continue;
            }

            if c == '\n' {
                self.newline();
                continue;
            }
            if c.is_whitespace() {
                self.pos += 1;
                continue;
            }
            if self.language.indentation && c == '\\' && self.peek(1) == Some('\n') {
                // explicit line continuation
                self.pos += 2;
                self.line += 1;
                continue;
            }
            if self.starts_with(self.language.line_comment) {
                while self.peek(0).is_some_and(|c| c != '\n') {
                    self.pos += 1;
                }
                continue;
            }
            if let Some((open, close)) = self.language.block_comment
                && self.starts_with(open)
            {
                self.block_comment(open, close)?;
                continue;
            }
            if self.language.quotes.contains(&c) || self.language.multiline_quote == Some(c) {
                self.string(c)?;
                continue;
            }
            if c.is_ascii_digit() {
                self.number();
                continue;
            }
            if c.is_alphabetic() || c == '_' || c == '$' {
                self.word()?;
                continue;
            }
            if let Some((index, len)) = self.operator() {
                self.symbols.push(private_symbol(OPERATOR_BASE, index));
                self.pos += len;
                continue;
            }
            if c.is_ascii_punctuation() {
                self.bracket(c)?;
                self.symbols.push(c);
                self.pos += 1;
                continue;
            }
            return Err(TokenizeError::UnexpectedCharacter {
                found: c,
                line: self.line,
            });
        }

        if let Some(&(open, line)) = self.brackets.last() {
            return Err(TokenizeError::UnclosedBracket { open, line });
        }
        for _ in 1..self.indents.len() {
            self.symbols.push(DEDENT);
        }
        Ok(self.symbols)
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn starts_with(&self, pattern: &str) -> bool {
        !pattern.is_empty()
            && pattern
                .chars()
                .enumerate()
                .all(|(i, c)| self.peek(i) == Some(c))
    }

    fn newline(&mut self) {
        self.pos += 1;
        self.line += 1;
        // newlines inside brackets do not end a logical line
        if self.brackets.is_empty() {
            self.line_start = true;
        }
    }

    /// Measure leading whitespace and emit INDENT/DEDENT symbols for it.
    /// Blank and comment-only lines leave the indentation alone.
    fn indentation(&mut self) -> Result<(), TokenizeError> {
        let mut width = 0;
        while let Some(c) = self.peek(0) {
            match c {
                ' ' => width += 1,
                '\t' => width = (width / TAB_WIDTH + 1) * TAB_WIDTH,
                '\x0c' => width = 0,
                _ => break,
            }
            self.pos += 1;
        }
        match self.peek(0) {
            None | Some('\n' | '\r') => return Ok(()),
            Some(_) if self.starts_with(self.language.line_comment) => return Ok(()),
            Some(_) => {}
        }

        let current = self.indents.last().copied().unwrap_or(0);
        if width > current {
            self.indents.push(width);
            self.symbols.push(INDENT);
        } else if width < current {
            while self.indents.last().is_some_and(|&level| level > width) {
                self.indents.pop();
                self.symbols.push(DEDENT);
            }
            if self.indents.last().copied().unwrap_or(0) != width {
                return Err(TokenizeError::InconsistentDedent { line: self.line });
            }
        }
        Ok(())
    }

    fn block_comment(&mut self, open: &str, close: &str) -> Result<(), TokenizeError> {
        let start_line = self.line;
        self.pos += open.chars().count();
        loop {
            if self.starts_with(close) {
                self.pos += close.chars().count();
                return Ok(());
            }
            match self.peek(0) {
                None => return Err(TokenizeError::UnterminatedComment { line: start_line }),
                Some('\n') => self.line += 1,
                Some(_) => {}
            }
            self.pos += 1;
        }
    }

    fn string(&mut self, quote: char) -> Result<(), TokenizeError> {
        let start_line = self.line;
        let triple = self.language.triple_quotes
            && self.peek(1) == Some(quote)
            && self.peek(2) == Some(quote);
        let multiline = triple || self.language.multiline_quote == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        loop {
            match self.peek(0) {
                None => return Err(TokenizeError::UnterminatedString { line: start_line }),
                Some('\\') => {
                    if self.peek(1) == Some('\n') {
                        self.line += 1;
                    }
                    self.pos += 2;
                }
                Some('\n') => {
                    if !multiline {
                        return Err(TokenizeError::UnterminatedString { line: start_line });
                    }
                    self.line += 1;
                    self.pos += 1;
                }
                Some(c) if c == quote => {
                    if !triple {
                        self.pos += 1;
                        break;
                    }
                    if self.peek(1) == Some(quote) && self.peek(2) == Some(quote) {
                        self.pos += 3;
                        break;
                    }
                    self.pos += 1;
                }
                Some(_) => self.pos += 1,
            }
        }
        self.symbols.push(STRING);
        Ok(())
    }

    fn number(&mut self) {
        while let Some(c) = self.peek(0) {
            let fraction = c == '.' && self.peek(1).is_some_and(|n| n.is_ascii_digit());
            if c.is_alphanumeric() || c == '_' || fraction {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.symbols.push(NUMBER);
    }

    fn word(&mut self) -> Result<(), TokenizeError> {
        let start = self.pos;
        while self
            .peek(0)
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$')
        {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();

        // r"", b'', f"""...""" and friends are one string token
        if self.language.string_prefixes
            && word.len() <= 2
            && word.chars().all(|c| "rbfuRBFU".contains(c))
            && let Some(quote) = self.peek(0)
            && self.language.quotes.contains(&quote)
        {
            return self.string(quote);
        }

        match self.language.keywords.iter().position(|k| *k == word) {
            Some(index) => self.symbols.push(private_symbol(KEYWORD_BASE, index)),
            None => self.symbols.push(IDENTIFIER),
        }
        Ok(())
    }

    /// Longest multi-character operator at the current position.
    fn operator(&self) -> Option<(usize, usize)> {
        self.language
            .operators
            .iter()
            .enumerate()
            .filter(|(_, op)| self.starts_with(op))
            .map(|(index, op)| (index, op.chars().count()))
            .max_by_key(|&(_, len)| len)
    }

    fn bracket(&mut self, c: char) -> Result<(), TokenizeError> {
        let expected_open = match c {
            '(' | '[' | '{' => {
                self.brackets.push((c, self.line));
                return Ok(());
            }
            ')' => '(',
            ']' => '[',
            '}' => '{',
            _ => return Ok(()),
        };
        match self.brackets.pop() {
            Some((open, _)) if open == expected_open => Ok(()),
            _ => Err(TokenizeError::UnbalancedBracket {
                found: c,
                line: self.line,
            }),
        }
    }
}
