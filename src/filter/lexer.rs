//! Tokenizer for the filter mini-language.
//!
//! Quoted literals and bracketed lists are lifted out first so their commas and
//! parentheses never reach the grammar. Bare text keeps only the allow-listed
//! characters `[A-Za-z0-9-_.*#]`; everything else is dropped, and a run of `-`
//! shrinks to one so no bare word can open a `--` comment.

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Atom {
    /// Bare, allow-listed word.
    Bare(String),
    /// Single-quoted literal with embedded quotes removed.
    Quoted(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token {
    Atom(Atom),
    List(Vec<Atom>),
    Open,
    Close,
}

pub fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '*' | '#')
}

/// Keep only allow-listed characters.
pub fn sanitize_word(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars().filter(|c| is_word_char(*c)) {
        push_word_char(&mut out, c);
    }
    out
}

fn push_word_char(word: &mut String, c: char) {
    if c != '-' || !word.ends_with('-') {
        word.push(c);
    }
}

fn flush(word: &mut String, out: &mut Vec<Token>) {
    if !word.is_empty() {
        out.push(Token::Atom(Atom::Bare(std::mem::take(word))));
    }
}

fn list_items(inner: &str) -> Vec<Atom> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut in_quote = false;
    for c in inner.chars() {
        match c {
            '\'' => {
                in_quote = !in_quote;
                quoted = true;
            }
            ',' if !in_quote => {
                push_item(&mut items, &mut current, quoted);
                quoted = false;
            }
            _ => current.push(c),
        }
    }
    push_item(&mut items, &mut current, quoted);
    items
}

fn push_item(items: &mut Vec<Atom>, current: &mut String, quoted: bool) {
    let raw = std::mem::take(current);
    if quoted {
        items.push(Atom::Quoted(raw));
    } else {
        let word = sanitize_word(&raw);
        if !word.is_empty() {
            items.push(Atom::Bare(word));
        }
    }
}

pub fn tokenize(input: &str) -> Vec<Token> {
    let chars: Vec<char> = input.chars().collect();
    let mut out = Vec::new();
    let mut word = String::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' => {
                if let Some(end) = chars[i + 1..].iter().position(|&x| x == '\'') {
                    flush(&mut word, &mut out);
                    let literal: String = chars[i + 1..i + 1 + end].iter().collect();
                    out.push(Token::Atom(Atom::Quoted(literal)));
                    i += end + 2;
                    continue;
                }
            }
            '[' => {
                let close = chars[i + 1..].iter().position(|&x| x == ']');
                let nested = chars[i + 1..].iter().position(|&x| x == '[');
                if let Some(end) = close.filter(|e| nested.map_or(true, |n| n > *e)) {
                    flush(&mut word, &mut out);
                    let inner: String = chars[i + 1..i + 1 + end].iter().collect();
                    out.push(Token::List(list_items(&inner)));
                    i += end + 2;
                    continue;
                }
            }
            '(' => {
                flush(&mut word, &mut out);
                out.push(Token::Open);
            }
            ')' => {
                flush(&mut word, &mut out);
                out.push(Token::Close);
            }
            ',' => flush(&mut word, &mut out),
            c if is_word_char(c) => push_word_char(&mut word, c),
            _ => {}
        }
        i += 1;
    }
    flush(&mut word, &mut out);
    out
}
