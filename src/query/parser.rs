//! Single-pass query DFA (spec.md §4.8): turns a raw query string into the
//! `ParserEvent` stream the planner consumes.

use crate::query::types::{ParserEvent, ParserWarnings};

/// Named states mirroring spec.md §4.8's state list. Several of the
/// spec's `_PUNC` variants collapse here into the parent state's word-scan
/// helper rather than separate enum members, since punctuation lookahead
/// is handled inline by `scan_word`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Top,
    InWord,
    InNoStop,
    InExclude,
    InPhrase,
    InMod,
}

pub struct QueryParser {
    maxwordlen: usize,
}

impl QueryParser {
    pub fn new(maxwordlen: usize) -> Self {
        QueryParser { maxwordlen: maxwordlen.max(1) }
    }

    pub fn parse(&self, query: &str) -> (Vec<ParserEvent>, ParserWarnings) {
        let mut events = Vec::new();
        let mut warnings = ParserWarnings::default();
        let chars: Vec<char> = query.chars().collect();
        let mut pos = 0;
        let mut state = State::Top;

        while pos < chars.len() {
            let c = chars[pos];
            if c.is_whitespace() {
                pos += 1;
                continue;
            }
            state = match c {
                '"' => {
                    pos += 1;
                    self.parse_phrase(&chars, &mut pos, &mut events, &mut warnings);
                    State::InPhrase
                }
                '[' => {
                    pos += 1;
                    self.parse_modifier(&chars, &mut pos, &mut events, &mut warnings);
                    State::InMod
                }
                '(' | ')' => {
                    warnings.set(ParserWarnings::PARENS_LOOK_LIKE_BOOLEAN);
                    pos += 1;
                    State::Top
                }
                '+' if pos + 1 < chars.len() && is_word_char(chars[pos + 1]) => {
                    pos += 1;
                    match self.scan_word(&chars, &mut pos) {
                        Some(word) => events.push(ParserEvent::WordNoStop(word)),
                        None => warnings.set(ParserWarnings::EMPTY_OPERATOR),
                    }
                    State::InNoStop
                }
                '-' if pos + 1 < chars.len() && is_word_char(chars[pos + 1]) => {
                    pos += 1;
                    match self.scan_word(&chars, &mut pos) {
                        Some(word) => events.push(ParserEvent::WordExclude(word)),
                        None => warnings.set(ParserWarnings::EMPTY_OPERATOR),
                    }
                    State::InExclude
                }
                _ if is_word_char(c) => {
                    let start = pos;
                    let word = self.scan_word(&chars, &mut pos);
                    match word {
                        Some(_) if is_literal_upper(&chars, start, pos, "AND") => {
                            events.push(ParserEvent::And);
                        }
                        Some(_) if is_literal_upper(&chars, start, pos, "OR") => {
                            events.push(ParserEvent::Or);
                        }
                        Some(w) => events.push(ParserEvent::Word(w)),
                        None => {}
                    }
                    State::InWord
                }
                _ => {
                    let run_start = pos;
                    while pos < chars.len()
                        && !chars[pos].is_whitespace()
                        && !is_word_char(chars[pos])
                        && !"\"[()+-".contains(chars[pos])
                    {
                        pos += 1;
                    }
                    if pos > run_start {
                        warnings.set(ParserWarnings::NONWORD_JUNK_RUN);
                    } else {
                        pos += 1;
                    }
                    State::Top
                }
            };
        }
        let _ = state;
        events.push(ParserEvent::Eof);
        (events, warnings)
    }

    /// Scans one `[A-Za-z0-9]`/internal-`-` run, truncating at
    /// `maxwordlen` (spec.md §4.8: "the remainder becomes the next word",
    /// satisfied here simply by not consuming past the limit).
    fn scan_word(&self, chars: &[char], pos: &mut usize) -> Option<String> {
        let start = *pos;
        while *pos < chars.len() && is_word_char(chars[*pos]) {
            if chars[*pos] == '-' && (*pos + 1 >= chars.len() || !chars[*pos + 1].is_alphanumeric()) {
                break;
            }
            *pos += 1;
        }
        if *pos == start {
            return None;
        }
        let end = (start + self.maxwordlen).min(*pos);
        let word: String = chars[start..end].iter().collect::<String>().to_lowercase();
        *pos = end;
        Some(word)
    }

    fn parse_phrase(
        &self,
        chars: &[char],
        pos: &mut usize,
        events: &mut Vec<ParserEvent>,
        warnings: &mut ParserWarnings,
    ) {
        events.push(ParserEvent::StartPhrase);
        loop {
            while *pos < chars.len() && chars[*pos].is_whitespace() {
                *pos += 1;
            }
            if *pos >= chars.len() {
                warnings.set(ParserWarnings::UNMATCHED_QUOTES);
                break;
            }
            if chars[*pos] == '"' {
                *pos += 1;
                break;
            }
            if is_word_char(chars[*pos]) {
                if let Some(word) = self.scan_word(chars, pos) {
                    events.push(ParserEvent::PhraseWord(word));
                    let next_is_boundary =
                        *pos + 1 >= chars.len() || chars[*pos + 1].is_whitespace();
                    if *pos < chars.len() && matches!(chars[*pos], '.' | '!' | '?') && next_is_boundary {
                        *pos += 1;
                        events.push(ParserEvent::EndSentence);
                    }
                }
            } else {
                *pos += 1;
            }
        }
        events.push(ParserEvent::EndPhrase);
    }

    fn parse_modifier(
        &self,
        chars: &[char],
        pos: &mut usize,
        events: &mut Vec<ParserEvent>,
        warnings: &mut ParserWarnings,
    ) {
        let name_start = *pos;
        while *pos < chars.len() && chars[*pos] != ':' && chars[*pos] != ']' {
            *pos += 1;
        }
        let name: String = chars[name_start..*pos].iter().collect();
        if *pos < chars.len() && chars[*pos] == ':' {
            *pos += 1;
        }
        events.push(ParserEvent::StartModifier(name));

        loop {
            while *pos < chars.len() && chars[*pos].is_whitespace() {
                *pos += 1;
            }
            if *pos >= chars.len() {
                warnings.set(ParserWarnings::UNMATCHED_BRACKETS);
                break;
            }
            match chars[*pos] {
                ']' => {
                    *pos += 1;
                    break;
                }
                '[' => {
                    warnings.set(ParserWarnings::NESTED_BRACKETS);
                    *pos += 1;
                }
                c if is_word_char(c) => {
                    if let Some(word) = self.scan_word(chars, pos) {
                        events.push(ParserEvent::ModifierWord(word));
                    }
                }
                _ => *pos += 1,
            }
        }
        events.push(ParserEvent::EndModifier);
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-'
}

fn is_literal_upper(chars: &[char], start: usize, end: usize, literal: &str) -> bool {
    if end - start != literal.chars().count() {
        return false;
    }
    chars[start..end].iter().zip(literal.chars()).all(|(a, b)| *a == b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_words() {
        let parser = QueryParser::new(64);
        let (events, warnings) = parser.parse("quick brown fox");
        assert_eq!(
            events,
            vec![
                ParserEvent::Word("quick".to_string()),
                ParserEvent::Word("brown".to_string()),
                ParserEvent::Word("fox".to_string()),
                ParserEvent::Eof,
            ]
        );
        assert_eq!(warnings.bits(), 0);
    }

    #[test]
    fn parses_nostop_and_exclude_markers() {
        let parser = QueryParser::new(64);
        let (events, _) = parser.parse("+the -cat");
        assert_eq!(
            events,
            vec![
                ParserEvent::WordNoStop("the".to_string()),
                ParserEvent::WordExclude("cat".to_string()),
                ParserEvent::Eof,
            ]
        );
    }

    #[test]
    fn parses_literal_and_or() {
        let parser = QueryParser::new(64);
        let (events, _) = parser.parse("cat AND dog OR fox");
        assert_eq!(
            events,
            vec![
                ParserEvent::Word("cat".to_string()),
                ParserEvent::And,
                ParserEvent::Word("dog".to_string()),
                ParserEvent::Or,
                ParserEvent::Word("fox".to_string()),
                ParserEvent::Eof,
            ]
        );
    }

    #[test]
    fn lowercase_and_or_are_plain_words() {
        let parser = QueryParser::new(64);
        let (events, _) = parser.parse("and or");
        assert_eq!(
            events,
            vec![
                ParserEvent::Word("and".to_string()),
                ParserEvent::Word("or".to_string()),
                ParserEvent::Eof,
            ]
        );
    }

    #[test]
    fn parses_phrase_with_sentence_end() {
        let parser = QueryParser::new(64);
        let (events, _) = parser.parse("\"the quick fox. ran away\"");
        assert_eq!(
            events,
            vec![
                ParserEvent::StartPhrase,
                ParserEvent::PhraseWord("the".to_string()),
                ParserEvent::PhraseWord("quick".to_string()),
                ParserEvent::PhraseWord("fox".to_string()),
                ParserEvent::EndSentence,
                ParserEvent::PhraseWord("ran".to_string()),
                ParserEvent::PhraseWord("away".to_string()),
                ParserEvent::EndPhrase,
                ParserEvent::Eof,
            ]
        );
    }

    #[test]
    fn unmatched_quote_still_closes_the_phrase_and_warns() {
        let parser = QueryParser::new(64);
        let (events, warnings) = parser.parse("\"open ended");
        assert!(matches!(events.last(), Some(ParserEvent::Eof)));
        assert!(events.contains(&ParserEvent::EndPhrase));
        assert!(warnings.has(ParserWarnings::UNMATCHED_QUOTES));
    }

    #[test]
    fn parses_modifier_with_name_and_value() {
        let parser = QueryParser::new(64);
        let (events, _) = parser.parse("[sloppy:3]");
        assert_eq!(
            events,
            vec![
                ParserEvent::StartModifier("sloppy".to_string()),
                ParserEvent::ModifierWord("3".to_string()),
                ParserEvent::EndModifier,
                ParserEvent::Eof,
            ]
        );
    }

    #[test]
    fn truncates_overlong_words_at_maxwordlen() {
        let parser = QueryParser::new(4);
        let (events, _) = parser.parse("abcdefgh");
        assert_eq!(
            events,
            vec![
                ParserEvent::Word("abcd".to_string()),
                ParserEvent::Word("efgh".to_string()),
                ParserEvent::Eof,
            ]
        );
    }

    #[test]
    fn parens_warn_without_aborting_the_parse() {
        let parser = QueryParser::new(64);
        let (events, warnings) = parser.parse("(cat)");
        assert!(warnings.has(ParserWarnings::PARENS_LOOK_LIKE_BOOLEAN));
        assert_eq!(events, vec![ParserEvent::Word("cat".to_string()), ParserEvent::Eof]);
    }
}
