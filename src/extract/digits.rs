//! Spoken digit extraction and phone-number rendering
//!
//! Recognition engines render "seven oh three" either as words or as
//! literal digits depending on context, so extraction computes both
//! candidates and keeps the longer one.

/// Maximum number of digits kept by [`format_phone_number`]
const PHONE_DIGITS: usize = 10;

/// Map a single lower-cased token to a digit
///
/// Covers number words plus the homophones engines commonly produce
/// for them ("won", "tree", "fore", "ate").
fn word_to_digit(token: &str) -> Option<char> {
    let digit = match token {
        "zero" | "oh" | "o" => '0',
        "one" | "won" => '1',
        "two" | "to" | "too" => '2',
        "three" | "tree" => '3',
        "four" | "for" | "fore" => '4',
        "five" | "fife" => '5',
        "six" | "sicks" => '6',
        "seven" => '7',
        "eight" | "ate" => '8',
        "nine" | "niner" => '9',
        _ => {
            let mut chars = token.chars();
            return match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii_digit() => Some(c),
                _ => None,
            };
        }
    };
    Some(digit)
}

/// Extract the digit sequence spoken in `text`
///
/// Returns the word-mapped candidate unless stripping non-digits from the
/// raw text yields strictly more digits. Ties go to the word candidate.
pub fn extract_digits(text: &str) -> String {
    let raw: String = text.chars().filter(|c| c.is_ascii_digit()).collect();

    let lower = text.to_lowercase();
    let spoken: String = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .filter_map(word_to_digit)
        .collect();

    if spoken.len() >= raw.len() {
        spoken
    } else {
        raw
    }
}

/// Render up to ten digits as `DDD`, `DDD-DDD` or `DDD-DDD-DDDD`
pub fn format_phone_number(digits: &str) -> String {
    let clean: String = digits
        .chars()
        .filter(|c| c.is_ascii_digit())
        .take(PHONE_DIGITS)
        .collect();

    match clean.len() {
        0..=3 => clean,
        4..=6 => format!("{}-{}", &clean[..3], &clean[3..]),
        _ => format!("{}-{}-{}", &clean[..3], &clean[3..6], &clean[6..]),
    }
}

fn digit_word(digit: char) -> &'static str {
    match digit {
        '0' => "zero",
        '1' => "one",
        '2' => "two",
        '3' => "three",
        '4' => "four",
        '5' => "five",
        '6' => "six",
        '7' => "seven",
        '8' => "eight",
        _ => "nine",
    }
}

/// Render digits as narration text
///
/// A full ten-digit number is grouped as area code, exchange and line with
/// sentence breaks between groups so the narration pauses naturally.
pub fn speakable_phone(digits: &str) -> String {
    let words: Vec<&str> = digits
        .chars()
        .filter(|c| c.is_ascii_digit())
        .map(digit_word)
        .collect();

    if words.len() == PHONE_DIGITS {
        format!(
            "{}. {}. {}",
            words[..3].join(" "),
            words[3..6].join(" "),
            words[6..].join(" ")
        )
    } else {
        words.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spoken_phone_number() {
        let digits = extract_digits("seven zero three five five five one two three four");
        assert_eq!(digits, "7035551234");
        assert_eq!(format_phone_number(&digits), "703-555-1234");
    }

    #[test]
    fn test_homophones_map_to_digits() {
        assert_eq!(extract_digits("won tree fore ate"), "1348");
        assert_eq!(extract_digits("Seven, oh, THREE."), "703");
    }

    #[test]
    fn test_literal_digits_win_when_longer() {
        assert_eq!(extract_digits("my number is 703-555-1234"), "7035551234");
        assert_eq!(extract_digits("code 4821"), "4821");
    }

    #[test]
    fn test_single_digit_tokens_count_as_words() {
        assert_eq!(extract_digits("7 oh 3"), "703");
    }

    #[test]
    fn test_tie_prefers_word_candidate() {
        // one spoken digit against one literal digit
        assert_eq!(extract_digits("won 5x"), "1");
        // three words against three literal digits
        assert_eq!(extract_digits("703 then five five five"), "555");
    }

    #[test]
    fn test_word_candidate_never_shorter_than_raw() {
        for text in ["seven oh three", "two too to", "nine niner 9", "four 4 for"] {
            let raw: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
            let result = extract_digits(text);
            assert!(result.len() >= raw.len(), "{text}");
        }
    }

    #[test]
    fn test_no_digits() {
        assert_eq!(extract_digits(""), "");
        assert_eq!(extract_digits("go back please"), "");
    }

    #[test]
    fn test_format_lengths() {
        assert_eq!(format_phone_number(""), "");
        assert_eq!(format_phone_number("70"), "70");
        assert_eq!(format_phone_number("703"), "703");
        assert_eq!(format_phone_number("7035"), "703-5");
        assert_eq!(format_phone_number("703555"), "703-555");
        assert_eq!(format_phone_number("7035551"), "703-555-1");
        assert_eq!(format_phone_number("703555123499"), "703-555-1234");
    }

    #[test]
    fn test_format_is_idempotent() {
        let source = "7035551234";
        for len in 0..=source.len() {
            let once = format_phone_number(&source[..len]);
            assert_eq!(format_phone_number(&once), once, "length {len}");
        }
    }

    #[test]
    fn test_speakable_full_number_is_grouped() {
        assert_eq!(
            speakable_phone("703-555-1234"),
            "seven zero three. five five five. one two three four"
        );
    }

    #[test]
    fn test_speakable_partial_number_is_flat() {
        assert_eq!(speakable_phone("4821"), "four eight two one");
        assert_eq!(speakable_phone(""), "");
    }
}
