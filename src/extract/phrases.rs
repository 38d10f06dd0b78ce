//! Command normalization and wake-phrase matching

/// Phrases that interrupt narration and pause capture when none are configured
pub const DEFAULT_WAKE_PHRASES: &[&str] = &["hey mr v", "hey mister v", "hey vista", "mr v", "mister v"];

/// Lower-case `text`, turn punctuation into spaces and collapse whitespace
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Command string handed to the command sink next to the raw transcript
pub fn normalize_command(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Set of trigger phrases matched against final transcripts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakePhrases {
    phrases: Vec<String>,
}

impl WakePhrases {
    /// Build a matcher; blank phrases are dropped
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let phrases = phrases
            .into_iter()
            .map(|p| normalize(p.as_ref()))
            .filter(|p| !p.is_empty())
            .collect();
        Self { phrases }
    }

    /// Return the first phrase found on word boundaries inside `transcript`
    pub fn find(&self, transcript: &str) -> Option<&str> {
        let padded = format!(" {} ", normalize(transcript));
        self.phrases
            .iter()
            .find(|phrase| padded.contains(&format!(" {phrase} ")))
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }
}

impl Default for WakePhrases {
    fn default() -> Self {
        Self::new(DEFAULT_WAKE_PHRASES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Hey, Mr. V!  "), "hey mr v");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_normalize_command() {
        assert_eq!(normalize_command("  Go Back "), "go back");
    }

    #[test]
    fn test_wake_phrase_with_punctuation() {
        let phrases = WakePhrases::default();
        assert_eq!(phrases.find("Hey, Mr. V, what's next?"), Some("hey mr v"));
        assert_eq!(phrases.find("okay hey vista"), Some("hey vista"));
    }

    #[test]
    fn test_wake_phrase_needs_word_boundaries() {
        let phrases = WakePhrases::new(["vista"]);
        assert_eq!(phrases.find("vistaview homes"), None);
        assert_eq!(phrases.find("open vista now"), Some("vista"));
    }

    #[test]
    fn test_ordinary_commands_do_not_match() {
        let phrases = WakePhrases::default();
        assert_eq!(phrases.find("seven oh three"), None);
        assert_eq!(phrases.find("go back"), None);
    }

    #[test]
    fn test_blank_phrases_dropped() {
        let phrases = WakePhrases::new(["", "  ", "!"]);
        assert!(phrases.is_empty());
        assert_eq!(phrases.find("anything"), None);
    }
}
