/// Loan categories offered by Lora Finance.
///
/// The set is closed; the session store persists the display name and maps
/// anything unrecognized back to unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoanTopic {
    Gold,
    Personal,
    Business,
    Home,
    Education,
}

impl LoanTopic {
    /// Declaration order doubles as detection priority: when an utterance
    /// mentions several loan types, the earliest-declared one wins.
    pub const ALL: [LoanTopic; 5] = [
        LoanTopic::Gold,
        LoanTopic::Personal,
        LoanTopic::Business,
        LoanTopic::Home,
        LoanTopic::Education,
    ];

    /// The exact phrase that counts as an explicit mention. Matching is on
    /// the whole phrase; "home" alone never matches.
    pub fn keyword(&self) -> &'static str {
        match self {
            LoanTopic::Gold => "gold loan",
            LoanTopic::Personal => "personal loan",
            LoanTopic::Business => "business loan",
            LoanTopic::Home => "home loan",
            LoanTopic::Education => "education loan",
        }
    }

    pub fn display_name(&self) -> &'static str {
        self.keyword()
    }

    /// Extract an explicitly mentioned loan topic from an utterance.
    /// `None` is the common case for follow-up turns, not an error.
    pub fn detect(utterance: &str) -> Option<LoanTopic> {
        let lowered = utterance.to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|topic| lowered.contains(topic.keyword()))
    }

    pub fn from_db(value: &str) -> Option<LoanTopic> {
        Self::ALL
            .iter()
            .copied()
            .find(|topic| topic.display_name() == value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_explicit_mention() {
        assert_eq!(
            LoanTopic::detect("I want a gold loan"),
            Some(LoanTopic::Gold)
        );
        assert_eq!(
            LoanTopic::detect("What is PERSONAL LOAN interest rate?"),
            Some(LoanTopic::Personal)
        );
    }

    #[test]
    fn test_no_partial_word_match() {
        assert_eq!(LoanTopic::detect("I want to stay home"), None);
        assert_eq!(LoanTopic::detect("my education is done"), None);
        assert_eq!(LoanTopic::detect("home loan options"), Some(LoanTopic::Home));
    }

    #[test]
    fn test_followups_detect_nothing() {
        assert_eq!(LoanTopic::detect("documents?"), None);
        assert_eq!(LoanTopic::detect("what about eligibility?"), None);
    }

    #[test]
    fn test_declaration_order_breaks_ties() {
        assert_eq!(
            LoanTopic::detect("gold loan or home loan?"),
            Some(LoanTopic::Gold)
        );
        assert_eq!(
            LoanTopic::detect("home loan or gold loan?"),
            Some(LoanTopic::Gold)
        );
    }

    #[test]
    fn test_db_round_trip() {
        for topic in LoanTopic::ALL {
            assert_eq!(LoanTopic::from_db(topic.display_name()), Some(topic));
        }
        assert_eq!(LoanTopic::from_db("crypto loan"), None);
    }
}
