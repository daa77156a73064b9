use serde::{Deserialize, Serialize};

/// Predicates that express type membership rather than a relation between two entities.
pub const COPULA_PREDICATES: [&str; 5] = ["是", "is", "be", "属于", "belong"];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

impl Triple {
    #[must_use]
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }

    /// Same subject and object with a new predicate.
    #[must_use]
    pub fn relabeled(&self, predicate: impl Into<String>) -> Self {
        Self {
            subject: self.subject.clone(),
            predicate: predicate.into(),
            object: self.object.clone(),
        }
    }

    pub fn has_empty_field(&self) -> bool {
        self.subject.is_empty() || self.predicate.is_empty() || self.object.is_empty()
    }

    /// Why this triple must not become an edge, if it must not.
    pub fn filter_reason(&self) -> Option<FilterReason> {
        if self.has_empty_field() {
            return Some(FilterReason::MissingField);
        }
        if self.subject == self.object {
            return Some(FilterReason::SelfLoop);
        }
        if is_copula(&self.predicate) {
            return Some(FilterReason::Copula);
        }
        if self.predicate.trim().chars().count() <= 1 {
            return Some(FilterReason::ShortPredicate);
        }
        None
    }
}

impl std::fmt::Display for Triple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} --[{}]--> {}", self.subject, self.predicate, self.object)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterReason {
    MissingField,
    SelfLoop,
    Copula,
    ShortPredicate,
    UnknownEndpoint,
}

impl FilterReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingField => "missing_field",
            Self::SelfLoop => "self_loop",
            Self::Copula => "copula",
            Self::ShortPredicate => "short_predicate",
            Self::UnknownEndpoint => "unknown_endpoint",
        }
    }
}

impl std::fmt::Display for FilterReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive match against [`COPULA_PREDICATES`].
pub fn is_copula(predicate: &str) -> bool {
    let lowered = predicate.to_lowercase();
    COPULA_PREDICATES.contains(&lowered.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copula_is_case_insensitive() {
        assert!(is_copula("IS"));
        assert!(is_copula("Belong"));
        assert!(is_copula("属于"));
        assert!(!is_copula("负责"));
        assert!(!is_copula("is a"));
    }

    #[test]
    fn test_filter_reasons() {
        assert_eq!(Triple::new("A", "负责", "A").filter_reason(), Some(FilterReason::SelfLoop));
        assert_eq!(Triple::new("A", "是", "B").filter_reason(), Some(FilterReason::Copula));
        assert_eq!(Triple::new("A", " 有 ", "B").filter_reason(), Some(FilterReason::ShortPredicate));
        assert_eq!(Triple::new("A", "", "B").filter_reason(), Some(FilterReason::MissingField));
        assert_eq!(Triple::new("张三", "负责", "技术团队").filter_reason(), None);
    }

    #[test]
    fn test_short_predicate_counts_chars_not_bytes() {
        // A single CJK character is three bytes but still one character.
        assert_eq!(Triple::new("A", "管", "B").filter_reason(), Some(FilterReason::ShortPredicate));
        assert_eq!(Triple::new("A", "管理", "B").filter_reason(), None);
    }

    #[test]
    fn test_relabeled_keeps_endpoints() {
        let t = Triple::new("库克", "宣布", "iPhone 15").relabeled("发布");
        assert_eq!(t.subject, "库克");
        assert_eq!(t.predicate, "发布");
        assert_eq!(t.object, "iPhone 15");
        assert_eq!(t.to_string(), "库克 --[发布]--> iPhone 15");
    }
}
