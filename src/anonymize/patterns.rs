//! PII detectors shared by the scrubber and the validator.
//!
//! Both sides call [`find_pii`], so the validator re-checks exactly what the
//! scrubber was supposed to remove.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

pub const EMAIL: &str = "email";
pub const SSN: &str = "ssn";
pub const PHONE: &str = "phone";
pub const STREET_ADDRESS: &str = "street_address";
pub const HONORIFIC_NAME: &str = "honorific_name";
pub const NAME_LIST: &str = "name_list";
pub const CAPITALIZED_NAME: &str = "capitalized_name";

static RE_EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b").unwrap());

static RE_SSN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap());

static RE_PHONE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+?1[-.\s]?)?(?:\(\d{3}\)\s?|\b\d{3}[-.\s]?)\d{3}[-.\s]?\d{4}\b").unwrap()
});

static RE_STREET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b\d{1,5}\s+(?:[A-Za-z0-9]+\.?\s+){1,3}(?:[Ss]treet|St|[Aa]venue|Ave|[Rr]oad|Rd|[Bb]oulevard|Blvd|[Ll]ane|Ln|[Dd]rive|Dr|[Cc]ourt|Ct|[Ww]ay|[Pp]lace|Pl|[Tt]errace|[Cc]ircle)\b\.?",
    )
    .unwrap()
});

static RE_HONORIFIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:Mr|Mrs|Ms|Miss|Dr|Prof)\.?\s+[A-Z][a-z]+(?:\s+[A-Z][a-z]+)?").unwrap()
});

static RE_CAP_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Z][a-z]+\b").unwrap());

/// Clinical / mental-health vocabulary that must survive scrubbing.
pub const MENTAL_HEALTH_KEYWORDS: &[&str] = &[
    "anxiety",
    "depression",
    "stress",
    "crisis",
    "panic",
    "trauma",
    "suicide",
    "self-harm",
    "isolation",
    "loneliness",
    "fear",
    "worry",
    "overwhelmed",
    "hopeless",
    "helpless",
    "numb",
    "angry",
    "irritable",
];

static CLINICAL_WHITELIST: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    let mut s: HashSet<&'static str> = MENTAL_HEALTH_KEYWORDS.iter().copied().collect();
    s.extend([
        "hope", "disorder", "attack", "attacks", "bipolar", "ptsd", "grief", "mania", "manic",
        "therapy", "therapist", "counseling", "counselor", "insomnia", "addiction", "relapse",
        "withdrawal", "anorexia", "bulimia", "psychosis", "suicidal", "depressed", "anxious",
        "hopelessness", "worthless", "lonely", "exhausted", "trauma", "flashbacks",
        "nightmares", "grace", "joy", "faith",
    ]);
    s
});

/// Capitalized function words that start sentences; never names on their own.
static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "a", "an", "and", "but", "or", "so", "then", "when", "after", "before", "since",
        "she", "he", "they", "we", "you", "it", "my", "his", "her", "their", "our", "your",
        "this", "that", "these", "those", "there", "here", "caller", "client", "patient",
        "student", "today", "yesterday", "tomorrow", "last", "next", "every", "some", "no",
        "not", "yes", "maybe", "also", "still", "feeling", "feels", "reports", "reported",
        "says", "said", "mentions", "discussed", "session", "call", "school", "work", "home",
        "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday",
        "themes", "detected", "general", "mental", "health", "if", "i'm", "im", "is", "was",
    ]
    .into_iter()
    .collect()
});

/// First-name dictionary. Capitalized occurrences are treated as names.
static FIRST_NAMES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "james", "john", "robert", "michael", "william", "david", "richard", "joseph", "thomas",
        "charles", "christopher", "daniel", "matthew", "anthony", "mark", "steven", "paul",
        "andrew", "joshua", "kevin", "brian", "george", "edward", "ryan", "jacob", "luis",
        "carlos", "jose", "juan", "mary", "patricia", "jennifer", "linda", "elizabeth",
        "barbara", "susan", "jessica", "sarah", "karen", "nancy", "lisa", "betty", "margaret",
        "sandra", "ashley", "emily", "michelle", "amanda", "melissa", "deborah", "stephanie",
        "rebecca", "laura", "emma", "olivia", "sophia", "maria", "ana", "hope", "grace", "joy",
        "faith", "jane", "alex", "sam", "chris", "taylor", "jordan",
    ]
    .into_iter()
    .collect()
});

pub fn is_clinical(word: &str) -> bool {
    CLINICAL_WHITELIST.contains(word.to_lowercase().as_str())
}

/// One PII hit: pattern name plus byte span in the scanned text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PiiFinding {
    pub pattern: &'static str,
    pub start: usize,
    pub end: usize,
}

impl PiiFinding {
    fn overlaps(&self, other: &PiiFinding) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Placeholder written in place of a finding.
pub fn placeholder(pattern: &str) -> &'static str {
    match pattern {
        EMAIL => "[EMAIL]",
        SSN => "[SSN]",
        PHONE => "[PHONE]",
        STREET_ADDRESS => "[ADDRESS]",
        _ => "[NAME]",
    }
}

/// All PII findings in `text`, sorted by start, non-overlapping.
/// Earlier patterns in the precedence list win overlaps.
pub fn find_pii(text: &str) -> Vec<PiiFinding> {
    let mut out: Vec<PiiFinding> = Vec::new();

    let mut push = |f: PiiFinding, out: &mut Vec<PiiFinding>| {
        if !out.iter().any(|o| o.overlaps(&f)) {
            out.push(f);
        }
    };

    for (name, re) in [
        (EMAIL, &*RE_EMAIL),
        (SSN, &*RE_SSN),
        (PHONE, &*RE_PHONE),
        (STREET_ADDRESS, &*RE_STREET),
        (HONORIFIC_NAME, &*RE_HONORIFIC),
    ] {
        for m in re.find_iter(text) {
            push(
                PiiFinding {
                    pattern: name,
                    start: m.start(),
                    end: m.end(),
                },
                &mut out,
            );
        }
    }

    for f in name_token_findings(text) {
        push(f, &mut out);
    }

    out.sort_by_key(|f| f.start);
    out
}

/// Dictionary names and capitalized-bigram heuristics, token by token.
/// Clinical words are never reported, so "Panic Disorder" or "Hope" survive
/// while the surname in "Hope Martinez" does not.
fn name_token_findings(text: &str) -> Vec<PiiFinding> {
    let words: Vec<(usize, usize, &str)> = RE_CAP_WORD
        .find_iter(text)
        .map(|m| (m.start(), m.end(), m.as_str()))
        .collect();

    let adjacent = |i: usize, j: usize| -> bool {
        let (_, end_i, _) = words[i];
        let (start_j, _, _) = words[j];
        let gap = &text[end_i..start_j];
        !gap.is_empty() && gap.chars().all(|c| c == ' ')
    };

    let mut out = Vec::new();
    for (i, &(start, end, word)) in words.iter().enumerate() {
        let lower = word.to_lowercase();
        if CLINICAL_WHITELIST.contains(lower.as_str()) {
            continue;
        }
        if FIRST_NAMES.contains(lower.as_str()) {
            out.push(PiiFinding {
                pattern: NAME_LIST,
                start,
                end,
            });
            continue;
        }
        if STOPWORDS.contains(lower.as_str()) {
            continue;
        }
        let in_run = (i > 0 && adjacent(i - 1, i)) || (i + 1 < words.len() && adjacent(i, i + 1));
        if in_run {
            out.push(PiiFinding {
                pattern: CAPITALIZED_NAME,
                start,
                end,
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(text: &str) -> Vec<&'static str> {
        find_pii(text).into_iter().map(|f| f.pattern).collect()
    }

    #[test]
    fn detects_contact_details() {
        assert_eq!(patterns("mail me at jo.doe@example.org"), vec![EMAIL]);
        assert_eq!(patterns("call 555-123-4567 tonight"), vec![PHONE]);
        assert_eq!(patterns("call (555) 123-4567 tonight"), vec![PHONE]);
        assert_eq!(patterns("ssn 123-45-6789"), vec![SSN]);
        assert_eq!(patterns("lives at 42 Oak Street now"), vec![STREET_ADDRESS]);
    }

    #[test]
    fn detects_names() {
        assert_eq!(patterns("spoke with Dr. Alan Whitfield"), vec![HONORIFIC_NAME]);
        assert_eq!(patterns("her friend Mary called"), vec![NAME_LIST]);
        assert_eq!(
            patterns("met Tobias Vancleave downtown"),
            vec![CAPITALIZED_NAME, CAPITALIZED_NAME]
        );
    }

    #[test]
    fn clinical_words_are_preserved() {
        assert!(find_pii("Panic Disorder diagnosis, feels Hope is gone").is_empty());
        let f = find_pii("Hope Martinez called");
        assert_eq!(f.len(), 1);
        assert_eq!(&"Hope Martinez called"[f[0].start..f[0].end], "Martinez");
    }

    #[test]
    fn placeholders_do_not_retrigger() {
        assert!(find_pii("[NAME] [EMAIL] [PHONE] [SSN] [ADDRESS]").is_empty());
    }
}
