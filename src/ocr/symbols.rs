// Heuristic A/B scoring of noisy recognized tokens
use crate::config::symbols::{AGGRESSIVE_FLOOR, AGGRESSIVE_MARGIN, LEADING_BONUS, MAX_TOKEN_LEN, STRICT_MARGIN};
use crate::schema::SessionValue;

/// How much evidence a token needs before it commits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringMode {
    /// Rows with an identified label
    Strict,
    /// Rows with no label: lower margin, and a clear leader above the floor is accepted
    Aggressive,
}

impl ScoringMode {
    fn margin(self) -> f32 {
        match self {
            ScoringMode::Strict => STRICT_MARGIN,
            ScoringMode::Aggressive => AGGRESSIVE_MARGIN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Mark(SessionValue),
    /// Not a candidate at all (too long, numeric, punctuation)
    Rejected,
    /// Looked like a mark but scored too close to call
    Ambiguous,
}

impl Verdict {
    pub fn mark(self) -> Option<SessionValue> {
        match self {
            Verdict::Mark(value) => Some(value),
            _ => None,
        }
    }
}

/// Handwritten A and its usual misreads
const A_PATTERNS: &[&str] = &[
    "A", "AA", "AR", "AP", "AH", "AN", "AM", "AV", "AX", "AI", "AL", "AT", "AS", "AK", "AY",
    "R", "RR", "RA", "RP", "RH", "RN", "RM",
    "P", "PP", "PA", "PR", "PH", "PL", "PN",
    "H", "HH", "HA", "HP", "HR", "HN", "HM",
    "N", "NN", "NA", "NR", "NP", "NH",
    "M", "MM", "MA", "MR", "MN", "MH",
    "V", "VV", "VA", "VR", "VN",
    "X", "XX", "XA", "XR",
    "K", "KK", "KA", "KR",
    "Y", "YY", "YA", "YR",
    "T", "TT", "TA", "TR",
    "I", "II", "IA", "IR",
    "L", "LL", "LA", "LR",
    "F", "FF", "FA", "FR",
    "U", "UU", "UA", "UR",
    "W", "WW", "WA", "WR",
    "Z", "ZZ", "ZA", "ZR",
    "J", "JJ", "JA", "JR",
];

/// Handwritten B and its usual misreads
const B_PATTERNS: &[&str] = &[
    "B", "BB", "B8", "BE", "BD", "BO", "BQ", "BG", "BC", "BS", "BL", "BR",
    "8", "88", "8B", "8E", "8D", "80", "8O", "8Q",
    "E", "EE", "EB", "E8", "ED", "EO", "EQ", "ES",
    "D", "DD", "DB", "D8", "DE", "DO", "DQ", "DG",
    "O", "OO", "OB", "O8", "OE", "OD", "OQ", "OG",
    "Q", "QQ", "QB", "Q8", "QE", "QO", "QD",
    "G", "GG", "GB", "G8", "GE", "GO", "GQ",
    "C", "CC", "CB", "C8", "CE", "CO", "CQ",
    "S", "SS", "SB", "S8", "SE", "SO",
];

const A_CONFUSIONS: &str = "ARPHNMVXKYTILFUWZJ147";
const B_CONFUSIONS: &str = "B8EDOQGCS0369";

const STRIPPED: &[char] = &[' ', '.', ',', '-', '_', '/', '|', '\\'];

/// Score one token. Never panics, never guesses beyond the mode's margin.
pub fn classify_token(text: &str, mode: ScoringMode) -> Verdict {
    let upper = text.trim().to_uppercase();
    if upper.is_empty() || upper.chars().count() > MAX_TOKEN_LEN {
        return Verdict::Rejected;
    }
    if upper.chars().count() > 2 && upper.chars().all(|c| c.is_ascii_digit()) {
        return Verdict::Rejected;
    }
    if upper.matches('/').count() > 2 || upper.matches('-').count() > 3 {
        return Verdict::Rejected;
    }

    let clean: String = upper.chars().filter(|c| !STRIPPED.contains(c)).collect();
    if clean.is_empty() {
        return Verdict::Rejected;
    }

    if let Some(value) = exact_or_pattern(&clean)
        .or_else(|| single_character(&clean))
        .or_else(|| leading_characters(&clean))
    {
        return Verdict::Mark(value);
    }

    let a = similarity(&clean, A_CONFUSIONS, &['A', 'R']);
    let b = similarity(&clean, B_CONFUSIONS, &['B', '8']);
    let margin = mode.margin();

    if a > b + margin {
        Verdict::Mark(SessionValue::A)
    } else if b > a + margin {
        Verdict::Mark(SessionValue::B)
    } else if mode == ScoringMode::Aggressive && a > b && a > AGGRESSIVE_FLOOR {
        Verdict::Mark(SessionValue::A)
    } else if mode == ScoringMode::Aggressive && b > a && b > AGGRESSIVE_FLOOR {
        Verdict::Mark(SessionValue::B)
    } else {
        Verdict::Ambiguous
    }
}

fn exact_or_pattern(clean: &str) -> Option<SessionValue> {
    if A_PATTERNS.contains(&clean) {
        Some(SessionValue::A)
    } else if B_PATTERNS.contains(&clean) {
        Some(SessionValue::B)
    } else {
        None
    }
}

fn single_character(clean: &str) -> Option<SessionValue> {
    let mut chars = clean.chars();
    let (Some(c), None) = (chars.next(), chars.next()) else {
        return None;
    };
    match c {
        'A' | 'R' | 'P' | 'H' | 'N' | 'M' | 'V' | 'X' | 'K' | 'Y' | 'T' | 'I' | 'L' | 'F' | 'U' | 'W' | 'Z' | 'J' => {
            Some(SessionValue::A)
        }
        'B' | '8' | 'E' | 'D' | 'O' | 'Q' | 'G' | 'C' | 'S' => Some(SessionValue::B),
        '1' | '4' | '7' => Some(SessionValue::A),
        '0' | '3' | '5' | '6' | '9' => Some(SessionValue::B),
        _ => None,
    }
}

/// First-character priority with a veto from a contradicting second character
fn leading_characters(clean: &str) -> Option<SessionValue> {
    let chars: Vec<char> = clean.chars().collect();
    if chars.len() < 2 {
        return None;
    }
    let (first, second) = (chars[0], chars[1]);
    let short = chars.len() <= 2;

    if "ARPHNMVX".contains(first) && (!"B8EO0DQ".contains(second) || (short && first == 'A')) {
        return Some(SessionValue::A);
    }
    if "B8EDO".contains(first) && (!"ARPHMNV".contains(second) || (short && matches!(first, 'B' | '8'))) {
        return Some(SessionValue::B);
    }
    if "KYTILFUWZJ".contains(first) && !"B8EO0".contains(second) {
        return Some(SessionValue::A);
    }
    if "QGCS".contains(first) && !"ARPH".contains(second) {
        return Some(SessionValue::B);
    }
    None
}

/// Fraction of characters in the confusion set, plus a bonus for a strong leading character
fn similarity(clean: &str, confusions: &str, leaders: &[char]) -> f32 {
    let total = clean.chars().count();
    if total == 0 {
        return 0.0;
    }
    let hits = clean.chars().filter(|c| confusions.contains(*c)).count();
    let mut score = hits as f32 / total as f32;
    if clean.chars().next().is_some_and(|c| leaders.contains(&c)) {
        score += LEADING_BONUS;
    }
    score.min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionValue::{A, B};

    fn strict(text: &str) -> Verdict {
        classify_token(text, ScoringMode::Strict)
    }

    #[test]
    fn clean_letters() {
        assert_eq!(strict("A"), Verdict::Mark(A));
        assert_eq!(strict(" b "), Verdict::Mark(B));
        assert_eq!(strict("A."), Verdict::Mark(A));
        assert_eq!(strict("|B|"), Verdict::Mark(B));
    }

    #[test]
    fn common_misreads() {
        assert_eq!(strict("8"), Verdict::Mark(B));
        assert_eq!(strict("R"), Verdict::Mark(A));
        assert_eq!(strict("4"), Verdict::Mark(A));
        assert_eq!(strict("0"), Verdict::Mark(B));
        assert_eq!(strict("PH"), Verdict::Mark(A));
        assert_eq!(strict("B8"), Verdict::Mark(B));
    }

    #[test]
    fn leading_character_rules() {
        // Not in any pattern set, decided by first/second character
        assert_eq!(strict("AZ"), Verdict::Mark(A));
        assert_eq!(strict("AB"), Verdict::Mark(A));
        assert_eq!(strict("BA"), Verdict::Mark(B));
        assert_eq!(strict("KT"), Verdict::Mark(A));
        assert_eq!(strict("GX"), Verdict::Mark(B));
    }

    #[test]
    fn non_candidates_are_rejected() {
        assert_eq!(strict(""), Verdict::Rejected);
        assert_eq!(strict("Recreation"), Verdict::Rejected);
        assert_eq!(strict("123"), Verdict::Rejected);
        assert_eq!(strict("a/b/c/d"), Verdict::Rejected);
        assert_eq!(strict("-.-"), Verdict::Rejected);
    }

    #[test]
    fn similarity_decides_what_rules_do_not() {
        // H leads and vetoes on 8; scores A 2/3, B 1/3
        assert_eq!(strict("H8X"), Verdict::Mark(A));
        // 0 then A: A-side 1/2, B-side 1/2, undecidable
        assert_eq!(strict("0A"), Verdict::Ambiguous);
        assert_eq!(classify_token("0A", ScoringMode::Aggressive), Verdict::Ambiguous);
    }

    #[test]
    fn aggressive_accepts_a_narrow_lead() {
        // E leads but A vetoes; A-side 4/7 against B-side 3/7
        assert_eq!(strict("EAAA88Z"), Verdict::Ambiguous);
        assert_eq!(classify_token("EAAA88Z", ScoringMode::Aggressive), Verdict::Mark(A));
    }
}
