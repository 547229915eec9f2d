// Fuzzy skill-label matching against the fixed skill list
use crate::schema::SKILL_AREAS;

/// Bumped whenever a keyword is added, removed or re-pointed.
pub const KEYWORD_TABLE_VERSION: u32 = 2;

/// Lower-case fragments and common misreads, each pointing at one skill.
/// Matched by containment; the longest hit in a token wins.
const STRONG_KEYWORDS: &[(&str, &str)] = &[
    ("gross", "Gross Motor"),
    ("gros", "Gross Motor"),
    ("goss", "Gross Motor"),
    ("fine", "Fine Motor"),
    ("fne", "Fine Motor"),
    ("fin", "Fine Motor"),
    ("fina", "Fine Motor"),
    ("fime", "Fine Motor"),
    ("tine", "Fine Motor"),
    ("firne", "Fine Motor"),
    ("eating", "Eating"),
    ("eat", "Eating"),
    ("ealing", "Eating"),
    ("eatng", "Eating"),
    ("dressing", "Dressing"),
    ("dress", "Dressing"),
    ("dresing", "Dressing"),
    ("dressng", "Dressing"),
    ("grooming", "Grooming"),
    ("groom", "Grooming"),
    ("groming", "Grooming"),
    ("groomng", "Grooming"),
    ("toileting", "Toileting"),
    ("toilet", "Toileting"),
    ("toiletng", "Toileting"),
    ("loileting", "Toileting"),
    ("receptive", "Receptive Language"),
    ("reception", "Receptive Language"),
    ("receptve", "Receptive Language"),
    ("receplive", "Receptive Language"),
    ("expressive", "Expressive Language"),
    ("express", "Expressive Language"),
    ("expressve", "Expressive Language"),
    ("expresive", "Expressive Language"),
    ("social", "Social Interaction"),
    ("interaction", "Social Interaction"),
    ("socal", "Social Interaction"),
    ("soclal", "Social Interaction"),
    ("reading", "Reading"),
    ("read", "Reading"),
    ("readng", "Reading"),
    ("reacing", "Reading"),
    ("writing", "Writing"),
    ("writ", "Writing"),
    ("writng", "Writing"),
    ("wriling", "Writing"),
    ("numbers", "Numbers"),
    ("number", "Numbers"),
    ("numbe", "Numbers"),
    ("numbrs", "Numbers"),
    ("nurnbers", "Numbers"),
    ("time", "Time"),
    ("tirne", "Time"),
    ("lime", "Time"),
    ("money", "Money"),
    ("mone", "Money"),
    ("morney", "Money"),
    ("domestic", "Domestic Behaviour"),
    ("behaviour", "Domestic Behaviour"),
    ("behavior", "Domestic Behaviour"),
    ("domestc", "Domestic Behaviour"),
    ("domeslic", "Domestic Behaviour"),
    ("community", "Community Orientation"),
    ("orientation", "Community Orientation"),
    ("communty", "Community Orientation"),
    ("cornmunity", "Community Orientation"),
    ("orientaton", "Community Orientation"),
    ("recreation", "Recreation"),
    ("recreat", "Recreation"),
    ("recrealion", "Recreation"),
    ("recration", "Recreation"),
    ("reoreation", "Recreation"),
    ("recreaton", "Recreation"),
    ("vocational", "Vocational"),
    ("vocat", "Vocational"),
    ("vocationa", "Vocational"),
    ("vocalional", "Vocational"),
    ("vocatonal", "Vocational"),
];

/// Shared by more than one skill name; only consulted when nothing strong matches.
const WEAK_KEYWORDS: &[(&str, &str)] = &[("motor", "Gross Motor")];

/// Lower-case letters only, so "1.Gross" and "GROSS" compare alike
pub fn normalize_label(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphabetic())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Keyword-table lookup on a single token.
pub fn match_keyword(text: &str) -> Option<&'static str> {
    let norm = normalize_label(text);
    if norm.is_empty() {
        return None;
    }

    let strong = STRONG_KEYWORDS
        .iter()
        .filter(|(keyword, _)| norm.contains(keyword))
        .fold(None::<(&str, &'static str)>, |best, &(keyword, skill)| match best {
            Some((k, _)) if k.len() >= keyword.len() => best,
            _ => Some((keyword, skill)),
        });
    if let Some((_, skill)) = strong {
        return Some(skill);
    }

    WEAK_KEYWORDS
        .iter()
        .find(|(keyword, _)| norm.contains(keyword))
        .map(|&(_, skill)| skill)
}

/// Prefix overlap against the words of each canonical name.
///
/// A skill word's 4-letter prefix inside the token scores 4; otherwise the
/// shared leading run scores its length when it is at least 3. Highest score
/// wins, ties go to the skill printed first.
pub fn fuzzy_match(text: &str) -> Option<&'static str> {
    let norm = normalize_label(text);
    if norm.chars().count() < 3 {
        return None;
    }

    let mut best: Option<(usize, &'static str)> = None;
    for &skill in SKILL_AREAS.iter() {
        let score = skill
            .split_whitespace()
            .map(|word| word_score(&norm, &word.to_lowercase()))
            .max()
            .unwrap_or(0);
        if score > 0 && best.map_or(true, |(s, _)| score > s) {
            best = Some((score, skill));
        }
    }
    best.map(|(_, skill)| skill)
}

fn word_score(token: &str, word: &str) -> usize {
    let shared = token.chars().zip(word.chars()).take_while(|(a, b)| a == b).count();
    let mut score = if shared >= 3 { shared } else { 0 };
    if word.chars().count() >= 4 {
        let prefix: String = word.chars().take(4).collect();
        if token.contains(&prefix) {
            score = score.max(4);
        }
    }
    score
}

/// Keyword table first, prefix overlap second.
pub fn identify_skill(text: &str) -> Option<&'static str> {
    match_keyword(text).or_else(|| fuzzy_match(text))
}

/// Whether a token is another word of `skill`'s printed name, e.g. "Motor" after "Gross".
pub fn continues_label(text: &str, skill: &str) -> bool {
    let norm = normalize_label(text);
    if norm.is_empty() {
        return false;
    }
    skill.split_whitespace().any(|word| word.to_lowercase() == norm)
        || STRONG_KEYWORDS.iter().any(|&(keyword, s)| s == skill && keyword == norm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_keyword_points_at_a_real_skill() {
        for (keyword, skill) in STRONG_KEYWORDS.iter().chain(WEAK_KEYWORDS) {
            assert!(SKILL_AREAS.contains(skill), "{keyword} -> {skill}");
        }
    }

    #[test]
    fn every_printed_name_matches_itself() {
        for skill in SKILL_AREAS {
            assert_eq!(identify_skill(skill), Some(skill));
        }
    }

    #[test]
    fn misreads_resolve() {
        assert_eq!(identify_skill("Groming"), Some("Grooming"));
        assert_eq!(identify_skill("Loileting"), Some("Toileting"));
        assert_eq!(identify_skill("NURNBERS"), Some("Numbers"));
        assert_eq!(identify_skill("3.Dresing"), Some("Dressing"));
    }

    #[test]
    fn longest_keyword_wins_over_embedded_fragments() {
        // "recreation" contains "eat"
        assert_eq!(match_keyword("recreation"), Some("Recreation"));
        // "motor" alone would say Gross Motor
        assert_eq!(match_keyword("finemotor"), Some("Fine Motor"));
        assert_eq!(match_keyword("motor"), Some("Gross Motor"));
    }

    #[test]
    fn prefix_fallback() {
        assert_eq!(match_keyword("Vocasional"), None);
        assert_eq!(fuzzy_match("Vocasional"), Some("Vocational"));
        assert_eq!(fuzzy_match("Langu"), Some("Receptive Language"));
        assert_eq!(fuzzy_match("AB"), None);
        assert_eq!(identify_skill("Xyzzy"), None);
    }

    #[test]
    fn label_continuation() {
        assert!(continues_label("Motor", "Gross Motor"));
        assert!(continues_label("language", "Expressive Language"));
        assert!(!continues_label("A", "Gross Motor"));
        assert!(!continues_label("Motor", "Eating"));
    }
}
