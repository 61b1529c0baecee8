//! ICD-10 chapters

/// Number of ICD-10 chapters
pub const CHAPTER_COUNT: usize = 22;

/// Chapter numeral and inclusive range of three-character categories
const CHAPTERS: [(&str, &str, &str); CHAPTER_COUNT] = [
    ("I", "A00", "B99"),
    ("II", "C00", "D48"),
    ("III", "D50", "D89"),
    ("IV", "E00", "E90"),
    ("V", "F00", "F99"),
    ("VI", "G00", "G99"),
    ("VII", "H00", "H59"),
    ("VIII", "H60", "H95"),
    ("IX", "I00", "I99"),
    ("X", "J00", "J99"),
    ("XI", "K00", "K93"),
    ("XII", "L00", "L99"),
    ("XIII", "M00", "M99"),
    ("XIV", "N00", "N99"),
    ("XV", "O00", "O99"),
    ("XVI", "P00", "P96"),
    ("XVII", "Q00", "Q99"),
    ("XVIII", "R00", "R99"),
    ("XIX", "S00", "T98"),
    ("XX", "V01", "Y98"),
    ("XXI", "Z00", "Z99"),
    ("XXII", "U00", "U99"),
];

/// 1-based chapter of a diagnosis code, from its first three characters
pub fn chapter_of(code: &str) -> Option<usize> {
    let category = code.trim().get(..3)?.to_ascii_uppercase();
    CHAPTERS
        .iter()
        .position(|(_, first, last)| (*first..=*last).contains(&category.as_str()))
        .map(|i| i + 1)
}

/// Attribute suffix of a chapter (`ch1` .. `ch22`)
pub fn chapter_key(chapter: usize) -> String {
    format!("ch{}", chapter)
}

/// Roman numeral of a chapter
pub fn chapter_numeral(chapter: usize) -> Option<&'static str> {
    CHAPTERS.get(chapter.checked_sub(1)?).map(|(numeral, _, _)| *numeral)
}

/// Keys of every chapter, in chapter order
pub fn all_chapter_keys() -> Vec<String> {
    (1..=CHAPTER_COUNT).map(chapter_key).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_codes() {
        assert_eq!(chapter_of("A09"), Some(1));
        assert_eq!(chapter_of("J189"), Some(10));
        assert_eq!(chapter_of("D50"), Some(3));
        assert_eq!(chapter_of("D48"), Some(2));
        assert_eq!(chapter_of("H66"), Some(8));
        assert_eq!(chapter_of("t14"), Some(19));
        assert_eq!(chapter_of("U071"), Some(22));
        assert_eq!(chapter_of("Z38"), Some(21));
    }

    #[test]
    fn rejects_short_or_unknown_codes() {
        assert_eq!(chapter_of("J1"), None);
        assert_eq!(chapter_of(""), None);
        assert_eq!(chapter_of("D49"), None);
        assert_eq!(chapter_of("123"), None);
    }

    #[test]
    fn keys_and_numerals() {
        assert_eq!(all_chapter_keys().len(), CHAPTER_COUNT);
        assert_eq!(chapter_key(7), "ch7");
        assert_eq!(chapter_numeral(22), Some("XXII"));
        assert_eq!(chapter_numeral(0), None);
    }
}
