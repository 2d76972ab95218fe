use uuid::Uuid;

pub const DEFAULT_FALLBACK_PREFIX: &str = "entry";
const FALLBACK_TOKEN_CHARS: usize = 8;

/// Maps free text onto `[a-z0-9-]` with single interior hyphens.
///
/// Whitespace and hyphens separate words, every other character outside the
/// allowed set is dropped without splitting the word it sits in. Returns an
/// empty string when nothing usable remains.
pub fn normalize(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    for ch in input.trim().to_lowercase().chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
            continue;
        }

        if ch.is_whitespace() || ch == '-' {
            pending_dash = true;
        }
    }

    slug
}

/// Text the slug is derived from: the override when it normalizes to
/// something, else the label.
pub fn source_text<'a>(label: &'a str, slug_override: Option<&'a str>) -> &'a str {
    match slug_override {
        Some(text) if !normalize(text).is_empty() => text,
        _ => label,
    }
}

/// `base` for the first attempt, `base-2`, `base-3`, ... afterwards.
pub fn candidate(base: &str, attempt: usize) -> String {
    if attempt <= 1 {
        base.to_string()
    } else {
        format!("{}-{}", base, attempt)
    }
}

pub fn fallback_base(prefix: &str) -> String {
    let token: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(FALLBACK_TOKEN_CHARS)
        .collect();

    let prefix = normalize(prefix);
    if prefix.is_empty() {
        token
    } else {
        format!("{}-{}", prefix, token)
    }
}

pub fn is_normalized(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && !slug.contains("--")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn assert_well_formed(output: &str) {
        assert!(output
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        assert!(!output.starts_with('-'), "leading hyphen in {:?}", output);
        assert!(!output.ends_with('-'), "trailing hyphen in {:?}", output);
        assert!(!output.contains("--"), "double hyphen in {:?}", output);
    }

    #[test]
    fn plain_heading() {
        assert_eq!(
            normalize("Sector 18 Residential Plots"),
            "sector-18-residential-plots"
        );
    }

    #[test]
    fn punctuation_and_padding() {
        assert_eq!(normalize("  YEIDA!! Plots -- 2025  "), "yeida-plots-2025");
    }

    #[test]
    fn punctuation_only_is_empty() {
        assert_eq!(normalize("***"), "");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   \t\n "), "");
        assert_eq!(normalize("- - -"), "");
    }

    #[test]
    fn dropped_characters_do_not_split_words() {
        assert_eq!(normalize("Godrej's Tropical Isle"), "godrejs-tropical-isle");
        assert_eq!(normalize("3BHK/4BHK"), "3bhk4bhk");
    }

    #[test]
    fn edge_hyphens_are_trimmed() {
        assert_eq!(normalize("-already-hyphenated-"), "already-hyphenated");
        assert_eq!(normalize("!! leading bang"), "leading-bang");
        assert_eq!(normalize("trailing ?"), "trailing");
    }

    #[test]
    fn non_ascii_letters_are_dropped() {
        assert_eq!(normalize("Café Noida"), "caf-noida");
        assert_eq!(normalize("नोएडा"), "");
        assert_eq!(normalize("Tower\u{00A0}B"), "tower-b");
    }

    #[test]
    fn output_shape_and_idempotence_hold_across_inputs() {
        let inputs = [
            "",
            "a",
            "--a--b--",
            "  Jaypee   Greens  ",
            "DLF   Phase    2",
            "Plot #42 (Corner) - East Facing!",
            "___under_scores___",
            "ÀÉÎ õü",
            "emoji 🏠 home",
            "tabs\tand\nnewlines",
            "1-2-3",
            "- -x- -",
        ];
        for input in inputs {
            let once = normalize(input);
            assert_well_formed(&once);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn override_wins_when_it_has_slug_content() {
        assert_eq!(source_text("Heading", Some("custom")), "custom");
        assert_eq!(source_text("Heading", Some("   ")), "Heading");
        assert_eq!(source_text("Heading", None), "Heading");
    }

    #[test]
    fn punctuation_override_falls_back_to_label() {
        assert_eq!(source_text("Gaur City", Some("***")), "Gaur City");
        assert_eq!(source_text("Gaur City", Some(" -- ")), "Gaur City");
        assert_eq!(source_text("***", Some("!!!")), "***");
    }

    #[test]
    fn candidates_start_suffixing_at_two() {
        assert_eq!(candidate("greater-noida-west", 1), "greater-noida-west");
        assert_eq!(candidate("greater-noida-west", 2), "greater-noida-west-2");
        assert_eq!(candidate("greater-noida-west", 17), "greater-noida-west-17");
    }

    #[test]
    fn fallback_is_a_valid_slug() {
        let base = fallback_base(DEFAULT_FALLBACK_PREFIX);
        assert!(base.starts_with("entry-"));
        assert_eq!(base.len(), "entry-".len() + FALLBACK_TOKEN_CHARS);
        assert!(is_normalized(&base));

        let bare = fallback_base("!!!");
        assert_eq!(bare.len(), FALLBACK_TOKEN_CHARS);
        assert!(is_normalized(&bare));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn any_string_normalizes_to_slug_shape(input in any::<String>()) {
            let once = normalize(&input);
            prop_assert!(once.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
            prop_assert!(!once.starts_with('-') && !once.ends_with('-'));
            prop_assert!(!once.contains("--"));
            prop_assert_eq!(normalize(&once), once.clone());
            prop_assert_eq!(is_normalized(&once), !once.is_empty());
        }

        #[test]
        fn printable_text_normalizes_idempotently(input in "\\PC*") {
            let once = normalize(&input);
            assert_well_formed(&once);
            prop_assert_eq!(normalize(&once), once);
        }

        #[test]
        fn numbered_candidates_stay_slugs(base in "[a-z0-9]{1,8}(-[a-z0-9]{1,8}){0,3}", attempt in 1usize..5000) {
            let slug = candidate(&base, attempt);
            prop_assert!(is_normalized(&slug));
            prop_assert!(slug.starts_with(base.as_str()));
        }
    }
}
