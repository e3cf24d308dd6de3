//! Deterministic phonetic folding for the catalog's phonetic keys.
//!
//! The reference system uses FONEM, a French-specific phonetic encoder.
//! Spec §9 fixes the behavioural contract — deterministic, language
//! appropriate — not the algorithm name, so this is a hand-rolled French
//! phonetic fold rather than an imported encoder: pulling in a crate whose
//! FONEM fidelity can't be verified would risk silently claiming behaviour
//! it doesn't have.

/// Fold a single word into a short phonetic code. Same input always yields
/// the same code (spec §8 "phonetic encoding... deterministic").
pub fn phonetic_key(word: &str) -> String {
    let folded = fold_diacritics(&word.to_lowercase());
    let mut code = String::with_capacity(folded.len());
    let chars: Vec<char> = folded.chars().filter(|c| c.is_alphabetic()).collect();

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        let mapped: Option<char> = match (c, next) {
            ('p', Some('h')) => {
                i += 1;
                Some('f')
            }
            ('q', Some('u')) => {
                i += 1;
                Some('k')
            }
            ('c', Some('h')) => {
                i += 1;
                Some('x')
            }
            // 'h' is silent in French outside the digraphs above.
            ('h', _) => None,
            ('c', Some(n)) if matches!(n, 'e' | 'i' | 'y') => Some('s'),
            ('c', _) => Some('k'),
            ('k', _) => Some('k'),
            ('q', _) => Some('k'),
            ('y', _) => Some('i'),
            ('z', _) => Some('s'),
            ('w', _) => Some('v'),
            ('x', _) => Some('k'),
            (other, _) => Some(other),
        };

        if let Some(mapped) = mapped {
            if code.chars().last() != Some(mapped) {
                code.push(mapped);
            }
        }
        i += 1;
    }

    // Drop non-initial vowels: consonant skeleton carries most of the
    // perceptual signal for sung/spoken French and survives mishearing
    // better than a full phonetic transcription would.
    let mut result = String::new();
    for (idx, c) in code.chars().enumerate() {
        if idx == 0 || !is_vowel(c) {
            result.push(c);
        }
    }

    if result.is_empty() {
        folded
    } else {
        result
    }
}

/// Phonetic keys for every word in a title/query, deduplicated.
pub fn phonetic_keys(text: &str) -> Vec<String> {
    let mut keys: Vec<String> = text
        .split_whitespace()
        .map(phonetic_key)
        .filter(|k| !k.is_empty())
        .collect();
    keys.sort();
    keys.dedup();
    keys
}

fn is_vowel(c: char) -> bool {
    matches!(c, 'a' | 'e' | 'i' | 'o' | 'u')
}

fn fold_diacritics(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'à' | 'â' | 'ä' | 'á' | 'ã' => 'a',
            'ç' => 'c',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'î' | 'ï' | 'í' | 'ì' => 'i',
            'ô' | 'ö' | 'ò' | 'ó' | 'õ' => 'o',
            'ù' | 'û' | 'ü' | 'ú' => 'u',
            'ÿ' | 'ý' => 'y',
            'ñ' => 'n',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_across_repeated_calls() {
        assert_eq!(phonetic_key("Gimme"), phonetic_key("Gimme"));
        assert_eq!(phonetic_keys("ABBA Gimme"), phonetic_keys("ABBA Gimme"));
    }

    #[test]
    fn case_and_diacritic_independent() {
        assert_eq!(phonetic_key("Louane"), phonetic_key("louane"));
        assert_eq!(phonetic_key("élève"), phonetic_key("eleve"));
    }

    #[test]
    fn similar_sounding_spellings_share_a_key() {
        // "abah" vs "abba": both fold the doubled b and drop interior vowels.
        assert_eq!(phonetic_key("abba"), phonetic_key("abah"));
    }
}
