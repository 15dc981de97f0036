use anyhow::Result;
use async_trait::async_trait;
use souq_core::Language;

use crate::collaborators::LanguageDetector;

/// Counts Arabic-block letters against Latin letters.
#[derive(Clone, Debug, Default)]
pub struct ScriptLanguageDetector {
    fallback: Language,
}

impl ScriptLanguageDetector {
    pub fn new(fallback: Language) -> Self {
        Self { fallback }
    }

    pub fn detect_script(&self, text: &str) -> Language {
        let (arabic, latin) = text.chars().filter(|ch| ch.is_alphabetic()).fold(
            (0_usize, 0_usize),
            |(arabic, latin), ch| {
                if is_arabic_letter(ch) {
                    (arabic + 1, latin)
                } else if ch.is_ascii_alphabetic() || ('\u{00C0}'..='\u{024F}').contains(&ch) {
                    (arabic, latin + 1)
                } else {
                    (arabic, latin)
                }
            },
        );

        if arabic > latin {
            Language::Arabic
        } else if latin > 0 {
            Language::English
        } else {
            self.fallback.clone()
        }
    }
}

pub fn is_arabic_letter(ch: char) -> bool {
    matches!(ch, '\u{0600}'..='\u{06FF}' | '\u{0750}'..='\u{077F}' | '\u{FB50}'..='\u{FDFF}' | '\u{FE70}'..='\u{FEFF}')
}

#[async_trait]
impl LanguageDetector for ScriptLanguageDetector {
    async fn detect(&self, text: &str) -> Result<Language> {
        Ok(self.detect_script(text))
    }
}

#[cfg(test)]
mod tests {
    use souq_core::Language;

    use super::ScriptLanguageDetector;

    #[test]
    fn detects_by_dominant_script() {
        let detector = ScriptLanguageDetector::new(Language::English);
        assert_eq!(detector.detect_script("أريد حذاء رياضي"), Language::Arabic);
        assert_eq!(detector.detect_script("show me red shoes"), Language::English);
        assert_eq!(detector.detect_script("أريد iPhone 15 برو"), Language::Arabic);
    }

    #[test]
    fn empty_or_scriptless_text_uses_fallback() {
        let detector = ScriptLanguageDetector::new(Language::Arabic);
        assert_eq!(detector.detect_script(""), Language::Arabic);
        assert_eq!(detector.detect_script("123 !!"), Language::Arabic);
    }
}
