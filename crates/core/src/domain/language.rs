use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Language {
    #[default]
    English,
    Arabic,
    Other(String),
}

impl Language {
    /// Accepts bare and regional codes (`en`, `en_us`, `ar-AE`). Blank input maps to English.
    pub fn from_code(code: &str) -> Self {
        let normalized = code.trim().to_ascii_lowercase().replace('_', "-");
        let primary = normalized.split('-').next().unwrap_or_default();
        match primary {
            "" | "en" => Self::English,
            "ar" => Self::Arabic,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Self::English => "en",
            Self::Arabic => "ar",
            Self::Other(code) => code,
        }
    }

    pub fn is_arabic(&self) -> bool {
        matches!(self, Self::Arabic)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl From<String> for Language {
    fn from(value: String) -> Self {
        Self::from_code(&value)
    }
}

impl From<Language> for String {
    fn from(value: Language) -> Self {
        value.code().to_string()
    }
}
