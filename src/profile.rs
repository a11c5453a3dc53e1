//! Supported languages and their static profiles

use std::fmt;

/// Default English description prompt
pub const DEFAULT_PROMPT_EN: &str = "Describe the most important aspects in the image for a visually impaired individual to help them avoid dangerous situations like crossing roads or obstacles or existing signs to take into consideration, and help them navigate independently, in no more than 50 words.";

/// Default Arabic description prompt
pub const DEFAULT_PROMPT_AR: &str = "وصف أهم العناصر في الصورة لمساعدة شخص مكفوف في تجنب المخاطر والعوائق والاشارات الموجودة ليأخذها بعين الاعتبار والمشي بأمان دون مساعدة في 50 كلمة أو أقل.";

/// A supported interaction language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    English,
    Arabic,
}

impl Language {
    /// All supported languages
    pub const ALL: [Self; 2] = [Self::English, Self::Arabic];

    /// ISO 639-1 code ("en", "ar")
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::English => "en",
            Self::Arabic => "ar",
        }
    }

    /// Recognizer locale tag
    #[must_use]
    pub const fn locale(self) -> &'static str {
        match self {
            Self::English => "en-US",
            Self::Arabic => "ar-SA",
        }
    }

    /// Parse a language code or English name, case-insensitively
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_lowercase().as_str() {
            "en" | "english" => Some(Self::English),
            "ar" | "arabic" => Some(Self::Arabic),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::English => write!(f, "English"),
            Self::Arabic => write!(f, "Arabic"),
        }
    }
}

/// Immutable per-language configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageProfile {
    pub language: Language,
    pub code: &'static str,
    pub default_prompt: String,
    pub locale: &'static str,
}

impl LanguageProfile {
    fn new(language: Language, default_prompt: String) -> Self {
        Self {
            language,
            code: language.code(),
            default_prompt,
            locale: language.locale(),
        }
    }
}

/// The set of language profiles, fixed at startup
#[derive(Debug, Clone)]
pub struct LanguageProfiles {
    english: LanguageProfile,
    arabic: LanguageProfile,
}

impl Default for LanguageProfiles {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl LanguageProfiles {
    /// Build profiles, replacing the built-in prompts where overrides are given
    ///
    /// Blank overrides are ignored.
    #[must_use]
    pub fn new(english_prompt: Option<String>, arabic_prompt: Option<String>) -> Self {
        let pick = |custom: Option<String>, fallback: &str| {
            custom
                .filter(|p| !p.trim().is_empty())
                .map_or_else(|| fallback.to_string(), |p| p.trim().to_string())
        };

        Self {
            english: LanguageProfile::new(
                Language::English,
                pick(english_prompt, DEFAULT_PROMPT_EN),
            ),
            arabic: LanguageProfile::new(Language::Arabic, pick(arabic_prompt, DEFAULT_PROMPT_AR)),
        }
    }

    /// Profile for a language
    #[must_use]
    pub const fn get(&self, language: Language) -> &LanguageProfile {
        match language {
            Language::English => &self.english,
            Language::Arabic => &self.arabic,
        }
    }

    /// Profile for an optional language, English when none is selected
    #[must_use]
    pub const fn active(&self, language: Option<Language>) -> &LanguageProfile {
        match language {
            Some(language) => self.get(language),
            None => &self.english,
        }
    }
}
