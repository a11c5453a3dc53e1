//! Localized spoken and displayed text

use crate::profile::Language;

/// Text substituted when the vision service returns an empty description
pub const FALLBACK_DESCRIPTION: &str = "Could not generate description for this image.";

/// Text shown in place of a description when the request failed
#[must_use]
pub fn error_description(cause: &impl std::fmt::Display) -> String {
    format!("Error processing image: {cause}")
}

/// A user-facing phrase with English and Arabic renderings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phrase {
    /// Idle status line
    SayStart,
    AskLanguage,
    AskInputMethod,
    CameraStarting,
    CameraActive,
    GalleryOpening,
    ImageCaptured,
    ImageSelected,
    Analyzing,
    AnalysisComplete,
    NoImageSelected,
    CameraOpenFailed,
    CameraNotActive,
    CaptureFailed,
    AnalysisError,
    /// Describe mode: invite a spoken prompt or follow-up
    AskQuestion,
}

impl Phrase {
    /// Render the phrase, English when no language is selected yet
    #[must_use]
    pub const fn text(self, language: Option<Language>) -> &'static str {
        match language {
            Some(Language::Arabic) => self.arabic(),
            Some(Language::English) | None => self.english(),
        }
    }

    const fn english(self) -> &'static str {
        match self {
            Self::SayStart => "Say \"start\" to begin",
            Self::AskLanguage => "Please say English or Arabic",
            Self::AskInputMethod => "Please say camera or gallery",
            Self::CameraStarting => "Starting camera. Say capture when ready",
            Self::CameraActive => "Camera active - Say 'capture' when ready",
            Self::GalleryOpening => "Opening gallery",
            Self::ImageCaptured => "Image captured. Processing...",
            Self::ImageSelected => "Image selected. Processing...",
            Self::Analyzing => "Analyzing image, please wait...",
            Self::AnalysisComplete => "Analysis complete - Say 'start' to begin again",
            Self::NoImageSelected => "No image selected",
            Self::CameraOpenFailed => "Error: Could not open camera",
            Self::CameraNotActive => "Camera not active",
            Self::CaptureFailed => "Failed to capture image",
            Self::AnalysisError => "Error occurred during analysis",
            Self::AskQuestion => "Ask a question about the image",
        }
    }

    const fn arabic(self) -> &'static str {
        match self {
            Self::SayStart => "قل \"start\" للبدء",
            Self::AskLanguage => "الرجاء قول الإنجليزية أو العربية",
            Self::AskInputMethod => "الكاميرا أو المعرض؟",
            Self::CameraStarting => "تشغيل الكاميرا. قل التقط عندما تكون مستعد",
            Self::CameraActive => "الكاميرا نشطة - قل 'التقط' عندما تكون مستعداً",
            Self::GalleryOpening => "فتح المعرض",
            Self::ImageCaptured => "تم التقاط الصورة. معالجة...",
            Self::ImageSelected => "تم اختيار الصورة. معالجة...",
            Self::Analyzing => "تحليل الصورة، يرجى الانتظار...",
            Self::AnalysisComplete => "اكتمل التحليل - قل 'start' للبدء من جديد",
            Self::NoImageSelected => "لم يتم اختيار صورة",
            Self::CameraOpenFailed => "خطأ: تعذر فتح الكاميرا",
            Self::CameraNotActive => "الكاميرا ليست نشطة",
            Self::CaptureFailed => "فشل في التقاط الصورة",
            Self::AnalysisError => "حدث خطأ أثناء التحليل",
            Self::AskQuestion => "اطرح سؤالاً عن الصورة",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_is_used_before_language_selection() {
        assert_eq!(
            Phrase::AskLanguage.text(None),
            Phrase::AskLanguage.text(Some(Language::English))
        );
    }

    #[test]
    fn arabic_rendering_differs() {
        assert_eq!(
            Phrase::NoImageSelected.text(Some(Language::Arabic)),
            "لم يتم اختيار صورة"
        );
    }
}
