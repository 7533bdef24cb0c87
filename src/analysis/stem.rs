use std::fmt;
use std::sync::Arc;
use rust_stemmers::{Algorithm, Stemmer};
use crate::core::error::{Error, Result};

/// User supplied stemming algorithm.
pub trait StemImplementation: Send + Sync {
    fn stem(&self, word: &str) -> String;

    fn description(&self) -> String;
}

#[derive(Clone)]
enum StemKind {
    None,
    Snowball { language: &'static str, stemmer: Arc<Stemmer> },
    Custom(Arc<dyn StemImplementation>),
}

/// Reduces words to a common root form.
///
/// The same `Stem` must be used for indexing and for query parsing,
/// otherwise stemmed terms will not line up.
#[derive(Clone)]
pub struct Stem {
    kind: StemKind,
}

const LANGUAGES: &[(&str, &[&str], Algorithm)] = &[
    ("arabic", &["ar"], Algorithm::Arabic),
    ("danish", &["da"], Algorithm::Danish),
    ("dutch", &["nl"], Algorithm::Dutch),
    ("english", &["en", "porter"], Algorithm::English),
    ("finnish", &["fi"], Algorithm::Finnish),
    ("french", &["fr"], Algorithm::French),
    ("german", &["de"], Algorithm::German),
    ("greek", &["el"], Algorithm::Greek),
    ("hungarian", &["hu"], Algorithm::Hungarian),
    ("italian", &["it"], Algorithm::Italian),
    ("norwegian", &["nb", "nn", "no"], Algorithm::Norwegian),
    ("portuguese", &["pt"], Algorithm::Portuguese),
    ("romanian", &["ro"], Algorithm::Romanian),
    ("russian", &["ru"], Algorithm::Russian),
    ("spanish", &["es"], Algorithm::Spanish),
    ("swedish", &["sv"], Algorithm::Swedish),
    ("tamil", &["ta"], Algorithm::Tamil),
    ("turkish", &["tr"], Algorithm::Turkish),
];

impl Stem {
    /// Looks a stemmer up by language name or ISO code.
    /// "none" and the empty string give the identity stemmer.
    pub fn new(language: &str) -> Result<Self> {
        let wanted = language.trim().to_lowercase();
        if wanted.is_empty() || wanted == "none" {
            return Ok(Stem::none());
        }

        LANGUAGES
            .iter()
            .find(|(name, codes, _)| *name == wanted || codes.iter().any(|c| *c == wanted))
            .map(|(name, _, algorithm)| Stem {
                kind: StemKind::Snowball {
                    language: *name,
                    stemmer: Arc::new(Stemmer::create(*algorithm)),
                },
            })
            .ok_or_else(|| Error::invalid_argument(format!("Language code {} unknown", language)))
    }

    pub fn none() -> Self {
        Stem { kind: StemKind::None }
    }

    pub fn custom(implementation: Arc<dyn StemImplementation>) -> Self {
        Stem { kind: StemKind::Custom(implementation) }
    }

    pub fn stem(&self, word: &str) -> String {
        match &self.kind {
            StemKind::None => word.to_string(),
            StemKind::Snowball { stemmer, .. } => stemmer.stem(word).into_owned(),
            StemKind::Custom(imp) => imp.stem(word),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self.kind, StemKind::None)
    }

    pub fn description(&self) -> String {
        match &self.kind {
            StemKind::None => "Stem()".to_string(),
            StemKind::Snowball { language, .. } => format!("Stem({})", language),
            StemKind::Custom(imp) => format!("Stem({})", imp.description()),
        }
    }

    /// Space separated list of built-in languages.
    pub fn languages() -> String {
        LANGUAGES.iter().map(|(name, _, _)| *name).collect::<Vec<_>>().join(" ")
    }
}

impl Default for Stem {
    fn default() -> Self {
        Stem::none()
    }
}

impl fmt::Debug for Stem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.description())
    }
}
