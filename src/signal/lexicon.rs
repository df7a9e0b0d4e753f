//! Weighted keyword lexicon per indicator, hot-reloaded from
//! `config/keywords.json`.
//!
//! JSON shape:
//! {
//!   "categories": {
//!     "CRISIS": { "saturation": 20.0, "terms": { "suicide": 10, "no way out": 8 } }
//!   }
//! }
//!
//! An indicator's 0..10 score is `min(10, raw / saturation * 10)` where `raw`
//! is the weighted hit count. Missing file → built-in seed.

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
    time::SystemTime,
};

use crate::indicator::Indicator;

pub const DEFAULT_LEXICON_PATH: &str = "config/keywords.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    /// Raw weighted hits at which the indicator score reaches 10.
    pub saturation: f64,
    pub terms: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lexicon {
    pub categories: BTreeMap<Indicator, Category>,
}

impl Default for Lexicon {
    fn default() -> Self {
        Self::default_seed()
    }
}

impl Lexicon {
    pub fn category(&self, ind: Indicator) -> Option<&Category> {
        self.categories.get(&ind)
    }

    /// Built-in seed. Terms are lowercase; phrases match on word boundaries.
    pub fn default_seed() -> Self {
        fn cat(saturation: f64, terms: &[(&str, f64)]) -> Category {
            Category {
                saturation,
                terms: terms.iter().map(|(t, w)| (t.to_string(), *w)).collect(),
            }
        }

        let mut categories = BTreeMap::new();
        categories.insert(
            Indicator::Crisis,
            cat(
                20.0,
                &[
                    ("suicide", 10.0),
                    ("kill myself", 10.0),
                    ("end my life", 10.0),
                    ("suicidal", 9.0),
                    ("self-harm", 9.0),
                    ("hurt myself", 9.0),
                    ("crisis", 8.0),
                    ("emergency", 7.0),
                    ("can't cope", 7.0),
                    ("overwhelmed", 6.0),
                    ("hopeless", 8.0),
                    ("helpless", 7.0),
                    ("no way out", 8.0),
                    ("no point", 7.0),
                    ("giving up", 7.0),
                ],
            ),
        );
        categories.insert(
            Indicator::SuicidalIdeation,
            cat(
                18.0,
                &[
                    ("suicidal", 9.0),
                    ("suicide", 9.0),
                    ("kill myself", 10.0),
                    ("end my life", 10.0),
                    ("want to die", 10.0),
                    ("no reason to live", 9.0),
                    ("wish i was dead", 9.0),
                    ("goodbye note", 8.0),
                ],
            ),
        );
        categories.insert(
            Indicator::Anxiety,
            cat(
                18.0,
                &[
                    ("anxiety", 5.0),
                    ("anxious", 5.0),
                    ("panic", 6.0),
                    ("panic attack", 7.0),
                    ("worried", 4.0),
                    ("worry", 4.0),
                    ("fear", 5.0),
                    ("afraid", 4.0),
                    ("nervous", 4.0),
                    ("stressed", 5.0),
                    ("overwhelmed", 5.0),
                    ("racing thoughts", 6.0),
                    ("can't breathe", 7.0),
                    ("chest tightness", 6.0),
                ],
            ),
        );
        categories.insert(
            Indicator::Depression,
            cat(
                18.0,
                &[
                    ("depression", 6.0),
                    ("depressed", 6.0),
                    ("sad", 4.0),
                    ("hopeless", 7.0),
                    ("helpless", 6.0),
                    ("worthless", 7.0),
                    ("no energy", 5.0),
                    ("tired", 3.0),
                    ("exhausted", 4.0),
                    ("can't sleep", 5.0),
                    ("insomnia", 5.0),
                    ("no appetite", 5.0),
                    ("lost interest", 6.0),
                    ("nothing matters", 7.0),
                    ("empty", 6.0),
                ],
            ),
        );
        categories.insert(
            Indicator::Stress,
            cat(
                15.0,
                &[
                    ("stress", 4.0),
                    ("stressed", 5.0),
                    ("pressure", 3.0),
                    ("burnout", 5.0),
                    ("burned out", 5.0),
                    ("overworked", 4.0),
                    ("tense", 3.0),
                    ("can't relax", 4.0),
                    ("overwhelmed", 4.0),
                ],
            ),
        );
        categories.insert(
            Indicator::SubstanceAbuse,
            cat(
                15.0,
                &[
                    ("drinking", 4.0),
                    ("drunk", 4.0),
                    ("alcohol", 4.0),
                    ("drugs", 5.0),
                    ("overdose", 8.0),
                    ("relapse", 6.0),
                    ("using again", 6.0),
                    ("pills", 4.0),
                    ("withdrawal", 5.0),
                    ("addiction", 6.0),
                ],
            ),
        );
        categories.insert(
            Indicator::Ptsd,
            cat(
                15.0,
                &[
                    ("flashbacks", 7.0),
                    ("nightmares", 5.0),
                    ("trauma", 6.0),
                    ("traumatic", 6.0),
                    ("triggered", 5.0),
                    ("hypervigilant", 6.0),
                    ("ptsd", 7.0),
                    ("reliving", 5.0),
                ],
            ),
        );
        categories.insert(
            Indicator::EatingDisorder,
            cat(
                15.0,
                &[
                    ("not eating", 5.0),
                    ("binge", 5.0),
                    ("purging", 7.0),
                    ("starving myself", 8.0),
                    ("anorexia", 7.0),
                    ("bulimia", 7.0),
                    ("throwing up after eating", 7.0),
                ],
            ),
        );

        Self { categories }
    }
}

/// Hot-reload wrapper: reloads when the lexicon file mtime changes.
#[derive(Debug)]
pub struct HotReloadLexicon {
    path: PathBuf,
    inner: RwLock<State>,
}

#[derive(Debug)]
struct State {
    lexicon: Arc<Lexicon>,
    last_modified: Option<SystemTime>,
}

impl HotReloadLexicon {
    /// Create with a path (defaults to "config/keywords.json" if `None`).
    pub fn new(path: Option<&Path>) -> Self {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LEXICON_PATH));
        Self {
            path,
            inner: RwLock::new(State {
                lexicon: Arc::new(Lexicon::default_seed()),
                last_modified: None,
            }),
        }
    }

    /// Snapshot of the latest lexicon, reloading if the file changed.
    /// A run takes one snapshot so every record is scored against the same table.
    pub fn current(&self) -> Arc<Lexicon> {
        let needs_reload = match fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(mtime) => {
                let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
                guard.last_modified != Some(mtime)
            }
            // No file: keep what we have.
            Err(_) => false,
        };

        if !needs_reload {
            return self.inner.read().unwrap_or_else(|e| e.into_inner()).lexicon.clone();
        }

        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        // Double-check in case of races.
        if let Ok(mtime) = fs::metadata(&self.path).and_then(|m| m.modified()) {
            if guard.last_modified != Some(mtime) {
                match load_lexicon_file(&self.path) {
                    Ok(lex) => {
                        tracing::info!(target: "signal", path = %self.path.display(), "lexicon reloaded");
                        guard.lexicon = Arc::new(lex);
                    }
                    Err(e) => {
                        tracing::warn!(target: "signal", path = %self.path.display(), error = %e, "lexicon reload failed; keeping previous");
                    }
                }
                guard.last_modified = Some(mtime);
            }
        }
        guard.lexicon.clone()
    }
}

/// Load a lexicon directly (no caching). Terms are lowercased and categories
/// with a non-positive saturation are rejected.
pub fn load_lexicon_file(path: &Path) -> io::Result<Lexicon> {
    let bytes = fs::read(path)?;
    let mut lex: Lexicon = serde_json::from_slice(&bytes)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    for (ind, cat) in lex.categories.iter_mut() {
        if !(cat.saturation.is_finite() && cat.saturation > 0.0) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{ind}: saturation must be > 0"),
            ));
        }
        cat.terms = std::mem::take(&mut cat.terms)
            .into_iter()
            .map(|(t, w)| (t.trim().to_lowercase(), w.max(0.0)))
            .collect();
    }
    Ok(lex)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{io::Write, thread, time::Duration};

    #[test]
    fn seed_covers_every_indicator() {
        let lex = Lexicon::default_seed();
        for ind in Indicator::ALL {
            assert!(lex.category(ind).is_some(), "{ind} missing");
        }
    }

    #[test]
    fn reloads_after_file_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keywords.json");
        let hot = HotReloadLexicon::new(Some(&path));

        // No file yet: built-in seed.
        assert_eq!(*hot.current(), Lexicon::default_seed());

        let write = |body: &str| {
            let mut f = fs::File::create(&path).unwrap();
            f.write_all(body.as_bytes()).unwrap();
            f.sync_all().unwrap();
        };
        write(r#"{"categories":{"STRESS":{"saturation":5.0,"terms":{"Deadline":2}}}}"#);
        let lex = hot.current();
        let stress = lex.category(Indicator::Stress).unwrap();
        assert_eq!(stress.terms.get("deadline"), Some(&2.0));
        assert!(lex.category(Indicator::Crisis).is_none());

        // Some filesystems have coarse mtime resolution.
        thread::sleep(Duration::from_millis(1100));
        write(r#"{"categories":{"STRESS":{"saturation":0,"terms":{}}}}"#);
        // Invalid file keeps the previous table.
        let again = hot.current();
        assert_eq!(again.category(Indicator::Stress).unwrap().terms.len(), 1);
    }
}
