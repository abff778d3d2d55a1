use std::collections::BTreeMap;
use std::path::Path;

use crate::config::ReproducibilityConfig;

/// Environment overlay applied to every build, finish, and verify process.
///
/// Built once per run and never mutated, so every invocation of a run sees
/// the same values. Iteration order is stable (sorted by key).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BuildEnv {
    vars: BTreeMap<String, String>,
}

impl BuildEnv {
    /// `{source_dir}` in the configured flags is replaced with `source_dir`
    /// so `-ffile-prefix-map` can scrub the absolute build path.
    pub fn new(config: &ReproducibilityConfig, source_dir: &Path) -> Self {
        let source = source_dir.display().to_string();
        let mut vars = BTreeMap::new();
        vars.insert(
            "SOURCE_DATE_EPOCH".to_owned(),
            config.source_date_epoch.to_string(),
        );
        vars.insert("TZ".to_owned(), config.timezone.clone());
        vars.insert("LC_ALL".to_owned(), config.locale.clone());
        vars.insert("LANG".to_owned(), config.locale.clone());
        vars.insert(
            "CFLAGS".to_owned(),
            config.cflags.replace("{source_dir}", &source),
        );
        vars.insert("LDFLAGS".to_owned(), config.ldflags.clone());
        Self { vars }
    }

    /// A copy of this overlay with extra variables layered on top.
    pub fn with<I, K, V>(&self, extra: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut vars = self.vars.clone();
        vars.extend(extra.into_iter().map(|(k, v)| (k.into(), v.into())));
        Self { vars }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }
}
