//! Synthetic "view" paths that reorganize PowerDNS metrics
//!
//! Metronome stores PowerDNS metrics as `pdns.<server name>.<auth|recursor>.<metric>`, where the
//! server name may itself contain dots. The view puts the server type first, so that
//! `_pdns_view.recursor.*` lists every recursor:
//!
//! ```text
//! pdns.foo.auth.*                -> _pdns_view.auth.foo.auth.*
//! pdns.foo.recursor.*            -> _pdns_view.recursor.foo.recursor.*
//! pdns.a.example.com.auth.*      -> _pdns_view.auth.a--example--com.auth.*
//! ```
//!
//! Every path is also paired with a [`DERIVATIVE_SUFFIX`] sibling, since the backend always returns
//! the time derivative alongside the raw series.
use std::collections::HashMap;

use crate::{Error, Result};

/// Suffix of paths that refer to the time derivative of a series
pub const DERIVATIVE_SUFFIX: &str = "_dt";

const DELIMITER: char = '.';
const NAME_ESCAPE: &str = "--";
/// `<view prefix>.<type>.<name>.<type>.<extra>`
const VIEW_SEGMENTS: usize = 5;

/// Query paths translated for the backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Unmapped {
    /// The paths to request, in the order they were given
    pub backend_paths: Vec<String>,
    /// `(backend path, requested path)` for every path that was rewritten
    pub renames: Vec<(String, String)>,
}

impl Unmapped {
    /// Re-key `data` from backend paths to the paths that were originally requested
    ///
    /// A backend path that was also requested directly keeps its own entry.
    pub fn restore<V: Clone>(&self, data: &mut HashMap<String, V>) {
        for (backend, requested) in &self.renames {
            if let Some(values) = data.get(backend).cloned() {
                data.insert(requested.clone(), values);
            }
        }
        for (backend, _) in &self.renames {
            if !self.requested_directly(backend) {
                data.remove(backend);
            }
        }
    }

    /// Whether `path` appears in the backend paths more often than it was renamed to
    fn requested_directly(&self, path: &str) -> bool {
        self.backend_paths
            .iter()
            .filter(|p| p.as_str() == path)
            .count()
            > self
                .renames
                .iter()
                .filter(|(backend, _)| backend == path)
                .count()
    }
}

/// Stateless, bidirectional mapping between raw paths and view paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewMapper {
    source_prefix: String,
    view_prefix: String,
    categories: Vec<String>,
}

impl Default for ViewMapper {
    fn default() -> Self {
        Self {
            source_prefix: "pdns".to_string(),
            view_prefix: "_pdns_view".to_string(),
            categories: vec!["auth".to_string(), "recursor".to_string()],
        }
    }
}

impl ViewMapper {
    /// Extend raw backend paths with their view aliases and derivative siblings
    ///
    /// Each raw path is followed by its alias, if it has one, and every path is followed by its
    /// derivative.
    pub fn expand<S: AsRef<str>>(&self, raw_paths: &[S]) -> Vec<String> {
        let mut expanded = Vec::with_capacity(raw_paths.len() * 4);
        for raw in raw_paths {
            let raw = raw.as_ref();
            let alias = self.alias(raw);
            for path in std::iter::once(raw.to_string()).chain(alias) {
                let derivative = format!("{path}{DERIVATIVE_SUFFIX}");
                expanded.push(path);
                expanded.push(derivative);
            }
        }
        expanded
    }

    /// The view path for `raw`, if it follows the `<prefix>.<name>.<category>.<extra>` shape
    ///
    /// The name may contain delimiters, so the last category segment that leaves a non-empty name
    /// and a non-empty remainder wins.
    pub fn alias(&self, raw: &str) -> Option<String> {
        let rest = raw
            .strip_prefix(self.source_prefix.as_str())?
            .strip_prefix(DELIMITER)?;
        let segments: Vec<&str> = rest.split(DELIMITER).collect();

        (1..segments.len().saturating_sub(1))
            .rev()
            .filter(|&i| self.categories.iter().any(|c| c == segments[i]))
            .find_map(|i| {
                let name = segments[..i].join(".");
                let extra = segments[i + 1..].join(".");
                (!name.is_empty() && !extra.is_empty()).then(|| {
                    format!(
                        "{view}.{category}.{name}.{category}.{extra}",
                        view = self.view_prefix,
                        category = segments[i],
                        name = name.replace(DELIMITER, NAME_ESCAPE),
                    )
                })
            })
    }

    /// Whether `path` is a view alias
    pub fn is_view(&self, path: &str) -> bool {
        path.strip_prefix(self.view_prefix.as_str())
            .is_some_and(|rest| rest.starts_with(DELIMITER))
    }

    /// Rewrite view aliases in `paths` back to the raw paths the backend knows
    pub fn unmap<S: AsRef<str>>(&self, paths: &[S]) -> Result<Unmapped> {
        let mut unmapped = Unmapped {
            backend_paths: Vec::with_capacity(paths.len()),
            renames: Vec::new(),
        };
        for path in paths {
            let path = path.as_ref();
            if !self.is_view(path) {
                unmapped.backend_paths.push(path.to_string());
                continue;
            }

            let p: Vec<&str> = path.split(DELIMITER).collect();
            if p.len() < VIEW_SEGMENTS {
                return Err(Error::MalformedViewPath {
                    path: path.to_string(),
                    expected: VIEW_SEGMENTS,
                });
            }
            let raw = format!(
                "{prefix}.{name}.{category}.{extra}",
                prefix = self.source_prefix,
                name = p[2].replace(NAME_ESCAPE, "."),
                category = p[1],
                extra = p[4..].join("."),
            );
            unmapped.renames.push((raw.clone(), path.to_string()));
            unmapped.backend_paths.push(raw);
        }
        Ok(unmapped)
    }
}
