//! Static catalog of model file groups.
//!
//! A group is a named bundle of files that share a destination subdirectory.
//! The root group `"."` holds the group-independent files (license, tokenizer)
//! and is always part of a resolution.

use std::collections::HashSet;

/// Group whose files land directly in the destination root.
pub const ROOT_GROUP: &str = ".";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("unknown group: {0}")]
    UnknownGroup(String),
    #[error("{0} is an unavailable option")]
    UnknownModel(String),
    #[error("group {group} lists {file} more than once")]
    DuplicateFile { group: String, file: String },
}

/// One file of one group, as produced by [`Catalog::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub group: String,
    pub file_name: String,
}

impl CatalogEntry {
    pub fn is_root(&self) -> bool {
        self.group == ROOT_GROUP
    }

    /// Path relative to the destination root and to the URL template:
    /// `file` for the root group, `group/file` otherwise.
    pub fn relative_path(&self) -> String {
        if self.is_root() {
            self.file_name.clone()
        } else {
            format!("{}/{}", self.group, self.file_name)
        }
    }
}

#[derive(Debug, Clone)]
struct Group {
    name: String,
    files: Vec<String>,
}

/// Ordered group → files mapping plus the user-facing model aliases.
#[derive(Debug, Clone)]
pub struct Catalog {
    groups: Vec<Group>,
    aliases: Vec<(String, String)>,
}

const LLAMA2_GROUPS: &[(&str, &[&str])] = &[
    (
        ROOT_GROUP,
        &["LICENSE", "USE_POLICY.md", "tokenizer.model", "tokenizer_checklist.chk"],
    ),
    ("llama-2-7b", &["consolidated.00.pth", "params.json", "checklist.chk"]),
    ("llama-2-7b-chat", &["consolidated.00.pth", "params.json", "checklist.chk"]),
    (
        "llama-2-13b",
        &["consolidated.00.pth", "consolidated.01.pth", "params.json", "checklist.chk"],
    ),
    (
        "llama-2-13b-chat",
        &["consolidated.00.pth", "consolidated.01.pth", "params.json", "checklist.chk"],
    ),
    ("llama-2-70b", SEVENTY_B),
    ("llama-2-70b-chat", SEVENTY_B),
];

const SEVENTY_B: &[&str] = &[
    "consolidated.00.pth",
    "consolidated.01.pth",
    "consolidated.02.pth",
    "consolidated.03.pth",
    "consolidated.04.pth",
    "consolidated.05.pth",
    "consolidated.06.pth",
    "consolidated.07.pth",
    "params.json",
    "checklist.chk",
];

const LLAMA2_ALIASES: &[(&str, &str)] = &[
    ("7B", "llama-2-7b"),
    ("13B", "llama-2-13b"),
    ("70B", "llama-2-70b"),
    ("7B-chat", "llama-2-7b-chat"),
    ("13B-chat", "llama-2-13b-chat"),
    ("70B-chat", "llama-2-70b-chat"),
];

impl Catalog {
    /// Build a catalog from `(group, files)` pairs in declaration order.
    /// Fails if any group lists the same file twice.
    pub fn new<G, F, S>(groups: G) -> Result<Self, CatalogError>
    where
        G: IntoIterator<Item = (S, F)>,
        F: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out = Vec::new();
        for (name, files) in groups {
            let name = name.into();
            let mut seen = HashSet::new();
            let mut list = Vec::new();
            for file in files {
                let file = file.into();
                if !seen.insert(file.clone()) {
                    return Err(CatalogError::DuplicateFile { group: name, file });
                }
                list.push(file);
            }
            out.push(Group { name, files: list });
        }
        Ok(Self {
            groups: out,
            aliases: Vec::new(),
        })
    }

    /// Attach user-facing aliases (e.g. `7B` → `llama-2-7b`).
    pub fn with_aliases<A, S>(mut self, aliases: A) -> Self
    where
        A: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        self.aliases = aliases
            .into_iter()
            .map(|(a, g)| (a.into(), g.into()))
            .collect();
        self
    }

    /// The Llama 2 release layout.
    pub fn llama2() -> Self {
        let groups = LLAMA2_GROUPS
            .iter()
            .map(|(name, files)| (*name, files.iter().copied()));
        match Catalog::new(groups) {
            Ok(catalog) => catalog.with_aliases(LLAMA2_ALIASES.iter().copied()),
            Err(e) => unreachable!("built-in catalog is invalid: {e}"),
        }
    }

    /// Group names in declaration order.
    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|g| g.name.as_str())
    }

    /// Files of one group, if it exists.
    pub fn files(&self, group: &str) -> Option<&[String]> {
        self.groups
            .iter()
            .find(|g| g.name == group)
            .map(|g| g.files.as_slice())
    }

    /// `(alias, group)` pairs in declaration order.
    pub fn aliases(&self) -> impl Iterator<Item = (&str, &str)> {
        self.aliases.iter().map(|(a, g)| (a.as_str(), g.as_str()))
    }

    /// Map aliases to group names. An empty selection means every alias.
    pub fn resolve_aliases<S: AsRef<str>>(&self, aliases: &[S]) -> Result<Vec<String>, CatalogError> {
        if aliases.is_empty() {
            return Ok(self.aliases.iter().map(|(_, g)| g.clone()).collect());
        }
        aliases
            .iter()
            .map(|requested| {
                let requested = requested.as_ref().trim();
                self.aliases
                    .iter()
                    .find(|(a, _)| a == requested)
                    .map(|(_, g)| g.clone())
                    .ok_or_else(|| CatalogError::UnknownModel(requested.to_string()))
            })
            .collect()
    }

    /// Resolve requested group names into entries. The root group is always
    /// included; output follows catalog order and each group appears once.
    pub fn resolve<S: AsRef<str>>(&self, requested: &[S]) -> Result<Vec<CatalogEntry>, CatalogError> {
        let mut wanted: HashSet<&str> = HashSet::new();
        wanted.insert(ROOT_GROUP);
        for name in requested {
            let name = name.as_ref();
            if !self.groups.iter().any(|g| g.name == name) {
                return Err(CatalogError::UnknownGroup(name.to_string()));
            }
            wanted.insert(name);
        }

        Ok(self
            .groups
            .iter()
            .filter(|g| wanted.contains(g.name.as_str()))
            .flat_map(|g| {
                g.files.iter().map(move |f| CatalogEntry {
                    group: g.name.clone(),
                    file_name: f.clone(),
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(entries: &[CatalogEntry]) -> Vec<String> {
        entries.iter().map(|e| e.relative_path()).collect()
    }

    #[test]
    fn resolve_always_includes_root() {
        let catalog = Catalog::llama2();
        let entries = catalog.resolve::<&str>(&[]).unwrap();
        assert_eq!(
            paths(&entries),
            ["LICENSE", "USE_POLICY.md", "tokenizer.model", "tokenizer_checklist.chk"]
        );
        assert!(entries.iter().all(CatalogEntry::is_root));
    }

    #[test]
    fn resolve_follows_catalog_order_not_request_order() {
        let catalog = Catalog::llama2();
        let entries = catalog.resolve(&["llama-2-13b", "llama-2-7b"]).unwrap();
        let groups: Vec<&str> = entries.iter().map(|e| e.group.as_str()).collect();
        let first_13b = groups.iter().position(|g| *g == "llama-2-13b").unwrap();
        let last_7b = groups.iter().rposition(|g| *g == "llama-2-7b").unwrap();
        assert!(last_7b < first_13b);
        assert_eq!(entries.len(), 4 + 3 + 4);
    }

    #[test]
    fn resolve_emits_each_file_once() {
        let catalog = Catalog::llama2();
        let entries = catalog
            .resolve(&["llama-2-7b", "llama-2-7b", ROOT_GROUP])
            .unwrap();
        assert_eq!(entries.len(), 7);
        let mut unique = paths(&entries);
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 7);
    }

    #[test]
    fn resolve_unknown_group_fails() {
        let catalog = Catalog::llama2();
        let err = catalog.resolve(&["llama-2-7b", "llama-3"]).unwrap_err();
        assert_eq!(err, CatalogError::UnknownGroup("llama-3".to_string()));
    }

    #[test]
    fn seventy_b_has_eight_shards() {
        let catalog = Catalog::llama2();
        let files = catalog.files("llama-2-70b-chat").unwrap();
        assert_eq!(files.len(), 10);
        assert_eq!(
            files.iter().filter(|f| f.ends_with(".pth")).count(),
            8
        );
    }

    #[test]
    fn duplicate_file_in_group_rejected() {
        let err = Catalog::new([("g", vec!["a", "b", "a"])]).unwrap_err();
        assert_eq!(
            err,
            CatalogError::DuplicateFile {
                group: "g".to_string(),
                file: "a".to_string()
            }
        );
    }

    #[test]
    fn aliases_resolve_and_default_to_all() {
        let catalog = Catalog::llama2();
        assert_eq!(
            catalog.resolve_aliases(&["7B", " 70B-chat"]).unwrap(),
            ["llama-2-7b", "llama-2-70b-chat"]
        );
        assert_eq!(catalog.resolve_aliases::<&str>(&[]).unwrap().len(), 6);
        assert_eq!(
            catalog.resolve_aliases(&["8B"]).unwrap_err(),
            CatalogError::UnknownModel("8B".to_string())
        );
    }
}
