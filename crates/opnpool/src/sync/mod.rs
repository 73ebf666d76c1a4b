//! Keeps the id enums in `opnpool_ids.h` in step with the catalog.
//!
//! The header is edited textually: each category's enum declaration is
//! replaced by one rendered from the catalog and everything else is copied
//! through untouched. The result replaces the header in a single rename.

mod block;

use std::io;
use std::path::Path;
use std::path::PathBuf;

use serde::Serialize;
use tracing::debug;
use tracing::info;
use tracing::warn;

pub use block::EnumBlock;
pub use block::block_pattern;
pub use block::line_ending;
pub use block::locate_blocks;
pub use block::parse_members;
pub use block::render_block;

use crate::catalog::member_name;
use crate::catalog::Catalog;
use crate::catalog::Category;
use crate::fs::replace_atomically;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("failed to read header {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write header {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("category {category} has {count} entries, more than uint8_t ordinals can hold")]
    TooManyMembers { category: Category, count: usize },
}

/// Outcome of [`synchronize`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Categories whose enum was found and regenerated
    pub updated: Vec<Category>,
    /// Categories with no enum in the header; nothing was inserted for them
    pub skipped: Vec<Category>,
    /// Whether the header content changed (and so was rewritten)
    pub rewritten: bool,
}

impl SyncReport {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// State of one category's enum relative to the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Drift {
    InSync,
    OutOfSync {
        expected: Vec<(String, u64)>,
        found: Option<Vec<(String, u64)>>,
    },
    Missing,
}

/// Outcome of [`check`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DriftReport {
    pub categories: Vec<(Category, Drift)>,
}

impl DriftReport {
    pub fn is_in_sync(&self) -> bool {
        self.categories
            .iter()
            .all(|(_, drift)| *drift == Drift::InSync)
    }

    /// Categories that are missing or out of sync
    pub fn drifted(&self) -> Vec<Category> {
        self.categories
            .iter()
            .filter(|(_, drift)| *drift != Drift::InSync)
            .map(|(category, _)| *category)
            .collect()
    }
}

/// Regenerate every category's enum in the header at `header_path`.
///
/// Either the whole new header becomes visible or the old one stays in
/// place. A category whose enum cannot be found is listed in
/// [`SyncReport::skipped`] rather than failing the run.
pub fn synchronize(header_path: &Path, catalog: &Catalog) -> Result<SyncReport, SyncError> {
    synchronize_with(header_path, catalog, replace_atomically)
}

pub(crate) fn synchronize_with<W>(
    header_path: &Path,
    catalog: &Catalog,
    write: W,
) -> Result<SyncReport, SyncError>
where
    W: FnOnce(&Path, &str) -> io::Result<()>,
{
    let original = read_header(header_path)?;
    let (content, mut report) = rewrite(&original, catalog)?;

    for category in &report.skipped {
        warn!(
            "No {} enum found in {}, left unchanged",
            category.enum_name(),
            header_path.display()
        );
    }

    if content == original {
        debug!("{} already up to date", header_path.display());
        return Ok(report);
    }

    write(header_path, &content).map_err(|source| SyncError::Write {
        path: header_path.to_path_buf(),
        source,
    })?;
    report.rewritten = true;

    info!(
        "Updated {} ({} enum(s) regenerated)",
        header_path.display(),
        report.updated.len()
    );

    Ok(report)
}

/// Replace every category's enum in `content`, returning the new text
pub fn rewrite(content: &str, catalog: &Catalog) -> Result<(String, SyncReport), SyncError> {
    let mut content = content.to_string();
    let mut report = SyncReport::default();

    for (category, keys) in catalog.categories() {
        let blocks = locate_blocks(&content, category);

        if blocks.is_empty() {
            report.skipped.push(category);
            continue;
        }
        if blocks.len() > 1 {
            warn!(
                "{} is declared {} times, regenerating all of them",
                category.enum_name(),
                blocks.len()
            );
        }

        // Back to front so earlier spans stay valid
        for block in blocks.iter().rev() {
            let rendered = render_block(category, keys, line_ending(&content, block))?;
            content.replace_range(block.span.clone(), &rendered);
        }

        debug!("Regenerated {} with {} member(s)", category.enum_name(), keys.len());
        report.updated.push(category);
    }

    Ok((content, report))
}

/// Compare the header with the catalog without modifying it
pub fn check(header_path: &Path, catalog: &Catalog) -> Result<DriftReport, SyncError> {
    let content = read_header(header_path)?;
    Ok(check_content(&content, catalog))
}

pub fn check_content(content: &str, catalog: &Catalog) -> DriftReport {
    let mut report = DriftReport::default();

    for (category, keys) in catalog.categories() {
        let expected: Vec<(String, u64)> = keys
            .iter()
            .zip(0u64..)
            .map(|(key, ordinal)| (member_name(key), ordinal))
            .collect();

        let blocks = locate_blocks(content, category);
        let drift = if blocks.is_empty() {
            Drift::Missing
        } else {
            let found: Vec<Option<Vec<(String, u64)>>> = blocks
                .iter()
                .map(|block| parse_members(&content[block.body.clone()]))
                .collect();

            match found.iter().find(|members| members.as_ref() != Some(&expected)) {
                None => Drift::InSync,
                Some(members) => Drift::OutOfSync {
                    expected,
                    found: members.clone(),
                },
            }
        };

        report.categories.push((category, drift));
    }

    report
}

fn read_header(path: &Path) -> Result<String, SyncError> {
    std::fs::read_to_string(path).map_err(|source| SyncError::Read {
        path: path.to_path_buf(),
        source,
    })
}
