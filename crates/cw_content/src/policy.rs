//! Which of two same-identity entries wins.
//!
//! Worlds compare the major engine version (the leading number of the engine
//! version string, e.g. `2022` in `2022.3.6f1`); a strictly newer major
//! replaces the indexed entry. Minor and patch components are not compared.
//! Avatars never replace each other across stable names: imposters are
//! discarded and anything else is left unresolved.

use camino::Utf8Path;

use crate::content::{Content, ContentType};
use crate::error::{Error, Result};
use crate::identify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The candidate takes over the existing record.
    Replace,
    /// The candidate is dropped.
    Discard,
    /// No rule decides; the index is left as is.
    Unresolved,
}

pub struct DuplicateResolutionPolicy;

impl DuplicateResolutionPolicy {
    /// Decide between the indexed `existing` entry and a `candidate` carrying
    /// the same id.
    ///
    /// Engine version lookups that fail are fatal.
    pub fn resolve(existing: &Content, candidate: &Content) -> Result<Resolution> {
        if existing.content_type != candidate.content_type {
            tracing::warn!(
                "Content {} is indexed as {} but {} claims {}; discarding",
                existing.id,
                existing.content_type,
                candidate.path(),
                candidate.content_type
            );
            return Ok(Resolution::Discard);
        }

        if existing.stable_name == candidate.stable_name {
            return Ok(if candidate.version() > existing.version() {
                Resolution::Replace
            } else {
                Resolution::Discard
            });
        }

        match candidate.content_type {
            ContentType::World => Self::resolve_world(existing, candidate),
            ContentType::Avatar => Self::resolve_avatar(existing, candidate),
        }
    }

    fn resolve_world(existing: &Content, candidate: &Content) -> Result<Resolution> {
        let existing_major = engine_major_at(&existing.data_path())?;
        let candidate_major = engine_major_at(&candidate.data_path())?;

        if candidate_major > existing_major {
            tracing::info!(
                "World {} upgraded from engine {} ({}) to {} ({})",
                candidate.id,
                existing_major,
                existing.stable_name,
                candidate_major,
                candidate.stable_name
            );
            Ok(Resolution::Replace)
        } else {
            tracing::trace!(
                "World {} duplicate at {} is not an engine upgrade ({} <= {})",
                candidate.id,
                candidate.path(),
                candidate_major,
                existing_major
            );
            Ok(Resolution::Discard)
        }
    }

    fn resolve_avatar(existing: &Content, candidate: &Content) -> Result<Resolution> {
        if identify::is_imposter(&candidate.data_path())? {
            tracing::debug!("Discarding imposter duplicate of {} at {}", candidate.id, candidate.path());
            return Ok(Resolution::Discard);
        }

        tracing::warn!(
            "Avatar {} exists under both {} and {}; leaving index unchanged",
            candidate.id,
            existing.stable_name,
            candidate.stable_name
        );
        Ok(Resolution::Unresolved)
    }
}

/// Leading numeric component of an engine version string.
pub fn engine_major(version: &str) -> Option<u32> {
    let end = version
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(version.len());
    version[..end].parse().ok()
}

fn engine_major_at(data_path: &Utf8Path) -> Result<u32> {
    let value = identify::resolve_engine_version(data_path)?;
    engine_major(&value).ok_or_else(|| Error::MalformedEngineVersion {
        path: data_path.to_path_buf(),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_major() {
        assert_eq!(engine_major("2022.3.6f1"), Some(2022));
        assert_eq!(engine_major("2019"), Some(2019));
        assert_eq!(engine_major("5.6.7"), Some(5));
        assert_eq!(engine_major("f2022"), None);
        assert_eq!(engine_major(""), None);
    }

    #[test]
    fn test_same_stable_name_is_a_version_ratchet() {
        let existing = Content::new("wrld_1", ContentType::World, "abc", 2, "c/abc/02".into());
        let newer = Content::new("wrld_1", ContentType::World, "abc", 3, "c/abc/03".into());
        let older = Content::new("wrld_1", ContentType::World, "abc", 1, "c/abc/01".into());

        assert_eq!(DuplicateResolutionPolicy::resolve(&existing, &newer).unwrap(), Resolution::Replace);
        assert_eq!(DuplicateResolutionPolicy::resolve(&existing, &older).unwrap(), Resolution::Discard);
    }

    #[test]
    fn test_type_mismatch_discards() {
        let existing = Content::new("x_1", ContentType::World, "abc", 1, "c/abc/01".into());
        let candidate = Content::new("x_1", ContentType::Avatar, "def", 1, "c/def/01".into());
        assert_eq!(
            DuplicateResolutionPolicy::resolve(&existing, &candidate).unwrap(),
            Resolution::Discard
        );
    }
}
