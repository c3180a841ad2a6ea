//! Content identity extraction from bundle records.
//!
//! Identity lives in a behaviour record exposing `blueprintId` and
//! `contentType`. The engine version lives in the bundle manifest record, and
//! imposter avatars are recognized by a script record naming the `Impostor`
//! class.

use camino::Utf8Path;
use cw_bundle::{class, Bundle};

use crate::content::ContentType;
use crate::error::{Error, Result};

pub const BLUEPRINT_ID_FIELD: &str = "blueprintId";
pub const CONTENT_TYPE_FIELD: &str = "contentType";
pub const ENGINE_VERSION_FIELD: &str = "unityVersion";
pub const SCRIPT_CLASS_FIELD: &str = "m_ClassName";
pub const IMPOSTER_CLASS: &str = "Impostor";

/// Open and fully decode the bundle stored at `data_path`.
pub fn open_bundle(data_path: &Utf8Path) -> Result<Bundle> {
    Ok(Bundle::open(data_path.as_std_path())?)
}

/// Extract `(id, type)` from the data file at `data_path`.
///
/// Returns `Ok(None)` if no behaviour record carries the identity fields.
pub fn identify(data_path: &Utf8Path) -> Result<Option<(String, ContentType)>> {
    let bundle = open_bundle(data_path)?;
    identify_bundle(&bundle, data_path)
}

/// Extract `(id, type)` from an already decoded bundle.
pub fn identify_bundle(
    bundle: &Bundle,
    data_path: &Utf8Path,
) -> Result<Option<(String, ContentType)>> {
    for record in bundle.records_of_class(class::BEHAVIOUR) {
        let (Some(blueprint), Some(raw_type)) = (
            record.field(BLUEPRINT_ID_FIELD),
            record.int_field(CONTENT_TYPE_FIELD),
        ) else {
            continue;
        };

        let id = blueprint.as_str().unwrap_or_default();
        if id.is_empty() {
            return Err(Error::MissingIdentity(data_path.to_path_buf()));
        }

        let content_type =
            ContentType::from_raw(raw_type).ok_or_else(|| Error::UnknownContentType {
                path: data_path.to_path_buf(),
                value: raw_type,
            })?;

        return Ok(Some((id.to_string(), content_type)));
    }

    Ok(None)
}

/// Read the engine version string the bundle at `data_path` was built with.
///
/// A missing version is fatal: duplicate resolution cannot compare content
/// without it.
pub fn resolve_engine_version(data_path: &Utf8Path) -> Result<String> {
    let bundle = open_bundle(data_path)?;
    engine_version_of(&bundle, data_path)
}

pub fn engine_version_of(bundle: &Bundle, data_path: &Utf8Path) -> Result<String> {
    bundle
        .records_of_class(class::ASSET_BUNDLE)
        .find_map(|r| r.str_field(ENGINE_VERSION_FIELD))
        .map(str::to_string)
        .ok_or_else(|| Error::EngineVersionUnresolved(data_path.to_path_buf()))
}

/// Whether the bundle at `data_path` is an imposter avatar.
pub fn is_imposter(data_path: &Utf8Path) -> Result<bool> {
    let bundle = open_bundle(data_path)?;
    Ok(is_imposter_bundle(&bundle))
}

pub fn is_imposter_bundle(bundle: &Bundle) -> bool {
    bundle
        .records_of_class(class::SCRIPT)
        .any(|r| r.str_field(SCRIPT_CLASS_FIELD) == Some(IMPOSTER_CLASS))
}
