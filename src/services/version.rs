//! Validation of the compound version/size identifier
//!
//! Runs before any I/O; a request that fails here never touches the
//! directory, the optimized store, or the network.

use crate::errors::{ResolveError, ResolveResult};
use crate::models::{ParsedVersion, OPTIMIZED_IMAGE_VERSION};

/// Smallest and largest pixel sizes any avatar route will serve
pub const MIN_AVATAR_SIZE: u32 = 8;
pub const MAX_AVATAR_SIZE: u32 = 1000;

pub struct VersionGuard;

impl VersionGuard {
    /// Validate a `<upload_id>[_<optimized_version>]` token together with the
    /// requested size. Pure; no side effects.
    pub fn validate(version_param: &str, size: u32) -> ResolveResult<ParsedVersion> {
        let (upload_part, version_part) = match version_param.split_once('_') {
            Some((upload, version)) => (upload, Some(version)),
            None => (version_param, None),
        };

        // Absent or unparseable versions read as stale and are served as
        // current; only a *future* version is not understood.
        let optimized_version = match version_part {
            Some(v) => v.parse::<i32>().unwrap_or(0),
            None => OPTIMIZED_IMAGE_VERSION,
        };
        if optimized_version > OPTIMIZED_IMAGE_VERSION {
            return Err(ResolveError::VersionMismatch {
                requested: optimized_version,
                supported: OPTIMIZED_IMAGE_VERSION,
            });
        }

        let upload_id = upload_part.parse::<i64>().unwrap_or(0);
        if upload_id <= 0 {
            return Err(ResolveError::InvalidUploadId {
                token: version_param.to_string(),
            });
        }

        if !(MIN_AVATAR_SIZE..=MAX_AVATAR_SIZE).contains(&size) {
            return Err(ResolveError::SizeOutOfRange { size });
        }

        Ok(ParsedVersion {
            upload_id,
            optimized_version,
        })
    }
}
