//! User-namespace ID mapping.
//!
//! Mappings use the `container_id:host_id:size` syntax accepted by
//! `podman --uidmap`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShimError};

/// Caller-supplied mapping request. All fields empty means no remapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdMappingOptions {
    /// User namespace mode (e.g. "host", "keep-id", "auto"); empty for default.
    pub userns_mode: String,
    pub uid_map: Vec<String>,
    pub gid_map: Vec<String>,
}

/// A single contiguous range mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdMap {
    pub container_id: u32,
    pub host_id: u32,
    pub size: u32,
}

impl FromStr for IdMap {
    type Err = ShimError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 3 {
            return Err(ShimError::ConfigError(format!(
                "invalid ID mapping '{}': expected container_id:host_id:size",
                s
            )));
        }

        let field = |value: &str, name: &str| -> Result<u32> {
            value.trim().parse::<u32>().map_err(|_| {
                ShimError::ConfigError(format!("invalid {} '{}' in ID mapping '{}'", name, value, s))
            })
        };

        let map = IdMap {
            container_id: field(parts[0], "container id")?,
            host_id: field(parts[1], "host id")?,
            size: field(parts[2], "size")?,
        };

        if map.size == 0 {
            return Err(ShimError::ConfigError(format!(
                "ID mapping '{}' has zero size",
                s
            )));
        }
        if map.container_id.checked_add(map.size).is_none()
            || map.host_id.checked_add(map.size).is_none()
        {
            return Err(ShimError::ConfigError(format!(
                "ID mapping '{}' overflows the ID range",
                s
            )));
        }

        Ok(map)
    }
}

impl fmt::Display for IdMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.container_id, self.host_id, self.size)
    }
}

/// Resolved mappings handed to the engine with a container descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdMappingSet {
    pub userns_mode: Option<String>,
    pub uid_map: Vec<IdMap>,
    pub gid_map: Vec<IdMap>,
}

impl IdMappingSet {
    /// Parse and validate mapping options.
    ///
    /// When only a UID map is given, the GID map mirrors it, matching podman.
    pub fn parse(options: &IdMappingOptions) -> Result<Self> {
        let uid_map = parse_maps(&options.uid_map)?;
        let mut gid_map = parse_maps(&options.gid_map)?;
        if gid_map.is_empty() && !uid_map.is_empty() {
            gid_map = uid_map.clone();
        }

        check_overlap(&uid_map, "uid")?;
        check_overlap(&gid_map, "gid")?;

        let userns_mode = match options.userns_mode.trim() {
            "" => None,
            mode => Some(mode.to_string()),
        };

        if userns_mode.is_some() && (!uid_map.is_empty() || !gid_map.is_empty()) {
            return Err(ShimError::ConfigError(
                "userns mode and explicit uid/gid maps are mutually exclusive".to_string(),
            ));
        }

        Ok(Self {
            userns_mode,
            uid_map,
            gid_map,
        })
    }

    /// True when no remapping was requested.
    pub fn is_empty(&self) -> bool {
        self.userns_mode.is_none() && self.uid_map.is_empty() && self.gid_map.is_empty()
    }
}

fn parse_maps(entries: &[String]) -> Result<Vec<IdMap>> {
    entries
        .iter()
        .flat_map(|e| e.split(','))
        .filter(|e| !e.trim().is_empty())
        .map(|e| e.trim().parse())
        .collect()
}

fn ranges_overlap(a_start: u32, b_start: u32, a_size: u32, b_size: u32) -> bool {
    let (a_start, b_start) = (u64::from(a_start), u64::from(b_start));
    a_start < b_start + u64::from(b_size) && b_start < a_start + u64::from(a_size)
}

/// Reject maps whose container ranges or host ranges intersect.
fn check_overlap(maps: &[IdMap], kind: &str) -> Result<()> {
    for (i, a) in maps.iter().enumerate() {
        for b in &maps[i + 1..] {
            let side = if ranges_overlap(a.container_id, b.container_id, a.size, b.size) {
                "container"
            } else if ranges_overlap(a.host_id, b.host_id, a.size, b.size) {
                "host"
            } else {
                continue;
            };
            return Err(ShimError::ConfigError(format!(
                "overlapping {} {} ranges: {} and {}",
                side, kind, a, b
            )));
        }
    }
    Ok(())
}
