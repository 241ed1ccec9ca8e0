// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Bundle Export Formats
//!
//! A verified bundle leaves the ledger either as a pretty-printed JSON snapshot
//! or as an uncompressed tar archive:
//!
//! ```text
//! bundle.json     the snapshot, byte-identical to the JSON export
//! manifest.json   { format_version, bundle_id, tenant, session_id,
//!                   exported_at, verification_status, bundle_sha256 }
//! ```
//!
//! [`read_bundle`] accepts both forms and, for archives, rejects a snapshot
//! whose digest does not match its manifest.

use std::io::Read;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::safety_case::{BundleId, SafetyCaseBundle, VerificationStatus};

pub const BUNDLE_ENTRY: &str = "bundle.json";
pub const MANIFEST_ENTRY: &str = "manifest.json";
pub const EXPORT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Tar,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Tar => "application/x-tar",
        }
    }

    pub fn file_extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Tar => "tar",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "tar" => Ok(Self::Tar),
            other => Err(ExportError::UnknownFormat(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportManifest {
    pub format_version: u32,
    pub bundle_id: BundleId,
    pub tenant: String,
    pub session_id: String,
    pub exported_at: DateTime<Utc>,
    pub verification_status: VerificationStatus,
    pub bundle_sha256: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Unknown export format '{0}' (expected json or tar)")]
    UnknownFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] std::io::Error),

    #[error("Archive is missing {0}")]
    MissingEntry(&'static str),

    #[error("bundle.json digest does not match manifest")]
    DigestMismatch,
}

/// Serialize a bundle in the requested format.
pub fn write_export(
    bundle: &SafetyCaseBundle,
    format: ExportFormat,
    exported_at: DateTime<Utc>,
) -> Result<Vec<u8>, ExportError> {
    match format {
        ExportFormat::Json => write_json(bundle),
        ExportFormat::Tar => write_tar(bundle, exported_at),
    }
}

pub fn write_json(bundle: &SafetyCaseBundle) -> Result<Vec<u8>, ExportError> {
    Ok(serde_json::to_vec_pretty(bundle)?)
}

pub fn write_tar(
    bundle: &SafetyCaseBundle,
    exported_at: DateTime<Utc>,
) -> Result<Vec<u8>, ExportError> {
    let snapshot = write_json(bundle)?;
    let manifest = ExportManifest {
        format_version: EXPORT_FORMAT_VERSION,
        bundle_id: bundle.id,
        tenant: bundle.tenant.clone(),
        session_id: bundle.session_id.clone(),
        exported_at,
        verification_status: bundle.verification_status,
        bundle_sha256: sha256_hex(&snapshot),
    };
    let manifest_bytes = serde_json::to_vec_pretty(&manifest)?;

    let mtime = exported_at.timestamp().max(0) as u64;
    let mut builder = tar::Builder::new(Vec::new());
    append_entry(&mut builder, BUNDLE_ENTRY, &snapshot, mtime)?;
    append_entry(&mut builder, MANIFEST_ENTRY, &manifest_bytes, mtime)?;
    Ok(builder.into_inner()?)
}

fn append_entry(
    builder: &mut tar::Builder<Vec<u8>>,
    path: &str,
    data: &[u8],
    mtime: u64,
) -> std::io::Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(mtime);
    builder.append_data(&mut header, path, data)
}

/// Parse an export produced by [`write_export`].
pub fn read_bundle(bytes: &[u8], format: ExportFormat) -> Result<SafetyCaseBundle, ExportError> {
    match format {
        ExportFormat::Json => Ok(serde_json::from_slice(bytes)?),
        ExportFormat::Tar => read_tar(bytes).map(|(bundle, _)| bundle),
    }
}

/// Read an archive, check its digest and return the bundle with its manifest.
pub fn read_tar(bytes: &[u8]) -> Result<(SafetyCaseBundle, ExportManifest), ExportError> {
    let mut archive = tar::Archive::new(bytes);
    let mut snapshot = None;
    let mut manifest = None;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.to_string_lossy().into_owned();
        let mut data = Vec::new();
        entry.read_to_end(&mut data)?;
        match path.as_str() {
            BUNDLE_ENTRY => snapshot = Some(data),
            MANIFEST_ENTRY => manifest = Some(data),
            _ => {}
        }
    }

    let snapshot = snapshot.ok_or(ExportError::MissingEntry(BUNDLE_ENTRY))?;
    let manifest: ExportManifest =
        serde_json::from_slice(&manifest.ok_or(ExportError::MissingEntry(MANIFEST_ENTRY))?)?;
    if sha256_hex(&snapshot) != manifest.bundle_sha256 {
        return Err(ExportError::DigestMismatch);
    }
    Ok((serde_json::from_slice(&snapshot)?, manifest))
}

/// Guess the format of an export from its leading bytes.
pub fn detect_format(bytes: &[u8]) -> ExportFormat {
    match bytes.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'{') => ExportFormat::Json,
        _ => ExportFormat::Tar,
    }
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
