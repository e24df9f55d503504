//! # Key Provider Abstraction
//!
//! Abstracts RSA signing-key storage behind a trait, so no key material is
//! ever embedded in source code:
//!
//! - [`LocalKeyProvider`]: in-memory keys for tests and embedded setups.
//! - [`DirectoryKeyProvider`]: PEM files in a secret-store mount.
//!
//! ## Versioning
//!
//! Each organization owns a sequence of key versions. The highest version is
//! "current" and signs new documents; older versions stay available for
//! verification. When an organization has no keys of its own, the vendor
//! (software producer) key set is used instead. Version numbers are only
//! unique within one key set, so every document records the [`KeyOwner`]
//! next to the version it was signed with.
//!
//! ## Security Invariants
//!
//! - `KeyProvider` is `Send + Sync` for use across async tasks.
//! - `Debug` output of providers never contains private key material.

use std::collections::{BTreeMap, HashMap};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fisc_core::{KeyOwner, OrganizationId};

use crate::error::CryptoError;
use crate::rsa_sha1::{SigningKey, VerifyingKey};

/// A signing key together with the key set it was resolved from.
#[derive(Debug, Clone)]
pub struct ScopedKey {
    pub owner: KeyOwner,
    pub key: Arc<SigningKey>,
}

impl Deref for ScopedKey {
    type Target = SigningKey;

    fn deref(&self) -> &SigningKey {
        &self.key
    }
}

/// Source of versioned signing and verifying keys.
pub trait KeyProvider: Send + Sync {
    /// Signing key for `organization`, from its own key set or the vendor
    /// fallback. `None` selects the current version.
    fn signing_key(
        &self,
        organization: &OrganizationId,
        version: Option<u32>,
    ) -> Result<ScopedKey, CryptoError>;

    /// Verifying key of a specific version in a specific key set, used when
    /// checking stored signatures.
    fn verifying_key(
        &self,
        organization: &OrganizationId,
        owner: KeyOwner,
        version: u32,
    ) -> Result<VerifyingKey, CryptoError>;

    /// Human-readable name for this provider (for diagnostics/logging).
    fn provider_name(&self) -> &str;
}

impl<K: KeyProvider + ?Sized> KeyProvider for Arc<K> {
    fn signing_key(
        &self,
        organization: &OrganizationId,
        version: Option<u32>,
    ) -> Result<ScopedKey, CryptoError> {
        (**self).signing_key(organization, version)
    }

    fn verifying_key(
        &self,
        organization: &OrganizationId,
        owner: KeyOwner,
        version: u32,
    ) -> Result<VerifyingKey, CryptoError> {
        (**self).verifying_key(organization, owner, version)
    }

    fn provider_name(&self) -> &str {
        (**self).provider_name()
    }
}

fn select(
    keys: &BTreeMap<u32, Arc<SigningKey>>,
    version: Option<u32>,
) -> Option<Arc<SigningKey>> {
    match version {
        Some(v) => keys.get(&v).cloned(),
        None => keys.values().next_back().cloned(),
    }
}

// ─── LocalKeyProvider ────────────────────────────────────────────────────

/// In-memory key provider.
#[derive(Default)]
pub struct LocalKeyProvider {
    organizations: HashMap<OrganizationId, BTreeMap<u32, Arc<SigningKey>>>,
    vendor: BTreeMap<u32, Arc<SigningKey>>,
}

impl LocalKeyProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a key for an organization under its own version.
    pub fn with_key(mut self, organization: OrganizationId, key: SigningKey) -> Self {
        self.insert(organization, key);
        self
    }

    /// Register a vendor fallback key.
    pub fn with_vendor_key(mut self, key: SigningKey) -> Self {
        self.vendor.insert(key.version(), Arc::new(key));
        self
    }

    pub fn insert(&mut self, organization: OrganizationId, key: SigningKey) {
        self.organizations
            .entry(organization)
            .or_default()
            .insert(key.version(), Arc::new(key));
    }

    fn keys_for(
        &self,
        organization: &OrganizationId,
    ) -> (KeyOwner, &BTreeMap<u32, Arc<SigningKey>>) {
        match self.organizations.get(organization) {
            Some(keys) if !keys.is_empty() => (KeyOwner::Organization, keys),
            _ => (KeyOwner::Vendor, &self.vendor),
        }
    }

    fn key_set(
        &self,
        organization: &OrganizationId,
        owner: KeyOwner,
    ) -> Option<&BTreeMap<u32, Arc<SigningKey>>> {
        match owner {
            KeyOwner::Organization => self.organizations.get(organization),
            KeyOwner::Vendor => Some(&self.vendor),
        }
    }
}

impl KeyProvider for LocalKeyProvider {
    fn signing_key(
        &self,
        organization: &OrganizationId,
        version: Option<u32>,
    ) -> Result<ScopedKey, CryptoError> {
        let (owner, keys) = self.keys_for(organization);
        select(keys, version)
            .map(|key| ScopedKey { owner, key })
            .ok_or(CryptoError::KeyUnavailable {
                organization: *organization,
                version,
            })
    }

    fn verifying_key(
        &self,
        organization: &OrganizationId,
        owner: KeyOwner,
        version: u32,
    ) -> Result<VerifyingKey, CryptoError> {
        self.key_set(organization, owner)
            .and_then(|keys| keys.get(&version))
            .map(|key| key.verifying_key())
            .ok_or(CryptoError::KeyUnavailable {
                organization: *organization,
                version: Some(version),
            })
    }

    fn provider_name(&self) -> &str {
        "LocalKeyProvider"
    }
}

impl std::fmt::Debug for LocalKeyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalKeyProvider")
            .field("organizations", &self.organizations.len())
            .field("vendor_versions", &self.vendor.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ─── DirectoryKeyProvider ────────────────────────────────────────────────

/// Name of the directory holding vendor fallback keys.
pub const VENDOR_DIR: &str = "vendor";

/// Environment variable naming the key directory.
pub const KEY_DIR_ENV: &str = "FISC_KEY_DIR";

/// Loads PEM keys from a directory tree:
///
/// ```text
/// <root>/<organization-id>/v1.pem
/// <root>/<organization-id>/v2.pem
/// <root>/<organization-id>/v2.pub.pem   (optional)
/// <root>/vendor/v1.pem
/// ```
///
/// Private keys may be PKCS#8 or PKCS#1 PEM. When `v<N>.pub.pem` exists it
/// is used for verification; otherwise the public key is derived from the
/// private key.
#[derive(Debug, Clone)]
pub struct DirectoryKeyProvider {
    root: PathBuf,
}

impl DirectoryKeyProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Build from `FISC_KEY_DIR`.
    pub fn from_env() -> Result<Self, CryptoError> {
        let root = std::env::var(KEY_DIR_ENV).map_err(|_| {
            CryptoError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("environment variable {KEY_DIR_ENV} not set"),
            ))
        })?;
        Ok(Self::new(root))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Versions present in a key directory, ascending.
    pub fn versions_in(dir: &Path) -> Result<Vec<u32>, CryptoError> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut versions = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(v) = name
                .strip_prefix('v')
                .and_then(|rest| rest.strip_suffix(".pem"))
                .filter(|rest| !rest.ends_with(".pub"))
                .and_then(|rest| rest.parse::<u32>().ok())
            {
                versions.push(v);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }

    fn key_dir(&self, organization: &OrganizationId, owner: KeyOwner) -> PathBuf {
        match owner {
            KeyOwner::Organization => self.root.join(organization.to_string()),
            KeyOwner::Vendor => self.root.join(VENDOR_DIR),
        }
    }

    /// The key set that signs for `organization`: its own when it has at
    /// least one key, else the vendor set.
    fn effective_dir(
        &self,
        organization: &OrganizationId,
    ) -> Result<(KeyOwner, PathBuf, Vec<u32>), CryptoError> {
        let own = self.key_dir(organization, KeyOwner::Organization);
        let versions = Self::versions_in(&own)?;
        if !versions.is_empty() {
            return Ok((KeyOwner::Organization, own, versions));
        }
        let vendor = self.key_dir(organization, KeyOwner::Vendor);
        let versions = Self::versions_in(&vendor)?;
        Ok((KeyOwner::Vendor, vendor, versions))
    }

    /// Generate a new key for `organization` (or the vendor set when `None`)
    /// and write it as the next version. Returns the written key.
    pub fn generate(
        &self,
        organization: Option<&OrganizationId>,
        bits: usize,
    ) -> Result<SigningKey, CryptoError> {
        let dir = match organization {
            Some(org) => self.key_dir(org, KeyOwner::Organization),
            None => self.root.join(VENDOR_DIR),
        };
        std::fs::create_dir_all(&dir)?;
        let version = Self::versions_in(&dir)?.last().copied().unwrap_or(0) + 1;
        let key = SigningKey::generate(bits, version)?;
        std::fs::write(dir.join(format!("v{version}.pem")), key.to_pkcs8_pem()?)?;
        std::fs::write(
            dir.join(format!("v{version}.pub.pem")),
            key.verifying_key().to_public_pem()?,
        )?;
        tracing::info!(
            directory = %dir.display(),
            version,
            "generated signing key"
        );
        Ok(key)
    }
}

impl KeyProvider for DirectoryKeyProvider {
    fn signing_key(
        &self,
        organization: &OrganizationId,
        version: Option<u32>,
    ) -> Result<ScopedKey, CryptoError> {
        let (owner, dir, versions) = self.effective_dir(organization)?;
        let chosen = match version {
            Some(v) => versions.contains(&v).then_some(v),
            None => versions.last().copied(),
        }
        .ok_or(CryptoError::KeyUnavailable {
            organization: *organization,
            version,
        })?;
        let pem = std::fs::read_to_string(dir.join(format!("v{chosen}.pem")))?;
        let key = SigningKey::from_pem(&pem, chosen)?;
        Ok(ScopedKey {
            owner,
            key: Arc::new(key),
        })
    }

    fn verifying_key(
        &self,
        organization: &OrganizationId,
        owner: KeyOwner,
        version: u32,
    ) -> Result<VerifyingKey, CryptoError> {
        let dir = self.key_dir(organization, owner);
        let public = dir.join(format!("v{version}.pub.pem"));
        if public.is_file() {
            let pem = std::fs::read_to_string(public)?;
            return VerifyingKey::from_public_pem(&pem, version);
        }
        let private = dir.join(format!("v{version}.pem"));
        if !private.is_file() {
            return Err(CryptoError::KeyUnavailable {
                organization: *organization,
                version: Some(version),
            });
        }
        let pem = std::fs::read_to_string(private)?;
        SigningKey::from_pem(&pem, version).map(|key| key.verifying_key())
    }

    fn provider_name(&self) -> &str {
        "DirectoryKeyProvider"
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────
