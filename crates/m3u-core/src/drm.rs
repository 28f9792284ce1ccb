//! DRM - session-manager wiring for protected streams
//!
//! Supports:
//! - Widevine
//! - PlayReady
//! - ClearKey (license server or local key material)
//!
//! Nothing here talks to a license server. The output is a
//! [`DrmSessionRecipe`] describing which provider the engine should
//! instantiate and where its license callback points.

use crate::error::{Error, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, warn};
use url::Url;

/// DRM schemes an entity may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrmScheme {
    ClearKey,
    Widevine,
    PlayReady,
}

impl DrmScheme {
    /// Returns the system ID (UUID) used in PSSH boxes
    pub fn system_id(&self) -> &'static str {
        match self {
            DrmScheme::Widevine => "edef8ba9-79d6-4ace-a3c8-27dcd51d21ed",
            DrmScheme::PlayReady => "9a04f079-9840-4286-ab92-e65be0885f95",
            DrmScheme::ClearKey => "e2719d58-a985-b3c9-781a-b030af78d30e",
        }
    }

    /// Whether the engine should open one session per key rotation
    pub fn multi_session(&self) -> bool {
        !matches!(self, DrmScheme::ClearKey)
    }
}

impl FromStr for DrmScheme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "clearkey" | "org.w3.clearkey" | "clear-key" => Ok(DrmScheme::ClearKey),
            "widevine" | "com.widevine.alpha" => Ok(DrmScheme::Widevine),
            "playready" | "com.microsoft.playready" => Ok(DrmScheme::PlayReady),
            other => Err(Error::DrmNotSupported {
                scheme: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for DrmScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DrmScheme::ClearKey => write!(f, "clearkey"),
            DrmScheme::Widevine => write!(f, "widevine"),
            DrmScheme::PlayReady => write!(f, "playready"),
        }
    }
}

/// DRM attributes carried by an entity (`#KODIPROP` license type / key)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DrmDescriptor {
    /// Scheme identifier as written in the playlist
    pub scheme: String,
    /// License server url, or key material for local clear-key
    pub key: String,
    /// Extra headers for license requests
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl DrmDescriptor {
    pub fn new(scheme: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            key: key.into(),
            headers: HashMap::new(),
        }
    }

    /// Add a custom header for license requests
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_string(), value.to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.scheme.trim().is_empty() || self.key.trim().is_empty()
    }
}

/// Where the engine's license callback gets licenses from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LicenseCallback {
    /// Offline callback answering every request with a fixed license
    Local { license: String },
    /// License server
    Http {
        license_url: Url,
        headers: HashMap<String, String>,
    },
}

/// Session-manager construction recipe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrmSessionRecipe {
    pub scheme: DrmScheme,
    pub callback: LicenseCallback,
    pub multi_session: bool,
}

/// Crypto capabilities of the device running the engine
pub trait DrmSupport: Send + Sync {
    fn is_supported(&self, scheme: DrmScheme) -> bool;
}

/// Fixed capability set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceDrm {
    pub supported: Vec<DrmScheme>,
}

impl DeviceDrm {
    pub fn all() -> Self {
        Self {
            supported: vec![DrmScheme::ClearKey, DrmScheme::Widevine, DrmScheme::PlayReady],
        }
    }

    pub fn none() -> Self {
        Self { supported: Vec::new() }
    }
}

impl Default for DeviceDrm {
    fn default() -> Self {
        Self::all()
    }
}

impl DrmSupport for DeviceDrm {
    fn is_supported(&self, scheme: DrmScheme) -> bool {
        self.supported.contains(&scheme)
    }
}

/// Build the session-manager recipe for a descriptor.
///
/// Returns `Ok(None)` when there is nothing to wire: an empty descriptor, an
/// unknown scheme, or a scheme this device cannot decrypt. In those cases the
/// pipeline plays without DRM and track negotiation fails downstream.
pub fn session_recipe(
    descriptor: Option<&DrmDescriptor>,
    support: &dyn DrmSupport,
) -> Result<Option<DrmSessionRecipe>> {
    let Some(descriptor) = descriptor.filter(|d| !d.is_empty()) else {
        return Ok(None);
    };

    let scheme = match descriptor.scheme.parse::<DrmScheme>() {
        Ok(scheme) => scheme,
        Err(e) => {
            warn!(error = %e, "Skipping DRM wiring");
            return Ok(None);
        }
    };

    if !support.is_supported(scheme) {
        debug!(scheme = %scheme, "Crypto scheme unavailable on device, skipping DRM wiring");
        return Ok(None);
    }

    let key = descriptor.key.trim();
    let license_url = Url::parse(key)
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https"));

    let callback = match (scheme, license_url) {
        (_, Some(license_url)) => LicenseCallback::Http {
            license_url,
            headers: descriptor.headers.clone(),
        },
        (DrmScheme::ClearKey, None) => LicenseCallback::Local {
            license: clearkey_license(key)?,
        },
        (scheme, None) => {
            return Err(Error::InvalidKeyMaterial(format!(
                "{} requires a license server url",
                scheme
            )))
        }
    };

    Ok(Some(DrmSessionRecipe {
        scheme,
        callback,
        multi_session: scheme.multi_session(),
    }))
}

/// Normalize local clear-key material into a JSON web key set.
///
/// Accepts either a ready license (`{"keys": [...]}`) or comma separated
/// `kid:key` pairs in hex.
pub fn clearkey_license(material: &str) -> Result<String> {
    let material = material.trim();

    if material.starts_with('{') {
        let value: serde_json::Value = serde_json::from_str(material)
            .map_err(|e| Error::InvalidKeyMaterial(e.to_string()))?;
        if !value.get("keys").map(|k| k.is_array()).unwrap_or(false) {
            return Err(Error::InvalidKeyMaterial("license has no keys array".into()));
        }
        return Ok(value.to_string());
    }

    let keys = material
        .split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (kid, key) = pair
                .split_once(':')
                .ok_or_else(|| Error::InvalidKeyMaterial(format!("expected kid:key, got {pair}")))?;
            Ok(serde_json::json!({
                "kty": "oct",
                "kid": URL_SAFE_NO_PAD.encode(hex_decode(kid)?),
                "k": URL_SAFE_NO_PAD.encode(hex_decode(key)?),
            }))
        })
        .collect::<Result<Vec<_>>>()?;

    if keys.is_empty() {
        return Err(Error::InvalidKeyMaterial("no keys".into()));
    }

    let license = serde_json::json!({
        "keys": keys,
        "type": "temporary",
    });
    Ok(license.to_string())
}

fn hex_decode(value: &str) -> Result<Vec<u8>> {
    let value = value.trim();
    if value.len() % 2 != 0 {
        return Err(Error::InvalidKeyMaterial(format!("odd hex length: {value}")));
    }
    (0..value.len())
        .step_by(2)
        .map(|i| {
            value
                .get(i..i + 2)
                .and_then(|byte| u8::from_str_radix(byte, 16).ok())
                .ok_or_else(|| Error::InvalidKeyMaterial(format!("invalid hex: {value}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_parsing() {
        assert_eq!("com.widevine.alpha".parse::<DrmScheme>().unwrap(), DrmScheme::Widevine);
        assert_eq!("org.w3.clearkey".parse::<DrmScheme>().unwrap(), DrmScheme::ClearKey);
        assert_eq!("PlayReady".parse::<DrmScheme>().unwrap(), DrmScheme::PlayReady);
        assert!("fairplay".parse::<DrmScheme>().is_err());
    }

    #[test]
    fn test_multi_session() {
        assert!(!DrmScheme::ClearKey.multi_session());
        assert!(DrmScheme::Widevine.multi_session());
        assert!(DrmScheme::PlayReady.multi_session());
    }

    #[test]
    fn test_empty_descriptor_skips() {
        let support = DeviceDrm::all();
        assert_eq!(session_recipe(None, &support).unwrap(), None);
        let empty = DrmDescriptor::new("widevine", "");
        assert_eq!(session_recipe(Some(&empty), &support).unwrap(), None);
    }

    #[test]
    fn test_unsupported_device_skips_silently() {
        let descriptor = DrmDescriptor::new("com.widevine.alpha", "https://license.example.com/wv");
        assert_eq!(session_recipe(Some(&descriptor), &DeviceDrm::none()).unwrap(), None);
    }

    #[test]
    fn test_widevine_uses_license_server() {
        let descriptor = DrmDescriptor::new("com.widevine.alpha", "https://license.example.com/wv")
            .with_header("X-Token", "abc");
        let recipe = session_recipe(Some(&descriptor), &DeviceDrm::all())
            .unwrap()
            .unwrap();
        assert_eq!(recipe.scheme, DrmScheme::Widevine);
        assert!(recipe.multi_session);
        match recipe.callback {
            LicenseCallback::Http { license_url, headers } => {
                assert_eq!(license_url.as_str(), "https://license.example.com/wv");
                assert_eq!(headers.get("X-Token").map(String::as_str), Some("abc"));
            }
            other => panic!("unexpected callback {other:?}"),
        }
    }

    #[test]
    fn test_clearkey_local_material() {
        let descriptor = DrmDescriptor::new(
            "clearkey",
            "0123456789abcdef0123456789abcdef:fedcba9876543210fedcba9876543210",
        );
        let recipe = session_recipe(Some(&descriptor), &DeviceDrm::all())
            .unwrap()
            .unwrap();
        assert!(!recipe.multi_session);
        let LicenseCallback::Local { license } = recipe.callback else {
            panic!("expected local callback");
        };
        let json: serde_json::Value = serde_json::from_str(&license).unwrap();
        assert_eq!(json["keys"][0]["kty"], "oct");
        assert_eq!(json["keys"][0]["kid"], "ASNFZ4mrze8BI0VniavN7w");
    }

    #[test]
    fn test_clearkey_with_server_url() {
        let descriptor = DrmDescriptor::new("clearkey", "https://keys.example.com/ck");
        let recipe = session_recipe(Some(&descriptor), &DeviceDrm::all())
            .unwrap()
            .unwrap();
        assert!(matches!(recipe.callback, LicenseCallback::Http { .. }));
    }

    #[test]
    fn test_clearkey_json_passthrough() {
        let license = clearkey_license(r#"{"keys":[{"kty":"oct","kid":"a","k":"b"}]}"#).unwrap();
        assert!(license.contains("\"kid\":\"a\""));
        assert!(clearkey_license(r#"{"nokeys":true}"#).is_err());
    }

    #[test]
    fn test_invalid_key_material() {
        assert!(clearkey_license("zz:00").is_err());
        assert!(clearkey_license("abc").is_err());
        assert!(clearkey_license(" , ").is_err());
    }

    #[test]
    fn test_widevine_without_url_is_invalid() {
        let descriptor = DrmDescriptor::new("widevine", "deadbeef:cafebabe");
        assert!(matches!(
            session_recipe(Some(&descriptor), &DeviceDrm::all()),
            Err(Error::InvalidKeyMaterial(_))
        ));
    }
}
