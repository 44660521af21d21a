// Canonical payload bytes, dual signing and verification

use crate::config::{SigningConfig, expand_path};
use crate::error::{KeyError, VerdictError};
use crate::verdict::{SignatureBundle, SignedVerdict, VerdictPayload};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::Serialize;
use serde_json::Value;
use serde_json::ser::{Formatter, Serializer};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_KEY_BITS: usize = 2048;
pub const SHARED_SECRET_LEN: usize = 32;
pub const PRIVATE_KEY_FILE: &str = "rsa_private.pem";
pub const PUBLIC_KEY_FILE: &str = "rsa_public.pem";

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, sort_keys(v))).collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// Compact JSON writer whose output is pure ASCII.
///
/// Non-ASCII characters and DEL become lower-case `\uXXXX` escapes, with
/// surrogate pairs above U+FFFF. Floats use the shortest round-trip digits,
/// switching to exponent form (`5e-05`, `1e+16`) outside 1e-4..1e16. Any
/// client that sorts keys and dumps compact ASCII JSON reproduces the bytes.
struct CanonicalFormatter;

impl Formatter for CanonicalFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut units = [0u16; 2];
        let mut start = 0;
        for (idx, c) in fragment.char_indices() {
            if c.is_ascii() && c != '\x7f' {
                continue;
            }
            writer.write_all(fragment[start..idx].as_bytes())?;
            for unit in c.encode_utf16(&mut units) {
                write!(writer, "\\u{:04x}", unit)?;
            }
            start = idx + c.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }

    fn write_f32<W>(&mut self, writer: &mut W, value: f32) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.write_f64(writer, f64::from(value))
    }

    fn write_f64<W>(&mut self, writer: &mut W, value: f64) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(format_float(value).as_bytes())
    }
}

fn format_float(value: f64) -> String {
    let sign = if value.is_sign_negative() { "-" } else { "" };
    if value == 0.0 {
        return format!("{sign}0.0");
    }

    // `{:e}` yields the shortest digits that round-trip, e.g. "1.25e-7"
    let scientific = format!("{:e}", value.abs());
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((scientific.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let point = exponent + 1;

    if !(-4 < point && point <= 16) {
        let (head, tail) = digits.split_at(1);
        let fraction = if tail.is_empty() { String::new() } else { format!(".{tail}") };
        let exp_sign = if exponent < 0 { '-' } else { '+' };
        return format!("{sign}{head}{fraction}e{exp_sign}{:02}", exponent.unsigned_abs());
    }

    let body = if point <= 0 {
        format!("0.{}{}", "0".repeat(point.unsigned_abs() as usize), digits)
    } else {
        let point = point as usize;
        if point >= digits.len() {
            format!("{}{}.0", digits, "0".repeat(point - digits.len()))
        } else {
            format!("{}.{}", &digits[..point], &digits[point..])
        }
    };
    format!("{sign}{body}")
}

/// Deterministic bytes of a payload: keys sorted by code point at every
/// depth, no whitespace, ASCII only. Logically equal payloads give identical
/// bytes.
pub fn canonical_bytes<T: Serialize + ?Sized>(payload: &T) -> Result<Vec<u8>, serde_json::Error> {
    let value = sort_keys(serde_json::to_value(payload)?);
    let mut bytes = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut bytes, CanonicalFormatter);
    value.serialize(&mut serializer)?;
    Ok(bytes)
}

/// Decode a shared secret given as base64, falling back to hex.
pub fn parse_shared_secret(secret: &str) -> Result<Vec<u8>, KeyError> {
    let secret = secret.trim();
    if secret.is_empty() {
        return Err(KeyError::Secret("secret is empty".into()));
    }

    let decoded = BASE64
        .decode(secret)
        .or_else(|_| hex::decode(secret))
        .map_err(|_| KeyError::Secret("neither base64 nor hex".into()))?;
    if decoded.is_empty() {
        return Err(KeyError::Secret("secret decodes to zero bytes".into()));
    }
    Ok(decoded)
}

/// Fresh random secret, base64 encoded.
pub fn generate_shared_secret() -> String {
    let mut key = [0u8; SHARED_SECRET_LEN];
    OsRng.fill_bytes(&mut key);
    BASE64.encode(key)
}

fn read_key_file(path: &Path) -> Result<String, KeyError> {
    let path = expand_path(path);
    fs::read_to_string(&path).map_err(|source| KeyError::Read { path, source })
}

fn parse_private_key(pem: &str) -> Result<RsaPrivateKey, KeyError> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| KeyError::Pem(format!("private key: {}", e)))
}

fn parse_public_key(pem: &str) -> Option<RsaPublicKey> {
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .ok()
}

fn encode_public_key(key: &RsaPublicKey) -> Result<String, KeyError> {
    key.to_public_key_pem(LineEnding::LF)
        .map_err(|e| KeyError::Pem(format!("public key: {}", e)))
}

/// Key material for signing verdicts. Read-only once built.
pub struct SigningContext {
    signing_key: SigningKey<Sha256>,
    public_key_pem: String,
    hmac_key: Vec<u8>,
}

impl SigningContext {
    pub fn new(private_key: RsaPrivateKey, hmac_key: Vec<u8>) -> Result<Self, KeyError> {
        if hmac_key.is_empty() {
            return Err(KeyError::Secret("secret is empty".into()));
        }
        let public_key_pem = encode_public_key(&private_key.to_public_key())?;

        Ok(Self {
            signing_key: SigningKey::<Sha256>::new(private_key),
            public_key_pem,
            hmac_key,
        })
    }

    /// Fresh RSA key of `bits` and the given shared secret.
    pub fn generate(bits: usize, hmac_key: Vec<u8>) -> Result<Self, KeyError> {
        let private_key = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| KeyError::Generate(e.to_string()))?;
        Self::new(private_key, hmac_key)
    }

    /// Load keys as configured. Missing material is replaced by ephemeral
    /// keys, which makes signatures unverifiable once the process exits.
    pub fn from_config(config: &SigningConfig) -> Result<Self, KeyError> {
        let hmac_key = match &config.hmac_secret {
            Some(secret) => parse_shared_secret(secret)?,
            None => {
                warn!("No HMAC secret configured; using an ephemeral secret");
                let mut key = vec![0u8; SHARED_SECRET_LEN];
                OsRng.fill_bytes(&mut key);
                key
            }
        };

        let context = match &config.private_key_path {
            Some(path) => {
                let private_key = parse_private_key(&read_key_file(path)?)?;
                info!("Loaded signing key from {}", path.display());
                Self::new(private_key, hmac_key)?
            }
            None => {
                warn!(
                    "No private key configured; generating an ephemeral {}-bit RSA key",
                    DEFAULT_KEY_BITS
                );
                Self::generate(DEFAULT_KEY_BITS, hmac_key)?
            }
        };

        if let Some(path) = &config.public_key_path {
            let configured = parse_public_key(&read_key_file(path)?)
                .ok_or_else(|| KeyError::Pem(format!("public key in {}", path.display())))?;
            if encode_public_key(&configured)? != context.public_key_pem {
                return Err(KeyError::Pem(format!(
                    "public key in {} does not match the private key",
                    path.display()
                )));
            }
        }

        Ok(context)
    }

    /// SPKI PEM of the verification key.
    pub fn public_key_pem(&self) -> &str {
        &self.public_key_pem
    }

    pub fn sign<T: Serialize + ?Sized>(&self, payload: &T) -> Result<SignatureBundle, VerdictError> {
        let message = canonical_bytes(payload)?;

        let mut mac = HmacSha256::new_from_slice(&self.hmac_key)
            .map_err(|e| VerdictError::Signing(e.to_string()))?;
        mac.update(&message);
        let tag = mac.finalize().into_bytes();

        let signature = self
            .signing_key
            .try_sign(&message)
            .map_err(|e| VerdictError::Signing(e.to_string()))?;

        Ok(SignatureBundle {
            hmac: BASE64.encode(tag),
            signature: BASE64.encode(signature.to_bytes()),
            pubkey_pem: self.public_key_pem.clone(),
        })
    }

    pub fn seal(&self, payload: VerdictPayload) -> Result<SignedVerdict, VerdictError> {
        let bundle = self.sign(&payload)?;
        Ok(SignedVerdict::new(payload, bundle))
    }
}

/// Check an RSA signature over the canonical bytes of `payload`.
///
/// Any malformed key, signature or payload yields `false`.
pub fn verify<T: Serialize + ?Sized>(public_key_pem: &str, payload: &T, signature_b64: &str) -> bool {
    let Some(public_key) = parse_public_key(public_key_pem) else {
        return false;
    };
    let Ok(raw) = BASE64.decode(signature_b64.trim()) else {
        return false;
    };
    let Ok(signature) = Signature::try_from(raw.as_slice()) else {
        return false;
    };
    let Ok(message) = canonical_bytes(payload) else {
        return false;
    };

    VerifyingKey::<Sha256>::new(public_key)
        .verify(&message, &signature)
        .is_ok()
}

/// Check an HMAC tag over the canonical bytes of `payload` in constant time.
pub fn verify_hmac<T: Serialize + ?Sized>(secret: &[u8], payload: &T, tag_b64: &str) -> bool {
    let Ok(tag) = BASE64.decode(tag_b64.trim()) else {
        return false;
    };
    let Ok(message) = canonical_bytes(payload) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(&message);
    mac.verify_slice(&tag).is_ok()
}

/// Paths and secret produced by [`write_key_files`].
#[derive(Debug, Clone)]
pub struct GeneratedKeys {
    pub private_key_path: PathBuf,
    pub public_key_path: PathBuf,
    pub hmac_secret: String,
}

/// Generate a key pair into `dir` as `rsa_private.pem` (PKCS#8) and
/// `rsa_public.pem` (SPKI), plus a shared secret to configure alongside.
pub fn write_key_files(dir: &Path, bits: usize) -> Result<GeneratedKeys, KeyError> {
    let dir = expand_path(dir);
    fs::create_dir_all(&dir).map_err(|source| KeyError::Write {
        path: dir.clone(),
        source,
    })?;

    let private_key =
        RsaPrivateKey::new(&mut OsRng, bits).map_err(|e| KeyError::Generate(e.to_string()))?;
    let private_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| KeyError::Pem(format!("private key: {}", e)))?;
    let public_pem = encode_public_key(&private_key.to_public_key())?;

    let private_key_path = dir.join(PRIVATE_KEY_FILE);
    let public_key_path = dir.join(PUBLIC_KEY_FILE);
    for (path, contents) in [
        (&private_key_path, private_pem.as_str()),
        (&public_key_path, public_pem.as_str()),
    ] {
        fs::write(path, contents).map_err(|source| KeyError::Write {
            path: path.clone(),
            source,
        })?;
    }

    Ok(GeneratedKeys {
        private_key_path,
        public_key_path,
        hmac_secret: generate_shared_secret(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_bytes_sorted_and_compact() {
        let value = json!({"b": 1, "a": {"z": [3, {"y": 1, "x": 2}], "c": "é"}});
        let bytes = canonical_bytes(&value).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"a":{"c":"\u00e9","z":[3,{"x":2,"y":1}]},"b":1}"#
        );
    }

    #[test]
    fn test_canonical_bytes_escape_non_ascii() {
        let value = json!({"s": "b\u{fc}cher \u{1F600} \u{7f} \n \"q\" /"});
        let bytes = canonical_bytes(&value).unwrap();
        assert!(bytes.is_ascii());
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"s":"b\u00fccher \ud83d\ude00 \u007f \n \"q\" /"}"#
        );
    }

    #[test]
    fn test_format_float() {
        let cases = [
            (0.0, "0.0"),
            (-0.0, "-0.0"),
            (1.0, "1.0"),
            (0.5, "0.5"),
            (0.913274, "0.913274"),
            (123.456, "123.456"),
            (0.0001, "0.0001"),
            (0.00005, "5e-05"),
            (0.000123, "0.000123"),
            (1.5e-7, "1.5e-07"),
            (-2.5e-5, "-2.5e-05"),
            (1e15, "1000000000000000.0"),
            (1e16, "1e+16"),
            (12345678901234567.0, "1.2345678901234568e+16"),
            (1e22, "1e+22"),
            (1.7976931348623157e308, "1.7976931348623157e+308"),
        ];
        for (value, expected) in cases {
            assert_eq!(format_float(value), expected, "for {:?}", value);
        }
    }

    #[test]
    fn test_canonical_bytes_ignore_construction_order() {
        let one = json!({"url": "http://x", "probability": 0.25, "nonce": "ab"});
        let mut two = serde_json::Map::new();
        two.insert("nonce".into(), json!("ab"));
        two.insert("probability".into(), json!(0.25));
        two.insert("url".into(), json!("http://x"));
        assert_eq!(
            canonical_bytes(&one).unwrap(),
            canonical_bytes(&Value::Object(two)).unwrap()
        );
    }

    #[test]
    fn test_parse_shared_secret() {
        assert_eq!(parse_shared_secret("AAEC").unwrap(), vec![0, 1, 2]);
        // Not valid base64 (odd length), valid hex
        assert_eq!(parse_shared_secret("0a0b0c").unwrap(), vec![10, 11, 12]);
        assert!(parse_shared_secret("").is_err());
        assert!(parse_shared_secret("zz!").is_err());
    }

    #[test]
    fn test_generated_secret_decodes() {
        let secret = generate_shared_secret();
        assert_eq!(parse_shared_secret(&secret).unwrap().len(), SHARED_SECRET_LEN);
    }

    #[test]
    fn test_verify_hmac_rejects_garbage() {
        let payload = json!({"a": 1});
        assert!(!verify_hmac(b"secret", &payload, "not base64!"));
        assert!(!verify_hmac(b"secret", &payload, ""));
    }

    #[test]
    fn test_verify_rejects_malformed_key() {
        let payload = json!({"a": 1});
        assert!(!verify("not a pem", &payload, "AAAA"));
        assert!(!verify("", &payload, ""));
    }
}
