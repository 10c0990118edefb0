//! What `--verbose` shows of HTTP traffic. Credentials used by the model
//! endpoint and Pushover are masked before anything reaches the log.

use reqwest::header::HeaderValue;
use serde_json::Value;

const MASK: &str = "***REDACTED***";
const SECRET_KEYS: [&str; 5] = ["authorization", "api_key", "key", "token", "user"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpDebugConfig {
    pub enabled: bool,
    pub redact_secrets: bool,
    pub max_body_chars: usize,
}

impl HttpDebugConfig {
    pub fn from_verbose(verbose: bool) -> Self {
        Self {
            enabled: verbose,
            redact_secrets: true,
            max_body_chars: 4_000,
        }
    }

    pub fn header(&self, name: &str, value: &HeaderValue) -> String {
        if self.masks(name) {
            return MASK.to_string();
        }
        value.to_str().unwrap_or("<non-utf8>").to_string()
    }

    /// Masks secret keys at any depth. Non-JSON text is returned unchanged.
    pub fn json_body(&self, raw: &str) -> String {
        if !self.redact_secrets {
            return raw.to_string();
        }
        let Ok(mut json) = serde_json::from_str::<Value>(raw) else {
            return raw.to_string();
        };
        mask_json(&mut json);
        json.to_string()
    }

    /// Form fields as `k=v&k=v`, unencoded so messages stay readable.
    pub fn form_body(&self, fields: &[(&str, &str)]) -> String {
        fields
            .iter()
            .map(|&(name, value)| {
                let value = if self.masks(name) { MASK } else { value };
                format!("{name}={value}")
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    pub fn clip(&self, body: &str) -> String {
        match body.char_indices().nth(self.max_body_chars) {
            None => body.to_string(),
            Some((cut, _)) => {
                let dropped = body[cut..].chars().count();
                format!("{}... <truncated {dropped} chars>", &body[..cut])
            }
        }
    }

    fn masks(&self, key: &str) -> bool {
        self.redact_secrets && is_secret(key)
    }
}

fn mask_json(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, item) in map.iter_mut() {
                if is_secret(key) {
                    *item = Value::String(MASK.to_string());
                } else {
                    mask_json(item);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(mask_json),
        _ => {}
    }
}

fn is_secret(key: &str) -> bool {
    SECRET_KEYS.iter().any(|secret| secret.eq_ignore_ascii_case(key))
}
