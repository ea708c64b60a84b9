//! Launch-time bootstrap script for proxy hosts.
//!
//! The script installs nginx and writes a reverse-proxy site that listens on
//! the proxy port, applies the allow-list, and forwards to the website
//! endpoint. It is rendered from a fixed handlebars template in strict mode
//! with escaping off; every value is validated before rendering, so nothing
//! in the output depends on anything but the inputs.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use handlebars::Handlebars;
use serde::Serialize;
use url::Url;

use crate::allowlist::AllowListRule;
use crate::{Error, Result};

pub const DEFAULT_INDEX_DOCUMENT: &str = "index.html";

const CONFIG_PATH: &str = "/etc/nginx/conf.d/reverse-proxy.conf";
const SCRIPT_NAME: &str = "user-data";

const TEMPLATE: &str = r#"#!/bin/bash

amazon-linux-extras enable nginx1

yum -y install nginx

cat <<'EOF' > {{config_path}}
server {
  listen {{port}};
  listen [::]:{{port}};

{{#each allow_rules}}  allow {{this}};
{{/each}}  deny all;

  location = / {
    proxy_pass {{backend_url}}/{{index_document}};
  }

  location / {
    proxy_pass {{backend_url}};
  }
}
EOF

service nginx restart
"#;

// ── Validated inputs ────────────────────────────────────────────────

/// Website endpoint the proxy forwards to, without a trailing slash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendUrl(String);

impl BackendUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for BackendUrl {
    type Err = Error;

    fn from_str(url: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let parsed = Url::parse(url).map_err(|e| invalid(&e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(invalid("scheme must be http or https"));
        }
        if parsed.host_str().is_none_or(str::is_empty) {
            return Err(invalid("missing host"));
        }
        if parsed.query().is_some() || parsed.fragment().is_some() {
            return Err(invalid("query strings and fragments are not allowed"));
        }

        // The parser drops tabs and newlines silently; check what was written.
        if let Some(bad) = url.chars().find(|c| !is_url_char(*c)) {
            return Err(invalid(&format!("character {bad:?} is not allowed")));
        }

        Ok(Self(parsed.as_str().trim_end_matches('/').to_string()))
    }
}

fn is_url_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~' | ':' | '/' | '%' | '[' | ']')
}

impl fmt::Display for BackendUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Object served for the root path, relative to the website endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDocument(String);

impl IndexDocument {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for IndexDocument {
    fn default() -> Self {
        Self(DEFAULT_INDEX_DOCUMENT.to_string())
    }
}

impl FromStr for IndexDocument {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidIndexDocument {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        if name.is_empty() {
            return Err(invalid("empty name"));
        }
        if name.starts_with('/') {
            return Err(invalid("must be relative to the website root"));
        }
        if name.split('/').any(|segment| segment == "..") {
            return Err(invalid("parent segments are not allowed"));
        }
        if let Some(bad) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '/')))
        {
            return Err(invalid(&format!("character {bad:?} is not allowed")));
        }

        Ok(Self(name.to_string()))
    }
}

impl fmt::Display for IndexDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Rendering ───────────────────────────────────────────────────────

/// Everything the script depends on.
#[derive(Debug, Clone, Copy)]
pub struct BootstrapParams<'a> {
    pub port: u16,
    pub rules: &'a [AllowListRule],
    pub index_document: &'a IndexDocument,
    pub backend: &'a BackendUrl,
}

/// Rendered user data for a proxy host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapScript(String);

impl BootstrapScript {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Base64 form, as launch user data is transported.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0.as_bytes())
    }
}

impl fmt::Display for BootstrapScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Serialize)]
struct ScriptContext<'a> {
    config_path: &'a str,
    port: u16,
    allow_rules: Vec<String>,
    backend_url: &'a str,
    index_document: &'a str,
}

/// Render the bootstrap script.
pub fn render(params: &BootstrapParams<'_>) -> Result<BootstrapScript> {
    let context = ScriptContext {
        config_path: CONFIG_PATH,
        port: params.port,
        allow_rules: params.rules.iter().map(|rule| rule.source.to_string()).collect(),
        backend_url: params.backend.as_str(),
        index_document: params.index_document.as_str(),
    };

    render_template(TEMPLATE, &context).map(BootstrapScript)
}

/// Strict: a variable missing from `context` fails instead of rendering empty.
fn render_template<T: Serialize>(template: &str, context: &T) -> Result<String> {
    let mut registry = Handlebars::new();
    registry.set_strict_mode(true);
    registry.register_escape_fn(handlebars::no_escape);
    registry.register_template_string(SCRIPT_NAME, template)?;
    Ok(registry.render(SCRIPT_NAME, context)?)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::allowlist::{derive_rules, parse_ranges};

    const BUCKET_URL: &str = "http://example-bucket.s3-website.amazonaws.com";

    fn script(ranges: &[&str], index: &str) -> BootstrapScript {
        let rules = derive_rules(&parse_ranges(ranges).unwrap(), 8080);
        let index: IndexDocument = index.parse().unwrap();
        let backend: BackendUrl = BUCKET_URL.parse().unwrap();
        render(&BootstrapParams {
            port: 8080,
            rules: &rules,
            index_document: &index,
            backend: &backend,
        })
        .unwrap()
    }

    #[test]
    fn renders_allow_list_then_deny_all() {
        let s = script(&["10.0.128.0/18", "10.0.192.0/18"], "test_index.html");
        let text = s.as_str();

        assert!(text.starts_with("#!/bin/bash\n"));
        assert!(text.contains(
            "  allow 10.0.128.0/18;\n  allow 10.0.192.0/18;\n  deny all;\n"
        ));
        assert_eq!(text.matches("deny all;").count(), 1);
        assert!(text.contains("  listen 8080;\n  listen [::]:8080;\n"));
        assert!(text.contains(&format!(
            "  location = / {{\n    proxy_pass {BUCKET_URL}/test_index.html;\n  }}"
        )));
        assert!(text.contains(&format!(
            "  location / {{\n    proxy_pass {BUCKET_URL};\n  }}"
        )));
        assert!(text.contains("cat <<'EOF' > /etc/nginx/conf.d/reverse-proxy.conf\n"));
        assert!(text.trim_end().ends_with("service nginx restart"));
        assert!(!text.contains("{{"));
    }

    #[test]
    fn empty_allow_list_only_denies() {
        let s = script(&[], "index.html");
        assert!(!s.as_str().contains("allow "));
        assert!(s.as_str().contains("listen [::]:8080;\n\n  deny all;\n"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let a = script(&["10.0.0.0/8"], "index.html");
        let b = script(&["10.0.0.0/8"], "index.html");
        assert_eq!(a, b);
        assert_eq!(a.to_base64(), b.to_base64());
    }

    #[test]
    fn rule_order_is_preserved() {
        let s = script(&["10.0.192.0/18", "10.0.128.0/18"], "index.html");
        let first = s.as_str().find("10.0.192.0/18").unwrap();
        let second = s.as_str().find("10.0.128.0/18").unwrap();
        assert!(first < second);
    }

    #[test]
    fn base64_decodes_to_script() {
        let s = script(&[], "index.html");
        let decoded = STANDARD.decode(s.to_base64()).unwrap();
        assert_eq!(decoded, s.as_str().as_bytes());
    }

    #[test]
    fn backend_url_validation() {
        let url: BackendUrl = "https://bucket.s3-website-eu-west-1.amazonaws.com/"
            .parse()
            .unwrap();
        assert_eq!(url.as_str(), "https://bucket.s3-website-eu-west-1.amazonaws.com");

        // Stored in the parser's normalized form.
        let url: BackendUrl = "HTTP://Bucket.Example.com/site/".parse().unwrap();
        assert_eq!(url.as_str(), "http://bucket.example.com/site");

        for bad in [
            "ftp://bucket",
            "bucket.example.com",
            "http://",
            "http://bucket;rm -rf /",
            "http://bucket\tx",
            "http://bucket/$(reboot)",
            "http://bucket/?q=1",
            "http://bucket\nservice nginx stop",
        ] {
            assert!(bad.parse::<BackendUrl>().is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn index_document_validation() {
        assert_eq!(IndexDocument::default().as_str(), "index.html");
        assert!("site/home.html".parse::<IndexDocument>().is_ok());

        for bad in ["", "/index.html", "../secret", "a/../b", "index.html;", "in dex.html"] {
            assert!(bad.parse::<IndexDocument>().is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn unknown_variable_is_an_error() {
        let err = render_template("listen {{nope}};", &json!({ "port": 1 })).unwrap_err();
        assert!(matches!(err, Error::Script(_)));

        let err = render_template("listen {{port", &json!({ "port": 1 })).unwrap_err();
        assert!(matches!(err, Error::ScriptTemplate(_)));
    }

    #[test]
    fn values_are_neither_rerendered_nor_escaped() {
        let out = render_template("{{a}}", &json!({ "a": "{{b}}" })).unwrap();
        assert_eq!(out, "{{b}}");

        let out = render_template("{{a}}", &json!({ "a": "x & <y>" })).unwrap();
        assert_eq!(out, "x & <y>");
    }
}
