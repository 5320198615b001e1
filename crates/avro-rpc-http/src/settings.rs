//! Settings for avro services, read from a flat key/value map.
//!
//! ```text
//! avro.default_path_prefix = /avro-api
//! avro.protocol_dir = protocols
//! avro.auto_compile = true
//! avro.tools_jar = lib/avro-tools.jar
//! avro.service.foo =
//!     protocol = foo.avdl
//!     pattern = /foo
//! ```

use crate::error::Error;

use std::path::PathBuf;

use indexmap::IndexMap;
use tracing::debug;

/// Prefix of every recognised settings key.
pub const SETTINGS_PREFIX: &str = "avro.";

const SERVICE_PREFIX: &str = "service.";

const TRUTHY: [&str; 6] = ["true", "yes", "on", "y", "t", "1"];

/// Parsed `avro.*` settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvroSettings {
    /// Prefix joined in front of every service path.
    pub default_path_prefix: Option<String>,
    /// Directory relative protocol and schema files are resolved against.
    pub protocol_dir: Option<PathBuf>,
    /// Compile protocol files into schema files when routes are committed.
    pub auto_compile: bool,
    /// Avro tools jar used for compilation.
    pub tools_jar: Option<PathBuf>,
    /// Services defined in settings, in definition order.
    pub services: IndexMap<String, ServiceDef>,
}

/// One `avro.service.<name>` definition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceDef {
    /// IDL protocol file (`protocol` or `protocol_file`).
    pub protocol: Option<PathBuf>,
    /// JSON schema file (`schema` or `schema_file`).
    pub schema: Option<PathBuf>,
    /// URL pattern (`pattern`).
    pub pattern: Option<String>,
}

impl AvroSettings {
    /// Read the `avro.*` entries of a settings map. Other keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for malformed service definitions, or when
    /// `auto_compile` is on without a `tools_jar`.
    pub fn from_map<I, K, V>(settings: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut parsed = Self::default();

        for (key, value) in settings {
            let Some(key) = key.as_ref().strip_prefix(SETTINGS_PREFIX) else {
                continue;
            };
            let value = value.as_ref().trim();

            match key {
                "default_path_prefix" => parsed.default_path_prefix = non_empty(value),
                "protocol_dir" => parsed.protocol_dir = non_empty(value).map(PathBuf::from),
                "auto_compile" => parsed.auto_compile = is_truthy(value),
                "tools_jar" => parsed.tools_jar = non_empty(value).map(PathBuf::from),
                other => {
                    if let Some(service) = other.strip_prefix(SERVICE_PREFIX) {
                        let def = ServiceDef::parse(service, value)?;
                        parsed.services.insert(service.to_string(), def);
                    } else {
                        debug!("Ignoring unknown setting '{}{}'", SETTINGS_PREFIX, other);
                    }
                }
            }
        }

        if parsed.auto_compile && parsed.tools_jar.is_none() {
            return Err(Error::config(
                "'tools_jar' must be defined if 'auto_compile' is turned on.",
            ));
        }

        Ok(parsed)
    }
}

impl ServiceDef {
    /// Parse newline separated `key = value` lines.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an empty definition, a line without
    /// `=`, an unknown or repeated key.
    pub fn parse(service: &str, text: &str) -> Result<Self, Error> {
        let mut def = Self::default();
        let mut seen = false;

        for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
            let (key, value) = line.split_once('=').ok_or_else(|| {
                Error::config(format!(
                    "Invalid line '{line}' in definition of service '{service}'."
                ))
            })?;
            let (key, value) = (key.trim(), value.trim());

            let slot = match key {
                "protocol" | "protocol_file" => Slot::Protocol,
                "schema" | "schema_file" => Slot::Schema,
                "pattern" => Slot::Pattern,
                _ => {
                    return Err(Error::config(format!(
                        "Unknown option '{key}' in definition of service '{service}'."
                    )));
                }
            };

            let duplicate = match slot {
                Slot::Protocol => def.protocol.replace(PathBuf::from(value)).is_some(),
                Slot::Schema => def.schema.replace(PathBuf::from(value)).is_some(),
                Slot::Pattern => def.pattern.replace(value.to_string()).is_some(),
            };
            if duplicate {
                return Err(Error::config(format!(
                    "Option '{key}' given twice in definition of service '{service}'."
                )));
            }
            seen = true;
        }

        if !seen {
            return Err(Error::config(format!(
                "Definition of service '{service}' is empty."
            )));
        }

        Ok(def)
    }
}

enum Slot {
    Protocol,
    Schema,
    Pattern,
}

/// Whether a settings value switches an option on.
pub fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    TRUTHY.iter().any(|truthy| truthy.eq_ignore_ascii_case(value))
}

/// URL path a service is mounted at.
///
/// A missing or empty `pattern` defaults to the service name. `prefix` and
/// pattern are joined with single slashes and the result is absolute.
///
/// # Errors
///
/// Returns [`Error::Config`] if `service` is empty.
pub fn derive_service_path(
    service: &str,
    pattern: Option<&str>,
    prefix: Option<&str>,
) -> Result<String, Error> {
    if service.is_empty() {
        return Err(Error::config("Service name must not be empty."));
    }

    let pattern = pattern.filter(|p| !p.is_empty()).unwrap_or(service);

    let mut path = String::new();
    for part in [prefix.unwrap_or_default(), pattern] {
        let part = part.trim_matches('/');
        if !part.is_empty() {
            path.push('/');
            path.push_str(part);
        }
    }
    if path.is_empty() {
        path.push('/');
    }

    Ok(path)
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}
