//! Deferred registration of avro routes and message handlers.

use crate::compile::{DEFAULT_JAVA, compile_protocol_with};
use crate::error::Error;
use crate::settings::{AvroSettings, derive_service_path};
use crate::view::{ViewState, handle_call, method_not_found};

use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use avro_rpc::framing::FRAME_HEADER_SIZE;
use avro_rpc::{FramingConfig, MessageHandler, Route};
use axum::Router;
use axum::routing::post;
use parking_lot::Mutex;
use tracing::{debug, info};

/// Configuration for serving routes over HTTP.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Deadline for reading a request body.
    pub read_timeout: Duration,
    /// Framing of calls and replies.
    pub framing: FramingConfig,
    /// Java launcher used for protocol compilation.
    pub java: OsString,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(30),
            framing: FramingConfig::default(),
            java: OsString::from(DEFAULT_JAVA),
        }
    }
}

/// Files and URL pattern for one route. Unset fields fall back to the
/// service's settings definition.
#[derive(Debug, Clone, Default)]
pub struct RouteSpec {
    /// URL pattern.
    pub pattern: Option<String>,
    /// IDL protocol file.
    pub protocol: Option<PathBuf>,
    /// JSON schema file.
    pub schema: Option<PathBuf>,
}

impl RouteSpec {
    /// Spec with an explicit schema file.
    #[must_use]
    pub fn schema(path: impl Into<PathBuf>) -> Self {
        Self {
            schema: Some(path.into()),
            ..Self::default()
        }
    }

    /// Spec with an explicit protocol file.
    #[must_use]
    pub fn protocol(path: impl Into<PathBuf>) -> Self {
        Self {
            protocol: Some(path.into()),
            ..Self::default()
        }
    }

    /// Set the URL pattern.
    #[must_use]
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// Set the schema file.
    #[must_use]
    pub fn with_schema(mut self, path: impl Into<PathBuf>) -> Self {
        self.schema = Some(path.into());
        self
    }
}

struct PendingRoute {
    service: String,
    path: String,
    protocol: Option<PathBuf>,
    schema: PathBuf,
    tools_jar: Option<PathBuf>,
}

struct PendingMessage {
    service: String,
    message: String,
    handler: Arc<dyn MessageHandler>,
}

#[derive(Default)]
struct Pending {
    routes: Vec<PendingRoute>,
    messages: Vec<PendingMessage>,
}

/// Collects route and message registrations and turns them into an
/// [`axum::Router`] on [`Registrar::commit`].
///
/// Registration only validates what is known up front. Schema files are
/// compiled, read and parsed at commit, where all routes are created before
/// any handler is bound, so messages may be registered before their route.
pub struct Registrar {
    settings: AvroSettings,
    root_dir: PathBuf,
    config: HttpConfig,
    pending: Mutex<Pending>,
}

impl Registrar {
    /// Create a registrar. Relative `protocol_dir` settings resolve against
    /// `root_dir`.
    pub fn new(settings: AvroSettings, root_dir: impl Into<PathBuf>) -> Self {
        Self {
            settings,
            root_dir: root_dir.into(),
            config: HttpConfig::default(),
            pending: Mutex::new(Pending::default()),
        }
    }

    /// Parse a settings map and add a route for every service it defines.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid settings or service definitions.
    pub fn from_settings<I, K, V>(settings: I, root_dir: impl Into<PathBuf>) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let registrar = Self::new(AvroSettings::from_map(settings)?, root_dir);

        let services: Vec<String> = registrar.settings.services.keys().cloned().collect();
        for service in services {
            registrar.add_route(&service, RouteSpec::default())?;
        }

        debug!("Finished preparing for avro services.");
        Ok(registrar)
    }

    /// Use `config` for the committed routes.
    #[must_use]
    pub fn with_config(mut self, config: HttpConfig) -> Self {
        self.config = config;
        self
    }

    /// The parsed settings.
    pub const fn settings(&self) -> &AvroSettings {
        &self.settings
    }

    /// Register a route for `service`.
    ///
    /// # Errors
    ///
    /// Returns an error if neither `spec` nor the settings name a protocol
    /// or schema file, the schema file is missing without `auto_compile`,
    /// or compilation is enabled but cannot run.
    pub fn add_route(&self, service: &str, spec: RouteSpec) -> Result<(), Error> {
        let def = self.settings.services.get(service);
        if spec.protocol.is_none() && spec.schema.is_none() && def.is_none() {
            return Err(Error::config(format!(
                "Not enough information provided to register service '{service}'. \
                 Please provide a settings definition or a protocol/schema when adding the route."
            )));
        }

        let pattern = spec.pattern.or_else(|| def.and_then(|d| d.pattern.clone()));
        let path = derive_service_path(
            service,
            pattern.as_deref(),
            self.settings.default_path_prefix.as_deref(),
        )?;
        check_path(&path)?;

        let base_dir = self.base_dir();
        let protocol = spec
            .protocol
            .or_else(|| def.and_then(|d| d.protocol.clone()))
            .map(|p| base_dir.join(p));
        let schema = spec
            .schema
            .or_else(|| def.and_then(|d| d.schema.clone()))
            .map(|s| base_dir.join(s))
            .or_else(|| protocol.as_ref().map(|p| p.with_extension("avpr")))
            .ok_or_else(|| {
                Error::config(format!("No protocol or schema file defined for service '{service}'."))
            })?;

        let tools_jar = if self.settings.auto_compile {
            let tools_jar = self
                .settings
                .tools_jar
                .clone()
                .ok_or_else(|| Error::config("Cannot auto_compile without tools_jar defined."))?;
            if !tools_jar.exists() {
                return Err(Error::MissingFile(tools_jar));
            }
            if protocol.is_none() {
                return Err(Error::config("Cannot auto_compile without a protocol defined."));
            }
            Some(tools_jar)
        } else {
            if !schema.exists() {
                return Err(Error::MissingFile(schema));
            }
            None
        };

        let mut pending = self.pending.lock();
        if pending.routes.iter().any(|r| r.service == service) {
            return Err(Error::config(format!(
                "Service '{service}' already has a route defined."
            )));
        }
        if let Some(other) = pending.routes.iter().find(|r| r.path == path) {
            return Err(Error::config(format!(
                "Service '{service}' and service '{}' share the path '{path}'.",
                other.service
            )));
        }

        debug!("Queued avro service: {} => {}", service, path);
        pending.routes.push(PendingRoute {
            service: service.to_string(),
            path,
            protocol,
            schema,
            tools_jar,
        });
        Ok(())
    }

    /// Register `handler` for `message` of `service`.
    ///
    /// # Errors
    ///
    /// Returns an error if a handler was already registered for the same
    /// message. Unknown services and messages are reported by
    /// [`Registrar::commit`].
    pub fn register_message<H: MessageHandler>(
        &self,
        service: &str,
        message: &str,
        handler: H,
    ) -> Result<(), Error> {
        let mut pending = self.pending.lock();
        if pending
            .messages
            .iter()
            .any(|m| m.service == service && m.message == message)
        {
            return Err(Error::config(format!(
                "Message '{message}' of service '{service}' is already registered."
            )));
        }

        pending.messages.push(PendingMessage {
            service: service.to_string(),
            message: message.to_string(),
            handler: Arc::new(handler),
        });
        Ok(())
    }

    /// Apply all registrations and build the router.
    ///
    /// Routes are applied first, in registration order: the protocol is
    /// compiled when `auto_compile` is on, then the schema file is read and
    /// parsed. Message handlers are bound afterwards.
    ///
    /// # Errors
    ///
    /// Returns the first failure; no router is built in that case.
    pub async fn commit(self) -> Result<Router, Error> {
        let Pending { routes, messages } = self.pending.into_inner();
        let mut committed: HashMap<String, (String, Route)> = HashMap::with_capacity(routes.len());
        let mut order = Vec::with_capacity(routes.len());

        for pending in routes {
            if let (Some(protocol), Some(tools_jar)) = (&pending.protocol, &pending.tools_jar) {
                compile_protocol_with(&self.config.java, protocol, &pending.schema, tools_jar).await?;
            }

            let text = tokio::fs::read_to_string(&pending.schema)
                .await
                .map_err(|source| Error::ReadSchema {
                    path: pending.schema.clone(),
                    source,
                })?;

            let route = Route::new(pending.service.as_str(), &text)
                .map_err(|source| Error::Route {
                    service: pending.service.clone(),
                    source,
                })?
                .with_framing(self.config.framing.clone());

            info!("Registering avro service: {} => {}", pending.service, pending.path);
            order.push(pending.service.clone());
            committed.insert(pending.service, (pending.path, route));
        }

        for pending in messages {
            let (_, route) = committed
                .get(&pending.service)
                .ok_or_else(|| Error::NoRoute(pending.service.clone()))?;

            debug!(
                "Registering message {} for service {}",
                pending.message, pending.service
            );
            route
                .dispatch_table()
                .bind(&pending.message, pending.handler)
                .map_err(|source| Error::Bind {
                    service: pending.service.clone(),
                    message: pending.message.clone(),
                    source,
                })?;
        }

        let body_limit = body_limit(&self.config.framing);
        let mut router = Router::new();
        for service in order {
            if let Some((path, route)) = committed.remove(&service) {
                let state = ViewState {
                    route,
                    body_limit,
                    read_timeout: self.config.read_timeout,
                };
                router = router.route(
                    &path,
                    post(handle_call).fallback(method_not_found).with_state(state),
                );
            }
        }

        Ok(router)
    }

    fn base_dir(&self) -> PathBuf {
        match &self.settings.protocol_dir {
            Some(dir) => self.root_dir.join(dir),
            None => self.root_dir.clone(),
        }
    }
}

/// Reject paths the router cannot mount literally.
fn check_path(path: &str) -> Result<(), Error> {
    let has_capture = path
        .split('/')
        .any(|segment| segment.starts_with(':') || segment.starts_with('*'));
    if has_capture || path.contains(['{', '}']) {
        return Err(Error::config(format!("Invalid service path '{path}'.")));
    }
    Ok(())
}

/// Largest framed body holding a payload of the configured maximum size.
///
/// Clients pick their own chunking, so this assumes one-byte frames. The
/// payload size itself is enforced when the body is unframed.
fn body_limit(framing: &FramingConfig) -> usize {
    framing
        .max_message_size
        .saturating_mul(1 + FRAME_HEADER_SIZE)
        .saturating_add(FRAME_HEADER_SIZE)
}

impl std::fmt::Debug for Registrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pending = self.pending.lock();
        f.debug_struct("Registrar")
            .field("settings", &self.settings)
            .field("root_dir", &self.root_dir)
            .field("routes", &pending.routes.iter().map(|r| &r.service).collect::<HashSet<_>>())
            .field("messages", &pending.messages.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_check_path() {
        assert!(check_path("/prefix/foo").is_ok());
        assert!(check_path("/:id").is_err());
        assert!(check_path("/files/*rest").is_err());
        assert!(check_path("/{id}").is_err());
    }

    #[test]
    fn test_body_limit_ignores_server_frame_size() {
        let framing = FramingConfig {
            frame_size: 10,
            max_message_size: 100,
        };
        // 100 one-byte frames plus the terminator
        assert_eq!(body_limit(&framing), 100 + 101 * FRAME_HEADER_SIZE);

        let payload = vec![7u8; 100];
        let client = FramingConfig {
            frame_size: 1,
            ..framing.clone()
        };
        let framed = avro_rpc::framing::encode_framed(&payload, &client);
        assert_eq!(framed.len(), body_limit(&framing));
        assert_eq!(avro_rpc::framing::decode_framed(&framed, &framing).unwrap(), payload);
    }

    #[test]
    fn test_incomplete_route_information() {
        let registrar = Registrar::new(AvroSettings::default(), ".");
        let err = registrar.add_route("foo", RouteSpec::default()).unwrap_err();
        assert!(err.to_string().starts_with("Not enough information provided"));

        let err = registrar
            .add_route("foo", RouteSpec::default().with_pattern("/foo"))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_auto_compile_checks() {
        let settings = AvroSettings {
            auto_compile: true,
            ..AvroSettings::default()
        };
        let err = Registrar::new(settings, ".")
            .add_route("foo", RouteSpec::schema("test.avpr"))
            .unwrap_err();
        assert_eq!(err.to_string(), "Cannot auto_compile without tools_jar defined.");

        let settings = AvroSettings {
            auto_compile: true,
            tools_jar: Some(PathBuf::from("bogus-tools-jar")),
            ..AvroSettings::default()
        };
        let err = Registrar::new(settings, ".")
            .add_route("foo", RouteSpec::schema("test.avpr"))
            .unwrap_err();
        assert_eq!(err.to_string(), "No such file or directory: bogus-tools-jar");
    }

    #[test]
    fn test_missing_schema_file() {
        let registrar = Registrar::new(AvroSettings::default(), "/nonexistent");
        let err = registrar
            .add_route("foo", RouteSpec::schema("completely-bogus-schema-file"))
            .unwrap_err();
        assert!(matches!(err, Error::MissingFile(path) if path == Path::new("/nonexistent/completely-bogus-schema-file")));
    }
}
