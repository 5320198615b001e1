//! HTTP route registrar for avro services.
//!
//! Services are declared in a flat settings map (or added directly), their
//! handlers registered per message, and the whole set committed into an
//! [`axum::Router`]. Each service answers `POST` requests whose body is one
//! framed call with `200` and a framed `avro/binary` reply; malformed
//! requests get `400` and server-side failures `500`.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod compile;
mod error;
mod registrar;
mod settings;
mod view;

pub use compile::{DEFAULT_JAVA, compile_protocol, compile_protocol_with};
pub use error::Error;
pub use registrar::{HttpConfig, Registrar, RouteSpec};
pub use settings::{AvroSettings, SETTINGS_PREFIX, ServiceDef, derive_service_path, is_truthy};
pub use view::AVRO_CONTENT_TYPE;
