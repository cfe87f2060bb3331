//! Purpose: Route Docker volume-plugin verbs to a `VolumeManager`.
//! Exports: `Verb`, `PluginRequest`, `Payload`, `Reply`, `dispatch`, `router`.
//! Role: Data-driven route table; each verb is a (decode, invoke, encode) entry.
//! Invariants: Every response carries the plugin content type, success or error.
//! Invariants: A body that fails to decode never reaches the Volume Manager.
//! Invariants: Backend calls are made once; failures surface as `{"Error": msg}` with 500.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::api::{MountOptions, VolumeDescriptor, VolumeManager, VolumeOpts};
use crate::core::error::{Error, ErrorKind};

pub const PLUGIN_CONTENT_TYPE: &str = "application/vnd.docker.plugins.v1.2+json";

/// Request bodies larger than this are answered with a decode error.
pub const MAX_BODY_BYTES: usize = 1 << 20;

#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum Verb {
    Activate,
    Create,
    Remove,
    Path,
    Mount,
    Unmount,
    Get,
    List,
}

impl Verb {
    pub const ALL: [Verb; 8] = [
        Verb::Activate,
        Verb::Create,
        Verb::Remove,
        Verb::Path,
        Verb::Mount,
        Verb::Unmount,
        Verb::Get,
        Verb::List,
    ];

    pub fn path(self) -> &'static str {
        route(self).path
    }

    pub fn from_path(path: &str) -> Option<Verb> {
        ROUTES
            .iter()
            .find(|route| route.path == path)
            .map(|route| route.verb)
    }
}

/// The request envelope shared by every verb that takes a body.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct PluginRequest {
    #[serde(rename = "Name", default)]
    name: Option<String>,
    #[serde(rename = "Opts", default)]
    opts: Option<VolumeOpts>,
}

impl PluginRequest {
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }

    pub fn opts(&self) -> VolumeOpts {
        self.opts.clone().unwrap_or_default()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Empty,
    Implements,
    Mountpoint(String),
    Volume(VolumeDescriptor),
    Volumes(Vec<VolumeDescriptor>),
}

impl Payload {
    fn to_json(&self) -> Value {
        match self {
            Payload::Empty => json!({}),
            Payload::Implements => json!({ "Implements": ["VolumeDriver"] }),
            Payload::Mountpoint(mountpoint) => json!({ "Mountpoint": mountpoint }),
            Payload::Volume(volume) => json!({ "Volume": volume }),
            Payload::Volumes(volumes) => json!({ "Volumes": volumes }),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Reply {
    pub status: StatusCode,
    pub body: Value,
}

impl Reply {
    fn ok(payload: Payload) -> Self {
        Self {
            status: StatusCode::OK,
            body: payload.to_json(),
        }
    }

    fn error(err: &Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: json!({ "Error": err.wire_message() }),
        }
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.body)).into_response();
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(PLUGIN_CONTENT_TYPE));
        response
    }
}

type Invoke = fn(&dyn VolumeManager, &PluginRequest) -> Result<Payload, Error>;

struct Route {
    verb: Verb,
    path: &'static str,
    decodes: bool,
    invoke: Invoke,
}

// Indexed by `Verb` discriminant.
const ROUTES: [Route; 8] = [
    Route {
        verb: Verb::Activate,
        path: "/Plugin.Activate",
        decodes: false,
        invoke: invoke_activate,
    },
    Route {
        verb: Verb::Create,
        path: "/VolumeDriver.Create",
        decodes: true,
        invoke: invoke_create,
    },
    Route {
        verb: Verb::Remove,
        path: "/VolumeDriver.Remove",
        decodes: true,
        invoke: invoke_remove,
    },
    Route {
        verb: Verb::Path,
        path: "/VolumeDriver.Path",
        decodes: true,
        invoke: invoke_path,
    },
    Route {
        verb: Verb::Mount,
        path: "/VolumeDriver.Mount",
        decodes: true,
        invoke: invoke_mount,
    },
    Route {
        verb: Verb::Unmount,
        path: "/VolumeDriver.Unmount",
        decodes: true,
        invoke: invoke_unmount,
    },
    Route {
        verb: Verb::Get,
        path: "/VolumeDriver.Get",
        decodes: true,
        invoke: invoke_get,
    },
    Route {
        verb: Verb::List,
        path: "/VolumeDriver.List",
        decodes: true,
        invoke: invoke_list,
    },
];

fn route(verb: Verb) -> &'static Route {
    &ROUTES[verb as usize]
}

fn invoke_activate(_: &dyn VolumeManager, _: &PluginRequest) -> Result<Payload, Error> {
    Ok(Payload::Implements)
}

fn invoke_create(manager: &dyn VolumeManager, request: &PluginRequest) -> Result<Payload, Error> {
    manager
        .create(request.name(), &request.opts())
        .map(|()| Payload::Empty)
}

fn invoke_remove(manager: &dyn VolumeManager, request: &PluginRequest) -> Result<Payload, Error> {
    manager.remove(request.name()).map(|()| Payload::Empty)
}

fn invoke_path(manager: &dyn VolumeManager, request: &PluginRequest) -> Result<Payload, Error> {
    manager
        .path(request.name(), "")
        .map(Payload::Mountpoint)
}

fn invoke_mount(manager: &dyn VolumeManager, request: &PluginRequest) -> Result<Payload, Error> {
    manager
        .mount(request.name(), &MountOptions::default())
        .map(Payload::Mountpoint)
}

fn invoke_unmount(manager: &dyn VolumeManager, request: &PluginRequest) -> Result<Payload, Error> {
    manager.unmount(request.name(), "").map(|()| Payload::Empty)
}

fn invoke_get(manager: &dyn VolumeManager, request: &PluginRequest) -> Result<Payload, Error> {
    manager.get(request.name()).map(Payload::Volume)
}

fn invoke_list(manager: &dyn VolumeManager, _: &PluginRequest) -> Result<Payload, Error> {
    manager.list().map(Payload::Volumes)
}

/// An empty body is an empty envelope; anything else must be a JSON object.
fn decode(body: &[u8]) -> Result<PluginRequest, Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(PluginRequest::default());
    }
    let value: Value = serde_json::from_slice(body).map_err(decode_error)?;
    if !value.is_object() {
        return Err(Error::new(ErrorKind::Decode)
            .with_message("request body must be a JSON object"));
    }
    serde_json::from_value(value).map_err(decode_error)
}

fn decode_error(err: serde_json::Error) -> Error {
    Error::new(ErrorKind::Decode).with_message(err.to_string())
}

/// Run one verb against `manager` without any transport.
pub fn dispatch(manager: &dyn VolumeManager, verb: Verb, body: &[u8]) -> Reply {
    let route = route(verb);
    let request = if route.decodes {
        match decode(body) {
            Ok(request) => request,
            Err(err) => {
                error!(verb = route.path, error = %err, "error decoding json");
                return Reply::error(&err);
            }
        }
    } else {
        PluginRequest::default()
    };

    match (route.invoke)(manager, &request) {
        Ok(payload) => Reply::ok(payload),
        Err(err) => {
            error!(
                verb = route.path,
                volume = request.name(),
                error = %err,
                "volume manager call failed"
            );
            Reply::error(&err)
        }
    }
}

async fn handle(manager: Arc<dyn VolumeManager>, verb: Verb, body: Body) -> Response {
    let bytes = if route(verb).decodes {
        match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
            Ok(bytes) => bytes,
            Err(err) => {
                let err = Error::new(ErrorKind::Decode).with_message(err.to_string());
                error!(verb = verb.path(), error = %err, "error reading request body");
                return Reply::error(&err).into_response();
            }
        }
    } else {
        Bytes::new()
    };

    let result = tokio::task::spawn_blocking(move || dispatch(manager.as_ref(), verb, &bytes)).await;
    match result {
        Ok(reply) => reply.into_response(),
        Err(err) => {
            let err = Error::new(ErrorKind::Internal)
                .with_message("volume manager task failed")
                .with_source(err);
            error!(verb = verb.path(), error = %err, "dispatch task failed");
            Reply::error(&err).into_response()
        }
    }
}

/// Build the HTTP routing table for every verb; routes accept any method.
pub fn router(manager: Arc<dyn VolumeManager>) -> Router {
    let mut router: Router<Arc<dyn VolumeManager>> = Router::new();
    for verb in Verb::ALL {
        router = router.route(
            verb.path(),
            any(
                move |State(manager): State<Arc<dyn VolumeManager>>, body: Body| {
                    handle(manager, verb, body)
                },
            ),
        );
    }
    router.layer(TraceLayer::new_for_http()).with_state(manager)
}
