//! Path registry over a device's endpoints.
//!
//! Every resource in the catalogue becomes an [`Endpoint`] keyed by its
//! normalized path. [`Node`] walks the same keys segment by segment, so
//! `system.node("/propeller/pwm")?.child("duty")` and
//! `system.endpoint("/propeller/pwm/duty")` reach the same handle.

use crate::codec::{CodecTable, ValueCodec};
use crate::endpoint::Binding;
use crate::types::{normalize, segments};
use crate::{Catalogue, Channel, Endpoint, MetricsHub, RegistryError, Resource, Result};
use lab_transport::{
    CommandConnection, SyncResourcer, TelemetryConfig, TelemetryConnector, TelemetryResourcer,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

pub struct LabSystem {
    endpoints: Vec<Endpoint>,
    index: HashMap<String, usize>,
    command: Option<Arc<SyncResourcer>>,
    telemetry: Option<Arc<TelemetryResourcer>>,
}

impl LabSystem {
    pub fn builder() -> LabSystemBuilder {
        LabSystemBuilder::default()
    }

    /// Open the real HTTP and websocket channels described by `config`.
    #[cfg(feature = "net")]
    pub fn connect(config: &crate::LabConfig, catalogue: &Catalogue) -> Result<Self> {
        use lab_transport::{HttpConnection, WsConnector};

        let http = HttpConnection::open(&config.address, config.http_port, config.timeout()?)?;
        let ws = WsConnector::new(&config.address, config.ws_port, &config.stream_path);
        info!(
            device = %catalogue.device,
            http = http.base_url(),
            ws = ws.url(),
            "connecting lab system"
        );
        Self::builder()
            .command(http)
            .telemetry(ws, config.telemetry_config()?)
            .catalogue(catalogue)
            .build()
    }

    /// Bind `catalogue` to caller-supplied channels.
    pub fn with_backends(
        command: impl CommandConnection + 'static,
        telemetry: impl TelemetryConnector + 'static,
        config: TelemetryConfig,
        catalogue: &Catalogue,
    ) -> Result<Self> {
        Self::builder()
            .command(command)
            .telemetry(telemetry, config)
            .catalogue(catalogue)
            .build()
    }

    pub fn endpoint(&self, path: &str) -> Result<&Endpoint> {
        let key = normalize(path);
        self.index
            .get(&key)
            .map(|&i| &self.endpoints[i])
            .ok_or(RegistryError::UnknownPath(key))
    }

    /// Tree view rooted at `path` (`/` for the whole device).
    pub fn node(&self, path: &str) -> Result<Node<'_>> {
        let prefix: Vec<String> = segments(path).map(str::to_string).collect();
        let node = Node {
            system: self,
            prefix,
        };
        if node.is_root() || node.exists() {
            Ok(node)
        } else {
            Err(RegistryError::UnknownPath(normalize(path)))
        }
    }

    pub fn root(&self) -> Node<'_> {
        Node {
            system: self,
            prefix: Vec::new(),
        }
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.endpoints.iter().map(|e| e.path())
    }

    pub fn telemetry(&self) -> Option<&TelemetryResourcer> {
        self.telemetry.as_deref()
    }

    /// Push the telemetry counters into `hub`.
    pub fn observe(&self, hub: &MetricsHub) {
        if let Some(t) = &self.telemetry {
            hub.observe_telemetry(&t.stats());
        }
    }

    /// Close the telemetry stream and join its worker.
    pub fn close(&self) {
        if let Some(t) = &self.telemetry {
            t.close();
        }
        debug!(command = self.command.is_some(), "lab system closed");
    }
}

/// One level of the resource tree.
#[derive(Clone)]
pub struct Node<'a> {
    system: &'a LabSystem,
    prefix: Vec<String>,
}

impl<'a> Node<'a> {
    fn is_root(&self) -> bool {
        self.prefix.is_empty()
    }

    fn exists(&self) -> bool {
        self.system
            .paths()
            .any(|p| starts_with(p, &self.prefix))
    }

    pub fn path(&self) -> String {
        normalize(&self.prefix.join("/"))
    }

    /// Names of the next path segments, in catalogue order.
    pub fn children(&self) -> Vec<&'a str> {
        let mut out: Vec<&'a str> = Vec::new();
        for p in self.system.paths() {
            if !starts_with(p, &self.prefix) {
                continue;
            }
            if let Some(next) = segments(p).nth(self.prefix.len()) {
                if !out.contains(&next) {
                    out.push(next);
                }
            }
        }
        out
    }

    pub fn child(&self, name: &str) -> Result<Node<'a>> {
        let mut prefix = self.prefix.clone();
        prefix.push(name.to_string());
        let node = Node {
            system: self.system,
            prefix,
        };
        if node.exists() {
            Ok(node)
        } else {
            Err(RegistryError::UnknownPath(node.path()))
        }
    }

    /// The endpoint at exactly this path, if the node is a resource.
    pub fn endpoint(&self) -> Option<&'a Endpoint> {
        self.system.endpoint(&self.path()).ok()
    }
}

fn starts_with(path: &str, prefix: &[String]) -> bool {
    let mut segs = segments(path);
    prefix
        .iter()
        .all(|want| segs.next().is_some_and(|s| s == want))
}

#[derive(Default)]
pub struct LabSystemBuilder {
    command: Option<Box<dyn CommandConnection>>,
    telemetry: Option<(Arc<dyn TelemetryConnector>, TelemetryConfig)>,
    codecs: CodecTable,
    resources: Vec<Resource>,
    metrics: Option<MetricsHub>,
}

impl LabSystemBuilder {
    pub fn command(mut self, conn: impl CommandConnection + 'static) -> Self {
        self.command = Some(Box::new(conn));
        self
    }

    pub fn telemetry(
        mut self,
        connector: impl TelemetryConnector + 'static,
        config: TelemetryConfig,
    ) -> Self {
        self.telemetry = Some((Arc::new(connector), config));
        self
    }

    /// Register (or replace) a named codec.
    pub fn codec(mut self, name: &str, codec: Arc<dyn ValueCodec>) -> Self {
        self.codecs.insert(name, codec);
        self
    }

    pub fn resource(mut self, resource: Resource) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn catalogue(mut self, catalogue: &Catalogue) -> Self {
        self.resources.extend(catalogue.resources.iter().cloned());
        self
    }

    pub fn metrics(mut self, hub: &MetricsHub) -> Self {
        self.metrics = Some(hub.clone());
        self
    }

    pub fn build(self) -> Result<LabSystem> {
        let needs = |ch: Channel| self.resources.iter().any(|r| r.channel == ch);
        let command = match (needs(Channel::Command), self.command) {
            (false, _) => None,
            (true, Some(conn)) => Some(Arc::new(SyncResourcer::from_boxed(conn))),
            (true, None) => return Err(RegistryError::NoChannel(Channel::Command)),
        };
        let telemetry = match (needs(Channel::Telemetry), self.telemetry) {
            (false, _) => None,
            (true, Some((connector, config))) => {
                Some(Arc::new(TelemetryResourcer::from_shared(connector, config)?))
            }
            (true, None) => return Err(RegistryError::NoChannel(Channel::Telemetry)),
        };
        let requests = self.metrics.map(|m| m.lab.command_requests);

        let mut endpoints = Vec::with_capacity(self.resources.len());
        let mut index = HashMap::with_capacity(self.resources.len());
        let mut fields: HashMap<String, String> = HashMap::new();
        for mut resource in self.resources {
            let key = normalize(&resource.path);
            if index.contains_key(&key) {
                return Err(RegistryError::DuplicatePath(key));
            }
            resource.path = key.clone();
            let binding = match (resource.channel, &command, &telemetry) {
                (Channel::Command, Some(res), _) => Binding::Command {
                    resourcer: Arc::clone(res),
                    requests: requests.clone(),
                },
                (Channel::Telemetry, _, Some(res)) => {
                    let (Some(field), Some(codec_name)) = (&resource.field, &resource.codec) else {
                        return Err(RegistryError::IncompleteTelemetryRoute(key));
                    };
                    let codec = self.codecs.get(codec_name).ok_or_else(|| {
                        RegistryError::UnknownCodec {
                            path: key.clone(),
                            codec: codec_name.clone(),
                        }
                    })?;
                    if let Some(first) = fields.insert(field.clone(), key.clone()) {
                        return Err(RegistryError::DuplicateField {
                            field: field.clone(),
                            first,
                            second: key,
                        });
                    }
                    res.route(&key, field)?;
                    Binding::Telemetry {
                        resourcer: Arc::clone(res),
                        codec,
                    }
                }
                (ch, _, _) => return Err(RegistryError::NoChannel(ch)),
            };
            index.insert(key, endpoints.len());
            endpoints.push(Endpoint::new(resource, binding));
        }
        info!(endpoints = endpoints.len(), "lab system ready");
        Ok(LabSystem {
            endpoints,
            index,
            command,
            telemetry,
        })
    }
}
