//! lab-registry: YAML-driven resource catalogues bound to a lab device's channels

mod types;
pub use types::{Catalogue, Channel, Operation, PostOutcome, Resource, Value};

mod error;
pub use error::{RegistryError, Result};

pub mod codec;
pub use codec::{AngleCodec, CodecError, CodecTable, DutyCodec, ValueCodec};

mod config;
pub use config::{LabConfig, Reconnect};

mod loader;
pub use loader::{load_catalogue_file, load_catalogues_dir, load_config_file, CatalogueRegistry};

mod metrics;
pub use metrics::{LabMetrics, MetricsHub};

mod endpoint;
pub use endpoint::Endpoint;

mod system;
pub use system::{LabSystem, LabSystemBuilder, Node};

pub mod aeropendulum;
