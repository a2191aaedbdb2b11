//! Built-in resource kinds.

pub mod disk;
pub mod image;
pub mod instance;
pub mod ip_pool;

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::resource::RemoteResource;

pub use disk::Disk;
pub use image::Image;
pub use instance::Instance;
pub use ip_pool::IpPool;

/// Bindings for every built-in kind.
pub fn builtin() -> Vec<Arc<dyn RemoteResource>> {
    vec![
        Arc::new(Disk) as Arc<dyn RemoteResource>,
        Arc::new(Image),
        Arc::new(Instance::default()),
        Arc::new(IpPool),
    ]
}

/// Timestamps are recorded as RFC 3339 strings.
fn timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}
