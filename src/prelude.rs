pub use anyhow::{anyhow, bail, Result};
pub use log::{debug, error, info, trace, warn};
pub use tokio::sync::{broadcast, mpsc};

pub use crate::config::{self, Config};
pub use crate::error::FrameError;
pub use crate::mk2;
pub use crate::mk2::connection::Connection;
pub use crate::mk2::snapshot::{Led, LedState, Snapshot};
pub use crate::options::Options;
