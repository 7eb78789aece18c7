//! Remote mirroring seam. The transport lives outside this crate; the
//! tracker only pushes whole documents and accepts whole documents back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{ProgressStore, TemplateRecord};

/// Everything mirrored for one user. Replaced as a whole, last writer wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CloudDocument {
    pub templates: Vec<TemplateRecord>,
    pub progress_data: ProgressStore,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Remote document store keyed by user identity.
pub trait RemoteMirror {
    fn push(&mut self, user_id: &str, doc: &CloudDocument) -> Result<()>;
    fn pull(&mut self, user_id: &str) -> Result<Option<CloudDocument>>;
}
