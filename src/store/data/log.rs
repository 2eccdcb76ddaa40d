use serde::{Deserialize, Serialize};

use crate::store::{DbCollectionIden, StoreIden};

#[derive(Default, Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Log {
    pub id: String,
    pub rid: String,
    /// empty for run-level entries
    pub nid: String,
    pub seq: u64,

    pub level: String,
    pub content: String,
    pub timestamp: i64,
}

impl DbCollectionIden for Log {
    fn iden() -> StoreIden {
        StoreIden::Logs
    }
}
