use serde::{Deserialize, Serialize};

use crate::store::{DbCollectionIden, StoreIden};

/// Execution record of one node in one run, keyed by `{rid}:{nid}`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub rid: String,
    pub nid: String,

    pub state: String,
    pub err: Option<String>,
    pub start_time: i64,
    pub end_time: i64,
    pub timestamp: i64,
}

impl DbCollectionIden for Node {
    fn iden() -> StoreIden {
        StoreIden::Nodes
    }
}
