use serde::{Deserialize, Serialize};

use crate::store::{DbCollectionIden, StoreIden};

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Run {
    pub id: String,
    pub wid: String,
    /// trigger node id
    pub tid: String,

    pub state: String,
    pub start_time: i64,
    pub end_time: i64,
    /// final result as json text
    pub result: Option<String>,
    /// failure as json text
    pub err: Option<String>,
    pub timestamp: i64,
}

impl DbCollectionIden for Run {
    fn iden() -> StoreIden {
        StoreIden::Runs
    }
}
